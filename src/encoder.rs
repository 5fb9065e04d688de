//! Encoder configuration for the recording path.
//!
//! The encoding policy is fixed: H.264 in an MPEG-4 container at
//! 5,120,000 bps and 30 fps, sized to the display.

use chrono::{Local, NaiveDateTime};

use crate::util::{DisplayMetrics, Size};

pub const VIDEO_BITRATE_BPS: u32 = 5 * 1024 * 1000;
pub const VIDEO_FRAME_RATE: u32 = 30;
pub const OUTPUT_EXTENSION: &str = "mp4";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VideoSource {
    /// Frames are rendered into the encoder's input surface
    Surface,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ContainerFormat {
    Mpeg4,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderConfig {
    pub(crate) video_source: VideoSource,
    pub(crate) container: ContainerFormat,
    pub(crate) codec: VideoCodec,
    pub(crate) bitrate_bps: u32,
    pub(crate) frame_rate: u32,
    pub(crate) video_size: Size,
    pub(crate) output_name: String,
}

impl EncoderConfig {
    /// Configuration for a recording of `metrics` starting now
    pub fn new(app_name: &str, metrics: DisplayMetrics) -> Self {
        Self::at(app_name, metrics, Local::now().naive_local())
    }

    /// Configuration for a recording of `metrics` stamped with `timestamp`
    pub fn at(app_name: &str, metrics: DisplayMetrics, timestamp: NaiveDateTime) -> Self {
        Self {
            video_source: VideoSource::Surface,
            container: ContainerFormat::Mpeg4,
            codec: VideoCodec::H264,
            bitrate_bps: VIDEO_BITRATE_BPS,
            frame_rate: VIDEO_FRAME_RATE,
            video_size: metrics.size,
            output_name: output_name(app_name, timestamp),
        }
    }

    pub fn video_source(&self) -> VideoSource {
        self.video_source
    }

    pub fn container(&self) -> ContainerFormat {
        self.container
    }

    pub fn codec(&self) -> VideoCodec {
        self.codec
    }

    pub fn bitrate_bps(&self) -> u32 {
        self.bitrate_bps
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn video_size(&self) -> Size {
        self.video_size
    }

    /// Display name of the media entry the encoder writes to
    pub fn output_name(&self) -> &str {
        &self.output_name
    }
}

/// `<app_name><yyyyMMddHHmmss>.mp4`
pub fn output_name(app_name: &str, timestamp: NaiveDateTime) -> String {
    format!("{}{}.{}", app_name, timestamp.format(TIMESTAMP_FORMAT), OUTPUT_EXTENSION)
}

//! The boundary between the session state machines and the host platform.
//!
//! Everything the sessions need from the device (consent intents, display
//! projections, virtual displays, image readers, the video encoder and the
//! shared media store) is reached through the traits in this module. A host
//! implements [`Platform`] once and hands it to
//! [`ProjectionController`](crate::controller::ProjectionController).

use std::{error::Error, fmt::Display, io::Write, path::PathBuf};

use crate::{encoder::EncoderConfig, frame::RawFrame, grant::{CaptureGrant, ConsentRequest}, mirror::MirrorFlags, util::DisplayMetrics};

mod fs_store;

pub use fs_store::FsMediaStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The grant or projection is no longer honored by the platform
    Revoked,
    /// The platform object could not be created right now
    Unavailable(String),
    Io(String),
    Other(String),
}

impl Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Revoked => f.write_str("PlatformError::Revoked"),
            Self::Unavailable(message) => f.write_fmt(format_args!("PlatformError::Unavailable(\"{}\")", message)),
            Self::Io(message) => f.write_fmt(format_args!("PlatformError::Io(\"{}\")", message)),
            Self::Other(message) => f.write_fmt(format_args!("PlatformError::Other(\"{}\")", message)),
        }
    }
}

impl Error for PlatformError {}

impl From<std::io::Error> for PlatformError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

/// Opaque handle to a render destination (an image reader's or encoder's input surface)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Surface(u64);

impl Surface {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum PixelFormat {
    Rgba8888,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Rgba8888 => 4,
        }
    }
}

/// Called on the frame sink's delivery context for every frame it acquires.
///
/// The frame borrows the sink's buffer and is released when the call returns.
pub type FrameHandler = Box<dyn FnMut(RawFrame<'_>) + Send + 'static>;

/// Everything a controller needs from the host platform
pub trait Platform: Send + Sync + 'static {
    /// Size and density of the display to mirror
    fn display_metrics(&self) -> DisplayMetrics;

    /// Ask the user for permission to capture the display.
    ///
    /// Must return without waiting for the answer; the host routes the answer
    /// back through [`ProjectionController::deliver_consent`](crate::controller::ProjectionController::deliver_consent).
    fn request_consent(&self, request: ConsentRequest);

    /// Turn a grant into a live projection of the display
    fn open_projection(&self, grant: &CaptureGrant) -> Result<Box<dyn Projection>, PlatformError>;

    /// Create a bounded queue of `max_images` frames that mirrors can render into
    fn create_frame_sink(&self, width: u32, height: u32, format: PixelFormat, max_images: usize) -> Result<Box<dyn FrameSink>, PlatformError>;

    fn create_encoder(&self) -> Box<dyn VideoEncoder>;

    fn media_store(&self) -> &dyn MediaStore;
}

/// A live display projection obtained from a grant
pub trait Projection: Send {
    fn create_virtual_display(
        &mut self,
        name: &str,
        width: u32,
        height: u32,
        density_dpi: u32,
        flags: MirrorFlags,
        surface: Surface,
    ) -> Result<Box<dyn VirtualDisplay>, PlatformError>;

    /// Stop projecting. Stopping an already stopped projection does nothing.
    fn stop(&mut self);
}

pub trait VirtualDisplay: Send {
    fn release(&mut self);
}

/// Receives rendered frames for the capture path
pub trait FrameSink: Send {
    fn surface(&self) -> Surface;

    /// Install the handler that receives acquired frames.
    ///
    /// The handler must only be invoked from the sink's delivery context, never
    /// from inside this call. The handler may call [`FrameSink::close`] on the
    /// sink it is installed in.
    fn set_frame_handler(&mut self, handler: FrameHandler);

    fn close(&mut self);
}

/// A surface-fed video encoder writing to a single output target
pub trait VideoEncoder: Send {
    fn prepare(&mut self, config: &EncoderConfig, output: OutputTarget) -> Result<(), PlatformError>;

    /// Input surface of a prepared encoder
    fn input_surface(&self) -> Option<Surface>;

    fn start(&mut self) -> Result<(), PlatformError>;

    fn stop(&mut self) -> Result<(), PlatformError>;

    /// Return to the unconfigured state, dropping the output target
    fn reset(&mut self) -> Result<(), PlatformError>;
}

/// The host's shared media storage
pub trait MediaStore: Send + Sync {
    /// Insert a new video entry named `display_name` and open it for writing
    fn create_video(&self, display_name: &str) -> Result<OutputTarget, PlatformError>;
}

/// A writable media entry handed to the encoder
pub struct OutputTarget {
    display_name: String,
    location: Option<PathBuf>,
    writer: Box<dyn Write + Send>,
}

impl OutputTarget {
    pub fn new(display_name: impl Into<String>, writer: Box<dyn Write + Send>) -> Self {
        Self {
            display_name: display_name.into(),
            location: None,
            writer,
        }
    }

    pub fn with_location(self, location: PathBuf) -> Self {
        Self {
            location: Some(location),
            ..self
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Where the entry lives, for stores that can tell
    pub fn location(&self) -> Option<&PathBuf> {
        self.location.as_ref()
    }

    pub fn writer(&mut self) -> &mut (dyn Write + Send) {
        self.writer.as_mut()
    }
}

impl std::fmt::Debug for OutputTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputTarget")
            .field("display_name", &self.display_name)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

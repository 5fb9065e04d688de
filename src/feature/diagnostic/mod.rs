use crate::frame::RawFrame;

/// Layout information about a raw frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrameDiagnostic {
    pub width: u32,
    pub height: u32,
    pub pixel_stride: usize,
    pub row_stride: usize,
    /// Bytes per row past the last pixel, `None` if rows are narrower than `width` pixels
    pub row_padding: Option<usize>,
    /// Row width in pixels once padding is counted
    pub padded_width: Option<usize>,
    pub buffer_len: usize,
    pub expected_len: usize,
}

impl RawFrameDiagnostic {
    /// Whether the frame would normalize to its own size
    pub fn is_well_formed(&self) -> bool {
        self.pixel_stride != 0 && self.row_padding.is_some() && self.buffer_len >= self.expected_len
    }
}

/// A frame that supports gathering diagnostic information
pub trait FrameDiagnosticExt {
    fn diagnostic(&self) -> RawFrameDiagnostic;
}

impl FrameDiagnosticExt for RawFrame<'_> {
    fn diagnostic(&self) -> RawFrameDiagnostic {
        let row_padding = self.row_padding(self.width);
        let padded_width = match (row_padding, self.pixel_stride) {
            (Some(padding), pixel_stride) if pixel_stride != 0 => Some(self.width as usize + padding / pixel_stride),
            _ => None,
        };
        RawFrameDiagnostic {
            width: self.width,
            height: self.height,
            pixel_stride: self.pixel_stride,
            row_stride: self.row_stride,
            row_padding,
            padded_width,
            buffer_len: self.buffer.len(),
            expected_len: self.row_stride * self.height as usize,
        }
    }
}

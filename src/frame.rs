use std::{error::Error, fmt::Display};

use crate::util::Size;

/// A frame as acquired from a frame sink.
///
/// Borrows the sink's buffer, which is only valid for the duration of the
/// frame handler call. Rows are `row_stride` bytes apart and may carry
/// alignment padding past the last pixel.
#[derive(Debug, Copy, Clone)]
pub struct RawFrame<'buffer> {
    pub buffer: &'buffer [u8],
    pub pixel_stride: usize,
    pub row_stride: usize,
    pub width: u32,
    pub height: u32,
}

impl<'buffer> RawFrame<'buffer> {
    pub fn new(buffer: &'buffer [u8], pixel_stride: usize, row_stride: usize, width: u32, height: u32) -> Self {
        Self {
            buffer,
            pixel_stride,
            row_stride,
            width,
            height,
        }
    }

    /// Bytes past the last pixel of each row when the frame holds `width` pixels per row
    pub fn row_padding(&self, width: u32) -> Option<usize> {
        self.row_stride.checked_sub(self.pixel_stride.checked_mul(width as usize)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDecodeError {
    ZeroPixelStride,
    EmptyTarget,
    /// Rows are narrower than the requested width
    StrideTooSmall { row_stride: usize, required: usize },
    BufferTooShort { length: usize, required: usize },
}

impl Display for FrameDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroPixelStride => f.write_str("FrameDecodeError::ZeroPixelStride"),
            Self::EmptyTarget => f.write_str("FrameDecodeError::EmptyTarget"),
            Self::StrideTooSmall { row_stride, required } => f.write_fmt(format_args!("FrameDecodeError::StrideTooSmall(row_stride: {}, required: {})", row_stride, required)),
            Self::BufferTooShort { length, required } => f.write_fmt(format_args!("FrameDecodeError::BufferTooShort(length: {}, required: {})", length, required)),
        }
    }
}

impl Error for FrameDecodeError {}

/// A tightly packed image, rows follow each other with no padding
#[derive(Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
    data: Box<[u8]>,
}

impl NormalizedImage {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.bytes_per_pixel
    }

    pub fn pixel_count(&self) -> usize {
        self.data.len() / self.bytes_per_pixel
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Box<[u8]> {
        self.data
    }

    /// Pixels as RGBA quads, for images with four bytes per pixel
    pub fn rgba_pixels(&self) -> Option<&[[u8; 4]]> {
        if self.bytes_per_pixel == 4 {
            Some(bytemuck::cast_slice(&self.data[..]))
        } else {
            None
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y as usize * self.width as usize + x as usize) * self.bytes_per_pixel;
        self.data.get(start..start + self.bytes_per_pixel)
    }
}

impl std::fmt::Debug for NormalizedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes_per_pixel", &self.bytes_per_pixel)
            .finish_non_exhaustive()
    }
}

/// Strip per-row alignment padding from a raw frame.
///
/// Each row of the source is `target_width + row_padding / pixel_stride` pixels
/// wide once padding is counted; only the leading `target_width` pixels of the
/// first `target_height` rows are kept. Pixel bytes are copied untouched.
pub fn normalize(raw: &RawFrame<'_>, target_width: u32, target_height: u32) -> Result<NormalizedImage, FrameDecodeError> {
    if raw.pixel_stride == 0 {
        return Err(FrameDecodeError::ZeroPixelStride);
    }
    if target_width == 0 || target_height == 0 {
        return Err(FrameDecodeError::EmptyTarget);
    }
    let packed_row = raw.pixel_stride
        .checked_mul(target_width as usize)
        .ok_or(FrameDecodeError::StrideTooSmall { row_stride: raw.row_stride, required: usize::MAX })?;
    if raw.row_stride < packed_row {
        return Err(FrameDecodeError::StrideTooSmall { row_stride: raw.row_stride, required: packed_row });
    }
    let required = raw.row_stride
        .checked_mul(target_height as usize)
        .ok_or(FrameDecodeError::BufferTooShort { length: raw.buffer.len(), required: usize::MAX })?;
    if raw.buffer.len() < required {
        return Err(FrameDecodeError::BufferTooShort { length: raw.buffer.len(), required });
    }

    // packed_row <= row_stride, so this is bounded by `required`
    let packed_len = packed_row
        .checked_mul(target_height as usize)
        .ok_or(FrameDecodeError::BufferTooShort { length: raw.buffer.len(), required: usize::MAX })?;
    let mut data = vec![0u8; packed_len];
    for (dest_row, source_row) in data.chunks_exact_mut(packed_row).zip(raw.buffer.chunks(raw.row_stride)) {
        dest_row.copy_from_slice(&source_row[..packed_row]);
    }

    Ok(NormalizedImage {
        width: target_width,
        height: target_height,
        bytes_per_pixel: raw.pixel_stride,
        data: data.into_boxed_slice(),
    })
}

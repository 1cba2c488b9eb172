//! Raw video frames.

use bytes::Bytes;

/// A single RGB24 video frame.
///
/// Pixel data is reference-counted and immutable, so cloning a frame is
/// cheap and no holder can observe another holder's writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Packed RGB bytes, row-major, `width * height * 3` long
    pub data: Bytes,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            data: data.into(),
        }
    }

    /// A frame filled with one color, mostly useful for tests and placeholders.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self::new(width, height, data)
    }

    /// Expected byte length for the declared dimensions.
    pub fn expected_len(&self) -> usize {
        (self.width as usize) * (self.height as usize) * 3
    }

    /// True when the buffer length matches the declared dimensions.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.expected_len()
    }
}

/// Which copy of the latest frame a reader wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameVariant {
    /// Frame as delivered by the camera.
    Raw,
    /// Frame with detection boxes drawn on it.
    Annotated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_frame_is_valid() {
        let frame = Frame::solid(4, 3, [1, 2, 3]);
        assert!(frame.is_valid());
        assert_eq!(&frame.data[..6], &[1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn test_short_buffer_is_invalid() {
        let frame = Frame::new(4, 4, vec![0u8; 10]);
        assert!(!frame.is_valid());
    }
}

//! Box overlays and image encoding.

use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use vigil_models::{BoundingBox, Detection, Frame};

use crate::error::{PerceptionError, PerceptionResult};

pub const PERSON_COLOR: [u8; 3] = [0, 200, 0];
pub const OBJECT_COLOR: [u8; 3] = [255, 160, 0];
pub const FACE_COLOR: [u8; 3] = [0, 120, 255];

const LINE_WIDTH: i32 = 2;
const JPEG_QUALITY: u8 = 85;

/// Copy of `frame` with one outline per detection.
pub fn annotate_detections(frame: &Frame, detections: &[Detection]) -> Frame {
    if detections.is_empty() {
        return frame.clone();
    }
    let boxes: Vec<_> = detections
        .iter()
        .map(|d| {
            let color = if d.is_person() { PERSON_COLOR } else { OBJECT_COLOR };
            (d.bbox, color)
        })
        .collect();
    draw_boxes(frame, &boxes)
}

/// Copy of `frame` with the given outlines drawn. Boxes are clipped to the frame.
pub fn draw_boxes(frame: &Frame, boxes: &[(BoundingBox, [u8; 3])]) -> Frame {
    if !frame.is_valid() {
        return frame.clone();
    }
    let mut data = frame.data.to_vec();
    let (w, h) = (frame.width as i32, frame.height as i32);

    for (bbox, color) in boxes {
        let x0 = bbox.x.clamp(0, w - 1);
        let y0 = bbox.y.clamp(0, h - 1);
        let x1 = (bbox.right() - 1).clamp(0, w - 1);
        let y1 = (bbox.bottom() - 1).clamp(0, h - 1);
        if bbox.width == 0 || bbox.height == 0 || x1 < x0 || y1 < y0 {
            continue;
        }
        for t in 0..LINE_WIDTH {
            for x in x0..=x1 {
                put(&mut data, w, x, (y0 + t).min(y1), *color);
                put(&mut data, w, x, (y1 - t).max(y0), *color);
            }
            for y in y0..=y1 {
                put(&mut data, w, (x0 + t).min(x1), y, *color);
                put(&mut data, w, (x1 - t).max(x0), y, *color);
            }
        }
    }

    Frame::new(frame.width, frame.height, data)
}

fn put(data: &mut [u8], width: i32, x: i32, y: i32, color: [u8; 3]) {
    let idx = ((y * width + x) * 3) as usize;
    if let Some(px) = data.get_mut(idx..idx + 3) {
        px.copy_from_slice(&color);
    }
}

/// JPEG-encode an RGB frame.
pub fn encode_jpeg(frame: &Frame) -> PerceptionResult<Vec<u8>> {
    if !frame.is_valid() {
        return Err(PerceptionError::encode_failed(format!(
            "frame buffer is {} bytes, expected {}",
            frame.data.len(),
            frame.expected_len()
        )));
    }
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode(&frame.data, frame.width, frame.height, ColorType::Rgb8)
        .map_err(|e| PerceptionError::encode_failed(e.to_string()))?;
    Ok(out)
}

/// Decode an uploaded JPEG/PNG into an RGB frame.
pub fn decode_image(bytes: &[u8]) -> PerceptionResult<Frame> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| PerceptionError::encode_failed(format!("unreadable image: {}", e)))?
        .to_rgb8();
    let (width, height) = img.dimensions();
    Ok(Frame::new(width, height, img.into_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let i = ((y * frame.width + x) * 3) as usize;
        [frame.data[i], frame.data[i + 1], frame.data[i + 2]]
    }

    #[test]
    fn test_draw_boxes_outlines_only() {
        let frame = Frame::solid(20, 20, [0, 0, 0]);
        let out = draw_boxes(&frame, &[(BoundingBox::new(2, 2, 10, 10), FACE_COLOR)]);
        assert_eq!(pixel(&out, 2, 2), FACE_COLOR);
        assert_eq!(pixel(&out, 11, 11), FACE_COLOR);
        assert_eq!(pixel(&out, 7, 7), [0, 0, 0]);
        // source frame untouched
        assert_eq!(pixel(&frame, 2, 2), [0, 0, 0]);
    }

    #[test]
    fn test_boxes_outside_frame_are_clipped() {
        let frame = Frame::solid(8, 8, [0, 0, 0]);
        let out = draw_boxes(&frame, &[(BoundingBox::new(-5, -5, 100, 100), PERSON_COLOR)]);
        assert_eq!(pixel(&out, 0, 0), PERSON_COLOR);
        assert_eq!(pixel(&out, 7, 7), PERSON_COLOR);
        assert_eq!(pixel(&out, 4, 4), [0, 0, 0]);
    }

    #[test]
    fn test_jpeg_round_trip_keeps_dimensions() {
        let frame = Frame::solid(16, 8, [200, 10, 10]);
        let jpeg = encode_jpeg(&frame).unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
        let decoded = decode_image(&jpeg).unwrap();
        assert_eq!((decoded.width, decoded.height), (16, 8));
        assert!(decoded.is_valid());
    }

    #[test]
    fn test_invalid_inputs_fail() {
        assert!(encode_jpeg(&Frame::new(4, 4, vec![0u8; 5])).is_err());
        assert!(decode_image(b"definitely not an image").is_err());
    }
}

use image::codecs::jpeg::JpegEncoder;
use image::ColorType;

use crate::error::EncodeError;
use crate::models::{Frame, ImagePayload};

/// Encode a frame as a JPEG payload. Alpha is dropped.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<ImagePayload, EncodeError> {
    if frame.is_empty() {
        return Err(EncodeError::EmptyFrame);
    }
    let rgb: Vec<u8> = frame
        .rgba
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100)).encode(
        &rgb,
        frame.width,
        frame.height,
        ColorType::Rgb8,
    )?;
    Ok(ImagePayload::jpeg(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_a_jpeg_stream() {
        let payload = encode_jpeg(&Frame::solid(8, 8, [120, 80, 40, 255]), 80).unwrap();
        assert_eq!(&payload.bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(payload.mime_type, "image/jpeg");
        assert_eq!(payload.file_name, "scene.jpg");
    }

    #[test]
    fn rejects_empty_frames() {
        let err = encode_jpeg(&Frame::solid(0, 4, [0, 0, 0, 0]), 80).unwrap_err();
        assert!(matches!(err, EncodeError::EmptyFrame));
    }
}

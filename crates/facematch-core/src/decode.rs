//! Base64 image payload decoding.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use image::RgbImage;
use thiserror::Error;

/// Standard alphabet, padding optional (browsers and scripts disagree on it).
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("image payload is empty")]
    EmptyPayload,
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unsupported or corrupt image: {0}")]
    Image(#[from] image::ImageError),
}

/// Drop everything up to and including the first `,` (a `data:image/...;base64,`
/// marker or a bare `image/png;base64,` one). Base64 never contains a comma.
pub fn strip_data_url(payload: &str) -> &str {
    let trimmed = payload.trim();
    match trimmed.split_once(',') {
        Some((_, body)) => body,
        None if trimmed.starts_with("data:") => "",
        None => trimmed,
    }
}

/// Decode a base64 (optionally data-URL) payload into an RGB image.
pub fn decode_image_payload(payload: &str) -> Result<RgbImage, DecodeError> {
    let body: String = strip_data_url(payload)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if body.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }

    let bytes = PAYLOAD_ENGINE.decode(body.as_bytes())?;
    let image = image::load_from_memory(&bytes)?;
    Ok(image.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb};
    use std::io::Cursor;

    fn png_base64(image: DynamicImage) -> String {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        base64::engine::general_purpose::STANDARD.encode(buf.into_inner())
    }

    #[test]
    fn test_strip_data_url() {
        assert_eq!(strip_data_url("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_url("  AAAA\n"), "AAAA");
        assert_eq!(strip_data_url("data:image/png;base64"), "");
        assert_eq!(strip_data_url("image/jpeg;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_url("base64,AAAA"), "AAAA");
    }

    #[test]
    fn test_decode_with_bare_marker() {
        let rgb = RgbImage::from_pixel(3, 3, Rgb([7, 8, 9]));
        let payload = format!("image/png;base64,{}", png_base64(DynamicImage::ImageRgb8(rgb)));
        assert_eq!(decode_image_payload(&payload).unwrap().dimensions(), (3, 3));
    }

    #[test]
    fn test_decode_plain_png() {
        let rgb = RgbImage::from_pixel(4, 3, Rgb([10, 20, 30]));
        let payload = png_base64(DynamicImage::ImageRgb8(rgb));
        let decoded = decode_image_payload(&payload).unwrap();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_decode_data_url_grayscale_to_rgb() {
        let gray = GrayImage::from_pixel(2, 2, Luma([200]));
        let payload = format!("data:image/png;base64,{}", png_base64(DynamicImage::ImageLuma8(gray)));
        let decoded = decode_image_payload(&payload).unwrap();
        assert_eq!(decoded.get_pixel(1, 1), &Rgb([200, 200, 200]));
    }

    #[test]
    fn test_decode_tolerates_missing_padding_and_newlines() {
        let rgb = RgbImage::from_pixel(5, 5, Rgb([1, 2, 3]));
        let padded = png_base64(DynamicImage::ImageRgb8(rgb));
        let unpadded = padded.trim_end_matches('=');
        let wrapped: String = unpadded
            .as_bytes()
            .chunks(60)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        assert!(decode_image_payload(&wrapped).is_ok());
    }

    #[test]
    fn test_malformed_base64() {
        assert!(matches!(
            decode_image_payload("not*valid*base64!"),
            Err(DecodeError::Base64(_))
        ));
    }

    #[test]
    fn test_valid_base64_but_not_an_image() {
        let payload = base64::engine::general_purpose::STANDARD.encode(b"hello world");
        assert!(matches!(decode_image_payload(&payload), Err(DecodeError::Image(_))));
    }

    #[test]
    fn test_empty_payload() {
        assert!(matches!(decode_image_payload(""), Err(DecodeError::EmptyPayload)));
        assert!(matches!(
            decode_image_payload("data:image/jpeg;base64,"),
            Err(DecodeError::EmptyPayload)
        ));
    }
}

//! Image encoding: page file bytes → base64 `ImageData` / data URL.
//!
//! Page files already sit on disk in a format the model understands, so the
//! bytes are sent as they are instead of being decoded and re-encoded. The
//! MIME type is sniffed from the bytes, not trusted from the file extension.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// MIME type of an encoded image, defaulting to PNG when unknown.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(other) => other.to_mime_type(),
        Err(_) => "image/png",
    }
}

/// Wrap encoded image bytes for a vision request.
pub fn encode_image_bytes(bytes: &[u8]) -> ImageData {
    let mime = sniff_mime(bytes);
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded {} image → {} bytes base64", mime, b64.len());
    ImageData::new(b64, mime).with_detail("high")
}

/// `data:{mime};base64,{data}` for OpenAI-style `image_url` parts.
pub fn data_url(image: &ImageData) -> String {
    format!("data:{};base64,{}", image.mime_type, image.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 0, 0])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn png_bytes_encoded_with_png_mime() {
        let bytes = png_bytes();
        let data = encode_image_bytes(&bytes);
        assert_eq!(data.mime_type, "image/png");
        assert_eq!(STANDARD.decode(&data.data).unwrap(), bytes);
    }

    #[test]
    fn jpeg_is_sniffed() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([0, 0, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
            .unwrap();
        assert_eq!(sniff_mime(&buf), "image/jpeg");
    }

    #[test]
    fn unknown_bytes_default_to_png() {
        assert_eq!(sniff_mime(b"not an image"), "image/png");
    }

    #[test]
    fn data_url_prefix() {
        let url = data_url(&encode_image_bytes(&png_bytes()));
        assert!(url.starts_with("data:image/png;base64,iVBOR"), "got: {url}");
    }
}

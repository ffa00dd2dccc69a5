use image::imageops::FilterType;
use image::{DynamicImage, ImageOutputFormat};
use providers::ImageInput;
use std::io::Cursor;

const JPEG_QUALITY: u8 = 85;

/// Formats the decoder is built with.
pub const SUPPORTED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png"];

/// Decodes, converts to RGB and downsizes so the longest side is at most `max_side`.
/// The result is re-encoded as JPEG.
pub fn prepare(bytes: &[u8], max_side: u32) -> Result<ImageInput, image::ImageError> {
    let decoded = image::load_from_memory(bytes)?;
    let mut rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
    if max_side > 0 && rgb.width().max(rgb.height()) > max_side {
        rgb = rgb.resize(max_side, max_side, FilterType::Triangle);
    }
    let mut buf = Cursor::new(Vec::new());
    rgb.write_to(&mut buf, ImageOutputFormat::Jpeg(JPEG_QUALITY))?;
    Ok(ImageInput::new("image/jpeg", buf.into_inner()))
}

pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    infer::get(bytes).map(|kind| kind.mime_type())
}

/// True when the bytes sniff as an image format `prepare` can decode.
pub fn looks_like_image(bytes: &[u8]) -> bool {
    sniff_mime(bytes).map_or(false, |mime| SUPPORTED_MIME_TYPES.contains(&mime))
}

pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgb([200u8, 120, 40]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageOutputFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn large_images_are_downscaled_keeping_aspect() {
        let prepared = prepare(&png(400, 200), 100).unwrap();
        assert_eq!(prepared.mime, "image/jpeg");
        let back = image::load_from_memory(&prepared.data).unwrap();
        assert_eq!((back.width(), back.height()), (100, 50));
    }

    #[test]
    fn small_images_keep_their_size() {
        let prepared = prepare(&png(30, 20), 100).unwrap();
        let back = image::load_from_memory(&prepared.data).unwrap();
        assert_eq!((back.width(), back.height()), (30, 20));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(prepare(b"definitely not an image", 100).is_err());
        assert!(!looks_like_image(b"definitely not an image"));
    }

    #[test]
    fn sniffing_and_hashing() {
        let bytes = png(2, 2);
        assert_eq!(sniff_mime(&bytes), Some("image/png"));
        assert!(looks_like_image(&bytes));
        assert_eq!(content_hash(&bytes), content_hash(&bytes));
        assert_eq!(content_hash(&bytes).len(), 64);
        assert_ne!(content_hash(&bytes), content_hash(&png(3, 2)));
    }

    #[test]
    fn undecodable_image_formats_are_not_accepted() {
        let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";
        assert_eq!(sniff_mime(gif), Some("image/gif"));
        assert!(!looks_like_image(gif));
        assert!(prepare(gif, 100).is_err());
    }
}

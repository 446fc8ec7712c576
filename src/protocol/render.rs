//! Rendering caller images and QR codes into [`MonoBitmap`]s.

use base64::{engine::general_purpose, Engine as _};
use image::{imageops::FilterType, DynamicImage, RgbaImage};
use qrcode::{Color, EcLevel, QrCode};
use tracing::debug;

use super::paper::PaperWidth;
use super::raster::{is_black, luminance, MonoBitmap};
use crate::error::{Error, Result};

/// Blank modules around a QR symbol.
pub const QR_QUIET_ZONE: usize = 4;

/// Decode a base64 image, with or without a `data:` URL prefix.
pub fn decode_base64_image(input: &str) -> Result<DynamicImage> {
    let encoded = match input.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => input,
    };
    let encoded: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();

    let bytes = general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| Error::InvalidImage {
            reason: format!("base64: {}", e),
        })?;

    image::load_from_memory(&bytes).map_err(|e| Error::InvalidImage {
        reason: e.to_string(),
    })
}

/// Resize to `width` dots, preserving the aspect ratio.
pub fn scale_to_width(image: &DynamicImage, width: u32) -> RgbaImage {
    let (w, h) = (image.width().max(1), image.height().max(1));
    let height = ((u64::from(h) * u64::from(width) + u64::from(w) / 2) / u64::from(w)).max(1) as u32;
    image
        .resize_exact(width, height, FilterType::Triangle)
        .to_rgba8()
}

/// Threshold an RGBA image. Transparent pixels are composited onto white.
pub fn threshold(image: &RgbaImage) -> MonoBitmap {
    MonoBitmap::from_fn(image.width() as usize, image.height() as usize, |x, y| {
        let [r, g, b, a] = image.get_pixel(x as u32, y as u32).0;
        let over_white = |c: u8| {
            ((u32::from(c) * u32::from(a) + 255 * (255 - u32::from(a))) / 255) as u8
        };
        is_black(luminance(over_white(r), over_white(g), over_white(b)))
    })
}

/// Decode, rescale to the paper's image width, and threshold.
pub fn render_image(base64: &str, paper: PaperWidth) -> Result<MonoBitmap> {
    let image = decode_base64_image(base64)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(Error::InvalidImage {
            reason: "image has no pixels".to_string(),
        });
    }

    let scaled = scale_to_width(&image, paper.image_width());
    debug!(
        "Scaled image {}x{} -> {}x{} for {} paper",
        image.width(),
        image.height(),
        scaled.width(),
        scaled.height(),
        paper
    );
    Ok(threshold(&scaled))
}

/// Render `content` as a square QR bitmap sized for `paper`.
///
/// Modules are sampled nearest-neighbour into the fixed square, so the
/// symbol is never stretched in one direction only.
pub fn render_qr(content: &str, paper: PaperWidth) -> Result<MonoBitmap> {
    if content.is_empty() {
        return Err(Error::QrGeneration {
            reason: "content is empty".to_string(),
        });
    }

    let code = QrCode::with_error_correction_level(content.as_bytes(), EcLevel::M).map_err(|e| {
        Error::QrGeneration {
            reason: e.to_string(),
        }
    })?;

    let modules = code.width();
    let total = modules + 2 * QR_QUIET_ZONE;
    let size = paper.qr_size() as usize;

    debug!(
        "QR version {:?}: {} modules into {}x{} dots",
        code.version(),
        modules,
        size,
        size
    );

    Ok(MonoBitmap::from_fn(size, size, |x, y| {
        let mx = x * total / size;
        let my = y * total / size;
        if mx < QR_QUIET_ZONE || my < QR_QUIET_ZONE {
            return false;
        }
        let (mx, my) = (mx - QR_QUIET_ZONE, my - QR_QUIET_ZONE);
        mx < modules && my < modules && code[(mx, my)] == Color::Dark
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    fn png_base64(image: RgbaImage) -> String {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn test_render_image_scales_to_paper_width() {
        // Left half black, right half white, 2:1 aspect.
        let source = RgbaImage::from_fn(100, 50, |x, _| {
            if x < 50 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        let bitmap = render_image(&png_base64(source), PaperWidth::Mm58).unwrap();

        assert_eq!(bitmap.width(), 360);
        assert_eq!(bitmap.height(), 180);
        assert!(bitmap.get(10, 90));
        assert!(!bitmap.get(350, 90));
    }

    #[test]
    fn test_data_url_prefix_accepted() {
        let source = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        let url = format!("data:image/png;base64,{}", png_base64(source));
        let bitmap = render_image(&url, PaperWidth::Mm80).unwrap();
        assert_eq!(bitmap.width(), 450);
        assert_eq!(bitmap.height(), 450);
    }

    #[test]
    fn test_transparent_is_white() {
        let source = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        let bitmap = threshold(&source);
        assert!((0..4).all(|y| (0..4).all(|x| !bitmap.get(x, y))));
    }

    #[test]
    fn test_invalid_base64_and_image() {
        assert!(matches!(
            render_image("not base64!!", PaperWidth::Mm58),
            Err(Error::InvalidImage { .. })
        ));
        let garbage = general_purpose::STANDARD.encode(b"definitely not a png");
        assert!(matches!(
            render_image(&garbage, PaperWidth::Mm58),
            Err(Error::InvalidImage { .. })
        ));
    }

    #[test]
    fn test_qr_is_square_with_quiet_zone() {
        let bitmap = render_qr("https://example.com/receipt/42", PaperWidth::Mm58).unwrap();
        assert_eq!(bitmap.width(), 240);
        assert_eq!(bitmap.height(), 240);

        // Quiet zone corners are white, finder pattern corner is black.
        assert!(!bitmap.get(0, 0));
        assert!(!bitmap.get(239, 239));
        let code = QrCode::with_error_correction_level(b"https://example.com/receipt/42", EcLevel::M)
            .unwrap();
        let total = code.width() + 2 * QR_QUIET_ZONE;
        let first_module = (QR_QUIET_ZONE * 240).div_ceil(total);
        assert!(bitmap.get(first_module, first_module));
    }

    #[test]
    fn test_qr_sizes_by_paper() {
        let bitmap = render_qr("hello", PaperWidth::Mm80).unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (320, 320));
    }

    #[test]
    fn test_qr_errors() {
        assert!(matches!(
            render_qr("", PaperWidth::Mm58),
            Err(Error::QrGeneration { .. })
        ));
        let too_long = "x".repeat(8000);
        assert!(matches!(
            render_qr(&too_long, PaperWidth::Mm58),
            Err(Error::QrGeneration { .. })
        ));
    }
}

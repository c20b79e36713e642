//! Code128 and QR encoding shared by the PDF renderers and the scan screens.

use barcoders::sym::code128::Code128;
use base64::{engine::general_purpose, Engine as _};
use image::{GrayImage, Luma};
use qrcode::{Color, QrCode};
use std::io::Cursor;

use crate::middleware::error_handling::{AppError, Result};

/// Code128 charset B start marker understood by barcoders.
const CHARSET_B: char = '\u{0181}';
pub const MAX_BARCODE_LEN: usize = 80;
const QUIET_ZONE_MODULES: u32 = 10;

/// Whether `value` can be printed as Code128 (charset B, printable ASCII).
pub fn is_code128_encodable(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty()
        && value.len() <= MAX_BARCODE_LEN
        && value.chars().all(|c| c.is_ascii() && !c.is_ascii_control())
}

/// Bar pattern (1 = bar, 0 = space) for a printable ASCII value.
pub fn code128_modules(value: &str) -> Result<Vec<u8>> {
    let value = value.trim();
    if value.is_empty() || value.len() > MAX_BARCODE_LEN {
        return Err(AppError::BadRequest(format!(
            "Barcode value must be 1 to {} characters",
            MAX_BARCODE_LEN
        )));
    }
    if !value.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err(AppError::BadRequest(
            "Barcode value must be printable ASCII".to_string(),
        ));
    }

    let barcode = Code128::new(format!("{}{}", CHARSET_B, value))
        .map_err(|e| AppError::BadRequest(format!("Cannot encode barcode: {}", e)))?;
    Ok(barcode.encode())
}

/// QR modules as rows of dark/light flags, with the side length.
pub fn qr_modules(value: &str) -> Result<(usize, Vec<bool>)> {
    let code = QrCode::new(value.as_bytes())
        .map_err(|e| AppError::BadRequest(format!("Cannot encode QR code: {}", e)))?;
    let width = code.width();
    let modules = code
        .to_colors()
        .into_iter()
        .map(|c| c == Color::Dark)
        .collect();
    Ok((width, modules))
}

pub fn code128_png(value: &str, module_px: u32, height_px: u32) -> Result<Vec<u8>> {
    let modules = code128_modules(value)?;
    let module_px = module_px.max(1);
    let width = (modules.len() as u32 + 2 * QUIET_ZONE_MODULES) * module_px;
    let mut img = GrayImage::from_pixel(width, height_px.max(1), Luma([255u8]));

    for (i, bar) in modules.iter().enumerate() {
        if *bar == 1 {
            let x0 = (i as u32 + QUIET_ZONE_MODULES) * module_px;
            for x in x0..x0 + module_px {
                for y in 0..img.height() {
                    img.put_pixel(x, y, Luma([0u8]));
                }
            }
        }
    }
    encode_png(img)
}

pub fn qr_png(value: &str, module_px: u32) -> Result<Vec<u8>> {
    let (width, modules) = qr_modules(value)?;
    let module_px = module_px.max(1);
    let quiet = 4u32;
    let side = (width as u32 + 2 * quiet) * module_px;
    let mut img = GrayImage::from_pixel(side, side, Luma([255u8]));

    for (index, dark) in modules.iter().enumerate() {
        if !*dark {
            continue;
        }
        let col = (index % width) as u32 + quiet;
        let row = (index / width) as u32 + quiet;
        for y in row * module_px..(row + 1) * module_px {
            for x in col * module_px..(col + 1) * module_px {
                img.put_pixel(x, y, Luma([0u8]));
            }
        }
    }
    encode_png(img)
}

pub fn code128_png_base64(value: &str) -> Result<String> {
    Ok(general_purpose::STANDARD.encode(code128_png(value, 2, 80)?))
}

fn encode_png(img: GrayImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image::DynamicImage::ImageLuma8(img)
        .write_to(&mut buffer, image::ImageFormat::Png)
        .map_err(|e| AppError::Document(format!("PNG encoding failed: {}", e)))?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_code128_pattern_shape() {
        let modules = code128_modules("ML-2000004567").unwrap();
        // start bar, stop pattern ends on a bar
        assert_eq!(modules.first(), Some(&1));
        assert_eq!(modules.last(), Some(&1));
        assert!(modules.iter().all(|m| *m <= 1));
    }

    #[test]
    fn test_code128_rejects_bad_values() {
        assert!(code128_modules("").is_err());
        assert!(code128_modules("Ñuñoa").is_err());
        assert!(code128_modules(&"9".repeat(MAX_BARCODE_LEN + 1)).is_err());
    }

    #[test]
    fn test_pngs_are_png() {
        assert!(code128_png("RP-778812", 2, 60).unwrap().starts_with(&PNG_MAGIC));
        assert!(qr_png("ripley:RP-778812", 4).unwrap().starts_with(&PNG_MAGIC));
    }

    #[test]
    fn test_qr_modules_are_square() {
        let (width, modules) = qr_modules("falabella:FA-1").unwrap();
        assert_eq!(modules.len(), width * width);
        assert!(modules.iter().any(|d| *d));
    }
}

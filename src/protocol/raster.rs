//! Monochrome bitmaps and the `GS v 0` raster frame.
//!
//! ## Bit Packing
//!
//! Each row is `ceil(width / 8)` bytes. Bit 7 of the first byte is the
//! leftmost dot; a set bit prints black. Unused low-order bits of the last
//! byte in a row are zero.
//!
//! ```text
//! 0xF0 = 11110000 = ████░░░░
//! 0xAA = 10101010 = █░█░█░█░
//! ```

use super::commands::{raster_header, LF, RASTER_HEADER_LEN, RASTER_OPCODE};
use crate::error::{Error, Result};

/// Pixels with luminance below this value print black.
pub const LUMINANCE_THRESHOLD: u8 = 128;

/// Rec.601 luma of an sRGB pixel using integer arithmetic.
#[inline]
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    ((299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b)) / 1000) as u8
}

/// Whether a luminance value prints as a black dot.
#[inline]
pub fn is_black(luma: u8) -> bool {
    luma < LUMINANCE_THRESHOLD
}

/// A 1-bit image, row-major, `true` meaning black.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonoBitmap {
    width: usize,
    height: usize,
    pixels: Vec<bool>,
}

impl MonoBitmap {
    /// An all-white bitmap.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![false; width * height],
        }
    }

    /// Build a bitmap by evaluating `f(x, y)` for every dot.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> bool) -> Self {
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Threshold a greyscale buffer of `width * height` luminance values.
    pub fn from_luma(width: usize, height: usize, luma: &[u8]) -> Result<Self> {
        if luma.len() != width * height {
            return Err(Error::InvalidParameter {
                name: "luma".to_string(),
                value: format!("{} values for {}x{}", luma.len(), width, height),
            });
        }
        Ok(Self {
            width,
            height,
            pixels: luma.iter().map(|&l| is_black(l)).collect(),
        })
    }

    /// Width in dots.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in dots.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Bytes per packed row.
    pub fn bytes_per_row(&self) -> usize {
        self.width.div_ceil(8)
    }

    /// Whether the dot at (`x`, `y`) is black. Out of range reads white.
    pub fn get(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.pixels[y * self.width + x]
    }

    /// Set the dot at (`x`, `y`). Out of range writes are ignored.
    pub fn set(&mut self, x: usize, y: usize, black: bool) {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = black;
        }
    }

    /// Pack rows MSB-first.
    pub fn pack(&self) -> Vec<u8> {
        let row_bytes = self.bytes_per_row();
        let mut out = vec![0u8; row_bytes * self.height];

        for y in 0..self.height {
            let row = &self.pixels[y * self.width..(y + 1) * self.width];
            let dst = &mut out[y * row_bytes..(y + 1) * row_bytes];
            for (x, &black) in row.iter().enumerate() {
                if black {
                    dst[x / 8] |= 0x80 >> (x % 8);
                }
            }
        }

        out
    }
}

/// Encode a bitmap as a complete raster frame: header, rows, trailing LF.
///
/// Fails if the bitmap is empty or too large for the 16-bit size fields.
pub fn encode_raster(bitmap: &MonoBitmap) -> Result<Vec<u8>> {
    if bitmap.width == 0 || bitmap.height == 0 {
        return Err(Error::InvalidImage {
            reason: format!("empty bitmap {}x{}", bitmap.width, bitmap.height),
        });
    }

    let width_bytes = u16::try_from(bitmap.bytes_per_row()).map_err(|_| Error::InvalidImage {
        reason: format!("width {} exceeds raster limit", bitmap.width),
    })?;
    let height = u16::try_from(bitmap.height).map_err(|_| Error::InvalidImage {
        reason: format!("height {} exceeds raster limit", bitmap.height),
    })?;

    let data = bitmap.pack();
    let mut frame = Vec::with_capacity(RASTER_HEADER_LEN + data.len() + 1);
    frame.extend_from_slice(&raster_header(width_bytes, height));
    frame.extend_from_slice(&data);
    frame.push(LF);
    Ok(frame)
}

/// Parse a raster frame back into a bitmap `width_bytes * 8` dots wide.
///
/// Returns `None` if the frame is not a well-formed `GS v 0` frame.
pub fn decode_raster(frame: &[u8]) -> Option<MonoBitmap> {
    if frame.len() < RASTER_HEADER_LEN + 1 || frame[..4] != RASTER_OPCODE {
        return None;
    }

    let width_bytes = u16::from_le_bytes([frame[4], frame[5]]) as usize;
    let height = u16::from_le_bytes([frame[6], frame[7]]) as usize;
    let data = &frame[RASTER_HEADER_LEN..frame.len() - 1];

    if data.len() != width_bytes * height || frame[frame.len() - 1] != LF {
        return None;
    }

    Some(MonoBitmap::from_fn(width_bytes * 8, height, |x, y| {
        data[y * width_bytes + x / 8] & (0x80 >> (x % 8)) != 0
    }))
}

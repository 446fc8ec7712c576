//! ESC/POS command bytes.
//!
//! Only the subset needed for receipts is implemented: initialization,
//! emphasis, justification, feeding, cutting, and the `GS v 0` raster
//! image command.

/// ESC - command prefix.
pub const ESC: u8 = 0x1B;

/// GS - extended command prefix.
pub const GS: u8 = 0x1D;

/// LF - print the line buffer and advance one line.
pub const LF: u8 = 0x0A;

/// `GS v 0 m` with normal density (m = 0).
pub const RASTER_OPCODE: [u8; 4] = [GS, b'v', b'0', 0x00];

/// Length of the raster header: opcode plus xL xH yL yH.
pub const RASTER_HEADER_LEN: usize = 8;

/// Horizontal justification (`ESC a n`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Alignment {
    /// Flush left.
    #[default]
    Left = 0,
    /// Centered.
    Center = 1,
    /// Flush right.
    Right = 2,
}

/// Reset the printer to its power-on defaults (`ESC @`).
pub fn init() -> [u8; 2] {
    [ESC, b'@']
}

/// Turn emphasized (bold) mode on or off (`ESC E n`).
pub fn bold(on: bool) -> [u8; 3] {
    [ESC, b'E', u8::from(on)]
}

/// Select justification (`ESC a n`).
pub fn align(alignment: Alignment) -> [u8; 3] {
    [ESC, b'a', alignment as u8]
}

/// Print and feed `lines` lines (`ESC d n`).
pub fn feed(lines: u8) -> [u8; 3] {
    [ESC, b'd', lines]
}

/// Full cut (`GS V 0`).
pub fn cut() -> [u8; 3] {
    [GS, b'V', 0x00]
}

/// UTF-8 text followed by a line feed.
pub fn text_line(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 1);
    out.extend_from_slice(text.as_bytes());
    out.push(LF);
    out
}

/// Raster header for an image `width_bytes` wide and `height` dots tall.
pub fn raster_header(width_bytes: u16, height: u16) -> [u8; RASTER_HEADER_LEN] {
    let [xl, xh] = width_bytes.to_le_bytes();
    let [yl, yh] = height.to_le_bytes();
    [
        RASTER_OPCODE[0],
        RASTER_OPCODE[1],
        RASTER_OPCODE[2],
        RASTER_OPCODE[3],
        xl,
        xh,
        yl,
        yh,
    ]
}

//! Print job composition.

use bytes::Bytes;

use super::commands::{self, Alignment};
use super::paper::PaperWidth;
use super::raster::{encode_raster, MonoBitmap};
use super::text::{two_columns, TextStyle};
use crate::error::Result;

/// Builder for an ESC/POS byte stream.
///
/// ```
/// use thermal_printer_ble::protocol::{Alignment, PaperWidth, PrintJob};
///
/// let job = PrintJob::new()
///     .init()
///     .align(Alignment::Center)
///     .bold(true)
///     .text_line("CAFE")
///     .bold(false)
///     .align(Alignment::Left)
///     .two_columns("Coffee x2", "$5.00", PaperWidth::Mm58)
///     .feed(3)
///     .cut();
/// assert_eq!(&job.as_bytes()[..2], &[0x1B, 0x40]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrintJob {
    bytes: Vec<u8>,
}

impl PrintJob {
    /// An empty job.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the printer.
    pub fn init(mut self) -> Self {
        self.bytes.extend_from_slice(&commands::init());
        self
    }

    /// Toggle bold.
    pub fn bold(mut self, on: bool) -> Self {
        self.bytes.extend_from_slice(&commands::bold(on));
        self
    }

    /// Set justification.
    pub fn align(mut self, alignment: Alignment) -> Self {
        self.bytes.extend_from_slice(&commands::align(alignment));
        self
    }

    /// Print one line of text.
    pub fn text_line(mut self, text: &str) -> Self {
        self.bytes.extend_from_slice(&commands::text_line(text));
        self
    }

    /// Print text with a style, restoring plain left-aligned text afterwards.
    pub fn styled_text(self, text: &str, style: TextStyle) -> Self {
        let mut job = self;
        if style.bold {
            job = job.bold(true);
        }
        if style.align != Alignment::Left {
            job = job.align(style.align);
        }
        job = job.text_line(text);
        if style.align != Alignment::Left {
            job = job.align(Alignment::Left);
        }
        if style.bold {
            job = job.bold(false);
        }
        job
    }

    /// Print a left/right pair sized to the paper.
    pub fn two_columns(self, left: &str, right: &str, paper: PaperWidth) -> Self {
        self.text_line(&two_columns(left, right, paper.chars_per_line()))
    }

    /// Feed `lines` blank lines.
    pub fn feed(mut self, lines: u8) -> Self {
        self.bytes.extend_from_slice(&commands::feed(lines));
        self
    }

    /// Print a bitmap as a raster frame.
    pub fn raster(mut self, bitmap: &MonoBitmap) -> Result<Self> {
        self.bytes.extend_from_slice(&encode_raster(bitmap)?);
        Ok(self)
    }

    /// Print a bitmap centered on the paper.
    pub fn centered_raster(self, bitmap: &MonoBitmap) -> Result<Self> {
        Ok(self
            .align(Alignment::Center)
            .raster(bitmap)?
            .align(Alignment::Left))
    }

    /// Cut the paper.
    pub fn cut(mut self) -> Self {
        self.bytes.extend_from_slice(&commands::cut());
        self
    }

    /// Append raw bytes.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// Bytes built so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether nothing has been added.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Finish the job.
    pub fn build(self) -> Bytes {
        Bytes::from(self.bytes)
    }
}

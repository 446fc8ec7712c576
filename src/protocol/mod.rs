//! Protocol module for building printer command streams.
//!
//! This module contains the implementations for:
//! - ESC/POS command bytes
//! - Paper sizes and their layout constants
//! - Fixed-width text layout
//! - Monochrome raster frames and image/QR rendering
//! - Print job composition

pub mod commands;
pub mod job;
pub mod paper;
pub mod raster;
pub mod render;
pub mod text;

pub use commands::Alignment;
pub use job::PrintJob;
pub use paper::PaperWidth;
pub use raster::{decode_raster, encode_raster, MonoBitmap, LUMINANCE_THRESHOLD};
pub use render::{render_image, render_qr};
pub use text::{two_columns, TextStyle};

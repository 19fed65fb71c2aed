//! PDF engine contract and its PDFium implementation.
//!
//! This module provides:
//! - The capability set the viewer needs from a PDF engine
//! - A PDFium-backed engine with glyph-accurate character bounds
//! - Page and annotation metadata types

mod engine;
mod pdfium;

#[cfg(test)]
pub(crate) mod fake;

pub use engine::*;
pub use pdfium::PdfiumEngine;

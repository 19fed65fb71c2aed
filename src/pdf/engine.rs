//! Capabilities required from the external PDF engine.
//!
//! Page sizes are reported as displayed, with `/Rotate` applied. Character
//! and annotation boxes are in PDF points (1/72 inch) in unrotated page space
//! with a top-left origin; the viewport applies rotation and scale.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during PDF operations.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Failed to initialize PDFium: {0}")]
    InitError(String),

    #[error("Failed to load PDF: {0}")]
    LoadError(String),

    #[error("Document is password protected")]
    Encrypted,

    #[error("Invalid page index: {0}")]
    InvalidPage(u32),

    #[error("Rendering failed: {0}")]
    RenderError(String),

    #[error("Text extraction failed: {0}")]
    TextError(String),

    #[error("Annotation extraction failed: {0}")]
    AnnotationError(String),
}

impl Serialize for PdfError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Axis-aligned rectangle in PDF points, top-left origin of the unrotated page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PageRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// Character bounding box with precise positioning for text selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharRect {
    /// The character as a string (handles multi-byte Unicode)
    pub char: String,
    /// Character index within the page
    pub index: usize,
    /// Tight bounds in PDF points
    pub bounds: PageRect,
}

/// Page metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageInfo {
    /// Page index (0-based)
    pub index: u32,
    /// Displayed page width in PDF points
    pub width: f32,
    /// Displayed page height in PDF points
    pub height: f32,
    /// Clockwise page rotation in degrees (0, 90, 180, 270)
    pub rotation: i32,
}

/// Document metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Total number of pages
    pub page_count: u32,
    /// Document title (if available)
    pub title: Option<String>,
    /// Document author (if available)
    pub author: Option<String>,
    /// PDF version string
    pub pdf_version: String,
}

/// Kinds of annotation objects embedded in a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Link,
    Widget,
    Text,
    FreeText,
    Highlight,
    Underline,
    StrikeOut,
    Ink,
    Popup,
    Other,
}

/// An annotation object embedded in the source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedAnnotation {
    pub kind: AnnotationKind,
    pub bounds: PageRect,
    /// Text contents, for notes and free text
    #[serde(default)]
    pub contents: Option<String>,
}

/// The document engine the viewer orchestrates.
///
/// Engines are handed the raw document bytes on every call, so an
/// implementation may keep no per-document state at all. Calls block and are
/// always issued from the blocking worker pool.
pub trait PdfEngine: Send + Sync {
    /// Parse the document and report its metadata.
    fn open(&self, bytes: &[u8]) -> Result<DocumentInfo, PdfError>;

    /// Intrinsic size of a page.
    fn page_info(&self, bytes: &[u8], page_index: u32) -> Result<PageInfo, PdfError>;

    /// Rasterize a page into an opaque image of exactly `width` x `height`.
    fn rasterize(
        &self,
        bytes: &[u8],
        page_index: u32,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, PdfError>;

    /// Positioned characters of a page, in content order.
    fn text_content(&self, bytes: &[u8], page_index: u32) -> Result<Vec<CharRect>, PdfError>;

    /// Annotation objects embedded in a page.
    fn annotations(
        &self,
        bytes: &[u8],
        page_index: u32,
    ) -> Result<Vec<EmbeddedAnnotation>, PdfError>;
}

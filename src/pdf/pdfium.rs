//! PDFium-backed engine using pdfium-render.
//!
//! Note: pdfium-render's Pdfium struct is not Send+Sync, so we create instances
//! on-demand within each operation rather than storing in shared state.

use super::engine::{
    AnnotationKind, CharRect, DocumentInfo, EmbeddedAnnotation, PageInfo, PageRect, PdfEngine,
    PdfError,
};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use log::{debug, info, warn};
use pdfium_render::prelude::*;

/// Engine that binds the PDFium shared library for every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumEngine;

impl PdfiumEngine {
    pub fn new() -> Self {
        Self
    }
}

/// Bind to PDFium library and return a usable Pdfium instance.
/// This is called on-demand for each operation since Pdfium is not Send+Sync.
fn bind_pdfium() -> Result<Pdfium, PdfError> {
    use std::sync::atomic::{AtomicBool, Ordering};
    static LOGGED_SUCCESS: AtomicBool = AtomicBool::new(false);

    // Bundled library next to the executable (app bundles)
    #[cfg(target_os = "macos")]
    {
        if let Ok(exe_path) = std::env::current_exe() {
            // exe_path is Contents/MacOS/folio, library lives in Contents/Frameworks
            if let Some(macos_dir) = exe_path.parent() {
                let frameworks_path = macos_dir
                    .join("..")
                    .join("Frameworks")
                    .join("libpdfium.dylib");

                if let Ok(canonical_path) = frameworks_path.canonicalize() {
                    match Pdfium::bind_to_library(&canonical_path) {
                        Ok(bindings) => {
                            if !LOGGED_SUCCESS.swap(true, Ordering::Relaxed) {
                                info!("Loaded bundled PDFium: {:?}", canonical_path);
                            }
                            return Ok(Pdfium::new(bindings));
                        }
                        Err(e) => warn!("Failed bundled PDFium: {:?}", e),
                    }
                }
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let dll_path = exe_dir.join("pdfium.dll");
                if dll_path.exists() {
                    match Pdfium::bind_to_library(&dll_path) {
                        Ok(bindings) => {
                            if !LOGGED_SUCCESS.swap(true, Ordering::Relaxed) {
                                info!("Loaded bundled pdfium.dll: {:?}", dll_path);
                            }
                            return Ok(Pdfium::new(bindings));
                        }
                        Err(e) => warn!("Failed bundled pdfium.dll: {:?}", e),
                    }
                }
            }
        }
    }

    // System library (development)
    if let Ok(bindings) = Pdfium::bind_to_system_library() {
        if !LOGGED_SUCCESS.swap(true, Ordering::Relaxed) {
            info!("Loaded system PDFium library");
        }
        return Ok(Pdfium::new(bindings));
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(bindings) = Pdfium::bind_to_library("/usr/local/lib/libpdfium.dylib") {
            return Ok(Pdfium::new(bindings));
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(bindings) = Pdfium::bind_to_library("libpdfium.so") {
            return Ok(Pdfium::new(bindings));
        }
    }

    Err(PdfError::InitError(
        "Could not load the PDFium library. Install libpdfium or place it next to the executable."
            .to_string(),
    ))
}

fn load_document<'a>(pdfium: &'a Pdfium, bytes: &'a [u8]) -> Result<PdfDocument<'a>, PdfError> {
    pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| match e {
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
                PdfError::Encrypted
            }
            other => PdfError::LoadError(other.to_string()),
        })
}

fn load_page<'a>(doc: &PdfDocument<'a>, page_index: u32) -> Result<PdfPage<'a>, PdfError> {
    let index = u16::try_from(page_index).map_err(|_| PdfError::InvalidPage(page_index))?;
    doc.pages()
        .get(index)
        .map_err(|_| PdfError::InvalidPage(page_index))
}

fn rotation_degrees(page: &PdfPage) -> i32 {
    match page.rotation() {
        Ok(PdfPageRenderRotation::None) | Err(_) => 0,
        Ok(PdfPageRenderRotation::Degrees90) => 90,
        Ok(PdfPageRenderRotation::Degrees180) => 180,
        Ok(PdfPageRenderRotation::Degrees270) => 270,
    }
}

/// Height of the page before `/Rotate` is applied. Character and annotation
/// boxes are reported in this space.
fn unrotated_height(page: &PdfPage) -> f32 {
    match rotation_degrees(page) {
        90 | 270 => page.width().value,
        _ => page.height().value,
    }
}

/// PDF coordinates are bottom-up; flip to top-down points.
fn to_page_rect(rect: &PdfRect, page_height: f32) -> PageRect {
    PageRect::new(
        rect.left().value,
        page_height - rect.top().value,
        rect.width().value,
        rect.height().value,
    )
}

fn annotation_kind(kind: PdfPageAnnotationType) -> AnnotationKind {
    match kind {
        PdfPageAnnotationType::Link => AnnotationKind::Link,
        PdfPageAnnotationType::Widget => AnnotationKind::Widget,
        PdfPageAnnotationType::Text => AnnotationKind::Text,
        PdfPageAnnotationType::FreeText => AnnotationKind::FreeText,
        PdfPageAnnotationType::Highlight => AnnotationKind::Highlight,
        PdfPageAnnotationType::Underline => AnnotationKind::Underline,
        PdfPageAnnotationType::Strikeout => AnnotationKind::StrikeOut,
        PdfPageAnnotationType::Ink => AnnotationKind::Ink,
        PdfPageAnnotationType::Popup => AnnotationKind::Popup,
        _ => AnnotationKind::Other,
    }
}

impl PdfEngine for PdfiumEngine {
    fn open(&self, bytes: &[u8]) -> Result<DocumentInfo, PdfError> {
        let pdfium = bind_pdfium()?;
        let doc = load_document(&pdfium, bytes)?;

        let metadata = doc.metadata();
        let title = metadata
            .get(PdfDocumentMetadataTagType::Title)
            .map(|t| t.value().to_string());
        let author = metadata
            .get(PdfDocumentMetadataTagType::Author)
            .map(|t| t.value().to_string());

        Ok(DocumentInfo {
            page_count: doc.pages().len() as u32,
            title,
            author,
            pdf_version: format!("{:?}", doc.version()),
        })
    }

    fn page_info(&self, bytes: &[u8], page_index: u32) -> Result<PageInfo, PdfError> {
        let pdfium = bind_pdfium()?;
        let doc = load_document(&pdfium, bytes)?;
        let page = load_page(&doc, page_index)?;

        Ok(PageInfo {
            index: page_index,
            width: page.width().value,
            height: page.height().value,
            rotation: rotation_degrees(&page),
        })
    }

    fn rasterize(
        &self,
        bytes: &[u8],
        page_index: u32,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, PdfError> {
        let pdfium = bind_pdfium()?;
        let doc = load_document(&pdfium, bytes)?;
        let page = load_page(&doc, page_index)?;

        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32)
            .render_form_data(true)
            .render_annotations(true);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| PdfError::RenderError(e.to_string()))?;

        let (rendered_width, rendered_height) = (bitmap.width() as u32, bitmap.height() as u32);
        let image = RgbaImage::from_raw(rendered_width, rendered_height, bitmap.as_rgba_bytes())
            .ok_or_else(|| PdfError::RenderError("bitmap size mismatch".to_string()))?;

        if (rendered_width, rendered_height) == (width, height) {
            Ok(image)
        } else {
            debug!(
                "PDFium returned {}x{} for a {}x{} viewport, resampling",
                rendered_width, rendered_height, width, height
            );
            Ok(imageops::resize(&image, width, height, FilterType::Triangle))
        }
    }

    fn text_content(&self, bytes: &[u8], page_index: u32) -> Result<Vec<CharRect>, PdfError> {
        let pdfium = bind_pdfium()?;
        let doc = load_document(&pdfium, bytes)?;
        let page = load_page(&doc, page_index)?;

        let text_page = page
            .text()
            .map_err(|e| PdfError::TextError(e.to_string()))?;

        let page_height = unrotated_height(&page);
        let mut rects = Vec::new();

        for (i, char_obj) in text_page.chars().iter().enumerate() {
            let Some(char_str) = char_obj.unicode_string() else {
                continue;
            };
            // Line breaks and tabs carry no meaningful bounds
            if char_str
                .chars()
                .next()
                .is_some_and(|c| c.is_whitespace() && c != ' ')
            {
                continue;
            }
            if let Ok(rect) = char_obj.tight_bounds() {
                rects.push(CharRect {
                    char: char_str,
                    index: i,
                    bounds: to_page_rect(&rect, page_height),
                });
            }
        }

        Ok(rects)
    }

    fn annotations(
        &self,
        bytes: &[u8],
        page_index: u32,
    ) -> Result<Vec<EmbeddedAnnotation>, PdfError> {
        let pdfium = bind_pdfium()?;
        let doc = load_document(&pdfium, bytes)?;
        let page = load_page(&doc, page_index)?;

        let page_height = unrotated_height(&page);
        let mut annotations = Vec::new();

        for annotation in page.annotations().iter() {
            let bounds = match annotation.bounds() {
                Ok(bounds) => bounds,
                Err(e) => {
                    debug!("Skipping annotation without bounds on page {}: {}", page_index, e);
                    continue;
                }
            };
            annotations.push(EmbeddedAnnotation {
                kind: annotation_kind(annotation.annotation_type()),
                bounds: to_page_rect(&bounds, page_height),
                contents: annotation.contents(),
            });
        }

        Ok(annotations)
    }
}

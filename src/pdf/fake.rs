//! Scripted engine for tests.

use super::engine::{
    AnnotationKind, CharRect, DocumentInfo, EmbeddedAnnotation, PageInfo, PageRect, PdfEngine,
    PdfError,
};
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;
pub const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailAt {
    PageInfo,
    Raster,
    Text,
    Annotations,
}

/// Engine whose documents are the byte string `FAKE:<pages>`.
///
/// Every page is US Letter unless overridden, rasters to plain paper with a
/// one-pixel marker row whose red channel is the page number, carries the
/// text `Page <n>` and one link annotation.
#[derive(Default)]
pub struct FakeEngine {
    sizes: HashMap<u32, (f32, f32)>,
    rotations: HashMap<u32, i32>,
    raster_delays: HashMap<u32, Duration>,
    failures: Mutex<HashMap<(u32, FailAt), String>>,
    calls: Mutex<Vec<(u32, u32, u32)>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(pages: u32) -> Vec<u8> {
        format!("FAKE:{}", pages).into_bytes()
    }

    pub fn with_page_size(mut self, page_index: u32, width: f32, height: f32) -> Self {
        self.sizes.insert(page_index, (width, height));
        self
    }

    /// Rotate a page. Text and annotation boxes stay in unrotated space.
    pub fn with_rotation(mut self, page_index: u32, degrees: i32) -> Self {
        self.rotations.insert(page_index, degrees);
        self
    }

    pub fn with_raster_delay(mut self, page_index: u32, delay: Duration) -> Self {
        self.raster_delays.insert(page_index, delay);
        self
    }

    pub fn fail(&self, page_index: u32, at: FailAt, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert((page_index, at), message.to_string());
    }

    /// `(page_index, width, height)` of every raster call, in call order.
    pub fn raster_calls(&self) -> Vec<(u32, u32, u32)> {
        self.calls.lock().unwrap().clone()
    }

    fn page_count(bytes: &[u8]) -> Result<u32, PdfError> {
        std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.strip_prefix("FAKE:"))
            .and_then(|n| n.trim().parse().ok())
            .ok_or_else(|| PdfError::LoadError("not a fake document".to_string()))
    }

    fn check(&self, bytes: &[u8], page_index: u32, at: FailAt) -> Result<(), PdfError> {
        if page_index >= Self::page_count(bytes)? {
            return Err(PdfError::InvalidPage(page_index));
        }
        if let Some(message) = self.failures.lock().unwrap().get(&(page_index, at)) {
            return Err(match at {
                FailAt::PageInfo | FailAt::Raster => PdfError::RenderError(message.clone()),
                FailAt::Text => PdfError::TextError(message.clone()),
                FailAt::Annotations => PdfError::AnnotationError(message.clone()),
            });
        }
        Ok(())
    }

    fn size(&self, page_index: u32) -> (f32, f32) {
        self.sizes
            .get(&page_index)
            .copied()
            .unwrap_or((PAGE_WIDTH, PAGE_HEIGHT))
    }
}

impl PdfEngine for FakeEngine {
    fn open(&self, bytes: &[u8]) -> Result<DocumentInfo, PdfError> {
        if bytes.starts_with(b"LOCKED") {
            return Err(PdfError::Encrypted);
        }
        Ok(DocumentInfo {
            page_count: Self::page_count(bytes)?,
            title: Some("Fake".to_string()),
            author: None,
            pdf_version: "Pdf1_7".to_string(),
        })
    }

    fn page_info(&self, bytes: &[u8], page_index: u32) -> Result<PageInfo, PdfError> {
        self.check(bytes, page_index, FailAt::PageInfo)?;
        let (width, height) = self.size(page_index);
        let rotation = self.rotations.get(&page_index).copied().unwrap_or(0);
        let (width, height) = match rotation.rem_euclid(360) {
            90 | 270 => (height, width),
            _ => (width, height),
        };
        Ok(PageInfo {
            index: page_index,
            width,
            height,
            rotation,
        })
    }

    fn rasterize(
        &self,
        bytes: &[u8],
        page_index: u32,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, PdfError> {
        if let Some(delay) = self.raster_delays.get(&page_index) {
            std::thread::sleep(*delay);
        }
        self.calls.lock().unwrap().push((page_index, width, height));
        self.check(bytes, page_index, FailAt::Raster)?;

        let mut image = RgbaImage::from_pixel(width, height, PAPER);
        let marker = Rgba([(page_index + 1) as u8, 0, 0, 255]);
        for x in 0..width {
            image.put_pixel(x, height - 1, marker);
        }
        Ok(image)
    }

    fn text_content(&self, bytes: &[u8], page_index: u32) -> Result<Vec<CharRect>, PdfError> {
        self.check(bytes, page_index, FailAt::Text)?;
        let text = format!("Page {}", page_index + 1);
        Ok(text
            .chars()
            .enumerate()
            .map(|(i, c)| CharRect {
                char: c.to_string(),
                index: i,
                bounds: PageRect::new(72.0 + 6.0 * i as f32, 72.0, 6.0, 12.0),
            })
            .collect())
    }

    fn annotations(
        &self,
        bytes: &[u8],
        page_index: u32,
    ) -> Result<Vec<EmbeddedAnnotation>, PdfError> {
        self.check(bytes, page_index, FailAt::Annotations)?;
        Ok(vec![EmbeddedAnnotation {
            kind: AnnotationKind::Link,
            bounds: PageRect::new(100.0, 200.0, 50.0, 20.0),
            contents: None,
        }])
    }
}

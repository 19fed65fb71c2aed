//! The three stacked visual surfaces of a page.
//!
//! The raster surface is opaque; the text and annotation overlays are laid out
//! in the same device space on top of it, using the frame of the render that
//! wrote them.

use crate::markup::{draw_markup, AnnotationRecord, MarkupStyle};
use crate::pdf::{AnnotationKind, CharRect, EmbeddedAnnotation};
use crate::viewport::{DeviceRect, RenderFrame};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Raster,
    Text,
    Annotations,
    Markup,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Raster => "raster",
            Stage::Text => "text",
            Stage::Annotations => "annotations",
            Stage::Markup => "markup",
        };
        f.write_str(name)
    }
}

/// Opaque page pixels.
#[derive(Debug, Default)]
pub struct RasterSurface {
    frame: Option<RenderFrame>,
    image: Option<RgbaImage>,
}

impl RasterSurface {
    pub fn frame(&self) -> Option<&RenderFrame> {
        self.frame.as_ref()
    }

    pub fn image(&self) -> Option<&RgbaImage> {
        self.image.as_ref()
    }

    /// Size the surface to the frame's viewport and take the new pixels.
    pub fn replace(&mut self, frame: RenderFrame, image: RgbaImage) {
        self.frame = Some(frame);
        self.image = Some(image);
    }

    pub fn draw_markup(&mut self, records: &[AnnotationRecord], style: &MarkupStyle) {
        if let Some(image) = self.image.as_mut() {
            draw_markup(image, records, style);
        }
    }

    pub fn clear(&mut self) {
        self.frame = None;
        self.image = None;
    }
}

/// One positioned run of text on a single line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    pub rect: DeviceRect,
    /// Font size in device pixels
    pub font_size: f32,
    /// 1-based page the span belongs to
    pub page_number: u32,
}

/// Points tolerance for "same line"
const LINE_TOLERANCE: f32 = 2.0;

/// Transparent, selectable text positioned over the raster.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TextOverlay {
    pub width: u32,
    pub height: u32,
    pub scale_factor: f32,
    pub spans: Vec<TextSpan>,
}

impl TextOverlay {
    /// Replace the overlay with `chars` laid out for `frame`.
    pub fn layout(&mut self, frame: &RenderFrame, chars: &[CharRect]) {
        self.clear();
        let viewport = &frame.viewport;
        self.width = viewport.width;
        self.height = viewport.height;
        self.scale_factor = viewport.scale;

        for run in group_runs(chars) {
            let rect = viewport.to_device(&run.bounds);
            self.spans.push(TextSpan {
                text: run.text,
                font_size: rect.height,
                rect,
                page_number: frame.page_number,
            });
        }
    }

    /// Text of the spans touching `area`, one line per row of spans.
    pub fn text_in(&self, area: &DeviceRect) -> String {
        let mut lines: Vec<(f32, String)> = Vec::new();
        for span in self.spans.iter().filter(|s| s.rect.intersects(area)) {
            match lines.last_mut() {
                Some((y, line)) if (span.rect.y - *y).abs() < LINE_TOLERANCE * self.scale_factor => {
                    line.push(' ');
                    line.push_str(&span.text);
                }
                _ => lines.push((span.rect.y, span.text.clone())),
            }
        }
        lines
            .into_iter()
            .map(|(_, line)| line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&mut self) {
        self.spans.clear();
    }
}

struct TextRun {
    text: String,
    bounds: crate::pdf::PageRect,
}

/// Whether `ch` continues `run`: same line, and no wider than about one
/// character away from its right edge.
fn continues(run: &TextRun, ch: &CharRect) -> bool {
    if (ch.bounds.y - run.bounds.y).abs() >= LINE_TOLERANCE {
        return false;
    }
    // Tight bounds of a space can be zero wide
    let limit = ch.bounds.width.max(run.bounds.height * 0.5);
    (ch.bounds.x - run.bounds.right()).abs() <= limit
}

/// Merge characters into runs, breaking on line changes and column gaps.
fn group_runs(chars: &[CharRect]) -> Vec<TextRun> {
    let mut runs: Vec<TextRun> = Vec::new();

    for ch in chars {
        match runs.last_mut() {
            Some(run) if continues(run, ch) => {
                let right = run.bounds.right().max(ch.bounds.right());
                let bottom = run.bounds.bottom().max(ch.bounds.bottom());
                run.bounds.x = run.bounds.x.min(ch.bounds.x);
                run.bounds.y = run.bounds.y.min(ch.bounds.y);
                run.bounds.width = right - run.bounds.x;
                run.bounds.height = bottom - run.bounds.y;
                run.text.push_str(&ch.char);
            }
            _ => runs.push(TextRun {
                text: ch.char.clone(),
                bounds: ch.bounds,
            }),
        }
    }

    runs
}

/// One embedded annotation placed on the overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationElement {
    pub kind: AnnotationKind,
    pub rect: DeviceRect,
    pub contents: Option<String>,
}

/// Embedded annotations laid over the page.
///
/// Form widgets are shown but never accept input, and the overlay lets
/// pointer events through to the markup layer.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AnnotationOverlay {
    pub width: u32,
    pub height: u32,
    pub scale_factor: f32,
    pub pointer_events: bool,
    pub interactive_forms: bool,
    pub elements: Vec<AnnotationElement>,
}

impl AnnotationOverlay {
    pub fn layout(&mut self, frame: &RenderFrame, annotations: &[EmbeddedAnnotation]) {
        self.clear();
        let viewport = &frame.viewport;
        self.width = viewport.width;
        self.height = viewport.height;
        self.scale_factor = viewport.scale;
        self.pointer_events = false;
        self.interactive_forms = false;

        self.elements = annotations
            .iter()
            .map(|annotation| AnnotationElement {
                kind: annotation.kind,
                rect: viewport.to_device(&annotation.bounds),
                contents: annotation.contents.clone(),
            })
            .collect();
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }
}

/// Everything the page renderer writes.
#[derive(Debug, Default)]
pub struct Surfaces {
    pub raster: RasterSurface,
    pub text: TextOverlay,
    pub annotations: AnnotationOverlay,
    composition: Vec<Stage>,
}

impl Surfaces {
    /// Stages that have written the displayed raster, in order.
    pub fn composition(&self) -> &[Stage] {
        &self.composition
    }

    /// Page shown by the raster surface.
    pub fn displayed_page(&self) -> Option<u32> {
        self.raster.frame().map(|frame| frame.page_number)
    }

    pub(crate) fn record(&mut self, stage: Stage) {
        if stage == Stage::Raster {
            self.composition.clear();
        }
        self.composition.push(stage);
    }

    pub fn clear(&mut self) {
        self.raster.clear();
        self.text = TextOverlay::default();
        self.annotations = AnnotationOverlay::default();
        self.composition.clear();
    }
}

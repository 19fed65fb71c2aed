//! User-drawn rectangle markup.
//!
//! Markup lives only in memory for the currently opened document. Records are
//! appended when a pointer gesture completes and are stroked onto the raster
//! surface, in insertion order, at the end of every render pass.

use crate::viewport::DeviceRect;
use image::{Pixel, Rgba, RgbaImage};
use log::debug;
use serde::{Deserialize, Serialize};

/// A finished markup rectangle in device-pixel page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl AnnotationRecord {
    pub fn rect(&self) -> DeviceRect {
        DeviceRect::new(self.x, self.y, self.width, self.height)
    }
}

impl From<DeviceRect> for AnnotationRecord {
    fn from(rect: DeviceRect) -> Self {
        Self {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        }
    }
}

/// Stroke used for every markup rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkupStyle {
    /// RGBA stroke color
    pub color: [u8; 4],
    /// Stroke width in pixels, centered on the rectangle edge
    pub line_width: f32,
}

impl Default for MarkupStyle {
    fn default() -> Self {
        Self {
            color: [255, 0, 0, 255],
            line_width: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Gesture {
    start: (f32, f32),
    current: (f32, f32),
}

/// Pointer gesture capture plus the ordered record sequence.
#[derive(Debug, Default)]
pub struct MarkupLayer {
    records: Vec<AnnotationRecord>,
    gesture: Option<Gesture>,
}

impl MarkupLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a gesture. A gesture still in progress is abandoned.
    pub fn pointer_down(&mut self, x: f32, y: f32) {
        self.gesture = Some(Gesture {
            start: (x, y),
            current: (x, y),
        });
    }

    /// Track the live rectangle. Ignored when no gesture is active.
    pub fn pointer_move(&mut self, x: f32, y: f32) -> Option<DeviceRect> {
        let gesture = self.gesture.as_mut()?;
        gesture.current = (x, y);
        Some(DeviceRect::from_corners(gesture.start, gesture.current))
    }

    /// Finish the gesture and append its record.
    pub fn pointer_up(&mut self, x: f32, y: f32) -> Option<AnnotationRecord> {
        let gesture = self.gesture.take()?;
        let record = AnnotationRecord::from(DeviceRect::from_corners(gesture.start, (x, y)));
        debug!("Markup record #{} {:?}", self.records.len() + 1, record);
        self.records.push(record);
        Some(record)
    }

    /// Rectangle of the gesture in progress, for preview only.
    pub fn live_rect(&self) -> Option<DeviceRect> {
        self.gesture
            .map(|gesture| DeviceRect::from_corners(gesture.start, gesture.current))
    }

    pub fn is_drawing(&self) -> bool {
        self.gesture.is_some()
    }

    pub fn records(&self) -> &[AnnotationRecord] {
        &self.records
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.gesture = None;
    }
}

/// Stroke every record onto the raster, in order.
pub fn draw_markup(image: &mut RgbaImage, records: &[AnnotationRecord], style: &MarkupStyle) {
    for record in records {
        stroke_rect(image, &record.rect(), style);
    }
}

/// Stroke the outline of `rect`, like a canvas `strokeRect`.
pub fn stroke_rect(image: &mut RgbaImage, rect: &DeviceRect, style: &MarkupStyle) {
    let half = style.line_width / 2.0;
    let color = Rgba(style.color);
    let (left, top, right, bottom) = (rect.x, rect.y, rect.right(), rect.bottom());

    fill_band(image, left - half, top - half, right + half, top + half, color);
    fill_band(image, left - half, bottom - half, right + half, bottom + half, color);
    fill_band(image, left - half, top - half, left + half, bottom + half, color);
    fill_band(image, right - half, top - half, right + half, bottom + half, color);
}

/// Paint pixels whose centers fall inside `[x0, x1] x [y0, y1]`.
fn fill_band(image: &mut RgbaImage, x0: f32, y0: f32, x1: f32, y1: f32, color: Rgba<u8>) {
    let Some((px0, px1)) = pixel_span(x0, x1, image.width()) else {
        return;
    };
    let Some((py0, py1)) = pixel_span(y0, y1, image.height()) else {
        return;
    };

    for py in py0..=py1 {
        for px in px0..=px1 {
            image.get_pixel_mut(px, py).blend(&color);
        }
    }
}

fn pixel_span(from: f32, to: f32, extent: u32) -> Option<(u32, u32)> {
    if extent == 0 || !from.is_finite() || !to.is_finite() {
        return None;
    }
    let first = (from - 0.5).ceil().max(0.0);
    let last = (to - 0.5).floor().min((extent - 1) as f32);
    (first <= last).then_some((first as u32, last as u32))
}

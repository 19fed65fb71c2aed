//! Page viewport and the per-render frame shared by all stages.

use crate::pdf::{PageInfo, PageRect};
use serde::{Deserialize, Serialize};

/// A rectangle in device pixels, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl DeviceRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle spanning two corner points in any order.
    pub fn from_corners(a: (f32, f32), b: (f32, f32)) -> Self {
        Self {
            x: a.0.min(b.0),
            y: a.1.min(b.1),
            width: (a.0 - b.0).abs(),
            height: (a.1 - b.1).abs(),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Overlap test that treats touching edges as intersecting.
    pub fn intersects(&self, other: &DeviceRect) -> bool {
        self.x <= other.right()
            && other.x <= self.right()
            && self.y <= other.bottom()
            && other.y <= self.bottom()
    }
}

/// Pixel-space transform for one page at one zoom factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Zoom factor (1.0 = 72 DPI)
    pub scale: f32,
    /// Page width in PDF points
    pub page_width: f32,
    /// Page height in PDF points
    pub page_height: f32,
    /// Surface width in pixels
    pub width: u32,
    /// Surface height in pixels
    pub height: u32,
    /// Clockwise degrees, applied by `to_device`
    pub rotation: i32,
}

impl Viewport {
    pub fn new(page: &PageInfo, scale: f32) -> Self {
        Self {
            scale,
            page_width: page.width,
            page_height: page.height,
            width: scaled_extent(page.width, scale),
            height: scaled_extent(page.height, scale),
            rotation: page.rotation,
        }
    }

    /// Map a box in unrotated page points onto the displayed surface.
    pub fn to_device(&self, rect: &PageRect) -> DeviceRect {
        let rotated = DeviceRect::from_corners(
            self.rotate(rect.x, rect.y),
            self.rotate(rect.right(), rect.bottom()),
        );
        DeviceRect {
            x: rotated.x * self.scale,
            y: rotated.y * self.scale,
            width: rotated.width * self.scale,
            height: rotated.height * self.scale,
        }
    }

    /// Clockwise `/Rotate` applied to a top-down point. `page_width` and
    /// `page_height` are the displayed extents.
    fn rotate(&self, x: f32, y: f32) -> (f32, f32) {
        match self.rotation.rem_euclid(360) {
            90 => (self.page_width - y, x),
            180 => (self.page_width - x, self.page_height - y),
            270 => (y, self.page_height - x),
            _ => (x, y),
        }
    }
}

fn scaled_extent(points: f32, scale: f32) -> u32 {
    let pixels = (points * scale).floor();
    if pixels.is_finite() && pixels >= 1.0 {
        pixels as u32
    } else {
        1
    }
}

/// Identifies one render request. Later requests have larger ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RenderId(pub u64);

/// The viewport computed once per render request and handed to every stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderFrame {
    pub id: RenderId,
    /// 1-based page number
    pub page_number: u32,
    pub viewport: Viewport,
}

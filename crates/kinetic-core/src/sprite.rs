//! Geometry-only collision between sprites.
//!
//! Used for entities without a physics body. Rectangles come from the
//! renderer in device coordinates and are converted to world coordinates
//! with the world's global scale before testing. An explicit hit area (in
//! world units) replaces the visual size of a sprite.

use serde::{Deserialize, Serialize};

use crate::entity::Size;

/// An axis-aligned rectangle anchored at its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Whether the rectangles intersect. Touching edges count.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x + self.width >= other.x
            && other.x + other.width >= self.x
            && self.y + self.height >= other.y
            && other.y + other.height >= self.y
    }

    /// Area of the intersection, or 0 when the rectangles do not intersect.
    pub fn overlap_area(&self, other: &Rect) -> f64 {
        if !self.intersects(other) {
            return 0.0;
        }
        let dx = (self.x + self.width).min(other.x + other.width) - self.x.max(other.x);
        let dy = (self.y + self.height).min(other.y + other.height) - self.y.max(other.y);
        dx * dy
    }
}

/// A sprite's collision input: its display bounds and optional hit area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hitbox {
    /// Display bounds in device coordinates.
    pub bounds: Rect,
    /// Explicit hit area in world units. Zero-sized areas are ignored.
    pub hit_area: Option<Size>,
}

impl From<Rect> for Hitbox {
    fn from(bounds: Rect) -> Self {
        Self {
            bounds,
            hit_area: None,
        }
    }
}

/// Tests sprite rectangles for overlap under a global device-to-world scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteCollisionDetector {
    scale: f64,
}

impl Default for SpriteCollisionDetector {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

impl SpriteCollisionDetector {
    /// Create a detector. A non-positive or non-finite scale falls back to 1.
    pub fn new(scale: f64) -> Self {
        if scale.is_finite() && scale > 0.0 {
            Self { scale }
        } else {
            tracing::warn!(scale, "invalid sprite collision scale, using 1.0");
            Self::default()
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// The world-space rectangle used for testing `hitbox`.
    pub fn world_rect(&self, hitbox: &Hitbox) -> Rect {
        let b = hitbox.bounds;
        let (width, height) = match hitbox.hit_area {
            Some(area) if area.width > 0.0 && area.height > 0.0 => (area.width, area.height),
            _ => (b.width / self.scale, b.height / self.scale),
        };
        Rect::new(b.x / self.scale, b.y / self.scale, width, height)
    }

    pub fn is_colliding(&self, a: &Hitbox, b: &Hitbox) -> bool {
        self.world_rect(a).intersects(&self.world_rect(b))
    }

    pub fn overlapping_area(&self, a: &Hitbox, b: &Hitbox) -> f64 {
        self.world_rect(a).overlap_area(&self.world_rect(b))
    }
}

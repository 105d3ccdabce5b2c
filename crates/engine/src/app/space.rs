use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Vec2) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Axis-aligned world rectangle. `min` is the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn new(a: Vec2, b: Vec2) -> Self {
        Self {
            min: Vec2::new(a.x.min(b.x), a.y.min(b.y)),
            max: Vec2::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    pub fn from_center(center: Vec2, half_extents: Vec2) -> Self {
        let half = Vec2::new(half_extents.x.abs(), half_extents.y.abs());
        Self {
            min: Vec2::new(center.x - half.x, center.y - half.y),
            max: Vec2::new(center.x + half.x, center.y + half.y),
        }
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
        )
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }
}

/// Walkable span of a room's floor line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloorBounds {
    pub min_x: f32,
    pub max_x: f32,
}

impl FloorBounds {
    pub fn new(a: f32, b: f32) -> Self {
        Self {
            min_x: a.min(b),
            max_x: a.max(b),
        }
    }

    pub fn center_x(&self) -> f32 {
        (self.min_x + self.max_x) * 0.5
    }

    pub fn contains_x(&self, x: f32) -> bool {
        x >= self.min_x && x <= self.max_x
    }

    /// Clamps into the bounds shrunk by `inset` on both sides. Falls back to the
    /// raw bounds when the inset would invert them.
    pub fn clamp_x(&self, x: f32, inset: f32) -> f32 {
        let inset = inset.max(0.0);
        let inner_min = self.min_x + inset;
        let inner_max = self.max_x - inset;
        if inner_min <= inner_max {
            x.clamp(inner_min, inner_max)
        } else {
            x.clamp(self.min_x, self.max_x)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_walk_clamp_limits_to_floor_edge() {
        let bounds = FloorBounds::new(-5.0, 5.0);
        assert_eq!(bounds.clamp_x(100.0, 0.0), 5.0);
        assert_eq!(bounds.clamp_x(-100.0, 0.0), -5.0);
        assert_eq!(bounds.clamp_x(1.5, 0.0), 1.5);
    }

    #[test]
    fn clamp_applies_inset_unless_it_inverts_bounds() {
        let wide = FloorBounds::new(-5.0, 5.0);
        assert_eq!(wide.clamp_x(100.0, 0.5), 4.5);

        let narrow = FloorBounds::new(0.0, 0.6);
        assert_eq!(narrow.clamp_x(100.0, 0.5), 0.6);
    }

    #[test]
    fn rect_normalizes_corners_and_contains_edges() {
        let rect = Rect::new(Vec2::new(2.0, 3.0), Vec2::new(-2.0, -1.0));
        assert_eq!(rect.min, Vec2::new(-2.0, -1.0));
        assert!(rect.contains(Vec2::new(2.0, 3.0)));
        assert!(!rect.contains(Vec2::new(2.1, 0.0)));
        assert_eq!(rect.center(), Vec2::new(0.0, 1.0));
    }
}

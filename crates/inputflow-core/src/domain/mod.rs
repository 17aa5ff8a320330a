//! Display topology domain entities.
//!
//! This module contains pure logic with no OS dependencies: the physical and
//! logical display model, the windows each logical display owns, and the
//! [`WindowStateManager`](topology::WindowStateManager) that validates and
//! applies topology updates and transforms coordinates across the graph.
//!
//! # Three coordinate spaces (for beginners)
//!
//! - **Physical display space**: one panel's own surface, origin at its
//!   top-left, measured in that panel's logical (DPI-scaled) units.
//! - **Physical global space**: every panel laid out side by side.  A panel
//!   that names a `left_display_id` sits directly to the right of that panel,
//!   one that names an `up_display_id` sits directly below it.
//! - **Logical display space**: rectangles carved out of the global space.
//!   Windows live here, and every outgoing pointer event carries both its global
//!   and its logical-local position.

use serde::{Deserialize, Serialize};

pub mod display;
pub mod topology;
pub mod window;

/// An axis-aligned rectangle.  `x`/`y` is the top-left corner; right and
/// bottom edges are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns the rightmost X coordinate (exclusive).
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Returns the bottommost Y coordinate (exclusive).
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Clamps a point into the rectangle.
    pub fn clamp(&self, px: i32, py: i32) -> (i32, i32) {
        (
            px.clamp(self.x, (self.right() - 1).max(self.x)),
            py.clamp(self.y, (self.bottom() - 1).max(self.y)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_contains_excludes_right_and_bottom_edges() {
        let r = Rect::new(10, 20, 100, 50);
        assert!(r.contains(10, 20));
        assert!(r.contains(109, 69));
        assert!(!r.contains(110, 20));
        assert!(!r.contains(10, 70));
        assert!(!r.contains(9, 20));
    }

    #[test]
    fn test_rect_clamp_pulls_point_onto_last_pixel() {
        let r = Rect::new(0, 0, 1920, 1080);
        assert_eq!(r.clamp(-5, 2000), (0, 1079));
        assert_eq!(r.clamp(3000, 500), (1919, 500));
    }

    #[test]
    fn test_rect_center_is_half_extent_from_origin() {
        assert_eq!(Rect::new(100, 0, 200, 100).center(), (200, 50));
    }
}

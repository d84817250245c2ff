//! Grid and angle snapping.

use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Default grid spacing in canvas units.
pub const GRID_SIZE: f64 = 20.0;

/// Angle snap increment for shift-constrained rotation and lines.
pub const ANGLE_SNAP_INCREMENT: f64 = std::f64::consts::PI / 12.0;

/// Per-client grid configuration, persisted with the local snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSettings {
    pub enabled: bool,
    pub size: f64,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            size: GRID_SIZE,
        }
    }
}

impl GridSettings {
    /// Snap `point` when the grid is enabled.
    pub fn snap(&self, point: Point) -> Point {
        if self.enabled {
            snap_to_grid(point, self.size)
        } else {
            point
        }
    }

    /// Snap a length when the grid is enabled.
    pub fn snap_length(&self, value: f64) -> f64 {
        if self.enabled && self.size > 0.0 {
            (value / self.size).round() * self.size
        } else {
            value
        }
    }
}

/// Round a point to the nearest grid intersection.
pub fn snap_to_grid(point: Point, grid_size: f64) -> Point {
    if grid_size <= 0.0 {
        return point;
    }
    Point::new(
        (point.x / grid_size).round() * grid_size,
        (point.y / grid_size).round() * grid_size,
    )
}

/// Round an angle in radians to the nearest multiple of `increment`.
pub fn snap_angle(angle: f64, increment: f64) -> f64 {
    (angle / increment).round() * increment
}

/// Snap the direction of `start -> end` to [`ANGLE_SNAP_INCREMENT`] steps,
/// preserving its length.
pub fn snap_line_endpoint(start: Point, end: Point) -> Point {
    let delta = end - start;
    let distance = delta.hypot();
    if distance < 0.001 {
        return end;
    }
    let angle = snap_angle(delta.y.atan2(delta.x), ANGLE_SNAP_INCREMENT);
    Point::new(start.x + distance * angle.cos(), start.y + distance * angle.sin())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snap_to_grid() {
        let p = snap_to_grid(Point::new(29.0, -11.0), 20.0);
        assert_eq!(p, Point::new(20.0, -20.0));
    }

    #[test]
    fn test_disabled_grid_is_identity() {
        let grid = GridSettings::default();
        let p = Point::new(13.0, 7.0);
        assert_eq!(grid.snap(p), p);
        assert_eq!(grid.snap_length(13.0), 13.0);

        let grid = GridSettings { enabled: true, size: 10.0 };
        assert_eq!(grid.snap(p), Point::new(10.0, 10.0));
        assert_eq!(grid.snap_length(16.0), 20.0);
    }

    #[test]
    fn test_snap_line_endpoint_to_horizontal() {
        let end = snap_line_endpoint(Point::ZERO, Point::new(100.0, 5.0));
        assert!((end.y).abs() < 1e-9);
        assert!((end.x - (100.0f64.powi(2) + 25.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_snap_angle_steps() {
        let snapped = snap_angle(0.3, ANGLE_SNAP_INCREMENT);
        assert!((snapped - ANGLE_SNAP_INCREMENT).abs() < 1e-12);
    }
}

//! Viewport pan/zoom state.

use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

use crate::geometry;

pub const MIN_ZOOM: f64 = 0.1;
pub const MAX_ZOOM: f64 = 10.0;

/// Camera manages the view transform for the canvas.
///
/// `scroll` is the screen position of the canvas origin, so
/// `canvas = (screen - scroll) / zoom`. Zoom is clamped here, not in the
/// geometry kernel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Camera {
    pub scroll: Vec2,
    pub zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            scroll: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canvas-to-screen transform for the rendering backend.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.scroll) * Affine::scale(self.zoom)
    }

    pub fn screen_to_canvas(&self, screen: Point) -> Point {
        geometry::screen_to_canvas(screen, self.scroll, self.zoom)
    }

    pub fn canvas_to_screen(&self, canvas: Point) -> Point {
        geometry::canvas_to_screen(canvas, self.scroll, self.zoom)
    }

    /// Pan by a delta in screen coordinates.
    pub fn pan(&mut self, delta: Vec2) {
        self.scroll += delta;
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }

    /// Zoom by `factor`, keeping the canvas point under `screen_point` fixed.
    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) {
        let new_zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        if (new_zoom - self.zoom).abs() < f64::EPSILON {
            return;
        }
        let anchor = self.screen_to_canvas(screen_point);
        self.zoom = new_zoom;
        let moved = self.canvas_to_screen(anchor);
        self.scroll += screen_point - moved;
    }

    /// Put `canvas_point` at the centre of a viewport of `viewport` size.
    pub fn center_on(&mut self, canvas_point: Point, viewport: Size) {
        let center = Point::new(viewport.width / 2.0, viewport.height / 2.0);
        self.scroll = Vec2::new(
            center.x - canvas_point.x * self.zoom,
            center.y - canvas_point.y * self.zoom,
        );
    }

    /// Fit `bounds` into the viewport with `padding` screen pixels on each side.
    pub fn fit_to_bounds(&mut self, bounds: Rect, viewport: Size, padding: f64) {
        if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
            self.center_on(bounds.center(), viewport);
            return;
        }
        let avail = Size::new(
            (viewport.width - padding * 2.0).max(1.0),
            (viewport.height - padding * 2.0).max(1.0),
        );
        let zoom = (avail.width / bounds.width()).min(avail.height / bounds.height());
        self.set_zoom(zoom);
        self.center_on(bounds.center(), viewport);
    }

    /// Canvas-space rectangle currently visible.
    pub fn visible_rect(&self, viewport: Size) -> Rect {
        Rect::from_points(
            self.screen_to_canvas(Point::ZERO),
            self.screen_to_canvas(Point::new(viewport.width, viewport.height)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_camera_is_identity() {
        let camera = Camera::new();
        let p = Point::new(100.0, 200.0);
        assert_eq!(camera.screen_to_canvas(p), p);
    }

    #[test]
    fn test_scroll_and_zoom() {
        let camera = Camera {
            scroll: Vec2::new(50.0, 100.0),
            zoom: 2.0,
        };
        let canvas = camera.screen_to_canvas(Point::new(150.0, 300.0));
        assert_eq!(canvas, Point::new(50.0, 100.0));
        assert_eq!(camera.canvas_to_screen(canvas), Point::new(150.0, 300.0));
        assert_eq!(camera.transform() * canvas, Point::new(150.0, 300.0));
    }

    #[test]
    fn test_zoom_clamp() {
        let mut camera = Camera::new();
        camera.zoom_at(Point::ZERO, 0.001);
        assert!((camera.zoom - MIN_ZOOM).abs() < f64::EPSILON);
        camera.zoom_at(Point::ZERO, 1e6);
        assert!((camera.zoom - MAX_ZOOM).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zoom_at_keeps_anchor() {
        let mut camera = Camera::new();
        camera.pan(Vec2::new(13.0, -7.0));
        let anchor = Point::new(320.0, 240.0);
        let before = camera.screen_to_canvas(anchor);
        camera.zoom_at(anchor, 1.5);
        let after = camera.screen_to_canvas(anchor);
        assert!((before - after).hypot() < 1e-9);
    }

    #[test]
    fn test_center_on() {
        let mut camera = Camera::new();
        camera.zoom = 2.0;
        camera.center_on(Point::new(100.0, 50.0), Size::new(800.0, 600.0));
        let p = camera.canvas_to_screen(Point::new(100.0, 50.0));
        assert_eq!(p, Point::new(400.0, 300.0));
    }

    #[test]
    fn test_fit_to_bounds() {
        let mut camera = Camera::new();
        camera.fit_to_bounds(Rect::new(0.0, 0.0, 400.0, 100.0), Size::new(800.0, 600.0), 0.0);
        assert!((camera.zoom - 2.0).abs() < 1e-9);
        let visible = camera.visible_rect(Size::new(800.0, 600.0));
        assert!((visible.center() - Point::new(200.0, 50.0)).hypot() < 1e-9);
    }
}

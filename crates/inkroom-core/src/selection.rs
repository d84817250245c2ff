//! Selection frame, transform handles, and resize/rotate math.
//!
//! Resize and rotation are always computed from a [`TransformOrigin`]
//! captured at pointer-down, never incrementally, so repeated pointer-move
//! frames do not accumulate drift.

use std::f64::consts::FRAC_PI_2;

use kurbo::{Point, Rect, Size, Vec2};

use crate::geometry;
use crate::shapes::{Element, ElementId, ElementKind, TextMeasure};
use crate::snap::{ANGLE_SNAP_INCREMENT, snap_angle};

/// Handle half-extent in screen pixels.
pub const HANDLE_SIZE: f64 = 8.0;

/// Distance of the rotation handle above the frame, in screen pixels.
pub const ROTATE_HANDLE_OFFSET: f64 = 25.0;

/// Smallest width/height a resize may produce.
pub const MIN_RESIZE_EXTENT: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Corner(Corner),
    Edge(Edge),
    Rotate,
    /// First (`0`) or last point of a line/arrow.
    Endpoint(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Handle {
    pub kind: HandleKind,
    /// Canvas position.
    pub position: Point,
}

impl Handle {
    /// Square hit area of [`HANDLE_SIZE`] screen pixels.
    pub fn hit_test(&self, point: Point, zoom: f64) -> bool {
        let reach = HANDLE_SIZE / zoom;
        (point.x - self.position.x).abs() <= reach && (point.y - self.position.y).abs() <= reach
    }
}

/// Oriented box around a selection: an unrotated rect rotated by `angle`
/// around its centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionFrame {
    pub rect: Rect,
    pub angle: f64,
}

impl SelectionFrame {
    pub fn center(&self) -> Point {
        self.rect.center()
    }

    /// Whether `point` lies inside the rotated frame.
    pub fn contains(&self, point: Point) -> bool {
        let local = geometry::rotate_point(point, self.center(), -self.angle);
        geometry::point_in_rect(local, self.rect)
    }

    fn to_world(&self, local: Point) -> Point {
        geometry::rotate_point(local, self.center(), self.angle)
    }
}

/// Axis-aligned bounds of a set of elements.
pub fn common_bounds<'a, I>(elements: I) -> Option<Rect>
where
    I: IntoIterator<Item = &'a Element>,
{
    geometry::union_bounds(elements.into_iter().map(Element::bounds))
}

/// Frame for a selection. A single rotated element keeps its own angle;
/// anything else gets the axis-aligned common bounds.
pub fn selection_frame(elements: &[&Element]) -> Option<SelectionFrame> {
    match elements {
        [] => None,
        [only] if !only.element_type().is_point_based() => Some(SelectionFrame {
            rect: only.local_rect(),
            angle: only.angle,
        }),
        _ => common_bounds(elements.iter().copied()).map(|rect| SelectionFrame { rect, angle: 0.0 }),
    }
}

/// Transform handles for the current selection.
///
/// A single line or arrow exposes its endpoints; everything else exposes
/// corners, edges and a rotation handle on the selection frame.
pub fn get_handles(elements: &[&Element], zoom: f64) -> Vec<Handle> {
    if let [only] = elements {
        if only.element_type().is_linear() {
            let points = only.absolute_points();
            return match (points.first(), points.last()) {
                (Some(first), Some(last)) if points.len() >= 2 => vec![
                    Handle {
                        kind: HandleKind::Endpoint(0),
                        position: *first,
                    },
                    Handle {
                        kind: HandleKind::Endpoint(points.len() - 1),
                        position: *last,
                    },
                ],
                _ => Vec::new(),
            };
        }
    }
    let Some(frame) = selection_frame(elements) else {
        return Vec::new();
    };
    let r = frame.rect;
    let c = r.center();
    let local = [
        (HandleKind::Corner(Corner::TopLeft), Point::new(r.x0, r.y0)),
        (HandleKind::Corner(Corner::TopRight), Point::new(r.x1, r.y0)),
        (HandleKind::Corner(Corner::BottomRight), Point::new(r.x1, r.y1)),
        (HandleKind::Corner(Corner::BottomLeft), Point::new(r.x0, r.y1)),
        (HandleKind::Edge(Edge::Top), Point::new(c.x, r.y0)),
        (HandleKind::Edge(Edge::Right), Point::new(r.x1, c.y)),
        (HandleKind::Edge(Edge::Bottom), Point::new(c.x, r.y1)),
        (HandleKind::Edge(Edge::Left), Point::new(r.x0, c.y)),
        (
            HandleKind::Rotate,
            Point::new(c.x, r.y0 - ROTATE_HANDLE_OFFSET / zoom),
        ),
    ];
    local
        .into_iter()
        .map(|(kind, p)| Handle {
            kind,
            position: frame.to_world(p),
        })
        .collect()
}

/// Handle under `point`, if any. Rotation and endpoints are checked first.
pub fn handle_at_point(handles: &[Handle], point: Point, zoom: f64) -> Option<HandleKind> {
    handles
        .iter()
        .filter(|h| matches!(h.kind, HandleKind::Rotate | HandleKind::Endpoint(_)))
        .chain(handles.iter().filter(|h| matches!(h.kind, HandleKind::Corner(_))))
        .chain(handles.iter().filter(|h| matches!(h.kind, HandleKind::Edge(_))))
        .find(|h| h.hit_test(point, zoom))
        .map(|h| h.kind)
}

/// Selection state captured when a resize or rotation begins.
#[derive(Debug, Clone)]
pub struct TransformOrigin {
    pub frame: SelectionFrame,
    pub elements: Vec<Element>,
}

impl TransformOrigin {
    pub fn capture(elements: &[&Element]) -> Option<Self> {
        let frame = selection_frame(elements)?;
        Some(Self {
            frame,
            elements: elements.iter().map(|e| (*e).clone()).collect(),
        })
    }

    pub fn ids(&self) -> Vec<ElementId> {
        self.elements.iter().map(|e| e.id).collect()
    }
}

/// New frame rect for dragging `handle` to `pointer`.
///
/// The handle's opposite corner (or edge) stays fixed in canvas space even
/// when the frame is rotated. With `keep_square`, corner drags use the larger
/// of the two deltas for both sides.
pub fn resize_frame(frame: &SelectionFrame, handle: HandleKind, pointer: Point, keep_square: bool) -> Rect {
    let r = frame.rect;
    let c = r.center();
    let local = geometry::rotate_point(pointer, c, -frame.angle);

    // Anchor in local coordinates, and which axes the handle moves.
    let (anchor, move_x, move_y) = match handle {
        HandleKind::Corner(Corner::TopLeft) => (Point::new(r.x1, r.y1), true, true),
        HandleKind::Corner(Corner::TopRight) => (Point::new(r.x0, r.y1), true, true),
        HandleKind::Corner(Corner::BottomRight) => (Point::new(r.x0, r.y0), true, true),
        HandleKind::Corner(Corner::BottomLeft) => (Point::new(r.x1, r.y0), true, true),
        HandleKind::Edge(Edge::Top) => (Point::new(r.x0, r.y1), false, true),
        HandleKind::Edge(Edge::Bottom) => (Point::new(r.x0, r.y0), false, true),
        HandleKind::Edge(Edge::Left) => (Point::new(r.x1, r.y0), true, false),
        HandleKind::Edge(Edge::Right) => (Point::new(r.x0, r.y0), true, false),
        HandleKind::Rotate | HandleKind::Endpoint(_) => return r,
    };

    // Signed extents from the anchor towards the handle.
    let sign_x = if anchor.x <= c.x { 1.0 } else { -1.0 };
    let sign_y = if anchor.y <= c.y { 1.0 } else { -1.0 };
    let mut dx = if move_x { local.x - anchor.x } else { r.width() * sign_x };
    let mut dy = if move_y { local.y - anchor.y } else { r.height() * sign_y };

    if keep_square && move_x && move_y {
        let side = dx.abs().max(dy.abs());
        dx = side * if dx < 0.0 { -1.0 } else { 1.0 };
        dy = side * if dy < 0.0 { -1.0 } else { 1.0 };
    }

    let width = dx.abs().max(MIN_RESIZE_EXTENT);
    let height = dy.abs().max(MIN_RESIZE_EXTENT);
    let dx = width * if dx < 0.0 { -1.0 } else { 1.0 };
    let dy = height * if dy < 0.0 { -1.0 } else { 1.0 };

    // Keep the anchor fixed in canvas space.
    let anchor_world = frame.to_world(anchor);
    let half = geometry::rotate_point(Point::new(dx / 2.0, dy / 2.0), Point::ZERO, frame.angle);
    let center = anchor_world + half.to_vec2();
    Rect::from_center_size(center, Size::new(width, height))
}

/// Resize every element of `origin` so the frame becomes `target`.
///
/// Each element is mapped from its original geometry relative to the
/// original frame. Text re-derives its font size from the vertical scale and
/// is re-measured.
pub fn resize_to_bounds(origin: &TransformOrigin, target: Rect, measure: &dyn TextMeasure) -> Vec<Element> {
    let from = origin.frame.rect;
    let sx = if from.width() > 0.0 { target.width() / from.width() } else { 1.0 };
    let sy = if from.height() > 0.0 { target.height() / from.height() } else { 1.0 };
    let map = |p: Point| {
        Point::new(
            target.x0 + (p.x - from.x0) * sx,
            target.y0 + (p.y - from.y0) * sy,
        )
    };

    if let [only] = origin.elements.as_slice() {
        if !only.element_type().is_point_based() && origin.frame.angle == only.angle {
            let mut next = only.clone();
            next.x = target.x0;
            next.y = target.y0;
            next.width = target.width();
            next.height = target.height();
            rescale_text(&mut next, only, sy, measure);
            return vec![next];
        }
    }

    origin
        .elements
        .iter()
        .map(|original| {
            let mut next = original.clone();
            if original.element_type().is_point_based() {
                let points: Vec<Point> = original.absolute_points().into_iter().map(map).collect();
                next.set_absolute_points(&points);
            } else {
                // Rotated members keep their angle; their centre and size scale.
                let center = map(original.center());
                next.width = original.width * sx;
                next.height = original.height * sy;
                next.x = center.x - next.width / 2.0;
                next.y = center.y - next.height / 2.0;
                rescale_text(&mut next, original, sy, measure);
            }
            next
        })
        .collect()
}

fn rescale_text(next: &mut Element, original: &Element, scale_y: f64, measure: &dyn TextMeasure) {
    let Some(base) = original.text() else {
        return;
    };
    let font_size = (base.font_size * scale_y).max(1.0);
    let size = measure.measure(&base.text, font_size, base.font_family, base.line_height);
    if let ElementKind::Text(text) = &mut next.kind {
        text.font_size = font_size;
    }
    // Keep the box centred where the literal scale put it.
    let center = next.center();
    next.width = size.width;
    next.height = size.height;
    next.x = center.x - size.width / 2.0;
    next.y = center.y - size.height / 2.0;
}

/// Frame angle implied by dragging the rotation handle to `pointer`.
pub fn rotation_angle(center: Point, pointer: Point, snap: bool) -> f64 {
    let d = pointer - center;
    let angle = d.y.atan2(d.x) + FRAC_PI_2;
    let angle = if snap {
        snap_angle(angle, ANGLE_SNAP_INCREMENT)
    } else {
        angle
    };
    geometry::normalize_angle(angle)
}

/// Rotate every element of `origin` so the frame reaches `angle`.
///
/// Boxes rotate around the frame centre and accumulate `angle`; point-based
/// elements get the rotation baked into their points.
pub fn rotate_to(origin: &TransformOrigin, angle: f64) -> Vec<Element> {
    let pivot = origin.frame.center();
    let delta = angle - origin.frame.angle;
    origin
        .elements
        .iter()
        .map(|original| {
            let mut next = original.clone();
            if original.element_type().is_point_based() {
                let points: Vec<Point> = original
                    .absolute_points()
                    .into_iter()
                    .map(|p| geometry::rotate_point(p, pivot, delta))
                    .collect();
                next.set_absolute_points(&points);
            } else {
                let center = geometry::rotate_point(original.center(), pivot, delta);
                next.translate(center - original.center());
                next.angle = geometry::normalize_angle(original.angle + delta);
            }
            next
        })
        .collect()
}

/// Translate a snapshot of elements by `delta`.
pub fn translate_all(elements: &[Element], delta: Vec2) -> Vec<Element> {
    elements
        .iter()
        .map(|e| {
            let mut next = e.clone();
            next.translate(delta);
            next
        })
        .collect()
}

/// Copy geometry (box, angle, points, font size) from `src` into `dst`.
pub fn copy_geometry(dst: &mut Element, src: &Element) {
    dst.x = src.x;
    dst.y = src.y;
    dst.width = src.width;
    dst.height = src.height;
    dst.angle = src.angle;
    dst.points = src.points.clone();
    if let (ElementKind::Text(d), ElementKind::Text(s)) = (&mut dst.kind, &src.kind) {
        d.font_size = s.font_size;
    }
}

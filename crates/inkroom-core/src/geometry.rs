//! Geometry kernel: coordinate transforms, containment tests, proximity and
//! path utilities.
//!
//! Everything here is a pure function over `kurbo` types. Shape tests work in
//! an element's unrotated local frame; callers rotate the query point into
//! that frame with [`rotate_point`] first.

use kurbo::{BezPath, Point, Rect, Vec2};

/// Convert a screen point to canvas coordinates: `(screen - scroll) / zoom`.
pub fn screen_to_canvas(screen: Point, scroll: Vec2, zoom: f64) -> Point {
    Point::new((screen.x - scroll.x) / zoom, (screen.y - scroll.y) / zoom)
}

/// Convert a canvas point to screen coordinates: `canvas * zoom + scroll`.
pub fn canvas_to_screen(canvas: Point, scroll: Vec2, zoom: f64) -> Point {
    Point::new(canvas.x * zoom + scroll.x, canvas.y * zoom + scroll.y)
}

/// Rotate `point` around `origin` by `angle` radians.
pub fn rotate_point(point: Point, origin: Point, angle: f64) -> Point {
    if angle == 0.0 {
        return point;
    }
    let (sin, cos) = angle.sin_cos();
    let dx = point.x - origin.x;
    let dy = point.y - origin.y;
    Point::new(
        origin.x + dx * cos - dy * sin,
        origin.y + dx * sin + dy * cos,
    )
}

/// Closed shape families with an analytic boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryShape {
    Rectangle,
    Ellipse,
    Diamond,
}

/// Inclusive point-in-rectangle test.
pub fn point_in_rect(point: Point, rect: Rect) -> bool {
    point.x >= rect.x0 && point.x <= rect.x1 && point.y >= rect.y0 && point.y <= rect.y1
}

/// Point inside the ellipse inscribed in `rect`.
pub fn point_in_ellipse(point: Point, rect: Rect) -> bool {
    let rx = rect.width() / 2.0;
    let ry = rect.height() / 2.0;
    if rx <= 0.0 || ry <= 0.0 {
        return false;
    }
    let c = rect.center();
    let nx = (point.x - c.x) / rx;
    let ny = (point.y - c.y) / ry;
    nx * nx + ny * ny <= 1.0
}

/// Point inside the diamond whose vertices are the edge midpoints of `rect`.
pub fn point_in_diamond(point: Point, rect: Rect) -> bool {
    let hw = rect.width() / 2.0;
    let hh = rect.height() / 2.0;
    if hw <= 0.0 || hh <= 0.0 {
        return false;
    }
    let c = rect.center();
    (point.x - c.x).abs() / hw + (point.y - c.y).abs() / hh <= 1.0
}

/// Corner points of the diamond inscribed in `rect`, clockwise from the top.
pub fn diamond_vertices(rect: Rect) -> [Point; 4] {
    let c = rect.center();
    [
        Point::new(c.x, rect.y0),
        Point::new(rect.x1, c.y),
        Point::new(c.x, rect.y1),
        Point::new(rect.x0, c.y),
    ]
}

/// Hit test for a rectangle in its local frame.
///
/// Filled rectangles are hit anywhere inside the threshold-expanded bounds.
/// Hollow ones only in the band inside the outer offset and outside the
/// inner offset.
pub fn hit_rect(point: Point, rect: Rect, threshold: f64, filled: bool) -> bool {
    let outer = rect.inflate(threshold, threshold);
    if !point_in_rect(point, outer) {
        return false;
    }
    if filled {
        return true;
    }
    let inner = rect.inflate(-threshold, -threshold);
    if inner.width() <= 0.0 || inner.height() <= 0.0 {
        return true;
    }
    !strictly_inside_rect(point, inner)
}

/// Hit test for the ellipse inscribed in `rect`.
pub fn hit_ellipse(point: Point, rect: Rect, threshold: f64, filled: bool) -> bool {
    let outer = rect.inflate(threshold, threshold);
    if !point_in_ellipse(point, outer) {
        return false;
    }
    if filled {
        return true;
    }
    let inner = rect.inflate(-threshold, -threshold);
    if inner.width() <= 0.0 || inner.height() <= 0.0 {
        return true;
    }
    !point_in_ellipse(point, inner)
}

/// Hit test for the diamond inscribed in `rect`.
///
/// The offset band is measured as true distance to the diamond's edges, so
/// sharp vertices do not grow a larger hit area than flat sides.
pub fn hit_diamond(point: Point, rect: Rect, threshold: f64, filled: bool) -> bool {
    let inside = point_in_diamond(point, rect);
    if filled && inside {
        return true;
    }
    let v = diamond_vertices(rect);
    let closed = [v[0], v[1], v[2], v[3], v[0]];
    point_to_polyline_distance(point, &closed) <= threshold
}

/// Dispatch a hit test by boundary family.
pub fn hit_shape(shape: BoundaryShape, point: Point, rect: Rect, threshold: f64, filled: bool) -> bool {
    match shape {
        BoundaryShape::Rectangle => hit_rect(point, rect, threshold, filled),
        BoundaryShape::Ellipse => hit_ellipse(point, rect, threshold, filled),
        BoundaryShape::Diamond => hit_diamond(point, rect, threshold, filled),
    }
}

fn strictly_inside_rect(point: Point, rect: Rect) -> bool {
    point.x > rect.x0 && point.x < rect.x1 && point.y > rect.y0 && point.y < rect.y1
}

/// Distance from a point to the segment `a -> b`.
pub fn point_to_segment_distance(point: Point, a: Point, b: Point) -> f64 {
    let seg = b - a;
    let pv = point - a;
    let len_sq = seg.hypot2();
    if len_sq < f64::EPSILON {
        return pv.hypot();
    }
    let t = (pv.dot(seg) / len_sq).clamp(0.0, 1.0);
    let proj = a + seg * t;
    (point - proj).hypot()
}

/// Minimum distance from a point to a polyline.
///
/// A single point polyline degenerates to point distance; an empty one is
/// infinitely far away.
pub fn point_to_polyline_distance(point: Point, points: &[Point]) -> f64 {
    match points {
        [] => f64::INFINITY,
        [only] => (point - *only).hypot(),
        _ => points
            .windows(2)
            .map(|w| point_to_segment_distance(point, w[0], w[1]))
            .fold(f64::INFINITY, f64::min),
    }
}

/// Axis-aligned envelope of a point set.
pub fn points_bounds(points: &[Point]) -> Option<Rect> {
    let first = points.first()?;
    let mut rect = Rect::from_points(*first, *first);
    for p in &points[1..] {
        rect = rect.union_pt(*p);
    }
    Some(rect)
}

/// Corners of `rect` rotated by `angle` around its centre.
pub fn rotated_corners(rect: Rect, angle: f64) -> [Point; 4] {
    let c = rect.center();
    [
        rotate_point(Point::new(rect.x0, rect.y0), c, angle),
        rotate_point(Point::new(rect.x1, rect.y0), c, angle),
        rotate_point(Point::new(rect.x1, rect.y1), c, angle),
        rotate_point(Point::new(rect.x0, rect.y1), c, angle),
    ]
}

/// Axis-aligned bounds of `rect` after rotating it around its centre.
pub fn rotated_rect_bounds(rect: Rect, angle: f64) -> Rect {
    if angle == 0.0 {
        return rect;
    }
    let corners = rotated_corners(rect, angle);
    points_bounds(&corners).unwrap_or(rect)
}

/// Union of a set of rectangles.
pub fn union_bounds<I: IntoIterator<Item = Rect>>(rects: I) -> Option<Rect> {
    rects.into_iter().reduce(|acc, r| acc.union(r))
}

/// Distance from the centre of a shape to its boundary along `angle`.
///
/// `half` holds the half-width and half-height of the unrotated shape.
pub fn ray_boundary_distance(shape: BoundaryShape, half: Vec2, angle: f64) -> f64 {
    let hw = half.x.abs().max(1e-9);
    let hh = half.y.abs().max(1e-9);
    let (sin, cos) = angle.sin_cos();
    let (c, s) = (cos.abs(), sin.abs());
    match shape {
        BoundaryShape::Rectangle => {
            let tx = if c > 1e-12 { hw / c } else { f64::INFINITY };
            let ty = if s > 1e-12 { hh / s } else { f64::INFINITY };
            tx.min(ty)
        }
        BoundaryShape::Ellipse => 1.0 / ((c / hw).powi(2) + (s / hh).powi(2)).sqrt(),
        BoundaryShape::Diamond => 1.0 / (c / hw + s / hh),
    }
}

/// Douglas–Peucker polyline simplification.
pub fn simplify_path(points: &[Point], epsilon: f64) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let first = points[0];
    let last = points[points.len() - 1];

    let mut max_dist = 0.0;
    let mut max_index = 0;
    for (i, point) in points.iter().enumerate().take(points.len() - 1).skip(1) {
        let dist = point_to_segment_distance(*point, first, last);
        if dist > max_dist {
            max_dist = dist;
            max_index = i;
        }
    }

    if max_dist > epsilon {
        let mut left = simplify_path(&points[..=max_index], epsilon);
        let right = simplify_path(&points[max_index..], epsilon);
        left.pop();
        left.extend(right);
        left
    } else {
        vec![first, last]
    }
}

/// Smooth a polyline through its points with Catmull-Rom segments expressed
/// as cubic Béziers.
pub fn catmull_rom_to_bezier(points: &[Point]) -> BezPath {
    let mut path = BezPath::new();
    let Some(first) = points.first() else {
        return path;
    };
    path.move_to(*first);
    if points.len() == 2 {
        path.line_to(points[1]);
        return path;
    }

    const TENSION: f64 = 0.5;
    let last = points.len() - 1;
    for i in 0..last {
        let p0 = points[i.saturating_sub(1)];
        let p1 = points[i];
        let p2 = points[i + 1];
        let p3 = points[(i + 2).min(last)];

        let t1 = (p2 - p0) * TENSION;
        let t2 = (p3 - p1) * TENSION;
        path.curve_to(p1 + t1 / 3.0, p2 - t2 / 3.0, p2);
    }
    path
}

/// Normalise an angle into `[0, 2π)`.
pub fn normalize_angle(angle: f64) -> f64 {
    angle.rem_euclid(std::f64::consts::TAU)
}

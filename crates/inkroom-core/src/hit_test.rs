//! Hit testing elements against canvas points and rectangles.

use kurbo::{Point, Rect};

use crate::geometry;
use crate::shapes::{Element, ElementId, ElementKind};
use crate::store::ElementStore;

/// Base hit tolerance in screen pixels; callers divide by zoom.
pub const HIT_TOLERANCE: f64 = 6.0;

/// Whether `point` (canvas coordinates) hits `element`.
///
/// The point is rotated into the element's unrotated frame first. Lines,
/// arrows and freehand strokes use polyline proximity with a threshold that
/// grows with stroke width. Closed shapes are solid when filled and hollow
/// otherwise; text and images are always solid.
pub fn hit_test_element(element: &Element, point: Point, threshold: f64) -> bool {
    if element.is_deleted {
        return false;
    }
    let tolerance = threshold + element.style.stroke_width / 2.0;
    match &element.kind {
        ElementKind::Line | ElementKind::Arrow(_) | ElementKind::Freedraw => {
            geometry::point_to_polyline_distance(point, &element.absolute_points()) <= tolerance
        }
        ElementKind::Text(_) | ElementKind::Image(_) => {
            let local = geometry::rotate_point(point, element.center(), -element.angle);
            geometry::hit_rect(local, element.local_rect(), tolerance, true)
        }
        _ => {
            let Some(shape) = element.boundary_shape() else {
                return false;
            };
            let local = geometry::rotate_point(point, element.center(), -element.angle);
            geometry::hit_shape(
                shape,
                local,
                element.local_rect(),
                tolerance,
                element.style.is_filled(),
            )
        }
    }
}

/// Topmost live element at `point`. Later paint order wins ties.
pub fn get_element_at_point(store: &ElementStore, point: Point, threshold: f64) -> Option<ElementId> {
    store
        .live()
        .rev()
        .find(|e| hit_test_element(e, point, threshold))
        .map(|e| e.id)
}

/// Live elements whose bounds lie entirely inside `rect`, in paint order.
pub fn elements_in_rect(store: &ElementStore, rect: Rect) -> Vec<ElementId> {
    store
        .live()
        .filter(|e| {
            let b = e.bounds();
            b.x0 >= rect.x0 && b.y0 >= rect.y0 && b.x1 <= rect.x1 && b.y1 <= rect.y1
        })
        .map(|e| e.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{ElementStyle, ElementType, SerializableColor};
    use std::f64::consts::FRAC_PI_4;

    fn shape(ty: ElementType, x: f64, y: f64, w: f64, h: f64) -> Element {
        let mut el = Element::new(ty, x, y, ElementStyle::default());
        el.width = w;
        el.height = h;
        el.style.stroke_width = 2.0;
        el
    }

    #[test]
    fn test_filled_rect_interior_hits() {
        let mut rect = shape(ElementType::Rectangle, 0.0, 0.0, 100.0, 100.0);
        rect.style.background_color = Some(SerializableColor::white());
        assert!(hit_test_element(&rect, Point::new(50.0, 50.0), 1.0));
        assert!(hit_test_element(&rect, Point::new(1.0, 99.0), 1.0));
    }

    #[test]
    fn test_hollow_rect_outside_band_misses() {
        let rect = shape(ElementType::Rectangle, 0.0, 0.0, 100.0, 100.0);
        assert!(!hit_test_element(&rect, Point::new(50.0, 50.0), 1.0));
        assert!(hit_test_element(&rect, Point::new(0.5, 50.0), 1.0));
        // Outside bounds expanded by threshold + half stroke.
        assert!(!hit_test_element(&rect, Point::new(-2.5, 50.0), 1.0));
    }

    #[test]
    fn test_rotated_rect_uses_local_frame() {
        let mut rect = shape(ElementType::Rectangle, 0.0, 40.0, 100.0, 20.0);
        rect.style.background_color = Some(SerializableColor::white());
        rect.angle = FRAC_PI_4;
        // Unrotated corner is no longer covered.
        assert!(!hit_test_element(&rect, Point::new(2.0, 42.0), 0.0));
        // A point along the rotated diagonal is.
        assert!(hit_test_element(&rect, Point::new(80.0, 80.0), 0.0));
    }

    #[test]
    fn test_line_proximity() {
        let mut line = Element::new(ElementType::Line, 0.0, 0.0, ElementStyle::default());
        line.set_absolute_points(&[Point::new(0.0, 0.0), Point::new(100.0, 0.0)]);
        assert!(hit_test_element(&line, Point::new(50.0, 3.0), 2.0));
        assert!(!hit_test_element(&line, Point::new(50.0, 10.0), 2.0));
    }

    #[test]
    fn test_deleted_never_hits() {
        let mut rect = shape(ElementType::Rectangle, 0.0, 0.0, 100.0, 100.0);
        rect.is_deleted = true;
        assert!(!hit_test_element(&rect, Point::new(0.0, 50.0), 5.0));
    }

    #[test]
    fn test_topmost_wins() {
        let mut a = shape(ElementType::Rectangle, 0.0, 0.0, 100.0, 100.0);
        a.style.background_color = Some(SerializableColor::white());
        let mut b = a.clone();
        b.id = uuid::Uuid::new_v4();
        let store = ElementStore::from_elements([a.clone(), b.clone()]);
        assert_eq!(get_element_at_point(&store, Point::new(50.0, 50.0), 1.0), Some(b.id));
        assert_eq!(get_element_at_point(&store, Point::new(500.0, 50.0), 1.0), None);
    }

    #[test]
    fn test_marquee_requires_full_containment() {
        let a = shape(ElementType::Ellipse, 10.0, 10.0, 20.0, 20.0);
        let b = shape(ElementType::Ellipse, 90.0, 90.0, 50.0, 50.0);
        let store = ElementStore::from_elements([a.clone(), b]);
        assert_eq!(elements_in_rect(&store, Rect::new(0.0, 0.0, 100.0, 100.0)), vec![a.id]);
    }
}

//! Arrow bindings: attachments from arrow endpoints to the shapes they touch.
//!
//! A [`Binding`] stores a focus angle and a gap in the target's unrotated
//! frame rather than an absolute point, so the attachment can be recomputed
//! after the target moves, resizes or rotates.
//!
//! The forward relation lives on the arrow (`start_binding`/`end_binding`)
//! and the reverse relation on the target (`bound_elements`). Both are only
//! ever changed together through [`bind_endpoint`].

use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};

use crate::geometry::{self, BoundaryShape};
use crate::shapes::{BoundElement, Element, ElementId, ElementType};
use crate::store::ElementStore;

/// Search radius for bindable targets, in canvas units.
pub const BINDING_RADIUS: f64 = 20.0;

/// Attachment of one arrow endpoint to a target element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub element_id: ElementId,
    /// Direction from the target centre to the attachment point, in radians,
    /// measured in the target's unrotated frame.
    pub focus: f64,
    /// Signed distance from the target boundary along `focus`. Positive is
    /// outside.
    pub gap: f64,
}

/// Which end of an arrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrowEnd {
    Start,
    End,
}

fn boundary_of(target: &Element) -> Option<(BoundaryShape, Vec2)> {
    let shape = target.boundary_shape()?;
    Some((shape, Vec2::new(target.width.abs() / 2.0, target.height.abs() / 2.0)))
}

/// Capture the attachment of `point` to `target`.
///
/// Returns `None` when the target has no closed boundary.
pub fn create_binding(point: Point, target: &Element) -> Option<Binding> {
    let (shape, half) = boundary_of(target)?;
    let center = target.center();
    let local = geometry::rotate_point(point, center, -target.angle);
    let offset = local - center;
    let focus = if offset.hypot2() < 1e-18 {
        0.0
    } else {
        offset.y.atan2(offset.x)
    };
    let boundary = geometry::ray_boundary_distance(shape, half, focus);
    Some(Binding {
        element_id: target.id,
        focus,
        gap: offset.hypot() - boundary,
    })
}

/// Resolve a binding against the target's current geometry.
pub fn get_binding_point(binding: &Binding, target: &Element) -> Option<Point> {
    let (shape, half) = boundary_of(target)?;
    let center = target.center();
    let distance = geometry::ray_boundary_distance(shape, half, binding.focus) + binding.gap;
    let (sin, cos) = binding.focus.sin_cos();
    let local = center + Vec2::new(cos, sin) * distance;
    Some(geometry::rotate_point(local, center, target.angle))
}

/// Signed distance from `point` to the boundary of `target`, measured along
/// the ray from its centre. Negative inside.
fn boundary_gap(point: Point, target: &Element) -> Option<f64> {
    create_binding(point, target).map(|b| b.gap)
}

/// Topmost live bindable element near `point`.
///
/// Candidates are hit when the point lies within [`BINDING_RADIUS`] of their
/// boundary, or anywhere inside a filled one. Ids in `exclude` are skipped.
pub fn find_bindable_element(
    store: &ElementStore,
    point: Point,
    exclude: &[ElementId],
) -> Option<ElementId> {
    store
        .live()
        .rev()
        .filter(|e| e.element_type().is_bindable() && !exclude.contains(&e.id))
        .find(|e| match boundary_gap(point, e) {
            Some(gap) => gap.abs() <= BINDING_RADIUS || (gap < 0.0 && e.style.is_filled()),
            None => false,
        })
        .map(|e| e.id)
}

fn endpoint(arrow: &Element, end: ArrowEnd) -> Option<Point> {
    let pts = arrow.absolute_points();
    match end {
        ArrowEnd::Start => pts.first().copied(),
        ArrowEnd::End => pts.last().copied(),
    }
}

fn binding_slot(arrow: &Element, end: ArrowEnd) -> Option<Binding> {
    let data = arrow.arrow()?;
    match end {
        ArrowEnd::Start => data.start_binding,
        ArrowEnd::End => data.end_binding,
    }
}

/// Set or clear the binding of one arrow endpoint.
///
/// This is the only place that touches `start_binding`/`end_binding` and
/// `bound_elements`, so the two relations stay consistent. The binding is
/// captured from the endpoint's current position. Returns the ids of every
/// element that changed; the caller bumps their versions.
pub fn bind_endpoint(
    store: &mut ElementStore,
    arrow_id: ElementId,
    end: ArrowEnd,
    target_id: Option<ElementId>,
) -> Vec<ElementId> {
    let mut changed = Vec::new();
    let Some(arrow) = store.get(arrow_id) else {
        return changed;
    };
    if arrow.element_type() != ElementType::Arrow {
        return changed;
    }
    let previous = binding_slot(arrow, end);
    let other = binding_slot(
        arrow,
        match end {
            ArrowEnd::Start => ArrowEnd::End,
            ArrowEnd::End => ArrowEnd::Start,
        },
    );

    let next = match (target_id, endpoint(arrow, end)) {
        (Some(id), Some(point)) if id != arrow_id => store
            .get_live(id)
            .filter(|t| t.element_type().is_bindable())
            .and_then(|t| create_binding(point, t)),
        _ => None,
    };

    if previous == next {
        return changed;
    }

    if let Some(data) = store.get_mut(arrow_id).and_then(Element::arrow_mut) {
        match end {
            ArrowEnd::Start => data.start_binding = next,
            ArrowEnd::End => data.end_binding = next,
        }
        changed.push(arrow_id);
    }

    let previous_target = previous.map(|b| b.element_id);
    let next_target = next.map(|b| b.element_id);
    if previous_target != next_target {
        // The other end may still hold the old target.
        let old = previous_target.filter(|old| other.map(|b| b.element_id) != Some(*old));
        if let Some(old) = old {
            if let Some(target) = store.get_mut(old) {
                let before = target.bound_elements.len();
                target.bound_elements.retain(|b| b.id != arrow_id);
                if target.bound_elements.len() != before {
                    changed.push(old);
                }
            }
        }
        if let Some(new) = next_target {
            if let Some(target) = store.get_mut(new) {
                if !target.bound_elements.iter().any(|b| b.id == arrow_id) {
                    target.bound_elements.push(BoundElement {
                        id: arrow_id,
                        kind: ElementType::Arrow,
                    });
                    changed.push(new);
                }
            }
        }
    }
    changed
}

/// Drop the back-references held by the targets of a deleted arrow.
pub fn detach_arrow(store: &mut ElementStore, arrow_id: ElementId) -> Vec<ElementId> {
    let mut changed = Vec::new();
    let targets: Vec<ElementId> = match store.get(arrow_id).and_then(Element::arrow) {
        Some(data) => [data.start_binding, data.end_binding]
            .into_iter()
            .flatten()
            .map(|b| b.element_id)
            .collect(),
        None => return changed,
    };
    for id in targets {
        if let Some(target) = store.get_mut(id) {
            let before = target.bound_elements.len();
            target.bound_elements.retain(|b| b.id != arrow_id);
            if target.bound_elements.len() != before && !changed.contains(&id) {
                changed.push(id);
            }
        }
    }
    changed
}

/// Re-derive the bound endpoints of every live arrow attached to one of
/// `moved`.
///
/// Only the bound end moves; intermediate points keep their canvas position.
/// Bindings whose target is missing or tombstoned are skipped and the arrow
/// keeps its last explicit point. Returns the arrows that changed.
pub fn update_bound_arrows(store: &mut ElementStore, moved: &[ElementId]) -> Vec<ElementId> {
    let arrows: Vec<ElementId> = store
        .live()
        .filter_map(|e| {
            let data = e.arrow()?;
            let touches = [data.start_binding, data.end_binding]
                .iter()
                .flatten()
                .any(|b| moved.contains(&b.element_id));
            touches.then_some(e.id)
        })
        .collect();

    let mut changed = Vec::new();
    for arrow_id in arrows {
        let Some(arrow) = store.get(arrow_id) else {
            continue;
        };
        let Some(data) = arrow.arrow() else {
            continue;
        };
        let resolve = |binding: Option<Binding>| {
            let binding = binding?;
            let target = store.get_live(binding.element_id)?;
            get_binding_point(&binding, target)
        };
        let start = resolve(data.start_binding);
        let end = resolve(data.end_binding);

        let mut points = arrow.absolute_points();
        if points.len() < 2 {
            continue;
        }
        let last = points.len() - 1;
        if let Some(p) = start {
            points[0] = p;
        }
        if let Some(p) = end {
            points[last] = p;
        }
        if points == arrow.absolute_points() {
            continue;
        }
        if let Some(arrow) = store.get_mut(arrow_id) {
            arrow.set_absolute_points(&points);
            changed.push(arrow_id);
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{ElementStyle, SerializableColor};
    use std::f64::consts::FRAC_PI_2;

    fn shape(ty: ElementType, x: f64, y: f64, w: f64, h: f64) -> Element {
        let mut el = Element::new(ty, x, y, ElementStyle::default());
        el.width = w;
        el.height = h;
        el.version = 1;
        el
    }

    fn arrow(from: Point, to: Point) -> Element {
        let mut el = Element::new(ElementType::Arrow, 0.0, 0.0, ElementStyle::default());
        el.set_absolute_points(&[from, to]);
        el.version = 1;
        el
    }

    fn close(a: Point, b: Point) -> bool {
        (a - b).hypot() < 1e-6
    }

    #[test]
    fn test_binding_round_trip() {
        for ty in [ElementType::Rectangle, ElementType::Ellipse, ElementType::Diamond] {
            let mut target = shape(ty, 0.0, 0.0, 100.0, 60.0);
            target.angle = 0.4;
            for p in [Point::new(120.0, 30.0), Point::new(40.0, -15.0), Point::new(10.0, 20.0)] {
                let binding = create_binding(p, &target).unwrap();
                let back = get_binding_point(&binding, &target).unwrap();
                assert!(close(back, p), "{ty:?} {p:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn test_binding_follows_translation() {
        let mut target = shape(ElementType::Rectangle, 0.0, 0.0, 100.0, 100.0);
        let binding = create_binding(Point::new(110.0, 50.0), &target).unwrap();
        assert!((binding.gap - 10.0).abs() < 1e-9);

        target.x += 30.0;
        target.y -= 5.0;
        let p = get_binding_point(&binding, &target).unwrap();
        assert!(close(p, Point::new(140.0, 45.0)));
    }

    #[test]
    fn test_binding_follows_resize() {
        let mut target = shape(ElementType::Ellipse, 0.0, 0.0, 100.0, 100.0);
        let binding = create_binding(Point::new(50.0, -5.0), &target).unwrap();
        target.height = 200.0;
        let p = get_binding_point(&binding, &target).unwrap();
        // Still directly above the centre, still 5 units off the boundary.
        assert!(close(p, Point::new(50.0, -5.0)));
        target.y = 10.0;
        let p = get_binding_point(&binding, &target).unwrap();
        assert!(close(p, Point::new(50.0, 5.0)));
    }

    #[test]
    fn test_binding_follows_rotation() {
        let mut target = shape(ElementType::Rectangle, 0.0, 0.0, 100.0, 50.0);
        let binding = create_binding(Point::new(105.0, 25.0), &target).unwrap();
        target.angle = FRAC_PI_2;
        let p = get_binding_point(&binding, &target).unwrap();
        // Right edge midpoint rotates to below the centre.
        assert!(close(p, Point::new(50.0, 80.0)));
    }

    #[test]
    fn test_non_bindable_target() {
        let line = arrow(Point::ZERO, Point::new(10.0, 10.0));
        assert!(create_binding(Point::ZERO, &line).is_none());
    }

    #[test]
    fn test_find_bindable_prefers_topmost_and_respects_exclude() {
        let below = shape(ElementType::Rectangle, 0.0, 0.0, 100.0, 100.0);
        let above = shape(ElementType::Rectangle, 50.0, 0.0, 100.0, 100.0);
        let store = ElementStore::from_elements([below.clone(), above.clone()]);

        let p = Point::new(100.0, -10.0);
        assert_eq!(find_bindable_element(&store, p, &[]), Some(above.id));
        assert_eq!(find_bindable_element(&store, p, &[above.id]), Some(below.id));
        assert_eq!(find_bindable_element(&store, Point::new(400.0, 400.0), &[]), None);
    }

    #[test]
    fn test_find_bindable_interior_needs_fill() {
        let mut hollow = shape(ElementType::Rectangle, 0.0, 0.0, 200.0, 200.0);
        let store = ElementStore::from_elements([hollow.clone()]);
        assert_eq!(find_bindable_element(&store, Point::new(100.0, 100.0), &[]), None);

        hollow.style.background_color = Some(SerializableColor::white());
        let store = ElementStore::from_elements([hollow.clone()]);
        assert_eq!(find_bindable_element(&store, Point::new(100.0, 100.0), &[]), Some(hollow.id));
    }

    #[test]
    fn test_find_bindable_skips_tombstones() {
        let mut target = shape(ElementType::Rectangle, 0.0, 0.0, 100.0, 100.0);
        target.is_deleted = true;
        let store = ElementStore::from_elements([target]);
        assert_eq!(find_bindable_element(&store, Point::new(105.0, 50.0), &[]), None);
    }

    #[test]
    fn test_bind_endpoint_keeps_back_references_symmetric() {
        let a = shape(ElementType::Rectangle, 0.0, 0.0, 100.0, 100.0);
        let b = shape(ElementType::Rectangle, 300.0, 0.0, 100.0, 100.0);
        let arr = arrow(Point::new(105.0, 50.0), Point::new(295.0, 50.0));
        let mut store = ElementStore::from_elements([a.clone(), b.clone(), arr.clone()]);

        let changed = bind_endpoint(&mut store, arr.id, ArrowEnd::Start, Some(a.id));
        assert!(changed.contains(&arr.id) && changed.contains(&a.id));
        bind_endpoint(&mut store, arr.id, ArrowEnd::End, Some(b.id));

        assert_eq!(store.get(a.id).unwrap().bound_elements.len(), 1);
        assert_eq!(store.get(b.id).unwrap().bound_elements[0].id, arr.id);

        // Rebinding the end to `a` drops the back-reference on `b` but `a`
        // holds a single entry.
        bind_endpoint(&mut store, arr.id, ArrowEnd::End, Some(a.id));
        assert!(store.get(b.id).unwrap().bound_elements.is_empty());
        assert_eq!(store.get(a.id).unwrap().bound_elements.len(), 1);

        // Clearing one end keeps `a` referenced through the other.
        bind_endpoint(&mut store, arr.id, ArrowEnd::End, None);
        assert_eq!(store.get(a.id).unwrap().bound_elements.len(), 1);
        bind_endpoint(&mut store, arr.id, ArrowEnd::Start, None);
        assert!(store.get(a.id).unwrap().bound_elements.is_empty());
        let data = store.get(arr.id).unwrap().arrow().unwrap().clone();
        assert!(data.start_binding.is_none() && data.end_binding.is_none());
    }

    #[test]
    fn test_update_bound_arrows_moves_only_bound_end() {
        let mut a = shape(ElementType::Rectangle, 0.0, 0.0, 100.0, 100.0);
        let mut arr = arrow(Point::new(105.0, 50.0), Point::new(300.0, 50.0));
        arr.set_absolute_points(&[
            Point::new(105.0, 50.0),
            Point::new(200.0, 0.0),
            Point::new(300.0, 50.0),
        ]);
        let mut store = ElementStore::from_elements([a.clone(), arr.clone()]);
        bind_endpoint(&mut store, arr.id, ArrowEnd::Start, Some(a.id));

        a.y += 40.0;
        store.get_mut(a.id).unwrap().y = a.y;
        let changed = update_bound_arrows(&mut store, &[a.id]);
        assert_eq!(changed, vec![arr.id]);

        let pts = store.get(arr.id).unwrap().absolute_points();
        assert!(close(pts[0], Point::new(105.0, 90.0)));
        assert!(close(pts[1], Point::new(200.0, 0.0)));
        assert!(close(pts[2], Point::new(300.0, 50.0)));
    }

    #[test]
    fn test_update_bound_arrows_skips_vanished_target() {
        let a = shape(ElementType::Rectangle, 0.0, 0.0, 100.0, 100.0);
        let arr = arrow(Point::new(105.0, 50.0), Point::new(300.0, 50.0));
        let mut store = ElementStore::from_elements([a.clone(), arr.clone()]);
        bind_endpoint(&mut store, arr.id, ArrowEnd::Start, Some(a.id));
        store.get_mut(a.id).unwrap().is_deleted = true;

        assert!(update_bound_arrows(&mut store, &[a.id]).is_empty());
        let pts = store.get(arr.id).unwrap().absolute_points();
        assert!(close(pts[0], Point::new(105.0, 50.0)));
    }
}

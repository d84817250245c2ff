//! Pointer-driven interaction state machine.
//!
//! The resolver interprets pointer events against the current tool and
//! selection, and drives the scene's mutation surface. Intermediate frames
//! use the scene's live mutations; every gesture ends with at most one
//! history entry.

use std::collections::HashMap;

use kurbo::{Point, Rect, Vec2};

use crate::binding::{self, ArrowEnd};
use crate::camera::Camera;
use crate::geometry;
use crate::hit_test::{self, HIT_TOLERANCE};
use crate::input::{PointerButton, PointerEvent};
use crate::scene::{ElementUpdate, Scene};
use crate::selection::{self, HandleKind, TransformOrigin};
use crate::shapes::{Element, ElementId, ElementType, TextMeasure};
use crate::snap::{GridSettings, snap_line_endpoint};
use crate::tools::{StyleDefaults, ToolKind};

/// Drawn elements smaller than this (canvas units) are discarded.
pub const MIN_ELEMENT_SIZE: f64 = 2.0;

/// Douglas–Peucker tolerance applied to freehand strokes on commit.
pub const FREEDRAW_SIMPLIFY_EPSILON: f64 = 0.5;

/// Everything the resolver reads or mutates while handling an event.
pub struct InteractionContext<'a> {
    pub scene: &'a mut Scene,
    pub camera: &'a mut Camera,
    pub defaults: &'a StyleDefaults,
    pub grid: &'a GridSettings,
    pub measure: &'a dyn TextMeasure,
}

#[derive(Debug, Clone)]
pub enum InteractionState {
    Idle,
    /// Marquee selection.
    Selecting { start: Point, current: Point },
    /// Moving the selection.
    Dragging {
        start: Point,
        origin: Vec<Element>,
        moved: bool,
    },
    /// Resize, rotation or connector endpoint drag.
    Resizing {
        handle: HandleKind,
        origin: TransformOrigin,
    },
    /// A new element that is not yet part of the scene.
    Drawing {
        element: Element,
        anchor: Point,
        raw_points: Vec<Point>,
        start_target: Option<ElementId>,
    },
    Panning { last_screen: Point },
    Erasing { hits: Vec<ElementId> },
}

/// Result of handling one pointer event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionOutcome {
    /// Elements whose stored state changed.
    pub changed: Vec<ElementId>,
    /// A text element was created and wants an editor.
    pub text_edit: Option<ElementId>,
}

impl InteractionOutcome {
    fn changed(changed: Vec<ElementId>) -> Self {
        Self {
            changed,
            text_edit: None,
        }
    }
}

/// Per-client interaction state: tool, selection and the active gesture.
#[derive(Debug, Clone)]
pub struct InteractionResolver {
    tool: ToolKind,
    selection: Vec<ElementId>,
    state: InteractionState,
    suggested_binding: Option<ElementId>,
}

impl Default for InteractionResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionResolver {
    pub fn new() -> Self {
        Self {
            tool: ToolKind::Select,
            selection: Vec::new(),
            state: InteractionState::Idle,
            suggested_binding: None,
        }
    }

    pub fn tool(&self) -> ToolKind {
        self.tool
    }

    /// Switch tools. Any gesture in progress must be finished or cancelled
    /// first; the selection is cleared for drawing tools.
    pub fn set_tool(&mut self, tool: ToolKind) {
        self.tool = tool;
        if tool != ToolKind::Select {
            self.selection.clear();
        }
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, InteractionState::Idle)
    }

    pub fn selection(&self) -> &[ElementId] {
        &self.selection
    }

    pub fn set_selection(&mut self, ids: Vec<ElementId>) {
        self.selection = ids;
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Drop selected ids that are no longer live, e.g. after a remote delete.
    pub fn prune_selection(&mut self, scene: &Scene) -> bool {
        let before = self.selection.len();
        self.selection.retain(|id| scene.store().get_live(*id).is_some());
        before != self.selection.len()
    }

    /// Bindable element an arrow endpoint would attach to if released now.
    pub fn suggested_binding(&self) -> Option<ElementId> {
        self.suggested_binding
    }

    /// Element being drawn, for preview rendering.
    pub fn drawing_element(&self) -> Option<&Element> {
        match &self.state {
            InteractionState::Drawing { element, .. } => Some(element),
            _ => None,
        }
    }

    /// Current marquee rectangle in canvas coordinates.
    pub fn marquee(&self) -> Option<Rect> {
        match self.state {
            InteractionState::Selecting { start, current } => Some(Rect::from_points(start, current)),
            _ => None,
        }
    }

    fn selected_elements<'s>(&self, scene: &'s Scene) -> Vec<&'s Element> {
        self.selection
            .iter()
            .filter_map(|id| scene.store().get_live(*id))
            .collect()
    }

    pub fn pointer_down(&mut self, ctx: &mut InteractionContext<'_>, event: &PointerEvent) -> InteractionOutcome {
        let point = ctx.camera.screen_to_canvas(event.position);
        let threshold = HIT_TOLERANCE / ctx.camera.zoom;
        self.suggested_binding = None;

        if event.button == PointerButton::Middle || self.tool == ToolKind::Pan {
            self.state = InteractionState::Panning {
                last_screen: event.position,
            };
            return InteractionOutcome::default();
        }

        match self.tool {
            ToolKind::Select => self.begin_select(ctx, point, threshold, event.modifiers.shift),
            ToolKind::Eraser => {
                let hits = hit_test::get_element_at_point(ctx.scene.store(), point, threshold)
                    .into_iter()
                    .collect();
                self.state = InteractionState::Erasing { hits };
                InteractionOutcome::default()
            }
            ToolKind::Text => self.create_text(ctx, point),
            tool => {
                let Some(ty) = tool.element_type() else {
                    return InteractionOutcome::default();
                };
                let anchor = ctx.grid.snap(point);
                self.begin_drawing(ctx, ty, anchor);
                InteractionOutcome::default()
            }
        }
    }

    fn begin_select(
        &mut self,
        ctx: &mut InteractionContext<'_>,
        point: Point,
        threshold: f64,
        shift: bool,
    ) -> InteractionOutcome {
        let zoom = ctx.camera.zoom;
        let selected = self.selected_elements(ctx.scene);

        // Handles of the current selection take priority.
        let handles = selection::get_handles(&selected, zoom);
        if let Some(handle) = selection::handle_at_point(&handles, point, zoom) {
            if let Some(origin) = TransformOrigin::capture(&selected) {
                self.state = InteractionState::Resizing { handle, origin };
                return InteractionOutcome::default();
            }
        }

        // Then the interior of the selection frame.
        let inside_frame = selection::selection_frame(&selected).is_some_and(|f| {
            f.contains(point) && !(selected.len() == 1 && selected[0].element_type().is_point_based())
        });
        if inside_frame && !shift {
            self.begin_drag(ctx.scene, point);
            return InteractionOutcome::default();
        }

        // Then the topmost element.
        if let Some(hit) = hit_test::get_element_at_point(ctx.scene.store(), point, threshold) {
            let members = ctx.scene.outermost_group_members(hit);
            if shift {
                if self.selection.contains(&hit) {
                    self.selection.retain(|id| !members.contains(id));
                    self.state = InteractionState::Idle;
                    return InteractionOutcome::default();
                }
                for id in members {
                    if !self.selection.contains(&id) {
                        self.selection.push(id);
                    }
                }
            } else if !self.selection.contains(&hit) {
                self.selection = members;
            }
            self.begin_drag(ctx.scene, point);
            return InteractionOutcome::default();
        }

        if !shift {
            self.selection.clear();
        }
        self.state = InteractionState::Selecting {
            start: point,
            current: point,
        };
        InteractionOutcome::default()
    }

    fn begin_drag(&mut self, scene: &Scene, point: Point) {
        let origin = self
            .selected_elements(scene)
            .into_iter()
            .cloned()
            .collect();
        self.state = InteractionState::Dragging {
            start: point,
            origin,
            moved: false,
        };
    }

    fn begin_drawing(&mut self, ctx: &mut InteractionContext<'_>, ty: ElementType, anchor: Point) {
        let mut element = Scene::create(ty, anchor.x, anchor.y, ctx.defaults, &ElementUpdate::default());
        let mut start_target = None;
        if ty.is_linear() {
            element.set_absolute_points(&[anchor, anchor]);
            if ty == ElementType::Arrow {
                start_target = binding::find_bindable_element(ctx.scene.store(), anchor, &[]);
            }
        }
        self.selection.clear();
        self.state = InteractionState::Drawing {
            element,
            anchor,
            raw_points: vec![anchor],
            start_target,
        };
    }

    fn create_text(&mut self, ctx: &mut InteractionContext<'_>, point: Point) -> InteractionOutcome {
        let anchor = ctx.grid.snap(point);
        let mut element = Scene::create(ElementType::Text, anchor.x, anchor.y, ctx.defaults, &ElementUpdate::default());
        if let Some(text) = element.text() {
            let size = ctx
                .measure
                .measure(&text.text, text.font_size, text.font_family, text.line_height);
            element.width = size.width;
            element.height = size.height;
        }
        let id = ctx.scene.add(element);
        self.selection = vec![id];
        self.state = InteractionState::Idle;
        InteractionOutcome {
            changed: vec![id],
            text_edit: Some(id),
        }
    }

    pub fn pointer_move(&mut self, ctx: &mut InteractionContext<'_>, event: &PointerEvent) -> InteractionOutcome {
        let point = ctx.camera.screen_to_canvas(event.position);
        let shift = event.modifiers.shift;
        let threshold = HIT_TOLERANCE / ctx.camera.zoom;

        match &mut self.state {
            InteractionState::Idle => InteractionOutcome::default(),
            InteractionState::Panning { last_screen } => {
                ctx.camera.pan(event.position - *last_screen);
                *last_screen = event.position;
                InteractionOutcome::default()
            }
            InteractionState::Erasing { hits } => {
                if let Some(hit) = hit_test::get_element_at_point(ctx.scene.store(), point, threshold) {
                    if !hits.contains(&hit) {
                        hits.push(hit);
                    }
                }
                InteractionOutcome::default()
            }
            InteractionState::Selecting { current, .. } => {
                *current = point;
                InteractionOutcome::default()
            }
            InteractionState::Dragging { start, origin, moved } => {
                let delta = point - *start;
                *moved |= delta.hypot2() > 0.0;
                let targets = selection::translate_all(origin, delta);
                InteractionOutcome::changed(apply_geometry(ctx.scene, &targets))
            }
            InteractionState::Resizing { handle, origin } => {
                let (targets, suggestion) = resize_targets(ctx, *handle, origin, point, shift);
                self.suggested_binding = suggestion;
                InteractionOutcome::changed(apply_geometry(ctx.scene, &targets))
            }
            InteractionState::Drawing {
                element,
                anchor,
                raw_points,
                start_target,
            } => {
                self.suggested_binding = update_drawing(ctx, element, *anchor, raw_points, *start_target, point, shift);
                InteractionOutcome::default()
            }
        }
    }

    pub fn pointer_up(&mut self, ctx: &mut InteractionContext<'_>, event: &PointerEvent) -> InteractionOutcome {
        let point = ctx.camera.screen_to_canvas(event.position);
        let shift = event.modifiers.shift;
        let state = std::mem::replace(&mut self.state, InteractionState::Idle);
        self.suggested_binding = None;

        match state {
            InteractionState::Idle | InteractionState::Panning { .. } => InteractionOutcome::default(),
            InteractionState::Erasing { hits } => {
                self.selection.retain(|id| !hits.contains(id));
                InteractionOutcome::changed(ctx.scene.delete(&hits))
            }
            InteractionState::Selecting { start, .. } => {
                let rect = Rect::from_points(start, point);
                for hit in hit_test::elements_in_rect(ctx.scene.store(), rect) {
                    for id in ctx.scene.outermost_group_members(hit) {
                        if !self.selection.contains(&id) {
                            self.selection.push(id);
                        }
                    }
                }
                InteractionOutcome::default()
            }
            InteractionState::Dragging { start, origin, moved } => {
                if !moved {
                    return InteractionOutcome::default();
                }
                let raw = point - start;
                let delta = match selection::common_bounds(&origin) {
                    Some(bounds) if ctx.grid.enabled => {
                        let corner = Point::new(bounds.x0, bounds.y0);
                        ctx.grid.snap(corner + raw) - corner
                    }
                    _ => raw,
                };
                let targets = selection::translate_all(&origin, delta);
                let mut changed = apply_geometry(ctx.scene, &targets);
                changed.extend(detach_dragged_arrows(ctx.scene, &origin));
                ctx.scene.commit();
                InteractionOutcome::changed(changed)
            }
            InteractionState::Resizing { handle, origin } => {
                let point = match handle {
                    HandleKind::Rotate => point,
                    _ => ctx.grid.snap(point),
                };
                let (targets, suggestion) = resize_targets(ctx, handle, &origin, point, shift);
                let mut changed = apply_geometry(ctx.scene, &targets);
                if let HandleKind::Endpoint(index) = handle {
                    if let Some(arrow) = origin.elements.first().filter(|e| e.arrow().is_some()) {
                        let end = if index == 0 { ArrowEnd::Start } else { ArrowEnd::End };
                        changed.extend(ctx.scene.bind_endpoint_live(arrow.id, end, suggestion));
                    }
                }
                ctx.scene.commit();
                InteractionOutcome::changed(changed)
            }
            InteractionState::Drawing {
                mut element,
                anchor,
                mut raw_points,
                start_target,
            } => {
                let end_target =
                    update_drawing(ctx, &mut element, anchor, &mut raw_points, start_target, point, shift);
                self.finish_drawing(ctx, element, anchor, raw_points, start_target, end_target)
            }
        }
    }

    fn finish_drawing(
        &mut self,
        ctx: &mut InteractionContext<'_>,
        mut element: Element,
        anchor: Point,
        raw_points: Vec<Point>,
        start_target: Option<ElementId>,
        end_target: Option<ElementId>,
    ) -> InteractionOutcome {
        let ty = element.element_type();
        if ty == ElementType::Freedraw {
            let simplified = geometry::simplify_path(&raw_points, FREEDRAW_SIMPLIFY_EPSILON);
            element.set_absolute_points(&simplified);
        } else if ty.is_linear() {
            let points = element.absolute_points();
            if let Some(last) = points.last() {
                let end = ctx.grid.snap(*last);
                element.set_absolute_points(&[anchor, end]);
            }
        } else {
            let far = ctx.grid.snap(Point::new(anchor.x + element.width, anchor.y + element.height));
            element.width = far.x - anchor.x;
            element.height = far.y - anchor.y;
            element.normalize();
        }

        let large_enough = if ty.is_point_based() {
            element.width.hypot(element.height) >= MIN_ELEMENT_SIZE
        } else {
            element.width >= MIN_ELEMENT_SIZE && element.height >= MIN_ELEMENT_SIZE
        };
        if !large_enough {
            log::debug!("discarding {ty:?} below minimum size");
            return InteractionOutcome::default();
        }

        let id = ctx.scene.add_live(element);
        let mut changed = vec![id];
        if ty == ElementType::Arrow {
            changed.extend(ctx.scene.bind_endpoint_live(id, ArrowEnd::Start, start_target));
            changed.extend(ctx.scene.bind_endpoint_live(id, ArrowEnd::End, end_target));
        }
        ctx.scene.commit();
        self.selection = vec![id];
        InteractionOutcome::changed(changed)
    }

    /// Abort the current gesture, restoring any live changes.
    pub fn cancel(&mut self, ctx: &mut InteractionContext<'_>) -> InteractionOutcome {
        let state = std::mem::replace(&mut self.state, InteractionState::Idle);
        self.suggested_binding = None;
        match state {
            InteractionState::Dragging { origin, .. } => {
                InteractionOutcome::changed(apply_geometry(ctx.scene, &origin))
            }
            InteractionState::Resizing { origin, .. } => {
                InteractionOutcome::changed(apply_geometry(ctx.scene, &origin.elements))
            }
            _ => InteractionOutcome::default(),
        }
    }
}

/// Live-apply geometry from `targets` to their scene counterparts.
fn apply_geometry(scene: &mut Scene, targets: &[Element]) -> Vec<ElementId> {
    let by_id: HashMap<ElementId, &Element> = targets.iter().map(|e| (e.id, e)).collect();
    let ids: Vec<ElementId> = targets
        .iter()
        .map(|e| e.id)
        .filter(|id| scene.store().get_live(*id).is_some())
        .collect();
    let result = scene.mutate_live(&ids, |el| {
        if let Some(src) = by_id.get(&el.id) {
            selection::copy_geometry(el, src);
        }
    });
    match result {
        Ok(changed) => changed,
        Err(e) => {
            log::warn!("failed to apply geometry: {e}");
            Vec::new()
        }
    }
}

/// Unbind ends of dragged arrows whose targets stayed put.
fn detach_dragged_arrows(scene: &mut Scene, dragged: &[Element]) -> Vec<ElementId> {
    let ids: Vec<ElementId> = dragged.iter().map(|e| e.id).collect();
    let mut changed = Vec::new();
    for element in dragged {
        let Some(data) = element.arrow() else {
            continue;
        };
        for (end, binding) in [(ArrowEnd::Start, data.start_binding), (ArrowEnd::End, data.end_binding)] {
            if let Some(binding) = binding {
                if !ids.contains(&binding.element_id) {
                    changed.extend(scene.bind_endpoint_live(element.id, end, None));
                }
            }
        }
    }
    changed
}

/// Target geometry for a resize/rotate/endpoint frame, plus an arrow binding
/// suggestion when dragging an arrow endpoint.
fn resize_targets(
    ctx: &InteractionContext<'_>,
    handle: HandleKind,
    origin: &TransformOrigin,
    point: Point,
    shift: bool,
) -> (Vec<Element>, Option<ElementId>) {
    match handle {
        HandleKind::Rotate => {
            let angle = selection::rotation_angle(origin.frame.center(), point, shift);
            (selection::rotate_to(origin, angle), None)
        }
        HandleKind::Endpoint(index) => {
            let Some(original) = origin.elements.first() else {
                return (Vec::new(), None);
            };
            let mut points = original.absolute_points();
            if index >= points.len() || points.len() < 2 {
                return (Vec::new(), None);
            }
            let other = if index == 0 { points[points.len() - 1] } else { points[0] };
            points[index] = if shift { snap_line_endpoint(other, point) } else { point };

            let mut suggestion = None;
            if let Some(data) = original.arrow() {
                let other_binding = if index == 0 { data.end_binding } else { data.start_binding };
                let mut exclude = vec![original.id];
                exclude.extend(other_binding.map(|b| b.element_id));
                suggestion = binding::find_bindable_element(ctx.scene.store(), points[index], &exclude);
            }
            let mut next = original.clone();
            next.set_absolute_points(&points);
            (vec![next], suggestion)
        }
        HandleKind::Corner(_) | HandleKind::Edge(_) => {
            let rect = selection::resize_frame(&origin.frame, handle, point, shift);
            (selection::resize_to_bounds(origin, rect, ctx.measure), None)
        }
    }
}

/// Extend the element being drawn towards `point`. Returns the binding
/// suggestion for the free end of an arrow.
fn update_drawing(
    ctx: &InteractionContext<'_>,
    element: &mut Element,
    anchor: Point,
    raw_points: &mut Vec<Point>,
    start_target: Option<ElementId>,
    point: Point,
    shift: bool,
) -> Option<ElementId> {
    match element.element_type() {
        ElementType::Freedraw => {
            if raw_points.last() != Some(&point) {
                raw_points.push(point);
            }
            element.set_absolute_points(raw_points.as_slice());
            None
        }
        ElementType::Line | ElementType::Arrow => {
            let end = if shift { snap_line_endpoint(anchor, point) } else { point };
            element.set_absolute_points(&[anchor, end]);
            if element.element_type() == ElementType::Arrow {
                let exclude: Vec<ElementId> = start_target.into_iter().collect();
                binding::find_bindable_element(ctx.scene.store(), end, &exclude)
            } else {
                None
            }
        }
        _ => {
            let mut size = point - anchor;
            if shift {
                let side = size.x.abs().max(size.y.abs());
                size = Vec2::new(side * size.x.signum(), side * size.y.signum());
            }
            element.x = anchor.x;
            element.y = anchor.y;
            element.width = size.x;
            element.height = size.y;
            None
        }
    }
}

//! Per-client canvas: scene, viewport, tools and selection.

use kurbo::{Size, Vec2};

use crate::camera::Camera;
use crate::collaboration::CollabEvent;
use crate::input::PointerEvent;
use crate::interaction::{InteractionContext, InteractionOutcome, InteractionResolver};
use crate::scene::{ElementUpdate, Scene, SceneError};
use crate::shapes::{ApproxTextMeasure, Element, ElementId, GroupId, TextMeasure};
use crate::snap::GridSettings;
use crate::storage::{AppState, LocalSnapshot};
use crate::tools::{StyleDefaults, ToolKind};

/// Everything one client needs to edit a scene.
pub struct Canvas {
    pub scene: Scene,
    pub camera: Camera,
    pub defaults: StyleDefaults,
    pub grid: GridSettings,
    resolver: InteractionResolver,
    measure: Box<dyn TextMeasure>,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

impl Canvas {
    pub fn new() -> Self {
        Self::with_text_measure(Box::new(ApproxTextMeasure))
    }

    /// Canvas measuring text through the host's font stack.
    pub fn with_text_measure(measure: Box<dyn TextMeasure>) -> Self {
        Self {
            scene: Scene::new(),
            camera: Camera::new(),
            defaults: StyleDefaults::default(),
            grid: GridSettings::default(),
            resolver: InteractionResolver::new(),
            measure,
        }
    }

    /// Restore a persisted snapshot. The loaded scene becomes the initial
    /// history entry.
    pub fn load_snapshot(&mut self, snapshot: LocalSnapshot) {
        let LocalSnapshot { elements, app_state } = snapshot;
        log::info!("loading snapshot with {} elements", elements.len());
        self.scene.replace(elements);
        self.defaults = app_state.defaults;
        self.grid = app_state.grid;
        self.camera.scroll = Vec2::new(app_state.scroll_x, app_state.scroll_y);
        self.camera.set_zoom(app_state.zoom);
        self.resolver = InteractionResolver::new();
    }

    pub fn to_snapshot(&self) -> LocalSnapshot {
        LocalSnapshot {
            elements: self.scene.elements(),
            app_state: AppState {
                defaults: self.defaults.clone(),
                scroll_x: self.camera.scroll.x,
                scroll_y: self.camera.scroll.y,
                zoom: self.camera.zoom,
                grid: self.grid,
            },
        }
    }

    pub fn text_measure(&self) -> &dyn TextMeasure {
        self.measure.as_ref()
    }

    // --- Tools and selection ---

    pub fn tool(&self) -> ToolKind {
        self.resolver.tool()
    }

    pub fn set_tool(&mut self, tool: ToolKind) {
        self.resolver.set_tool(tool);
    }

    pub fn interaction(&self) -> &InteractionResolver {
        &self.resolver
    }

    pub fn selection(&self) -> &[ElementId] {
        self.resolver.selection()
    }

    pub fn selected_elements(&self) -> Vec<&Element> {
        self.selection()
            .iter()
            .filter_map(|id| self.scene.store().get_live(*id))
            .collect()
    }

    pub fn select(&mut self, ids: Vec<ElementId>) {
        let live = ids
            .into_iter()
            .filter(|id| self.scene.store().get_live(*id).is_some())
            .collect();
        self.resolver.set_selection(live);
    }

    pub fn select_all(&mut self) {
        let ids = self.scene.live_elements().map(|e| e.id).collect();
        self.resolver.set_selection(ids);
    }

    pub fn clear_selection(&mut self) {
        self.resolver.clear_selection();
    }

    // --- Pointer input ---

    fn split(&mut self) -> (&mut InteractionResolver, InteractionContext<'_>) {
        (
            &mut self.resolver,
            InteractionContext {
                scene: &mut self.scene,
                camera: &mut self.camera,
                defaults: &self.defaults,
                grid: &self.grid,
                measure: self.measure.as_ref(),
            },
        )
    }

    pub fn pointer_down(&mut self, event: &PointerEvent) -> InteractionOutcome {
        let (resolver, mut ctx) = self.split();
        resolver.pointer_down(&mut ctx, event)
    }

    pub fn pointer_move(&mut self, event: &PointerEvent) -> InteractionOutcome {
        let (resolver, mut ctx) = self.split();
        resolver.pointer_move(&mut ctx, event)
    }

    pub fn pointer_up(&mut self, event: &PointerEvent) -> InteractionOutcome {
        let (resolver, mut ctx) = self.split();
        resolver.pointer_up(&mut ctx, event)
    }

    /// Abort the gesture in progress (e.g. on Escape).
    pub fn cancel_interaction(&mut self) -> InteractionOutcome {
        let (resolver, mut ctx) = self.split();
        resolver.cancel(&mut ctx)
    }

    // --- Commands on the selection ---

    pub fn delete_selected(&mut self) -> Vec<ElementId> {
        let ids = self.selection().to_vec();
        self.resolver.clear_selection();
        self.scene.delete(&ids)
    }

    /// Apply a style or geometry update to every selected element as one
    /// undoable step.
    pub fn update_selected(&mut self, update: &ElementUpdate) -> Result<Vec<ElementId>, SceneError> {
        let updates: Vec<(ElementId, ElementUpdate)> = self
            .selected_elements()
            .iter()
            .map(|e| (e.id, update.clone()))
            .collect();
        if updates.is_empty() {
            return Ok(Vec::new());
        }
        self.scene.update_many(&updates)
    }

    /// Move the selection by `delta` canvas units.
    pub fn nudge_selected(&mut self, delta: Vec2) -> Result<Vec<ElementId>, SceneError> {
        let updates: Vec<(ElementId, ElementUpdate)> = self
            .selected_elements()
            .iter()
            .map(|e| (e.id, ElementUpdate::position(e.x + delta.x, e.y + delta.y)))
            .collect();
        if updates.is_empty() {
            return Ok(Vec::new());
        }
        self.scene.update_many(&updates)
    }

    pub fn set_text(&mut self, id: ElementId, text: &str) -> Result<Vec<ElementId>, SceneError> {
        self.scene.set_text(id, text, self.measure.as_ref())
    }

    pub fn group_selected(&mut self) -> Option<GroupId> {
        let ids = self.selection().to_vec();
        self.scene.group(&ids).map(|(group, _)| group)
    }

    /// Dissolve the outermost group of each selected element.
    pub fn ungroup_selected(&mut self) -> Vec<ElementId> {
        let mut groups: Vec<GroupId> = Vec::new();
        for element in self.selected_elements() {
            if let Some(group) = element.outermost_group() {
                if !groups.contains(group) {
                    groups.push(group.clone());
                }
            }
        }
        groups.iter().flat_map(|g| self.scene.ungroup(g)).collect()
    }

    pub fn bring_to_front(&mut self) -> Vec<ElementId> {
        let ids = self.selection().to_vec();
        self.scene.bring_to_front(&ids)
    }

    pub fn send_to_back(&mut self) -> Vec<ElementId> {
        let ids = self.selection().to_vec();
        self.scene.send_to_back(&ids)
    }

    pub fn bring_forward(&mut self) -> Vec<ElementId> {
        let ids = self.selection().to_vec();
        self.scene.bring_forward(&ids)
    }

    pub fn send_backward(&mut self) -> Vec<ElementId> {
        let ids = self.selection().to_vec();
        self.scene.send_backward(&ids)
    }

    // --- History ---

    pub fn undo(&mut self) -> Vec<ElementId> {
        self.resolver.clear_selection();
        self.scene.undo()
    }

    pub fn redo(&mut self) -> Vec<ElementId> {
        self.resolver.clear_selection();
        self.scene.redo()
    }

    // --- Viewport ---

    pub fn zoom_to_fit(&mut self, viewport: Size) {
        if let Some(bounds) = self.scene.store().live_bounds() {
            self.camera.fit_to_bounds(bounds, viewport, 40.0);
        }
    }

    // --- Collaboration ---

    /// React to collaboration events: drop selected elements that were
    /// deleted remotely and centre the viewport when asked.
    pub fn apply_collab_events(&mut self, events: &[CollabEvent], viewport: Size) {
        for event in events {
            match event {
                CollabEvent::Synced { .. } | CollabEvent::ElementsChanged(_) => {
                    self.resolver.prune_selection(&self.scene);
                }
                CollabEvent::CenterOn(point) => self.camera.center_on(*point, viewport),
                _ => {}
            }
        }
    }
}

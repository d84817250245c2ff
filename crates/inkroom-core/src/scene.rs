//! The canonical scene and its mutation surface.
//!
//! Every mutation bumps the version of each element it touches exactly once.
//! Committing mutations also record a history snapshot; the `*_live` variants
//! skip history for high-frequency drag frames and are followed by a single
//! [`Scene::commit`].

use std::collections::HashSet;

use kurbo::{Point, Rect};
use thiserror::Error;
use uuid::Uuid;

use crate::binding::{self, ArrowEnd};
use crate::history::{History, SceneSnapshot};
use crate::shapes::{
    Arrowhead, Element, ElementId, ElementKind, ElementType, FillPattern, FontFamily, GroupId,
    SerializableColor, Sloppiness, StrokeStyle, TextMeasure,
};
use crate::store::ElementStore;
use crate::tools::StyleDefaults;

/// Errors from scene mutations.
#[derive(Debug, Error, PartialEq)]
pub enum SceneError {
    #[error("element not found: {0}")]
    NotFound(ElementId),
    #[error("element is deleted: {0}")]
    Deleted(ElementId),
    #[error("element {0} is not a text element")]
    NotText(ElementId),
}

/// Partial element update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementUpdate {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub angle: Option<f64>,
    /// Points relative to the element origin.
    pub points: Option<Vec<Point>>,
    pub stroke_color: Option<SerializableColor>,
    pub background_color: Option<Option<SerializableColor>>,
    pub fill_pattern: Option<FillPattern>,
    pub stroke_width: Option<f64>,
    pub stroke_style: Option<StrokeStyle>,
    pub sloppiness: Option<Sloppiness>,
    pub roundness: Option<f64>,
    pub opacity: Option<f64>,
    pub font_size: Option<f64>,
    pub font_family: Option<FontFamily>,
    pub file_id: Option<String>,
    pub start_arrowhead: Option<Option<Arrowhead>>,
    pub end_arrowhead: Option<Option<Arrowhead>>,
}

impl ElementUpdate {
    pub fn position(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Default::default()
        }
    }

    pub fn size(width: f64, height: f64) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Default::default()
        }
    }

    pub fn rect(rect: Rect) -> Self {
        Self {
            x: Some(rect.x0),
            y: Some(rect.y0),
            width: Some(rect.width()),
            height: Some(rect.height()),
            ..Default::default()
        }
    }

    /// Whether the update changes geometry that bindings depend on.
    pub fn moves(&self) -> bool {
        self.x.is_some()
            || self.y.is_some()
            || self.width.is_some()
            || self.height.is_some()
            || self.angle.is_some()
            || self.points.is_some()
    }

    /// Apply the set fields to `element`. Fields that do not apply to the
    /// element's type are ignored.
    pub fn apply(&self, element: &mut Element) {
        macro_rules! set {
            ($value:expr => $target:expr) => {
                if let Some(v) = &$value {
                    $target = v.clone();
                }
            };
        }
        set!(self.x => element.x);
        set!(self.y => element.y);
        set!(self.width => element.width);
        set!(self.height => element.height);
        set!(self.stroke_color => element.style.stroke_color);
        set!(self.background_color => element.style.background_color);
        set!(self.fill_pattern => element.style.fill_pattern);
        set!(self.stroke_width => element.style.stroke_width);
        set!(self.stroke_style => element.style.stroke_style);
        set!(self.sloppiness => element.style.sloppiness);
        set!(self.roundness => element.style.roundness);
        set!(self.opacity => element.style.opacity);

        let point_based = element.element_type().is_point_based();
        if let Some(angle) = self.angle {
            if !point_based {
                element.angle = angle;
            }
        }
        if let Some(points) = &self.points {
            if point_based {
                let origin = Point::new(element.x, element.y).to_vec2();
                let absolute: Vec<Point> = points.iter().map(|p| *p + origin).collect();
                element.set_absolute_points(&absolute);
            }
        }

        match &mut element.kind {
            ElementKind::Text(text) => {
                set!(self.font_size => text.font_size);
                set!(self.font_family => text.font_family);
            }
            ElementKind::Image(image) => {
                set!(self.file_id => image.file_id);
            }
            ElementKind::Arrow(arrow) => {
                set!(self.start_arrowhead => arrow.start_arrowhead);
                set!(self.end_arrowhead => arrow.end_arrowhead);
            }
            _ => {}
        }
    }
}

/// Element model plus its local undo history.
#[derive(Debug, Clone)]
pub struct Scene {
    store: ElementStore,
    history: History,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Empty scene whose history starts at the empty state.
    pub fn new() -> Self {
        Self::from_elements(Vec::new())
    }

    /// Hydrate a scene and checkpoint it as the initial history entry.
    pub fn from_elements(elements: Vec<Element>) -> Self {
        let store = ElementStore::from_elements(elements);
        let mut history = History::default();
        history.reset(SceneSnapshot::new(store.to_vec()));
        Self { store, history }
    }

    /// Build an uncommitted element (`version == 0`) stamped with `defaults`
    /// and then `overrides`.
    pub fn create(
        ty: ElementType,
        x: f64,
        y: f64,
        defaults: &StyleDefaults,
        overrides: &ElementUpdate,
    ) -> Element {
        let mut element = Element::create(ty, x, y, defaults);
        overrides.apply(&mut element);
        element
    }

    pub fn store(&self) -> &ElementStore {
        &self.store
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.store.get(id)
    }

    /// All elements in paint order, tombstones included.
    pub fn elements(&self) -> Vec<Element> {
        self.store.to_vec()
    }

    /// Live elements in paint order.
    pub fn live_elements(&self) -> impl DoubleEndedIterator<Item = &Element> {
        self.store.live()
    }

    fn live_mut(&mut self, id: ElementId) -> Result<&mut Element, SceneError> {
        match self.store.get_mut(id) {
            None => Err(SceneError::NotFound(id)),
            Some(e) if e.is_deleted => Err(SceneError::Deleted(id)),
            Some(e) => Ok(e),
        }
    }

    fn bump_all(&mut self, ids: &[ElementId]) {
        let mut seen = HashSet::new();
        for id in ids {
            if seen.insert(*id) {
                if let Some(element) = self.store.get_mut(*id) {
                    element.bump_version();
                }
            }
        }
    }

    /// Record the current state as a history entry, unless nothing changed
    /// since the last one.
    pub fn commit(&mut self) {
        let snapshot = SceneSnapshot::new(self.store.to_vec());
        if self
            .history
            .current()
            .is_some_and(|current| current.same_content(&snapshot))
        {
            return;
        }
        self.history.record(snapshot);
    }

    /// Commit a freshly created element at version 1 (or its next version).
    pub fn add(&mut self, element: Element) -> ElementId {
        let id = self.add_live(element);
        self.commit();
        id
    }

    /// Insert a new element without recording history.
    pub fn add_live(&mut self, mut element: Element) -> ElementId {
        element.bump_version();
        element.is_deleted = false;
        let id = element.id;
        self.store.insert(element);
        id
    }

    /// Apply a partial update as one undoable step.
    pub fn update(&mut self, id: ElementId, update: &ElementUpdate) -> Result<Vec<ElementId>, SceneError> {
        let changed = self.update_live(id, update)?;
        self.commit();
        Ok(changed)
    }

    /// Apply several partial updates as one undoable step.
    pub fn update_many(
        &mut self,
        updates: &[(ElementId, ElementUpdate)],
    ) -> Result<Vec<ElementId>, SceneError> {
        for (id, _) in updates {
            self.live_mut(*id)?;
        }
        let mut touched = Vec::new();
        let mut moved = Vec::new();
        for (id, update) in updates {
            let element = self.live_mut(*id)?;
            update.apply(element);
            touched.push(*id);
            if update.moves() {
                moved.push(*id);
            }
        }
        touched.extend(binding::update_bound_arrows(&mut self.store, &moved));
        self.bump_all(&touched);
        self.commit();
        Ok(dedup(touched))
    }

    /// Apply a partial update without recording history.
    pub fn update_live(&mut self, id: ElementId, update: &ElementUpdate) -> Result<Vec<ElementId>, SceneError> {
        let element = self.live_mut(id)?;
        update.apply(element);
        let mut touched = vec![id];
        if update.moves() {
            touched.extend(binding::update_bound_arrows(&mut self.store, &[id]));
        }
        self.bump_all(&touched);
        Ok(dedup(touched))
    }

    /// Mutate elements in place without recording history. Bound arrows of
    /// every mutated element are re-derived.
    pub fn mutate_live<F>(&mut self, ids: &[ElementId], mut f: F) -> Result<Vec<ElementId>, SceneError>
    where
        F: FnMut(&mut Element),
    {
        for id in ids {
            self.live_mut(*id)?;
        }
        for id in ids {
            f(self.live_mut(*id)?);
        }
        let mut touched = ids.to_vec();
        touched.extend(binding::update_bound_arrows(&mut self.store, ids));
        self.bump_all(&touched);
        Ok(dedup(touched))
    }

    /// Replace the text of a text element and re-measure its box.
    pub fn set_text(
        &mut self,
        id: ElementId,
        text: &str,
        measure: &dyn TextMeasure,
    ) -> Result<Vec<ElementId>, SceneError> {
        let element = self.live_mut(id)?;
        let ElementKind::Text(data) = &mut element.kind else {
            return Err(SceneError::NotText(id));
        };
        data.text = text.to_string();
        let size = measure.measure(&data.text, data.font_size, data.font_family, data.line_height);
        element.width = size.width;
        element.height = size.height;
        let mut touched = vec![id];
        touched.extend(binding::update_bound_arrows(&mut self.store, &[id]));
        self.bump_all(&touched);
        self.commit();
        Ok(dedup(touched))
    }

    /// Tombstone elements as one undoable step.
    ///
    /// Deleted arrows are detached from their targets' back-reference lists.
    /// Arrows bound to a deleted shape keep their binding and last point.
    pub fn delete(&mut self, ids: &[ElementId]) -> Vec<ElementId> {
        let touched = self.delete_live(ids);
        self.commit();
        touched
    }

    fn delete_live(&mut self, ids: &[ElementId]) -> Vec<ElementId> {
        let mut touched = Vec::new();
        for id in ids {
            if self.store.get_live(*id).is_none() {
                continue;
            }
            touched.extend(binding::detach_arrow(&mut self.store, *id));
            if let Some(element) = self.store.get_mut(*id) {
                element.is_deleted = true;
                touched.push(*id);
            }
        }
        self.bump_all(&touched);
        dedup(touched)
    }

    /// Set or clear an arrow endpoint binding without recording history.
    pub fn bind_endpoint_live(
        &mut self,
        arrow_id: ElementId,
        end: ArrowEnd,
        target: Option<ElementId>,
    ) -> Vec<ElementId> {
        let touched = binding::bind_endpoint(&mut self.store, arrow_id, end, target);
        self.bump_all(&touched);
        touched
    }

    /// Set or clear an arrow endpoint binding as one undoable step.
    pub fn bind_endpoint(
        &mut self,
        arrow_id: ElementId,
        end: ArrowEnd,
        target: Option<ElementId>,
    ) -> Vec<ElementId> {
        let touched = self.bind_endpoint_live(arrow_id, end, target);
        self.commit();
        touched
    }

    fn reorder<F>(&mut self, ids: &[ElementId], f: F) -> Vec<ElementId>
    where
        F: FnOnce(&mut Vec<ElementId>, &HashSet<ElementId>),
    {
        let selected: HashSet<ElementId> = ids.iter().copied().filter(|id| self.store.contains(*id)).collect();
        if selected.is_empty() {
            return Vec::new();
        }
        let before = self.store.order().to_vec();
        let mut order = before.clone();
        f(&mut order, &selected);
        if order == before {
            return Vec::new();
        }
        self.store.set_order(order);
        self.commit();
        before.into_iter().filter(|id| selected.contains(id)).collect()
    }

    /// Move elements to the top of the paint order, keeping their relative order.
    pub fn bring_to_front(&mut self, ids: &[ElementId]) -> Vec<ElementId> {
        self.reorder(ids, |order, selected| {
            let (mut rest, picked): (Vec<_>, Vec<_>) =
                order.iter().copied().partition(|id| !selected.contains(id));
            rest.extend(picked);
            *order = rest;
        })
    }

    /// Move elements to the bottom of the paint order.
    pub fn send_to_back(&mut self, ids: &[ElementId]) -> Vec<ElementId> {
        self.reorder(ids, |order, selected| {
            let (mut picked, rest): (Vec<_>, Vec<_>) =
                order.iter().copied().partition(|id| selected.contains(id));
            picked.extend(rest);
            *order = picked;
        })
    }

    /// Move each element one step up, over the next unselected element.
    pub fn bring_forward(&mut self, ids: &[ElementId]) -> Vec<ElementId> {
        self.reorder(ids, |order, selected| {
            for i in (0..order.len().saturating_sub(1)).rev() {
                if selected.contains(&order[i]) && !selected.contains(&order[i + 1]) {
                    order.swap(i, i + 1);
                }
            }
        })
    }

    /// Move each element one step down, under the previous unselected element.
    pub fn send_backward(&mut self, ids: &[ElementId]) -> Vec<ElementId> {
        self.reorder(ids, |order, selected| {
            for i in 1..order.len() {
                if selected.contains(&order[i]) && !selected.contains(&order[i - 1]) {
                    order.swap(i, i - 1);
                }
            }
        })
    }

    /// Put elements into a new group. Returns the group id, or `None` when
    /// fewer than two live elements were given.
    pub fn group(&mut self, ids: &[ElementId]) -> Option<(GroupId, Vec<ElementId>)> {
        let members: Vec<ElementId> = dedup(
            ids.iter()
                .copied()
                .filter(|id| self.store.get_live(*id).is_some())
                .collect(),
        );
        if members.len() < 2 {
            return None;
        }
        let group_id = Uuid::new_v4().to_string();
        for id in &members {
            if let Some(element) = self.store.get_mut(*id) {
                element.group_ids.push(group_id.clone());
            }
        }
        self.bump_all(&members);
        self.commit();
        Some((group_id, members))
    }

    /// Remove a group from every member.
    pub fn ungroup(&mut self, group_id: &str) -> Vec<ElementId> {
        let members = self.group_members(group_id);
        for id in &members {
            if let Some(element) = self.store.get_mut(*id) {
                element.group_ids.retain(|g| g != group_id);
            }
        }
        self.bump_all(&members);
        if !members.is_empty() {
            self.commit();
        }
        members
    }

    /// Live members of a group in paint order.
    pub fn group_members(&self, group_id: &str) -> Vec<ElementId> {
        self.store
            .live()
            .filter(|e| e.group_ids.iter().any(|g| g == group_id))
            .map(|e| e.id)
            .collect()
    }

    /// The element itself, or every member of its outermost group.
    pub fn outermost_group_members(&self, id: ElementId) -> Vec<ElementId> {
        match self.store.get_live(id).and_then(Element::outermost_group) {
            Some(group) => self.group_members(group),
            None => vec![id],
        }
    }

    /// Merge remote elements. Never recorded as an undo step; accepted
    /// elements are folded into every history snapshot so undo only reverts
    /// local changes.
    pub fn merge_remote(&mut self, elements: Vec<Element>) -> Vec<ElementId> {
        let accepted = self.store.merge(elements);
        let merged: Vec<Element> = accepted
            .iter()
            .filter_map(|id| self.store.get(*id).cloned())
            .collect();
        self.history.rebase(&merged);
        accepted
    }

    /// Apply a remote paint order, as carried by a full `sync`.
    pub fn apply_remote_order(&mut self, order: Vec<ElementId>) {
        self.store.set_order(order);
    }

    /// Replace the scene wholesale (e.g. after loading) and checkpoint it.
    pub fn replace(&mut self, elements: Vec<Element>) {
        *self = Self::from_elements(elements);
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Revert the last committed step. Returns the ids that changed.
    pub fn undo(&mut self) -> Vec<ElementId> {
        let Some((from, to)) = self.history.undo() else {
            return Vec::new();
        };
        let (from, to) = (from.clone(), to.clone());
        self.restore(&from, &to)
    }

    /// Re-apply the last undone step. Returns the ids that changed.
    pub fn redo(&mut self) -> Vec<ElementId> {
        let Some((from, to)) = self.history.redo() else {
            return Vec::new();
        };
        let (from, to) = (from.clone(), to.clone());
        self.restore(&from, &to)
    }

    /// Move the live scene from `from` to `to`, touching only elements that
    /// differ between the two snapshots so concurrent remote edits to other
    /// elements survive. Restored elements get a version above the live one
    /// so peers accept the change.
    fn restore(&mut self, from: &SceneSnapshot, to: &SceneSnapshot) -> Vec<ElementId> {
        let before_map = from.index();
        let after_map = to.index();
        let mut ids: Vec<ElementId> = to.order();
        ids.extend(from.order().into_iter().filter(|id| !after_map.contains_key(id)));

        let mut touched = Vec::new();
        for id in ids {
            let before = before_map.get(&id).copied();
            let after = after_map.get(&id).copied();
            let differs = match (before, after) {
                (Some(b), Some(a)) => !b.same_content(a),
                _ => true,
            };
            if !differs {
                continue;
            }
            let live_version = self.store.get(id).map(|e| e.version);
            let next = match after {
                Some(target) => target.clone(),
                None => match self.store.get(id) {
                    Some(live) if !live.is_deleted => {
                        let mut gone = live.clone();
                        gone.is_deleted = true;
                        gone
                    }
                    _ => continue,
                },
            };
            if self.store.get(id).is_some_and(|live| live.same_content(&next)) {
                continue;
            }
            let mut next = next;
            next.version = live_version.unwrap_or(next.version);
            next.bump_version();
            self.store.insert(next);
            touched.push(id);
        }

        let order_changed = from.order() != to.order();
        if order_changed {
            self.store.set_order(to.order());
        }
        touched
    }
}

fn dedup(ids: Vec<ElementId>) -> Vec<ElementId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::ArrowEnd;
    use crate::shapes::ApproxTextMeasure;

    fn add_rect(scene: &mut Scene, x: f64, y: f64) -> ElementId {
        let el = Scene::create(
            ElementType::Rectangle,
            x,
            y,
            &StyleDefaults::default(),
            &ElementUpdate::size(100.0, 100.0),
        );
        scene.add(el)
    }

    fn version(scene: &Scene, id: ElementId) -> u32 {
        scene.get(id).unwrap().version
    }

    #[test]
    fn test_create_applies_defaults_then_overrides() {
        let defaults = StyleDefaults {
            stroke_width: 4.0,
            font_size: 32.0,
            ..Default::default()
        };
        let overrides = ElementUpdate {
            stroke_width: Some(1.0),
            ..Default::default()
        };
        let text = Scene::create(ElementType::Text, 0.0, 0.0, &defaults, &overrides);
        assert_eq!(text.version, 0);
        assert_eq!(text.style.stroke_width, 1.0);
        assert_eq!(text.text().unwrap().font_size, 32.0);
    }

    #[test]
    fn test_add_commits_at_version_one() {
        let mut scene = Scene::new();
        let id = add_rect(&mut scene, 0.0, 0.0);
        assert_eq!(version(&scene, id), 1);
        assert!(scene.can_undo());
    }

    #[test]
    fn test_every_mutation_increases_version() {
        let mut scene = Scene::new();
        let id = add_rect(&mut scene, 0.0, 0.0);
        let mut last = version(&scene, id);

        scene.update(id, &ElementUpdate::position(10.0, 10.0)).unwrap();
        assert!(version(&scene, id) > last);
        last = version(&scene, id);

        scene.update_live(id, &ElementUpdate::position(20.0, 10.0)).unwrap();
        assert!(version(&scene, id) > last);
        last = version(&scene, id);

        scene.delete(&[id]);
        assert!(version(&scene, id) > last);
        last = version(&scene, id);

        scene.undo();
        assert!(version(&scene, id) > last);
    }

    #[test]
    fn test_update_unknown_or_deleted() {
        let mut scene = Scene::new();
        let missing = Uuid::new_v4();
        assert_eq!(
            scene.update(missing, &ElementUpdate::default()),
            Err(SceneError::NotFound(missing))
        );
        let id = add_rect(&mut scene, 0.0, 0.0);
        scene.delete(&[id]);
        assert_eq!(
            scene.update(id, &ElementUpdate::default()),
            Err(SceneError::Deleted(id))
        );
    }

    #[test]
    fn test_update_many_is_one_history_entry() {
        let mut scene = Scene::new();
        let a = add_rect(&mut scene, 0.0, 0.0);
        let b = add_rect(&mut scene, 200.0, 0.0);
        let entries = scene.history().len();
        scene
            .update_many(&[
                (a, ElementUpdate::position(5.0, 5.0)),
                (b, ElementUpdate::position(205.0, 5.0)),
            ])
            .unwrap();
        assert_eq!(scene.history().len(), entries + 1);
        scene.undo();
        assert_eq!(scene.get(a).unwrap().x, 0.0);
        assert_eq!(scene.get(b).unwrap().x, 200.0);
    }

    #[test]
    fn test_live_updates_consolidate_on_commit() {
        let mut scene = Scene::new();
        let id = add_rect(&mut scene, 0.0, 0.0);
        let entries = scene.history().len();
        for step in 1..=10 {
            scene.update_live(id, &ElementUpdate::position(step as f64, 0.0)).unwrap();
        }
        assert_eq!(scene.history().len(), entries);
        scene.commit();
        assert_eq!(scene.history().len(), entries + 1);
        scene.commit();
        assert_eq!(scene.history().len(), entries + 1);

        scene.undo();
        assert_eq!(scene.get(id).unwrap().x, 0.0);
    }

    #[test]
    fn test_delete_tombstones_and_undo_restores() {
        let mut scene = Scene::new();
        let id = add_rect(&mut scene, 0.0, 0.0);
        scene.delete(&[id]);
        assert!(scene.get(id).unwrap().is_deleted);
        assert_eq!(scene.live_elements().count(), 0);
        assert_eq!(scene.elements().len(), 1);

        let changed = scene.undo();
        assert_eq!(changed, vec![id]);
        assert!(!scene.get(id).unwrap().is_deleted);

        scene.redo();
        assert!(scene.get(id).unwrap().is_deleted);
    }

    #[test]
    fn test_undo_of_creation_tombstones() {
        let mut scene = Scene::new();
        let id = add_rect(&mut scene, 0.0, 0.0);
        scene.undo();
        assert!(scene.get(id).unwrap().is_deleted);
        assert_eq!(version(&scene, id), 2);
        scene.redo();
        assert!(!scene.get(id).unwrap().is_deleted);
        assert_eq!(version(&scene, id), 3);
    }

    #[test]
    fn test_new_mutation_truncates_redo() {
        let mut scene = Scene::new();
        let id = add_rect(&mut scene, 0.0, 0.0);
        scene.update(id, &ElementUpdate::position(50.0, 0.0)).unwrap();
        scene.undo();
        assert!(scene.can_redo());
        scene.update(id, &ElementUpdate::position(70.0, 0.0)).unwrap();
        assert!(!scene.can_redo());
        assert!(scene.redo().is_empty());
    }

    #[test]
    fn test_undo_keeps_remote_edits_to_other_elements() {
        let mut scene = Scene::new();
        let mine = add_rect(&mut scene, 0.0, 0.0);

        let mut remote = Scene::create(
            ElementType::Ellipse,
            300.0,
            0.0,
            &StyleDefaults::default(),
            &ElementUpdate::size(10.0, 10.0),
        );
        remote.version = 1;
        let remote_id = remote.id;
        scene.merge_remote(vec![remote]);

        scene.update(mine, &ElementUpdate::position(40.0, 0.0)).unwrap();
        scene.undo();
        assert_eq!(scene.get(mine).unwrap().x, 0.0);
        assert!(scene.store().get_live(remote_id).is_some());
    }

    #[test]
    fn test_z_order_operations() {
        let mut scene = Scene::new();
        let a = add_rect(&mut scene, 0.0, 0.0);
        let b = add_rect(&mut scene, 0.0, 0.0);
        let c = add_rect(&mut scene, 0.0, 0.0);
        let d = add_rect(&mut scene, 0.0, 0.0);

        scene.bring_to_front(&[a, b]);
        assert_eq!(scene.store().order(), &[c, d, a, b]);
        scene.send_to_back(&[b]);
        assert_eq!(scene.store().order(), &[b, c, d, a]);
        scene.bring_forward(&[b, c]);
        assert_eq!(scene.store().order(), &[d, b, c, a]);
        scene.send_backward(&[a]);
        assert_eq!(scene.store().order(), &[d, b, a, c]);

        // Already at the back: nothing changes, nothing recorded.
        let entries = scene.history().len();
        assert!(scene.send_to_back(&[d]).is_empty());
        assert_eq!(scene.history().len(), entries);

        scene.undo();
        assert_eq!(scene.store().order(), &[d, b, c, a]);
    }

    #[test]
    fn test_group_and_ungroup() {
        let mut scene = Scene::new();
        let a = add_rect(&mut scene, 0.0, 0.0);
        let b = add_rect(&mut scene, 200.0, 0.0);
        let lone = add_rect(&mut scene, 400.0, 0.0);

        assert!(scene.group(&[a]).is_none());
        let (group, members) = scene.group(&[a, b]).unwrap();
        assert_eq!(members, vec![a, b]);
        assert_eq!(scene.outermost_group_members(a), vec![a, b]);
        assert_eq!(scene.outermost_group_members(lone), vec![lone]);

        let (outer, _) = scene.group(&[a, b, lone]).unwrap();
        assert_eq!(scene.outermost_group_members(a), vec![a, b, lone]);
        scene.ungroup(&outer);
        assert_eq!(scene.outermost_group_members(a), vec![a, b]);
        scene.ungroup(&group);
        assert_eq!(scene.outermost_group_members(a), vec![a]);
    }

    #[test]
    fn test_moving_shape_drags_bound_arrow() {
        let mut scene = Scene::new();
        let target = add_rect(&mut scene, 0.0, 0.0);
        let mut arrow = Scene::create(
            ElementType::Arrow,
            0.0,
            0.0,
            &StyleDefaults::default(),
            &ElementUpdate::default(),
        );
        arrow.set_absolute_points(&[Point::new(105.0, 50.0), Point::new(300.0, 50.0)]);
        let arrow_id = scene.add(arrow);
        scene.bind_endpoint(arrow_id, ArrowEnd::Start, Some(target));
        let arrow_version = version(&scene, arrow_id);

        let changed = scene.update(target, &ElementUpdate::position(0.0, 100.0)).unwrap();
        assert!(changed.contains(&arrow_id));
        assert!(version(&scene, arrow_id) > arrow_version);
        let start = scene.get(arrow_id).unwrap().absolute_points()[0];
        assert!((start.y - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_deleting_arrow_clears_back_reference() {
        let mut scene = Scene::new();
        let target = add_rect(&mut scene, 0.0, 0.0);
        let mut arrow = Scene::create(
            ElementType::Arrow,
            0.0,
            0.0,
            &StyleDefaults::default(),
            &ElementUpdate::default(),
        );
        arrow.set_absolute_points(&[Point::new(105.0, 50.0), Point::new(300.0, 50.0)]);
        let arrow_id = scene.add(arrow);
        scene.bind_endpoint(arrow_id, ArrowEnd::Start, Some(target));
        assert_eq!(scene.get(target).unwrap().bound_elements.len(), 1);

        let changed = scene.delete(&[arrow_id]);
        assert!(changed.contains(&target));
        assert!(scene.get(target).unwrap().bound_elements.is_empty());
    }

    #[test]
    fn test_set_text_remeasures() {
        let mut scene = Scene::new();
        let text = Scene::create(
            ElementType::Text,
            0.0,
            0.0,
            &StyleDefaults::default(),
            &ElementUpdate::default(),
        );
        let id = scene.add(text);
        scene.set_text(id, "hello", &ApproxTextMeasure).unwrap();
        let el = scene.get(id).unwrap();
        assert!(el.width > 0.0);
        assert!((el.height - 25.0).abs() < 1e-9);

        let rect = add_rect(&mut scene, 0.0, 0.0);
        assert_eq!(
            scene.set_text(rect, "x", &ApproxTextMeasure),
            Err(SceneError::NotText(rect))
        );
    }
}

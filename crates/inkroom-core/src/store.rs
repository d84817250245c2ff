//! Id-keyed element storage with paint order and the version merge rule.
//!
//! The same store backs a client scene and a server room, so both sides
//! resolve concurrent edits identically.

use std::cmp::Ordering;
use std::collections::HashMap;

use kurbo::Rect;

use crate::geometry;
use crate::shapes::{Element, ElementId};

/// Decide whether `incoming` replaces `local` for the same id.
///
/// A strictly higher version wins. Equal versions are ordered
/// deterministically: a tombstone beats a live copy, then the lower
/// `version_nonce` wins. Identical pairs keep the local copy, which makes
/// re-delivery a no-op.
pub fn incoming_wins(local: &Element, incoming: &Element) -> bool {
    match incoming.version.cmp(&local.version) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => match (incoming.is_deleted, local.is_deleted) {
            (true, false) => true,
            (false, true) => false,
            _ => incoming.version_nonce < local.version_nonce,
        },
    }
}

/// Ordered collection of elements keyed by id.
///
/// Tombstoned elements stay in the store so deletions keep merging like any
/// other update.
#[derive(Debug, Clone, Default)]
pub struct ElementStore {
    elements: HashMap<ElementId, Element>,
    /// Paint order, back to front.
    order: Vec<ElementId>,
}

impl ElementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from an ordered element list. Later duplicates of an id
    /// are merged with the normal rule.
    pub fn from_elements<I: IntoIterator<Item = Element>>(elements: I) -> Self {
        let mut store = Self::new();
        store.merge(elements);
        store
    }

    /// Number of stored elements, tombstones included.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.elements.contains_key(&id)
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    /// Live (non-tombstoned) element by id.
    pub fn get_live(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id).filter(|e| !e.is_deleted)
    }

    pub(crate) fn get_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.elements.get_mut(&id)
    }

    /// Insert or overwrite an element without consulting versions.
    /// New ids are painted on top.
    pub(crate) fn insert(&mut self, element: Element) {
        if !self.elements.contains_key(&element.id) {
            self.order.push(element.id);
        }
        self.elements.insert(element.id, element);
    }

    /// Paint order, back to front.
    pub fn order(&self) -> &[ElementId] {
        &self.order
    }

    /// Replace the paint order. Ids missing from `order` keep their relative
    /// order and go on top; unknown ids are ignored.
    pub(crate) fn set_order(&mut self, order: Vec<ElementId>) {
        let mut seen = std::collections::HashSet::with_capacity(order.len());
        let mut next: Vec<ElementId> = order
            .into_iter()
            .filter(|id| self.elements.contains_key(id) && seen.insert(*id))
            .collect();
        next.extend(self.order.iter().filter(|id| !seen.contains(*id)).copied());
        self.order = next;
    }

    /// All elements back to front, tombstones included.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Element> {
        self.order.iter().filter_map(|id| self.elements.get(id))
    }

    /// Live elements back to front.
    pub fn live(&self) -> impl DoubleEndedIterator<Item = &Element> {
        self.iter().filter(|e| !e.is_deleted)
    }

    /// Cloned element list in paint order.
    pub fn to_vec(&self) -> Vec<Element> {
        self.iter().cloned().collect()
    }

    /// Bounds of every live element.
    pub fn live_bounds(&self) -> Option<Rect> {
        geometry::union_bounds(self.live().map(Element::bounds))
    }

    /// Merge incoming elements, returning the ids that were accepted.
    pub fn merge<I: IntoIterator<Item = Element>>(&mut self, incoming: I) -> Vec<ElementId> {
        let mut accepted = Vec::new();
        for element in incoming {
            let take = match self.elements.get(&element.id) {
                None => true,
                Some(local) => incoming_wins(local, &element),
            };
            if take {
                accepted.push(element.id);
                self.insert(element);
            }
        }
        accepted
    }
}

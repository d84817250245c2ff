//! Bounded undo/redo log of full-scene snapshots.
//!
//! Entries live in a plain `Vec` with a cursor pointing at the snapshot that
//! matches the live scene. Recording after an undo truncates the redo tail.

use std::collections::HashMap;

use crate::shapes::{Element, ElementId};

/// Maximum number of snapshots kept.
pub const MAX_HISTORY: usize = 100;

/// Scene content at one point in time, in paint order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneSnapshot {
    pub elements: Vec<Element>,
}

impl SceneSnapshot {
    pub fn new(elements: Vec<Element>) -> Self {
        Self { elements }
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// Id lookup over the snapshot's elements.
    pub fn index(&self) -> HashMap<ElementId, &Element> {
        self.elements.iter().map(|e| (e.id, e)).collect()
    }

    /// Overwrite or append elements.
    fn upsert(&mut self, elements: &[Element]) {
        for element in elements {
            match self.elements.iter_mut().find(|e| e.id == element.id) {
                Some(slot) => *slot = element.clone(),
                None => self.elements.push(element.clone()),
            }
        }
    }

    pub fn order(&self) -> Vec<ElementId> {
        self.elements.iter().map(|e| e.id).collect()
    }

    /// Same elements with the same content and order, ignoring versions.
    pub fn same_content(&self, other: &SceneSnapshot) -> bool {
        self.elements.len() == other.elements.len()
            && self
                .elements
                .iter()
                .zip(&other.elements)
                .all(|(a, b)| a.same_content(b))
    }
}

#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<SceneSnapshot>,
    cursor: usize,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_capacity(MAX_HISTORY)
    }
}

impl History {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            capacity: capacity.max(1),
        }
    }

    /// Drop every entry and start over from `initial`.
    pub fn reset(&mut self, initial: SceneSnapshot) {
        self.entries.clear();
        self.entries.push(initial);
        self.cursor = 0;
    }

    /// Append a snapshot after the cursor, discarding any redo tail.
    pub fn record(&mut self, snapshot: SceneSnapshot) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push(snapshot);
        if self.entries.len() > self.capacity {
            let overflow = self.entries.len() - self.capacity;
            self.entries.drain(..overflow);
        }
        self.cursor = self.entries.len() - 1;
    }

    /// Fold elements that changed outside local history into every entry.
    pub fn rebase(&mut self, elements: &[Element]) {
        if elements.is_empty() {
            return;
        }
        for entry in &mut self.entries {
            entry.upsert(elements);
        }
    }

    /// Snapshot matching the live scene.
    pub fn current(&self) -> Option<&SceneSnapshot> {
        self.entries.get(self.cursor)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// Step back. Returns `(from, to)`: the snapshot being left and the one
    /// to restore.
    pub fn undo(&mut self) -> Option<(&SceneSnapshot, &SceneSnapshot)> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        Some((&self.entries[self.cursor + 1], &self.entries[self.cursor]))
    }

    /// Step forward. Returns `(from, to)` like [`History::undo`].
    pub fn redo(&mut self) -> Option<(&SceneSnapshot, &SceneSnapshot)> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        Some((&self.entries[self.cursor - 1], &self.entries[self.cursor]))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

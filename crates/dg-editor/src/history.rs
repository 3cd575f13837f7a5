//! Undo/redo history.
//!
//! Every committed unit of work becomes one [`UndoEntry`] holding the
//! snapshot sets it produced. Entries are plain data: undo restores the
//! `Before` side of each set (newest first), redo the `After` side.
//!
//! A mark bookmarks the stack height so a live preview can repeatedly
//! roll back to it and re-apply. Entries undone to the mark are discarded,
//! not moved to the redo stack.

use dg_core::snapshot::{Side, SnapshotSet};
use dg_core::uow::{UnitOfWork, UowOptions};
use dg_core::{ChangeSet, Diagram, UowError};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One undoable step: a label, when it happened, and what it changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoEntry {
    pub description: String,
    pub timestamp_ms: u64,
    /// Snapshot sets in commit order.
    pub actions: Vec<SnapshotSet>,
}

impl UndoEntry {
    pub fn new(description: &str, set: SnapshotSet) -> Self {
        Self {
            description: description.to_string(),
            timestamp_ms: now_ms(),
            actions: vec![set],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.iter().all(SnapshotSet::is_empty)
    }

    /// Restore the state before this entry. One change event is emitted.
    fn unapply(&self, diagram: &mut Diagram) -> ChangeSet {
        diagram.events_mut().suspend();
        let mut changes = ChangeSet::default();
        for set in self.actions.iter().rev() {
            changes.merge(&set.restore(diagram, Side::Before));
        }
        diagram.events_mut().resume();
        changes
    }

    /// Restore the state after this entry. One change event is emitted.
    fn apply(&self, diagram: &mut Diagram) -> ChangeSet {
        diagram.events_mut().suspend();
        let mut changes = ChangeSet::default();
        for set in &self.actions {
            changes.merge(&set.restore(diagram, Side::After));
        }
        diagram.events_mut().resume();
        changes
    }

    /// Compact MessagePack encoding for diagnostics.
    pub fn to_msgpack(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec_named(self)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// Manages undo/redo stacks with a preview mark and combined entries.
#[derive(Debug)]
pub struct UndoManager {
    undo_stack: Vec<UndoEntry>,
    redo_stack: Vec<UndoEntry>,
    /// Maximum undo depth.
    max_depth: usize,
    /// Undo stack height when the mark was set.
    mark: Option<usize>,
    /// Nesting depth of `combine` (0 = not combining).
    combine_depth: usize,
    combined: Option<UndoEntry>,
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new(100)
    }
}

impl UndoManager {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: Vec::with_capacity(max_depth.min(256)),
            redo_stack: Vec::new(),
            max_depth: max_depth.max(1),
            mark: None,
            combine_depth: 0,
            combined: None,
        }
    }

    /// Record an already-applied entry. Empty entries are dropped.
    /// Returns whether the entry was recorded.
    pub fn add(&mut self, entry: UndoEntry) -> bool {
        if entry.is_empty() {
            return false;
        }
        if self.combine_depth > 0 {
            match &mut self.combined {
                Some(acc) => acc.actions.extend(entry.actions),
                None => self.combined = Some(entry),
            }
            return true;
        }
        self.push(entry);
        true
    }

    fn push(&mut self, entry: UndoEntry) {
        log::debug!("history: push `{}`", entry.description);
        self.undo_stack.push(entry);
        if self.undo_stack.len() > self.max_depth {
            self.undo_stack.remove(0);
            if let Some(mark) = &mut self.mark {
                if *mark == 0 {
                    log::warn!("history: entry under the mark trimmed by max depth");
                }
                *mark = mark.saturating_sub(1);
            }
        }
        // Clear redo stack on new action
        self.redo_stack.clear();
    }

    /// Apply `entry` to the diagram, then record it.
    pub fn add_and_execute(&mut self, diagram: &mut Diagram, entry: UndoEntry) -> bool {
        entry.apply(diagram);
        self.add(entry)
    }

    /// Run `f` in one unit of work and record the result under `label`.
    /// If `f` fails, the unit of work is aborted and nothing is recorded.
    pub fn execute_with_undo<T, E>(
        &mut self,
        diagram: &mut Diagram,
        label: &str,
        f: impl FnOnce(&mut UnitOfWork<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<UowError>,
    {
        let (value, set) = UnitOfWork::execute(diagram, UowOptions::default(), f)?;
        self.add(UndoEntry::new(label, set));
        Ok(value)
    }

    /// Undo the last entry. Returns its description.
    pub fn undo(&mut self, diagram: &mut Diagram) -> Option<String> {
        let entry = self.undo_stack.pop()?;
        entry.unapply(diagram);
        let desc = entry.description.clone();
        self.redo_stack.push(entry);
        Some(desc)
    }

    /// Redo the last undone entry. Returns its description.
    pub fn redo(&mut self, diagram: &mut Diagram) -> Option<String> {
        let entry = self.redo_stack.pop()?;
        entry.apply(diagram);
        let desc = entry.description.clone();
        self.undo_stack.push(entry);
        Some(desc)
    }

    /// Bookmark the current stack height.
    pub fn set_mark(&mut self) {
        self.mark = Some(self.undo_stack.len());
    }

    pub fn clear_mark(&mut self) {
        self.mark = None;
    }

    pub fn has_mark(&self) -> bool {
        self.mark.is_some()
    }

    /// Undo and discard every entry above the mark. The mark stays set.
    /// Returns the number of entries undone.
    pub fn undo_to_mark(&mut self, diagram: &mut Diagram) -> usize {
        let Some(mark) = self.mark else {
            return 0;
        };
        let mut undone = 0;
        while self.undo_stack.len() > mark {
            if let Some(entry) = self.undo_stack.pop() {
                entry.unapply(diagram);
                undone += 1;
            }
        }
        undone
    }

    /// Merge every entry above the mark into one entry labelled `label`.
    pub fn collapse_to_mark(&mut self, label: &str) {
        let Some(mark) = self.mark else {
            return;
        };
        if self.undo_stack.len() <= mark {
            return;
        }
        let tail: Vec<UndoEntry> = self.undo_stack.drain(mark..).collect();
        let mut merged = UndoEntry {
            description: label.to_string(),
            timestamp_ms: tail.last().map_or_else(now_ms, |e| e.timestamp_ms),
            actions: Vec::new(),
        };
        for entry in tail {
            merged.actions.extend(entry.actions);
        }
        self.undo_stack.push(merged);
    }

    pub fn clear_redo(&mut self) {
        self.redo_stack.clear();
    }

    /// Run `f`, merging every entry it records into one compound entry.
    /// Change events are held until the outermost `combine` returns.
    pub fn combine<R>(
        &mut self,
        diagram: &mut Diagram,
        f: impl FnOnce(&mut Diagram, &mut UndoManager) -> R,
    ) -> R {
        self.combine_depth += 1;
        diagram.events_mut().suspend();
        let result = f(diagram, self);
        self.combine_depth -= 1;
        if self.combine_depth == 0
            && let Some(entry) = self.combined.take()
        {
            self.push(entry);
        }
        diagram.events_mut().resume();
        result
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Undo entries, oldest first.
    pub fn entries(&self) -> &[UndoEntry] {
        &self.undo_stack
    }

    pub fn redo_entries(&self) -> &[UndoEntry] {
        &self.redo_stack
    }
}

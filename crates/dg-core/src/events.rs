//! Change notification.
//!
//! One [`DiagramEvent::Change`] is emitted per commit, undo or redo. While
//! the bus is suspended, change sets are merged into a single pending one
//! and delivered on the matching `resume`.

use crate::id::{ElementId, LayerId, StylesheetId};
use crate::model::ElementType;
use serde::{Deserialize, Serialize};

/// What one committed operation touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeSet {
    pub added: Vec<ElementId>,
    pub updated: Vec<ElementId>,
    pub removed: Vec<ElementId>,
    /// Kinds of every element in `added`, `updated` or `removed`.
    pub element_types: Vec<ElementType>,
    pub stylesheets: Vec<StylesheetId>,
    pub layers: Vec<LayerId>,
    /// Schema ids whose element data changed (or whose definition changed).
    pub schemas: Vec<String>,
    /// Diagram-level props changed.
    pub diagram: bool,
}

fn push_unique<T: PartialEq + Clone>(into: &mut Vec<T>, items: &[T]) {
    for item in items {
        if !into.contains(item) {
            into.push(item.clone());
        }
    }
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.updated.is_empty()
            && self.removed.is_empty()
            && self.stylesheets.is_empty()
            && self.layers.is_empty()
            && self.schemas.is_empty()
            && !self.diagram
    }

    /// Fold `other` into `self`, keeping first-seen order.
    pub fn merge(&mut self, other: &ChangeSet) {
        push_unique(&mut self.added, &other.added);
        push_unique(&mut self.updated, &other.updated);
        push_unique(&mut self.removed, &other.removed);
        push_unique(&mut self.element_types, &other.element_types);
        push_unique(&mut self.stylesheets, &other.stylesheets);
        push_unique(&mut self.layers, &other.layers);
        push_unique(&mut self.schemas, &other.schemas);
        self.diagram |= other.diagram;
    }

    pub fn touches_type(&self, element_type: ElementType) -> bool {
        self.element_types.contains(&element_type)
    }

    pub fn touches_schema(&self, schema: &str) -> bool {
        self.schemas.iter().any(|s| s == schema)
    }
}

/// Something observers may react to.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagramEvent {
    Change(ChangeSet),
    /// Selection replaced. Never queued.
    Selection(Vec<ElementId>),
}

pub type ListenerId = usize;

type Listener = Box<dyn FnMut(&DiagramEvent)>;

/// Synchronous listener registry.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<(ListenerId, Listener)>,
    next_id: ListenerId,
    suspended: usize,
    pending: Option<ChangeSet>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .field("suspended", &self.suspended)
            .field("pending", &self.pending)
            .finish()
    }
}

impl EventBus {
    /// Register a listener. Listeners run in registration order.
    pub fn subscribe(&mut self, listener: impl FnMut(&DiagramEvent) + 'static) -> ListenerId {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Deliver `event` now, or queue it when suspended.
    pub fn emit(&mut self, event: DiagramEvent) {
        if let DiagramEvent::Change(ref changes) = event {
            if changes.is_empty() {
                return;
            }
            if self.suspended > 0 {
                self.pending
                    .get_or_insert_with(ChangeSet::default)
                    .merge(changes);
                return;
            }
        }
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
    }

    /// Hold back change events until the matching [`resume`](Self::resume).
    pub fn suspend(&mut self) {
        self.suspended += 1;
    }

    /// Release one suspension; the outermost release delivers the merged change set.
    pub fn resume(&mut self) {
        self.suspended = self.suspended.saturating_sub(1);
        if self.suspended == 0
            && let Some(pending) = self.pending.take()
        {
            self.emit(DiagramEvent::Change(pending));
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended > 0
    }
}

//! Before/after state captured by a unit of work.
//!
//! A [`SnapshotSet`] is plain data: for every entity a transaction changed
//! it holds the state before and after. Undo restores the `Before` side,
//! redo the `After` side. Nothing here captures references into the live
//! diagram, so sets can be serialized for diagnostics.

use crate::events::{ChangeSet, DiagramEvent};
use crate::id::{ElementId, LayerId, StylesheetId};
use crate::model::{DataSchema, Diagram, Element, Layer};
use crate::props::DiagramProps;
use crate::stylesheet::Stylesheet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which entity a snapshot describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "kebab-case")]
pub enum SnapshotKey {
    Element(ElementId),
    /// Child order of one parent; `None` is the top level.
    Children(Option<ElementId>),
    Stylesheet(StylesheetId),
    Layer(LayerId),
    Schemas,
    Diagram,
}

/// Captured state of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Snapshot {
    Element {
        element: Element,
        parent: Option<ElementId>,
    },
    Children {
        ids: Vec<ElementId>,
    },
    Stylesheet {
        sheet: Stylesheet,
        index: usize,
    },
    Layer {
        layer: Layer,
        index: usize,
    },
    Schemas {
        schemas: Vec<DataSchema>,
    },
    Diagram {
        props: DiagramProps,
    },
}

impl Snapshot {
    /// Current state of `key`, or `None` if the entity does not exist.
    pub fn capture(diagram: &Diagram, key: &SnapshotKey) -> Option<Snapshot> {
        match key {
            SnapshotKey::Element(id) => diagram.lookup(*id).map(|el| Snapshot::Element {
                element: el.clone(),
                parent: diagram.parent(*id),
            }),
            SnapshotKey::Children(parent) => match parent {
                Some(p) if !diagram.contains(*p) => None,
                Some(p) => Some(Snapshot::Children {
                    ids: diagram.children(*p),
                }),
                None => Some(Snapshot::Children {
                    ids: diagram.top_level(),
                }),
            },
            SnapshotKey::Stylesheet(id) => {
                let store = diagram.stylesheets();
                let index = store.index_of(*id)?;
                store.get(*id).map(|sheet| Snapshot::Stylesheet {
                    sheet: sheet.clone(),
                    index,
                })
            }
            SnapshotKey::Layer(id) => diagram
                .layers()
                .iter()
                .position(|l| l.id == *id)
                .map(|index| Snapshot::Layer {
                    layer: diagram.layers()[index].clone(),
                    index,
                }),
            SnapshotKey::Schemas => Some(Snapshot::Schemas {
                schemas: diagram.schemas().to_vec(),
            }),
            SnapshotKey::Diagram => Some(Snapshot::Diagram {
                props: diagram.props().clone(),
            }),
        }
    }

    fn element_type(&self) -> Option<crate::model::ElementType> {
        match self {
            Snapshot::Element { element, .. } => Some(element.element_type()),
            _ => None,
        }
    }
}

/// Record in `changes` what moving `key` from `from` to `to` means.
pub(crate) fn record_change(
    key: &SnapshotKey,
    from: Option<&Snapshot>,
    to: Option<&Snapshot>,
    changes: &mut ChangeSet,
) {
    let mut single = ChangeSet::default();
    match key {
        SnapshotKey::Element(id) => {
            match (from, to) {
                (None, Some(_)) => single.added.push(*id),
                (Some(_), None) => single.removed.push(*id),
                (Some(_), Some(_)) => single.updated.push(*id),
                (None, None) => return,
            }
            if let Some(t) = from.or(to).and_then(Snapshot::element_type) {
                single.element_types.push(t);
            }
            single.schemas = data_schemas_changed(from, to);
        }
        // Order changes ride along with the element entries that caused them.
        SnapshotKey::Children(_) => return,
        SnapshotKey::Stylesheet(id) => single.stylesheets.push(*id),
        SnapshotKey::Layer(id) => single.layers.push(*id),
        SnapshotKey::Schemas => {
            let ids = |s: Option<&Snapshot>| match s {
                Some(Snapshot::Schemas { schemas }) => schemas.clone(),
                _ => Vec::new(),
            };
            let (a, b) = (ids(from), ids(to));
            for schema in a.iter().chain(&b) {
                let before = a.iter().find(|s| s.id == schema.id);
                let after = b.iter().find(|s| s.id == schema.id);
                if before != after && !single.schemas.contains(&schema.id) {
                    single.schemas.push(schema.id.clone());
                }
            }
        }
        SnapshotKey::Diagram => single.diagram = true,
    }
    changes.merge(&single);
}

/// Schema ids whose custom data differs between two element snapshots.
fn data_schemas_changed(from: Option<&Snapshot>, to: Option<&Snapshot>) -> Vec<String> {
    let data = |s: Option<&Snapshot>| match s {
        Some(Snapshot::Element { element, .. }) => Some(element.metadata.data.clone()),
        _ => None,
    };
    let (a, b) = (data(from).unwrap_or_default(), data(to).unwrap_or_default());
    let mut out: Vec<String> = Vec::new();
    for key in a.keys().chain(b.keys()) {
        if a.get(key) != b.get(key) && !out.contains(key) {
            out.push(key.clone());
        }
    }
    out
}

/// Which side of a snapshot set to restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub key: SnapshotKey,
    pub before: Option<Snapshot>,
    pub after: Option<Snapshot>,
}

impl SnapshotEntry {
    fn side(&self, side: Side) -> Option<&Snapshot> {
        match side {
            Side::Before => self.before.as_ref(),
            Side::After => self.after.as_ref(),
        }
    }
}

/// Reversible description of one committed transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSet {
    entries: Vec<SnapshotEntry>,
}

impl SnapshotSet {
    pub(crate) fn push(&mut self, entry: SnapshotEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Compose with a set committed after this one. Entries that end where
    /// they started are dropped.
    pub fn then(&mut self, later: SnapshotSet) {
        let mut index: HashMap<SnapshotKey, usize> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.key.clone(), i))
            .collect();
        for entry in later.entries {
            match index.get(&entry.key) {
                Some(&i) => self.entries[i].after = entry.after,
                None => {
                    index.insert(entry.key.clone(), self.entries.len());
                    self.entries.push(entry);
                }
            }
        }
        self.entries.retain(|e| e.before != e.after);
    }

    /// What restoring `side` changes, relative to the opposite side.
    pub fn change_set(&self, side: Side) -> ChangeSet {
        let opposite = match side {
            Side::Before => Side::After,
            Side::After => Side::Before,
        };
        let mut changes = ChangeSet::default();
        for entry in &self.entries {
            record_change(&entry.key, entry.side(opposite), entry.side(side), &mut changes);
        }
        changes
    }

    /// Put the live diagram into the `side` state without notifying.
    pub(crate) fn apply(&self, diagram: &mut Diagram, side: Side) {
        // Removals first, so re-created ids never collide.
        for entry in &self.entries {
            if entry.side(side).is_some() {
                continue;
            }
            match &entry.key {
                SnapshotKey::Element(id) => {
                    diagram.remove_element(*id);
                }
                SnapshotKey::Stylesheet(id) => {
                    diagram.stylesheets_mut().sheets.shift_remove(id);
                }
                SnapshotKey::Layer(id) => diagram.layers.retain(|l| l.id != *id),
                SnapshotKey::Children(_) | SnapshotKey::Schemas | SnapshotKey::Diagram => {}
            }
        }

        let mut pending: Vec<(Element, Option<ElementId>)> = Vec::new();
        let mut orders: Vec<(Option<ElementId>, &[ElementId])> = Vec::new();
        let mut sheets: Vec<(Stylesheet, usize)> = Vec::new();
        let mut layers: Vec<(Layer, usize)> = Vec::new();
        for entry in &self.entries {
            let Some(snapshot) = entry.side(side) else {
                continue;
            };
            match snapshot {
                Snapshot::Element { element, parent } => pending.push((element.clone(), *parent)),
                Snapshot::Children { ids } => {
                    if let SnapshotKey::Children(parent) = &entry.key {
                        orders.push((*parent, ids.as_slice()));
                    }
                }
                Snapshot::Stylesheet { sheet, index } => sheets.push((sheet.clone(), *index)),
                Snapshot::Layer { layer, index } => layers.push((layer.clone(), *index)),
                Snapshot::Schemas { schemas } => diagram.schemas = schemas.clone(),
                Snapshot::Diagram { props } => diagram.props = props.clone(),
            }
        }

        sheets.sort_by_key(|(_, index)| *index);
        for (sheet, index) in sheets {
            let store = &mut diagram.stylesheets_mut().sheets;
            if let Some(slot) = store.get_mut(&sheet.id) {
                *slot = sheet;
            } else {
                let at = index.min(store.len());
                store.shift_insert(at, sheet.id, sheet);
            }
        }

        layers.sort_by_key(|(_, index)| *index);
        for (layer, index) in layers {
            if let Some(slot) = diagram.layer_mut(layer.id) {
                *slot = layer;
            } else {
                let at = index.min(diagram.layers.len());
                diagram.layers.insert(at, layer);
            }
        }

        // Parents must exist before their children are attached.
        while !pending.is_empty() {
            let before = pending.len();
            pending.retain(|(element, parent)| {
                let ready = parent.is_none_or(|p| diagram.contains(p));
                if ready {
                    diagram.upsert_element(*parent, element.clone());
                }
                !ready
            });
            if pending.len() == before {
                for (element, parent) in pending.drain(..) {
                    log::warn!(
                        "restoring {} without missing parent {:?}",
                        element.id,
                        parent
                    );
                    diagram.upsert_element(None, element);
                }
            }
        }

        for (parent, ids) in orders {
            diagram.set_child_order(parent, ids);
        }
    }

    /// Restore `side` and emit one change event. Returns the change set.
    pub fn restore(&self, diagram: &mut Diagram, side: Side) -> ChangeSet {
        self.apply(diagram, side);
        let changes = self.change_set(side);
        diagram.events.emit(DiagramEvent::Change(changes.clone()));
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

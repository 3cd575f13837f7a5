//! Unit of work: one atomic, snapshot-tracked batch of mutations.
//!
//! Mutations are applied eagerly to the live diagram. The first touch of an
//! entity captures its before-state; `commit` diffs every touched entity
//! against its current state, emits exactly one change event and returns the
//! [`SnapshotSet`] an undo entry is built from. `abort` puts the captured
//! states back without notifying anyone.
//!
//! A unit of work dropped while still open is a bug in the caller. It is
//! logged and asserted in debug builds; the live diagram keeps whatever was
//! applied.

use crate::error::UowError;
use crate::events::{ChangeSet, DiagramEvent};
use crate::id::{ElementId, LayerId, StylesheetId};
use crate::model::{DataSchema, Diagram, Element, ElementType, Layer};
use crate::path::PropertyObject;
use crate::props::{DiagramProps, PropPath, PropValue};
use crate::snapshot::{Side, Snapshot, SnapshotEntry, SnapshotKey, SnapshotSet, record_change};
use crate::stylesheet::Stylesheet;
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UowOptions {
    /// Capture before-states. Without them the commit returns an empty
    /// snapshot set and `abort` cannot restore anything.
    pub snapshots: bool,
}

impl Default for UowOptions {
    fn default() -> Self {
        Self { snapshots: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UowState {
    Open,
    Committed,
    Aborted,
}

impl UowState {
    pub const fn as_str(self) -> &'static str {
        match self {
            UowState::Open => "open",
            UowState::Committed => "committed",
            UowState::Aborted => "aborted",
        }
    }
}

/// What we know about a touched entity when before-states are not captured.
#[derive(Debug, Clone, Copy)]
struct Touch {
    existed: bool,
    element_type: Option<ElementType>,
}

type CommitCallback<'a> = Box<dyn FnOnce(&ChangeSet) + 'a>;

pub struct UnitOfWork<'a> {
    diagram: &'a mut Diagram,
    options: UowOptions,
    state: UowState,
    touched: IndexMap<SnapshotKey, Touch>,
    before: IndexMap<SnapshotKey, Option<Snapshot>>,
    /// Elements to report as updated even when their data is unchanged.
    refreshed: Vec<ElementId>,
    callbacks: Vec<CommitCallback<'a>>,
}

impl std::fmt::Debug for UnitOfWork<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("state", &self.state)
            .field("options", &self.options)
            .field("touched", &self.touched.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<'a> UnitOfWork<'a> {
    /// Open a transaction with default options.
    pub fn begin(diagram: &'a mut Diagram) -> Self {
        Self::with_options(diagram, UowOptions::default())
    }

    pub fn with_options(diagram: &'a mut Diagram, options: UowOptions) -> Self {
        Self {
            diagram,
            options,
            state: UowState::Open,
            touched: IndexMap::new(),
            before: IndexMap::new(),
            refreshed: Vec::new(),
            callbacks: Vec::new(),
        }
    }

    /// Open, run `f`, then commit. If `f` fails the transaction is aborted
    /// and the error returned.
    pub fn execute<T, E>(
        diagram: &mut Diagram,
        options: UowOptions,
        f: impl FnOnce(&mut UnitOfWork<'_>) -> Result<T, E>,
    ) -> Result<(T, SnapshotSet), E>
    where
        E: From<UowError>,
    {
        let mut uow = UnitOfWork::with_options(diagram, options);
        match f(&mut uow) {
            Ok(value) => {
                let set = uow.commit()?;
                Ok((value, set))
            }
            Err(err) => {
                if uow.state == UowState::Open
                    && let Err(abort_err) = uow.abort()
                {
                    log::error!("abort after failed operation: {abort_err}");
                }
                Err(err)
            }
        }
    }

    /// Read access to the live (partially mutated) diagram.
    pub fn diagram(&self) -> &Diagram {
        self.diagram
    }

    pub fn state(&self) -> UowState {
        self.state
    }

    pub fn options(&self) -> UowOptions {
        self.options
    }

    fn ensure_open(&self) -> Result<(), UowError> {
        match self.state {
            UowState::Open => Ok(()),
            other => Err(UowError::InvalidState(other.as_str())),
        }
    }

    fn register(&mut self, key: SnapshotKey) {
        if self.touched.contains_key(&key) {
            return;
        }
        let current = Snapshot::capture(self.diagram, &key);
        let element_type = match &current {
            Some(Snapshot::Element { element, .. }) => Some(element.element_type()),
            _ => None,
        };
        self.touched.insert(
            key.clone(),
            Touch {
                existed: current.is_some(),
                element_type,
            },
        );
        if self.options.snapshots {
            self.before.insert(key, current);
        }
    }

    /// Capture the before-state of `key`. Repeated calls are no-ops.
    pub fn snapshot(&mut self, key: SnapshotKey) -> Result<(), UowError> {
        self.ensure_open()?;
        self.register(key);
        Ok(())
    }

    /// Report `id` as updated on commit without changing it.
    pub fn touch(&mut self, id: ElementId) -> Result<(), UowError> {
        self.ensure_open()?;
        if !self.diagram.contains(id) {
            return Err(UowError::UnknownElement(id));
        }
        if !self.refreshed.contains(&id) {
            self.refreshed.push(id);
        }
        Ok(())
    }

    /// Run `callback` with the committed change set, after listeners.
    pub fn on_commit(&mut self, callback: impl FnOnce(&ChangeSet) + 'a) -> Result<(), UowError> {
        self.ensure_open()?;
        self.callbacks.push(Box::new(callback));
        Ok(())
    }

    // ─── Elements ────────────────────────────────────────────────────────

    /// Insert a new element under `parent` (or at top level).
    pub fn add_element(
        &mut self,
        parent: Option<ElementId>,
        element: Element,
    ) -> Result<ElementId, UowError> {
        self.ensure_open()?;
        let id = element.id;
        if self.diagram.contains(id) {
            return Err(UowError::DuplicateId(id.to_string()));
        }
        if let Some(p) = parent
            && !self.diagram.contains(p)
        {
            return Err(UowError::UnknownElement(p));
        }
        if self.diagram.layer(element.layer).is_none() {
            return Err(UowError::UnknownLayer(element.layer));
        }
        self.register(SnapshotKey::Element(id));
        self.register(SnapshotKey::Children(parent));
        self.diagram.insert_element(parent, element);
        Ok(id)
    }

    /// Mutate an element in place. The id cannot change; moving the element
    /// to an unknown layer is rejected and reverted.
    pub fn update_element(
        &mut self,
        id: ElementId,
        f: impl FnOnce(&mut Element),
    ) -> Result<(), UowError> {
        self.ensure_open()?;
        if !self.diagram.contains(id) {
            return Err(UowError::UnknownElement(id));
        }
        self.register(SnapshotKey::Element(id));
        let Some(element) = self.diagram.element_mut(id) else {
            return Err(UowError::UnknownElement(id));
        };
        let old_layer = element.layer;
        f(element);
        element.id = id;
        let new_layer = element.layer;
        if self.diagram.layer(new_layer).is_none() {
            if let Some(element) = self.diagram.element_mut(id) {
                element.layer = old_layer;
            }
            return Err(UowError::UnknownLayer(new_layer));
        }
        Ok(())
    }

    /// Set (or clear) one direct property override.
    pub fn set_prop(
        &mut self,
        id: ElementId,
        path: PropPath,
        value: Option<PropValue>,
    ) -> Result<(), UowError> {
        self.ensure_open()?;
        let mut props = self
            .diagram
            .lookup(id)
            .map(|e| e.props.clone())
            .ok_or(UowError::UnknownElement(id))?;
        props.set(path, value)?;
        self.update_element(id, |e| e.props = props)
    }

    /// Remove an element and its whole subtree. Returns the removed ids,
    /// parents first.
    pub fn remove_element(&mut self, id: ElementId) -> Result<Vec<ElementId>, UowError> {
        self.ensure_open()?;
        if !self.diagram.contains(id) {
            return Err(UowError::UnknownElement(id));
        }
        let subtree = self.diagram.subtree(id);
        self.register(SnapshotKey::Children(self.diagram.parent(id)));
        for element in &subtree {
            self.register(SnapshotKey::Element(*element));
            if !self.diagram.children(*element).is_empty() {
                self.register(SnapshotKey::Children(Some(*element)));
            }
        }
        for element in subtree.iter().rev() {
            self.diagram.remove_element(*element);
        }
        Ok(subtree)
    }

    /// Re-parent an element (or move it to top level).
    pub fn move_element(&mut self, id: ElementId, parent: Option<ElementId>) -> Result<(), UowError> {
        self.ensure_open()?;
        if !self.diagram.contains(id) {
            return Err(UowError::UnknownElement(id));
        }
        if let Some(p) = parent {
            if !self.diagram.contains(p) {
                return Err(UowError::UnknownElement(p));
            }
            if self.diagram.subtree(id).contains(&p) {
                return Err(UowError::InvalidMove {
                    element: id,
                    parent: p,
                });
            }
        }
        self.register(SnapshotKey::Element(id));
        self.register(SnapshotKey::Children(self.diagram.parent(id)));
        self.register(SnapshotKey::Children(parent));
        self.diagram.reparent(id, parent);
        Ok(())
    }

    // ─── Stylesheets ─────────────────────────────────────────────────────

    /// Insert a sheet as is. See [`crate::stylesheet::add_stylesheet`] for
    /// the checked variant.
    pub fn insert_stylesheet(&mut self, sheet: Stylesheet) -> Result<(), UowError> {
        self.ensure_open()?;
        if self.diagram.stylesheets().contains(sheet.id) {
            return Err(UowError::DuplicateId(sheet.id.to_string()));
        }
        self.register(SnapshotKey::Stylesheet(sheet.id));
        self.diagram.stylesheets_mut().sheets.insert(sheet.id, sheet);
        Ok(())
    }

    pub fn update_stylesheet(
        &mut self,
        id: StylesheetId,
        f: impl FnOnce(&mut Stylesheet),
    ) -> Result<(), UowError> {
        self.ensure_open()?;
        if !self.diagram.stylesheets().contains(id) {
            return Err(UowError::UnknownStylesheet(id));
        }
        self.register(SnapshotKey::Stylesheet(id));
        if let Some(sheet) = self.diagram.stylesheets_mut().sheets.get_mut(&id) {
            f(sheet);
            sheet.id = id;
        }
        Ok(())
    }

    /// Remove a sheet without touching its referrers. See
    /// [`crate::stylesheet::delete_stylesheet`] for the reassigning variant.
    pub fn remove_stylesheet(&mut self, id: StylesheetId) -> Result<Stylesheet, UowError> {
        self.ensure_open()?;
        if !self.diagram.stylesheets().contains(id) {
            return Err(UowError::UnknownStylesheet(id));
        }
        self.register(SnapshotKey::Stylesheet(id));
        self.diagram
            .stylesheets_mut()
            .sheets
            .shift_remove(&id)
            .ok_or(UowError::UnknownStylesheet(id))
    }

    // ─── Layers, schemas, diagram ────────────────────────────────────────

    pub fn add_layer(&mut self, layer: Layer) -> Result<(), UowError> {
        self.ensure_open()?;
        if self.diagram.layer(layer.id).is_some() {
            return Err(UowError::DuplicateId(layer.id.to_string()));
        }
        self.register(SnapshotKey::Layer(layer.id));
        self.diagram.layers.push(layer);
        Ok(())
    }

    pub fn update_layer(&mut self, id: LayerId, f: impl FnOnce(&mut Layer)) -> Result<(), UowError> {
        self.ensure_open()?;
        if self.diagram.layer(id).is_none() {
            return Err(UowError::UnknownLayer(id));
        }
        self.register(SnapshotKey::Layer(id));
        if let Some(layer) = self.diagram.layer_mut(id) {
            f(layer);
            layer.id = id;
        }
        Ok(())
    }

    /// Remove an empty layer.
    pub fn remove_layer(&mut self, id: LayerId) -> Result<Layer, UowError> {
        self.ensure_open()?;
        let index = self
            .diagram
            .layers()
            .iter()
            .position(|l| l.id == id)
            .ok_or(UowError::UnknownLayer(id))?;
        if self.diagram.elements().iter().any(|e| e.layer == id) {
            return Err(UowError::LayerNotEmpty(id));
        }
        self.register(SnapshotKey::Layer(id));
        Ok(self.diagram.layers.remove(index))
    }

    pub fn update_schemas(&mut self, f: impl FnOnce(&mut Vec<DataSchema>)) -> Result<(), UowError> {
        self.ensure_open()?;
        self.register(SnapshotKey::Schemas);
        f(&mut self.diagram.schemas);
        Ok(())
    }

    pub fn update_diagram_props(&mut self, f: impl FnOnce(&mut DiagramProps)) -> Result<(), UowError> {
        self.ensure_open()?;
        self.register(SnapshotKey::Diagram);
        f(&mut self.diagram.props);
        Ok(())
    }

    // ─── Completion ──────────────────────────────────────────────────────

    /// Finish the transaction: diff, notify once, return the snapshot set.
    pub fn commit(&mut self) -> Result<SnapshotSet, UowError> {
        self.ensure_open()?;
        self.state = UowState::Committed;

        let mut set = SnapshotSet::default();
        let mut changes = ChangeSet::default();
        if self.options.snapshots {
            for (key, before) in self.before.drain(..) {
                let after = Snapshot::capture(self.diagram, &key);
                if before != after {
                    record_change(&key, before.as_ref(), after.as_ref(), &mut changes);
                    set.push(SnapshotEntry { key, before, after });
                }
            }
        } else {
            for (key, touch) in &self.touched {
                let after = Snapshot::capture(self.diagram, key);
                let mut single = ChangeSet::default();
                if let SnapshotKey::Element(id) = key {
                    match (touch.existed, after.is_some()) {
                        (true, true) => single.updated.push(*id),
                        (false, true) => single.added.push(*id),
                        (true, false) => single.removed.push(*id),
                        (false, false) => continue,
                    }
                    let after_type = self.diagram.lookup(*id).map(Element::element_type);
                    single.element_types.extend(touch.element_type.or(after_type));
                } else {
                    // Kind-level bookkeeping only; no before-state to diff.
                    record_change(key, after.as_ref(), after.as_ref(), &mut single);
                }
                changes.merge(&single);
            }
        }

        for id in std::mem::take(&mut self.refreshed) {
            let listed = changes.added.contains(&id)
                || changes.removed.contains(&id)
                || changes.updated.contains(&id);
            if !listed && let Some(element) = self.diagram.lookup(id) {
                changes.updated.push(id);
                let t = element.element_type();
                if !changes.element_types.contains(&t) {
                    changes.element_types.push(t);
                }
            }
        }

        log::debug!(
            "commit: {} snapshot entries, {} added, {} updated, {} removed",
            set.len(),
            changes.added.len(),
            changes.updated.len(),
            changes.removed.len()
        );
        self.diagram
            .events
            .emit(DiagramEvent::Change(changes.clone()));
        for callback in self.callbacks.drain(..) {
            callback(&changes);
        }
        Ok(set)
    }

    /// Restore every touched entity to its before-state. No event is emitted.
    pub fn abort(&mut self) -> Result<(), UowError> {
        self.ensure_open()?;
        self.state = UowState::Aborted;
        self.callbacks.clear();
        if !self.options.snapshots {
            return Err(UowError::NoSnapshots);
        }
        let mut set = SnapshotSet::default();
        for (key, before) in self.before.drain(..) {
            let after = Snapshot::capture(self.diagram, &key);
            set.push(SnapshotEntry { key, before, after });
        }
        set.apply(self.diagram, Side::Before);
        log::debug!("abort: restored {} entries", set.len());
        Ok(())
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if self.state == UowState::Open {
            log::error!(
                "unit of work dropped while open with {} touched entities; live state no longer matches history",
                self.touched.len()
            );
            debug_assert!(
                std::thread::panicking(),
                "unit of work dropped without commit or abort"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::Color;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn layer() -> LayerId {
        LayerId::intern("default")
    }

    fn diagram_with(ids: &[&str]) -> Diagram {
        let mut d = Diagram::new();
        UnitOfWork::execute(&mut d, UowOptions::default(), |uow| {
            for id in ids {
                uow.add_element(None, Element::node(ElementId::intern(id), "rect", layer()))?;
            }
            Ok::<_, UowError>(())
        })
        .unwrap();
        d
    }

    fn record_events(d: &mut Diagram) -> Rc<RefCell<Vec<ChangeSet>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        d.events_mut().subscribe(move |e| {
            if let DiagramEvent::Change(c) = e {
                sink.borrow_mut().push(c.clone());
            }
        });
        seen
    }

    #[test]
    fn commit_emits_once_and_diffs() {
        let mut d = diagram_with(&["u_a", "u_b"]);
        let seen = record_events(&mut d);
        let a = ElementId::intern("u_a");
        let b = ElementId::intern("u_b");

        let mut uow = UnitOfWork::begin(&mut d);
        uow.set_prop(a, PropPath::FillColor, Some(PropValue::Color(Color::BLACK)))
            .unwrap();
        uow.set_prop(a, PropPath::StrokeWidth, Some(PropValue::Number(3.0)))
            .unwrap();
        uow.update_element(b, |_| {}).unwrap();
        let set = uow.commit().unwrap();
        drop(uow);

        assert_eq!(set.len(), 1);
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0].updated, vec![a]);
        assert_eq!(d.lookup(a).unwrap().props.stroke.width, Some(3.0));
    }

    #[test]
    fn snapshot_is_idempotent() {
        let mut d = diagram_with(&["u_idem"]);
        let id = ElementId::intern("u_idem");
        let mut uow = UnitOfWork::begin(&mut d);
        uow.snapshot(SnapshotKey::Element(id)).unwrap();
        uow.set_prop(id, PropPath::Opacity, Some(PropValue::Number(0.5)))
            .unwrap();
        uow.snapshot(SnapshotKey::Element(id)).unwrap();
        let set = uow.commit().unwrap();

        let entry = &set.entries()[0];
        let Some(Snapshot::Element { element, .. }) = &entry.before else {
            panic!("expected element snapshot");
        };
        assert_eq!(element.props.opacity, None);
    }

    #[test]
    fn mutation_after_commit_is_invalid() {
        let mut d = diagram_with(&["u_done"]);
        let id = ElementId::intern("u_done");
        let mut uow = UnitOfWork::begin(&mut d);
        uow.commit().unwrap();
        assert_eq!(
            uow.update_element(id, |_| {}),
            Err(UowError::InvalidState("committed"))
        );
        assert_eq!(uow.commit(), Err(UowError::InvalidState("committed")));
        assert_eq!(uow.abort(), Err(UowError::InvalidState("committed")));
    }

    #[test]
    fn abort_restores_without_notifying() {
        let mut d = diagram_with(&["u_keep", "u_gone"]);
        let seen = record_events(&mut d);
        let keep = ElementId::intern("u_keep");
        let gone = ElementId::intern("u_gone");
        let fresh = ElementId::intern("u_fresh");

        let mut uow = UnitOfWork::begin(&mut d);
        uow.set_prop(keep, PropPath::Opacity, Some(PropValue::Number(0.2)))
            .unwrap();
        uow.remove_element(gone).unwrap();
        uow.add_element(None, Element::node(fresh, "rect", layer()))
            .unwrap();
        uow.abort().unwrap();
        assert_eq!(uow.state(), UowState::Aborted);
        drop(uow);

        assert!(seen.borrow().is_empty());
        assert_eq!(d.lookup(keep).unwrap().props.opacity, None);
        assert!(d.contains(gone));
        assert!(!d.contains(fresh));
    }

    #[test]
    fn remove_takes_subtree_and_restores_hierarchy() {
        let mut d = Diagram::new();
        let group = ElementId::intern("u_group");
        let child = ElementId::intern("u_child");
        let (_, added) = UnitOfWork::execute(&mut d, UowOptions::default(), |uow| {
            uow.add_element(None, Element::node(group, "group", layer()))?;
            uow.add_element(Some(group), Element::node(child, "rect", layer()))?;
            Ok::<_, UowError>(())
        })
        .unwrap();
        let element_entries = added
            .entries()
            .iter()
            .filter(|e| matches!(e.key, SnapshotKey::Element(_)))
            .count();
        assert_eq!(element_entries, 2);

        let (removed, set) = UnitOfWork::execute(&mut d, UowOptions::default(), |uow| {
            uow.remove_element(group)
        })
        .unwrap();
        assert_eq!(removed, vec![group, child]);
        assert!(d.is_empty());

        let changes = set.restore(&mut d, Side::Before);
        assert_eq!(changes.added, vec![group, child]);
        assert_eq!(d.parent(child), Some(group));
    }

    #[test]
    fn restore_keeps_sibling_order() {
        let mut d = diagram_with(&["u_ord_a", "u_ord_b", "u_ord_c"]);
        let [a, b, c] = ["u_ord_a", "u_ord_b", "u_ord_c"].map(ElementId::intern);

        let (_, set) = UnitOfWork::execute(&mut d, UowOptions::default(), |uow| {
            uow.remove_element(a)?;
            uow.remove_element(c)
        })
        .unwrap();
        assert_eq!(d.top_level(), vec![b]);

        set.restore(&mut d, Side::Before);
        assert_eq!(d.top_level(), vec![a, b, c]);
        set.restore(&mut d, Side::After);
        assert_eq!(d.top_level(), vec![b]);
        set.restore(&mut d, Side::Before);
        assert_eq!(d.top_level(), vec![a, b, c]);
    }

    #[test]
    fn abort_keeps_sibling_order_of_moved_children() {
        let mut d = Diagram::new();
        let [group, x, y, z] = ["u_mv_group", "u_mv_x", "u_mv_y", "u_mv_z"].map(ElementId::intern);
        UnitOfWork::execute(&mut d, UowOptions::default(), |uow| {
            uow.add_element(None, Element::node(group, "group", layer()))?;
            for id in [x, y, z] {
                uow.add_element(Some(group), Element::node(id, "rect", layer()))?;
            }
            Ok::<_, UowError>(())
        })
        .unwrap();

        let mut uow = UnitOfWork::begin(&mut d);
        uow.move_element(x, None).unwrap();
        uow.move_element(x, Some(group)).unwrap();
        uow.abort().unwrap();
        drop(uow);
        assert_eq!(d.children(group), vec![x, y, z]);
        assert_eq!(d.top_level(), vec![group]);
    }

    #[test]
    fn failed_execute_aborts() {
        let mut d = diagram_with(&["u_fail"]);
        let id = ElementId::intern("u_fail");
        let result = UnitOfWork::execute(&mut d, UowOptions::default(), |uow| {
            uow.set_prop(id, PropPath::Opacity, Some(PropValue::Number(0.1)))?;
            uow.update_element(ElementId::intern("u_nope"), |_| {})
        });
        assert_eq!(
            result.map(|_| ()),
            Err(UowError::UnknownElement(ElementId::intern("u_nope")))
        );
        assert_eq!(d.lookup(id).unwrap().props.opacity, None);
    }

    #[test]
    fn checks_references() {
        let mut d = diagram_with(&["u_ref"]);
        let id = ElementId::intern("u_ref");
        let mut uow = UnitOfWork::begin(&mut d);
        assert_eq!(
            uow.add_element(None, Element::node(id, "rect", layer())),
            Err(UowError::DuplicateId("u_ref".into()))
        );
        let ghost_layer = LayerId::intern("u_nolayer");
        assert_eq!(
            uow.update_element(id, |e| e.layer = ghost_layer),
            Err(UowError::UnknownLayer(ghost_layer))
        );
        assert_eq!(uow.diagram().lookup(id).unwrap().layer, layer());
        assert_eq!(
            uow.move_element(id, Some(id)),
            Err(UowError::InvalidMove {
                element: id,
                parent: id
            })
        );
        assert!(matches!(
            uow.set_prop(id, PropPath::StrokeWidth, Some(PropValue::Bool(true))),
            Err(UowError::Path(_))
        ));
        uow.commit().unwrap();
    }

    #[test]
    fn silent_options_skip_snapshots() {
        let mut d = diagram_with(&["u_silent"]);
        let seen = record_events(&mut d);
        let id = ElementId::intern("u_silent");
        let (_, set) = UnitOfWork::execute(&mut d, UowOptions { snapshots: false }, |uow| {
            uow.set_prop(id, PropPath::Opacity, Some(PropValue::Number(0.4)))
        })
        .unwrap();
        assert!(set.is_empty());
        assert_eq!(seen.borrow()[0].updated, vec![id]);

        let mut uow = UnitOfWork::with_options(&mut d, UowOptions { snapshots: false });
        assert_eq!(uow.abort(), Err(UowError::NoSnapshots));
    }

    #[test]
    fn callbacks_and_touch() {
        let mut d = diagram_with(&["u_touch"]);
        let id = ElementId::intern("u_touch");
        let got = Rc::new(RefCell::new(None));
        let sink = got.clone();
        let mut uow = UnitOfWork::begin(&mut d);
        uow.touch(id).unwrap();
        uow.on_commit(move |c| *sink.borrow_mut() = Some(c.updated.clone()))
            .unwrap();
        let set = uow.commit().unwrap();
        assert!(set.is_empty());
        assert_eq!(*got.borrow(), Some(vec![id]));
    }
}

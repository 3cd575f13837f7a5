//! Diagram data model.
//!
//! A diagram is a forest of elements (nodes and edges) stored in a
//! `StableDiGraph`, where graph edges go from parent → child and express
//! ownership only. Sibling order is kept beside the graph, per parent.
//! Layers group elements and carry the ordered adjustment
//! rules that apply to them. Stylesheets, defaults and data schemas hang off
//! the same aggregate so every collaborator is passed explicitly.
//!
//! All mutators here are crate-private: outside code changes a diagram
//! through [`UnitOfWork`](crate::uow::UnitOfWork).

use crate::defaults::Defaults;
use crate::error::ConfigError;
use crate::events::{DiagramEvent, EventBus};
use crate::id::{ElementId, LayerId};
use crate::props::{DiagramProps, ElementProps};
use crate::rules::AdjustmentRule;
use crate::stylesheet::StylesheetStore;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

// ─── Elements ────────────────────────────────────────────────────────────

/// Node or edge, without payload. Selects defaults tables and rule targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Node,
    Edge,
}

impl ElementType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ElementType::Node => "node",
            ElementType::Edge => "edge",
        }
    }
}

/// What an element is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ElementKind {
    /// A shape. `node_type` names the shape (`rect`, `circle`, `process`, ...).
    Node {
        #[serde(rename = "nodeType")]
        node_type: String,
    },
    /// A connector between two nodes. Dangling ends are allowed.
    Edge {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ElementId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<ElementId>,
    },
}

impl ElementKind {
    pub fn element_type(&self) -> ElementType {
        match self {
            ElementKind::Node { .. } => ElementType::Node,
            ElementKind::Edge { .. } => ElementType::Edge,
        }
    }

    /// The shape name for nodes, `"edge"` for edges.
    pub fn type_name(&self) -> &str {
        match self {
            ElementKind::Node { node_type } => node_type,
            ElementKind::Edge { .. } => "edge",
        }
    }
}

/// A comment thread entry attached to an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub resolved: bool,
}

/// Aggregate state of an element's comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadState {
    /// No comments at all.
    None,
    /// At least one comment is open.
    Unresolved,
    /// Every comment is resolved.
    Resolved,
}

/// Names, stylesheet bindings and custom data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    /// Bound node/edge stylesheet. `None` means the kind's default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stylesheet: Option<crate::id::StylesheetId>,
    /// Bound text stylesheet (node labels). `None` means the default text sheet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_stylesheet: Option<crate::id::StylesheetId>,
    /// Custom data keyed by schema id → field values.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

/// A node or edge in the diagram tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    #[serde(flatten)]
    pub kind: ElementKind,
    pub layer: LayerId,
    /// Direct (explicitly set) property overrides. Sparse.
    #[serde(default)]
    pub props: ElementProps,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "SmallVec::is_empty")]
    pub tags: SmallVec<[String; 4]>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
}

impl Element {
    pub fn node(id: ElementId, node_type: &str, layer: LayerId) -> Self {
        Self::new(
            id,
            ElementKind::Node {
                node_type: node_type.to_string(),
            },
            layer,
        )
    }

    pub fn edge(
        id: ElementId,
        from: Option<ElementId>,
        to: Option<ElementId>,
        layer: LayerId,
    ) -> Self {
        Self::new(id, ElementKind::Edge { from, to }, layer)
    }

    fn new(id: ElementId, kind: ElementKind, layer: LayerId) -> Self {
        Self {
            id,
            kind,
            layer,
            props: ElementProps::default(),
            metadata: Metadata::default(),
            tags: SmallVec::new(),
            comments: Vec::new(),
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.kind.element_type()
    }

    /// Add a tag unless already present.
    pub fn add_tag(&mut self, tag: &str) {
        if !self.has_tag(tag) {
            self.tags.push(tag.to_string());
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.add_tag(tag);
        self
    }

    pub fn with_props(mut self, props: ElementProps) -> Self {
        self.props = props;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.metadata.name = Some(name.to_string());
        self
    }

    pub fn with_stylesheet(mut self, sheet: crate::id::StylesheetId) -> Self {
        self.metadata.stylesheet = Some(sheet);
        self
    }

    pub fn thread_state(&self) -> ThreadState {
        if self.comments.is_empty() {
            ThreadState::None
        } else if self.comments.iter().any(|c| !c.resolved) {
            ThreadState::Unresolved
        } else {
            ThreadState::Resolved
        }
    }
}

// ─── Layers & schemas ────────────────────────────────────────────────────

/// A layer of elements with its ordered adjustment rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    #[serde(default = "visible_default")]
    pub visible: bool,
    #[serde(default)]
    pub locked: bool,
    /// Evaluated in this order; later rules win on conflicting leaves.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<AdjustmentRule>,
}

fn visible_default() -> bool {
    true
}

impl Layer {
    pub fn new(id: LayerId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            visible: true,
            locked: false,
            rules: Vec::new(),
        }
    }
}

/// A field of a data schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

/// Describes the custom data elements may carry under `metadata.data[id]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSchema {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<SchemaField>,
}

/// Currently selected elements (view state, not undoable).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub elements: Vec<ElementId>,
}

// ─── Diagnostics ─────────────────────────────────────────────────────────

/// Reports configuration errors once per distinct message.
#[derive(Debug, Default)]
pub struct Diagnostics {
    reported: RefCell<BTreeSet<String>>,
}

impl Diagnostics {
    /// Log `err` as a warning the first time it is seen. Returns `true` on first report.
    pub fn report(&self, err: &ConfigError) -> bool {
        let message = err.to_string();
        let fresh = self.reported.borrow_mut().insert(message.clone());
        if fresh {
            log::warn!("{message}; falling back to default properties");
        }
        fresh
    }

    /// Messages reported so far, sorted.
    pub fn reported(&self) -> Vec<String> {
        self.reported.borrow().iter().cloned().collect()
    }
}

// ─── Diagram ─────────────────────────────────────────────────────────────

/// The diagram aggregate: element tree, layers, stylesheets, defaults.
pub struct Diagram {
    /// Ownership tree: parent → child.
    pub(crate) graph: StableDiGraph<Element, ()>,

    /// Index from ElementId → NodeIndex for fast lookup.
    pub(crate) id_index: HashMap<ElementId, NodeIndex>,

    /// Sibling order per parent; `None` holds the top-level elements.
    siblings: HashMap<Option<ElementId>, Vec<ElementId>>,

    pub(crate) layers: Vec<Layer>,
    pub(crate) stylesheets: StylesheetStore,
    pub(crate) schemas: Vec<DataSchema>,
    pub(crate) props: DiagramProps,

    active_layer: LayerId,
    selection: Selection,

    /// Baseline values per property-object kind.
    pub defaults: Defaults,

    pub(crate) events: EventBus,
    pub diagnostics: Diagnostics,
}

impl std::fmt::Debug for Diagram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagram")
            .field("elements", &self.id_index.len())
            .field("layers", &self.layers)
            .field("stylesheets", &self.stylesheets)
            .field("active_layer", &self.active_layer)
            .finish_non_exhaustive()
    }
}

impl Default for Diagram {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagram {
    /// An empty diagram with one layer and the built-in default stylesheets.
    #[must_use]
    pub fn new() -> Self {
        let layer = Layer::new(LayerId::intern("default"), "Layer 1");
        let active_layer = layer.id;
        Self {
            graph: StableDiGraph::new(),
            id_index: HashMap::new(),
            siblings: HashMap::new(),
            layers: vec![layer],
            stylesheets: StylesheetStore::with_defaults(),
            schemas: Vec::new(),
            props: DiagramProps::default(),
            active_layer,
            selection: Selection::default(),
            defaults: Defaults::default(),
            events: EventBus::default(),
            diagnostics: Diagnostics::default(),
        }
    }

    // ─── Reads ───────────────────────────────────────────────────────────

    /// Look up an element by id.
    pub fn lookup(&self, id: ElementId) -> Option<&Element> {
        self.id_index.get(&id).map(|idx| &self.graph[*idx])
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.id_index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.id_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_index.is_empty()
    }

    /// Parent of an element, `None` for top-level elements.
    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        let idx = self.id_index.get(&id)?;
        self.graph
            .neighbors_directed(*idx, petgraph::Direction::Incoming)
            .next()
            .map(|p| self.graph[p].id)
    }

    /// Children in sibling order.
    pub fn children(&self, id: ElementId) -> Vec<ElementId> {
        if !self.contains(id) {
            return Vec::new();
        }
        self.siblings.get(&Some(id)).cloned().unwrap_or_default()
    }

    /// Elements without a parent, in sibling order.
    pub fn top_level(&self) -> Vec<ElementId> {
        self.siblings.get(&None).cloned().unwrap_or_default()
    }

    /// `id` followed by all its descendants, depth first.
    pub fn subtree(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if !self.contains(cur) {
                continue;
            }
            out.push(cur);
            let mut children = self.children(cur);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Every element in document order (depth first, parents before children).
    pub fn elements(&self) -> Vec<&Element> {
        self.top_level()
            .into_iter()
            .flat_map(|root| self.subtree(root))
            .filter_map(|id| self.lookup(id))
            .collect()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn active_layer(&self) -> LayerId {
        self.active_layer
    }

    /// Switch the active layer. Unknown ids are ignored.
    pub fn set_active_layer(&mut self, id: LayerId) {
        if self.layer(id).is_some() {
            self.active_layer = id;
        }
    }

    /// Adjustment rules of the layer the element belongs to.
    pub fn rules_for(&self, element: &Element) -> &[AdjustmentRule] {
        self.layer(element.layer)
            .map(|l| l.rules.as_slice())
            .unwrap_or(&[])
    }

    pub fn stylesheets(&self) -> &StylesheetStore {
        &self.stylesheets
    }

    pub fn schemas(&self) -> &[DataSchema] {
        &self.schemas
    }

    pub fn props(&self) -> &DiagramProps {
        &self.props
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Replace the selection. Unknown ids are dropped.
    pub fn set_selection(&mut self, ids: &[ElementId]) {
        self.selection.elements = ids.iter().copied().filter(|id| self.contains(*id)).collect();
        self.events
            .emit(DiagramEvent::Selection(self.selection.elements.clone()));
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    // ─── Raw mutators (reachable only through UnitOfWork) ────────────────

    /// Insert an element under `parent` (or at top level).
    pub(crate) fn insert_element(&mut self, parent: Option<ElementId>, element: Element) {
        let id = element.id;
        let idx = self.graph.add_node(element);
        let parent_idx = parent.and_then(|p| self.id_index.get(&p).copied());
        if let Some(parent_idx) = parent_idx {
            self.graph.add_edge(parent_idx, idx, ());
        }
        self.id_index.insert(id, idx);
        self.siblings
            .entry(parent.filter(|_| parent_idx.is_some()))
            .or_default()
            .push(id);
    }

    /// Remove a single element, keeping the `id_index` synchronized.
    /// Children are detached and become top-level; callers remove subtrees leaf first.
    pub(crate) fn remove_element(&mut self, id: ElementId) -> Option<Element> {
        let parent = self.parent(id);
        let idx = self.id_index.remove(&id)?;
        self.detach_sibling(parent, id);
        if let Some(orphans) = self.siblings.remove(&Some(id)) {
            self.siblings.entry(None).or_default().extend(orphans);
        }
        self.selection.elements.retain(|s| *s != id);
        self.graph.remove_node(idx)
    }

    fn detach_sibling(&mut self, parent: Option<ElementId>, id: ElementId) {
        if let Some(list) = self.siblings.get_mut(&parent) {
            list.retain(|s| *s != id);
        }
    }

    /// Reorder the children of `parent` to follow `ids`. Children missing
    /// from `ids` keep their relative order after the listed ones.
    pub(crate) fn set_child_order(&mut self, parent: Option<ElementId>, ids: &[ElementId]) {
        if parent.is_some_and(|p| !self.contains(p)) {
            return;
        }
        let current = self.siblings.entry(parent).or_default();
        let mut ordered: Vec<ElementId> = ids
            .iter()
            .copied()
            .filter(|id| current.contains(id))
            .collect();
        ordered.extend(current.iter().copied().filter(|id| !ids.contains(id)));
        *current = ordered;
    }

    pub(crate) fn element_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.id_index
            .get(&id)
            .copied()
            .map(|idx| &mut self.graph[idx])
    }

    /// Move an element under a new parent (or to top level).
    pub(crate) fn reparent(&mut self, child: ElementId, new_parent: Option<ElementId>) {
        let Some(&child_idx) = self.id_index.get(&child) else {
            return;
        };
        let old_parent = self.parent(child);
        self.detach_sibling(old_parent, child);
        let old_edges: Vec<_> = self
            .graph
            .edges_directed(child_idx, petgraph::Direction::Incoming)
            .map(|e| petgraph::visit::EdgeRef::id(&e))
            .collect();
        for edge in old_edges {
            self.graph.remove_edge(edge);
        }
        let parent_idx = new_parent.and_then(|p| self.id_index.get(&p).copied());
        if let Some(parent_idx) = parent_idx {
            self.graph.add_edge(parent_idx, child_idx, ());
        }
        self.siblings
            .entry(new_parent.filter(|_| parent_idx.is_some()))
            .or_default()
            .push(child);
    }

    /// Replace an element's data in place, or insert it when absent.
    pub(crate) fn upsert_element(&mut self, parent: Option<ElementId>, element: Element) {
        let id = element.id;
        match self.element_mut(id) {
            Some(slot) => {
                *slot = element;
                if self.parent(id) != parent {
                    self.reparent(id, parent);
                }
            }
            None => self.insert_element(parent, element),
        }
    }

    pub(crate) fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub(crate) fn stylesheets_mut(&mut self) -> &mut StylesheetStore {
        &mut self.stylesheets
    }

    /// Base (stylesheet-free) direct props of an element, for callers that only need to read.
    pub fn direct_props(&self, id: ElementId) -> Option<&ElementProps> {
        self.lookup(id).map(|e| &e.props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer() -> LayerId {
        LayerId::intern("default")
    }

    #[test]
    fn tree_basics() {
        let mut d = Diagram::new();
        let group = ElementId::intern("grp");
        let child = ElementId::intern("child");
        d.insert_element(None, Element::node(group, "group", layer()));
        d.insert_element(Some(group), Element::node(child, "rect", layer()));

        assert_eq!(d.parent(child), Some(group));
        assert_eq!(d.children(group), vec![child]);
        assert_eq!(d.top_level(), vec![group]);
        assert_eq!(d.subtree(group), vec![group, child]);
        assert_eq!(d.elements().len(), 2);
    }

    #[test]
    fn upsert_reparents() {
        let mut d = Diagram::new();
        let a = ElementId::intern("up_a");
        let b = ElementId::intern("up_b");
        d.insert_element(None, Element::node(a, "rect", layer()));
        d.insert_element(None, Element::node(b, "rect", layer()));

        let moved = d.lookup(b).cloned().unwrap().with_tag("moved");
        d.upsert_element(Some(a), moved);
        assert_eq!(d.parent(b), Some(a));
        assert!(d.lookup(b).unwrap().has_tag("moved"));
    }

    #[test]
    fn sibling_order_survives_removal_and_reorder() {
        let mut d = Diagram::new();
        let ids: Vec<ElementId> = ["ord_a", "ord_b", "ord_c"]
            .iter()
            .map(|s| ElementId::intern(s))
            .collect();
        for id in &ids {
            d.insert_element(None, Element::node(*id, "rect", layer()));
        }
        d.remove_element(ids[1]);
        d.insert_element(None, Element::node(ids[1], "rect", layer()));
        assert_eq!(d.top_level(), vec![ids[0], ids[2], ids[1]]);

        d.set_child_order(None, &[ids[2], ids[0]]);
        assert_eq!(d.top_level(), vec![ids[2], ids[0], ids[1]]);

        // Children of a removed group move to the top level.
        let group = ElementId::intern("ord_group");
        let inner = ElementId::intern("ord_inner");
        d.insert_element(None, Element::node(group, "group", layer()));
        d.insert_element(Some(group), Element::node(inner, "rect", layer()));
        d.remove_element(group);
        assert_eq!(d.top_level().last(), Some(&inner));
        assert_eq!(d.parent(inner), None);
    }

    #[test]
    fn selection_drops_unknown_ids() {
        let mut d = Diagram::new();
        let a = ElementId::intern("sel_a");
        d.insert_element(None, Element::node(a, "rect", layer()));
        d.set_selection(&[a, ElementId::intern("sel_missing")]);
        assert_eq!(d.selection().elements, vec![a]);

        d.remove_element(a);
        assert!(d.selection().elements.is_empty());
    }

    #[test]
    fn thread_state_aggregates() {
        let mut el = Element::node(ElementId::intern("cmt"), "rect", layer());
        assert_eq!(el.thread_state(), ThreadState::None);
        el.comments.push(Comment {
            id: "c1".into(),
            text: "fix".into(),
            resolved: true,
        });
        assert_eq!(el.thread_state(), ThreadState::Resolved);
        el.comments.push(Comment {
            id: "c2".into(),
            text: "again".into(),
            resolved: false,
        });
        assert_eq!(el.thread_state(), ThreadState::Unresolved);
    }

    #[test]
    fn diagnostics_report_once() {
        let d = Diagram::new();
        let err = ConfigError::UnknownStylesheet(crate::id::StylesheetId::intern("ghost"));
        assert!(d.diagnostics.report(&err));
        assert!(!d.diagnostics.report(&err));
        assert_eq!(d.diagnostics.reported().len(), 1);
    }
}

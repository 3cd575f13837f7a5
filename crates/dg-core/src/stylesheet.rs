//! Stylesheets: named, inheritable bundles of partial properties.
//!
//! A sheet belongs to one kind (node, edge or text) and may name a parent of
//! the same kind. Resolution walks the chain upward and fills only the
//! leaves still unset, so the sheet closest to the element wins.
//!
//! Edits go through a [`UnitOfWork`]; deleting a sheet rebinds every element,
//! child sheet and rule that referenced it within that same transaction.

use crate::error::{ConfigError, UowError};
use crate::id::{ElementId, LayerId, StylesheetId};
use crate::model::{Diagram, Element, ElementType};
use crate::path::PropertyObject;
use crate::props::ElementProps;
use crate::uow::UnitOfWork;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Longest parent chain resolution will follow.
pub const MAX_STYLESHEET_DEPTH: usize = 32;

pub const DEFAULT_NODE_STYLESHEET: &str = "default";
pub const DEFAULT_EDGE_STYLESHEET: &str = "default-edge";
pub const DEFAULT_TEXT_STYLESHEET: &str = "default-text-default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StylesheetKind {
    Node,
    Edge,
    /// Label styling for nodes. Contributes the text group only.
    Text,
}

impl StylesheetKind {
    /// The built-in sheet elements fall back to.
    pub fn default_id(self) -> StylesheetId {
        StylesheetId::intern(match self {
            StylesheetKind::Node => DEFAULT_NODE_STYLESHEET,
            StylesheetKind::Edge => DEFAULT_EDGE_STYLESHEET,
            StylesheetKind::Text => DEFAULT_TEXT_STYLESHEET,
        })
    }

    pub fn for_element(element_type: ElementType) -> Self {
        match element_type {
            ElementType::Node => StylesheetKind::Node,
            ElementType::Edge => StylesheetKind::Edge,
        }
    }
}

/// Built-in sheets carry ids starting with `default`.
pub fn is_default_stylesheet(id: StylesheetId) -> bool {
    id.as_str().starts_with("default")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stylesheet {
    pub id: StylesheetId,
    pub name: String,
    pub kind: StylesheetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<StylesheetId>,
    #[serde(default)]
    pub props: ElementProps,
}

impl Stylesheet {
    pub fn new(id: &str, name: &str, kind: StylesheetKind) -> Self {
        Self {
            id: StylesheetId::intern(id),
            name: name.to_string(),
            kind,
            parent: None,
            props: ElementProps::default(),
        }
    }

    pub fn with_parent(mut self, parent: StylesheetId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_props(mut self, props: ElementProps) -> Self {
        self.props = props;
        self
    }
}

/// Registry of a diagram's stylesheets, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StylesheetStore {
    pub(crate) sheets: IndexMap<StylesheetId, Stylesheet>,
}

impl StylesheetStore {
    /// A store holding the three built-in (empty) default sheets.
    pub fn with_defaults() -> Self {
        let mut store = Self::default();
        for (id, name, kind) in [
            (DEFAULT_NODE_STYLESHEET, "Default", StylesheetKind::Node),
            (DEFAULT_EDGE_STYLESHEET, "Default edge", StylesheetKind::Edge),
            (DEFAULT_TEXT_STYLESHEET, "Default text", StylesheetKind::Text),
        ] {
            let sheet = Stylesheet::new(id, name, kind);
            store.sheets.insert(sheet.id, sheet);
        }
        store
    }

    pub fn get(&self, id: StylesheetId) -> Option<&Stylesheet> {
        self.sheets.get(&id)
    }

    pub fn contains(&self, id: StylesheetId) -> bool {
        self.sheets.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stylesheet> {
        self.sheets.values()
    }

    pub fn of_kind(&self, kind: StylesheetKind) -> impl Iterator<Item = &Stylesheet> {
        self.sheets.values().filter(move |s| s.kind == kind)
    }

    pub(crate) fn index_of(&self, id: StylesheetId) -> Option<usize> {
        self.sheets.get_index_of(&id)
    }

    /// Sheets whose direct parent is `id`.
    pub fn children_of(&self, id: StylesheetId) -> Vec<StylesheetId> {
        self.sheets
            .values()
            .filter(|s| s.parent == Some(id))
            .map(|s| s.id)
            .collect()
    }

    /// `id` followed by its ancestors, nearest first.
    pub fn chain(&self, id: StylesheetId) -> Result<Vec<&Stylesheet>, ConfigError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cur = Some(id);
        while let Some(cid) = cur {
            if !seen.insert(cid) {
                return Err(ConfigError::StylesheetCycle(id));
            }
            if chain.len() == MAX_STYLESHEET_DEPTH {
                return Err(ConfigError::StylesheetTooDeep(id, MAX_STYLESHEET_DEPTH));
            }
            let sheet = self.get(cid).ok_or(ConfigError::UnknownStylesheet(cid))?;
            chain.push(sheet);
            cur = sheet.parent;
        }
        Ok(chain)
    }

    /// Merge the chain of `id` into one sparse object. Every sheet in the
    /// chain must be of `kind`; text sheets only contribute the text group.
    pub fn resolve(&self, id: StylesheetId, kind: StylesheetKind) -> Result<ElementProps, ConfigError> {
        let mut acc = ElementProps::default();
        for sheet in self.chain(id)? {
            if sheet.kind != kind {
                return Err(ConfigError::StylesheetKindMismatch {
                    id: sheet.id,
                    expected: kind,
                    actual: sheet.kind,
                });
            }
            acc = acc.over(&sheet.props);
        }
        Ok(match kind {
            StylesheetKind::Text => acc.text_only(),
            _ => acc,
        })
    }

    /// True if making `parent` the parent of `id` would close a loop.
    pub fn would_cycle(&self, id: StylesheetId, parent: StylesheetId) -> bool {
        let mut seen = HashSet::new();
        let mut cur = Some(parent);
        while let Some(cid) = cur {
            if cid == id || !seen.insert(cid) {
                return true;
            }
            cur = self.get(cid).and_then(|s| s.parent);
        }
        false
    }
}

// ─── Element bindings ────────────────────────────────────────────────────

/// The node/edge sheet an element uses, falling back to its kind's default.
pub fn bound_stylesheet(element: &Element) -> StylesheetId {
    element
        .metadata
        .stylesheet
        .unwrap_or_else(|| StylesheetKind::for_element(element.element_type()).default_id())
}

/// The text sheet of a node. Edges have none.
pub fn bound_text_stylesheet(element: &Element) -> Option<StylesheetId> {
    match element.element_type() {
        ElementType::Node => Some(
            element
                .metadata
                .text_stylesheet
                .unwrap_or_else(|| StylesheetKind::Text.default_id()),
        ),
        ElementType::Edge => None,
    }
}

/// Sparse props an element inherits from `sheet` and `text_sheet`.
/// The text chain overrides the text group of the node chain.
pub fn inherited_props(
    diagram: &Diagram,
    element: &Element,
    sheet: StylesheetId,
    text_sheet: Option<StylesheetId>,
) -> Result<ElementProps, ConfigError> {
    let store = diagram.stylesheets();
    let props = store.resolve(sheet, StylesheetKind::for_element(element.element_type()))?;
    match text_sheet {
        Some(text) => Ok(store.resolve(text, StylesheetKind::Text)?.over(&props)),
        None => Ok(props),
    }
}

/// What the element would look like with no direct overrides and no rules.
pub fn reference_props(diagram: &Diagram, element: &Element) -> Result<ElementProps, ConfigError> {
    let inherited = inherited_props(
        diagram,
        element,
        bound_stylesheet(element),
        bound_text_stylesheet(element),
    )?;
    Ok(diagram
        .defaults
        .for_type(element.element_type())
        .apply_defaults(&inherited))
}

/// Elements whose bound chains include `id`.
pub fn elements_using(diagram: &Diagram, id: StylesheetId) -> Vec<ElementId> {
    let store = diagram.stylesheets();
    let uses = |sheet: Option<StylesheetId>| {
        sheet
            .and_then(|s| store.chain(s).ok())
            .is_some_and(|chain| chain.iter().any(|s| s.id == id))
    };
    diagram
        .elements()
        .into_iter()
        .filter(|el| uses(Some(bound_stylesheet(el))) || uses(bound_text_stylesheet(el)))
        .map(|el| el.id)
        .collect()
}

/// True if any selected element carries a direct override whose value
/// differs from what its stylesheets (over defaults) produce. With
/// `is_text`, only the text group of nodes is considered.
pub fn is_selection_dirty(diagram: &Diagram, is_text: bool) -> bool {
    diagram
        .selection()
        .elements
        .iter()
        .filter_map(|id| diagram.lookup(*id))
        .any(|el| {
            if is_text && el.element_type() == ElementType::Edge {
                return false;
            }
            let Ok(reference) = reference_props(diagram, el) else {
                return false;
            };
            let direct = if is_text {
                el.props.text_only()
            } else {
                el.props.without_text()
            };
            !direct.diff_paths(&reference).is_empty()
        })
}

// ─── Transactional edits ─────────────────────────────────────────────────

fn check_parent(
    diagram: &Diagram,
    id: StylesheetId,
    kind: StylesheetKind,
    parent: StylesheetId,
) -> Result<(), UowError> {
    let store = diagram.stylesheets();
    let p = store.get(parent).ok_or(UowError::UnknownStylesheet(parent))?;
    if p.kind != kind {
        return Err(ConfigError::StylesheetKindMismatch {
            id: parent,
            expected: kind,
            actual: p.kind,
        }
        .into());
    }
    if store.would_cycle(id, parent) {
        return Err(ConfigError::StylesheetCycle(id).into());
    }
    Ok(())
}

/// Register a new sheet.
pub fn add_stylesheet(uow: &mut UnitOfWork<'_>, sheet: Stylesheet) -> Result<(), UowError> {
    if let Some(parent) = sheet.parent {
        check_parent(uow.diagram(), sheet.id, sheet.kind, parent)?;
    }
    uow.insert_stylesheet(sheet)
}

/// Remove a sheet. Elements bound to it move to the kind's default sheet,
/// child sheets inherit its parent, and rule actions naming it are pointed
/// at the default. A kind's own default sheet has no fallback and cannot be
/// deleted.
pub fn delete_stylesheet(uow: &mut UnitOfWork<'_>, id: StylesheetId) -> Result<Stylesheet, UowError> {
    let sheet = uow
        .diagram()
        .stylesheets()
        .get(id)
        .cloned()
        .ok_or(UowError::UnknownStylesheet(id))?;
    let fallback = sheet.kind.default_id();
    if fallback == id {
        return Err(UowError::DefaultStylesheet(id));
    }

    let bound: Vec<ElementId> = uow
        .diagram()
        .elements()
        .into_iter()
        .filter(|e| e.metadata.stylesheet == Some(id) || e.metadata.text_stylesheet == Some(id))
        .map(|e| e.id)
        .collect();
    for element in bound {
        uow.update_element(element, |e| {
            if e.metadata.stylesheet == Some(id) {
                e.metadata.stylesheet = Some(fallback);
            }
            if e.metadata.text_stylesheet == Some(id) {
                e.metadata.text_stylesheet = Some(fallback);
            }
        })?;
    }

    for child in uow.diagram().stylesheets().children_of(id) {
        uow.update_stylesheet(child, |s| s.parent = sheet.parent)?;
    }

    let layers: Vec<LayerId> = uow
        .diagram()
        .layers()
        .iter()
        .filter(|l| l.rules.iter().any(|r| r.references_stylesheet(id)))
        .map(|l| l.id)
        .collect();
    for layer in layers {
        uow.update_layer(layer, |l| {
            for rule in &mut l.rules {
                rule.replace_stylesheet(id, fallback);
            }
        })?;
    }

    log::debug!("deleted stylesheet {id}, fallback {fallback}");
    uow.remove_stylesheet(id)
}

/// Change a sheet's display name. References use the id and are unaffected.
pub fn rename_stylesheet(uow: &mut UnitOfWork<'_>, id: StylesheetId, name: &str) -> Result<(), UowError> {
    uow.update_stylesheet(id, |s| s.name = name.to_string())
}

/// Replace a sheet's props and refresh every element that uses it.
pub fn update_stylesheet_props(
    uow: &mut UnitOfWork<'_>,
    id: StylesheetId,
    props: ElementProps,
) -> Result<Vec<ElementId>, UowError> {
    uow.update_stylesheet(id, |s| s.props = props)?;
    reapply_stylesheet(uow, id)
}

/// Re-parent a sheet. Rejects unknown parents, kind mismatches and cycles.
pub fn set_stylesheet_parent(
    uow: &mut UnitOfWork<'_>,
    id: StylesheetId,
    parent: Option<StylesheetId>,
) -> Result<(), UowError> {
    let kind = uow
        .diagram()
        .stylesheets()
        .get(id)
        .map(|s| s.kind)
        .ok_or(UowError::UnknownStylesheet(id))?;
    if let Some(parent) = parent {
        check_parent(uow.diagram(), id, kind, parent)?;
    }
    uow.update_stylesheet(id, |s| s.parent = parent)?;
    reapply_stylesheet(uow, id)?;
    Ok(())
}

/// Bind `element` to `sheet`. Text sheets bind the label, others the body.
///
/// With `reapply`, direct overrides equal to the newly inherited values are
/// cleared (text group only for text sheets).
pub fn set_stylesheet(
    uow: &mut UnitOfWork<'_>,
    element: ElementId,
    sheet: StylesheetId,
    reapply: bool,
) -> Result<(), UowError> {
    let el_type = uow
        .diagram()
        .lookup(element)
        .map(Element::element_type)
        .ok_or(UowError::UnknownElement(element))?;
    let kind = uow
        .diagram()
        .stylesheets()
        .get(sheet)
        .map(|s| s.kind)
        .ok_or(UowError::UnknownStylesheet(sheet))?;
    let body_kind = StylesheetKind::for_element(el_type);
    if kind != body_kind && !(kind == StylesheetKind::Text && el_type == ElementType::Node) {
        return Err(ConfigError::StylesheetKindMismatch {
            id: sheet,
            expected: body_kind,
            actual: kind,
        }
        .into());
    }

    uow.update_element(element, |e| match kind {
        StylesheetKind::Text => e.metadata.text_stylesheet = Some(sheet),
        _ => e.metadata.stylesheet = Some(sheet),
    })?;

    if reapply {
        let (direct, reference) = {
            let diagram = uow.diagram();
            let el = diagram
                .lookup(element)
                .ok_or(UowError::UnknownElement(element))?;
            (el.props.clone(), reference_props(diagram, el)?)
        };
        let cleaned = match kind {
            StylesheetKind::Text => {
                let mut props = direct.without_text();
                props.text = direct.text_only().without_matching(&reference).text;
                props
            }
            _ => {
                let mut props = direct.without_text().without_matching(&reference);
                props.text = direct.text.clone();
                props
            }
        };
        uow.update_element(element, |e| e.props = cleaned)?;
    }
    Ok(())
}

/// Mark every element using `id` (directly or through a child sheet) for refresh.
pub fn reapply_stylesheet(uow: &mut UnitOfWork<'_>, id: StylesheetId) -> Result<Vec<ElementId>, UowError> {
    let users = elements_using(uow.diagram(), id);
    for element in &users {
        uow.touch(*element)?;
    }
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::Color;
    use pretty_assertions::assert_eq;

    fn sheet(id: &str, parent: Option<&str>) -> Stylesheet {
        let mut s = Stylesheet::new(id, id, StylesheetKind::Node);
        s.parent = parent.map(StylesheetId::intern);
        s
    }

    fn store(sheets: Vec<Stylesheet>) -> StylesheetStore {
        let mut store = StylesheetStore::with_defaults();
        for s in sheets {
            store.sheets.insert(s.id, s);
        }
        store
    }

    #[test]
    fn chain_fills_only_unset_leaves() {
        let mut parent = sheet("ss_parent", None);
        parent.props.stroke.width = Some(1.0);
        parent.props.fill.color = Color::from_hex("#FF0000");
        let mut child = sheet("ss_child", Some("ss_parent"));
        child.props.stroke.width = Some(2.0);

        let store = store(vec![parent, child]);
        let props = store
            .resolve(StylesheetId::intern("ss_child"), StylesheetKind::Node)
            .unwrap();
        assert_eq!(props.stroke.width, Some(2.0));
        assert_eq!(props.fill.color, Color::from_hex("#FF0000"));
    }

    #[test]
    fn cycle_is_config_error() {
        let store = store(vec![
            sheet("ss_a", Some("ss_b")),
            sheet("ss_b", Some("ss_a")),
        ]);
        let a = StylesheetId::intern("ss_a");
        assert_eq!(
            store.resolve(a, StylesheetKind::Node),
            Err(ConfigError::StylesheetCycle(a))
        );
        assert!(store.would_cycle(StylesheetId::intern("ss_b"), a));
    }

    #[test]
    fn deep_chain_is_bounded() {
        let mut sheets = Vec::new();
        for i in 0..=MAX_STYLESHEET_DEPTH {
            let parent = (i > 0).then(|| format!("ss_deep_{}", i - 1));
            sheets.push(sheet(&format!("ss_deep_{i}"), parent.as_deref()));
        }
        let store = store(sheets);
        let leaf = StylesheetId::intern(&format!("ss_deep_{MAX_STYLESHEET_DEPTH}"));
        assert_eq!(
            store.chain(leaf).err(),
            Some(ConfigError::StylesheetTooDeep(leaf, MAX_STYLESHEET_DEPTH))
        );
        let ok = StylesheetId::intern(&format!("ss_deep_{}", MAX_STYLESHEET_DEPTH - 1));
        assert_eq!(store.chain(ok).map(|c| c.len()), Ok(MAX_STYLESHEET_DEPTH));
    }

    #[test]
    fn kind_mismatch_and_unknown() {
        let mut text = Stylesheet::new("ss_text", "t", StylesheetKind::Text);
        text.props.text.bold = Some(true);
        text.props.fill.color = Some(Color::WHITE);
        let store = store(vec![text]);
        let id = StylesheetId::intern("ss_text");

        assert!(matches!(
            store.resolve(id, StylesheetKind::Node),
            Err(ConfigError::StylesheetKindMismatch { .. })
        ));
        let resolved = store.resolve(id, StylesheetKind::Text).unwrap();
        assert_eq!(resolved.text.bold, Some(true));
        assert_eq!(resolved.fill.color, None);

        let ghost = StylesheetId::intern("ss_ghost");
        assert_eq!(
            store.resolve(ghost, StylesheetKind::Node),
            Err(ConfigError::UnknownStylesheet(ghost))
        );
    }

    #[test]
    fn default_ids() {
        assert!(is_default_stylesheet(StylesheetKind::Text.default_id()));
        assert!(is_default_stylesheet(StylesheetId::intern("default-edge")));
        assert!(!is_default_stylesheet(StylesheetId::intern("fancy")));
        assert_eq!(StylesheetStore::with_defaults().len(), 3);
    }
}

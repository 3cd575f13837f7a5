//! Baseline values per property-object kind.
//!
//! A [`DefaultsTable`] maps every leaf path of a property object to either a
//! literal value or another path it follows (`text.color` tracks
//! `stroke.color` unless set). Tables are expected to be total; resolution of
//! a path without an entry yields `None` instead of failing.

use crate::model::ElementType;
use crate::path::PropertyObject;
use crate::props::{
    ArrowKind, Color, CurveKind, DiagramPath, DiagramProps, ElementProps, PropPath, PropValue,
    StrokePattern, TextAlign, TextVAlign,
};
use indexmap::IndexMap;

/// One defaults entry.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue<P> {
    Value(PropValue),
    /// Take whatever the target path resolves to.
    Derived(P),
}

/// Defaults for one property-object kind.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultsTable<O: PropertyObject> {
    entries: IndexMap<O::Path, DefaultValue<O::Path>>,
}

impl<O: PropertyObject> Default for DefaultsTable<O> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<O: PropertyObject> DefaultsTable<O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: literal default for `path`.
    pub fn with(mut self, path: O::Path, value: PropValue) -> Self {
        self.entries.insert(path, DefaultValue::Value(value));
        self
    }

    /// Builder: `path` follows `source`.
    pub fn derive(mut self, path: O::Path, source: O::Path) -> Self {
        self.entries.insert(path, DefaultValue::Derived(source));
        self
    }

    pub fn insert(&mut self, path: O::Path, value: DefaultValue<O::Path>) {
        self.entries.insert(path, value);
    }

    /// The entry as stored, derivations unresolved.
    pub fn get_raw(&self, path: O::Path) -> Option<&DefaultValue<O::Path>> {
        self.entries.get(&path)
    }

    /// The default value for `path`, following derivations.
    pub fn get(&self, path: O::Path) -> Option<PropValue> {
        self.resolve_in(path, &O::default())
    }

    /// Follow derivations, preferring values already set in `current`.
    fn resolve_in(&self, path: O::Path, current: &O) -> Option<PropValue> {
        let mut cur = path;
        // A derivation chain longer than the path table is a cycle.
        for _ in 0..=O::paths().len() {
            match self.entries.get(&cur)? {
                DefaultValue::Value(v) => return Some(v.clone()),
                DefaultValue::Derived(source) => {
                    if let Some(v) = current.get(*source) {
                        return Some(v);
                    }
                    cur = *source;
                }
            }
        }
        None
    }

    /// Fill every unset leaf of `partial`. Derived entries follow the value the
    /// source path has in `partial` when set there.
    pub fn apply_defaults(&self, partial: &O) -> O {
        let mut full = partial.clone();
        for &path in O::paths() {
            if partial.get(path).is_some() {
                continue;
            }
            if let Some(value) = self.resolve_in(path, partial) {
                // Table values are authored for their path; a mistyped entry is skipped.
                if let Err(err) = full.set(path, Some(value)) {
                    log::warn!("ignoring default for `{path}`: {err}");
                }
            }
        }
        full
    }

    /// True when every path of the property object has an entry.
    pub fn is_total(&self) -> bool {
        O::paths().iter().all(|p| self.entries.contains_key(p))
    }

    /// A table with `overrides` entries replacing those of `self`.
    pub fn layered(&self, overrides: &Self) -> Self {
        let mut entries = self.entries.clone();
        for (path, value) in &overrides.entries {
            entries.insert(*path, value.clone());
        }
        Self { entries }
    }
}

/// All defaults tables of a diagram.
///
/// `node` and `edge` are the common `element` table layered with the
/// kind-specific entries, computed once at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Defaults {
    pub element: DefaultsTable<ElementProps>,
    pub node: DefaultsTable<ElementProps>,
    pub edge: DefaultsTable<ElementProps>,
    pub diagram: DefaultsTable<DiagramProps>,
}

impl Defaults {
    pub fn new(
        element: DefaultsTable<ElementProps>,
        node_overrides: &DefaultsTable<ElementProps>,
        edge_overrides: &DefaultsTable<ElementProps>,
        diagram: DefaultsTable<DiagramProps>,
    ) -> Self {
        Self {
            node: element.layered(node_overrides),
            edge: element.layered(edge_overrides),
            element,
            diagram,
        }
    }

    pub fn for_type(&self, element_type: ElementType) -> &DefaultsTable<ElementProps> {
        match element_type {
            ElementType::Node => &self.node,
            ElementType::Edge => &self.edge,
        }
    }
}

fn text(s: &str) -> PropValue {
    PropValue::Text(s.to_string())
}

fn number(n: f64) -> PropValue {
    PropValue::Number(n)
}

fn hex(s: &str) -> PropValue {
    PropValue::Color(Color::from_hex(s).unwrap_or(Color::BLACK))
}

impl Default for Defaults {
    fn default() -> Self {
        let element = DefaultsTable::<ElementProps>::new()
            .with(PropPath::FillEnabled, PropValue::Bool(true))
            .with(PropPath::FillColor, PropValue::Color(Color::WHITE))
            .with(PropPath::StrokeEnabled, PropValue::Bool(true))
            .with(PropPath::StrokeColor, PropValue::Color(Color::BLACK))
            .with(PropPath::StrokeWidth, number(1.0))
            .with(PropPath::StrokePattern, text(StrokePattern::Solid.as_str()))
            .with(PropPath::ShadowEnabled, PropValue::Bool(false))
            .with(PropPath::ShadowColor, PropValue::Color(Color::BLACK))
            .with(PropPath::ShadowOpacity, number(0.25))
            .with(PropPath::ShadowX, number(2.0))
            .with(PropPath::ShadowY, number(2.0))
            .with(PropPath::ShadowBlur, number(4.0))
            .with(PropPath::TextFont, text("Helvetica"))
            .with(PropPath::TextFontSize, number(12.0))
            .derive(PropPath::TextColor, PropPath::StrokeColor)
            .with(PropPath::TextBold, PropValue::Bool(false))
            .with(PropPath::TextItalic, PropValue::Bool(false))
            .with(PropPath::TextAlign, text(TextAlign::Center.as_str()))
            .with(PropPath::TextValign, text(TextVAlign::Middle.as_str()))
            .with(PropPath::LineCurve, text(CurveKind::Straight.as_str()))
            .with(PropPath::LineArrow, text(ArrowKind::None.as_str()))
            .with(PropPath::Opacity, number(1.0))
            .with(PropPath::CornerRadius, number(0.0));

        let node = DefaultsTable::new().with(PropPath::CornerRadius, number(0.0));

        let edge = DefaultsTable::new()
            .with(PropPath::FillEnabled, PropValue::Bool(false))
            .with(PropPath::LineArrow, text(ArrowKind::End.as_str()))
            .with(PropPath::TextFontSize, number(11.0));

        let diagram = DefaultsTable::<DiagramProps>::new()
            .with(DiagramPath::Background, hex("#FFFFFF"))
            .with(DiagramPath::GridEnabled, PropValue::Bool(true))
            .with(DiagramPath::GridSize, number(10.0));

        Self::new(element, &node, &edge, diagram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tables_are_total() {
        let d = Defaults::default();
        assert!(d.element.is_total());
        assert!(d.node.is_total());
        assert!(d.edge.is_total());
        assert!(d.diagram.is_total());
    }

    #[test]
    fn raw_keeps_derivation() {
        let d = Defaults::default();
        assert_eq!(
            d.node.get_raw(PropPath::TextColor),
            Some(&DefaultValue::Derived(PropPath::StrokeColor))
        );
        assert_eq!(
            d.node.get(PropPath::TextColor),
            Some(PropValue::Color(Color::BLACK))
        );
    }

    #[test]
    fn derived_follows_partial() {
        let d = Defaults::default();
        let mut partial = ElementProps::default();
        partial.stroke.color = Color::from_hex("#336699");
        let full = d.node.apply_defaults(&partial);
        assert_eq!(full.text.color, Color::from_hex("#336699"));
        assert_eq!(full.stroke.width, Some(1.0));
    }

    #[test]
    fn kind_tables_override_element() {
        let d = Defaults::default();
        assert_eq!(d.edge.get(PropPath::FillEnabled), Some(PropValue::Bool(false)));
        assert_eq!(d.node.get(PropPath::FillEnabled), Some(PropValue::Bool(true)));
        assert_eq!(
            d.for_type(ElementType::Edge).get(PropPath::LineArrow),
            Some(PropValue::Text("end".into()))
        );
    }

    #[test]
    fn missing_entry_resolves_to_none() {
        let table = DefaultsTable::<ElementProps>::new().with(PropPath::Opacity, number(1.0));
        assert!(!table.is_total());
        assert_eq!(table.get(PropPath::FillColor), None);
        let full = table.apply_defaults(&ElementProps::default());
        assert_eq!(full.opacity, Some(1.0));
        assert_eq!(full.fill.color, None);
    }

    #[test]
    fn derivation_cycle_terminates() {
        let table = DefaultsTable::<ElementProps>::new()
            .derive(PropPath::FillColor, PropPath::StrokeColor)
            .derive(PropPath::StrokeColor, PropPath::FillColor);
        assert_eq!(table.get(PropPath::FillColor), None);
    }
}

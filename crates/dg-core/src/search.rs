//! Element search clauses and the matcher that evaluates them.
//!
//! `props` clauses resolve their path against the element's *base*
//! properties (defaults, stylesheet chain and direct overrides) and, for
//! paths that are not property paths, against the normalized element
//! record (`type`, `name`, `data.<schema>.<field>`, ...). Rule output never
//! feeds back into matching.

use crate::model::{Diagram, Element, ThreadState};
use crate::path::{PropertyObject, get_json};
use crate::props::{Color, ElementProps, PropPath, PropValue};
use crate::query::{QueryEvaluator, truthy};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::cell::OnceCell;
use std::cmp::Ordering;

/// Comparison applied by a `props` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Eq,
    Neq,
    Contains,
    Matches,
    Gt,
    Lt,
}

impl std::str::FromStr for Relation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        Ok(match s {
            "eq" => Relation::Eq,
            "neq" => Relation::Neq,
            "contains" => Relation::Contains,
            "matches" => Relation::Matches,
            "gt" => Relation::Gt,
            "lt" => Relation::Lt,
            _ => return Err(()),
        })
    }
}

/// Comment filter of a `comment` clause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentFilter {
    #[default]
    Any,
    Unresolved,
    Resolved,
}

/// One predicate of a simple rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ElementSearchClause {
    Query {
        query: String,
    },
    Props {
        path: String,
        relation: Relation,
        value: Value,
    },
    Tags {
        tags: Vec<String>,
    },
    Comment {
        #[serde(default)]
        state: CommentFilter,
    },
    Any {
        clauses: Vec<ElementSearchClause>,
    },
}

/// Normalized JSON view of an element, the input of `query` clauses.
pub fn element_record(diagram: &Diagram, element: &Element, base: &ElementProps) -> Value {
    let (from, to) = match &element.kind {
        crate::model::ElementKind::Edge { from, to } => (
            from.map(|id| id.as_str()),
            to.map(|id| id.as_str()),
        ),
        crate::model::ElementKind::Node { .. } => (None, None),
    };
    json!({
        "id": element.id.as_str(),
        "kind": element.element_type().as_str(),
        "type": element.kind.type_name(),
        "name": element.metadata.name,
        "tooltip": element.metadata.tooltip,
        "layer": element.layer.as_str(),
        "parent": diagram.parent(element.id).map(|p| p.as_str()),
        "from": from,
        "to": to,
        "stylesheet": element.metadata.stylesheet.map(|s| s.as_str()),
        "textStylesheet": element.metadata.text_stylesheet.map(|s| s.as_str()),
        "tags": element.tags.as_slice(),
        "comments": element.comments,
        "commentState": element.thread_state(),
        "props": base,
        "data": element.metadata.data,
    })
}

/// Everything a clause may look at for one element.
pub struct MatchContext<'a> {
    pub diagram: &'a Diagram,
    pub element: &'a Element,
    /// Defaults + stylesheet chain + direct overrides.
    pub base: &'a ElementProps,
    pub query: &'a dyn QueryEvaluator,
    record: OnceCell<Value>,
}

impl<'a> MatchContext<'a> {
    pub fn new(
        diagram: &'a Diagram,
        element: &'a Element,
        base: &'a ElementProps,
        query: &'a dyn QueryEvaluator,
    ) -> Self {
        Self {
            diagram,
            element,
            base,
            query,
            record: OnceCell::new(),
        }
    }

    /// The normalized record, built on first use.
    pub fn record(&self) -> &Value {
        self.record
            .get_or_init(|| element_record(self.diagram, self.element, self.base))
    }

    /// Resolve a clause path: property paths first, then the record.
    fn lookup(&self, path: &str) -> Option<Operand> {
        if let Ok(prop) = path.parse::<PropPath>() {
            return self.base.get(prop).map(Operand::Prop);
        }
        get_json(self.record(), path)
            .filter(|v| !v.is_null())
            .cloned()
            .map(Operand::Record)
    }
}

/// The left-hand side of a `props` clause.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    /// A typed property leaf, compared in its own domain.
    Prop(PropValue),
    /// A value from the element record, compared as plain JSON.
    Record(Value),
}

/// True if every clause matches. An empty list matches everything.
pub fn matches_all(clauses: &[ElementSearchClause], ctx: &MatchContext<'_>) -> bool {
    clauses.iter().all(|c| matches(c, ctx))
}

/// Evaluate one clause. Malformed input evaluates to `false`.
pub fn matches(clause: &ElementSearchClause, ctx: &MatchContext<'_>) -> bool {
    match clause {
        ElementSearchClause::Query { query } => match ctx.query.evaluate(query, ctx.record()) {
            Ok(stream) => stream.iter().any(truthy),
            Err(err) => {
                log::debug!("query clause `{query}` on {}: {err}", ctx.element.id);
                false
            }
        },
        ElementSearchClause::Props {
            path,
            relation,
            value,
        } => match ctx.lookup(path) {
            Some(actual) => compare(&actual, *relation, value),
            None => false,
        },
        ElementSearchClause::Tags { tags } => tags.iter().any(|t| ctx.element.has_tag(t)),
        ElementSearchClause::Comment { state } => {
            let current = ctx.element.thread_state();
            match state {
                CommentFilter::Any => true,
                CommentFilter::Unresolved => current == ThreadState::Unresolved,
                CommentFilter::Resolved => current == ThreadState::Resolved,
            }
        }
        ElementSearchClause::Any { clauses } => clauses.iter().any(|c| matches(c, ctx)),
    }
}

// ─── Relations ───────────────────────────────────────────────────────────

/// Strict JSON equality. Numbers compare by value, so `5` and `5.0` are
/// equal but `5` and `"5"` are not.
fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_cmp(x, y) == Some(Ordering::Equal),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| json_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Integers compare exactly; anything else as `f64`.
fn number_cmp(a: &serde_json::Number, b: &serde_json::Number) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return Some(x.cmp(&y));
    }
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

/// Order a property leaf against a JSON number. Numeric leaves are stored
/// as `f32`, so the literal is narrowed to the same precision.
fn prop_number_cmp(leaf: f64, expected: &Value) -> Option<Ordering> {
    let Value::Number(n) = expected else {
        return None;
    };
    (leaf as f32).partial_cmp(&(n.as_f64()? as f32))
}

fn operand_equal(actual: &Operand, expected: &Value) -> bool {
    match actual {
        Operand::Prop(PropValue::Color(c)) => match expected {
            Value::String(s) => Color::from_hex(s).is_some_and(|e| e == *c),
            _ => false,
        },
        Operand::Prop(PropValue::Number(n)) => prop_number_cmp(*n, expected) == Some(Ordering::Equal),
        Operand::Prop(other) => other.to_json() == *expected,
        Operand::Record(value) => json_equal(value, expected),
    }
}

fn operand_order(actual: &Operand, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Operand::Prop(PropValue::Number(n)), _) => prop_number_cmp(*n, expected),
        (Operand::Record(Value::Number(a)), Value::Number(b)) => number_cmp(a, b),
        _ => None,
    }
}

fn operand_json(actual: &Operand) -> Value {
    match actual {
        Operand::Prop(value) => value.to_json(),
        Operand::Record(value) => value.clone(),
    }
}

fn compare(actual: &Operand, relation: Relation, expected: &Value) -> bool {
    match relation {
        Relation::Eq => operand_equal(actual, expected),
        Relation::Neq => !operand_equal(actual, expected),
        Relation::Contains => match (operand_json(actual), expected) {
            (Value::Array(items), _) => items.iter().any(|item| json_equal(item, expected)),
            (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
            _ => false,
        },
        Relation::Matches => {
            let (Value::String(text), Value::String(pattern)) = (operand_json(actual), expected) else {
                return false;
            };
            match Regex::new(pattern) {
                Ok(re) => re.is_match(&text),
                Err(err) => {
                    log::debug!("invalid pattern in props clause: {err}");
                    false
                }
            }
        }
        Relation::Gt => operand_order(actual, expected) == Some(Ordering::Greater),
        Relation::Lt => operand_order(actual, expected) == Some(Ordering::Less),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{ElementId, LayerId};
    use crate::model::Comment;
    use crate::query::FilterQuery;

    fn node(id: &str) -> Element {
        Element::node(ElementId::intern(id), "process", LayerId::intern("default"))
    }

    fn check(clause: ElementSearchClause, element: &Element, base: &ElementProps) -> bool {
        let diagram = Diagram::new();
        let query = FilterQuery::new();
        let ctx = MatchContext::new(&diagram, element, base, &query);
        matches(&clause, &ctx)
    }

    fn props(path: &str, relation: Relation, value: Value) -> ElementSearchClause {
        ElementSearchClause::Props {
            path: path.into(),
            relation,
            value,
        }
    }

    #[test]
    fn tags_are_or_semantics() {
        let el = node("s_tags").with_tag("urgent");
        let base = ElementProps::default();
        let clause = |tags: &[&str]| ElementSearchClause::Tags {
            tags: tags.iter().map(|t| t.to_string()).collect(),
        };
        assert!(check(clause(&["urgent", "db"]), &el, &base));
        assert!(!check(clause(&["db"]), &el, &base));
        assert!(!check(clause(&[]), &el, &base));
    }

    #[test]
    fn props_compare_property_paths() {
        let el = node("s_props");
        let mut base = ElementProps::default();
        base.stroke.width = Some(0.1);
        base.fill.color = Color::from_hex("#FF0000");

        assert!(check(props("stroke.width", Relation::Eq, json!(0.1)), &el, &base));
        assert!(check(props("stroke.width", Relation::Gt, json!(0.05)), &el, &base));
        // Numeric strings are not numbers.
        assert!(!check(props("stroke.width", Relation::Gt, json!("0.05")), &el, &base));
        assert!(!check(props("stroke.width", Relation::Eq, json!("0.1")), &el, &base));
        assert!(!check(props("stroke.width", Relation::Lt, json!("wide")), &el, &base));
        assert!(check(props("fill.color", Relation::Eq, json!("#ff0000")), &el, &base));
        assert!(check(props("fill.color", Relation::Neq, json!("#00ff00")), &el, &base));
        assert!(!check(props("fill.color", Relation::Eq, json!(16711680)), &el, &base));
    }

    #[test]
    fn record_values_compare_without_coercion() {
        let mut el = node("s_strict");
        el.metadata
            .data
            .insert("crm".into(), json!({"seats": 5, "big": 16777217_u64, "vip": true}));
        let base = ElementProps::default();

        assert!(check(props("data.crm.seats", Relation::Eq, json!(5)), &el, &base));
        assert!(check(props("data.crm.seats", Relation::Eq, json!(5.0)), &el, &base));
        assert!(!check(props("data.crm.seats", Relation::Eq, json!("5")), &el, &base));
        assert!(check(props("data.crm.seats", Relation::Neq, json!("5")), &el, &base));
        assert!(!check(props("data.crm.seats", Relation::Gt, json!("4")), &el, &base));
        assert!(!check(props("data.crm.vip", Relation::Eq, json!("true")), &el, &base));

        // Integers beyond f32 precision stay distinct.
        assert!(check(props("data.crm.big", Relation::Gt, json!(16777216)), &el, &base));
        assert!(!check(props("data.crm.big", Relation::Eq, json!(16777216)), &el, &base));
        assert!(check(props("data.crm.big", Relation::Lt, json!(16777217.5)), &el, &base));
    }

    #[test]
    fn props_fall_back_to_record() {
        let el = node("s_record").with_name("Payment gateway");
        let base = ElementProps::default();
        assert!(check(props("type", Relation::Eq, json!("process")), &el, &base));
        assert!(check(props("name", Relation::Contains, json!("gate")), &el, &base));
        assert!(check(props("name", Relation::Matches, json!("^Pay")), &el, &base));
        assert!(!check(props("name", Relation::Matches, json!("(")), &el, &base));
    }

    #[test]
    fn unresolvable_path_never_matches() {
        let el = node("s_missing");
        let base = ElementProps::default();
        assert!(!check(props("data.crm.tier", Relation::Eq, json!("gold")), &el, &base));
        assert!(!check(props("data.crm.tier", Relation::Neq, json!("gold")), &el, &base));
        assert!(!check(props("fill.color", Relation::Eq, json!("#fff")), &el, &base));
    }

    #[test]
    fn custom_data_paths() {
        let mut el = node("s_data");
        el.metadata
            .data
            .insert("crm".into(), json!({"tier": "gold", "seats": 12}));
        let base = ElementProps::default();
        assert!(check(props("data.crm.tier", Relation::Eq, json!("gold")), &el, &base));
        assert!(check(props("data.crm.seats", Relation::Gt, json!(10)), &el, &base));
        assert!(check(props("tags", Relation::Contains, json!("x")), &el.clone().with_tag("x"), &base));
    }

    #[test]
    fn comment_state_filter() {
        let mut el = node("s_comment");
        let base = ElementProps::default();
        let clause = |state| ElementSearchClause::Comment { state };
        assert!(check(clause(CommentFilter::Any), &el, &base));
        assert!(!check(clause(CommentFilter::Unresolved), &el, &base));

        el.comments.push(Comment {
            id: "c".into(),
            text: "check".into(),
            resolved: false,
        });
        assert!(check(clause(CommentFilter::Unresolved), &el, &base));
        assert!(!check(clause(CommentFilter::Resolved), &el, &base));
    }

    #[test]
    fn query_clause_and_errors() {
        let el = node("s_query").with_tag("db");
        let base = ElementProps::default();
        let q = |query: &str| ElementSearchClause::Query {
            query: query.into(),
        };
        assert!(check(q(r#".tags | contains(["db"])"#), &el, &base));
        assert!(check(q(r#".props.fill.enabled == null"#), &el, &base));
        assert!(!check(q(".kind == "), &el, &base));
        assert!(!check(q(".tags.nope"), &el, &base));
        assert!(!check(q("select(false)"), &el, &base));
        let deep = format!("{}.tags{}", "(".repeat(5000), ")".repeat(5000));
        assert!(!check(q(deep.as_str()), &el, &base));
    }

    #[test]
    fn any_clause() {
        let el = node("s_any").with_tag("b");
        let base = ElementProps::default();
        let tags = |t: &str| ElementSearchClause::Tags {
            tags: vec![t.to_string()],
        };
        let any = ElementSearchClause::Any {
            clauses: vec![tags("a"), tags("b")],
        };
        assert!(check(any, &el, &base));
        assert!(!check(ElementSearchClause::Any { clauses: vec![] }, &el, &base));
    }

    #[test]
    fn clause_serde_shape() {
        let clause: ElementSearchClause = serde_json::from_value(json!({
            "type": "props", "path": "fill.color", "relation": "eq", "value": "#fff"
        }))
        .unwrap();
        assert_eq!(clause, props("fill.color", Relation::Eq, json!("#fff")));
        let any: ElementSearchClause =
            serde_json::from_value(json!({"type": "any", "clauses": [{"type": "comment"}]}))
                .unwrap();
        assert_eq!(
            any,
            ElementSearchClause::Any {
                clauses: vec![ElementSearchClause::Comment {
                    state: CommentFilter::Any
                }]
            }
        );
    }
}

//! Adjustment rules and the engine that folds them into per-element overrides.
//!
//! Rules live on layers and run in stored order. Simple rules match with a
//! clause list (AND) and carry actions; advanced rules carry a query
//! expression evaluated over the whole diagram whose output names the
//! elements they affect, optionally with inline actions.
//!
//! Folding happens in two passes over the matched rules: stylesheet
//! overrides and `hide` first, then every `set-props` in rule order, so
//! later rules win per leaf and `set-props` always lands on top of the
//! rule-selected stylesheet.

use crate::error::{PathError, QueryError, RuleError};
use crate::id::{ElementId, RuleId, StylesheetId};
use crate::model::{Diagram, Element, ElementType};
use crate::path::PropertyObject;
use crate::props::{ElementProps, PropCategory, PropPath};
use crate::query::QueryEvaluator;
use crate::search::{ElementSearchClause, MatchContext, Relation, matches_all};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::collections::HashMap;

// ─── Rule model ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RuleAction {
    /// Merge `props` (restricted to `kind`) over the element.
    SetProps {
        kind: PropCategory,
        props: ElementProps,
    },
    /// Resolve the element against another stylesheet for this pass.
    SetStylesheet {
        stylesheet: StylesheetId,
        #[serde(
            default,
            rename = "textStylesheet",
            skip_serializing_if = "Option::is_none"
        )]
        text_stylesheet: Option<StylesheetId>,
    },
    Hide,
}

impl RuleAction {
    const fn name(&self) -> &'static str {
        match self {
            RuleAction::SetProps { .. } => "set-props",
            RuleAction::SetStylesheet { .. } => "set-stylesheet",
            RuleAction::Hide => "hide",
        }
    }
}

/// When an advanced rule is re-evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RuleTrigger {
    Interval {
        seconds: f64,
    },
    ElementEvent {
        #[serde(rename = "elementType")]
        element_type: ElementType,
    },
    DataSchema {
        schema: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleTarget {
    Node,
    Edge,
    Advanced,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleBody {
    Node {
        clauses: Vec<ElementSearchClause>,
        actions: Vec<RuleAction>,
    },
    Edge {
        clauses: Vec<ElementSearchClause>,
        actions: Vec<RuleAction>,
    },
    Advanced {
        expression: String,
        triggers: Vec<RuleTrigger>,
    },
}

/// A validated rule. Deserializes through [`RuleDraft`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RuleDraft", into = "RuleDraft")]
pub struct AdjustmentRule {
    pub id: RuleId,
    pub name: String,
    /// Record evaluation output for inspection.
    pub debug: bool,
    pub body: RuleBody,
}

impl AdjustmentRule {
    /// A node or edge rule. Actions are checked against the target kind.
    pub fn simple(
        id: &str,
        target: ElementType,
        clauses: Vec<ElementSearchClause>,
        actions: Vec<RuleAction>,
    ) -> Result<Self, RuleError> {
        for action in &actions {
            check_action(action, target)?;
        }
        let body = match target {
            ElementType::Node => RuleBody::Node { clauses, actions },
            ElementType::Edge => RuleBody::Edge { clauses, actions },
        };
        Ok(Self {
            id: RuleId::intern(id),
            name: id.to_string(),
            debug: false,
            body,
        })
    }

    pub fn advanced(id: &str, expression: &str, triggers: Vec<RuleTrigger>) -> Self {
        Self {
            id: RuleId::intern(id),
            name: id.to_string(),
            debug: false,
            body: RuleBody::Advanced {
                expression: expression.to_string(),
                triggers,
            },
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn target(&self) -> RuleTarget {
        match self.body {
            RuleBody::Node { .. } => RuleTarget::Node,
            RuleBody::Edge { .. } => RuleTarget::Edge,
            RuleBody::Advanced { .. } => RuleTarget::Advanced,
        }
    }

    pub fn clauses(&self) -> &[ElementSearchClause] {
        match &self.body {
            RuleBody::Node { clauses, .. } | RuleBody::Edge { clauses, .. } => clauses,
            RuleBody::Advanced { .. } => &[],
        }
    }

    pub fn actions(&self) -> &[RuleAction] {
        match &self.body {
            RuleBody::Node { actions, .. } | RuleBody::Edge { actions, .. } => actions,
            RuleBody::Advanced { .. } => &[],
        }
    }

    pub fn triggers(&self) -> &[RuleTrigger] {
        match &self.body {
            RuleBody::Advanced { triggers, .. } => triggers,
            _ => &[],
        }
    }

    pub fn references_stylesheet(&self, id: StylesheetId) -> bool {
        self.actions().iter().any(|a| {
            matches!(a, RuleAction::SetStylesheet { stylesheet, text_stylesheet }
                if *stylesheet == id || *text_stylesheet == Some(id))
        })
    }

    /// Point every `set-stylesheet` naming `from` at `to`.
    pub(crate) fn replace_stylesheet(&mut self, from: StylesheetId, to: StylesheetId) {
        let actions = match &mut self.body {
            RuleBody::Node { actions, .. } | RuleBody::Edge { actions, .. } => actions,
            RuleBody::Advanced { .. } => return,
        };
        for action in actions {
            if let RuleAction::SetStylesheet {
                stylesheet,
                text_stylesheet,
            } = action
            {
                if *stylesheet == from {
                    *stylesheet = to;
                }
                if *text_stylesheet == Some(from) {
                    *text_stylesheet = Some(to);
                }
            }
        }
    }
}

/// Reject actions that make no sense for `target`.
fn check_action(action: &RuleAction, target: ElementType) -> Result<(), RuleError> {
    match action {
        RuleAction::SetProps { kind, props } => {
            let allowed = category_paths(*kind);
            if let Some(path) = props.set_paths().into_iter().find(|p| !allowed.contains(p)) {
                return Err(RuleError::PropsOutsideCategory {
                    category: kind.as_str().to_string(),
                    path: path.to_string(),
                });
            }
            if *kind == PropCategory::Line && target == ElementType::Node {
                return Err(RuleError::HeterogeneousAction {
                    action: "set-props line",
                    target: target.as_str(),
                });
            }
        }
        RuleAction::SetStylesheet {
            text_stylesheet: Some(_),
            ..
        } if target == ElementType::Edge => {
            return Err(RuleError::HeterogeneousAction {
                action: "set-stylesheet textStylesheet",
                target: target.as_str(),
            });
        }
        _ => {}
    }
    Ok(())
}

// ─── Drafts ──────────────────────────────────────────────────────────────

fn is_false(b: &bool) -> bool {
    !*b
}

/// A clause as an editor form holds it: every field optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClauseDraft {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub clause_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub clauses: Vec<ClauseDraft>,
}

impl ClauseDraft {
    pub fn build(&self) -> Result<ElementSearchClause, RuleError> {
        let clause_type = self
            .clause_type
            .as_deref()
            .ok_or(RuleError::MissingField("type"))?;
        Ok(match clause_type {
            "query" => ElementSearchClause::Query {
                query: self.query.clone().ok_or(RuleError::MissingField("query"))?,
            },
            "props" => {
                let relation = self
                    .relation
                    .as_deref()
                    .ok_or(RuleError::MissingField("relation"))?;
                ElementSearchClause::Props {
                    path: self.path.clone().ok_or(RuleError::MissingField("path"))?,
                    relation: relation.parse::<Relation>().map_err(|_| RuleError::Unknown {
                        what: "relation",
                        value: relation.to_string(),
                    })?,
                    value: self.value.clone().ok_or(RuleError::MissingField("value"))?,
                }
            }
            "tags" => ElementSearchClause::Tags {
                tags: self.tags.clone().unwrap_or_default(),
            },
            "comment" => {
                let state = match self.state.as_deref() {
                    None => Value::String("any".into()),
                    Some(s) => Value::String(s.to_string()),
                };
                ElementSearchClause::Comment {
                    state: serde_json::from_value(state).map_err(|_| RuleError::Unknown {
                        what: "comment state",
                        value: self.state.clone().unwrap_or_default(),
                    })?,
                }
            }
            "any" => ElementSearchClause::Any {
                clauses: self
                    .clauses
                    .iter()
                    .map(ClauseDraft::build)
                    .collect::<Result<_, _>>()?,
            },
            other => {
                return Err(RuleError::Unknown {
                    what: "clause type",
                    value: other.to_string(),
                });
            }
        })
    }
}

impl From<&ElementSearchClause> for ClauseDraft {
    fn from(clause: &ElementSearchClause) -> Self {
        let mut draft = ClauseDraft::default();
        match clause {
            ElementSearchClause::Query { query } => {
                draft.clause_type = Some("query".into());
                draft.query = Some(query.clone());
            }
            ElementSearchClause::Props {
                path,
                relation,
                value,
            } => {
                draft.clause_type = Some("props".into());
                draft.path = Some(path.clone());
                draft.relation = serde_json::to_value(relation)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string));
                draft.value = Some(value.clone());
            }
            ElementSearchClause::Tags { tags } => {
                draft.clause_type = Some("tags".into());
                draft.tags = Some(tags.clone());
            }
            ElementSearchClause::Comment { state } => {
                draft.clause_type = Some("comment".into());
                draft.state = serde_json::to_value(state)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string));
            }
            ElementSearchClause::Any { clauses } => {
                draft.clause_type = Some("any".into());
                draft.clauses = clauses.iter().map(ClauseDraft::from).collect();
            }
        }
        draft
    }
}

/// An action as an editor form holds it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActionDraft {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    /// Property category of a `set-props` action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub props: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stylesheet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_stylesheet: Option<String>,
}

fn parse_category(s: &str) -> Result<PropCategory, RuleError> {
    serde_json::from_value(Value::String(s.to_string())).map_err(|_| RuleError::Unknown {
        what: "property category",
        value: s.to_string(),
    })
}

impl ActionDraft {
    pub fn build(&self, target: ElementType) -> Result<RuleAction, RuleError> {
        let action_type = self
            .action_type
            .as_deref()
            .ok_or(RuleError::MissingField("type"))?;
        let action = match action_type {
            "set-props" => {
                let kind = parse_category(self.kind.as_deref().ok_or(RuleError::MissingField("kind"))?)?;
                let props = self.props.as_ref().ok_or(RuleError::MissingField("props"))?;
                RuleAction::SetProps {
                    kind,
                    props: ElementProps::from_json_paths(props)?,
                }
            }
            "set-stylesheet" => RuleAction::SetStylesheet {
                stylesheet: self
                    .stylesheet
                    .as_deref()
                    .map(StylesheetId::intern)
                    .ok_or(RuleError::MissingField("stylesheet"))?,
                text_stylesheet: self.text_stylesheet.as_deref().map(StylesheetId::intern),
            },
            "hide" => RuleAction::Hide,
            other => {
                return Err(RuleError::Unknown {
                    what: "action type",
                    value: other.to_string(),
                });
            }
        };
        check_action(&action, target)?;
        Ok(action)
    }
}

impl From<&RuleAction> for ActionDraft {
    fn from(action: &RuleAction) -> Self {
        let mut draft = ActionDraft {
            action_type: Some(action.name().to_string()),
            ..Default::default()
        };
        match action {
            RuleAction::SetProps { kind, props } => {
                draft.kind = Some(kind.as_str().to_string());
                draft.props = serde_json::to_value(props).ok();
            }
            RuleAction::SetStylesheet {
                stylesheet,
                text_stylesheet,
            } => {
                draft.stylesheet = Some(stylesheet.to_string());
                draft.text_stylesheet = text_stylesheet.map(|t| t.to_string());
            }
            RuleAction::Hide => {}
        }
        draft
    }
}

/// A rule as an editor form holds it. [`RuleDraft::build`] validates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuleDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `node`, `edge` or `advanced`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub debug: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub clauses: Vec<ClauseDraft>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionDraft>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<RuleTrigger>,
}

impl RuleDraft {
    pub fn build(&self) -> Result<AdjustmentRule, RuleError> {
        let id = self.id.as_deref().ok_or(RuleError::MissingField("id"))?;
        let target = self.target.as_deref().ok_or(RuleError::MissingField("type"))?;
        let clauses = || -> Result<Vec<ElementSearchClause>, RuleError> {
            self.clauses.iter().map(ClauseDraft::build).collect()
        };
        let actions = |t: ElementType| -> Result<Vec<RuleAction>, RuleError> {
            self.actions.iter().map(|a| a.build(t)).collect()
        };
        let body = match target {
            "node" | "edge" => {
                if self.expression.is_some() || !self.triggers.is_empty() {
                    return Err(RuleError::SimpleWithExpression(if target == "node" {
                        "node"
                    } else {
                        "edge"
                    }));
                }
                if target == "node" {
                    RuleBody::Node {
                        clauses: clauses()?,
                        actions: actions(ElementType::Node)?,
                    }
                } else {
                    RuleBody::Edge {
                        clauses: clauses()?,
                        actions: actions(ElementType::Edge)?,
                    }
                }
            }
            "advanced" => {
                if !self.clauses.is_empty() {
                    return Err(RuleError::AdvancedWithBody("clauses"));
                }
                if !self.actions.is_empty() {
                    return Err(RuleError::AdvancedWithBody("actions"));
                }
                RuleBody::Advanced {
                    expression: self
                        .expression
                        .clone()
                        .ok_or(RuleError::MissingField("expression"))?,
                    triggers: self.triggers.clone(),
                }
            }
            other => {
                return Err(RuleError::Unknown {
                    what: "rule type",
                    value: other.to_string(),
                });
            }
        };
        Ok(AdjustmentRule {
            id: RuleId::intern(id),
            name: self.name.clone().unwrap_or_else(|| id.to_string()),
            debug: self.debug,
            body,
        })
    }
}

impl From<&AdjustmentRule> for RuleDraft {
    fn from(rule: &AdjustmentRule) -> Self {
        let mut draft = RuleDraft {
            id: Some(rule.id.to_string()),
            name: Some(rule.name.clone()),
            debug: rule.debug,
            ..Default::default()
        };
        match &rule.body {
            RuleBody::Node { clauses, actions } | RuleBody::Edge { clauses, actions } => {
                draft.target = Some(
                    if rule.target() == RuleTarget::Node {
                        "node"
                    } else {
                        "edge"
                    }
                    .to_string(),
                );
                draft.clauses = clauses.iter().map(ClauseDraft::from).collect();
                draft.actions = actions.iter().map(ActionDraft::from).collect();
            }
            RuleBody::Advanced {
                expression,
                triggers,
            } => {
                draft.target = Some("advanced".into());
                draft.expression = Some(expression.clone());
                draft.triggers = triggers.clone();
            }
        }
        draft
    }
}

impl From<AdjustmentRule> for RuleDraft {
    fn from(rule: AdjustmentRule) -> Self {
        RuleDraft::from(&rule)
    }
}

impl TryFrom<RuleDraft> for AdjustmentRule {
    type Error = RuleError;

    fn try_from(draft: RuleDraft) -> Result<Self, RuleError> {
        draft.build()
    }
}

// ─── Advanced rules ──────────────────────────────────────────────────────

/// Elements an advanced rule selected, with the inline actions for each.
pub type AdvancedMatches = IndexMap<ElementId, Vec<RuleAction>>;

/// Cached advanced matches keyed by rule.
pub type AdvancedCache = HashMap<RuleId, AdvancedMatches>;

/// Result of running one advanced rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvancedEvaluation {
    pub matches: AdvancedMatches,
    /// The raw output stream, kept for debug inspection.
    pub output: Vec<Value>,
}

/// Read-only projection of the diagram fed to advanced expressions.
pub fn diagram_record(diagram: &Diagram) -> Value {
    let elements: Vec<Value> = diagram
        .elements()
        .into_iter()
        .map(|el| {
            let base = crate::resolve::base_or_defaults(diagram, el);
            crate::search::element_record(diagram, el, &base)
        })
        .collect();
    let layers: Vec<Value> = diagram
        .layers()
        .iter()
        .map(|l| json!({"id": l.id.as_str(), "name": l.name, "visible": l.visible}))
        .collect();
    json!({
        "elements": elements,
        "layers": layers,
        "schemas": diagram.schemas(),
        "selection": diagram.selection().elements.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
        "props": diagram.props(),
    })
}

/// Turn the inline fields of an output object into actions.
fn inline_actions(item: &serde_json::Map<String, Value>) -> Result<Vec<RuleAction>, PathError> {
    let mut actions = Vec::new();
    if let Some(stylesheet) = item.get("stylesheet").and_then(Value::as_str) {
        actions.push(RuleAction::SetStylesheet {
            stylesheet: StylesheetId::intern(stylesheet),
            text_stylesheet: item
                .get("textStylesheet")
                .and_then(Value::as_str)
                .map(StylesheetId::intern),
        });
    }
    if item.get("hide").is_some_and(crate::query::truthy) {
        actions.push(RuleAction::Hide);
    }
    if let Some(props) = item.get("props") {
        let props = ElementProps::from_json_paths(props)?;
        let mut categories: Vec<PropCategory> = Vec::new();
        for path in props.set_paths() {
            if !categories.contains(&path.category()) {
                categories.push(path.category());
            }
        }
        for kind in categories {
            actions.push(RuleAction::SetProps {
                kind,
                props: props.restricted_to(kind),
            });
        }
    }
    Ok(actions)
}

/// Evaluate an advanced rule over the whole diagram.
///
/// Output items are element ids (strings) or objects with an `id` and
/// optional `props`, `hide`, `stylesheet`, `textStylesheet`. Arrays are
/// flattened one level. Unknown ids and malformed items are skipped, as are
/// actions that do not fit the element's type.
pub fn evaluate_advanced(
    diagram: &Diagram,
    rule: &AdjustmentRule,
    query: &dyn QueryEvaluator,
) -> Result<AdvancedEvaluation, QueryError> {
    let RuleBody::Advanced { expression, .. } = &rule.body else {
        return Ok(AdvancedEvaluation::default());
    };
    let output = query.evaluate(expression, &diagram_record(diagram))?;

    let mut matches = AdvancedMatches::new();
    let items = output.iter().flat_map(|v| match v {
        Value::Array(items) => items.iter().collect::<Vec<_>>(),
        other => vec![other],
    });
    for item in items {
        let (id, actions) = match item {
            Value::String(id) => (id.as_str(), Vec::new()),
            Value::Object(obj) => {
                let Some(id) = obj.get("id").and_then(Value::as_str) else {
                    log::debug!("rule {}: output object without id", rule.id);
                    continue;
                };
                match inline_actions(obj) {
                    Ok(actions) => (id, actions),
                    Err(err) => {
                        log::debug!("rule {}: skipping output for {id}: {err}", rule.id);
                        continue;
                    }
                }
            }
            _ => continue,
        };
        let id = ElementId::intern(id);
        let Some(element) = diagram.lookup(id) else {
            continue;
        };
        let target = element.element_type();
        let actions = actions.into_iter().filter(|action| match check_action(action, target) {
            Ok(()) => true,
            Err(err) => {
                log::debug!("rule {}: dropping action for {id}: {err}", rule.id);
                false
            }
        });
        matches.entry(id).or_default().extend(actions);
    }

    if rule.debug {
        for line in &output {
            log::trace!("rule {} output: {line}", rule.id);
        }
    }
    Ok(AdvancedEvaluation { matches, output })
}

// ─── Engine ──────────────────────────────────────────────────────────────

/// A stylesheet chosen by a rule, remembered with the rule that chose it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleStylesheet {
    pub rule: RuleId,
    pub stylesheet: StylesheetId,
}

/// Everything the matching rules decided for one element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleOverrides {
    /// Accumulated `set-props`, later rules winning per leaf.
    pub props: ElementProps,
    pub stylesheet: Option<RuleStylesheet>,
    pub text_stylesheet: Option<RuleStylesheet>,
    pub hidden: bool,
    /// Matched rules in evaluation order.
    pub matched: SmallVec<[RuleId; 4]>,
}

/// Evaluates the rules of an element's layer.
pub struct RuleEngine<'a> {
    diagram: &'a Diagram,
    query: &'a dyn QueryEvaluator,
    cached: Option<&'a AdvancedCache>,
    fresh: RefCell<AdvancedCache>,
}

impl<'a> RuleEngine<'a> {
    /// Advanced rules are evaluated on first use and memoized for the
    /// lifetime of the engine.
    pub fn new(diagram: &'a Diagram, query: &'a dyn QueryEvaluator) -> Self {
        Self {
            diagram,
            query,
            cached: None,
            fresh: RefCell::new(AdvancedCache::new()),
        }
    }

    /// Use precomputed advanced matches (from the trigger scheduler).
    pub fn with_cache(mut self, cache: &'a AdvancedCache) -> Self {
        self.cached = Some(cache);
        self
    }

    fn advanced_actions(&self, rule: &AdjustmentRule, element: ElementId) -> Option<Vec<RuleAction>> {
        if let Some(matches) = self.cached.and_then(|c| c.get(&rule.id)) {
            return matches.get(&element).cloned();
        }
        let mut fresh = self.fresh.borrow_mut();
        let matches = fresh.entry(rule.id).or_insert_with(|| {
            match evaluate_advanced(self.diagram, rule, self.query) {
                Ok(eval) => eval.matches,
                Err(err) => {
                    log::debug!("advanced rule {} failed: {err}", rule.id);
                    AdvancedMatches::new()
                }
            }
        });
        matches.get(&element).cloned()
    }

    /// Fold every matching rule of the element's layer. `base` is the
    /// element's defaults + stylesheet + direct props, used by `props` clauses.
    pub fn resolve(&self, element: &Element, base: &ElementProps) -> RuleOverrides {
        let ctx = MatchContext::new(self.diagram, element, base, self.query);
        let element_type = element.element_type();

        let mut hits: Vec<(RuleId, Vec<RuleAction>)> = Vec::new();
        for rule in self.diagram.rules_for(element) {
            let hit = match &rule.body {
                RuleBody::Node { clauses, actions } if element_type == ElementType::Node => {
                    matches_all(clauses, &ctx).then(|| actions.clone())
                }
                RuleBody::Edge { clauses, actions } if element_type == ElementType::Edge => {
                    matches_all(clauses, &ctx).then(|| actions.clone())
                }
                RuleBody::Advanced { .. } => self.advanced_actions(rule, element.id),
                _ => None,
            };
            if rule.debug {
                log::trace!(
                    "rule {} on {}: {}",
                    rule.id,
                    element.id,
                    if hit.is_some() { "matched" } else { "no match" }
                );
            }
            if let Some(actions) = hit {
                hits.push((rule.id, actions));
            }
        }

        let mut out = RuleOverrides::default();
        for (rule, actions) in &hits {
            out.matched.push(*rule);
            for action in actions {
                match action {
                    RuleAction::SetStylesheet {
                        stylesheet,
                        text_stylesheet,
                    } => {
                        out.stylesheet = Some(RuleStylesheet {
                            rule: *rule,
                            stylesheet: *stylesheet,
                        });
                        if let Some(text) = text_stylesheet {
                            out.text_stylesheet = Some(RuleStylesheet {
                                rule: *rule,
                                stylesheet: *text,
                            });
                        }
                    }
                    RuleAction::Hide => out.hidden = true,
                    RuleAction::SetProps { .. } => {}
                }
            }
        }
        for (_, actions) in &hits {
            for action in actions {
                if let RuleAction::SetProps { kind, props } = action {
                    out.props.merge_from(&props.restricted_to(*kind));
                }
            }
        }
        out
    }

    /// Whether any matching rule hides the element.
    pub fn is_hidden(&self, element: &Element, base: &ElementProps) -> bool {
        self.resolve(element, base).hidden
    }
}

/// Paths a `set-props` action of `kind` may write.
pub fn category_paths(kind: PropCategory) -> Vec<PropPath> {
    PropPath::ALL
        .iter()
        .copied()
        .filter(|p| p.category() == kind)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn draft(value: Value) -> Result<AdjustmentRule, RuleError> {
        serde_json::from_value::<RuleDraft>(value).unwrap().build()
    }

    #[test]
    fn builds_simple_rule_from_json() {
        let rule: AdjustmentRule = serde_json::from_value(json!({
            "id": "urgent",
            "type": "node",
            "clauses": [{"type": "tags", "tags": ["urgent"]}],
            "actions": [{"type": "set-props", "kind": "fill", "props": {"fill": {"color": "#ff0000"}}}]
        }))
        .unwrap();
        assert_eq!(rule.name, "urgent");
        assert_eq!(rule.target(), RuleTarget::Node);
        assert_eq!(rule.clauses().len(), 1);
        let RuleAction::SetProps { kind, props } = &rule.actions()[0] else {
            panic!("expected set-props");
        };
        assert_eq!(*kind, PropCategory::Fill);
        assert_eq!(props.fill.color, crate::props::Color::from_hex("#FF0000"));
    }

    #[test]
    fn serialization_goes_through_draft() {
        let rule = AdjustmentRule::simple(
            "r_ser",
            ElementType::Edge,
            vec![ElementSearchClause::Tags {
                tags: vec!["x".into()],
            }],
            vec![RuleAction::Hide],
        )
        .unwrap();
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            json,
            json!({
                "id": "r_ser",
                "name": "r_ser",
                "type": "edge",
                "clauses": [{"type": "tags", "tags": ["x"]}],
                "actions": [{"type": "hide"}]
            })
        );
        let back: AdjustmentRule = serde_json::from_value(json).unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn rejects_incomplete_drafts() {
        assert_eq!(draft(json!({"type": "node"})), Err(RuleError::MissingField("id")));
        assert_eq!(
            draft(json!({"id": "r", "type": "node", "clauses": [{"type": "props", "path": "x"}]})),
            Err(RuleError::MissingField("relation"))
        );
        assert_eq!(
            draft(json!({"id": "r", "type": "circle"})),
            Err(RuleError::Unknown {
                what: "rule type",
                value: "circle".into()
            })
        );
        assert_eq!(
            draft(json!({"id": "r", "type": "node", "clauses": [{"type": "props", "path": "x", "relation": "like", "value": 1}]})),
            Err(RuleError::Unknown {
                what: "relation",
                value: "like".into()
            })
        );
    }

    #[test]
    fn rejects_heterogeneous_actions() {
        assert_eq!(
            draft(json!({"id": "r", "type": "node", "actions": [
                {"type": "set-props", "kind": "line", "props": {"line.arrow": "both"}}
            ]})),
            Err(RuleError::HeterogeneousAction {
                action: "set-props line",
                target: "node"
            })
        );
        assert_eq!(
            draft(json!({"id": "r", "type": "edge", "actions": [
                {"type": "set-stylesheet", "stylesheet": "s", "textStylesheet": "t"}
            ]})),
            Err(RuleError::HeterogeneousAction {
                action: "set-stylesheet textStylesheet",
                target: "edge"
            })
        );
        assert_eq!(
            draft(json!({"id": "r", "type": "node", "actions": [
                {"type": "set-props", "kind": "fill", "props": {"stroke.width": 2}}
            ]})),
            Err(RuleError::PropsOutsideCategory {
                category: "fill".into(),
                path: "stroke.width".into()
            })
        );
    }

    #[test]
    fn advanced_rules_take_expression_only() {
        assert_eq!(
            draft(json!({"id": "r", "type": "advanced", "expression": ".", "actions": [{"type": "hide"}]})),
            Err(RuleError::AdvancedWithBody("actions"))
        );
        assert_eq!(
            draft(json!({"id": "r", "type": "advanced"})),
            Err(RuleError::MissingField("expression"))
        );
        assert_eq!(
            draft(json!({"id": "r", "type": "node", "expression": "."})),
            Err(RuleError::SimpleWithExpression("node"))
        );
        let rule = draft(json!({
            "id": "r_adv", "type": "advanced", "expression": ".elements[].id",
            "triggers": [{"type": "interval", "seconds": 5}, {"type": "element-event", "elementType": "edge"}]
        }))
        .unwrap();
        assert_eq!(
            rule.triggers(),
            &[
                RuleTrigger::Interval { seconds: 5.0 },
                RuleTrigger::ElementEvent {
                    element_type: ElementType::Edge
                }
            ]
        );
    }

    #[test]
    fn replace_stylesheet_rewrites_actions() {
        let old = StylesheetId::intern("r_old");
        let new = StylesheetId::intern("r_new");
        let mut rule = AdjustmentRule::simple(
            "r_repl",
            ElementType::Node,
            vec![],
            vec![RuleAction::SetStylesheet {
                stylesheet: old,
                text_stylesheet: Some(old),
            }],
        )
        .unwrap();
        assert!(rule.references_stylesheet(old));
        rule.replace_stylesheet(old, new);
        assert!(!rule.references_stylesheet(old));
        assert_eq!(
            rule.actions(),
            &[RuleAction::SetStylesheet {
                stylesheet: new,
                text_stylesheet: Some(new)
            }]
        );
    }

    #[test]
    fn inline_actions_split_by_category() {
        let obj = json!({"id": "x", "hide": true, "stylesheet": "s", "props": {"fill.color": "#000", "opacity": 0.5}});
        let actions = inline_actions(obj.as_object().unwrap()).unwrap();
        assert_eq!(actions.len(), 4);
        assert_eq!(actions[1], RuleAction::Hide);
        assert!(matches!(
            actions[2],
            RuleAction::SetProps {
                kind: PropCategory::Fill,
                ..
            }
        ));
        assert_eq!(category_paths(PropCategory::Line).len(), 2);
    }

    #[test]
    fn set_props_checks_paths_against_category_table() {
        let mut props = ElementProps::default();
        props.opacity = Some(0.5);
        let action = RuleAction::SetProps {
            kind: PropCategory::Fill,
            props,
        };
        assert_eq!(
            check_action(&action, ElementType::Node),
            Err(RuleError::PropsOutsideCategory {
                category: "fill".into(),
                path: "opacity".into(),
            })
        );
        for kind in [PropCategory::Fill, PropCategory::Line] {
            assert!(category_paths(kind).iter().all(|p| p.category() == kind));
        }
    }
}

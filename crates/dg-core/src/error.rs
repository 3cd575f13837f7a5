//! Error taxonomy for the core.
//!
//! - [`ConfigError`]: broken stylesheet chains or references. Surfaced once
//!   through `Diagnostics`, then the element falls back to defaults.
//! - [`RuleError`]: a rule draft that cannot become a valid rule.
//! - [`QueryError`]: malformed or failing query expressions. Rule evaluation
//!   swallows these as "no match".
//! - [`PathError`]: unknown property paths or mistyped values.
//! - [`UowError`]: transaction misuse and unknown references inside a
//!   unit of work. These are programming errors and always propagate.

use crate::id::{ElementId, LayerId, RuleId, StylesheetId};
use crate::stylesheet::StylesheetKind;
use thiserror::Error;

/// Unknown path or mistyped value when addressing a property object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("unknown property path `{0}`")]
    UnknownPath(String),

    #[error("property `{path}` expects {expected}, got `{got}`")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        got: String,
    },
}

/// A stylesheet or rule definition that cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum ConfigError {
    #[error("stylesheet `{0}` has a cyclic parent chain")]
    StylesheetCycle(StylesheetId),

    #[error("stylesheet chain starting at `{0}` exceeds the maximum depth of {1}")]
    StylesheetTooDeep(StylesheetId, usize),

    #[error("unknown stylesheet `{0}`")]
    UnknownStylesheet(StylesheetId),

    #[error("stylesheet `{id}` is a {actual:?} stylesheet, expected {expected:?}")]
    StylesheetKindMismatch {
        id: StylesheetId,
        expected: StylesheetKind,
        actual: StylesheetKind,
    },

    #[error("rule `{rule}` references unknown stylesheet `{stylesheet}`")]
    RuleUnknownStylesheet {
        rule: RuleId,
        stylesheet: StylesheetId,
    },
}

/// A rule draft that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("unknown {what} `{value}`")]
    Unknown { what: &'static str, value: String },

    #[error("{action} action is not valid for {target} rules")]
    HeterogeneousAction {
        action: &'static str,
        target: &'static str,
    },

    #[error("set-props for category `{category}` also sets `{path}`")]
    PropsOutsideCategory { category: String, path: String },

    #[error("advanced rules carry an expression only, found {0}")]
    AdvancedWithBody(&'static str),

    #[error("{0} rules take clauses and actions, not an expression or triggers")]
    SimpleWithExpression(&'static str),

    #[error(transparent)]
    Path(#[from] PathError),
}

/// Failure while parsing or evaluating a query expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("query parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("query runtime error: {0}")]
    Runtime(String),
}

/// Transaction misuse or an unknown reference inside a unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UowError {
    #[error("unit of work is {0}; no further changes accepted")]
    InvalidState(&'static str),

    #[error("unknown element `{0}`")]
    UnknownElement(ElementId),

    #[error("unknown stylesheet `{0}`")]
    UnknownStylesheet(StylesheetId),

    #[error("unknown layer `{0}`")]
    UnknownLayer(LayerId),

    #[error("unknown rule `{0}`")]
    UnknownRule(RuleId),

    #[error("duplicate id `{0}`")]
    DuplicateId(String),

    #[error("cannot move `{element}` under its own descendant `{parent}`")]
    InvalidMove { element: ElementId, parent: ElementId },

    #[error("built-in stylesheet `{0}` cannot be deleted")]
    DefaultStylesheet(StylesheetId),

    #[error("layer `{0}` still holds elements")]
    LayerNotEmpty(LayerId),

    #[error("unit of work was opened without snapshots and cannot restore state")]
    NoSnapshots,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Path(#[from] PathError),
}

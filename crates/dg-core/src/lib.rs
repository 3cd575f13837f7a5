pub mod defaults;
pub mod error;
pub mod events;
pub mod id;
pub mod model;
pub mod path;
pub mod props;
pub mod query;
pub mod resolve;
pub mod rules;
pub mod search;
pub mod snapshot;
pub mod stylesheet;
pub mod triggers;
pub mod uow;

pub use defaults::{Defaults, DefaultsTable};
pub use error::{ConfigError, PathError, QueryError, RuleError, UowError};
pub use events::{ChangeSet, DiagramEvent, EventBus, ListenerId};
pub use id::{ElementId, LayerId, RuleId, StylesheetId};
pub use model::*;
pub use path::PropertyObject;
pub use props::{Color, DiagramProps, ElementProps, PropCategory, PropPath, PropValue};
pub use query::{FilterQuery, QueryEvaluator};
pub use resolve::{EffectiveProps, Resolver};
pub use rules::{AdjustmentRule, RuleAction, RuleDraft, RuleTrigger};
pub use search::ElementSearchClause;
pub use snapshot::{Side, SnapshotSet};
pub use stylesheet::{Stylesheet, StylesheetKind};
pub use triggers::AdvancedRuleScheduler;
pub use uow::{UnitOfWork, UowOptions, UowState};

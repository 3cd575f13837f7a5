//! Re-evaluation of advanced rules.
//!
//! Advanced rules look at the whole diagram, so their output is cached
//! and only recomputed when one of their triggers fires:
//!
//! - `interval`: at least `seconds` elapsed since the last run
//! - `element-event`: a change touched an element of that type
//! - `data-schema`: element data of that schema (or the schema) changed
//!
//! A rule without triggers is re-evaluated after any change. Editing a
//! layer re-evaluates every advanced rule on it.

use crate::events::ChangeSet;
use crate::id::{ElementId, RuleId};
use crate::model::Diagram;
use crate::query::QueryEvaluator;
use crate::rules::{AdjustmentRule, AdvancedCache, AdvancedMatches, RuleTarget, RuleTrigger, evaluate_advanced};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};

/// Entries kept in the debug log before the oldest are dropped.
pub const DEBUG_LOG_CAPACITY: usize = 200;

/// One evaluation of a rule flagged `debug`.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleLogEntry {
    pub rule: RuleId,
    pub at_ms: u64,
    pub output: Vec<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct AdvancedRuleScheduler {
    cache: AdvancedCache,
    last_run: HashMap<RuleId, u64>,
    stale: HashSet<RuleId>,
    log: VecDeque<RuleLogEntry>,
}

fn advanced_rules(diagram: &Diagram) -> impl Iterator<Item = &AdjustmentRule> {
    diagram
        .layers()
        .iter()
        .flat_map(|l| l.rules.iter())
        .filter(|r| r.target() == RuleTarget::Advanced)
}

fn fired_by(rule: &AdjustmentRule, changes: &ChangeSet) -> bool {
    let triggers = rule.triggers();
    if triggers.is_empty() {
        return !changes.is_empty();
    }
    triggers.iter().any(|t| match t {
        RuleTrigger::Interval { .. } => false,
        RuleTrigger::ElementEvent { element_type } => changes.touches_type(*element_type),
        RuleTrigger::DataSchema { schema } => changes.touches_schema(schema),
    })
}

fn note<'a>(affected: &mut Vec<ElementId>, ids: impl Iterator<Item = &'a ElementId>) {
    for id in ids {
        if !affected.contains(id) {
            affected.push(*id);
        }
    }
}

impl AdvancedRuleScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached matches of every evaluated rule, for [`crate::resolve::Resolver::with_cache`].
    pub fn cache(&self) -> &AdvancedCache {
        &self.cache
    }

    pub fn matches(&self, rule: RuleId) -> Option<&AdvancedMatches> {
        self.cache.get(&rule)
    }

    /// Force a rule to be re-evaluated on the next refresh.
    pub fn invalidate(&mut self, rule: RuleId) {
        self.stale.insert(rule);
    }

    /// Mark the rules a committed change fires.
    pub fn observe(&mut self, diagram: &Diagram, changes: &ChangeSet) {
        for layer in diagram.layers() {
            let layer_edited = changes.layers.contains(&layer.id);
            for rule in layer.rules.iter().filter(|r| r.target() == RuleTarget::Advanced) {
                if layer_edited || fired_by(rule, changes) {
                    self.stale.insert(rule.id);
                }
            }
        }
    }

    fn interval_due(&self, rule: &AdjustmentRule, now_ms: u64) -> bool {
        let Some(&last) = self.last_run.get(&rule.id) else {
            return true;
        };
        rule.triggers().iter().any(|t| match t {
            RuleTrigger::Interval { seconds } if *seconds > 0.0 => {
                now_ms.saturating_sub(last) as f64 >= seconds * 1000.0
            }
            _ => false,
        })
    }

    /// Re-evaluate every due rule. Returns the elements whose advanced
    /// matches changed.
    pub fn refresh(
        &mut self,
        diagram: &Diagram,
        query: &dyn QueryEvaluator,
        now_ms: u64,
    ) -> Vec<ElementId> {
        let present: HashSet<RuleId> = advanced_rules(diagram).map(|r| r.id).collect();
        let mut affected: Vec<ElementId> = Vec::new();

        // Rules deleted since the last refresh.
        let gone: Vec<RuleId> = self
            .cache
            .keys()
            .copied()
            .filter(|id| !present.contains(id))
            .collect();
        for id in gone {
            if let Some(old) = self.cache.remove(&id) {
                note(&mut affected, old.keys());
            }
            self.last_run.remove(&id);
        }

        for rule in advanced_rules(diagram) {
            let due = self.stale.contains(&rule.id)
                || !self.cache.contains_key(&rule.id)
                || self.interval_due(rule, now_ms);
            if !due {
                continue;
            }
            let (matches, output, error) = match evaluate_advanced(diagram, rule, query) {
                Ok(eval) => (eval.matches, eval.output, None),
                Err(err) => {
                    log::debug!("advanced rule {} failed: {err}", rule.id);
                    (AdvancedMatches::new(), Vec::new(), Some(err.to_string()))
                }
            };
            if rule.debug {
                self.log.push_back(RuleLogEntry {
                    rule: rule.id,
                    at_ms: now_ms,
                    output,
                    error,
                });
                while self.log.len() > DEBUG_LOG_CAPACITY {
                    self.log.pop_front();
                }
            }

            let old = self.cache.remove(&rule.id).unwrap_or_default();
            note(
                &mut affected,
                matches.iter().filter(|(id, a)| old.get(*id) != Some(*a)).map(|(id, _)| id),
            );
            note(&mut affected, old.keys().filter(|id| !matches.contains_key(*id)));
            self.cache.insert(rule.id, matches);
            self.last_run.insert(rule.id, now_ms);
        }
        self.stale.clear();
        affected
    }

    /// Debug log, oldest first.
    pub fn debug_log(&self) -> impl Iterator<Item = &RuleLogEntry> {
        self.log.iter()
    }

    pub fn clear_debug_log(&mut self) {
        self.log.clear();
    }
}

//! Editing actions as the property panels invoke them.
//!
//! Each action runs in one unit of work and records one undo entry.
//! Default stylesheets are protected here, not in the core store.

use crate::error::EditorError;
use crate::history::UndoManager;
use dg_core::rules::RuleDraft;
use dg_core::stylesheet::{self, Stylesheet, is_default_stylesheet};
use dg_core::{AdjustmentRule, Diagram, ElementId, ElementProps, LayerId, RuleId, StylesheetId, UowError};

fn ensure_not_default(id: StylesheetId, action: &'static str) -> Result<(), EditorError> {
    if is_default_stylesheet(id) {
        return Err(EditorError::ProtectedStylesheet { id, action });
    }
    Ok(())
}

// ─── Stylesheets ─────────────────────────────────────────────────────────

pub fn create_stylesheet(
    diagram: &mut Diagram,
    history: &mut UndoManager,
    sheet: Stylesheet,
) -> Result<(), EditorError> {
    let label = format!("Create style {}", sheet.name);
    history.execute_with_undo(diagram, &label, |uow| {
        stylesheet::add_stylesheet(uow, sheet).map_err(EditorError::from)
    })
}

pub fn rename_stylesheet(
    diagram: &mut Diagram,
    history: &mut UndoManager,
    id: StylesheetId,
    name: &str,
) -> Result<(), EditorError> {
    ensure_not_default(id, "renamed")?;
    history.execute_with_undo(diagram, "Rename style", |uow| {
        stylesheet::rename_stylesheet(uow, id, name).map_err(EditorError::from)
    })
}

/// Delete a sheet. Its users, children and rule references move to the
/// kind's default in the same entry.
pub fn delete_stylesheet(
    diagram: &mut Diagram,
    history: &mut UndoManager,
    id: StylesheetId,
) -> Result<Stylesheet, EditorError> {
    ensure_not_default(id, "deleted")?;
    history.execute_with_undo(diagram, "Delete style", |uow| {
        stylesheet::delete_stylesheet(uow, id).map_err(EditorError::from)
    })
}

pub fn update_stylesheet_props(
    diagram: &mut Diagram,
    history: &mut UndoManager,
    id: StylesheetId,
    props: ElementProps,
) -> Result<Vec<ElementId>, EditorError> {
    history.execute_with_undo(diagram, "Update style", |uow| {
        stylesheet::update_stylesheet_props(uow, id, props).map_err(EditorError::from)
    })
}

/// Bind every selected element to `sheet`. Text sheets skip edges.
/// Returns the elements that were rebound.
pub fn set_selection_stylesheet(
    diagram: &mut Diagram,
    history: &mut UndoManager,
    sheet: StylesheetId,
    reapply: bool,
) -> Result<Vec<ElementId>, EditorError> {
    let is_text = diagram
        .stylesheets()
        .get(sheet)
        .map(|s| s.kind == stylesheet::StylesheetKind::Text)
        .ok_or(UowError::UnknownStylesheet(sheet))?;
    let targets: Vec<ElementId> = diagram
        .selection()
        .elements
        .iter()
        .copied()
        .filter(|id| {
            diagram
                .lookup(*id)
                .is_some_and(|el| !is_text || el.element_type() == dg_core::ElementType::Node)
        })
        .collect();
    history.execute_with_undo(diagram, "Apply style", |uow| {
        for id in &targets {
            stylesheet::set_stylesheet(uow, *id, sheet, reapply)?;
        }
        Ok::<_, EditorError>(targets.clone())
    })
}

/// Drop the direct overrides of the selection: the text group with
/// `is_text`, everything else otherwise.
pub fn clear_selection_overrides(
    diagram: &mut Diagram,
    history: &mut UndoManager,
    is_text: bool,
) -> Result<(), EditorError> {
    let targets = diagram.selection().elements.clone();
    history.execute_with_undo(diagram, "Clear style overrides", |uow| {
        for id in targets {
            uow.update_element(id, |e| {
                e.props = if is_text {
                    e.props.without_text()
                } else {
                    ElementProps {
                        text: e.props.text.clone(),
                        ..Default::default()
                    }
                };
            })?;
        }
        Ok::<_, EditorError>(())
    })
}

// ─── Rules ───────────────────────────────────────────────────────────────

fn rule_index(diagram: &Diagram, layer: LayerId, rule: RuleId) -> Result<usize, EditorError> {
    diagram
        .layer(layer)
        .ok_or(UowError::UnknownLayer(layer))?
        .rules
        .iter()
        .position(|r| r.id == rule)
        .ok_or_else(|| UowError::UnknownRule(rule).into())
}

/// Append a rule to a layer.
pub fn add_rule(
    diagram: &mut Diagram,
    history: &mut UndoManager,
    layer: LayerId,
    rule: AdjustmentRule,
) -> Result<(), EditorError> {
    let existing = diagram.layer(layer).ok_or(UowError::UnknownLayer(layer))?;
    if existing.rules.iter().any(|r| r.id == rule.id) {
        return Err(UowError::DuplicateId(rule.id.to_string()).into());
    }
    let label = format!("Add rule {}", rule.name);
    history.execute_with_undo(diagram, &label, |uow| {
        uow.update_layer(layer, |l| l.rules.push(rule))
            .map_err(EditorError::from)
    })
}

/// Validate a draft and append it.
pub fn add_rule_from_draft(
    diagram: &mut Diagram,
    history: &mut UndoManager,
    layer: LayerId,
    draft: &RuleDraft,
) -> Result<RuleId, EditorError> {
    let rule = draft.build()?;
    let id = rule.id;
    add_rule(diagram, history, layer, rule)?;
    Ok(id)
}

/// Replace the rule with the same id, keeping its position.
pub fn update_rule(
    diagram: &mut Diagram,
    history: &mut UndoManager,
    layer: LayerId,
    rule: AdjustmentRule,
) -> Result<(), EditorError> {
    let index = rule_index(diagram, layer, rule.id)?;
    history.execute_with_undo(diagram, "Edit rule", |uow| {
        uow.update_layer(layer, |l| l.rules[index] = rule)
            .map_err(EditorError::from)
    })
}

pub fn delete_rule(
    diagram: &mut Diagram,
    history: &mut UndoManager,
    layer: LayerId,
    rule: RuleId,
) -> Result<AdjustmentRule, EditorError> {
    let index = rule_index(diagram, layer, rule)?;
    history.execute_with_undo(diagram, "Delete rule", |uow| {
        let mut removed = None;
        uow.update_layer(layer, |l| removed = Some(l.rules.remove(index)))?;
        removed.ok_or(EditorError::Uow(UowError::UnknownRule(rule)))
    })
}

/// Move a rule to `to`; later rules win, so this changes precedence.
pub fn move_rule(
    diagram: &mut Diagram,
    history: &mut UndoManager,
    layer: LayerId,
    rule: RuleId,
    to: usize,
) -> Result<(), EditorError> {
    let from = rule_index(diagram, layer, rule)?;
    let len = diagram.layer(layer).map_or(0, |l| l.rules.len());
    if to >= len {
        return Err(EditorError::RuleIndexOutOfRange { index: to, len });
    }
    if from == to {
        return Ok(());
    }
    history.execute_with_undo(diagram, "Reorder rules", |uow| {
        uow.update_layer(layer, |l| {
            let moved = l.rules.remove(from);
            l.rules.insert(to, moved);
        })
        .map_err(EditorError::from)
    })
}

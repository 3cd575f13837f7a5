//! Live previews for dialogs.
//!
//! A preview sets the history mark, then every `update` rolls back to the
//! mark and applies the new candidate. `commit` leaves exactly one entry
//! above the mark; `cancel` leaves the history as it was before `begin`.

use crate::history::UndoManager;
use dg_core::uow::UnitOfWork;
use dg_core::{Diagram, UowError};

pub struct Preview<'a> {
    diagram: &'a mut Diagram,
    history: &'a mut UndoManager,
    finished: bool,
}

impl<'a> Preview<'a> {
    pub fn begin(diagram: &'a mut Diagram, history: &'a mut UndoManager) -> Self {
        history.set_mark();
        Self {
            diagram,
            history,
            finished: false,
        }
    }

    /// Replace the previewed change with the result of `f`.
    pub fn update<T, E>(
        &mut self,
        label: &str,
        f: impl FnOnce(&mut UnitOfWork<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<UowError>,
    {
        self.history.undo_to_mark(self.diagram);
        self.history.execute_with_undo(self.diagram, label, f)
    }

    /// Read the diagram in its previewed state.
    pub fn diagram(&self) -> &Diagram {
        self.diagram
    }

    /// Keep the last previewed change as one entry labelled `label`.
    pub fn commit(mut self, label: &str) {
        self.history.collapse_to_mark(label);
        self.history.clear_mark();
        self.finished = true;
    }

    /// Roll back to the state before `begin`.
    pub fn cancel(mut self) {
        self.rollback();
    }

    fn rollback(&mut self) {
        self.history.undo_to_mark(self.diagram);
        self.history.clear_mark();
        self.finished = true;
    }
}

impl Drop for Preview<'_> {
    fn drop(&mut self) {
        if !self.finished {
            log::debug!("preview dropped without commit; rolling back");
            self.rollback();
        }
    }
}

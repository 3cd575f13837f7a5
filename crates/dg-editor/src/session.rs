//! An open document: diagram, history and advanced-rule scheduling.

use crate::history::UndoManager;
use crate::preview::Preview;
use dg_core::uow::UnitOfWork;
use dg_core::{
    AdvancedRuleScheduler, ChangeSet, Diagram, DiagramEvent, EffectiveProps, ElementId, FilterQuery,
    ListenerId, Resolver, UowError,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub struct Session {
    pub diagram: Diagram,
    pub history: UndoManager,
    scheduler: AdvancedRuleScheduler,
    query: FilterQuery,
    /// Change sets delivered by the event bus, drained on refresh.
    inbox: Rc<RefCell<VecDeque<ChangeSet>>>,
    listener: ListenerId,
}

impl Session {
    pub fn new(diagram: Diagram) -> Self {
        Self::with_history(diagram, UndoManager::default())
    }

    pub fn with_history(mut diagram: Diagram, history: UndoManager) -> Self {
        let inbox = Rc::new(RefCell::new(VecDeque::new()));
        let sink = inbox.clone();
        let listener = diagram.events_mut().subscribe(move |event| {
            if let DiagramEvent::Change(changes) = event {
                sink.borrow_mut().push_back(changes.clone());
            }
        });
        Self {
            diagram,
            history,
            scheduler: AdvancedRuleScheduler::new(),
            query: FilterQuery::new(),
            inbox,
            listener,
        }
    }

    pub fn execute_with_undo<T, E>(
        &mut self,
        label: &str,
        f: impl FnOnce(&mut UnitOfWork<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<UowError>,
    {
        self.history.execute_with_undo(&mut self.diagram, label, f)
    }

    pub fn undo(&mut self) -> Option<String> {
        self.history.undo(&mut self.diagram)
    }

    pub fn redo(&mut self) -> Option<String> {
        self.history.redo(&mut self.diagram)
    }

    /// Start a live preview against this session's history.
    pub fn preview(&mut self) -> Preview<'_> {
        Preview::begin(&mut self.diagram, &mut self.history)
    }

    /// Feed pending changes to the scheduler and re-run due advanced
    /// rules. Returns the elements whose rule matches changed.
    pub fn refresh(&mut self, now_ms: u64) -> Vec<ElementId> {
        let pending: Vec<ChangeSet> = self.inbox.borrow_mut().drain(..).collect();
        for changes in &pending {
            self.scheduler.observe(&self.diagram, changes);
        }
        self.scheduler.refresh(&self.diagram, &self.query, now_ms)
    }

    /// Effective properties using the scheduler's cached advanced matches.
    pub fn effective(&self, id: ElementId) -> Option<EffectiveProps> {
        Resolver::new(&self.diagram, &self.query)
            .with_cache(self.scheduler.cache())
            .effective(id)
    }

    pub fn scheduler(&self) -> &AdvancedRuleScheduler {
        &self.scheduler
    }

    /// Close the session and hand back its diagram.
    pub fn into_diagram(mut self) -> Diagram {
        self.diagram.events_mut().unsubscribe(self.listener);
        self.diagram
    }
}

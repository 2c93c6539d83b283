//! The transition engine: lock flag, transition flag and scratch set.
//!
//! Every cell is created against an [`Engine`] and routes its notification
//! passes through it. Engines are independent: two engines never share a
//! lock or a scratch set, so isolated subsystems (or tests) can run side by
//! side on one thread.
//!
//! # Invariants
//!
//! 1. At most one notification pass is active per engine. Starting a second
//!    one while the flag is held is rejected and recorded as a violation.
//! 2. A recorded violation aborts the active pass: remaining watchers are
//!    skipped and the outer caller receives
//!    [`ImperaError::ReentrantUpdate`].
//! 3. The scratch set holds each cell at most once, in first-touch order.
//! 4. Lock flag, transition flag, scratch set and violation slot are all
//!    reset when a [`PassGuard`] drops, on success and failure alike.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::{ImperaError, Result};
use crate::storage::{MemoryStorage, StorageBackend};

/// Per-engine cell identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct CellId(u64);

/// Deferred flush registered by a variable written inside a transition.
pub(crate) type FlushFn = Rc<dyn Fn() -> Result<()>>;

struct EngineState {
    storage: Rc<dyn StorageBackend>,
    locked: Cell<bool>,
    in_transition: Cell<bool>,
    pending: RefCell<Vec<(CellId, FlushFn)>>,
    violation: RefCell<Option<String>>,
    next_cell: Cell<u64>,
}

/// Shared handle to one engine. Clones refer to the same engine.
#[derive(Clone)]
pub struct Engine {
    state: Rc<EngineState>,
}

impl Engine {
    /// Create an engine persisting through `storage`.
    #[must_use]
    pub fn new(storage: impl StorageBackend + 'static) -> Self {
        Self::with_storage(Rc::new(storage))
    }

    /// Create an engine over an already shared storage handle.
    #[must_use]
    pub fn with_storage(storage: Rc<dyn StorageBackend>) -> Self {
        Self {
            state: Rc::new(EngineState {
                storage,
                locked: Cell::new(false),
                in_transition: Cell::new(false),
                pending: RefCell::new(Vec::new()),
                violation: RefCell::new(None),
                next_cell: Cell::new(0),
            }),
        }
    }

    /// Engine over a fresh [`MemoryStorage`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new())
    }

    /// The storage collaborator.
    #[must_use]
    pub fn storage(&self) -> &Rc<dyn StorageBackend> {
        &self.state.storage
    }

    /// Whether a notification pass (or transition) is active.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.locked.get()
    }

    /// Whether a transition procedure is currently running.
    #[must_use]
    pub fn in_transition(&self) -> bool {
        self.state.in_transition.get()
    }

    /// Number of variables waiting for the end-of-transition flush.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.state.pending.borrow().len()
    }

    /// Whether two handles refer to the same engine.
    #[must_use]
    pub fn same_engine(&self, other: &Engine) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    pub(crate) fn next_cell_id(&self) -> CellId {
        let id = self.state.next_cell.get();
        self.state.next_cell.set(id + 1);
        CellId(id)
    }

    pub(crate) fn has_violation(&self) -> bool {
        self.state.violation.borrow().is_some()
    }

    /// Record a nested pass attempt by `cell` and build the error for it.
    pub(crate) fn reject_reentry(&self, cell: &str) -> ImperaError {
        tracing::warn!(cell, "nested update attempted during a notification pass");
        let mut violation = self.state.violation.borrow_mut();
        if violation.is_none() {
            *violation = Some(cell.to_owned());
        }
        ImperaError::ReentrantUpdate {
            cell: cell.to_owned(),
        }
    }

    /// Start a direct notification pass for `cell`.
    pub(crate) fn begin_pass(&self, cell: &str) -> Result<PassGuard> {
        if self.state.locked.get() {
            return Err(self.reject_reentry(cell));
        }
        self.state.locked.set(true);
        Ok(PassGuard {
            engine: self.clone(),
        })
    }

    /// Start a transition: take the lock and route variable writes into the
    /// scratch set until [`PassGuard::leave_procedure`].
    pub(crate) fn begin_transition(&self, cell: &str) -> Result<PassGuard> {
        let guard = self.begin_pass(cell)?;
        self.state.in_transition.set(true);
        Ok(guard)
    }

    /// Register `flush` for `id` unless the cell is already pending.
    pub(crate) fn mark_pending(&self, id: CellId, flush: FlushFn) {
        let mut pending = self.state.pending.borrow_mut();
        if !pending.iter().any(|(pending_id, _)| *pending_id == id) {
            pending.push((id, flush));
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("locked", &self.is_locked())
            .field("in_transition", &self.in_transition())
            .field("pending", &self.pending_len())
            .finish()
    }
}

/// RAII guard for one notification pass.
///
/// Dropping the guard releases the lock and resets all scratch state, which
/// is what makes every early `?` return leave the engine idle.
#[must_use = "dropping the guard ends the notification pass"]
pub(crate) struct PassGuard {
    engine: Engine,
}

impl PassGuard {
    /// Stop routing writes into the scratch set.
    pub(crate) fn leave_procedure(&self) {
        self.engine.state.in_transition.set(false);
    }

    /// Fail if a nested pass was attempted since this pass began.
    pub(crate) fn check(&self) -> Result<()> {
        match self.engine.state.violation.borrow().as_ref() {
            Some(cell) => Err(ImperaError::ReentrantUpdate { cell: cell.clone() }),
            None => Ok(()),
        }
    }

    /// Drain the scratch set in first-touch order.
    pub(crate) fn take_pending(&self) -> Vec<FlushFn> {
        self.engine
            .state
            .pending
            .borrow_mut()
            .drain(..)
            .map(|(_, flush)| flush)
            .collect()
    }

    /// End the pass, reporting any violation recorded during it.
    pub(crate) fn finish(self) -> Result<()> {
        self.check()
    }
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        let state = &self.engine.state;
        state.in_transition.set(false);
        state.pending.borrow_mut().clear();
        state.violation.borrow_mut().take();
        state.locked.set(false);
    }
}

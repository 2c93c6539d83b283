//! Batched state changes.
//!
//! A [`StateTransition`] runs a procedure that may touch several variables
//! and guarantees watchers only ever observe the final state.
//!
//! # Lifecycle of one `apply`
//!
//! ```text
//! IDLE ──lock──► LOCKED ──procedure──► FLUSHING ──► IDLE
//!   │              │                      │
//!   └─ already     └─ procedure error:     └─ transition watchers (input),
//!      locked:        scratch set            then each pending variable
//!      ReentrantUpdate dropped, lock          once, in first-touch order
//!                     released
//! ```
//!
//! # Invariants
//!
//! 1. While the procedure runs, variable writes are deferred; no watcher is
//!    invoked until it returns.
//! 2. Each variable touched by the procedure is persisted and notified
//!    exactly once, with its final value.
//! 3. The lock and the scratch set are released on every exit path.
//!
//! # Known gap
//!
//! A failing procedure leaves its in-memory writes in place (nothing is
//! persisted or notified, nothing is rolled back). Callers that need
//! all-or-nothing memory state must validate before writing.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::engine::Engine;
use crate::error::Result;
use crate::watch::{CellCore, impl_watchable};

type Procedure = Rc<dyn Fn(Option<&Value>) -> Result<()>>;

pub(crate) struct TransitionInner {
    pub(crate) core: CellCore,
    procedure: RefCell<Procedure>,
}

/// A named, watchable state-change procedure.
#[derive(Clone)]
pub struct StateTransition {
    pub(crate) inner: Rc<TransitionInner>,
}

impl_watchable!(StateTransition);

impl StateTransition {
    /// Transition with a no-op procedure.
    pub fn new(engine: &Engine, name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            inner: Rc::new(TransitionInner {
                core: CellCore::new(engine, name)?,
                procedure: RefCell::new(Rc::new(|_: Option<&Value>| -> Result<()> { Ok(()) })),
            }),
        })
    }

    /// Builder form of [`set_procedure`](Self::set_procedure).
    #[must_use]
    pub fn with_procedure(
        self,
        procedure: impl Fn(Option<&Value>) -> Result<()> + 'static,
    ) -> Self {
        self.set_procedure(procedure);
        self
    }

    /// Replace the procedure run by [`apply`](Self::apply).
    pub fn set_procedure(&self, procedure: impl Fn(Option<&Value>) -> Result<()> + 'static) {
        *self.inner.procedure.borrow_mut() = Rc::new(procedure);
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.inner.core.engine
    }

    /// Run the procedure with `input` and flush once it returns.
    ///
    /// # Errors
    ///
    /// - [`ImperaError::ReentrantUpdate`](crate::ImperaError::ReentrantUpdate)
    ///   if another pass is active, or if a watcher starts one during the flush.
    /// - Whatever the procedure returns; nothing is flushed in that case.
    /// - [`ImperaError::Storage`](crate::ImperaError::Storage) if a pending
    ///   variable cannot be persisted.
    pub fn apply(&self, input: Option<Value>) -> Result<()> {
        let core = &self.inner.core;
        let procedure = Rc::clone(&*self.inner.procedure.borrow());

        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("transition", name = %core.name).entered();

        let pass = core.engine.begin_transition(&core.name)?;
        let outcome = procedure(input.as_ref());
        pass.leave_procedure();
        if let Err(err) = outcome {
            tracing::debug!(transition = %core.name, error = %err, "transition failed");
            return Err(err);
        }
        pass.check()?;

        core.notify_all(input.as_ref());
        pass.check()?;

        let pending = pass.take_pending();
        tracing::debug!(transition = %core.name, flushed = pending.len(), "transition flush");
        for flush in pending {
            flush()?;
            pass.check()?;
        }
        pass.finish()
    }
}

impl fmt::Debug for StateTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTransition")
            .field("name", &self.inner.core.name)
            .field("watchers", &self.inner.core.watcher_count())
            .finish()
    }
}

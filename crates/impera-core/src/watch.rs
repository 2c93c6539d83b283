//! Watcher registry shared by every cell kind.
//!
//! A cell keeps an ordered table of `(ObserverId, Watcher)` pairs. Attaching
//! with an identity that is already present replaces its callback in place,
//! so registration order is the order of first attachment.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::engine::{CellId, Engine};
use crate::error::{ImperaError, Result};

/// Callback invoked on a cell's notification pass.
///
/// Variables pass their current value, transitions pass their input, and
/// messages pass their payload. `None` means "no payload".
pub type Watcher = Rc<dyn Fn(Option<&Value>)>;

static NEXT_OBSERVER: AtomicU64 = AtomicU64::new(1);

/// Identity of an observer (typically one UI component).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Allocate an identity never returned before in this process.
    #[must_use]
    pub fn fresh() -> Self {
        Self(NEXT_OBSERVER.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a caller-managed identity.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

/// Common surface of variables, transitions and message channels.
pub trait Watchable {
    /// The cell's name, also its storage key for variables.
    fn name(&self) -> &str;

    /// Register `watcher` for `observer`, replacing any previous one.
    fn attach(&self, observer: ObserverId, watcher: Watcher);

    /// Remove `observer`'s registration; no-op when absent.
    fn detach(&self, observer: ObserverId);

    /// Number of registered observers.
    fn watcher_count(&self) -> usize;

    /// Closure-taking convenience over [`attach`](Self::attach).
    fn watch(&self, observer: ObserverId, callback: impl Fn(Option<&Value>) + 'static)
    where
        Self: Sized,
    {
        self.attach(observer, Rc::new(callback));
    }
}

/// Name, identity, engine and watcher table of one cell.
pub(crate) struct CellCore {
    pub(crate) id: CellId,
    pub(crate) name: String,
    pub(crate) engine: Engine,
    watchers: RefCell<Vec<(ObserverId, Watcher)>>,
}

impl CellCore {
    pub(crate) fn new(engine: &Engine, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ImperaError::InvalidName);
        }
        Ok(Self {
            id: engine.next_cell_id(),
            name,
            engine: engine.clone(),
            watchers: RefCell::new(Vec::new()),
        })
    }

    pub(crate) fn attach(&self, observer: ObserverId, watcher: Watcher) {
        let mut watchers = self.watchers.borrow_mut();
        match watchers.iter_mut().find(|(id, _)| *id == observer) {
            Some(slot) => slot.1 = watcher,
            None => watchers.push((observer, watcher)),
        }
    }

    pub(crate) fn detach(&self, observer: ObserverId) {
        self.watchers.borrow_mut().retain(|(id, _)| *id != observer);
    }

    pub(crate) fn watcher_count(&self) -> usize {
        self.watchers.borrow().len()
    }

    /// Invoke every watcher in registration order.
    ///
    /// The table is snapshotted first so callbacks may attach or detach.
    /// Stops early once the engine has recorded a reentrancy violation.
    pub(crate) fn notify_all(&self, payload: Option<&Value>) {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("notify_all", cell = %self.name).entered();

        let snapshot: Vec<Watcher> = self
            .watchers
            .borrow()
            .iter()
            .map(|(_, watcher)| Rc::clone(watcher))
            .collect();
        for watcher in snapshot {
            watcher(payload);
            if self.engine.has_violation() {
                break;
            }
        }
    }
}

impl fmt::Debug for CellCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellCore")
            .field("name", &self.name)
            .field("watchers", &self.watcher_count())
            .finish()
    }
}

/// Implement [`Watchable`] for a handle type with an `inner.core` field.
macro_rules! impl_watchable {
    ($ty:ty) => {
        impl $crate::watch::Watchable for $ty {
            fn name(&self) -> &str {
                &self.inner.core.name
            }

            fn attach(&self, observer: $crate::watch::ObserverId, watcher: $crate::watch::Watcher) {
                self.inner.core.attach(observer, watcher);
            }

            fn detach(&self, observer: $crate::watch::ObserverId) {
                self.inner.core.detach(observer);
            }

            fn watcher_count(&self) -> usize {
                self.inner.core.watcher_count()
            }
        }
    };
}

pub(crate) use impl_watchable;

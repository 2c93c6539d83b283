//! Persisted, typed state variables.
//!
//! A [`StateVariable`] holds one value whose [`ValueKind`] is fixed by its
//! default. The store entry under the variable's name is the source of
//! truth across reloads: when present it wins over the default.
//!
//! # Write paths
//!
//! | Path | Outside a transition | Inside a transition |
//! |------|----------------------|---------------------|
//! | [`set`](StateVariable::set) | persist + notify now | mark pending |
//! | [`proxy`](StateVariable::proxy) writes | persist + notify now | mark pending |
//!
//! Once a transition is registered with
//! [`add_transition`](StateVariable::add_transition), direct writes outside a
//! transition fail with [`ImperaError::AssignmentForbidden`] for good.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | Wrong kind assigned | `TypeMismatch`, value and store untouched |
//! | Write during another pass | `ReentrantUpdate`, outer pass aborted |
//! | Store entry of the wrong kind | `Corrupted` at construction |
//! | Transition fails after in-place edits | edits stay in memory, nothing persisted |

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::engine::Engine;
use crate::error::{ImperaError, Result};
use crate::proxy::{MutationHook, MutationProxy, ProxyMode};
use crate::transition::StateTransition;
use crate::value::{self, Decoded, ValueKind};
use crate::watch::{CellCore, Watchable, impl_watchable};

pub(crate) struct VariableInner {
    pub(crate) core: CellCore,
    me: Weak<VariableInner>,
    kind: ValueKind,
    default: Value,
    value: RefCell<Value>,
    epoch: Cell<u64>,
    allow_direct: Cell<bool>,
    transitions: RefCell<Vec<StateTransition>>,
}

/// A named, persisted, watchable value.
///
/// Cloning yields another handle to the same variable.
#[derive(Clone)]
pub struct StateVariable {
    pub(crate) inner: Rc<VariableInner>,
}

impl_watchable!(StateVariable);

impl StateVariable {
    /// Create (or reload) the variable `name` with `default`.
    ///
    /// # Errors
    ///
    /// - [`ImperaError::InvalidName`] for an empty name.
    /// - [`ImperaError::UnsupportedType`] when `default` is `null`.
    /// - [`ImperaError::Corrupted`] when the stored entry has another kind.
    /// - [`ImperaError::Storage`] when the store cannot be read or written.
    pub fn new(engine: &Engine, name: impl Into<String>, default: impl Into<Value>) -> Result<Self> {
        let core = CellCore::new(engine, name)?;
        let default = default.into();
        let kind = ValueKind::of(&default).ok_or_else(|| ImperaError::UnsupportedType {
            name: core.name.clone(),
        })?;

        let initial = match engine.storage().load(&core.name)? {
            Some(text) => match value::decode(&text, kind) {
                Decoded::Value(stored) => stored,
                Decoded::Mismatch(found) => {
                    tracing::warn!(variable = %core.name, expected = %kind, "corrupted state entry");
                    return Err(ImperaError::Corrupted {
                        name: core.name,
                        expected: kind,
                        found,
                    });
                }
            },
            None => {
                engine.storage().store(&core.name, &value::encode(&default))?;
                default.clone()
            }
        };

        let inner = Rc::new_cyclic(|me| VariableInner {
            core,
            me: me.clone(),
            kind,
            default,
            value: RefCell::new(initial),
            epoch: Cell::new(0),
            allow_direct: Cell::new(true),
            transitions: RefCell::new(Vec::new()),
        });
        Ok(Self { inner })
    }

    #[must_use]
    pub fn kind(&self) -> ValueKind {
        self.inner.kind
    }

    #[must_use]
    pub fn default_value(&self) -> &Value {
        &self.inner.default
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.inner.core.engine
    }

    /// Whether [`set`](Self::set) is legal outside a transition.
    #[must_use]
    pub fn allows_direct_assignment(&self) -> bool {
        self.inner.allow_direct.get()
    }

    /// Snapshot of the current value.
    #[must_use]
    pub fn get(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    /// Current value converted to `T`.
    pub fn get_as<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.get();
        let found = ValueKind::of(&value);
        serde_json::from_value(value).map_err(|_| ImperaError::TypeMismatch {
            name: self.inner.core.name.clone(),
            expected: self.inner.kind,
            found,
        })
    }

    /// Replace the whole value.
    ///
    /// Outside a transition this persists and notifies before returning;
    /// inside one the flush is deferred to the end of the transition.
    ///
    /// # Errors
    ///
    /// - [`ImperaError::ReentrantUpdate`] during another notification pass.
    /// - [`ImperaError::AssignmentForbidden`] if the variable has transitions
    ///   and no transition is running.
    /// - [`ImperaError::TypeMismatch`] if `new` has a different kind.
    pub fn set(&self, new: impl Into<Value>) -> Result<()> {
        let new = new.into();
        self.inner.check_write()?;
        let found = ValueKind::of(&new);
        if found != Some(self.inner.kind) {
            return Err(ImperaError::TypeMismatch {
                name: self.inner.core.name.clone(),
                expected: self.inner.kind,
                found,
            });
        }
        *self.inner.value.borrow_mut() = new;
        self.inner.epoch.set(self.inner.epoch.get() + 1);
        self.inner.changed()
    }

    /// Serialize `new` and assign it with [`set`](Self::set).
    pub fn set_from<T: Serialize>(&self, new: &T) -> Result<()> {
        let value = serde_json::to_value(new).map_err(|_| ImperaError::TypeMismatch {
            name: self.inner.core.name.clone(),
            expected: self.inner.kind,
            found: None,
        })?;
        self.set(value)
    }

    /// Assign the default value.
    pub fn reset(&self) -> Result<()> {
        self.set(self.inner.default.clone())
    }

    /// Tracked handle for in-place edits of a structured value.
    ///
    /// The proxy stays valid until the value is replaced by
    /// [`set`](Self::set) or [`reset`](Self::reset).
    pub fn proxy(&self) -> Result<MutationProxy> {
        if self.inner.kind != ValueKind::Structured {
            return Err(ImperaError::NotStructured {
                name: self.inner.core.name.clone(),
            });
        }
        let hook: Rc<dyn MutationHook> = self.inner.clone();
        Ok(MutationProxy::new(hook))
    }

    /// Register a transition bound to this variable and lock direct writes.
    ///
    /// The procedure receives this variable as its receiver. Registering a
    /// name twice replaces the earlier procedure.
    pub fn add_transition(
        &self,
        name: impl Into<String>,
        procedure: impl Fn(&StateVariable, Option<&Value>) -> Result<()> + 'static,
    ) -> Result<StateTransition> {
        let name = name.into();
        let receiver = Rc::downgrade(&self.inner);
        let transition = StateTransition::new(&self.inner.core.engine, name.clone())?
            .with_procedure(move |input| match receiver.upgrade() {
                Some(inner) => procedure(&StateVariable { inner }, input),
                None => Ok(()),
            });

        let mut transitions = self.inner.transitions.borrow_mut();
        match transitions.iter_mut().find(|t| t.name() == name) {
            Some(slot) => *slot = transition.clone(),
            None => transitions.push(transition.clone()),
        }
        self.inner.allow_direct.set(false);
        tracing::debug!(variable = %self.inner.core.name, transition = %name, "transition registered");
        Ok(transition)
    }

    /// Run the transition registered under `name`.
    pub fn apply_transition(&self, name: &str, input: Option<Value>) -> Result<()> {
        let transition = self
            .transition(name)
            .ok_or_else(|| ImperaError::TransitionNotFound {
                name: name.to_owned(),
            })?;
        transition.apply(input)
    }

    /// Handle to the transition registered under `name`.
    #[must_use]
    pub fn transition(&self, name: &str) -> Option<StateTransition> {
        self.inner
            .transitions
            .borrow()
            .iter()
            .find(|t| t.name() == name)
            .cloned()
    }

    /// Every registered transition, in registration order.
    #[must_use]
    pub fn transitions(&self) -> Vec<StateTransition> {
        self.inner.transitions.borrow().clone()
    }

    #[must_use]
    pub fn transition_names(&self) -> Vec<String> {
        self.inner
            .transitions
            .borrow()
            .iter()
            .map(|t| t.name().to_owned())
            .collect()
    }
}

impl VariableInner {
    fn persist(&self) -> Result<()> {
        let text = value::encode(&self.value.borrow());
        self.core.engine.storage().store(&self.core.name, &text)?;
        Ok(())
    }

    /// Persist, then notify watchers with the current value.
    fn flush(&self) -> Result<()> {
        self.persist()?;
        let current = self.value.borrow().clone();
        tracing::debug!(variable = %self.core.name, "flush");
        self.core.notify_all(Some(&current));
        Ok(())
    }
}

impl MutationHook for VariableInner {
    fn owner(&self) -> &str {
        &self.core.name
    }

    fn epoch(&self) -> u64 {
        self.epoch.get()
    }

    fn value(&self) -> &RefCell<Value> {
        &self.value
    }

    fn mode(&self) -> ProxyMode {
        if self.core.engine.in_transition() {
            ProxyMode::Batched
        } else {
            ProxyMode::Immediate
        }
    }

    fn check_write(&self) -> Result<()> {
        let engine = &self.core.engine;
        if engine.in_transition() {
            return Ok(());
        }
        if engine.is_locked() {
            return Err(engine.reject_reentry(&self.core.name));
        }
        if !self.allow_direct.get() {
            return Err(ImperaError::AssignmentForbidden {
                name: self.core.name.clone(),
            });
        }
        Ok(())
    }

    fn changed(&self) -> Result<()> {
        let engine = &self.core.engine;
        match self.mode() {
            ProxyMode::Batched => {
                let me = self.me.clone();
                engine.mark_pending(
                    self.core.id,
                    Rc::new(move || match me.upgrade() {
                        Some(inner) => inner.flush(),
                        None => Ok(()),
                    }),
                );
                Ok(())
            }
            ProxyMode::Immediate => {
                let pass = engine.begin_pass(&self.core.name)?;
                self.flush()?;
                pass.finish()
            }
        }
    }
}

impl fmt::Debug for StateVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateVariable")
            .field("name", &self.inner.core.name)
            .field("kind", &self.inner.kind)
            .field("value", &*self.inner.value.borrow())
            .field("allow_direct", &self.inner.allow_direct.get())
            .finish()
    }
}

//! Explicit name → callback registration for a component.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

/// A component callback. Receives the new value, the transition input or the
/// message payload.
pub type Handler = Rc<dyn Fn(Option<&Value>)>;

/// Callbacks a component wants wired to the cells of a
/// [`BindingAdapter`](crate::BindingAdapter).
///
/// # Usage
///
/// ```
/// use impera_binding::HandlerTable;
///
/// let mut handlers = HandlerTable::new();
/// handlers
///     .on_update("count", |value| println!("count: {value:?}"))
///     .on_message("toast", |payload| println!("toast: {payload:?}"));
/// assert_eq!(handlers.len(), 2);
/// ```
///
/// Registering the same name twice in the same category keeps the last callback.
#[derive(Clone, Default)]
pub struct HandlerTable {
    pub(crate) updates: HashMap<String, Handler>,
    pub(crate) transitions: HashMap<String, Handler>,
    pub(crate) messages: HashMap<String, Handler>,
}

impl HandlerTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` whenever the variable `name` is flushed.
    pub fn on_update(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(Option<&Value>) + 'static,
    ) -> &mut Self {
        self.updates.insert(name.into(), Rc::new(f));
        self
    }

    /// Run `f` with the input whenever the transition `name` completes.
    pub fn on_transition(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(Option<&Value>) + 'static,
    ) -> &mut Self {
        self.transitions.insert(name.into(), Rc::new(f));
        self
    }

    /// Run `f` with the payload of every message sent on `name`.
    pub fn on_message(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(Option<&Value>) + 'static,
    ) -> &mut Self {
        self.messages.insert(name.into(), Rc::new(f));
        self
    }

    /// Total number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.updates.len() + self.transitions.len() + self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |map: &HashMap<String, Handler>| -> Vec<String> {
            let mut keys: Vec<String> = map.keys().cloned().collect();
            keys.sort();
            keys
        };
        f.debug_struct("HandlerTable")
            .field("updates", &names(&self.updates))
            .field("transitions", &names(&self.transitions))
            .field("messages", &names(&self.messages))
            .finish()
    }
}

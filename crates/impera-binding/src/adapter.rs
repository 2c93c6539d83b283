//! Name-keyed access to a component's cells and lifecycle wiring.
//!
//! A [`BindingAdapter`] is built once per component type from the list of
//! cells the component depends on. Each mounted instance connects with its
//! own [`ObserverId`] and disconnects when it unmounts.
//!
//! # Invariants
//!
//! 1. A transition and a message channel never share a name in one adapter.
//! 2. Transitions registered on a listed variable are dispatchable by name.
//! 3. `connect` validates every handler name before attaching anything.
//! 4. After `disconnect(observer)` no cell holds a watcher for `observer`.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use impera_core::{
    ImperaError, Message, ObserverId, StateTransition, StateVariable, Watchable, Watcher,
};
use serde_json::Value;

use crate::cell::Cell;
use crate::error::{BindingError, Result};
use crate::handlers::{Handler, HandlerTable};

/// Read access, dispatch and watcher wiring for one component type.
pub struct BindingAdapter {
    cells: Vec<Cell>,
    variables: HashMap<String, StateVariable>,
    transitions: HashMap<String, StateTransition>,
    messages: HashMap<String, Message>,
    listed_transitions: HashSet<String>,
}

impl BindingAdapter {
    /// Collect `cells` into name-keyed tables.
    ///
    /// # Errors
    ///
    /// [`BindingError::DuplicateName`] if a transition (listed or registered
    /// on a listed variable) and a message channel share a name.
    pub fn new(cells: impl IntoIterator<Item = Cell>) -> Result<Self> {
        let cells: Vec<Cell> = cells.into_iter().collect();
        let mut variables = HashMap::new();
        let mut transitions = HashMap::new();
        let mut messages = HashMap::new();
        let mut listed_transitions = HashSet::new();

        for cell in &cells {
            match cell {
                Cell::Variable(var) => {
                    for transition in var.transitions() {
                        transitions.insert(transition.name().to_owned(), transition);
                    }
                    variables.insert(var.name().to_owned(), var.clone());
                }
                Cell::Transition(transition) => {
                    listed_transitions.insert(transition.name().to_owned());
                    transitions.insert(transition.name().to_owned(), transition.clone());
                }
                Cell::Message(channel) => {
                    messages.insert(channel.name().to_owned(), channel.clone());
                }
            }
        }

        if let Some(name) = transitions
            .keys()
            .filter(|name| messages.contains_key(*name))
            .min()
        {
            return Err(BindingError::DuplicateName { name: name.clone() });
        }

        Ok(Self {
            cells,
            variables,
            transitions,
            messages,
            listed_transitions,
        })
    }

    /// Snapshot of the variable `name`.
    pub fn value(&self, name: &str) -> Result<Value> {
        self.variables
            .get(name)
            .map(StateVariable::get)
            .ok_or_else(|| BindingError::VariableNotFound {
                name: name.to_owned(),
            })
    }

    /// Names of the bound variables, in listing order.
    #[must_use]
    pub fn variable_names(&self) -> Vec<&str> {
        self.cells
            .iter()
            .filter_map(|cell| match cell {
                Cell::Variable(var) => Some(var.name()),
                _ => None,
            })
            .collect()
    }

    /// Names of every dispatchable transition, sorted.
    #[must_use]
    pub fn transition_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transitions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run the transition `name` with `input`.
    pub fn apply_transition(&self, name: &str, input: Option<Value>) -> Result<()> {
        let transition =
            self.transitions
                .get(name)
                .ok_or_else(|| ImperaError::TransitionNotFound {
                    name: name.to_owned(),
                })?;
        transition.apply(input)?;
        Ok(())
    }

    /// Send `payload` on the channel `name`.
    pub fn send_message(&self, name: &str, payload: Option<Value>) -> Result<()> {
        let channel = self
            .messages
            .get(name)
            .ok_or_else(|| ImperaError::MessageNotFound {
                name: name.to_owned(),
            })?;
        channel.send(payload);
        Ok(())
    }

    /// Attach `handlers` for `observer`.
    ///
    /// Every variable handler is then invoked once with the current value so
    /// the component can render its initial state. Transition and message
    /// handlers only run on later events.
    ///
    /// # Errors
    ///
    /// A handler naming a cell this adapter does not know. Nothing is
    /// attached in that case.
    pub fn connect(&self, observer: ObserverId, handlers: &HandlerTable) -> Result<()> {
        self.validate(handlers)?;

        let mut initial = Vec::new();
        for cell in &self.cells {
            if let Cell::Variable(var) = cell {
                if let Some(handler) = handlers.updates.get(var.name()) {
                    var.attach(observer, Rc::clone(handler));
                    initial.push((var, handler));
                }
            }
        }
        for (name, transition) in &self.transitions {
            if let Some(handler) = handlers.transitions.get(name) {
                transition.attach(observer, Rc::clone(handler));
            }
        }
        self.attach_messages(observer, handlers);
        tracing::debug!(%observer, handlers = handlers.len(), "component connected");

        for (var, handler) in initial {
            handler(Some(&var.get()));
        }
        Ok(())
    }

    /// Attach a render-request watcher to every listed variable and transition.
    ///
    /// Each watcher runs the matching handler from `handlers` (if any), then
    /// `render`. Transitions that are only registered on a listed variable
    /// get their handler without `render`, since the variable's own flush
    /// already requests one. Message handlers attach as in
    /// [`connect`](Self::connect). Nothing runs at connect time.
    pub fn connect_with_render(
        &self,
        observer: ObserverId,
        handlers: &HandlerTable,
        render: impl Fn() + 'static,
    ) -> Result<()> {
        self.validate(handlers)?;
        let render: Rc<dyn Fn()> = Rc::new(render);

        for cell in &self.cells {
            if let Cell::Variable(var) = cell {
                let hook = handlers.updates.get(var.name()).cloned();
                var.attach(observer, render_watcher(hook, &render));
            }
        }
        for (name, transition) in &self.transitions {
            let hook = handlers.transitions.get(name).cloned();
            if self.listed_transitions.contains(name) {
                transition.attach(observer, render_watcher(hook, &render));
            } else if let Some(hook) = hook {
                transition.attach(observer, hook);
            }
        }
        self.attach_messages(observer, handlers);
        tracing::debug!(%observer, "component connected with render hook");
        Ok(())
    }

    /// Detach `observer` from every cell of this adapter.
    pub fn disconnect(&self, observer: ObserverId) {
        for cell in &self.cells {
            cell.as_watchable().detach(observer);
        }
        for transition in self.transitions.values() {
            transition.detach(observer);
        }
        tracing::debug!(%observer, "component disconnected");
    }

    fn attach_messages(&self, observer: ObserverId, handlers: &HandlerTable) {
        for (name, channel) in &self.messages {
            if let Some(handler) = handlers.messages.get(name) {
                channel.attach(observer, Rc::clone(handler));
            }
        }
    }

    fn validate(&self, handlers: &HandlerTable) -> Result<()> {
        if let Some(name) = first_unknown(&handlers.updates, |n| self.variables.contains_key(n)) {
            return Err(BindingError::VariableNotFound { name });
        }
        if let Some(name) = first_unknown(&handlers.transitions, |n| {
            self.transitions.contains_key(n)
        }) {
            return Err(ImperaError::TransitionNotFound { name }.into());
        }
        if let Some(name) = first_unknown(&handlers.messages, |n| self.messages.contains_key(n)) {
            return Err(ImperaError::MessageNotFound { name }.into());
        }
        Ok(())
    }
}

fn first_unknown(
    table: &HashMap<String, Handler>,
    known: impl Fn(&str) -> bool,
) -> Option<String> {
    table.keys().filter(|name| !known(name.as_str())).min().cloned()
}

fn render_watcher(hook: Option<Handler>, render: &Rc<dyn Fn()>) -> Watcher {
    let render = Rc::clone(render);
    Rc::new(move |payload: Option<&Value>| {
        if let Some(hook) = &hook {
            hook(payload);
        }
        render();
    })
}

impl std::fmt::Debug for BindingAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingAdapter")
            .field("variables", &self.variable_names())
            .field("transitions", &self.transition_names())
            .field("messages", &self.messages.len())
            .finish()
    }
}

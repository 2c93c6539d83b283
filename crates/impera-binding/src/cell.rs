//! The cells a component can be bound to.

use impera_core::{Message, StateTransition, StateVariable, Watchable};

/// One state cell handed to a [`BindingAdapter`](crate::BindingAdapter).
#[derive(Clone, Debug)]
pub enum Cell {
    Variable(StateVariable),
    Transition(StateTransition),
    Message(Message),
}

impl Cell {
    #[must_use]
    pub fn name(&self) -> &str {
        self.as_watchable().name()
    }

    /// The cell as a watch target.
    #[must_use]
    pub fn as_watchable(&self) -> &dyn Watchable {
        match self {
            Self::Variable(var) => var,
            Self::Transition(transition) => transition,
            Self::Message(channel) => channel,
        }
    }
}

impl From<StateVariable> for Cell {
    fn from(var: StateVariable) -> Self {
        Self::Variable(var)
    }
}

impl From<&StateVariable> for Cell {
    fn from(var: &StateVariable) -> Self {
        Self::Variable(var.clone())
    }
}

impl From<StateTransition> for Cell {
    fn from(transition: StateTransition) -> Self {
        Self::Transition(transition)
    }
}

impl From<&StateTransition> for Cell {
    fn from(transition: &StateTransition) -> Self {
        Self::Transition(transition.clone())
    }
}

impl From<Message> for Cell {
    fn from(channel: Message) -> Self {
        Self::Message(channel)
    }
}

impl From<&Message> for Cell {
    fn from(channel: &Message) -> Self {
        Self::Message(channel.clone())
    }
}

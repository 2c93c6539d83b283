//! Binding-layer errors.

use std::fmt;

use impera_core::ImperaError;

/// Errors raised by [`BindingAdapter`](crate::BindingAdapter).
#[derive(Debug, Clone, PartialEq)]
pub enum BindingError {
    /// A cell operation failed.
    Core(ImperaError),
    /// No state variable under this name is bound to the adapter.
    VariableNotFound { name: String },
    /// A transition and a message channel share a name.
    DuplicateName { name: String },
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core(err) => write!(f, "{err}"),
            Self::VariableNotFound { name } => write!(f, "state variable {name} not found"),
            Self::DuplicateName { name } => write!(
                f,
                "name {name} is used by both a transition and a message channel"
            ),
        }
    }
}

impl std::error::Error for BindingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Core(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ImperaError> for BindingError {
    fn from(err: ImperaError) -> Self {
        Self::Core(err)
    }
}

/// Result alias for the binding layer.
pub type Result<T, E = BindingError> = std::result::Result<T, E>;

//! Error types for the state engine.
//!
//! Every failure is fatal for the operation that raised it and propagates to
//! the original caller. The engine guarantees one thing on every error path:
//! the reentrancy flag and the scratch set are reset before the error leaves
//! the crate, so a caught error never leaves an engine permanently locked.
//!
//! # Failure Modes
//!
//! | Failure | Raised by | Effect |
//! |---------|-----------|--------|
//! | Empty name | constructors | object not created |
//! | Unsupported default | `StateVariable::new` | object not created |
//! | Corrupted store entry | `StateVariable::new` | object not created |
//! | Wrong-kind assignment | `set`, proxy writes | value and store untouched |
//! | Direct write to locked variable | `set`, proxy writes | value and store untouched |
//! | Nested notification pass | any flush or transition | outer pass aborted |
//! | Unknown transition | `apply_transition` | no effect |

use std::fmt;

use crate::value::ValueKind;

/// Failure reported by a [`StorageBackend`](crate::storage::StorageBackend).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Underlying I/O failed.
    Io(String),
    /// The backing document could not be parsed.
    Malformed(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "storage i/o error: {msg}"),
            Self::Malformed(msg) => write!(f, "malformed storage document: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Failure while loading an [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration file could not be read.
    Read(String),
    /// The configuration text could not be parsed.
    Parse(String),
    /// The file extension does not name a supported format.
    UnsupportedFormat(String),
    /// The configuration needs a cargo feature that is not enabled.
    FeatureDisabled(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read(msg) => write!(f, "cannot read config: {msg}"),
            Self::Parse(msg) => write!(f, "cannot parse config: {msg}"),
            Self::UnsupportedFormat(ext) => write!(f, "unsupported config format: {ext}"),
            Self::FeatureDisabled(feature) => {
                write!(f, "configuration requires the `{feature}` feature")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors raised by cells and the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ImperaError {
    /// A cell name was empty.
    InvalidName,
    /// A default value has no supported kind (only `null` can reach this).
    UnsupportedType { name: String },
    /// An assignment had a different kind than the variable's fixed kind.
    TypeMismatch {
        name: String,
        expected: ValueKind,
        found: Option<ValueKind>,
    },
    /// A persisted value does not decode to the declared kind.
    Corrupted {
        name: String,
        expected: ValueKind,
        found: Option<ValueKind>,
    },
    /// Direct assignment to a variable that only accepts transition writes.
    AssignmentForbidden { name: String },
    /// A notification pass was started while another was running.
    ReentrantUpdate { cell: String },
    /// No transition registered under this name.
    TransitionNotFound { name: String },
    /// No message channel registered under this name.
    MessageNotFound { name: String },
    /// Proxy requested on a non-structured variable.
    NotStructured { name: String },
    /// A proxy path did not resolve, or addressed the variable root.
    InvalidPath { name: String, path: String },
    /// The proxy was created for a value that has since been replaced.
    StaleProxy { name: String },
    /// A transition procedure gave up.
    Aborted(String),
    /// The storage collaborator failed.
    Storage(StorageError),
    /// The engine configuration could not be loaded.
    Config(ConfigError),
}

impl ImperaError {
    /// Convenience constructor for failing a transition procedure.
    pub fn aborted(msg: impl Into<String>) -> Self {
        Self::Aborted(msg.into())
    }
}

fn kind_label(kind: &Option<ValueKind>) -> &'static str {
    match kind {
        Some(kind) => kind.as_str(),
        None => "null",
    }
}

impl fmt::Display for ImperaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName => write!(f, "cell name must be a non-empty string"),
            Self::UnsupportedType { name } => {
                write!(f, "wrong type assignment to state variable: {name}")
            }
            Self::TypeMismatch {
                name,
                expected,
                found,
            } => write!(
                f,
                "wrong type assignment to state variable: {name} (expected {}, found {})",
                expected.as_str(),
                kind_label(found)
            ),
            Self::Corrupted {
                name,
                expected,
                found,
            } => write!(
                f,
                "state variable {name} is corrupted: stored {} but expecting {}",
                kind_label(found),
                expected.as_str()
            ),
            Self::AssignmentForbidden { name } => write!(
                f,
                "state variable {name} is not allowed assignment outside a state transition"
            ),
            Self::ReentrantUpdate { cell } => write!(
                f,
                "forbidden multiple-update during an update callback loop (cell {cell})"
            ),
            Self::TransitionNotFound { name } => write!(f, "transition {name} not found"),
            Self::MessageNotFound { name } => write!(f, "message channel {name} not found"),
            Self::NotStructured { name } => {
                write!(f, "state variable {name} does not hold a structured value")
            }
            Self::InvalidPath { name, path } => {
                write!(f, "invalid path '{path}' into state variable {name}")
            }
            Self::StaleProxy { name } => write!(
                f,
                "proxy for state variable {name} refers to a value that was replaced"
            ),
            Self::Aborted(msg) => write!(f, "transition aborted: {msg}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ImperaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for ImperaError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<ConfigError> for ImperaError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = ImperaError> = std::result::Result<T, E>;

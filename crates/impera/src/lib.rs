#![forbid(unsafe_code)]

//! Impera public facade and prelude.
//!
//! Re-exports the state engine from `impera-core` and the component binding
//! layer from `impera-binding`. Most applications only need the prelude:
//!
//! ```
//! use impera::prelude::*;
//! use serde_json::json;
//!
//! let engine = Engine::in_memory();
//! let todo = StateVariable::new(&engine, "todo", json!([]))?;
//! todo.add_transition("add", |var, item| {
//!     var.proxy()?.push("", item.cloned().unwrap_or_default())?;
//!     Ok(())
//! })?;
//!
//! let list = BindingAdapter::new([Cell::from(&todo)])?;
//! list.apply_transition("add", Some(json!("milk")))?;
//! assert_eq!(list.value("todo")?, json!(["milk"]));
//! # Ok::<(), impera::BindingError>(())
//! ```

#[cfg(feature = "tracing-json")]
pub mod logging;

pub use impera_binding::{BindingAdapter, BindingError, Cell, Handler, HandlerTable};
pub use impera_core::{
    ConfigError, Engine, EngineConfig, ImperaError, MemoryStorage, Message, MutationHook,
    MutationProxy, ObserverId, PrefixedStorage, ProxyMode, StateTransition, StateVariable,
    StorageBackend, StorageConfig, StorageError, ValueKind, Watchable, Watcher,
};
#[cfg(feature = "state-persistence")]
pub use impera_core::FileStorage;

/// The binding layer crate.
pub use impera_binding as binding;
/// The state engine crate.
pub use impera_core as engine;

pub mod prelude {
    //! Everything a component or store module usually imports.

    pub use crate::{
        BindingAdapter, Cell, Engine, EngineConfig, HandlerTable, ImperaError, Message,
        MutationProxy, ObserverId, StateTransition, StateVariable, Watchable,
    };
}

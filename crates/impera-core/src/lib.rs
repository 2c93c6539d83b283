#![forbid(unsafe_code)]

//! Consistent, persisted UI state cells.
//!
//! `impera-core` lets independent UI components observe and mutate a small
//! set of named state cells without holding references to each other, while
//! guaranteeing that every refresh they trigger sees a consistent final state.
//!
//! - [`StateVariable`]: a typed, persisted value with change notification.
//!   Structured values are edited in place through a [`MutationProxy`].
//! - [`StateTransition`]: a named procedure whose writes to any number of
//!   variables are flushed together, once, after it returns.
//! - [`Message`]: an ephemeral pub/sub channel outside the consistency rules.
//! - [`Engine`]: owns the lock flag and the transition scratch set that the
//!   cells created against it share.
//!
//! # Example
//!
//! ```
//! use impera_core::{Engine, MemoryStorage, ObserverId, StateTransition, StateVariable, Watchable};
//! use serde_json::json;
//!
//! let storage = MemoryStorage::new();
//! let engine = Engine::new(storage.clone());
//!
//! let count = StateVariable::new(&engine, "count", 7)?;
//! assert_eq!(storage.get_raw("count").as_deref(), Some("7"));
//!
//! count.watch(ObserverId::fresh(), |value| println!("count is now {value:?}"));
//! count.set(9)?;
//! assert_eq!(storage.get_raw("count").as_deref(), Some("9"));
//!
//! let label = StateVariable::new(&engine, "label", "")?;
//! let (c, l) = (count.clone(), label.clone());
//! let both = StateTransition::new(&engine, "both")?.with_procedure(move |_| {
//!     c.set(1)?;
//!     c.set(2)?;
//!     l.set("two")
//! });
//! both.apply(None)?;
//! assert_eq!(count.get(), json!(2));
//! # Ok::<(), impera_core::ImperaError>(())
//! ```
//!
//! # Concurrency
//!
//! Everything is single-threaded and synchronous (`Rc`-based, `!Send`).
//! "Concurrency" here means reentrancy: a watcher that starts another
//! notification pass while one is running gets
//! [`ImperaError::ReentrantUpdate`], and so does the original caller.

pub mod config;
pub mod engine;
pub mod error;
pub mod message;
pub mod proxy;
pub mod storage;
pub mod transition;
pub mod value;
pub mod variable;
pub mod watch;

pub use config::{EngineConfig, StorageConfig};
pub use engine::Engine;
pub use error::{ConfigError, ImperaError, Result, StorageError};
pub use message::Message;
pub use proxy::{MutationHook, MutationProxy, ProxyMode};
#[cfg(feature = "state-persistence")]
pub use storage::FileStorage;
pub use storage::{MemoryStorage, PrefixedStorage, StorageBackend};
pub use transition::StateTransition;
pub use value::ValueKind;
pub use variable::StateVariable;
pub use watch::{ObserverId, Watchable, Watcher};

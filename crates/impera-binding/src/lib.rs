#![forbid(unsafe_code)]

//! Connect UI components to impera state cells by explicit composition.
//!
//! A component lists the cells it depends on, registers its callbacks in a
//! [`HandlerTable`], and connects through a [`BindingAdapter`] with its own
//! [`ObserverId`](impera_core::ObserverId).
//!
//! ```
//! use impera_binding::{BindingAdapter, Cell, HandlerTable};
//! use impera_core::{Engine, ObserverId, StateVariable};
//! use serde_json::json;
//!
//! let engine = Engine::in_memory();
//! let count = StateVariable::new(&engine, "count", 0)?;
//! count.add_transition("increment", |var, _| {
//!     let next = var.get_as::<i64>()? + 1;
//!     var.set(next)
//! })?;
//!
//! let adapter = BindingAdapter::new([Cell::from(&count)])?;
//! let mut handlers = HandlerTable::new();
//! handlers.on_update("count", |value| println!("render {value:?}"));
//! let me = ObserverId::fresh();
//! adapter.connect(me, &handlers)?;
//!
//! adapter.apply_transition("increment", None)?;
//! assert_eq!(adapter.value("count")?, json!(1));
//! adapter.disconnect(me);
//! # Ok::<(), impera_binding::BindingError>(())
//! ```

pub mod adapter;
pub mod cell;
pub mod error;
pub mod handlers;

pub use adapter::BindingAdapter;
pub use cell::Cell;
pub use error::{BindingError, Result};
pub use handlers::{Handler, HandlerTable};

//! Ephemeral pub/sub channels.
//!
//! A [`Message`] carries payloads between observers without touching the
//! store or the lock: it has no durable state that an interleaved update
//! could corrupt. Sending from a watcher or from inside a transition
//! procedure is legal.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::engine::Engine;
use crate::error::Result;
use crate::watch::{CellCore, impl_watchable};

pub(crate) struct MessageInner {
    pub(crate) core: CellCore,
}

/// A named message channel.
#[derive(Clone)]
pub struct Message {
    pub(crate) inner: Rc<MessageInner>,
}

impl_watchable!(Message);

impl Message {
    pub fn new(engine: &Engine, name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            inner: Rc::new(MessageInner {
                core: CellCore::new(engine, name)?,
            }),
        })
    }

    /// Deliver `payload` to every watcher. The payload is not retained.
    pub fn send(&self, payload: Option<Value>) {
        tracing::trace!(channel = %self.inner.core.name, "send");
        self.inner.core.notify_all(payload.as_ref());
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("name", &self.inner.core.name)
            .field("watchers", &self.inner.core.watcher_count())
            .finish()
    }
}

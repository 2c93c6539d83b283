//! Mutation tracking for structured values.
//!
//! A [`MutationProxy`] is a handle onto a structured value (object or array)
//! owned by someone else. Every write goes through an explicit method, is
//! applied to the live value, and only then reports to the owner's
//! [`MutationHook`]. Reads never report.
//!
//! Paths are JSON Pointers (RFC 6901) relative to the proxy's base, so
//! `"/poz/1"` addresses the second element of the `poz` array and `""` the
//! base itself. Nested proxies from [`MutationProxy::at`] share the owner's
//! hook, which makes nested writes visible to the owner.
//!
//! # Invariants
//!
//! 1. One write method call fires the hook at most once, after the write.
//! 2. A write that leaves the value unchanged does not fire the hook.
//! 3. Writes that would replace the owner's root value are rejected; the
//!    owner replaces whole values itself.
//! 4. A proxy whose epoch differs from the owner's current epoch is stale:
//!    every operation on it fails.
//!
//! # Narrowing
//!
//! Only mutation through these methods is tracked. A clone obtained from
//! [`get`](MutationProxy::get) or [`snapshot`](MutationProxy::snapshot) is a
//! detached copy; writing to it changes nothing.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::error::{ImperaError, Result};
use crate::value::ValueKind;

/// How the owner handles a reported write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProxyMode {
    /// Persist and notify before the write method returns.
    Immediate,
    /// Defer into the engine's scratch set until the transition ends.
    Batched,
}

/// Owner side of a [`MutationProxy`].
pub trait MutationHook {
    /// Owner name used in error messages.
    fn owner(&self) -> &str;

    /// Current generation of the owner's value.
    fn epoch(&self) -> u64;

    /// The live value.
    fn value(&self) -> &RefCell<Value>;

    /// How the next reported write will be handled.
    fn mode(&self) -> ProxyMode;

    /// Veto a write before it is applied.
    fn check_write(&self) -> Result<()>;

    /// Report an applied write.
    fn changed(&self) -> Result<()>;
}

/// Tracked handle onto a structured value.
#[derive(Clone)]
pub struct MutationProxy {
    hook: Rc<dyn MutationHook>,
    base: String,
    epoch: u64,
}

impl MutationProxy {
    /// Proxy onto the root of `hook`'s current value.
    #[must_use]
    pub fn new(hook: Rc<dyn MutationHook>) -> Self {
        let epoch = hook.epoch();
        Self {
            hook,
            base: String::new(),
            epoch,
        }
    }

    /// Proxy over a standalone value that calls `on_change` after each write.
    pub fn detached(value: Value, on_change: impl Fn() -> Result<()> + 'static) -> Result<Self> {
        if ValueKind::of(&value) != Some(ValueKind::Structured) {
            return Err(ImperaError::NotStructured {
                name: DETACHED_OWNER.to_owned(),
            });
        }
        Ok(Self::new(Rc::new(DetachedHook {
            value: RefCell::new(value),
            on_change: Box::new(on_change),
        })))
    }

    /// JSON Pointer of this proxy's base within the owner's value.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.base
    }

    #[must_use]
    pub fn mode(&self) -> ProxyMode {
        self.hook.mode()
    }

    /// Whether the owner's value was replaced since this proxy was created.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.hook.epoch() != self.epoch
    }

    /// Nested proxy rooted at `path`.
    pub fn at(&self, path: &str) -> Result<Self> {
        self.ensure_live()?;
        Ok(Self {
            hook: Rc::clone(&self.hook),
            base: self.join(path)?,
            epoch: self.epoch,
        })
    }

    /// Clone of the value at `path`, if present.
    pub fn get(&self, path: &str) -> Result<Option<Value>> {
        self.ensure_live()?;
        let full = self.join(path)?;
        Ok(self.hook.value().borrow().pointer(&full).cloned())
    }

    /// Clone of the value at this proxy's base.
    pub fn snapshot(&self) -> Result<Value> {
        self.get("")?.ok_or_else(|| self.invalid(&self.base))
    }

    /// Number of entries of the array or object at `path`.
    pub fn len(&self, path: &str) -> Result<usize> {
        self.ensure_live()?;
        let full = self.join(path)?;
        match self.hook.value().borrow().pointer(&full) {
            Some(Value::Array(items)) => Ok(items.len()),
            Some(Value::Object(map)) => Ok(map.len()),
            _ => Err(self.invalid(&full)),
        }
    }

    /// Set the property or element at `path`.
    ///
    /// Missing object keys are created; an array index equal to the length
    /// (or `-`) appends.
    pub fn set(&self, path: &str, new: Value) -> Result<()> {
        self.write(path, |root, full| {
            let (parent, token) = split_last(full).ok_or_else(|| self.invalid(full))?;
            match root.pointer_mut(parent) {
                Some(Value::Object(map)) => {
                    if map.get(&token) == Some(&new) {
                        return Ok(((), false));
                    }
                    map.insert(token, new);
                    Ok(((), true))
                }
                Some(Value::Array(items)) => {
                    let index = array_index(&token, items.len()).ok_or_else(|| self.invalid(full))?;
                    if index == items.len() {
                        items.push(new);
                        Ok(((), true))
                    } else if items[index] == new {
                        Ok(((), false))
                    } else {
                        items[index] = new;
                        Ok(((), true))
                    }
                }
                _ => Err(self.invalid(full)),
            }
        })
    }

    /// Remove the property or element at `path`, returning it.
    pub fn remove(&self, path: &str) -> Result<Option<Value>> {
        self.write(path, |root, full| {
            let (parent, token) = split_last(full).ok_or_else(|| self.invalid(full))?;
            match root.pointer_mut(parent) {
                Some(Value::Object(map)) => {
                    let removed = map.shift_remove(&token);
                    let changed = removed.is_some();
                    Ok((removed, changed))
                }
                Some(Value::Array(items)) => match token.parse::<usize>() {
                    Ok(index) if index < items.len() => Ok((Some(items.remove(index)), true)),
                    _ => Ok((None, false)),
                },
                _ => Err(self.invalid(full)),
            }
        })
    }

    /// Append to the array at `path`, returning the new length.
    pub fn push(&self, path: &str, item: Value) -> Result<usize> {
        self.write(path, |root, full| match root.pointer_mut(full) {
            Some(Value::Array(items)) => {
                items.push(item);
                Ok((items.len(), true))
            }
            _ => Err(self.invalid(full)),
        })
    }

    /// Remove the last element of the array at `path`.
    pub fn pop(&self, path: &str) -> Result<Option<Value>> {
        self.write(path, |root, full| match root.pointer_mut(full) {
            Some(Value::Array(items)) => {
                let popped = items.pop();
                let changed = popped.is_some();
                Ok((popped, changed))
            }
            _ => Err(self.invalid(full)),
        })
    }

    /// Edit the value at this proxy's base in place.
    ///
    /// The closure works on a copy with no borrow of the live value held, so
    /// it may read the owner. The hook fires once if the copy differs from
    /// the live value afterwards. Returns whether anything changed. At the
    /// owner's root the value must stay structured.
    pub fn update(&self, edit: impl FnOnce(&mut Value)) -> Result<bool> {
        self.ensure_live()?;
        self.hook.check_write()?;
        let mut draft = self.snapshot()?;
        edit(&mut draft);
        if self.base.is_empty() {
            let found = ValueKind::of(&draft);
            if found != Some(ValueKind::Structured) {
                return Err(ImperaError::TypeMismatch {
                    name: self.hook.owner().to_owned(),
                    expected: ValueKind::Structured,
                    found,
                });
            }
        }
        // The closure may have replaced the owner's value.
        self.ensure_live()?;
        let changed = {
            let mut root = self.hook.value().borrow_mut();
            let target = root
                .pointer_mut(&self.base)
                .ok_or_else(|| self.invalid(&self.base))?;
            if *target == draft {
                false
            } else {
                *target = draft;
                true
            }
        };
        if changed {
            self.hook.changed()?;
        }
        Ok(changed)
    }

    fn write<R>(
        &self,
        path: &str,
        op: impl FnOnce(&mut Value, &str) -> Result<(R, bool)>,
    ) -> Result<R> {
        self.ensure_live()?;
        let full = self.join(path)?;
        self.hook.check_write()?;
        let (out, changed) = {
            let mut root = self.hook.value().borrow_mut();
            op(&mut root, &full)?
        };
        if changed {
            self.hook.changed()?;
        }
        Ok(out)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_stale() {
            return Err(ImperaError::StaleProxy {
                name: self.hook.owner().to_owned(),
            });
        }
        Ok(())
    }

    fn join(&self, path: &str) -> Result<String> {
        if path.is_empty() {
            Ok(self.base.clone())
        } else if path.starts_with('/') {
            Ok(format!("{}{path}", self.base))
        } else {
            Err(self.invalid(path))
        }
    }

    fn invalid(&self, path: &str) -> ImperaError {
        ImperaError::InvalidPath {
            name: self.hook.owner().to_owned(),
            path: path.to_owned(),
        }
    }
}

impl fmt::Debug for MutationProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationProxy")
            .field("owner", &self.hook.owner())
            .field("path", &self.base)
            .field("stale", &self.is_stale())
            .finish()
    }
}

/// Split a non-root pointer into its parent pointer and unescaped last token.
fn split_last(pointer: &str) -> Option<(&str, String)> {
    let slash = pointer.rfind('/')?;
    let token = pointer[slash + 1..].replace("~1", "/").replace("~0", "~");
    Some((&pointer[..slash], token))
}

fn array_index(token: &str, len: usize) -> Option<usize> {
    if token == "-" {
        return Some(len);
    }
    if token.len() > 1 && token.starts_with('0') {
        return None;
    }
    token.parse::<usize>().ok().filter(|index| *index <= len)
}

const DETACHED_OWNER: &str = "<detached>";

struct DetachedHook {
    value: RefCell<Value>,
    on_change: Box<dyn Fn() -> Result<()>>,
}

impl MutationHook for DetachedHook {
    fn owner(&self) -> &str {
        DETACHED_OWNER
    }

    fn epoch(&self) -> u64 {
        0
    }

    fn value(&self) -> &RefCell<Value> {
        &self.value
    }

    fn mode(&self) -> ProxyMode {
        ProxyMode::Immediate
    }

    fn check_write(&self) -> Result<()> {
        Ok(())
    }

    fn changed(&self) -> Result<()> {
        (self.on_change)()
    }
}

//! Execution context carried by every [`crate::pipeline::Message`].
//!
//! A [`Context`] bundles three things that must flow forward from stage to
//! stage without widening the payload type:
//!
//! * a **deadline** (the earliest of every `with_timeout` applied so far),
//! * a set of **cancellation signals** inherited from ancestors, so that
//!   cancelling an outer context reaches every subprocess started under a
//!   derived one,
//! * a **typed side-channel store** keyed by [`Key<V>`]. The same key name
//!   with two different value types addresses two different slots, so a
//!   lookup can never observe a value of the wrong type.
//!
//! Contexts are cheap to clone. Deriving a child never affects the parent.

use crate::error::ContextError;
use futures::future::{self, Either};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, Instant};

/// Typed identifier for a side-channel value.
///
/// Declare keys as constants next to the stage that writes them:
///
/// ```rust
/// use docflow::pipeline::Key;
/// use std::path::PathBuf;
///
/// const THUMBNAIL_PATH: Key<PathBuf> = Key::new("ThumbnailPath");
/// ```
pub struct Key<V> {
    name: &'static str,
    _value: PhantomData<fn() -> V>,
}

impl<V> Key<V> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<V> Clone for Key<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Key<V> {}

impl<V> fmt::Debug for Key<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("name", &self.name)
            .field("type", &std::any::type_name::<V>())
            .finish()
    }
}

type Slot = (&'static str, TypeId);

/// Execution context: deadline, cancellation and side-channel values.
#[derive(Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Vec<watch::Receiver<bool>>,
    values: HashMap<Slot, Arc<dyn Any + Send + Sync>>,
}

/// Cancels the context it was created with, and every context derived
/// from it.
///
/// Dropping the handle does **not** cancel.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Context {
    /// A context that is never cancelled, has no deadline and holds no
    /// values.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a child whose deadline is at most `timeout` from now.
    ///
    /// An earlier deadline inherited from the parent is kept. A timeout too
    /// large to represent as an instant adds no deadline of its own.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.clone(),
        }
    }

    /// Derive a child whose deadline is the earlier of `deadline` and the
    /// parent's deadline.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut child = self.clone();
        child.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        child
    }

    /// Derive a child that can be cancelled independently of the parent.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let mut child = self.clone();
        child.cancel.push(rx);
        (child, CancelHandle { tx: Arc::new(tx) })
    }

    /// Store `value` under `key`, returning the extended context.
    ///
    /// Writing the same key again shadows the earlier value; there is no way
    /// to remove a value.
    pub fn with_value<V>(mut self, key: Key<V>, value: V) -> Self
    where
        V: Any + Send + Sync,
    {
        self.values
            .insert((key.name, TypeId::of::<V>()), Arc::new(value));
        self
    }

    /// Look up the value stored under `key`.
    ///
    /// `None` is an ordinary outcome: the value was never written.
    pub fn value<V>(&self, key: Key<V>) -> Option<&V>
    where
        V: Any + Send + Sync,
    {
        self.values
            .get(&(key.name, TypeId::of::<V>()))
            .and_then(|v| v.downcast_ref::<V>())
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.iter().any(|rx| *rx.borrow())
    }

    /// Why this context has ended, or `None` while it is still live.
    ///
    /// Cancellation wins over an expired deadline.
    pub fn err(&self) -> Option<ContextError> {
        if self.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolve once the context is cancelled or its deadline passes.
    ///
    /// Never resolves for a background context.
    pub async fn done(&self) -> ContextError {
        if let Some(err) = self.err() {
            return err;
        }

        let cancelled = self.cancelled();
        let expired = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => future::pending::<()>().await,
            }
        };

        futures::pin_mut!(cancelled, expired);
        match future::select(cancelled, expired).await {
            Either::Left(_) => ContextError::Cancelled,
            Either::Right(_) => ContextError::DeadlineExceeded,
        }
    }

    async fn cancelled(&self) {
        if self.cancel.is_empty() {
            return future::pending().await;
        }

        let waits = self.cancel.iter().cloned().map(|mut rx| {
            Box::pin(async move {
                // A dropped handle can no longer cancel; wait forever.
                let closed = rx.wait_for(|c| *c).await.is_err();
                if closed {
                    future::pending::<()>().await;
                }
            })
        });
        future::select_all(waits).await;
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.values.keys().map(|(name, _)| *name).collect();
        keys.sort_unstable();
        f.debug_struct("Context")
            .field("deadline", &self.deadline)
            .field("cancelled", &self.is_cancelled())
            .field("values", &keys)
            .finish()
    }
}

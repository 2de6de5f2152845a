//! The envelope passed between steps.

use super::context::{Context, Key};
use std::any::Any;

/// A payload travelling through a flow together with its [`Context`].
///
/// Stages take the message by value and hand a message back, so the payload
/// has exactly one owner at any time. Byproducts that do not belong in the
/// payload type go into the context's side channel via
/// [`Message::with_value`].
#[derive(Debug, Clone)]
pub struct Message<T> {
    pub payload: T,
    ctx: Context,
}

impl<T> Message<T> {
    /// Wrap `payload` in a background context (no deadline, not cancelled,
    /// no side-channel values).
    pub fn new(payload: T) -> Self {
        Self::with_context(payload, Context::background())
    }

    /// Wrap `payload`, keeping a caller-supplied context so cancellation,
    /// deadlines and earlier side-channel values carry on.
    pub fn with_context(payload: T, ctx: Context) -> Self {
        Self { payload, ctx }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn into_parts(self) -> (T, Context) {
        (self.payload, self.ctx)
    }

    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Replace the payload, keeping the context.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Message<U> {
        Message {
            payload: f(self.payload),
            ctx: self.ctx,
        }
    }

    /// Add a side-channel value for later stages.
    pub fn with_value<V>(mut self, key: Key<V>, value: V) -> Self
    where
        V: Any + Send + Sync,
    {
        self.ctx = self.ctx.with_value(key, value);
        self
    }

    /// Read a side-channel value written by an earlier stage.
    pub fn value<V>(&self, key: Key<V>) -> Option<&V>
    where
        V: Any + Send + Sync,
    {
        self.ctx.value(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const COUNT: Key<u32> = Key::new("Count");

    #[test]
    fn new_message_has_background_context() {
        let msg = Message::new(7_u8);
        assert_eq!(msg.context().err(), None);
        assert!(msg.context().deadline().is_none());
        assert!(msg.value(COUNT).is_none());
    }

    #[test]
    fn map_keeps_context_values() {
        let msg = Message::new("deck.pptx").with_value(COUNT, 3);
        let mapped = msg.map(|name| name.len());
        assert_eq!(mapped.payload, 9);
        assert_eq!(mapped.value(COUNT), Some(&3));
    }

    #[tokio::test]
    async fn with_context_preserves_deadline_and_values() {
        let ctx = Context::background()
            .with_value(COUNT, 1)
            .with_timeout(Duration::from_secs(10));
        let deadline = ctx.deadline();

        let msg = Message::with_context("payload", ctx);
        assert_eq!(msg.context().deadline(), deadline);
        assert_eq!(msg.value(COUNT), Some(&1));
    }
}

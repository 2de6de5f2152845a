//! Flows: immutable compositions of steps, and the engine that runs them.
//!
//! A [`Flow`] is a type-erased, reference-counted runner plus the ordered
//! list of the stages it contains. Composition never touches an existing
//! flow: [`add`] and [`merge`] capture clones of their inputs and return a
//! brand-new flow, so a partially built flow can be reused as the prefix of
//! several assemblies.
//!
//! ## Execution
//!
//! Steps run one at a time, in composition order, each awaited to
//! completion before the next is entered. The first `Err` ends the run and
//! becomes the flow's result. The engine itself never retries; retry policy
//! belongs to individual stages.

use super::message::Message;
use super::step::{Payload, StageInfo, Step};
use crate::error::PipelineError;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

type Runner<In, Out> =
    dyn Fn(Message<In>) -> BoxFuture<'static, Result<Message<Out>, PipelineError>> + Send + Sync;

/// A reusable pipeline from `In` to `Out`.
pub struct Flow<In, Out> {
    runner: Arc<Runner<In, Out>>,
    stages: Arc<[StageInfo]>,
}

impl<In, Out> Clone for Flow<In, Out> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            stages: Arc::clone(&self.stages),
        }
    }
}

impl<In: Payload, Out: Payload> Flow<In, Out> {
    /// Run the flow against `msg`, returning the final message.
    ///
    /// On `Err` the caller must discard any partial state: the payload has
    /// been consumed and artifacts on disk may be incomplete.
    pub async fn run(&self, msg: Message<In>) -> Result<Message<Out>, PipelineError> {
        debug!("Running flow with {} stages", self.stages.len());
        (self.runner)(msg).await
    }

    /// Run the flow on a bare payload with a background context.
    pub async fn execute(&self, payload: In) -> Result<Out, PipelineError> {
        self.run(Message::new(payload)).await.map(Message::into_payload)
    }

    /// The stages of this flow, in execution order.
    pub fn stages(&self) -> &[StageInfo] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl<In: Payload, Out: Payload> From<Step<In, Out>> for Flow<In, Out> {
    fn from(step: Step<In, Out>) -> Self {
        let stages: Arc<[StageInfo]> = Arc::from(vec![step.info()]);
        Self {
            runner: Arc::new(move |msg: Message<In>| step.run(msg)),
            stages,
        }
    }
}

impl<In: Payload, Out: Payload> Step<In, Out> {
    /// A flow consisting of this single step.
    pub fn into_flow(self) -> Flow<In, Out> {
        Flow::from(self)
    }
}

impl<In: Payload, Out: Payload> fmt::Debug for Flow<In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow").field("stages", &self.stages).finish()
    }
}

fn concat(a: &[StageInfo], b: &[StageInfo]) -> Arc<[StageInfo]> {
    a.iter().chain(b).cloned().collect::<Vec<_>>().into()
}

/// Append `step` to `flow`.
///
/// The new flow runs `flow` to completion and, only if it succeeded, feeds
/// its output into `step`. `flow` itself is left untouched.
pub fn add<In, Mid, Out>(flow: &Flow<In, Mid>, step: Step<Mid, Out>) -> Flow<In, Out>
where
    In: Payload,
    Mid: Payload,
    Out: Payload,
{
    let stages = concat(&flow.stages, &[step.info()]);
    let head = Arc::clone(&flow.runner);
    let runner = move |msg: Message<In>| -> BoxFuture<'static, Result<Message<Out>, PipelineError>> {
        let head = Arc::clone(&head);
        let step = step.clone();
        Box::pin(async move {
            let mid = head(msg).await?;
            step.run(mid).await
        })
    };
    Flow {
        runner: Arc::new(runner),
        stages,
    }
}

/// Join two flows end to end.
///
/// The new flow runs `first` and, only if it succeeded, runs `second` on
/// its output. When `first` fails, `second` is never entered and `first`'s
/// error is returned unchanged.
pub fn merge<In, Mid, Out>(first: &Flow<In, Mid>, second: &Flow<Mid, Out>) -> Flow<In, Out>
where
    In: Payload,
    Mid: Payload,
    Out: Payload,
{
    let stages = concat(&first.stages, &second.stages);
    let head = Arc::clone(&first.runner);
    let tail = Arc::clone(&second.runner);
    info!(
        "Merging flows ({} + {} stages)",
        first.stages.len(),
        second.stages.len()
    );
    let runner = move |msg: Message<In>| -> BoxFuture<'static, Result<Message<Out>, PipelineError>> {
        let head = Arc::clone(&head);
        let tail = Arc::clone(&tail);
        Box::pin(async move {
            let mid = head(msg).await?;
            tail(mid).await
        })
    };
    Flow {
        runner: Arc::new(runner),
        stages,
    }
}

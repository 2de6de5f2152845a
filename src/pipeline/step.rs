//! Steps: the three shapes a conversion stage can take.
//!
//! | Kind        | Signature                                  | May change payload type |
//! |-------------|--------------------------------------------|-------------------------|
//! | `Filter`    | `&Message<T>` → `Result<()>`               | no (cannot even mutate) |
//! | `Transform` | `Message<In>` → `Result<Message<Out>>`     | yes                     |
//! | `Generate`  | `Message<T>` → `Result<Message<T>>`        | no                      |
//!
//! A [`Step`] is an enum, so it holds exactly one kind. `Step::filter` and
//! `Step::generate` exist only for `Step<T, T>`; there is no way to attach a
//! second kind to an existing step.

use super::message::Message;
use crate::error::PipelineError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// Anything that can travel through a flow.
pub trait Payload: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Payload for T {}

/// Short, log-friendly name of a stage type (`ThumbnailGenerator` rather
/// than `docflow::stages::image::ThumbnailGenerator`).
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// A precondition. Failure halts the flow.
#[async_trait]
pub trait Filter<T>: Send + Sync {
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    async fn filter(&self, msg: &Message<T>) -> Result<(), PipelineError>;
}

/// Maps one payload to another. Failure halts the flow.
#[async_trait]
pub trait Transform<In, Out>: Send + Sync {
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    async fn transform(&self, msg: Message<In>) -> Result<Message<Out>, PipelineError>;
}

/// Augments the payload, its files, or the side channel.
///
/// Implementations swallow (and log) failures of non-critical artifacts and
/// return `Err` only when the flow cannot meaningfully continue.
#[async_trait]
pub trait Generate<T>: Send + Sync {
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    async fn generate(&self, msg: Message<T>) -> Result<Message<T>, PipelineError>;
}

/// Tag identifying which kind a [`Step`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Filter,
    Transform,
    Generate,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepKind::Filter => "filter",
            StepKind::Transform => "transform",
            StepKind::Generate => "generate",
        };
        f.write_str(s)
    }
}

/// Name and kind of one stage, in flow order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInfo {
    pub name: String,
    pub kind: StepKind,
}

/// One conversion stage.
///
/// The `pass` pointers in `Filter` and `Generate` are always the identity
/// function; they only exist to hand a `Message<In>` back as a
/// `Message<Out>` in generic code, which the `Step<T, T>` constructors
/// guarantee is the same type.
pub enum Step<In, Out> {
    Filter {
        stage: Arc<dyn Filter<In>>,
        pass: fn(Message<In>) -> Message<Out>,
    },
    Transform(Arc<dyn Transform<In, Out>>),
    Generate {
        stage: Arc<dyn Generate<In>>,
        pass: fn(Message<In>) -> Message<Out>,
    },
}

fn identity<T>(msg: Message<T>) -> Message<T> {
    msg
}

impl<T: Payload> Step<T, T> {
    pub fn filter(stage: impl Filter<T> + 'static) -> Self {
        Step::Filter {
            stage: Arc::new(stage),
            pass: identity::<T>,
        }
    }

    pub fn generate(stage: impl Generate<T> + 'static) -> Self {
        Step::Generate {
            stage: Arc::new(stage),
            pass: identity::<T>,
        }
    }
}

impl<In: Payload, Out: Payload> Step<In, Out> {
    pub fn transform(stage: impl Transform<In, Out> + 'static) -> Self {
        Step::Transform(Arc::new(stage))
    }

    pub fn kind(&self) -> StepKind {
        match self {
            Step::Filter { .. } => StepKind::Filter,
            Step::Transform(_) => StepKind::Transform,
            Step::Generate { .. } => StepKind::Generate,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Step::Filter { stage, .. } => stage.name(),
            Step::Transform(stage) => stage.name(),
            Step::Generate { stage, .. } => stage.name(),
        }
    }

    pub fn info(&self) -> StageInfo {
        StageInfo {
            name: self.name().to_string(),
            kind: self.kind(),
        }
    }

    /// Execute this step against `msg`.
    ///
    /// A context that is already cancelled or past its deadline stops the
    /// step before the stage is entered.
    pub(crate) fn run(&self, msg: Message<In>) -> BoxFuture<'static, Result<Message<Out>, PipelineError>> {
        let step = self.clone();
        Box::pin(async move {
            if let Some(err) = msg.context().err() {
                debug!("Skipping {} '{}': {}", step.kind(), step.name(), err);
                return Err(err.into());
            }

            debug!("Running {} '{}'", step.kind(), step.name());
            let result = match &step {
                Step::Filter { stage, pass } => stage.filter(&msg).await.map(|()| pass(msg)),
                Step::Transform(stage) => stage.transform(msg).await,
                Step::Generate { stage, pass } => stage.generate(msg).await.map(pass),
            };

            if let Err(ref e) = result {
                error!("{} '{}' failed: {}", step.kind(), step.name(), e);
            }
            result
        })
    }
}

impl<In, Out> Clone for Step<In, Out> {
    fn clone(&self) -> Self {
        match self {
            Step::Filter { stage, pass } => Step::Filter {
                stage: Arc::clone(stage),
                pass: *pass,
            },
            Step::Transform(stage) => Step::Transform(Arc::clone(stage)),
            Step::Generate { stage, pass } => Step::Generate {
                stage: Arc::clone(stage),
                pass: *pass,
            },
        }
    }
}

impl<In: Payload, Out: Payload> fmt::Debug for Step<In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContextError;
    use crate::pipeline::Context;

    struct RejectOdd;

    #[async_trait]
    impl Filter<u32> for RejectOdd {
        async fn filter(&self, msg: &Message<u32>) -> Result<(), PipelineError> {
            if msg.payload % 2 == 1 {
                return Err(PipelineError::Internal(format!("{} is odd", msg.payload)));
            }
            Ok(())
        }
    }

    struct Stringify;

    #[async_trait]
    impl Transform<u32, String> for Stringify {
        fn name(&self) -> &str {
            "stringify"
        }

        async fn transform(&self, msg: Message<u32>) -> Result<Message<String>, PipelineError> {
            Ok(msg.map(|n| n.to_string()))
        }
    }

    #[test]
    fn short_type_name_strips_module_path_and_generics() {
        assert_eq!(short_type_name::<RejectOdd>(), "RejectOdd");
        assert_eq!(short_type_name::<Vec<String>>(), "Vec");
    }

    #[test]
    fn constructors_fix_the_kind() {
        let f: Step<u32, u32> = Step::filter(RejectOdd);
        let t: Step<u32, String> = Step::transform(Stringify);
        assert_eq!(f.kind(), StepKind::Filter);
        assert_eq!(t.kind(), StepKind::Transform);
        assert_eq!(f.name(), "RejectOdd");
        assert_eq!(t.info().name, "stringify");
    }

    #[tokio::test]
    async fn filter_passes_message_through_untouched() {
        let out = Step::filter(RejectOdd).run(Message::new(4_u32)).await.unwrap();
        assert_eq!(out.payload, 4);

        let err = Step::filter(RejectOdd).run(Message::new(3_u32)).await.unwrap_err();
        assert!(err.to_string().contains("3 is odd"));
    }

    #[tokio::test]
    async fn cancelled_context_stops_step_before_stage() {
        let (ctx, handle) = Context::background().with_cancel();
        handle.cancel();
        let err = Step::<u32, String>::transform(Stringify)
            .run(Message::with_context(1, ctx))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Interrupted(ContextError::Cancelled)));
    }
}

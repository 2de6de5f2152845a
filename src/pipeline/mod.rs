//! Generic staged-pipeline engine.
//!
//! Nothing in this module knows about presentations or external tools; the
//! conversion stages in [`crate::stages`] are built on top of it.
//!
//! ## Data Flow
//!
//! ```text
//! Message<In> ──▶ Step ──▶ Step ──▶ … ──▶ Message<Out>
//!   payload        filter / transform / generate
//!   context        deadline · cancellation · side-channel values
//! ```
//!
//! 1. [`context`] holds the deadline, cancellation signals and typed
//!    side-channel values that travel with every message
//! 2. [`message`] is the envelope: one payload plus its context
//! 3. [`step`] defines the three stage shapes (`Filter`, `Transform`,
//!    `Generate`) and the [`Step`] enum wrapping exactly one of them
//! 4. [`flow`] composes steps into immutable, reusable [`Flow`]s with
//!    [`add`] and [`merge`], and runs them strictly in sequence

pub mod context;
pub mod flow;
pub mod message;
pub mod step;

pub use context::{CancelHandle, Context, Key};
pub use flow::{add, merge, Flow};
pub use message::Message;
pub use step::{Filter, Generate, Payload, StageInfo, Step, StepKind, Transform};

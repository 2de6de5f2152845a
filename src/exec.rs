//! External process invocation.
//!
//! Every conversion tool (LibreOffice wrapper scripts, ImageMagick,
//! poppler's `pdftocairo` / `pdftotext`) is reached through the
//! [`CommandRunner`] trait so stages can be tested without the tools
//! installed.
//!
//! [`ProcessRunner`] is the production implementation. The child is spawned
//! with `kill_on_drop(true)` and raced against [`Context::done`]: when the
//! context is cancelled or its deadline passes, the output future is
//! dropped, which kills the child, and the call returns
//! [`InvokeError::Interrupted`].

use crate::error::InvokeError;
use crate::pipeline::Context;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Runs one external program to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` under `ctx`.
    ///
    /// Returns the combined stdout and stderr on a zero exit status.
    async fn run(&self, ctx: &Context, program: &str, args: &[String])
        -> Result<String, InvokeError>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        ctx: &Context,
        program: &str,
        args: &[String],
    ) -> Result<String, InvokeError> {
        if let Some(reason) = ctx.err() {
            return Err(InvokeError::Interrupted {
                program: program.to_string(),
                source: reason,
            });
        }

        debug!("exec: {} {}", program, args.join(" "));
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::select! {
            out = cmd.output() => out.map_err(|source| InvokeError::Spawn {
                program: program.to_string(),
                source,
            })?,
            reason = ctx.done() => {
                debug!("exec: {} interrupted ({})", program, reason);
                return Err(InvokeError::Interrupted {
                    program: program.to_string(),
                    source: reason,
                });
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            Err(InvokeError::Failed {
                program: program.to_string(),
                code: output.status.code(),
                output: combined.trim_end().to_string(),
            })
        }
    }
}

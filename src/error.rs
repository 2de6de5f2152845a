//! Error types for the docflow library.
//!
//! Three error types reflect three layers of the system:
//!
//! * [`PipelineError`]: what a flow returns. Every variant except
//!   [`PipelineError::DegradedArtifact`] halts the flow; callers must
//!   discard the partially processed presentation when they see one.
//!
//! * [`InvokeError`]: a single external tool invocation went wrong
//!   (could not spawn, exited non-zero, or was interrupted). Stages decide
//!   whether that is fatal, retryable, or merely degrades one artifact.
//!
//! * [`ContextError`]: the execution context was cancelled or its
//!   deadline passed.
//!
//! `DegradedArtifact` is never returned from a flow. Generate stages build it
//! so the failure is logged with a uniform shape, then carry on with the
//! artifact field left empty.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Why an execution context stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The context, or one of its ancestors, was cancelled.
    #[error("context cancelled")]
    Cancelled,

    /// The context deadline passed before the work finished.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Failure of one external tool invocation.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The process could not be started at all.
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited unsuccessfully.
    ///
    /// `code` is `None` when the process was terminated by a signal.
    #[error("'{program}' exited with status {}: {output}", display_code(.code))]
    Failed {
        program: String,
        code: Option<i32>,
        output: String,
    },

    /// The invocation was abandoned because the context ended.
    /// The child process has been killed.
    #[error("'{program}' interrupted: {source}")]
    Interrupted {
        program: String,
        #[source]
        source: ContextError,
    },
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "signal".to_string(),
    }
}

impl InvokeError {
    /// The context error behind this failure, if it was an interruption.
    pub fn interruption(&self) -> Option<ContextError> {
        match self {
            InvokeError::Interrupted { source, .. } => Some(*source),
            _ => None,
        }
    }
}

/// A derived artifact produced per page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Thumbnail,
    TextFile,
    Svg,
    Png,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Artifact::Thumbnail => "thumbnail",
            Artifact::TextFile => "text file",
            Artifact::Svg => "SVG",
            Artifact::Png => "PNG",
        };
        f.write_str(name)
    }
}

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Wrong file kind or failed precheck. Halts the flow.
    Validation,
    /// An external converter exhausted its retry budget. Halts the flow.
    Conversion,
    /// One non-critical artifact could not be produced. Logged only.
    DegradedArtifact,
    /// A mandatory local file operation failed. Halts the flow.
    FatalIo,
    /// Cancellation or deadline. Halts the flow.
    Interrupted,
    /// Misconfiguration detected before any work started.
    Usage,
    /// Bug or panic inside the library.
    Internal,
}

/// All errors produced by docflow stages and flows.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Validation ────────────────────────────────────────────────────────
    /// The input file extension is not one the flow can handle.
    #[error("input file '{path}' is not an office file")]
    UnsupportedFileType { path: PathBuf },

    /// The PowerPoint precheck script rejected the file.
    #[error("PowerPoint file '{path}' is not valid: {source}")]
    PrecheckFailed {
        path: PathBuf,
        #[source]
        source: InvokeError,
    },

    // ── Conversion ────────────────────────────────────────────────────────
    /// Every conversion attempt failed.
    #[error("all {attempts} conversion attempts failed for file '{path}'\nLast error: {last_error}")]
    ConversionFailed {
        path: PathBuf,
        attempts: u32,
        last_error: String,
    },

    // ── Degraded artifacts ───────────────────────────────────────────────
    /// A single page artifact could not be generated.
    #[error("failed to generate {artifact} for page {page}: {detail}")]
    DegradedArtifact {
        artifact: Artifact,
        page: usize,
        detail: String,
    },

    // ── Fatal I/O ─────────────────────────────────────────────────────────
    /// Creating or cleaning up a download marker failed.
    #[error("download marker operation failed on '{path}': {source}")]
    MarkerIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source PDF could not be split into page files.
    #[error("failed to split '{path}' into pages: {detail}")]
    PageSplitFailed { path: PathBuf, detail: String },

    // ── Interruption ──────────────────────────────────────────────────────
    /// The flow context was cancelled or its deadline passed.
    #[error("flow interrupted: {0}")]
    Interrupted(#[from] ContextError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or file validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::UnsupportedFileType { .. } | PipelineError::PrecheckFailed { .. } => {
                ErrorKind::Validation
            }
            PipelineError::ConversionFailed { .. } => ErrorKind::Conversion,
            PipelineError::DegradedArtifact { .. } => ErrorKind::DegradedArtifact,
            PipelineError::MarkerIo { .. } | PipelineError::PageSplitFailed { .. } => {
                ErrorKind::FatalIo
            }
            PipelineError::Interrupted(_) => ErrorKind::Interrupted,
            PipelineError::InvalidConfig(_) => ErrorKind::Usage,
            PipelineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error must stop the flow.
    pub fn is_fatal(&self) -> bool {
        self.kind() != ErrorKind::DegradedArtifact
    }
}

//! # docflow
//!
//! Turn uploaded office documents, images and PDFs into the per-page
//! artifacts a presentation viewer needs: a single PDF per page, a
//! thumbnail, extracted text, an SVG and optionally a PNG.
//!
//! ## Why this crate?
//!
//! Conversion is a chain of external tools (LibreOffice, ImageMagick,
//! poppler) that each fail in their own way. Rather than one long function,
//! every concern is a small stage with one of three shapes (filter,
//! transform, generate), and stages are composed into immutable flows that
//! can be reused, extended and joined. A context carrying a deadline and a
//! cancellation signal travels with the document so any stage, and any tool
//! it runs, can be stopped.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ office  extension check · pptx pre-scan · LibreOffice → PDF (retried)
//!  │            └──▶ continues as the pdf flow
//!  ├─ pdf     download marker · split pages (pdfium, spawn_blocking)
//!  │          · thumbnails · text · SVG · PNG
//!  └─ image   download marker · thumbnail · text · ImageMagick → PDF
//!             · SVG · repeat render · PNG
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docflow::{office_flow, PdfiumPageProcessor, PipelineConfig, Presentation, StageEnv};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder().max_attempts(2).build()?;
//!     let env = StageEnv::with_process_runner(Arc::new(config));
//!     let flow = office_flow(&env, Arc::new(PdfiumPageProcessor::default()));
//!
//!     let pres = flow.execute(Presentation::new("abc", "/uploads/deck.pptx")).await?;
//!     eprintln!("{} → {} pages", pres.file_path.display(), pres.pages.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docflow` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! docflow = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod exec;
pub mod pipeline;
pub mod stages;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder, RenderFormat};
pub use document::{ArtifactLayout, Page, Presentation};
pub use error::{Artifact, ContextError, ErrorKind, InvokeError, PipelineError};
pub use exec::{CommandRunner, ProcessRunner};
pub use pipeline::{CancelHandle, Context, Flow, Message};
pub use stages::image::image_flow;
pub use stages::office::office_flow;
pub use stages::pdf::pdf_flow;
pub use stages::{PageProcessor, PdfiumPageProcessor, PresentationFlow, StageEnv};

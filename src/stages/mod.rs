//! Conversion stages and the flows assembled from them.
//!
//! ```text
//! office: ConversionFilter ─▶ OfficePdfTransformer ─┐
//!                                                   ├─▶ pdf flow
//! pdf:    DownloadMarker ─▶ Pages ─▶ Thumbnails ─▶ Text ─▶ SVG ─▶ PNG
//!
//! image:  DownloadMarker ─▶ Thumbnail ─▶ Text ─▶ ImagePdfTransformer
//!                        ─▶ SVG ─▶ SVG (repeat render) ─▶ PNG
//! ```
//!
//! Every stage shares one [`StageEnv`]: the immutable configuration plus the
//! [`CommandRunner`] all external tools go through.
//!
//! ## Failure policy
//!
//! * Filters and transforms fail the flow.
//! * Per-page artifacts (thumbnail, text, SVG, PNG) degrade: the failure is
//!   logged as [`PipelineError::DegradedArtifact`], a configured fallback
//!   asset is copied when one exists, and the flow continues.
//! * Download-marker I/O and page splitting are fatal.
//! * Cancellation of the flow's own context is always fatal, even inside a
//!   stage that would otherwise degrade.

pub mod image;
pub mod office;
pub mod pages;
pub mod pdf;

use crate::config::PipelineConfig;
use crate::document::file::ensure_parent_dir;
use crate::document::{self, Presentation};
use crate::error::{Artifact, InvokeError, PipelineError};
use crate::exec::{CommandRunner, ProcessRunner};
use crate::pipeline::{Context, Flow, Generate, Message};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

pub use pages::{PageProcessor, PdfiumPageProcessor};

/// A flow over presentations.
pub type PresentationFlow = Flow<Presentation, Presentation>;

/// Text written when no text can be extracted for a page.
pub const NO_TEXT_PLACEHOLDER: &str = "No text could be retrieved for the slide";

/// What every stage needs: configuration and a way to run tools.
#[derive(Clone)]
pub struct StageEnv {
    pub config: Arc<PipelineConfig>,
    pub runner: Arc<dyn CommandRunner>,
}

impl StageEnv {
    pub fn new(config: Arc<PipelineConfig>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Production environment running real subprocesses.
    pub fn with_process_runner(config: Arc<PipelineConfig>) -> Self {
        Self::new(config, Arc::new(ProcessRunner::new()))
    }

    /// Run one tool under a deadline of `timeout` derived from `ctx`.
    pub(crate) async fn invoke(
        &self,
        ctx: &Context,
        timeout: Duration,
        program: &str,
        args: &[String],
    ) -> Result<String, InvokeError> {
        let bounded = ctx.with_timeout(timeout);
        self.runner.run(&bounded, program, args).await
    }

    /// Produce `target` with a tool, falling back to `fallback` on failure.
    ///
    /// Returns the artifact path when `target` exists afterwards, whether the
    /// tool wrote it or the fallback was copied. Only an ended `ctx` is an
    /// error; every other failure is logged as a degraded artifact.
    pub(crate) async fn render(
        &self,
        ctx: &Context,
        job: RenderJob<'_>,
        target: &Path,
        fallback: Option<&Path>,
    ) -> Result<Option<PathBuf>, PipelineError> {
        let outcome = match ensure_parent_dir(target).await {
            Ok(()) => self
                .invoke(ctx, job.timeout, job.program, &job.args)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(format!("cannot create directory: {}", e)),
        };
        if let Some(reason) = ctx.err() {
            return Err(reason.into());
        }

        let produced = exists(target).await;
        match outcome {
            Ok(_) if produced => return Ok(Some(target.to_path_buf())),
            Ok(_) => degraded(job.artifact, job.page, "tool succeeded but wrote no output"),
            Err(detail) => degraded(job.artifact, job.page, detail),
        }

        if produced {
            return Ok(Some(target.to_path_buf()));
        }
        let Some(blank) = fallback else {
            return Ok(None);
        };
        match document::copy_file(blank, target).await {
            Ok(()) => Ok(Some(target.to_path_buf())),
            Err(e) => {
                error!(
                    "Failed to copy blank {} {} → {}: {}",
                    job.artifact,
                    blank.display(),
                    target.display(),
                    e
                );
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for StageEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageEnv")
            .field("config", &self.config)
            .field("runner", &"<dyn CommandRunner>")
            .finish()
    }
}

/// One external tool call producing one page artifact.
#[derive(Debug)]
pub(crate) struct RenderJob<'a> {
    pub artifact: Artifact,
    pub page: usize,
    pub program: &'a str,
    pub args: Vec<String>,
    pub timeout: Duration,
}

/// Log a non-fatal artifact failure.
pub(crate) fn degraded(artifact: Artifact, page: usize, detail: impl ToString) {
    let e = PipelineError::DegradedArtifact {
        artifact,
        page,
        detail: detail.to_string(),
    };
    warn!("{}", e);
}

pub(crate) fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub(crate) async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Creates the download marker for downloadable presentations.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadMarkerGenerator;

#[async_trait]
impl Generate<Presentation> for DownloadMarkerGenerator {
    async fn generate(
        &self,
        msg: Message<Presentation>,
    ) -> Result<Message<Presentation>, PipelineError> {
        let pres = &msg.payload;
        if pres.downloadable {
            document::make_downloadable(&pres.id, &pres.file_path).await?;
        }
        Ok(msg)
    }
}

#[cfg(test)]
pub(crate) fn env_with(
    runner: crate::exec::fake::FakeRunner,
    config: PipelineConfig,
) -> (StageEnv, Arc<crate::exec::fake::FakeRunner>) {
    let runner = Arc::new(runner);
    let env = StageEnv::new(Arc::new(config), runner.clone());
    (env, runner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::fake::FakeRunner;
    use crate::pipeline::Step;

    fn job(program: &str) -> RenderJob<'_> {
        RenderJob {
            artifact: Artifact::Svg,
            page: 1,
            program,
            args: vec![],
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn render_copies_fallback_when_tool_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blank = dir.path().join("blank.svg");
        std::fs::write(&blank, "<svg/>").unwrap();
        let target = dir.path().join("svgs/slide-1.svg");
        let (env, _) = env_with(FakeRunner::failing(), PipelineConfig::default());

        let out = env
            .render(&Context::background(), job("pdftocairo"), &target, Some(&blank))
            .await
            .unwrap();

        assert_eq!(out.as_deref(), Some(target.as_path()));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "<svg/>");
    }

    #[tokio::test]
    async fn render_without_fallback_leaves_artifact_empty() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("svgs/slide-1.svg");
        let (env, _) = env_with(FakeRunner::failing(), PipelineConfig::default());

        let out = env
            .render(&Context::background(), job("pdftocairo"), &target, None)
            .await
            .unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn render_keeps_output_written_despite_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blank = dir.path().join("blank.svg");
        std::fs::write(&blank, "blank").unwrap();
        let target = dir.path().join("slide-1.svg");
        let written = target.clone();
        let runner = FakeRunner::new(move |program, _| {
            std::fs::write(&written, "partial").unwrap();
            Err(crate::exec::fake::failure(program))
        });
        let (env, _) = env_with(runner, PipelineConfig::default());

        let out = env
            .render(&Context::background(), job("pdftocairo"), &target, Some(&blank))
            .await
            .unwrap();
        assert!(out.is_some());
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "partial");
    }

    #[tokio::test]
    async fn invoke_accepts_unbounded_timeout() {
        let (env, runner) = env_with(FakeRunner::succeeding(), PipelineConfig::default());
        env.invoke(
            &Context::background(),
            Duration::from_secs(u64::MAX),
            "pdftocairo",
            &[],
        )
        .await
        .unwrap();
        assert_eq!(runner.programs(), vec!["pdftocairo"]);
    }

    #[tokio::test]
    async fn render_fails_when_flow_context_ended() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, handle) = Context::background().with_cancel();
        handle.cancel();
        let (env, _) = env_with(FakeRunner::succeeding(), PipelineConfig::default());

        let err = env
            .render(&ctx, job("pdftocairo"), &dir.path().join("x.svg"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Interrupted(_)));
    }

    #[tokio::test]
    async fn marker_only_for_downloadable() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("deck.pdf");
        std::fs::write(&file, b"%PDF").unwrap();
        let step = Step::generate(DownloadMarkerGenerator);

        let pres = Presentation::new("abc", &file);
        step.run(Message::new(pres.clone())).await.unwrap();
        assert!(!dir.path().join("abc.pdf.downloadable").exists());

        let pres = Presentation {
            downloadable: true,
            ..pres
        };
        step.run(Message::new(pres)).await.unwrap();
        assert!(dir.path().join("abc.pdf.downloadable").exists());
    }

    #[tokio::test]
    async fn marker_failure_halts() {
        let pres = Presentation {
            downloadable: true,
            ..Presentation::new("abc", "/nonexistent/docflow/deck.pdf")
        };
        let err = Step::generate(DownloadMarkerGenerator)
            .run(Message::new(pres))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MarkerIo { .. }));
    }
}

//! Office flow: validate an office document, convert it to PDF, then hand
//! it to the PDF flow.
//!
//! ## Retry loop
//!
//! LibreOffice conversions fail transiently (a stuck soffice instance, a
//! lock file left behind). [`OfficePdfTransformer`] retries up to
//! `conversion.office.max_attempts` times, each attempt bounded by
//! `conversion.office.timeout_secs` and by the flow's own context. A failed
//! attempt's partial output is deleted before the next one so a truncated
//! PDF never survives into the page split.

use super::pages::PageProcessor;
use super::pdf::pdf_flow;
use super::{arg, PresentationFlow, StageEnv};
use crate::config::secs;
use crate::document::{self, Presentation};
use crate::error::PipelineError;
use crate::pipeline::{add, merge, Filter, Message, Step, Transform};
use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Accepts office documents and runs the PowerPoint precheck.
pub struct ConversionFilter {
    env: StageEnv,
}

impl ConversionFilter {
    pub fn new(env: StageEnv) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Filter<Presentation> for ConversionFilter {
    async fn filter(&self, msg: &Message<Presentation>) -> Result<(), PipelineError> {
        let path = &msg.payload.file_path;
        if !document::is_office_file(path) {
            return Err(PipelineError::UnsupportedFileType { path: path.clone() });
        }

        let cfg = &self.env.config.validation.office;
        if cfg.skip_precheck || !document::is_pptx(path) {
            return Ok(());
        }

        info!("Running PowerPoint precheck on {}", path.display());
        let args = vec![cfg.timeout_secs.to_string(), arg(&cfg.script), arg(path)];
        let result = self
            .env
            .invoke(
                msg.context(),
                secs(cfg.exec_timeout_secs),
                &self.env.config.tools.timeout,
                &args,
            )
            .await;

        match (result, msg.context().err()) {
            (Ok(_), _) => Ok(()),
            (Err(_), Some(reason)) => Err(reason.into()),
            (Err(source), None) => Err(PipelineError::PrecheckFailed {
                path: path.clone(),
                source,
            }),
        }
    }
}

/// Converts an office document to PDF with a bounded retry loop.
pub struct OfficePdfTransformer {
    env: StageEnv,
}

impl OfficePdfTransformer {
    pub fn new(env: StageEnv) -> Self {
        Self { env }
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}

#[async_trait]
impl Transform<Presentation, Presentation> for OfficePdfTransformer {
    async fn transform(
        &self,
        msg: Message<Presentation>,
    ) -> Result<Message<Presentation>, PipelineError> {
        let (mut pres, ctx) = msg.into_parts();
        let cfg = &self.env.config.conversion.office;
        let input = pres.file_path.clone();
        let output = document::pdf_name(&input);
        let attempts = cfg.max_attempts.max(1);
        let args = vec![
            format!("{}s", cfg.timeout_secs),
            arg(&cfg.script),
            arg(&input),
            arg(&output),
            "pdf".to_string(),
            cfg.timeout_secs.to_string(),
        ];

        let mut last_error = String::new();
        for attempt in 1..=attempts {
            if let Some(reason) = ctx.err() {
                return Err(reason.into());
            }

            info!(
                "Converting {} to PDF (attempt {}/{})",
                input.display(),
                attempt,
                attempts
            );
            let result = self
                .env
                .invoke(
                    &ctx,
                    secs(cfg.timeout_secs),
                    &self.env.config.tools.timeout,
                    &args,
                )
                .await;

            match result {
                Ok(_) => {
                    info!("Converted {} → {}", input.display(), output.display());
                    pres.file_path = output;
                    return Ok(Message::with_context(pres, ctx));
                }
                Err(e) => {
                    warn!("Conversion attempt {} failed: {}", attempt, e);
                    last_error = e.to_string();
                    remove_partial(&output).await;
                }
            }
        }

        if let Some(reason) = ctx.err() {
            return Err(reason.into());
        }
        Err(PipelineError::ConversionFailed {
            path: input,
            attempts,
            last_error,
        })
    }
}

/// Filter and convert an office document, then run the PDF flow on it.
pub fn office_flow(env: &StageEnv, processor: Arc<dyn PageProcessor>) -> PresentationFlow {
    let convert = add(
        &Step::filter(ConversionFilter::new(env.clone())).into_flow(),
        Step::transform(OfficePdfTransformer::new(env.clone())),
    );
    merge(&convert, &pdf_flow(env, processor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::error::{ContextError, ErrorKind, InvokeError};
    use crate::exec::fake::{failure, FakeRunner};
    use crate::pipeline::Context;
    use crate::stages::env_with;
    use crate::stages::pdf::tests::{poppler, FakeSplitter};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn upload(dir: &Path, name: &str) -> Presentation {
        let file = dir.join(name);
        std::fs::write(&file, b"office").unwrap();
        Presentation::new("abc", file)
    }

    async fn run_filter(env: StageEnv, pres: Presentation) -> Result<(), PipelineError> {
        Step::filter(ConversionFilter::new(env))
            .run(Message::new(pres))
            .await
            .map(|_| ())
    }

    #[tokio::test]
    async fn filter_accepts_every_office_extension() {
        let dir = tempfile::tempdir().unwrap();
        for ext in document::file::OFFICE_EXTENSIONS {
            let (env, _) = env_with(FakeRunner::succeeding(), PipelineConfig::default());
            run_filter(env, upload(dir.path(), &format!("deck.{ext}")))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn filter_rejects_non_office_files() {
        let dir = tempfile::tempdir().unwrap();
        let (env, runner) = env_with(FakeRunner::succeeding(), PipelineConfig::default());
        let err = run_filter(env, upload(dir.path(), "deck.pdf")).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFileType { .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn pptx_precheck_command() {
        let dir = tempfile::tempdir().unwrap();
        let (env, runner) = env_with(FakeRunner::succeeding(), PipelineConfig::default());
        let pres = upload(dir.path(), "deck.pptx");
        let file = pres.file_path.clone();

        run_filter(env, pres).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "timeout");
        assert_eq!(
            calls[0].1,
            vec![
                "25".to_string(),
                "/usr/share/prescan/presentation-validation.sh".into(),
                arg(&file),
            ]
        );
    }

    #[tokio::test]
    async fn pptx_precheck_failure_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let (env, _) = env_with(FakeRunner::failing(), PipelineConfig::default());
        let err = run_filter(env, upload(dir.path(), "deck.PPTX")).await.unwrap_err();
        assert!(matches!(err, PipelineError::PrecheckFailed { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn precheck_only_for_pptx_and_skippable() {
        let dir = tempfile::tempdir().unwrap();
        let (env, runner) = env_with(FakeRunner::failing(), PipelineConfig::default());
        run_filter(env, upload(dir.path(), "deck.ppt")).await.unwrap();
        assert!(runner.calls().is_empty());

        let config = PipelineConfig::builder().skip_precheck(true).build().unwrap();
        let (env, runner) = env_with(FakeRunner::failing(), config);
        run_filter(env, upload(dir.path(), "deck.pptx")).await.unwrap();
        assert!(runner.calls().is_empty());
    }

    /// Attempt counter plus the number of attempts that found output
    /// already present when they started.
    struct Attempts {
        seen: AtomicU32,
        stale_starts: AtomicU32,
    }

    fn converter(failures: u32) -> (FakeRunner, Arc<Attempts>) {
        let attempts = Arc::new(Attempts {
            seen: AtomicU32::new(0),
            stale_starts: AtomicU32::new(0),
        });
        let record = attempts.clone();
        let runner = FakeRunner::new(move |program, args| {
            let out = PathBuf::from(&args[3]);
            if out.exists() {
                record.stale_starts.fetch_add(1, Ordering::SeqCst);
            }
            if record.seen.fetch_add(1, Ordering::SeqCst) < failures {
                std::fs::write(&out, b"partial").unwrap();
                return Err(failure(program));
            }
            std::fs::write(&out, b"%PDF").unwrap();
            Ok(String::new())
        });
        (runner, attempts)
    }

    #[tokio::test]
    async fn exhausted_attempts_fail_with_input_name() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder().max_attempts(4).build().unwrap();
        let (runner, attempts) = converter(u32::MAX);
        let (env, runner) = env_with(runner, config);

        let err = Step::transform(OfficePdfTransformer::new(env))
            .run(Message::new(upload(dir.path(), "deck.docx")))
            .await
            .unwrap_err();

        assert_eq!(runner.calls().len(), 4);
        assert_eq!(attempts.stale_starts.load(Ordering::SeqCst), 0);
        match &err {
            PipelineError::ConversionFailed { path, attempts, .. } => {
                assert_eq!(path, &dir.path().join("deck.docx"));
                assert_eq!(*attempts, 4);
            }
            other => panic!("expected ConversionFailed, got {other:?}"),
        }
        assert!(err.to_string().contains("deck.docx"));
        assert!(!dir.path().join("deck.pdf").exists(), "partial output left behind");
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, attempts) = converter(2);
        let (env, runner) = env_with(runner, PipelineConfig::default());

        let out = Step::transform(OfficePdfTransformer::new(env))
            .run(Message::new(upload(dir.path(), "deck.odp")))
            .await
            .unwrap()
            .into_payload();

        assert_eq!(attempts.seen.load(Ordering::SeqCst), 3);
        assert_eq!(
            attempts.stale_starts.load(Ordering::SeqCst),
            0,
            "a retry started with the previous attempt's partial output in place"
        );
        assert_eq!(out.file_path, dir.path().join("deck.pdf"));
        assert_eq!(std::fs::read(&out.file_path).unwrap(), b"%PDF");

        let (program, args) = runner.calls().remove(0);
        assert_eq!(program, "timeout");
        assert_eq!(args[0], "60s");
        assert_eq!(args[1], "/usr/share/bbb-libreoffice-conversion/convert.sh");
        assert_eq!(args[4], "pdf");
        assert_eq!(args[5], "60");
    }

    #[tokio::test]
    async fn cancellation_stops_retrying() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, handle) = Context::background().with_cancel();
        let runner = FakeRunner::new(move |program, _| {
            handle.cancel();
            Err(InvokeError::Interrupted {
                program: program.to_string(),
                source: ContextError::Cancelled,
            })
        });
        let (env, runner) = env_with(runner, PipelineConfig::default());

        let err = Step::transform(OfficePdfTransformer::new(env))
            .run(Message::with_context(upload(dir.path(), "deck.doc"), ctx))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Interrupted(ContextError::Cancelled)));
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn office_flow_merges_into_pdf_flow() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new(|program, args| {
            if program != "timeout" {
                return poppler(program, args);
            }
            // precheck takes three arguments, conversion six
            if args.len() == 6 {
                std::fs::write(&args[3], b"%PDF").unwrap();
            }
            Ok(String::new())
        });
        let config = PipelineConfig::builder().blank_svg(None).blank_png(None).build().unwrap();
        let (env, _) = env_with(runner, config);
        let splitter = Arc::new(FakeSplitter::new(2));
        let flow = office_flow(&env, splitter.clone());

        let out = flow.execute(upload(dir.path(), "deck.pptx")).await.unwrap();

        assert_eq!(flow.len(), 8);
        assert_eq!(out.file_path, dir.path().join("deck.pdf"));
        assert_eq!(out.pages.len(), 2);
        assert_eq!(out.pages[1].num, 2);
        assert_eq!(
            splitter.sources.lock().unwrap().as_slice(),
            &[dir.path().join("deck.pdf")]
        );
    }

    #[tokio::test]
    async fn office_flow_never_reaches_pdf_stages_on_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let (env, runner) = env_with(FakeRunner::succeeding(), PipelineConfig::default());
        let splitter = Arc::new(FakeSplitter::new(1));
        let flow = office_flow(&env, splitter.clone());

        let err = flow.execute(upload(dir.path(), "photo.png")).await.unwrap_err();

        assert!(matches!(err, PipelineError::UnsupportedFileType { .. }));
        assert!(runner.calls().is_empty());
        assert!(splitter.sources.lock().unwrap().is_empty());
    }
}

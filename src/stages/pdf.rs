//! PDF flow: split a PDF into pages and derive per-page artifacts.
//!
//! ```text
//! DownloadMarker ─▶ PageGenerator ─▶ PageThumbnailGenerator
//!                ─▶ PageTextGenerator ─▶ SvgGenerator ─▶ PngGenerator
//! ```
//!
//! Splitting is fatal on failure: nothing downstream is meaningful without
//! pages. Every later stage works page by page and degrades per artifact;
//! a page keeps its slot in `pages` even if every artifact is missing.
//!
//! Tool contracts (poppler-utils):
//!
//! | Artifact  | Command                                                         |
//! |-----------|-----------------------------------------------------------------|
//! | thumbnail | `pdftocairo -png -singlefile -scale-to 150 <page> <out>`        |
//! | text      | `pdftotext -raw -nopgbrk -enc UTF-8 <page> <out>`               |
//! | SVG       | `pdftocairo -svg <page> <out>`                                  |
//! | PNG       | `pdftocairo -png -singlefile -scale-to-x <w> -scale-to-y -1 <page> <out>` |
//!
//! `pdftocairo -png -singlefile` appends `.png` to the output name itself,
//! so PNG targets are passed without their extension.

use super::pages::PageProcessor;
use super::{arg, degraded, DownloadMarkerGenerator, PresentationFlow, RenderJob, StageEnv};
use super::NO_TEXT_PLACEHOLDER;
use crate::config::secs;
use crate::document::{self, Page, Presentation};
use crate::error::{Artifact, PipelineError};
use crate::pipeline::{add, Generate, Message, Step};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Longest edge of a thumbnail in pixels.
pub const THUMBNAIL_SIZE: u32 = 150;

fn without_extension(path: &Path) -> String {
    arg(&path.with_extension(""))
}

/// Splits the presentation file into single-page PDFs and creates one
/// [`Page`] per source page.
pub struct PageGenerator {
    processor: Arc<dyn PageProcessor>,
}

impl PageGenerator {
    pub fn new(processor: Arc<dyn PageProcessor>) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl Generate<Presentation> for PageGenerator {
    async fn generate(
        &self,
        msg: Message<Presentation>,
    ) -> Result<Message<Presentation>, PipelineError> {
        let (mut pres, ctx) = msg.into_parts();
        let source = pres.file_path.clone();
        let files = self.processor.split(&ctx, &source, &pres.layout()).await?;

        if files.is_empty() {
            return Err(PipelineError::PageSplitFailed {
                path: source,
                detail: "document has no pages".into(),
            });
        }

        info!("Generated {} page files for {}", files.len(), pres.id);
        pres.pages = files
            .into_iter()
            .enumerate()
            .map(|(i, file_path)| Page {
                parent_file_path: source.clone(),
                file_path,
                num: i + 1,
                ..Page::default()
            })
            .collect();
        Ok(Message::with_context(pres, ctx))
    }
}

/// 150px PNG thumbnail per page, with the blank thumbnail as fallback.
pub struct PageThumbnailGenerator {
    env: StageEnv,
}

impl PageThumbnailGenerator {
    pub fn new(env: StageEnv) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Generate<Presentation> for PageThumbnailGenerator {
    async fn generate(
        &self,
        msg: Message<Presentation>,
    ) -> Result<Message<Presentation>, PipelineError> {
        let (mut pres, ctx) = msg.into_parts();
        let cfg = &self.env.config;
        let layout = pres.layout();

        for page in pres.pages.iter_mut() {
            let target = layout.thumbnail(page.num);
            let job = RenderJob {
                artifact: Artifact::Thumbnail,
                page: page.num,
                program: &cfg.tools.pdftocairo,
                args: vec![
                    "-png".into(),
                    "-singlefile".into(),
                    "-scale-to".into(),
                    THUMBNAIL_SIZE.to_string(),
                    arg(&page.file_path),
                    without_extension(&target),
                ],
                timeout: secs(cfg.generation.thumbnail.timeout_secs),
            };
            page.thumbnail_path = self
                .env
                .render(&ctx, job, &target, Some(cfg.generation.blank.thumbnail.as_path()))
                .await?;
        }
        Ok(Message::with_context(pres, ctx))
    }
}

/// Extracted text per page, with a placeholder text as fallback.
pub struct PageTextGenerator {
    env: StageEnv,
}

impl PageTextGenerator {
    pub fn new(env: StageEnv) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Generate<Presentation> for PageTextGenerator {
    async fn generate(
        &self,
        msg: Message<Presentation>,
    ) -> Result<Message<Presentation>, PipelineError> {
        let (mut pres, ctx) = msg.into_parts();
        let cfg = &self.env.config;
        let layout = pres.layout();

        for page in pres.pages.iter_mut() {
            let target = layout.text_file(page.num);
            let job = RenderJob {
                artifact: Artifact::TextFile,
                page: page.num,
                program: &cfg.tools.pdftotext,
                args: vec![
                    "-raw".into(),
                    "-nopgbrk".into(),
                    "-enc".into(),
                    "UTF-8".into(),
                    arg(&page.file_path),
                    arg(&target),
                ],
                timeout: secs(cfg.generation.text.timeout_secs),
            };
            page.text_file_path = match self.env.render(&ctx, job, &target, None).await? {
                Some(path) => Some(path),
                None => match document::write_text(&target, NO_TEXT_PLACEHOLDER).await {
                    Ok(()) => Some(target),
                    Err(e) => {
                        degraded(Artifact::TextFile, page.num, e);
                        None
                    }
                },
            };
        }
        Ok(Message::with_context(pres, ctx))
    }
}

/// SVG per page, with the optional blank SVG as fallback.
pub struct SvgGenerator {
    env: StageEnv,
}

impl SvgGenerator {
    pub fn new(env: StageEnv) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Generate<Presentation> for SvgGenerator {
    async fn generate(
        &self,
        msg: Message<Presentation>,
    ) -> Result<Message<Presentation>, PipelineError> {
        let cfg = &self.env.config;
        if !cfg.generation.svg.enabled {
            return Ok(msg);
        }
        let (mut pres, ctx) = msg.into_parts();
        let layout = pres.layout();

        for page in pres.pages.iter_mut() {
            let target = layout.svg(page.num);
            let job = RenderJob {
                artifact: Artifact::Svg,
                page: page.num,
                program: &cfg.tools.pdftocairo,
                args: vec!["-svg".into(), arg(&page.file_path), arg(&target)],
                timeout: secs(cfg.generation.svg.timeout_secs),
            };
            page.svg_path = self
                .env
                .render(&ctx, job, &target, cfg.generation.blank.svg.as_deref())
                .await?;
        }
        Ok(Message::with_context(pres, ctx))
    }
}

/// Full-size PNG per page, with the optional blank PNG as fallback.
pub struct PngGenerator {
    env: StageEnv,
}

impl PngGenerator {
    pub fn new(env: StageEnv) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Generate<Presentation> for PngGenerator {
    async fn generate(
        &self,
        msg: Message<Presentation>,
    ) -> Result<Message<Presentation>, PipelineError> {
        let cfg = &self.env.config;
        if !cfg.generation.png.enabled {
            return Ok(msg);
        }
        let (mut pres, ctx) = msg.into_parts();
        let layout = pres.layout();

        for page in pres.pages.iter_mut() {
            let target = layout.png(page.num);
            let job = RenderJob {
                artifact: Artifact::Png,
                page: page.num,
                program: &cfg.tools.pdftocairo,
                args: vec![
                    "-png".into(),
                    "-singlefile".into(),
                    "-scale-to-x".into(),
                    cfg.generation.png.width.to_string(),
                    "-scale-to-y".into(),
                    "-1".into(),
                    arg(&page.file_path),
                    without_extension(&target),
                ],
                timeout: secs(cfg.generation.png.timeout_secs),
            };
            page.png_path = self
                .env
                .render(&ctx, job, &target, cfg.generation.blank.png.as_deref())
                .await?;
        }
        Ok(Message::with_context(pres, ctx))
    }
}

/// Marker, page split, thumbnails, text, SVGs and PNGs for an uploaded PDF.
pub fn pdf_flow(env: &StageEnv, processor: Arc<dyn PageProcessor>) -> PresentationFlow {
    let flow = Step::generate(DownloadMarkerGenerator).into_flow();
    let flow = add(&flow, Step::generate(PageGenerator::new(processor)));
    let flow = add(&flow, Step::generate(PageThumbnailGenerator::new(env.clone())));
    let flow = add(&flow, Step::generate(PageTextGenerator::new(env.clone())));
    let flow = add(&flow, Step::generate(SvgGenerator::new(env.clone())));
    add(&flow, Step::generate(PngGenerator::new(env.clone())))
}

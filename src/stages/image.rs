//! Image flow: turn an uploaded picture into a one-page presentation.
//!
//! The thumbnail and text file are made from the image itself, before it
//! is converted to PDF. Their paths travel to [`ImagePdfTransformer`]
//! through the side channel ([`THUMBNAIL_PATH`], [`TEXT_FILE_PATH`]), which
//! builds the single [`Page`]. SVG and PNG renders then run on that page
//! through the PDF flow's generators.

use super::pdf::{PngGenerator, SvgGenerator, THUMBNAIL_SIZE};
use super::{arg, degraded, DownloadMarkerGenerator, PresentationFlow, RenderJob, StageEnv};
use super::NO_TEXT_PLACEHOLDER;
use crate::config::{secs, RenderFormat};
use crate::document::file::ensure_parent_dir;
use crate::document::{self, Page, Presentation};
use crate::error::{Artifact, PipelineError};
use crate::pipeline::{add, Generate, Key, Message, Step, Transform};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{error, info};

/// Thumbnail written by [`ThumbnailGenerator`].
pub const THUMBNAIL_PATH: Key<PathBuf> = Key::new("ThumbnailPath");

/// Text file written by [`TextFileGenerator`].
pub const TEXT_FILE_PATH: Key<PathBuf> = Key::new("TextFilePath");

fn convert_program(env: &StageEnv) -> String {
    arg(&env.config.generation.thumbnail.imagemagick_dir.join("convert"))
}

/// 150×150 thumbnail of the image via ImageMagick, with the blank
/// thumbnail as fallback.
pub struct ThumbnailGenerator {
    env: StageEnv,
}

impl ThumbnailGenerator {
    pub fn new(env: StageEnv) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Generate<Presentation> for ThumbnailGenerator {
    async fn generate(
        &self,
        msg: Message<Presentation>,
    ) -> Result<Message<Presentation>, PipelineError> {
        let cfg = &self.env.config;
        let pres = &msg.payload;
        let target = pres.layout().thumbnail(1);
        let program = convert_program(&self.env);
        let job = RenderJob {
            artifact: Artifact::Thumbnail,
            page: 1,
            program: &program,
            args: vec![
                "-thumbnail".into(),
                format!("{0}x{0}", THUMBNAIL_SIZE),
                arg(&pres.file_path),
                arg(&target),
            ],
            timeout: secs(cfg.generation.thumbnail.timeout_secs),
        };
        let thumbnail = self
            .env
            .render(
                msg.context(),
                job,
                &target,
                Some(cfg.generation.blank.thumbnail.as_path()),
            )
            .await?;

        Ok(match thumbnail {
            Some(path) => msg.with_value(THUMBNAIL_PATH, path),
            None => msg,
        })
    }
}

/// Placeholder text file: images carry no extractable text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFileGenerator;

#[async_trait]
impl Generate<Presentation> for TextFileGenerator {
    async fn generate(
        &self,
        msg: Message<Presentation>,
    ) -> Result<Message<Presentation>, PipelineError> {
        let target = msg.payload.layout().text_file(1);
        match document::write_text(&target, NO_TEXT_PLACEHOLDER).await {
            Ok(()) => Ok(msg.with_value(TEXT_FILE_PATH, target)),
            Err(e) => {
                degraded(Artifact::TextFile, 1, e);
                Ok(msg)
            }
        }
    }
}

/// Converts the image into `svgs/slide-1.pdf` and records it as page 1.
///
/// A failed conversion is logged, not returned: the page is still created
/// so the later stages can fall back to blank assets.
pub struct ImagePdfTransformer {
    env: StageEnv,
}

impl ImagePdfTransformer {
    pub fn new(env: StageEnv) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Transform<Presentation, Presentation> for ImagePdfTransformer {
    async fn transform(
        &self,
        msg: Message<Presentation>,
    ) -> Result<Message<Presentation>, PipelineError> {
        let cfg = &self.env.config;
        let timeout = cfg.generation.svg.timeout_secs;
        let pdf = msg.payload.layout().page_pdf(1);

        let outcome = match ensure_parent_dir(&pdf).await {
            Ok(()) => {
                let args = vec![
                    format!("{}s", timeout),
                    convert_program(&self.env),
                    arg(&msg.payload.file_path),
                    "-auto-orient".into(),
                    arg(&pdf),
                ];
                let wrapper = arg(&cfg.tools.run_in_systemd);
                self.env
                    .invoke(msg.context(), secs(timeout), &wrapper, &args)
                    .await
                    .map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        };
        if let Some(reason) = msg.context().err() {
            return Err(reason.into());
        }
        match outcome {
            Ok(_) => info!("Converted {} to PDF", msg.payload.file_path.display()),
            Err(e) => error!(
                "Failed to convert image {} to PDF: {}",
                msg.payload.file_path.display(),
                e
            ),
        }
        let page = Page {
            parent_file_path: msg.payload.file_path.clone(),
            file_path: pdf,
            num: 1,
            thumbnail_path: msg.value(THUMBNAIL_PATH).cloned(),
            text_file_path: msg.value(TEXT_FILE_PATH).cloned(),
            ..Page::default()
        };
        let (mut pres, ctx) = msg.into_parts();
        pres.pages = vec![page];
        Ok(Message::with_context(pres, ctx))
    }
}

/// The render step run after the first SVG pass.
fn repeat_render(env: &StageEnv) -> Step<Presentation, Presentation> {
    match env.config.generation.image_repeat_render {
        RenderFormat::Svg => Step::generate(SvgGenerator::new(env.clone())),
        RenderFormat::Png => Step::generate(PngGenerator::new(env.clone())),
    }
}

/// Marker, thumbnail, text file, PDF conversion, then SVG, repeat render
/// and PNG for an uploaded image.
pub fn image_flow(env: &StageEnv) -> PresentationFlow {
    let flow = Step::generate(DownloadMarkerGenerator).into_flow();
    let flow = add(&flow, Step::generate(ThumbnailGenerator::new(env.clone())));
    let flow = add(&flow, Step::generate(TextFileGenerator));
    let flow = add(&flow, Step::transform(ImagePdfTransformer::new(env.clone())));
    let flow = add(&flow, Step::generate(SvgGenerator::new(env.clone())));
    let flow = add(&flow, repeat_render(env));
    add(&flow, Step::generate(PngGenerator::new(env.clone())))
}

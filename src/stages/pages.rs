//! Splitting a PDF into single-page PDF files.
//!
//! The PDF flow writes one `svgs/slide-<N>.pdf` per source page before any
//! other per-page artifact is generated. Splitting goes through the
//! [`PageProcessor`] trait so the flow can be driven by a fake in tests.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a synchronous C++ library with thread-local state. The split
//! runs on tokio's blocking pool so worker threads never stall on it. The
//! context is checked between pages, so cancelling a flow stops a long split
//! at the next page boundary.

use crate::document::ArtifactLayout;
use crate::error::PipelineError;
use crate::pipeline::Context;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Writes each page of a PDF as its own file.
#[async_trait]
pub trait PageProcessor: Send + Sync {
    /// Split `source` into `layout.page_pdf(n)` files, one per page.
    ///
    /// Returns the written paths in page order; element `i` is page `i + 1`.
    async fn split(
        &self,
        ctx: &Context,
        source: &Path,
        layout: &ArtifactLayout,
    ) -> Result<Vec<PathBuf>, PipelineError>;
}

/// [`PageProcessor`] backed by pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumPageProcessor {
    library_dir: Option<PathBuf>,
}

impl PdfiumPageProcessor {
    /// Bind pdfium from `library_dir`, or from the system search path when
    /// `None` or when the library is not found there.
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self { library_dir }
    }
}

#[async_trait]
impl PageProcessor for PdfiumPageProcessor {
    async fn split(
        &self,
        ctx: &Context,
        source: &Path,
        layout: &ArtifactLayout,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        if let Some(reason) = ctx.err() {
            return Err(reason.into());
        }

        let source = source.to_path_buf();
        let layout = layout.clone();
        let library_dir = self.library_dir.clone();
        let ctx = ctx.clone();

        tokio::task::spawn_blocking(move || {
            split_blocking(&ctx, library_dir.as_deref(), &source, &layout)
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("Page split task panicked: {}", e)))?
    }
}

fn bind_pdfium(library_dir: Option<&Path>) -> Result<Pdfium, PdfiumError> {
    let bindings = match library_dir {
        Some(dir) => Pdfium::bind_to_library(&Pdfium::pdfium_platform_library_name_at_path(dir))
            .or_else(|_| Pdfium::bind_to_system_library())?,
        None => Pdfium::bind_to_system_library()?,
    };
    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of the page split.
fn split_blocking(
    ctx: &Context,
    library_dir: Option<&Path>,
    source: &Path,
    layout: &ArtifactLayout,
) -> Result<Vec<PathBuf>, PipelineError> {
    let failed = |detail: String| PipelineError::PageSplitFailed {
        path: source.to_path_buf(),
        detail,
    };

    let pdfium = bind_pdfium(library_dir).map_err(|e| failed(format!("cannot load pdfium: {:?}", e)))?;
    let document = pdfium
        .load_pdf_from_file(source, None)
        .map_err(|e| failed(format!("{:?}", e)))?;

    let total = document.pages().len();
    info!("Splitting {} ({} pages)", source.display(), total);

    if let Some(dir) = layout.page_pdf(1).parent() {
        std::fs::create_dir_all(dir).map_err(|e| failed(format!("{}: {}", dir.display(), e)))?;
    }

    let mut written = Vec::with_capacity(total as usize);
    for index in 0..total {
        if let Some(reason) = ctx.err() {
            return Err(reason.into());
        }

        let num = index as usize + 1;
        let out = layout.page_pdf(num);
        let mut single = pdfium
            .create_new_pdf()
            .map_err(|e| failed(format!("page {}: {:?}", num, e)))?;
        single
            .pages_mut()
            .copy_page_from_document(&document, index, 0)
            .map_err(|e| failed(format!("page {}: {:?}", num, e)))?;
        single
            .save_to_file(&out)
            .map_err(|e| failed(format!("{}: {:?}", out.display(), e)))?;

        debug!("Wrote page {} → {}", num, out.display());
        written.push(out);
    }

    Ok(written)
}

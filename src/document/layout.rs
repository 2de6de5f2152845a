//! Where derived artifacts live on disk.
//!
//! ```text
//! <dir>/
//!   deck.pdf
//!   abc.pdf.downloadable
//!   thumbnails/thumb-<N>.png
//!   textfiles/slide-<N>.txt
//!   svgs/slide-<N>.pdf      single-page PDF
//!   svgs/slide-<N>.svg
//!   pngs/slide-<N>.png
//! ```

use std::path::{Path, PathBuf};

/// Artifact paths relative to a presentation directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn thumbnail(&self, page: usize) -> PathBuf {
        self.root.join("thumbnails").join(format!("thumb-{}.png", page))
    }

    pub fn text_file(&self, page: usize) -> PathBuf {
        self.root.join("textfiles").join(format!("slide-{}.txt", page))
    }

    pub fn page_pdf(&self, page: usize) -> PathBuf {
        self.root.join("svgs").join(format!("slide-{}.pdf", page))
    }

    pub fn svg(&self, page: usize) -> PathBuf {
        self.root.join("svgs").join(format!("slide-{}.svg", page))
    }

    pub fn png(&self, page: usize) -> PathBuf {
        self.root.join("pngs").join(format!("slide-{}.png", page))
    }
}

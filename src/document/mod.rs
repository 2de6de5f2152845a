//! Document model: the presentation being converted and its pages.
//!
//! A [`Presentation`] is owned by exactly one flow execution at a time; it
//! moves through the pipeline inside the message payload and is mutated only
//! by the stage currently holding it.

pub mod file;
pub mod layout;

pub use file::{copy_file, is_office_file, is_pptx, make_downloadable, pdf_name, write_text};
pub use layout::ArtifactLayout;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Pod a presentation is shown in when the caller names none.
pub const DEFAULT_POD_ID: &str = "DEFAULT_PRESENTATION_POD";

/// Authorization token used for presentations uploaded before a meeting.
pub const DEFAULT_AUTHZ_TOKEN: &str = "preupload-download-authz-token";

/// An uploaded document and everything derived from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Presentation {
    /// Stable identifier for the whole conversion.
    pub id: String,
    pub temp_id: String,
    pub pod_id: String,
    pub meeting_id: String,
    /// Name the file was uploaded under.
    pub file_name: String,
    /// Current working file. Replaced by the PDF after office conversion.
    pub file_path: PathBuf,
    pub current: bool,
    pub authz_token: String,
    pub downloadable: bool,
    pub removable: bool,
    pub default: bool,
    pub url: String,
    /// Pages in order, numbered from 1.
    pub pages: Vec<Page>,
}

impl Presentation {
    /// A presentation for `file_path` in the default pod.
    pub fn new(id: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        let file_path = file_path.into();
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: id.into(),
            pod_id: DEFAULT_POD_ID.to_string(),
            authz_token: DEFAULT_AUTHZ_TOKEN.to_string(),
            file_name,
            file_path,
            ..Self::default()
        }
    }

    /// Directory holding the presentation file and its artifacts.
    pub fn dir(&self) -> &Path {
        match self.file_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }

    /// Artifact paths for this presentation.
    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(self.dir())
    }
}

/// One page of a presentation.
///
/// Derived artifact paths are `None` until generated; a page is never
/// dropped because an artifact is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// The file this page was cut from.
    pub parent_file_path: PathBuf,
    /// Single-page PDF.
    pub file_path: PathBuf,
    /// 1-based, unique within a presentation.
    pub num: usize,
    pub thumbnail_path: Option<PathBuf>,
    pub text_file_path: Option<PathBuf>,
    pub svg_path: Option<PathBuf>,
    pub png_path: Option<PathBuf>,
}

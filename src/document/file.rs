//! File helpers shared by the conversion stages.

use crate::error::PipelineError;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Extensions accepted by the office flow, lowercase without the dot.
pub const OFFICE_EXTENSIONS: [&str; 12] = [
    "doc", "docx", "odg", "odp", "ods", "odt", "ppt", "pptx", "rtf", "txt", "xls", "xlsx",
];

const MARKER_EXTENSION: &str = "downloadable";

fn extension_lowercase(path: &Path) -> Option<String> {
    path.extension()
        .and_then(OsStr::to_str)
        .map(str::to_ascii_lowercase)
}

/// Whether `path` has an office extension (case-insensitive).
pub fn is_office_file(path: &Path) -> bool {
    extension_lowercase(path).is_some_and(|ext| OFFICE_EXTENSIONS.contains(&ext.as_str()))
}

/// Whether `path` is a PowerPoint Open XML file.
pub fn is_pptx(path: &Path) -> bool {
    extension_lowercase(path).as_deref() == Some("pptx")
}

/// `a/b/c.odt` → `a/b/c.pdf`.
pub fn pdf_name(path: &Path) -> PathBuf {
    path.with_extension("pdf")
}

/// Create the directory `path` will live in.
pub(crate) async fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => tokio::fs::create_dir_all(dir).await,
        _ => Ok(()),
    }
}

/// Copy `source` to `destination`, creating the destination directory.
pub async fn copy_file(source: &Path, destination: &Path) -> io::Result<()> {
    ensure_parent_dir(destination).await?;
    tokio::fs::copy(source, destination).await?;
    Ok(())
}

/// Write `text` to `destination`, creating the destination directory.
pub async fn write_text(destination: &Path, text: &str) -> io::Result<()> {
    ensure_parent_dir(destination).await?;
    tokio::fs::write(destination, text).await
}

/// Mark `file` as downloadable for presentation `id`.
///
/// The marker is an empty file named `<id><ext>.downloadable` next to
/// `file`, e.g. `abc.pdf.downloadable`. An existing marker makes this a
/// no-op; otherwise every other marker in the directory is removed before
/// the new one is created. Returns the marker path.
pub async fn make_downloadable(id: &str, file: &Path) -> Result<PathBuf, PipelineError> {
    let dir = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let ext = file
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let marker = dir.join(format!("{}{}.{}", id, ext, MARKER_EXTENSION));

    let marker_io = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| PipelineError::MarkerIo { path, source }
    };

    if tokio::fs::try_exists(&marker).await.map_err(marker_io(&marker))? {
        return Ok(marker);
    }

    let mut entries = tokio::fs::read_dir(dir).await.map_err(marker_io(dir))?;
    while let Some(entry) = entries.next_entry().await.map_err(marker_io(dir))? {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map_err(marker_io(&path))?
            .is_file();
        if !is_file || path.extension() != Some(OsStr::new(MARKER_EXTENSION)) {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => info!("Deleted download marker {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(marker_io(&path)(e)),
        }
    }

    tokio::fs::File::create(&marker)
        .await
        .map_err(marker_io(&marker))?;
    info!("Created download marker {}", marker.display());
    Ok(marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn office_extensions_are_case_insensitive() {
        for ext in OFFICE_EXTENSIONS {
            assert!(is_office_file(Path::new(&format!("deck.{ext}"))), "{ext}");
            let upper = ext.to_ascii_uppercase();
            assert!(is_office_file(Path::new(&format!("deck.{upper}"))), "{upper}");
        }
        assert!(!is_office_file(Path::new("deck.pdf")));
        assert!(!is_office_file(Path::new("deck.png")));
        assert!(!is_office_file(Path::new("pptx")));
        assert!(is_pptx(Path::new("/a/B.PPTX")));
        assert!(!is_pptx(Path::new("/a/b.ppt")));
    }

    #[test]
    fn pdf_name_swaps_extension() {
        assert_eq!(pdf_name(Path::new("example.doc")), Path::new("example.pdf"));
        assert_eq!(pdf_name(Path::new("a/b/c.odt")), Path::new("a/b/c.pdf"));
        assert_eq!(pdf_name(Path::new("README")), Path::new("README.pdf"));
    }

    #[tokio::test]
    async fn copy_creates_destination_dir() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("blank.png");
        std::fs::write(&src, b"png").unwrap();
        let dst = dir.path().join("thumbnails/thumb-1.png");

        copy_file(&src, &dst).await.unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"png");
    }

    #[tokio::test]
    async fn copy_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = copy_file(&dir.path().join("nope"), &dir.path().join("out"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn write_text_allows_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("textfiles/slide-1.txt");
        write_text(&dst, "").await.unwrap();
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "");
    }

    #[tokio::test]
    async fn marker_replaces_previous_markers() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("deck.pdf");
        std::fs::write(&file, b"%PDF").unwrap();
        std::fs::write(dir.path().join("old.pptx.downloadable"), b"").unwrap();
        std::fs::create_dir(dir.path().join("keep.downloadable")).unwrap();

        let marker = make_downloadable("abc", &file).await.unwrap();

        assert_eq!(marker, dir.path().join("abc.pdf.downloadable"));
        assert!(marker.is_file());
        assert!(!dir.path().join("old.pptx.downloadable").exists());
        assert!(dir.path().join("keep.downloadable").is_dir());
        assert!(file.exists());
    }

    #[tokio::test]
    async fn existing_marker_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("deck.pdf");
        std::fs::write(dir.path().join("abc.pdf.downloadable"), b"").unwrap();
        std::fs::write(dir.path().join("other.pdf.downloadable"), b"").unwrap();

        make_downloadable("abc", &file).await.unwrap();

        assert!(dir.path().join("other.pdf.downloadable").exists());
    }

    #[tokio::test]
    async fn unreadable_directory_is_fatal() {
        let err = make_downloadable("abc", Path::new("/nonexistent/docflow/deck.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MarkerIo { .. }), "got: {err:?}");
        assert!(err.is_fatal());
    }
}

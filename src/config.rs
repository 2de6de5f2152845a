//! Configuration for document conversion flows.
//!
//! All tool paths, timeouts and retry budgets live in [`PipelineConfig`],
//! built via [`PipelineConfigBuilder`] or loaded from a JSON file with
//! [`PipelineConfig::from_json_file`]. The configuration is immutable once
//! built and shared between flows as `Arc<PipelineConfig>`, so concurrent
//! conversions of different presentations read the same values.
//!
//! Every section uses `#[serde(default)]`: a JSON file only needs the keys
//! it wants to change.
//!
//! ```json
//! {
//!   "conversion": { "office": { "max_attempts": 5 } },
//!   "generation": { "png": { "enabled": false } }
//! }
//! ```

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete configuration for the office, image and PDF flows.
///
/// # Example
/// ```rust
/// use docflow::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .max_attempts(5)
///     .skip_precheck(true)
///     .png_enabled(false)
///     .build()
///     .unwrap();
/// assert_eq!(config.conversion.office.max_attempts, 5);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tools: ToolsConfig,
    pub validation: ValidationConfig,
    pub conversion: ConversionConfig,
    pub generation: GenerationConfig,
}

// ── Tools ────────────────────────────────────────────────────────────────

/// Locations of the external programs the stages shell out to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// `timeout(1)`-compatible wrapper bounding the office scripts.
    pub timeout: String,

    /// Wrapper used for the image-to-PDF conversion, invoked as
    /// `<wrapper> <secs>s <program> <args…>`.
    pub run_in_systemd: PathBuf,

    /// Poppler's `pdftocairo`, used for thumbnails, SVGs and PNGs.
    pub pdftocairo: String,

    /// Poppler's `pdftotext`, used for per-page text extraction.
    pub pdftotext: String,

    /// Directory holding the pdfium shared library. `None` falls back to the
    /// system library search path.
    pub pdfium_dir: Option<PathBuf>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout: "timeout".into(),
            run_in_systemd: PathBuf::from("/usr/share/bbb-web/run-in-systemd.sh"),
            pdftocairo: "pdftocairo".into(),
            pdftotext: "pdftotext".into(),
            pdfium_dir: None,
        }
    }
}

// ── Validation ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub office: OfficeValidationConfig,
}

/// PowerPoint precheck settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfficeValidationConfig {
    /// Skip the `.pptx` precheck entirely. Default: false.
    pub skip_precheck: bool,

    /// Script invoked as `<script> <file>`.
    pub script: PathBuf,

    /// Seconds handed to the `timeout` wrapper. Default: 25.
    pub timeout_secs: u64,

    /// Hard limit on the whole invocation, wrapper included. Default: 30.
    ///
    /// Should exceed `timeout_secs` so the wrapper gets a chance to report
    /// the timeout itself.
    pub exec_timeout_secs: u64,
}

impl Default for OfficeValidationConfig {
    fn default() -> Self {
        Self {
            skip_precheck: false,
            script: PathBuf::from("/usr/share/prescan/presentation-validation.sh"),
            timeout_secs: 25,
            exec_timeout_secs: 30,
        }
    }
}

// ── Conversion ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub office: OfficeConversionConfig,
}

/// Office-to-PDF conversion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfficeConversionConfig {
    /// Script invoked as `<script> <in> <out> pdf <timeout>`.
    pub script: PathBuf,

    /// Per-attempt timeout in seconds. Default: 60.
    pub timeout_secs: u64,

    /// Maximum conversion attempts. Default: 3.
    pub max_attempts: u32,
}

impl Default for OfficeConversionConfig {
    fn default() -> Self {
        Self {
            script: PathBuf::from("/usr/share/bbb-libreoffice-conversion/convert.sh"),
            timeout_secs: 60,
            max_attempts: 3,
        }
    }
}

// ── Generation ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub thumbnail: ThumbnailConfig,
    pub text: TextConfig,
    pub svg: SvgConfig,
    pub png: PngConfig,
    pub blank: BlankAssetsConfig,

    /// Which render runs in the second pass of the image flow. Default: SVG,
    /// so the image flow renders SVG twice before the PNG pass.
    pub image_repeat_render: RenderFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Directory containing ImageMagick's `convert`. Default: `/usr/bin`.
    pub imagemagick_dir: PathBuf,

    /// Default: 10.
    pub timeout_secs: u64,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            imagemagick_dir: PathBuf::from("/usr/bin"),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Default: 10.
    pub timeout_secs: u64,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvgConfig {
    /// Default: true.
    pub enabled: bool,

    /// Also bounds the image-to-PDF conversion. Default: 60.
    pub timeout_secs: u64,
}

impl Default for SvgConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PngConfig {
    /// Default: true.
    pub enabled: bool,

    /// Output width in pixels; height keeps the aspect ratio. Default: 1200.
    pub width: u32,

    /// Default: 60.
    pub timeout_secs: u64,
}

impl Default for PngConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            width: 1200,
            timeout_secs: 60,
        }
    }
}

/// Fallback assets copied when a render fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlankAssetsConfig {
    pub thumbnail: PathBuf,
    pub svg: Option<PathBuf>,
    pub png: Option<PathBuf>,
}

impl Default for BlankAssetsConfig {
    fn default() -> Self {
        let dir = Path::new("/usr/share/bbb-web/WEB-INF/classes/blank");
        Self {
            thumbnail: dir.join("blank-thumb.png"),
            svg: Some(dir.join("blank-svg.svg")),
            png: Some(dir.join("blank-png.png")),
        }
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// A per-page render format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderFormat {
    #[default]
    Svg,
    Png,
}

impl fmt::Display for RenderFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderFormat::Svg => f.write_str("svg"),
            RenderFormat::Png => f.write_str("png"),
        }
    }
}

impl std::str::FromStr for RenderFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "svg" => Ok(RenderFormat::Svg),
            "png" => Ok(RenderFormat::Png),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown render format '{}', expected 'svg' or 'png'",
                other
            ))),
        }
    }
}

// ── Loading and validation ───────────────────────────────────────────────

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load a configuration from a JSON file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw).map_err(|e| match e {
            PipelineError::InvalidConfig(detail) => {
                PipelineError::InvalidConfig(format!("{}: {}", path.display(), detail))
            }
            other => other,
        })
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(raw: &str) -> Result<Self, PipelineError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants every flow relies on.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.conversion.office.max_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "conversion.office.max_attempts must be ≥ 1".into(),
            ));
        }
        let timeouts = [
            ("validation.office.timeout_secs", self.validation.office.timeout_secs),
            (
                "validation.office.exec_timeout_secs",
                self.validation.office.exec_timeout_secs,
            ),
            ("conversion.office.timeout_secs", self.conversion.office.timeout_secs),
            ("generation.thumbnail.timeout_secs", self.generation.thumbnail.timeout_secs),
            ("generation.text.timeout_secs", self.generation.text.timeout_secs),
            ("generation.svg.timeout_secs", self.generation.svg.timeout_secs),
            ("generation.png.timeout_secs", self.generation.png.timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(PipelineError::InvalidConfig(format!(
                "{} must be ≥ 1 second",
                name
            )));
        }
        if self.generation.png.width == 0 {
            return Err(PipelineError::InvalidConfig(
                "generation.png.width must be ≥ 1".into(),
            ));
        }
        Ok(())
    }
}

/// Seconds to a [`Duration`].
pub(crate) fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn skip_precheck(mut self, v: bool) -> Self {
        self.config.validation.office.skip_precheck = v;
        self
    }

    pub fn precheck_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.validation.office.script = path.into();
        self
    }

    pub fn conversion_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.conversion.office.script = path.into();
        self
    }

    pub fn conversion_timeout_secs(mut self, secs: u64) -> Self {
        self.config.conversion.office.timeout_secs = secs;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.conversion.office.max_attempts = n;
        self
    }

    pub fn timeout_command(mut self, program: impl Into<String>) -> Self {
        self.config.tools.timeout = program.into();
        self
    }

    pub fn run_in_systemd(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tools.run_in_systemd = path.into();
        self
    }

    pub fn pdfium_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.tools.pdfium_dir = Some(dir.into());
        self
    }

    pub fn imagemagick_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.generation.thumbnail.imagemagick_dir = dir.into();
        self
    }

    pub fn blank_thumbnail(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.generation.blank.thumbnail = path.into();
        self
    }

    pub fn blank_svg(mut self, path: Option<PathBuf>) -> Self {
        self.config.generation.blank.svg = path;
        self
    }

    pub fn blank_png(mut self, path: Option<PathBuf>) -> Self {
        self.config.generation.blank.png = path;
        self
    }

    pub fn svg_enabled(mut self, v: bool) -> Self {
        self.config.generation.svg.enabled = v;
        self
    }

    pub fn png_enabled(mut self, v: bool) -> Self {
        self.config.generation.png.enabled = v;
        self
    }

    pub fn png_width(mut self, px: u32) -> Self {
        self.config.generation.png.width = px;
        self
    }

    pub fn image_repeat_render(mut self, format: RenderFormat) -> Self {
        self.config.generation.image_repeat_render = format;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let c = PipelineConfig::default();
        c.validate().unwrap();
        assert_eq!(c.conversion.office.max_attempts, 3);
        assert_eq!(c.generation.image_repeat_render, RenderFormat::Svg);
        assert!(!c.validation.office.skip_precheck);
    }

    #[test]
    fn builder_rejects_zero_attempts() {
        let err = PipelineConfig::builder().max_attempts(0).build().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("max_attempts"), "got: {msg}");
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = PipelineConfig::builder()
            .conversion_timeout_secs(0)
            .build()
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("conversion.office.timeout_secs"), "got: {msg}");
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let c = PipelineConfig::from_json_str(
            r#"{
                "conversion": { "office": { "max_attempts": 5 } },
                "generation": { "png": { "enabled": false }, "image_repeat_render": "png" }
            }"#,
        )
        .unwrap();
        assert_eq!(c.conversion.office.max_attempts, 5);
        assert_eq!(c.conversion.office.timeout_secs, 60);
        assert!(!c.generation.png.enabled);
        assert_eq!(c.generation.png.width, 1200);
        assert_eq!(c.generation.image_repeat_render, RenderFormat::Png);
    }

    #[test]
    fn json_file_is_validated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "generation": {{ "svg": {{ "timeout_secs": 0 }} }} }}"#).unwrap();
        let err = PipelineConfig::from_json_file(file.path()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("generation.svg.timeout_secs"), "got: {msg}");
        assert!(msg.contains(&file.path().display().to_string()), "got: {msg}");
        assert_eq!(msg.matches("nvalid configuration").count(), 1, "got: {msg}");
    }

    #[test]
    fn huge_timeouts_are_accepted() {
        let c = PipelineConfig::from_json_str(
            r#"{ "generation": { "thumbnail": { "timeout_secs": 18446744073709551615 } } }"#,
        )
        .unwrap();
        assert_eq!(c.generation.thumbnail.timeout_secs, u64::MAX);
    }

    #[test]
    fn missing_file_is_invalid_config() {
        let err = PipelineConfig::from_json_file("/nonexistent/docflow.json").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn render_format_parses_case_insensitively() {
        assert_eq!("PNG".parse::<RenderFormat>().unwrap(), RenderFormat::Png);
        assert_eq!(RenderFormat::Svg.to_string(), "svg");
        assert!("jpeg".parse::<RenderFormat>().is_err());
    }
}

//! Converter configuration.
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. Stock defaults ([`ConverterConfig::default`])
//! 2. `mdprint.toml` in the working directory, or the file given by `--config`
//! 3. Command-line flags ([`Overrides`])
//!
//! Layer 2 is merged onto layer 1 as TOML tables, so a config file only
//! needs the keys it changes. Unknown keys are rejected to catch typos early.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! # input_dir = "markdown"  # Default: first existing of markdown/, md/
//! output_dir = "html"
//! max_workers = 4           # Parallel conversions (clamped to CPU cores)
//! dark_mode = false         # Initial theme of generated pages
//! # custom_css = "print.css"  # Appended after the built-in stylesheet
//!
//! [fonts]
//! primary = "BIZ UDPGothic"
//! secondary = "Hiragino Sans"
//! fallback = "Noto Sans JP"
//!
//! [colors.light]
//! text = "#1a1a1a"
//! background = "#ffffff"
//! link = "#0066cc"
//! code_background = "#f6f8fa"
//! border = "#e1e4e8"
//!
//! [colors.dark]
//! text = "#e1e1e1"
//! background = "#1a1a1a"
//! link = "#58a6ff"
//! code_background = "#2d333b"
//! border = "#30363d"
//!
//! [markdown]
//! extensions = ["extra", "nl2br", "sane_lists", "footnotes", "tables"]
//!
//! [[images.patterns]]       # Extra classification groups (none by default)
//! name = "screenshot"
//! class = "screenshot"
//! priority = 75
//! patterns = ["/screenshots?/"]     # Matched against the URL path
//! hosts = ["^shots\\.example\\.com$"] # Matched against the URL host
//! ```

use crate::classify::{ImageClassifier, PatternSpec};
use crate::markdown::Extension;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Config file looked up in the working directory when `--config` is absent.
pub const CONFIG_FILENAME: &str = "mdprint.toml";

/// Input directories tried, in order, when none is configured.
pub const DEFAULT_INPUT_DIRS: &[&str] = &["markdown", "md"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Custom CSS file not found: {}", .0.display())]
    CustomCssNotFound(PathBuf),
    #[error("Invalid regex in image pattern '{name}': {source}")]
    Pattern {
        name: String,
        source: regex::Error,
    },
}

/// Full converter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConverterConfig {
    /// Root of the Markdown tree. `None` means: probe [`DEFAULT_INPUT_DIRS`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_dir: Option<PathBuf>,
    /// Root the HTML tree is mirrored into.
    pub output_dir: PathBuf,
    /// Upper bound on parallel conversions.
    pub max_workers: usize,
    /// Initial `data-theme` of generated pages.
    pub dark_mode: bool,
    /// Stylesheet appended after the built-in CSS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_css: Option<PathBuf>,
    pub fonts: FontConfig,
    pub colors: ColorConfig,
    pub markdown: MarkdownConfig,
    pub images: ImagesConfig,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            input_dir: None,
            output_dir: PathBuf::from("html"),
            max_workers: 4,
            dark_mode: false,
            custom_css: None,
            fonts: FontConfig::default(),
            colors: ColorConfig::default(),
            markdown: MarkdownConfig::default(),
            images: ImagesConfig::default(),
        }
    }
}

/// Values supplied on the command line. `None` leaves the config value alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub max_workers: Option<usize>,
    pub custom_css: Option<PathBuf>,
    pub dark_mode: Option<bool>,
}

impl ConverterConfig {
    /// Apply command-line values on top of this config.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(dir) = overrides.input_dir {
            self.input_dir = Some(dir);
        }
        if let Some(dir) = overrides.output_dir {
            self.output_dir = dir;
        }
        if let Some(n) = overrides.max_workers {
            self.max_workers = n;
        }
        if let Some(css) = overrides.custom_css {
            self.custom_css = Some(css);
        }
        if let Some(dark) = overrides.dark_mode {
            self.dark_mode = dark;
        }
    }

    /// Validate values and referenced files.
    ///
    /// Runs before any conversion starts; a missing custom CSS file is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Validation(
                "max_workers must be greater than 0".into(),
            ));
        }
        for (key, name) in [
            ("fonts.primary", &self.fonts.primary),
            ("fonts.secondary", &self.fonts.secondary),
            ("fonts.fallback", &self.fonts.fallback),
        ] {
            if name.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        for spec in &self.images.patterns {
            let valid_class = !spec.class.is_empty()
                && spec
                    .class
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid_class {
                return Err(ConfigError::Validation(format!(
                    "images.patterns '{}': class must be a single CSS identifier",
                    spec.name
                )));
            }
            if spec.patterns.is_empty() && spec.hosts.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "images.patterns '{}': needs at least one of patterns or hosts",
                    spec.name
                )));
            }
        }
        if let Some(css) = &self.custom_css {
            if !css.exists() {
                return Err(ConfigError::CustomCssNotFound(css.clone()));
            }
        }
        Ok(())
    }

    /// Resolve the input directory: configured value, else the first existing
    /// default directory under `base`.
    pub fn resolve_input_dir(&self, base: &Path) -> Option<PathBuf> {
        match &self.input_dir {
            Some(dir) => Some(dir.clone()),
            None => DEFAULT_INPUT_DIRS
                .iter()
                .map(|d| base.join(d))
                .find(|p| p.is_dir()),
        }
    }

    /// Read the custom stylesheet, if any.
    ///
    /// Existence is checked by [`validate`](Self::validate); a read failure
    /// here is logged and yields empty CSS.
    pub fn load_custom_css(&self) -> String {
        let Some(path) = &self.custom_css else {
            return String::new();
        };
        match fs::read_to_string(path) {
            Ok(css) => css,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load custom CSS");
                String::new()
            }
        }
    }

    /// Build the image classifier: stock patterns plus `[[images.patterns]]`.
    pub fn build_classifier(&self) -> Result<ImageClassifier, ConfigError> {
        ImageClassifier::from_specs(&self.images.patterns)
            .map_err(|(name, source)| ConfigError::Pattern { name, source })
    }
}

/// Three-tier font chain; `sans-serif` is always appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FontConfig {
    pub primary: String,
    pub secondary: String,
    pub fallback: String,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            primary: "BIZ UDPGothic".to_string(),
            secondary: "Hiragino Sans".to_string(),
            fallback: "Noto Sans JP".to_string(),
        }
    }
}

impl FontConfig {
    /// CSS `font-family` value. Names containing a space are quoted.
    pub fn css_family(&self) -> String {
        [
            self.primary.as_str(),
            self.secondary.as_str(),
            self.fallback.as_str(),
            "sans-serif",
        ]
        .iter()
        .map(|f| {
            if f.contains(' ') {
                format!("\"{f}\"")
            } else {
                f.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// Color palettes for the two themes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColorConfig {
    pub light: ColorScheme,
    pub dark: ColorScheme,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            light: ColorScheme::default_light(),
            dark: ColorScheme::default_dark(),
        }
    }
}

/// One theme's palette.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColorScheme {
    pub text: String,
    pub background: String,
    pub link: String,
    /// Code blocks, table headers, blockquotes.
    pub code_background: String,
    pub border: String,
}

impl ColorScheme {
    pub fn default_light() -> Self {
        Self {
            text: "#1a1a1a".to_string(),
            background: "#ffffff".to_string(),
            link: "#0066cc".to_string(),
            code_background: "#f6f8fa".to_string(),
            border: "#e1e4e8".to_string(),
        }
    }

    pub fn default_dark() -> Self {
        Self {
            text: "#e1e1e1".to_string(),
            background: "#1a1a1a".to_string(),
            link: "#58a6ff".to_string(),
            code_background: "#2d333b".to_string(),
            border: "#30363d".to_string(),
        }
    }
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self::default_light()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarkdownConfig {
    pub extensions: Vec<Extension>,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            extensions: Extension::defaults(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Appended to the built-in badge/avatar/banner groups.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<PatternSpec>,
}

/// Resolve the effective worker count: `min(max_workers, cores)`.
pub fn effective_workers(max_workers: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    max_workers.clamp(1, cores)
}

// =============================================================================
// Loading and merging
// =============================================================================

/// Stock defaults as a TOML table, the base layer for merging.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ConverterConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key-by-key; any other overlay value replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file over the stock defaults.
///
/// Does not run [`ConverterConfig::validate`]; callers validate after
/// applying command-line overrides.
pub fn load_config_file(path: &Path) -> Result<ConverterConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let overlay: toml::Value = toml::from_str(&content)?;
    let config = merge_toml(stock_defaults_value(), overlay).try_into()?;
    Ok(config)
}

/// Load the explicit config file, else `mdprint.toml` in `cwd` if present,
/// else the stock defaults. Returns the file actually used.
pub fn load_config(
    explicit: Option<&Path>,
    cwd: &Path,
) -> Result<(ConverterConfig, Option<PathBuf>), ConfigError> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => Some(cwd.join(CONFIG_FILENAME)).filter(|p| p.exists()),
    };
    match path {
        Some(p) => Ok((load_config_file(&p)?, Some(p))),
        None => Ok((ConverterConfig::default(), None)),
    }
}

/// Fully commented stock config, printed by `mdprint gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# mdprint configuration
# =====================
# All settings are optional. Values shown below are the defaults.
# Command-line flags override anything set here.
# Unknown keys will cause an error.

# Root of the Markdown tree. When unset, the first existing of
# ./markdown and ./md is used.
# input_dir = "markdown"

# Root the HTML tree is written to (mirrors the input layout).
output_dir = "html"

# Maximum parallel conversions. Clamped to the number of CPU cores.
max_workers = 4

# Render pages in the dark theme initially. Readers can still toggle.
dark_mode = false

# Stylesheet appended after the built-in CSS; later rules win.
# custom_css = "print.css"

# ---------------------------------------------------------------------------
# Fonts (quoted automatically when the name contains a space)
# ---------------------------------------------------------------------------
[fonts]
primary = "BIZ UDPGothic"
secondary = "Hiragino Sans"
fallback = "Noto Sans JP"

# ---------------------------------------------------------------------------
# Colors - light theme (data-theme="light")
# ---------------------------------------------------------------------------
[colors.light]
text = "#1a1a1a"
background = "#ffffff"
link = "#0066cc"
code_background = "#f6f8fa"   # Code blocks, table headers, blockquotes
border = "#e1e4e8"

# ---------------------------------------------------------------------------
# Colors - dark theme (data-theme="dark")
# ---------------------------------------------------------------------------
[colors.dark]
text = "#e1e1e1"
background = "#1a1a1a"
link = "#58a6ff"
code_background = "#2d333b"
border = "#30363d"

# ---------------------------------------------------------------------------
# Markdown
# ---------------------------------------------------------------------------
[markdown]
# Available: extra, nl2br, sane_lists, footnotes, tables
extensions = ["extra", "nl2br", "sane_lists", "footnotes", "tables"]

# ---------------------------------------------------------------------------
# Image classification
# ---------------------------------------------------------------------------
# Built-in groups: badge (100), avatar (50), banner (25); anything else is
# content-image. Add groups to classify more images; the highest priority
# match wins.
#
# Keyword regexes in `patterns` see only the URL path; regexes in `hosts`
# see only the host name. A group needs at least one of the two.
#
# [[images.patterns]]
# name = "screenshot"
# class = "screenshot"
# priority = 75
# patterns = ["/screenshots?/"]
# hosts = ['^shots\.example\.com$']
"##
}

/// CSS custom properties for both themes, switched by `data-theme`.
pub fn generate_color_css(colors: &ColorConfig) -> String {
    format!(
        r#":root {{
    --color-text: {light_text};
    --color-bg: {light_bg};
    --color-link: {light_link};
    --color-code-bg: {light_code_bg};
    --color-border: {light_border};
    --shadow-sm: 0 1px 3px rgba(0,0,0,0.12);
    --shadow-md: 0 4px 6px rgba(0,0,0,0.15);
    --shadow-lg: 0 8px 24px rgba(0,0,0,0.2);
}}

[data-theme="dark"] {{
    --color-text: {dark_text};
    --color-bg: {dark_bg};
    --color-link: {dark_link};
    --color-code-bg: {dark_code_bg};
    --color-border: {dark_border};
}}"#,
        light_text = colors.light.text,
        light_bg = colors.light.background,
        light_link = colors.light.link,
        light_code_bg = colors.light.code_background,
        light_border = colors.light.border,
        dark_text = colors.dark.text,
        dark_bg = colors.dark.background,
        dark_link = colors.dark.link,
        dark_code_bg = colors.dark.code_background,
        dark_border = colors.dark.border,
    )
}

//! Conversion pipeline: read → parse & annotate → render → write.
//!
//! [`Pipeline::convert_one`] takes a single document through every stage.
//! Any stage can fail; the failure is returned as a [`ConvertError`] naming
//! the stage and the path involved, and nothing is written.
//!
//! [`Pipeline::run_batch`] discovers every `.md` file under an input root and
//! converts each one to the mirrored path under the output root:
//!
//! ```text
//! markdown/                 html/
//! ├── index.md        →     ├── index.html
//! └── guide/                └── guide/
//!     └── setup.md    →         └── setup.html
//! ```
//!
//! A document that fails is recorded in [`ConversionStatus`] and the batch
//! moves on. Only problems with the roots themselves (missing input
//! directory, output directory that cannot be created) abort the run.
//!
//! Documents are converted in parallel on the rayon pool. Results are
//! collected in discovery order and folded into the status on the calling
//! thread, so the report is the same as a sequential run.

use crate::annotate::{ANNOTATOR_PRIORITY, ImageAnnotator};
use crate::classify::ImageClassifier;
use crate::config::{ColorConfig, ConfigError, ConverterConfig};
use crate::markdown::{Converter, Extension, ProcessError};
use crate::template::{self, RenderConfig};
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::string::FromUtf8Error;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};
use walkdir::WalkDir;

/// Failure of a single document. Recorded, never fatal to a batch.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("{} is not valid UTF-8: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: FromUtf8Error,
    },
    #[error("failed to convert markdown: {0}")]
    Markdown(#[from] ProcessError),
    #[error("{} is not inside {}", path.display(), root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Failure that stops a whole batch.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("input directory not found: {}", .0.display())]
    InputDirMissing(PathBuf),
    #[error("cannot create output directory {}: {source}", path.display())]
    OutputDir { path: PathBuf, source: io::Error },
    #[error("failed to scan input directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Counters and per-file errors for one batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversionStatus {
    pub total: usize,
    pub success: usize,
    /// Source path → error message.
    #[serde(serialize_with = "serialize_errors")]
    pub errors: BTreeMap<PathBuf, String>,
}

/// Paths are written with `display()`, so names that are not valid UTF-8
/// still serialize.
fn serialize_errors<S: Serializer>(
    errors: &BTreeMap<PathBuf, String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(errors.iter().map(|(path, msg)| (path.display().to_string(), msg)))
}

impl ConversionStatus {
    pub fn failed(&self) -> usize {
        self.errors.len()
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    fn record(&mut self, source: &Path, result: &Result<PathBuf, ConvertError>) {
        match result {
            Ok(_) => self.success += 1,
            Err(e) => {
                self.errors.insert(source.to_path_buf(), e.to_string());
            }
        }
    }

    /// Status as a JSON object, including the derived failure count.
    pub fn to_json(&self) -> serde_json::Value {
        let errors: serde_json::Map<String, serde_json::Value> = self
            .errors
            .iter()
            .map(|(path, msg)| (path.display().to_string(), msg.as_str().into()))
            .collect();
        serde_json::json!({
            "total": self.total,
            "success": self.success,
            "failed": self.failed(),
            "errors": errors,
        })
    }
}

/// Outcome of one document in a batch, for display.
#[derive(Debug)]
pub struct DocumentOutcome {
    pub source: PathBuf,
    /// Path relative to the input root.
    pub relative: PathBuf,
    pub result: Result<PathBuf, ConvertError>,
}

/// Result of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub status: ConversionStatus,
    /// In discovery order.
    pub outcomes: Vec<DocumentOutcome>,
}

/// Page settings shared by every document of a run.
#[derive(Debug, Clone, Default)]
pub struct PageSettings {
    pub dark_mode: bool,
    pub custom_css: String,
    pub font_family: Option<String>,
    pub colors: ColorConfig,
}

/// Converts documents with one classifier and one set of page settings.
pub struct Pipeline {
    converter: Converter,
    page: PageSettings,
}

impl Pipeline {
    /// Build a pipeline with the image annotator registered on `classifier`.
    pub fn new(
        extensions: &[Extension],
        classifier: Arc<ImageClassifier>,
        page: PageSettings,
    ) -> Self {
        let mut converter = Converter::new(extensions);
        converter.register(
            Box::new(ImageAnnotator::new(classifier)),
            ANNOTATOR_PRIORITY,
        );
        Self { converter, page }
    }

    /// Build a pipeline from a validated config.
    ///
    /// Reads the custom CSS once and compiles the image patterns.
    pub fn from_config(config: &ConverterConfig) -> Result<Self, ConfigError> {
        let classifier = Arc::new(config.build_classifier()?);
        let page = PageSettings {
            dark_mode: config.dark_mode,
            custom_css: config.load_custom_css(),
            font_family: Some(config.fonts.css_family()),
            colors: config.colors.clone(),
        };
        Ok(Self::new(&config.markdown.extensions, classifier, page))
    }

    /// Convert Markdown text to a complete page.
    pub fn render_page(&self, title: &str, markdown: &str) -> Result<String, ProcessError> {
        let body = self.converter.convert(markdown)?;
        let config = RenderConfig {
            title: title.to_string(),
            body,
            dark_mode: self.page.dark_mode,
            custom_css: self.page.custom_css.clone(),
            font_family: self.page.font_family.clone(),
            colors: self.page.colors.clone(),
        };
        Ok(template::render(&config))
    }

    /// Convert `source` and write the page to `output`.
    ///
    /// The page title is the source file stem. Parent directories of
    /// `output` are created as needed.
    pub fn convert_one(&self, source: &Path, output: &Path) -> Result<PathBuf, ConvertError> {
        let bytes = fs::read(source).map_err(|e| ConvertError::Read {
            path: source.to_path_buf(),
            source: e,
        })?;
        let text = String::from_utf8(bytes).map_err(|e| ConvertError::Decode {
            path: source.to_path_buf(),
            source: e,
        })?;

        let title = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let page = self.render_page(&title, &text)?;

        let write_err = |e| ConvertError::Write {
            path: output.to_path_buf(),
            source: e,
        };
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(output, page).map_err(write_err)?;

        debug!(source = %source.display(), output = %output.display(), "wrote page");
        Ok(output.to_path_buf())
    }

    /// Convert a single file outside of a batch.
    ///
    /// With `output_dir`, the page is written there under the source's file
    /// name; otherwise next to the source. Only the extension changes.
    pub fn convert_file(
        &self,
        source: &Path,
        output_dir: Option<&Path>,
    ) -> Result<PathBuf, ConvertError> {
        let output = match output_dir {
            Some(dir) => dir.join(source.file_name().unwrap_or_default()),
            None => source.to_path_buf(),
        }
        .with_extension("html");
        let result = self.convert_one(source, &output);
        match &result {
            Ok(_) => info!(file = %source.display(), "converted"),
            Err(e) => error!(file = %source.display(), error = %e, "conversion failed"),
        }
        result
    }

    /// Convert every `.md` file under `input_root` into `output_root`.
    pub fn run_batch(
        &self,
        input_root: &Path,
        output_root: &Path,
    ) -> Result<BatchReport, BatchError> {
        let sources = discover(input_root)?;
        self.convert_all(input_root, output_root, &sources)
    }

    /// Convert already-discovered `sources` under `input_root` into
    /// `output_root`.
    pub fn convert_all(
        &self,
        input_root: &Path,
        output_root: &Path,
        sources: &[PathBuf],
    ) -> Result<BatchReport, BatchError> {
        fs::create_dir_all(output_root).map_err(|e| BatchError::OutputDir {
            path: output_root.to_path_buf(),
            source: e,
        })?;

        let outcomes: Vec<DocumentOutcome> = sources
            .par_iter()
            .map(|source| {
                let relative = source
                    .strip_prefix(input_root)
                    .unwrap_or(source)
                    .to_path_buf();
                let result = output_path_for(input_root, output_root, source)
                    .and_then(|output| self.convert_one(source, &output));
                match &result {
                    Ok(_) => info!(file = %relative.display(), "converted"),
                    Err(e) => error!(file = %relative.display(), error = %e, "conversion failed"),
                }
                DocumentOutcome {
                    source: source.clone(),
                    relative,
                    result,
                }
            })
            .collect();

        let mut status = ConversionStatus {
            total: outcomes.len(),
            ..ConversionStatus::default()
        };
        for outcome in &outcomes {
            status.record(&outcome.source, &outcome.result);
        }
        Ok(BatchReport { status, outcomes })
    }
}

/// All `.md` files under `root`, recursively, sorted by path.
pub fn discover(root: &Path) -> Result<Vec<PathBuf>, BatchError> {
    if !root.is_dir() {
        return Err(BatchError::InputDirMissing(root.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|e| e == "md") {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Mirror `source` from `input_root` into `output_root` with an `.html`
/// extension.
pub fn output_path_for(
    input_root: &Path,
    output_root: &Path,
    source: &Path,
) -> Result<PathBuf, ConvertError> {
    let relative = source
        .strip_prefix(input_root)
        .map_err(|_| ConvertError::OutsideRoot {
            path: source.to_path_buf(),
            root: input_root.to_path_buf(),
        })?;
    Ok(output_root.join(relative).with_extension("html"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    fn pipeline() -> Pipeline {
        Pipeline::from_config(&ConverterConfig::default()).unwrap()
    }

    #[test]
    fn output_path_mirrors_relative_path() {
        let out = output_path_for(
            Path::new("markdown"),
            Path::new("html"),
            Path::new("markdown/guide/setup.md"),
        )
        .unwrap();
        assert_eq!(out, PathBuf::from("html/guide/setup.html"));
    }

    #[test]
    fn output_path_leaves_markdown_named_segments_alone() {
        let out = output_path_for(
            Path::new("docs"),
            Path::new("site"),
            Path::new("docs/markdown-tips/markdown.md"),
        )
        .unwrap();
        assert_eq!(out, PathBuf::from("site/markdown-tips/markdown.html"));
    }

    #[test]
    fn output_path_outside_root_is_error() {
        let err = output_path_for(Path::new("a"), Path::new("b"), Path::new("c/x.md"));
        assert!(matches!(err, Err(ConvertError::OutsideRoot { .. })));
    }

    #[test]
    fn discover_finds_md_recursively_sorted() {
        let tmp = write_tree(&[
            ("b.md", "# B"),
            ("a.md", "# A"),
            ("notes.txt", "skip"),
            ("sub/c.md", "# C"),
            ("sub/deeper/d.MD.bak", "skip"),
        ]);
        let files = discover(tmp.path()).unwrap();
        let names = relative_names(tmp.path(), &files);
        assert_eq!(names, vec!["a.md", "b.md", "sub/c.md"]);
    }

    #[test]
    fn discover_missing_root_is_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = discover(&tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, BatchError::InputDirMissing(_)));
    }

    #[test]
    fn convert_one_writes_page_with_stem_title() {
        let tmp = write_tree(&[("src/intro.md", "# Hello\n\n![logo](images/logo.png)")]);
        let source = tmp.path().join("src/intro.md");
        let output = tmp.path().join("out/nested/intro.html");

        let written = pipeline().convert_one(&source, &output).unwrap();
        assert_eq!(written, output);

        let html = fs::read_to_string(&output).unwrap();
        assert!(html.contains("<title>intro</title>"));
        assert!(html.contains("<h1>Hello</h1>"));
        assert_eq!(img_class(&html, "images/logo.png").as_deref(), Some("banner"));
    }

    #[test]
    fn convert_one_applies_size_directive() {
        let tmp = write_tree(&[("doc.md", "![Flow chart {: .size-medium }](figs/flow.png)")]);
        let output = tmp.path().join("doc.html");
        pipeline()
            .convert_one(&tmp.path().join("doc.md"), &output)
            .unwrap();

        let html = fs::read_to_string(&output).unwrap();
        assert_eq!(img_alt(&html, "figs/flow.png"), "Flow chart");
        assert_eq!(
            img_class(&html, "figs/flow.png").as_deref(),
            Some("content-image img-medium")
        );
    }

    #[test]
    fn convert_one_missing_file_is_read_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = pipeline()
            .convert_one(&tmp.path().join("missing.md"), &tmp.path().join("x.html"))
            .unwrap_err();
        assert!(matches!(err, ConvertError::Read { .. }));
    }

    #[test]
    fn convert_one_invalid_utf8_is_decode_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("bad.md");
        fs::write(&source, [0xff, 0xfe, 0x00, 0x80]).unwrap();
        let output = tmp.path().join("bad.html");
        let err = pipeline().convert_one(&source, &output).unwrap_err();
        assert!(matches!(err, ConvertError::Decode { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn convert_one_unwritable_output_is_write_error() {
        let tmp = write_tree(&[("a.md", "text"), ("blocker", "a file, not a dir")]);
        let err = pipeline()
            .convert_one(&tmp.path().join("a.md"), &tmp.path().join("blocker/a.html"))
            .unwrap_err();
        assert!(matches!(err, ConvertError::Write { .. }));
    }

    #[test]
    fn convert_file_defaults_to_sibling_output() {
        let tmp = write_tree(&[("markdown/readme.md", "hi")]);
        let source = tmp.path().join("markdown/readme.md");
        let out = pipeline().convert_file(&source, None).unwrap();
        assert_eq!(out, tmp.path().join("markdown/readme.html"));
        assert!(out.exists());
    }

    #[test]
    fn convert_file_into_output_dir() {
        let tmp = write_tree(&[("notes/todo.md", "- item")]);
        let source = tmp.path().join("notes/todo.md");
        let dir = tmp.path().join("html");
        let out = pipeline().convert_file(&source, Some(&dir)).unwrap();
        assert_eq!(out, dir.join("todo.html"));
    }

    #[test]
    fn pipeline_applies_page_settings() {
        let config = ConverterConfig {
            dark_mode: true,
            ..ConverterConfig::default()
        };
        let page = Pipeline::from_config(&config)
            .unwrap()
            .render_page("t", "body")
            .unwrap();
        assert!(page.contains(r#"data-theme="dark""#));
        assert!(page.contains("\"BIZ UDPGothic\""));
    }

    #[test]
    fn batch_records_successes_and_failures() {
        let tmp = write_tree(&[("in/good.md", "# Good"), ("in/sub/other.md", "ok")]);
        fs::write(tmp.path().join("in/bad.md"), [0xc3, 0x28]).unwrap();

        let report = pipeline()
            .run_batch(&tmp.path().join("in"), &tmp.path().join("out"))
            .unwrap();

        assert_eq!(report.status.total, 3);
        assert_eq!(report.status.success, 2);
        assert_eq!(report.status.failed(), 1);
        assert!(!report.status.is_success());
        assert!(report.status.errors.contains_key(&tmp.path().join("in/bad.md")));
        assert!(tmp.path().join("out/good.html").exists());
        assert!(tmp.path().join("out/sub/other.html").exists());
        assert!(!tmp.path().join("out/bad.html").exists());

        let order: Vec<_> = report.outcomes.iter().map(|o| o.relative.clone()).collect();
        assert_eq!(
            order,
            vec![
                PathBuf::from("bad.md"),
                PathBuf::from("good.md"),
                PathBuf::from("sub/other.md")
            ]
        );
    }

    #[test]
    fn batch_with_no_documents_is_empty_success() {
        let tmp = write_tree(&[("in/readme.txt", "not markdown")]);
        let report = pipeline()
            .run_batch(&tmp.path().join("in"), &tmp.path().join("out"))
            .unwrap();
        assert_eq!(report.status.total, 0);
        assert!(report.status.is_success());
    }

    #[test]
    fn batch_missing_input_is_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = pipeline()
            .run_batch(&tmp.path().join("missing"), &tmp.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, BatchError::InputDirMissing(_)));
    }

    // Linux file systems accept arbitrary bytes in names; APFS does not.
    #[cfg(target_os = "linux")]
    #[test]
    fn status_json_survives_non_utf8_file_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = write_tree(&[("in/good.md", "# Good")]);
        let bad = tmp
            .path()
            .join("in")
            .join(OsStr::from_bytes(b"bad\xff.md"));
        fs::write(&bad, [0xff, 0xfe]).unwrap();

        let report = pipeline()
            .run_batch(&tmp.path().join("in"), &tmp.path().join("out"))
            .unwrap();
        assert_eq!(report.status.failed(), 1);

        let json = report.status.to_json();
        assert_eq!(json["failed"], 1);
        let errors = json["errors"].as_object().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors.keys().all(|k| k.contains("bad")));

        let serialized = serde_json::to_value(&report.status).unwrap();
        assert_eq!(serialized["errors"].as_object().unwrap().len(), 1);
    }

    #[test]
    fn status_json_includes_failed_count() {
        let mut status = ConversionStatus {
            total: 2,
            success: 1,
            ..ConversionStatus::default()
        };
        status
            .errors
            .insert(PathBuf::from("a.md"), "boom".to_string());
        let json = status.to_json();
        assert_eq!(json["failed"], 1);
        assert_eq!(json["errors"]["a.md"], "boom");
    }
}

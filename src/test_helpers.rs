//! Shared test utilities.
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = write_tree(&[("in/a.md", "# A"), ("in/sub/b.md", "![x](logo.png)")]);
//! let html = std::fs::read_to_string(tmp.path().join("out/sub/b.html")).unwrap();
//! assert_eq!(img_class(&html, "logo.png").as_deref(), Some("banner"));
//! ```

use regex::Regex;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// =========================================================================
// Fixture setup
// =========================================================================

/// Create a temp directory holding `files` as `(relative path, contents)`.
pub fn write_tree(files: &[(&str, &str)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    for (rel, contents) in files {
        let path = tmp.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
    }
    tmp
}

/// Paths relative to `root`, `/`-separated, in the given order.
pub fn relative_names(root: &Path, paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| {
            p.strip_prefix(root)
                .unwrap_or_else(|_| panic!("{} not under {}", p.display(), root.display()))
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .collect()
}

// =========================================================================
// HTML inspection
// =========================================================================

/// The `class` attribute of the first `<img>` whose `src` equals `src`.
///
/// `None` if the image has no class. Panics if no such image exists.
pub fn img_class(html: &str, src: &str) -> Option<String> {
    let tag = img_tag(html, src);
    let class = Regex::new(r#"\bclass="([^"]*)""#).unwrap();
    class.captures(&tag).map(|c| c[1].to_string())
}

/// The `alt` attribute of the first `<img>` whose `src` equals `src`.
pub fn img_alt(html: &str, src: &str) -> String {
    let tag = img_tag(html, src);
    let alt = Regex::new(r#"\balt="([^"]*)""#).unwrap();
    alt.captures(&tag)
        .map(|c| c[1].to_string())
        .unwrap_or_default()
}

fn img_tag(html: &str, src: &str) -> String {
    let tags = Regex::new(r"<img\b[^>]*>").unwrap();
    let needle = format!(r#"src="{src}""#);
    tags.find_iter(html)
        .map(|m| m.as_str())
        .find(|t| t.contains(&needle))
        .unwrap_or_else(|| panic!("no <img> with {needle} in:\n{html}"))
        .to_string()
}

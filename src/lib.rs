//! # mdprint
//!
//! Batch-converts a directory of Markdown into styled, printable HTML pages
//! tuned for Japanese typography. Each output page is self-contained: inline
//! CSS with light and dark themes, A4 print rules, and a floating print /
//! theme-toggle control.
//!
//! # Architecture: One Pass Per Document
//!
//! ```text
//! read .md  →  parse (pulldown-cmark)  →  tree processors  →  serialize  →  template  →  write .html
//!                                         └ ImageAnnotator
//!                                            └ ImageClassifier (cached)
//! ```
//!
//! Each document goes through the whole pipeline on its own; the only shared
//! state is the classifier's URL cache. A failing document is recorded and
//! the batch continues.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`classify`] | Image URL → semantic CSS class (`badge`, `avatar`, `banner`, `content-image`) |
//! | [`annotate`] | The [`TreeProcessor`](annotate::TreeProcessor) hook and the image annotator |
//! | [`markdown`] | Event stream → document tree with image nodes → HTML fragment |
//! | [`template`] | HTML fragment → complete page (CSS, theme script, utility buttons) |
//! | [`convert`] | Per-document pipeline, discovery, batch driver, conversion status |
//! | [`config`] | `mdprint.toml` loading, merging, validation, and palette CSS |
//! | [`output`] | CLI output formatting: start banner, result tree, summary |
//!
//! # Design Decisions
//!
//! ## Images Become Nodes
//!
//! pulldown-cmark emits images as a span of events with the alt text spread
//! across `Text` events. The [`markdown::Document`] folds each span into one
//! [`annotate::ImageNode`] so processors see `src`, `alt`, `title` and
//! `class` as plain attributes, then writes it back as inline HTML.
//!
//! ## Explicit Classifier Ownership
//!
//! The classifier and its cache are created by the caller and shared with
//! the pipeline through `Arc`. Two pipelines never share a cache unless the
//! caller hands them the same classifier.
//!
//! ## Deterministic Output
//!
//! Class tokens are written in sorted order and the template has no
//! timestamps, so identical input yields byte-identical pages.

pub mod annotate;
pub mod classify;
pub mod config;
pub mod convert;
pub mod markdown;
pub mod output;
pub mod template;

#[cfg(test)]
pub(crate) mod test_helpers;

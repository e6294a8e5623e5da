//! Post-parse image annotation.
//!
//! [`ImageAnnotator`] is a [`TreeProcessor`]: it runs over a parsed
//! [`Document`] after inline elements exist and before HTML serialization,
//! rewriting the attributes of each image node in document order:
//!
//! 1. Existing `class` tokens are kept (deduplicated).
//! 2. The semantic class from [`ImageClassifier`] is added.
//! 3. A size directive in the alt text (`{: .size-large }`) adds `img-large`
//!    and is removed from the visible alt.
//! 4. Tokens are written back sorted, so output never depends on set order.
//!
//! Running the annotator twice over the same node leaves it unchanged after
//! the first pass.

use crate::classify::ImageClassifier;
use crate::markdown::{Document, ProcessError};
use maud::{Markup, html};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Priority the annotator registers at. Higher-priority processors run first.
pub const ANNOTATOR_PRIORITY: i32 = 15;

static SIZE_DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{:[^}]*?size-(small|medium|large)[^}]*\}").unwrap());

static DIRECTIVE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{:[^}]*\}").unwrap());

#[derive(Error, Debug, PartialEq)]
pub enum AnnotateError {
    #[error("class token {0:?} contains characters not allowed in a class attribute")]
    InvalidClassToken(String),
}

/// A post-parse hook over the document tree.
///
/// Implementations mutate the document in place. Returning an error fails
/// the conversion of the whole document.
pub trait TreeProcessor: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self, document: &mut Document<'_>) -> Result<(), ProcessError>;
}

/// Attributes of one `<img>` element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageNode {
    pub src: String,
    pub alt: String,
    pub title: String,
    /// Space-separated class tokens.
    pub class: String,
}

impl ImageNode {
    pub fn new(src: impl Into<String>, alt: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            alt: alt.into(),
            ..Self::default()
        }
    }

    /// Non-empty class tokens.
    pub fn class_tokens(&self) -> BTreeSet<&str> {
        self.class.split_whitespace().collect()
    }

    pub fn has_class(&self, token: &str) -> bool {
        self.class.split_whitespace().any(|t| t == token)
    }

    /// Serialize as an `<img>` element. Attribute values are escaped.
    pub fn to_markup(&self) -> Markup {
        let title = (!self.title.is_empty()).then_some(self.title.as_str());
        let class = (!self.class.is_empty()).then_some(self.class.as_str());
        html! {
            img src=(self.src) alt=(self.alt) title=[title] class=[class];
        }
    }
}

/// Assigns semantic and size classes to every image in a document.
pub struct ImageAnnotator {
    classifier: Arc<ImageClassifier>,
}

impl ImageAnnotator {
    pub fn new(classifier: Arc<ImageClassifier>) -> Self {
        Self { classifier }
    }

    /// Annotate a single node in place.
    ///
    /// On error the node is left untouched.
    pub fn annotate(&self, node: &mut ImageNode) -> Result<(), AnnotateError> {
        let mut classes: BTreeSet<String> = BTreeSet::new();
        for token in node.class.split_whitespace() {
            validate_token(token)?;
            classes.insert(token.to_string());
        }

        classes.insert(self.classifier.classify(&node.src));

        let mut alt = None;
        if let Some(caps) = SIZE_DIRECTIVE.captures(&node.alt) {
            classes.insert(format!("img-{}", &caps[1]));
            alt = Some(DIRECTIVE_BLOCK.replace_all(&node.alt, "").trim().to_string());
        }

        if let Some(alt) = alt {
            node.alt = alt;
        }
        node.class = classes.into_iter().collect::<Vec<_>>().join(" ");
        Ok(())
    }
}

impl TreeProcessor for ImageAnnotator {
    fn name(&self) -> &str {
        "image_class"
    }

    fn run(&self, document: &mut Document<'_>) -> Result<(), ProcessError> {
        for node in document.images_mut() {
            match self.annotate(node) {
                Ok(()) => debug!(src = %node.src, class = %node.class, "annotated image"),
                Err(e) => warn!(src = %node.src, error = %e, "skipping image annotation"),
            }
        }
        Ok(())
    }
}

fn validate_token(token: &str) -> Result<(), AnnotateError> {
    if token.contains(['"', '\'', '<', '>', '&']) || token.chars().any(char::is_control) {
        return Err(AnnotateError::InvalidClassToken(token.to_string()));
    }
    Ok(())
}

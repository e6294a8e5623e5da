//! Markdown to HTML conversion with post-parse tree processing.
//!
//! pulldown-cmark produces a flat event stream. To give tree processors a
//! stable surface, [`Document::parse`] folds each image's event span
//! (`Start(Image)` … alt text … `End(Image)`) into a single [`ImageNode`];
//! every other event is kept as-is. After the registered processors have run,
//! [`Document::into_html`] serializes the image nodes back as inline HTML and
//! hands the whole stream to pulldown-cmark's HTML writer.
//!
//! ## Extensions
//!
//! | Name | Effect |
//! |------|--------|
//! | `tables` | GFM tables |
//! | `footnotes` | `[^1]` references and definitions |
//! | `nl2br` | single newlines inside a paragraph become `<br />` |
//! | `sane_lists` | accepted; CommonMark already separates ordered and bullet lists |
//! | `extra` | tables, footnotes, definition lists, heading attributes, strikethrough |

use crate::annotate::{ImageNode, TreeProcessor};
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd, html as md_html};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("tree processor '{processor}' failed: {message}")]
pub struct ProcessError {
    pub processor: String,
    pub message: String,
}

/// Named Markdown extension, as written in `[markdown] extensions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extension {
    Extra,
    Nl2br,
    SaneLists,
    Footnotes,
    Tables,
}

impl Extension {
    /// The stock extension set.
    pub fn defaults() -> Vec<Extension> {
        vec![
            Extension::Extra,
            Extension::Nl2br,
            Extension::SaneLists,
            Extension::Footnotes,
            Extension::Tables,
        ]
    }
}

/// Parser options plus the soft-break rewrite, derived from an extension list.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionSet {
    options: Options,
    hard_breaks: bool,
}

impl ExtensionSet {
    pub fn from_extensions(extensions: &[Extension]) -> Self {
        let mut options = Options::empty();
        let mut hard_breaks = false;
        for ext in extensions {
            match ext {
                Extension::Extra => {
                    options.insert(Options::ENABLE_TABLES);
                    options.insert(Options::ENABLE_FOOTNOTES);
                    options.insert(Options::ENABLE_DEFINITION_LIST);
                    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
                    options.insert(Options::ENABLE_STRIKETHROUGH);
                }
                Extension::Nl2br => hard_breaks = true,
                Extension::SaneLists => {}
                Extension::Footnotes => options.insert(Options::ENABLE_FOOTNOTES),
                Extension::Tables => options.insert(Options::ENABLE_TABLES),
            }
        }
        Self {
            options,
            hard_breaks,
        }
    }
}

/// One entry of the document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node<'a> {
    Event(Event<'a>),
    Image(ImageNode),
}

/// A parsed document whose images are addressable nodes.
#[derive(Debug, Clone, Default)]
pub struct Document<'a> {
    nodes: Vec<Node<'a>>,
}

impl<'a> Document<'a> {
    /// Parse `text`, folding image spans into [`ImageNode`]s.
    pub fn parse(text: &'a str, extensions: ExtensionSet) -> Self {
        let mut nodes = Vec::new();
        // The image currently being collected and how many images deep we are.
        // Nested images contribute only their alt text, as in pulldown-cmark.
        let mut current: Option<ImageNode> = None;
        let mut depth = 0usize;

        for event in Parser::new_ext(text, extensions.options) {
            let Some(node) = current.as_mut() else {
                match event {
                    Event::Start(Tag::Image {
                        dest_url, title, ..
                    }) => {
                        current = Some(ImageNode {
                            src: dest_url.into_string(),
                            title: title.into_string(),
                            ..ImageNode::default()
                        });
                        depth = 1;
                    }
                    Event::SoftBreak if extensions.hard_breaks => {
                        nodes.push(Node::Event(Event::HardBreak));
                    }
                    event => nodes.push(Node::Event(event)),
                }
                continue;
            };

            match event {
                Event::Start(Tag::Image { .. }) => depth += 1,
                Event::End(TagEnd::Image) => {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(image) = current.take() {
                            nodes.push(Node::Image(image));
                        }
                    }
                }
                event => push_alt_text(&mut node.alt, event),
            }
        }
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Node<'a>] {
        &self.nodes
    }

    /// Image nodes in document order.
    pub fn images(&self) -> impl Iterator<Item = &ImageNode> {
        self.nodes.iter().filter_map(|n| match n {
            Node::Image(img) => Some(img),
            Node::Event(_) => None,
        })
    }

    /// Mutable image nodes in document order.
    pub fn images_mut(&mut self) -> impl Iterator<Item = &mut ImageNode> {
        self.nodes.iter_mut().filter_map(|n| match n {
            Node::Image(img) => Some(img),
            Node::Event(_) => None,
        })
    }

    /// Serialize to an HTML fragment.
    pub fn into_html(self) -> String {
        let events = self.nodes.into_iter().map(|node| match node {
            Node::Event(event) => event,
            Node::Image(img) => Event::InlineHtml(CowStr::from(img.to_markup().into_string())),
        });
        let mut out = String::new();
        md_html::push_html(&mut out, events);
        out
    }
}

fn push_alt_text(alt: &mut String, event: Event<'_>) {
    match event {
        Event::Text(text)
        | Event::Code(text)
        | Event::InlineMath(text)
        | Event::DisplayMath(text)
        | Event::Html(text)
        | Event::InlineHtml(text)
        | Event::FootnoteReference(text) => alt.push_str(&text),
        Event::SoftBreak | Event::HardBreak => alt.push(' '),
        _ => {}
    }
}

/// Markdown converter with an ordered set of tree processors.
pub struct Converter {
    extensions: ExtensionSet,
    processors: Vec<(i32, Box<dyn TreeProcessor>)>,
}

impl Converter {
    pub fn new(extensions: &[Extension]) -> Self {
        Self {
            extensions: ExtensionSet::from_extensions(extensions),
            processors: Vec::new(),
        }
    }

    /// Register a processor. Higher priority runs first; equal priorities run
    /// in registration order.
    pub fn register(&mut self, processor: Box<dyn TreeProcessor>, priority: i32) {
        let at = self
            .processors
            .iter()
            .position(|(p, _)| *p < priority)
            .unwrap_or(self.processors.len());
        self.processors.insert(at, (priority, processor));
    }

    /// Processor names in run order.
    pub fn processor_names(&self) -> Vec<&str> {
        self.processors.iter().map(|(_, p)| p.name()).collect()
    }

    /// Convert Markdown text to an HTML fragment.
    pub fn convert(&self, text: &str) -> Result<String, ProcessError> {
        let mut document = Document::parse(text, self.extensions);
        for (_, processor) in &self.processors {
            processor.run(&mut document)?;
        }
        Ok(document.into_html())
    }
}

//! Page template: wraps a converted HTML fragment into a complete document.
//!
//! The generated page is self-contained: one inline `<style>` block, the body
//! fragment, two floating utility buttons (print, theme toggle) and a small
//! inline script. Nothing is fetched at view time.
//!
//! ## Stylesheet Order
//!
//! ```text
//! 1. Theme variables     :root / [data-theme="dark"]   (from [colors])
//! 2. Body font           font-family chain             (from [fonts])
//! 3. Base stylesheet     static/style.css              (typography, images, print, mobile)
//! 4. Custom CSS          --custom-css file, verbatim
//! ```
//!
//! Custom CSS comes last, so for equal selectors its declarations win.
//!
//! ## Theme
//!
//! `<html data-theme>` starts as `dark` or `light` from the dark-mode flag.
//! The inline script (`static/theme.js`) lets the reader toggle it and
//! remembers the choice in `localStorage`.
//!
//! Rendering is a pure function of [`RenderConfig`]: no timestamps, no I/O.
//! The title and body are inserted without escaping; the caller provides
//! safe values.

use crate::config::{self, ColorConfig};
use maud::{DOCTYPE, Markup, PreEscaped, html};

const BASE_CSS: &str = include_str!("../static/style.css");
const THEME_JS: &str = include_str!("../static/theme.js");

const PRINT_ICON_PATH: &str = "M19 8H5c-1.66 0-3 1.34-3 3v6h4v4h12v-4h4v-6c0-1.66-1.34-3-3-3zm-3 11H8v-5h8v5zm3-7c-.55 0-1-.45-1-1s.45-1 1-1 1 .45 1 1-.45 1-1 1zm-1-9H6v4h12V3z";

/// Font chain used when the caller supplies none.
pub const DEFAULT_FONT_FAMILY: &str =
    r#""BIZ UDPGothic", "Hiragino Sans", "Noto Sans JP", sans-serif"#;

/// Everything needed to render one page.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub title: String,
    /// Converted HTML fragment, inserted verbatim.
    pub body: String,
    pub dark_mode: bool,
    /// Appended after the base stylesheet.
    pub custom_css: String,
    /// Complete CSS `font-family` value. `None` uses [`DEFAULT_FONT_FAMILY`].
    pub font_family: Option<String>,
    pub colors: ColorConfig,
}

impl RenderConfig {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            dark_mode: false,
            custom_css: String::new(),
            font_family: None,
            colors: ColorConfig::default(),
        }
    }

    /// Value of the root `data-theme` attribute.
    pub fn theme(&self) -> &'static str {
        if self.dark_mode { "dark" } else { "light" }
    }
}

/// Render a complete HTML document.
pub fn render(config: &RenderConfig) -> String {
    page(config).into_string()
}

/// The full `<style>` contents, in cascade order.
pub fn compose_css(config: &RenderConfig) -> String {
    let font_family = config
        .font_family
        .as_deref()
        .unwrap_or(DEFAULT_FONT_FAMILY);
    format!(
        "{colors}\n\nbody {{\n    font-family: {font_family};\n}}\n\n{BASE_CSS}\n{custom}",
        colors = config::generate_color_css(&config.colors),
        custom = config.custom_css,
    )
}

fn page(config: &RenderConfig) -> Markup {
    html! {
        (DOCTYPE)
        html lang="ja" data-theme=(config.theme()) {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (PreEscaped(&config.title)) }
                style { (PreEscaped(compose_css(config))) }
            }
            body {
                (utility_buttons())
                (PreEscaped(&config.body))
                script { (PreEscaped(THEME_JS)) }
            }
        }
    }
}

/// Floating print and theme-toggle buttons. Hidden when printing.
fn utility_buttons() -> Markup {
    html! {
        div.utility-buttons {
            button.utility-button onclick="window.print()" aria-label="印刷" {
                svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24" {
                    path d=(PRINT_ICON_PATH) {}
                }
            }
            button.utility-button onclick="toggleTheme()" aria-label="テーマ切り替え" { "🌓" }
        }
    }
}

//! Image classification by URL.
//!
//! Every `<img>` in a converted document gets one semantic CSS class that
//! drives how the stylesheet sizes it:
//!
//! | Class | Meaning | Typical source |
//! |-------|---------|----------------|
//! | `badge` | small inline status icon | shields.io, CI, package registries, `.svg` |
//! | `avatar` | circular profile picture | GitHub avatars, Gravatar |
//! | `banner` | wide decorative header | paths with `banner`, `logo`, `header` |
//! | `content-image` | everything else | photos, diagrams, screenshots |
//!
//! ## Pattern Table
//!
//! Classes are resolved from an ordered table of [`ImagePattern`]s. Each pattern
//! is a group of case-insensitive regexes; a group matches when *any* of its
//! regexes matches. Groups are tried in descending priority and the first match
//! wins, so a shields.io badge hosted under `/logo/` is still a badge.
//!
//! The stock table is declared as data in [`DEFAULT_PATTERNS`]. Extra groups
//! from `[[images.patterns]]` in the config file are appended to it by
//! [`ImageClassifier::from_specs`]; the matching logic never changes.
//!
//! ## What Gets Matched
//!
//! A group carries two regex sets:
//!
//! ```text
//! https://img.shields.io/badge/build.svg?style=flat
//!         └─── host ───┘└──── path ────┘
//!          hosts regexes  paths regexes
//! ```
//!
//! Keyword regexes (`badge`, `logo`, `\.svg$`, ...) only ever see the path,
//! so `https://build.example.com/photos/cat.jpg` stays a content image.
//! Both parts are lower-cased; query string and fragment are dropped.
//! Relative references (`images/logo.png`) have an empty host. URLs that fail
//! to parse for any other reason classify as `content-image` with a warning;
//! classification itself never fails.
//!
//! ## Cache
//!
//! Results are memoized per raw URL string in a cache owned by the classifier
//! instance. The cache lives as long as the classifier, which the pipeline
//! creates once per run and shares by `Arc`.

use regex::{RegexSet, RegexSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;
use url::Url;

/// Class assigned when no pattern matches or the URL cannot be read.
pub const DEFAULT_CLASS: &str = "content-image";

/// Declarative description of a pattern group.
///
/// Used for `[[images.patterns]]` entries in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternSpec {
    pub name: String,
    /// CSS class applied when the group matches.
    pub class: String,
    /// Higher runs first. Ties keep registration order.
    #[serde(default)]
    pub priority: i32,
    /// Regexes matched against the URL path.
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Regexes matched against the URL host.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
}

/// A built-in pattern group.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinPattern {
    pub name: &'static str,
    pub class: &'static str,
    pub priority: i32,
    pub hosts: &'static [&'static str],
    pub paths: &'static [&'static str],
}

pub const DEFAULT_PATTERNS: &[BuiltinPattern] = &[
    BuiltinPattern {
        name: "badge",
        class: "badge",
        priority: 100,
        hosts: &[
            r"(^|\.)shields\.io$",
            r"(^|\.)crates\.io$",
            r"(^|\.)pypi\.org$",
            r"(^|\.)zenodo\.org$",
        ],
        paths: &[
            r"crates\.io",
            r"pypi",
            r"zenodo",
            r"badge",
            r"shields\.io",
            r"passing",
            r"build",
            r"status",
            r"version",
            r"doi",
            r"\.svg$",
        ],
    },
    BuiltinPattern {
        name: "avatar",
        class: "avatar",
        priority: 50,
        hosts: &[r"^avatars\.[^.]+\.com$", r"(^|\.)gravatar\.com$"],
        paths: &[r"/avatar/"],
    },
    BuiltinPattern {
        name: "banner",
        class: "banner",
        priority: 25,
        hosts: &[],
        paths: &[r"/banner/", r"banner\.", r"logo", r"header"],
    },
];

/// A compiled pattern group. Immutable once built.
#[derive(Debug, Clone)]
pub struct ImagePattern {
    pub name: String,
    pub css_class: String,
    pub priority: i32,
    hosts: RegexSet,
    paths: RegexSet,
}

fn compile_set<I, S>(patterns: I) -> Result<RegexSet, regex::Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    RegexSetBuilder::new(patterns).case_insensitive(true).build()
}

impl ImagePattern {
    /// Compile a group of path regexes (case-insensitive) into a pattern.
    pub fn compile<I, S>(
        name: &str,
        paths: I,
        css_class: &str,
        priority: i32,
    ) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            name: name.to_string(),
            css_class: css_class.to_string(),
            priority,
            hosts: RegexSet::empty(),
            paths: compile_set(paths)?,
        })
    }

    /// Add host regexes to the group.
    pub fn with_hosts<I, S>(mut self, hosts: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.hosts = compile_set(hosts)?;
        Ok(self)
    }

    /// Compile from a declarative spec.
    pub fn from_spec(spec: &PatternSpec) -> Result<Self, regex::Error> {
        Self::compile(&spec.name, &spec.patterns, &spec.class, spec.priority)?
            .with_hosts(&spec.hosts)
    }

    /// True if any host regex matches `host` or any path regex matches `path`.
    pub fn matches(&self, host: &str, path: &str) -> bool {
        (!host.is_empty() && self.hosts.is_match(host)) || self.paths.is_match(path)
    }
}

/// The stock pattern table, compiled.
pub fn default_patterns() -> Vec<ImagePattern> {
    DEFAULT_PATTERNS
        .iter()
        .map(|p| {
            ImagePattern::compile(p.name, p.paths, p.class, p.priority)
                .and_then(|pattern| pattern.with_hosts(p.hosts))
                .expect("built-in image patterns must compile")
        })
        .collect()
}

/// Maps image URLs to CSS classes, memoizing results.
#[derive(Debug)]
pub struct ImageClassifier {
    patterns: Vec<ImagePattern>,
    cache: Mutex<HashMap<String, String>>,
}

impl Default for ImageClassifier {
    fn default() -> Self {
        Self::new(default_patterns())
    }
}

impl ImageClassifier {
    /// Build a classifier over `patterns`, ordered by descending priority.
    ///
    /// The sort is stable, so groups with equal priority are tried in the
    /// order given.
    pub fn new(mut patterns: Vec<ImagePattern>) -> Self {
        patterns.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self {
            patterns,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Stock table plus user-supplied groups.
    ///
    /// Returns the name of the offending group alongside the regex error.
    pub fn from_specs(extra: &[PatternSpec]) -> Result<Self, (String, regex::Error)> {
        let mut patterns = default_patterns();
        for spec in extra {
            let pattern = ImagePattern::from_spec(spec).map_err(|e| (spec.name.clone(), e))?;
            patterns.push(pattern);
        }
        Ok(Self::new(patterns))
    }

    /// Patterns in evaluation order.
    pub fn patterns(&self) -> &[ImagePattern] {
        &self.patterns
    }

    /// Resolve the CSS class for an image URL.
    ///
    /// Never fails: empty or unparseable URLs yield [`DEFAULT_CLASS`].
    pub fn classify(&self, src: &str) -> String {
        if src.is_empty() {
            return DEFAULT_CLASS.to_string();
        }

        if let Some(hit) = self.lock_cache().get(src) {
            return hit.clone();
        }

        let (host, path) = match split_url(src) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(src, error = %e, "could not parse image URL, using default class");
                return DEFAULT_CLASS.to_string();
            }
        };

        let class = self
            .patterns
            .iter()
            .find(|p| p.matches(&host, &path))
            .map(|p| p.css_class.clone())
            .unwrap_or_else(|| DEFAULT_CLASS.to_string());

        self.lock_cache().insert(src.to_string(), class.clone());
        class
    }

    /// Number of memoized URLs.
    pub fn cached_len(&self) -> usize {
        self.lock_cache().len()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Split a URL into lower-cased `(host, path)`.
fn split_url(src: &str) -> Result<(String, String), url::ParseError> {
    match Url::parse(src) {
        Ok(url) => Ok((
            url.host_str().unwrap_or("").to_lowercase(),
            url.path().to_lowercase(),
        )),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let end = src.find(['?', '#']).unwrap_or(src.len());
            Ok((String::new(), src[..end].to_lowercase()))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(url: &str) -> String {
        ImageClassifier::default().classify(url)
    }

    #[test]
    fn shields_badge_is_badge() {
        assert_eq!(
            classify("https://img.shields.io/badge/build-passing-green.svg"),
            "badge"
        );
    }

    #[test]
    fn badge_keywords_are_case_insensitive() {
        assert_eq!(classify("https://IMG.SHIELDS.IO/foo.png"), "badge");
        assert_eq!(classify("https://example.com/img/Badge.png"), "badge");
        assert_eq!(classify("https://example.com/img/diagram.SVG"), "badge");
    }

    #[test]
    fn badge_wins_over_banner_and_avatar() {
        assert_eq!(classify("https://example.com/banner/build.png"), "badge");
        assert_eq!(classify("https://example.com/avatar/logo.svg"), "badge");
    }

    #[test]
    fn avatar_hosts_and_paths() {
        assert_eq!(
            classify("https://avatars.githubusercontent.com/u/12345?v=4"),
            "avatar"
        );
        assert_eq!(classify("https://www.gravatar.com/avatar/abc"), "avatar");
        assert_eq!(classify("./assets/Avatar/me.png"), "avatar");
    }

    #[test]
    fn banner_paths() {
        assert_eq!(classify("https://example.com/images/logo.png"), "banner");
        assert_eq!(classify("images/header.png"), "banner");
        assert_eq!(classify("/img/banner.jpg"), "banner");
    }

    #[test]
    fn unmatched_and_empty_fall_back_to_content_image() {
        assert_eq!(classify("https://example.com/photos/cat.jpg"), DEFAULT_CLASS);
        assert_eq!(classify("cat.png"), DEFAULT_CLASS);
        assert_eq!(classify(""), DEFAULT_CLASS);
    }

    #[test]
    fn keyword_hosts_do_not_classify_plain_photos() {
        assert_eq!(classify("https://build.example.com/photos/cat.jpg"), DEFAULT_CLASS);
        assert_eq!(classify("https://cdn.logoipsum.com/photos/cat.jpg"), DEFAULT_CLASS);
        assert_eq!(classify("https://status.example.org/team.png"), DEFAULT_CLASS);
        assert_eq!(classify("https://header-images.net/a.jpg"), DEFAULT_CLASS);
    }

    #[test]
    fn host_patterns_match_only_the_host() {
        assert_eq!(classify("https://img.shields.io/foo.png"), "badge");
        assert_eq!(classify("https://secure.gravatar.com/u/1.png"), "avatar");
        // Host names appearing in a path are not hosts.
        assert_eq!(classify("https://example.com/avatars.githubusercontent.com/a.png"), DEFAULT_CLASS);
        assert_eq!(classify("https://notshields.io/a.png"), DEFAULT_CLASS);
    }

    #[test]
    fn query_and_fragment_are_ignored() {
        assert_eq!(classify("https://example.com/cat.jpg?style=badge"), DEFAULT_CLASS);
        assert_eq!(classify("photos/cat.jpg#logo"), DEFAULT_CLASS);
    }

    #[test]
    fn unparseable_url_falls_back_without_caching() {
        let classifier = ImageClassifier::default();
        assert_eq!(classifier.classify("http://[::1"), DEFAULT_CLASS);
        assert_eq!(classifier.cached_len(), 0);
    }

    #[test]
    fn repeated_lookup_is_consistent_and_cached_once() {
        let classifier = ImageClassifier::default();
        let url = "https://example.com/images/logo.png";
        let first = classifier.classify(url);
        let second = classifier.classify(url);
        assert_eq!(first, second);
        assert_eq!(classifier.cached_len(), 1);
    }

    #[test]
    fn caches_are_per_instance() {
        let a = ImageClassifier::default();
        let b = ImageClassifier::default();
        a.classify("https://example.com/cat.jpg");
        assert_eq!(a.cached_len(), 1);
        assert_eq!(b.cached_len(), 0);
    }

    #[test]
    fn patterns_sorted_by_descending_priority() {
        let classifier = ImageClassifier::default();
        let names: Vec<&str> = classifier.patterns().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["badge", "avatar", "banner"]);
    }

    #[test]
    fn equal_priority_keeps_registration_order() {
        let first = ImagePattern::compile("first", ["cat"], "first", 10).unwrap();
        let second = ImagePattern::compile("second", ["cat"], "second", 10).unwrap();
        let classifier = ImageClassifier::new(vec![first, second]);
        assert_eq!(classifier.classify("cat.png"), "first");
    }

    #[test]
    fn user_patterns_extend_default_table() {
        let extra = PatternSpec {
            name: "screenshot".to_string(),
            class: "screenshot".to_string(),
            priority: 75,
            patterns: vec![r"/screenshots?/".to_string()],
            hosts: Vec::new(),
        };
        let classifier = ImageClassifier::from_specs(&[extra]).unwrap();
        assert_eq!(classifier.classify("docs/screenshots/home.png"), "screenshot");
        // Badge still outranks the new group.
        assert_eq!(classifier.classify("docs/screenshots/status.png"), "badge");
    }

    #[test]
    fn user_host_patterns_match_hosts() {
        let extra = PatternSpec {
            name: "cdn-avatar".to_string(),
            class: "avatar".to_string(),
            priority: 60,
            patterns: Vec::new(),
            hosts: vec![r"^people\.example\.com$".to_string()],
        };
        let classifier = ImageClassifier::from_specs(&[extra]).unwrap();
        assert_eq!(classifier.classify("https://people.example.com/u/7.jpg"), "avatar");
        assert_eq!(classifier.classify("https://example.com/people.example.com/7.jpg"), DEFAULT_CLASS);
    }

    #[test]
    fn invalid_user_pattern_reports_group_name() {
        let extra = PatternSpec {
            name: "broken".to_string(),
            class: "broken".to_string(),
            priority: 1,
            patterns: vec!["(".to_string()],
            hosts: Vec::new(),
        };
        let (name, _) = ImageClassifier::from_specs(&[extra]).unwrap_err();
        assert_eq!(name, "broken");
    }
}

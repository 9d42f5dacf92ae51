//! Markdown to sanitized HTML for anything users write.

use std::collections::{HashMap, HashSet};

use ammonia::Builder;
use once_cell::sync::Lazy;
use pulldown_cmark::{html, Event, Options, Parser};

const TAGS: &[&str] = &[
    "p", "pre", "code", "h1", "h2", "h3", "h4", "h5", "h6", "strong", "em", "b", "i", "abbr", "acronym",
    "ul", "ol", "li", "blockquote", "br", "img", "a", "table", "thead", "tbody", "tr", "th", "td",
];

const TAG_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("a", &["href", "title"]),
    ("img", &["src", "alt", "title"]),
    ("abbr", &["title"]),
    ("acronym", &["title"]),
];

static SANITIZER: Lazy<Builder<'static>> = Lazy::new(|| {
    let attrs: HashMap<&str, HashSet<&str>> = TAG_ATTRIBUTES
        .iter()
        .map(|(tag, list)| (*tag, list.iter().copied().collect()))
        .collect();
    let mut b = Builder::default();
    b.tags(TAGS.iter().copied().collect())
        .tag_attributes(attrs)
        .generic_attributes(HashSet::new())
        .link_rel(Some("noopener noreferrer nofollow"));
    b
});

/// Renders fenced code, tables and lists; a single newline is a line break.
pub fn markdown_to_html(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    let parser = Parser::new_ext(text, options).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });
    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    SANITIZER.clean(&out).to_string()
}

//! Single forward pass over the `<title>`, `<meta>` and `<link>` elements of an
//! untrusted page.
//!
//! The markup goes through html5ever (via scraper), which never rejects input:
//! unclosed tags, stray attributes and missing `<head>` all still produce
//! events. Callers only see [`HeadEvent`]s, in document order.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

static HEAD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title, meta, link").expect("Failed to compile head selector"));

/// A `<meta>` tag's interesting attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTag<'a> {
    pub name: Option<&'a str>,
    pub property: Option<&'a str>,
    pub content: Option<&'a str>,
}

impl MetaTag<'_> {
    /// `property` takes precedence over `name`, lowercased.
    pub fn key(&self) -> String {
        self.property
            .filter(|p| !p.is_empty())
            .or(self.name)
            .unwrap_or_default()
            .to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadEvent<'a> {
    /// text content of one `<title>` element
    Title(String),
    Meta(MetaTag<'a>),
    /// `href` of a `<link rel="canonical">`
    Canonical(&'a str),
}

pub trait HeadVisitor {
    fn visit(&mut self, event: HeadEvent<'_>);
}

fn is_canonical(element: &ElementRef) -> bool {
    element
        .value()
        .attr("rel")
        .map(|rel| {
            rel.split_ascii_whitespace()
                .any(|token| token.eq_ignore_ascii_case("canonical"))
        })
        .unwrap_or(false)
}

/// Parses `html` and feeds every head event to `visitor`.
pub fn scan_head<V: HeadVisitor>(html: &str, visitor: &mut V) {
    let document = Html::parse_document(html);

    for element in document.select(&HEAD_SELECTOR) {
        let value = element.value();
        match value.name() {
            "title" => visitor.visit(HeadEvent::Title(element.text().collect())),
            "meta" => visitor.visit(HeadEvent::Meta(MetaTag {
                name: value.attr("name"),
                property: value.attr("property"),
                content: value.attr("content"),
            })),
            "link" if is_canonical(&element) => {
                if let Some(href) = value.attr("href") {
                    visitor.visit(HeadEvent::Canonical(href));
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl HeadVisitor for Recorder {
        fn visit(&mut self, event: HeadEvent<'_>) {
            let line = match event {
                HeadEvent::Title(text) => format!("title:{text}"),
                HeadEvent::Meta(tag) => format!("meta:{}={}", tag.key(), tag.content.unwrap_or("-")),
                HeadEvent::Canonical(href) => format!("canonical:{href}"),
            };
            self.0.push(line);
        }
    }

    fn scan(html: &str) -> Vec<String> {
        let mut rec = Recorder::default();
        scan_head(html, &mut rec);
        rec.0
    }

    #[test]
    fn test_events_in_document_order() {
        let events = scan(
            r#"<html><head>
            <meta property="og:title" content="A">
            <title>T</title>
            <link rel="canonical" href="https://x/c">
            <meta name="description" content="D">
            </head></html>"#,
        );
        assert_eq!(
            events,
            vec![
                "meta:og:title=A",
                "title:T",
                "canonical:https://x/c",
                "meta:description=D",
            ]
        );
    }

    #[test]
    fn test_malformed_markup() {
        let events = scan(
            r#"<title>Broken <b>page<meta property=og:image content=http://x/i.jpg><div><p>"#,
        );
        // title is RCDATA, so everything up to EOF is its text
        assert_eq!(events.len(), 1);
        assert!(events[0].starts_with("title:Broken <b>page"));

        let events = scan(r#"<meta name=twitter:card content=summary><body><meta property="og:type" content="article">"#);
        assert_eq!(events, vec!["meta:twitter:card=summary", "meta:og:type=article"]);
    }

    #[test]
    fn test_meta_key_is_case_insensitive() {
        let events = scan(r#"<META PROPERTY="OG:Title" CONTENT="x">"#);
        assert_eq!(events, vec!["meta:og:title=x"]);
    }

    #[test]
    fn test_only_canonical_links() {
        let events = scan(
            r#"<link rel="icon" href="/f.ico"><link rel="Canonical" href="/c"><link rel="alternate canonical" href="/d"><link rel="canonical">"#,
        );
        assert_eq!(events, vec!["canonical:/c", "canonical:/d"]);
    }

    #[test]
    fn test_title_text_is_concatenated() {
        let events = scan("<title>a &amp; b</title>");
        assert_eq!(events, vec!["title:a & b"]);
    }
}

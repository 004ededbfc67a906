use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::metadata::parse::{scan_head, HeadEvent, HeadVisitor};
use crate::metadata::types::{
    PageMetadata, CARD_SUMMARY, CARD_SUMMARY_LARGE_IMAGE, DEFAULT_OG_TYPE,
};

/// Last resort when the parser saw no title at all.
static TITLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title>(.*?)</title>").expect("Failed to compile title regex"));

/// Everything the head scan observed, keyed by lowercased meta name/property.
#[derive(Debug, Default)]
pub struct Collected {
    pub title: String,
    pub meta: HashMap<String, String>,
    pub canonical: Option<String>,
}

impl HeadVisitor for Collected {
    fn visit(&mut self, event: HeadEvent<'_>) {
        match event {
            HeadEvent::Title(text) => self.title.push_str(&text),
            HeadEvent::Meta(tag) => {
                let content = match tag.content {
                    Some(c) if !c.is_empty() => c,
                    _ => return,
                };
                self.meta.insert(tag.key(), content.to_string());
            }
            HeadEvent::Canonical(href) => self.canonical = Some(href.to_string()),
        }
    }
}

impl Collected {
    pub fn from_html(html: &str) -> Self {
        let mut collected = Self::default();
        scan_head(html, &mut collected);
        collected
    }

    /// First non-empty value among `keys`.
    fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|key| self.meta.get(*key))
            .map(String::as_str)
            .find(|value| !value.is_empty())
    }
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value).filter(|v| !v.is_empty())
}

impl PageMetadata {
    /// Derives preview metadata from a page body.
    ///
    /// Never fails: anything the page does not declare falls back to a
    /// default or to `target`.
    pub fn from_html(html: &str, target: &str) -> Self {
        let collected = Collected::from_html(html);

        let mut title = collected
            .first_of(&["og:title", "twitter:title"])
            .or_else(|| non_empty(&collected.title))
            .unwrap_or_default()
            .to_string();

        if title.is_empty() {
            if let Some(caps) = TITLE_REGEX.captures(html) {
                title = caps[1].trim().to_string();
            }
        }

        let description = collected
            .first_of(&["og:description", "twitter:description", "description"])
            .unwrap_or_default()
            .to_string();

        let image = collected
            .first_of(&["og:image", "twitter:image"])
            .unwrap_or_default()
            .to_string();

        let og_type = collected
            .first_of(&["og:type"])
            .unwrap_or(DEFAULT_OG_TYPE)
            .to_string();

        let og_url = collected
            .first_of(&["og:url"])
            .unwrap_or(target)
            .to_string();

        let twitter_card = match collected.first_of(&["twitter:card"]) {
            Some(card) => card.to_string(),
            None if !image.is_empty() => CARD_SUMMARY_LARGE_IMAGE.to_string(),
            None => CARD_SUMMARY.to_string(),
        };

        let canonical = collected
            .canonical
            .as_deref()
            .and_then(non_empty)
            .or_else(|| non_empty(&og_url))
            .unwrap_or(target)
            .to_string();

        Self {
            title,
            description,
            image,
            og_type,
            og_url,
            twitter_card,
            canonical,
        }
    }
}

//! Turns an incoming request into the absolute destination URL.
//!
//! An explicit `?target=` always wins. Otherwise the (trailing-slash stripped)
//! path is matched against the short-link table: built-in rules first, then
//! any rules appended from `config.yaml`.

use std::{fmt::Display, ops::Deref};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// An absolute destination URL, produced once per request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct ResolvedTarget(String);

impl ResolvedTarget {
    /// Wraps `url`, rejecting the empty string.
    pub fn new(url: impl Into<String>) -> Option<Self> {
        let url = url.into();
        if url.is_empty() {
            return None;
        }
        Some(Self(url))
    }
}

impl Display for ResolvedTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Deref for ResolvedTarget {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<ResolvedTarget> for String {
    fn from(fr: ResolvedTarget) -> Self {
        fr.0
    }
}

/// A short-link rule as written in `config.yaml`.
///
/// `pattern` is matched against the whole normalized path, `template` may
/// reference capture groups as `$1`, `$2`, `${name}`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ShortLinkConfig {
    pub pattern: String,
    pub template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ShortLink {
    pattern: Regex,
    template: String,
}

impl ShortLink {
    pub fn new(pattern: &str, template: &str) -> Result<Self, regex::Error> {
        // anchor the whole path so `/p/x/y` never half-matches
        let anchored = format!(
            "^(?:{})$",
            pattern.trim_start_matches('^').trim_end_matches('$')
        );
        Ok(Self {
            pattern: Regex::new(&anchored)?,
            template: template.to_string(),
        })
    }

    fn expand(&self, path: &str) -> Option<String> {
        let caps = self.pattern.captures(path)?;
        let mut out = String::new();
        caps.expand(&self.template, &mut out);
        Some(out)
    }
}

impl TryFrom<&ShortLinkConfig> for ShortLink {
    type Error = regex::Error;

    fn try_from(cfg: &ShortLinkConfig) -> Result<Self, Self::Error> {
        ShortLink::new(&cfg.pattern, &cfg.template)
    }
}

static BUILTIN_SHORT_LINKS: Lazy<Vec<ShortLink>> = Lazy::new(|| {
    vec![
        ShortLink::new(
            r"/p/([A-Za-z0-9_-]+)",
            "https://www.instagram.com/p/${1}/",
        )
        .expect("Failed to compile post short-link regex"),
        ShortLink::new(
            r"/reels?/([A-Za-z0-9_-]+)",
            "https://www.instagram.com/reel/${1}/",
        )
        .expect("Failed to compile reel short-link regex"),
    ]
});

/// Strips trailing slashes; the root path stays `/`.
pub fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Returns the first value of `key` in a raw query string, form-decoded.
pub fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[derive(Clone, Debug)]
pub struct Resolver {
    extra: Vec<ShortLink>,
}

impl Resolver {
    pub fn new(extra: Vec<ShortLink>) -> Self {
        Self { extra }
    }

    pub fn from_config(rules: &[ShortLinkConfig]) -> Result<Self, regex::Error> {
        let extra = rules
            .iter()
            .map(ShortLink::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(extra))
    }

    pub fn resolve(&self, path: &str, query: Option<&str>) -> Option<ResolvedTarget> {
        if let Some(target) = query_param(query, "target").and_then(ResolvedTarget::new) {
            return Some(target);
        }

        let path = normalize_path(path);
        BUILTIN_SHORT_LINKS
            .iter()
            .chain(self.extra.iter())
            .find_map(|rule| rule.expand(path))
            .and_then(ResolvedTarget::new)
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(path: &str, query: Option<&str>) -> Option<String> {
        Resolver::default().resolve(path, query).map(Into::into)
    }

    #[test]
    fn test_target_param_is_returned_verbatim() {
        assert_eq!(
            resolve("/", Some("target=https://example.com")),
            Some("https://example.com".into())
        );
        assert_eq!(
            resolve("/p/ABC", Some("target=not%20a%20url")),
            Some("not a url".into())
        );
        assert_eq!(
            resolve("/", Some("target=https%3A%2F%2Fexample.com%2F%3Fa%3D1%26b%3D2")),
            Some("https://example.com/?a=1&b=2".into())
        );
    }

    #[test]
    fn test_first_target_param_wins() {
        assert_eq!(
            resolve("/", Some("target=https://a.example&target=https://b.example")),
            Some("https://a.example".into())
        );
    }

    #[test]
    fn test_empty_target_falls_through() {
        assert_eq!(
            resolve("/p/ABC123", Some("target=")),
            Some("https://www.instagram.com/p/ABC123/".into())
        );
        assert_eq!(resolve("/", Some("target=")), None);
    }

    #[test]
    fn test_post_short_link() {
        assert_eq!(
            resolve("/p/ABC123", None),
            Some("https://www.instagram.com/p/ABC123/".into())
        );
        assert_eq!(
            resolve("/p/a_b-C9/", None),
            Some("https://www.instagram.com/p/a_b-C9/".into())
        );
        assert_eq!(resolve("/p/", None), None);
        assert_eq!(resolve("/p/abc/def", None), None);
        assert_eq!(resolve("/p/abc.def", None), None);
    }

    #[test]
    fn test_post_id_appears_once() {
        let url = resolve("/p/xyz", None).unwrap();
        assert_eq!(url.matches("xyz").count(), 1);
        assert!(url.ends_with('/'));
    }

    #[test]
    fn test_reel_short_link_singular_and_plural() {
        assert_eq!(
            resolve("/reel/Cx9", None),
            Some("https://www.instagram.com/reel/Cx9/".into())
        );
        assert_eq!(
            resolve("/reels/Cx9//", None),
            Some("https://www.instagram.com/reel/Cx9/".into())
        );
        assert_eq!(resolve("/reelz/Cx9", None), None);
    }

    #[test]
    fn test_no_target() {
        assert_eq!(resolve("/foo", None), None);
        assert_eq!(resolve("/", None), None);
        assert_eq!(resolve("", Some("preview=1")), None);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("///"), "/");
        assert_eq!(normalize_path("/_logs/"), "/_logs");
        assert_eq!(normalize_path("/a/b"), "/a/b");
    }

    #[test]
    fn test_configured_short_links_are_appended() {
        let resolver = Resolver::from_config(&[ShortLinkConfig {
            pattern: r"/tv/([A-Za-z0-9_-]+)".into(),
            template: "https://www.instagram.com/tv/$1/".into(),
            comment: None,
        }])
        .unwrap();

        assert_eq!(
            resolver.resolve("/tv/abc/", None).map(String::from),
            Some("https://www.instagram.com/tv/abc/".into())
        );
        // built-ins still come first
        assert_eq!(
            resolver.resolve("/p/abc", None).map(String::from),
            Some("https://www.instagram.com/p/abc/".into())
        );
    }

    #[test]
    fn test_configured_rule_with_two_captures() {
        let resolver = Resolver::from_config(&[ShortLinkConfig {
            pattern: r"/stories/([a-z0-9_.]+)/([0-9]+)".into(),
            template: "https://www.instagram.com/stories/${1}/${2}/".into(),
            comment: Some("stories".into()),
        }])
        .unwrap();

        assert_eq!(
            resolver.resolve("/stories/some.user/123", None).map(String::from),
            Some("https://www.instagram.com/stories/some.user/123/".into())
        );
    }

    #[test]
    fn test_invalid_configured_pattern() {
        assert!(Resolver::from_config(&[ShortLinkConfig {
            pattern: "/x/(".into(),
            template: "$1".into(),
            comment: None,
        }])
        .is_err());
    }
}

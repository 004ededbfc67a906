//! Synthesizes the page served to unfurl bots.
//!
//! The document only carries metadata and an immediate refresh to the target.
//! Everything interpolated is attacker-influenced; maud escapes all of it.

use maud::{html, Markup, DOCTYPE};

use crate::metadata::PageMetadata;

pub fn preview_markup(meta: &PageMetadata, target: &str) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                link rel="canonical" href=(meta.canonical);
                title { (meta.title) }
                meta name="description" content=(meta.description);

                meta property="og:title" content=(meta.title);
                meta property="og:description" content=(meta.description);
                meta property="og:type" content=(meta.og_type);
                meta property="og:url" content=(meta.og_url);
                @if meta.has_image() {
                    meta property="og:image" content=(meta.image);
                }

                meta name="twitter:card" content=(meta.twitter_card);
                meta name="twitter:title" content=(meta.title);
                meta name="twitter:description" content=(meta.description);
                @if meta.has_image() {
                    meta name="twitter:image" content=(meta.image);
                }

                meta http-equiv="refresh" content=(format!("0; url={target}"));
            }
            body {
                "If you are not redirected, "
                a href=(target) { "continue to the original page" }
                "."
            }
        }
    }
}

pub fn render_preview(meta: &PageMetadata, target: &str) -> String {
    preview_markup(meta, target).into_string()
}

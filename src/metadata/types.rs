use serde::{Deserialize, Serialize};

pub const DEFAULT_OG_TYPE: &str = "website";
pub const CARD_SUMMARY: &str = "summary";
pub const CARD_SUMMARY_LARGE_IMAGE: &str = "summary_large_image";

/// Error types for the outbound page fetch.
///
/// None of these ever reach the caller: the dispatcher degrades to a plain
/// redirect.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("reqwest error: {0:?}")]
    Reqwest(#[from] reqwest::Error),

    #[error("target did not return text: {0}")]
    NotText(String),
}

/// Preview metadata for one destination page.
///
/// Every field is always populated, see [`PageMetadata::from_html`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub title: String,
    pub description: String,
    pub image: String,
    pub og_type: String,
    pub og_url: String,
    pub twitter_card: String,
    pub canonical: String,
}

impl PageMetadata {
    pub fn has_image(&self) -> bool {
        !self.image.is_empty()
    }
}

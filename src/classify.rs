/// Crawlers that fetch a shared link to render a preview card.
pub const UNFURL_SIGNATURES: &[&str] = &[
    "whatsapp",
    "facebookexternalhit",
    "twitterbot",
    "slackbot",
    "linkedinbot",
    "discordbot",
    "telegrambot",
    "skypeuripreview",
    "vkshare",
    "pinterest",
    "applebot",
    "embedly",
    "iframely",
    "quora link preview",
];

/// Search-engine and archive crawlers.
pub const SEARCH_SIGNATURES: &[&str] = &[
    "googlebot",
    "bingbot",
    "duckduckbot",
    "yandexbot",
    "ia_archiver",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentKind {
    Human,
    UnfurlBot,
    SearchEngine,
    /// `?preview=1` was passed, regardless of the agent
    Forced,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub kind: AgentKind,
    /// lowercased User-Agent the decision was derived from
    pub user_agent: String,
}

impl Classification {
    /// Whether the preview pipeline should run instead of a plain redirect.
    pub fn wants_preview(&self, preview_search_engines: bool) -> bool {
        match self.kind {
            AgentKind::Human => false,
            AgentKind::UnfurlBot | AgentKind::Forced => true,
            AgentKind::SearchEngine => preview_search_engines,
        }
    }
}

fn matches_any(ua: &str, signatures: &[&str]) -> bool {
    signatures.iter().any(|sig| ua.contains(sig))
}

pub fn classify(user_agent: Option<&str>, force_preview: bool) -> Classification {
    let user_agent = user_agent.unwrap_or_default().to_lowercase();

    let kind = if force_preview {
        AgentKind::Forced
    } else if user_agent.is_empty() {
        AgentKind::Human
    } else if matches_any(&user_agent, UNFURL_SIGNATURES) {
        AgentKind::UnfurlBot
    } else if matches_any(&user_agent, SEARCH_SIGNATURES) {
        AgentKind::SearchEngine
    } else {
        AgentKind::Human
    };

    Classification { kind, user_agent }
}

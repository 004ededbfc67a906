//! Append-only request log.
//!
//! Writes happen on a detached blocking task and are never awaited by the
//! response path. An entry may be lost if the process dies first.

use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::{SecondsFormat, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::storage::StorageManager;

pub const KEY_PREFIX: &str = "log-";

const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geo {
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub asn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub ts: String,
    pub target: String,
    pub ip: Option<String>,
    pub ua: Option<String>,
    pub referer: Option<String>,
    pub geo: Geo,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Client address as reported by the fronting proxy.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    header(headers, "cf-connecting-ip")
        .or_else(|| {
            header(headers, "x-forwarded-for")
                .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        })
        .or_else(|| header(headers, "x-real-ip"))
}

impl LogEntry {
    pub fn from_request(target: &str, headers: &HeaderMap) -> Self {
        Self {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            target: target.to_string(),
            ip: client_ip(headers),
            ua: header(headers, "user-agent"),
            referer: header(headers, "referer"),
            geo: Geo {
                country: header(headers, "cf-ipcountry"),
                city: header(headers, "cf-ipcity"),
                region: header(headers, "cf-region"),
                asn: header(headers, "cf-asn"),
            },
        }
    }
}

/// `log-<unix millis>-<5 random base36 chars>`
pub fn new_key() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..5)
        .map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!("{KEY_PREFIX}{}-{suffix}", Utc::now().timestamp_millis())
}

#[derive(Clone)]
pub struct Logbook {
    store: Arc<dyn StorageManager>,
    enabled: bool,
}

impl Logbook {
    pub fn new(store: Arc<dyn StorageManager>, enabled: bool) -> Self {
        Self { store, enabled }
    }

    fn write(store: &dyn StorageManager, entry: &LogEntry) -> anyhow::Result<String> {
        let mut key = new_key();
        while store.exists(&key) {
            key = new_key();
        }
        store.write(&key, &serde_json::to_vec(entry)?)?;
        Ok(key)
    }

    /// Schedules `entry` for persistence and returns immediately.
    pub fn record(&self, entry: LogEntry) {
        if !self.enabled {
            return;
        }

        let store = self.store.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(err) = Self::write(store.as_ref(), &entry) {
                log::warn!("couldn't persist log entry for {}: {err}", entry.target);
            }
        });
    }

    /// Every persisted entry, oldest first. Unreadable entries are skipped.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.store
            .list(KEY_PREFIX)
            .into_iter()
            .filter_map(|key| match self.store.read(&key) {
                Ok(bytes) => match serde_json::from_slice(&bytes) {
                    Ok(entry) => Some(entry),
                    Err(err) => {
                        log::warn!("{key}: malformed log entry: {err}");
                        None
                    }
                },
                Err(err) => {
                    log::warn!("{key}: {err}");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BackendLocal;
    use axum::http::HeaderValue;
    use once_cell::sync::Lazy;
    use regex::Regex;

    static KEY_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^log-\d{13}-[0-9a-z]{5}$").unwrap());

    fn logbook() -> (Logbook, tempfile::TempDir) {
        let tmp = tempfile::tempdir().expect("failed to create temp dir");
        let store = Arc::new(BackendLocal::new(tmp.path()).expect("failed to create storage"));
        (Logbook::new(store, true), tmp)
    }

    #[test]
    fn test_key_format() {
        for _ in 0..50 {
            let key = new_key();
            assert!(KEY_REGEX.is_match(&key), "{key}");
        }
    }

    #[test]
    fn test_entry_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("Twitterbot/1.0"));
        headers.insert("referer", HeaderValue::from_static("https://t.co/"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("cf-ipcountry", HeaderValue::from_static("FR"));

        let entry = LogEntry::from_request("https://example.com", &headers);
        assert_eq!(entry.target, "https://example.com");
        assert_eq!(entry.ua.as_deref(), Some("Twitterbot/1.0"));
        assert_eq!(entry.referer.as_deref(), Some("https://t.co/"));
        assert_eq!(entry.ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(entry.geo.country.as_deref(), Some("FR"));
        assert_eq!(entry.geo.city, None);
        assert!(chrono::DateTime::parse_from_rfc3339(&entry.ts).is_ok());
    }

    #[test]
    fn test_cf_connecting_ip_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("198.51.100.1"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        let entry = LogEntry::from_request("t", &headers);
        assert_eq!(entry.ip.as_deref(), Some("198.51.100.1"));
    }

    #[test]
    fn test_write_and_read_back() {
        let (book, _tmp) = logbook();
        let first = LogEntry::from_request("https://a.example", &HeaderMap::new());
        let second = LogEntry::from_request("https://b.example", &HeaderMap::new());

        let key = Logbook::write(book.store.as_ref(), &first).unwrap();
        assert!(key.starts_with(KEY_PREFIX));
        Logbook::write(book.store.as_ref(), &second).unwrap();

        let entries = book.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.contains(&first));
        assert!(entries.contains(&second));
    }

    #[test]
    fn test_missing_values_serialize_as_null() {
        let entry = LogEntry::from_request("t", &HeaderMap::new());
        let value = serde_json::to_value(&entry).unwrap();
        assert!(value["ip"].is_null());
        assert!(value["geo"]["asn"].is_null());
    }

    #[tokio::test]
    async fn test_record_is_detached() {
        let (book, tmp) = logbook();
        book.record(LogEntry::from_request("https://a.example", &HeaderMap::new()));

        // give the blocking pool a moment
        for _ in 0..50 {
            if !book.entries().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(book.entries().len(), 1);
        drop(tmp);
    }

    #[test]
    fn test_disabled_logbook_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(BackendLocal::new(tmp.path()).unwrap());
        let book = Logbook::new(store, false);
        book.record(LogEntry::from_request("t", &HeaderMap::new()));
        assert!(book.entries().is_empty());
    }
}

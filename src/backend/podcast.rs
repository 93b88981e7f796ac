//! Podcast result records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// One search or lookup result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Podcast {
    pub author: Option<String>,
    pub feed: String,
    pub guid: u64,
    pub img100: Option<String>,
    pub img30: Option<String>,
    pub img60: Option<String>,
    pub img600: Option<String>,
    pub title: Option<String>,
    pub updated: Option<String>,
}

fn text(record: &Value, field: &str) -> Option<String> {
    record.get(field).and_then(Value::as_str).map(str::to_string)
}

impl Podcast {
    /// Build a result from an iTunes-style record. Records without an
    /// integral `collectionId` or without a feed URL that has a host are
    /// rejected. The feed URL is normalized.
    pub fn from_itunes(record: &Value) -> Option<Self> {
        let guid = record.get("collectionId")?.as_u64()?;
        let feed = Url::parse(record.get("feedUrl")?.as_str()?).ok()?;
        feed.host_str().filter(|host| !host.is_empty())?;

        Some(Self {
            author: text(record, "artistName"),
            feed: feed.to_string(),
            guid,
            img100: text(record, "artworkUrl100"),
            img30: text(record, "artworkUrl30"),
            img60: text(record, "artworkUrl60"),
            img600: text(record, "artworkUrl600"),
            title: text(record, "collectionName"),
            updated: text(record, "releaseDate"),
        })
    }
}

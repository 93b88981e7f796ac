//! In-process catalog backend.
//!
//! # Responsibilities
//! - Hold a bounded catalog of podcasts loaded from the storage directory
//! - Serve lookup, search and suggest streams over the channel protocol
//!
//! # Design Decisions
//! - Each stream is a spawned task; it reads keys until the write side
//!   ends, then closes its output (end-of-stream)
//! - Output is one JSON array per stream, framed as `[`, items, `]`
//! - Unknown and malformed guids are omitted

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use crate::backend::podcast::Podcast;
use crate::backend::{Backend, BackendEnd, BackendError, BackendErrorKind, BackendStream, StreamKind};
use crate::config::StorageConfig;

pub const CATALOG_FILE: &str = "catalog.json";

#[derive(Debug, Default)]
struct Catalog {
    items: Vec<Podcast>,
    by_guid: HashMap<u64, usize>,
}

impl Catalog {
    fn new(items: Vec<Podcast>) -> Self {
        let by_guid = items
            .iter()
            .enumerate()
            .map(|(i, podcast)| (podcast.guid, i))
            .collect();
        Self { items, by_guid }
    }

    fn lookup(&self, guid: u64) -> Option<&Podcast> {
        self.by_guid.get(&guid).map(|&i| &self.items[i])
    }

    fn search(&self, term: &str) -> Vec<&Podcast> {
        let tokens: Vec<&str> = term.split(' ').collect();
        self.items
            .iter()
            .filter(|podcast| {
                let haystack = format!(
                    "{} {}",
                    podcast.title.as_deref().unwrap_or_default(),
                    podcast.author.as_deref().unwrap_or_default()
                )
                .to_lowercase();
                tokens.iter().all(|token| haystack.contains(token))
            })
            .collect()
    }

    fn suggest(&self, term: &str, limit: usize) -> Vec<String> {
        let mut titles: Vec<String> = Vec::new();
        for title in self.items.iter().filter_map(|p| p.title.as_deref()) {
            let lower = title.to_lowercase();
            if lower.starts_with(term) && !titles.contains(&lower) {
                titles.push(lower);
                if titles.len() == limit {
                    break;
                }
            }
        }
        titles
    }
}

/// Backend serving a fixed in-memory catalog.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    catalog: Arc<Catalog>,
    channel_capacity: usize,
    suggest_limit: usize,
}

impl MemoryBackend {
    pub fn new(items: Vec<Podcast>, channel_capacity: usize, suggest_limit: usize) -> Self {
        Self {
            catalog: Arc::new(Catalog::new(items)),
            channel_capacity,
            suggest_limit,
        }
    }

    /// Load `<location>/catalog.json`, a JSON array of iTunes-style records.
    /// A missing file yields an empty catalog. Records beyond
    /// `storage.cache_size` serialized bytes are dropped.
    pub fn load(storage: &StorageConfig, channel_capacity: usize) -> Result<Self, BackendError> {
        let path = Path::new(&storage.location).join(CATALOG_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No catalog file, starting empty");
                return Ok(Self::new(Vec::new(), channel_capacity, storage.suggest_limit));
            }
            Err(e) => {
                return Err(BackendError::new(
                    BackendErrorKind::Storage,
                    format!("reading {}: {}", path.display(), e),
                ))
            }
        };

        let records: Vec<Value> = serde_json::from_str(&content).map_err(|e| {
            BackendError::new(BackendErrorKind::Storage, format!("parsing {}: {}", path.display(), e))
        })?;

        let mut items = Vec::new();
        let mut used = 0usize;
        let mut rejected = 0usize;
        for record in &records {
            let Some(podcast) = Podcast::from_itunes(record) else {
                rejected += 1;
                continue;
            };
            used += serde_json::to_vec(&podcast).map(|v| v.len()).unwrap_or_default();
            if used > storage.cache_size {
                tracing::warn!(
                    cache_size = storage.cache_size,
                    kept = items.len(),
                    "Catalog exceeds cache size, truncating"
                );
                break;
            }
            items.push(podcast);
        }

        tracing::info!(
            path = %path.display(),
            loaded = items.len(),
            rejected,
            "Catalog loaded"
        );
        Ok(Self::new(items, channel_capacity, storage.suggest_limit))
    }

    pub fn len(&self) -> usize {
        self.catalog.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.items.is_empty()
    }
}

impl Backend for MemoryBackend {
    fn open(&self, kind: StreamKind) -> BackendStream {
        let (stream, end) = BackendStream::pair(self.channel_capacity);
        tokio::spawn(serve(kind, self.catalog.clone(), end, self.suggest_limit));
        stream
    }
}

/// Writes a JSON array, one item per chunk.
struct ArrayWriter {
    end: BackendEnd,
    opened: bool,
}

impl ArrayWriter {
    async fn item(&mut self, item: Vec<u8>) -> Result<(), ()> {
        let prefix: &[u8] = if self.opened { b"," } else { b"[" };
        self.opened = true;
        let mut chunk = Vec::with_capacity(prefix.len() + item.len());
        chunk.extend_from_slice(prefix);
        chunk.extend_from_slice(&item);
        self.send(Ok(Bytes::from(chunk))).await
    }

    async fn close(mut self) {
        let tail: &'static [u8] = if self.opened { b"]" } else { b"[]" };
        let _ = self.send(Ok(Bytes::from_static(tail))).await;
    }

    async fn send(&mut self, chunk: Result<Bytes, BackendError>) -> Result<(), ()> {
        // A send error means the request side aborted the stream.
        self.end.output.send(chunk).await.map_err(|_| ())
    }
}

async fn serve(kind: StreamKind, catalog: Arc<Catalog>, end: BackendEnd, suggest_limit: usize) {
    let mut writer = ArrayWriter { end, opened: false };

    while let Some(key) = writer.end.input.recv().await {
        let items: Vec<Vec<u8>> = match kind {
            StreamKind::Lookup => match key.parse::<u64>() {
                Ok(guid) => catalog.lookup(guid).into_iter().map(encode).collect(),
                Err(_) => {
                    tracing::warn!(key = %key, "Skipping malformed guid");
                    continue;
                }
            },
            StreamKind::Search => catalog.search(&key).into_iter().map(encode).collect(),
            StreamKind::Suggest => catalog
                .suggest(&key, suggest_limit)
                .iter()
                .map(encode)
                .collect(),
        };

        for item in items {
            if writer.item(item).await.is_err() {
                return;
            }
        }
    }

    writer.close().await;
}

fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

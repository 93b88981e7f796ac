//! spin: takes a running server for a spin.
//!
//! Every interval, fires a random burst of suggest, search, lookup and
//! unknown-path requests built from a word list, and abandons some of them
//! midway to exercise client disconnects.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;

const FALLBACK_WORDS: &[&str] = &[
    "apple", "banana", "change", "design", "economy", "future", "garden", "history", "java",
    "kitchen", "language", "music", "news", "podcast", "radio", "science", "talk", "world",
];

#[derive(Parser)]
#[command(name = "spin")]
#[command(about = "Load generator for the fanboy-http server", long_about = None)]
struct Cli {
    /// Base URL of the server.
    #[arg(short, long, default_value = "http://localhost:8383")]
    url: String,

    /// Word list to draw search terms from.
    #[arg(short, long, default_value = "/usr/share/dict/words")]
    words: PathBuf,

    /// Maximum requests per burst.
    #[arg(short, long, default_value_t = 10)]
    max: usize,

    /// Milliseconds between bursts.
    #[arg(short, long, default_value_t = 3000)]
    interval: u64,

    /// Share of requests to abandon before they complete.
    #[arg(long, default_value_t = 0.25)]
    abort_ratio: f64,
}

#[derive(Clone, Copy)]
enum Verb {
    Suggest,
    Search,
    Lookup,
    Hello,
}

const VERBS: [Verb; 4] = [Verb::Suggest, Verb::Search, Verb::Lookup, Verb::Hello];

fn load_words(path: &PathBuf) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let words: Vec<String> = text
                .lines()
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(String::from)
                .collect();
            if !words.is_empty() {
                return words;
            }
        }
        Err(e) => eprintln!("cannot read {}: {}, using built-in words", path.display(), e),
    }
    FALLBACK_WORDS.iter().map(|w| w.to_string()).collect()
}

fn random_path(rng: &mut impl Rng, words: &[String], guids: &[u64]) -> String {
    let term = words.choose(rng).map(String::as_str).unwrap_or("apple");
    match VERBS.choose(rng).copied().unwrap_or(Verb::Search) {
        Verb::Suggest => {
            let chars: Vec<char> = term.chars().collect();
            let len = rng.gen_range(1..=chars.len().max(1)).min(chars.len());
            let prefix: String = chars[..len].iter().collect();
            format!("/suggest?q={}", percent_encode(&prefix))
        }
        Verb::Search => {
            let term = if rng.gen_bool(0.2) { "apple" } else { term };
            format!("/search?q={}", percent_encode(term))
        }
        Verb::Lookup => {
            let guid = guids.choose(rng).copied().unwrap_or(763718821);
            format!("/lookup/{}", guid)
        }
        Verb::Hello => "/hello".to_string(),
    }
}

fn percent_encode(term: &str) -> String {
    percent_encoding::utf8_percent_encode(term, percent_encoding::NON_ALPHANUMERIC).to_string()
}

async fn fetch(client: &reqwest::Client, url: &str, guids: &Mutex<Vec<u64>>) {
    let res = match client.get(url).send().await {
        Ok(res) => res,
        Err(e) => {
            eprintln!("{} failed: {}", url, e);
            return;
        }
    };
    let text = match res.text().await {
        Ok(text) => text,
        Err(e) => {
            eprintln!("{} failed: {}", url, e);
            return;
        }
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Array(items)) => {
            if let Ok(mut known) = guids.lock() {
                for guid in items.iter().filter_map(|item| item.get("guid")?.as_u64()) {
                    if !known.contains(&guid) {
                        known.push(guid);
                    }
                }
            }
            println!("< {}", items.len());
        }
        Ok(other) => println!("not an Array: {}", other),
        Err(_) => eprintln!("not JSON: {:?}", text),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let words = load_words(&cli.words);
    let guids = Arc::new(Mutex::new(vec![763718821u64]));
    let mut ticker = tokio::time::interval(Duration::from_millis(cli.interval));

    loop {
        ticker.tick().await;

        let burst: Vec<(String, bool)> = {
            let mut rng = rand::thread_rng();
            let known = guids.lock().map(|g| g.clone()).unwrap_or_default();
            let count = rng.gen_range(1..=cli.max.max(1));
            (0..count)
                .map(|_| {
                    let path = random_path(&mut rng, &words, &known);
                    let abandon = rng.gen_bool(cli.abort_ratio.clamp(0.0, 1.0));
                    (format!("{}{}", cli.url, path), abandon)
                })
                .collect()
        };

        for (url, abandon) in burst {
            let client = client.clone();
            let guids = Arc::clone(&guids);
            let task = tokio::spawn(async move { fetch(&client, &url, &guids).await });
            if abandon {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    task.abort();
                });
            }
        }
    }
}

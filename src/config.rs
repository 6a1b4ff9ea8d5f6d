//! Runtime configuration sourced from the environment.
//!
//! An optional `.env`-style file (default `./config.env`) is loaded first
//! via dotenvy; real environment variables win. Every knob has a
//! documented default so `quarry` works against a stock LM Studio
//! endpoint with no configuration at all.

use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default OpenAI-compatible endpoint (LM Studio's local server).
const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:1234/v1";
const DEFAULT_CHAT_MODEL: &str = "gpt-oss-20b";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-mxbai-embed-large-v1";

#[derive(Debug, Clone)]
pub struct Config {
    /// Chat model name (`QUARRY_MODEL_CHAT`).
    pub chat_model: String,
    /// Embedding model name (`QUARRY_MODEL_EMBEDDING`).
    pub embedding_model: String,
    /// Base URL of the OpenAI-compatible API (`QUARRY_ENDPOINT`), no
    /// trailing slash.
    pub endpoint: String,
    /// Bearer token (`QUARRY_API_KEY`). Local servers ignore it but the
    /// header is always sent.
    pub api_key: String,
    /// Link-following depth for web ingestion (`QUARRY_CRAWL_DEPTH`,
    /// default 0 = seed URLs only).
    pub crawl_depth: u32,
    /// Pause between page fetches in milliseconds
    /// (`QUARRY_CRAWL_PAUSE_MS`, default 0).
    pub crawl_pause: Duration,
    /// Texts per embedding request (`QUARRY_EMBED_BATCH_SIZE`).
    pub embed_batch_size: usize,
    /// Retry attempts for transient HTTP failures (`QUARRY_MAX_RETRIES`).
    pub max_retries: u32,
    /// Per-request timeout (`QUARRY_TIMEOUT_SECS`).
    pub timeout: Duration,
    /// Passages retrieved per chat turn (`QUARRY_RETRIEVE_K`).
    pub retrieve_k: usize,
}

impl Config {
    /// Load config from the process environment, reading `env_file` first
    /// when it exists. A missing file is not an error.
    pub fn from_env(env_file: &Path) -> Result<Self> {
        if env_file.exists() {
            dotenvy::from_path(env_file)
                .map_err(|e| Error::Config(format!("{}: {}", env_file.display(), e)))?;
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Split out so tests can
    /// exercise parsing and validation without touching process globals.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let endpoint = get("QUARRY_ENDPOINT", DEFAULT_ENDPOINT)
            .trim_end_matches('/')
            .to_string();

        let config = Self {
            chat_model: get("QUARRY_MODEL_CHAT", DEFAULT_CHAT_MODEL),
            embedding_model: get("QUARRY_MODEL_EMBEDDING", DEFAULT_EMBEDDING_MODEL),
            endpoint,
            api_key: get("QUARRY_API_KEY", "dummy-key"),
            crawl_depth: parse(&lookup, "QUARRY_CRAWL_DEPTH", 0)?,
            crawl_pause: Duration::from_millis(parse(&lookup, "QUARRY_CRAWL_PAUSE_MS", 0)?),
            embed_batch_size: parse(&lookup, "QUARRY_EMBED_BATCH_SIZE", 64)?,
            max_retries: parse(&lookup, "QUARRY_MAX_RETRIES", 3)?,
            timeout: Duration::from_secs(parse(&lookup, "QUARRY_TIMEOUT_SECS", 30)?),
            retrieve_k: parse(&lookup, "QUARRY_RETRIEVE_K", 4)?,
        };

        if config.embed_batch_size == 0 {
            return Err(Error::Config(
                "QUARRY_EMBED_BATCH_SIZE must be > 0".to_string(),
            ));
        }
        if config.retrieve_k == 0 {
            return Err(Error::Config("QUARRY_RETRIEVE_K must be > 0".to_string()));
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} has invalid value '{}'", key, raw))),
        None => Ok(default),
    }
}

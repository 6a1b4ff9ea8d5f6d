//! Core data models used throughout quarry.
//!
//! These types represent the passages, crawl sources, and chat turns that
//! flow through the ingestion and retrieval pipeline. Passages are
//! serializable because they form the metadata half of the persisted
//! index.

use serde::{Deserialize, Serialize};

/// A bounded chunk of source text plus provenance. The embedding vector
/// lives in the index's vector artifact, keyed by the passage's position
/// in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    pub id: String,
    pub text: String,
    /// File path or URL this passage was extracted from.
    pub source: String,
    /// Monotonic sequence of the passage within its source, starting at 0.
    pub position: u32,
    /// SHA-256 of `text`, for staleness detection and dedup tooling.
    pub hash: String,
}

/// One retrieval hit: a passage and its cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub score: f32,
}

/// Summary of one ingestion run. Per-item failures are collected here,
/// never raised.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub passages_added: u64,
    pub sources_processed: u64,
    /// (source, reason) pairs for sources that were skipped.
    pub sources_failed: Vec<(String, String)>,
}

impl IngestReport {
    pub fn record_failure(&mut self, source: impl Into<String>, reason: impl ToString) {
        self.sources_failed
            .push((source.into(), reason.to_string()));
    }
}

/// One entry of a web sources config file. `url` accepts a single string
/// or a list of strings; entries without a `url` are skipped by the
/// loader.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSource {
    #[serde(default, deserialize_with = "string_or_list")]
    pub url: Vec<String>,
    #[serde(default)]
    pub selectors: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(url) => vec![url],
        OneOrMany::Many(urls) => urls,
    })
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single turn owned by the chat session. Sessions are process-wide and
/// reset on restart; there is no cross-session persistence.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One line of the `manifest.json` written after a web ingest, mapping a
/// passage back to how it was extracted.
#[derive(Debug, Serialize)]
pub struct ManifestEntry {
    pub id: String,
    pub source: String,
    pub extract_method: String,
    pub extract_pattern: String,
    pub position: u32,
    pub snippet: String,
}

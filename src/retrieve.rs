//! Query-time retrieval: embed the question, search the index.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::error::Result;
use crate::index::IndexStore;
use crate::models::ScoredPassage;
use crate::retry::CancelToken;

pub struct Retriever {
    embedder: EmbeddingClient,
    index_dir: PathBuf,
    k: usize,
}

impl Retriever {
    pub fn new(config: &Config, index_dir: &Path) -> Result<Self> {
        Ok(Self {
            embedder: EmbeddingClient::new(config)?,
            index_dir: index_dir.to_path_buf(),
            k: config.retrieve_k,
        })
    }

    /// Retrieve the passages most similar to `query`, best first. The
    /// index is reopened per call so a retrieval session observes
    /// batches persisted by a concurrent or later ingest run.
    pub async fn retrieve(&self, query: &str, cancel: &CancelToken) -> Result<Vec<ScoredPassage>> {
        let vector = self.embedder.embed_query(query, cancel).await?;
        let index = IndexStore::open_or_create(&self.index_dir, Some(vector.len()))?;
        index.search(&vector, self.k)
    }
}

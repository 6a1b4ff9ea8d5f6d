//! Append-only, disk-persisted vector index.
//!
//! An index is a directory holding exactly two co-located artifacts:
//!
//! - `vectors.bin` — row-major little-endian f32 vectors, one row per
//!   passage;
//! - `passages.json` — the dimensionality plus the ordered passage
//!   metadata.
//!
//! Row `i` of the vector file belongs to passage `i` of the metadata
//! file. `persist` writes both through a temp file and an atomic rename,
//! metadata last, so the metadata file is the commit point: a crash
//! between the two renames leaves extra vector rows that `open` discards,
//! restoring the pre-batch state. Opening an existing directory always
//! merges (appends) — it never overwrites.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Passage, ScoredPassage};

const VECTORS_FILE: &str = "vectors.bin";
const PASSAGES_FILE: &str = "passages.json";

/// Handle to one on-disk index. Single-writer: the ingestion
/// orchestrator owns the only mutable handle; retrieval opens fresh
/// read-only handles per query.
#[derive(Debug)]
pub struct IndexStore {
    dir: PathBuf,
    /// None until the first batch establishes it (fresh index).
    dimension: Option<usize>,
    passages: Vec<Passage>,
    /// Flat row-major storage, `passages.len() * dimension` floats.
    vectors: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct Metadata {
    dimension: usize,
    created_at: i64,
    updated_at: i64,
    passages: Vec<Passage>,
}

impl IndexStore {
    /// Open the index at `dir`, creating the directory if absent. When
    /// `expected_dimension` is given and the index already holds
    /// passages, the stored dimensionality must match.
    pub fn open_or_create(dir: &Path, expected_dimension: Option<usize>) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let meta_path = dir.join(PASSAGES_FILE);
        if !meta_path.exists() {
            return Ok(Self {
                dir: dir.to_path_buf(),
                dimension: expected_dimension,
                passages: Vec::new(),
                vectors: Vec::new(),
            });
        }

        let meta: Metadata = serde_json::from_str(&fs::read_to_string(&meta_path)?)?;
        if let Some(expected) = expected_dimension {
            if meta.dimension != expected {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: meta.dimension,
                });
            }
        }

        let blob = fs::read(dir.join(VECTORS_FILE)).map_err(|e| Error::IndexCorrupt {
            path: dir.to_path_buf(),
            reason: format!("metadata present but vectors.bin unreadable: {}", e),
        })?;
        let mut vectors = blob_to_vec(&blob);

        let needed = meta.passages.len() * meta.dimension;
        if vectors.len() < needed {
            return Err(Error::IndexCorrupt {
                path: dir.to_path_buf(),
                reason: format!(
                    "vectors.bin holds {} floats, metadata needs {}",
                    vectors.len(),
                    needed
                ),
            });
        }
        if vectors.len() > needed {
            // Torn write: a batch's vectors landed but its metadata did
            // not. The metadata file is the commit point, so drop the
            // uncommitted rows.
            tracing::warn!(
                dir = %dir.display(),
                extra = vectors.len() - needed,
                "discarding uncommitted vector rows"
            );
            vectors.truncate(needed);
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            dimension: Some(meta.dimension),
            passages: meta.passages,
            vectors,
        })
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Number of distinct sources among the stored passages.
    pub fn source_count(&self) -> usize {
        let mut sources: Vec<&str> = self.passages.iter().map(|p| p.source.as_str()).collect();
        sources.sort_unstable();
        sources.dedup();
        sources.len()
    }

    /// Append a batch of passages with their vectors. The whole batch is
    /// validated before anything is added, so a failed append leaves the
    /// handle unchanged. Durability requires a following [`persist`](Self::persist).
    pub fn append(&mut self, batch: Vec<(Passage, Vec<f32>)>) -> Result<()> {
        let Some((_, first_vec)) = batch.first() else {
            return Ok(());
        };

        let dimension = match self.dimension {
            Some(d) => d,
            // First batch into a fresh index fixes the dimensionality.
            None => first_vec.len(),
        };
        if dimension == 0 {
            return Err(Error::Config("embedding dimension is 0".to_string()));
        }
        for (_, vector) in &batch {
            if vector.len() != dimension {
                return Err(Error::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
        }

        self.dimension = Some(dimension);
        for (passage, vector) in batch {
            self.passages.push(passage);
            self.vectors.extend_from_slice(&vector);
        }
        Ok(())
    }

    /// Flush both artifacts to disk. Vectors first, metadata last; each
    /// via write-temp-then-rename so readers never observe a partial
    /// file.
    pub fn persist(&self) -> Result<()> {
        let Some(dimension) = self.dimension else {
            // Nothing was ever appended; there is no state to commit.
            return Ok(());
        };

        let now = chrono::Utc::now().timestamp();
        let created_at = match fs::read_to_string(self.dir.join(PASSAGES_FILE)) {
            Ok(existing) => serde_json::from_str::<Metadata>(&existing)
                .map(|m| m.created_at)
                .unwrap_or(now),
            Err(_) => now,
        };

        write_atomic(&self.dir.join(VECTORS_FILE), &vec_to_blob(&self.vectors))?;

        let meta = Metadata {
            dimension,
            created_at,
            updated_at: now,
            passages: self.passages.clone(),
        };
        write_atomic(
            &self.dir.join(PASSAGES_FILE),
            serde_json::to_string(&meta)?.as_bytes(),
        )?;
        Ok(())
    }

    /// Return the `k` most similar passages to `query`, ranked by cosine
    /// similarity, descending. Ties break toward earlier insertion.
    /// `k` larger than the index returns everything.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredPassage>> {
        if self.passages.is_empty() {
            return Err(Error::IndexEmpty(self.dir.clone()));
        }
        let dimension = self.dimension.unwrap_or(0);
        if query.len() != dimension {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(dimension)
            .enumerate()
            .map(|(i, row)| (i, cosine_similarity(query, row)))
            .collect();

        // Stable ordering: score descending, insertion order for ties.
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredPassage {
                passage: self.passages[i].clone(),
                score,
            })
            .collect())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Encode a float slice as little-endian bytes, 4 per value.
fn vec_to_blob(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for &v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian f32 bytes; trailing partial values are ignored.
fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity in `[-1, 1]`; 0 for empty or mismatched inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

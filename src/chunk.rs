//! Overlapping character-window chunker.
//!
//! Splits extracted text into windows of `chunk_size` characters with
//! `overlap` characters shared between consecutive windows. Boundaries
//! land on `char` positions, never inside a multi-byte scalar.
//!
//! Each passage receives a UUID, its monotonic position within the
//! source, and a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::Passage;

/// Split `text` into overlapping passages attributed to `source`.
///
/// Deterministic: identical input and parameters always produce identical
/// boundaries, which makes re-ingestion reproducible. Empty or
/// whitespace-only input yields zero passages.
///
/// # Errors
///
/// `Error::Config` when `chunk_size` is 0 or `overlap >= chunk_size`.
pub fn chunk(text: &str, source: &str, chunk_size: usize, overlap: usize) -> Result<Vec<Passage>> {
    if chunk_size == 0 {
        return Err(Error::Config("chunk_size must be > 0".to_string()));
    }
    if overlap >= chunk_size {
        return Err(Error::Config(format!(
            "overlap ({}) must be smaller than chunk_size ({})",
            overlap, chunk_size
        )));
    }

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every char boundary, plus the end of the text, so
    // windows can be sliced without walking the string repeatedly.
    let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    boundaries.push(text.len());
    let total_chars = boundaries.len() - 1;

    let step = chunk_size - overlap;
    let mut passages = Vec::new();
    let mut start = 0usize;
    let mut position = 0u32;

    while start < total_chars {
        let end = (start + chunk_size).min(total_chars);
        let piece = &text[boundaries[start]..boundaries[end]];
        passages.push(make_passage(piece, source, position));
        position += 1;
        if end == total_chars {
            break;
        }
        start += step;
    }

    Ok(passages)
}

fn make_passage(text: &str, source: &str, position: u32) -> Passage {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Passage {
        id: Uuid::new_v4().to_string(),
        text: text.to_string(),
        source: source.to_string(),
        position,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_single_passage() {
        let passages = chunk("Hello, world!", "doc1", 100, 10).unwrap();
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].position, 0);
        assert_eq!(passages[0].text, "Hello, world!");
        assert_eq!(passages[0].source, "doc1");
    }

    #[test]
    fn empty_and_whitespace_yield_nothing() {
        assert!(chunk("", "doc1", 100, 10).unwrap().is_empty());
        assert!(chunk("   \n\t  ", "doc1", 100, 10).unwrap().is_empty());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        assert!(matches!(
            chunk("text", "doc1", 10, 10),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            chunk("text", "doc1", 10, 15),
            Err(Error::Config(_))
        ));
        assert!(matches!(chunk("text", "doc1", 0, 0), Err(Error::Config(_))));
    }

    #[test]
    fn windows_overlap_by_requested_amount() {
        let text = "abcdefghijklmnop"; // 16 chars
        let passages = chunk(text, "doc1", 8, 3).unwrap();
        // step = 5: windows at 0..8, 5..13, 10..16
        assert_eq!(passages.len(), 3);
        assert_eq!(passages[0].text, "abcdefgh");
        assert_eq!(passages[1].text, "fghijklm");
        assert_eq!(passages[2].text, "klmnop");
        for (i, p) in passages.iter().enumerate() {
            assert_eq!(p.position, i as u32);
        }
    }

    #[test]
    fn concatenating_spans_reconstructs_input() {
        let text = "The quick brown fox jumps over the lazy dog";
        let chunk_size = 12;
        let overlap = 4;
        let passages = chunk(text, "doc1", chunk_size, overlap).unwrap();

        let mut rebuilt = String::new();
        for (i, p) in passages.iter().enumerate() {
            if i == 0 {
                rebuilt.push_str(&p.text);
            } else {
                // Drop the shared prefix that the previous window already
                // contributed.
                let skip: String = p.text.chars().skip(overlap).collect();
                rebuilt.push_str(&skip);
            }
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn multibyte_text_never_splits_a_char() {
        let text = "héllø wörld ünïcödé tëxt";
        let passages = chunk(text, "doc1", 5, 2).unwrap();
        assert!(!passages.is_empty());
        for p in &passages {
            assert!(p.text.chars().count() <= 5);
        }
    }

    #[test]
    fn deterministic_boundaries_and_hashes() {
        let text = "Alpha beta gamma delta epsilon zeta";
        let a = chunk(text, "doc1", 10, 3).unwrap();
        let b = chunk(text, "doc1", 10, 3).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.hash, y.hash);
            assert_eq!(x.position, y.position);
        }
    }

    #[test]
    fn fox_document_produces_overlapping_passages() {
        let passages = chunk("The quick brown fox jumps.", "fox.txt", 20, 5).unwrap();
        assert!(passages.len() >= 2);
        assert!(passages[0].text.contains("brown"));
    }
}

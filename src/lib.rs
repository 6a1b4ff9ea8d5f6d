//! # Quarry
//!
//! A local-first retrieval-augmented generation pipeline for locally
//! hosted OpenAI-compatible models (LM Studio, llama.cpp server, and
//! friends).
//!
//! Quarry ingests local documents and crawled web pages, chunks and
//! embeds them against the local backend, and persists the vectors in
//! a simple two-file index on disk. A chat session then answers
//! questions with the most similar passages folded into the prompt.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ Documents    │──▶│   Pipeline   │──▶│ Index dir   │
//! │ Web crawler  │   │ Chunk+Embed  │   │ vectors.bin │
//! └──────────────┘   └──────────────┘   │ passages.json│
//!                                       └──────┬──────┘
//!                                              │
//!                                              ▼
//!                                       ┌─────────────┐
//!                                       │ Chat (CLI)  │
//!                                       └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! quarry ingest-docs ./docs          # ingest local txt/md/pdf files
//! quarry ingest-web sources.json     # crawl and ingest web pages
//! quarry query                       # interactive RAG chat
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Environment-driven configuration |
//! | [`models`] | Core data types |
//! | [`chunk`] | Sliding-window text chunking |
//! | [`retry`] | Retry policy and cancellation |
//! | [`embedding`] | Embedding backend client |
//! | [`index`] | Persistent vector index |
//! | [`extract`] | Document and HTML text extraction |
//! | [`crawler`] | Depth-limited BFS web crawler |
//! | [`ingest`] | Ingestion orchestration |
//! | [`retrieve`] | Query-time retrieval |
//! | [`chat`] | Retrieval-augmented chat |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod crawler;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod models;
pub mod retrieve;
pub mod retry;

pub use error::{Error, Result};

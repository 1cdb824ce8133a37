//! # docsage
//!
//! A local-first document assistant core: ingest plain text, chunk and
//! embed it, and run retrieval-augmented generation tasks (summaries,
//! highlights, presentations, Q&A) against interchangeable LLM
//! backends.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │  Ingest  │──▶│   Pipeline    │──▶│  SQLite   │
//! │  (text)  │   │ Chunk+Embed  │   │ + vectors │
//! └──────────┘   └──────────────┘   └────┬─────┘
//!                                        │
//!                 ┌──────────────────────┤
//!                 ▼                      ▼
//!           ┌──────────┐         ┌─────────────┐
//!           │ Retrieve │────────▶│  Providers   │
//!           │ (cosine) │ prompts │ ollama/cloud │
//!           └──────────┘         └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docsage init                        # create database
//! docsage add report.txt              # ingest and index
//! docsage summarize <id> --style bullets
//! docsage ask <id> "what changed in Q3?" --stream
//! docsage switch openai --model gpt-4o-mini
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with provider defaults |
//! | [`models`] | Core data types |
//! | [`chunk`] | Sentence-aware text chunking |
//! | [`embedding`] | Optional embedding backend + vector math |
//! | [`retrieve`] | Cosine retrieval with positional fallback |
//! | [`prompt`] | Task prompt templates |
//! | [`providers`] | Generation backend adapters |
//! | [`registry`] | Provider selection and hot-swap |
//! | [`store`] | Persistence (SQLite and in-memory) |
//! | [`cache`] | Deterministic result cache keys |
//! | [`ingest`] | Document indexing lifecycle |
//! | [`service`] | Task orchestration |

pub mod cache;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod models;
pub mod prompt;
pub mod providers;
pub mod registry;
pub mod retrieve;
pub mod service;
pub mod store;

pub use error::{Error, Result};

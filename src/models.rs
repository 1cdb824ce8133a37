//! Core data models used throughout docsage.
//!
//! These types represent the documents, chunks, and cached task results
//! that flow through the ingestion and generation pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an uploaded document.
///
/// The RAG core only ever reads documents whose status is [`Ready`];
/// the ingestion pipeline owns the transitions.
///
/// [`Ready`]: DocumentStatus::Ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Ready,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DocumentStatus::Pending),
            "processing" => Some(DocumentStatus::Processing),
            "ready" => Some(DocumentStatus::Ready),
            "error" => Some(DocumentStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded document.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub status: DocumentStatus,
    /// Length of the extracted plain text, in characters.
    pub text_length: i64,
    /// Estimated token count of the extracted text.
    pub token_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// A freshly uploaded document with no extracted text yet.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            status: DocumentStatus::Pending,
            text_length: 0,
            token_count: 0,
            created_at: Utc::now(),
        }
    }
}

/// A retrieval unit: one contiguous slice of a document's text.
///
/// Chunks are immutable once created and ordered by `index`; concatenating
/// chunk contents in index order (with separators) reconstructs the
/// document text handed to ingestion.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: i64,
    pub document_id: String,
    /// 0-based position within the document.
    pub index: i64,
    pub content: String,
    pub token_count: i64,
}

/// A chunk joined with its stored embedding vector.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk_id: i64,
    pub index: i64,
    pub content: String,
    pub vector: Vec<f32>,
}

/// The generation tasks the core knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Summarize,
    Highlights,
    Presentation,
    Ask,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Summarize => "summarize",
            TaskKind::Highlights => "highlights",
            TaskKind::Presentation => "presentation",
            TaskKind::Ask => "ask",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finished task result addressed by its deterministic cache key.
///
/// At most one entry exists per key; a later write with the same key
/// replaces the earlier one.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub document_id: String,
    pub task: TaskKind,
    pub result: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

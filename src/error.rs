//! Error taxonomy for the docsage core.
//!
//! Client-input errors (`NotFound`, `NotReady`, `NoContent`) are surfaced
//! immediately and never retried. Provider errors carry enough context
//! (provider name, base URL) for the caller to act. Embedding unavailability
//! is *not* an error anywhere in this crate — retrieval degrades to
//! positional selection instead.

use crate::models::DocumentStatus;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("document {id} is not ready yet (status: {status})")]
    NotReady { id: String, status: DocumentStatus },

    #[error("no text chunks available for document {0}")]
    NoContent(String),

    #[error("provider '{provider}' unreachable at {base_url}: {message}")]
    ProviderUnavailable {
        provider: String,
        base_url: String,
        message: String,
    },

    #[error("provider '{provider}' is misconfigured: {message}")]
    ProviderMisconfigured { provider: String, message: String },

    #[error("integration for provider '{provider}' is unavailable: {message}")]
    IntegrationMissing { provider: String, message: String },

    #[error("unknown provider '{requested}', known providers: {}", known.join(", "))]
    UnknownProvider {
        requested: String,
        known: Vec<String>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// True when the error is caused by client input rather than the
    /// system itself; such errors must never be retried.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::NotReady { .. } | Error::NoContent(_)
        )
    }
}

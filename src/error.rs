//! Error types for the pattern loader and the LLM fallback path.
//!
//! The deterministic core (router, parser, transliteration, invoice mapper)
//! has no error type: missing data is `None`, never an error.

use thiserror::Error;

use crate::patterns::FieldKind;

/// Errors compiling a field matcher.
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("invalid regex for field {field:?}: {source}")]
    InvalidRegex {
        field: FieldKind,
        #[source]
        source: regex::Error,
    },
}

/// Errors talking to the chat-completions service.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Request never got a response (DNS, TLS, connection reset, body read).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Service answered with a non-2xx status.
    #[error("LLM API error ({status}): {body}")]
    Status { status: u16, body: String },

    /// Response had no message content.
    #[error("LLM reply had no content")]
    EmptyReply,
}

/// Reasons the LLM address fallback produced nothing.
#[derive(Error, Debug)]
pub enum FallbackError {
    #[error("no LLM credential available")]
    NoCredential,

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("unparseable LLM reply: {0}")]
    Parse(#[from] serde_json::Error),
}

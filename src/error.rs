//! Error taxonomy for a poll cycle.
//!
//! Every error here is recovered locally: a failed endpoint or field is
//! logged, recorded in the cycle outcome, and the next heartbeat carries on.

use thiserror::Error;

/// A single HTTP call failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url}: request timed out")]
    Timeout { url: String },

    #[error("{url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url}: HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("{url}: invalid JSON body: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Obtaining or refreshing an OAuth2 access token failed.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Exchange(#[from] FetchError),

    #[error("token response rejected: {reason}")]
    Payload { reason: String, payload: String },
}

/// An expected field was missing or malformed in an otherwise successful
/// response. `payload` carries the raw body for diagnostics.
#[derive(Debug, Error)]
#[error("{field}: {reason}")]
pub struct MappingError {
    pub field: &'static str,
    pub reason: String,
    pub payload: String,
}

impl MappingError {
    pub fn new(field: &'static str, reason: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
            payload: payload.into(),
        }
    }
}

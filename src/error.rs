//! Error types for vertex orchestration
//!
//! Two layers: [`VertexError`] describes a single failed call to one node,
//! [`OrchestratorError`] describes which cluster-wide step failed and, for
//! fan-out steps, which node caused it.

use crate::config::ConfigError;
use thiserror::Error;

/// Failure of a single request to one vertex node
#[derive(Debug, Error)]
pub enum VertexError {
    /// Connection, TLS or timeout failure before a response arrived
    #[error("transport error calling {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Node answered with a non-success HTTP status
    #[error("vertex {url} returned HTTP {status}: {body}")]
    Remote {
        url: String,
        status: u16,
        body: String,
    },

    /// Response body was not the JSON we expected
    #[error("invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    /// Response decoded but lacks a required field
    #[error("response from {url} is missing `{field}`")]
    MissingField { url: String, field: &'static str },
}

impl VertexError {
    /// HTTP status reported by the node, if it answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            VertexError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure of a cluster-wide orchestration step
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("room creation failed: {0}")]
    RoomCreation(#[source] VertexError),

    #[error("key generation failed on node {node}: {source}")]
    KeyGeneration {
        node: usize,
        #[source]
        source: VertexError,
    },

    #[error("public key derivation failed on node {node}: {source}")]
    Derivation {
        node: usize,
        #[source]
        source: VertexError,
    },

    #[error("node {node} derived a different public key than node 0")]
    PublicKeyMismatch { node: usize },

    #[error("signing failed on node {node}: {source}")]
    Signing {
        node: usize,
        #[source]
        source: VertexError,
    },

    #[error("signatures do not match across vertices (node {node} disagrees with node 0)")]
    SignatureMismatch { node: usize },

    #[error("policy binding failed on node {node}: {source}")]
    PolicyBinding {
        node: usize,
        #[source]
        source: VertexError,
    },

    #[error("encryption key fetch failed on node {node}: {source}")]
    KeyFetch {
        node: usize,
        #[source]
        source: VertexError,
    },

    #[error("secret share import failed on node {node}: {source}")]
    SecretImport {
        node: usize,
        #[source]
        source: VertexError,
    },

    #[error("secret sharing failed: {0}")]
    SecretSharing(String),

    #[error("key encoding failed: {0}")]
    Encoding(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("session request rejected with status {status}: {message}")]
    SessionRejected { status: u16, message: String },

    #[error("no response to session request {request_id} within {timeout_ms}ms")]
    SessionTimeout { request_id: String, timeout_ms: u64 },

    #[error("venue error: {0}")]
    Venue(String),

    #[error("operator prompt failed: {0}")]
    Prompt(#[from] std::io::Error),
}

impl OrchestratorError {
    /// Create an invalid-parameters error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameters(msg.into())
    }

    /// Create a session error
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Create a venue error
    pub fn venue(msg: impl Into<String>) -> Self {
        Self::Venue(msg.into())
    }

    /// Index of the node that caused a fan-out step to fail
    pub fn node(&self) -> Option<usize> {
        match self {
            OrchestratorError::KeyGeneration { node, .. }
            | OrchestratorError::PublicKeyMismatch { node }
            | OrchestratorError::Signing { node, .. }
            | OrchestratorError::SignatureMismatch { node }
            | OrchestratorError::PolicyBinding { node, .. }
            | OrchestratorError::KeyFetch { node, .. }
            | OrchestratorError::SecretImport { node, .. }
            | OrchestratorError::Derivation { node, .. } => Some(*node),
            OrchestratorError::RoomCreation(_) => Some(0),
            _ => None,
        }
    }

    /// True when nodes answered but disagreed. These must never be
    /// downgraded to "take the first answer".
    pub fn is_fatal_consistency(&self) -> bool {
        matches!(
            self,
            OrchestratorError::SignatureMismatch { .. }
                | OrchestratorError::PublicKeyMismatch { .. }
        )
    }

    /// Stable error code for logs and exit reporting
    pub fn error_code(&self) -> &'static str {
        match self {
            OrchestratorError::Config(_) => "CONFIG_ERROR",
            OrchestratorError::InvalidParameters(_) => "INVALID_PARAMETERS",
            OrchestratorError::RoomCreation(_) => "ROOM_CREATION_ERROR",
            OrchestratorError::KeyGeneration { .. } => "KEY_GENERATION_ERROR",
            OrchestratorError::Derivation { .. } => "DERIVATION_ERROR",
            OrchestratorError::PublicKeyMismatch { .. } => "PUBLIC_KEY_MISMATCH",
            OrchestratorError::Signing { .. } => "SIGNING_ERROR",
            OrchestratorError::SignatureMismatch { .. } => "SIGNATURE_MISMATCH",
            OrchestratorError::PolicyBinding { .. } => "POLICY_BINDING_ERROR",
            OrchestratorError::KeyFetch { .. } => "KEY_FETCH_ERROR",
            OrchestratorError::SecretImport { .. } => "SECRET_IMPORT_ERROR",
            OrchestratorError::SecretSharing(_) => "SECRET_SHARING_ERROR",
            OrchestratorError::Encoding(_) => "ENCODING_ERROR",
            OrchestratorError::Session(_) => "SESSION_ERROR",
            OrchestratorError::SessionRejected { .. } => "SESSION_REJECTED",
            OrchestratorError::SessionTimeout { .. } => "SESSION_TIMEOUT",
            OrchestratorError::Venue(_) => "VENUE_ERROR",
            OrchestratorError::Prompt(_) => "PROMPT_ERROR",
        }
    }
}

/// Result type alias using OrchestratorError
pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(status: u16) -> VertexError {
        VertexError::Remote {
            url: "http://vertex-2".to_string(),
            status,
            body: "boom".to_string(),
        }
    }

    #[test]
    fn test_node_scoped_errors() {
        let err = OrchestratorError::Signing {
            node: 2,
            source: remote(500),
        };
        assert_eq!(err.node(), Some(2));
        assert_eq!(err.error_code(), "SIGNING_ERROR");
        assert!(err.to_string().contains("node 2"));
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn test_consistency_errors_are_fatal() {
        assert!(OrchestratorError::SignatureMismatch { node: 1 }.is_fatal_consistency());
        assert!(OrchestratorError::PublicKeyMismatch { node: 2 }.is_fatal_consistency());
        assert!(!OrchestratorError::Signing {
            node: 1,
            source: remote(503)
        }
        .is_fatal_consistency());
    }

    #[test]
    fn test_vertex_error_status() {
        assert_eq!(remote(404).status(), Some(404));
        let missing = VertexError::MissingField {
            url: "http://vertex-0".to_string(),
            field: "room_uuid",
        };
        assert_eq!(missing.status(), None);
        assert!(missing.to_string().contains("room_uuid"));
    }

    #[test]
    fn test_derivation_keeps_failing_node() {
        let err = OrchestratorError::Derivation {
            node: 2,
            source: remote(500),
        };
        assert_eq!(err.node(), Some(2));
        assert_eq!(err.error_code(), "DERIVATION_ERROR");
        assert!(err.to_string().contains("node 2"));
    }

    #[test]
    fn test_leader_steps_report_node_zero() {
        let err = OrchestratorError::RoomCreation(remote(502));
        assert_eq!(err.node(), Some(0));
        assert_eq!(err.error_code(), "ROOM_CREATION_ERROR");
    }
}

//! Fan-out signing with cross-node agreement
//!
//! A signature is only returned when every vertex produced exactly the
//! same bytes. Any failed node, malformed answer, or disagreement fails the
//! whole request. Agreement is never relaxed to a threshold or majority.

use crate::client::{fan_out, require_field, VertexClient};
use crate::config::{Cluster, Vertex};
use crate::error::{OrchestratorError, Result, VertexError};
use crate::room::RoomCoordinator;
use crate::types::{KeyName, Scheme, SignRequest, SignResponse, Signature};
use async_trait::async_trait;
use std::sync::Arc;

/// Anything that can produce a signature over a payload with a named key
#[async_trait]
pub trait PayloadSigner: Send + Sync {
    async fn sign_payload(&self, key_name: &KeyName, payload: &[u8]) -> Result<Signature>;
}

/// Orchestrates one signing round across all vertices
#[derive(Debug, Clone)]
pub struct SigningOrchestrator {
    cluster: Arc<Cluster>,
    client: VertexClient,
    rooms: RoomCoordinator,
    scheme: Scheme,
}

impl SigningOrchestrator {
    pub fn new(cluster: Arc<Cluster>, client: VertexClient, scheme: Scheme) -> Self {
        let rooms = RoomCoordinator::new(cluster.clone(), client.clone());
        Self {
            cluster,
            client,
            rooms,
            scheme,
        }
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Sign `message` with `key_name` on every vertex
    pub async fn sign(&self, key_name: &KeyName, message: &[u8]) -> Result<Signature> {
        let room = self.rooms.create_room().await?;
        let request = SignRequest::new(self.scheme, &room, key_name, message);
        let path = self.scheme.sign_path();

        tracing::debug!(
            key_name = %key_name,
            room = %room,
            scheme = %self.scheme,
            message_len = message.len(),
            "Requesting signatures"
        );

        let signatures = fan_out(
            &self.cluster,
            "sign",
            |_, vertex| self.request_signature(vertex, &path, &request),
            |node, source| OrchestratorError::Signing { node, source },
        )
        .await?;

        let signature = agree(signatures).map_err(|node| {
            tracing::error!(
                key_name = %key_name,
                room = %room,
                node,
                "Signatures do not match across vertices"
            );
            OrchestratorError::SignatureMismatch { node }
        })?;

        tracing::info!(
            key_name = %key_name,
            room = %room,
            signature_len = signature.len(),
            "Signature agreed by all vertices"
        );
        Ok(signature)
    }

    async fn request_signature(
        &self,
        vertex: &Vertex,
        path: &str,
        request: &SignRequest,
    ) -> std::result::Result<Signature, VertexError> {
        let response: SignResponse = self.client.post(vertex, path, request).await?;
        let signature_hex = require_field(vertex, path, "signature", response.signature)?;

        let bytes = hex::decode(signature_hex.trim()).map_err(|e| VertexError::InvalidResponse {
            url: vertex.endpoint(path),
            reason: format!("signature is not hex: {}", e),
        })?;

        let expected = self.scheme.signature_len();
        if bytes.len() != expected {
            return Err(VertexError::InvalidResponse {
                url: vertex.endpoint(path),
                reason: format!("signature is {} bytes, expected {}", bytes.len(), expected),
            });
        }

        Ok(Signature::from_bytes(bytes))
    }
}

#[async_trait]
impl PayloadSigner for SigningOrchestrator {
    async fn sign_payload(&self, key_name: &KeyName, payload: &[u8]) -> Result<Signature> {
        self.sign(key_name, payload).await
    }
}

/// Collapse N signatures into one, or return the first node that
/// disagrees with node 0.
fn agree(signatures: Vec<Signature>) -> std::result::Result<Signature, usize> {
    let mut iter = signatures.into_iter();
    let first = iter.next().ok_or(0usize)?;

    for (offset, other) in iter.enumerate() {
        if other != first {
            return Err(offset + 1);
        }
    }

    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(byte: u8) -> Signature {
        Signature::from_bytes(vec![byte; 64])
    }

    #[test]
    fn test_agree_identical() {
        let agreed = agree(vec![sig(1), sig(1), sig(1)]).unwrap();
        assert_eq!(agreed, sig(1));
    }

    #[test]
    fn test_agree_reports_first_divergent_node() {
        assert_eq!(agree(vec![sig(1), sig(1), sig(2)]), Err(2));
        assert_eq!(agree(vec![sig(1), sig(2), sig(3)]), Err(1));
    }

    #[test]
    fn test_agree_rejects_empty() {
        assert!(agree(Vec::new()).is_err());
    }
}

//! Distributed key generation
//!
//! Fans a keygen request out to every vertex, then asks the leader for the
//! resulting public key. All N nodes must succeed; there is no rollback if
//! some of them already stored a share. Retry with a new key name.

use crate::client::{fan_out, require_field, VertexClient};
use crate::config::{Cluster, Vertex};
use crate::error::{OrchestratorError, Result, VertexError};
use crate::room::RoomCoordinator;
use crate::types::{DerivePubkeyRequest, DerivePubkeyResponse, KeyName, KeygenRequest, PublicKey, Scheme};
use std::sync::Arc;

/// Orchestrates distributed keygen and public key derivation
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    cluster: Arc<Cluster>,
    client: VertexClient,
    rooms: RoomCoordinator,
    scheme: Scheme,
}

impl KeyGenerator {
    pub fn new(cluster: Arc<Cluster>, client: VertexClient, scheme: Scheme) -> Self {
        let rooms = RoomCoordinator::new(cluster.clone(), client.clone());
        Self {
            cluster,
            client,
            rooms,
            scheme,
        }
    }

    /// Generate a key using the cluster's own size and threshold
    pub async fn generate(&self, key_name: &KeyName) -> Result<PublicKey> {
        let threshold = self.cluster.threshold;
        self.generate_key(key_name, self.cluster.size(), threshold).await
    }

    /// Materialize `key_name` on every vertex and return its public key
    ///
    /// # Arguments
    /// * `key_name` - Cluster-wide name for the new key
    /// * `num_parties` - Must equal the cluster size
    /// * `threshold` - Shares required by the underlying scheme (1..=num_parties)
    pub async fn generate_key(
        &self,
        key_name: &KeyName,
        num_parties: usize,
        threshold: u16,
    ) -> Result<PublicKey> {
        if num_parties != self.cluster.size() {
            return Err(OrchestratorError::invalid(format!(
                "num_parties {} does not match cluster size {}",
                num_parties,
                self.cluster.size()
            )));
        }
        if threshold == 0 || usize::from(threshold) > num_parties {
            return Err(OrchestratorError::invalid(format!(
                "threshold {} must be between 1 and {}",
                threshold, num_parties
            )));
        }

        let room = self.rooms.create_room().await?;

        tracing::info!(
            key_name = %key_name,
            room = %room,
            scheme = %self.scheme,
            threshold,
            num_parties,
            "Starting distributed keygen"
        );

        let request = KeygenRequest {
            room_uuid: room,
            key_name: key_name.clone(),
            num_parties,
            threshold,
            cluster_name: self.cluster.name.clone(),
        };
        let path = self.scheme.keygen_path();

        fan_out(
            &self.cluster,
            "keygen",
            |_, vertex| self.client.call(vertex, &path, &request),
            |node, source| OrchestratorError::KeyGeneration { node, source },
        )
        .await?;

        tracing::info!(key_name = %key_name, "Keygen complete on all vertices");

        let public_key = self
            .derive_from(self.cluster.leader(), key_name)
            .await
            .map_err(|source| OrchestratorError::Derivation { node: 0, source })?;

        if self.cluster.verify_public_key {
            self.verify_public_key_agreement(key_name, &public_key).await?;
        }

        tracing::info!(key_name = %key_name, pubkey = %public_key.to_hex(), "Derived public key");
        Ok(public_key)
    }

    /// Derive the public key of `key_name` from the leader only
    pub async fn derive_public_key(&self, key_name: &KeyName) -> Result<PublicKey> {
        self.derive_from(self.cluster.leader(), key_name)
            .await
            .map_err(|source| OrchestratorError::Derivation { node: 0, source })
    }

    /// Derive the key on every vertex and require all of them to match `expected`
    pub async fn verify_public_key_agreement(
        &self,
        key_name: &KeyName,
        expected: &PublicKey,
    ) -> Result<()> {
        let keys = fan_out(
            &self.cluster,
            "derive-pubkey",
            |_, vertex| self.derive_from(vertex, key_name),
            |node, source| OrchestratorError::Derivation { node, source },
        )
        .await?;

        if let Some(node) = keys.iter().position(|key| key != expected) {
            tracing::error!(key_name = %key_name, node, "Vertices disagree on public key");
            return Err(OrchestratorError::PublicKeyMismatch { node });
        }

        Ok(())
    }

    async fn derive_from(
        &self,
        vertex: &Vertex,
        key_name: &KeyName,
    ) -> std::result::Result<PublicKey, VertexError> {
        let path = self.scheme.derive_pubkey_path();
        let request = DerivePubkeyRequest {
            key_name: key_name.clone(),
            derivation_path: Vec::new(),
        };

        let response: DerivePubkeyResponse = self.client.post(vertex, &path, &request).await?;
        let pubkey_hex = require_field(vertex, &path, "pubkey", response.pubkey)?;

        let bytes = hex::decode(pubkey_hex.trim()).map_err(|e| VertexError::InvalidResponse {
            url: vertex.endpoint(&path),
            reason: format!("pubkey is not hex: {}", e),
        })?;

        Ok(PublicKey::from_bytes(bytes))
    }
}

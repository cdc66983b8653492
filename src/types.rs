//! Request and response types for the vertex node API

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Signature scheme a distributed key belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Ed25519,
    HmacSha256,
}

impl Scheme {
    /// Path segment used by the vertex API
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Ed25519 => "ed25519",
            Scheme::HmacSha256 => "hmac-sha256",
        }
    }

    /// Byte length of a signature (or MAC) produced under this scheme
    pub fn signature_len(&self) -> usize {
        match self {
            Scheme::Ed25519 => 64,
            Scheme::HmacSha256 => 32,
        }
    }

    pub fn keygen_path(&self) -> String {
        format!("/cluster/{}/keygen", self.as_str())
    }

    pub fn sign_path(&self) -> String {
        format!("/{}/sign", self.as_str())
    }

    pub fn derive_pubkey_path(&self) -> String {
        format!("/{}/derive-pubkey", self.as_str())
    }

    pub fn import_share_path(&self) -> String {
        format!("/cluster/{}/import-secret-share", self.as_str())
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ed25519" => Ok(Scheme::Ed25519),
            "hmac-sha256" | "hmac" => Ok(Scheme::HmacSha256),
            other => Err(format!("unknown scheme: {} (use 'ed25519' or 'hmac-sha256')", other)),
        }
    }
}

/// Cluster-wide name of one distributed key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyName(String);

impl KeyName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Fresh random name for a new logical session
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of an ephemeral coordination room
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Public key derived from the leader after keygen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

/// Signature agreed on by every node of the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    pub room_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    #[serde(default)]
    pub room_uuid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeygenRequest {
    pub room_uuid: RoomId,
    pub key_name: KeyName,
    pub num_parties: usize,
    pub threshold: u16,
    pub cluster_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivePubkeyRequest {
    pub key_name: KeyName,
    /// Always empty: no subkeys are derived
    pub derivation_path: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivePubkeyResponse {
    #[serde(default)]
    pub pubkey: Option<String>,
}

/// Sign request; field names differ between schemes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignRequest {
    Ed25519 {
        room_uuid: RoomId,
        key_name: KeyName,
        /// Hex of the payload
        msg: String,
    },
    HmacSha256 {
        room_uuid: RoomId,
        key_name: KeyName,
        /// Hex of the payload
        message: String,
        extra_data: String,
    },
}

impl SignRequest {
    pub fn new(scheme: Scheme, room: &RoomId, key_name: &KeyName, payload: &[u8]) -> Self {
        let hex_payload = hex::encode(payload);
        match scheme {
            Scheme::Ed25519 => SignRequest::Ed25519 {
                room_uuid: room.clone(),
                key_name: key_name.clone(),
                msg: hex_payload,
            },
            Scheme::HmacSha256 => SignRequest::HmacSha256 {
                room_uuid: room.clone(),
                key_name: key_name.clone(),
                message: hex_payload,
                extra_data: String::new(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignResponse {
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeygenIdResponse {
    #[serde(default)]
    pub keygen_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportShareRequest {
    pub cluster_name: String,
    pub key_share: String,
    pub encrypted: bool,
    pub key_name: KeyName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachPolicyRequest {
    pub key_name: KeyName,
    pub policy_name: String,
}

//! Public key encoding for venue registration

use crate::error::{OrchestratorError, Result};
use crate::types::PublicKey;
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::EncodePublicKey;
use ed25519_dalek::VerifyingKey;

/// Encode a raw 32-byte Ed25519 public key as an SPKI PEM document
pub fn encode_public_key_pem(public_key: &PublicKey) -> Result<String> {
    let bytes: [u8; 32] = public_key.as_bytes().try_into().map_err(|_| {
        OrchestratorError::Encoding(format!(
            "expected 32-byte Ed25519 public key, got {} bytes",
            public_key.as_bytes().len()
        ))
    })?;

    let key = VerifyingKey::from_bytes(&bytes)
        .map_err(|e| OrchestratorError::Encoding(format!("invalid Ed25519 point: {}", e)))?;

    key.to_public_key_pem(LineEnding::LF)
        .map_err(|e| OrchestratorError::Encoding(e.to_string()))
}

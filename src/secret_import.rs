//! Import of a pre-existing shared secret
//!
//! The raw secret is split into one encrypted share per vertex, each share
//! encrypted toward that vertex's persistent encryption key, then every
//! vertex imports its own share under the given key name.

use crate::client::{fan_out, require_field, VertexClient};
use crate::config::Cluster;
use crate::error::{OrchestratorError, Result};
use crate::types::{ImportShareRequest, KeyName, KeygenIdResponse, Scheme};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const KEYGEN_ID_PATH: &str = "/cluster/persistent-keygen-id";

/// Splits a secret into encrypted shares, one per recipient key, in
/// recipient order
#[async_trait]
pub trait SecretSharer: Send + Sync {
    async fn split(&self, secret: &[u8], recipients: &[String]) -> Result<Vec<String>>;
}

/// Input handed to an external sharing program on stdin
#[derive(Debug, Serialize)]
struct SharerInput<'a> {
    secret_hex: String,
    recipients: &'a [String],
}

/// Delegates splitting to an external program.
///
/// The program receives `{"secret_hex": "...", "recipients": [...]}` on
/// stdin and must print a JSON array of share strings on stdout.
#[derive(Debug, Clone)]
pub struct CommandSharer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandSharer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl SecretSharer for CommandSharer {
    async fn split(&self, secret: &[u8], recipients: &[String]) -> Result<Vec<String>> {
        let input = serde_json::to_vec(&SharerInput {
            secret_hex: hex::encode(secret),
            recipients,
        })
        .map_err(|e| OrchestratorError::SecretSharing(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                OrchestratorError::SecretSharing(format!(
                    "failed to start {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&input)
                .await
                .map_err(|e| OrchestratorError::SecretSharing(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| OrchestratorError::SecretSharing(e.to_string()))?;

        if !output.status.success() {
            return Err(OrchestratorError::SecretSharing(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| OrchestratorError::SecretSharing(format!("invalid sharer output: {}", e)))
    }
}

/// Orchestrates secret share distribution
pub struct SecretImporter {
    cluster: Arc<Cluster>,
    client: VertexClient,
    sharer: Arc<dyn SecretSharer>,
    scheme: Scheme,
}

impl SecretImporter {
    pub fn new(
        cluster: Arc<Cluster>,
        client: VertexClient,
        sharer: Arc<dyn SecretSharer>,
        scheme: Scheme,
    ) -> Self {
        Self {
            cluster,
            client,
            sharer,
            scheme,
        }
    }

    /// Fetch every vertex's persistent encryption key, in node order
    pub async fn fetch_encryption_keys(&self) -> Result<Vec<String>> {
        fan_out(
            &self.cluster,
            "keygen-id",
            |_, vertex| async move {
                let response: KeygenIdResponse = self.client.get(vertex, KEYGEN_ID_PATH).await?;
                require_field(vertex, KEYGEN_ID_PATH, "keygen_id", response.keygen_id)
            },
            |node, source| OrchestratorError::KeyFetch { node, source },
        )
        .await
    }

    /// Split `secret` and import one encrypted share per vertex
    pub async fn import_secret(&self, key_name: &KeyName, secret: &[u8]) -> Result<()> {
        if secret.is_empty() {
            return Err(OrchestratorError::invalid("secret cannot be empty"));
        }

        let recipients = self.fetch_encryption_keys().await?;
        tracing::debug!(key_name = %key_name, recipients = recipients.len(), "Fetched vertex encryption keys");

        let shares = self.sharer.split(secret, &recipients).await?;
        if shares.len() != self.cluster.size() {
            return Err(OrchestratorError::SecretSharing(format!(
                "expected {} shares, got {}",
                self.cluster.size(),
                shares.len()
            )));
        }

        let path = self.scheme.import_share_path();
        let requests: Vec<ImportShareRequest> = shares
            .into_iter()
            .map(|key_share| ImportShareRequest {
                cluster_name: self.cluster.name.clone(),
                key_share,
                encrypted: true,
                key_name: key_name.clone(),
            })
            .collect();

        fan_out(
            &self.cluster,
            "import-secret-share",
            |node, vertex| self.client.call(vertex, &path, &requests[node]),
            |node, source| OrchestratorError::SecretImport { node, source },
        )
        .await?;

        tracing::info!(key_name = %key_name, shares = requests.len(), "Secret shares imported on all vertices");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_command_sharer_missing_program() {
        let sharer = CommandSharer::new("/nonexistent/sharer-binary", Vec::new());
        let result = sharer.split(b"secret", &["a".to_string()]).await;
        assert!(matches!(result, Err(OrchestratorError::SecretSharing(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_sharer_reads_stdout() {
        let sharer = CommandSharer::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"cat > /dev/null; echo '["s0","s1","s2"]'"#.to_string(),
            ],
        );
        let recipients: Vec<String> = (0..3).map(|i| format!("pk{}", i)).collect();
        let shares = sharer.split(b"secret", &recipients).await.unwrap();
        assert_eq!(shares, vec!["s0", "s1", "s2"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_sharer_nonzero_exit() {
        let sharer = CommandSharer::new(
            "sh",
            vec!["-c".to_string(), "cat > /dev/null; echo nope >&2; exit 3".to_string()],
        );
        match sharer.split(b"secret", &[]).await {
            Err(OrchestratorError::SecretSharing(msg)) => assert!(msg.contains("nope")),
            other => panic!("unexpected: {:?}", other),
        }
    }
}

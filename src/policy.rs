//! Policy binding
//!
//! Attaches a named policy to a key on every vertex. All nodes must accept;
//! nodes that already accepted are not reverted when another one fails.

use crate::client::{fan_out, VertexClient};
use crate::config::Cluster;
use crate::error::{OrchestratorError, Result};
use crate::types::{AttachPolicyRequest, KeyName};
use std::sync::Arc;

const ATTACH_POLICY_PATH: &str = "/admin/policies/attach-policy-to-key";

#[derive(Debug, Clone)]
pub struct PolicyBinder {
    cluster: Arc<Cluster>,
    client: VertexClient,
}

impl PolicyBinder {
    pub fn new(cluster: Arc<Cluster>, client: VertexClient) -> Self {
        Self { cluster, client }
    }

    /// Bind `policy_name` to `key_name` on all vertices
    pub async fn attach_policy(&self, key_name: &KeyName, policy_name: &str) -> Result<()> {
        if policy_name.trim().is_empty() {
            return Err(OrchestratorError::invalid("policy name cannot be empty"));
        }

        let request = AttachPolicyRequest {
            key_name: key_name.clone(),
            policy_name: policy_name.to_string(),
        };

        fan_out(
            &self.cluster,
            "attach-policy",
            |_, vertex| self.client.call(vertex, ATTACH_POLICY_PATH, &request),
            |node, source| OrchestratorError::PolicyBinding { node, source },
        )
        .await?;

        tracing::info!(key_name = %key_name, policy = policy_name, "Policy attached on all vertices");
        Ok(())
    }
}

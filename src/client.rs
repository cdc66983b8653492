//! Typed HTTP client for vertex nodes
//!
//! Every request carries the node's credential in the `Authorization`
//! header. There are no retries: one failed call fails the calling step.

use crate::config::{Cluster, Vertex};
use crate::error::{OrchestratorError, VertexError};
use futures_util::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

/// HTTP client shared by all orchestrators
#[derive(Debug, Clone)]
pub struct VertexClient {
    http: reqwest::Client,
}

impl VertexClient {
    /// Create a client with a per-request timeout
    pub fn new(timeout: Duration) -> Result<Self, OrchestratorError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OrchestratorError::invalid(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// Create a client using the cluster's configured timeout
    pub fn for_cluster(cluster: &Cluster) -> Result<Self, OrchestratorError> {
        Self::new(cluster.request_timeout)
    }

    /// POST a JSON body to `path` on `vertex` and return the raw JSON answer
    pub async fn call<B>(
        &self,
        vertex: &Vertex,
        path: &str,
        body: &B,
    ) -> Result<serde_json::Value, VertexError>
    where
        B: Serialize + ?Sized,
    {
        self.post(vertex, path, body).await
    }

    /// POST and decode the response into `R`
    pub async fn post<B, R>(&self, vertex: &Vertex, path: &str, body: &B) -> Result<R, VertexError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = vertex.endpoint(path);
        tracing::trace!(url = %url, "POST to vertex");

        let request = self
            .http
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, &vertex.api_key)
            .json(body);

        Self::decode(url, request.send().await).await
    }

    /// GET `path` on `vertex` and decode the response into `R`
    pub async fn get<R>(&self, vertex: &Vertex, path: &str) -> Result<R, VertexError>
    where
        R: DeserializeOwned,
    {
        let url = vertex.endpoint(path);
        tracing::trace!(url = %url, "GET from vertex");

        let request = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, &vertex.api_key);

        Self::decode(url, request.send().await).await
    }

    async fn decode<R: DeserializeOwned>(
        url: String,
        sent: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<R, VertexError> {
        let response = sent.map_err(|source| VertexError::Transport {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VertexError::Remote {
                url,
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|source| VertexError::Transport {
            url: url.clone(),
            source,
        })?;

        // Some endpoints acknowledge with an empty body
        let bytes: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            &bytes
        };

        serde_json::from_slice(bytes).map_err(|e| VertexError::InvalidResponse {
            url,
            reason: e.to_string(),
        })
    }
}

/// Run `call` against every vertex concurrently and wait for all of them.
///
/// Returns the results in node order, or the error of the lowest-indexed
/// failing node wrapped by `wrap`. Every failure is logged, not just the
/// one returned.
pub async fn fan_out<'a, T, F, Fut, W>(
    cluster: &'a Cluster,
    step: &'static str,
    call: F,
    wrap: W,
) -> Result<Vec<T>, OrchestratorError>
where
    F: Fn(usize, &'a Vertex) -> Fut,
    Fut: Future<Output = Result<T, VertexError>>,
    W: Fn(usize, VertexError) -> OrchestratorError,
{
    let results = join_all(
        cluster
            .vertices
            .iter()
            .enumerate()
            .map(|(node, vertex)| call(node, vertex)),
    )
    .await;

    let mut values = Vec::with_capacity(results.len());
    let mut first_failure = None;

    for (node, result) in results.into_iter().enumerate() {
        match result {
            Ok(value) => values.push(value),
            Err(e) => {
                tracing::warn!(step, node, error = %e, "vertex call failed");
                if first_failure.is_none() {
                    first_failure = Some((node, e));
                }
            }
        }
    }

    match first_failure {
        Some((node, e)) => Err(wrap(node, e)),
        None => Ok(values),
    }
}

/// Turn an absent response field into a `MissingField` error
pub fn require_field<T>(
    vertex: &Vertex,
    path: &str,
    field: &'static str,
    value: Option<T>,
) -> Result<T, VertexError> {
    value.ok_or_else(|| VertexError::MissingField {
        url: vertex.endpoint(path),
        field,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> Cluster {
        Cluster::new(
            "c",
            (0..3)
                .map(|i| Vertex::new(format!("http://vertex-{}", i), format!("key-{}", i)))
                .collect(),
            2,
        )
        .unwrap()
    }

    fn failure(node: usize) -> VertexError {
        VertexError::Remote {
            url: format!("http://vertex-{}", node),
            status: 500,
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn test_fan_out_collects_in_node_order() {
        let cluster = cluster();
        let result = fan_out(
            &cluster,
            "test",
            |node, _| async move { Ok::<_, VertexError>(node * 10) },
            |node, source| OrchestratorError::Signing { node, source },
        )
        .await
        .unwrap();
        assert_eq!(result, vec![0, 10, 20]);
    }

    #[tokio::test]
    async fn test_fan_out_single_failure_fails_step() {
        let cluster = cluster();
        let result = fan_out(
            &cluster,
            "test",
            |node, _| async move {
                if node == 2 {
                    Err(failure(node))
                } else {
                    Ok(node)
                }
            },
            |node, source| OrchestratorError::PolicyBinding { node, source },
        )
        .await;

        match result {
            Err(OrchestratorError::PolicyBinding { node, source }) => {
                assert_eq!(node, 2);
                assert_eq!(source.status(), Some(500));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fan_out_reports_lowest_failing_node() {
        let cluster = cluster();
        let result: Result<Vec<usize>, _> = fan_out(
            &cluster,
            "test",
            |node, _| async move { if node == 0 { Ok(node) } else { Err(failure(node)) } },
            |node, source| OrchestratorError::KeyGeneration { node, source },
        )
        .await;
        assert_eq!(result.unwrap_err().node(), Some(1));
    }

    #[test]
    fn test_require_field() {
        let vertex = Vertex::new("http://vertex-0/", "k");
        assert_eq!(require_field(&vertex, "/x", "f", Some(1)).unwrap(), 1);
        match require_field::<u8>(&vertex, "/create-room", "room_uuid", None) {
            Err(VertexError::MissingField { url, field }) => {
                assert_eq!(url, "http://vertex-0/create-room");
                assert_eq!(field, "room_uuid");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}

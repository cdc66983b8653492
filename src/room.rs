//! Room creation
//!
//! Every keygen or signing round needs a fresh room sized to the cluster.
//! Rooms are always created on the leader (node 0) and never reused.

use crate::client::{require_field, VertexClient};
use crate::config::Cluster;
use crate::error::{OrchestratorError, Result};
use crate::types::{CreateRoomRequest, CreateRoomResponse, RoomId};
use std::sync::Arc;

const CREATE_ROOM_PATH: &str = "/create-room";

/// Creates ephemeral coordination rooms on the cluster leader
#[derive(Debug, Clone)]
pub struct RoomCoordinator {
    cluster: Arc<Cluster>,
    client: VertexClient,
}

impl RoomCoordinator {
    pub fn new(cluster: Arc<Cluster>, client: VertexClient) -> Self {
        Self { cluster, client }
    }

    /// Create a fresh room for one multi-party operation
    pub async fn create_room(&self) -> Result<RoomId> {
        let leader = self.cluster.leader();
        let request = CreateRoomRequest {
            room_size: self.cluster.size(),
        };

        let response: CreateRoomResponse = self
            .client
            .post(leader, CREATE_ROOM_PATH, &request)
            .await
            .map_err(OrchestratorError::RoomCreation)?;

        let room_uuid = require_field(leader, CREATE_ROOM_PATH, "room_uuid", response.room_uuid)
            .map_err(OrchestratorError::RoomCreation)?;

        let room = RoomId::new(room_uuid);
        tracing::debug!(room = %room, size = request.room_size, "Created room");
        Ok(room)
    }
}

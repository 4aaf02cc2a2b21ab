//! Boundary towards the chat/directory service.
//!
//! Friends, pending requests and message history live on the remote
//! service; the core only awaits these reads and forwards the results.
//! A real implementation wraps the service's HTTP API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sohbet_shared::types::PeerId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Friend {
    pub id: PeerId,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FriendRequest {
    pub id: i64,
    pub sender: String,
}

/// A stored message as the directory service returns it, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryMessage {
    pub sender_id: PeerId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Full message history with `peer`, oldest first.
    async fn message_history(&self, peer: PeerId) -> anyhow::Result<Vec<HistoryMessage>>;

    async fn friends(&self) -> anyhow::Result<Vec<Friend>>;

    async fn pending_requests(&self) -> anyhow::Result<Vec<FriendRequest>>;

    async fn add_friend(&self, username: &str) -> anyhow::Result<()>;

    async fn accept_request(&self, request_id: i64) -> anyhow::Result<()>;
}

//! Posts as the backend persists them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a post.
///
/// Statuses the dashboard does not know about are kept verbatim in
/// [`PostStatus::Other`] so they survive a decode/encode cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PostStatus {
    Draft,
    Pending,
    Scheduled,
    Rejected,
    Published,
    Failed,
    Other(String),
}

impl PostStatus {
    /// The six statuses of the publishing workflow.
    pub const KNOWN: [PostStatus; 6] = [
        PostStatus::Draft,
        PostStatus::Pending,
        PostStatus::Scheduled,
        PostStatus::Rejected,
        PostStatus::Published,
        PostStatus::Failed,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Pending => "pending",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Rejected => "rejected",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
            PostStatus::Other(s) => s,
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for PostStatus {
    fn from(s: &str) -> Self {
        match s {
            "draft" => PostStatus::Draft,
            "pending" => PostStatus::Pending,
            "scheduled" => PostStatus::Scheduled,
            "rejected" => PostStatus::Rejected,
            "published" => PostStatus::Published,
            "failed" => PostStatus::Failed,
            other => PostStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for PostStatus {
    fn from(s: String) -> Self {
        PostStatus::from(s.as_str())
    }
}

impl From<PostStatus> for String {
    fn from(status: PostStatus) -> Self {
        match status {
            PostStatus::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

/// A content post.
///
/// Only the fields the workflow reads are typed; the rest of the backend
/// payload (caption, media, platforms, ...) is carried in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    pub status: PostStatus,
    #[serde(default)]
    pub is_client_approved: bool,
    #[serde(default)]
    pub is_moderator_rejected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Post {
    /// A post with the given status and no flags set.
    pub fn new(id: u64, status: PostStatus) -> Self {
        Self {
            id,
            status,
            is_client_approved: false,
            is_moderator_rejected: false,
            scheduled_for: None,
            extra: serde_json::Map::new(),
        }
    }
}

//! Post publishing workflow.
//!
//! ```text
//! draft ──▶ pending ──▶ scheduled ──▶ published
//!              ▲  │          │
//!   resubmit   │  ▼          ▼
//!           rejected       failed
//! ```
//!
//! Both functions here are advisory: the backend re-checks every transition.

use crate::{Post, PostStatus, Role};
use serde::{Deserialize, Serialize};

/// Status to write back when `role` submits an edit of `post`.
pub fn determine_update_status(post: &Post, role: Role) -> PostStatus {
    match post.status {
        PostStatus::Rejected => PostStatus::Pending,
        PostStatus::Pending => PostStatus::Pending,
        PostStatus::Draft => PostStatus::Scheduled,
        // Staff edits of a scheduled post go back through review.
        PostStatus::Scheduled if role.is_staff() => PostStatus::Pending,
        PostStatus::Scheduled => PostStatus::Scheduled,
        PostStatus::Published => PostStatus::Published,
        PostStatus::Failed | PostStatus::Other(_) => PostStatus::Scheduled,
    }
}

/// Actions the UI may offer for a post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub can_client_approve: bool,
    pub can_client_reject: bool,
    pub can_moderator_validate: bool,
    pub can_moderator_reject: bool,
    pub can_resubmit: bool,
    pub can_publish: bool,
    pub next_action: String,
}

impl WorkflowStatus {
    fn info(next_action: &str) -> Self {
        Self {
            next_action: next_action.to_string(),
            ..Default::default()
        }
    }
}

/// Which actions `role` can take on `post` right now.
pub fn workflow_status(post: &Post, role: Role) -> WorkflowStatus {
    let staff = role.is_staff();

    match &post.status {
        PostStatus::Draft if staff => {
            if post.scheduled_for.is_some() {
                WorkflowStatus::info("Submit for review")
            } else {
                WorkflowStatus::info("Set a publication date, then submit for review")
            }
        }
        PostStatus::Draft => WorkflowStatus::info("Draft"),

        PostStatus::Pending if staff => WorkflowStatus {
            can_moderator_validate: true,
            can_moderator_reject: true,
            next_action: "Validate or reject".to_string(),
            ..Default::default()
        },
        PostStatus::Pending if role.is_client() => {
            if post.is_client_approved {
                WorkflowStatus::info("Approved, awaiting moderator validation")
            } else {
                WorkflowStatus {
                    can_client_approve: true,
                    can_client_reject: true,
                    next_action: "Approve or reject".to_string(),
                    ..Default::default()
                }
            }
        }
        PostStatus::Pending => WorkflowStatus::info("Pending review"),

        PostStatus::Rejected if staff => WorkflowStatus {
            can_resubmit: true,
            next_action: "Resubmit for review".to_string(),
            ..Default::default()
        },
        PostStatus::Rejected if post.is_moderator_rejected => {
            WorkflowStatus::info("Rejected by moderator")
        }
        PostStatus::Rejected => WorkflowStatus::info("Rejected"),

        PostStatus::Scheduled if staff => WorkflowStatus {
            can_publish: true,
            next_action: "Publish now".to_string(),
            ..Default::default()
        },
        PostStatus::Scheduled => WorkflowStatus::info("Scheduled for publication"),

        PostStatus::Published => WorkflowStatus::info("Published"),

        PostStatus::Failed if staff => WorkflowStatus {
            can_resubmit: true,
            next_action: "Publishing failed, resubmit".to_string(),
            ..Default::default()
        },
        PostStatus::Failed => WorkflowStatus::info("Publishing failed"),

        PostStatus::Other(_) => WorkflowStatus::info("Unknown status"),
    }
}

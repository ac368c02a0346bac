//! Core types for the postdeck dashboard client.
//!
//! This crate has no I/O. It provides the domain types shared by the client
//! and the CLI: roles, posts and their publishing workflow, credential
//! validation results, and the event feed wire format.

mod auth;
mod feed;
mod post;
mod role;
pub mod workflow;

pub use auth::{UserDescriptor, ValidationResult};
pub use feed::{
    ChatCommand, ChatMessage, FeedEvent, FrameError, Id, InboundFrame, LegacyFrame, LegacyMessage,
};
pub use post::{Post, PostStatus};
pub use role::{Role, RoleFlags};
pub use workflow::{WorkflowStatus, determine_update_status, workflow_status};

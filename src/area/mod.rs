/// Area domain layer - automation bindings, stored configuration, persistence
///
/// An Area binds one trigger (action) on an external or timer-based service
/// to one effect (reaction) on another service. This module owns the stored
/// shapes (Area, ServiceConnection, WorkflowData), the typed per-service
/// config views, and the SQLite repositories.

pub mod config;
pub mod store;
pub mod types;

pub use config::{
    ActionKind, DiscordReactionConfig, GenericConfig, GitHubActionConfig, GitHubReactionConfig,
    GmailActionConfig, ReactionKind,
};
pub use store::{AreaStore, ConnectionStore, ExecutionStatus};
pub use types::{Area, ServiceConnection, TimerActionConfig, TriggerConfig, WorkflowData};

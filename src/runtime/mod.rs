/// Trigger evaluation runtime
///
/// The engine half of the application: resolving stored configs into typed
/// per-service views, dispatching reactions for fired triggers, and the
/// background polling loops that drive both.

pub mod dispatcher;
pub mod resolver;
pub mod scheduler;

pub use dispatcher::ReactionDispatcher;
pub use scheduler::{PollingScheduler, TickStats};

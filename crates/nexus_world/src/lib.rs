//! World runtime: the session registry actor, per-zone simulation actors,
//! the tick scheduler, and the opcode handler set.
//!
//! Every piece of mutable state lives inside exactly one actor; other actors
//! reach it only through mailbox messages, with oneshot replies (bounded by a
//! timeout) where an answer is needed.

pub mod client;
pub mod handlers;
pub mod manager;
pub mod scheduled;
pub mod scheduler;
pub mod session;
pub mod zone;

pub use crate::client::{run_session_acceptor, SessionDeps, WorldSession};
pub use crate::handlers::{register_handlers, HandlerRegistry};
pub use crate::manager::{WorldHandle, WorldManager};
pub use crate::scheduler::{SchedulerHandle, TickScheduler};
pub use crate::session::{Session, ZoneKey};
pub use crate::zone::{ZoneHandle, ZoneInstance};

/// Reply timeout for inter-actor requests.
pub const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Zone simulation cadence.
pub const ZONE_TICK_MS: u64 = 100;

/// How far a player sees entity traffic.
pub const VIEW_RANGE: f32 = 128.0;

//! Nexus is a WildStar server emulator: three cooperating TCP servers
//! (auth → realm → world) in front of a per-zone authoritative simulation.
//!
//! This crate re-exports the workspace members and wires them together in
//! [`server`]; the `nexus` binary is a thin CLI over [`server::start`].

pub use nexus_auth as auth;
pub use nexus_content as content;
pub use nexus_game as game;
pub use nexus_network as network;
pub use nexus_protocol as protocol;
pub use nexus_spatial as spatial;
pub use nexus_storage as storage;
pub use nexus_world as world;

pub mod server;

#[cfg(test)]
mod tests;

//! Network layer: the three TCP acceptors (auth, realm, world), the
//! handshake flows, and the per-connection reader/writer actor pair that a
//! world session runs on.

pub mod auth_server;
pub mod clock;
pub mod connection;
pub mod keyring;
pub mod packet_io;
pub mod realm_server;
pub mod world_gate;

pub use crate::connection::{ConnectionHandle, NewWorldClient, OutboundFrame};
pub use crate::keyring::KeyRing;
pub use crate::packet_io::PacketIo;

use sha2::{Digest, Sha256};

/// Default timeout for one handshake step.
pub const HANDSHAKE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Proof the world client presents instead of the raw session key.
pub fn world_key_proof(session_key: &[u8; 16], account_id: u64) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(session_key);
    h.update(account_id.to_le_bytes());
    h.finalize().into()
}

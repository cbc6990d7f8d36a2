//! Hand-off of realm-issued session keys to the world acceptor.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

#[derive(Clone, Copy, Debug)]
struct PendingKey {
    session_key: [u8; 16],
    expires_at_ms: u64,
}

/// Session keys the realm server has issued but the world server has not yet
/// consumed. Entries are single-use and expire.
#[derive(Default)]
pub struct KeyRing {
    pending: RwLock<FxHashMap<u64, PendingKey>>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account_id: u64, session_key: [u8; 16], expires_at_ms: u64) {
        self.pending.write().insert(
            account_id,
            PendingKey {
                session_key,
                expires_at_ms,
            },
        );
    }

    /// Takes the pending key for `account_id`, if present and not expired.
    pub fn take(&self, account_id: u64, now_ms: u64) -> Option<[u8; 16]> {
        let entry = self.pending.write().remove(&account_id)?;
        (entry.expires_at_ms > now_ms).then_some(entry.session_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_single_use() {
        let ring = KeyRing::new();
        ring.insert(1, [7; 16], 1_000);
        assert_eq!(ring.take(1, 0), Some([7; 16]));
        assert_eq!(ring.take(1, 0), None);
    }

    #[test]
    fn expired_keys_are_not_returned() {
        let ring = KeyRing::new();
        ring.insert(1, [7; 16], 1_000);
        assert_eq!(ring.take(1, 1_000), None);
    }
}

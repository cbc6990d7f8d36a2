//! Persistence port.
//!
//! The world runtime assumes eventual consistency: snapshot writes may be
//! batched and deferred through [`SaveQueue`], and a storage outage degrades
//! to retries rather than blocking gameplay.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

use nexus_game::inventory::Inventory;
use nexus_game::PlayerFaction;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum StorageError {
    #[error("storage backend unavailable")]
    Unavailable,
    #[error("write conflict")]
    Conflict,
    #[error("record not found")]
    NotFound,
}

/// Account credentials as stored: an SRP6 salt and verifier, never a
/// password.
#[derive(Clone, Debug)]
pub struct AccountRecord {
    pub account_id: u64,
    pub email: String,
    pub salt: Vec<u8>,
    pub verifier: Vec<u8>,
    pub suspended: bool,
}

/// A realm-redeemable login session issued by the auth server.
#[derive(Clone, Copy, Debug)]
pub struct SessionRecord {
    pub account_id: u64,
    pub session_key: [u8; 16],
    pub expires_at_ms: u64,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    pub character_id: u64,
    pub account_id: u64,
    pub name: String,
    pub level: u16,
    pub xp: u32,
    pub faction: PlayerFaction,
    pub zone_id: u32,
    pub position: [f32; 3],
    pub rotation: f32,
    pub health: u32,
    pub max_health: u32,
    pub inventory: Inventory,
}

#[async_trait]
pub trait Persistence: Send + Sync + 'static {
    async fn account_by_email(&self, email: &str) -> Result<AccountRecord, StorageError>;

    async fn load_character(&self, character_id: u64) -> Result<CharacterSnapshot, StorageError>;

    async fn save_character(&self, snapshot: CharacterSnapshot) -> Result<(), StorageError>;

    async fn list_characters(&self, account_id: u64) -> Result<Vec<CharacterSnapshot>, StorageError>;

    async fn record_session(
        &self,
        token: [u8; 16],
        record: SessionRecord,
    ) -> Result<(), StorageError>;

    /// Redeems a session token. Redemption is single-use: a second call with
    /// the same token fails with [`StorageError::NotFound`].
    async fn take_session(&self, token: [u8; 16]) -> Result<SessionRecord, StorageError>;
}

/// In-memory [`Persistence`] used by tests and standalone operation.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    accounts: FxHashMap<String, AccountRecord>,
    characters: FxHashMap<u64, CharacterSnapshot>,
    sessions: FxHashMap<[u8; 16], SessionRecord>,
    unavailable: bool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_account(&self, record: AccountRecord) {
        self.inner
            .write()
            .accounts
            .insert(record.email.to_ascii_lowercase(), record);
    }

    pub fn seed_character(&self, snapshot: CharacterSnapshot) {
        self.inner
            .write()
            .characters
            .insert(snapshot.character_id, snapshot);
    }

    /// Simulates an outage; every call fails with `Unavailable` until
    /// cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.write().unavailable = unavailable;
    }

    fn check_available(inner: &MemoryInner) -> Result<(), StorageError> {
        if inner.unavailable {
            Err(StorageError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn account_by_email(&self, email: &str) -> Result<AccountRecord, StorageError> {
        let inner = self.inner.read();
        Self::check_available(&inner)?;
        inner
            .accounts
            .get(&email.to_ascii_lowercase())
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn load_character(&self, character_id: u64) -> Result<CharacterSnapshot, StorageError> {
        let inner = self.inner.read();
        Self::check_available(&inner)?;
        inner
            .characters
            .get(&character_id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn save_character(&self, snapshot: CharacterSnapshot) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        Self::check_available(&inner)?;
        inner.characters.insert(snapshot.character_id, snapshot);
        Ok(())
    }

    async fn list_characters(&self, account_id: u64) -> Result<Vec<CharacterSnapshot>, StorageError> {
        let inner = self.inner.read();
        Self::check_available(&inner)?;
        let mut characters: Vec<_> = inner
            .characters
            .values()
            .filter(|c| c.account_id == account_id)
            .cloned()
            .collect();
        characters.sort_by_key(|c| c.character_id);
        Ok(characters)
    }

    async fn record_session(
        &self,
        token: [u8; 16],
        record: SessionRecord,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        Self::check_available(&inner)?;
        inner.sessions.insert(token, record);
        Ok(())
    }

    async fn take_session(&self, token: [u8; 16]) -> Result<SessionRecord, StorageError> {
        let mut inner = self.inner.write();
        Self::check_available(&inner)?;
        inner.sessions.remove(&token).ok_or(StorageError::NotFound)
    }
}

/// Write-behind snapshot buffer. Gameplay enqueues; a scheduler job flushes.
/// Snapshots that fail on an outage are re-queued and retried on the next
/// flush, never dropped and never blocking a zone.
#[derive(Default)]
pub struct SaveQueue {
    pending: Mutex<Vec<CharacterSnapshot>>,
}

impl SaveQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn enqueue(&self, snapshot: CharacterSnapshot) {
        self.pending.lock().push(snapshot);
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Flushes everything queued so far. Returns the number of snapshots
    /// written.
    pub async fn flush(&self, store: &dyn Persistence) -> usize {
        let batch: Vec<_> = self.pending.lock().drain(..).collect();
        if batch.is_empty() {
            return 0;
        }

        let mut written = 0;
        let mut retry = vec![];
        for snapshot in batch {
            match store.save_character(snapshot.clone()).await {
                Ok(()) => written += 1,
                Err(StorageError::Unavailable) => {
                    warn!(character_id = snapshot.character_id, "storage unavailable, snapshot re-queued");
                    retry.push(snapshot);
                }
                Err(e) => {
                    error!(character_id = snapshot.character_id, error = %e, "dropping unwritable snapshot");
                }
            }
        }
        if !retry.is_empty() {
            let mut pending = self.pending.lock();
            // Retries go to the front so ordering per character is kept.
            retry.extend(pending.drain(..));
            *pending = retry;
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(character_id: u64, level: u16) -> CharacterSnapshot {
        CharacterSnapshot {
            character_id,
            account_id: 1,
            name: format!("char-{character_id}"),
            level,
            xp: 0,
            faction: PlayerFaction::Exile,
            zone_id: 426,
            position: [0.0, 0.0, 0.0],
            rotation: 0.0,
            health: 100,
            max_health: 100,
            inventory: Inventory::new(16),
        }
    }

    #[tokio::test]
    async fn character_round_trip_and_listing() {
        let store = MemoryStore::new();
        store.save_character(snapshot(10, 5)).await.unwrap();
        store.save_character(snapshot(11, 9)).await.unwrap();

        assert_eq!(store.load_character(10).await.unwrap().level, 5);
        assert!(matches!(
            store.load_character(999).await,
            Err(StorageError::NotFound)
        ));

        let listed = store.list_characters(1).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].character_id, 10);
    }

    #[tokio::test]
    async fn session_tokens_redeem_once() {
        let store = MemoryStore::new();
        let token = [9u8; 16];
        store
            .record_session(
                token,
                SessionRecord {
                    account_id: 4,
                    session_key: [1; 16],
                    expires_at_ms: 60_000,
                },
            )
            .await
            .unwrap();

        assert_eq!(store.take_session(token).await.unwrap().account_id, 4);
        assert!(matches!(
            store.take_session(token).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn save_queue_retries_through_outage() {
        let store = MemoryStore::new();
        let queue = SaveQueue::new();

        queue.enqueue(snapshot(1, 2));
        queue.enqueue(snapshot(2, 3));

        store.set_unavailable(true);
        assert_eq!(queue.flush(store.as_ref()).await, 0);
        assert_eq!(queue.len(), 2);

        store.set_unavailable(false);
        assert_eq!(queue.flush(store.as_ref()).await, 2);
        assert!(queue.is_empty());
        assert_eq!(store.load_character(2).await.unwrap().level, 3);
    }
}

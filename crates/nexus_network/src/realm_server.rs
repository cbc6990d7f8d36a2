//! The realm acceptor: token redemption, realm info, realm list/select.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use nexus_auth::AuthError;
use nexus_protocol::packets::{
    ClientRealmListRequest, ClientRealmSelect, ClientRealmSession, RealmListEntry, ServerAuthDeny,
    ServerRealmInfo, ServerRealmList, ServerRealmSelectResult,
};
use nexus_protocol::Opcode;
use nexus_storage::{Persistence, SessionRecord, StorageError};

use crate::clock::monotonic_ms;
use crate::keyring::KeyRing;
use crate::packet_io::PacketIo;

const MAX_PENDING: usize = 256;

pub struct RealmServer {
    pub persistence: Arc<dyn Persistence>,
    pub keyring: Arc<KeyRing>,
    pub realm_id: u32,
    pub realm_name: String,
    /// Address clients should dial for the world server.
    pub world_address: String,
    /// Count of sessions currently online, for the realm list.
    pub online: Arc<std::sync::atomic::AtomicUsize>,
}

impl RealmServer {
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        let sema = Arc::new(Semaphore::new(MAX_PENDING));
        info!(addr = ?listener.local_addr().ok(), "realm server listening");
        loop {
            let Ok(permit) = sema.clone().acquire_owned().await else {
                return;
            };
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, peer).await {
                            debug!(%peer, "realm connection ended: {e:#}");
                        }
                        drop(permit);
                    });
                }
                Err(e) => error!("failed to accept realm connection: {e}"),
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> anyhow::Result<()> {
        stream.set_nodelay(true)?;
        let mut io = PacketIo::new(stream);

        let session: ClientRealmSession = io.recv().await?;

        let record = match self.redeem(session.session_token).await {
            Ok(record) => record,
            Err(e) => {
                warn!(%peer, code = e.deny_code().code(), "realm session refused: {e}");
                return io
                    .send(&ServerAuthDeny {
                        code: e.deny_code().code(),
                    })
                    .await;
            }
        };

        // The world acceptor will expect this key from this account.
        self.keyring
            .insert(record.account_id, record.session_key, record.expires_at_ms);

        io.send(&ServerRealmInfo {
            account_id: record.account_id,
            realm_id: self.realm_id,
            realm_name: self.realm_name.clone(),
            realm_address: self.world_address.clone(),
            session_key: record.session_key,
        })
        .await?;

        // Realm list / select until the client moves on.
        loop {
            let frame = match io.recv_frame().await {
                Ok(frame) => frame,
                Err(_) => return Ok(()),
            };
            match Opcode::from_u16(frame.opcode) {
                Some(Opcode::ClientRealmListRequest) => {
                    frame.decode::<ClientRealmListRequest>()?;
                    io.send(&ServerRealmList {
                        realms: vec![RealmListEntry {
                            realm_id: self.realm_id,
                            name: self.realm_name.clone(),
                            online: self.online.load(std::sync::atomic::Ordering::Relaxed) as u32,
                            address: self.world_address.clone(),
                        }],
                    })
                    .await?;
                }
                Some(Opcode::ClientRealmSelect) => {
                    let select: ClientRealmSelect = frame.decode()?;
                    io.send(&ServerRealmSelectResult {
                        ok: select.realm_id == self.realm_id,
                        address: self.world_address.clone(),
                    })
                    .await?;
                }
                other => {
                    debug!(%peer, opcode = frame.opcode, ?other, "ignoring realm-phase packet");
                }
            }
        }
    }

    async fn redeem(&self, token: [u8; 16]) -> Result<SessionRecord, AuthError> {
        let record = match self.persistence.take_session(token).await {
            Ok(record) => record,
            // Never issued or already redeemed; the client sees the latter.
            Err(StorageError::NotFound) => return Err(AuthError::TokenReused),
            Err(e) => {
                error!("session redemption failed: {e}");
                return Err(AuthError::TokenExpired);
            }
        };
        if record.expires_at_ms <= monotonic_ms() {
            return Err(AuthError::TokenExpired);
        }
        Ok(record)
    }
}

//! The world acceptor: session-key proof, cipher arming, and hand-off of the
//! connection actor pair to the session layer.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::bail;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use nexus_protocol::packets::{ClientHelloWorld, ServerHelloWorld};

use crate::clock::monotonic_ms;
use crate::connection::{spawn_connection, NewWorldClient};
use crate::keyring::KeyRing;
use crate::packet_io::PacketIo;
use crate::world_key_proof;

const MAX_PENDING: usize = 1024;

pub struct WorldGate {
    pub keyring: Arc<KeyRing>,
    /// Handshaken connections, consumed by the session layer.
    pub new_clients: flume::Sender<NewWorldClient>,
}

impl WorldGate {
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        let sema = Arc::new(Semaphore::new(MAX_PENDING));
        info!(addr = ?listener.local_addr().ok(), "world server listening");
        loop {
            let Ok(permit) = sema.clone().acquire_owned().await else {
                return;
            };
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let gate = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = gate.handle_connection(stream, peer).await {
                            debug!(%peer, "world handshake failed: {e:#}");
                        }
                        drop(permit);
                    });
                }
                Err(e) => error!("failed to accept world connection: {e}"),
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> anyhow::Result<()> {
        stream.set_nodelay(true)?;
        let mut io = PacketIo::new(stream);

        let hello: ClientHelloWorld = io.recv().await?;

        let Some(session_key) = self.keyring.take(hello.account_id, monotonic_ms()) else {
            warn!(%peer, account_id = hello.account_id, "no pending session key");
            io.send(&ServerHelloWorld { ok: false }).await?;
            bail!("unknown or expired world session");
        };

        if world_key_proof(&session_key, hello.account_id) != hello.key_proof {
            warn!(%peer, account_id = hello.account_id, "bad session key proof");
            io.send(&ServerHelloWorld { ok: false }).await?;
            bail!("session key proof mismatch");
        }

        // The accept travels in clear; everything after is sealed.
        io.send(&ServerHelloWorld { ok: true }).await?;
        io.enable_encryption(&session_key);

        let client = spawn_connection(io, peer, hello.account_id);
        if self.new_clients.send_async(client).await.is_err() {
            bail!("session layer is shut down");
        }
        Ok(())
    }
}

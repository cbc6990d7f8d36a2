//! The auth acceptor: SRP6 login, session token issue.

use std::net::SocketAddr;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use nexus_auth::{AuthError, IdentityCheck};
use nexus_protocol::packets::{ClientHelloAuth, ServerAuthAccept, ServerAuthDeny};
use nexus_storage::{Persistence, SessionRecord, StorageError};

use crate::clock::monotonic_ms;
use crate::packet_io::PacketIo;

const MAX_PENDING_LOGINS: usize = 256;

pub struct AuthServer {
    pub persistence: Arc<dyn Persistence>,
    pub identity: Arc<dyn IdentityCheck>,
    /// Client build number this realm accepts.
    pub required_build: u32,
    /// How long an issued session token stays redeemable.
    pub session_ttl_ms: u64,
    /// When set, session tokens are keyed to this secret so a fleet of
    /// processes sharing it mints compatible tokens.
    pub token_secret: Option<Vec<u8>>,
}

impl AuthServer {
    /// Accepts logins until the listener is closed. Each connection is one
    /// short request/response exchange on its own task.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        let sema = Arc::new(Semaphore::new(MAX_PENDING_LOGINS));
        info!(addr = ?listener.local_addr().ok(), "auth server listening");
        loop {
            let Ok(permit) = sema.clone().acquire_owned().await else {
                return;
            };
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, peer).await {
                            debug!(%peer, "auth connection ended: {e:#}");
                        }
                        drop(permit);
                    });
                }
                Err(e) => error!("failed to accept auth connection: {e}"),
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> anyhow::Result<()> {
        stream.set_nodelay(true)?;
        let mut io = PacketIo::new(stream);

        let hello: ClientHelloAuth = io.recv().await?;

        match self.login(&hello).await {
            Ok((token, m2)) => {
                info!(%peer, email = %hello.email, "login accepted");
                io.send(&ServerAuthAccept {
                    session_token: token,
                    m2,
                })
                .await
            }
            Err(e) => {
                warn!(%peer, email = %hello.email, code = e.deny_code().code(), "login denied: {e}");
                io.send(&ServerAuthDeny {
                    code: e.deny_code().code(),
                })
                .await
            }
        }
    }

    async fn login(&self, hello: &ClientHelloAuth) -> Result<([u8; 16], [u8; 32]), AuthError> {
        if hello.build != self.required_build {
            return Err(AuthError::BuildMismatch);
        }

        let account = match self.persistence.account_by_email(&hello.email).await {
            Ok(account) => account,
            Err(StorageError::NotFound) => return Err(AuthError::AccountNotFound),
            Err(e) => {
                // Storage trouble is not the client's fault; deny softly.
                error!("account lookup failed: {e}");
                return Err(AuthError::BadCredentials);
            }
        };
        if account.suspended {
            return Err(AuthError::AccountSuspended);
        }

        let success = self.identity.verify_credentials(
            &account.email,
            &account.salt,
            &account.verifier,
            &hello.a_pub,
            &hello.m1,
        )?;

        let token = self.mint_token();
        let record = SessionRecord {
            account_id: account.account_id,
            session_key: success.session_key,
            expires_at_ms: monotonic_ms() + self.session_ttl_ms,
        };
        if let Err(e) = self.persistence.record_session(token, record).await {
            error!("failed to record session: {e}");
            return Err(AuthError::BadCredentials);
        }

        Ok((token, success.m2))
    }

    fn mint_token(&self) -> [u8; 16] {
        let raw = Uuid::new_v4().into_bytes();
        let Some(secret) = &self.token_secret else {
            return raw;
        };
        let mut mac =
            Hmac::<Sha256>::new_from_slice(secret).expect("hmac accepts any key length");
        mac.update(&raw);
        let digest = mac.finalize().into_bytes();
        let mut token = [0u8; 16];
        token.copy_from_slice(&digest[..16]);
        token
    }
}

//! Bootstraps the full server stack: content, storage, the actor runtime,
//! and the three acceptors.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use nexus_auth::Srp6Identity;
use nexus_content::JsonStore;
use nexus_network::auth_server::AuthServer;
use nexus_network::realm_server::RealmServer;
use nexus_network::world_gate::WorldGate;
use nexus_network::KeyRing;
use nexus_storage::{MemoryStore, Persistence, SaveQueue};
use nexus_world::{register_handlers, run_session_acceptor, SessionDeps, TickScheduler, WorldManager};

/// Period for flushing deferred character snapshots.
const SAVE_FLUSH_MS: u64 = 30_000;
const SAVE_FLUSH_JOB: u64 = u64::MAX;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub auth_addr: SocketAddr,
    pub realm_addr: SocketAddr,
    pub world_addr: SocketAddr,
    /// Address handed to clients for the world hop; may differ from the
    /// bind address behind NAT.
    pub public_world_address: String,
    pub realm_id: u32,
    pub realm_name: String,
    pub data_dir: PathBuf,
    pub db_url: Option<String>,
    pub pool_size: usize,
    pub required_build: u32,
    pub session_ttl_ms: u64,
    pub secret_key_base: Option<String>,
}

/// Startup failures, split by operator-visible exit code.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("configuration error: {0}")]
    Config(#[source] anyhow::Error),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("storage unavailable: {0}")]
    Storage(String),
}

/// Everything a caller (the binary, or a test) needs to talk to a running
/// server.
pub struct ServerHandles {
    pub auth_addr: SocketAddr,
    pub realm_addr: SocketAddr,
    pub world_addr: SocketAddr,
    pub world: nexus_world::WorldHandle,
    pub persistence: Arc<MemoryStore>,
    pub save_queue: Arc<SaveQueue>,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for ServerHandles {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

pub async fn start(config: ServerConfig) -> Result<ServerHandles, StartError> {
    if config.pool_size == 0 {
        return Err(StartError::Config(anyhow::anyhow!(
            "pool size must be at least 1"
        )));
    }

    let content = JsonStore::load(&config.data_dir).map_err(StartError::Config)?;

    // The only storage backend in-tree is the in-memory store; a db-url
    // naming anything else is refused up front, not at first use.
    let persistence: Arc<MemoryStore> = match config.db_url.as_deref() {
        None | Some("memory://") => MemoryStore::new(),
        Some(other) => {
            return Err(StartError::Storage(format!(
                "unsupported database url {other:?}"
            )))
        }
    };
    let save_queue = SaveQueue::new();

    if config.secret_key_base.is_none() {
        warn!("SECRET_KEY_BASE unset; session tokens are ephemeral to this process");
    }

    // Handlers bind before any acceptor can produce a session.
    let registry = Arc::new(register_handlers());

    let (scheduler, scheduler_task) = TickScheduler::spawn();
    let online = Arc::new(AtomicUsize::new(0));
    let (world, manager_task) = WorldManager::spawn(content, scheduler.clone(), online.clone());

    // Periodic snapshot flushing rides the same scheduler as the zones.
    let (flush_tx, flush_rx) = flume::bounded(1);
    scheduler.add_job(SAVE_FLUSH_JOB, SAVE_FLUSH_MS, flush_tx);
    let flush_task = {
        let queue = save_queue.clone();
        let store: Arc<dyn Persistence> = persistence.clone();
        tokio::spawn(async move {
            while flush_rx.recv_async().await.is_ok() {
                queue.flush(store.as_ref()).await;
            }
        })
    };

    let auth_listener = bind(config.auth_addr).await?;
    let realm_listener = bind(config.realm_addr).await?;
    let world_listener = bind(config.world_addr).await?;

    let auth_addr = local_addr(&auth_listener, config.auth_addr)?;
    let realm_addr = local_addr(&realm_listener, config.realm_addr)?;
    let world_addr = local_addr(&world_listener, config.world_addr)?;

    let keyring = Arc::new(KeyRing::new());
    let (new_clients_tx, new_clients_rx) = flume::bounded(64);

    let auth = Arc::new(AuthServer {
        persistence: persistence.clone(),
        identity: Arc::new(Srp6Identity),
        required_build: config.required_build,
        session_ttl_ms: config.session_ttl_ms,
        token_secret: config.secret_key_base.map(String::into_bytes),
    });
    let realm = Arc::new(RealmServer {
        persistence: persistence.clone(),
        keyring: keyring.clone(),
        realm_id: config.realm_id,
        realm_name: config.realm_name.clone(),
        world_address: config.public_world_address.clone(),
        online,
    });
    let gate = Arc::new(WorldGate {
        keyring,
        new_clients: new_clients_tx,
    });
    let deps = Arc::new(SessionDeps {
        world: world.clone(),
        persistence: persistence.clone(),
        save_queue: save_queue.clone(),
        registry,
    });

    let tasks = vec![
        scheduler_task,
        manager_task,
        flush_task,
        tokio::spawn(auth.run(auth_listener)),
        tokio::spawn(realm.run(realm_listener)),
        tokio::spawn(gate.run(world_listener)),
        tokio::spawn(run_session_acceptor(new_clients_rx, deps)),
    ];

    info!(
        realm = %config.realm_name,
        %auth_addr,
        %realm_addr,
        %world_addr,
        "nexus is up"
    );

    Ok(ServerHandles {
        auth_addr,
        realm_addr,
        world_addr,
        world,
        persistence,
        save_queue,
        tasks,
    })
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, StartError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| StartError::Bind { addr, source })
}

fn local_addr(listener: &TcpListener, addr: SocketAddr) -> Result<SocketAddr, StartError> {
    listener
        .local_addr()
        .map_err(|source| StartError::Bind { addr, source })
}

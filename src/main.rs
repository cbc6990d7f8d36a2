use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use nexus::server::{self, ServerConfig, StartError};

#[derive(Parser)]
#[command(name = "nexus", version, about = "A WildStar server emulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the auth, realm, and world servers.
    Serve(ServeArgs),
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, default_value = "0.0.0.0:6600")]
    auth_addr: SocketAddr,

    #[arg(long, default_value = "0.0.0.0:23115")]
    realm_addr: SocketAddr,

    #[arg(long, default_value = "0.0.0.0:24000")]
    world_addr: SocketAddr,

    /// Address clients are told to dial for the world server.
    #[arg(long, env = "WORLD_PUBLIC_ADDRESS", default_value = "127.0.0.1:24000")]
    public_world_address: String,

    #[arg(long, env = "REALM_ID", default_value_t = 1)]
    realm_id: u32,

    #[arg(long, env = "REALM_NAME", default_value = "Nexus")]
    realm_name: String,

    /// Directory holding the JSON content tables.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Storage backend. Only `memory://` ships in-tree.
    #[arg(long, env = "DATABASE_URL")]
    db_url: Option<String>,

    #[arg(long, env = "POOL_SIZE", default_value_t = 8)]
    pool_size: usize,

    /// Client build number this realm accepts.
    #[arg(long, default_value_t = 16042)]
    required_build: u32,

    /// Shared secret for session token derivation.
    #[arg(long, env = "SECRET_KEY_BASE")]
    secret_key_base: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args),
    }
}

fn serve(args: ServeArgs) -> ExitCode {
    let config = ServerConfig {
        auth_addr: args.auth_addr,
        realm_addr: args.realm_addr,
        world_addr: args.world_addr,
        public_world_address: args.public_world_address,
        realm_id: args.realm_id,
        realm_name: args.realm_name,
        data_dir: args.data_dir,
        db_url: args.db_url,
        pool_size: args.pool_size,
        required_build: args.required_build,
        session_ttl_ms: 5 * 60 * 1000,
        secret_key_base: args.secret_key_base,
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to start runtime: {e}");
            return ExitCode::from(1);
        }
    };

    runtime.block_on(async {
        let _handles = match server::start(config).await {
            Ok(handles) => handles,
            Err(e) => {
                error!("{e}");
                return match e {
                    StartError::Config(_) => ExitCode::from(1),
                    StartError::Bind { .. } => ExitCode::from(2),
                    StartError::Storage(_) => ExitCode::from(3),
                };
            }
        };

        match tokio::signal::ctrl_c().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("failed to wait for shutdown signal: {e}");
                ExitCode::from(1)
            }
        }
    })
}

//! Cypherlock server binary.
//!
//! ```bash
//! # Initialize state and print the signature key clients must pin
//! cypherlockd create --path /var/lib/cypherlock --keyperiod 3600 --genperiod 86400
//!
//! # Serve RPC from persisted state
//! cypherlockd serve --addr 127.0.0.1:11139 --path /var/lib/cypherlock
//! ```

use std::time::Duration;

use clap::{Parser, Subcommand};
use cypherlock_server::{rpc, FileStore, RatchetServer};
use cypherlock_core::SystemClock;
use rand::rngs::OsRng;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Cypherlock oracle server
#[derive(Parser, Debug)]
#[command(name = "cypherlockd")]
#[command(about = "Cypherlock time-lock oracle server")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize server state and print the signature key
    Create {
        /// Directory for persistent state
        #[arg(long, default_value = "/var/lib/cypherlock")]
        path: String,

        /// Seconds between ratchet steps
        #[arg(long, default_value = "3600")]
        keyperiod: u64,

        /// Seconds of future keys each pregeneration covers
        #[arg(long, default_value = "86400")]
        genperiod: u64,
    },

    /// Serve RPC from persisted state
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:11139")]
        addr: String,

        /// Directory with persistent state
        #[arg(long, default_value = "/var/lib/cypherlock")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    match args.command {
        Command::Create { path, keyperiod, genperiod } => {
            let store = FileStore::new(&path)?;
            let signature_key = RatchetServer::create(
                &store,
                &mut OsRng,
                &SystemClock,
                Duration::from_secs(keyperiod),
                Duration::from_secs(genperiod),
            )?;
            println!("{}", hex::encode(signature_key));
            tracing::info!(%path, "server state created");
        }

        Command::Serve { addr, path } => {
            let store = FileStore::new(&path)?;
            let server = RatchetServer::load(store, SystemClock)?;
            server.start()?;
            tracing::info!(
                signature_key = %hex::encode(server.signature_key()),
                "server loaded"
            );

            let listener = TcpListener::bind(&addr).await?;
            tracing::info!(%addr, "listening");

            tokio::select! {
                result = rpc::serve(listener, server.clone()) => result?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutting down");
                    server.stop().await?;
                }
            }
        }
    }

    Ok(())
}

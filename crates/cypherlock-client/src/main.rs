//! Cypherlock client binary.
//!
//! ```bash
//! # Create a lock over the next 30 minutes; the secret is read from fd 3
//! cypherlock create --server 127.0.0.1:11139 --path ~/.cypherlock \
//!     --sigkey <hex> 3< secret.txt
//!
//! # Recover the secret onto fd 3
//! cypherlock unlock --server 127.0.0.1:11139 --path ~/.cypherlock 3> out.txt
//! ```

use std::{
    io::{BufRead, Read, Write},
    time::{SystemTime, UNIX_EPOCH},
};

use clap::{Parser, Subcommand};
use cypherlock_client::{Cypherlock, FileLockStore, TcpRpc};
use rand::rngs::OsRng;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use zeroize::Zeroizing;

/// Cypherlock time-lock client
#[derive(Parser, Debug)]
#[command(name = "cypherlock")]
#[command(about = "Cypherlock time-lock escrow client")]
#[command(version)]
struct Args {
    /// Server address [IP:port]
    #[arg(long, global = true, default_value = "127.0.0.1:11139")]
    server: String,

    /// Directory for locks, keylist cache and the sealed secret
    #[arg(long, global = true, default_value = "/tmp/cypherlock")]
    path: String,

    /// Server signature key, 64 hex chars; required for create and extend
    #[arg(long, global = true)]
    sigkey: Option<String>,

    /// Earliest unix second the lock is valid (default: now)
    #[arg(long, global = true)]
    from: Option<u64>,

    /// Latest unix second the lock is valid (default: now + 1800)
    #[arg(long, global = true)]
    to: Option<u64>,

    /// File descriptor for the secret on create/unlock; must be 3 or higher
    #[arg(long, global = true, default_value = "3")]
    fd: i32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new lock around a secret read from the pipe fd
    Create,
    /// Extend an existing lock into a future window
    Extend,
    /// Recover the secret and write it to the pipe fd
    Unlock,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn parse_signature_key(args: &Args) -> Result<[u8; 32], Box<dyn std::error::Error>> {
    let hex_key = args
        .sigkey
        .as_deref()
        .ok_or("--sigkey is required for create and extend")?;
    let bytes = hex::decode(hex_key)?;
    let key: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| "--sigkey must be 32 bytes of hex")?;
    Ok(key)
}

fn pipe_file(fd: i32) -> Result<std::fs::File, Box<dyn std::error::Error>> {
    if fd < 3 {
        return Err("--fd must be 3 or higher".into());
    }
    #[cfg(unix)]
    {
        use std::os::unix::io::FromRawFd;
        // The fd is inherited from the invoking process and owned by us
        // from here on.
        Ok(unsafe { std::fs::File::from_raw_fd(fd) })
    }
    #[cfg(not(unix))]
    {
        Err("secret pipes are only supported on unix".into())
    }
}

fn read_secret(fd: i32) -> Result<Zeroizing<Vec<u8>>, Box<dyn std::error::Error>> {
    let mut file = pipe_file(fd)?;
    let mut secret = Zeroizing::new(Vec::new());
    file.read_to_end(&mut secret)?;
    while matches!(secret.last(), Some(b) if b.is_ascii_whitespace()) {
        secret.pop();
    }
    Ok(secret)
}

fn write_secret(fd: i32, secret: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = pipe_file(fd)?;
    file.write_all(secret)?;
    Ok(())
}

fn read_passphrase() -> Result<Zeroizing<Vec<u8>>, Box<dyn std::error::Error>> {
    eprint!("Passphrase: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let passphrase = Zeroizing::new(line.trim().as_bytes().to_vec());
    if passphrase.is_empty() {
        return Err("empty passphrase".into());
    }
    Ok(passphrase)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let now = unix_now();
    let valid_from = args.from.unwrap_or(now);
    let valid_to = args.to.unwrap_or(now + 1800);

    let store = FileLockStore::new(&args.path);

    match args.command {
        Command::Create => {
            let signature_key = parse_signature_key(&args)?;
            let secret = read_secret(args.fd)?;
            let passphrase = read_passphrase()?;

            let mut client = Cypherlock::new(args.server.as_str(), Some(signature_key), store, TcpRpc);
            let (real_from, real_to) =
                client.create_lock(&mut OsRng, &passphrase, &secret, valid_from, valid_to)?;
            println!("Lock created, valid {real_from} to {real_to}");
        }

        Command::Extend => {
            let signature_key = parse_signature_key(&args)?;
            let passphrase = read_passphrase()?;

            let mut client = Cypherlock::new(args.server.as_str(), Some(signature_key), store, TcpRpc);
            let (real_from, real_to) =
                client.extend_lock(&mut OsRng, &passphrase, now, valid_from, valid_to)?;
            println!("Lock extended, valid {real_from} to {real_to}");
        }

        Command::Unlock => {
            let passphrase = read_passphrase()?;

            let client = Cypherlock::new(args.server.as_str(), None, store, TcpRpc);
            let secret = Zeroizing::new(client.unlock(&passphrase, now)?);
            write_secret(args.fd, &secret)?;
        }
    }

    Ok(())
}

//! The Cypherlock server: a ratcheting fountain with pregeneration,
//! write-through persistence and a two-method RPC surface.
//!
//! The [`RatchetServer`] owns the long-term keys, the running fountain and
//! the pregenerator. A periodic task regenerates the signed keylist and
//! persists all state; the RPC layer exposes `GetKeys` and `Decrypt`.

mod error;
mod keys;
mod oracle;
mod persistence;
pub mod rpc;
mod server;

pub use error::ServerError;
pub use keys::{ServerKeys, SERVER_KEYS_SIZE};
pub use oracle::{FountainSecrets, OracleConfig};
pub use persistence::{FileStore, MemoryStore, Persistence, StorageError, StoreSlot};
pub use server::RatchetServer;

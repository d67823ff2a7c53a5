//! The Cypherlock client: creating, extending and unlocking time-locked
//! secrets against a fountain server.
//!
//! Everything here is synchronous; the store and the RPC transport sit
//! behind traits so tests can substitute either.

mod error;
mod rpc;
mod storage;

pub use error::{ClientError, LockStoreError, RpcError};
pub use rpc::{ClientRpc, TcpRpc};
pub use storage::{parse_lock_filename, FileLockStore, LockStore};

use cypherlock_crypto::{decrypt_real_secret, encrypt_real_secret};
use cypherlock_proto::{covered_time_frame, MatchKey, OracleMessage, OracleMessageTemplate, RatchetList};
use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

/// Client pipeline for one lock store and one server.
pub struct Cypherlock<S: LockStore, R: ClientRpc> {
    /// Pinned server signature key; `None` skips the pin (signature is
    /// still checked against the key embedded in the list).
    signature_key: Option<[u8; 32]>,
    server_url: String,
    store: S,
    rpc: R,
    keylist: Option<RatchetList>,
}

impl<S: LockStore, R: ClientRpc> Cypherlock<S, R> {
    /// Create a client. `signature_key` is the trust-on-first-use pin for
    /// keylist verification.
    pub fn new(server_url: impl Into<String>, signature_key: Option<[u8; 32]>, store: S, rpc: R) -> Self {
        Cypherlock {
            signature_key,
            server_url: server_url.into(),
            store,
            rpc,
            keylist: None,
        }
    }

    /// Seal a fresh user secret and write locks covering `[valid_from,
    /// valid_to]`. Returns the actual window covered.
    pub fn create_lock(
        &mut self,
        rng: &mut (impl CryptoRngCore + ?Sized),
        passphrase: &[u8],
        secret: &[u8],
        valid_from: u64,
        valid_to: u64,
    ) -> Result<(u64, u64), ClientError> {
        let (secret_key, sealed) = encrypt_real_secret(rng, secret)
            .map_err(cypherlock_proto::ProtoError::from)?;
        self.store.store_secret(&sealed)?;
        self.write_lock(rng, passphrase, &secret_key, valid_from, valid_to)
    }

    /// Write oracle-message lock files for every keylist entry overlapping
    /// the window. Returns the actual window covered.
    pub fn write_lock(
        &mut self,
        rng: &mut (impl CryptoRngCore + ?Sized),
        passphrase: &[u8],
        secret_key: &[u8; 32],
        valid_from: u64,
        valid_to: u64,
    ) -> Result<(u64, u64), ClientError> {
        let targets = self.lock_targets(valid_from, valid_to)?;
        let (real_from, real_to) = covered_time_frame(&targets);

        for target in targets {
            let template = OracleMessageTemplate {
                valid_from: target.valid_from,
                valid_to: target.valid_to,
                server_url: self.server_url.clone(),
                server_public_key: target.envelope_key,
                ratchet_public_key: target.ratchet_key,
            };
            let (sealed, filename) = template.create_encrypted(passphrase, secret_key, rng)?;
            self.store.store_lock(&filename, &sealed)?;
            tracing::debug!(%filename, "lock written");
        }
        Ok((real_from, real_to))
    }

    /// Recover the user secret at time `now`.
    pub fn unlock(&self, passphrase: &[u8], now: u64) -> Result<Vec<u8>, ClientError> {
        let secret_key = self.load_lock_key(passphrase, now)?;
        let sealed = self.store.get_secret()?;
        Ok(decrypt_real_secret(&secret_key, &sealed).map_err(cypherlock_proto::ProtoError::from)?)
    }

    /// Extend an unlockable lock into a new future window. The sealed user
    /// secret is untouched; only new lock files are written.
    pub fn extend_lock(
        &mut self,
        rng: &mut (impl CryptoRngCore + ?Sized),
        passphrase: &[u8],
        now: u64,
        valid_from: u64,
        valid_to: u64,
    ) -> Result<(u64, u64), ClientError> {
        let secret_key = self.load_lock_key(passphrase, now)?;
        self.write_lock(rng, passphrase, &secret_key, valid_from, valid_to)
    }

    /// Run the oracle exchange for the lock covering `now` and recover the
    /// escrow key.
    fn load_lock_key(&self, passphrase: &[u8], now: u64) -> Result<Zeroizing<[u8; 32]>, ClientError> {
        let sealed = self.store.get_lock(now)?;
        let oracle_msg = OracleMessage::decrypt(passphrase, &sealed)?;
        let response = self.rpc.decrypt(&self.server_url, &oracle_msg.server_message)?;
        Ok(oracle_msg.process_response(&response)?)
    }

    /// Match keys covering the window, consulting the cached keylist first
    /// and fetching a fresh one when the cache is missing or stale.
    fn lock_targets(&mut self, valid_from: u64, valid_to: u64) -> Result<Vec<MatchKey>, ClientError> {
        let mut fetched = false;
        if self.keylist.is_none() {
            match self.store.get_keylist() {
                Ok(list) if list.verify(self.signature_key.as_ref()) => {
                    self.keylist = Some(list);
                }
                Ok(_) => {
                    tracing::debug!("cached keylist failed verification, fetching");
                    self.fetch_keylist()?;
                    fetched = true;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "keylist cache miss, fetching");
                    self.fetch_keylist()?;
                    fetched = true;
                }
            }
        }

        let cached_match = self
            .keylist
            .as_ref()
            .and_then(|list| list.find_ratchet_keys(valid_from, valid_to));
        if let Some(targets) = cached_match {
            return Ok(targets);
        }

        if !fetched {
            self.fetch_keylist()?;
            if let Some(targets) = self
                .keylist
                .as_ref()
                .and_then(|list| list.find_ratchet_keys(valid_from, valid_to))
            {
                return Ok(targets);
            }
        }
        Err(ClientError::NoLocksFound)
    }

    /// Fetch, verify against the pinned key, cache and persist a keylist.
    fn fetch_keylist(&mut self) -> Result<(), ClientError> {
        let list = self.rpc.get_keylist(&self.server_url)?;
        if !list.verify(self.signature_key.as_ref()) {
            return Err(ClientError::KeylistUntrusted);
        }
        self.store.store_keylist(&list)?;
        self.keylist = Some(list);
        Ok(())
    }
}

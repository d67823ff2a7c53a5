//! The ratchet server: creation, persistence, pregeneration and oracle
//! decryption wired together.

use std::{
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use cypherlock_core::{Clock, Fountain, FountainHandle, Pregenerator};
use rand_core::CryptoRngCore;

use crate::{
    FountainSecrets, OracleConfig, Persistence, ServerError, ServerKeys, StorageError, StoreSlot,
};

/// How often the pregeneration task wakes up to regenerate and persist.
const PREGEN_TICK: Duration = Duration::from_secs(5 * 60);

/// A running Cypherlock server.
///
/// Construction is two-phase: [`RatchetServer::create`] initializes and
/// persists fresh state without starting anything (the `create` CLI path);
/// [`RatchetServer::load`] restores persisted state and starts the fountain
/// worker; [`RatchetServer::start`] begins pregeneration.
pub struct RatchetServer<P: Persistence, C: Clock> {
    keys: ServerKeys,
    fountain: FountainHandle,
    pregen: Mutex<Pregenerator>,
    keylist: RwLock<Vec<u8>>,
    oracle: OracleConfig<FountainSecrets>,
    persistence: P,
    clock: C,
    pregen_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<P: Persistence, C: Clock> RatchetServer<P, C> {
    /// Create and persist fresh server state. Nothing is started; returns
    /// the signature key clients must pin.
    pub fn create(
        persistence: &P,
        rng: &mut (impl CryptoRngCore + ?Sized),
        clock: &C,
        key_duration: Duration,
        pregen_interval: Duration,
    ) -> Result<[u8; 32], ServerError> {
        let keys = ServerKeys::generate(rng)?;
        let fountain = Fountain::new(key_duration.as_secs() as i64, rng, clock)?;
        let pregen = Pregenerator::from_fountain(&fountain, pregen_interval);

        persistence.store(StoreSlot::ServerKeys, &keys.marshal())?;
        persistence.store(StoreSlot::Fountain, &fountain.marshal())?;
        persistence.store(StoreSlot::Pregenerator, &pregen.marshal())?;

        Ok(keys.signature_key())
    }

    /// Restore persisted state and start the fountain worker.
    pub fn load(persistence: P, clock: C) -> Result<Arc<Self>, ServerError> {
        let keys = ServerKeys::unmarshal(&persistence.load(StoreSlot::ServerKeys)?)?;
        let fountain_value = Fountain::unmarshal(&persistence.load(StoreSlot::Fountain)?)?;
        let pregen =
            Pregenerator::unmarshal(&fountain_value, &persistence.load(StoreSlot::Pregenerator)?)?;

        // The keylist slot is optional: a server persisted before its first
        // pregeneration run fills it on the next tick.
        let keylist = match persistence.load(StoreSlot::Keylist) {
            Ok(data) => data,
            Err(StorageError::Missing(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let fountain = fountain_value.start(clock.clone())?;
        let oracle = OracleConfig {
            public_key: keys.envelope_key(),
            private_key: zeroize::Zeroizing::new(*keys.envelope_private_key()),
            secrets: FountainSecrets(fountain.clone()),
        };

        Ok(Arc::new(RatchetServer {
            keys,
            fountain,
            pregen: Mutex::new(pregen),
            keylist: RwLock::new(keylist),
            oracle,
            persistence,
            clock,
            pregen_task: Mutex::new(None),
        }))
    }

    /// Signature key clients pin.
    pub fn signature_key(&self) -> [u8; 32] {
        self.keys.signature_key()
    }

    /// Run a pregeneration pass: sign and commit a fresh keylist if one is
    /// due.
    pub fn generate_keys(&self) -> Result<(), ServerError> {
        let builder = {
            let mut pregen = self.pregen.lock().expect("pregenerator lock poisoned");
            pregen.generate(self.clock.now())
        };
        let Some(builder) = builder else {
            return Ok(());
        };

        let list = builder.sign(self.keys.envelope_key(), self.keys.signing_key());
        tracing::info!(entries = list.entries.len(), "pregenerated keylist");

        let mut keylist = self.keylist.write().expect("keylist lock poisoned");
        keylist.clear();
        keylist.extend_from_slice(list.bytes());
        self.persistence.store(StoreSlot::Keylist, list.bytes())?;
        Ok(())
    }

    /// Write all server state through to persistence.
    pub async fn persist(&self) -> Result<(), ServerError> {
        let fountain_bytes = self.fountain.marshal().await?;
        self.persistence.store(StoreSlot::ServerKeys, &self.keys.marshal())?;
        self.persistence.store(StoreSlot::Fountain, &fountain_bytes)?;
        let pregen_bytes = self.pregen.lock().expect("pregenerator lock poisoned").marshal();
        self.persistence.store(StoreSlot::Pregenerator, &pregen_bytes)?;

        let keylist = self.keylist.read().expect("keylist lock poisoned");
        if !keylist.is_empty() {
            self.persistence.store(StoreSlot::Keylist, &keylist)?;
        }
        Ok(())
    }

    /// Start the periodic pregeneration task. Idempotent.
    pub fn start(self: &Arc<Self>) -> Result<(), ServerError> {
        self.generate_keys()?;

        let mut task = self.pregen_task.lock().expect("pregen task lock poisoned");
        if task.is_some() {
            return Ok(());
        }

        let server = Arc::clone(self);
        let mut ticker = self.clock.new_ticker(PREGEN_TICK);
        *task = Some(tokio::spawn(async move {
            loop {
                ticker.tick().await;
                if let Err(e) = server.generate_keys() {
                    tracing::error!(error = %e, "pregeneration failed");
                }
                if let Err(e) = server.persist().await {
                    tracing::error!(error = %e, "persistence failed");
                }
            }
        }));
        Ok(())
    }

    /// Stop pregeneration and the fountain, persisting final state.
    pub async fn stop(&self) -> Result<(), ServerError> {
        if let Some(task) = self.pregen_task.lock().expect("pregen task lock poisoned").take() {
            task.abort();
        }

        let fountain_value = self.fountain.stop().await?;
        self.persistence.store(StoreSlot::Fountain, &fountain_value.marshal())?;
        let pregen_bytes = self.pregen.lock().expect("pregenerator lock poisoned").marshal();
        self.persistence.store(StoreSlot::Pregenerator, &pregen_bytes)?;
        Ok(())
    }

    /// The current marshalled keylist. Returns an independent copy.
    pub fn get_keys(&self) -> Vec<u8> {
        self.keylist.read().expect("keylist lock poisoned").clone()
    }

    /// Decrypt an oracle message and return the serialized response.
    pub async fn decrypt(
        &self,
        msg: &[u8],
        rng: &mut (impl CryptoRngCore + ?Sized),
    ) -> Result<Vec<u8>, ServerError> {
        let now = self.clock.now() as u64;
        self.oracle.process_oracle_message(msg, now, rng).await
    }
}

#[cfg(test)]
mod tests {
    use cypherlock_core::MockClock;
    use cypherlock_proto::RatchetList;
    use rand::rngs::OsRng;

    use super::*;
    use crate::MemoryStore;

    fn hour() -> Duration {
        Duration::from_secs(3600)
    }

    fn day() -> Duration {
        Duration::from_secs(24 * 3600)
    }

    #[tokio::test]
    async fn create_then_load_serves_a_verifiable_keylist() {
        let store = MemoryStore::new();
        let clock = MockClock::new(100_000);

        let sig_key =
            RatchetServer::create(&store, &mut OsRng, &clock, hour(), day()).unwrap();

        let server = RatchetServer::load(store, clock).unwrap();
        server.start().unwrap();
        assert_eq!(server.signature_key(), sig_key);

        let list = RatchetList::parse(&server.get_keys()).unwrap();
        assert!(list.verify(Some(&sig_key)));
        assert_eq!(list.entries[0].valid_from, 100_000);
    }

    #[tokio::test]
    async fn persisted_state_survives_a_reload_cycle() {
        let store = MemoryStore::new();
        let clock = MockClock::new(0);
        RatchetServer::create(&store, &mut OsRng, &clock, hour(), day()).unwrap();

        let server = RatchetServer::load(store.clone(), clock.clone()).unwrap();
        server.start().unwrap();
        let keys_before = server.get_keys();
        server.persist().await.unwrap();
        server.stop().await.unwrap();

        let reloaded = RatchetServer::load(store, clock).unwrap();
        reloaded.start().unwrap();
        assert_eq!(reloaded.get_keys(), keys_before);
    }

    #[tokio::test]
    async fn decrypt_round_trips_through_the_fountain() {
        let store = MemoryStore::new();
        let clock = MockClock::new(50_000);
        RatchetServer::create(&store, &mut OsRng, &clock, hour(), day()).unwrap();
        let server = RatchetServer::load(store, clock.clone()).unwrap();
        server.start().unwrap();

        let list = RatchetList::parse(&server.get_keys()).unwrap();
        let now = clock.now() as u64;
        let keys = list.find_ratchet_keys(now, now + 600).unwrap();

        let secret_key = [0x5au8; 32];
        let template = cypherlock_proto::OracleMessageTemplate {
            valid_from: keys[0].valid_from,
            valid_to: keys[0].valid_to,
            server_url: "localhost:0".to_string(),
            server_public_key: keys[0].envelope_key,
            ratchet_public_key: keys[0].ratchet_key,
        };
        let oracle_msg = template.create(&secret_key, &mut OsRng).unwrap();

        let response = server.decrypt(&oracle_msg.server_message, &mut OsRng).await.unwrap();
        let recovered = oracle_msg.process_response(&response).unwrap();
        assert_eq!(*recovered, secret_key);
    }

    #[tokio::test]
    async fn stopped_fountain_refuses_decryption() {
        let store = MemoryStore::new();
        let clock = MockClock::new(50_000);
        RatchetServer::create(&store, &mut OsRng, &clock, hour(), day()).unwrap();
        let server = RatchetServer::load(store, clock.clone()).unwrap();
        server.start().unwrap();

        let list = RatchetList::parse(&server.get_keys()).unwrap();
        let now = clock.now() as u64;
        let keys = list.find_ratchet_keys(now, now + 600).unwrap();
        let template = cypherlock_proto::OracleMessageTemplate {
            valid_from: keys[0].valid_from,
            valid_to: keys[0].valid_to,
            server_url: "localhost:0".to_string(),
            server_public_key: keys[0].envelope_key,
            ratchet_public_key: keys[0].ratchet_key,
        };
        let oracle_msg = template.create(&[1u8; 32], &mut OsRng).unwrap();

        server.stop().await.unwrap();

        let result = server.decrypt(&oracle_msg.server_message, &mut OsRng).await;
        assert!(result.is_err(), "stopped fountain must not decrypt");
    }
}

//! The oracle's secret lookup, abstracted.

use std::future::Future;

use zeroize::Zeroizing;

use crate::ProtoError;

/// Supplier of ratchet shared secrets.
///
/// The server's fountain implements this: given the ratchet public key a
/// message targets and the sender's ephemeral public key, it returns
/// `SHA-256(X25519(ratchet_private, peer))` for a live step. A step outside
/// the ring yields [`ProtoError::RatchetNotFound`] — the only way the
/// server ever refuses a message cryptographically.
pub trait SecretSource {
    /// Look up the hashed shared secret for a live ratchet step.
    fn shared_secret(
        &self,
        ratchet_key: &[u8; 32],
        peer_key: &[u8; 32],
    ) -> impl Future<Output = Result<Zeroizing<[u8; 32]>, ProtoError>> + Send;
}

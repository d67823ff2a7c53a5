//! Curve25519 key agreement shapes.
//!
//! Three shapes cover the whole protocol:
//!
//! - `to_public_key`: ephemeral sender to a long-term public key (envelope
//!   layer).
//! - `to_ratchet_key`: same, but the raw DH output is hashed once before the
//!   nonce HMAC so the fountain can hand out `SHA-256(DH)` without exposing
//!   the DH result itself (ratchet layer).
//! - `to_ephemeral_key`: the server reply. Two DH computations are combined
//!   by using one derived secret as the HMAC key over the other. This
//!   composition is part of the wire protocol and must not be "simplified".

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::{gen_random, CryptoError};

type HmacSha256 = Hmac<Sha256>;

/// Result of an outbound agreement: the symmetric secret plus the public
/// values the peer needs to recompute it.
pub struct Agreement {
    /// Derived 32-byte symmetric secret.
    pub secret: Zeroizing<[u8; 32]>,
    /// Ephemeral sender public key, transmitted in clear.
    pub send_key: [u8; 32],
    /// Random 32-byte mixing nonce, transmitted in clear.
    pub dh_nonce: [u8; 32],
}

/// Result of a server reply agreement.
pub struct ReplyAgreement {
    /// Derived 32-byte symmetric secret.
    pub secret: Zeroizing<[u8; 32]>,
    /// Random 32-byte mixing nonce, transmitted in clear.
    pub dh_nonce: [u8; 32],
    /// Ephemeral public key, transmitted in clear.
    pub ephemeral_key: [u8; 32],
}

/// `HMAC-SHA256(key = nonce, msg = presecret)`, copied into 32 bytes.
fn key_hmac(presecret: &[u8; 32], nonce: &[u8; 32]) -> Zeroizing<[u8; 32]> {
    let Ok(mut mac) = HmacSha256::new_from_slice(nonce) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    mac.update(presecret);
    let digest = mac.finalize().into_bytes();

    let mut secret = Zeroizing::new([0u8; 32]);
    secret.copy_from_slice(&digest);
    secret
}

/// `SHA-256(presecret)`.
fn key_hash(presecret: &[u8; 32]) -> Zeroizing<[u8; 32]> {
    let mut secret = Zeroizing::new([0u8; 32]);
    secret.copy_from_slice(&Sha256::digest(presecret));
    secret
}

/// Shared secret between one private and one public key, mixed with a nonce.
///
/// With `ratchet` set, the DH output is hashed before the nonce HMAC so the
/// derivation matches what a ratchet holder can supply.
fn two_party_secret(
    private: &[u8; 32],
    public: &[u8; 32],
    nonce: &[u8; 32],
    ratchet: bool,
) -> Zeroizing<[u8; 32]> {
    let secret = x25519_dalek::StaticSecret::from(*private);
    let peer = x25519_dalek::PublicKey::from(*public);
    let mut presecret = Zeroizing::new(secret.diffie_hellman(&peer).to_bytes());
    if ratchet {
        presecret = key_hash(&presecret);
    }
    key_hmac(&presecret, nonce)
}

/// Ephemeral keypair plus mixing nonce.
fn temp_key(
    rng: &mut (impl rand_core::CryptoRngCore + ?Sized),
) -> Result<(Zeroizing<[u8; 32]>, [u8; 32], [u8; 32]), CryptoError> {
    let send_private = gen_random(rng)?;
    let nonce = gen_random(rng)?;
    let send_public = crate::public_key(&send_private);
    Ok((send_private, send_public, *nonce))
}

/// Create a secret for encrypting to a long-term public key.
pub fn to_public_key(
    rng: &mut (impl rand_core::CryptoRngCore + ?Sized),
    peer_public: &[u8; 32],
) -> Result<Agreement, CryptoError> {
    let (send_private, send_key, dh_nonce) = temp_key(rng)?;
    let secret = two_party_secret(&send_private, peer_public, &dh_nonce, false);
    Ok(Agreement { secret, send_key, dh_nonce })
}

/// Create a secret for encrypting to a ratchet public key.
pub fn to_ratchet_key(
    rng: &mut (impl rand_core::CryptoRngCore + ?Sized),
    ratchet_public: &[u8; 32],
) -> Result<Agreement, CryptoError> {
    let (send_private, send_key, dh_nonce) = temp_key(rng)?;
    let secret = two_party_secret(&send_private, ratchet_public, &dh_nonce, true);
    Ok(Agreement { secret, send_key, dh_nonce })
}

/// Recompute the secret of [`to_public_key`] on the receiving side.
pub fn decrypt_key(
    send_key: &[u8; 32],
    dh_nonce: &[u8; 32],
    my_private: &[u8; 32],
) -> Zeroizing<[u8; 32]> {
    two_party_secret(my_private, send_key, dh_nonce, false)
}

/// Finish the ratchet-layer secret from the fountain's `SHA-256(DH)` output.
///
/// The fountain never reveals the raw DH result; it hands out the hashed
/// presecret, which the message layer binds to the transmitted nonce here.
pub fn ratchet_message_secret(
    presecret: &[u8; 32],
    dh_nonce: &[u8; 32],
) -> Zeroizing<[u8; 32]> {
    key_hmac(presecret, dh_nonce)
}

/// Create the server-reply secret toward a one-time receiver key.
///
/// `k1 = two_party_secret(server_private, receiver_public, nonce, true)` and
/// `k2 = two_party_secret(ephemeral_private, receiver_public, nonce, true)`
/// are combined as `HMAC-SHA256(key = k2, msg = k1)`.
pub fn to_ephemeral_key(
    rng: &mut (impl rand_core::CryptoRngCore + ?Sized),
    receiver_public: &[u8; 32],
    server_private: &[u8; 32],
) -> Result<ReplyAgreement, CryptoError> {
    let (ephemeral_private, ephemeral_key, dh_nonce) = temp_key(rng)?;
    let k1 = two_party_secret(server_private, receiver_public, &dh_nonce, true);
    let k2 = two_party_secret(&ephemeral_private, receiver_public, &dh_nonce, true);
    Ok(ReplyAgreement { secret: key_hmac(&k1, &k2), dh_nonce, ephemeral_key })
}

/// Recompute the secret of [`to_ephemeral_key`] on the receiving side.
pub fn from_ephemeral_key(
    dh_nonce: &[u8; 32],
    ephemeral_key: &[u8; 32],
    server_public: &[u8; 32],
    receiver_private: &[u8; 32],
) -> Zeroizing<[u8; 32]> {
    let k1 = two_party_secret(receiver_private, server_public, dh_nonce, true);
    let k2 = two_party_secret(receiver_private, ephemeral_key, dh_nonce, true);
    key_hmac(&k1, &k2)
}

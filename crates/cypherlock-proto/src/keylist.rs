//! The keylist: pregenerated ratchet keys, hash-chained and server-signed.
//!
//! Binary layout, concatenated without framing:
//!
//! ```text
//! 0x01 ∥ previousLineHash(32)
//! ( 0x02 ∥ counter(8) ∥ validFrom(8) ∥ validTo(8) ∥ lineHash(32) ∥ publicKey(32) )*
//! 0x03 ∥ envelopeKey(32) ∥ signatureKey(32)
//! signature(64)
//! ```
//!
//! The list hash streams over everything before the signature; the
//! signature is ed25519 over that hash. Each entry's `lineHash` is SHA-256
//! of the entry's own 89-byte form with the hash field holding the previous
//! entry's `lineHash` (zeroes for the first).

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::ProtoError;

/// Marshalled size of one entry.
pub const PREGEN_ENTRY_SIZE: usize = 89;

const HEADER_SIZE: usize = 1 + 32;
const KEY_FIELD_SIZE: usize = 1 + 32 + 32;
const SIGNATURE_SIZE: usize = 64;

const TAG_HEADER: u8 = 0x01;
const TAG_ENTRY: u8 = 0x02;
const TAG_KEYS: u8 = 0x03;

/// One pregenerated ratchet key with its validity window and chain hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PregenerateEntry {
    /// Chain hash of this entry (incorporates the previous one).
    pub line_hash: [u8; 32],
    /// Ratchet counter that produced the key.
    pub counter: u64,
    /// Unix second this entry becomes valid.
    pub valid_from: u64,
    /// Unix second this entry expires.
    pub valid_to: u64,
    /// Ratchet public key of the step.
    pub public_key: [u8; 32],
}

impl PregenerateEntry {
    /// Create an entry with its chain hash computed. `previous` is `None`
    /// for the first entry of a fountain.
    pub fn new(
        previous: Option<&[u8; 32]>,
        counter: u64,
        valid_from: u64,
        valid_to: u64,
        public_key: [u8; 32],
    ) -> Self {
        let mut entry = PregenerateEntry {
            line_hash: [0u8; 32],
            counter,
            valid_from,
            valid_to,
            public_key,
        };
        entry.line_hash = entry.chain_hash(previous);
        entry
    }

    /// SHA-256 over this entry's marshalled form with the hash field
    /// replaced by `previous` (or zeroes).
    fn chain_hash(&self, previous: Option<&[u8; 32]>) -> [u8; 32] {
        let mut template = self.clone();
        template.line_hash = previous.copied().unwrap_or([0u8; 32]);
        Sha256::digest(template.marshal()).into()
    }

    /// Check this entry's chain hash against the preceding one.
    pub fn validate(&self, previous: Option<&[u8; 32]>) -> bool {
        self.line_hash == self.chain_hash(previous)
    }

    /// Encode to the 89-byte wire form.
    pub fn marshal(&self) -> [u8; PREGEN_ENTRY_SIZE] {
        let mut out = [0u8; PREGEN_ENTRY_SIZE];
        out[0] = TAG_ENTRY;
        out[1..9].copy_from_slice(&self.counter.to_be_bytes());
        out[9..17].copy_from_slice(&self.valid_from.to_be_bytes());
        out[17..25].copy_from_slice(&self.valid_to.to_be_bytes());
        out[25..57].copy_from_slice(&self.line_hash);
        out[57..89].copy_from_slice(&self.public_key);
        out
    }

    /// Decode an 89-byte wire entry.
    pub fn unmarshal(d: &[u8]) -> Result<Self, ProtoError> {
        if d.len() != PREGEN_ENTRY_SIZE {
            return Err(ProtoError::MessageIncomplete);
        }
        if d[0] != TAG_ENTRY {
            return Err(ProtoError::Parse);
        }
        let mut field = [0u8; 8];
        let mut entry = PregenerateEntry {
            line_hash: [0u8; 32],
            counter: 0,
            valid_from: 0,
            valid_to: 0,
            public_key: [0u8; 32],
        };
        field.copy_from_slice(&d[1..9]);
        entry.counter = u64::from_be_bytes(field);
        field.copy_from_slice(&d[9..17]);
        entry.valid_from = u64::from_be_bytes(field);
        field.copy_from_slice(&d[17..25]);
        entry.valid_to = u64::from_be_bytes(field);
        entry.line_hash.copy_from_slice(&d[25..57]);
        entry.public_key.copy_from_slice(&d[57..89]);
        Ok(entry)
    }
}

/// A keylist under construction: header written, entries appended, not yet
/// signed.
pub struct RatchetListBuilder {
    previous_line_hash: [u8; 32],
    entries: Vec<PregenerateEntry>,
    hasher: Sha256,
    marshalled: Vec<u8>,
}

impl RatchetListBuilder {
    /// Start a list chained off `previous_line_hash`.
    pub fn new(previous_line_hash: [u8; 32], expected_len: usize) -> Self {
        let mut header = [0u8; HEADER_SIZE];
        header[0] = TAG_HEADER;
        header[1..].copy_from_slice(&previous_line_hash);

        let mut marshalled = Vec::with_capacity(
            HEADER_SIZE + expected_len * PREGEN_ENTRY_SIZE + KEY_FIELD_SIZE + SIGNATURE_SIZE,
        );
        marshalled.extend_from_slice(&header);

        let mut hasher = Sha256::new();
        hasher.update(header);

        RatchetListBuilder { previous_line_hash, entries: Vec::with_capacity(expected_len), hasher, marshalled }
    }

    /// Append an entry, feeding both the wire form and the list hash.
    pub fn append(&mut self, entry: PregenerateEntry) {
        let m = entry.marshal();
        self.hasher.update(m);
        self.marshalled.extend_from_slice(&m);
        self.entries.push(entry);
    }

    /// Number of entries appended so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no entries were appended.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Attach the server keys, finish the list hash and sign it.
    pub fn sign(mut self, envelope_key: [u8; 32], signing_key: &SigningKey) -> RatchetList {
        let signature_key: [u8; 32] = signing_key.verifying_key().to_bytes();

        let mut key_field = [0u8; KEY_FIELD_SIZE];
        key_field[0] = TAG_KEYS;
        key_field[1..33].copy_from_slice(&envelope_key);
        key_field[33..].copy_from_slice(&signature_key);
        self.hasher.update(key_field);
        self.marshalled.extend_from_slice(&key_field);

        let list_hash: [u8; 32] = self.hasher.finalize().into();
        let signature = signing_key.sign(&list_hash).to_bytes();
        self.marshalled.extend_from_slice(&signature);

        RatchetList {
            previous_line_hash: self.previous_line_hash,
            entries: self.entries,
            envelope_key,
            signature_key,
            list_hash,
            signature,
            raw: self.marshalled,
        }
    }
}

/// A complete, signed keylist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatchetList {
    /// Last line hash of the previous list.
    pub previous_line_hash: [u8; 32],
    /// Pregenerated entries in step order.
    pub entries: Vec<PregenerateEntry>,
    /// Server's long-term Curve25519 envelope key.
    pub envelope_key: [u8; 32],
    /// Server's long-term ed25519 signature key.
    pub signature_key: [u8; 32],
    /// Streamed hash over header, entries and key field.
    pub list_hash: [u8; 32],
    /// ed25519 signature over `list_hash`.
    pub signature: [u8; 64],
    raw: Vec<u8>,
}

impl RatchetList {
    /// Parse a marshalled keylist, recomputing the list hash.
    ///
    /// Trailing bytes after the signature are ignored.
    pub fn parse(d: &[u8]) -> Result<Self, ProtoError> {
        if d.len() < HEADER_SIZE || d[0] != TAG_HEADER {
            return Err(ProtoError::Parse);
        }
        let mut previous_line_hash = [0u8; 32];
        previous_line_hash.copy_from_slice(&d[1..33]);

        let mut hasher = Sha256::new();
        hasher.update(&d[..HEADER_SIZE]);

        let mut entries = Vec::new();
        let mut pos = HEADER_SIZE;
        while pos < d.len() && d[pos] == TAG_ENTRY {
            let end = pos
                .checked_add(PREGEN_ENTRY_SIZE)
                .filter(|&end| end <= d.len())
                .ok_or(ProtoError::MessageIncomplete)?;
            entries.push(PregenerateEntry::unmarshal(&d[pos..end])?);
            hasher.update(&d[pos..end]);
            pos = end;
        }

        if pos >= d.len() || d[pos] != TAG_KEYS {
            return Err(ProtoError::Parse);
        }
        if d.len() < pos + KEY_FIELD_SIZE + SIGNATURE_SIZE {
            return Err(ProtoError::Parse);
        }
        hasher.update(&d[pos..pos + KEY_FIELD_SIZE]);

        let mut envelope_key = [0u8; 32];
        envelope_key.copy_from_slice(&d[pos + 1..pos + 33]);
        let mut signature_key = [0u8; 32];
        signature_key.copy_from_slice(&d[pos + 33..pos + 65]);
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&d[pos + KEY_FIELD_SIZE..pos + KEY_FIELD_SIZE + SIGNATURE_SIZE]);

        let consumed = pos + KEY_FIELD_SIZE + SIGNATURE_SIZE;
        Ok(RatchetList {
            previous_line_hash,
            entries,
            envelope_key,
            signature_key,
            list_hash: hasher.finalize().into(),
            signature,
            raw: d[..consumed].to_vec(),
        })
    }

    /// Check the signature, and optionally that the signing key matches the
    /// caller's pinned key.
    pub fn verify(&self, expect_key: Option<&[u8; 32]>) -> bool {
        if let Some(expected) = expect_key {
            if expected != &self.signature_key {
                return false;
            }
        }
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.signature_key) else {
            return false;
        };
        let signature = Signature::from_bytes(&self.signature);
        verifying_key.verify(&self.list_hash, &signature).is_ok()
    }

    /// The marshalled wire form.
    pub fn bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Entries whose validity overlaps `[valid_from, valid_to]`, narrowed
    /// to the overlap. `None` when nothing matches or the window is empty.
    pub fn find_ratchet_keys(&self, valid_from: u64, valid_to: u64) -> Option<Vec<MatchKey>> {
        if valid_from > valid_to {
            return None;
        }
        let matches: Vec<MatchKey> = self
            .entries
            .iter()
            .filter(|e| e.valid_from <= valid_to && valid_from <= e.valid_to)
            .map(|e| MatchKey {
                valid_from: e.valid_from.max(valid_from),
                valid_to: e.valid_to.min(valid_to),
                envelope_key: self.envelope_key,
                ratchet_key: e.public_key,
            })
            .collect();
        if matches.is_empty() {
            None
        } else {
            Some(matches)
        }
    }
}

/// One lockable slice of the requested window: this ratchet key, under this
/// envelope key, covers `[valid_from, valid_to]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchKey {
    /// Start of the covered slice.
    pub valid_from: u64,
    /// End of the covered slice.
    pub valid_to: u64,
    /// Server's long-term envelope key.
    pub envelope_key: [u8; 32],
    /// Ratchet public key of the step.
    pub ratchet_key: [u8; 32],
}

/// Overall time frame covered by a set of match keys. Holes are ignored.
pub fn covered_time_frame(keys: &[MatchKey]) -> (u64, u64) {
    let mut valid_from = 0u64;
    let mut valid_to = 0u64;
    for key in keys {
        if valid_from == 0 || key.valid_from < valid_from {
            valid_from = key.valid_from;
        }
        if key.valid_to > valid_to {
            valid_to = key.valid_to;
        }
    }
    (valid_from, valid_to)
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;

    fn signing_key() -> SigningKey {
        SigningKey::generate(&mut OsRng)
    }

    fn sample_list(entry_count: u64) -> (RatchetList, SigningKey) {
        let key = signing_key();
        let mut builder = RatchetListBuilder::new([0u8; 32], entry_count as usize);
        let mut previous: Option<[u8; 32]> = None;
        for i in 0..entry_count {
            let entry = PregenerateEntry::new(
                previous.as_ref(),
                i + 1,
                1000 + i * 100,
                1000 + (i + 1) * 100,
                [i as u8 + 1; 32],
            );
            previous = Some(entry.line_hash);
            builder.append(entry);
        }
        (builder.sign([9u8; 32], &key), key)
    }

    #[test]
    fn entry_marshal_roundtrip() {
        let entry = PregenerateEntry::new(None, 7, 100, 200, [3u8; 32]);
        let decoded = PregenerateEntry::unmarshal(&entry.marshal()).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn entry_unmarshal_rejects_bad_tag_and_length() {
        let entry = PregenerateEntry::new(None, 7, 100, 200, [3u8; 32]);
        let mut m = entry.marshal();
        m[0] = 0x05;
        assert_eq!(PregenerateEntry::unmarshal(&m), Err(ProtoError::Parse));
        assert_eq!(
            PregenerateEntry::unmarshal(&m[..PREGEN_ENTRY_SIZE - 1]),
            Err(ProtoError::MessageIncomplete)
        );
    }

    #[test]
    fn chain_hash_validates_adjacent_entries() {
        let first = PregenerateEntry::new(None, 1, 0, 100, [1u8; 32]);
        let second = PregenerateEntry::new(Some(&first.line_hash), 2, 100, 200, [2u8; 32]);

        assert!(first.validate(None));
        assert!(second.validate(Some(&first.line_hash)));
        assert!(!second.validate(None));
        assert!(!second.validate(Some(&second.line_hash)));
    }

    #[test]
    fn signed_list_parses_and_verifies() {
        let (list, key) = sample_list(5);

        let parsed = RatchetList::parse(list.bytes()).unwrap();
        assert_eq!(parsed.entries, list.entries);
        assert_eq!(parsed.envelope_key, list.envelope_key);
        assert_eq!(parsed.list_hash, list.list_hash);
        assert_eq!(parsed.bytes(), list.bytes());

        let pinned = key.verifying_key().to_bytes();
        assert!(parsed.verify(Some(&pinned)));
        assert!(parsed.verify(None));
    }

    #[test]
    fn verify_rejects_wrong_pin_and_tampered_bytes() {
        let (list, _) = sample_list(3);

        assert!(!list.verify(Some(&[0u8; 32])));

        // Flip a byte inside an entry; the recomputed list hash no longer
        // matches the signature.
        let mut raw = list.bytes().to_vec();
        raw[40] ^= 0x01;
        let tampered = RatchetList::parse(&raw).unwrap();
        assert!(!tampered.verify(None));
    }

    #[test]
    fn parse_rejects_truncations() {
        let (list, _) = sample_list(3);
        let raw = list.bytes();

        for cut in [0, 1, 32, 33, 40, raw.len() - 64, raw.len() - 1] {
            assert!(RatchetList::parse(&raw[..cut]).is_err(), "cut at {cut} must fail");
        }
    }

    #[test]
    fn find_ratchet_keys_narrows_to_overlap() {
        let (list, _) = sample_list(5); // windows 1000..1100 .. 1400..1500

        let keys = list.find_ratchet_keys(1150, 1250).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!((keys[0].valid_from, keys[0].valid_to), (1150, 1200));
        assert_eq!((keys[1].valid_from, keys[1].valid_to), (1200, 1250));
        assert_eq!(keys[0].envelope_key, [9u8; 32]);

        assert!(list.find_ratchet_keys(2000, 3000).is_none());
        assert!(list.find_ratchet_keys(1250, 1150).is_none());
    }

    #[test]
    fn find_ratchet_keys_window_inside_single_entry() {
        let (list, _) = sample_list(5);
        let keys = list.find_ratchet_keys(1110, 1120).unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!((keys[0].valid_from, keys[0].valid_to), (1110, 1120));
    }

    #[test]
    fn covered_time_frame_spans_all_keys() {
        let (list, _) = sample_list(5);
        let keys = list.find_ratchet_keys(1050, 1350).unwrap();
        assert_eq!(covered_time_frame(&keys), (1050, 1350));
        assert_eq!(covered_time_frame(&[]), (0, 0));
    }
}

//! Property-based tests for keylist serialization and search.

use ed25519_dalek::SigningKey;
use cypherlock_proto::{PregenerateEntry, RatchetList, RatchetListBuilder};
use proptest::prelude::*;

/// Strategy: a chained entry run with contiguous windows.
fn arbitrary_entries() -> impl Strategy<Value = Vec<PregenerateEntry>> {
    (
        1u64..1000,                                   // start counter
        1u64..100_000,                                // window start
        1u64..100_000,                                // window width
        1usize..40,                                   // entry count
        prop::collection::vec(any::<[u8; 32]>(), 40), // public keys
    )
        .prop_map(|(counter0, from0, width, count, keys)| {
            let mut entries = Vec::with_capacity(count);
            let mut previous: Option<[u8; 32]> = None;
            for i in 0..count {
                let from = from0 + i as u64 * width;
                let entry = PregenerateEntry::new(
                    previous.as_ref(),
                    counter0 + i as u64,
                    from,
                    from + width,
                    keys[i],
                );
                previous = Some(entry.line_hash);
                entries.push(entry);
            }
            entries
        })
}

proptest! {
    #[test]
    fn prop_sign_parse_verify_roundtrip(
        entries in arbitrary_entries(),
        previous in any::<[u8; 32]>(),
        envelope_key in any::<[u8; 32]>(),
        seed in any::<[u8; 32]>(),
    ) {
        let signing_key = SigningKey::from_bytes(&seed);
        let mut builder = RatchetListBuilder::new(previous, entries.len());
        for entry in &entries {
            builder.append(entry.clone());
        }
        let list = builder.sign(envelope_key, &signing_key);

        let parsed = RatchetList::parse(list.bytes()).unwrap();
        prop_assert_eq!(&parsed.entries, &entries);
        prop_assert_eq!(parsed.previous_line_hash, previous);
        prop_assert_eq!(parsed.envelope_key, envelope_key);
        prop_assert_eq!(parsed.list_hash, list.list_hash);
        prop_assert!(parsed.verify(Some(&signing_key.verifying_key().to_bytes())));
    }

    #[test]
    fn prop_parse_never_panics_on_arbitrary_bytes(bytes in prop::collection::vec(any::<u8>(), 0..2048)) {
        let _ = RatchetList::parse(&bytes);
    }

    #[test]
    fn prop_truncated_list_never_parses_as_valid(
        entries in arbitrary_entries(),
        seed in any::<[u8; 32]>(),
        cut_back in 1usize..64,
    ) {
        let signing_key = SigningKey::from_bytes(&seed);
        let mut builder = RatchetListBuilder::new([0u8; 32], entries.len());
        for entry in entries {
            builder.append(entry);
        }
        let list = builder.sign([1u8; 32], &signing_key);
        let raw = list.bytes();
        let cut = raw.len() - cut_back.min(raw.len() - 1);

        match RatchetList::parse(&raw[..cut]) {
            Err(_) => {}
            // A cut landing before the signature can still parse if it
            // exposes an earlier structurally complete list; it must then
            // fail verification.
            Ok(l) => prop_assert!(!l.verify(Some(&signing_key.verifying_key().to_bytes()))),
        }
    }

    #[test]
    fn prop_every_window_inside_coverage_matches(
        entries in arbitrary_entries(),
        seed in any::<[u8; 32]>(),
        a in 0.0f64..1.0,
        b in 0.0f64..1.0,
    ) {
        let coverage_from = entries[0].valid_from;
        let coverage_to = entries[entries.len() - 1].valid_to;
        let span = (coverage_to - coverage_from) as f64;
        let mut from = coverage_from + (span * a) as u64;
        let mut to = coverage_from + (span * b) as u64;
        if from > to {
            std::mem::swap(&mut from, &mut to);
        }

        let signing_key = SigningKey::from_bytes(&seed);
        let mut builder = RatchetListBuilder::new([0u8; 32], entries.len());
        for entry in entries {
            builder.append(entry);
        }
        let list = builder.sign([1u8; 32], &signing_key);

        let keys = list.find_ratchet_keys(from, to);
        prop_assert!(keys.is_some(), "window [{from}, {to}] inside coverage must match");
        let keys = keys.unwrap();
        prop_assert_eq!(cypherlock_proto::covered_time_frame(&keys), (from, to));
    }
}

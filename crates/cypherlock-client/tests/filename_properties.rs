//! Property-based tests for lock filename handling.

use cypherlock_client::parse_lock_filename;
use cypherlock_proto::lock_filename;
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_filename_roundtrip(a in any::<u64>(), b in any::<u64>()) {
        let name = lock_filename(a, b);
        prop_assert_eq!(parse_lock_filename(&name), Some((a, b)));
    }

    #[test]
    fn prop_arbitrary_names_never_panic(name in "\\PC{0,64}") {
        let _ = parse_lock_filename(&name);
    }

    #[test]
    fn prop_names_without_oracle_suffix_are_rejected(name in "[0-9-]{1,32}") {
        prop_assert_eq!(parse_lock_filename(&name), None);
    }
}

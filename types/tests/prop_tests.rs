use proptest::prelude::*;

use strata_types::{NetworkId, PublicKey, StrataError};

proptest! {
    /// Parsing the Display form yields the same key.
    #[test]
    fn public_key_hex_parses_back(bytes in prop::array::uniform32(0u8..)) {
        let key = PublicKey(bytes);
        prop_assert_eq!(key.to_string().parse::<PublicKey>().unwrap(), key);
    }

    /// Key order follows byte order.
    #[test]
    fn public_key_order_is_lexicographic(
        a in prop::array::uniform32(0u8..),
        b in prop::array::uniform32(0u8..),
    ) {
        prop_assert_eq!(PublicKey(a).cmp(&PublicKey(b)), a.cmp(&b));
    }

    /// Slices of the wrong length are rejected with their actual length.
    #[test]
    fn wrong_length_slice_rejected(bytes in prop::collection::vec(0u8.., 0..64)) {
        prop_assume!(bytes.len() != 32);
        let is_length_error = matches!(
            PublicKey::from_slice(&bytes),
            Err(StrataError::InvalidKeyLength { actual, .. }) if actual == bytes.len()
        );
        prop_assert!(is_length_error);
    }

    #[test]
    fn network_id_displays_as_number(id in 0u32..) {
        prop_assert_eq!(NetworkId(id).to_string(), id.to_string());
    }
}

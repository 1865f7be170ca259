use proptest::prelude::*;

use strata_crypto::{create_session, keypair_from_seed, SEAL_OVERHEAD};

proptest! {
    /// Sessions derived from either side of an identity pair interoperate.
    #[test]
    fn sessions_are_symmetric(
        seed_a in prop::array::uniform32(0u8..),
        seed_b in prop::array::uniform32(0u8..),
        payload in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        prop_assume!(seed_a != seed_b);
        let a = keypair_from_seed(&seed_a);
        let b = keypair_from_seed(&seed_b);

        let a_to_b = create_session(&a.private, &b.public).unwrap();
        let b_to_a = create_session(&b.private, &a.public).unwrap();

        let frame = a_to_b.seal(&payload).unwrap();
        prop_assert_eq!(frame.len(), payload.len() + SEAL_OVERHEAD);
        prop_assert_eq!(b_to_a.open(&frame).unwrap(), payload);
    }

    /// The session id is always the remote public key.
    #[test]
    fn session_id_is_remote(
        seed_a in prop::array::uniform32(0u8..),
        seed_b in prop::array::uniform32(0u8..),
    ) {
        let a = keypair_from_seed(&seed_a);
        let b = keypair_from_seed(&seed_b);
        let session = create_session(&a.private, &b.public).unwrap();
        prop_assert_eq!(*session.id(), b.public);
    }
}

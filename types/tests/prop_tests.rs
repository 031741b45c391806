use proptest::prelude::*;

use ballot_types::{BlockHash, NodeId, PeerAddress, Timestamp};

proptest! {
    /// Display then parse gives back the same address, IPv6-style colons included.
    #[test]
    fn peer_address_display_parse_roundtrip(host in "[a-z0-9.:]{1,24}", port in any::<u16>()) {
        let address = PeerAddress::new(host, port);
        prop_assert_eq!(PeerAddress::parse(&address.to_string()), Some(address));
    }

    /// Timestamp ordering follows the millisecond count.
    #[test]
    fn timestamp_ordering(a in any::<u64>(), b in any::<u64>()) {
        let ta = Timestamp::from_millis(a);
        let tb = Timestamp::from_millis(b);
        prop_assert_eq!(ta <= tb, a <= b);
        prop_assert_eq!(ta == tb, a == b);
    }

    /// Timestamps serialize as bare integers.
    #[test]
    fn timestamp_is_transparent_on_the_wire(millis in any::<u64>()) {
        let json = serde_json::to_string(&Timestamp::from_millis(millis)).unwrap();
        prop_assert_eq!(json, millis.to_string());
    }

    /// Node ids and block hashes serialize as plain strings.
    #[test]
    fn string_newtypes_are_transparent(s in "[0-9a-f]{1,64}") {
        prop_assert_eq!(serde_json::to_string(&NodeId::new(s.clone())).unwrap(), format!("\"{s}\""));
        prop_assert_eq!(serde_json::to_string(&BlockHash::new(s.clone())).unwrap(), format!("\"{s}\""));
    }

    /// Only the "0" sentinel is the zero hash.
    #[test]
    fn block_hash_is_zero_only_for_sentinel(s in "[0-9a-f]{1,64}") {
        prop_assert_eq!(BlockHash::new(s.clone()).is_zero(), s == BlockHash::ZERO);
    }
}

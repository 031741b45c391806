//! Deterministic lead selection and the acceptance threshold.

use ballot_types::{BlockHash, NodeId};

/// Pick the next lead validator from `validators` (sorted lexicographically).
///
/// The index is the hex form of `sha256(head)`, read as a big-endian integer
/// over its ASCII bytes, modulo the validator count. Every validator looking
/// at the same head and validator set picks the same node, so independent
/// watchdogs converge without coordination.
pub fn select_lead_validator<'a>(validators: &'a [NodeId], head: &BlockHash) -> Option<&'a NodeId> {
    if validators.is_empty() {
        return None;
    }
    let digest_hex = ballot_crypto::sha256_hex(head.as_str().as_bytes());
    let n = validators.len() as u64;
    let index = digest_hex
        .bytes()
        .fold(0u64, |acc, byte| (acc * 256 + byte as u64) % n);
    validators.get(index as usize)
}

/// Number of distinct validator announcements a normal node needs before it
/// loads a block.
///
/// Two and three validators need a single announcement. Every other count
/// uses `ceil(ratio * n)`, never less than one.
pub fn validator_threshold(validator_count: usize, ratio: f64) -> usize {
    match validator_count {
        2 | 3 => 1,
        n => ((ratio * n as f64).ceil() as usize).max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|n| NodeId::from(*n)).collect()
    }

    #[test]
    fn small_topologies_need_one_announcement() {
        assert_eq!(validator_threshold(2, 0.66), 1);
        assert_eq!(validator_threshold(3, 0.66), 1);
    }

    #[test]
    fn general_threshold_rounds_up() {
        assert_eq!(validator_threshold(1, 0.66), 1);
        assert_eq!(validator_threshold(4, 0.66), 3);
        assert_eq!(validator_threshold(10, 0.66), 7);
        assert_eq!(validator_threshold(0, 0.66), 1);
    }

    #[test]
    fn selection_is_deterministic() {
        let validators = ids(&["a", "b", "c"]);
        let head = BlockHash::new("abc123");
        let first = select_lead_validator(&validators, &head);
        let second = select_lead_validator(&validators, &head);
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn selection_reads_the_hex_digest_as_an_integer() {
        // sha256("abc123") = 6ca13d52..., as ASCII bytes mod 7 = 4
        // sha256("some-head") = 9810c54f..., mod 7 = 1, mod 5 = 4
        // sha256("0") = 5feceb66..., mod 7 = 5, mod 5 = 1
        let seven = ids(&["a", "b", "c", "d", "e", "f", "g"]);
        let five = ids(&["a", "b", "c", "d", "e"]);
        assert_eq!(select_lead_validator(&seven, &BlockHash::new("abc123")), Some(&seven[4]));
        assert_eq!(select_lead_validator(&seven, &BlockHash::new("some-head")), Some(&seven[1]));
        assert_eq!(select_lead_validator(&five, &BlockHash::new("some-head")), Some(&five[4]));
        assert_eq!(select_lead_validator(&seven, &BlockHash::zero()), Some(&seven[5]));
        assert_eq!(select_lead_validator(&five, &BlockHash::zero()), Some(&five[1]));
    }

    #[test]
    fn empty_set_has_no_lead() {
        assert!(select_lead_validator(&[], &BlockHash::zero()).is_none());
    }
}

//! Hop budget for flood broadcasts.

/// Hop budget for a TTL broadcast: `ceil(log_k(n)) + 1`, at least 1.
///
/// `k` is the minimum-connection target (the expected fan-out per hop) and
/// `n` the number of known peers. A fan-out below 2 is treated as 2.
pub fn time_to_live(min_connections: usize, known_peers: usize) -> u32 {
    let k = min_connections.max(2) as u128;
    let n = known_peers.max(1) as u128;
    // smallest h with k^h >= n, i.e. ceil(log_k(n)) without float rounding
    let mut hops = 0u32;
    let mut reach = 1u128;
    while reach < n {
        reach = reach.saturating_mul(k);
        hops += 1;
    }
    hops + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_peer_needs_one_hop() {
        assert_eq!(time_to_live(3, 0), 1);
        assert_eq!(time_to_live(3, 1), 1);
    }

    #[test]
    fn grows_logarithmically() {
        assert_eq!(time_to_live(3, 3), 2);
        assert_eq!(time_to_live(3, 4), 3);
        assert_eq!(time_to_live(3, 9), 3);
        assert_eq!(time_to_live(3, 10), 4);
        assert_eq!(time_to_live(2, 1024), 11);
    }

    #[test]
    fn degenerate_fan_out_is_clamped() {
        assert_eq!(time_to_live(0, 8), time_to_live(2, 8));
        assert_eq!(time_to_live(1, 8), 4);
    }
}

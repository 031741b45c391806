//! Global node table: where validators can reach every node they know of.

use std::collections::BTreeMap;

use ballot_messages::NodeRecord;
use ballot_types::{NodeId, PeerAddress, Timestamp};

#[derive(Clone, Debug, Default)]
pub struct GlobalNodeTable {
    nodes: BTreeMap<NodeId, NodeRecord>,
}

impl GlobalNodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an entry unconditionally (first-hand knowledge).
    pub fn insert(&mut self, node_id: NodeId, record: NodeRecord) {
        self.nodes.insert(node_id, record);
    }

    /// Merge a peer's table: absent entries are added, existing entries are
    /// replaced only when the incoming `last_seen` is newer. Returns the
    /// number of entries added or replaced.
    pub fn merge(&mut self, incoming: &BTreeMap<NodeId, NodeRecord>) -> usize {
        let mut changed = 0;
        for (node_id, record) in incoming {
            match self.nodes.get(node_id) {
                Some(existing) if existing.last_seen >= record.last_seen => {}
                _ => {
                    self.nodes.insert(node_id.clone(), record.clone());
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Refresh an existing entry from a heartbeat claimed at `timestamp`.
    ///
    /// Unknown senders and stale heartbeats are ignored. Returns whether the
    /// entry was updated.
    pub fn apply_heartbeat(&mut self, node_id: &NodeId, host: &str, port: u16, timestamp: Timestamp) -> bool {
        let Some(record) = self.nodes.get_mut(node_id) else {
            return false;
        };
        if timestamp <= record.last_seen {
            return false;
        }
        record.last_seen = timestamp;
        record.host = host.to_string();
        record.port = port;
        true
    }

    pub fn get(&self, node_id: &NodeId) -> Option<&NodeRecord> {
        self.nodes.get(node_id)
    }

    pub fn entries(&self) -> &BTreeMap<NodeId, NodeRecord> {
        &self.nodes
    }

    pub fn addresses(&self) -> Vec<PeerAddress> {
        self.nodes
            .values()
            .map(|r| PeerAddress::new(r.host.clone(), r.port))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(port: u16, last_seen: u64) -> NodeRecord {
        NodeRecord {
            host: "127.0.0.1".into(),
            port,
            last_seen: Timestamp::from_millis(last_seen),
        }
    }

    #[test]
    fn merge_adds_missing_and_replaces_only_newer() {
        let mut table = GlobalNodeTable::new();
        table.insert(NodeId::from("a"), record(1, 100));
        table.insert(NodeId::from("b"), record(2, 100));

        let incoming: BTreeMap<_, _> = [
            (NodeId::from("a"), record(10, 50)),
            (NodeId::from("b"), record(20, 200)),
            (NodeId::from("c"), record(30, 1)),
        ]
        .into_iter()
        .collect();

        assert_eq!(table.merge(&incoming), 2);
        assert_eq!(table.get(&NodeId::from("a")).unwrap().port, 1);
        assert_eq!(table.get(&NodeId::from("b")).unwrap().port, 20);
        assert_eq!(table.get(&NodeId::from("c")).unwrap().port, 30);
    }

    #[test]
    fn heartbeat_is_last_write_wins_by_claimed_time() {
        let mut table = GlobalNodeTable::new();
        table.insert(NodeId::from("a"), record(1, 100));

        assert!(!table.apply_heartbeat(&NodeId::from("a"), "10.0.0.1", 9, Timestamp::from_millis(99)));
        assert!(!table.apply_heartbeat(&NodeId::from("a"), "10.0.0.1", 9, Timestamp::from_millis(100)));
        assert!(table.apply_heartbeat(&NodeId::from("a"), "10.0.0.1", 9, Timestamp::from_millis(101)));

        let entry = table.get(&NodeId::from("a")).unwrap();
        assert_eq!(entry.host, "10.0.0.1");
        assert_eq!(entry.port, 9);
        assert_eq!(entry.last_seen, Timestamp::from_millis(101));
    }

    #[test]
    fn heartbeat_from_unknown_node_is_ignored() {
        let mut table = GlobalNodeTable::new();
        assert!(!table.apply_heartbeat(&NodeId::from("x"), "h", 1, Timestamp::now()));
        assert!(table.is_empty());
    }
}

//! Connection bookkeeping.
//!
//! [`ConnectionTable`] tracks persistent peer connections by the address the
//! peer listens on. [`TempConnections`] tracks short-lived connections opened
//! for a single direct send, so a janitor can close the idle ones. Both are
//! generic over the writer handle so they can be exercised without sockets.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use ballot_types::{NodeId, PeerAddress};
use rand::seq::SliceRandom;

/// Process-unique id of one TCP connection.
pub type ConnectionId = u64;

#[derive(Clone, Debug)]
pub struct ConnectionEntry<W> {
    pub id: ConnectionId,
    pub address: PeerAddress,
    pub node_id: Option<NodeId>,
    pub writer: W,
}

#[derive(Debug)]
pub struct ConnectionTable<W> {
    entries: Vec<ConnectionEntry<W>>,
    max_connections: usize,
}

impl<W: Clone> ConnectionTable<W> {
    pub fn new(max_connections: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_connections,
        }
    }

    /// Register a connection. An existing entry for the same address is
    /// replaced and returned so the caller can close it.
    pub fn register(&mut self, entry: ConnectionEntry<W>) -> Option<ConnectionEntry<W>> {
        let previous = self
            .entries
            .iter()
            .position(|e| e.address == entry.address)
            .map(|i| self.entries.remove(i));
        self.entries.push(entry);
        previous
    }

    /// Remove the entry for a given connection id.
    pub fn remove(&mut self, id: ConnectionId) -> Option<ConnectionEntry<W>> {
        let i = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(i))
    }

    pub fn drain(&mut self) -> Vec<ConnectionEntry<W>> {
        std::mem::take(&mut self.entries)
    }

    pub fn find(&self, address: &PeerAddress) -> Option<&ConnectionEntry<W>> {
        self.entries.iter().find(|e| &e.address == address)
    }

    pub fn is_connected(&self, address: &PeerAddress) -> bool {
        self.find(address).is_some()
    }

    pub fn addresses(&self) -> Vec<PeerAddress> {
        self.entries.iter().map(|e| e.address.clone()).collect()
    }

    /// Snapshot of every writer with its address, for fan-out.
    pub fn writers(&self) -> Vec<(PeerAddress, W)> {
        self.entries
            .iter()
            .map(|e| (e.address.clone(), e.writer.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max_connections
    }
}

#[derive(Debug)]
struct TempEntry<W> {
    id: ConnectionId,
    writer: W,
    last_active: Instant,
}

/// Short-lived connections keyed by the address they were opened to.
#[derive(Debug, Default)]
pub struct TempConnections<W> {
    entries: HashMap<PeerAddress, TempEntry<W>>,
}

impl<W: Clone> TempConnections<W> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, address: PeerAddress, id: ConnectionId, writer: W) {
        self.entries.insert(
            address,
            TempEntry {
                id,
                writer,
                last_active: Instant::now(),
            },
        );
    }

    /// The open temporary connection to `address`, if any. Counts as activity.
    pub fn writer_for(&mut self, address: &PeerAddress) -> Option<W> {
        let entry = self.entries.get_mut(address)?;
        entry.last_active = Instant::now();
        Some(entry.writer.clone())
    }

    /// Reset the idle timer of the connection with id `id`.
    pub fn touch(&mut self, id: ConnectionId) {
        if let Some(entry) = self.entries.values_mut().find(|e| e.id == id) {
            entry.last_active = Instant::now();
        }
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<W> {
        let address = self
            .entries
            .iter()
            .find(|(_, e)| e.id == id)
            .map(|(a, _)| a.clone())?;
        self.entries.remove(&address).map(|e| e.writer)
    }

    /// Remove and return every connection idle for longer than `budget`.
    pub fn take_idle(&mut self, budget: Duration) -> Vec<(ConnectionId, W)> {
        let now = Instant::now();
        let idle: Vec<PeerAddress> = self
            .entries
            .iter()
            .filter(|(_, e)| now.duration_since(e.last_active) > budget)
            .map(|(a, _)| a.clone())
            .collect();
        idle.into_iter()
            .filter_map(|a| self.entries.remove(&a))
            .map(|e| (e.id, e.writer))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Up to `count` distinct random addresses from `candidates`, skipping `exclude`.
pub fn pick_suggestions(candidates: &[PeerAddress], exclude: &PeerAddress, count: usize) -> Vec<PeerAddress> {
    let mut pool: Vec<&PeerAddress> = candidates.iter().filter(|a| *a != exclude).collect();
    pool.sort_by(|a, b| (&a.host, a.port).cmp(&(&b.host, b.port)));
    pool.dedup();
    pool.choose_multiple(&mut rand::thread_rng(), count)
        .map(|a| (*a).clone())
        .collect()
}

//! P2P networking bookkeeping for the ballot network.
//!
//! The pure tables here (peer directory, global node table, replay cache,
//! connection tables) carry no I/O of their own; the node wires them to TCP
//! streams. [`broadcast`] performs the concurrent fan-out writes.

pub mod broadcast;
pub mod connection;
pub mod error;
pub mod global_table;
pub mod peer_directory;
pub mod replay;

pub use broadcast::{broadcast_frame, write_frame, BroadcastResult, PeerWriter};
pub use connection::{pick_suggestions, ConnectionEntry, ConnectionId, ConnectionTable, TempConnections};
pub use error::NetworkError;
pub use global_table::GlobalNodeTable;
pub use peer_directory::{DirectoryInsert, PeerDirectory};
pub use replay::ReplayCache;

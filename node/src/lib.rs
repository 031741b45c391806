//! Ballot network node.
//!
//! [`Node`] owns every subsystem of one network participant:
//! - TCP listener, dialer and connection bookkeeping
//! - Signed-envelope dispatch, TTL flood relay and replay suppression
//! - Join handshake and discovery gossip
//! - Ledger state and the role-scoped consensus tasks (block proposal,
//!   lead watchdog, validator discovery)
//!
//! Presentation layers subscribe to [`NodeEvent`]s on the node's
//! [`EventBus`] and drive it through the command methods on [`Node`].

pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod logging;
pub mod node;
pub mod shutdown;
pub mod tasks;

mod connection_registry;
mod discovery;
mod dispatch;
mod join;
mod messaging;
mod peer_connector;
mod roles;
mod sync;

pub use config::NodeConfig;
pub use credentials::{load_credentials, load_electors, ElectorCredentials};
pub use error::NodeError;
pub use events::{EventBus, NodeEvent};
pub use logging::{init_logging, LogFormat};
pub use node::Node;
pub use shutdown::ShutdownController;
pub use tasks::TaskGroup;

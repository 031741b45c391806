//! The node aggregate: owns every subsystem and exposes the command surface.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use ballot_consensus::{
    sign_vote, BlockQuorum, ConsensusError, LedgerOp, LedgerState, NodeRole,
};
use ballot_consensus::ops::{AddCandidate, AddElector};
use ballot_crypto::{derive_node_id, ElectorKeypair, HandshakeKey, NodeKeypair};
use ballot_ledger::{Chain, Snapshot, Transaction};
use ballot_messages::{Payload, Proposal, ProposalKind, TextMessage};
use ballot_network::{
    ConnectionTable, GlobalNodeTable, PeerDirectory, PeerWriter, ReplayCache, TempConnections,
};
use ballot_types::{NodeId, PeerAddress};

use crate::config::NodeConfig;
use crate::credentials::{self, ElectorCredentials};
use crate::error::NodeError;
use crate::events::{EventBus, NodeEvent};
use crate::roles::RoleTasks;
use crate::shutdown::ShutdownController;

/// Timeout for waiting on background tasks during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Dialer-side bookkeeping for the join retry flow.
#[derive(Debug, Default)]
pub(crate) struct JoinRetry {
    pub tried: HashSet<PeerAddress>,
    pub tries: u32,
    pub joined: bool,
}

/// A running ballot node.
///
/// Shared as `Arc<Node>` between the listener, per-connection readers and
/// the role tasks. Ledger state sits behind one mutex so handlers never
/// interleave inside a finalization.
pub struct Node {
    pub(crate) config: NodeConfig,
    pub(crate) node_id: NodeId,
    pub(crate) keypair: NodeKeypair,
    pub(crate) handshake_key: Option<HandshakeKey>,
    pub(crate) ledger: Mutex<LedgerState>,
    pub(crate) peers: RwLock<PeerDirectory>,
    pub(crate) global_nodes: RwLock<GlobalNodeTable>,
    pub(crate) connections: RwLock<ConnectionTable<PeerWriter>>,
    pub(crate) temp_connections: Mutex<TempConnections<PeerWriter>>,
    pub(crate) replay: Mutex<ReplayCache>,
    pub(crate) quorum: Mutex<BlockQuorum>,
    pub(crate) join_retry: Mutex<JoinRetry>,
    pub(crate) elector: RwLock<Option<ElectorKeypair>>,
    pub(crate) events: EventBus,
    pub(crate) shutdown: ShutdownController,
    pub(crate) role_tasks: std::sync::Mutex<RoleTasks>,
    pub(crate) production_halted: AtomicBool,
    pub(crate) block_period_ms: AtomicU64,
    pub(crate) next_connection_id: AtomicU64,
    local_addr: OnceLock<SocketAddr>,
    task_handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    /// Create a node. Nothing touches the network until [`start`](Self::start).
    pub fn new(config: NodeConfig) -> Result<Arc<Self>, NodeError> {
        config.validate()?;
        let keypair = NodeKeypair::generate();
        let public_key = keypair.public_key_hex();
        let node_id = config
            .node_id
            .clone()
            .unwrap_or_else(|| derive_node_id(&public_key));
        let handshake_key = config
            .network_key
            .as_deref()
            .map(HandshakeKey::from_secret_hex)
            .transpose()?;

        let mut peers = PeerDirectory::new();
        peers.insert(node_id.clone(), public_key);

        Ok(Arc::new(Self {
            ledger: Mutex::new(LedgerState::new(node_id.clone(), config.chain_sync_timeout())),
            peers: RwLock::new(peers),
            global_nodes: RwLock::new(GlobalNodeTable::new()),
            connections: RwLock::new(ConnectionTable::new(config.max_connections)),
            temp_connections: Mutex::new(TempConnections::new()),
            replay: Mutex::new(ReplayCache::unbounded()),
            quorum: Mutex::new(BlockQuorum::new()),
            join_retry: Mutex::new(JoinRetry::default()),
            elector: RwLock::new(None),
            events: EventBus::new(),
            shutdown: ShutdownController::new(),
            role_tasks: std::sync::Mutex::new(RoleTasks::default()),
            production_halted: AtomicBool::new(false),
            block_period_ms: AtomicU64::new(config.block_period_ms),
            next_connection_id: AtomicU64::new(1),
            local_addr: OnceLock::new(),
            task_handles: std::sync::Mutex::new(Vec::new()),
            handshake_key,
            keypair,
            node_id,
            config,
        }))
    }

    /// Bind the listener and start the background loops.
    ///
    /// A bootstrap node then creates the network; otherwise the node joins
    /// `initial_peer` if one is configured.
    pub async fn start(self: &Arc<Self>) -> Result<(), NodeError> {
        tracing::info!(
            node_id = %self.node_id,
            host = %self.config.host,
            port = self.config.port,
            bootstrap = self.config.bootstrap,
            "ballot node starting"
        );

        let listener = match TcpListener::bind((self.config.host.as_str(), self.config.port)).await {
            Ok(listener) => listener,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::error!(port = self.config.port, "port already in use");
                self.events.emit(NodeEvent::PortInUse {
                    port: self.config.port,
                });
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };
        let local = listener.local_addr()?;
        let _ = self.local_addr.set(local);

        self.track(self.spawn_listener(listener));
        self.track(self.spawn_discovery_loop());
        self.track(self.spawn_temp_janitor());

        let address = self.advertised_address()?;
        tracing::info!(%address, "listening");
        self.events.emit(NodeEvent::ServerReady { address });

        if let Some(path) = self.config.credentials_path.clone() {
            if let Err(e) = self.load_credentials(&path).await {
                tracing::warn!(error = %e, "could not load elector credentials");
            }
        }

        if self.config.bootstrap {
            self.bootstrap_network().await?;
            if let Some(path) = self.config.electors_path.clone() {
                if let Err(e) = self.load_electors(&path).await {
                    tracing::warn!(error = %e, "could not load electors");
                }
            }
        }

        if let Some(peer) = self.config.initial_peer.clone() {
            let address = PeerAddress::parse(&peer)
                .ok_or_else(|| NodeError::Config(format!("initial_peer is not host:port: {peer}")))?;
            if let Err(e) = self.connect(&address.host, address.port).await {
                tracing::warn!(peer = %address, error = %e, "initial connection failed");
                self.events.emit(NodeEvent::InitialConnectionFailed { peer: address });
            }
        }
        Ok(())
    }

    /// Stop every task and close every connection.
    pub async fn stop(&self) -> Result<(), NodeError> {
        tracing::info!(node_id = %self.node_id, "ballot node stopping");
        self.shutdown.shutdown();
        self.cancel_role_tasks();
        self.disconnect_all().await;

        let handles: Vec<JoinHandle<()>> = match self.task_handles.lock() {
            Ok(mut handles) => handles.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for handle in handles {
            let abort = handle.abort_handle();
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err() {
                tracing::warn!("background task did not stop in time, aborting");
                abort.abort();
            }
        }
        tracing::info!("ballot node stopped");
        Ok(())
    }

    /// Wait for SIGINT or SIGTERM, then signal every background task.
    pub async fn wait_for_signal(&self) {
        self.shutdown.wait_for_signal().await;
    }

    pub(crate) fn track(&self, handle: JoinHandle<()>) {
        match self.task_handles.lock() {
            Ok(mut handles) => handles.push(handle),
            Err(poisoned) => poisoned.into_inner().push(handle),
        }
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn public_key(&self) -> String {
        self.keypair.public_key_hex()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Where other nodes reach this one: configured host, bound port.
    pub fn advertised_address(&self) -> Result<PeerAddress, NodeError> {
        let local = self.local_addr().ok_or(NodeError::NotStarted)?;
        Ok(PeerAddress::new(self.config.host.clone(), local.port()))
    }

    pub async fn role(&self) -> NodeRole {
        self.ledger.lock().await.role()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.ledger.lock().await.snapshot().clone()
    }

    pub async fn chain(&self) -> Chain {
        self.ledger.lock().await.chain().clone()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn connected_peers(&self) -> Vec<PeerAddress> {
        self.connections.read().await.addresses()
    }

    pub async fn peer_directory(&self) -> PeerDirectory {
        self.peers.read().await.clone()
    }

    pub async fn global_nodes(&self) -> GlobalNodeTable {
        self.global_nodes.read().await.clone()
    }

    pub fn block_period(&self) -> Duration {
        Duration::from_millis(self.block_period_ms.load(Ordering::Relaxed))
    }

    // ── Commands ───────────────────────────────────────────────────────

    /// Close every peer and temporary connection.
    pub async fn disconnect_all(&self) {
        let entries = self.connections.write().await.drain();
        let temps = self.temp_connections.lock().await.take_idle(Duration::ZERO);
        let closed = entries.len() + temps.len();
        for entry in entries {
            close_writer(&entry.writer).await;
        }
        for (_, writer) in temps {
            close_writer(&writer).await;
        }
        if closed > 0 {
            tracing::info!(closed, "disconnected all peers");
            self.events.emit(NodeEvent::ConnectionsChanged { count: 0 });
        }
    }

    /// Queue an arbitrary transaction in the working block.
    pub async fn add_transaction(&self, tx: Transaction) {
        self.ledger.lock().await.add_transaction(tx);
    }

    /// Finalize the working block and announce it.
    ///
    /// Returns `false` when finalization was suspended by a chain load.
    pub async fn finalize(self: &Arc<Self>) -> Result<bool, NodeError> {
        let finalized = self.ledger.lock().await.finalize_block();
        match finalized {
            Some(finalized) => {
                let block = finalized.block.clone();
                self.apply_finalized(finalized).await;
                self.announce_block(block).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Sign a vote with the loaded elector credentials and send it to the
    /// lead validator.
    pub async fn propose_vote(self: &Arc<Self>, choice: u64) -> Result<(), NodeError> {
        let vote = {
            let elector = self.elector.read().await;
            let elector = elector.as_ref().ok_or(NodeError::MissingCredentials)?;
            sign_vote(elector, choice)?
        };
        let lead = self
            .ledger
            .lock()
            .await
            .snapshot()
            .lead_validator()
            .cloned()
            .ok_or(ConsensusError::NoLeadValidator)?;
        tracing::info!(choice, %lead, "proposing vote");
        if lead == self.node_id {
            self.handle_vote(vote).await;
            return Ok(());
        }
        self.ttl_broadcast(&Payload::Vote(vote), Some(lead)).await
    }

    /// Register a candidate. Lead validator only. Returns the assigned id.
    pub async fn add_candidate(&self, name: &str) -> Result<u64, NodeError> {
        let mut ledger = self.ledger.lock().await;
        if !ledger.role().is_lead() {
            return Err(ConsensusError::NotLeadValidator.into());
        }
        let candidate_id = ledger.next_candidate_id();
        ledger.add_op(&LedgerOp::AddCandidate(AddCandidate {
            candidate_name: name.to_string(),
            candidate_id,
        }))?;
        tracing::info!(candidate_id, name, "candidate queued");
        Ok(candidate_id)
    }

    /// Promote `node_id` to validator. Lead validator only.
    pub async fn add_validator(&self, node_id: NodeId) -> Result<(), NodeError> {
        let mut ledger = self.ledger.lock().await;
        if !ledger.role().is_lead() {
            return Err(ConsensusError::NotLeadValidator.into());
        }
        if ledger.snapshot().is_validator(&node_id) {
            tracing::debug!(%node_id, "already a validator");
            return Ok(());
        }
        ledger.add_op(&LedgerOp::add_validator(node_id.clone(), &self.keypair))?;
        tracing::info!(%node_id, "validator queued");
        Ok(())
    }

    /// Install elector credentials from a file.
    pub async fn load_credentials(&self, path: &Path) -> Result<(), NodeError> {
        match credentials::load_credentials(path) {
            Ok(creds) => self.set_credentials(creds).await,
            Err(NodeError::Io(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "credentials file missing");
                self.events.emit(NodeEvent::MissingCredentialsFile);
                Err(NodeError::Io(e))
            }
            Err(e) => Err(e),
        }
    }

    /// Install elector credentials pushed by a collaborator.
    pub async fn set_credentials(&self, creds: ElectorCredentials) -> Result<(), NodeError> {
        let keypair = creds.keypair()?;
        let public_key = keypair.public_key_hex();
        *self.elector.write().await = Some(keypair);
        self.ledger
            .lock()
            .await
            .set_elector_public_key(Some(public_key.clone()));
        tracing::info!(elector = %public_key, "elector credentials loaded");
        self.events
            .emit(NodeEvent::ElectorCredentialsLoaded { public_key });
        Ok(())
    }

    /// Register every elector in a batch file. Lead validator only.
    pub async fn load_electors(&self, path: &Path) -> Result<usize, NodeError> {
        let electors = match credentials::load_electors(path) {
            Ok(electors) => electors,
            Err(NodeError::Io(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "electors file missing");
                self.events.emit(NodeEvent::MissingElectorsFile);
                return Err(NodeError::Io(e));
            }
            Err(e) => return Err(e),
        };
        let mut ledger = self.ledger.lock().await;
        if !ledger.role().is_lead() {
            return Err(ConsensusError::NotLeadValidator.into());
        }
        for creds in electors.values() {
            // Votes carry the lowercase key, so register it in that form.
            ledger.add_op(&LedgerOp::AddElector(AddElector {
                elector_public_key: creds.public_key.to_ascii_lowercase(),
            }))?;
        }
        tracing::info!(count = electors.len(), "electors queued");
        Ok(electors.len())
    }

    pub async fn send_text(&self, text: &str) -> Result<(), NodeError> {
        self.ttl_broadcast(
            &Payload::Text(TextMessage {
                text: text.to_string(),
            }),
            None,
        )
        .await
    }

    /// Ask the lead validator to promote this node.
    pub async fn request_to_become_validator(&self) -> Result<(), NodeError> {
        let lead = self
            .ledger
            .lock()
            .await
            .snapshot()
            .lead_validator()
            .cloned()
            .ok_or(ConsensusError::NoLeadValidator)?;
        let proposal = Proposal {
            kind: ProposalKind::AddValidator,
            node_id: self.node_id.clone(),
        };
        self.ttl_broadcast(&Payload::Proposal(proposal), Some(lead)).await
    }

    /// Change the proposal period. Takes effect on the next tick.
    pub fn set_block_period(&self, period: Duration) {
        self.block_period_ms
            .store(period.as_millis().max(1) as u64, Ordering::Relaxed);
    }

    /// Stop producing blocks: the proposal loop and the watchdog end and
    /// will not restart on later role changes.
    pub fn halt_block_production(&self) {
        self.production_halted.store(true, Ordering::SeqCst);
        self.cancel_role_tasks();
        tracing::warn!(node_id = %self.node_id, "block production halted");
    }

    pub(crate) fn next_connection_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Shut down the write side so the peer sees EOF and closes its end.
pub(crate) async fn close_writer(writer: &PeerWriter) {
    use tokio::io::AsyncWriteExt;
    let _ = writer.lock().await.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballot_crypto::ElectorKeypair;

    #[tokio::test]
    async fn electors_are_registered_under_the_key_votes_carry() {
        let node = Node::new(NodeConfig {
            host: "127.0.0.1".into(),
            port: 0,
            bootstrap: true,
            ..NodeConfig::default()
        })
        .unwrap();
        node.start().await.unwrap();
        node.halt_block_production();

        let elector = ElectorKeypair::generate();
        let mut creds = ElectorCredentials::from_keypair(&elector);
        creds.public_key = creds.public_key.to_ascii_uppercase();
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            serde_json::to_string(&std::collections::BTreeMap::from([("alice", creds)])).unwrap(),
        )
        .unwrap();

        assert_eq!(node.add_candidate("A").await.unwrap(), 1);
        assert_eq!(node.load_electors(file.path()).await.unwrap(), 1);
        assert!(node.finalize().await.unwrap());
        let snapshot = node.snapshot().await;
        assert!(snapshot.is_elector_registered(&elector.public_key_hex()));
        let vote = sign_vote(&elector, 1).unwrap();
        assert_eq!(ballot_consensus::verify_vote(&snapshot, &vote), Ok(()));

        node.stop().await.unwrap();
    }
}

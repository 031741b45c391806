//! Dialer side of the join handshake and the join retry flow.
//!
//! `connect` opens a socket and sends the join request; the outcome arrives
//! later on that socket's read loop as an acceptance or a rejection.

use std::sync::Arc;

use ballot_messages::{JoinAccepted, JoinData, JoinRejected, Payload};
use ballot_protocol::{seal_join, Envelope};
use ballot_types::PeerAddress;

use crate::connection_registry::Inbound;
use crate::error::NodeError;
use crate::events::NodeEvent;
use crate::node::{close_writer, Node};

impl Node {
    /// Dial `host:port` and ask to join through it.
    pub async fn connect(self: &Arc<Self>, host: &str, port: u16) -> Result<(), NodeError> {
        let address = PeerAddress::new(host, port);
        let own = self.advertised_address()?;
        if address == own {
            return Err(NodeError::Other(format!("refusing to connect to self at {address}")));
        }
        let bootstrap = {
            let connections = self.connections.read().await;
            if connections.is_connected(&address) {
                tracing::debug!(peer = %address, "already connected");
                return Ok(());
            }
            self.handshake_key.is_some() && connections.is_empty()
        };
        {
            let mut retry = self.join_retry.lock().await;
            retry.tried.insert(address.clone());
            retry.tries += 1;
        }

        let stream = self.dial(&address).await?;
        let remote = stream.peer_addr()?;
        let (id, writer) = self.spawn_connection(stream, remote);
        self.temp_connections
            .lock()
            .await
            .insert(address.clone(), id, Arc::clone(&writer));

        let join = JoinData {
            node_id: self.node_id.clone(),
            host: own.host,
            port: own.port,
            public_key: self.public_key(),
        };
        let request = match (&self.handshake_key, bootstrap) {
            (Some(key), true) => Payload::BootstrapJoinRequest(seal_join(&join, &key.public_bytes())?),
            _ => Payload::JoinRequest(join),
        };
        self.send_on(&writer, &request).await?;
        tracing::info!(peer = %address, connection = id, bootstrap, "join request sent");
        Ok(())
    }

    pub(crate) async fn handle_join_accepted(
        self: &Arc<Self>,
        inbound: &Inbound,
        envelope: &Envelope,
        accepted: JoinAccepted,
    ) -> Result<(), NodeError> {
        if !envelope.verify(&accepted.public_key) {
            tracing::warn!(sender = %envelope.sender, "join acceptance not signed by its own key");
            return Ok(());
        }
        let known = {
            let mut peers = self.peers.write().await;
            peers.insert(envelope.sender.clone(), accepted.public_key.clone());
            peers.merge(&accepted.discovered_nodes);
            peers.len()
        };
        if let Some(global_peers) = &accepted.global_peers {
            self.global_nodes.write().await.merge(global_peers);
        }

        let peer = PeerAddress::new(accepted.host.clone(), accepted.port);
        self.register_connection(inbound, peer.clone(), envelope.sender.clone())
            .await;

        let first_join = {
            let mut retry = self.join_retry.lock().await;
            let first = !retry.joined;
            retry.joined = true;
            retry.tries = 0;
            retry.tried.clear();
            first
        };
        if first_join {
            tracing::info!(%peer, "connected to network");
            self.events.emit(NodeEvent::ConnectedToNetwork { peer });
        }
        self.events.emit(NodeEvent::PeerDirectoryChanged { known });

        self.send_on(&inbound.writer, &Payload::RequestBasicSnapshot).await
    }

    /// Try the next suggested peer after a fixed delay, until the try budget
    /// runs out.
    pub(crate) async fn handle_join_rejected(
        self: &Arc<Self>,
        inbound: &Inbound,
        rejected: JoinRejected,
    ) -> Result<(), NodeError> {
        tracing::warn!(
            remote = %inbound.remote,
            reason = %rejected.reason,
            suggestions = rejected.suggested_peers.len(),
            "join rejected"
        );
        self.temp_connections.lock().await.remove(inbound.id);
        close_writer(&inbound.writer).await;

        let node = Arc::clone(self);
        tokio::spawn(async move { node.retry_join(rejected.suggested_peers).await });
        Ok(())
    }

    async fn retry_join(self: Arc<Self>, suggestions: Vec<PeerAddress>) {
        let own = self.advertised_address().ok();
        for address in suggestions {
            let eligible = {
                let retry = self.join_retry.lock().await;
                if retry.tries >= self.config.max_connection_tries {
                    break;
                }
                !retry.tried.contains(&address) && Some(&address) != own.as_ref()
            };
            if !eligible {
                continue;
            }
            tokio::time::sleep(self.config.join_retry_delay()).await;
            match self.connect(&address.host, address.port).await {
                Ok(()) => return,
                Err(e) => tracing::debug!(peer = %address, error = %e, "suggested peer unreachable"),
            }
        }
        let joined = self.join_retry.lock().await.joined;
        if !joined {
            tracing::error!("no suggested peer accepted the join");
            self.events.emit(NodeEvent::ConnectionFailed);
        }
    }
}

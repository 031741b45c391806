//! Outbound messages: signing, direct sends, flood broadcast and relay.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;

use ballot_messages::Payload;
use ballot_network::{broadcast_frame, write_frame, BroadcastResult, NetworkError, PeerWriter};
use ballot_protocol::{encode_frame, time_to_live, Envelope};
use ballot_types::{NodeId, PeerAddress};

use crate::error::NodeError;
use crate::node::Node;

/// Timeout for opening a connection.
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

impl Node {
    fn signed_frame(&self, mut envelope: Envelope) -> Result<Vec<u8>, NodeError> {
        envelope.sign(&self.keypair)?;
        Ok(encode_frame(&envelope)?)
    }

    /// Send `payload` as a direct message over one connection.
    pub(crate) async fn send_on(&self, writer: &PeerWriter, payload: &Payload) -> Result<(), NodeError> {
        let envelope = Envelope::from_payload(self.node_id.clone(), payload)?.direct();
        let frame = self.signed_frame(envelope)?;
        write_frame(writer, &frame).await?;
        Ok(())
    }

    /// Send `payload` as a direct message to every connection.
    pub(crate) async fn direct_broadcast(&self, payload: &Payload) -> Result<BroadcastResult, NodeError> {
        let envelope = Envelope::from_payload(self.node_id.clone(), payload)?.direct();
        let frame = self.signed_frame(envelope)?;
        Ok(self.fan_out(&frame).await)
    }

    /// Flood `payload` with a hop budget of `ceil(log_k n) + 1`. When `target`
    /// is set only that node acts on it; everyone else relays.
    pub(crate) async fn ttl_broadcast(&self, payload: &Payload, target: Option<NodeId>) -> Result<(), NodeError> {
        let known_peers = self.peers.read().await.len();
        let mut envelope = Envelope::from_payload(self.node_id.clone(), payload)?.flood(target);
        envelope.ttl_value = Some(time_to_live(self.config.min_connections, known_peers));
        // Our own flood must not be processed when it echoes back.
        self.replay.lock().await.insert(&envelope.id);
        let frame = self.signed_frame(envelope)?;
        let result = self.fan_out(&frame).await;
        tracing::trace!(code = %payload.code(), sent = result.sent, failed = result.failed, "ttl broadcast");
        Ok(())
    }

    /// Pass a flooded envelope on with one hop less. The original signature
    /// stays valid because it does not cover `ttl_value`.
    pub(crate) async fn relay(&self, envelope: &Envelope) -> Result<(), NodeError> {
        let Some(ttl) = envelope.ttl_value else {
            return Ok(());
        };
        if ttl == 0 {
            return Ok(());
        }
        let mut forwarded = envelope.clone();
        forwarded.ttl_value = Some(ttl - 1);
        let frame = encode_frame(&forwarded)?;
        self.fan_out(&frame).await;
        Ok(())
    }

    /// Send `payload` to `address`, over an existing connection if there is
    /// one, otherwise over a temporary connection the janitor closes later.
    pub(crate) async fn send_direct(self: &Arc<Self>, address: &PeerAddress, payload: &Payload) -> Result<(), NodeError> {
        let existing = self
            .connections
            .read()
            .await
            .find(address)
            .map(|entry| Arc::clone(&entry.writer));
        let writer = match existing {
            Some(writer) => writer,
            None => {
                // Release the temp table before dialing; `open_temporary`
                // locks it again to register the new socket.
                let temp = self.temp_connections.lock().await.writer_for(address);
                match temp {
                    Some(writer) => writer,
                    None => self.open_temporary(address).await?,
                }
            }
        };
        self.send_on(&writer, payload).await
    }

    async fn open_temporary(self: &Arc<Self>, address: &PeerAddress) -> Result<PeerWriter, NodeError> {
        let stream = self.dial(address).await?;
        let remote = stream.peer_addr()?;
        let (id, writer) = self.spawn_connection(stream, remote);
        self.temp_connections
            .lock()
            .await
            .insert(address.clone(), id, Arc::clone(&writer));
        tracing::debug!(peer = %address, connection = id, "temporary connection opened");
        Ok(writer)
    }

    pub(crate) async fn dial(&self, address: &PeerAddress) -> Result<TcpStream, NodeError> {
        let connect = TcpStream::connect((address.host.as_str(), address.port));
        match tokio::time::timeout(CONNECT_TIMEOUT, connect).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(NetworkError::ConnectionFailed(format!("{address}: {e}")).into()),
            Err(_) => Err(NetworkError::ConnectionFailed(format!("{address}: timed out")).into()),
        }
    }

    async fn fan_out(&self, frame: &[u8]) -> BroadcastResult {
        let targets = self.connections.read().await.writers();
        broadcast_frame(targets, frame).await
    }
}

//! TCP plumbing: the listener, per-connection read loops and the janitor
//! that closes idle temporary connections.
//!
//! A socket starts out temporary. It is promoted into the connection table
//! once a join handshake on it succeeds; everything else (single direct
//! sends, rejected joins) stays temporary until it goes idle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use ballot_network::{ConnectionEntry, ConnectionId, PeerWriter};
use ballot_protocol::FrameBuffer;
use ballot_types::{NodeId, PeerAddress};

use crate::events::NodeEvent;
use crate::node::{close_writer, Node};

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Janitor wake-up interval.
const JANITOR_TICK: Duration = Duration::from_millis(100);

/// The connection a frame arrived on.
#[derive(Clone, Debug)]
pub(crate) struct Inbound {
    pub id: ConnectionId,
    pub writer: PeerWriter,
    pub remote: SocketAddr,
}

impl Node {
    pub(crate) fn spawn_listener(self: &Arc<Self>, listener: TcpListener) -> JoinHandle<()> {
        let node = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::info!("listener shutting down");
                        break;
                    }
                    result = listener.accept() => {
                        match result {
                            Ok((stream, remote)) => {
                                let address = PeerAddress::new(remote.ip().to_string(), remote.port());
                                let (id, writer) = node.spawn_connection(stream, remote);
                                node.temp_connections.lock().await.insert(address, id, writer);
                                tracing::debug!(%remote, connection = id, "inbound connection");
                            }
                            Err(e) => tracing::warn!(error = %e, "accept error"),
                        }
                    }
                }
            }
        })
    }

    /// Split `stream`, spawn its read loop and return the shared writer.
    pub(crate) fn spawn_connection(self: &Arc<Self>, stream: TcpStream, remote: SocketAddr) -> (ConnectionId, PeerWriter) {
        let id = self.next_connection_id();
        let (reader, writer) = stream.into_split();
        let writer: PeerWriter = Arc::new(Mutex::new(writer));
        let inbound = Inbound {
            id,
            writer: Arc::clone(&writer),
            remote,
        };

        let node = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                result = node.read_loop(reader, &inbound) => result,
            };
            match &result {
                Ok(()) => tracing::debug!(%remote, connection = id, "connection closed"),
                Err(e) => tracing::warn!(%remote, connection = id, error = %e, "connection closed with error"),
            }
            node.connection_closed(id).await;
        });
        (id, writer)
    }

    async fn read_loop(self: &Arc<Self>, mut reader: OwnedReadHalf, inbound: &Inbound) -> std::io::Result<()> {
        let mut frames = FrameBuffer::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }
            if let Err(e) = frames.extend(&buf[..n]) {
                return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()));
            }
            self.temp_connections.lock().await.touch(inbound.id);
            while let Some(frame) = frames.next_frame() {
                self.handle_frame(inbound, &frame).await;
            }
        }
    }

    /// Promote a temporary connection into the connection table.
    pub(crate) async fn register_connection(&self, inbound: &Inbound, address: PeerAddress, node_id: NodeId) {
        self.temp_connections.lock().await.remove(inbound.id);
        let (replaced, count) = {
            let mut connections = self.connections.write().await;
            let replaced = connections.register(ConnectionEntry {
                id: inbound.id,
                address: address.clone(),
                node_id: Some(node_id.clone()),
                writer: Arc::clone(&inbound.writer),
            });
            (replaced, connections.len())
        };
        if let Some(old) = replaced {
            if old.id != inbound.id {
                close_writer(&old.writer).await;
            }
        }
        tracing::info!(peer = %address, %node_id, connections = count, "peer connected");
        self.events.emit(NodeEvent::ConnectionsChanged { count });
    }

    async fn connection_closed(&self, id: ConnectionId) {
        self.temp_connections.lock().await.remove(id);
        let removed = {
            let mut connections = self.connections.write().await;
            connections.remove(id).map(|entry| (entry, connections.len()))
        };
        if let Some((entry, count)) = removed {
            tracing::info!(peer = %entry.address, connections = count, "peer disconnected");
            self.events.emit(NodeEvent::ConnectionsChanged { count });
        }
    }

    pub(crate) fn spawn_temp_janitor(self: &Arc<Self>) -> JoinHandle<()> {
        let node = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();
        let budget = self.config.temp_connection_idle();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(JANITOR_TICK);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => {
                        let idle = node.temp_connections.lock().await.take_idle(budget);
                        for (id, writer) in idle {
                            tracing::debug!(connection = id, "closing idle temporary connection");
                            close_writer(&writer).await;
                        }
                    }
                }
            }
        })
    }
}

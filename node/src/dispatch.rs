//! Inbound message validation and dispatch.

use std::sync::Arc;

use ballot_messages::Payload;
use ballot_protocol::{parse_frame, Envelope};
use thiserror::Error;

use crate::connection_registry::Inbound;
use crate::events::NodeEvent;
use crate::node::Node;

/// Why an inbound envelope was dropped before dispatch.
#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum Rejection {
    #[error("sender {0} is not in the peer directory")]
    UnknownSender(String),
    #[error("signature does not verify")]
    BadSignature,
    #[error("already processed")]
    Replayed,
    #[error("id does not match timestamp, sender and nonce")]
    InconsistentId,
}

impl Node {
    /// Handle one frame: validate, relay if flooded, then act on it if it is
    /// addressed to this node.
    pub(crate) async fn handle_frame(self: &Arc<Self>, inbound: &Inbound, frame: &[u8]) {
        let envelope = match parse_frame(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(remote = %inbound.remote, error = %e, "dropping malformed frame");
                return;
            }
        };

        if let Err(rejection) = self.validate(&envelope).await {
            if rejection == Rejection::Replayed {
                tracing::trace!(id = %envelope.id, code = %envelope.code, "dropping replayed message");
            } else {
                tracing::warn!(
                    sender = %envelope.sender,
                    code = %envelope.code,
                    reason = %rejection,
                    "dropping invalid message"
                );
            }
            return;
        }

        let addressed_here = envelope.target_node.as_ref() == Some(&self.node_id);
        if envelope.is_ttl() && !addressed_here {
            if let Err(e) = self.relay(&envelope).await {
                tracing::debug!(error = %e, "relay failed");
            }
        }
        if !envelope.is_addressed_to(&self.node_id) {
            return;
        }

        let payload = match envelope.payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(sender = %envelope.sender, code = %envelope.code, error = %e, "malformed payload");
                return;
            }
        };
        tracing::debug!(sender = %envelope.sender, code = %envelope.code, "dispatching");
        self.dispatch(inbound, &envelope, payload).await;
    }

    /// Signature (unless the code is handshake-exempt), replay and id checks.
    /// A message that passes is recorded as processed.
    pub(crate) async fn validate(&self, envelope: &Envelope) -> Result<(), Rejection> {
        if !envelope.code.is_handshake_exempt() {
            let peers = self.peers.read().await;
            let public_key = peers
                .public_key(&envelope.sender)
                .ok_or_else(|| Rejection::UnknownSender(envelope.sender.to_string()))?;
            if !envelope.verify(public_key) {
                return Err(Rejection::BadSignature);
            }
        }
        let mut replay = self.replay.lock().await;
        if replay.contains(&envelope.id) {
            return Err(Rejection::Replayed);
        }
        if !envelope.has_consistent_id() {
            return Err(Rejection::InconsistentId);
        }
        replay.insert(&envelope.id);
        Ok(())
    }

    async fn dispatch(self: &Arc<Self>, inbound: &Inbound, envelope: &Envelope, payload: Payload) {
        let sender = &envelope.sender;
        let result = match payload {
            Payload::BootstrapJoinRequest(sealed) => self.handle_bootstrap_join(inbound, envelope, &sealed).await,
            Payload::JoinRequest(join) => self.handle_join_request(inbound, envelope, join, false).await,
            Payload::BootstrapJoinRequestAccepted(accepted) | Payload::JoinRequestAccepted(accepted) => {
                self.handle_join_accepted(inbound, envelope, accepted).await
            }
            Payload::BootstrapJoinRequestRejected(rejected) | Payload::JoinRequestRejected(rejected) => {
                self.handle_join_rejected(inbound, rejected).await
            }
            Payload::RequestFullBlockchain => self.handle_chain_request(sender).await,
            Payload::RequestBasicSnapshot => self.handle_snapshot_request(sender).await,
            Payload::SendFullBlockchain(full) => {
                self.handle_full_chain(sender, full.blockchain_data).await;
                Ok(())
            }
            Payload::SendBasicSnapshot(basic) => {
                self.handle_basic_snapshot(sender, basic.snapshot_data).await;
                Ok(())
            }
            Payload::ConnectionDiscovery(list) => {
                self.handle_connection_discovery(list).await;
                Ok(())
            }
            Payload::NodeDiscovery(directory) => {
                self.handle_node_discovery(directory).await;
                Ok(())
            }
            Payload::GlobalNodeDiscovery(global) => {
                self.handle_global_discovery(global).await;
                Ok(())
            }
            Payload::Heartbeat(heartbeat) => {
                self.handle_heartbeat(envelope, heartbeat).await;
                Ok(())
            }
            Payload::Ping => {
                tracing::debug!(%sender, "ping");
                Ok(())
            }
            Payload::ProposeValidator(data) | Payload::BecomeValidatorRequest(data) => {
                tracing::info!(%sender, code = %envelope.code, %data, "validator request received");
                Ok(())
            }
            Payload::Text(text) => {
                tracing::info!(%sender, text = %text.text, "text message");
                self.events.emit(NodeEvent::TextReceived {
                    sender: sender.clone(),
                    text: text.text,
                });
                Ok(())
            }
            Payload::Vote(vote) => {
                if self.role().await.is_lead() {
                    self.handle_vote(vote).await;
                } else {
                    tracing::debug!(%sender, "vote ignored: not the lead validator");
                }
                Ok(())
            }
            Payload::NewBlockAdded(new_block) => {
                self.handle_new_block(sender, new_block.finalized_block).await;
                Ok(())
            }
            Payload::Proposal(proposal) => self.handle_proposal(sender, proposal).await,
        };
        if let Err(e) = result {
            tracing::warn!(%sender, code = %envelope.code, error = %e, "handler failed");
        }
    }
}

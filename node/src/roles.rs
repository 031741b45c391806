//! Role-driven behaviour: the tasks each role runs, finalized-block effects,
//! new-block handling and the lead validator's vote intake.
//!
//! Role tasks live in [`TaskGroup`]s that are cancelled the moment the role
//! is lost, so a demoted lead never proposes another block.

use std::sync::{Arc, MutexGuard};
use std::time::{Duration, Instant};

use ballot_consensus::ops::AddVote;
use ballot_consensus::{
    select_lead_validator, validator_threshold, verify_proposed_block, verify_vote, ConsensusError,
    Finalized, LedgerEffect, LedgerOp, NodeRole, RoleChange, SnapshotChange, VoteRejection,
};
use ballot_ledger::Block;
use ballot_messages::{NewBlock, NodeRecord, Payload, Proposal, ProposalKind, VoteMessage};
use ballot_types::{NodeId, Timestamp};

use crate::error::NodeError;
use crate::events::NodeEvent;
use crate::node::Node;
use crate::tasks::TaskGroup;

/// Watchdog resolution. The timeout itself is `block_timeout`.
const WATCHDOG_TICK: Duration = Duration::from_millis(50);

/// Task groups for the roles the node currently holds.
#[derive(Debug, Default)]
pub(crate) struct RoleTasks {
    validator: Option<TaskGroup>,
    lead: Option<TaskGroup>,
}

impl Node {
    fn role_tasks(&self) -> MutexGuard<'_, RoleTasks> {
        match self.role_tasks.lock() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn cancel_role_tasks(&self) {
        let mut tasks = self.role_tasks();
        if let Some(mut group) = tasks.lead.take() {
            group.cancel();
        }
        if let Some(mut group) = tasks.validator.take() {
            group.cancel();
        }
    }

    fn production_halted(&self) -> bool {
        self.production_halted.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Create the network: promote this node to validator and lead in the
    /// first block after genesis.
    pub(crate) async fn bootstrap_network(self: &Arc<Self>) -> Result<(), NodeError> {
        {
            let mut ledger = self.ledger.lock().await;
            ledger.add_op(&LedgerOp::add_validator(self.node_id.clone(), &self.keypair))?;
            ledger.add_op(&LedgerOp::set_lead_validator(self.node_id.clone()))?;
        }
        if !self.finalize().await? {
            return Err(ConsensusError::ChainLoadInProgress.into());
        }
        tracing::info!(node_id = %self.node_id, "network bootstrapped");
        Ok(())
    }

    /// Publish everything a finalized block changed and react to role changes.
    pub(crate) async fn apply_finalized(self: &Arc<Self>, finalized: Finalized) {
        let hash = finalized.block.hash().clone();
        tracing::debug!(block = %hash, transactions = finalized.block.len(), "block finalized");
        self.events.emit(NodeEvent::BlockAdded { hash: hash.clone() });
        self.events.emit(NodeEvent::SnapshotHeadUpdated { head: hash });

        for effect in finalized.effects {
            match effect {
                LedgerEffect::Snapshot(change) => self.emit_snapshot_change(change),
                LedgerEffect::OwnVoteDetected { block_hash } => {
                    tracing::info!(block = %block_hash, "own vote finalized");
                    self.events.emit(NodeEvent::OwnVoteDetected { block_hash });
                }
                LedgerEffect::Role(change) => self.on_role_change(change).await,
            }
        }
    }

    fn emit_snapshot_change(&self, change: SnapshotChange) {
        let event = match change {
            SnapshotChange::ValidatorAdded(node_id) => NodeEvent::ValidatorAdded { node_id },
            SnapshotChange::LeadValidatorSet(node_id) => NodeEvent::LeadValidatorSet { node_id },
            SnapshotChange::CandidateAdded {
                candidate_id,
                candidate_name,
            } => NodeEvent::CandidateAdded {
                candidate_id,
                candidate_name,
            },
            SnapshotChange::ElectorAdded(public_key) => NodeEvent::ElectorAdded { public_key },
            SnapshotChange::VoteCounted {
                candidate_id, tally, ..
            } => NodeEvent::VoteTallyChanged { candidate_id, tally },
        };
        self.events.emit(event);
    }

    pub(crate) async fn process_role_changes(self: &Arc<Self>, changes: Vec<RoleChange>) {
        for change in changes {
            self.on_role_change(change).await;
        }
    }

    async fn on_role_change(self: &Arc<Self>, change: RoleChange) {
        match change {
            RoleChange::BecameValidator => {
                tracing::info!(node_id = %self.node_id, "became validator");
                self.events.emit(NodeEvent::BecameValidator);
                self.register_self_globally().await;
                if !self.production_halted() {
                    let mut group = TaskGroup::new("validator");
                    self.spawn_watchdog(&mut group);
                    self.spawn_validator_discovery(&mut group);
                    if let Some(mut old) = self.role_tasks().validator.replace(group) {
                        old.cancel();
                    }
                }
                self.request_chain_sync().await;
            }
            RoleChange::BecameLeadValidator => {
                tracing::info!(node_id = %self.node_id, "became lead validator");
                self.events.emit(NodeEvent::BecameLeadValidator);
                if !self.production_halted() {
                    let mut group = TaskGroup::new("lead");
                    self.spawn_proposal_loop(&mut group);
                    if let Some(mut old) = self.role_tasks().lead.replace(group) {
                        old.cancel();
                    }
                }
            }
            RoleChange::SteppedDown => {
                tracing::info!(node_id = %self.node_id, "no longer lead validator");
                if let Some(mut group) = self.role_tasks().lead.take() {
                    group.cancel();
                }
                self.events.emit(NodeEvent::NoLongerLeadValidator);
            }
        }
    }

    async fn register_self_globally(&self) {
        let (host, port) = match self.advertised_address() {
            Ok(address) => (address.host, address.port),
            Err(_) => (self.config.host.clone(), self.config.port),
        };
        self.global_nodes.write().await.insert(
            self.node_id.clone(),
            NodeRecord {
                host,
                port,
                last_seen: Timestamp::now(),
            },
        );
    }

    /// A new validator fetches the lead's full chain. Finalization is
    /// suspended until it arrives.
    async fn request_chain_sync(self: &Arc<Self>) {
        let lead = {
            let mut ledger = self.ledger.lock().await;
            let lead = ledger.snapshot().lead_validator().cloned();
            match lead {
                Some(lead) if lead != self.node_id => {
                    ledger.begin_chain_sync();
                    lead
                }
                _ => return,
            }
        };
        tracing::info!(%lead, "requesting full blockchain");
        if let Err(e) = self.ttl_broadcast(&Payload::RequestFullBlockchain, Some(lead)).await {
            tracing::warn!(error = %e, "could not request the blockchain");
        }
    }

    pub(crate) async fn announce_block(&self, block: Block) -> Result<(), NodeError> {
        self.ttl_broadcast(
            &Payload::NewBlockAdded(NewBlock {
                finalized_block: block,
            }),
            None,
        )
        .await
    }

    // ── Lead validator ─────────────────────────────────────────────────

    fn spawn_proposal_loop(self: &Arc<Self>, group: &mut TaskGroup) {
        let node = Arc::clone(self);
        group.spawn(move |mut cancel| async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.recv() => break,
                    _ = tokio::time::sleep(node.block_period()) => {}
                }
                if let Err(e) = node.propose_block().await {
                    tracing::warn!(error = %e, "block proposal failed");
                }
            }
        });
    }

    /// Sign the working block with a `SUBMIT_BLOCK`, finalize and announce.
    async fn propose_block(self: &Arc<Self>) -> Result<(), NodeError> {
        {
            let mut ledger = self.ledger.lock().await;
            if !ledger.role().is_lead() {
                return Ok(());
            }
            ledger.add_op(&LedgerOp::submit_block(self.node_id.clone(), &self.keypair))?;
        }
        if !self.finalize().await? {
            tracing::debug!("proposal deferred: chain load in progress");
        }
        Ok(())
    }

    pub(crate) async fn handle_vote(&self, vote: VoteMessage) {
        let choice = vote.vote_package.choice;
        match self.accept_vote(&vote).await {
            Ok(()) => tracing::info!(choice, elector = %vote.vote_package.elector_public_key, "vote accepted"),
            Err(e) => tracing::warn!(
                choice,
                elector = %vote.vote_package.elector_public_key,
                error = %e,
                "vote rejected"
            ),
        }
    }

    /// Verify a vote and queue its `ADD_VOTE`. Lead validator only.
    pub(crate) async fn accept_vote(&self, vote: &VoteMessage) -> Result<(), NodeError> {
        let mut ledger = self.ledger.lock().await;
        if !ledger.role().is_lead() {
            return Err(ConsensusError::NotLeadValidator.into());
        }
        if ledger.has_pending_vote(&vote.vote_package.elector_public_key) {
            return Err(VoteRejection::AlreadyVoted.into());
        }
        verify_vote(ledger.snapshot(), vote)?;
        ledger.add_op(&LedgerOp::AddVote(AddVote::from(vote)))?;
        Ok(())
    }

    pub(crate) async fn handle_proposal(&self, sender: &NodeId, proposal: Proposal) -> Result<(), NodeError> {
        if !self.role().await.is_lead() {
            tracing::debug!(%sender, "proposal ignored: not the lead validator");
            return Ok(());
        }
        match proposal.kind {
            ProposalKind::AddValidator => {
                tracing::info!(%sender, node_id = %proposal.node_id, "validator proposal received");
                self.add_validator(proposal.node_id).await
            }
        }
    }

    // ── Validators ─────────────────────────────────────────────────────

    /// Elect a new lead once the head has not moved for `block_timeout`.
    fn spawn_watchdog(self: &Arc<Self>, group: &mut TaskGroup) {
        let node = Arc::clone(self);
        let timeout = self.config.block_timeout();
        group.spawn(move |mut cancel| async move {
            let mut interval = tokio::time::interval(WATCHDOG_TICK);
            let mut last_head = node.ledger.lock().await.snapshot().blockchain_head().clone();
            let mut changed_at = Instant::now();
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.recv() => break,
                    _ = interval.tick() => {}
                }
                let head = node.ledger.lock().await.snapshot().blockchain_head().clone();
                if head != last_head {
                    last_head = head;
                    changed_at = Instant::now();
                    continue;
                }
                if changed_at.elapsed() < timeout {
                    continue;
                }
                if let Err(e) = node.elect_lead().await {
                    tracing::warn!(error = %e, "lead election failed");
                }
                changed_at = Instant::now();
            }
        });
    }

    async fn elect_lead(self: &Arc<Self>) -> Result<(), NodeError> {
        let (lead, head) = {
            let mut ledger = self.ledger.lock().await;
            if ledger.is_chain_locked() {
                return Ok(());
            }
            let mut validators: Vec<NodeId> = ledger.snapshot().validators().cloned().collect();
            validators.sort();
            let head = ledger.snapshot().blockchain_head().clone();
            let Some(lead) = select_lead_validator(&validators, &head).cloned() else {
                return Ok(());
            };
            ledger.add_op(&LedgerOp::set_lead_validator(lead.clone()))?;
            (lead, head)
        };
        tracing::warn!(%lead, %head, "lead validator timed out, electing a new one");
        self.finalize().await?;
        Ok(())
    }

    pub(crate) async fn handle_new_block(self: &Arc<Self>, sender: &NodeId, block: Block) {
        match self.role().await {
            NodeRole::LeadValidator => {
                tracing::trace!(%sender, block = %block.hash(), "lead ignores announced blocks");
            }
            NodeRole::Validator => self.adopt_verified_block(sender, block).await,
            NodeRole::Normal => self.count_block_announcement(sender, block).await,
        }
    }

    /// Verify a proposed block, finalize it locally and announce it onwards.
    async fn adopt_verified_block(self: &Arc<Self>, sender: &NodeId, block: Block) {
        let snapshot = {
            let ledger = self.ledger.lock().await;
            if block.hash() == ledger.snapshot().blockchain_head() {
                return;
            }
            ledger.snapshot().clone()
        };
        let verdict = {
            let peers = self.peers.read().await;
            verify_proposed_block(&snapshot, |id| peers.public_key(id).map(str::to_owned), &block)
        };
        if let Err(rejection) = verdict {
            tracing::warn!(%sender, block = %block.hash(), reason = %rejection, "block rejected");
            return;
        }

        let finalized = self.ledger.lock().await.load_block(block);
        let Some(finalized) = finalized else {
            tracing::debug!(%sender, "verified block not loaded");
            return;
        };
        let adopted = finalized.block.clone();
        self.apply_finalized(finalized).await;
        if let Err(e) = self.announce_block(adopted).await {
            tracing::warn!(error = %e, "could not re-announce block");
        }
    }

    /// Normal nodes trust validators: a block is loaded once enough distinct
    /// validators have announced it.
    async fn count_block_announcement(self: &Arc<Self>, sender: &NodeId, block: Block) {
        let (is_validator, validator_count) = {
            let ledger = self.ledger.lock().await;
            let snapshot = ledger.snapshot();
            (snapshot.is_validator(sender), snapshot.validator_count())
        };
        if !is_validator {
            tracing::debug!(%sender, "block announcement from a non-validator ignored");
            return;
        }
        let threshold = validator_threshold(validator_count, self.config.consensus_ratio);
        let accepted = self.quorum.lock().await.record(sender, block, threshold);
        let Some(block) = accepted else {
            return;
        };
        tracing::debug!(block = %block.hash(), threshold, "block reached quorum");

        let (finalized, lead) = {
            let mut ledger = self.ledger.lock().await;
            let head = ledger.snapshot().blockchain_head().clone();
            if block.previous_hash() == &head {
                (ledger.load_block(block), None)
            } else if block.hash() == &head || ledger.chain().blocks().iter().any(|b| b.hash() == block.hash()) {
                tracing::trace!(block = %block.hash(), "late quorum for a block already loaded");
                (None, None)
            } else {
                (None, ledger.snapshot().lead_validator().cloned())
            }
        };
        if let Some(finalized) = finalized {
            self.apply_finalized(finalized).await;
        }
        if let Some(lead) = lead {
            tracing::info!(%lead, "fell behind the chain, requesting the lead's snapshot");
            if let Err(e) = self.ttl_broadcast(&Payload::RequestBasicSnapshot, Some(lead)).await {
                tracing::warn!(error = %e, "could not request a snapshot");
            }
        }
    }
}

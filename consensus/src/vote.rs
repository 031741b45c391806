//! Elector votes: signing and verification.

use ballot_crypto::{verify_elector_signature, ElectorKeypair};
use ballot_ledger::{canonical_json, Snapshot};
use ballot_messages::{VoteMessage, VotePackage};
use rand::RngCore;
use thiserror::Error;

use crate::ops::AddVote;

/// Why a vote was refused. Each check fails independently.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum VoteRejection {
    #[error("candidate {0} does not exist")]
    UnknownCandidate(u64),

    #[error("elector is not registered")]
    UnregisteredElector,

    #[error("elector has already voted")]
    AlreadyVoted,

    #[error("vote signature does not verify")]
    InvalidSignature,

    #[error("malformed vote: {0}")]
    Malformed(String),
}

/// Bytes an elector signs: the canonical JSON of the package.
pub fn vote_signing_bytes(package: &VotePackage) -> Result<Vec<u8>, VoteRejection> {
    canonical_json(package)
        .map(String::into_bytes)
        .map_err(|e| VoteRejection::Malformed(e.to_string()))
}

/// Sign a vote for `choice` with a fresh nonce.
pub fn sign_vote(elector: &ElectorKeypair, choice: u64) -> Result<VoteMessage, VoteRejection> {
    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);
    let vote_package = VotePackage {
        elector_public_key: elector.public_key_hex(),
        choice,
        nonce: hex::encode(nonce),
    };
    let signature = elector.sign(&vote_signing_bytes(&vote_package)?);
    Ok(VoteMessage {
        vote_package,
        signature,
    })
}

/// Check a vote against the snapshot: candidate, registration, double
/// voting, then the signature.
pub fn verify_vote(snapshot: &Snapshot, vote: &VoteMessage) -> Result<(), VoteRejection> {
    let package = &vote.vote_package;
    if snapshot.candidate(package.choice).is_none() {
        return Err(VoteRejection::UnknownCandidate(package.choice));
    }
    if !snapshot.is_elector_registered(&package.elector_public_key) {
        return Err(VoteRejection::UnregisteredElector);
    }
    if snapshot.has_elector_voted(&package.elector_public_key) {
        return Err(VoteRejection::AlreadyVoted);
    }
    let message = vote_signing_bytes(package)?;
    if !verify_elector_signature(&message, &vote.signature, &package.elector_public_key) {
        return Err(VoteRejection::InvalidSignature);
    }
    Ok(())
}

impl From<&VoteMessage> for AddVote {
    fn from(vote: &VoteMessage) -> Self {
        AddVote {
            vote_choice: vote.vote_package.choice,
            voter_public_key: vote.vote_package.elector_public_key.clone(),
            vote_signature: vote.signature.clone(),
            nonce: vote.vote_package.nonce.clone(),
        }
    }
}

impl From<&AddVote> for VoteMessage {
    fn from(op: &AddVote) -> Self {
        VoteMessage {
            vote_package: VotePackage {
                elector_public_key: op.voter_public_key.clone(),
                choice: op.vote_choice,
                nonce: op.nonce.clone(),
            },
            signature: op.vote_signature.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn election(elector: &ElectorKeypair) -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.add_candidate(1, "A");
        snapshot.add_elector(&elector.public_key_hex());
        snapshot
    }

    #[test]
    fn valid_vote_passes() {
        let elector = ElectorKeypair::generate();
        let snapshot = election(&elector);
        let vote = sign_vote(&elector, 1).unwrap();
        assert_eq!(verify_vote(&snapshot, &vote), Ok(()));
    }

    #[test]
    fn unknown_candidate_is_rejected() {
        let elector = ElectorKeypair::generate();
        let snapshot = election(&elector);
        let vote = sign_vote(&elector, 9).unwrap();
        assert_eq!(verify_vote(&snapshot, &vote), Err(VoteRejection::UnknownCandidate(9)));
    }

    #[test]
    fn unregistered_elector_is_rejected() {
        let registered = ElectorKeypair::generate();
        let stranger = ElectorKeypair::generate();
        let snapshot = election(&registered);
        let vote = sign_vote(&stranger, 1).unwrap();
        assert_eq!(verify_vote(&snapshot, &vote), Err(VoteRejection::UnregisteredElector));
    }

    #[test]
    fn second_vote_is_rejected() {
        let elector = ElectorKeypair::generate();
        let mut snapshot = election(&elector);
        snapshot.record_vote(1, &elector.public_key_hex());
        let vote = sign_vote(&elector, 1).unwrap();
        assert_eq!(verify_vote(&snapshot, &vote), Err(VoteRejection::AlreadyVoted));
    }

    #[test]
    fn altered_choice_breaks_signature() {
        let elector = ElectorKeypair::generate();
        let mut snapshot = election(&elector);
        snapshot.add_candidate(2, "B");
        let mut vote = sign_vote(&elector, 1).unwrap();
        vote.vote_package.choice = 2;
        assert_eq!(verify_vote(&snapshot, &vote), Err(VoteRejection::InvalidSignature));
    }

    #[test]
    fn add_vote_op_reconstructs_the_signed_package() {
        let elector = ElectorKeypair::generate();
        let snapshot = election(&elector);
        let vote = sign_vote(&elector, 1).unwrap();
        let op = AddVote::from(&vote);
        assert_eq!(verify_vote(&snapshot, &VoteMessage::from(&op)), Ok(()));
    }
}

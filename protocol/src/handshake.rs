//! Bootstrap join sealing.
//!
//! A node joining with no connections cannot be authenticated by anyone, so
//! it seals its [`JoinData`] to the network handshake key. Only members
//! holding the network secret can read it, which is what makes the network
//! permissioned.

use ballot_crypto::{open_sealed, seal_to, HandshakeKey};
use ballot_messages::{JoinData, SealedJoin};

use crate::ProtocolError;

pub fn seal_join(join: &JoinData, network_public: &[u8; 32]) -> Result<SealedJoin, ProtocolError> {
    let plaintext = serde_json::to_vec(join)?;
    let sealed = seal_to(&plaintext, network_public)?;
    Ok(SealedJoin {
        sealed: hex::encode(sealed),
    })
}

pub fn open_join(sealed: &SealedJoin, network_key: &HandshakeKey) -> Result<JoinData, ProtocolError> {
    let bytes = hex::decode(&sealed.sealed)
        .map_err(|e| ProtocolError::HandshakeFailed(format!("sealed join is not hex: {e}")))?;
    let plaintext = open_sealed(&bytes, network_key)
        .map_err(|e| ProtocolError::HandshakeFailed(e.to_string()))?;
    Ok(serde_json::from_slice(&plaintext)?)
}

//! Signed message envelopes.
//!
//! Every message on the wire is an [`Envelope`]. The sender signs the
//! canonical JSON of the envelope without `signature` and `ttl_value`, so
//! relays can decrement the hop budget without re-signing.

use ballot_crypto::{sign_message, verify_signature, NodeKeypair};
use ballot_messages::{MessageCode, Payload};
use ballot_types::{NodeId, Timestamp};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;

const NONCE_LEN: usize = 16;

/// How an envelope travels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Sent over a single connection, never relayed.
    Direct,
    /// Flooded with a hop budget in `ttl_value`.
    Ttl,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub code: MessageCode,
    pub sender: NodeId,
    #[serde(default)]
    pub data: Value,
    pub timestamp: Timestamp,
    pub nonce: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
    /// Remaining hops; absent on direct messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_value: Option<u32>,
    /// Only this node acts on the payload; everyone else just relays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_node: Option<NodeId>,
}

impl Envelope {
    /// A fresh, unsigned envelope with a random nonce and the current time.
    pub fn new(code: MessageCode, sender: NodeId, data: Value) -> Self {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = hex::encode(nonce_bytes);
        let timestamp = Timestamp::now();
        let id = Self::compute_id(timestamp, &sender, &nonce);
        Self {
            code,
            sender,
            data,
            timestamp,
            nonce,
            id,
            signature: None,
            message_type: None,
            ttl_value: None,
            target_node: None,
        }
    }

    /// Build an unsigned envelope from a typed payload.
    pub fn from_payload(sender: NodeId, payload: &Payload) -> Result<Self, ProtocolError> {
        Ok(Self::new(payload.code(), sender, payload.to_data()?))
    }

    /// `digest(timestamp || sender || nonce)`.
    pub fn compute_id(timestamp: Timestamp, sender: &NodeId, nonce: &str) -> String {
        let ts = timestamp.as_millis().to_string();
        ballot_crypto::sha256_hex_multi(&[
            ts.as_bytes(),
            sender.as_str().as_bytes(),
            nonce.as_bytes(),
        ])
    }

    pub fn direct(mut self) -> Self {
        self.message_type = Some(MessageType::Direct);
        self.ttl_value = None;
        self
    }

    pub fn flood(mut self, target_node: Option<NodeId>) -> Self {
        self.message_type = Some(MessageType::Ttl);
        self.target_node = target_node;
        self
    }

    pub fn is_ttl(&self) -> bool {
        self.message_type == Some(MessageType::Ttl)
    }

    /// Whether `node` should act on this envelope's payload.
    pub fn is_addressed_to(&self, node: &NodeId) -> bool {
        self.target_node.as_ref().map_or(true, |t| t == node)
    }

    /// The id matches the timestamp, sender and nonce it claims to derive from.
    pub fn has_consistent_id(&self) -> bool {
        self.id == Self::compute_id(self.timestamp, &self.sender, &self.nonce)
    }

    /// Canonical bytes covered by the signature.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.remove("signature");
            map.remove("ttl_value");
        }
        Ok(value.to_string().into_bytes())
    }

    pub fn sign(&mut self, keypair: &NodeKeypair) -> Result<(), ProtocolError> {
        let bytes = self.signing_bytes()?;
        self.signature = Some(sign_message(&bytes, keypair));
        Ok(())
    }

    /// Check the signature against a hex public key. Unsigned envelopes fail.
    pub fn verify(&self, public_key_hex: &str) -> bool {
        let Some(signature) = &self.signature else {
            return false;
        };
        match self.signing_bytes() {
            Ok(bytes) => verify_signature(&bytes, signature, public_key_hex),
            Err(_) => false,
        }
    }

    /// Decode `data` into the typed payload for `code`.
    pub fn payload(&self) -> Result<Payload, ProtocolError> {
        Ok(Payload::decode(self.code, &self.data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballot_messages::TextMessage;
    use serde_json::json;

    fn signed_text(kp: &NodeKeypair) -> Envelope {
        let payload = Payload::Text(TextMessage {
            text: "hello".into(),
        });
        let mut env = Envelope::from_payload(NodeId::from("a"), &payload)
            .unwrap()
            .flood(None);
        env.sign(kp).unwrap();
        env.ttl_value = Some(3);
        env
    }

    #[test]
    fn fresh_envelopes_have_unique_ids() {
        let a = Envelope::new(MessageCode::Ping, NodeId::from("a"), json!({}));
        let b = Envelope::new(MessageCode::Ping, NodeId::from("a"), json!({}));
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.id, b.id);
        assert_eq!(a.nonce.len(), NONCE_LEN * 2);
        assert!(a.has_consistent_id());
    }

    #[test]
    fn signed_envelope_verifies() {
        let kp = NodeKeypair::generate();
        let env = signed_text(&kp);
        assert!(env.verify(&kp.public_key_hex()));
    }

    #[test]
    fn ttl_value_is_not_signed() {
        let kp = NodeKeypair::generate();
        let mut env = signed_text(&kp);
        env.ttl_value = Some(0);
        assert!(env.verify(&kp.public_key_hex()));
    }

    #[test]
    fn tampered_data_fails() {
        let kp = NodeKeypair::generate();
        let mut env = signed_text(&kp);
        env.data = json!({"text": "hellp"});
        assert!(!env.verify(&kp.public_key_hex()));
    }

    #[test]
    fn single_signature_byte_flip_fails() {
        let kp = NodeKeypair::generate();
        let mut env = signed_text(&kp);
        let mut sig = hex::decode(env.signature.as_ref().unwrap()).unwrap();
        sig[0] ^= 0x01;
        env.signature = Some(hex::encode(sig));
        assert!(!env.verify(&kp.public_key_hex()));
    }

    #[test]
    fn retargeting_breaks_the_signature() {
        let kp = NodeKeypair::generate();
        let mut env = signed_text(&kp);
        env.target_node = Some(NodeId::from("z"));
        assert!(!env.verify(&kp.public_key_hex()));
    }

    #[test]
    fn unsigned_envelope_never_verifies() {
        let kp = NodeKeypair::generate();
        let env = Envelope::new(MessageCode::Ping, NodeId::from("a"), json!({}));
        assert!(!env.verify(&kp.public_key_hex()));
    }

    #[test]
    fn addressing() {
        let env = Envelope::new(MessageCode::Ping, NodeId::from("a"), json!({}));
        assert!(env.is_addressed_to(&NodeId::from("x")));
        let env = env.flood(Some(NodeId::from("b")));
        assert!(env.is_ttl());
        assert!(env.is_addressed_to(&NodeId::from("b")));
        assert!(!env.is_addressed_to(&NodeId::from("x")));
    }

    #[test]
    fn optional_fields_are_omitted() {
        let env = Envelope::new(MessageCode::Ping, NodeId::from("a"), json!({})).direct();
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["message_type"], json!("direct"));
        assert!(value.get("ttl_value").is_none());
        assert!(value.get("target_node").is_none());
        assert!(value.get("signature").is_none());
    }
}

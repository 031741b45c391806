//! Elector credential files.
//!
//! A credentials file holds one elector key pair. An electors file maps
//! arbitrary labels to key pairs; the lead validator registers every public
//! key in it.

use std::collections::BTreeMap;
use std::path::Path;

use ballot_crypto::ElectorKeypair;
use serde::{Deserialize, Serialize};

use crate::NodeError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectorCredentials {
    pub public_key: String,
    pub private_key: String,
}

impl ElectorCredentials {
    /// Build the key pair, checking that the public key matches the secret.
    pub fn keypair(&self) -> Result<ElectorKeypair, NodeError> {
        let keypair = ElectorKeypair::from_secret_hex(&self.private_key)?;
        if keypair.public_key_hex() != self.public_key.to_ascii_lowercase() {
            return Err(NodeError::Credentials(
                "public key does not match private key".into(),
            ));
        }
        Ok(keypair)
    }

    pub fn from_keypair(keypair: &ElectorKeypair) -> Self {
        Self {
            public_key: keypair.public_key_hex(),
            private_key: keypair.secret_hex().to_string(),
        }
    }
}

pub fn load_credentials(path: &Path) -> Result<ElectorCredentials, NodeError> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| NodeError::Credentials(e.to_string()))
}

pub fn load_electors(path: &Path) -> Result<BTreeMap<String, ElectorCredentials>, NodeError> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| NodeError::Credentials(e.to_string()))
}

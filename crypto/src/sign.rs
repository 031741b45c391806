//! Ed25519 message signing and verification for node identities.

use ed25519_dalek::{Signer, Verifier, VerifyingKey};

use crate::NodeKeypair;

/// Sign a message, returning the hex-encoded 64-byte signature.
pub fn sign_message(message: &[u8], keypair: &NodeKeypair) -> String {
    hex::encode(keypair.signing_key().sign(message).to_bytes())
}

/// Verify a hex signature against a message and hex public key.
///
/// Returns `false` for any malformed input instead of an error.
pub fn verify_signature(message: &[u8], signature_hex: &str, public_key_hex: &str) -> bool {
    let Ok(key_bytes) = hex::decode(public_key_hex) else {
        return false;
    };
    let Ok(key_bytes) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
        return false;
    };
    let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    verifying_key.verify(message, &signature).is_ok()
}

//! Sealed boxes for the bootstrap join request.
//!
//! A joiner that has no authenticated peer yet seals its join data to the
//! network handshake key: an ephemeral X25519 key agrees a shared secret with
//! the network's static key, Blake2b derives the symmetric key and
//! ChaCha20-Poly1305 encrypts. Output layout:
//! `ephemeral_public (32) || nonce (12) || ciphertext+tag`.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroizing;

use crate::CryptoError;

const KDF_CONTEXT: &[u8] = b"ballot-bootstrap-join";
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = 32 + NONCE_LEN;

/// The network-wide handshake key pair shared by members of the permissioned network.
pub struct HandshakeKey {
    secret: StaticSecret,
}

impl HandshakeKey {
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self {
            secret: StaticSecret::from(bytes),
        }
    }

    pub fn from_secret_hex(secret: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(hex::decode(secret)?);
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self::from_secret_bytes(arr))
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        X25519Public::from(&self.secret).to_bytes()
    }
}

fn cipher_for(shared: &[u8; 32]) -> Result<ChaCha20Poly1305, CryptoError> {
    let sym_key = Zeroizing::new(crate::hash::blake2b_256_multi(&[shared, KDF_CONTEXT]));
    ChaCha20Poly1305::new_from_slice(sym_key.as_slice())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Seal `plaintext` so only holders of the secret behind `recipient_public` can open it.
pub fn seal_to(plaintext: &[u8], recipient_public: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = X25519Public::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&X25519Public::from(*recipient_public));
    let cipher = cipher_for(shared.as_bytes())?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from(nonce_bytes);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a payload produced by [`seal_to`].
pub fn open_sealed(sealed: &[u8], key: &HandshakeKey) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < HEADER_LEN {
        return Err(CryptoError::SealedTooShort(sealed.len()));
    }
    let mut ephemeral_public = [0u8; 32];
    ephemeral_public.copy_from_slice(&sealed[..32]);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&sealed[32..HEADER_LEN]);

    let shared = key
        .secret
        .diffie_hellman(&X25519Public::from(ephemeral_public));
    let cipher = cipher_for(shared.as_bytes())?;

    cipher
        .decrypt(&Nonce::from(nonce_bytes), &sealed[HEADER_LEN..])
        .map_err(|_| CryptoError::DecryptionFailed)
}

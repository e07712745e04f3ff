use std::fmt;

use crate::error::VaultError;
use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 24;
pub const TAG_SIZE: usize = 16;

/// Smallest well-formed envelope: a nonce and the tag of an empty message.
pub const MIN_ENVELOPE_SIZE: usize = NONCE_SIZE + TAG_SIZE;

/// Associated data bound into every fragment envelope.
const FRAGMENT_AAD: &[u8] = b"chainvault/fragment/v1";

/// The process-wide fragment key. Wiped from memory when dropped and never
/// printed.
#[derive(Clone)]
pub struct SymmetricKey {
    inner: Zeroizing<[u8; KEY_SIZE]>,
}

impl SymmetricKey {
    /// Draw a key from the operating system RNG.
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng.fill_bytes(&mut *bytes);
        Self { inner: bytes }
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self {
            inner: Zeroizing::new(bytes),
        }
    }

    /// Parse a key from 64 hex characters.
    pub fn from_hex(value: &str) -> Result<Self, VaultError> {
        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        hex::decode_to_slice(value.trim(), &mut *bytes)
            .map_err(|_| VaultError::InvalidKey("expected 32 bytes as 64 hex characters"))?;
        Ok(Self { inner: bytes })
    }

    /// Render the key as hex, for writing key files.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(&*self.inner))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.inner
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(&self.inner[..]))
    }

    /// Raw AEAD seal with a caller-chosen nonce.
    pub fn seal(&self, nonce: &Nonce, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, VaultError> {
        self.cipher()
            .encrypt(
                XNonce::from_slice(&nonce.inner),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| VaultError::Encryption("unable to seal payload"))
    }

    /// Inverse of [`SymmetricKey::seal`]; any mismatch is an authentication
    /// failure.
    pub fn open(&self, nonce: &Nonce, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, VaultError> {
        self.cipher()
            .decrypt(
                XNonce::from_slice(&nonce.inner),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| VaultError::AuthenticationFailure)
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// Per-envelope XChaCha20 nonce, stored in clear at the front of the envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce {
    inner: [u8; NONCE_SIZE],
}

impl Nonce {
    /// Fresh random nonce for one envelope.
    pub fn random() -> Self {
        let mut inner = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut inner);
        Self { inner }
    }

    /// Reads exactly [`NONCE_SIZE`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, VaultError> {
        let inner: [u8; NONCE_SIZE] = bytes
            .try_into()
            .map_err(|_| VaultError::MalformedEnvelope("invalid nonce length"))?;
        Ok(Self { inner })
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.inner
    }
}

/// Authenticated encryption of individual fragments.
///
/// Each call to [`FragmentCipher::encrypt`] draws a fresh nonce, so sealing
/// the same chunk twice never yields the same envelope. The envelope is
/// self-describing: `nonce || ciphertext || tag`.
#[derive(Clone, Debug)]
pub struct FragmentCipher {
    key: SymmetricKey,
}

impl FragmentCipher {
    pub fn new(key: SymmetricKey) -> Self {
        Self { key }
    }

    /// Seal `plaintext` into a fresh envelope.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, VaultError> {
        let nonce = Nonce::random();
        let ciphertext = self.key.seal(&nonce, plaintext, FRAGMENT_AAD)?;
        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(nonce.as_bytes());
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open an envelope produced by [`FragmentCipher::encrypt`].
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, VaultError> {
        if sealed.len() < MIN_ENVELOPE_SIZE {
            return Err(VaultError::MalformedEnvelope("envelope shorter than nonce and tag"));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce)?;
        self.key.open(&nonce, ciphertext, FRAGMENT_AAD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> FragmentCipher {
        FragmentCipher::new(SymmetricKey::from_bytes([7u8; KEY_SIZE]))
    }

    #[test]
    fn sealing_is_probabilistic() {
        let cipher = cipher();
        let first = cipher.encrypt(b"same chunk").expect("seal");
        let second = cipher.encrypt(b"same chunk").expect("seal");
        assert_ne!(first, second);
        assert_eq!(cipher.decrypt(&first).expect("open"), b"same chunk");
        assert_eq!(cipher.decrypt(&second).expect("open"), b"same chunk");
    }

    #[test]
    fn every_flipped_byte_fails_authentication() {
        let cipher = cipher();
        let sealed = cipher.encrypt(b"tamper target").expect("seal");
        for idx in 0..sealed.len() {
            let mut tampered = sealed.clone();
            tampered[idx] ^= 0x01;
            assert!(
                matches!(cipher.decrypt(&tampered), Err(VaultError::AuthenticationFailure)),
                "byte {idx} was not detected"
            );
        }
    }

    #[test]
    fn foreign_key_fails_authentication() {
        let sealed = cipher().encrypt(b"secret").expect("seal");
        let other = FragmentCipher::new(SymmetricKey::from_bytes([8u8; KEY_SIZE]));
        assert!(matches!(
            other.decrypt(&sealed),
            Err(VaultError::AuthenticationFailure)
        ));
    }

    #[test]
    fn short_input_is_malformed() {
        let cipher = cipher();
        assert!(matches!(
            cipher.decrypt(&[0u8; MIN_ENVELOPE_SIZE - 1]),
            Err(VaultError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            cipher.decrypt(b""),
            Err(VaultError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let cipher = cipher();
        let sealed = cipher.encrypt(b"").expect("seal");
        assert_eq!(sealed.len(), MIN_ENVELOPE_SIZE);
        assert!(cipher.decrypt(&sealed).expect("open").is_empty());
    }

    #[test]
    fn key_hex_round_trip_and_redacted_debug() {
        let key = SymmetricKey::generate();
        let parsed = SymmetricKey::from_hex(&key.to_hex()).expect("parse");
        assert_eq!(parsed.as_bytes(), key.as_bytes());
        assert_eq!(format!("{key:?}"), "SymmetricKey(<redacted>)");
        assert!(SymmetricKey::from_hex("abcd").is_err());
    }
}

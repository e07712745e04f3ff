use std::fmt;
use std::str::FromStr;

use hex::ToHex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::VaultError;

/// Length of a SHA-256 digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Hex encoded SHA-256 digest naming a whole content object or a single
/// fragment plaintext.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId([u8; DIGEST_LEN]);

impl ContentId {
    /// Hash `bytes` and return the resulting identifier.
    pub fn of(bytes: &[u8]) -> Self {
        Self(hash_bytes(bytes))
    }

    /// Wrap an already computed digest.
    pub fn from_digest(digest: [u8; DIGEST_LEN]) -> Self {
        Self(digest)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex form, 64 characters.
    pub fn to_hex(&self) -> String {
        self.0.encode_hex::<String>()
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ContentId {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut digest = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s.trim(), &mut digest)
            .map_err(|_| VaultError::InvalidContentId(s.to_string()))?;
        Ok(Self(digest))
    }
}

impl TryFrom<String> for ContentId {
    type Error = VaultError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentId> for String {
    fn from(id: ContentId) -> Self {
        id.to_hex()
    }
}

/// Raw SHA-256 of `bytes`.
pub fn hash_bytes(bytes: &[u8]) -> [u8; DIGEST_LEN] {
    Sha256::digest(bytes).into()
}

/// Content address of `bytes`. Total over every input, the empty slice
/// included.
pub fn hash(bytes: &[u8]) -> ContentId {
    ContentId::of(bytes)
}

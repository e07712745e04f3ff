use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crypto::FragmentCipher;
use crate::error::VaultError;
use crate::fragment::{Fragment, Fragmenter, DEFAULT_CHUNK_SIZE};
use crate::hash::ContentId;
use crate::merkle::FragmentTree;

/// Owner recorded when the uploader did not identify themselves.
pub const UNKNOWN_OWNER: &str = "unknown";

/// Metadata of one ingested content object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub content_address: ContentId,
    pub size: u64,
    pub fragment_count: u32,
    pub created_at: DateTime<Utc>,
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Merkle root over fragment plaintext hashes.
    pub fragment_root: String,
}

#[derive(Clone, Debug)]
pub struct IngestOptions {
    pub owner: Option<String>,
    pub file_name: Option<String>,
    pub media_type: Option<String>,
    pub chunk_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            owner: None,
            file_name: None,
            media_type: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// A content record together with the fragments produced for it.
#[derive(Clone, Debug)]
pub struct Ingested {
    pub content: Content,
    pub fragments: Vec<Fragment>,
}

/// Address, fragment and seal `bytes` in one pass.
///
/// Ingesting the same bytes twice gives the same address but fresh
/// ciphertext; whoever stores the result decides what a second ingest means.
pub fn ingest(
    cipher: &FragmentCipher,
    bytes: &[u8],
    options: IngestOptions,
) -> Result<Ingested, VaultError> {
    if bytes.is_empty() {
        return Err(VaultError::EmptyInput);
    }
    let content_address = ContentId::of(bytes);
    let fragments = Fragmenter::with_chunk_size(cipher, options.chunk_size)?.fragment(bytes)?;
    let fragment_root = FragmentTree::from_fragments(&fragments)
        .root_hex()
        .ok_or_else(|| VaultError::Merkle("no fragments to commit".into()))?;

    debug!(
        address = %content_address,
        size = bytes.len(),
        fragments = fragments.len(),
        "content fragmented"
    );

    let content = Content {
        content_address,
        size: bytes.len() as u64,
        fragment_count: u32::try_from(fragments.len())
            .map_err(|_| VaultError::TooManyFragments(fragments.len()))?,
        created_at: Utc::now(),
        owner: options
            .owner
            .filter(|owner| !owner.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_OWNER.to_string()),
        file_name: options.file_name,
        media_type: options.media_type,
        fragment_root,
    };
    Ok(Ingested { content, fragments })
}

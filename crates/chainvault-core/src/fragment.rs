use crate::crypto::FragmentCipher;
use crate::error::VaultError;
use crate::hash::ContentId;

/// Default fragment window: 64 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Stored form of a fragment body, tagged at write time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FragmentPayload {
    /// `nonce || ciphertext || tag` produced by [`FragmentCipher::encrypt`].
    Sealed(Vec<u8>),
    /// Base64 text of an unencrypted chunk, written before per-fragment
    /// encryption existed and recorded as such.
    Legacy(String),
    /// Base64 text from a record that predates the format tag. Either a
    /// sealed envelope or a legacy chunk.
    Untagged(String),
}

/// One contiguous, position-identified slice of a content object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    /// 1-based production order.
    pub fragment_id: u32,
    /// Byte offset of this fragment's plaintext within the whole.
    pub position: u64,
    pub plaintext_size: u64,
    pub plaintext_hash: ContentId,
    pub payload: FragmentPayload,
}

impl Fragment {
    /// Offset one past the last plaintext byte of this fragment, saturating
    /// for records with corrupt sizes.
    pub fn end(&self) -> u64 {
        self.position.saturating_add(self.plaintext_size)
    }
}

/// Splits content into fixed-size windows and seals each one independently.
#[derive(Clone, Debug)]
pub struct Fragmenter<'a> {
    cipher: &'a FragmentCipher,
    chunk_size: usize,
}

impl<'a> Fragmenter<'a> {
    /// Fragmenter using [`DEFAULT_CHUNK_SIZE`].
    pub fn new(cipher: &'a FragmentCipher) -> Self {
        Self {
            cipher,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(cipher: &'a FragmentCipher, chunk_size: usize) -> Result<Self, VaultError> {
        if chunk_size == 0 {
            return Err(VaultError::InvalidChunkSize);
        }
        Ok(Self { cipher, chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of fragments `content_len` bytes split into.
    pub fn fragment_count(&self, content_len: usize) -> Result<u32, VaultError> {
        let count = content_len.div_ceil(self.chunk_size);
        u32::try_from(count).map_err(|_| VaultError::TooManyFragments(count))
    }

    /// Walk `content` in non-overlapping windows and produce the fragments in
    /// ascending position order. Empty content yields no fragments; callers
    /// reject it before getting here.
    pub fn fragment(&self, content: &[u8]) -> Result<Vec<Fragment>, VaultError> {
        let count = self.fragment_count(content.len())?;
        let mut fragments = Vec::with_capacity(count as usize);
        let mut position = 0u64;
        for (fragment_id, chunk) in (1..=count).zip(content.chunks(self.chunk_size)) {
            let sealed = self.cipher.encrypt(chunk)?;
            fragments.push(Fragment {
                fragment_id,
                position,
                plaintext_size: chunk.len() as u64,
                plaintext_hash: ContentId::of(chunk),
                payload: FragmentPayload::Sealed(sealed),
            });
            position += chunk.len() as u64;
        }
        Ok(fragments)
    }
}

use thiserror::Error;

/// Canonical error type exposed by the core pipeline.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Zero-length content offered for ingest.
    #[error("content is empty")]
    EmptyInput,

    /// Fragment window size of zero.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    /// Content would need more fragments than a `u32` id can number.
    #[error("content needs {0} fragments, more than can be numbered")]
    TooManyFragments(usize),

    /// Key material of the wrong length or encoding.
    #[error("invalid key material: {0}")]
    InvalidKey(&'static str),

    /// Sealing a fragment failed.
    #[error("encryption failure: {0}")]
    Encryption(&'static str),

    /// The envelope was tampered with or sealed under another key.
    #[error("envelope authentication failed")]
    AuthenticationFailure,

    /// The input is not an envelope this cipher understands.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(&'static str),

    /// Neither the primary nor the legacy decode path produced plaintext.
    #[error("fragment {fragment_id} at position {position} is unrecoverable: {reason}")]
    FragmentUnrecoverable {
        fragment_id: u32,
        position: u64,
        reason: String,
    },

    /// Reassembled bytes do not hash to the expected content address.
    #[error("integrity mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    /// The external ledger could not be reached or had no answer.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// A content address that is not a 64 character hex digest.
    #[error("invalid content address: {0}")]
    InvalidContentId(String),

    /// Fragment commitment tree failure.
    #[error("merkle error: {0}")]
    Merkle(String),
}

impl VaultError {
    /// True for the per-fragment decryption problems that the legacy decode
    /// path is allowed to recover from.
    pub fn is_envelope_error(&self) -> bool {
        matches!(
            self,
            VaultError::AuthenticationFailure | VaultError::MalformedEnvelope(_)
        )
    }
}

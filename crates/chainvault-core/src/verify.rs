use crate::error::VaultError;
use crate::hash::ContentId;

/// Outcome of comparing candidate bytes against a content address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Ok,
    Mismatch {
        expected: ContentId,
        actual: ContentId,
    },
}

impl Verdict {
    pub fn is_ok(&self) -> bool {
        matches!(self, Verdict::Ok)
    }

    /// Turn a mismatch into the terminal [`VaultError::IntegrityMismatch`].
    pub fn into_result(self) -> Result<(), VaultError> {
        match self {
            Verdict::Ok => Ok(()),
            Verdict::Mismatch { expected, actual } => Err(VaultError::IntegrityMismatch {
                expected: expected.to_hex(),
                actual: actual.to_hex(),
            }),
        }
    }
}

/// Recompute the address of `candidate` and compare it to `expected`.
///
/// All or nothing: a truncated or reordered candidate is simply a different
/// byte sequence.
pub fn verify(expected: &ContentId, candidate: &[u8]) -> Verdict {
    let actual = ContentId::of(candidate);
    if &actual == expected {
        Verdict::Ok
    } else {
        Verdict::Mismatch {
            expected: *expected,
            actual,
        }
    }
}

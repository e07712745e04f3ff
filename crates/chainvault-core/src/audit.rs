//! Per-fragment health check.
//!
//! Reassembly never re-verifies fragment hashes; this is a separate
//! diagnostic that opens every fragment on its own and compares it with the
//! recorded plaintext hash and the content's fragment commitment.

use serde::{Deserialize, Serialize};

use crate::content::Content;
use crate::crypto::FragmentCipher;
use crate::fragment::Fragment;
use crate::hash::ContentId;
use crate::merkle::FragmentTree;
use crate::reassemble::Reassembler;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FragmentHealth {
    Intact,
    /// Opened, but the plaintext hashes to something else.
    HashMismatch { actual: ContentId },
    Unrecoverable { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentAudit {
    pub fragment_id: u32,
    pub position: u64,
    #[serde(flatten)]
    pub health: FragmentHealth,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub content_address: ContentId,
    /// Recorded fragment hashes still produce the stored commitment.
    pub commitment_intact: bool,
    /// Fragment count matches the content record.
    pub complete: bool,
    pub fragments: Vec<FragmentAudit>,
}

impl AuditReport {
    pub fn is_healthy(&self) -> bool {
        self.commitment_intact
            && self.complete
            && self
                .fragments
                .iter()
                .all(|fragment| fragment.health == FragmentHealth::Intact)
    }
}

pub fn audit(cipher: &FragmentCipher, content: &Content, fragments: &[Fragment]) -> AuditReport {
    let reassembler = Reassembler::new(cipher);
    let mut audits: Vec<FragmentAudit> = fragments
        .iter()
        .map(|fragment| {
            let health = match reassembler.recover(fragment) {
                Ok(plain) => {
                    let actual = ContentId::of(&plain);
                    if actual == fragment.plaintext_hash {
                        FragmentHealth::Intact
                    } else {
                        FragmentHealth::HashMismatch { actual }
                    }
                }
                Err(err) => FragmentHealth::Unrecoverable {
                    reason: err.to_string(),
                },
            };
            FragmentAudit {
                fragment_id: fragment.fragment_id,
                position: fragment.position,
                health,
            }
        })
        .collect();
    audits.sort_by_key(|entry| entry.fragment_id);

    let commitment_intact = FragmentTree::from_fragments(fragments)
        .root_hex()
        .is_some_and(|root| root == content.fragment_root);

    AuditReport {
        content_address: content.content_address,
        commitment_intact,
        complete: fragments.len() as u64 == u64::from(content.fragment_count),
        fragments: audits,
    }
}

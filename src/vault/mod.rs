//! The ingest and retrieval boundary.
//!
//! `Vault` owns the fragment cipher for the lifetime of the process and
//! drives the core pipeline against a content store and the ledger. Ledger
//! failures never abort an operation: placement falls back to none, trust
//! penalties are reported as unavailable and access checks fall back to the
//! locally recorded owner.

use chainvault_core::audit::{self, AuditReport};
use chainvault_core::availability::{AvailabilityMode, AvailabilityOracle, MissingFragment};
use chainvault_core::codec;
use chainvault_core::content::{self, Content, IngestOptions};
use chainvault_core::crypto::FragmentCipher;
use chainvault_core::fragment::DEFAULT_CHUNK_SIZE;
use chainvault_core::hash::ContentId;
use chainvault_core::reassemble::Reassembler;
use chainvault_core::trust::{Placement, TrustAdjuster, TrustReport};
use chainvault_core::verify::verify;
use chainvault_core::VaultError;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ledger::{same_account, AccessKind, Ledger};
use crate::store::{ContentStore, StoreError, StoredContent};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("content {0} not found")]
    NotFound(ContentId),

    #[error("content {0} has no stored fragments")]
    NoFragments(ContentId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] VaultError),
}

/// Metadata handed back after a successful ingest.
#[derive(Clone, Debug, Serialize)]
pub struct UploadReceipt {
    pub content_address: ContentId,
    pub file_name: Option<String>,
    pub size: u64,
    pub fragment_count: u32,
    pub fragment_hashes: Vec<ContentId>,
    pub fragment_sizes: Vec<u64>,
    pub fragment_root: String,
    /// An earlier record at the same address was overwritten.
    pub replaced: bool,
    pub placement: Placement,
    pub content: Content,
}

#[derive(Clone, Debug, Serialize)]
pub struct FragmentSummary {
    pub fragment_id: u32,
    pub fragment_hash: ContentId,
    pub size: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ContentInfo {
    pub content: Content,
    pub fragments: Vec<FragmentSummary>,
    pub placement: Placement,
}

/// Result of one retrieval attempt. The trust report is filled in whether or
/// not the content came back intact.
#[derive(Debug)]
pub struct Retrieval {
    pub content: Content,
    pub fragments_used: usize,
    pub total_fragments: usize,
    pub missing: Vec<MissingFragment>,
    pub trust: TrustReport,
    pub outcome: Result<Vec<u8>, VaultError>,
}

impl Retrieval {
    pub fn is_recovered(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Serializable view; recovered bytes are included as base64 only when
    /// `include_data` is set.
    pub fn report(&self, include_data: bool) -> RetrievalReport<'_> {
        let (data, error) = match &self.outcome {
            Ok(bytes) => (include_data.then(|| codec::encode_bytes(bytes)), None),
            Err(err) => (None, Some(err.to_string())),
        };
        RetrievalReport {
            content_address: &self.content.content_address,
            file_name: self.content.file_name.as_deref(),
            media_type: self.content.media_type.as_deref(),
            fragments_used: self.fragments_used,
            total_fragments: self.total_fragments,
            missing: &self.missing,
            trust: &self.trust,
            integrity_verified: self.is_recovered(),
            data,
            error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RetrievalReport<'a> {
    pub content_address: &'a ContentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<&'a str>,
    pub fragments_used: usize,
    pub total_fragments: usize,
    pub missing: &'a [MissingFragment],
    pub trust: &'a TrustReport,
    pub integrity_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    pub content_address: ContentId,
    pub uploaded_hash: ContentId,
    pub is_valid: bool,
    pub has_original_stored: bool,
    pub verified_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ListedContent {
    pub content_address: ContentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub fragment_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<AccessKind>,
}

impl ListedContent {
    fn new(content: &Content, access: Option<AccessKind>) -> Self {
        Self {
            content_address: content.content_address,
            file_name: content.file_name.clone(),
            size: content.size,
            created_at: content.created_at,
            fragment_count: content.fragment_count,
            access,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Listing {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub total_files: usize,
    pub files: Vec<ListedContent>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DeleteReceipt {
    pub content_address: ContentId,
    pub fragments_removed: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StorageStats {
    pub total_files: usize,
    pub total_fragments: u64,
    pub total_size_bytes: u64,
    pub average_fragments_per_file: f64,
}

pub struct Vault<S, L> {
    cipher: FragmentCipher,
    store: S,
    ledger: L,
    chunk_size: usize,
    trust: TrustAdjuster,
}

impl<S, L> Vault<S, L>
where
    S: ContentStore,
    L: Ledger,
{
    pub fn new(cipher: FragmentCipher, store: S, ledger: L) -> Self {
        Self {
            cipher,
            store,
            ledger,
            chunk_size: DEFAULT_CHUNK_SIZE,
            trust: TrustAdjuster::new(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn ingest(
        &self,
        bytes: &[u8],
        file_name: Option<String>,
        media_type: Option<String>,
        owner: Option<String>,
    ) -> Result<UploadReceipt, ServiceError> {
        let ingested = content::ingest(
            &self.cipher,
            bytes,
            IngestOptions {
                owner,
                file_name,
                media_type,
                chunk_size: self.chunk_size,
            },
        )?;

        let placement = match self.ledger.trusted_nodes() {
            Ok(nodes) => Placement::round_robin(&nodes, ingested.content.fragment_count),
            Err(err) => {
                warn!(error = %err, "ledger unavailable, fragments have no recorded holders");
                Placement::new()
            }
        };

        let receipt = UploadReceipt {
            content_address: ingested.content.content_address,
            file_name: ingested.content.file_name.clone(),
            size: ingested.content.size,
            fragment_count: ingested.content.fragment_count,
            fragment_hashes: ingested.fragments.iter().map(|f| f.plaintext_hash).collect(),
            fragment_sizes: ingested.fragments.iter().map(|f| f.plaintext_size).collect(),
            fragment_root: ingested.content.fragment_root.clone(),
            replaced: false,
            placement: placement.clone(),
            content: ingested.content.clone(),
        };

        let entry = StoredContent::new(ingested.content, &ingested.fragments, placement);
        let replaced = self.store.put(entry)?;
        if replaced {
            info!(address = %receipt.content_address, "replaced existing content record");
        }
        info!(
            address = %receipt.content_address,
            size = receipt.size,
            fragments = receipt.fragment_count,
            "content ingested"
        );
        Ok(UploadReceipt { replaced, ..receipt })
    }

    pub fn info(&self, address: &ContentId) -> Result<ContentInfo, ServiceError> {
        let entry = self.entry(address)?;
        let fragments = entry
            .fragments
            .iter()
            .map(|record| FragmentSummary {
                fragment_id: record.fragment_id,
                fragment_hash: record.fragment_hash,
                size: record.size,
            })
            .collect();
        Ok(ContentInfo {
            content: entry.content,
            fragments,
            placement: entry.placement,
        })
    }

    /// Reassemble and verify the content at `address`.
    ///
    /// With `simulate_failure` set, one or two fragments are withheld. There
    /// is no redundancy, so that ends in an integrity mismatch; the parties
    /// holding the withheld fragments are penalised either way.
    pub fn retrieve<R>(
        &mut self,
        address: &ContentId,
        simulate_failure: bool,
        rng: &mut R,
    ) -> Result<Retrieval, ServiceError>
    where
        R: Rng + ?Sized,
    {
        let entry = self.entry(address)?;
        let fragments = entry.decode_fragments()?;
        if fragments.is_empty() {
            return Err(ServiceError::NoFragments(*address));
        }

        let mode = if simulate_failure {
            AvailabilityMode::InjectFailures
        } else {
            AvailabilityMode::All
        };
        let availability = AvailabilityOracle::new(mode).partition(&fragments, rng);
        if !availability.is_complete() {
            warn!(
                address = %address,
                missing = availability.missing.len(),
                "fragments unavailable"
            );
        }

        let trust = self
            .trust
            .adjust(&self.ledger, &availability.missing, &entry.placement);

        let outcome = Reassembler::new(&self.cipher)
            .reassemble(availability.available.iter().copied())
            .and_then(|bytes| verify(address, &bytes).into_result().map(|()| bytes));

        match &outcome {
            Ok(_) => info!(
                address = %address,
                used = availability.available.len(),
                total = fragments.len(),
                "content retrieved"
            ),
            Err(err) => warn!(address = %address, error = %err, "retrieval failed"),
        }

        Ok(Retrieval {
            fragments_used: availability.available.len(),
            total_fragments: fragments.len(),
            missing: availability.missing,
            trust,
            outcome,
            content: entry.content,
        })
    }

    /// Compare `bytes` against `address` without touching stored fragments.
    pub fn verify_upload(&self, address: &ContentId, bytes: &[u8]) -> Result<VerifyReport, ServiceError> {
        let uploaded_hash = ContentId::of(bytes);
        Ok(VerifyReport {
            content_address: *address,
            uploaded_hash,
            is_valid: verify(address, bytes).is_ok(),
            has_original_stored: self.store.get(address)?.is_some(),
            verified_at: Utc::now(),
        })
    }

    /// Everything stored, or only what `account` owns or was granted.
    pub fn list(&self, account: Option<&str>) -> Result<Listing, ServiceError> {
        let entries = self.store.list()?;
        let Some(account) = account.map(str::trim).filter(|a| !a.is_empty()) else {
            let files: Vec<_> = entries
                .iter()
                .map(|entry| ListedContent::new(&entry.content, None))
                .collect();
            return Ok(Listing {
                account: None,
                total_files: files.len(),
                files,
            });
        };

        let mut files = Vec::new();
        for entry in &entries {
            let access = match self.ledger.access(entry.address(), account) {
                Ok(access) => access,
                Err(err) => {
                    debug!(address = %entry.address(), error = %err, "falling back to local owner");
                    same_account(&entry.content.owner, account).then_some(AccessKind::Owner)
                }
            };
            if let Some(access) = access {
                files.push(ListedContent::new(&entry.content, Some(access)));
            }
        }
        Ok(Listing {
            account: Some(account.to_string()),
            total_files: files.len(),
            files,
        })
    }

    pub fn delete(&self, address: &ContentId) -> Result<DeleteReceipt, ServiceError> {
        let entry = self.entry(address)?;
        if !self.store.remove(address)? {
            return Err(ServiceError::NotFound(*address));
        }
        info!(address = %address, "content deleted");
        Ok(DeleteReceipt {
            content_address: *address,
            fragments_removed: entry.content.fragment_count,
        })
    }

    pub fn stats(&self) -> Result<StorageStats, ServiceError> {
        let entries = self.store.list()?;
        let total_files = entries.len();
        let total_fragments: u64 = entries.iter().map(|e| e.fragments.len() as u64).sum();
        let total_size_bytes = entries
            .iter()
            .fold(0u64, |total, e| total.saturating_add(e.content.size));
        let average_fragments_per_file = if total_files == 0 {
            0.0
        } else {
            (total_fragments as f64 / total_files as f64 * 100.0).round() / 100.0
        };
        Ok(StorageStats {
            total_files,
            total_fragments,
            total_size_bytes,
            average_fragments_per_file,
        })
    }

    pub fn audit(&self, address: &ContentId) -> Result<AuditReport, ServiceError> {
        let entry = self.entry(address)?;
        let fragments = entry.decode_fragments()?;
        let report = audit::audit(&self.cipher, &entry.content, &fragments);
        if !report.is_healthy() {
            warn!(address = %address, "audit found damaged fragments");
        }
        Ok(report)
    }

    /// Apply the failure penalty to the named parties directly.
    pub fn penalize(&mut self, parties: &[String]) -> TrustReport {
        self.trust
            .penalize_parties(&self.ledger, parties.iter().map(String::as_str))
    }

    fn entry(&self, address: &ContentId) -> Result<StoredContent, ServiceError> {
        self.store
            .get(address)?
            .ok_or(ServiceError::NotFound(*address))
    }
}

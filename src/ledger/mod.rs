//! Read-only view of the ledger that records storing nodes, their trust
//! scores and file ownership.
//!
//! The real registry lives on-chain; here it is a JSON snapshot read from
//! disk. Every query may fail, and callers are expected to degrade rather
//! than abort when it does.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chainvault_core::hash::ContentId;
use chainvault_core::trust::{PartyId, TrustScore, TrustSource};
use chainvault_core::VaultError;
use serde::{Deserialize, Serialize};

pub type AccountId = String;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger snapshot {path} unreachable: {source}")]
    Unreachable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("ledger snapshot {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("no ledger configured")]
    Offline,
    #[error("unknown node {node}")]
    UnknownNode { node: PartyId },
    #[error("file {address} is not registered")]
    UnknownFile { address: ContentId },
}

impl From<LedgerError> for VaultError {
    fn from(err: LedgerError) -> Self {
        VaultError::LedgerUnavailable(err.to_string())
    }
}

fn active_by_default() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeRecord {
    pub trust_score: TrustScore,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    pub owner: AccountId,
    #[serde(default)]
    pub grants: BTreeSet<AccountId>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub nodes: BTreeMap<PartyId, NodeRecord>,
    #[serde(default)]
    pub files: BTreeMap<ContentId, FileRecord>,
}

impl LedgerSnapshot {
    pub fn register_node(&mut self, node: impl Into<PartyId>, trust_score: TrustScore) {
        self.nodes.insert(
            node.into(),
            NodeRecord {
                trust_score,
                active: true,
            },
        );
    }

    pub fn register_file(&mut self, address: ContentId, owner: impl Into<AccountId>) {
        self.files.insert(
            address,
            FileRecord {
                owner: owner.into(),
                grants: BTreeSet::new(),
            },
        );
    }

    /// No-op if the file is not registered.
    pub fn grant(&mut self, address: &ContentId, account: impl Into<AccountId>) {
        if let Some(record) = self.files.get_mut(address) {
            record.grants.insert(account.into());
        }
    }
}

/// How a party may reach a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Owner,
    Granted,
}

/// Queries against the ledger. Implementors only supply the snapshot.
pub trait Ledger: TrustSource {
    fn snapshot(&self) -> Result<LedgerSnapshot, LedgerError>;

    fn node_score(&self, node: &str) -> Result<TrustScore, LedgerError> {
        self.snapshot()?
            .nodes
            .get(node)
            .map(|record| record.trust_score)
            .ok_or_else(|| LedgerError::UnknownNode {
                node: node.to_string(),
            })
    }

    /// Active nodes in ledger order.
    fn trusted_nodes(&self) -> Result<Vec<PartyId>, LedgerError> {
        Ok(self
            .snapshot()?
            .nodes
            .into_iter()
            .filter(|(_, record)| record.active)
            .map(|(node, _)| node)
            .collect())
    }

    fn owner_of(&self, address: &ContentId) -> Result<Option<AccountId>, LedgerError> {
        Ok(self
            .snapshot()?
            .files
            .remove(address)
            .map(|record| record.owner))
    }

    /// How `account` reaches the file, or `None` if it has no access.
    fn access(&self, address: &ContentId, account: &str) -> Result<Option<AccessKind>, LedgerError> {
        let snapshot = self.snapshot()?;
        let record = snapshot
            .files
            .get(address)
            .ok_or(LedgerError::UnknownFile { address: *address })?;
        if same_account(&record.owner, account) {
            return Ok(Some(AccessKind::Owner));
        }
        if record.grants.iter().any(|grantee| same_account(grantee, account)) {
            return Ok(Some(AccessKind::Granted));
        }
        Ok(None)
    }

    fn has_access(&self, address: &ContentId, account: &str) -> Result<bool, LedgerError> {
        Ok(self.access(address, account)?.is_some())
    }
}

/// Account identifiers are compared without regard to ASCII case.
pub fn same_account(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

impl Ledger for LedgerSnapshot {
    fn snapshot(&self) -> Result<LedgerSnapshot, LedgerError> {
        Ok(self.clone())
    }
}

impl TrustSource for LedgerSnapshot {
    fn trust_score(&self, party: &str) -> Result<TrustScore, VaultError> {
        Ok(self.node_score(party)?)
    }
}

/// Snapshot file on disk, re-read on every query.
#[derive(Clone, Debug)]
pub struct FileLedger {
    path: PathBuf,
}

impl FileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Ledger for FileLedger {
    fn snapshot(&self) -> Result<LedgerSnapshot, LedgerError> {
        let raw = fs::read(&self.path).map_err(|source| LedgerError::Unreachable {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| LedgerError::Malformed {
            path: self.path.clone(),
            source,
        })
    }
}

impl TrustSource for FileLedger {
    fn trust_score(&self, party: &str) -> Result<TrustScore, VaultError> {
        Ok(self.node_score(party)?)
    }
}

/// Ledger that is never reachable.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineLedger;

impl Ledger for OfflineLedger {
    fn snapshot(&self) -> Result<LedgerSnapshot, LedgerError> {
        Err(LedgerError::Offline)
    }
}

impl TrustSource for OfflineLedger {
    fn trust_score(&self, party: &str) -> Result<TrustScore, VaultError> {
        Ok(self.node_score(party)?)
    }
}

/// Either a snapshot file or nothing, chosen from configuration.
#[derive(Clone, Debug)]
pub enum ConfiguredLedger {
    File(FileLedger),
    Offline(OfflineLedger),
}

impl ConfiguredLedger {
    pub fn from_path(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Self::File(FileLedger::new(path)),
            None => Self::Offline(OfflineLedger),
        }
    }
}

impl Ledger for ConfiguredLedger {
    fn snapshot(&self) -> Result<LedgerSnapshot, LedgerError> {
        match self {
            Self::File(ledger) => ledger.snapshot(),
            Self::Offline(ledger) => ledger.snapshot(),
        }
    }
}

impl TrustSource for ConfiguredLedger {
    fn trust_score(&self, party: &str) -> Result<TrustScore, VaultError> {
        Ok(self.node_score(party)?)
    }
}

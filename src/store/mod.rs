//! Content storage for the vault service.
//!
//! A stored entry is the content record, its fragment records in transport
//! form and the placement of fragments on storing parties. Putting an entry
//! under an address that already exists replaces it.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chainvault_core::codec::FragmentRecord;
use chainvault_core::content::Content;
use chainvault_core::fragment::Fragment;
use chainvault_core::hash::ContentId;
use chainvault_core::trust::Placement;
use chainvault_core::VaultError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("stored entry {path} is not valid: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("store lock poisoned")]
    Poisoned,
}

/// Everything persisted for one content address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredContent {
    pub content: Content,
    pub fragments: Vec<FragmentRecord>,
    #[serde(default)]
    pub placement: Placement,
}

impl StoredContent {
    pub fn new(content: Content, fragments: &[Fragment], placement: Placement) -> Self {
        Self {
            content,
            fragments: fragments.iter().map(FragmentRecord::from).collect(),
            placement,
        }
    }

    pub fn address(&self) -> &ContentId {
        &self.content.content_address
    }

    /// Decode the fragment records back into core fragments.
    pub fn decode_fragments(&self) -> Result<Vec<Fragment>, VaultError> {
        self.fragments
            .iter()
            .cloned()
            .map(Fragment::try_from)
            .collect()
    }
}

pub trait ContentStore {
    /// Store `entry`, replacing any previous entry at the same address.
    /// Returns true when something was replaced.
    fn put(&self, entry: StoredContent) -> Result<bool, StoreError>;

    fn get(&self, address: &ContentId) -> Result<Option<StoredContent>, StoreError>;

    /// Remove the entry and all its fragments. Returns false if absent.
    fn remove(&self, address: &ContentId) -> Result<bool, StoreError>;

    /// All stored entries, ordered by address.
    fn list(&self) -> Result<Vec<StoredContent>, StoreError>;
}

/// In-memory store, mirroring the single-process deployment.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<ContentId, StoredContent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContentStore for MemoryStore {
    fn put(&self, entry: StoredContent) -> Result<bool, StoreError> {
        let mut map = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        Ok(map.insert(*entry.address(), entry).is_some())
    }

    fn get(&self, address: &ContentId) -> Result<Option<StoredContent>, StoreError> {
        let map = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(address).cloned())
    }

    fn remove(&self, address: &ContentId) -> Result<bool, StoreError> {
        let mut map = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        Ok(map.remove(address).is_some())
    }

    fn list(&self) -> Result<Vec<StoredContent>, StoreError> {
        let map = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.values().cloned().collect())
    }
}

/// One pretty-printed JSON document per address under a directory.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, address: &ContentId) -> PathBuf {
        self.root.join(format!("{address}.json"))
    }

    fn read_entry(path: &Path) -> Result<StoredContent, StoreError> {
        let bytes = fs::read(path).map_err(|source| io_error(path, source))?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl ContentStore for DirStore {
    fn put(&self, entry: StoredContent) -> Result<bool, StoreError> {
        fs::create_dir_all(&self.root).map_err(|source| io_error(&self.root, source))?;
        let path = self.entry_path(entry.address());
        let replaced = path.exists();

        let json = serde_json::to_vec_pretty(&entry).map_err(|source| StoreError::Corrupt {
            path: path.clone(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).map_err(|source| io_error(&tmp, source))?;
        file.write_all(&json).map_err(|source| io_error(&tmp, source))?;
        file.sync_all().map_err(|source| io_error(&tmp, source))?;
        fs::rename(&tmp, &path).map_err(|source| io_error(&path, source))?;

        debug!(path = %path.display(), replaced, "content entry written");
        Ok(replaced)
    }

    fn get(&self, address: &ContentId) -> Result<Option<StoredContent>, StoreError> {
        let path = self.entry_path(address);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_entry(&path).map(Some)
    }

    fn remove(&self, address: &ContentId) -> Result<bool, StoreError> {
        let path = self.entry_path(address);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(io_error(&path, source)),
        }
    }

    fn list(&self) -> Result<Vec<StoredContent>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        let dir = fs::read_dir(&self.root).map_err(|source| io_error(&self.root, source))?;
        for item in dir {
            let path = item.map_err(|source| io_error(&self.root, source))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match Self::read_entry(&path) {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!(error = %err, "skipping unreadable store entry"),
            }
        }
        entries.sort_by(|a, b| a.address().cmp(b.address()));
        Ok(entries)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainvault_core::content::{ingest, IngestOptions};
    use chainvault_core::crypto::{FragmentCipher, SymmetricKey};

    fn entry(cipher: &FragmentCipher, bytes: &[u8]) -> StoredContent {
        let ingested = ingest(
            cipher,
            bytes,
            IngestOptions {
                chunk_size: 4,
                ..IngestOptions::default()
            },
        )
        .expect("ingest");
        let nodes = vec!["node-a".to_string(), "node-b".to_string()];
        let placement = Placement::round_robin(&nodes, ingested.content.fragment_count);
        StoredContent::new(ingested.content, &ingested.fragments, placement)
    }

    fn exercise(store: &dyn ContentStore) {
        let cipher = FragmentCipher::new(SymmetricKey::generate());
        let first = entry(&cipher, b"first upload");
        let address = *first.address();

        assert!(!store.put(first.clone()).expect("put"));
        assert_eq!(store.get(&address).expect("get"), Some(first.clone()));

        // Same bytes again: same address, fresh ciphertext, last write wins.
        let second = entry(&cipher, b"first upload");
        assert_ne!(second.fragments, first.fragments);
        assert!(store.put(second.clone()).expect("replace"));
        assert_eq!(store.get(&address).expect("get"), Some(second.clone()));

        store.put(entry(&cipher, b"another one")).expect("put");
        assert_eq!(store.list().expect("list").len(), 2);

        let fragments = second.decode_fragments().expect("decode");
        assert_eq!(fragments.len(), 3);

        assert!(store.remove(&address).expect("remove"));
        assert!(!store.remove(&address).expect("remove again"));
        assert_eq!(store.get(&address).expect("get"), None);
        assert_eq!(store.list().expect("list").len(), 1);
    }

    #[test]
    fn memory_store_semantics() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn dir_store_semantics() {
        let dir = tempfile::tempdir().expect("tempdir");
        exercise(&DirStore::new(dir.path().join("vault")));
    }

    #[test]
    fn dir_store_lists_nothing_before_first_put() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DirStore::new(dir.path().join("absent"));
        assert!(store.list().expect("list").is_empty());
    }

    #[test]
    fn dir_store_skips_corrupt_entries_in_listing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DirStore::new(dir.path());
        let cipher = FragmentCipher::new(SymmetricKey::generate());
        store.put(entry(&cipher, b"good")).expect("put");
        fs::write(dir.path().join("garbage.json"), b"{not json").expect("write");
        assert_eq!(store.list().expect("list").len(), 1);
    }
}

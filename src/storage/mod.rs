pub mod filesystem;
pub mod http;

pub use filesystem::FilesystemStorage;
pub use http::HttpStorage;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::Error;
use crate::hash::HashGenerator;

/// Blob store for cached task outputs
///
/// Entries are addressed by an ordered list of path segments
/// (`[task, version, input_hash, field]`) and are immutable once written.
pub trait StorageManager: Send + Sync {
    /// Hash tag stored alongside the blob at `path`, if any
    fn get_hash(&self, path: &[String]) -> Result<Option<String>>;

    /// Raw blob bytes at `path`, if any
    fn get_contents(&self, path: &[String]) -> Result<Option<Vec<u8>>>;

    /// Store a blob and its hash tag. Writing to an existing path is a logged no-op.
    fn put_contents(&self, path: &[String], contents: &[u8], hash: &str) -> Result<()>;
}

/// Pick a backend for a cache address.
///
/// `http://` and `https://` URLs select [`HttpStorage`]; an existing local
/// directory selects [`FilesystemStorage`]. Anything else is a config error.
pub fn create_storage_manager(
    url: &str,
    hasher: Arc<HashGenerator>,
) -> crate::Result<Arc<dyn StorageManager>> {
    if url.starts_with("http://") || url.starts_with("https://") {
        info!("Using remote cache storage");
        let storage = HttpStorage::new(url).map_err(|e| Error::Config(format!("{:#}", e)))?;
        return Ok(Arc::new(storage));
    }

    let path = Path::new(url);
    if path.is_dir() {
        info!("Using local cache storage at {}", path.display());
        return Ok(Arc::new(FilesystemStorage::new(path, hasher)));
    }

    Err(Error::Config(format!(
        "Unknown cache storage url: {} (expected an http(s) URL or an existing directory)",
        url
    )))
}

/// Join path segments into a flat `/`-separated key, rejecting segments that
/// would escape the store root.
pub(crate) fn flat_key(path: &[String]) -> Result<String> {
    if path.is_empty() {
        anyhow::bail!("Empty storage path");
    }
    for segment in path {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('/') {
            anyhow::bail!("Invalid storage path segment: {:?}", segment);
        }
    }
    Ok(path.join("/"))
}

/// In-memory backend for unit tests
#[cfg(test)]
pub(crate) mod memory {
    use super::{flat_key, StorageManager};
    use anyhow::Result;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryStorage {
        entries: Mutex<BTreeMap<String, (Vec<u8>, String)>>,
        downloads: AtomicUsize,
    }

    impl MemoryStorage {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn len(&self) -> usize {
            self.entries.lock().unwrap().len()
        }

        /// Number of `get_contents` calls that found a blob
        pub fn downloads(&self) -> usize {
            self.downloads.load(Ordering::SeqCst)
        }

        pub fn remove(&self, path: &[String]) {
            self.entries.lock().unwrap().remove(&path.join("/"));
        }

        /// Overwrite an entry, bypassing the immutability check
        pub fn corrupt(&self, path: &[String], contents: &[u8]) {
            let mut entries = self.entries.lock().unwrap();
            if let Some(entry) = entries.get_mut(&path.join("/")) {
                entry.0 = contents.to_vec();
            }
        }
    }

    impl StorageManager for MemoryStorage {
        fn get_hash(&self, path: &[String]) -> Result<Option<String>> {
            let key = flat_key(path)?;
            Ok(self.entries.lock().unwrap().get(&key).map(|(_, h)| h.clone()))
        }

        fn get_contents(&self, path: &[String]) -> Result<Option<Vec<u8>>> {
            let key = flat_key(path)?;
            let found = self.entries.lock().unwrap().get(&key).map(|(c, _)| c.clone());
            if found.is_some() {
                self.downloads.fetch_add(1, Ordering::SeqCst);
            }
            Ok(found)
        }

        fn put_contents(&self, path: &[String], contents: &[u8], hash: &str) -> Result<()> {
            let key = flat_key(path)?;
            self.entries
                .lock()
                .unwrap()
                .entry(key)
                .or_insert_with(|| (contents.to_vec(), hash.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn segments(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_flat_key() {
        assert_eq!(
            flat_key(&segments(&["add", "0.1.0", "abc", "value"])).unwrap(),
            "add/0.1.0/abc/value"
        );
        assert!(flat_key(&[]).is_err());
        assert!(flat_key(&segments(&["add", ".."])).is_err());
        assert!(flat_key(&segments(&["a/b"])).is_err());
    }

    #[test]
    fn test_create_storage_manager_local_dir() {
        let temp_dir = TempDir::new().unwrap();
        let url = temp_dir.path().to_str().unwrap();
        assert!(create_storage_manager(url, Arc::new(HashGenerator::new())).is_ok());
    }

    #[test]
    fn test_create_storage_manager_remote() {
        assert!(
            create_storage_manager("https://example.com/container", Arc::new(HashGenerator::new()))
                .is_ok()
        );
    }

    #[test]
    fn test_create_storage_manager_unknown() {
        let result = create_storage_manager("/no/such/memoflow/dir", Arc::new(HashGenerator::new()));
        assert!(matches!(result, Err(Error::Config(_))));

        let result = create_storage_manager("ftp://example.com", Arc::new(HashGenerator::new()));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}

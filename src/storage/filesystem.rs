use super::{flat_key, StorageManager};
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

use crate::hash::HashGenerator;
use crate::value::Value;

/// Local directory cache backend
///
/// Layout: `<root>/<task>/<version>/<input_hash>/<field>`, one serialized
/// [`Value`] per file. A plain file has no metadata slot, so the hash tag is
/// recomputed by reading the blob back and rehashing it.
pub struct FilesystemStorage {
    root: PathBuf,
    hasher: Arc<HashGenerator>,
}

impl FilesystemStorage {
    pub fn new<P: AsRef<Path>>(root: P, hasher: Arc<HashGenerator>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            hasher,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, path: &[String]) -> Result<PathBuf> {
        Ok(self.root.join(flat_key(path)?))
    }
}

impl StorageManager for FilesystemStorage {
    fn get_hash(&self, path: &[String]) -> Result<Option<String>> {
        let Some(contents) = self.get_contents(path)? else {
            return Ok(None);
        };

        let value: Value = serde_json::from_slice(&contents)
            .with_context(|| format!("Failed to decode cached blob {}", path.join("/")))?;
        let hash = self.hasher.calculate_hash(&value, None)?;
        Ok(Some(hash))
    }

    fn get_contents(&self, path: &[String]) -> Result<Option<Vec<u8>>> {
        let file_path = self.path_for(path)?;

        if !file_path.exists() {
            return Ok(None);
        }

        let data = fs::read(&file_path)
            .with_context(|| format!("Failed to read {}", file_path.display()))?;
        debug!("Read {} bytes from {}", data.len(), file_path.display());
        Ok(Some(data))
    }

    fn put_contents(&self, path: &[String], contents: &[u8], hash: &str) -> Result<()> {
        let file_path = self.path_for(path)?;

        if file_path.exists() {
            warn!(
                "Cache entry {} already exists, skipping write",
                file_path.display()
            );
            return Ok(());
        }

        let parent = file_path
            .parent()
            .context("Storage path has no parent directory")?;
        fs::create_dir_all(parent).context("Failed to create parent directory")?;

        // Write to a temp file, then rename into place
        let file_name = path.last().map(String::as_str).unwrap_or("blob");
        let temp_path = parent.join(format!(
            "{}.tmp.{}.{:?}",
            file_name,
            std::process::id(),
            thread::current().id()
        ));

        let mut file = fs::File::create(&temp_path).context("Failed to create temp file")?;
        file.write_all(contents).context("Failed to write data")?;
        file.sync_all().context("Failed to sync file")?;
        fs::rename(&temp_path, &file_path).context("Failed to rename temp file")?;

        debug!(
            "Stored {} bytes at {} (hash {})",
            contents.len(),
            file_path.display(),
            hash
        );
        Ok(())
    }
}

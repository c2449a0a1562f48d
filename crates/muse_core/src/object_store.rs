//! Content-addressed object storage with integrity verification.

use crate::error::{MuseError, Result};
use crate::object_id::{canonical_bytes, ObjectId, ObjectKind, HEADER_LEN, MAGIC};
use crate::types::{Commit, Tree};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Maximum size for a single blob object (100 MB).
const MAX_BLOB_SIZE: usize = 100 * 1024 * 1024;

/// Default zstd compression level for object storage.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Content-addressed object storage.
///
/// Objects are stored as zstd-compressed files with integrity verification.
/// The file path is derived from the object's BLAKE3 hash, enabling
/// deduplication and corruption detection. Objects are never modified once
/// written; a write lands in a temp file and is renamed into place, so a
/// reader never observes a partial object.
///
/// # Examples
///
/// ```
/// use muse_core::ObjectStore;
/// use tempfile::TempDir;
///
/// let tmp = TempDir::new().unwrap();
/// let store = ObjectStore::new(tmp.path().join("objects"));
///
/// let id = store.put(b"{\"tempo\": 120}").unwrap();
/// assert!(store.has(id));
/// assert_eq!(store.get(id).unwrap(), b"{\"tempo\": 120}");
/// ```
#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
    compression_level: i32,
}

impl ObjectStore {
    /// Creates a new ObjectStore at the given root directory.
    ///
    /// The directory is created lazily on first write.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Sets the zstd level used for new objects.
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Returns the root directory of this object store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stores document bytes and returns their content address.
    ///
    /// Storing the same content twice yields one object.
    pub fn put(&self, content: &[u8]) -> Result<ObjectId> {
        self.put_blob(content)
    }

    /// Retrieves document bytes by content address.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if absent, `HashMismatch` or
    /// `CorruptedObject` if the stored bytes fail verification.
    pub fn get(&self, id: ObjectId) -> Result<Vec<u8>> {
        self.get_blob(id)
    }

    /// Checks if an object exists in the store.
    pub fn has(&self, id: ObjectId) -> bool {
        self.object_path(id).exists()
    }

    /// Stores raw bytes as a blob.
    pub fn put_blob(&self, data: &[u8]) -> Result<ObjectId> {
        if data.len() > MAX_BLOB_SIZE {
            return Err(MuseError::BlobTooLarge {
                size: data.len(),
                limit: MAX_BLOB_SIZE,
            });
        }
        self.put_object(ObjectKind::Blob, data)
    }

    /// Retrieves a blob.
    pub fn get_blob(&self, id: ObjectId) -> Result<Vec<u8>> {
        self.read_kind(id, ObjectKind::Blob)
    }

    /// Stores a tree.
    pub fn put_tree(&self, tree: &Tree) -> Result<ObjectId> {
        self.put_typed(ObjectKind::Tree, tree)
    }

    /// Retrieves a tree.
    pub fn get_tree(&self, id: ObjectId) -> Result<Tree> {
        self.get_typed(ObjectKind::Tree, id)
    }

    /// Stores a commit.
    pub fn put_commit(&self, commit: &Commit) -> Result<ObjectId> {
        self.put_typed(ObjectKind::Commit, commit)
    }

    /// Retrieves a commit.
    pub fn get_commit(&self, id: ObjectId) -> Result<Commit> {
        self.get_typed(ObjectKind::Commit, id)
    }

    /// Reads an object's kind and verified payload without interpreting it.
    ///
    /// Used by the sync protocol to ship objects byte-for-byte.
    pub fn read_raw(&self, id: ObjectId) -> Result<(ObjectKind, Vec<u8>)> {
        self.read_object(id)
    }

    /// Imports an object received from elsewhere.
    ///
    /// The id is recomputed from `kind` and `payload`; a mismatch is rejected
    /// before anything touches disk.
    pub fn write_raw(&self, expected: ObjectId, kind: ObjectKind, payload: &[u8]) -> Result<()> {
        let actual = ObjectId::hash_object(kind, payload);
        if actual != expected {
            return Err(MuseError::HashMismatch {
                expected: expected.as_hex(),
                actual: actual.as_hex(),
            });
        }
        if !self.has(actual) {
            self.write_object(actual, &canonical_bytes(kind, payload))?;
        }
        Ok(())
    }

    /// Lists the ids of all objects in the store.
    pub fn list_all_objects(&self) -> Result<Vec<ObjectId>> {
        let mut objects = Vec::new();

        if !self.root.exists() {
            return Ok(objects);
        }

        for shard_entry in fs::read_dir(&self.root)? {
            let shard_path = shard_entry?.path();
            if !shard_path.is_dir() {
                continue;
            }

            for obj_entry in fs::read_dir(&shard_path)? {
                let obj_path = obj_entry?.path();

                // Skip temp files left by an interrupted write
                if !obj_path.is_file() || obj_path.extension().is_some() {
                    continue;
                }

                let Some(name) = obj_path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if let Ok(id) = ObjectId::from_hex(name) {
                    objects.push(id);
                }
            }
        }

        objects.sort();
        Ok(objects)
    }

    /// Finds objects whose hex id starts with `prefix`.
    ///
    /// Only the matching shard directory is scanned, so prefixes shorter
    /// than two characters are rejected by the caller.
    pub fn find_by_prefix(&self, prefix: &str) -> Result<Vec<ObjectId>> {
        let prefix = prefix.to_ascii_lowercase();
        if prefix.len() < 2 || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(vec![]);
        }

        let dir = self.root.join(&prefix[..2]);
        if !dir.is_dir() {
            return Ok(vec![]);
        }

        let mut found = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with(&prefix) {
                if let Ok(id) = ObjectId::from_hex(name) {
                    found.push(id);
                }
            }
        }

        found.sort();
        Ok(found)
    }

    fn put_typed<T: Serialize>(&self, kind: ObjectKind, value: &T) -> Result<ObjectId> {
        let serialized =
            postcard::to_allocvec(value).map_err(|e| MuseError::Serialization(e.to_string()))?;
        self.put_object(kind, &serialized)
    }

    fn get_typed<T: DeserializeOwned>(&self, kind: ObjectKind, id: ObjectId) -> Result<T> {
        let payload = self.read_kind(id, kind)?;
        postcard::from_bytes(&payload).map_err(|e| MuseError::Deserialization(e.to_string()))
    }

    fn put_object(&self, kind: ObjectKind, payload: &[u8]) -> Result<ObjectId> {
        let id = ObjectId::hash_object(kind, payload);

        // Deduplication
        if self.has(id) {
            return Ok(id);
        }

        self.write_object(id, &canonical_bytes(kind, payload))?;
        trace!(id = %id.short(), ?kind, size = payload.len(), "stored object");
        Ok(id)
    }

    fn read_kind(&self, id: ObjectId, expected: ObjectKind) -> Result<Vec<u8>> {
        let (kind, payload) = self.read_object(id)?;

        if kind != expected {
            return Err(MuseError::CorruptedObject {
                path: self.object_path(id),
                reason: format!("expected {:?}, got {:?}", expected, kind),
            });
        }

        Ok(payload)
    }

    /// Computes the filesystem path for an object.
    fn object_path(&self, id: ObjectId) -> PathBuf {
        self.root.join(id.shard()).join(id.as_hex())
    }

    /// Writes compressed canonical bytes to disk atomically.
    fn write_object(&self, id: ObjectId, canonical: &[u8]) -> Result<()> {
        let path = self.object_path(id);
        let dir = self.root.join(id.shard());

        fs::create_dir_all(&dir)?;

        let compressed = zstd::encode_all(canonical, self.compression_level)
            .map_err(|e| MuseError::Compression(e.to_string()))?;

        // Unique temp name so concurrent writers of the same object don't collide
        let tmp_path = dir.join(format!("{}.{}.tmp", id.as_hex(), std::process::id()));

        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&compressed)?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, &path)?;

        #[cfg(unix)]
        {
            if let Ok(dir_file) = File::open(&dir) {
                let _ = dir_file.sync_all();
            }
        }

        Ok(())
    }

    /// Reads and verifies an object from disk.
    fn read_object(&self, id: ObjectId) -> Result<(ObjectKind, Vec<u8>)> {
        let path = self.object_path(id);

        if !path.exists() {
            return Err(MuseError::ObjectNotFound(id.as_hex()));
        }

        let compressed = fs::read(&path)?;

        let canonical = zstd::decode_all(compressed.as_slice())
            .map_err(|e| MuseError::Compression(e.to_string()))?;

        if canonical.len() < HEADER_LEN {
            return Err(MuseError::CorruptedObject {
                path,
                reason: "object too small".to_string(),
            });
        }

        if &canonical[..5] != MAGIC {
            return Err(MuseError::CorruptedObject {
                path,
                reason: "invalid magic bytes".to_string(),
            });
        }

        let Some(kind) = ObjectKind::from_u8(canonical[5]) else {
            return Err(MuseError::CorruptedObject {
                path,
                reason: format!("unknown kind: {}", canonical[5]),
            });
        };

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&canonical[6..HEADER_LEN]);
        let len = u64::from_le_bytes(len_bytes) as usize;
        let payload = &canonical[HEADER_LEN..];

        if payload.len() != len {
            return Err(MuseError::CorruptedObject {
                path,
                reason: format!(
                    "length mismatch: header says {}, got {}",
                    len,
                    payload.len()
                ),
            });
        }

        let actual = ObjectId::hash_object(kind, payload);
        if actual != id {
            return Err(MuseError::HashMismatch {
                expected: id.as_hex(),
                actual: actual.as_hex(),
            });
        }

        Ok((kind, payload.to_vec()))
    }
}

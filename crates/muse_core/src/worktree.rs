//! The live working directory: scanning, snapshotting, and materializing.

use crate::diff::{diff_maps, PathChange};
use crate::document::canonicalize;
use crate::error::Result;
use crate::snapshot::{build_tree, PathMap};
use crate::{ObjectId, ObjectStore};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A repository's working directory.
///
/// Everything under the root is tracked except `.muse/` and any file or
/// directory whose name starts with a dot.
#[derive(Debug, Clone)]
pub struct WorkingTree {
    root: PathBuf,
}

impl WorkingTree {
    /// Creates a handle for the given root directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists tracked files as `/`-separated relative paths.
    pub fn scan(&self) -> Result<BTreeMap<String, PathBuf>> {
        let mut files = BTreeMap::new();
        scan_dir(&self.root, "", &mut files)?;
        Ok(files)
    }

    /// Reads a tracked file.
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.abs(path))?)
    }

    /// Computes the blob id each tracked file would get, without writing
    /// anything to the object store.
    pub fn hash_all(&self) -> Result<PathMap> {
        let mut out = PathMap::new();
        for (path, abs) in self.scan()? {
            let canonical = canonicalize(&path, &fs::read(&abs)?)?;
            out.insert(path, ObjectId::hash_blob(&canonical));
        }
        Ok(out)
    }

    /// Stores every tracked file as a canonical blob and builds the tree.
    ///
    /// Unchanged content always yields the same tree id.
    pub fn snapshot(&self, store: &ObjectStore) -> Result<(ObjectId, PathMap)> {
        let mut paths = PathMap::new();
        for (path, abs) in self.scan()? {
            let canonical = canonicalize(&path, &fs::read(&abs)?)?;
            paths.insert(path, store.put_blob(&canonical)?);
        }
        let tree = build_tree(store, &paths)?;
        debug!(files = paths.len(), tree = %tree.short(), "snapshot");
        Ok((tree, paths))
    }

    /// Uncommitted changes relative to `head` (drift).
    pub fn status(&self, head: &PathMap) -> Result<Vec<PathChange>> {
        Ok(diff_maps(head, &self.hash_all()?))
    }

    /// Makes the working directory match `target` exactly.
    ///
    /// Every target blob is read before the disk is touched, so a missing
    /// or corrupt object leaves the tree as it was. Tracked files not in
    /// `target` are removed first and emptied directories pruned; then
    /// each target path is written atomically unless its bytes already
    /// match. A file standing where a directory is needed (or the reverse)
    /// is cleared before the write.
    pub fn materialize(&self, store: &ObjectStore, target: &PathMap) -> Result<()> {
        let current = self.scan()?;
        let contents = target
            .iter()
            .map(|(path, id)| Ok((path, store.get_blob(*id)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut removed = 0usize;
        for (path, abs) in &current {
            if !target.contains_key(path) {
                fs::remove_file(abs)?;
                self.prune_empty_parents(abs);
                removed += 1;
            }
        }

        for (path, content) in contents {
            let abs = self.abs(path);
            if current.contains_key(path) && fs::read(&abs).ok().as_deref() == Some(&content[..]) {
                continue;
            }
            self.clear_obstructions(path)?;
            write_file_atomic(&abs, &content)?;
        }

        debug!(files = target.len(), removed, "materialized tree");
        Ok(())
    }

    /// Removes a file occupying a parent directory of `path`, and a
    /// directory occupying `path` itself.
    fn clear_obstructions(&self, path: &str) -> Result<()> {
        let mut dir = self.root.clone();
        let mut parts = path.split('/').peekable();
        while let Some(part) = parts.next() {
            dir.push(part);
            let Ok(meta) = fs::symlink_metadata(&dir) else {
                // Nothing deeper can exist either
                return Ok(());
            };
            if parts.peek().is_some() {
                if !meta.is_dir() {
                    debug!(path = %dir.display(), "removing file in the way of a directory");
                    fs::remove_file(&dir)?;
                    return Ok(());
                }
            } else if meta.is_dir() {
                debug!(path = %dir.display(), "removing directory in the way of a file");
                fs::remove_dir_all(&dir)?;
            }
        }
        Ok(())
    }

    fn abs(&self, path: &str) -> PathBuf {
        path.split('/').fold(self.root.clone(), |acc, part| acc.join(part))
    }

    fn prune_empty_parents(&self, file: &Path) {
        let mut dir = file.parent();
        while let Some(d) = dir {
            if d == self.root || !d.starts_with(&self.root) {
                break;
            }
            // Fails (and stops) on the first non-empty directory
            if fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
    }
}

fn scan_dir(dir: &Path, prefix: &str, out: &mut BTreeMap<String, PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            warn!(path = %entry.path().display(), "skipping non-UTF-8 file name");
            continue;
        };
        if name.starts_with('.') {
            continue;
        }

        let rel = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix, name)
        };

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            scan_dir(&entry.path(), &rel, out)?;
        } else if file_type.is_file() {
            out.insert(rel, entry.path());
        }
    }
    Ok(())
}

/// Writes a file via a hidden temp sibling + rename.
fn write_file_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = dir.join(format!(".{}.muse-tmp", name));

    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

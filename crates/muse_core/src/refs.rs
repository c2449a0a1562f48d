//! Reference management: HEAD, branches, and remote-tracking refs.

use crate::error::{MuseError, Result};
use crate::ObjectId;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Default branch created by `init`.
pub const DEFAULT_BRANCH: &str = "main";

const SYMBOLIC_PREFIX: &str = "ref: refs/heads/";

/// What HEAD points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    /// HEAD follows a branch. The branch may not exist yet (no commits).
    Branch(String),
    /// HEAD names a commit directly.
    Detached(ObjectId),
}

impl Head {
    /// Name of the attached branch, if any.
    pub fn branch(&self) -> Option<&str> {
        match self {
            Head::Branch(name) => Some(name),
            Head::Detached(_) => None,
        }
    }
}

/// Manages references to commits.
///
/// Branches live at `refs/heads/<name>` and remote-tracking refs at
/// `refs/remotes/<remote>/<branch>`, each a single line of hex. HEAD is
/// either `ref: refs/heads/<name>` or a raw hash. All writes are atomic
/// using temp file + rename.
#[derive(Debug, Clone)]
pub struct Refs {
    root: PathBuf,
}

impl Refs {
    /// Creates a new Refs manager for the given .muse directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Reads HEAD.
    ///
    /// # Errors
    ///
    /// Returns `RefNotFound` if HEAD doesn't exist.
    /// Returns `InvalidRef` if the content is malformed.
    pub fn read_head(&self) -> Result<Head> {
        let path = self.root.join("HEAD");
        if !path.exists() {
            return Err(MuseError::RefNotFound("HEAD".to_string()));
        }

        let content = fs::read_to_string(&path)?;
        let trimmed = content.trim();

        if let Some(branch) = trimmed.strip_prefix(SYMBOLIC_PREFIX) {
            return Ok(Head::Branch(branch.to_string()));
        }

        ObjectId::from_hex(trimmed)
            .map(Head::Detached)
            .map_err(|_| MuseError::InvalidRef {
                path,
                reason: "expected 'ref: refs/heads/<branch>' or a commit hash".to_string(),
            })
    }

    /// Writes HEAD atomically.
    pub fn write_head(&self, head: &Head) -> Result<()> {
        let line = match head {
            Head::Branch(name) => format!("{}{}", SYMBOLIC_PREFIX, name),
            Head::Detached(id) => id.as_hex(),
        };
        write_atomic(&self.root.join("HEAD"), &line)
    }

    /// Resolves HEAD to a commit, or `None` on an unborn branch.
    pub fn head_commit(&self) -> Result<Option<ObjectId>> {
        match self.read_head()? {
            Head::Branch(name) => self.read_branch(&name),
            Head::Detached(id) => Ok(Some(id)),
        }
    }

    /// Reads a branch tip, or `None` if the branch doesn't exist.
    pub fn read_branch(&self, name: &str) -> Result<Option<ObjectId>> {
        self.try_read_ref(&branch_ref(name))
    }

    /// Points a branch at a commit, creating it if needed.
    pub fn write_branch(&self, name: &str, id: ObjectId) -> Result<()> {
        self.write_ref(&branch_ref(name), id)
    }

    /// Returns true if the branch exists.
    pub fn branch_exists(&self, name: &str) -> bool {
        self.ref_path(&branch_ref(name)).is_file()
    }

    /// Lists local branches as sorted (name, tip) pairs.
    pub fn list_branches(&self) -> Result<Vec<(String, ObjectId)>> {
        self.list_refs("heads")
    }

    /// Reads a remote-tracking ref.
    pub fn read_remote(&self, remote: &str, branch: &str) -> Result<Option<ObjectId>> {
        self.try_read_ref(&remote_ref(remote, branch))
    }

    /// Updates a remote-tracking ref.
    pub fn write_remote(&self, remote: &str, branch: &str, id: ObjectId) -> Result<()> {
        self.write_ref(&remote_ref(remote, branch), id)
    }

    /// Lists remote-tracking refs as sorted (`remote/branch`, tip) pairs.
    pub fn list_remotes(&self) -> Result<Vec<(String, ObjectId)>> {
        self.list_refs("remotes")
    }

    /// Removes every tracking ref for a remote.
    pub fn delete_remote_refs(&self, remote: &str) -> Result<()> {
        let dir = self.root.join("refs").join("remotes").join(remote);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    /// Reads a reference relative to `refs/` (e.g. "heads/main").
    ///
    /// # Errors
    ///
    /// Returns `RefNotFound` if the ref doesn't exist.
    /// Returns `InvalidRef` if the content is malformed.
    pub fn read_ref(&self, name: &str) -> Result<ObjectId> {
        self.try_read_ref(name)?
            .ok_or_else(|| MuseError::RefNotFound(name.to_string()))
    }

    /// Like [`Refs::read_ref`], but a missing ref is `Ok(None)`.
    pub fn try_read_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        let path = self.ref_path(name);
        if !path.is_file() {
            return Ok(None);
        }
        read_ref_file(&path).map(Some)
    }

    /// Writes a reference atomically.
    ///
    /// Creates parent directories as needed.
    pub fn write_ref(&self, name: &str, id: ObjectId) -> Result<()> {
        let path = self.ref_path(name);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        write_atomic(&path, &id.as_hex())
    }

    /// Deletes a reference.
    ///
    /// # Errors
    ///
    /// Returns `RefNotFound` if the ref doesn't exist.
    pub fn delete_ref(&self, name: &str) -> Result<()> {
        let path = self.ref_path(name);

        if !path.exists() {
            return Err(MuseError::RefNotFound(name.to_string()));
        }

        fs::remove_file(&path)?;
        Ok(())
    }

    /// Lists references under `refs/<namespace>`, sorted by name.
    ///
    /// Names are relative to the namespace, so `heads/feature/x` lists as
    /// `feature/x`.
    pub fn list_refs(&self, namespace: &str) -> Result<Vec<(String, ObjectId)>> {
        let dir = self.root.join("refs").join(namespace);

        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut refs = Vec::new();
        collect_refs(&dir, &dir, &mut refs)?;

        // Sort by name for deterministic output
        refs.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(refs)
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        self.root.join("refs").join(name)
    }
}

/// Ref name of a local branch, relative to `refs/`.
pub fn branch_ref(name: &str) -> String {
    format!("heads/{}", name)
}

/// Ref name of a remote-tracking branch, relative to `refs/`.
pub fn remote_ref(remote: &str, branch: &str) -> String {
    format!("remotes/{}/{}", remote, branch)
}

/// Checks that a branch (or remote) name is usable as a ref path.
///
/// Slashes are allowed for grouping (`feature/bass`), but no component may
/// be empty, start with a dot, or contain whitespace or control characters.
pub fn validate_branch_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| MuseError::InvalidBranchName(format!("{}: {}", name, reason));

    if name.is_empty() {
        return Err(invalid("empty name"));
    }
    if name == "HEAD" {
        return Err(invalid("reserved name"));
    }
    if name.starts_with('-') {
        return Err(invalid("starts with '-'"));
    }
    if name.contains("..") {
        return Err(invalid("contains '..'"));
    }
    if name.ends_with(".tmp") || name.ends_with(".lock") {
        return Err(invalid("reserved suffix"));
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err(invalid("empty path component"));
        }
        if component.starts_with('.') {
            return Err(invalid("component starts with '.'"));
        }
    }
    let forbidden = |c: char| matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | '\\');
    if name.chars().any(|c| c.is_whitespace() || c.is_control() || forbidden(c)) {
        return Err(invalid("contains a forbidden character"));
    }
    Ok(())
}

/// Reads an ObjectId from a ref file.
fn read_ref_file(path: &Path) -> Result<ObjectId> {
    let content = fs::read_to_string(path)?;
    let trimmed = content.trim();

    if trimmed.len() != ObjectId::HEX_LEN {
        return Err(MuseError::InvalidRef {
            path: path.to_path_buf(),
            reason: format!("expected 64 hex chars, got {}", trimmed.len()),
        });
    }

    ObjectId::from_hex(trimmed).map_err(|_| MuseError::InvalidRef {
        path: path.to_path_buf(),
        reason: "invalid hex string".to_string(),
    })
}

/// Writes a single line to a ref file atomically.
///
/// Uses temp file + fsync + rename for crash safety.
fn write_atomic(path: &Path, line: &str) -> Result<()> {
    let tmp_path = path.with_extension("tmp");

    {
        let mut file = File::create(&tmp_path)?;
        writeln!(file, "{}", line)?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path)?;

    // fsync parent directory (Unix-specific for crash safety)
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            if let Ok(dir_file) = File::open(parent) {
                let _ = dir_file.sync_all();
            }
        }
    }

    Ok(())
}

/// Recursively collects all refs under a directory.
fn collect_refs(current: &Path, base: &Path, refs: &mut Vec<(String, ObjectId)>) -> Result<()> {
    for entry in fs::read_dir(current)? {
        let path = entry?.path();

        if path.is_dir() {
            collect_refs(&path, base, refs)?;
        } else if path.is_file() {
            if path.extension().and_then(|s| s.to_str()) == Some("tmp") {
                continue;
            }

            let id = read_ref_file(&path)?;
            if let Ok(rel_path) = path.strip_prefix(base) {
                let name = rel_path
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                refs.push((name, id));
            }
        }
    }

    Ok(())
}

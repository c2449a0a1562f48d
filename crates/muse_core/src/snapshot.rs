//! Conversion between nested tree objects and flat path maps.

use crate::error::{MuseError, Result};
use crate::types::{Tree, TreeEntry, TreeEntryKind};
use crate::{ObjectId, ObjectStore};
use std::collections::BTreeMap;

/// A snapshot as a flat map from `/`-separated path to blob id.
pub type PathMap = BTreeMap<String, ObjectId>;

/// Flattens a tree into a path map by walking every subtree.
pub fn flatten_tree(store: &ObjectStore, tree_id: ObjectId) -> Result<PathMap> {
    let mut out = PathMap::new();
    flatten_into(store, tree_id, "", &mut out)?;
    Ok(out)
}

fn flatten_into(
    store: &ObjectStore,
    tree_id: ObjectId,
    prefix: &str,
    out: &mut PathMap,
) -> Result<()> {
    let tree = store.get_tree(tree_id)?;
    for entry in tree.entries {
        let path = if prefix.is_empty() {
            entry.name
        } else {
            format!("{}/{}", prefix, entry.name)
        };
        match entry.kind {
            TreeEntryKind::Blob => {
                out.insert(path, entry.id);
            }
            TreeEntryKind::Tree => flatten_into(store, entry.id, &path, out)?,
        }
    }
    Ok(())
}

/// Builds nested tree objects from a path map, bottom-up, and returns the
/// root tree id.
///
/// The same map always yields the same root id. An empty map yields the
/// empty tree.
pub fn build_tree(store: &ObjectStore, paths: &PathMap) -> Result<ObjectId> {
    let mut root = DirNode::default();
    for (path, id) in paths {
        root.insert(path, *id)?;
    }
    root.write(store)
}

#[derive(Default)]
struct DirNode {
    files: BTreeMap<String, ObjectId>,
    dirs: BTreeMap<String, DirNode>,
}

impl DirNode {
    fn insert(&mut self, path: &str, id: ObjectId) -> Result<()> {
        let invalid = || MuseError::Serialization(format!("invalid tree path: {:?}", path));

        match path.split_once('/') {
            None => {
                if path.is_empty() || self.dirs.contains_key(path) {
                    return Err(invalid());
                }
                self.files.insert(path.to_string(), id);
            }
            Some((dir, rest)) => {
                if dir.is_empty() || self.files.contains_key(dir) {
                    return Err(invalid());
                }
                self.dirs.entry(dir.to_string()).or_default().insert(rest, id)?;
            }
        }
        Ok(())
    }

    fn write(&self, store: &ObjectStore) -> Result<ObjectId> {
        let mut entries = Vec::with_capacity(self.files.len() + self.dirs.len());

        for (name, id) in &self.files {
            entries.push(TreeEntry {
                name: name.clone(),
                kind: TreeEntryKind::Blob,
                id: *id,
            });
        }
        for (name, node) in &self.dirs {
            entries.push(TreeEntry {
                name: name.clone(),
                kind: TreeEntryKind::Tree,
                id: node.write(store)?,
            });
        }

        store.put_tree(&Tree::new(entries))
    }
}

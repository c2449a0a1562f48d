//! Push/pull protocol: wire types, object transfer, and remote transports.
//!
//! A remote is anything that can report a branch tip, say which objects it
//! lacks, accept a push, and serve a fetch. [`HttpRemote`] talks to a Hub;
//! [`LocalRemote`] uses a bare repository directory on the same machine.

use crate::bare::BareRepo;
use crate::config::RemoteConfig;
use crate::error::{MuseError, Result};
use crate::object_id::ObjectKind;
use crate::types::{Commit, Tree, TreeEntryKind};
use crate::{ObjectId, ObjectStore};
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Default request timeout for HTTP remotes.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// One object on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WireObject {
    /// Claimed id; the receiver recomputes and compares it.
    pub id: ObjectId,
    /// Object kind.
    pub kind: ObjectKind,
    /// Hex-encoded payload.
    pub data: String,
}

/// Objects plus a compare-and-swap ref update.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    /// Branch to update.
    pub branch: String,
    /// Tip the client believes the remote has (`None` for a new branch).
    pub old: Option<ObjectId>,
    /// New tip.
    pub new: ObjectId,
    /// Objects the remote reported missing.
    pub objects: Vec<WireObject>,
    /// Allow a non-fast-forward update.
    #[serde(default)]
    pub force: bool,
}

/// Result of an accepted push.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PushResponse {
    /// Updated branch.
    pub branch: String,
    /// Its new tip.
    pub head: ObjectId,
    /// Number of objects newly stored.
    pub accepted: usize,
}

/// A branch tip.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RefResponse {
    /// Branch name.
    pub branch: String,
    /// Tip, or `None` if the branch doesn't exist.
    pub head: Option<ObjectId>,
}

/// Which of these objects does the remote lack?
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MissingRequest {
    /// Candidate ids.
    pub ids: Vec<ObjectId>,
}

/// The subset of a [`MissingRequest`] the remote lacks.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MissingResponse {
    /// Missing ids.
    pub missing: Vec<ObjectId>,
}

/// Request for everything needed to reach `want`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Commit to fetch.
    pub want: ObjectId,
    /// Commits the client already has.
    #[serde(default)]
    pub have: Vec<ObjectId>,
}

/// Objects reachable from `head` that the client lacks.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// The requested commit.
    pub head: ObjectId,
    /// Objects, in no particular order.
    pub objects: Vec<WireObject>,
}

/// Transport to another repository.
pub trait Remote {
    /// Human-readable location, for logs.
    fn location(&self) -> String;

    /// Current tip of a branch.
    fn get_ref(&self, branch: &str) -> Result<Option<ObjectId>>;

    /// All branches.
    fn list_refs(&self) -> Result<Vec<RefResponse>>;

    /// Filters `ids` down to those the remote lacks.
    fn missing(&self, ids: &[ObjectId]) -> Result<Vec<ObjectId>>;

    /// Uploads objects and moves a branch.
    fn push(&self, request: &PushRequest) -> Result<PushResponse>;

    /// Downloads the objects needed to reach a commit.
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

/// Opens the transport for a configured remote.
///
/// `http://` and `https://` URLs use the Hub protocol; anything else is a
/// local bare repository path (optionally `file://`-prefixed), created on
/// first use.
pub fn open_remote(config: &RemoteConfig, timeout: Duration) -> Result<Box<dyn Remote>> {
    let url = config.url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        let remote = HttpRemote::new(url, config.effective_token(), timeout)?;
        Ok(Box::new(remote))
    } else {
        let path = url.strip_prefix("file://").unwrap_or(url);
        Ok(Box::new(LocalRemote::new(path)))
    }
}

/// A bare repository on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalRemote {
    path: PathBuf,
}

impl LocalRemote {
    /// Creates a transport for the bare repository at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn repo(&self) -> Result<BareRepo> {
        BareRepo::open_or_init(&self.path)
    }
}

impl Remote for LocalRemote {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn get_ref(&self, branch: &str) -> Result<Option<ObjectId>> {
        self.repo()?.head(branch)
    }

    fn list_refs(&self) -> Result<Vec<RefResponse>> {
        Ok(self
            .repo()?
            .branches()?
            .into_iter()
            .map(|(branch, head)| RefResponse {
                branch,
                head: Some(head),
            })
            .collect())
    }

    fn missing(&self, ids: &[ObjectId]) -> Result<Vec<ObjectId>> {
        Ok(self.repo()?.missing(ids))
    }

    fn push(&self, request: &PushRequest) -> Result<PushResponse> {
        let repo = self.repo()?;
        let _lock = repo.lock(Duration::from_secs(5))?;
        repo.receive_push(request)
    }

    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.repo()?.serve_fetch(request)
    }
}

/// A repository hosted on a Hub, addressed by its full URL
/// (`http://host:port/repos/<repo_id>`).
#[derive(Debug, Clone)]
pub struct HttpRemote {
    base: String,
    token: Option<String>,
    client: Client,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl HttpRemote {
    /// Builds a client with the given bearer token and request timeout.
    pub fn new(url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MuseError::RemoteUnreachable(e.to_string()))?;
        Ok(Self {
            base: url.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let mut request = self.client.get(self.url(path));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        debug!(url = %self.url(path), "GET");
        let response = request.send().map_err(unreachable)?;
        decode(response)
    }

    fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        debug!(url = %self.url(path), "POST");
        let response = request.send().map_err(unreachable)?;
        decode(response)
    }
}

fn unreachable(err: reqwest::Error) -> MuseError {
    MuseError::RemoteUnreachable(err.to_string())
}

fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.message)
            .unwrap_or(text);
        return Err(MuseError::RemoteRejected {
            status: status.as_u16(),
            message,
        });
    }
    response.json().map_err(unreachable)
}

impl Remote for HttpRemote {
    fn location(&self) -> String {
        self.base.clone()
    }

    fn get_ref(&self, branch: &str) -> Result<Option<ObjectId>> {
        let response: RefResponse = self.get(&format!("refs/{}", branch))?;
        Ok(response.head)
    }

    fn list_refs(&self) -> Result<Vec<RefResponse>> {
        self.get("refs")
    }

    fn missing(&self, ids: &[ObjectId]) -> Result<Vec<ObjectId>> {
        let response: MissingResponse = self.post(
            "objects/missing",
            &MissingRequest { ids: ids.to_vec() },
        )?;
        Ok(response.missing)
    }

    fn push(&self, request: &PushRequest) -> Result<PushResponse> {
        let response: PushResponse = self.post("push", request)?;
        info!(branch = %response.branch, head = %response.head.short(), "pushed");
        Ok(response)
    }

    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.post("fetch", request)
    }
}

/// Every commit in `commits` plus all trees and blobs under their root
/// trees, skipping anything in `known` (and, for trees, everything below
/// a known tree).
pub fn object_closure(
    store: &ObjectStore,
    commits: &[ObjectId],
    known: &HashSet<ObjectId>,
) -> Result<Vec<ObjectId>> {
    let mut seen: HashSet<ObjectId> = HashSet::new();
    let mut out = Vec::new();
    let mut trees = Vec::new();

    for id in commits {
        if known.contains(id) || !seen.insert(*id) {
            continue;
        }
        out.push(*id);
        trees.push(store.get_commit(*id)?.tree);
    }

    while let Some(tree_id) = trees.pop() {
        if known.contains(&tree_id) || !seen.insert(tree_id) {
            continue;
        }
        out.push(tree_id);
        for entry in store.get_tree(tree_id)?.entries {
            match entry.kind {
                TreeEntryKind::Tree => trees.push(entry.id),
                TreeEntryKind::Blob => {
                    if !known.contains(&entry.id) && seen.insert(entry.id) {
                        out.push(entry.id);
                    }
                }
            }
        }
    }

    Ok(out)
}

/// All trees and blobs under the given commits' root trees.
pub fn tree_objects(store: &ObjectStore, commits: &[ObjectId]) -> Result<HashSet<ObjectId>> {
    let mut out = HashSet::new();
    let mut trees = Vec::new();
    for id in commits {
        if store.has(*id) {
            trees.push(store.get_commit(*id)?.tree);
        }
    }
    while let Some(tree_id) = trees.pop() {
        if !out.insert(tree_id) {
            continue;
        }
        for entry in store.get_tree(tree_id)?.entries {
            match entry.kind {
                TreeEntryKind::Tree => trees.push(entry.id),
                TreeEntryKind::Blob => {
                    out.insert(entry.id);
                }
            }
        }
    }
    Ok(out)
}

/// Reads objects from the store into wire form.
pub fn pack_objects(store: &ObjectStore, ids: &[ObjectId]) -> Result<Vec<WireObject>> {
    ids.iter()
        .map(|id| {
            let (kind, payload) = store.read_raw(*id)?;
            Ok(WireObject {
                id: *id,
                kind,
                data: hex::encode(payload),
            })
        })
        .collect()
}

/// Objects decoded and hash-verified, not yet written anywhere.
#[derive(Debug, Default)]
pub struct VerifiedObjects {
    objects: HashMap<ObjectId, (ObjectKind, Vec<u8>)>,
}

impl VerifiedObjects {
    /// Decodes every wire object and checks its id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHex` for undecodable payloads and `HashMismatch` if a
    /// payload doesn't hash to its claimed id.
    pub fn decode(objects: &[WireObject]) -> Result<Self> {
        let mut out = HashMap::with_capacity(objects.len());
        for object in objects {
            let payload =
                hex::decode(&object.data).map_err(|e| MuseError::InvalidHex(e.to_string()))?;
            let actual = ObjectId::hash_object(object.kind, &payload);
            if actual != object.id {
                return Err(MuseError::HashMismatch {
                    expected: object.id.as_hex(),
                    actual: actual.as_hex(),
                });
            }
            out.insert(object.id, (object.kind, payload));
        }
        Ok(Self { objects: out })
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if there are no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Checks that every object reachable from `tip` is either in this set
    /// or already in `store`.
    ///
    /// Objects already in the store are trusted to be complete: nothing is
    /// ever written to a store before its closure has been checked.
    pub fn check_closure(&self, store: &ObjectStore, tip: ObjectId) -> Result<()> {
        let mut seen = HashSet::new();
        let mut stack = vec![(tip, ObjectKind::Commit)];

        while let Some((id, expected)) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some((kind, payload)) = self.objects.get(&id) else {
                if store.has(id) {
                    continue;
                }
                return Err(MuseError::ObjectNotFound(id.as_hex()));
            };
            if *kind != expected {
                return Err(MuseError::Deserialization(format!(
                    "object {} is a {:?}, expected {:?}",
                    id.short(),
                    kind,
                    expected
                )));
            }

            match kind {
                ObjectKind::Commit => {
                    let commit: Commit = postcard::from_bytes(payload)
                        .map_err(|e| MuseError::Deserialization(e.to_string()))?;
                    stack.push((commit.tree, ObjectKind::Tree));
                    for parent in commit.parents {
                        stack.push((parent, ObjectKind::Commit));
                    }
                }
                ObjectKind::Tree => {
                    let tree: Tree = postcard::from_bytes(payload)
                        .map_err(|e| MuseError::Deserialization(e.to_string()))?;
                    for entry in tree.entries {
                        let kind = match entry.kind {
                            TreeEntryKind::Tree => ObjectKind::Tree,
                            TreeEntryKind::Blob => ObjectKind::Blob,
                        };
                        stack.push((entry.id, kind));
                    }
                }
                ObjectKind::Blob => {}
            }
        }

        Ok(())
    }

    /// Writes every object to the store; returns how many were new.
    pub fn write_to(&self, store: &ObjectStore) -> Result<usize> {
        let mut written = 0;
        for (id, (kind, payload)) in &self.objects {
            if !store.has(*id) {
                store.write_raw(*id, *kind, payload)?;
                written += 1;
            }
        }
        Ok(written)
    }
}

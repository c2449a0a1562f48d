//! Commit DAG operations: ancestry, merge base, topological log, rendering.

use crate::error::{MuseError, Result};
use crate::types::Commit;
use crate::{ObjectId, ObjectStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet, VecDeque};
use std::fmt::Write as _;

/// The commits reachable from a set of tips, keyed by id.
///
/// Commits only point at parents, so the graph is acyclic by construction
/// and held as a plain arena with no back-pointers.
#[derive(Debug, Clone, Default)]
pub struct CommitGraph {
    commits: BTreeMap<ObjectId, Commit>,
}

impl CommitGraph {
    /// Loads every commit reachable from `tips`.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if any reachable commit is missing.
    pub fn load(store: &ObjectStore, tips: &[ObjectId]) -> Result<Self> {
        let mut commits = BTreeMap::new();
        let mut queue: VecDeque<ObjectId> = tips.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            if commits.contains_key(&id) {
                continue;
            }
            let commit = store.get_commit(id)?;
            queue.extend(commit.parents.iter().copied());
            commits.insert(id, commit);
        }

        Ok(Self { commits })
    }

    /// Looks up a commit.
    pub fn get(&self, id: &ObjectId) -> Option<&Commit> {
        self.commits.get(id)
    }

    /// True if the commit is in the graph.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.commits.contains_key(id)
    }

    /// Number of commits.
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    /// True if the graph holds no commits.
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// All commit ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.commits.keys()
    }

    /// Topological order: every child before its parents; among commits
    /// that are ready at the same time, newest timestamp first, then id.
    pub fn topo_order(&self) -> Vec<ObjectId> {
        let mut child_count: HashMap<ObjectId, usize> =
            self.commits.keys().map(|id| (*id, 0)).collect();
        for commit in self.commits.values() {
            for parent in unique_parents(commit) {
                if let Some(count) = child_count.get_mut(&parent) {
                    *count += 1;
                }
            }
        }

        let mut ready: BinaryHeap<(u64, ObjectId)> = child_count
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(id, _)| (self.commits[id].timestamp_unix, *id))
            .collect();

        let mut order = Vec::with_capacity(self.commits.len());
        while let Some((_, id)) = ready.pop() {
            order.push(id);
            for parent in unique_parents(&self.commits[&id]) {
                let Some(count) = child_count.get_mut(&parent) else {
                    continue;
                };
                *count -= 1;
                if *count == 0 {
                    ready.push((self.commits[&parent].timestamp_unix, parent));
                }
            }
        }

        order
    }
}

fn unique_parents(commit: &Commit) -> impl Iterator<Item = ObjectId> + '_ {
    let mut seen = HashSet::new();
    commit.parents.iter().copied().filter(move |p| seen.insert(*p))
}

/// BFS hop counts from `tip` to each of its ancestors (including itself).
fn distances(store: &ObjectStore, tip: ObjectId) -> Result<HashMap<ObjectId, usize>> {
    let mut dist = HashMap::new();
    let mut queue = VecDeque::new();
    dist.insert(tip, 0);
    queue.push_back(tip);

    while let Some(id) = queue.pop_front() {
        let depth = dist[&id];
        for parent in store.get_commit(id)?.parents {
            if let std::collections::hash_map::Entry::Vacant(e) = dist.entry(parent) {
                e.insert(depth + 1);
                queue.push_back(parent);
            }
        }
    }

    Ok(dist)
}

/// Nearest common ancestor of two commits, or `None` for unrelated
/// histories.
///
/// Only best common ancestors (those not behind another common ancestor)
/// are candidates. Ties are broken by fewest total hops from both tips, then
/// the smaller one-sided hop count, then id.
pub fn merge_base(store: &ObjectStore, a: ObjectId, b: ObjectId) -> Result<Option<ObjectId>> {
    if a == b {
        return Ok(Some(a));
    }

    let from_a = distances(store, a)?;
    let from_b = distances(store, b)?;

    let common: BTreeSet<ObjectId> = from_a
        .keys()
        .filter(|id| from_b.contains_key(id))
        .copied()
        .collect();
    if common.is_empty() {
        return Ok(None);
    }

    // Anything reachable from a common ancestor's parents is dominated
    let mut dominated = HashSet::new();
    let mut queue = VecDeque::new();
    for id in &common {
        queue.extend(store.get_commit(*id)?.parents);
    }
    while let Some(id) = queue.pop_front() {
        if dominated.insert(id) {
            queue.extend(store.get_commit(id)?.parents);
        }
    }

    let best = common
        .into_iter()
        .filter(|id| !dominated.contains(id))
        .min_by_key(|id| {
            let da = from_a[id];
            let db = from_b[id];
            (da + db, da.max(db), *id)
        });

    Ok(best)
}

/// True if `ancestor` is `descendant` or reachable from it.
pub fn is_ancestor(store: &ObjectStore, ancestor: ObjectId, descendant: ObjectId) -> Result<bool> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([descendant]);

    while let Some(id) = queue.pop_front() {
        if id == ancestor {
            return Ok(true);
        }
        if seen.insert(id) {
            queue.extend(store.get_commit(id)?.parents);
        }
    }

    Ok(false)
}

/// Every commit reachable from `tips`, stopping at anything in `stop`.
///
/// Used to compute what a remote is missing: commits behind the remote's
/// known tips are not walked.
pub fn reachable_commits(
    store: &ObjectStore,
    tips: &[ObjectId],
    stop: &HashSet<ObjectId>,
) -> Result<Vec<ObjectId>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut queue: VecDeque<ObjectId> = tips.iter().copied().collect();

    while let Some(id) = queue.pop_front() {
        if stop.contains(&id) || !seen.insert(id) {
            continue;
        }
        queue.extend(store.get_commit(id)?.parents);
        out.push(id);
    }

    Ok(out)
}

/// One commit in a log, with its parents for DAG rendering.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Commit id.
    pub id: ObjectId,
    /// Parent ids, in commit order.
    pub parents: Vec<ObjectId>,
    /// Author.
    pub author: String,
    /// Unix seconds.
    pub timestamp: u64,
    /// Full message.
    pub message: String,
}

impl LogEntry {
    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// Commits reachable from `tips` in topological order.
pub fn log(store: &ObjectStore, tips: &[ObjectId], limit: Option<usize>) -> Result<Vec<LogEntry>> {
    let graph = CommitGraph::load(store, tips)?;
    let order = graph.topo_order();
    let limit = limit.unwrap_or(order.len());

    order
        .into_iter()
        .take(limit)
        .map(|id| {
            let commit = graph
                .get(&id)
                .ok_or_else(|| MuseError::ObjectNotFound(id.as_hex()))?;
            Ok(LogEntry {
                id,
                parents: commit.parents.clone(),
                author: commit.author.clone(),
                timestamp: commit.timestamp_unix,
                message: commit.message.clone(),
            })
        })
        .collect()
}

/// Renders a log as an ASCII DAG, one commit per `*` line.
///
/// `labels` decorates commits with ref names.
pub fn render_ascii(entries: &[LogEntry], labels: &BTreeMap<ObjectId, Vec<String>>) -> String {
    let mut out = String::new();
    let mut lanes: Vec<Option<ObjectId>> = Vec::new();

    for entry in entries {
        let col = match lanes.iter().position(|l| *l == Some(entry.id)) {
            Some(col) => col,
            None => claim_lane(&mut lanes, 0),
        };

        // Other lanes waiting on this commit fold into it
        let folded: Vec<usize> = lanes
            .iter()
            .enumerate()
            .filter(|(i, l)| *i != col && **l == Some(entry.id))
            .map(|(i, _)| i)
            .collect();
        if !folded.is_empty() {
            let line = lane_line(&lanes, |i| folded.contains(&i).then_some('/'));
            push_line(&mut out, &line, None);
            for i in &folded {
                lanes[*i] = None;
            }
        }

        lanes[col] = Some(entry.id);
        let mut text = format!("{} {}", entry.id.short(), entry.summary());
        if let Some(names) = labels.get(&entry.id) {
            if !names.is_empty() {
                let _ = write!(text, " ({})", names.join(", "));
            }
        }
        let line = lane_line(&lanes, |i| (i == col).then_some('*'));
        push_line(&mut out, &line, Some(&text));

        lanes[col] = entry.parents.first().copied();
        let mut opened = Vec::new();
        for parent in entry.parents.iter().skip(1) {
            if lanes.contains(&Some(*parent)) {
                continue;
            }
            let lane = claim_lane(&mut lanes, col + 1);
            lanes[lane] = Some(*parent);
            opened.push(lane);
        }
        if !opened.is_empty() {
            let line = lane_line(&lanes, |i| opened.contains(&i).then_some('\\'));
            push_line(&mut out, &line, None);
        }

        while lanes.last() == Some(&None) {
            lanes.pop();
        }
    }

    out
}

fn claim_lane(lanes: &mut Vec<Option<ObjectId>>, from: usize) -> usize {
    match lanes.iter().skip(from).position(|l| l.is_none()) {
        Some(offset) => from + offset,
        None => {
            lanes.push(None);
            lanes.len() - 1
        }
    }
}

fn lane_line(lanes: &[Option<ObjectId>], special: impl Fn(usize) -> Option<char>) -> String {
    let cells: Vec<String> = lanes
        .iter()
        .enumerate()
        .map(|(i, lane)| {
            special(i)
                .unwrap_or(if lane.is_some() { '|' } else { ' ' })
                .to_string()
        })
        .collect();
    cells.join(" ").trim_end().to_string()
}

fn push_line(out: &mut String, graph: &str, text: Option<&str>) {
    match text {
        Some(text) => {
            let _ = writeln!(out, "{}  {}", graph, text);
        }
        None => {
            let _ = writeln!(out, "{}", graph);
        }
    }
}

/// Renders a log as a JSON array.
pub fn render_json(entries: &[LogEntry]) -> Result<String> {
    serde_json::to_string_pretty(entries).map_err(|e| MuseError::Serialization(e.to_string()))
}

/// Renders a log as a Graphviz digraph, edges pointing at parents.
pub fn render_dot(entries: &[LogEntry]) -> String {
    let mut output = String::from("digraph commits {\n");
    output.push_str("  rankdir=BT;\n");
    output.push_str("  node [shape=box];\n\n");

    for entry in entries {
        let _ = writeln!(
            output,
            "  \"{}\" [label=\"{}\\n{}\"];",
            entry.id.short(),
            entry.id.short(),
            escape_dot_label(entry.summary())
        );
    }

    output.push('\n');

    let shown: HashSet<ObjectId> = entries.iter().map(|e| e.id).collect();
    for entry in entries {
        for parent in &entry.parents {
            if shown.contains(parent) {
                let _ = writeln!(output, "  \"{}\" -> \"{}\";", entry.id.short(), parent.short());
            }
        }
    }

    output.push_str("}\n");
    output
}

/// Escape special characters in DOT labels.
fn escape_dot_label(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

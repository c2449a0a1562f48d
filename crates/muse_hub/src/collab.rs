//! Issues and pull requests: metadata stored next to each hosted
//! repository, in `issues.json` and `pulls.json`.

use muse_core::{MuseError, ObjectId, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const ISSUES_FILE: &str = "issues.json";
const PULLS_FILE: &str = "pulls.json";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub id: Uuid,
    /// Sequential per repository, starting at 1.
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub state: IssueState,
    /// RFC 3339.
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PullState {
    Open,
    Merged,
    Closed,
}

/// A request to merge branch `head` into branch `base`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub id: Uuid,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub head: String,
    pub base: String,
    pub state: PullState,
    pub created_at: String,
    /// Tip of `base` after the merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_commit: Option<ObjectId>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NewIssue {
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NewPullRequest {
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub head: String,
    pub base: String,
}

/// JSON-file store for one repository's collaboration records.
#[derive(Debug, Clone)]
pub struct CollabStore {
    dir: PathBuf,
}

impl CollabStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn issues(&self) -> Result<Vec<Issue>> {
        self.load(ISSUES_FILE)
    }

    pub fn create_issue(&self, new: NewIssue, created_at: String) -> Result<Issue> {
        let mut issues = self.issues()?;
        let issue = Issue {
            id: Uuid::new_v4(),
            number: next_number(issues.iter().map(|i| i.number)),
            title: new.title,
            body: new.body,
            state: IssueState::Open,
            created_at,
        };
        issues.push(issue.clone());
        self.save(ISSUES_FILE, &issues)?;
        Ok(issue)
    }

    pub fn pulls(&self) -> Result<Vec<PullRequest>> {
        self.load(PULLS_FILE)
    }

    pub fn pull(&self, number: u64) -> Result<Option<PullRequest>> {
        Ok(self.pulls()?.into_iter().find(|p| p.number == number))
    }

    pub fn create_pull(&self, new: NewPullRequest, created_at: String) -> Result<PullRequest> {
        let mut pulls = self.pulls()?;
        let pull = PullRequest {
            id: Uuid::new_v4(),
            number: next_number(pulls.iter().map(|p| p.number)),
            title: new.title,
            body: new.body,
            head: new.head,
            base: new.base,
            state: PullState::Open,
            created_at,
            merge_commit: None,
        };
        pulls.push(pull.clone());
        self.save(PULLS_FILE, &pulls)?;
        Ok(pull)
    }

    /// Replaces the stored record with the same number.
    pub fn update_pull(&self, pull: &PullRequest) -> Result<()> {
        let mut pulls = self.pulls()?;
        match pulls.iter_mut().find(|p| p.number == pull.number) {
            Some(slot) => *slot = pull.clone(),
            None => return Err(MuseError::RefNotFound(format!("pull #{}", pull.number))),
        }
        self.save(PULLS_FILE, &pulls)
    }

    fn load<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read(&path)?;
        serde_json::from_slice(&content)
            .map_err(|e| MuseError::Deserialization(format!("{}: {}", file, e)))
    }

    fn save<T: Serialize>(&self, file: &str, records: &[T]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file);
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(records)
            .map_err(|e| MuseError::Serialization(e.to_string()))?;

        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&content)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

fn next_number(existing: impl Iterator<Item = u64>) -> u64 {
    existing.max().unwrap_or(0) + 1
}

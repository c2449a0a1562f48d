use super::assertions::{Assertion, OutcomeMatch};
use super::clock::MockClock;
use super::steps::ScenarioStep;
use super::workspace::TestWorkspace;
use anyhow::{anyhow, Context, Result};
use muse_core::{
    flatten_tree, render_ascii, Head, MergeOutcome, MuseError, MuseRepo, NoteKey, ObjectId,
    PathMap, Resolution, TrackDocument, VerifyConfig,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Name of the actor every scenario starts as.
pub const FIRST_ACTOR: &str = "alice";

/// Name of the shared remote in every actor's config.
pub const REMOTE: &str = "origin";

/// Clock advance before each commit.
const TICK: Duration = Duration::from_secs(60);

/// How the first actor's working tree is populated.
pub enum Setup {
    Files(HashMap<String, Vec<u8>>),
    Fixture(String),
}

/// One collaborator: a working tree with its own repository.
struct Actor {
    workspace: TestWorkspace,
    repo: MuseRepo,
}

/// Executes scenarios against real Muse repositories
///
/// Every actor's `origin` remote is the same bare repository, so pushes by
/// one actor are visible to the others' pulls.
pub struct ScenarioRunner {
    remote_dir: TempDir,
    actors: HashMap<String, Actor>,
    active: String,
    clock: MockClock,
    current_step: usize,
    last_outcome: Option<MergeOutcome>,
    marks: HashMap<String, ObjectId>,
}

impl ScenarioRunner {
    /// Create a new runner with the first actor's initial files
    pub fn new(setup: &Setup) -> Result<Self> {
        let workspace = match setup {
            Setup::Files(files) => TestWorkspace::with_files(files)?,
            Setup::Fixture(name) => TestWorkspace::from_fixture(name)?,
        };
        let remote_dir = TempDir::new().context("Failed to create remote directory")?;
        let clock = MockClock::new();

        let mut runner = Self {
            remote_dir,
            actors: HashMap::new(),
            active: FIRST_ACTOR.to_string(),
            clock,
            current_step: 0,
            last_outcome: None,
            marks: HashMap::new(),
        };
        runner.add_actor(FIRST_ACTOR, workspace)?;
        Ok(runner)
    }

    /// Get current step number
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Execute all steps in sequence
    pub fn execute(&mut self, steps: &[ScenarioStep]) -> Result<()> {
        for (i, step) in steps.iter().enumerate() {
            self.current_step = i;
            self.execute_step(step)
                .with_context(|| format!("Step {} ({}): {:?}", i, self.active, step))?;
        }
        Ok(())
    }

    /// Execute a single step
    fn execute_step(&mut self, step: &ScenarioStep) -> Result<()> {
        match step {
            ScenarioStep::WriteFile { path, content } => {
                self.actor()?.workspace.write_file(path, content)
            }
            ScenarioStep::RemoveFile { path } => self.actor()?.workspace.remove_file(path),

            ScenarioStep::Commit { message } => {
                self.clock.advance(TICK);
                self.repo()?.commit(message)?;
                Ok(())
            }
            ScenarioStep::Branch { name } => {
                self.repo()?.branch_create(name, None)?;
                Ok(())
            }
            ScenarioStep::Checkout { target, force } => {
                let target = self.revision(target);
                self.repo()?.checkout(&target, *force)?;
                Ok(())
            }
            ScenarioStep::CheckoutNew { name } => Ok(self.repo()?.checkout_new_branch(name)?),
            ScenarioStep::Merge { rev } => {
                let rev = self.revision(rev);
                let outcome = self.repo()?.merge(&rev)?;
                self.last_outcome = Some(outcome);
                Ok(())
            }
            ScenarioStep::Resolve { path, resolution } => self.handle_resolve(path, *resolution),
            ScenarioStep::MergeContinue { message } => {
                self.clock.advance(TICK);
                self.repo()?.merge_continue(message.as_deref())?;
                Ok(())
            }
            ScenarioStep::MergeAbort => Ok(self.repo()?.merge_abort()?),

            ScenarioStep::Push { branch, force } => {
                self.repo()?.push(REMOTE, branch.as_deref(), *force)?;
                Ok(())
            }
            ScenarioStep::Pull { branch } => {
                let report = self.repo()?.pull(REMOTE, branch)?;
                self.last_outcome = Some(report.outcome);
                Ok(())
            }

            ScenarioStep::SwitchActor { name } => self.handle_switch_actor(name),

            ScenarioStep::Mark { name } => self.handle_mark(name),
            ScenarioStep::Wait { duration } => {
                self.clock.advance(*duration);
                Ok(())
            }

            ScenarioStep::CorruptObject { path } => self.handle_corrupt(path, false),
            ScenarioStep::DeleteObject { path } => self.handle_corrupt(path, true),
            ScenarioStep::ExpectError { step, code } => self.handle_expect_error(step, code),

            ScenarioStep::Assert { assertion } => self.handle_assertion(assertion),
        }
    }

    // ===== Actors =====

    fn add_actor(&mut self, name: &str, workspace: TestWorkspace) -> Result<()> {
        let mut repo = workspace
            .init_repo()?
            .with_time_provider(self.clock.as_provider());

        let url = self.remote_path();
        let url = url
            .to_str()
            .ok_or_else(|| anyhow!("remote path is not UTF-8: {}", url.display()))?;
        repo.remote_add(REMOTE, url)?;

        self.actors
            .insert(name.to_string(), Actor { workspace, repo });
        Ok(())
    }

    fn remote_path(&self) -> PathBuf {
        self.remote_dir.path().join("origin.muse")
    }

    fn actor(&self) -> Result<&Actor> {
        self.actors
            .get(&self.active)
            .ok_or_else(|| anyhow!("No actor named '{}'", self.active))
    }

    fn repo(&self) -> Result<&MuseRepo> {
        Ok(&self.actor()?.repo)
    }

    fn handle_switch_actor(&mut self, name: &str) -> Result<()> {
        if !self.actors.contains_key(name) {
            self.add_actor(name, TestWorkspace::empty()?)?;
        }
        self.active = name.to_string();
        Ok(())
    }

    // ===== Step handlers =====

    fn handle_resolve(&mut self, path: &str, resolution: Resolution) -> Result<()> {
        self.repo()?.resolve(path, resolution)?;
        Ok(())
    }

    fn handle_mark(&mut self, name: &str) -> Result<()> {
        let head = self
            .repo()?
            .head_commit()?
            .ok_or_else(|| anyhow!("Cannot mark '{}': no commits yet", name))?;
        self.marks.insert(name.to_string(), head);
        Ok(())
    }

    /// Damages the object file behind a path in HEAD's tree.
    fn handle_corrupt(&mut self, path: &str, delete: bool) -> Result<()> {
        let repo = self.repo()?;
        let id = self
            .head_paths(repo)?
            .get(path)
            .copied()
            .ok_or_else(|| anyhow!("'{}' is not in HEAD", path))?;
        let file = repo.store().root().join(id.shard()).join(id.as_hex());

        if delete {
            fs::remove_file(&file)?;
        } else {
            fs::write(&file, b"not a zstd frame")?;
        }
        Ok(())
    }

    fn handle_expect_error(&mut self, step: &ScenarioStep, code: &str) -> Result<()> {
        let err = match self.execute_step(step) {
            Ok(()) => return Err(anyhow!("Expected error '{}', but the step succeeded", code)),
            Err(err) => err,
        };

        let actual = err
            .downcast_ref::<MuseError>()
            .map(|e| e.code())
            .ok_or_else(|| anyhow!("Expected error '{}', got non-Muse error: {:#}", code, err))?;

        if actual != code {
            return Err(anyhow!("Expected error '{}', got '{}': {}", code, actual, err));
        }
        Ok(())
    }

    // ===== Assertion handlers =====

    fn handle_assertion(&self, assertion: &Assertion) -> Result<()> {
        let repo = self.repo()?;

        match assertion {
            Assertion::CommitCount(expected) => {
                let count = self.count_commits(repo)?;
                if count != *expected {
                    return Err(anyhow!("Expected {} commits, found {}", expected, count));
                }
                Ok(())
            }
            Assertion::HeadMessageContains(text) => {
                let commit = repo.store().get_commit(self.head_id(repo)?)?;
                if !commit.message.contains(text.as_str()) {
                    return Err(anyhow!(
                        "HEAD message {:?} does not contain {:?}",
                        commit.message,
                        text
                    ));
                }
                Ok(())
            }
            Assertion::HeadParents(expected) => {
                let commit = repo.store().get_commit(self.head_id(repo)?)?;
                if commit.parents.len() != *expected {
                    return Err(anyhow!(
                        "Expected {} parents, HEAD has {}",
                        expected,
                        commit.parents.len()
                    ));
                }
                Ok(())
            }
            Assertion::HeadAt(mark) => {
                let want = self.mark_id(mark)?;
                let head = self.head_id(repo)?;
                if head != want {
                    return Err(anyhow!(
                        "HEAD is {}, expected mark '{}' ({})",
                        head.short(),
                        mark,
                        want.short()
                    ));
                }
                Ok(())
            }
            Assertion::SameGraphAs(other) => self.assert_same_graph(repo, other),

            Assertion::FileInHead { path } => {
                if !self.head_paths(repo)?.contains_key(path) {
                    return Err(anyhow!("File '{}' not found in HEAD", path));
                }
                Ok(())
            }
            Assertion::FileNotInHead { path } => {
                if self.head_paths(repo)?.contains_key(path) {
                    return Err(anyhow!("File '{}' unexpectedly found in HEAD", path));
                }
                Ok(())
            }
            Assertion::HeadJson {
                path,
                pointer,
                value,
            } => {
                let doc = self.head_document(repo, path)?;
                expect_json(&doc, path, pointer, value)
            }
            Assertion::HeadBlobMatches { path, mark } => {
                let commit = repo.store().get_commit(self.mark_id(mark)?)?;
                let at_mark = flatten_tree(repo.store(), commit.tree)?;
                let ours = self.head_paths(repo)?;
                if ours.get(path) != at_mark.get(path) || ours.get(path).is_none() {
                    return Err(anyhow!(
                        "'{}' in HEAD differs from mark '{}'",
                        path,
                        mark
                    ));
                }
                Ok(())
            }
            Assertion::HeadHasNote {
                path,
                region,
                pitch,
                start,
            } => {
                let id = self
                    .head_paths(repo)?
                    .get(path)
                    .copied()
                    .ok_or_else(|| anyhow!("'{}' is not in HEAD", path))?;
                let track = TrackDocument::from_json(&repo.store().get_blob(id)?)?;
                let found = track
                    .regions
                    .iter()
                    .find(|r| r.id == *region)
                    .and_then(|r| {
                        r.note(NoteKey {
                            pitch: *pitch,
                            start: *start,
                        })
                    })
                    .is_some();
                if !found {
                    return Err(anyhow!(
                        "No note {} @ {} in region '{}' of '{}'",
                        pitch,
                        start,
                        region,
                        path
                    ));
                }
                Ok(())
            }

            Assertion::WorkingFileExists { path } => {
                if !self.actor()?.workspace.file_exists(path) {
                    return Err(anyhow!("'{}' missing from the working tree", path));
                }
                Ok(())
            }
            Assertion::WorkingFileMissing { path } => {
                if self.actor()?.workspace.file_exists(path) {
                    return Err(anyhow!("'{}' unexpectedly in the working tree", path));
                }
                Ok(())
            }
            Assertion::WorkingJson {
                path,
                pointer,
                value,
            } => {
                let bytes = self.actor()?.workspace.read_file(path)?;
                let doc: Value = serde_json::from_slice(&bytes)?;
                expect_json(&doc, path, pointer, value)
            }
            Assertion::Clean => {
                let status = repo.status()?;
                if !status.is_clean() {
                    let paths: Vec<_> = status.changes.iter().map(|c| c.path.as_str()).collect();
                    return Err(anyhow!("Working tree has drift: {:?}", paths));
                }
                Ok(())
            }
            Assertion::DriftOn(expected) => {
                let paths: Vec<String> = repo
                    .status()?
                    .changes
                    .into_iter()
                    .map(|c| c.path)
                    .collect();
                if sorted(&paths) != sorted(expected) {
                    return Err(anyhow!("Expected drift on {:?}, found {:?}", expected, paths));
                }
                Ok(())
            }

            Assertion::OnBranch(name) => match repo.head()? {
                Head::Branch(current) if current == *name => Ok(()),
                other => Err(anyhow!("Expected branch '{}', HEAD is {:?}", name, other)),
            },
            Assertion::Detached => match repo.head()? {
                Head::Detached(_) => Ok(()),
                other => Err(anyhow!("Expected detached HEAD, got {:?}", other)),
            },
            Assertion::BranchExists(name) => {
                if !repo.branches()?.iter().any(|(b, _)| b == name) {
                    return Err(anyhow!("Branch '{}' does not exist", name));
                }
                Ok(())
            }

            Assertion::MergeInProgress => match repo.merge_state()? {
                Some(_) => Ok(()),
                None => Err(anyhow!("Expected a pending merge")),
            },
            Assertion::NoMergeInProgress => match repo.merge_state()? {
                Some(state) => Err(anyhow!(
                    "Unexpected pending merge with {}",
                    state.theirs
                )),
                None => Ok(()),
            },
            Assertion::ConflictPaths(expected) => {
                let state = repo
                    .merge_state()?
                    .ok_or_else(|| anyhow!("Expected a pending merge"))?;
                if sorted(&state.conflict_paths) != sorted(expected) {
                    return Err(anyhow!(
                        "Expected unresolved {:?}, found {:?}",
                        expected,
                        state.conflict_paths
                    ));
                }
                Ok(())
            }
            Assertion::LastOutcome(expected) => {
                let actual = match &self.last_outcome {
                    Some(MergeOutcome::UpToDate) => OutcomeMatch::UpToDate,
                    Some(MergeOutcome::FastForward(_)) => OutcomeMatch::FastForward,
                    Some(MergeOutcome::Merged(_)) => OutcomeMatch::Merged,
                    Some(MergeOutcome::Conflicted(_)) => OutcomeMatch::Conflicted,
                    None => return Err(anyhow!("No merge or pull has run")),
                };
                if actual != *expected {
                    return Err(anyhow!("Expected outcome {:?}, got {:?}", expected, actual));
                }
                Ok(())
            }

            Assertion::Healthy => {
                let report = repo.verify(full_verify())?;
                if report.has_issues() {
                    return Err(anyhow!("{}", report.summary()));
                }
                Ok(())
            }
            Assertion::CorruptedObjects(expected) => {
                let report = repo.verify(full_verify())?;
                if report.objects_corrupted.len() != *expected {
                    return Err(anyhow!(
                        "Expected {} corrupted objects: {}",
                        expected,
                        report.summary()
                    ));
                }
                Ok(())
            }
            Assertion::MissingObjects(expected) => {
                let report = repo.verify(full_verify())?;
                if report.objects_missing.len() != *expected {
                    return Err(anyhow!(
                        "Expected {} missing objects: {}",
                        expected,
                        report.summary()
                    ));
                }
                Ok(())
            }

            Assertion::Custom(check) => check(repo),
        }
    }

    fn assert_same_graph(&self, repo: &MuseRepo, other: &str) -> Result<()> {
        let theirs = &self
            .actors
            .get(other)
            .ok_or_else(|| anyhow!("No actor named '{}'", other))?
            .repo;

        let no_labels = BTreeMap::new();
        let ours = render_ascii(&repo.log(None, None)?, &no_labels);
        let theirs = render_ascii(&theirs.log(None, None)?, &no_labels);
        if ours != theirs {
            return Err(anyhow!(
                "Commit graphs differ:\n--- {}\n{}\n--- {}\n{}",
                self.active,
                ours,
                other,
                theirs
            ));
        }
        Ok(())
    }

    // ===== Helper methods =====

    fn head_id(&self, repo: &MuseRepo) -> Result<ObjectId> {
        repo.head_commit()?
            .ok_or_else(|| anyhow!("HEAD has no commits"))
    }

    fn mark_id(&self, mark: &str) -> Result<ObjectId> {
        self.marks
            .get(mark)
            .copied()
            .ok_or_else(|| anyhow!("Unknown mark '{}'", mark))
    }

    /// A mark name becomes its commit id; anything else passes through
    /// for the repository to resolve.
    fn revision(&self, rev: &str) -> String {
        match self.marks.get(rev) {
            Some(id) => id.as_hex(),
            None => rev.to_string(),
        }
    }

    fn head_paths(&self, repo: &MuseRepo) -> Result<PathMap> {
        match repo.head_commit()? {
            Some(id) => {
                let commit = repo.store().get_commit(id)?;
                Ok(flatten_tree(repo.store(), commit.tree)?)
            }
            None => Ok(PathMap::new()),
        }
    }

    fn head_document(&self, repo: &MuseRepo, path: &str) -> Result<Value> {
        let id = self
            .head_paths(repo)?
            .get(path)
            .copied()
            .ok_or_else(|| anyhow!("'{}' is not in HEAD", path))?;
        Ok(serde_json::from_slice(&repo.store().get_blob(id)?)?)
    }

    fn count_commits(&self, repo: &MuseRepo) -> Result<usize> {
        let mut visited = HashSet::new();
        let mut stack: Vec<ObjectId> = repo.head_commit()?.into_iter().collect();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            stack.extend(repo.store().get_commit(id)?.parents);
        }

        Ok(visited.len())
    }
}

fn full_verify() -> VerifyConfig {
    VerifyConfig {
        check_objects: true,
        ..VerifyConfig::default()
    }
}

fn expect_json(doc: &Value, path: &str, pointer: &str, expected: &Value) -> Result<()> {
    match doc.pointer(pointer) {
        Some(actual) if actual == expected => Ok(()),
        actual => Err(anyhow!(
            "{}{}: expected {}, found {:?}",
            path,
            pointer,
            expected,
            actual
        )),
    }
}

fn sorted(paths: &[String]) -> Vec<String> {
    let mut paths = paths.to_vec();
    paths.sort();
    paths
}

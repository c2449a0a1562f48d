use super::assertions::{Assertion, OutcomeMatch};
use super::runner::{ScenarioRunner, Setup};
use super::steps::ScenarioStep;
use muse_core::Resolution;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Fluent DSL for building test scenarios
pub struct Scenario {
    name: String,
    setup: Setup,
    steps: Vec<ScenarioStep>,
}

impl Scenario {
    /// Create a new scenario with the given name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            setup: Setup::Files(HashMap::new()),
            steps: Vec::new(),
        }
    }

    // ===== Initial setup =====

    /// Add a single file to the first actor's initial workspace
    pub fn with_file(mut self, path: &str, content: &[u8]) -> Self {
        if let Setup::Files(files) = &mut self.setup {
            files.insert(path.to_string(), content.to_vec());
        }
        self
    }

    /// Start the first actor's workspace from a fixture directory
    pub fn from_fixture(mut self, fixture_name: &str) -> Self {
        self.setup = Setup::Fixture(fixture_name.to_string());
        self
    }

    // ===== Working tree =====

    /// Write a file into the active actor's working tree
    pub fn write(mut self, path: &str, content: &[u8]) -> Self {
        self.steps.push(ScenarioStep::WriteFile {
            path: path.to_string(),
            content: content.to_vec(),
        });
        self
    }

    /// Delete a file from the working tree
    pub fn remove(mut self, path: &str) -> Self {
        self.steps.push(ScenarioStep::RemoveFile {
            path: path.to_string(),
        });
        self
    }

    // ===== History =====

    /// Commit the working tree
    pub fn commit(mut self, message: &str) -> Self {
        self.steps.push(ScenarioStep::Commit {
            message: message.to_string(),
        });
        self
    }

    /// Write one file, then commit it
    pub fn commit_file(self, path: &str, content: &[u8], message: &str) -> Self {
        self.write(path, content).commit(message)
    }

    /// Create a branch at HEAD without switching
    pub fn branch(mut self, name: &str) -> Self {
        self.steps.push(ScenarioStep::Branch {
            name: name.to_string(),
        });
        self
    }

    /// Check out a branch, revision, or mark
    pub fn checkout(mut self, target: &str) -> Self {
        self.steps.push(ScenarioStep::Checkout {
            target: target.to_string(),
            force: false,
        });
        self
    }

    /// Check out, discarding uncommitted changes
    pub fn force_checkout(mut self, target: &str) -> Self {
        self.steps.push(ScenarioStep::Checkout {
            target: target.to_string(),
            force: true,
        });
        self
    }

    /// Create a branch at HEAD and switch to it
    pub fn checkout_new(mut self, name: &str) -> Self {
        self.steps.push(ScenarioStep::CheckoutNew {
            name: name.to_string(),
        });
        self
    }

    /// Merge a branch, revision, or mark into HEAD
    pub fn merge(mut self, rev: &str) -> Self {
        self.steps.push(ScenarioStep::Merge {
            rev: rev.to_string(),
        });
        self
    }

    /// Resolve a conflicted path with the current branch's version
    pub fn resolve_ours(mut self, path: &str) -> Self {
        self.steps.push(ScenarioStep::Resolve {
            path: path.to_string(),
            resolution: Resolution::Ours,
        });
        self
    }

    /// Resolve a conflicted path with the incoming version
    pub fn resolve_theirs(mut self, path: &str) -> Self {
        self.steps.push(ScenarioStep::Resolve {
            path: path.to_string(),
            resolution: Resolution::Theirs,
        });
        self
    }

    /// Commit the resolved merge
    pub fn merge_continue(mut self) -> Self {
        self.steps.push(ScenarioStep::MergeContinue { message: None });
        self
    }

    /// Abandon the pending merge
    pub fn merge_abort(mut self) -> Self {
        self.steps.push(ScenarioStep::MergeAbort);
        self
    }

    // ===== Sync =====

    /// Push the current branch to the shared remote
    pub fn push(mut self) -> Self {
        self.steps.push(ScenarioStep::Push {
            branch: None,
            force: false,
        });
        self
    }

    /// Push a named branch
    pub fn push_branch(mut self, branch: &str, force: bool) -> Self {
        self.steps.push(ScenarioStep::Push {
            branch: Some(branch.to_string()),
            force,
        });
        self
    }

    /// Pull a branch from the shared remote
    pub fn pull(mut self, branch: &str) -> Self {
        self.steps.push(ScenarioStep::Pull {
            branch: branch.to_string(),
        });
        self
    }

    // ===== Actors =====

    /// Act as another collaborator; created on first use with an empty
    /// repository pointed at the shared remote
    pub fn as_actor(mut self, name: &str) -> Self {
        self.steps.push(ScenarioStep::SwitchActor {
            name: name.to_string(),
        });
        self
    }

    // ===== Bookkeeping =====

    /// Remember the active actor's HEAD commit under a name
    pub fn mark(mut self, name: &str) -> Self {
        self.steps.push(ScenarioStep::Mark {
            name: name.to_string(),
        });
        self
    }

    /// Advance the shared clock
    pub fn wait(mut self, duration: Duration) -> Self {
        self.steps.push(ScenarioStep::Wait { duration });
        self
    }

    // ===== Failure simulation =====

    /// Overwrite the stored blob of a HEAD path with garbage
    pub fn corrupt_object(mut self, path: &str) -> Self {
        self.steps.push(ScenarioStep::CorruptObject {
            path: path.to_string(),
        });
        self
    }

    /// Delete the stored blob of a HEAD path
    pub fn delete_object(mut self, path: &str) -> Self {
        self.steps.push(ScenarioStep::DeleteObject {
            path: path.to_string(),
        });
        self
    }

    /// Run the previous step again, expecting it to fail with `code`
    ///
    /// The step is taken off the end of the scenario; use it right after
    /// the builder call that should fail.
    pub fn fails_with(mut self, code: &str) -> Self {
        if let Some(step) = self.steps.pop() {
            self.steps.push(ScenarioStep::ExpectError {
                step: Box::new(step),
                code: code.to_string(),
            });
        }
        self
    }

    // ===== Assertions =====

    /// Add a general assertion
    pub fn assert(mut self, assertion: Assertion) -> Self {
        self.steps.push(ScenarioStep::Assert { assertion });
        self
    }

    /// Assert specific commit count reachable from HEAD
    pub fn assert_commit_count(self, count: usize) -> Self {
        self.assert(Assertion::CommitCount(count))
    }

    /// Assert HEAD commit message contains text
    pub fn assert_head_contains(self, text: &str) -> Self {
        self.assert(Assertion::HeadMessageContains(text.to_string()))
    }

    /// Assert file is committed in HEAD
    pub fn assert_file_committed(self, path: &str) -> Self {
        self.assert(Assertion::FileInHead {
            path: path.to_string(),
        })
    }

    /// Assert a JSON value inside a HEAD document
    pub fn assert_head_json(self, path: &str, pointer: &str, value: Value) -> Self {
        self.assert(Assertion::HeadJson {
            path: path.to_string(),
            pointer: pointer.to_string(),
            value,
        })
    }

    /// Assert the working tree matches HEAD
    pub fn assert_clean(self) -> Self {
        self.assert(Assertion::Clean)
    }

    /// Assert HEAD is attached to a branch
    pub fn assert_on_branch(self, name: &str) -> Self {
        self.assert(Assertion::OnBranch(name.to_string()))
    }

    /// Assert the last merge or pull ended a certain way
    pub fn assert_outcome(self, outcome: OutcomeMatch) -> Self {
        self.assert(Assertion::LastOutcome(outcome))
    }

    // ===== Execution =====

    /// Execute the scenario and return results
    pub fn run(self) -> ScenarioResult {
        let mut runner = match ScenarioRunner::new(&self.setup) {
            Ok(r) => r,
            Err(e) => {
                return ScenarioResult {
                    name: self.name.clone(),
                    success: false,
                    steps_executed: 0,
                    failure_step: Some(0),
                    error: Some(format!("Failed to create runner: {:#}", e)),
                }
            }
        };

        match runner.execute(&self.steps) {
            Ok(()) => ScenarioResult {
                name: self.name,
                success: true,
                steps_executed: self.steps.len(),
                failure_step: None,
                error: None,
            },
            Err(e) => {
                let failure_step = runner.current_step();
                ScenarioResult {
                    name: self.name,
                    success: false,
                    steps_executed: failure_step,
                    failure_step: Some(failure_step),
                    error: Some(format!("{:?}", e)),
                }
            }
        }
    }
}

/// Result of running a scenario
#[derive(Debug)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub steps_executed: usize,
    pub failure_step: Option<usize>,
    pub error: Option<String>,
}

impl ScenarioResult {
    /// Unwrap the result, panicking if it failed
    pub fn unwrap(self) {
        if !self.success {
            panic!(
                "Scenario '{}' failed at step {}: {}",
                self.name,
                self.failure_step.unwrap_or(0),
                self.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
    }

    /// Expect the result to be successful
    pub fn expect(self, msg: &str) {
        if !self.success {
            panic!(
                "{}: Scenario '{}' failed at step {}: {}",
                msg,
                self.name,
                self.failure_step.unwrap_or(0),
                self.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
    }
}

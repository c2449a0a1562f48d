use crate::harness::docs::{self, BAR};
use crate::harness::{Assertion, Scenario};
use serde_json::json;

fn tempo_is(tempo: u32) -> Assertion {
    Assertion::WorkingJson {
        path: "project.json".into(),
        pointer: "/tempo".into(),
        value: json!(tempo),
    }
}

#[test]
fn test_checkout_refuses_uncommitted_changes() {
    Scenario::new("checkout_refuses_uncommitted_changes")
        .commit_file("project.json", &docs::project(120), "Base")
        .branch("alt")
        .write("project.json", &docs::project(90))
        .checkout("alt")
        .fails_with("drift_detected")
        .assert_on_branch("main")
        .assert(Assertion::DriftOn(vec!["project.json".into()]))
        .assert(tempo_is(90))
        // Same commit, still refused
        .checkout("main")
        .fails_with("drift_detected")
        .force_checkout("alt")
        .assert_on_branch("alt")
        .assert(tempo_is(120))
        .assert_clean()
        .run()
        .expect("scenario should pass");
}

#[test]
fn test_new_file_is_drift() {
    let pad = docs::track("pad", vec![docs::region("swell", 0, BAR, &[(48, 0)])]);
    Scenario::new("new_file_is_drift")
        .commit_file("project.json", &docs::project(120), "Base")
        .branch("alt")
        .write("tracks/pad.json", &pad)
        .assert(Assertion::DriftOn(vec!["tracks/pad.json".into()]))
        .checkout("alt")
        .fails_with("drift_detected")
        .assert(Assertion::WorkingFileExists {
            path: "tracks/pad.json".into(),
        })
        .force_checkout("alt")
        .assert(Assertion::WorkingFileMissing {
            path: "tracks/pad.json".into(),
        })
        .assert_clean()
        .run()
        .unwrap();
}

#[test]
fn test_new_branch_carries_work_in_progress() {
    Scenario::new("new_branch_carries_work_in_progress")
        .commit_file("project.json", &docs::project(120), "Base")
        .write("project.json", &docs::project(140))
        .checkout_new("faster")
        .assert_on_branch("faster")
        .assert(Assertion::DriftOn(vec!["project.json".into()]))
        .commit("Push the tempo")
        .assert_commit_count(2)
        .checkout("main")
        .assert(tempo_is(120))
        .assert_commit_count(1)
        .checkout("faster")
        .assert(tempo_is(140))
        .run()
        .unwrap();
}

#[test]
fn test_rejected_targets_leave_tree_alone() {
    Scenario::new("rejected_targets_leave_tree_alone")
        .commit_file("project.json", &docs::project(120), "Base")
        .checkout("no-such-branch")
        .fails_with("unknown_revision")
        .checkout_new("..sneaky")
        .fails_with("invalid_branch_name")
        .branch("HEAD")
        .fails_with("invalid_branch_name")
        .branch("main")
        .fails_with("branch_exists")
        .assert_on_branch("main")
        .assert_clean()
        .run()
        .unwrap();
}

use crate::harness::docs::{self, BAR};
use crate::harness::{Assertion, OutcomeMatch, Scenario};
use serde_json::json;

const KEYS: &str = "tracks/keys.json";

/// `main` and `feature` both change bar 1 of the keys verse from a common
/// base: main adds E4, feature adds G4.
fn conflicting_branches(name: &str) -> Scenario {
    Scenario::new(name)
        .write("project.json", &docs::project(120))
        .write(KEYS, &docs::keys(&[(60, 0)]))
        .commit("Base")
        .mark("base")
        .checkout_new("feature")
        .commit_file(KEYS, &docs::keys(&[(60, 0), (67, 0)]), "Theirs: add G")
        .mark("theirs")
        .checkout("main")
        .commit_file(KEYS, &docs::keys(&[(60, 0), (64, 0)]), "Ours: add E")
        .mark("ours")
}

#[test]
fn test_conflict_resolved_with_ours() {
    conflicting_branches("conflict_resolved_with_ours")
        .merge("feature")
        .assert_outcome(OutcomeMatch::Conflicted)
        .assert(Assertion::MergeInProgress)
        .assert(Assertion::ConflictPaths(vec![KEYS.into()]))
        // Nothing moves until the merge is concluded
        .assert(Assertion::HeadAt("ours".into()))
        .assert_clean()
        .resolve_ours(KEYS)
        .assert(Assertion::ConflictPaths(vec![]))
        .merge_continue()
        .assert(Assertion::NoMergeInProgress)
        .assert(Assertion::HeadParents(2))
        .assert_commit_count(4)
        .assert(Assertion::HeadBlobMatches {
            path: KEYS.into(),
            mark: "ours".into(),
        })
        .assert(Assertion::HeadHasNote {
            path: KEYS.into(),
            region: "verse".into(),
            pitch: 64,
            start: 0,
        })
        .assert_clean()
        .run()
        .expect("scenario should pass");
}

#[test]
fn test_conflict_resolved_with_theirs() {
    conflicting_branches("conflict_resolved_with_theirs")
        .merge("feature")
        .resolve_theirs(KEYS)
        .merge_continue()
        .assert(Assertion::HeadBlobMatches {
            path: KEYS.into(),
            mark: "theirs".into(),
        })
        .assert(Assertion::HeadHasNote {
            path: KEYS.into(),
            region: "verse".into(),
            pitch: 67,
            start: 0,
        })
        .assert(Assertion::WorkingJson {
            path: KEYS.into(),
            pointer: "/regions/0/notes/1/pitch".into(),
            value: json!(67),
        })
        .assert_head_contains("feature")
        .run()
        .unwrap();
}

#[test]
fn test_pending_merge_blocks_other_work() {
    conflicting_branches("pending_merge_blocks_other_work")
        .merge("feature")
        .merge_continue()
        .fails_with("unresolved_conflicts")
        .commit("sneak in")
        .fails_with("merge_in_progress")
        .checkout("feature")
        .fails_with("merge_in_progress")
        .merge("feature")
        .fails_with("merge_in_progress")
        .resolve_ours("project.json")
        .fails_with("not_in_conflict")
        .assert(Assertion::ConflictPaths(vec![KEYS.into()]))
        .run()
        .unwrap();
}

#[test]
fn test_abort_restores_pre_merge_state() {
    conflicting_branches("abort_restores_pre_merge_state")
        .merge("feature")
        .merge_abort()
        .assert(Assertion::NoMergeInProgress)
        .assert(Assertion::HeadAt("ours".into()))
        // Base and Ours; the feature tip is not an ancestor
        .assert_commit_count(2)
        .assert_clean()
        .merge_abort()
        .fails_with("no_merge_in_progress")
        .run()
        .unwrap();
}

#[test]
fn test_edits_in_different_bars_merge_cleanly() {
    Scenario::new("edits_in_different_bars_merge_cleanly")
        .commit_file(KEYS, &docs::keys(&[(60, 0)]), "Base")
        .checkout_new("chorus-idea")
        .commit_file(KEYS, &docs::keys(&[(60, 0), (72, 2 * BAR)]), "Bar 3 lift")
        .checkout("main")
        .commit_file(KEYS, &docs::keys(&[(60, 0), (64, 0)]), "Bar 1 third")
        .merge("chorus-idea")
        .assert_outcome(OutcomeMatch::Merged)
        .assert(Assertion::HeadHasNote {
            path: KEYS.into(),
            region: "verse".into(),
            pitch: 64,
            start: 0,
        })
        .assert(Assertion::HeadHasNote {
            path: KEYS.into(),
            region: "verse".into(),
            pitch: 72,
            start: 2 * BAR,
        })
        .assert(Assertion::HeadParents(2))
        .assert_clean()
        .run()
        .unwrap();
}

#[test]
fn test_fast_forward_and_up_to_date() {
    Scenario::new("fast_forward_and_up_to_date")
        .commit_file("project.json", &docs::project(120), "Base")
        .mark("base")
        .checkout_new("tempo")
        .commit_file("project.json", &docs::project(132), "Faster")
        .mark("faster")
        .checkout("main")
        .merge("tempo")
        .assert_outcome(OutcomeMatch::FastForward)
        .assert(Assertion::HeadAt("faster".into()))
        .assert_commit_count(2)
        .assert(Assertion::HeadParents(1))
        .assert(Assertion::WorkingJson {
            path: "project.json".into(),
            pointer: "/tempo".into(),
            value: json!(132),
        })
        .merge("tempo")
        .assert_outcome(OutcomeMatch::UpToDate)
        .merge("base")
        .assert_outcome(OutcomeMatch::UpToDate)
        .assert(Assertion::HeadAt("faster".into()))
        .run()
        .unwrap();
}

#[test]
fn test_merge_refuses_drift() {
    Scenario::new("merge_refuses_drift")
        .commit_file("project.json", &docs::project(120), "Base")
        .checkout_new("side")
        .commit_file(KEYS, &docs::keys(&[(60, 0)]), "Keys")
        .checkout("main")
        .write("project.json", &docs::project(100))
        .merge("side")
        .fails_with("drift_detected")
        .assert(Assertion::NoMergeInProgress)
        .assert(Assertion::DriftOn(vec!["project.json".into()]))
        .run()
        .unwrap();
}

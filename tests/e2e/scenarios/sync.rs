use crate::harness::docs::{self, BAR};
use crate::harness::{Assertion, OutcomeMatch, Scenario};
use serde_json::json;

const KEYS: &str = "tracks/keys.json";

/// Alice publishes two commits on `main`; Bob clones them with a pull.
fn shared_history(name: &str) -> Scenario {
    Scenario::new(name)
        .write("project.json", &docs::project(120))
        .write(KEYS, &docs::keys(&[(60, 0)]))
        .commit("Sketch")
        .commit_file(KEYS, &docs::keys(&[(60, 0), (64, 0)]), "Add the third")
        .push()
        .mark("published")
        .as_actor("bob")
        .pull("main")
}

#[test]
fn test_round_trip_reproduces_graph() {
    shared_history("round_trip_reproduces_graph")
        .assert_outcome(OutcomeMatch::FastForward)
        .assert_on_branch("main")
        .assert(Assertion::HeadAt("published".into()))
        .assert(Assertion::SameGraphAs("alice".into()))
        .assert_clean()
        .assert(Assertion::WorkingJson {
            path: "project.json".into(),
            pointer: "/tempo".into(),
            value: json!(120),
        })
        .assert(Assertion::Healthy)
        .commit_file("project.json", &docs::project(126), "Nudge tempo")
        .push()
        .as_actor("alice")
        .pull("main")
        .assert_outcome(OutcomeMatch::FastForward)
        .assert(Assertion::SameGraphAs("bob".into()))
        .assert_commit_count(3)
        .assert_head_contains("Nudge")
        .run()
        .expect("scenario should pass");
}

#[test]
fn test_repeated_push_and_pull_are_no_ops() {
    shared_history("repeated_push_and_pull_are_no_ops")
        .pull("main")
        .assert_outcome(OutcomeMatch::UpToDate)
        .as_actor("alice")
        .assert(Assertion::Custom(Box::new(|repo| {
            let report = repo.push("origin", None, false)?;
            anyhow::ensure!(report.up_to_date, "second push should be a no-op");
            anyhow::ensure!(report.objects_sent == 0, "sent {}", report.objects_sent);
            Ok(())
        })))
        .run()
        .unwrap();
}

#[test]
fn test_diverged_push_is_rejected_until_pull() {
    shared_history("diverged_push_is_rejected_until_pull")
        .commit_file(
            KEYS,
            &docs::keys(&[(60, 0), (64, 0), (72, 3 * BAR)]),
            "Bob: top note in bar 4",
        )
        .as_actor("alice")
        .commit_file("project.json", &docs::project(100), "Alice: slower")
        .push()
        .as_actor("bob")
        .push()
        .fails_with("remote_rejected")
        .pull("main")
        .assert_outcome(OutcomeMatch::Merged)
        .assert(Assertion::HeadParents(2))
        .assert_head_json("project.json", "/tempo", json!(100))
        .assert(Assertion::HeadHasNote {
            path: KEYS.into(),
            region: "verse".into(),
            pitch: 72,
            start: 3 * BAR,
        })
        .push()
        .mark("merged")
        .as_actor("alice")
        .pull("main")
        .assert_outcome(OutcomeMatch::FastForward)
        .assert(Assertion::HeadAt("merged".into()))
        .assert(Assertion::SameGraphAs("bob".into()))
        .assert_clean()
        .run()
        .unwrap();
}

#[test]
fn test_pull_conflict_goes_through_resolution() {
    shared_history("pull_conflict_goes_through_resolution")
        .commit_file(KEYS, &docs::keys(&[(60, 0), (64, 0), (67, 0)]), "Bob: G")
        .as_actor("alice")
        .commit_file(KEYS, &docs::keys(&[(60, 0), (64, 0), (69, 0)]), "Alice: A")
        .push()
        .as_actor("bob")
        .pull("main")
        .assert_outcome(OutcomeMatch::Conflicted)
        .assert(Assertion::ConflictPaths(vec![KEYS.into()]))
        .resolve_theirs(KEYS)
        .merge_continue()
        .assert(Assertion::HeadHasNote {
            path: KEYS.into(),
            region: "verse".into(),
            pitch: 69,
            start: 0,
        })
        .assert_head_contains("origin/main")
        .push()
        .as_actor("alice")
        .pull("main")
        .assert_outcome(OutcomeMatch::FastForward)
        .assert(Assertion::SameGraphAs("bob".into()))
        .run()
        .unwrap();
}

#[test]
fn test_drift_blocks_pull() {
    shared_history("drift_blocks_pull")
        .as_actor("alice")
        .commit_file("project.json", &docs::project(90), "Slower")
        .push()
        .as_actor("bob")
        .write("project.json", &docs::project(150))
        .pull("main")
        .fails_with("drift_detected")
        .assert(Assertion::HeadAt("published".into()))
        .assert(Assertion::DriftOn(vec!["project.json".into()]))
        .force_checkout("main")
        .pull("main")
        .assert_outcome(OutcomeMatch::FastForward)
        .assert(Assertion::SameGraphAs("alice".into()))
        .run()
        .unwrap();
}

#[test]
fn test_pull_into_other_branch_moves_ref_only() {
    shared_history("pull_into_other_branch_moves_ref_only")
        .checkout_new("sketch")
        .as_actor("alice")
        .commit_file("project.json", &docs::project(80), "Ballad")
        .push()
        .mark("ballad")
        .as_actor("bob")
        .pull("main")
        .assert_outcome(OutcomeMatch::FastForward)
        .assert_on_branch("sketch")
        .assert(Assertion::HeadAt("published".into()))
        .assert_clean()
        .checkout("main")
        .assert(Assertion::HeadAt("ballad".into()))
        .assert(Assertion::WorkingJson {
            path: "project.json".into(),
            pointer: "/tempo".into(),
            value: json!(80),
        })
        .run()
        .unwrap();
}

#[test]
fn test_force_push_replaces_remote_branch() {
    shared_history("force_push_replaces_remote_branch")
        .as_actor("alice")
        .commit_file("project.json", &docs::project(90), "Alice: slower")
        .push()
        .as_actor("bob")
        .commit_file("project.json", &docs::project(160), "Bob: faster")
        .mark("bob-tip")
        .push_branch("main", true)
        .as_actor("carol")
        .pull("main")
        .assert(Assertion::HeadAt("bob-tip".into()))
        .assert(Assertion::SameGraphAs("bob".into()))
        .pull("missing-branch")
        .fails_with("remote_rejected")
        .run()
        .unwrap();
}

use crate::harness::docs::{self, BAR};
use crate::harness::{Assertion, OutcomeMatch, Scenario};
use serde_json::json;

#[test]
fn test_branch_and_merge_disjoint_documents() {
    let bass = docs::track(
        "bass",
        vec![docs::region("intro", 0, 2 * BAR, &[(40, 0), (43, 960)])],
    );
    Scenario::new("branch_and_merge_disjoint_documents")
        .commit_file("project.json", &docs::project(120), "A: sketch")
        .checkout_new("experiment")
        .commit_file("tracks/bass.json", &bass, "B: add bass")
        .checkout("main")
        .assert(Assertion::WorkingFileMissing {
            path: "tracks/bass.json".into(),
        })
        .commit_file("project.json", &docs::project(110), "C: slow down")
        .merge("experiment")
        .assert_outcome(OutcomeMatch::Merged)
        .assert(Assertion::HeadParents(2))
        .assert_commit_count(4)
        .assert_head_json("project.json", "/tempo", json!(110))
        .assert_file_committed("tracks/bass.json")
        .assert(Assertion::WorkingFileExists {
            path: "tracks/bass.json".into(),
        })
        .assert_on_branch("main")
        .assert_clean()
        .run()
        .expect("scenario should pass");
}

#[test]
fn test_import_fixture_and_edit() {
    let groove = docs::track("drums", vec![docs::region("groove", 0, 4 * BAR, &[(36, 0)])]);
    Scenario::new("import_fixture_and_edit")
        .from_fixture("default")
        .commit("Initial import")
        .assert_commit_count(1)
        .assert_file_committed("project.json")
        .assert_file_committed("tracks/keys.json")
        .assert_file_committed("tracks/drums.json")
        .assert_clean()
        .write("tracks/drums.json", &groove)
        .assert(Assertion::DriftOn(vec!["tracks/drums.json".into()]))
        .commit("Sparser groove")
        .assert_commit_count(2)
        .assert_head_contains("Sparser")
        .assert_head_json("tracks/drums.json", "/regions/0/notes/0/pitch", json!(36))
        .assert_clean()
        .run()
        .unwrap();
}

#[test]
fn test_unchanged_tree_is_not_committed() {
    Scenario::new("unchanged_tree_is_not_committed")
        .commit("empty")
        .fails_with("nothing_to_commit")
        .commit_file("project.json", &docs::project(120), "First")
        .commit("Again")
        .fails_with("nothing_to_commit")
        .assert_commit_count(1)
        .run()
        .unwrap();
}

#[test]
fn test_removed_document_leaves_head() {
    Scenario::new("removed_document_leaves_head")
        .write("project.json", &docs::project(120))
        .write("tracks/keys.json", &docs::keys(&[(60, 0)]))
        .commit("Both")
        .remove("tracks/keys.json")
        .assert(Assertion::DriftOn(vec!["tracks/keys.json".into()]))
        .commit("Drop keys")
        .assert(Assertion::FileNotInHead {
            path: "tracks/keys.json".into(),
        })
        .assert_file_committed("project.json")
        .run()
        .unwrap();
}

#[test]
fn test_detached_checkout_of_older_commit() {
    Scenario::new("detached_checkout_of_older_commit")
        .commit_file("project.json", &docs::project(120), "First")
        .mark("first")
        .commit_file("project.json", &docs::project(96), "Second")
        .branch("keep")
        .checkout("keep")
        .assert_on_branch("keep")
        .checkout("main")
        .assert(Assertion::Custom(Box::new(|repo| {
            let first = repo.log(None, None)?.last().map(|e| e.id);
            let first = first.ok_or_else(|| anyhow::anyhow!("empty log"))?;
            repo.checkout(&first.as_hex()[..8], false)?;
            Ok(())
        })))
        .assert(Assertion::Detached)
        .assert(Assertion::HeadAt("first".into()))
        .assert(Assertion::WorkingJson {
            path: "project.json".into(),
            pointer: "/tempo".into(),
            value: json!(120),
        })
        .assert_clean()
        .run()
        .unwrap();
}

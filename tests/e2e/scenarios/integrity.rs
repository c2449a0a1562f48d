use crate::harness::docs;
use crate::harness::{Assertion, Scenario};

const KEYS: &str = "tracks/keys.json";

fn two_commits(name: &str) -> Scenario {
    Scenario::new(name)
        .from_fixture("default")
        .commit("Import")
        .commit_file(KEYS, &docs::keys(&[(60, 0), (62, 480)]), "Passing tone")
        .push()
}

#[test]
fn test_fresh_history_verifies() {
    two_commits("fresh_history_verifies")
        .assert(Assertion::Healthy)
        .as_actor("bob")
        .pull("main")
        .assert(Assertion::Healthy)
        .run()
        .unwrap();
}

#[test]
fn test_corrupted_blob_is_reported() {
    two_commits("corrupted_blob_is_reported")
        .corrupt_object(KEYS)
        .assert(Assertion::CorruptedObjects(1))
        .assert(Assertion::MissingObjects(0))
        // Status only hashes the working tree
        .assert_clean()
        .force_checkout("main")
        .fails_with("compression")
        .run()
        .unwrap();
}

#[test]
fn test_missing_blob_is_reported() {
    two_commits("missing_blob_is_reported")
        .delete_object(KEYS)
        .assert(Assertion::MissingObjects(1))
        .assert(Assertion::CorruptedObjects(0))
        .assert(Assertion::Custom(Box::new(|repo| {
            // The remote already has the tip; nothing is read locally
            let report = repo.push("origin", Some("main"), false)?;
            anyhow::ensure!(report.up_to_date, "expected an up-to-date push");
            Ok(())
        })))
        .run()
        .unwrap();
}

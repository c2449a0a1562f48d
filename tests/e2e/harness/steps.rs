use std::time::Duration;

use muse_core::Resolution;

use super::assertions::Assertion;

/// All possible actions in a test scenario
#[derive(Debug)]
pub enum ScenarioStep {
    // Working tree edits
    WriteFile {
        path: String,
        content: Vec<u8>,
    },
    RemoveFile {
        path: String,
    },

    // Local history
    Commit {
        message: String,
    },
    Branch {
        name: String,
    },
    Checkout {
        target: String,
        force: bool,
    },
    CheckoutNew {
        name: String,
    },
    Merge {
        rev: String,
    },
    Resolve {
        path: String,
        resolution: Resolution,
    },
    MergeContinue {
        message: Option<String>,
    },
    MergeAbort,

    // Sync with the shared remote
    Push {
        branch: Option<String>,
        force: bool,
    },
    Pull {
        branch: String,
    },

    // Collaboration
    SwitchActor {
        name: String,
    },

    // Bookkeeping
    Mark {
        name: String,
    },
    Wait {
        duration: Duration,
    },

    // Failure simulation
    CorruptObject {
        path: String,
    },
    DeleteObject {
        path: String,
    },
    ExpectError {
        step: Box<ScenarioStep>,
        code: String,
    },

    // Assertions (can be interspersed)
    Assert {
        assertion: Assertion,
    },
}

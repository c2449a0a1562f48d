use anyhow::Result;
use muse_core::MuseRepo;
use serde_json::Value;

/// Declarative assertions on the active actor's repository
pub enum Assertion {
    // History
    CommitCount(usize),
    HeadMessageContains(String),
    HeadParents(usize),
    HeadAt(String),
    SameGraphAs(String),

    // HEAD tree
    FileInHead {
        path: String,
    },
    FileNotInHead {
        path: String,
    },
    HeadJson {
        path: String,
        pointer: String,
        value: Value,
    },
    HeadBlobMatches {
        path: String,
        mark: String,
    },
    HeadHasNote {
        path: String,
        region: String,
        pitch: u8,
        start: u32,
    },

    // Working tree
    WorkingFileExists {
        path: String,
    },
    WorkingFileMissing {
        path: String,
    },
    WorkingJson {
        path: String,
        pointer: String,
        value: Value,
    },
    Clean,
    DriftOn(Vec<String>),

    // Refs
    OnBranch(String),
    Detached,
    BranchExists(String),

    // Merges
    MergeInProgress,
    NoMergeInProgress,
    ConflictPaths(Vec<String>),
    LastOutcome(OutcomeMatch),

    // Integrity
    Healthy,
    CorruptedObjects(usize),
    MissingObjects(usize),

    // Custom (takes the active repository)
    Custom(Box<dyn Fn(&MuseRepo) -> Result<()> + Send + Sync>),
}

impl std::fmt::Debug for Assertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CommitCount(n) => write!(f, "CommitCount({})", n),
            Self::HeadMessageContains(s) => write!(f, "HeadMessageContains({:?})", s),
            Self::HeadParents(n) => write!(f, "HeadParents({})", n),
            Self::HeadAt(mark) => write!(f, "HeadAt({:?})", mark),
            Self::SameGraphAs(actor) => write!(f, "SameGraphAs({:?})", actor),
            Self::FileInHead { path } => write!(f, "FileInHead {{ path: {:?} }}", path),
            Self::FileNotInHead { path } => write!(f, "FileNotInHead {{ path: {:?} }}", path),
            Self::HeadJson {
                path,
                pointer,
                value,
            } => write!(
                f,
                "HeadJson {{ path: {:?}, pointer: {:?}, value: {} }}",
                path, pointer, value
            ),
            Self::HeadBlobMatches { path, mark } => {
                write!(f, "HeadBlobMatches {{ path: {:?}, mark: {:?} }}", path, mark)
            }
            Self::HeadHasNote {
                path,
                region,
                pitch,
                start,
            } => write!(
                f,
                "HeadHasNote {{ path: {:?}, region: {:?}, pitch: {}, start: {} }}",
                path, region, pitch, start
            ),
            Self::WorkingFileExists { path } => {
                write!(f, "WorkingFileExists {{ path: {:?} }}", path)
            }
            Self::WorkingFileMissing { path } => {
                write!(f, "WorkingFileMissing {{ path: {:?} }}", path)
            }
            Self::WorkingJson {
                path,
                pointer,
                value,
            } => write!(
                f,
                "WorkingJson {{ path: {:?}, pointer: {:?}, value: {} }}",
                path, pointer, value
            ),
            Self::Clean => write!(f, "Clean"),
            Self::DriftOn(paths) => write!(f, "DriftOn({:?})", paths),
            Self::OnBranch(name) => write!(f, "OnBranch({:?})", name),
            Self::Detached => write!(f, "Detached"),
            Self::BranchExists(name) => write!(f, "BranchExists({:?})", name),
            Self::MergeInProgress => write!(f, "MergeInProgress"),
            Self::NoMergeInProgress => write!(f, "NoMergeInProgress"),
            Self::ConflictPaths(paths) => write!(f, "ConflictPaths({:?})", paths),
            Self::LastOutcome(m) => write!(f, "LastOutcome({:?})", m),
            Self::Healthy => write!(f, "Healthy"),
            Self::CorruptedObjects(n) => write!(f, "CorruptedObjects({})", n),
            Self::MissingObjects(n) => write!(f, "MissingObjects({})", n),
            Self::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}

/// Match against the outcome of the last merge or pull
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutcomeMatch {
    UpToDate,
    FastForward,
    Merged,
    Conflicted,
}

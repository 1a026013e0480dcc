use serde::{Deserialize, Serialize};

/// What an ingestion job operates on. A tagged enum rather than an opaque
/// blob so worker dispatch stays exhaustive; new kinds get a new variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobPayload {
    /// A document artifact on disk, referenced by path. The path must stay
    /// readable for the job's lifetime; file storage guarantees that once
    /// submission has happened.
    File { path: String },
}

impl JobPayload {
    pub fn file(path: impl Into<String>) -> Self {
        JobPayload::File { path: path.into() }
    }

    pub fn artifact_path(&self) -> &str {
        match self {
            JobPayload::File { path } => path,
        }
    }
}

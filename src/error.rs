use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("storage unavailable for {}: {source}", path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("short {op}: {actual} of {expected} bytes")]
    ShortIo {
        op: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("failed to allocate a chunk buffer of {samples} samples")]
    Allocation { samples: usize },

    #[error("corrupt container {}: {reason}", path.display())]
    CorruptContainer { path: PathBuf, reason: String },

    #[error("a {active} session is already active")]
    SessionBusy { active: &'static str },

    #[error("audio error: {0}")]
    Audio(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RecorderError>;

mod process;

use thiserror::Error;

pub use process::ProcessRunner;

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Exit code, or -1 when the process was killed by a signal.
    Exited(i32),
    /// Stopped because shutdown was requested.
    Cancelled,
}

impl ProcessOutcome {
    pub fn success(self) -> bool {
        self == ProcessOutcome::Exited(0)
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("Failed waiting for {program}: {source}")]
    Wait {
        program: String,
        source: std::io::Error,
    },
}

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error carried back to `main`.
///
/// Exit codes:
/// - 2: configuration / usage (bad flags, missing environment)
/// - 3: input (unreadable or malformed sample / profile files)
/// - 4: runtime (I/O, collective communication, serial step failures)
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(2, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(4, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Errors surfaced at the imaging-backend boundary of a single step.
///
/// This is the only error category the per-galaxy loop recovers from; anything
/// else (panics included) propagates.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("imaging backend failed during {stage}: {message}")]
    Backend { stage: &'static str, message: String },

    #[error("missing input {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl StepError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StepError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<StepError> for AppError {
    fn from(err: StepError) -> Self {
        AppError::new(4, err.to_string())
    }
}

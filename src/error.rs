//! Pipeline error type.
//!
//! Every failure carries the process exit code it should map to:
//!
//! - `2`: configuration / usage / local filesystem problems
//! - `3`: not enough usable observations for a test or estimator
//! - `4`: external data source unreachable or returned garbage
//!
//! Retrieval errors abort the run; the orchestrator never continues with a
//! partial panel.

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

    /// Configuration, usage, or local file I/O failure.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(2, message)
    }

    /// Too few usable observations to run a test or estimator.
    pub fn insufficient(message: impl Into<String>) -> Self {
        Self::new(3, message)
    }

    /// External source unreachable, unknown code, or malformed payload.
    pub fn retrieval(message: impl Into<String>) -> Self {
        Self::new(4, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
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

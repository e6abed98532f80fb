//! Error types.
//!
//! Two layers:
//!
//! - [`FitError`] is what the fitting engine returns. It is a plain enum so library callers can
//!   match on it.
//! - [`AppError`] is what the `bfit` binary reports: a message plus the process exit code.

use thiserror::Error;

/// Errors produced by the fitting engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    /// Malformed shapes, non-positive tolerances and other bad inputs.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A system received a sample whose floor is lower than one it already flushed.
    ///
    /// Only possible with [`SampleOrder::Monotonic`](crate::domain::SampleOrder::Monotonic).
    #[error("system {system}: sample floor {floor} arrived after floor {previous}")]
    UnorderedSamples {
        system: usize,
        previous: usize,
        floor: usize,
    },

    /// A reduced system could not be factorized.
    ///
    /// The NNLS solver recovers from this internally; it never escapes `solve`.
    #[error("singular reduced system ({size}x{size})")]
    SingularSystem { size: usize },
}

impl FitError {
    pub fn invalid(message: impl Into<String>) -> Self {
        FitError::InvalidArgument(message.into())
    }
}

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

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        let exit_code = match err {
            FitError::InvalidArgument(_) => 2,
            FitError::UnorderedSamples { .. } | FitError::SingularSystem { .. } => 4,
        };
        AppError::new(exit_code, err.to_string())
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

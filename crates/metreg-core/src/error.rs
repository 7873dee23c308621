//! Registry error types.

use thiserror::Error;

use crate::key::InstrumentKey;

/// Registry errors.
///
/// Payloads are plain strings so a failed creation can be pooled and handed
/// back to every later caller asking for the same key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The backend already holds a collector with the same name, or one whose
    /// descriptor collides with it.
    #[error("duplicate registration of {key}: {message}")]
    DuplicateRegistration {
        /// Key of the instrument that failed to register.
        key: InstrumentKey,
        /// Backend error text.
        message: String,
    },

    /// Any other construction or registration failure reported by the backend.
    #[error("backend error for {key}: {message}")]
    Backend {
        /// Key of the instrument that failed.
        key: InstrumentKey,
        /// Backend error text.
        message: String,
    },

    /// Quantile objectives or summary window settings are out of range.
    #[error("invalid summary objectives: {0}")]
    InvalidObjectives(String),
}

impl Error {
    /// Classify a backend error raised while building or registering `key`.
    pub fn from_backend(key: &InstrumentKey, err: prometheus::Error) -> Self {
        match err {
            prometheus::Error::AlreadyReg => Error::DuplicateRegistration {
                key: key.clone(),
                message: err.to_string(),
            },
            // prometheus 0.14 (`Registry::register`) reports a name reused with
            // other label names or help only through this message text.
            prometheus::Error::Msg(ref msg) if msg.contains("previously registered") => {
                Error::DuplicateRegistration {
                    key: key.clone(),
                    message: msg.clone(),
                }
            }
            other => Error::Backend {
                key: key.clone(),
                message: other.to_string(),
            },
        }
    }

    /// Returns true for [`Error::DuplicateRegistration`].
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Error::DuplicateRegistration { .. })
    }
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, Error>;

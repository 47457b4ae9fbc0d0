//! Error types, split between startup (configuration) failures and
//! per-request (operational) failures.

use std::path::PathBuf;

use thiserror::Error;

/// Failures while turning the credential blob into an authorized client.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The credential environment variable is absent or empty.
    #[error("no spreadsheet credentials found in the environment")]
    Missing,

    /// The credential blob is not a valid service-account document.
    #[error("credential JSON is malformed: {0}")]
    Malformed(String),

    /// The private key could not be used for signing.
    #[error("service-account private key is invalid: {0}")]
    InvalidKey(String),

    /// The token endpoint refused the assertion.
    #[error("authorization rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The token endpoint could not be reached or answered garbage.
    #[error("authorization request failed: {0}")]
    Network(String),
}

/// Failures talking to the spreadsheet and drive REST APIs.
#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {0}: {1}")]
    Http(u16, String),

    #[error("unexpected response: {0}")]
    Parse(String),

    /// The request could not be authorized (token renewal failed).
    #[error(transparent)]
    Auth(#[from] CredentialError),
}

/// Anything that keeps the spreadsheet subsystem from coming up at startup.
#[derive(Debug, Error)]
pub enum SheetSetupError {
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error("spreadsheet binding failed: {0}")]
    Sheets(#[from] SheetsError),
}

/// Failures while loading the model artifacts.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model artifact not found: {}", path.display())]
    Missing { path: PathBuf },

    #[error("cannot read model artifact {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model artifact {} is malformed: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
}

impl ModelLoadError {
    /// Missing files degrade the service; every other load error is fatal.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing { .. })
    }
}

/// Per-request prediction failures. The display text is what the user sees.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PredictError {
    #[error("Error: ML models are not available")]
    ModelsUnavailable,

    #[error("Please enter valid values (they cannot all be 0)")]
    EmptyInput,

    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Prediction error: model produced a non-finite estimate (log output {0})")]
    NonFinite(f64),
}

/// Per-request failures of the clear/show row operations.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("Spreadsheet not configured")]
    NotConfigured,

    #[error("Error clearing data: {0}")]
    Write(#[source] SheetsError),

    #[error("Error reading data: {0}")]
    Read(#[source] SheetsError),
}

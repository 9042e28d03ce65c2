//! Error types for the self-service flows.
//!
//! The flow engine works with a flat error taxonomy: local validation
//! failures are produced before any network call, everything else is
//! normalized at the gateway boundary so the state machines never see a
//! raw transport error.

use thiserror::Error;

/// Common error type for self-service flow operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// A required field is empty.
    #[error("this field is required")]
    FieldRequired,

    /// No customer record matches the given username or national ID.
    #[error("user not found")]
    UserNotFound,

    /// The candidate password was rejected by the format check.
    #[error("invalid password format: {0}")]
    InvalidPasswordFormat(String),

    /// The password and its confirmation differ.
    #[error("passwords do not match")]
    PasswordsDoNotMatch,

    /// The entered national ID does not match the verified identity.
    #[error("national ID does not match the verified identity")]
    IdentityMismatch,

    /// The backend returned no usable security questions.
    #[error("security questions are unavailable")]
    SecurityQuestions,

    /// The security-question answer was rejected.
    #[error("{0}")]
    InvalidSecurityAnswer(String),

    /// The backend could not issue a security code.
    #[error("could not request a security code: {0}")]
    CodeRequest(String),

    /// The entered security code is wrong.
    #[error("invalid security code")]
    InvalidSecurityCode,

    /// The backend reported the security code as expired.
    #[error("the security code has expired")]
    ExpiredCode,

    /// A remote call exceeded the request timeout.
    #[error("the request timed out")]
    Timeout,

    /// The verification service could not be reached.
    #[error("could not reach the verification service")]
    Connection,

    /// The verification service answered with an unusable response.
    #[error("verification service error: {0}")]
    Server(String),

    /// Anything that does not fit the taxonomy.
    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl FlowError {
    /// Build an answer-rejection error, falling back to the default
    /// message when the backend did not provide one.
    pub fn invalid_answer(message: Option<String>) -> Self {
        let msg = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "incorrect answer".to_string());
        FlowError::InvalidSecurityAnswer(msg)
    }

    /// Whether this error was produced locally, before any network call.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            FlowError::FieldRequired
                | FlowError::PasswordsDoNotMatch
                | FlowError::IdentityMismatch
        )
    }
}

/// Result type alias for self-service flow operations.
pub type Result<T> = std::result::Result<T, FlowError>;

//! Verification gateway boundary.
//!
//! The flow engine talks to the remote identity service exclusively
//! through [`VerificationGateway`]; transport concerns live in the
//! [`client`] implementation and are never visible to the state
//! machines, which only ever see the [`crate::FlowError`] taxonomy.

pub mod client;
pub mod types;

pub use client::HttpVerificationGateway;
pub use types::{
    Identity, OtpConfirmation, PasswordPayload, SecurityQuestion, TEMP_PASSWORD_PLACEHOLDER,
};

use async_trait::async_trait;

use crate::flow::FlowKind;
use crate::Result;

/// Request/response operations against the remote identity service.
///
/// Implementations must normalize every transport-level failure into the
/// flow error taxonomy before returning.
#[async_trait]
pub trait VerificationGateway: Send + Sync {
    /// Look up a customer by username.
    async fn validate_username(&self, username: &str) -> Result<Identity>;

    /// Look up a customer by national ID.
    async fn validate_national_id(&self, national_id: &str) -> Result<Identity>;

    /// Check a candidate password against the bank's format rules.
    async fn validate_password_format(&self, username: &str, candidate: &str) -> Result<()>;

    /// Fetch the customer's security questions.
    async fn security_questions(&self, national_id: &str) -> Result<Vec<SecurityQuestion>>;

    /// Check an answer to one security question.
    async fn validate_security_answer(
        &self,
        national_id: &str,
        question_code: &str,
        answer: &str,
    ) -> Result<()>;

    /// Ask the backend to issue and deliver a one-time code.
    ///
    /// Returns the opaque message id identifying the challenge.
    async fn request_otp(&self, national_id: &str, flow: FlowKind) -> Result<String>;

    /// Confirm a one-time code and apply the password update.
    async fn confirm_otp_and_update(&self, confirmation: &OtpConfirmation) -> Result<()>;
}

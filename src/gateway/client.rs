//! HTTP implementation of the verification gateway.
//!
//! Every request carries the shared static authorization token and the
//! configured request timeout. Non-2xx responses, JSON decode failures
//! and transport errors are normalized into the flow error taxonomy
//! here, so callers never see a raw `reqwest` error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::flow::FlowKind;
use crate::gateway::types::{Identity, OtpConfirmation, SecurityQuestion};
use crate::gateway::VerificationGateway;
use crate::{FlowError, Result};

/// Connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// User agent string for gateway requests.
const USER_AGENT: &str = "selfserve/1.0";

/// Failure envelope the backend attaches to non-2xx responses.
#[derive(Debug, Deserialize)]
struct FailureBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UsernameLookupRequest<'a> {
    username: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NationalIdLookupRequest<'a> {
    national_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordFormatRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SecurityAnswerRequest<'a> {
    national_id: &'a str,
    question_code: &'a str,
    answer: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OtpRequest<'a> {
    national_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OtpConfirmRequest<'a> {
    national_id: &'a str,
    username: Option<&'a str>,
    message_id: &'a str,
    code: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct QuestionListResponse {
    #[serde(default)]
    questions: Vec<SecurityQuestion>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OtpIssueResponse {
    message_id: String,
}

/// Verification gateway over HTTPS.
pub struct HttpVerificationGateway {
    client: Client,
    base_url: String,
    auth_token: String,
}

impl HttpVerificationGateway {
    /// Create a gateway from configuration.
    ///
    /// The HTTP client is built once with the configured request timeout;
    /// the base URL is validated here so endpoint construction cannot
    /// fail later.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let parsed = url::Url::parse(&config.base_url)
            .map_err(|e| FlowError::Unknown(format!("invalid gateway base URL: {e}")))?;
        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(FlowError::Unknown(format!(
                    "unsupported gateway URL scheme: {scheme}"
                )));
            }
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FlowError::Unknown(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// POST a JSON body and decode a JSON success payload.
    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(&self.auth_token)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            response.json::<T>().await.map_err(|e| {
                warn!(path, "gateway returned a malformed success payload");
                FlowError::Server(format!("malformed response: {e}"))
            })
        } else {
            Err(Self::failure(path, status, response).await)
        }
    }

    /// POST a JSON body and discard the success payload.
    async fn post_unit<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(&self.auth_token)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::failure(path, status, response).await)
        }
    }

    async fn failure(path: &str, status: StatusCode, response: reqwest::Response) -> FlowError {
        let body = response.json::<FailureBody>().await.ok();
        debug!(path, %status, "gateway request rejected");
        map_failure(status, body)
    }
}

/// Map a transport-level error to the flow taxonomy.
fn map_transport_error(e: reqwest::Error) -> FlowError {
    if e.is_timeout() {
        FlowError::Timeout
    } else if e.is_connect() {
        FlowError::Connection
    } else {
        FlowError::Server(e.to_string())
    }
}

/// Map a non-2xx response to the flow taxonomy.
///
/// Recognized backend codes take precedence; anything else becomes a
/// generic server error carrying the backend message when present.
fn map_failure(status: StatusCode, body: Option<FailureBody>) -> FlowError {
    let (code, message) = match body {
        Some(b) => (b.code, b.message),
        None => (None, None),
    };

    match code.as_deref() {
        Some("USER_NOT_FOUND") => FlowError::UserNotFound,
        Some("INVALID_PASSWORD_FORMAT") => FlowError::InvalidPasswordFormat(
            message.unwrap_or_else(|| "password does not meet the format rules".to_string()),
        ),
        Some("SECURITY_QUESTIONS_ERROR") => FlowError::SecurityQuestions,
        Some("INVALID_SECURITY_ANSWER") => FlowError::invalid_answer(message),
        Some("CODE_REQUEST_ERROR") => FlowError::CodeRequest(
            message.unwrap_or_else(|| "the code could not be sent".to_string()),
        ),
        Some("INVALID_SECURITY_CODE") => FlowError::InvalidSecurityCode,
        Some("EXPIRED_CODE") => FlowError::ExpiredCode,
        _ => FlowError::Server(message.unwrap_or_else(|| format!("HTTP {status}"))),
    }
}

#[async_trait]
impl VerificationGateway for HttpVerificationGateway {
    async fn validate_username(&self, username: &str) -> Result<Identity> {
        self.post("users/validate", &UsernameLookupRequest { username })
            .await
    }

    async fn validate_national_id(&self, national_id: &str) -> Result<Identity> {
        self.post("users/validate-id", &NationalIdLookupRequest { national_id })
            .await
    }

    async fn validate_password_format(&self, username: &str, candidate: &str) -> Result<()> {
        self.post_unit(
            "passwords/validate-format",
            &PasswordFormatRequest {
                username,
                password: candidate,
            },
        )
        .await
    }

    async fn security_questions(&self, national_id: &str) -> Result<Vec<SecurityQuestion>> {
        let response: QuestionListResponse = self
            .post("security-questions", &NationalIdLookupRequest { national_id })
            .await?;
        Ok(response.questions)
    }

    async fn validate_security_answer(
        &self,
        national_id: &str,
        question_code: &str,
        answer: &str,
    ) -> Result<()> {
        self.post_unit(
            "security-questions/validate",
            &SecurityAnswerRequest {
                national_id,
                question_code,
                answer,
            },
        )
        .await
    }

    async fn request_otp(&self, national_id: &str, flow: FlowKind) -> Result<String> {
        // The authenticated change-password flow issues codes through its
        // own endpoint; the anonymous flows share one.
        let path = match flow {
            FlowKind::ChangePassword => "codes/request-authenticated",
            FlowKind::RecoverPassword | FlowKind::BlockAccount => "codes/request",
        };
        let response: OtpIssueResponse = self.post(path, &OtpRequest { national_id }).await?;
        Ok(response.message_id)
    }

    async fn confirm_otp_and_update(&self, confirmation: &OtpConfirmation) -> Result<()> {
        self.post_unit(
            "codes/confirm",
            &OtpConfirmRequest {
                national_id: &confirmation.national_id,
                username: confirmation.username.as_deref(),
                message_id: &confirmation.message_id,
                code: &confirmation.code,
                password: confirmation.password.secret(),
            },
        )
        .await
    }
}

//! Test helpers for flow E2E tests.
//!
//! Provides a scripted in-memory verification gateway that records
//! every operation it is asked to perform.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use selfserve::{
    FlowError, FlowKind, Identity, OtpConfirmation, Result, SecurityQuestion, VerificationGateway,
};

/// Username the fake gateway knows about.
pub const KNOWN_USERNAME: &str = "usuario123";

/// National ID of the known customer.
pub const KNOWN_NATIONAL_ID: &str = "1723456789";

/// Security answer the fake gateway accepts.
pub const KNOWN_ANSWER: &str = "fluffy";

/// Code the fake gateway accepts.
pub const VALID_CODE: &str = "123456";

/// The identity every lookup resolves to.
pub fn known_identity() -> Identity {
    Identity {
        username: Some(KNOWN_USERNAME.to_string()),
        national_id: KNOWN_NATIONAL_ID.to_string(),
        display_name: "Maria Perez".to_string(),
        phone_number: "+593991234567".to_string(),
        client_record_id: "CR-0042".to_string(),
    }
}

/// Scripted verification gateway.
///
/// Lookups resolve against a fixed customer; one-time codes accept
/// [`VALID_CODE`] against the most recently issued, unconsumed message
/// id. Every call is recorded by operation name.
pub struct FakeGateway {
    users: HashMap<String, Identity>,
    ids: HashMap<String, Identity>,
    questions: Mutex<Vec<SecurityQuestion>>,
    issued: AtomicUsize,
    consumed: Mutex<HashSet<String>>,
    fail_next_issue: AtomicBool,
    next_confirm_error: Mutex<Option<FlowError>>,
    calls: Mutex<Vec<String>>,
}

impl FakeGateway {
    /// Gateway seeded with the known customer and three questions.
    pub fn new() -> Arc<Self> {
        let identity = known_identity();
        let mut users = HashMap::new();
        users.insert(KNOWN_USERNAME.to_string(), identity.clone());
        let mut ids = HashMap::new();
        ids.insert(KNOWN_NATIONAL_ID.to_string(), identity);

        Arc::new(Self {
            users,
            ids,
            questions: Mutex::new(
                ["Q1", "Q2", "Q3"]
                    .iter()
                    .map(|c| SecurityQuestion {
                        code: c.to_string(),
                        text: format!("question {c}"),
                    })
                    .collect(),
            ),
            issued: AtomicUsize::new(0),
            consumed: Mutex::new(HashSet::new()),
            fail_next_issue: AtomicBool::new(false),
            next_confirm_error: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Make the next code issuance fail.
    pub fn fail_next_issue(&self) {
        self.fail_next_issue.store(true, Ordering::SeqCst);
    }

    /// Script the outcome of the next confirmation.
    pub fn script_confirm_error(&self, error: FlowError) {
        *self.next_confirm_error.lock().unwrap() = Some(error);
    }

    /// Replace the question set.
    pub fn set_questions(&self, questions: Vec<SecurityQuestion>) {
        *self.questions.lock().unwrap() = questions;
    }

    /// How many times the named operation was called.
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| *c == operation)
            .count()
    }

    fn record(&self, operation: &str) {
        self.calls.lock().unwrap().push(operation.to_string());
    }
}

#[async_trait]
impl VerificationGateway for FakeGateway {
    async fn validate_username(&self, username: &str) -> Result<Identity> {
        self.record("validate_username");
        self.users
            .get(username)
            .cloned()
            .ok_or(FlowError::UserNotFound)
    }

    async fn validate_national_id(&self, national_id: &str) -> Result<Identity> {
        self.record("validate_national_id");
        self.ids
            .get(national_id)
            .cloned()
            .ok_or(FlowError::UserNotFound)
    }

    async fn validate_password_format(&self, _username: &str, candidate: &str) -> Result<()> {
        self.record("validate_password_format");
        let strong = candidate.len() >= 8
            && candidate.chars().any(|c| c.is_ascii_uppercase())
            && candidate.chars().any(|c| c.is_ascii_digit());
        if strong {
            Ok(())
        } else {
            Err(FlowError::InvalidPasswordFormat(
                "password does not meet the format rules".to_string(),
            ))
        }
    }

    async fn security_questions(&self, _national_id: &str) -> Result<Vec<SecurityQuestion>> {
        self.record("security_questions");
        Ok(self.questions.lock().unwrap().clone())
    }

    async fn validate_security_answer(
        &self,
        _national_id: &str,
        _question_code: &str,
        answer: &str,
    ) -> Result<()> {
        self.record("validate_security_answer");
        if answer == KNOWN_ANSWER {
            Ok(())
        } else {
            Err(FlowError::invalid_answer(None))
        }
    }

    async fn request_otp(&self, _national_id: &str, _flow: FlowKind) -> Result<String> {
        self.record("request_otp");
        if self.fail_next_issue.swap(false, Ordering::SeqCst) {
            return Err(FlowError::CodeRequest("delivery failed".to_string()));
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("msg-{n}"))
    }

    async fn confirm_otp_and_update(&self, confirmation: &OtpConfirmation) -> Result<()> {
        self.record("confirm_otp_and_update");
        if let Some(e) = self.next_confirm_error.lock().unwrap().take() {
            return Err(e);
        }

        let mut consumed = self.consumed.lock().unwrap();
        // A consumed or superseded message id is no longer confirmable
        if consumed.contains(&confirmation.message_id)
            || confirmation.message_id != format!("msg-{}", self.issued.load(Ordering::SeqCst))
        {
            return Err(FlowError::ExpiredCode);
        }
        if confirmation.code == VALID_CODE {
            consumed.insert(confirmation.message_id.clone());
            Ok(())
        } else {
            Err(FlowError::InvalidSecurityCode)
        }
    }
}

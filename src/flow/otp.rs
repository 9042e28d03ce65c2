//! One-time-code session state machine.
//!
//! One session owns exactly one active challenge at a time: issuance,
//! the 120-second validity countdown, expiry reset, resend gating and
//! per-attempt error classification. The countdown ticker is a
//! cancellable task whose only handle lives in the session; every
//! transition that supersedes it aborts it first.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::FlowConfig;
use crate::flow::code_entry::CodeEntry;
use crate::flow::{FlowEvent, FlowKind};
use crate::gateway::types::{OtpConfirmation, PasswordPayload};
use crate::gateway::VerificationGateway;
use crate::{FlowError, Result};

/// One issued code challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpChallenge {
    /// Opaque token identifying the challenge at the backend.
    pub message_id: String,
    /// When the code was issued.
    pub issued_at: DateTime<Utc>,
    /// Validity window in seconds.
    pub validity_secs: u32,
    /// Submission attempts made against this challenge.
    pub attempts_consumed: u32,
}

/// Session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpState {
    /// Issuing (or about to issue) a code-send request.
    Requesting,
    /// A code is live and the countdown is running.
    Active,
    /// The countdown reached zero (or the backend reported the code
    /// expired); the previous message id is unusable and resend is
    /// available.
    Expired,
    /// A submitted code is being checked.
    Validating,
    /// The code was accepted. Terminal.
    Succeeded,
    /// Issuance failed; exitable only via an explicit retry.
    IssueFailed,
}

/// Manages the lifecycle of one one-time-code challenge.
pub struct OtpSession {
    gateway: Arc<dyn VerificationGateway>,
    events: UnboundedSender<FlowEvent>,
    flow_kind: FlowKind,
    national_id: String,
    username: Option<String>,
    password: PasswordPayload,
    validity_secs: u32,
    state: OtpState,
    challenge: Option<OtpChallenge>,
    entry: CodeEntry,
    remaining: Arc<AtomicU32>,
    ticker: Option<AbortHandle>,
    epoch: u64,
}

impl OtpSession {
    /// Create a session for one flow instance.
    ///
    /// The session starts in `Requesting`; call [`request`](Self::request)
    /// to issue the first code.
    pub fn new(
        gateway: Arc<dyn VerificationGateway>,
        events: UnboundedSender<FlowEvent>,
        flow_kind: FlowKind,
        national_id: String,
        username: Option<String>,
        password: PasswordPayload,
        config: &FlowConfig,
    ) -> Self {
        Self {
            gateway,
            events,
            flow_kind,
            national_id,
            username,
            password,
            validity_secs: config.otp_validity_secs,
            state: OtpState::Requesting,
            challenge: None,
            entry: CodeEntry::new(config.otp_code_length),
            remaining: Arc::new(AtomicU32::new(0)),
            ticker: None,
            epoch: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> OtpState {
        self.state
    }

    /// The active challenge, when one exists.
    pub fn challenge(&self) -> Option<&OtpChallenge> {
        self.challenge.as_ref()
    }

    /// Seconds left on the countdown.
    pub fn remaining_secs(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst)
    }

    /// The code entry cells.
    pub fn entry(&self) -> &CodeEntry {
        &self.entry
    }

    /// Whether resend is available. Disabled for the whole countdown,
    /// enabled exactly when it reaches zero.
    pub fn resend_enabled(&self) -> bool {
        self.state == OtpState::Expired
    }

    /// Type one character into the focused cell (Active only).
    pub fn type_char(&mut self, c: char) -> bool {
        self.state == OtpState::Active && self.entry.type_char(c)
    }

    /// Backspace in the code entry (Active only).
    pub fn backspace(&mut self) {
        if self.state == OtpState::Active {
            self.entry.backspace();
        }
    }

    /// Paste into the code entry (Active only).
    pub fn paste(&mut self, text: &str) {
        if self.state == OtpState::Active {
            self.entry.paste(text);
        }
    }

    /// Issue a code-send request.
    ///
    /// Valid from the initial state, after issuance failure (retry) and
    /// after expiry (resend). While a countdown is above zero the
    /// request is refused: a second concurrent challenge must never be
    /// issued.
    pub async fn request(&mut self) -> Result<()> {
        match self.state {
            OtpState::Requesting | OtpState::Expired | OtpState::IssueFailed => {}
            _ => {
                return Err(FlowError::CodeRequest(
                    "a security code is already active".to_string(),
                ));
            }
        }

        self.stop_ticker();
        self.entry.clear();
        self.challenge = None;
        self.state = OtpState::Requesting;

        match self
            .gateway
            .request_otp(&self.national_id, self.flow_kind)
            .await
        {
            Ok(message_id) => {
                info!(flow = self.flow_kind.as_str(), "security code issued");
                self.challenge = Some(OtpChallenge {
                    message_id,
                    issued_at: Utc::now(),
                    validity_secs: self.validity_secs,
                    attempts_consumed: 0,
                });
                self.start_countdown();
                self.state = OtpState::Active;
                Ok(())
            }
            Err(e) => {
                warn!(flow = self.flow_kind.as_str(), error = %e, "code issuance failed");
                self.state = OtpState::IssueFailed;
                Err(e)
            }
        }
    }

    /// Re-issue a code after expiry.
    pub async fn resend(&mut self) -> Result<()> {
        if self.state != OtpState::Expired {
            return Err(FlowError::CodeRequest(
                "resend is not available yet".to_string(),
            ));
        }
        self.request().await
    }

    /// Retry issuance after a failure.
    pub async fn retry(&mut self) -> Result<()> {
        if self.state != OtpState::IssueFailed {
            return Err(FlowError::CodeRequest("nothing to retry".to_string()));
        }
        self.request().await
    }

    /// Submit the entered code.
    ///
    /// Requires a complete numeric code; an incomplete entry is
    /// rejected without a network call. On a wrong code the cells are
    /// cleared and the first cell refocused, but the countdown is never
    /// reset by a failed validation.
    pub async fn submit(&mut self) -> Result<()> {
        if self.state != OtpState::Active {
            return Err(FlowError::Unknown("no active security code".to_string()));
        }
        let Some(code) = self.entry.code() else {
            return Err(FlowError::FieldRequired);
        };
        let message_id = match self.challenge.as_mut() {
            Some(challenge) => {
                challenge.attempts_consumed += 1;
                challenge.message_id.clone()
            }
            None => return Err(FlowError::Unknown("no active challenge".to_string())),
        };

        self.state = OtpState::Validating;
        let confirmation = OtpConfirmation {
            national_id: self.national_id.clone(),
            username: self.username.clone(),
            message_id,
            code,
            password: self.password.clone(),
        };

        match self.gateway.confirm_otp_and_update(&confirmation).await {
            Ok(()) => {
                info!(flow = self.flow_kind.as_str(), "security code accepted");
                self.stop_ticker();
                // The backend invalidates the message id on success; the
                // client must not retain it either.
                self.challenge = None;
                self.state = OtpState::Succeeded;
                Ok(())
            }
            Err(e) => {
                let attempts = self
                    .challenge
                    .as_ref()
                    .map_or(0, |c| c.attempts_consumed);
                warn!(
                    flow = self.flow_kind.as_str(),
                    attempts,
                    error = %e,
                    "security code rejected"
                );
                match e {
                    FlowError::InvalidSecurityCode => {
                        self.entry.clear();
                        self.back_to_active();
                    }
                    FlowError::ExpiredCode => self.expire_challenge(),
                    _ => self.back_to_active(),
                }
                Err(e)
            }
        }
    }

    /// Apply a countdown-expired event.
    ///
    /// Returns `false` when the event belongs to a superseded countdown
    /// or arrives in a state where natural expiry no longer applies.
    pub fn handle_expiry(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || self.state != OtpState::Active {
            debug!(epoch, "ignoring stale countdown expiry");
            return false;
        }
        self.expire_challenge();
        true
    }

    fn back_to_active(&mut self) {
        // The countdown kept running during validation; if it ran out
        // meanwhile the challenge is gone either way.
        if self.remaining.load(Ordering::SeqCst) == 0 {
            self.expire_challenge();
        } else {
            self.state = OtpState::Active;
        }
    }

    fn expire_challenge(&mut self) {
        self.stop_ticker();
        self.remaining.store(0, Ordering::SeqCst);
        self.challenge = None;
        self.entry.clear();
        self.state = OtpState::Expired;
        debug!(flow = self.flow_kind.as_str(), "security code expired");
    }

    fn start_countdown(&mut self) {
        self.stop_ticker();
        self.epoch += 1;
        self.remaining.store(self.validity_secs, Ordering::SeqCst);

        let remaining = Arc::clone(&self.remaining);
        let events = self.events.clone();
        let epoch = self.epoch;
        let handle = tokio::spawn(async move {
            loop {
                sleep(Duration::from_secs(1)).await;
                let prev = remaining.load(Ordering::SeqCst);
                if prev == 0 {
                    break;
                }
                let now = prev - 1;
                remaining.store(now, Ordering::SeqCst);
                if now == 0 {
                    let _ = events.send(FlowEvent::OtpExpired { epoch });
                    break;
                }
            }
        });
        self.ticker = Some(handle.abort_handle());
    }

    fn stop_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }
}

impl Drop for OtpSession {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

//! Per-entry-point flow orchestration.
//!
//! A [`FlowOrchestrator`] owns one user's journey through the shared
//! pipeline: identity validation, security-question challenge, then the
//! one-time-code session. The flow kind selects endpoints and copy; the
//! mechanism is the same for all three journeys.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::AbortHandle;
use tokio::time::sleep;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::FlowConfig;
use crate::flow::challenge::SecurityChallengeCoordinator;
use crate::flow::debounce::{DebouncedValidator, ValidationStatus};
use crate::flow::otp::OtpSession;
use crate::flow::{FieldKind, FlowEvent, FlowKind};
use crate::gateway::types::{Identity, PasswordPayload, SecurityQuestion};
use crate::gateway::VerificationGateway;
use crate::{FlowError, Result};

/// Notice shown when the countdown runs out naturally.
const EXPIRY_NOTICE: &str = "the security code timed out, request a new one";

/// Steps of a flow. Not every kind visits every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStep {
    /// Username or national-ID entry with debounced validation.
    Identity,
    /// New-password capture and format check (recover only).
    NewPassword,
    /// Identity cross-check and security question.
    Challenge,
    /// One-time-code entry.
    Otp,
}

/// Transient failure notice, auto-dismissed after a fixed delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    id: u64,
    text: String,
}

impl Notice {
    /// The user-facing message.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// State accumulated across the steps of one flow instance.
///
/// Owned exclusively by the orchestrator and destroyed on completion or
/// cancel.
#[derive(Debug, Clone)]
pub struct FlowContext {
    flow_id: Uuid,
    identity: Option<Identity>,
    new_password: Option<String>,
    question: Option<SecurityQuestion>,
}

impl FlowContext {
    fn new() -> Self {
        Self {
            flow_id: Uuid::new_v4(),
            identity: None,
            new_password: None,
            question: None,
        }
    }

    /// Identifier used in logs for this flow instance.
    pub fn flow_id(&self) -> Uuid {
        self.flow_id
    }

    /// The verified identity, once captured.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// The security question currently posed.
    pub fn question(&self) -> Option<&SecurityQuestion> {
        self.question.as_ref()
    }
}

/// Drives one user journey through the shared verification pipeline.
pub struct FlowOrchestrator {
    kind: FlowKind,
    config: FlowConfig,
    gateway: Arc<dyn VerificationGateway>,
    events_tx: UnboundedSender<FlowEvent>,
    events_rx: UnboundedReceiver<FlowEvent>,
    ctx: FlowContext,
    step: FlowStep,
    identity_validator: Option<DebouncedValidator>,
    challenge: SecurityChallengeCoordinator,
    otp: Option<OtpSession>,
    notice: Option<Notice>,
    notice_task: Option<AbortHandle>,
    notice_seq: u64,
    redirect_task: Option<AbortHandle>,
    finished: bool,
}

impl FlowOrchestrator {
    /// Forgot-password recovery flow.
    pub fn recover_password(gateway: Arc<dyn VerificationGateway>, config: FlowConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let validator = DebouncedValidator::username(
            Arc::clone(&gateway),
            events_tx.clone(),
            Duration::from_millis(config.username_debounce_ms),
        );
        Self::build(
            FlowKind::RecoverPassword,
            gateway,
            config,
            events_tx,
            events_rx,
            Some(validator),
            FlowStep::Identity,
        )
    }

    /// Block-account flow.
    pub fn block_account(gateway: Arc<dyn VerificationGateway>, config: FlowConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let validator = DebouncedValidator::national_id(
            Arc::clone(&gateway),
            events_tx.clone(),
            config.national_id_length,
        );
        Self::build(
            FlowKind::BlockAccount,
            gateway,
            config,
            events_tx,
            events_rx,
            Some(validator),
            FlowStep::Identity,
        )
    }

    /// Change-password flow for an already-authenticated user.
    ///
    /// Identity and new password are supplied by the caller; the flow
    /// consists of the one-time-code step only. Call
    /// [`start`](Self::start) to issue the first code.
    pub fn change_password(
        gateway: Arc<dyn VerificationGateway>,
        config: FlowConfig,
        identity: Identity,
        new_password: String,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut orchestrator = Self::build(
            FlowKind::ChangePassword,
            gateway,
            config,
            events_tx,
            events_rx,
            None,
            FlowStep::Otp,
        );
        orchestrator.ctx.identity = Some(identity);
        orchestrator.ctx.new_password = Some(new_password);
        orchestrator
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        kind: FlowKind,
        gateway: Arc<dyn VerificationGateway>,
        config: FlowConfig,
        events_tx: UnboundedSender<FlowEvent>,
        events_rx: UnboundedReceiver<FlowEvent>,
        identity_validator: Option<DebouncedValidator>,
        step: FlowStep,
    ) -> Self {
        let ctx = FlowContext::new();
        info!(flow = kind.as_str(), id = %ctx.flow_id, "flow started");
        Self {
            kind,
            challenge: SecurityChallengeCoordinator::new(Arc::clone(&gateway)),
            gateway,
            config,
            events_tx,
            events_rx,
            ctx,
            step,
            identity_validator,
            otp: None,
            notice: None,
            notice_task: None,
            notice_seq: 0,
            redirect_task: None,
            finished: false,
        }
    }

    /// Flow kind.
    pub fn kind(&self) -> FlowKind {
        self.kind
    }

    /// Current step.
    pub fn step(&self) -> FlowStep {
        self.step
    }

    /// Accumulated flow context.
    pub fn context(&self) -> &FlowContext {
        &self.ctx
    }

    /// Whether the flow has navigated back to its entry point.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The current failure notice, when one is showing.
    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// The one-time-code session, once the flow reached that step.
    pub fn otp(&self) -> Option<&OtpSession> {
        self.otp.as_ref()
    }

    /// Validation status of the identity field.
    pub fn identity_status(&self) -> ValidationStatus {
        self.identity_validator
            .as_ref()
            .map_or(ValidationStatus::Idle, |v| v.status().clone())
    }

    /// Issue the first code for the change-password flow.
    ///
    /// No-op for the other kinds, which reach the code step through
    /// their earlier steps.
    pub async fn start(&mut self) -> Result<()> {
        if self.kind == FlowKind::ChangePassword && self.otp.is_none() {
            self.begin_otp().await
        } else {
            Ok(())
        }
    }

    /// Feed the current identity-field input (username or national ID).
    ///
    /// Any previously scheduled validation is superseded, and identity
    /// derived from older input is discarded immediately.
    pub fn observe_identity(&mut self, raw: &str) {
        if self.step != FlowStep::Identity {
            return;
        }
        // Derived state must never outlive the input that produced it
        self.ctx.identity = None;
        self.ctx.question = None;
        if let Some(validator) = self.identity_validator.as_mut() {
            validator.observe(raw);
        }
    }

    /// Advance past the identity step once validation succeeded.
    ///
    /// For the block flow this also fetches the security question.
    pub async fn advance(&mut self) -> Result<()> {
        if self.step != FlowStep::Identity {
            return Err(FlowError::Unknown("nothing to advance".to_string()));
        }
        let Some(identity) = self.ctx.identity.clone() else {
            return Err(self.fail(FlowError::FieldRequired));
        };

        match self.kind {
            FlowKind::RecoverPassword => {
                self.step = FlowStep::NewPassword;
                Ok(())
            }
            FlowKind::BlockAccount => {
                match self.challenge.fetch_challenge(&identity.national_id).await {
                    Ok(question) => {
                        self.ctx.question = Some(question);
                        self.step = FlowStep::Challenge;
                        Ok(())
                    }
                    Err(e) => Err(self.fail(e)),
                }
            }
            FlowKind::ChangePassword => {
                Err(FlowError::Unknown("nothing to advance".to_string()))
            }
        }
    }

    /// Capture the new password (recover flow).
    ///
    /// Empty fields and a confirmation mismatch are rejected locally;
    /// the format check goes to the backend.
    pub async fn submit_password(&mut self, candidate: &str, confirmation: &str) -> Result<()> {
        if self.step != FlowStep::NewPassword {
            return Err(FlowError::Unknown("not at the password step".to_string()));
        }
        if candidate.trim().is_empty() || confirmation.trim().is_empty() {
            return Err(self.fail(FlowError::FieldRequired));
        }
        if candidate != confirmation {
            return Err(self.fail(FlowError::PasswordsDoNotMatch));
        }
        let username = self
            .ctx
            .identity
            .as_ref()
            .and_then(|i| i.username.clone())
            .unwrap_or_default();

        match self
            .gateway
            .validate_password_format(&username, candidate)
            .await
        {
            Ok(()) => {
                self.ctx.new_password = Some(candidate.to_string());
                self.step = FlowStep::Challenge;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Cross-check the entered national ID and fetch the security
    /// question (recover flow).
    ///
    /// The mismatch check is local and never reaches the backend.
    pub async fn submit_identity_check(&mut self, entered_id: &str) -> Result<()> {
        if self.step != FlowStep::Challenge || self.kind != FlowKind::RecoverPassword {
            return Err(FlowError::Unknown("not at the challenge step".to_string()));
        }
        let Some(identity) = self.ctx.identity.clone() else {
            return Err(self.fail(FlowError::FieldRequired));
        };
        if let Err(e) = SecurityChallengeCoordinator::cross_check(&identity, entered_id) {
            return Err(self.fail(e));
        }
        match self.challenge.fetch_challenge(&identity.national_id).await {
            Ok(question) => {
                self.ctx.question = Some(question);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Submit the security-question answer; on success the one-time
    /// code is issued and the flow moves to the code step.
    pub async fn submit_answer(&mut self, answer: &str) -> Result<()> {
        if self.step != FlowStep::Challenge {
            return Err(FlowError::Unknown("not at the challenge step".to_string()));
        }
        let (national_id, question_code) = match (&self.ctx.identity, &self.ctx.question) {
            (Some(identity), Some(question)) => {
                (identity.national_id.clone(), question.code.clone())
            }
            _ => return Err(FlowError::Unknown("no pending question".to_string())),
        };

        match self
            .challenge
            .check_answer(&national_id, &question_code, answer)
            .await
        {
            Ok(()) => self.begin_otp().await,
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Step back, discarding downstream-only state and keeping what was
    /// validated upstream.
    pub fn go_back(&mut self) {
        match self.step {
            FlowStep::Identity => {}
            FlowStep::NewPassword => {
                self.ctx.new_password = None;
                self.step = FlowStep::Identity;
            }
            FlowStep::Challenge => {
                self.ctx.question = None;
                self.step = match self.kind {
                    FlowKind::RecoverPassword => FlowStep::NewPassword,
                    _ => FlowStep::Identity,
                };
            }
            FlowStep::Otp => {
                if self.kind == FlowKind::ChangePassword {
                    return;
                }
                // Dropping the session aborts its countdown; the question
                // is re-drawn on the next challenge.
                self.otp = None;
                self.ctx.question = None;
                self.step = FlowStep::Challenge;
            }
        }
        debug!(flow = self.kind.as_str(), step = ?self.step, "stepped back");
    }

    /// Type one character into the code entry.
    pub fn code_type_char(&mut self, c: char) -> bool {
        self.otp.as_mut().is_some_and(|otp| otp.type_char(c))
    }

    /// Backspace in the code entry.
    pub fn code_backspace(&mut self) {
        if let Some(otp) = self.otp.as_mut() {
            otp.backspace();
        }
    }

    /// Paste into the code entry.
    pub fn code_paste(&mut self, text: &str) {
        if let Some(otp) = self.otp.as_mut() {
            otp.paste(text);
        }
    }

    /// Submit the entered code. On success the completion redirect is
    /// scheduled after the configured display delay.
    pub async fn submit_code(&mut self) -> Result<()> {
        let Some(otp) = self.otp.as_mut() else {
            return Err(FlowError::Unknown("no code session".to_string()));
        };
        match otp.submit().await {
            Ok(()) => {
                info!(flow = self.kind.as_str(), id = %self.ctx.flow_id, "flow completed");
                self.schedule_redirect();
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Re-issue the code after expiry.
    pub async fn resend_code(&mut self) -> Result<()> {
        let Some(otp) = self.otp.as_mut() else {
            return Err(FlowError::Unknown("no code session".to_string()));
        };
        match otp.resend().await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Retry issuance after a failed code request.
    pub async fn retry_code(&mut self) -> Result<()> {
        let Some(otp) = self.otp.as_mut() else {
            return Err(FlowError::Unknown("no code session".to_string()));
        };
        match otp.retry().await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Abandon the flow, tearing down timers and context.
    pub fn cancel(&mut self) {
        info!(flow = self.kind.as_str(), id = %self.ctx.flow_id, "flow cancelled");
        self.teardown();
        self.finished = true;
    }

    /// Wait for the next scheduled-task event.
    pub async fn next_event(&mut self) -> Option<FlowEvent> {
        self.events_rx.recv().await
    }

    /// Take one queued event without waiting.
    pub fn try_next_event(&mut self) -> Option<FlowEvent> {
        self.events_rx.try_recv().ok()
    }

    /// Drain and apply every queued event.
    pub async fn pump(&mut self) {
        loop {
            tokio::task::yield_now().await;
            let mut handled = false;
            while let Some(event) = self.try_next_event() {
                self.handle_event(event);
                handled = true;
            }
            if !handled {
                break;
            }
        }
    }

    /// Apply one event posted by a scheduled task.
    pub fn handle_event(&mut self, event: FlowEvent) {
        match event {
            FlowEvent::Validation {
                field,
                generation,
                outcome,
            } => self.apply_validation(field, generation, outcome),
            FlowEvent::OtpExpired { epoch } => {
                let expired = self
                    .otp
                    .as_mut()
                    .map_or(false, |otp| otp.handle_expiry(epoch));
                if expired {
                    self.show_notice(EXPIRY_NOTICE);
                }
            }
            FlowEvent::NoticeElapsed { id } => {
                if self.notice.as_ref().map(|n| n.id) == Some(id) {
                    self.notice = None;
                    self.notice_task = None;
                }
            }
            FlowEvent::RedirectElapsed => {
                info!(flow = self.kind.as_str(), id = %self.ctx.flow_id, "returning to entry point");
                self.teardown();
                self.finished = true;
            }
        }
    }

    fn apply_validation(&mut self, field: FieldKind, generation: u64, outcome: Result<Identity>) {
        let Some(validator) = self.identity_validator.as_mut() else {
            return;
        };
        if field != validator.field() || !validator.apply(generation, outcome) {
            return;
        }
        match validator.status().clone() {
            ValidationStatus::Valid(identity) => {
                debug!(flow = self.kind.as_str(), "identity verified");
                self.ctx.identity = Some(identity);
            }
            ValidationStatus::Invalid(reason) => {
                self.ctx.identity = None;
                self.ctx.question = None;
                self.show_notice(reason);
            }
            ValidationStatus::Idle | ValidationStatus::Checking => {}
        }
    }

    async fn begin_otp(&mut self) -> Result<()> {
        let Some(identity) = self.ctx.identity.clone() else {
            return Err(FlowError::Unknown("no verified identity".to_string()));
        };
        let password = match self.kind {
            FlowKind::ChangePassword => match self.ctx.new_password.clone() {
                Some(password) => PasswordPayload::New(password),
                None => return Err(FlowError::Unknown("no new password".to_string())),
            },
            FlowKind::RecoverPassword | FlowKind::BlockAccount => PasswordPayload::Temporary,
        };

        let mut session = OtpSession::new(
            Arc::clone(&self.gateway),
            self.events_tx.clone(),
            self.kind,
            identity.national_id,
            identity.username,
            password,
            &self.config,
        );
        self.step = FlowStep::Otp;
        let result = session.request().await;
        self.otp = Some(session);
        match result {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn fail(&mut self, error: FlowError) -> FlowError {
        self.show_notice(error.to_string());
        error
    }

    fn show_notice(&mut self, text: impl Into<String>) {
        if let Some(handle) = self.notice_task.take() {
            handle.abort();
        }
        self.notice_seq += 1;
        let id = self.notice_seq;
        self.notice = Some(Notice {
            id,
            text: text.into(),
        });

        let events = self.events_tx.clone();
        let delay = Duration::from_secs(self.config.notice_dismiss_secs);
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            let _ = events.send(FlowEvent::NoticeElapsed { id });
        });
        self.notice_task = Some(handle.abort_handle());
    }

    fn schedule_redirect(&mut self) {
        if let Some(handle) = self.redirect_task.take() {
            handle.abort();
        }
        let events = self.events_tx.clone();
        let delay = Duration::from_secs(self.config.success_redirect_delay_secs);
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            let _ = events.send(FlowEvent::RedirectElapsed);
        });
        self.redirect_task = Some(handle.abort_handle());
    }

    fn teardown(&mut self) {
        if let Some(handle) = self.notice_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.redirect_task.take() {
            handle.abort();
        }
        if let Some(validator) = self.identity_validator.as_mut() {
            validator.reset();
        }
        self.otp = None;
        self.notice = None;
        self.ctx.identity = None;
        self.ctx.new_password = None;
        self.ctx.question = None;
    }
}

impl Drop for FlowOrchestrator {
    fn drop(&mut self) {
        if let Some(handle) = self.notice_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.redirect_task.take() {
            handle.abort();
        }
    }
}

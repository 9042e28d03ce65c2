//! Debounced remote validation of identity fields.
//!
//! A [`DebouncedValidator`] wraps one input field and schedules the
//! remote lookup as a cancellable task: a new keystroke aborts whatever
//! was scheduled before it, so only the most recent input can ever
//! reach the gateway, and a generation counter discards any completion
//! that slipped through before the abort.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;
use tokio::time::sleep;
use tracing::debug;

use crate::flow::{FieldKind, FlowEvent};
use crate::gateway::types::Identity;
use crate::gateway::VerificationGateway;
use crate::Result;

/// Tri-state validation status of a debounced field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationStatus {
    /// Nothing to validate (empty or incomplete input).
    Idle,
    /// A validation is scheduled or in flight.
    Checking,
    /// The lookup succeeded.
    Valid(Identity),
    /// The lookup failed; holds the user-facing reason.
    Invalid(String),
}

impl ValidationStatus {
    /// Whether the field currently holds a verified identity.
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationStatus::Valid(_))
    }

    /// The verified identity, when present.
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            ValidationStatus::Valid(identity) => Some(identity),
            _ => None,
        }
    }
}

/// When the remote lookup fires.
#[derive(Debug, Clone, Copy)]
enum TriggerMode {
    /// Fire once the input has been stable for the quiet period.
    QuietPeriod(Duration),
    /// Fire immediately and exactly when the trimmed input reaches the
    /// digit count; never on a timer.
    ExactDigits(usize),
}

/// Debounced wrapper around one identity input field.
pub struct DebouncedValidator {
    field: FieldKind,
    mode: TriggerMode,
    gateway: Arc<dyn VerificationGateway>,
    events: UnboundedSender<FlowEvent>,
    status: ValidationStatus,
    generation: u64,
    pending: Option<AbortHandle>,
}

impl DebouncedValidator {
    /// Validator for a username field with the given quiet period.
    pub fn username(
        gateway: Arc<dyn VerificationGateway>,
        events: UnboundedSender<FlowEvent>,
        quiet_period: Duration,
    ) -> Self {
        Self {
            field: FieldKind::Username,
            mode: TriggerMode::QuietPeriod(quiet_period),
            gateway,
            events,
            status: ValidationStatus::Idle,
            generation: 0,
            pending: None,
        }
    }

    /// Validator for a national-ID field with the given digit count.
    pub fn national_id(
        gateway: Arc<dyn VerificationGateway>,
        events: UnboundedSender<FlowEvent>,
        digits: usize,
    ) -> Self {
        Self {
            field: FieldKind::NationalId,
            mode: TriggerMode::ExactDigits(digits),
            gateway,
            events,
            status: ValidationStatus::Idle,
            generation: 0,
            pending: None,
        }
    }

    /// Current validation status.
    pub fn status(&self) -> &ValidationStatus {
        &self.status
    }

    /// Field this validator watches.
    pub fn field(&self) -> FieldKind {
        self.field
    }

    /// Feed the current raw input value.
    ///
    /// Cancels any previously scheduled validation; partial input never
    /// leaves stale Valid/Invalid state behind.
    pub fn observe(&mut self, raw: &str) {
        self.cancel_pending();
        self.generation += 1;

        let value = raw.trim().to_string();
        match self.mode {
            TriggerMode::QuietPeriod(quiet) => {
                if value.is_empty() {
                    self.status = ValidationStatus::Idle;
                    return;
                }
                self.status = ValidationStatus::Checking;
                self.schedule(value, Some(quiet));
            }
            TriggerMode::ExactDigits(digits) => {
                if value.chars().count() != digits || !value.chars().all(|c| c.is_ascii_digit()) {
                    self.status = ValidationStatus::Idle;
                    return;
                }
                self.status = ValidationStatus::Checking;
                self.schedule(value, None);
            }
        }
    }

    /// Apply a completed validation.
    ///
    /// Returns `false` (and changes nothing) when the outcome belongs to
    /// a superseded input value.
    pub fn apply(&mut self, generation: u64, outcome: Result<Identity>) -> bool {
        if generation != self.generation {
            debug!(field = ?self.field, generation, "discarding stale validation result");
            return false;
        }
        self.pending = None;
        self.status = match outcome {
            Ok(identity) => ValidationStatus::Valid(identity),
            Err(e) => ValidationStatus::Invalid(e.to_string()),
        };
        true
    }

    /// Reset to idle, cancelling any scheduled work.
    pub fn reset(&mut self) {
        self.cancel_pending();
        self.generation += 1;
        self.status = ValidationStatus::Idle;
    }

    fn schedule(&mut self, value: String, delay: Option<Duration>) {
        let gateway = Arc::clone(&self.gateway);
        let events = self.events.clone();
        let field = self.field;
        let generation = self.generation;

        let handle = tokio::spawn(async move {
            if let Some(delay) = delay {
                sleep(delay).await;
            }
            let outcome = match field {
                FieldKind::Username => gateway.validate_username(&value).await,
                FieldKind::NationalId => gateway.validate_national_id(&value).await,
            };
            let _ = events.send(FlowEvent::Validation {
                field,
                generation,
                outcome,
            });
        });
        self.pending = Some(handle.abort_handle());
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for DebouncedValidator {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

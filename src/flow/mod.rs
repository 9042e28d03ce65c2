//! Self-service flow engine.
//!
//! Three user journeys (recover password, block account, change
//! password) share one pipeline: debounced identity validation, a
//! security-question challenge, and a one-time-code session, sequenced
//! by the [`orchestrator::FlowOrchestrator`].

pub mod challenge;
pub mod code_entry;
pub mod debounce;
pub mod orchestrator;
pub mod otp;

pub use challenge::SecurityChallengeCoordinator;
pub use code_entry::CodeEntry;
pub use debounce::{DebouncedValidator, ValidationStatus};
pub use orchestrator::{FlowContext, FlowOrchestrator, FlowStep, Notice};
pub use otp::{OtpChallenge, OtpSession, OtpState};

use crate::gateway::types::Identity;
use crate::Result;

/// Which of the three user journeys is driving the shared machinery.
///
/// The tag selects backend endpoints and terminal messaging; it never
/// changes the shape of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    /// Anonymous forgot-password recovery.
    RecoverPassword,
    /// Anonymous block of a compromised account.
    BlockAccount,
    /// Password change from an authenticated session.
    ChangePassword,
}

impl FlowKind {
    /// Stable name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::RecoverPassword => "recover_password",
            FlowKind::BlockAccount => "block_account",
            FlowKind::ChangePassword => "change_password",
        }
    }
}

/// Which debounced input field produced a validation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Login username (quiet-period debounced).
    Username,
    /// National ID (digit-count triggered).
    NationalId,
}

/// Events posted by scheduled tasks into the orchestrator's event loop.
///
/// Timers and in-flight validations never mutate flow state directly;
/// they post one of these and the orchestrator applies it, which is
/// where stale work gets discarded.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// A debounced validation finished.
    Validation {
        /// Field the validation belongs to.
        field: FieldKind,
        /// Generation the task was scheduled under.
        generation: u64,
        /// Lookup outcome.
        outcome: Result<Identity>,
    },
    /// The active one-time-code countdown reached zero.
    OtpExpired {
        /// Countdown epoch the ticker was started under.
        epoch: u64,
    },
    /// A failure notice reached its auto-dismiss deadline.
    NoticeElapsed {
        /// Identifier of the notice the timer belongs to.
        id: u64,
    },
    /// The post-success display delay elapsed; navigate back.
    RedirectElapsed,
}

//! selfserve - Banking self-service verification flows
//!
//! Client-side orchestration for the three account self-service
//! journeys (recover password, block account, change password):
//! debounced identity validation, a security-question challenge and a
//! one-time-code session, driven against an external verification
//! backend.

pub mod config;
pub mod error;
pub mod flow;
pub mod gateway;
pub mod logging;

pub use config::{Config, FlowConfig, GatewayConfig, LoggingConfig};
pub use error::{FlowError, Result};
pub use flow::{
    CodeEntry, DebouncedValidator, FieldKind, FlowContext, FlowEvent, FlowKind, FlowOrchestrator,
    FlowStep, Notice, OtpChallenge, OtpSession, OtpState, SecurityChallengeCoordinator,
    ValidationStatus,
};
pub use gateway::{
    HttpVerificationGateway, Identity, OtpConfirmation, PasswordPayload, SecurityQuestion,
    VerificationGateway, TEMP_PASSWORD_PLACEHOLDER,
};

//! Data types exchanged with the verification backend.

use serde::{Deserialize, Serialize};

/// Fixed placeholder sent as the temporary-password payload for the
/// recover-password and block-account confirmations. Given business
/// behavior, not a secret.
pub const TEMP_PASSWORD_PLACEHOLDER: &str = "Temporal1*";

/// A verified customer identity.
///
/// Created by a successful username or national-ID lookup and immutable
/// from then on; discarded when the owning flow restarts or completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Login username, when the lookup was keyed by username.
    #[serde(default)]
    pub username: Option<String>,
    /// National identification number (cedula).
    pub national_id: String,
    /// Name shown to the user for confirmation.
    pub display_name: String,
    /// Phone number the one-time code is delivered to.
    pub phone_number: String,
    /// Opaque customer record identifier.
    pub client_record_id: String,
}

/// One security question offered to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityQuestion {
    /// Backend code identifying the question.
    #[serde(rename = "questionCode")]
    pub code: String,
    /// Question text shown to the user.
    #[serde(rename = "questionText")]
    pub text: String,
}

/// Password payload attached to an OTP confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordPayload {
    /// The user's chosen new password (recover/change flows).
    New(String),
    /// The fixed temporary placeholder (recover/block confirmations).
    Temporary,
}

impl PasswordPayload {
    /// The string actually sent to the update endpoint.
    pub fn secret(&self) -> &str {
        match self {
            PasswordPayload::New(password) => password,
            PasswordPayload::Temporary => TEMP_PASSWORD_PLACEHOLDER,
        }
    }
}

/// Everything the update endpoint needs to confirm a one-time code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpConfirmation {
    /// National ID the challenge was issued for.
    pub national_id: String,
    /// Username, when the flow captured one.
    pub username: Option<String>,
    /// Token identifying the active challenge.
    pub message_id: String,
    /// The entered code.
    pub code: String,
    /// New or temporary password, depending on the flow kind.
    pub password: PasswordPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_deserializes_camel_case() {
        let json = r#"{
            "username": "usuario123",
            "nationalId": "1723456789",
            "displayName": "Maria Perez",
            "phoneNumber": "+593991234567",
            "clientRecordId": "CR-0042"
        }"#;

        let identity: Identity = serde_json::from_str(json).unwrap();
        assert_eq!(identity.username.as_deref(), Some("usuario123"));
        assert_eq!(identity.national_id, "1723456789");
        assert_eq!(identity.display_name, "Maria Perez");
    }

    #[test]
    fn test_identity_username_is_optional() {
        let json = r#"{
            "nationalId": "1723456789",
            "displayName": "Maria Perez",
            "phoneNumber": "+593991234567",
            "clientRecordId": "CR-0042"
        }"#;

        let identity: Identity = serde_json::from_str(json).unwrap();
        assert!(identity.username.is_none());
    }

    #[test]
    fn test_security_question_wire_names() {
        let json = r#"{"questionCode": "Q3", "questionText": "Name of your first pet?"}"#;
        let question: SecurityQuestion = serde_json::from_str(json).unwrap();
        assert_eq!(question.code, "Q3");
        assert_eq!(question.text, "Name of your first pet?");
    }

    #[test]
    fn test_password_payload_secret() {
        let new = PasswordPayload::New("Abc123!@".to_string());
        assert_eq!(new.secret(), "Abc123!@");
        assert_eq!(PasswordPayload::Temporary.secret(), TEMP_PASSWORD_PLACEHOLDER);
    }
}

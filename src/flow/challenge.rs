//! Security-question challenge step.
//!
//! Fetches the customer's question set, draws one at random and checks
//! the submitted answer. The random draw is given business behavior
//! (anti-predictability), and a retry after expiry re-draws
//! independently.

use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use crate::gateway::types::{Identity, SecurityQuestion};
use crate::gateway::VerificationGateway;
use crate::{FlowError, Result};

/// Coordinates one security-question challenge for a verified identity.
pub struct SecurityChallengeCoordinator {
    gateway: Arc<dyn VerificationGateway>,
}

impl SecurityChallengeCoordinator {
    /// Create a coordinator over the given gateway.
    pub fn new(gateway: Arc<dyn VerificationGateway>) -> Self {
        Self { gateway }
    }

    /// Fetch the question set and select one uniformly at random.
    pub async fn fetch_challenge(&self, national_id: &str) -> Result<SecurityQuestion> {
        let mut questions = self.gateway.security_questions(national_id).await?;
        if questions.is_empty() {
            return Err(FlowError::SecurityQuestions);
        }
        let index = rand::rng().random_range(0..questions.len());
        let question = questions.swap_remove(index);
        debug!(code = %question.code, "security question selected");
        Ok(question)
    }

    /// Check the submitted answer against the backend.
    ///
    /// An empty answer is rejected locally before any network call.
    pub async fn check_answer(
        &self,
        national_id: &str,
        question_code: &str,
        answer: &str,
    ) -> Result<()> {
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(FlowError::FieldRequired);
        }
        self.gateway
            .validate_security_answer(national_id, question_code, answer)
            .await
    }

    /// Compare the national ID typed in the identity step against the
    /// one embedded in the verified identity.
    ///
    /// Local check only; a mismatch must never reach the backend.
    pub fn cross_check(identity: &Identity, entered_id: &str) -> Result<()> {
        let entered = entered_id.trim();
        if entered.is_empty() {
            return Err(FlowError::FieldRequired);
        }
        if identity.national_id != entered {
            return Err(FlowError::IdentityMismatch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::flow::FlowKind;
    use crate::gateway::types::OtpConfirmation;

    struct StubGateway {
        questions: Vec<SecurityQuestion>,
        expected_answer: String,
        answer_checks: AtomicUsize,
    }

    impl StubGateway {
        fn with_questions(codes: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                questions: codes
                    .iter()
                    .map(|c| SecurityQuestion {
                        code: c.to_string(),
                        text: format!("question {c}"),
                    })
                    .collect(),
                expected_answer: "fluffy".to_string(),
                answer_checks: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl VerificationGateway for StubGateway {
        async fn validate_username(&self, _: &str) -> Result<Identity> {
            unreachable!("not used in challenge tests")
        }

        async fn validate_national_id(&self, _: &str) -> Result<Identity> {
            unreachable!("not used in challenge tests")
        }

        async fn validate_password_format(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }

        async fn security_questions(&self, _: &str) -> Result<Vec<SecurityQuestion>> {
            Ok(self.questions.clone())
        }

        async fn validate_security_answer(&self, _: &str, _: &str, answer: &str) -> Result<()> {
            self.answer_checks.fetch_add(1, Ordering::SeqCst);
            if answer == self.expected_answer {
                Ok(())
            } else {
                Err(FlowError::invalid_answer(None))
            }
        }

        async fn request_otp(&self, _: &str, _: FlowKind) -> Result<String> {
            Ok("msg-1".to_string())
        }

        async fn confirm_otp_and_update(&self, _: &OtpConfirmation) -> Result<()> {
            Ok(())
        }
    }

    fn identity() -> Identity {
        Identity {
            username: Some("usuario123".to_string()),
            national_id: "1723456789".to_string(),
            display_name: "Maria Perez".to_string(),
            phone_number: "+593991234567".to_string(),
            client_record_id: "CR-0042".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fetch_challenge_picks_from_set() {
        let gateway = StubGateway::with_questions(&["Q1", "Q2", "Q3"]);
        let coordinator = SecurityChallengeCoordinator::new(gateway);

        let question = coordinator.fetch_challenge("1723456789").await.unwrap();
        assert!(["Q1", "Q2", "Q3"].contains(&question.code.as_str()));
    }

    #[tokio::test]
    async fn test_fetch_challenge_single_question() {
        let gateway = StubGateway::with_questions(&["Q7"]);
        let coordinator = SecurityChallengeCoordinator::new(gateway);

        let question = coordinator.fetch_challenge("1723456789").await.unwrap();
        assert_eq!(question.code, "Q7");
    }

    #[tokio::test]
    async fn test_fetch_challenge_draws_across_the_set() {
        let gateway = StubGateway::with_questions(&["Q1", "Q2", "Q3", "Q4"]);
        let coordinator = SecurityChallengeCoordinator::new(gateway);

        // Re-invocation draws independently; over enough draws every
        // question should appear.
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let q = coordinator.fetch_challenge("1723456789").await.unwrap();
            seen.insert(q.code);
        }
        assert_eq!(seen.len(), 4);
    }

    #[tokio::test]
    async fn test_fetch_challenge_empty_list_fails() {
        let gateway = StubGateway::with_questions(&[]);
        let coordinator = SecurityChallengeCoordinator::new(gateway);

        let result = coordinator.fetch_challenge("1723456789").await;
        assert_eq!(result.unwrap_err(), FlowError::SecurityQuestions);
    }

    #[tokio::test]
    async fn test_check_answer_accepts_match() {
        let gateway = StubGateway::with_questions(&["Q1"]);
        let coordinator = SecurityChallengeCoordinator::new(Arc::clone(&gateway) as Arc<dyn VerificationGateway>);

        assert!(coordinator
            .check_answer("1723456789", "Q1", "fluffy")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_check_answer_rejects_mismatch() {
        let gateway = StubGateway::with_questions(&["Q1"]);
        let coordinator = SecurityChallengeCoordinator::new(Arc::clone(&gateway) as Arc<dyn VerificationGateway>);

        let result = coordinator.check_answer("1723456789", "Q1", "rex").await;
        assert_eq!(
            result.unwrap_err(),
            FlowError::InvalidSecurityAnswer("incorrect answer".to_string())
        );
    }

    #[tokio::test]
    async fn test_check_answer_empty_is_local() {
        let gateway = StubGateway::with_questions(&["Q1"]);
        let coordinator = SecurityChallengeCoordinator::new(Arc::clone(&gateway) as Arc<dyn VerificationGateway>);

        let result = coordinator.check_answer("1723456789", "Q1", "   ").await;
        assert_eq!(result.unwrap_err(), FlowError::FieldRequired);
        // The empty answer never reached the backend
        assert_eq!(gateway.answer_checks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cross_check_match() {
        assert!(SecurityChallengeCoordinator::cross_check(&identity(), "1723456789").is_ok());
        assert!(SecurityChallengeCoordinator::cross_check(&identity(), " 1723456789 ").is_ok());
    }

    #[test]
    fn test_cross_check_mismatch() {
        assert_eq!(
            SecurityChallengeCoordinator::cross_check(&identity(), "1700000000").unwrap_err(),
            FlowError::IdentityMismatch
        );
    }

    #[test]
    fn test_cross_check_empty() {
        assert_eq!(
            SecurityChallengeCoordinator::cross_check(&identity(), "").unwrap_err(),
            FlowError::FieldRequired
        );
    }
}

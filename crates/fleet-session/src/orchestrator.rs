// SPDX-License-Identifier: MIT OR Apache-2.0
//! The session orchestrator: the per-turn protocol of §4.5.
//!
//! [`SessionOrchestrator`] owns a [`SessionRegistry`] and a
//! [`crate::chat::ChatBackend`], plus an optional
//! [`crate::validate::MicroRunner`]. It does not know about tools — mutation
//! dispatch is [`crate::tools::ToolRuntime`]'s job, driven by whatever the
//! backend's response asked for, outside this crate's per-turn loop.

use std::sync::Arc;

use chrono::Utc;
use fleet_core::{Turn, UserId};

use crate::cancel::{CancellationReason, CancellationToken};
use crate::chat::ChatBackend;
use crate::error::SessionError;
use crate::observe::{RuntimeObserver, SpanStatus};
use crate::registry::SessionRegistry;
use crate::validate::{GatedContext, MicroRunner, TaskContract, ValidationReceipt, VALIDATION_DISCLAIMER};

/// Outcome of running one chat turn.
pub struct TurnOutcome {
    /// The session's state after this turn was recorded.
    pub session_id: String,
    /// The (possibly repaired, possibly disclaimer-prefixed) response text.
    pub response: String,
    /// The validation record, if a [`MicroRunner`] was installed.
    pub validation: Option<ValidationReceipt>,
    /// Trace spans collected while running this turn, for attachment to an
    /// audit-log entry.
    pub trace: Vec<crate::observe::Span>,
}

/// Drives the per-turn protocol over a [`SessionRegistry`] for one backend.
pub struct SessionOrchestrator {
    registry: Arc<SessionRegistry>,
    backend: Arc<dyn ChatBackend>,
    runner: Option<Arc<dyn MicroRunner>>,
}

impl SessionOrchestrator {
    /// Wrap a registry and backend; `runner` is optional (§4.5 step 3: a
    /// session with none installed sends the raw message through).
    pub fn new(
        registry: Arc<SessionRegistry>,
        backend: Arc<dyn ChatBackend>,
        runner: Option<Arc<dyn MicroRunner>>,
    ) -> Self {
        Self { registry, backend, runner }
    }

    /// Run one turn for `(user_id, session_id)` (§4.5 "Per-turn protocol").
    ///
    /// Steps:
    /// 1. the user message is recorded in history once the turn settles
    ///    (recording happens together with the response so the pair lands
    ///    atomically in the bounded history);
    /// 2. if a [`MicroRunner`] is installed, `prepare` builds a contract and
    ///    augmented prompt, the backend is sent the augmented message,
    ///    `validate` checks the response, one repair round runs if needed,
    ///    and `finalize` settles the validation record;
    /// 3. otherwise the raw message goes straight to the backend;
    /// 4. the (possibly repaired) response is appended to history, enforcing
    ///    the 50-turn cap.
    pub async fn run_turn(
        &self,
        user_id: UserId,
        session_id: Option<String>,
        message: String,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, SessionError> {
        let mut observer = RuntimeObserver::new();
        let turn_span = observer.trace_collector().start_span("turn");

        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled(CancellationReason::UserRequested));
        }

        let (response, validation) = match &self.runner {
            Some(runner) => self.run_validated_turn(runner.as_ref(), &message, cancel, &mut observer, &turn_span).await?,
            None => {
                let send_span = observer.trace_collector().start_child_span("send", &turn_span);
                let response = self.send_or_cancel(&message, cancel).await?;
                observer.trace_collector().end_span(&send_span);
                (response, None)
            }
        };

        let now = Utc::now();
        let turn = Turn {
            user_message: message,
            model_response: response.clone(),
            timestamp: now,
        };
        let session = self.registry.push_turn(user_id, session_id, turn, now);

        observer.trace_collector().set_status(&turn_span, SpanStatus::Ok);
        observer.trace_collector().end_span(&turn_span);

        Ok(TurnOutcome {
            session_id: session.session_id,
            response,
            validation,
            trace: observer.trace_collector().spans().to_vec(),
        })
    }

    /// §4.5 step 2: prepare, send, validate, optionally repair once, finalize.
    async fn run_validated_turn(
        &self,
        runner: &dyn MicroRunner,
        message: &str,
        cancel: &CancellationToken,
        observer: &mut RuntimeObserver,
        parent_span: &str,
    ) -> Result<(String, Option<ValidationReceipt>), SessionError> {
        let prepare_span = observer.trace_collector().start_child_span("prepare", parent_span);
        let prepared = runner.prepare(message).await?;
        observer.trace_collector().end_span(&prepare_span);

        let send_span = observer.trace_collector().start_child_span("send", parent_span);
        let response_text = self.send_or_cancel(&prepared.augmented_message, cancel).await?;
        observer.trace_collector().end_span(&send_span);

        let (final_text, receipt) = self
            .validate_with_single_repair(
                runner,
                response_text,
                &prepared.contract,
                &prepared.gated_context,
                cancel,
                observer,
                parent_span,
            )
            .await?;

        runner.finalize(&receipt).await?;
        Ok((final_text, Some(receipt)))
    }

    /// Validate a response; on failure send `repair_prompt` once and
    /// revalidate. If still failing, prepend the fixed disclaimer rather
    /// than attempting a second repair (§4.5 step 2).
    async fn validate_with_single_repair(
        &self,
        runner: &dyn MicroRunner,
        response_text: String,
        contract: &TaskContract,
        gated_context: &GatedContext,
        cancel: &CancellationToken,
        observer: &mut RuntimeObserver,
        parent_span: &str,
    ) -> Result<(String, ValidationReceipt), SessionError> {
        let validate_span = observer.trace_collector().start_child_span("validate", parent_span);
        let outcome = runner.validate(&response_text, contract, gated_context).await?;
        observer.trace_collector().end_span(&validate_span);

        if !outcome.needs_repair {
            return Ok((response_text, outcome.receipt));
        }

        let repair_prompt = outcome.repair_prompt.ok_or_else(|| {
            SessionError::Corrupt("validator requested repair without a repair prompt".to_string())
        })?;

        let repair_span = observer.trace_collector().start_child_span("repair", parent_span);
        let repaired_text = self.send_or_cancel(&repair_prompt, cancel).await?;
        let repaired_outcome = runner.validate(&repaired_text, contract, gated_context).await?;
        observer.trace_collector().end_span(&repair_span);

        if repaired_outcome.needs_repair {
            let receipt = ValidationReceipt {
                passed: false,
                repaired: true,
                detail: repaired_outcome.receipt.detail,
            };
            return Ok((format!("{VALIDATION_DISCLAIMER}{repaired_text}"), receipt));
        }

        let receipt = ValidationReceipt {
            repaired: true,
            ..repaired_outcome.receipt
        };
        Ok((repaired_text, receipt))
    }

    async fn send_or_cancel(&self, message: &str, cancel: &CancellationToken) -> Result<String, SessionError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SessionError::Cancelled(CancellationReason::UserRequested)),
            result = self.backend.send(message) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::EchoBackend;
    use async_trait::async_trait;

    fn orchestrator_without_runner() -> SessionOrchestrator {
        SessionOrchestrator::new(
            Arc::new(SessionRegistry::new()),
            Arc::new(EchoBackend::new("echo: ")),
            None,
        )
    }

    #[tokio::test]
    async fn raw_turn_without_runner_records_history() {
        let orch = orchestrator_without_runner();
        let cancel = CancellationToken::new();
        let outcome = orch
            .run_turn(UserId::from("u1"), None, "hello".to_string(), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.response, "echo: hello");
        assert!(outcome.validation.is_none());
        assert_eq!(outcome.session_id, "default");
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_before_send() {
        let orch = orchestrator_without_runner();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = orch.run_turn(UserId::from("u1"), None, "hi".to_string(), &cancel).await;
        assert!(matches!(result, Err(SessionError::Cancelled(_))));
    }

    struct AlwaysFailRunner;

    #[async_trait]
    impl MicroRunner for AlwaysFailRunner {
        async fn prepare(&self, message: &str) -> Result<crate::validate::PrepareOutcome, SessionError> {
            Ok(crate::validate::PrepareOutcome {
                contract: TaskContract {
                    description: "must contain OK".to_string(),
                    task_type: None,
                },
                gated_context: GatedContext::default(),
                augmented_message: message.to_string(),
            })
        }

        async fn validate(
            &self,
            response_text: &str,
            _contract: &TaskContract,
            _gated_context: &GatedContext,
        ) -> Result<crate::validate::ValidateOutcome, SessionError> {
            let passed = response_text.contains("OK");
            Ok(crate::validate::ValidateOutcome {
                receipt: ValidationReceipt {
                    passed,
                    repaired: false,
                    detail: if passed { None } else { Some("missing OK".to_string()) },
                },
                needs_repair: !passed,
                repair_prompt: if passed { None } else { Some("please include OK".to_string()) },
            })
        }

        async fn finalize(&self, _receipt: &ValidationReceipt) -> Result<(), SessionError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn repeated_failure_after_repair_gets_disclaimer() {
        let orch = SessionOrchestrator::new(
            Arc::new(SessionRegistry::new()),
            Arc::new(EchoBackend::new("")),
            Some(Arc::new(AlwaysFailRunner)),
        );
        let cancel = CancellationToken::new();
        let outcome = orch
            .run_turn(UserId::from("u1"), None, "hello".to_string(), &cancel)
            .await
            .unwrap();
        assert!(outcome.response.starts_with(VALIDATION_DISCLAIMER));
        assert!(!outcome.validation.unwrap().passed);
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Response validation against a task contract (§4.5 step 2).
//!
//! A [`MicroRunner`] is optional: a session with none installed sends the
//! raw user message straight to the [`crate::chat::ChatBackend`] and skips
//! contract/repair handling entirely (§4.5 step 3).

use async_trait::async_trait;
use fleet_core::RuleId;
use fleet_rule_engine::RuleEngine;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::error::SessionError;

/// What a model response must satisfy for this turn, built by
/// [`MicroRunner::prepare`] from the raw user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContract {
    /// Free-form description of the constraint a response must meet,
    /// interpreted by whatever [`MicroRunner`] built it.
    pub description: String,
    /// Task type used for rule-context selection (`fleet-rule-engine`
    /// scope matching); `None` matches only unscoped rules.
    pub task_type: Option<String>,
}

/// Retrieval/configuration context gated into a turn's prompt by
/// [`MicroRunner::prepare`] — surfaced behavior rules, prior frames, or
/// whatever else the installed runner chooses to inject.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatedContext {
    /// Rule text surfaced for this turn, highest-priority first
    /// (`fleet-rule-engine::RuleEngine::for_context`).
    pub surfaced_rules: Vec<String>,
}

/// Result of [`MicroRunner::prepare`]: the contract, the gated context, and
/// the message actually sent to the backend (user message plus whatever
/// prefix the runner injected).
pub struct PrepareOutcome {
    /// The contract the eventual response is validated against.
    pub contract: TaskContract,
    /// The context gated into the prompt.
    pub gated_context: GatedContext,
    /// The message to send to the chat backend, in place of the raw one.
    pub augmented_message: String,
}

/// A structured record of one validation pass, attached to the turn's
/// eventual receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReceipt {
    /// True if the response satisfied its contract without repair.
    pub passed: bool,
    /// True if a repair round was attempted (regardless of its outcome).
    pub repaired: bool,
    /// Human-readable detail, e.g. which constraint failed.
    pub detail: Option<String>,
}

/// Result of [`MicroRunner::validate`].
pub struct ValidateOutcome {
    /// The validation record to attach to the turn's receipt.
    pub receipt: ValidationReceipt,
    /// True if the response failed and a single repair attempt should run.
    pub needs_repair: bool,
    /// The prompt to send for the one allowed repair attempt, required
    /// when `needs_repair` is true.
    pub repair_prompt: Option<String>,
}

/// Fixed text prepended to a response that still fails validation after
/// its one repair attempt (§4.5 step 2).
pub const VALIDATION_DISCLAIMER: &str =
    "[unverified: this response could not be validated against its task contract]\n\n";

/// A response validator plugged into the per-turn protocol (§4.5 step 2).
///
/// Installed per session orchestrator, not per turn — `prepare` runs before
/// the backend call, `validate` after it, and `finalize` once a (possibly
/// repaired) response has settled.
#[async_trait]
pub trait MicroRunner: Send + Sync {
    /// Build the contract, gated context, and augmented prompt for `message`.
    async fn prepare(&self, message: &str) -> Result<PrepareOutcome, SessionError>;

    /// Check `response_text` against `contract`/`gated_context`.
    async fn validate(
        &self,
        response_text: &str,
        contract: &TaskContract,
        gated_context: &GatedContext,
    ) -> Result<ValidateOutcome, SessionError>;

    /// Record the settled validation outcome (e.g. fold a confirm/
    /// disconfirm signal back into the surfaced rules' confidence).
    async fn finalize(&self, receipt: &ValidationReceipt) -> Result<(), SessionError>;
}

/// A [`MicroRunner`] that only gates a user's surfaced
/// [`fleet_core::BehaviorRule`]s into the prompt (`fleet-rule-engine`'s
/// context-gating selection) and otherwise always passes validation.
///
/// This is the default runner a caller installs when it has no
/// vendor-specific response contract of its own: its only job is rule
/// context assembly and folding the turn's outcome back into rule
/// confidence, which every session needs regardless of what else validates
/// a response.
pub struct RuleGatedRunner {
    engine: Mutex<RuleEngine>,
    task_type: Option<String>,
    surfaced: Mutex<Vec<RuleId>>,
}

impl RuleGatedRunner {
    /// Build a runner over an already-loaded rule set, gating context for
    /// turns tagged with `task_type` (or every turn, if `None`).
    pub fn new(rules: Vec<fleet_core::BehaviorRule>, task_type: Option<String>) -> Self {
        Self {
            engine: Mutex::new(RuleEngine::new(rules)),
            task_type,
            surfaced: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MicroRunner for RuleGatedRunner {
    async fn prepare(&self, message: &str) -> Result<PrepareOutcome, SessionError> {
        let engine = self.engine.lock().expect("rule engine lock poisoned");
        let selected = engine.for_context_default(self.task_type.as_deref());
        let surfaced_rules: Vec<String> = selected.iter().map(|r| r.text.clone()).collect();
        *self.surfaced.lock().expect("surfaced lock poisoned") =
            selected.iter().map(|r| r.id.clone()).collect();

        let augmented_message = if surfaced_rules.is_empty() {
            message.to_string()
        } else {
            format!("Known rules:\n{}\n\n{message}", surfaced_rules.join("\n"))
        };

        Ok(PrepareOutcome {
            contract: TaskContract {
                description: "no vendor-specific contract installed".to_string(),
                task_type: self.task_type.clone(),
            },
            gated_context: GatedContext { surfaced_rules },
            augmented_message,
        })
    }

    async fn validate(
        &self,
        _response_text: &str,
        _contract: &TaskContract,
        _gated_context: &GatedContext,
    ) -> Result<ValidateOutcome, SessionError> {
        Ok(ValidateOutcome {
            receipt: ValidationReceipt { passed: true, repaired: false, detail: None },
            needs_repair: false,
            repair_prompt: None,
        })
    }

    async fn finalize(&self, receipt: &ValidationReceipt) -> Result<(), SessionError> {
        let ids = self.surfaced.lock().expect("surfaced lock poisoned").clone();
        let mut engine = self.engine.lock().expect("rule engine lock poisoned");
        for id in ids {
            engine.observe(&id, receipt.passed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{BehaviorRule, RuleScope, RuleSeverity, UserId};

    fn confident_rule(id: &str) -> BehaviorRule {
        let mut rule = BehaviorRule::new(
            RuleId::from(id),
            UserId::from("u1"),
            "always use metric units".to_string(),
            RuleScope::default(),
            RuleSeverity::Must,
        );
        for _ in 0..20 {
            rule.observe(true);
        }
        rule
    }

    #[tokio::test]
    async fn prepare_surfaces_confident_rule_text_into_prompt() {
        let runner = RuleGatedRunner::new(vec![confident_rule("r1")], None);
        let prepared = runner.prepare("convert 5 miles").await.unwrap();
        assert!(prepared.augmented_message.contains("always use metric units"));
        assert_eq!(prepared.gated_context.surfaced_rules.len(), 1);
    }

    #[tokio::test]
    async fn prepare_skips_rules_below_default_threshold() {
        let fresh = BehaviorRule::new(
            RuleId::from("r1"),
            UserId::from("u1"),
            "never used".to_string(),
            RuleScope::default(),
            RuleSeverity::Should,
        );
        let runner = RuleGatedRunner::new(vec![fresh], None);
        let prepared = runner.prepare("hi").await.unwrap();
        assert_eq!(prepared.augmented_message, "hi");
    }

    #[tokio::test]
    async fn finalize_always_passes_without_repair() {
        let runner = RuleGatedRunner::new(vec![confident_rule("r1")], None);
        let prepared = runner.prepare("hi").await.unwrap();
        let outcome = runner
            .validate("anything", &prepared.contract, &prepared.gated_context)
            .await
            .unwrap();
        assert!(!outcome.needs_repair);
        runner.finalize(&outcome.receipt).await.unwrap();
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Scope matching and context-gating selection over a user's
//! [`BehaviorRule`]s (§3).
//!
//! `BehaviorRule` itself (its Beta-Binomial `confidence()`/`observe()`
//! posterior update) lives in `fleet-core`, since it is plain entity
//! behaviour shared by every crate that touches the type. This crate is the
//! layer above: given a user's whole rule set, which rules apply to the
//! turn currently being handled, and which of those are confident enough
//! to actually surface into the session orchestrator's context (§4.5)
//! rather than silently tracked in the background.

use fleet_core::{BehaviorRule, RuleScope, RuleSeverity};

/// The confidence a rule must reach before it is surfaced into a turn's
/// context rather than tracked silently. Chosen so that a rule needs
/// several confirming observations past its prior before it starts
/// influencing behaviour (prior confidence is `2/7 ≈ 0.286`).
pub const DEFAULT_SURFACE_THRESHOLD: f64 = 0.6;

/// True if `scope` applies to a turn tagged with `task_type` (§3: a scope
/// with no `task_type` set applies to every turn; one with a `task_type`
/// set applies only to turns tagged with that exact type).
pub fn scope_matches(scope: &RuleScope, task_type: Option<&str>) -> bool {
    match (&scope.task_type, task_type) {
        (None, _) => true,
        (Some(scoped), Some(turn)) => scoped == turn,
        (Some(_), None) => false,
    }
}

/// Order rules for presentation: `must` before `should` before `style`,
/// and within a tier, highest confidence first.
fn severity_rank(severity: RuleSeverity) -> u8 {
    match severity {
        RuleSeverity::Must => 0,
        RuleSeverity::Should => 1,
        RuleSeverity::Style => 2,
    }
}

/// A user's full set of learned behavior rules, with selection helpers for
/// the session orchestrator's per-turn context assembly.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<BehaviorRule>,
}

impl RuleEngine {
    /// Build an engine over an already-loaded rule set (typically fetched
    /// by the caller from a store scoped to one user before the turn
    /// begins).
    pub fn new(rules: Vec<BehaviorRule>) -> Self {
        Self { rules }
    }

    /// All rules currently held.
    pub fn rules(&self) -> &[BehaviorRule] {
        &self.rules
    }

    /// Rules whose scope applies to `task_type`, unordered.
    pub fn applicable(&self, task_type: Option<&str>) -> Vec<&BehaviorRule> {
        self.rules
            .iter()
            .filter(|r| scope_matches(&r.scope, task_type))
            .collect()
    }

    /// Rules to surface into a turn's context: scope-applicable, at or
    /// above `min_confidence`, ordered `must` > `should` > `style` and by
    /// descending confidence within a tier (§4.5 context gating).
    pub fn for_context(&self, task_type: Option<&str>, min_confidence: f64) -> Vec<&BehaviorRule> {
        let mut selected: Vec<&BehaviorRule> = self
            .applicable(task_type)
            .into_iter()
            .filter(|r| r.confidence() >= min_confidence)
            .collect();

        selected.sort_by(|a, b| {
            severity_rank(a.severity)
                .cmp(&severity_rank(b.severity))
                .then(b.confidence().partial_cmp(&a.confidence()).unwrap_or(std::cmp::Ordering::Equal))
        });
        selected
    }

    /// Rules to surface using [`DEFAULT_SURFACE_THRESHOLD`].
    pub fn for_context_default(&self, task_type: Option<&str>) -> Vec<&BehaviorRule> {
        self.for_context(task_type, DEFAULT_SURFACE_THRESHOLD)
    }

    /// Fold an observation into the rule identified by `id`, returning
    /// `false` if no such rule is held. Updates only the in-memory copy;
    /// the caller persists the new `alpha`/`beta`/`observation_count`.
    pub fn observe(&mut self, id: &fleet_core::RuleId, confirmed: bool) -> bool {
        match self.rules.iter_mut().find(|r| &r.id == id) {
            Some(rule) => {
                rule.observe(confirmed);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{RuleId, UserId};

    fn rule(task_type: Option<&str>, severity: RuleSeverity) -> BehaviorRule {
        BehaviorRule::new(
            RuleId::from("r1"),
            UserId::from("u1"),
            "text".into(),
            RuleScope {
                task_type: task_type.map(String::from),
            },
            severity,
        )
    }

    #[test]
    fn unscoped_rule_matches_any_task_type() {
        let scope = RuleScope::default();
        assert!(scope_matches(&scope, Some("import")));
        assert!(scope_matches(&scope, None));
    }

    #[test]
    fn scoped_rule_matches_only_its_task_type() {
        let scope = RuleScope {
            task_type: Some("import".into()),
        };
        assert!(scope_matches(&scope, Some("import")));
        assert!(!scope_matches(&scope, Some("composition")));
        assert!(!scope_matches(&scope, None));
    }

    #[test]
    fn applicable_filters_by_scope() {
        let engine = RuleEngine::new(vec![
            rule(Some("import"), RuleSeverity::Must),
            rule(Some("composition"), RuleSeverity::Must),
        ]);
        assert_eq!(engine.applicable(Some("import")).len(), 1);
    }

    #[test]
    fn for_context_excludes_low_confidence_rules() {
        let engine = RuleEngine::new(vec![rule(None, RuleSeverity::Must)]);
        // Prior confidence is 2/7, below the default threshold.
        assert!(engine.for_context_default(None).is_empty());
        assert!(!engine.for_context(None, 0.1).is_empty());
    }

    #[test]
    fn for_context_orders_must_before_should() {
        let mut should_rule = rule(None, RuleSeverity::Should);
        should_rule.observe(true);
        should_rule.observe(true);
        should_rule.observe(true);
        let mut must_rule = rule(None, RuleSeverity::Must);
        must_rule.observe(true);
        must_rule.observe(true);

        let engine = RuleEngine::new(vec![should_rule, must_rule]);
        let ordered = engine.for_context(None, 0.0);
        assert_eq!(ordered[0].severity, RuleSeverity::Must);
        assert_eq!(ordered[1].severity, RuleSeverity::Should);
    }

    #[test]
    fn observe_updates_matching_rule_only() {
        let mut engine = RuleEngine::new(vec![rule(None, RuleSeverity::Must)]);
        let id = RuleId::from("r1");
        let before = engine.rules()[0].confidence();
        assert!(engine.observe(&id, true));
        assert!(engine.rules()[0].confidence() > before);
        assert!(!engine.observe(&RuleId::from("missing"), true));
    }
}

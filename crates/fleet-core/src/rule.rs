//! Behavior rule entity: Beta-Binomial confidence tracking (§3).

use crate::ids::{RuleId, UserId};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How strictly a [`BehaviorRule`] should be enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RuleSeverity {
    /// Hard requirement; violating it should block the action.
    Must,
    /// Strong preference; violating it should be flagged but not block.
    Should,
    /// Stylistic preference only.
    Style,
}

/// Narrows where a rule applies, e.g. to a specific task type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RuleScope {
    /// If set, this rule only applies to turns tagged with this task type.
    pub task_type: Option<String>,
}

/// A learned behavior constraint with Beta-Binomial confidence tracking
/// (§3). `alpha`/`beta` are the Beta distribution's shape parameters,
/// seeded at `2.0`/`5.0` (a weak prior favoring "not yet confirmed") and
/// updated as observations accrue.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BehaviorRule {
    /// Opaque id.
    pub id: RuleId,
    /// Owning user.
    pub user_id: UserId,
    /// Human-legible rule text.
    pub text: String,
    /// Where this rule applies.
    pub scope: RuleScope,
    /// Beta distribution `alpha` (successes + prior), must be >= 0.
    pub alpha: f64,
    /// Beta distribution `beta` (failures + prior), must be >= 0.
    pub beta: f64,
    /// Total number of observations folded into `alpha`/`beta` so far.
    pub observation_count: u64,
    /// Enforcement strictness.
    pub severity: RuleSeverity,
}

impl BehaviorRule {
    /// The prior used for a freshly created rule with no observations yet.
    pub const PRIOR_ALPHA: f64 = 2.0;
    /// The prior used for a freshly created rule with no observations yet.
    pub const PRIOR_BETA: f64 = 5.0;

    /// Construct a new rule at its prior, before any observation.
    pub fn new(id: RuleId, user_id: UserId, text: String, scope: RuleScope, severity: RuleSeverity) -> Self {
        Self {
            id,
            user_id,
            text,
            scope,
            alpha: Self::PRIOR_ALPHA,
            beta: Self::PRIOR_BETA,
            observation_count: 0,
            severity,
        }
    }

    /// The current posterior mean confidence, `alpha / (alpha + beta)`.
    pub fn confidence(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// Fold one more observation into the Beta-Binomial posterior: a
    /// confirming observation increments `alpha`, a disconfirming one
    /// increments `beta`.
    pub fn observe(&mut self, confirmed: bool) {
        if confirmed {
            self.alpha += 1.0;
        } else {
            self.beta += 1.0;
        }
        self.observation_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_rule() -> BehaviorRule {
        BehaviorRule::new(
            RuleId::from("r1"),
            UserId::from("u1"),
            "never auto-apply below_deck changes".into(),
            RuleScope::default(),
            RuleSeverity::Must,
        )
    }

    #[test]
    fn fresh_rule_starts_at_prior() {
        let rule = new_rule();
        assert_eq!(rule.alpha, BehaviorRule::PRIOR_ALPHA);
        assert_eq!(rule.beta, BehaviorRule::PRIOR_BETA);
        assert_eq!(rule.observation_count, 0);
    }

    #[test]
    fn confidence_matches_prior_ratio() {
        let rule = new_rule();
        assert!((rule.confidence() - 2.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn confirming_observation_increases_confidence() {
        let mut rule = new_rule();
        let before = rule.confidence();
        rule.observe(true);
        assert!(rule.confidence() > before);
        assert_eq!(rule.observation_count, 1);
    }

    #[test]
    fn disconfirming_observation_decreases_confidence() {
        let mut rule = new_rule();
        let before = rule.confidence();
        rule.observe(false);
        assert!(rule.confidence() < before);
    }

    #[test]
    fn many_confirmations_converge_toward_one() {
        let mut rule = new_rule();
        for _ in 0..200 {
            rule.observe(true);
        }
        assert!(rule.confidence() > 0.95);
    }
}

//! One-shot auth tokens and conversational session/frame entities (§3, §4.5).

use crate::ids::{FrameId, TokenId, UserId};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Discriminates the two one-shot token kinds that share a table shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerifyTokenType {
    /// Email verification token, issued at sign-up.
    Verify,
    /// Password reset token, issued by forgot-password.
    Reset,
}

/// A one-shot email-verification or password-reset token. Consumed on
/// redemption; a second redemption attempt must fail `INVALID_PARAM` (§8).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VerifyToken {
    /// Opaque token value.
    pub token: TokenId,
    /// Which flow this token belongs to.
    pub token_type: VerifyTokenType,
    /// Owning user.
    pub user_id: UserId,
    /// Expiry; also naturally invalidated once consumed.
    pub expires_at: DateTime<Utc>,
    /// Set once redeemed; a set value means any further redemption fails.
    pub consumed_at: Option<DateTime<Utc>>,
}

impl VerifyToken {
    /// True if the token cannot be redeemed: already consumed or past expiry.
    pub fn is_spent(&self, now: DateTime<Utc>) -> bool {
        self.consumed_at.is_some() || now >= self.expires_at
    }
}

/// Alias kept for call sites that only ever deal with reset tokens; the
/// underlying shape is identical (`token_type` discriminates).
pub type ResetToken = VerifyToken;

/// One `{user, model}` exchange retained in a [`ChatSession`]'s history.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Turn {
    /// The user's message.
    pub user_message: String,
    /// The (possibly repaired) model response.
    pub model_response: String,
    /// When this turn was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Bounded in-memory conversational context keyed by `(user, sessionId)`
/// (§3, §4.5). TTL and cap enforcement live in `fleet-session`; this type is
/// the plain data shape.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChatSession {
    /// Owning user.
    pub user_id: UserId,
    /// Session key; `"default"` for callers that do not supply one.
    pub session_id: String,
    /// Ordered turn history, oldest first. Capped at 50 turns (100 messages)
    /// by the orchestrator's pair-drop rule.
    pub turns: Vec<Turn>,
    /// Last time this session was touched by a turn.
    pub last_access: DateTime<Utc>,
}

impl ChatSession {
    /// Maximum number of turns retained; overflow drops the oldest pair (§4.5).
    pub const MAX_TURNS: usize = 50;

    /// Create a fresh, empty session for `user_id` at `session_id` (or the
    /// default key if `session_id` is `None`).
    pub fn new(user_id: UserId, session_id: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            session_id: session_id.unwrap_or_else(|| "default".to_string()),
            turns: Vec::new(),
            last_access: now,
        }
    }

    /// True if this session is eligible for TTL eviction: non-default id and
    /// idle at or past `ttl` since `last_access` (§8: "accessed exactly at
    /// lastAccess + 30min is eligible").
    pub fn is_evictable(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        self.session_id != "default" && now >= self.last_access + ttl
    }

    /// Append a turn, touch `last_access`, and enforce the 50-turn cap by
    /// dropping the oldest pair on overflow.
    pub fn push_turn(&mut self, turn: Turn, now: DateTime<Utc>) {
        self.turns.push(turn);
        if self.turns.len() > Self::MAX_TURNS {
            self.turns.remove(0);
        }
        self.last_access = now;
    }
}

/// A persisted memory summary of a past conversational turn (§3), distinct
/// from the in-memory [`ChatSession`]: frames survive process restarts.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Frame {
    /// Opaque frame id.
    pub id: FrameId,
    /// Owning user.
    pub user_id: UserId,
    /// Conversation branch this frame belongs to.
    pub branch: String,
    /// Short human-legible summary of the turn.
    pub summary: String,
    /// Extracted keywords for retrieval.
    pub keywords: Vec<String>,
    /// When the summarised turn occurred.
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn verify_token_not_spent_when_fresh() {
        let now = Utc::now();
        let tok = VerifyToken {
            token: TokenId::from("t"),
            token_type: VerifyTokenType::Verify,
            user_id: UserId::from("u"),
            expires_at: now + Duration::hours(1),
            consumed_at: None,
        };
        assert!(!tok.is_spent(now));
    }

    #[test]
    fn verify_token_spent_once_consumed() {
        let now = Utc::now();
        let tok = VerifyToken {
            token: TokenId::from("t"),
            token_type: VerifyTokenType::Reset,
            user_id: UserId::from("u"),
            expires_at: now + Duration::hours(1),
            consumed_at: Some(now),
        };
        assert!(tok.is_spent(now));
    }

    #[test]
    fn verify_token_spent_when_expired() {
        let now = Utc::now();
        let tok = VerifyToken {
            token: TokenId::from("t"),
            token_type: VerifyTokenType::Verify,
            user_id: UserId::from("u"),
            expires_at: now - Duration::seconds(1),
            consumed_at: None,
        };
        assert!(tok.is_spent(now));
    }

    #[test]
    fn default_session_id_is_default_string() {
        let s = ChatSession::new(UserId::from("u"), None, Utc::now());
        assert_eq!(s.session_id, "default");
    }

    #[test]
    fn default_session_never_evicted() {
        let now = Utc::now();
        let s = ChatSession::new(UserId::from("u"), None, now - Duration::hours(2));
        assert!(!s.is_evictable(now, Duration::minutes(30)));
    }

    #[test]
    fn non_default_session_evictable_at_exact_ttl_boundary() {
        let now = Utc::now();
        let s = ChatSession::new(
            UserId::from("u"),
            Some("custom".into()),
            now - Duration::minutes(30),
        );
        assert!(s.is_evictable(now, Duration::minutes(30)));
    }

    #[test]
    fn push_turn_drops_oldest_pair_on_overflow() {
        let mut now = Utc::now();
        let mut s = ChatSession::new(UserId::from("u"), Some("x".into()), now);
        for i in 0..ChatSession::MAX_TURNS + 3 {
            now += Duration::seconds(1);
            s.push_turn(
                Turn {
                    user_message: format!("msg-{i}"),
                    model_response: format!("resp-{i}"),
                    timestamp: now,
                },
                now,
            );
        }
        assert_eq!(s.turns.len(), ChatSession::MAX_TURNS);
        assert_eq!(s.turns.first().unwrap().user_message, "msg-3");
    }
}

//! In-memory registry of live [`ChatSession`]s (§4.5, §5).
//!
//! Sessions never touch the database directly; they are a bounded, best-
//! effort conversational cache keyed by `(user_id, session_id)`. Losing one
//! on restart is acceptable (§9) — durable memory lives in `frames`.

use chrono::{DateTime, Duration, Utc};
use fleet_core::{ChatSession, Turn, UserId};
use std::collections::HashMap;
use std::sync::Mutex;

/// Idle TTL after which a non-default session becomes eligible for eviction.
pub fn session_ttl() -> Duration {
    Duration::minutes(30)
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct SessionKey {
    user_id: UserId,
    session_id: String,
}

/// Thread-safe registry of [`ChatSession`]s, one entry per `(user, session)`.
///
/// Mutation is serialized per session by virtue of the whole map living
/// behind a single [`Mutex`] — §5 calls for "serialized per session id", and
/// a single lock is the simplest correct realization of that given the
/// registry is not expected to be a throughput bottleneck (chat turns are
/// already serialized end-to-end by the model round trip).
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionKey, ChatSession>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the session for `(user_id, session_id)`, creating it if absent.
    pub fn get_or_create(
        &self,
        user_id: UserId,
        session_id: Option<String>,
        now: DateTime<Utc>,
    ) -> ChatSession {
        let key = SessionKey {
            user_id: user_id.clone(),
            session_id: session_id.clone().unwrap_or_else(|| "default".to_string()),
        };
        let mut sessions = self.sessions.lock().expect("session registry lock poisoned");
        sessions
            .entry(key)
            .or_insert_with(|| ChatSession::new(user_id, session_id, now))
            .clone()
    }

    /// Append a turn to the named session, creating it first if absent.
    pub fn push_turn(
        &self,
        user_id: UserId,
        session_id: Option<String>,
        turn: Turn,
        now: DateTime<Utc>,
    ) -> ChatSession {
        let key = SessionKey {
            user_id: user_id.clone(),
            session_id: session_id.clone().unwrap_or_else(|| "default".to_string()),
        };
        let mut sessions = self.sessions.lock().expect("session registry lock poisoned");
        let session = sessions
            .entry(key)
            .or_insert_with(|| ChatSession::new(user_id, session_id, now));
        session.push_turn(turn, now);
        session.clone()
    }

    /// Drop every session whose `last_access` is at or past [`session_ttl`].
    /// The default session per user is never evicted (§8).
    ///
    /// Intended to be driven by a periodic reaper task in `fleet-server`;
    /// never invoked from within a test, which is why it takes `now`
    /// explicitly rather than calling `Utc::now()` itself.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.lock().expect("session registry lock poisoned");
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_evictable(now, session_ttl()));
        before - sessions.len()
    }

    /// Number of sessions currently tracked, for diagnostics.
    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session registry lock poisoned").len()
    }

    /// True if no sessions are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(now: DateTime<Utc>) -> Turn {
        Turn {
            user_message: "hi".to_string(),
            model_response: "hello".to_string(),
            timestamp: now,
        }
    }

    #[test]
    fn get_or_create_makes_default_session() {
        let reg = SessionRegistry::new();
        let now = Utc::now();
        let session = reg.get_or_create(UserId::from("u1"), None, now);
        assert_eq!(session.session_id, "default");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn get_or_create_is_idempotent_per_key() {
        let reg = SessionRegistry::new();
        let now = Utc::now();
        reg.get_or_create(UserId::from("u1"), Some("a".into()), now);
        reg.get_or_create(UserId::from("u1"), Some("a".into()), now);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn distinct_users_get_distinct_sessions() {
        let reg = SessionRegistry::new();
        let now = Utc::now();
        reg.get_or_create(UserId::from("u1"), None, now);
        reg.get_or_create(UserId::from("u2"), None, now);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn push_turn_accumulates_history() {
        let reg = SessionRegistry::new();
        let now = Utc::now();
        reg.push_turn(UserId::from("u1"), Some("s".into()), turn(now), now);
        let session = reg.push_turn(UserId::from("u1"), Some("s".into()), turn(now), now);
        assert_eq!(session.turns.len(), 2);
    }

    #[test]
    fn evict_expired_drops_stale_non_default_sessions() {
        let reg = SessionRegistry::new();
        let stale = Utc::now() - Duration::hours(1);
        reg.get_or_create(UserId::from("u1"), Some("stale".into()), stale);
        reg.get_or_create(UserId::from("u1"), None, stale);
        let now = Utc::now();
        let evicted = reg.evict_expired(now);
        assert_eq!(evicted, 1);
        assert_eq!(reg.len(), 1);
    }
}

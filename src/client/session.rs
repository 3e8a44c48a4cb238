use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use super::kv::KeyValueStore;

pub const REMEMBER_ME_KEY: &str = "daypat.remember_me";
pub const SESSION_ID_KEY: &str = "daypat.session_id";
pub const LAST_SESSION_KEY: &str = "daypat.last_session_id";

/// Remember-me preference and new-session detection. The persistent store
/// keeps the id of the last session seen; when it differs from the current
/// one and the user did not ask to be remembered, the app should sign out.
#[derive(Clone)]
pub struct SessionTracker {
    persistent: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
}

impl SessionTracker {
    pub fn new(persistent: Arc<dyn KeyValueStore>, session: Arc<dyn KeyValueStore>) -> Self {
        Self { persistent, session }
    }

    /// Defaults to `false` when unset or unreadable.
    pub fn get_remember_me(&self) -> bool {
        match self.persistent.get(REMEMBER_ME_KEY) {
            Ok(v) => v.as_deref() == Some("true"),
            Err(e) => {
                warn!(error = %e, "remember-me flag unreadable");
                false
            }
        }
    }

    pub fn set_remember_me(&self, remember: bool) {
        let value = if remember { "true" } else { "false" };
        if let Err(e) = self.persistent.set(REMEMBER_ME_KEY, value) {
            warn!(error = %e, "remember-me flag not saved");
        }
    }

    fn current_session_id(&self) -> anyhow::Result<String> {
        if let Some(id) = self.session.get(SESSION_ID_KEY)? {
            return Ok(id);
        }
        let id = Uuid::new_v4().to_string();
        self.session.set(SESSION_ID_KEY, &id)?;
        Ok(id)
    }

    fn check(&self) -> anyhow::Result<bool> {
        let current = self.current_session_id()?;
        let last = self.persistent.get(LAST_SESSION_KEY)?;

        let Some(last) = last else {
            self.persistent.set(LAST_SESSION_KEY, &current)?;
            debug!("first session recorded");
            return Ok(false);
        };
        if self.get_remember_me() {
            self.persistent.set(LAST_SESSION_KEY, &current)?;
            return Ok(false);
        }
        if last != current {
            self.persistent.set(LAST_SESSION_KEY, &current)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Whether a session-only login from an earlier session should be
    /// dropped now. Storage failures answer `false`.
    pub fn should_sign_out_on_new_session(&self) -> bool {
        self.check().unwrap_or_else(|e| {
            warn!(error = %e, "session check failed, keeping the user signed in");
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::kv::{testing::BrokenStore, MemoryStore};

    fn tracker(persistent: &Arc<MemoryStore>) -> SessionTracker {
        // Every tracker gets a brand new session store: a new session.
        SessionTracker::new(persistent.clone(), Arc::new(MemoryStore::new()))
    }

    #[test]
    fn first_visit_never_signs_out() {
        let persistent = Arc::new(MemoryStore::new());
        let t = tracker(&persistent);
        assert!(!t.should_sign_out_on_new_session());
        assert!(persistent.get(LAST_SESSION_KEY).unwrap().is_some());
    }

    #[test]
    fn same_session_stays_signed_in() {
        let persistent = Arc::new(MemoryStore::new());
        let t = tracker(&persistent);
        assert!(!t.should_sign_out_on_new_session());
        assert!(!t.should_sign_out_on_new_session());
    }

    #[test]
    fn new_session_without_remember_me_signs_out_once() {
        let persistent = Arc::new(MemoryStore::new());
        assert!(!tracker(&persistent).should_sign_out_on_new_session());

        let next = tracker(&persistent);
        assert!(next.should_sign_out_on_new_session());
        // The new id is now the recorded one.
        assert!(!next.should_sign_out_on_new_session());
    }

    #[test]
    fn remember_me_keeps_new_sessions_signed_in() {
        let persistent = Arc::new(MemoryStore::new());
        let first = tracker(&persistent);
        first.set_remember_me(true);
        assert!(first.get_remember_me());
        assert!(!first.should_sign_out_on_new_session());

        let next = tracker(&persistent);
        assert!(!next.should_sign_out_on_new_session());
        assert_eq!(
            persistent.get(LAST_SESSION_KEY).unwrap(),
            next.session.get(SESSION_ID_KEY).unwrap()
        );
    }

    #[test]
    fn storage_failures_never_sign_out() {
        let broken = SessionTracker::new(Arc::new(BrokenStore), Arc::new(BrokenStore));
        assert!(!broken.should_sign_out_on_new_session());
        assert!(!broken.get_remember_me());
        broken.set_remember_me(true);

        let half = SessionTracker::new(Arc::new(BrokenStore), Arc::new(MemoryStore::new()));
        assert!(!half.should_sign_out_on_new_session());
    }
}

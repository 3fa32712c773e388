use std::collections::HashMap;
use std::sync::Mutex;

use log::{debug, error};

use crate::auth::SessionId;

type Items = HashMap<String, String>;

/// Per-session key/values, held in memory only. A session's items go away on
/// restart, or once its last item is removed.
#[derive(Default)]
pub struct SessionStorage {
    sessions: Mutex<HashMap<SessionId, Items>>,
}

impl SessionStorage {
    fn with<R>(&self, f: impl FnOnce(&mut HashMap<SessionId, Items>) -> R) -> R {
        let mut sessions = self.sessions.lock().unwrap_or_else(|poisoned| {
            error!("session storage lock poisoned, continuing");
            poisoned.into_inner()
        });
        f(&mut sessions)
    }

    pub fn get_item(&self, session_id: &SessionId, key: &str) -> Option<String> {
        self.with(|sessions| sessions.get(session_id)?.get(key).cloned())
    }

    pub fn set_item(&self, session_id: &SessionId, key: &str, value: String) {
        debug!("session {session_id}: set {key}");
        self.with(|sessions| {
            sessions
                .entry(*session_id)
                .or_default()
                .insert(key.into(), value);
        })
    }

    pub fn remove_item(&self, session_id: &SessionId, key: &str) -> bool {
        debug!("session {session_id}: remove {key}");
        self.with(|sessions| {
            let Some(items) = sessions.get_mut(session_id) else {
                return false;
            };
            let removed = items.remove(key).is_some();
            if items.is_empty() {
                sessions.remove(session_id);
            }
            removed
        })
    }

    /// Drops every session other than `keep` whose `key` item matches.
    pub fn remove_others(&self, keep: &SessionId, key: &str, matches: impl Fn(&str) -> bool) {
        self.with(|sessions| {
            sessions.retain(|id, items| {
                let stale = id != keep && items.get(key).is_some_and(|v| matches(v));
                if stale {
                    debug!("session {id}: replaced");
                }
                !stale
            })
        })
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.with(|sessions| sessions.len())
    }
}

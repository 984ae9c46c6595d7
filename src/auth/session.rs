use dashmap::DashMap;
use nanoid::nanoid;
use tracing::debug;

/// A logged-in user. Times are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub username: String,
    pub created_at: u64,
    pub max_age: u64,
    pub renew_age: u64,
}

impl Session {
    pub fn expires_at(&self) -> u64 {
        self.created_at.saturating_add(self.max_age)
    }

    pub fn is_expired(
        &self,
        now: u64,
    ) -> bool {
        now >= self.expires_at()
    }

    /// Within `renew_age` of expiry
    pub fn needs_renewal(
        &self,
        now: u64,
    ) -> bool {
        now.saturating_add(self.renew_age) >= self.expires_at()
    }
}

/// Node-local sessions, keyed by cookie value
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &self,
        username: &str,
        max_age: u64,
        renew_age: u64,
        now: u64,
    ) -> Session {
        let session = Session {
            id: nanoid!(32),
            username: username.to_string(),
            created_at: now,
            max_age,
            renew_age,
        };
        self.sessions.insert(session.id.clone(), session.clone());
        debug!(username, "session created");
        session
    }

    /// Live session for `id`; an expired one is dropped on the way.
    pub fn lookup(
        &self,
        id: &str,
        now: u64,
    ) -> Option<Session> {
        let session = self.sessions.get(id).map(|s| s.clone())?;
        if session.is_expired(now) {
            self.sessions.remove(id);
            return None;
        }
        Some(session)
    }

    /// Replaces session `id` with a fresh one for the same user, issued
    /// with the ages in force now.
    pub fn renew(
        &self,
        id: &str,
        max_age: u64,
        renew_age: u64,
        now: u64,
    ) -> Option<Session> {
        let (_, old) = self.sessions.remove(id)?;
        Some(self.create(&old.username, max_age, renew_age, now))
    }

    pub fn remove(
        &self,
        id: &str,
    ) -> Option<Session> {
        self.sessions.remove(id).map(|(_, s)| s)
    }

    /// Drops every session of `username`
    pub fn remove_user(
        &self,
        username: &str,
    ) {
        self.sessions.retain(|_, s| s.username != username);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

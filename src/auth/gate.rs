use std::sync::Arc;

use tracing::debug;
use tracing::info;

use super::parse_basic;
use super::CredentialCheck;
use super::Session;
use super::SessionStore;
use crate::topology::AuthParams;
use crate::topology::TopologyStore;
use crate::utils::time::unix_now;
use crate::Error;
use crate::Result;

/// Result of gating one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthOutcome {
    /// Caller identity, when a valid credential was presented
    pub username: Option<String>,
    /// Reissued session the caller must receive as a new cookie
    pub renewed: Option<Session>,
}

/// Decides whether a request may reach the admin surface.
///
/// Auth parameters come from the committed document, so enabling or tuning
/// auth is a clusterwide change.
pub struct AuthGate {
    sessions: SessionStore,
    credentials: Arc<dyn CredentialCheck>,
    store: Arc<TopologyStore>,
}

impl AuthGate {
    pub fn new(
        credentials: Arc<dyn CredentialCheck>,
        store: Arc<TopologyStore>,
    ) -> Self {
        Self {
            sessions: SessionStore::new(),
            credentials,
            store,
        }
    }

    pub fn params(&self) -> AuthParams {
        self.store.current().auth.clone()
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Session> {
        self.login_at(username, password, unix_now())
    }

    pub(crate) fn login_at(
        &self,
        username: &str,
        password: &str,
        now: u64,
    ) -> Result<Session> {
        if !self.credentials.check(username, password) {
            info!(username, "login rejected");
            return Err(Error::Unauthorized);
        }
        let params = self.params();
        Ok(self
            .sessions
            .create(username, params.cookie_max_age, params.cookie_renew_age, now))
    }

    pub fn logout(
        &self,
        session_id: &str,
    ) {
        if let Some(session) = self.sessions.remove(session_id) {
            debug!(username = %session.username, "logged out");
        }
    }

    /// Gates a request carrying an optional `lsid` cookie and an optional
    /// `Authorization` header.
    ///
    /// # Errors
    /// [`Error::Unauthorized`] when auth is enabled and no valid credential
    /// was presented.
    pub fn authorize(
        &self,
        session_id: Option<&str>,
        authorization: Option<&str>,
    ) -> Result<AuthOutcome> {
        self.authorize_at(session_id, authorization, unix_now())
    }

    pub(crate) fn authorize_at(
        &self,
        session_id: Option<&str>,
        authorization: Option<&str>,
        now: u64,
    ) -> Result<AuthOutcome> {
        let mut outcome = AuthOutcome::default();

        if let Some(session) = session_id.and_then(|id| self.sessions.lookup(id, now)) {
            if self.credentials.user_exists(&session.username) {
                if session.needs_renewal(now) {
                    let params = self.params();
                    outcome.renewed = self.sessions.renew(
                        &session.id,
                        params.cookie_max_age,
                        params.cookie_renew_age,
                        now,
                    );
                }
                outcome.username = Some(session.username);
            } else {
                self.sessions.remove(&session.id);
            }
        }

        if outcome.username.is_none() {
            if let Some((username, password)) = authorization.and_then(parse_basic) {
                if self.credentials.check(&username, &password) {
                    outcome.username = Some(username);
                }
            }
        }

        if outcome.username.is_none() && self.params().enabled {
            return Err(Error::Unauthorized);
        }
        Ok(outcome)
    }
}

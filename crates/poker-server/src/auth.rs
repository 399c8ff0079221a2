use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use poker_core::auth::{Authorizer, Policy, Principal, Role};
use poker_core::errors::SessionError;
use tracing::debug;

/// Capability table for the two deployment roles.
///
/// Voters run their own sessions; the scrum master additionally opens
/// sessions it does not vote in, closes foreign ones and sees every vote.
pub struct RolePolicy;

impl Policy for RolePolicy {
    fn allows(&self, role: Role, resource: &str, action: &str) -> bool {
        if resource != "session" {
            return false;
        }
        match action {
            "open" | "vote" | "reset" => true,
            "open@absent" | "close@other" | "view_all_others" => role == Role::ScrumMaster,
            _ => false,
        }
    }
}

struct UserEntry {
    passcode: String,
    role: Role,
}

/// Credential store resolved at startup; no runtime user management.
///
/// A token is the URL-safe base64 of `name,passcode`.
pub struct StaticAuthorizer {
    users: HashMap<String, UserEntry>,
    policy: Arc<RolePolicy>,
}

impl StaticAuthorizer {
    pub fn new() -> Self {
        Self {
            users: HashMap::new(),
            policy: Arc::new(RolePolicy),
        }
    }

    pub fn with_user(mut self, name: impl Into<String>, passcode: impl Into<String>, role: Role) -> Self {
        self.users.insert(
            name.into(),
            UserEntry {
                passcode: passcode.into(),
                role,
            },
        );
        self
    }

    /// The token a user presents; useful for provisioning and tests.
    pub fn token_for(name: &str, passcode: &str) -> String {
        URL_SAFE.encode(format!("{name},{passcode}"))
    }
}

impl Default for StaticAuthorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Authorizer for StaticAuthorizer {
    fn authenticate(&self, token: &str) -> Result<Principal, SessionError> {
        if token.is_empty() {
            return Err(SessionError::Unauthenticated);
        }
        let decoded = URL_SAFE
            .decode(token)
            .ok()
            .and_then(|raw| String::from_utf8(raw).ok())
            .ok_or(SessionError::InvalidCredentials)?;
        let (name, passcode) = decoded
            .split_once(',')
            .ok_or(SessionError::InvalidCredentials)?;
        let entry = self.users.get(name).ok_or_else(|| {
            debug!(name, "unknown user");
            SessionError::InvalidCredentials
        })?;
        if entry.passcode != passcode {
            debug!(name, "wrong passcode");
            return Err(SessionError::InvalidCredentials);
        }
        Ok(Principal::new(name, entry.role, self.policy.clone()))
    }
}

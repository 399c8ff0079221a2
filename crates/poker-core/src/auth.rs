use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::SessionError;

/// User role, the unit of policy decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Voter,
    ScrumMaster,
}

/// Decides whether a role may perform `action` on `resource`.
///
/// Actions may carry a qualifier suffix (e.g. `close@other`).
pub trait Policy: Send + Sync {
    fn allows(&self, role: Role, resource: &str, action: &str) -> bool;
}

/// An authenticated caller: identity plus capability checks.
#[derive(Clone)]
pub struct Principal {
    name: String,
    role: Role,
    policy: Arc<dyn Policy>,
}

impl Principal {
    pub fn new(name: impl Into<String>, role: Role, policy: Arc<dyn Policy>) -> Self {
        Self {
            name: name.into(),
            role,
            policy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn has_permission(&self, resource: &str, action: &str) -> bool {
        self.policy.allows(self.role, resource, action)
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("name", &self.name)
            .field("role", &self.role)
            .finish()
    }
}

/// Resolves a request credential to a [`Principal`].
///
/// Implemented by the outer surface; the engine only consumes it.
pub trait Authorizer: Send + Sync {
    fn authenticate(&self, token: &str) -> Result<Principal, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AllowAll;
    impl Policy for AllowAll {
        fn allows(&self, _role: Role, _resource: &str, _action: &str) -> bool {
            true
        }
    }

    struct DenyAll;
    impl Policy for DenyAll {
        fn allows(&self, _role: Role, _resource: &str, _action: &str) -> bool {
            false
        }
    }

    #[test]
    fn principal_delegates_to_policy() {
        let p = Principal::new("ann", Role::Voter, Arc::new(AllowAll));
        assert!(p.has_permission("session", "vote"));

        let p = Principal::new("ann", Role::Voter, Arc::new(DenyAll));
        assert!(!p.has_permission("session", "vote"));
    }

    #[test]
    fn role_serde_names() {
        let json = serde_json::to_string(&Role::ScrumMaster).unwrap();
        assert_eq!(json, "\"scrum_master\"");
        let parsed: Role = serde_json::from_str("\"voter\"").unwrap();
        assert_eq!(parsed, Role::Voter);
    }

    #[test]
    fn debug_omits_policy() {
        let p = Principal::new("ann", Role::Voter, Arc::new(AllowAll));
        let s = format!("{p:?}");
        assert!(s.contains("ann"));
        assert!(!s.contains("policy"));
    }
}

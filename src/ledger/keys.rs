//! Store key naming.

use std::fmt;

use super::identity::Identity;

/// Dimension a daily usage counter is kept for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The bucket shared by every identity
    Global,
    /// One identity's own bucket
    Identity(Identity),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Identity(identity) => write!(f, "user:{}", identity),
        }
    }
}

impl From<Identity> for Scope {
    fn from(identity: Identity) -> Self {
        Scope::Identity(identity)
    }
}

/// Builds every key the ledger reads or writes.
///
/// Format:
/// - `{prefix}:allow:names` allow-list set
/// - `{prefix}:users` registered-identity set
/// - `{prefix}:user:meta:{identity}` display name and registration time
/// - `{prefix}:usage:{day}:global` global counter
/// - `{prefix}:usage:{day}:user:{identity}` per-identity counter
/// - `{prefix}:active:{day}` active-identity set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn allow_list(&self) -> String {
        format!("{}:allow:names", self.prefix)
    }

    pub fn registered(&self) -> String {
        format!("{}:users", self.prefix)
    }

    pub fn user_meta(&self, id: impl AsRef<str>) -> String {
        format!("{}:user:meta:{}", self.prefix, id.as_ref())
    }

    pub fn usage(&self, day: &str, scope: &Scope) -> String {
        format!("{}:usage:{}:{}", self.prefix, day, scope)
    }

    pub fn active(&self, day: &str) -> String {
        format!("{}:active:{}", self.prefix, day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        let keys = KeySpace::new("aff");
        let alice = Identity::normalize("Alice").unwrap();

        assert_eq!(keys.allow_list(), "aff:allow:names");
        assert_eq!(keys.registered(), "aff:users");
        assert_eq!(
            keys.usage("2025-10-07", &Scope::Global),
            "aff:usage:2025-10-07:global"
        );
        assert_eq!(
            keys.usage("2025-10-07", &Scope::Identity(alice.clone())),
            "aff:usage:2025-10-07:user:alice"
        );
        assert_eq!(keys.user_meta(&alice), "aff:user:meta:alice");
        assert_eq!(keys.active("2025-10-07"), "aff:active:2025-10-07");
    }

    #[test]
    fn test_identity_named_global_does_not_collide() {
        let keys = KeySpace::new("aff");
        let global_user = Identity::normalize("global").unwrap();
        assert_ne!(
            keys.usage("2025-10-07", &Scope::Global),
            keys.usage("2025-10-07", &Scope::from(global_user))
        );
    }
}

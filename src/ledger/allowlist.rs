//! Allow-list authentication.

use serde::Serialize;
use tracing::{debug, instrument, warn};

use super::identity::Identity;
use super::Ledger;
use crate::error::Result;

/// Result of a policy-aware login check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Authentication {
    pub identity: Identity,
    pub allowed: bool,
    /// The store did not answer and the open-fail policy decided
    pub degraded: bool,
}

impl Ledger {
    /// Whether `identity` is on the allow-list.
    ///
    /// An unreachable store is an error here, never "not a member".
    pub async fn is_allowed(&self, identity: &Identity) -> Result<bool> {
        let allowed = self
            .store
            .sismember(&self.keys.allow_list(), identity.as_str())
            .await?;
        debug!(identity = %identity, allowed = allowed, "Allow-list lookup");
        Ok(allowed)
    }

    /// Normalize `display_name` and check it against the allow-list.
    ///
    /// This is the one check subject to the configured [`FailurePolicy`]:
    /// with `open`, an unavailable store lets the login through and the
    /// result is marked degraded; with `closed`, the store error propagates.
    ///
    /// [`FailurePolicy`]: super::FailurePolicy
    #[instrument(skip(self))]
    pub async fn authenticate(&self, display_name: &str) -> Result<Authentication> {
        let identity = Identity::normalize(display_name)?;
        let resolved = self
            .policy
            .resolve(self.is_allowed(&identity).await, true)?;

        if !resolved.value {
            warn!(identity = %identity, "Login refused; not on the allow-list");
        }

        Ok(Authentication {
            identity,
            allowed: resolved.value,
            degraded: resolved.degraded,
        })
    }
}

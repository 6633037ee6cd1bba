//! Fair-share per-identity caps.

use tracing::{debug, trace};

use super::identity::Identity;
use super::Ledger;
use crate::error::Result;

/// Per-identity daily cap derived from a global limit.
///
/// The population estimate is the larger of the observed active count and
/// `minimum_estimate`, so a quiet morning does not hand the first few
/// identities the whole global budget. Every identity gets at least one.
pub fn per_identity_cap(global_limit: u64, active_estimate: u64, minimum_estimate: u64) -> u64 {
    let estimate = active_estimate.max(minimum_estimate).max(1);
    (global_limit / estimate).max(1)
}

impl Ledger {
    /// Identities seen making metered requests today.
    pub async fn active_identities(&self) -> Result<u64> {
        let day = self.today();
        self.active_on(&day).await
    }

    /// Today's fair-share cap for a single identity.
    pub async fn fair_share_cap(&self) -> Result<u64> {
        let day = self.today();
        self.fair_share_cap_on(&day).await
    }

    /// Record `identity` in today's active set.
    ///
    /// Returns whether it was newly added.
    pub async fn mark_active(&self, identity: &Identity) -> Result<bool> {
        let day = self.today();
        self.mark_active_on(&day, identity).await
    }

    pub(super) async fn active_on(&self, day: &str) -> Result<u64> {
        Ok(self.store.scard(&self.keys.active(day)).await?)
    }

    pub(super) async fn fair_share_cap_on(&self, day: &str) -> Result<u64> {
        let active = self.active_on(day).await?;
        let cap = per_identity_cap(
            self.limits.daily_limit,
            active,
            self.limits.estimated_users,
        );
        trace!(day = %day, active = active, cap = cap, "Computed fair-share cap");
        Ok(cap)
    }

    pub(super) async fn mark_active_on(&self, day: &str, identity: &Identity) -> Result<bool> {
        let key = self.keys.active(day);
        let added = self
            .store
            .sadd_expire_at(&key, identity.as_str(), self.expiry_of_day(day)?)
            .await?;
        if added {
            debug!(identity = %identity, day = %day, "Identity active today");
        }
        Ok(added)
    }
}

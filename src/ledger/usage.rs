//! Daily usage counters.

use serde::Serialize;
use tracing::{debug, info, instrument, trace, warn};

use super::identity::Identity;
use super::keys::Scope;
use super::Ledger;
use crate::error::{LedgerError, Result};

/// Outcome of a quota consumption attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Consumption {
    /// Whether the counter was charged
    pub allowed: bool,
    /// Counter value after the attempt
    pub used: u64,
}

impl Ledger {
    /// Today's counter value for `scope`, 0 if nothing was recorded yet.
    pub async fn used(&self, scope: &Scope) -> Result<u64> {
        let day = self.today();
        self.used_on(&day, scope).await
    }

    /// Charge one unit to `scope` unless it already reached `limit`.
    ///
    /// The pre-check is advisory: callers racing past it together can push
    /// the counter beyond `limit`. The increment itself is atomic.
    #[instrument(skip(self, scope), fields(scope = %scope))]
    pub async fn try_consume(&self, scope: &Scope, limit: u64) -> Result<Consumption> {
        let day = self.today();
        self.try_consume_on(&day, scope, limit).await
    }

    /// Give back one unit charged to `scope` today, never going below zero.
    ///
    /// Callers use this when the work a charge paid for did not happen.
    #[instrument(skip(self, scope), fields(scope = %scope))]
    pub async fn release(&self, scope: &Scope) -> Result<u64> {
        let day = self.today();
        self.release_on(&day, scope).await
    }

    /// Drop today's counter for `identity`, restoring its full allowance.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn reset_usage(&self, identity: &Identity) -> Result<bool> {
        let key = self
            .keys
            .usage(&self.today(), &Scope::Identity(identity.clone()));
        let existed = self.store.del(&key).await?;
        info!(key = %key, existed = existed, "Reset identity usage");
        Ok(existed)
    }

    pub(super) async fn used_on(&self, day: &str, scope: &Scope) -> Result<u64> {
        let key = self.keys.usage(day, scope);
        let value = self.store.get_int(&key).await?;
        Ok(value.unwrap_or(0).max(0) as u64)
    }

    pub(super) async fn try_consume_on(
        &self,
        day: &str,
        scope: &Scope,
        limit: u64,
    ) -> Result<Consumption> {
        if limit == 0 {
            return Err(LedgerError::Validation("quota limit must be at least 1".into()));
        }

        let used = self.used_on(day, scope).await?;
        if used >= limit {
            debug!(day = %day, used = used, limit = limit, "Quota exhausted");
            return Ok(Consumption {
                allowed: false,
                used,
            });
        }

        let key = self.keys.usage(day, scope);
        // Increment and deadline land together
        let expires_at = self.expiry_of_day(day)?;
        let post = self.store.incr_by_expire_at(&key, 1, expires_at).await?;
        if post == 1 {
            trace!(key = %key, expires_at = expires_at, "Created daily counter");
        }

        debug!(key = %key, used = post, limit = limit, "Quota consumed");
        Ok(Consumption {
            allowed: true,
            used: post.max(0) as u64,
        })
    }

    pub(super) async fn release_on(&self, day: &str, scope: &Scope) -> Result<u64> {
        let key = self.keys.usage(day, scope);
        let expires_at = self.expiry_of_day(day)?;
        let mut post = self.store.incr_by_expire_at(&key, -1, expires_at).await?;

        if post < 0 {
            // Nothing was charged (or the counter expired); put it back to zero
            warn!(key = %key, value = post, "Release below zero; clamping");
            post = self.store.incr_by_expire_at(&key, -post, expires_at).await?;
        }

        debug!(key = %key, used = post, "Quota released");
        Ok(post.max(0) as u64)
    }
}

//! Running work under the global and per-identity quotas.

use std::fmt;
use std::future::Future;

use tracing::{error, info, instrument, warn};

use super::identity::Identity;
use super::keys::Scope;
use super::Ledger;
use crate::error::Result;

/// What happened to a metered action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeteredOutcome<T, E> {
    /// The action ran and succeeded; both quotas stay charged
    Delivered(T),
    /// The action ran and failed
    Failed {
        error: E,
        /// Whether both charges were given back
        released: bool,
    },
    /// The global daily quota was used up; nothing was charged
    GlobalExhausted,
    /// The identity's fair share was used up
    IdentityExhausted {
        /// Whether the global charge made on the way was given back
        released: bool,
    },
}

impl<T, E> MeteredOutcome<T, E> {
    pub fn is_delivered(&self) -> bool {
        matches!(self, MeteredOutcome::Delivered(_))
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(
            self,
            MeteredOutcome::GlobalExhausted | MeteredOutcome::IdentityExhausted { .. }
        )
    }
}

impl Ledger {
    /// Charge one unit of global and per-identity quota, then run `action`.
    ///
    /// The identity joins today's active set before its fair-share cap is
    /// computed. A refused identity charge gives back the global charge, and
    /// a failed action gives back both. All counters touched belong to the day
    /// on which the charge was made, even if the action crosses midnight.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn metered<F, Fut, T, E>(
        &self,
        identity: &Identity,
        action: F,
    ) -> Result<MeteredOutcome<T, E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: fmt::Display,
    {
        let day = self.today();
        let own = Scope::Identity(identity.clone());

        self.mark_active_on(&day, identity).await?;
        let cap = self.fair_share_cap_on(&day).await?;

        let global = self
            .try_consume_on(&day, &Scope::Global, self.limits.daily_limit)
            .await?;
        if !global.allowed {
            info!(used = global.used, "Global quota exhausted");
            return Ok(MeteredOutcome::GlobalExhausted);
        }

        let charged = match self.try_consume_on(&day, &own, cap).await {
            Ok(charged) => charged,
            Err(err) => {
                self.rollback(&day, &[Scope::Global]).await;
                return Err(err);
            }
        };
        if !charged.allowed {
            let released = self.rollback(&day, &[Scope::Global]).await;
            info!(used = charged.used, cap = cap, released = released, "Identity quota exhausted");
            return Ok(MeteredOutcome::IdentityExhausted { released });
        }

        match action().await {
            Ok(value) => Ok(MeteredOutcome::Delivered(value)),
            Err(err) => {
                warn!(error = %err, "Metered action failed; releasing quota");
                let released = self.rollback(&day, &[Scope::Global, own]).await;
                Ok(MeteredOutcome::Failed {
                    error: err,
                    released,
                })
            }
        }
    }

    /// Release one unit from each scope. Returns false if any release failed.
    async fn rollback(&self, day: &str, scopes: &[Scope]) -> bool {
        let mut released = true;
        for scope in scopes {
            if let Err(err) = self.release_on(day, scope).await {
                error!(scope = %scope, day = %day, error = %err, "Quota release failed");
                released = false;
            }
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::config::LedgerConfig;
    use crate::store::KvStore;
    use chrono::Duration;

    fn small() -> LedgerConfig {
        LedgerConfig {
            quota_daily_limit: 4,
            estimated_users: 2,
            ..LedgerConfig::default()
        }
    }

    async fn ok() -> std::result::Result<&'static str, String> {
        Ok("done")
    }

    async fn boom() -> std::result::Result<&'static str, String> {
        Err("generation failed".to_string())
    }

    #[tokio::test]
    async fn test_delivered_charges_both_scopes() {
        let (ledger, _, _) = ledger_with(small());
        let alice = id("alice");

        let outcome = ledger.metered(&alice, ok).await.unwrap();
        assert_eq!(outcome, MeteredOutcome::Delivered("done"));

        assert_eq!(ledger.used(&Scope::Global).await.unwrap(), 1);
        assert_eq!(ledger.used(&Scope::Identity(alice)).await.unwrap(), 1);
        assert_eq!(ledger.active_identities().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_action_releases_both() {
        let (ledger, _, _) = ledger_with(small());
        let alice = id("alice");

        let outcome = ledger.metered(&alice, boom).await.unwrap();
        assert_eq!(
            outcome,
            MeteredOutcome::Failed {
                error: "generation failed".to_string(),
                released: true
            }
        );
        assert_eq!(ledger.used(&Scope::Global).await.unwrap(), 0);
        assert_eq!(ledger.used(&Scope::Identity(alice)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_identity_exhaustion_gives_back_global() {
        // 4 / max(1 active, 2 estimated) = 2 per identity
        let (ledger, _, _) = ledger_with(small());
        let alice = id("alice");

        assert!(ledger.metered(&alice, ok).await.unwrap().is_delivered());
        assert!(ledger.metered(&alice, ok).await.unwrap().is_delivered());
        assert_eq!(
            ledger.metered(&alice, ok).await.unwrap(),
            MeteredOutcome::IdentityExhausted { released: true }
        );
        assert_eq!(ledger.used(&Scope::Global).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_global_exhaustion() {
        let (ledger, _, _) = ledger_with(small());
        for name in ["a", "b"] {
            for _ in 0..2 {
                assert!(ledger.metered(&id(name), ok).await.unwrap().is_delivered());
            }
        }

        let outcome = ledger.metered(&id("c"), ok).await.unwrap();
        assert_eq!(outcome, MeteredOutcome::GlobalExhausted);
        assert!(outcome.is_exhausted());
        assert_eq!(ledger.used(&Scope::Identity(id("c"))).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_action_is_not_run() {
        let (ledger, _, _) = ledger_with(LedgerConfig {
            quota_daily_limit: 1,
            estimated_users: 1,
            ..LedgerConfig::default()
        });
        ledger.metered(&id("alice"), ok).await.unwrap();

        let mut ran = false;
        let outcome = ledger
            .metered(&id("bob"), || {
                ran = true;
                ok()
            })
            .await
            .unwrap();
        assert!(outcome.is_exhausted());
        assert!(!ran);
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let (ledger, store, _) = ledger();
        let key = ledger.keys().usage(&ledger.today(), &Scope::Global);
        store.sadd(&key, "wrong type").await.unwrap();

        let err = ledger.metered(&id("alice"), ok).await.unwrap_err();
        assert!(err.is_store_unavailable());
    }

    #[tokio::test]
    async fn test_unreleased_global_charge_is_reported() {
        let (ledger, faulty, _) = faulty_ledger_with(small());
        let alice = id("alice");
        ledger.metered(&alice, ok).await.unwrap();
        ledger.metered(&alice, ok).await.unwrap();

        faulty.fail(Fault::Decr);
        assert_eq!(
            ledger.metered(&alice, ok).await.unwrap(),
            MeteredOutcome::IdentityExhausted { released: false }
        );
        assert_eq!(ledger.used(&Scope::Global).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failed_action_with_failed_rollback() {
        let (ledger, faulty, _) = faulty_ledger_with(small());
        let alice = id("alice");
        faulty.fail(Fault::Decr);

        let outcome = ledger.metered(&alice, boom).await.unwrap();
        assert_eq!(
            outcome,
            MeteredOutcome::Failed {
                error: "generation failed".to_string(),
                released: false
            }
        );
        assert_eq!(ledger.used(&Scope::Global).await.unwrap(), 1);
        assert_eq!(ledger.used(&Scope::Identity(alice)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_identity_store_error_gives_back_global() {
        let (ledger, store, _) = ledger_with(small());
        let alice = id("alice");
        let own = ledger
            .keys()
            .usage(&ledger.today(), &Scope::Identity(alice.clone()));
        store.sadd(&own, "wrong type").await.unwrap();

        let err = ledger.metered(&alice, ok).await.unwrap_err();
        assert!(err.is_store_unavailable());
        assert_eq!(ledger.used(&Scope::Global).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_active_set_failure_charges_nothing() {
        let (ledger, faulty, inner) = faulty_ledger_with(small());
        faulty.fail(Fault::SetAdd);

        assert!(ledger.metered(&id("alice"), ok).await.is_err());
        assert_eq!(inner.key_count(), 0);
    }

    #[tokio::test]
    async fn test_rollback_after_midnight_targets_charge_day() {
        let (ledger, store, clock) = ledger_with(small());
        let alice = id("alice");
        let charged_day = ledger.today();

        let outcome = ledger
            .metered(&alice, || {
                clock.advance(Duration::hours(14));
                boom()
            })
            .await
            .unwrap();
        assert!(matches!(outcome, MeteredOutcome::Failed { released: true, .. }));
        assert_eq!(ledger.today(), "2025-10-08");

        // The charge day's counter is past its deadline; nothing spills into the new day
        let old_key = ledger.keys().usage(&charged_day, &Scope::Global);
        let new_key = ledger.keys().usage(&ledger.today(), &Scope::Global);
        assert_eq!(store.get_int(&old_key).await.unwrap(), None);
        assert_eq!(store.get_int(&new_key).await.unwrap(), None);
        assert_eq!(ledger.used(&Scope::Identity(alice)).await.unwrap(), 0);
    }
}

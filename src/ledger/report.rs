//! Read-only quota and usage views.

use futures::future::try_join_all;
use serde::Serialize;
use tracing::{instrument, warn};

use super::identity::Identity;
use super::keys::Scope;
use super::Ledger;
use crate::error::Result;

/// Global quota state for today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaSnapshot {
    pub day: String,
    pub limit: u64,
    pub used: u64,
    pub remaining: u64,
    /// Next day boundary, RFC 3339
    pub reset_at: String,
    pub reset_at_epoch: i64,
    pub per_identity_cap: u64,
}

/// One identity's quota state for today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityQuota {
    pub identity: Identity,
    pub day: String,
    pub used: u64,
    pub cap: u64,
    pub remaining: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityUsage {
    pub identity: String,
    pub used: u64,
}

/// Global usage plus every identity active today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    pub day: String,
    pub limit: u64,
    pub global_used: u64,
    pub remaining: u64,
    pub identities: Vec<IdentityUsage>,
}

impl Ledger {
    #[instrument(skip(self))]
    pub async fn quota_snapshot(&self) -> Result<QuotaSnapshot> {
        let now = self.now();
        let day = self.calendar.day_key(now);
        let reset_at = self.calendar.next_boundary(now);

        let (used, per_identity_cap) = futures::try_join!(
            self.used_on(&day, &Scope::Global),
            self.fair_share_cap_on(&day),
        )?;

        let limit = self.limits.daily_limit;
        Ok(QuotaSnapshot {
            day,
            limit,
            used,
            remaining: limit.saturating_sub(used),
            reset_at: reset_at.to_rfc3339(),
            reset_at_epoch: reset_at.timestamp(),
            per_identity_cap,
        })
    }

    /// Today's usage and fair-share cap for `identity`.
    pub async fn identity_quota(&self, identity: &Identity) -> Result<IdentityQuota> {
        let day = self.today();
        let scope = Scope::Identity(identity.clone());

        let (used, cap) =
            futures::try_join!(self.used_on(&day, &scope), self.fair_share_cap_on(&day))?;

        Ok(IdentityQuota {
            identity: identity.clone(),
            day,
            used,
            cap,
            remaining: cap.saturating_sub(used),
        })
    }

    /// Usage across today's active set, sorted by identity.
    #[instrument(skip(self))]
    pub async fn usage_report(&self) -> Result<UsageReport> {
        let day = self.today();
        let mut members = self.store.smembers(&self.keys.active(&day)).await?;
        members.sort();

        // Anything not already in normalized form was not written by a ledger
        let identities: Vec<Identity> = members
            .iter()
            .filter_map(|member| match Identity::normalize(member) {
                Ok(identity) if identity.as_str() == member => Some(identity),
                _ => {
                    warn!(member = %member, day = %day, "Skipping foreign active-set member");
                    None
                }
            })
            .collect();

        let day_ref = &day;
        let per_identity = try_join_all(identities.into_iter().map(|identity| async move {
            let used = self
                .used_on(day_ref, &Scope::Identity(identity.clone()))
                .await?;
            Ok::<_, crate::error::LedgerError>(IdentityUsage {
                identity: identity.to_string(),
                used,
            })
        }))
        .await?;

        let global_used = self.used_on(&day, &Scope::Global).await?;
        let limit = self.limits.daily_limit;

        Ok(UsageReport {
            day,
            limit,
            global_used,
            remaining: limit.saturating_sub(global_used),
            identities: per_identity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::config::LedgerConfig;
    use crate::store::KvStore;
    use chrono::Duration;

    async fn ok() -> std::result::Result<(), String> {
        Ok(())
    }

    #[tokio::test]
    async fn test_snapshot_of_fresh_day() {
        let (ledger, _, _) = ledger_with(LedgerConfig {
            day_offset_hours: 7,
            ..LedgerConfig::default()
        });
        let snap = ledger.quota_snapshot().await.unwrap();

        assert_eq!(snap.day, "2025-10-07");
        assert_eq!(snap.limit, 1000);
        assert_eq!(snap.used, 0);
        assert_eq!(snap.remaining, 1000);
        assert_eq!(snap.per_identity_cap, 10);
        assert_eq!(snap.reset_at, "2025-10-07T17:00:00+00:00");
        assert_eq!(snap.reset_at_epoch, 1_759_856_400);
    }

    #[tokio::test]
    async fn test_snapshot_after_use() {
        let (ledger, _, _) = ledger();
        ledger.metered(&id("alice"), ok).await.unwrap();
        ledger.metered(&id("alice"), ok).await.unwrap();

        let snap = ledger.quota_snapshot().await.unwrap();
        assert_eq!(snap.used, 2);
        assert_eq!(snap.remaining, 998);
    }

    #[tokio::test]
    async fn test_identity_quota() {
        let (ledger, _, _) = ledger_with(LedgerConfig {
            quota_daily_limit: 30,
            estimated_users: 3,
            ..LedgerConfig::default()
        });
        let bob = id("bob");
        for _ in 0..4 {
            ledger.metered(&bob, ok).await.unwrap();
        }

        let quota = ledger.identity_quota(&bob).await.unwrap();
        assert_eq!(quota.used, 4);
        assert_eq!(quota.cap, 10);
        assert_eq!(quota.remaining, 6);
    }

    #[tokio::test]
    async fn test_usage_report_lists_active_identities() {
        let (ledger, _, _) = ledger();
        for name in ["zoe", "adam", "zoe", "mia", "zoe"] {
            ledger.metered(&id(name), ok).await.unwrap();
        }

        let report = ledger.usage_report().await.unwrap();
        assert_eq!(report.global_used, 5);
        assert_eq!(report.remaining, 995);
        assert_eq!(
            report.identities,
            vec![
                IdentityUsage {
                    identity: "adam".into(),
                    used: 1
                },
                IdentityUsage {
                    identity: "mia".into(),
                    used: 1
                },
                IdentityUsage {
                    identity: "zoe".into(),
                    used: 3
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_usage_report_skips_foreign_members() {
        let (ledger, store, _) = ledger();
        ledger.metered(&id("adam"), ok).await.unwrap();
        let active = ledger.keys().active(&ledger.today());
        for member in ["Budi Santoso", "", "---"] {
            store.sadd(&active, member).await.unwrap();
        }

        let report = ledger.usage_report().await.unwrap();
        assert_eq!(report.global_used, 1);
        assert_eq!(
            report.identities,
            vec![IdentityUsage {
                identity: "adam".into(),
                used: 1
            }]
        );
    }

    #[tokio::test]
    async fn test_usage_report_starts_empty_each_day() {
        let (ledger, _, clock) = ledger();
        ledger.metered(&id("adam"), ok).await.unwrap();

        clock.advance(Duration::days(1));
        let report = ledger.usage_report().await.unwrap();
        assert_eq!(report.day, "2025-10-08");
        assert_eq!(report.global_used, 0);
        assert!(report.identities.is_empty());
    }
}

//! Quota accounting and allow-list admission.
//!
//! The [`Ledger`] combines one store, one calendar and one key space, so every
//! caller shares a single definition of "today" and of counter names.
//!
//! Two soft bounds are accepted rather than locked away:
//! - admission checks cardinality and then adds, so concurrent admissions can
//!   overshoot `max_users` by the number of racing callers;
//! - quota consumption reads and then increments, so concurrent consumers can
//!   push a counter past its limit by the number of requests in flight.
//!
//! Individual increments and set additions are atomic in the store. A hard
//! cap would need a scripted conditional update instead.

mod admission;
mod allowlist;
mod fair_share;
mod identity;
mod keys;
mod metered;
mod policy;
mod report;
mod usage;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

pub use admission::{Admission, Seats};
pub use allowlist::Authentication;
pub use fair_share::per_identity_cap;
pub use identity::{Identity, MAX_IDENTITY_LEN};
pub use keys::{KeySpace, Scope};
pub use metered::MeteredOutcome;
pub use policy::{FailurePolicy, Resolved};
pub use report::{IdentityQuota, IdentityUsage, QuotaSnapshot, UsageReport};
pub use usage::Consumption;

use crate::calendar::{Clock, DayCalendar, SystemClock};
use crate::config::LedgerConfig;
use crate::error::Result;
use crate::store::{self, KvStore};

/// Capacity and quota numbers the ledger enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Seats in the registered-identity set
    pub max_users: u64,
    /// Global successful generations per day
    pub daily_limit: u64,
    /// Floor for the active-population estimate
    pub estimated_users: u64,
}

impl From<&LedgerConfig> for Limits {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            max_users: config.max_users,
            daily_limit: config.quota_daily_limit,
            estimated_users: config.estimated_users,
        }
    }
}

/// Daily usage, admission and allow-list ledger over a key-value store.
///
/// Holds no counter state of its own; every read goes to the store so that
/// concurrent instances never diverge.
pub struct Ledger {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    calendar: DayCalendar,
    keys: KeySpace,
    limits: Limits,
    policy: FailurePolicy,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("store", &self.store.backend_name())
            .field("calendar", &self.calendar)
            .field("keys", &self.keys)
            .field("limits", &self.limits)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Ledger {
    /// Create a ledger on the system clock.
    pub fn new(store: Arc<dyn KvStore>, config: &LedgerConfig) -> Result<Self> {
        Self::with_clock(store, Arc::new(SystemClock), config)
    }

    /// Create a ledger that reads time from `clock`.
    pub fn with_clock(
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        config: &LedgerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let calendar = DayCalendar::new(config.day_offset_hours)?;

        info!(
            store = store.backend_name(),
            max_users = config.max_users,
            daily_limit = config.quota_daily_limit,
            estimated_users = config.estimated_users,
            day_offset_hours = config.day_offset_hours,
            policy = ?config.on_store_unavailable,
            "Ledger initialized"
        );

        Ok(Self {
            store,
            clock,
            calendar,
            keys: KeySpace::new(config.key_prefix.clone()),
            limits: Limits::from(config),
            policy: config.on_store_unavailable,
        })
    }

    /// Connect to the configured store and build a ledger on it.
    pub async fn connect(config: &LedgerConfig) -> Result<Self> {
        config.validate()?;
        let store = store::connect(config.redis_url.as_deref()).await?;
        Self::new(store, config)
    }

    /// Capacity and quota numbers in force.
    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// How `authenticate` treats an unavailable store.
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Calendar that defines "today".
    pub fn calendar(&self) -> DayCalendar {
        self.calendar
    }

    /// Key names under the configured prefix.
    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Name of the store backend, for logs and reports.
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Current instant according to the ledger's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Day key for the current instant.
    pub fn today(&self) -> String {
        self.calendar.day_key(self.now())
    }

    /// Epoch seconds at which keys dated `day` expire.
    fn expiry_of_day(&self, day: &str) -> Result<i64> {
        Ok(self.calendar.end_of_day(day)?.timestamp())
    }
}

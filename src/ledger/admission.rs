//! Seat admission against `max_users`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::identity::Identity;
use super::Ledger;
use crate::error::Result;

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Admission {
    pub admitted: bool,
    /// Seats left after this attempt
    pub remaining: u64,
}

/// Outcome of registering a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub identity: Identity,
    /// Display name as given, trimmed
    pub name: String,
    pub admitted: bool,
    pub remaining: u64,
}

/// A seat holder with whatever was recorded when it registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredUser {
    pub id: String,
    pub name: Option<String>,
    /// Registration time, epoch milliseconds
    pub created_at: Option<i64>,
}

/// Registered identities and capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Seats {
    pub max_users: u64,
    pub used: u64,
    pub remaining: u64,
    /// Seat holders, sorted by id
    pub users: Vec<RegisteredUser>,
}

/// Stored once per identity, never overwritten.
#[derive(Debug, Deserialize)]
struct UserMeta {
    name: String,
    #[serde(alias = "createdAt")]
    created_at: i64,
}

impl Ledger {
    /// Give `identity` a seat if it has one already or one is free.
    ///
    /// Existing members are always admitted. A rejection leaves the store
    /// untouched. The cardinality check and the add are separate round trips,
    /// so concurrent first-time admissions can overshoot `max_users` slightly.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn admit(&self, identity: &Identity) -> Result<Admission> {
        let set = self.keys.registered();
        let max_users = self.limits.max_users;

        if self.store.sismember(&set, identity.as_str()).await? {
            let count = self.store.scard(&set).await?;
            debug!(count = count, "Identity already registered");
            return Ok(Admission {
                admitted: true,
                remaining: max_users.saturating_sub(count),
            });
        }

        let count = self.store.scard(&set).await?;
        if count >= max_users {
            info!(count = count, max_users = max_users, "Admission rejected; no seats left");
            return Ok(Admission {
                admitted: false,
                remaining: 0,
            });
        }

        self.store.sadd(&set, identity.as_str()).await?;
        let remaining = max_users.saturating_sub(count + 1);
        info!(remaining = remaining, "Identity admitted");

        Ok(Admission {
            admitted: true,
            remaining,
        })
    }

    /// Normalize `display_name`, admit it, and record its name on first admission.
    ///
    /// The name and time are written only if none were recorded before. A
    /// failure to write them is logged; the seat itself stands.
    #[instrument(skip(self))]
    pub async fn register(&self, display_name: &str) -> Result<Registration> {
        let identity = Identity::normalize(display_name)?;
        let name = display_name.trim().to_string();
        let admission = self.admit(&identity).await?;

        if admission.admitted {
            let value = serde_json::json!({
                "name": name,
                "created_at": self.now().timestamp_millis(),
            })
            .to_string();
            match self.store.set_nx(&self.keys.user_meta(&identity), &value).await {
                Ok(written) => debug!(identity = %identity, written = written, "User meta"),
                Err(err) => {
                    warn!(identity = %identity, error = %err, "Could not record user meta")
                }
            }
        }

        Ok(Registration {
            identity,
            name,
            admitted: admission.admitted,
            remaining: admission.remaining,
        })
    }

    /// Free the seat held by `identity`. Returns whether it held one.
    ///
    /// The recorded name goes first, so a failure part way leaves the seat
    /// in place and the call can simply be repeated.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn unregister(&self, identity: &Identity) -> Result<bool> {
        self.store.del(&self.keys.user_meta(identity)).await?;
        let removed = self
            .store
            .srem(&self.keys.registered(), identity.as_str())
            .await?;
        info!(removed = removed, "Unregistered identity");
        Ok(removed)
    }

    /// Snapshot of the registered-identity set with recorded names.
    pub async fn registered(&self) -> Result<Seats> {
        let mut ids = self.store.smembers(&self.keys.registered()).await?;
        ids.sort();

        let meta_keys: Vec<String> = ids
            .iter()
            .map(|id| self.keys.user_meta(id))
            .collect();
        let metas = self.store.get_many(&meta_keys).await?;

        let users: Vec<RegisteredUser> = ids
            .into_iter()
            .zip(metas)
            .map(|(id, raw)| {
                let meta = raw.and_then(|raw| match serde_json::from_str::<UserMeta>(&raw) {
                    Ok(meta) => Some(meta),
                    Err(err) => {
                        warn!(id = %id, error = %err, "Unreadable user meta");
                        None
                    }
                });
                RegisteredUser {
                    name: meta.as_ref().map(|m| m.name.clone()),
                    created_at: meta.map(|m| m.created_at),
                    id,
                }
            })
            .collect();

        let used = users.len() as u64;
        Ok(Seats {
            max_users: self.limits.max_users,
            used,
            remaining: self.limits.max_users.saturating_sub(used),
            users,
        })
    }
}

//! Open-fail versus closed-fail handling of an unavailable store.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// What a policy-aware check answers when the store cannot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Answer with the permissive value and mark the result degraded
    Open,
    /// Propagate the store error
    #[default]
    Closed,
}

/// A value produced under a [`FailurePolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    /// True when the value came from the policy rather than the store
    pub degraded: bool,
}

impl FailurePolicy {
    /// Apply the policy to a store-backed answer.
    ///
    /// Only store failures are subject to the policy; validation errors
    /// always propagate.
    pub fn resolve<T>(self, result: Result<T>, open_value: T) -> Result<Resolved<T>> {
        match result {
            Ok(value) => Ok(Resolved {
                value,
                degraded: false,
            }),
            Err(err) if err.is_store_unavailable() && self == FailurePolicy::Open => {
                warn!(error = %err, "Store unavailable; failing open");
                Ok(Resolved {
                    value: open_value,
                    degraded: true,
                })
            }
            Err(err) => Err(err),
        }
    }
}

//! Entity: the projection of one aggregate's event stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::EntityId;

/// Current state of an aggregate, derived by folding its events.
///
/// An `Entity` is a value: commands never mutate one in place, they return a
/// fresh `Entity` built from the prior one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity<S> {
    pub entity_id: EntityId,
    pub entity_name: String,
    /// Timestamp of the aggregate's first event.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recently folded event.
    pub updated_at: DateTime<Utc>,
    pub state: S,
}

impl<S> Entity<S> {
    /// Build the successor of `self` after folding one more event.
    ///
    /// `created_at` is carried over from the prior entity.
    pub fn advance(&self, state: S, updated_at: DateTime<Utc>) -> Self {
        Self {
            entity_id: self.entity_id,
            entity_name: self.entity_name.clone(),
            created_at: self.created_at,
            updated_at,
            state,
        }
    }
}

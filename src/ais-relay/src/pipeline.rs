use std::sync::Arc;

use ais_core::{VesselRecord, VesselStore};
use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::{
    models::RawMessage,
    normalizer::{Normalizer, Rejection},
    stats::RelayStats,
};

/// Normalizes upstream messages, merges accepted facts into the store (when there is one) and
/// counts every outcome.
#[derive(Debug, Clone)]
pub struct Pipeline {
    normalizer: Normalizer,
    store: Option<VesselStore>,
    stats: Arc<RelayStats>,
}

impl Pipeline {
    pub fn new(
        normalizer: Normalizer,
        store: Option<VesselStore>,
        stats: Arc<RelayStats>,
    ) -> Pipeline {
        Pipeline {
            normalizer,
            store,
            stats,
        }
    }

    pub fn store(&self) -> Option<&VesselStore> {
        self.store.as_ref()
    }

    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// `Ok(Some(record))` carries the merged state of the vessel when a store is attached,
    /// `Ok(None)` means the message was accepted but there is nothing to merge it into.
    /// Rejected messages never touch the store.
    pub fn ingest(
        &self,
        raw: &RawMessage,
        received_at: DateTime<Utc>,
    ) -> Result<Option<VesselRecord>, Rejection> {
        self.stats.record_received();

        let fact = match self.normalizer.classify(raw, received_at) {
            Ok(fact) => fact,
            Err(rejection) => {
                self.stats.record_rejection(rejection);
                if rejection == Rejection::MissingIdentity {
                    debug!(message_type = %raw.message_type, "dropping message without identity");
                } else {
                    trace!(
                        message_type = %raw.message_type,
                        rejection = rejection.as_ref(),
                        "dropping message"
                    );
                }
                return Err(rejection);
            }
        };

        Ok(self.store.as_ref().map(|s| s.upsert(fact)))
    }
}

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::{VesselFact, VesselId, VesselRecord};

pub fn default_live_window() -> Duration {
    Duration::minutes(30)
}

/// In-memory cache of the merged state of every vessel seen inside the live window.
///
/// All access goes through a single mutex, a clone shares the same underlying map while
/// [VesselStore::new] always creates an independent instance.
#[derive(Debug, Clone)]
pub struct VesselStore {
    records: Arc<Mutex<HashMap<VesselId, VesselRecord>>>,
    window: Duration,
}

impl VesselStore {
    pub fn new(window: Duration) -> VesselStore {
        VesselStore {
            records: Default::default(),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Merges `fact` into the record of its vessel, creating the record if needed, and returns
    /// a copy of the merged state.
    pub fn upsert(&self, fact: VesselFact) -> VesselRecord {
        let mut records = self.lock();

        match records.get_mut(&fact.id) {
            Some(record) => {
                record.merge(fact);
                record.clone()
            }
            None => {
                let record = VesselRecord::from_fact(fact);
                records.insert(record.id.clone(), record.clone());
                record
            }
        }
    }

    /// Every record that has a position and was updated inside the live window.
    pub fn list(&self, now: DateTime<Utc>) -> Vec<VesselRecord> {
        self.lock()
            .values()
            .filter(|r| r.has_position() && r.is_live(now, self.window))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &VesselId) -> Option<VesselRecord> {
        self.lock().get(id).cloned()
    }

    /// Drops records older than the live window and returns how many were removed.
    /// Only bounds memory, [VesselStore::list] never depends on it having run.
    pub fn evict(&self, now: DateTime<Utc>) -> usize {
        let mut records = self.lock();
        let before = records.len();
        records.retain(|_, r| r.is_live(now, self.window));

        let evicted = before - records.len();
        if evicted > 0 {
            debug!(evicted, remaining = records.len(), "evicted stale vessels");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave a record half merged, so the map is still
    // consistent after poisoning.
    fn lock(&self) -> MutexGuard<'_, HashMap<VesselId, VesselRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for VesselStore {
    fn default() -> Self {
        VesselStore::new(default_live_window())
    }
}

use chrono::Duration;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::job::{JobRecord, JobStatus, RunnerJobId};

/// In-memory registry of tracked jobs keyed by Runner job id.
///
/// Cloning is cheap and every clone shares the same map. The whole map sits
/// behind one reader-writer lock: readers never block each other and writers
/// are serialized. Nothing here survives a restart.
#[derive(Clone, Debug)]
pub struct JobRegistry {
    inner: Arc<RwLock<HashMap<RunnerJobId, JobRecord>>>,
    clock: Arc<dyn Clock>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Insert or overwrite the record for `key`, stamping `updated_at`.
    ///
    /// `updated_at` never moves backwards for a key that is already present,
    /// even if the clock does.
    pub fn store(&self, key: RunnerJobId, mut record: JobRecord) {
        let now = self.clock.now();
        let mut guard = self.inner.write();
        record.updated_at = match guard.get(&key) {
            Some(previous) if previous.updated_at > now => previous.updated_at,
            _ => now,
        };
        guard.insert(key, record);
    }

    /// Set the status of an existing record and stamp `updated_at`.
    ///
    /// Returns the updated record, or `None` if the key is no longer tracked.
    /// A record removed while a caller was working on it stays removed.
    pub fn update_status(&self, key: &RunnerJobId, status: JobStatus) -> Option<JobRecord> {
        let now = self.clock.now();
        let mut guard = self.inner.write();
        let record = guard.get_mut(key)?;
        record.status = status;
        if now > record.updated_at {
            record.updated_at = now;
        }
        Some(record.clone())
    }

    pub fn get(&self, key: &RunnerJobId) -> Option<JobRecord> {
        let guard = self.inner.read();
        guard.get(key).cloned()
    }

    /// Snapshot of every tracked record. Order is unspecified.
    pub fn list(&self) -> Vec<JobRecord> {
        let guard = self.inner.read();
        guard.values().cloned().collect()
    }

    /// Remove `key`. Removing an absent key is a no-op.
    pub fn delete(&self, key: &RunnerJobId) -> Option<JobRecord> {
        let mut guard = self.inner.write();
        guard.remove(key)
    }

    /// Remove every record whose `updated_at` is strictly older than
    /// `now - max_age`, returning the removed ids.
    pub fn evict_older_than(&self, max_age: Duration) -> Vec<RunnerJobId> {
        self.evict_older_than_unless(max_age, |_| false)
    }

    /// Like [`JobRegistry::evict_older_than`], but keeps stale records for
    /// which `keep` returns true.
    pub fn evict_older_than_unless<F>(&self, max_age: Duration, keep: F) -> Vec<RunnerJobId>
    where
        F: Fn(&RunnerJobId) -> bool,
    {
        let Some(cutoff) = self.clock.now().checked_sub_signed(max_age) else {
            return Vec::new();
        };
        let mut guard = self.inner.write();
        let mut evicted = Vec::new();
        guard.retain(|id, record| {
            if record.updated_at < cutoff && !keep(id) {
                evicted.push(id.clone());
                false
            } else {
                true
            }
        });
        if !evicted.is_empty() {
            debug!(count = evicted.len(), cutoff = %cutoff, "evicted stale job records");
        }
        evicted
    }

    pub fn contains(&self, key: &RunnerJobId) -> bool {
        self.inner.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub(crate) fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ReviewRequest;
    use chrono::{DateTime, TimeZone, Utc};
    use parking_lot::Mutex;

    #[derive(Debug)]
    struct StepClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl StepClock {
        fn at(secs: i64) -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(Utc.timestamp_opt(secs, 0).unwrap()),
            })
        }

        fn set(&self, secs: i64) {
            *self.now.lock() = Utc.timestamp_opt(secs, 0).unwrap();
        }
    }

    impl Clock for StepClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock()
        }
    }

    fn record(id: &str, registry: &JobRegistry) -> JobRecord {
        JobRecord::pending(
            RunnerJobId::new(id),
            ReviewRequest::new("100", "http://review/cb"),
            registry.now(),
        )
    }

    #[test]
    fn get_returns_most_recent_store() {
        let clock = StepClock::at(1_000);
        let registry = JobRegistry::with_clock(clock.clone());
        let id = RunnerJobId::new("a");

        registry.store(id.clone(), record("a", &registry));
        clock.set(1_010);
        let mut second = record("a", &registry);
        second.status = JobStatus::Running;
        registry.store(id.clone(), second);

        let found = registry.get(&id).unwrap();
        assert_eq!(found.status, JobStatus::Running);
        assert_eq!(found.updated_at, Utc.timestamp_opt(1_010, 0).unwrap());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn updated_at_never_moves_backwards() {
        let clock = StepClock::at(2_000);
        let registry = JobRegistry::with_clock(clock.clone());
        let id = RunnerJobId::new("a");

        registry.store(id.clone(), record("a", &registry));
        clock.set(1_500);
        registry.store(id.clone(), record("a", &registry));
        assert_eq!(
            registry.get(&id).unwrap().updated_at,
            Utc.timestamp_opt(2_000, 0).unwrap()
        );

        registry.update_status(&id, JobStatus::Running);
        assert_eq!(
            registry.get(&id).unwrap().updated_at,
            Utc.timestamp_opt(2_000, 0).unwrap()
        );
    }

    #[test]
    fn update_status_does_not_resurrect() {
        let registry = JobRegistry::new();
        let id = RunnerJobId::new("gone");
        assert!(registry.update_status(&id, JobStatus::Running).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn delete_is_idempotent() {
        let registry = JobRegistry::new();
        let id = RunnerJobId::new("a");
        registry.store(id.clone(), record("a", &registry));

        assert!(registry.delete(&id).is_some());
        assert!(registry.delete(&id).is_none());
        assert!(!registry.contains(&id));
    }

    #[test]
    fn evict_removes_only_stale_records() {
        let clock = StepClock::at(10_000);
        let registry = JobRegistry::with_clock(clock.clone());

        registry.store(RunnerJobId::new("old"), record("old", &registry));
        clock.set(10_050);
        registry.store(RunnerJobId::new("edge"), record("edge", &registry));
        clock.set(10_090);
        registry.store(RunnerJobId::new("fresh"), record("fresh", &registry));

        clock.set(10_150);
        let mut evicted = registry.evict_older_than(Duration::seconds(100));
        evicted.sort();

        // cutoff is 10_050: "edge" sits exactly on it and is kept.
        assert_eq!(evicted, vec![RunnerJobId::new("old")]);
        assert!(registry.contains(&RunnerJobId::new("edge")));
        assert!(registry.contains(&RunnerJobId::new("fresh")));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn evict_unless_keeps_selected_stale_records() {
        let clock = StepClock::at(10_000);
        let registry = JobRegistry::with_clock(clock.clone());
        registry.store(RunnerJobId::new("watched"), record("watched", &registry));
        registry.store(RunnerJobId::new("orphan"), record("orphan", &registry));

        clock.set(20_000);
        let evicted = registry.evict_older_than_unless(Duration::seconds(100), |id| {
            id.as_str() == "watched"
        });

        assert_eq!(evicted, vec![RunnerJobId::new("orphan")]);
        assert!(registry.contains(&RunnerJobId::new("watched")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn clones_share_state() {
        let registry = JobRegistry::new();
        let other = registry.clone();
        registry.store(RunnerJobId::new("a"), record("a", &registry));
        assert!(other.contains(&RunnerJobId::new("a")));
    }
}

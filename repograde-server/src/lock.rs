//! In-memory analysis lock keyed by requester and repository.
//!
//! Entries expire after a TTL so that a crashed analysis never blocks a
//! requester forever. A background sweeper evicts stale entries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Default lifetime of an unreleased lock entry.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(300);

/// Default pause between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Monotonic time source.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// Clock backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Mutual exclusion for concurrent analyses of the same repository.
pub trait AnalysisLock: Send + Sync {
    /// Take the lock if it is free or expired.
    fn try_acquire(&self, key: &str) -> bool;
    /// Restart the TTL of a held lock. Unknown keys are ignored.
    fn refresh(&self, key: &str);
    /// Drop the lock unconditionally.
    fn release(&self, key: &str);
    /// Evict expired entries, returning how many were removed.
    fn sweep(&self) -> usize;
}

/// Lock key for one requester and repository URL.
pub fn lock_key(requester_id: &str, github_url: &str) -> String {
    format!("{requester_id}:{github_url}")
}

#[derive(Debug, Clone)]
struct LockEntry {
    acquired_at: Instant,
    holder: String,
}

/// Process-local [`AnalysisLock`].
pub struct InMemoryLock {
    entries: Mutex<HashMap<String, LockEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl InMemoryLock {
    /// Lock with the system clock.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Lock with an explicit clock.
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Lock configured from `REPOGRADE_LOCK_TTL_SECS`.
    pub fn from_env() -> Self {
        Self::new(duration_from_env("REPOGRADE_LOCK_TTL_SECS", DEFAULT_LOCK_TTL))
    }

    #[cfg(test)]
    /// Number of live or expired-but-unswept entries.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[cfg(test)]
    /// Whether no entries are held.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    #[cfg(test)]
    /// Holder recorded for `key`, if any.
    pub fn holder(&self, key: &str) -> Option<String> {
        self.entries().get(key).map(|entry| entry.holder.clone())
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, LockEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_expired(&self, entry: &LockEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.acquired_at) > self.ttl
    }
}

impl AnalysisLock for InMemoryLock {
    fn try_acquire(&self, key: &str) -> bool {
        let now = self.clock.now();
        let mut entries = self.entries();
        if let Some(entry) = entries.get(key) {
            if !self.is_expired(entry, now) {
                return false;
            }
            log::info!("reclaiming expired analysis lock {key} held by {}", entry.holder);
        }
        entries.insert(
            key.to_string(),
            LockEntry {
                acquired_at: now,
                holder: current_holder(),
            },
        );
        true
    }

    fn refresh(&self, key: &str) {
        let now = self.clock.now();
        if let Some(entry) = self.entries().get_mut(key) {
            entry.acquired_at = now;
        }
    }

    fn release(&self, key: &str) {
        self.entries().remove(key);
    }

    fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        before - entries.len()
    }
}

fn current_holder() -> String {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", thread.id()),
    }
}

/// Releases the lock it guards when dropped.
pub struct LockGuard {
    lock: Arc<dyn AnalysisLock>,
    key: String,
}

impl LockGuard {
    #[cfg(test)]
    /// Key held by this guard.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Restart the TTL of the held lock.
    pub fn refresh(&self) {
        self.lock.refresh(&self.key);
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.lock.release(&self.key);
    }
}

/// Acquire `key`, returning a guard that releases it on drop.
pub fn acquire_guard(lock: &Arc<dyn AnalysisLock>, key: impl Into<String>) -> Option<LockGuard> {
    let key = key.into();
    if !lock.try_acquire(&key) {
        return None;
    }
    Some(LockGuard {
        lock: Arc::clone(lock),
        key,
    })
}

/// Start a background thread that sweeps `lock` every `interval`.
///
/// The thread exits once every other handle to the lock is dropped.
pub fn spawn_sweeper(
    lock: &Arc<dyn AnalysisLock>,
    interval: Duration,
) -> std::io::Result<JoinHandle<()>> {
    let weak = Arc::downgrade(lock);
    log::info!("starting analysis lock sweeper every {}s", interval.as_secs());
    std::thread::Builder::new()
        .name("analysis-lock-sweeper".to_string())
        .spawn(move || {
            loop {
                std::thread::sleep(interval);
                let Some(lock) = weak.upgrade() else {
                    break;
                };
                let evicted = lock.sweep();
                if evicted > 0 {
                    log::debug!("evicted {evicted} expired analysis locks");
                }
            }
        })
}

/// Sweep interval configured from `REPOGRADE_LOCK_SWEEP_SECS`.
pub fn sweep_interval_from_env() -> Duration {
    duration_from_env("REPOGRADE_LOCK_SWEEP_SECS", DEFAULT_SWEEP_INTERVAL)
}

pub(crate) fn duration_from_env(key: &str, default: Duration) -> Duration {
    match std::env::var(key) {
        Ok(value) => match value.trim().parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(err) => {
                log::warn!("ignoring {key}={value:?}: {err}");
                default
            }
        },
        Err(_) => default,
    }
}

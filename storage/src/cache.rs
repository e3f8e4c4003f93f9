//! Skill cache (spec §4.D): a TTL + mtime-validated cache of materialised
//! skill objects, plus a single-entry compiled tool-descriptor list cache
//! invalidated whenever any skill entry is set or invalidated.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use serde_json::Value;

use crate::model::Skill;

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub invalidations: AtomicU64,
}

impl CacheStats {
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.invalidations.load(Ordering::Relaxed),
        )
    }
}

struct SkillEntry {
    skill: Arc<Skill>,
    cached_at: Instant,
    mtime: SystemTime,
}

/// Key: `skill_id`. A lookup succeeds only if age < TTL and the current
/// on-disk mtime equals the cached mtime; otherwise the entry is evicted.
pub struct SkillEntryCache {
    ttl: Duration,
    entries: Mutex<std::collections::HashMap<String, SkillEntry>>,
    stats: CacheStats,
}

impl SkillEntryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(std::collections::HashMap::new()),
            stats: CacheStats::default(),
        }
    }

    /// `current_mtime` is the mtime of the version file as observed right
    /// now by the caller (a fresh `fs::metadata` call).
    pub fn get(&self, skill_id: &str, current_mtime: SystemTime) -> Option<Arc<Skill>> {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get(skill_id) else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let fresh = entry.cached_at.elapsed() < self.ttl && entry.mtime == current_mtime;
        if fresh {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            Some(entry.skill.clone())
        } else {
            entries.remove(skill_id);
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn set(&self, skill_id: String, skill: Arc<Skill>, mtime: SystemTime) {
        self.entries.lock().insert(
            skill_id,
            SkillEntry {
                skill,
                cached_at: Instant::now(),
                mtime,
            },
        );
    }

    pub fn invalidate(&self, skill_id: &str) {
        if self.entries.lock().remove(skill_id).is_some() {
            self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

struct ToolListEntry {
    tools: Vec<Value>,
    contributing_skill_ids: HashSet<String>,
    cached_at: Instant,
}

/// Single-entry cache of the compiled tool-descriptor list published
/// externally, keyed by nothing (one global entry). Invalidated whenever
/// any `SkillEntryCache` entry is set or invalidated.
pub struct ToolListCache {
    ttl: Duration,
    entry: Mutex<Option<ToolListEntry>>,
    stats: CacheStats,
}

impl ToolListCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
            stats: CacheStats::default(),
        }
    }

    pub fn get(&self) -> Option<Vec<Value>> {
        let guard = self.entry.lock();
        match guard.as_ref() {
            Some(entry) if entry.cached_at.elapsed() < self.ttl => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.tools.clone())
            }
            _ => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn set(&self, tools: Vec<Value>, contributing_skill_ids: HashSet<String>) {
        *self.entry.lock() = Some(ToolListEntry {
            tools,
            contributing_skill_ids,
            cached_at: Instant::now(),
        });
    }

    pub fn invalidate(&self) {
        if self.entry.lock().take().is_some() {
            self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Invalidate only if the given skill id contributed to the cached
    /// list (an exact-match invalidation would also be correct but this
    /// matches spec §4.D's "invalidated whenever any skill cache entry is
    /// set or invalidated" by being conservative when in doubt).
    pub fn invalidate_if_contributed(&self, skill_id: &str) {
        let mut guard = self.entry.lock();
        if let Some(entry) = guard.as_ref() {
            if entry.contributing_skill_ids.contains(skill_id) {
                *guard = None;
                self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

pub const DEFAULT_TTL_SECS: u64 = 300;

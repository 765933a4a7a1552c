//! Connection activity throttle
//!
//! Every proxied request signals "team X is active", but persisting a
//! timestamp per request would hammer the store on the hot path. The
//! throttle coalesces those signals: per team, at most one durable write
//! per window, everything else a no-op.
//!
//! The map is process-local and deliberately lossy across restarts; the
//! persisted last-activity value is the durable fact. Entry-level locking
//! in the concurrent map makes the read-modify-write per team key safe
//! under concurrent request handlers.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Default window between persisted activity writes per team.
pub const DEFAULT_ACTIVITY_WINDOW: Duration = Duration::from_secs(10);

/// Write-coalescing gate for last-activity bookkeeping.
pub struct ActivityThrottle {
    window: Duration,
    last_write: DashMap<String, Instant>,
}

impl ActivityThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_write: DashMap::new(),
        }
    }

    /// Record that a team made a request.
    ///
    /// Returns `true` when the caller should persist the activity
    /// timestamp: on the first observation for a team, and then at most
    /// once per window. All other calls within the window return `false`.
    pub fn observe(&self, team: &str) -> bool {
        use dashmap::mapref::entry::Entry;

        let now = Instant::now();
        match self.last_write.entry(team.to_string()) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) >= self.window {
                    entry.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// Drop a team's tracking entry. Called on team deletion so the map
    /// only holds live teams; the next observation starts fresh.
    pub fn forget(&self, team: &str) {
        self.last_write.remove(team);
    }

    /// Number of teams currently tracked.
    pub fn tracked_teams(&self) -> usize {
        self.last_write.len()
    }
}

impl Default for ActivityThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITY_WINDOW)
    }
}

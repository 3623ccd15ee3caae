//! Connection admission and inbound message rate control.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use thiserror::Error;

use super::broadcast::SubscriberId;

/// Caps on concurrent streaming connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    pub max_connections: usize,
    pub max_connections_per_origin: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_connections_per_origin: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionDenied {
    #[error("Server connection limit reached")]
    ServerFull,

    #[error("Per-IP connection limit reached")]
    OriginLimit,
}

#[derive(Debug, Default)]
struct TrackerState {
    total: usize,
    by_origin: HashMap<String, usize>,
}

/// Point-in-time view of admitted connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStats {
    pub total: usize,
    pub by_origin: HashMap<String, usize>,
}

/// Reference-counted connections per origin plus a global total.
///
/// Both counts change under one lock so they never disagree.
#[derive(Debug)]
pub struct ConnectionTracker {
    limits: ConnectionLimits,
    state: Mutex<TrackerState>,
}

impl ConnectionTracker {
    pub fn new(limits: ConnectionLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(TrackerState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, state: &TrackerState, origin: &str) -> Result<(), AdmissionDenied> {
        if state.total >= self.limits.max_connections {
            return Err(AdmissionDenied::ServerFull);
        }

        let from_origin = state.by_origin.get(origin).copied().unwrap_or(0);
        if from_origin >= self.limits.max_connections_per_origin {
            return Err(AdmissionDenied::OriginLimit);
        }

        Ok(())
    }

    fn record(state: &mut TrackerState, origin: &str) {
        *state.by_origin.entry(origin.to_string()).or_insert(0) += 1;
        state.total += 1;
    }

    /// Check whether `origin` may open another connection. Does not admit it.
    #[allow(dead_code)]
    pub fn can_connect(&self, origin: &str) -> Result<(), AdmissionDenied> {
        self.check(&self.state(), origin)
    }

    /// Check and record in one step. The connection is released when the
    /// returned guard drops.
    pub fn admit(self: &Arc<Self>, origin: &str) -> Result<ConnectionGuard, AdmissionDenied> {
        let mut state = self.state();
        self.check(&state, origin)?;
        Self::record(&mut state, origin);

        Ok(ConnectionGuard {
            tracker: Arc::clone(self),
            origin: origin.to_string(),
        })
    }

    /// Record an admitted connection. Pair with exactly one [`Self::remove_connection`].
    #[allow(dead_code)]
    pub fn add_connection(&self, origin: &str) {
        Self::record(&mut self.state(), origin);
    }

    /// Release an admitted connection. Unknown origins are ignored.
    pub fn remove_connection(&self, origin: &str) {
        let mut state = self.state();

        let Some(count) = state.by_origin.get_mut(origin) else {
            return;
        };

        if *count > 1 {
            *count -= 1;
        } else {
            state.by_origin.remove(origin);
        }
        state.total = state.total.saturating_sub(1);
    }

    pub fn total(&self) -> usize {
        self.state().total
    }

    pub fn connections_from(&self, origin: &str) -> usize {
        self.state().by_origin.get(origin).copied().unwrap_or(0)
    }

    pub fn stats(&self) -> ConnectionStats {
        let state = self.state();
        ConnectionStats {
            total: state.total,
            by_origin: state.by_origin.clone(),
        }
    }
}

/// One admitted connection, released on drop
#[derive(Debug)]
pub struct ConnectionGuard {
    tracker: Arc<ConnectionTracker>,
    origin: String,
}

impl ConnectionGuard {
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.tracker.remove_connection(&self.origin);
    }
}

/// Allowed inbound messages per window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_messages: u32,
    pub window: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max_messages: 10,
            window: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window message counter per subscriber.
///
/// Windows reset lazily on the first check after expiry; [`Self::cleanup`]
/// only bounds memory for idle subscribers.
#[derive(Debug)]
pub struct MessageRateLimiter {
    limit: RateLimit,
    windows: DashMap<SubscriberId, Window>,
}

impl MessageRateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            windows: DashMap::new(),
        }
    }

    pub fn is_allowed(&self, id: SubscriberId) -> bool {
        self.is_allowed_at(id, Instant::now())
    }

    pub fn is_allowed_at(&self, id: SubscriberId, now: Instant) -> bool {
        let fresh = Window {
            count: 1,
            reset_at: now + self.limit.window,
        };

        let mut allowed = true;
        self.windows
            .entry(id)
            .and_modify(|window| {
                if now >= window.reset_at {
                    *window = fresh;
                } else if window.count >= self.limit.max_messages {
                    allowed = false;
                } else {
                    window.count += 1;
                }
            })
            .or_insert(fresh);

        allowed
    }

    pub fn remove_client(&self, id: SubscriberId) {
        self.windows.remove(&id);
    }

    /// Drop expired windows. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    pub fn cleanup_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| now < window.reset_at);
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

//! Per-connection traffic tracking.
//!
//! # Responsibilities
//! - Count bytes read and written over three overlapping windows
//! - Reset one window without touching the others
//! - Produce consistent snapshots for monitoring
//! - Signal relay units when the connection is torn down
//!
//! # Concurrency
//! Each tracker has its own lock. Every counter, timestamp and the timeout
//! are read and written only under it, so a reset racing an increment, or a
//! snapshot racing either, always sees one consistent instant.

use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::sync::watch;

use crate::load_balancer::TargetId;
use crate::net::connection::ConnectionId;
use crate::pairing::window::{Window, WindowCounters};

#[derive(Debug)]
struct TrackerState {
    timeout: Duration,
    windows: [WindowCounters; 3],
    destroyed: bool,
}

impl TrackerState {
    fn new(timeout: Duration) -> Self {
        let now = SystemTime::now();
        Self {
            timeout,
            windows: [WindowCounters::starting_at(now); 3],
            destroyed: false,
        }
    }
}

/// Traffic counters and teardown signal for one live connection.
///
/// Shared by both relay directions of a pair and by the pair registry.
#[derive(Debug)]
pub struct TrackedConnection {
    id: ConnectionId,
    peer: String,
    state: RwLock<TrackerState>,
    closed: watch::Sender<bool>,
}

impl TrackedConnection {
    fn new(peer: String, timeout: Duration) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id: ConnectionId::new(),
            peer,
            state: RwLock::new(TrackerState::new(timeout)),
            closed,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address (node side) or target endpoint (target side).
    pub fn peer(&self) -> &str {
        &self.peer
    }

    // Counters stay meaningful after a panicking writer, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, TrackerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TrackerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Idle read timeout. Zero once destroyed.
    pub fn timeout(&self) -> Duration {
        self.read().timeout
    }

    /// Add `n` bytes read to every window.
    pub fn increment_read(&self, n: u64) {
        let mut state = self.write();
        if state.destroyed {
            return;
        }
        for window in &mut state.windows {
            window.bytes_read += n;
        }
    }

    /// Add `n` bytes written to every window.
    pub fn increment_write(&self, n: u64) {
        let mut state = self.write();
        if state.destroyed {
            return;
        }
        for window in &mut state.windows {
            window.bytes_written += n;
        }
    }

    /// Restart `window` now with zeroed counters. Other windows are untouched.
    pub fn reset_window(&self, window: Window) {
        let mut state = self.write();
        if state.destroyed {
            return;
        }
        state.windows[window.index()] = WindowCounters::starting_at(SystemTime::now());
    }

    fn capture(&self, target_id: Option<TargetId>) -> ConnectionSnapshot {
        let state = self.read();
        let [one_minute, five_minutes, thirty_minutes] = state.windows;
        ConnectionSnapshot {
            id: self.id,
            peer: self.peer.clone(),
            timeout_secs: state.timeout.as_secs(),
            one_minute,
            five_minutes,
            thirty_minutes,
            target_id,
            destroyed: state.destroyed,
        }
    }

    /// Clear all counters and signal teardown to anything awaiting [`closed`].
    ///
    /// Returns `true` for the call that actually destroyed the tracker;
    /// later calls are no-ops.
    ///
    /// [`closed`]: TrackedConnection::closed
    pub fn destroy(&self) -> bool {
        {
            let mut state = self.write();
            if state.destroyed {
                return false;
            }
            let now = SystemTime::now();
            state.timeout = Duration::ZERO;
            state.windows = [WindowCounters::starting_at(now); 3];
            state.destroyed = true;
        }
        self.closed.send_replace(true);
        true
    }

    pub fn is_destroyed(&self) -> bool {
        self.read().destroyed
    }

    /// Resolves once the tracker has been destroyed.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives in `self`, so this only returns once the flag is set.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// Independent copy of a tracker, captured under a single lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub id: ConnectionId,
    pub peer: String,
    pub timeout_secs: u64,
    pub one_minute: WindowCounters,
    pub five_minutes: WindowCounters,
    pub thirty_minutes: WindowCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<TargetId>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub destroyed: bool,
}

impl ConnectionSnapshot {
    pub fn window(&self, window: Window) -> &WindowCounters {
        match window {
            Window::OneMinute => &self.one_minute,
            Window::FiveMinutes => &self.five_minutes,
            Window::ThirtyMinutes => &self.thirty_minutes,
        }
    }
}

/// Tracker for a client-facing connection.
#[derive(Debug)]
pub struct NodeConnection {
    inner: TrackedConnection,
}

impl NodeConnection {
    pub fn new(peer_addr: SocketAddr, timeout: Duration) -> Self {
        Self {
            inner: TrackedConnection::new(peer_addr.to_string(), timeout),
        }
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.inner.capture(None)
    }
}

impl Deref for NodeConnection {
    type Target = TrackedConnection;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Tracker for a TLS connection to a target.
#[derive(Debug)]
pub struct TargetConnection {
    inner: TrackedConnection,
    target_id: TargetId,
}

impl TargetConnection {
    pub fn new(endpoint: &str, timeout: Duration, target_id: TargetId) -> Self {
        Self {
            inner: TrackedConnection::new(endpoint.to_string(), timeout),
            target_id,
        }
    }

    /// Target this connection is attached to.
    pub fn target_id(&self) -> &TargetId {
        &self.target_id
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.inner.capture(Some(self.target_id.clone()))
    }
}

impl Deref for TargetConnection {
    type Target = TrackedConnection;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn node() -> NodeConnection {
        NodeConnection::new("127.0.0.1:50000".parse().unwrap(), Duration::from_secs(30))
    }

    #[test]
    fn starts_zeroed() {
        let conn = node();
        let snap = conn.snapshot();
        assert_eq!(snap.timeout_secs, 30);
        for w in Window::ALL {
            assert_eq!(snap.window(w).bytes_read, 0);
            assert_eq!(snap.window(w).bytes_written, 0);
        }
        assert_eq!(snap.one_minute.started_at, snap.thirty_minutes.started_at);
        assert!(snap.target_id.is_none());
    }

    #[test]
    fn increments_apply_to_every_window() {
        let conn = node();
        conn.increment_read(100);
        conn.increment_read(20);
        conn.increment_write(7);

        let snap = conn.snapshot();
        for w in Window::ALL {
            assert_eq!(snap.window(w).bytes_read, 120);
            assert_eq!(snap.window(w).bytes_written, 7);
        }
    }

    #[test]
    fn reset_only_touches_one_window() {
        let conn = node();
        conn.increment_read(500);
        conn.increment_write(50);
        let before = conn.snapshot();

        std::thread::sleep(Duration::from_millis(5));
        conn.reset_window(Window::FiveMinutes);
        conn.increment_read(3);

        let after = conn.snapshot();
        assert_eq!(after.five_minutes.bytes_read, 3);
        assert_eq!(after.five_minutes.bytes_written, 0);
        assert!(after.five_minutes.started_at > before.five_minutes.started_at);

        assert_eq!(after.one_minute.bytes_read, 503);
        assert_eq!(after.thirty_minutes.bytes_written, 50);
        assert_eq!(after.one_minute.started_at, before.one_minute.started_at);
    }

    #[test]
    fn concurrent_increments_and_resets_stay_consistent() {
        let conn = Arc::new(node());
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let conn = conn.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        conn.increment_read(1);
                    }
                })
            })
            .collect();
        let resetter = {
            let conn = conn.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    conn.reset_window(Window::OneMinute);
                }
            })
        };
        for w in writers {
            w.join().unwrap();
        }
        resetter.join().unwrap();

        let snap = conn.snapshot();
        // Untouched windows see every increment.
        assert_eq!(snap.five_minutes.bytes_read, 4000);
        assert_eq!(snap.thirty_minutes.bytes_read, 4000);
        assert!(snap.one_minute.bytes_read <= 4000);

        // After a final reset, only later increments count.
        conn.reset_window(Window::OneMinute);
        conn.increment_read(9);
        assert_eq!(conn.snapshot().one_minute.bytes_read, 9);
    }

    #[test]
    fn snapshots_taken_during_resets_are_never_torn() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let conn = Arc::new(node());
        let created_at = conn.snapshot().five_minutes.started_at;
        std::thread::sleep(Duration::from_millis(2));

        let done = Arc::new(AtomicBool::new(false));
        let reader = {
            let (conn, done) = (conn.clone(), done.clone());
            std::thread::spawn(move || {
                let mut seen = 0u64;
                while !done.load(Ordering::Acquire) {
                    let snap = conn.snapshot();
                    // Never-reset windows always agree with each other.
                    assert_eq!(snap.five_minutes.bytes_read, snap.thirty_minutes.bytes_read);
                    assert_eq!(snap.five_minutes.started_at, created_at);
                    assert!(snap.one_minute.bytes_read <= snap.five_minutes.bytes_read);
                    if snap.one_minute.started_at == created_at {
                        assert_eq!(snap.one_minute.bytes_read, snap.five_minutes.bytes_read);
                    }
                    assert!(snap.five_minutes.bytes_read >= seen);
                    seen = snap.five_minutes.bytes_read;
                }
            })
        };

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let conn = conn.clone();
                std::thread::spawn(move || {
                    for _ in 0..5000 {
                        conn.increment_read(1);
                    }
                })
            })
            .collect();
        let resetter = {
            let conn = conn.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    conn.reset_window(Window::OneMinute);
                    std::thread::yield_now();
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        resetter.join().unwrap();
        done.store(true, Ordering::Release);
        reader.join().unwrap();

        let snap = conn.snapshot();
        assert_eq!(snap.five_minutes.bytes_read, 20_000);
        assert_ne!(snap.one_minute.started_at, created_at);
    }

    #[test]
    fn target_snapshot_carries_target_id() {
        let id = TargetId::from_endpoint("10.0.0.1:443");
        let conn = TargetConnection::new("10.0.0.1:443", Duration::from_secs(10), id.clone());
        assert_eq!(conn.target_id(), &id);
        assert_eq!(conn.snapshot().target_id, Some(id));
        assert_eq!(conn.peer(), "10.0.0.1:443");
    }

    #[test]
    fn destroy_is_once_and_clears_state() {
        let conn = node();
        conn.increment_read(10);

        assert!(conn.destroy());
        assert!(!conn.destroy());
        assert!(conn.is_destroyed());
        assert_eq!(conn.timeout(), Duration::ZERO);

        conn.increment_write(10);
        let snap = conn.snapshot();
        assert!(snap.destroyed);
        assert_eq!(snap.one_minute.bytes_read, 0);
        assert_eq!(snap.one_minute.bytes_written, 0);
    }

    #[tokio::test]
    async fn closed_resolves_after_destroy() {
        let conn = Arc::new(node());
        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.closed().await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        conn.destroy();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        // Already destroyed: resolves immediately.
        conn.closed().await;
    }
}

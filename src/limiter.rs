//! In-process fixed-window rate limiter.
//!
//! Each key owns a window (start instant + counter). The first call for an
//! unseen or expired key opens a fresh window with count 1. Later calls in
//! the same window are admitted until the counter reaches the limit.
//!
//! State lives only in memory: a restart resets every window. Expired
//! windows are reclaimed by a background sweep started with
//! [`RateLimiter::spawn_sweeper`] and stopped through the returned handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

struct Window {
    count: u32,
    started: Instant,
}

pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        RateLimiter {
            windows: Mutex::new(HashMap::new()),
            limit,
            window,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Window>> {
        // A panic while holding the lock cannot leave a window half-updated
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit or deny one action for `key`.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.lock();

        match windows.get_mut(key) {
            Some(w) if now.duration_since(w.started) <= self.window => {
                if w.count >= self.limit {
                    return false;
                }
                w.count += 1;
                true
            }
            _ => {
                windows.insert(
                    key.to_string(),
                    Window {
                        count: 1,
                        started: now,
                    },
                );
                true
            }
        }
    }

    /// Drop every window that has fully elapsed. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, w| now.duration_since(w.started) <= self.window);
        before - windows.len()
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.lock().len()
    }

    /// Start the background sweep, running every two windows.
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let limiter = Arc::clone(self);
        let interval = self.window * 2;
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run_sweep_loop(limiter, interval, stop_rx));
        SweeperHandle {
            stop: Some(stop_tx),
            task,
        }
    }
}

async fn run_sweep_loop(
    limiter: Arc<RateLimiter>,
    interval: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = limiter.sweep();
                if removed > 0 {
                    tracing::debug!(removed, remaining = limiter.tracked_keys(), "Rate limit sweep");
                }
            }
            _ = &mut stop => break,
        }
    }
}

/// Owns the background sweep task.
pub struct SweeperHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweep to stop and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::warn!(error = %e, "Rate limit sweeper ended abnormally");
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if self.stop.is_some() {
            self.task.abort();
        }
    }
}

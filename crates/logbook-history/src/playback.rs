//! Logbook Playback Scheduler
//!
//! Replays recorded history as a live-like delta stream. Each session is a
//! tokio task that, on every real-time tick, reconstructs the next window of
//! `tick × rate` history and emits the resulting deltas in order.
//!
//! Ticks of one session never overlap: a tick still waiting on its read
//! suppresses the ticks that fall due meanwhile. Stopping a session is
//! synchronous; deltas from a read that completes afterwards are discarded.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::reconstruct::HistoryReconstructor;
use chrono::{DateTime, Duration, Utc};
use logbook_common::{Delta, LogbookError, Result};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

// =============================================================================
// Playback Options
// =============================================================================

/// Options for one playback session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackOptions {
    pub start_time: DateTime<Utc>,
    #[serde(default = "default_rate")]
    pub playback_rate: f64,
    #[serde(default)]
    pub context: Option<String>,
}

fn default_rate() -> f64 {
    1.0
}

impl PlaybackOptions {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            playback_rate: default_rate(),
            context: None,
        }
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.playback_rate = rate;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// History covered by one tick. Rejects rates whose first window
    /// cannot be represented.
    fn window(&self, tick: std::time::Duration) -> Result<Duration> {
        if !self.playback_rate.is_finite() || self.playback_rate <= 0.0 {
            return Err(LogbookError::validation("playbackRate must be positive"));
        }

        let too_fast = || LogbookError::validation("playbackRate is too large");
        let window_ms = (tick.as_millis() as f64 * self.playback_rate).round();
        if window_ms >= i64::MAX as f64 {
            return Err(too_fast());
        }
        let window = Duration::try_milliseconds((window_ms as i64).max(1)).ok_or_else(too_fast)?;
        self.start_time
            .checked_add_signed(window)
            .ok_or_else(too_fast)?;
        Ok(window)
    }
}

// =============================================================================
// Sessions
// =============================================================================

#[derive(Debug)]
struct Session {
    generation: u64,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Session {
    fn cancel(self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

type Registry = Arc<Mutex<HashMap<String, Session>>>;

/// Cancels one playback session.
#[derive(Debug)]
pub struct PlaybackHandle {
    session_id: String,
    generation: u64,
    registry: Registry,
}

impl PlaybackHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Stop the session unless it was already replaced by a newer one.
    pub fn cancel(&self) {
        let session = {
            let mut registry = self.registry.lock();
            match registry.get(&self.session_id) {
                Some(s) if s.generation == self.generation => registry.remove(&self.session_id),
                _ => None,
            }
        };
        if let Some(session) = session {
            tracing::debug!(session = %self.session_id, "playback cancelled");
            session.cancel();
        }
    }
}

// =============================================================================
// Playback Scheduler
// =============================================================================

/// Drives timer-based replay sessions.
pub struct PlaybackScheduler {
    reconstructor: Arc<HistoryReconstructor>,
    tick: std::time::Duration,
    sessions: Registry,
    generation: AtomicU64,
}

impl PlaybackScheduler {
    pub fn new(reconstructor: Arc<HistoryReconstructor>, tick: std::time::Duration) -> Self {
        Self {
            reconstructor,
            tick,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Start a session delivering deltas to `on_event`. An active session
    /// with the same id is replaced.
    pub fn start_with_handler<F>(
        &self,
        session_id: impl Into<String>,
        options: PlaybackOptions,
        on_event: F,
    ) -> Result<PlaybackHandle>
    where
        F: Fn(Delta) + Send + Sync + 'static,
    {
        let window = options.window(self.tick)?;
        let session_id = session_id.into();
        self.stop(&session_id);

        let cancelled = Arc::new(AtomicBool::new(false));
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        tracing::info!(
            session = %session_id,
            start = %options.start_time,
            rate = options.playback_rate,
            "starting playback"
        );

        let runner = SessionRunner {
            reconstructor: self.reconstructor.clone(),
            session_id: session_id.clone(),
            generation,
            registry: self.sessions.clone(),
            options,
            tick: self.tick,
            window,
            cancelled: cancelled.clone(),
        };

        // registered before the task can observe the registry
        let mut sessions = self.sessions.lock();
        let task = tokio::spawn(runner.run(on_event));
        sessions.insert(
            session_id.clone(),
            Session {
                generation,
                cancelled,
                task,
            },
        );
        drop(sessions);

        Ok(PlaybackHandle {
            session_id,
            generation,
            registry: self.sessions.clone(),
        })
    }

    /// Start a session and receive its deltas on a channel. The channel
    /// closes once the session is stopped.
    pub fn start(
        &self,
        session_id: impl Into<String>,
        options: PlaybackOptions,
    ) -> Result<(PlaybackHandle, mpsc::UnboundedReceiver<Delta>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.start_with_handler(session_id, options, move |delta| {
            let _ = tx.send(delta);
        })?;
        Ok((handle, rx))
    }

    /// Stop a session; returns false if it was not active.
    pub fn stop(&self, session_id: &str) -> bool {
        let session = self.sessions.lock().remove(session_id);
        match session {
            Some(session) => {
                tracing::info!(session = %session_id, "stopping playback");
                session.cancel();
                true
            }
            None => false,
        }
    }

    /// Ids of active sessions.
    pub fn active_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        for (_, session) in self.sessions.lock().drain() {
            session.cancel();
        }
    }
}

/// State moved into one session task.
struct SessionRunner {
    reconstructor: Arc<HistoryReconstructor>,
    session_id: String,
    generation: u64,
    registry: Registry,
    options: PlaybackOptions,
    tick: std::time::Duration,
    window: Duration,
    cancelled: Arc<AtomicBool>,
}

impl SessionRunner {
    async fn run<F>(self, on_event: F)
    where
        F: Fn(Delta) + Send + Sync + 'static,
    {
        let mut ticker = interval_at(Instant::now() + self.tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut window_start = self.options.start_time;
        loop {
            ticker.tick().await;
            if self.cancelled.load(Ordering::SeqCst) {
                return;
            }

            let Some(window_end) = window_start.checked_add_signed(self.window) else {
                tracing::warn!(session = %self.session_id, "playback reached the end of representable time");
                self.finish();
                return;
            };

            match self
                .reconstructor
                .legacy_deltas(window_start, window_end, self.options.context.as_deref())
                .await
            {
                Ok(deltas) => {
                    tracing::trace!(session = %self.session_id, count = deltas.len(), "playback tick");
                    for delta in deltas {
                        if self.cancelled.load(Ordering::SeqCst) {
                            return;
                        }
                        on_event(delta);
                    }
                }
                Err(e) => {
                    tracing::warn!(session = %self.session_id, error = %e, "playback tick failed, skipping window");
                }
            }
            window_start = window_end;
        }
    }

    /// Drop this session's registry entry unless it was replaced.
    fn finish(&self) {
        let mut registry = self.registry.lock();
        if registry
            .get(&self.session_id)
            .is_some_and(|s| s.generation == self.generation)
        {
            registry.remove(&self.session_id);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

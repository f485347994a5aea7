//! Logbook Recorder
//!
//! Write side of the server. A delta source pushes envelopes to subscribed
//! handlers; the recorder queues them for a single worker task that encodes
//! points and feeds position samples to the track segmenter.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use logbook_common::{Delta, POSITION_PATH};
use logbook_timeseries::{PointStore, SamplingEncoder};
use logbook_tracks::TrackSegmenter;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

// =============================================================================
// Delta Source
// =============================================================================

/// Callback receiving pushed deltas.
pub type DeltaHandler = Arc<dyn Fn(Delta) + Send + Sync>;

/// A push stream of delta envelopes.
pub trait DeltaSource: Send + Sync {
    /// Attach a handler; it stays attached until the subscription is dropped.
    fn subscribe(&self, handler: DeltaHandler) -> Subscription;
}

/// Detaches its handler when dropped or unsubscribed.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(detach: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

// =============================================================================
// Broadcast Source
// =============================================================================

/// In-process delta source fanning out to every subscriber.
pub struct BroadcastDeltaSource {
    sender: broadcast::Sender<Delta>,
}

impl BroadcastDeltaSource {
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size.max(1));
        Self { sender }
    }

    /// Publish a delta; returns the number of subscribers reached.
    pub fn publish(&self, delta: Delta) -> usize {
        self.sender.send(delta).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastDeltaSource {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl DeltaSource for BroadcastDeltaSource {
    fn subscribe(&self, handler: DeltaHandler) -> Subscription {
        let mut receiver = self.sender.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(delta) => handler(delta),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "delta subscriber lagged, deltas dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let abort = task.abort_handle();
        Subscription::new(move || abort.abort())
    }
}

// =============================================================================
// Recorder
// =============================================================================

/// Recorder counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecorderStats {
    pub deltas_processed: u64,
    pub points_encoded: u64,
    pub track_points: u64,
}

/// Encodes incoming deltas into points and track samples.
pub struct Recorder {
    encoder: SamplingEncoder,
    segmenter: Arc<TrackSegmenter>,
    points: Arc<dyn PointStore>,
    deltas_processed: AtomicU64,
    points_encoded: AtomicU64,
    track_points: AtomicU64,
}

impl Recorder {
    pub fn new(
        encoder: SamplingEncoder,
        segmenter: Arc<TrackSegmenter>,
        points: Arc<dyn PointStore>,
    ) -> Self {
        Self {
            encoder,
            segmenter,
            points,
            deltas_processed: AtomicU64::new(0),
            points_encoded: AtomicU64::new(0),
            track_points: AtomicU64::new(0),
        }
    }

    /// Subscribe to `source` and process its deltas on a worker task, one at
    /// a time in arrival order.
    pub fn attach(self: &Arc<Self>, source: &dyn DeltaSource) -> Subscription {
        let (tx, mut rx) = mpsc::unbounded_channel::<Delta>();

        let recorder = self.clone();
        tokio::spawn(async move {
            while let Some(delta) = rx.recv().await {
                recorder.process(delta).await;
            }
            tracing::debug!("recorder worker stopped");
        });

        source.subscribe(Arc::new(move |delta: Delta| {
            if tx.send(delta).is_err() {
                tracing::warn!("recorder queue closed, dropping delta");
            }
        }))
    }

    /// Encode one delta. Point writes are spawned and their failures only
    /// logged; returns the number of points handed to the store.
    pub async fn process(&self, mut delta: Delta) -> usize {
        delta.normalize_context(&self.encoder.config().self_context);

        let points = self.encoder.encode_delta(&delta);
        let count = points.len();
        if count > 0 {
            let store = self.points.clone();
            let context = delta.context.clone();
            tokio::spawn(async move {
                if let Err(e) = store.write_points(points).await {
                    tracing::warn!(context = %context, count, error = %e, "point write failed");
                }
            });
        }

        for update in delta.signal_updates() {
            if update.path == POSITION_PATH && self.segmenter.record(&update).await.is_some() {
                self.track_points.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.points_encoded.fetch_add(count as u64, Ordering::Relaxed);
        self.deltas_processed.fetch_add(1, Ordering::Release);
        count
    }

    pub fn stats(&self) -> RecorderStats {
        RecorderStats {
            deltas_processed: self.deltas_processed.load(Ordering::Acquire),
            points_encoded: self.points_encoded.load(Ordering::Relaxed),
            track_points: self.track_points.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

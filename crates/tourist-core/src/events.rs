//! Store change notifications and the projection seam for presentation layers.
//!
//! Every photo store mutation is published on an [`EventBus`] as a
//! [`StoreEnvelope`]. Envelopes carry a per-store sequence number assigned
//! under the store's mutation lock, so subscribers observe mutations in the
//! order they were committed.
//!
//! Presentation layers do not consume envelopes one at a time. They implement
//! [`ChangeProjector`] and are driven by [`run_projector`], which groups every
//! immediately available change for one location into a [`ChangeBatch`].

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use uuid::Uuid;

use crate::models::Photo;

// ============================================================================
// Events
// ============================================================================

/// A single committed change to the photo store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "photo")]
pub enum StoreEvent {
    Inserted(Photo),
    Updated(Photo),
    Deleted(Photo),
}

impl StoreEvent {
    /// The photo the change applies to (post-change state for insert/update,
    /// last known state for delete).
    pub fn photo(&self) -> &Photo {
        match self {
            Self::Inserted(p) | Self::Updated(p) | Self::Deleted(p) => p,
        }
    }

    /// Namespaced event type for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Inserted(_) => "photo.inserted",
            Self::Updated(_) => "photo.updated",
            Self::Deleted(_) => "photo.deleted",
        }
    }
}

/// Envelope wrapping a [`StoreEvent`] with ordering metadata.
#[derive(Debug, Clone, Serialize)]
pub struct StoreEnvelope {
    /// Strictly increasing per store instance.
    pub seq: u64,
    /// Unique event identifier (UUIDv7).
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub event: StoreEvent,
}

impl StoreEnvelope {
    pub fn new(seq: u64, event: StoreEvent) -> Self {
        Self {
            seq,
            event_id: crate::uuid_utils::new_v7(),
            occurred_at: Utc::now(),
            event,
        }
    }

    pub fn location_id(&self) -> Uuid {
        self.event.photo().location_id
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast channel for store change notifications.
///
/// Sequence numbers are supplied by the caller; the store holds its mutation
/// lock across the database write and the call to [`EventBus::emit`].
pub struct EventBus {
    tx: broadcast::Sender<StoreEnvelope>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish `event` as sequence number `seq`. Dropped silently when no one
    /// is subscribed.
    pub fn emit(&self, seq: u64, event: StoreEvent) {
        let envelope = StoreEnvelope::new(seq, event);
        tracing::trace!(
            event_type = envelope.event.event_type(),
            seq,
            photo_key = %envelope.event.photo().key,
            location_id = %envelope.location_id(),
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    /// Subscribe to all subsequent envelopes.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

// ============================================================================
// Change projection
// ============================================================================

/// Changes for one location grouped into a single delivery.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeBatch {
    pub location_id: Uuid,
    pub inserted: Vec<Photo>,
    pub updated: Vec<Photo>,
    pub deleted: Vec<Photo>,
    /// The receiver fell behind and envelopes were lost; reload via `query`.
    pub lagged: bool,
    /// Sequence number of the last envelope folded into this batch.
    pub last_seq: Option<u64>,
}

impl ChangeBatch {
    fn new(location_id: Uuid) -> Self {
        Self {
            location_id,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Number of changes in the batch.
    pub fn len(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }

    fn push(&mut self, envelope: StoreEnvelope) {
        self.last_seq = Some(envelope.seq);
        match envelope.event {
            StoreEvent::Inserted(p) => self.inserted.push(p),
            StoreEvent::Updated(p) => self.updated.push(p),
            StoreEvent::Deleted(p) => self.deleted.push(p),
        }
    }

    fn has_content(&self) -> bool {
        !self.is_empty() || self.lagged
    }
}

/// Receives batched store changes for a single location.
///
/// Implementations run on one task; `apply` is never called concurrently.
pub trait ChangeProjector: Send {
    fn apply(&mut self, batch: ChangeBatch);
}

/// Wait for the next change affecting `location_id`, then drain everything
/// else already buffered for it without waiting.
///
/// Returns `None` once the bus is closed and nothing is left to deliver.
pub async fn next_batch(
    rx: &mut broadcast::Receiver<StoreEnvelope>,
    location_id: Uuid,
) -> Option<ChangeBatch> {
    let mut batch = ChangeBatch::new(location_id);

    loop {
        match rx.recv().await {
            Ok(envelope) if envelope.location_id() == location_id => {
                batch.push(envelope);
                break;
            }
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(%location_id, skipped, "Change receiver lagged");
                batch.lagged = true;
                break;
            }
            Err(RecvError::Closed) => return None,
        }
    }

    drain_into(rx, &mut batch);
    Some(batch)
}

/// Everything already buffered for `location_id`, without waiting.
///
/// Returns `None` when nothing relevant is buffered.
pub fn try_next_batch(
    rx: &mut broadcast::Receiver<StoreEnvelope>,
    location_id: Uuid,
) -> Option<ChangeBatch> {
    let mut batch = ChangeBatch::new(location_id);
    drain_into(rx, &mut batch);
    batch.has_content().then_some(batch)
}

fn drain_into(rx: &mut broadcast::Receiver<StoreEnvelope>, batch: &mut ChangeBatch) {
    let location_id = batch.location_id;
    loop {
        match rx.try_recv() {
            Ok(envelope) if envelope.location_id() == location_id => batch.push(envelope),
            Ok(_) => continue,
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::warn!(%location_id, skipped, "Change receiver lagged");
                batch.lagged = true;
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

/// Feed batches for `location_id` into `projector` until the bus closes or
/// `shutdown` resolves. On shutdown, changes already buffered are delivered
/// as one final batch.
///
/// Returns the number of batches applied.
pub async fn run_projector<P, F>(
    mut rx: broadcast::Receiver<StoreEnvelope>,
    location_id: Uuid,
    projector: &mut P,
    shutdown: F,
) -> u64
where
    P: ChangeProjector + ?Sized,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut applied = 0u64;

    loop {
        tokio::select! {
            batch = next_batch(&mut rx, location_id) => match batch {
                Some(batch) => {
                    apply_batch(projector, batch);
                    applied += 1;
                }
                None => break,
            },
            _ = &mut shutdown => {
                if let Some(batch) = try_next_batch(&mut rx, location_id) {
                    apply_batch(projector, batch);
                    applied += 1;
                }
                break;
            }
        }
    }

    tracing::debug!(%location_id, applied, "Change projector finished");
    applied
}

fn apply_batch<P: ChangeProjector + ?Sized>(projector: &mut P, batch: ChangeBatch) {
    tracing::debug!(
        location_id = %batch.location_id,
        inserted = batch.inserted.len(),
        updated = batch.updated.len(),
        deleted = batch.deleted.len(),
        lagged = batch.lagged,
        "Applying change batch"
    );
    projector.apply(batch);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PhotoFields;

    fn photo(location_id: Uuid, id: &str) -> Photo {
        Photo::new(location_id, PhotoFields::new("1", "2", id, "abc"))
    }

    #[tokio::test]
    async fn test_event_bus_emit_subscribe() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();
        let loc = Uuid::new_v4();

        bus.emit(1, StoreEvent::Inserted(photo(loc, "10")));

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.seq, 1);
        assert_eq!(envelope.location_id(), loc);
        assert_eq!(envelope.event.event_type(), "photo.inserted");
        assert_eq!(envelope.event_id.get_version_num(), 7);
    }

    #[tokio::test]
    async fn test_event_bus_no_subscribers_ok() {
        let bus = EventBus::new(32);
        bus.emit(1, StoreEvent::Deleted(photo(Uuid::nil(), "1")));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_event_bus_subscriber_count() {
        let bus = EventBus::new(32);
        let rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        drop(rx1);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_store_event_json_shape() {
        let event = StoreEvent::Updated(photo(Uuid::nil(), "3"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Updated");
        assert_eq!(json["photo"]["local_filename"], "3_abc_t.jpg");
    }

    #[tokio::test]
    async fn test_next_batch_groups_buffered_events() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();
        let loc = Uuid::new_v4();

        bus.emit(1, StoreEvent::Inserted(photo(loc, "1")));
        bus.emit(2, StoreEvent::Inserted(photo(loc, "2")));
        bus.emit(3, StoreEvent::Updated(photo(loc, "1")));
        bus.emit(4, StoreEvent::Deleted(photo(loc, "2")));

        let batch = next_batch(&mut rx, loc).await.unwrap();
        assert_eq!(batch.inserted.len(), 2);
        assert_eq!(batch.updated.len(), 1);
        assert_eq!(batch.deleted.len(), 1);
        assert_eq!(batch.last_seq, Some(4));
        assert!(!batch.lagged);
        assert_eq!(batch.inserted[0].id, "1");
        assert_eq!(batch.inserted[1].id, "2");
    }

    #[tokio::test]
    async fn test_next_batch_filters_other_locations() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();
        let mine = Uuid::new_v4();
        let other = Uuid::new_v4();

        bus.emit(1, StoreEvent::Inserted(photo(other, "1")));
        bus.emit(2, StoreEvent::Inserted(photo(mine, "2")));
        bus.emit(3, StoreEvent::Inserted(photo(other, "3")));

        let batch = next_batch(&mut rx, mine).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.inserted[0].id, "2");
    }

    #[tokio::test]
    async fn test_next_batch_reports_lag() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        let loc = Uuid::new_v4();

        for seq in 1..=5 {
            bus.emit(seq, StoreEvent::Inserted(photo(loc, &seq.to_string())));
        }

        let batch = next_batch(&mut rx, loc).await.unwrap();
        assert!(batch.lagged);
    }

    #[tokio::test]
    async fn test_next_batch_returns_none_when_closed() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        drop(bus);
        assert!(next_batch(&mut rx, Uuid::new_v4()).await.is_none());
    }

    struct Recorder {
        batches: Vec<ChangeBatch>,
    }

    impl ChangeProjector for Recorder {
        fn apply(&mut self, batch: ChangeBatch) {
            self.batches.push(batch);
        }
    }

    #[tokio::test]
    async fn test_run_projector_until_closed() {
        let bus = EventBus::new(32);
        let rx = bus.subscribe();
        let loc = Uuid::new_v4();

        bus.emit(1, StoreEvent::Inserted(photo(loc, "1")));
        bus.emit(2, StoreEvent::Updated(photo(loc, "1")));
        drop(bus);

        let mut recorder = Recorder { batches: vec![] };
        let applied = run_projector(rx, loc, &mut recorder, std::future::pending()).await;

        assert_eq!(applied, 1);
        assert_eq!(recorder.batches[0].inserted.len(), 1);
        assert_eq!(recorder.batches[0].updated.len(), 1);
    }

    #[tokio::test]
    async fn test_run_projector_delivers_buffered_changes_on_shutdown() {
        let bus = EventBus::new(32);
        let rx = bus.subscribe();
        let loc = Uuid::new_v4();

        for seq in 1..=3 {
            bus.emit(seq, StoreEvent::Updated(photo(loc, &seq.to_string())));
        }

        let mut recorder = Recorder { batches: vec![] };
        let applied = run_projector(rx, loc, &mut recorder, std::future::ready(())).await;

        let updated: usize = recorder.batches.iter().map(|b| b.updated.len()).sum();
        assert_eq!(updated, 3);
        assert!(applied >= 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_try_next_batch_does_not_wait() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();
        let loc = Uuid::new_v4();

        assert!(try_next_batch(&mut rx, loc).is_none());

        bus.emit(1, StoreEvent::Inserted(photo(Uuid::new_v4(), "9")));
        bus.emit(2, StoreEvent::Deleted(photo(loc, "1")));
        let batch = try_next_batch(&mut rx, loc).unwrap();
        assert_eq!(batch.deleted.len(), 1);
        assert_eq!(batch.last_seq, Some(2));
        assert!(try_next_batch(&mut rx, loc).is_none());
    }
}

use std::{sync::Arc, time::Duration};

use {
    dashmap::{DashMap, mapref::entry::Entry},
    tokio::{sync::mpsc, time::Instant},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
    wabridge_common::{DeliveryStatus, StatusUpdate, types::ERROR_UNDELIVERED},
};

/// Key a provider message id is tracked and reported under: the segment after
/// the last `_` of the serialized id.
pub fn correlation_key(message_id: &str) -> &str {
    message_id
        .rsplit_once('_')
        .map_or(message_id, |(_, tail)| tail)
}

/// Cancels the deadline timer when dropped.
struct DeadlineGuard(CancellationToken);

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

struct Delivery {
    status: DeliveryStatus,
    /// No status may be emitted once set.
    finalized: bool,
    /// Armed until the first mapped acknowledgment.
    deadline: Option<DeadlineGuard>,
    updated_at: Instant,
}

impl Delivery {
    fn new(status: DeliveryStatus, deadline: Option<DeadlineGuard>) -> Self {
        Self {
            status,
            finalized: status.is_terminal(),
            deadline,
            updated_at: Instant::now(),
        }
    }

    fn finalize(&mut self, status: DeliveryStatus) {
        self.status = status;
        self.finalized = true;
        self.deadline = None;
        self.updated_at = Instant::now();
    }
}

struct Inner {
    deliveries: DashMap<String, Delivery>,
    ack_timeout: Duration,
    retention: Duration,
    final_retention: Duration,
    updates: mpsc::UnboundedSender<StatusUpdate>,
}

impl Inner {
    /// Emit while the caller still holds the delivery's entry guard, so the
    /// update order matches the order decisions were made in.
    fn emit(&self, update: StatusUpdate) {
        debug!(
            message_id = %update.message_id,
            status = %update.status,
            error_code = ?update.error_code,
            "delivery status changed"
        );
        if self.updates.send(update).is_err() {
            warn!("status update channel closed, dropping update");
        }
    }

    fn expire(&self, message_id: &str) {
        let Some(mut delivery) = self.deliveries.get_mut(message_id) else {
            return;
        };
        if delivery.finalized || delivery.deadline.is_none() {
            return;
        }
        info!(message_id, "message not acknowledged in time, marking as failed");
        delivery.finalize(DeliveryStatus::Failed);
        self.emit(StatusUpdate::failed(message_id, ERROR_UNDELIVERED));
    }
}

/// Tracks outbound messages from send to final acknowledgment.
///
/// All decisions for one message are made under its map entry guard, so a
/// deadline firing and an acknowledgment arriving at the same time resolve
/// to exactly one outcome.
#[derive(Clone)]
pub struct DeliveryTracker {
    inner: Arc<Inner>,
}

impl DeliveryTracker {
    pub fn new(
        ack_timeout: Duration,
        retention: Duration,
        final_retention: Duration,
        updates: mpsc::UnboundedSender<StatusUpdate>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                deliveries: DashMap::new(),
                ack_timeout,
                retention,
                final_retention,
                updates,
            }),
        }
    }

    /// Start tracking `message_id`, emit SENT and arm its deadline.
    ///
    /// Returns `false` if the message is already tracked; nothing happens
    /// in that case.
    pub fn record_sent(&self, message_id: &str) -> bool {
        let Entry::Vacant(slot) = self.inner.deliveries.entry(message_id.to_string()) else {
            debug!(message_id, "message already tracked");
            return false;
        };

        let token = CancellationToken::new();
        let delivery = slot.insert(Delivery::new(
            DeliveryStatus::Sent,
            Some(DeadlineGuard(token.clone())),
        ));
        self.inner
            .emit(StatusUpdate::new(message_id, DeliveryStatus::Sent));
        drop(delivery);

        let inner = Arc::clone(&self.inner);
        let message_id = message_id.to_string();
        let deadline = Instant::now() + self.inner.ack_timeout;
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {},
                () = tokio::time::sleep_until(deadline) => inner.expire(&message_id),
            }
        });
        true
    }

    /// Apply a provider acknowledgment.
    ///
    /// Levels other than 1, 2 and 3 are ignored. Any mapped level disarms the
    /// deadline; a status is emitted only when it advances the delivery.
    /// Returns the emitted status.
    pub fn record_ack(&self, message_id: &str, ack: i32) -> Option<DeliveryStatus> {
        let Some(status) = DeliveryStatus::from_ack(ack) else {
            debug!(message_id, ack, "ignoring acknowledgment level");
            return None;
        };

        match self.inner.deliveries.entry(message_id.to_string()) {
            Entry::Vacant(slot) => {
                let _delivery = slot.insert(Delivery::new(status, None));
                self.inner.emit(StatusUpdate::new(message_id, status));
                Some(status)
            },
            Entry::Occupied(mut slot) => {
                let delivery = slot.get_mut();
                if delivery.finalized {
                    debug!(message_id, %status, current = %delivery.status, "late acknowledgment suppressed");
                    return None;
                }
                delivery.deadline = None;
                delivery.updated_at = Instant::now();
                if status <= delivery.status {
                    return None;
                }
                delivery.status = status;
                delivery.finalized = status.is_terminal();
                self.inner.emit(StatusUpdate::new(message_id, status));
                Some(status)
            },
        }
    }

    /// Mark `message_id` FAILED with `error_code`. Returns `false` if the
    /// message had already reached a final status.
    pub fn report_send_failure(&self, message_id: &str, error_code: u32) -> bool {
        match self.inner.deliveries.entry(message_id.to_string()) {
            Entry::Occupied(slot) if slot.get().finalized => {
                debug!(message_id, "failure after final status suppressed");
                false
            },
            Entry::Occupied(mut slot) => {
                slot.get_mut().finalize(DeliveryStatus::Failed);
                self.inner.emit(StatusUpdate::failed(message_id, error_code));
                true
            },
            Entry::Vacant(slot) => {
                let _delivery = slot.insert(Delivery::new(DeliveryStatus::Failed, None));
                self.inner.emit(StatusUpdate::failed(message_id, error_code));
                true
            },
        }
    }

    pub fn status(&self, message_id: &str) -> Option<DeliveryStatus> {
        self.inner.deliveries.get(message_id).map(|d| d.status)
    }

    /// Drop records with no armed deadline that have not changed within their
    /// retention window. Final records use the longer window, since dropping
    /// one would let a late acknowledgment be reported again. Returns how many
    /// were dropped.
    pub fn prune(&self) -> usize {
        let before = self.inner.deliveries.len();
        let retention = self.inner.retention;
        let final_retention = self.inner.final_retention;
        self.inner.deliveries.retain(|_, d| {
            let window = if d.finalized {
                final_retention
            } else {
                retention
            };
            d.deadline.is_some() || d.updated_at.elapsed() < window
        });
        let pruned = before.saturating_sub(self.inner.deliveries.len());
        if pruned > 0 {
            debug!(pruned, "pruned delivery records");
        }
        pruned
    }

    /// Disarm every deadline without emitting anything.
    pub fn shutdown(&self) {
        let mut disarmed = 0usize;
        for mut delivery in self.inner.deliveries.iter_mut() {
            if delivery.deadline.take().is_some() {
                disarmed += 1;
            }
        }
        debug!(disarmed, "delivery deadlines disarmed");
    }

    pub fn len(&self) -> usize {
        self.inner.deliveries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.deliveries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, wabridge_common::types::ERROR_SEND_FAILED};

    const ACK_TIMEOUT: Duration = Duration::from_secs(20);
    const RETENTION: Duration = Duration::from_secs(3600);
    const FINAL_RETENTION: Duration = Duration::from_secs(7 * 24 * 3600);

    fn tracker() -> (DeliveryTracker, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            DeliveryTracker::new(ACK_TIMEOUT, RETENTION, FINAL_RETENTION, tx),
            rx,
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<StatusUpdate>) -> Vec<StatusUpdate> {
        let mut out = Vec::new();
        while let Ok(update) = rx.try_recv() {
            out.push(update);
        }
        out
    }

    async fn advance(by: Duration) {
        tokio::task::yield_now().await;
        tokio::time::advance(by).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn correlation_key_is_last_segment() {
        assert_eq!(
            correlation_key("true_15551234567@c.us_3EB0ABCDEF"),
            "3EB0ABCDEF"
        );
        assert_eq!(correlation_key("3EB0ABCDEF"), "3EB0ABCDEF");
    }

    #[tokio::test(start_paused = true)]
    async fn early_ack_prevents_failure() {
        let (tracker, mut rx) = tracker();
        assert!(tracker.record_sent("m1"));
        advance(Duration::from_secs(1)).await;
        assert_eq!(tracker.record_ack("m1", 2), Some(DeliveryStatus::Delivered));

        advance(ACK_TIMEOUT * 2).await;
        let updates = drain(&mut rx);
        assert_eq!(updates, vec![
            StatusUpdate::new("m1", DeliveryStatus::Sent),
            StatusUpdate::new("m1", DeliveryStatus::Delivered),
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_ack_fails_once_and_suppresses_late_ack() {
        let (tracker, mut rx) = tracker();
        tracker.record_sent("m1");
        advance(ACK_TIMEOUT + Duration::from_millis(1)).await;

        assert_eq!(tracker.status("m1"), Some(DeliveryStatus::Failed));
        assert_eq!(tracker.record_ack("m1", 3), None);
        advance(ACK_TIMEOUT).await;

        let updates = drain(&mut rx);
        assert_eq!(updates, vec![
            StatusUpdate::new("m1", DeliveryStatus::Sent),
            StatusUpdate::failed("m1", ERROR_UNDELIVERED),
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn record_sent_is_idempotent() {
        let (tracker, mut rx) = tracker();
        assert!(tracker.record_sent("m1"));
        assert!(!tracker.record_sent("m1"));
        advance(ACK_TIMEOUT + Duration::from_millis(1)).await;

        let failures = drain(&mut rx)
            .into_iter()
            .filter(|u| u.status == DeliveryStatus::Failed)
            .count();
        assert_eq!(failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn acks_only_advance() {
        let (tracker, mut rx) = tracker();
        tracker.record_sent("m1");
        assert_eq!(tracker.record_ack("m1", 1), None);
        assert_eq!(tracker.record_ack("m1", 3), Some(DeliveryStatus::Read));
        assert_eq!(tracker.record_ack("m1", 2), None);

        let statuses: Vec<_> = drain(&mut rx).into_iter().map(|u| u.status).collect();
        assert_eq!(statuses, vec![DeliveryStatus::Sent, DeliveryStatus::Read]);
    }

    #[tokio::test(start_paused = true)]
    async fn server_ack_disarms_deadline() {
        let (tracker, mut rx) = tracker();
        tracker.record_sent("m1");
        tracker.record_ack("m1", 1);
        advance(ACK_TIMEOUT * 2).await;

        assert_eq!(tracker.status("m1"), Some(DeliveryStatus::Sent));
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unmapped_ack_levels_have_no_effect() {
        let (tracker, mut rx) = tracker();
        tracker.record_sent("m1");
        for level in [-1, 0, 4] {
            assert_eq!(tracker.record_ack("m1", level), None);
        }
        advance(ACK_TIMEOUT + Duration::from_millis(1)).await;
        assert_eq!(tracker.status("m1"), Some(DeliveryStatus::Failed));
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[tokio::test]
    async fn ack_for_unknown_message_creates_record() {
        let (tracker, mut rx) = tracker();
        assert_eq!(tracker.record_ack("m9", 2), Some(DeliveryStatus::Delivered));
        assert_eq!(tracker.len(), 1);
        assert_eq!(drain(&mut rx), vec![StatusUpdate::new(
            "m9",
            DeliveryStatus::Delivered
        )]);
    }

    #[tokio::test(start_paused = true)]
    async fn send_failure_is_final() {
        let (tracker, mut rx) = tracker();
        assert!(tracker.report_send_failure("m1", ERROR_SEND_FAILED));
        assert!(!tracker.report_send_failure("m1", ERROR_SEND_FAILED));
        assert_eq!(tracker.record_ack("m1", 2), None);

        assert_eq!(drain(&mut rx), vec![StatusUpdate::failed(
            "m1",
            ERROR_SEND_FAILED
        )]);
    }

    #[tokio::test(start_paused = true)]
    async fn final_records_use_longer_retention() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let tracker = DeliveryTracker::new(
            ACK_TIMEOUT,
            Duration::from_secs(60),
            Duration::from_secs(600),
            tx,
        );
        tracker.record_ack("old", 2);
        tracker.record_ack("read", 3);
        advance(Duration::from_secs(61)).await;
        tracker.record_sent("armed");
        tracker.record_ack("recent", 2);

        assert_eq!(tracker.prune(), 1);
        assert_eq!(tracker.status("old"), None);
        assert_eq!(tracker.status("read"), Some(DeliveryStatus::Read));
        assert!(tracker.status("armed").is_some());
        assert!(tracker.status("recent").is_some());

        advance(Duration::from_secs(700)).await;
        assert_eq!(tracker.prune(), 3);
        assert!(tracker.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_message_stays_failed_after_prune() {
        let (tracker, mut rx) = tracker();
        tracker.record_sent("m1");
        advance(ACK_TIMEOUT + Duration::from_secs(1)).await;
        advance(RETENTION + Duration::from_secs(1)).await;

        assert_eq!(tracker.prune(), 0);
        assert_eq!(tracker.record_ack("m1", 2), None);
        assert_eq!(tracker.status("m1"), Some(DeliveryStatus::Failed));
        assert_eq!(drain(&mut rx), vec![
            StatusUpdate::new("m1", DeliveryStatus::Sent),
            StatusUpdate::failed("m1", ERROR_UNDELIVERED),
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_disarms_without_emitting() {
        let (tracker, mut rx) = tracker();
        tracker.record_sent("m1");
        tracker.shutdown();
        advance(ACK_TIMEOUT * 2).await;

        assert_eq!(tracker.status("m1"), Some(DeliveryStatus::Sent));
        assert_eq!(drain(&mut rx).len(), 1);
    }
}

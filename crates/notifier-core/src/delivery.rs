//! Hand-off from the dispatcher to notification channels.
//!
//! The dispatcher only sees the [`Delivery`] seam. In production that is a
//! [`DeliveryQueue`]: a bounded channel drained by a worker task
//! ([`spawn_delivery_worker`]) that resolves each target id to its
//! definition and calls a [`NotificationSink`]. A full queue drops the
//! notification with a warning instead of blocking ingestion, and sink
//! failures stay inside the worker.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

use notifier_types::TargetId;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::NotificationTarget;
use crate::record::{RaidRecord, SpawnRecord};
use crate::roster::RosterTransition;

/// Errors raised while handing off or sending a notification.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The delivery queue is at capacity.
    #[error("delivery queue is full")]
    QueueFull,

    /// The delivery worker has stopped.
    #[error("delivery queue is closed")]
    Closed,

    /// A sink failed to send.
    #[error("sink error: {0}")]
    Sink(String),
}

/// What is being delivered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum NotificationPayload {
    /// A matching spawn.
    Spawn(SpawnRecord),
    /// A matching raid or egg.
    Raid(RaidRecord),
    /// A tracked trainer joined a gym.
    GymJoin(RosterTransition),
}

impl NotificationPayload {
    /// Label for log fields.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Spawn(_) => "spawn",
            Self::Raid(r) if r.is_egg() => "egg",
            Self::Raid(_) => "raid",
            Self::GymJoin(_) => "gym_join",
        }
    }
}

/// A payload and the set of targets it goes to. Each target appears once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Destination target ids.
    pub targets: BTreeSet<TargetId>,
    /// The record being announced.
    pub payload: NotificationPayload,
}

/// Receives notifications from the dispatcher.
///
/// Implementations must not block: the dispatcher calls this inline for
/// every match. Errors are logged by the caller and otherwise ignored.
pub trait Delivery {
    /// Hand off one notification.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] if the notification could not be accepted.
    fn deliver(&mut self, notification: Notification) -> Result<(), DeliveryError>;
}

/// Collects notifications in memory.
impl Delivery for Vec<Notification> {
    fn deliver(&mut self, notification: Notification) -> Result<(), DeliveryError> {
        self.push(notification);
        Ok(())
    }
}

/// Sends one payload to one resolved target.
pub trait NotificationSink: Send + 'static {
    /// Render and transmit `payload` for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Sink`] if transmission fails.
    fn send(
        &mut self,
        target: &TargetId,
        definition: &NotificationTarget,
        payload: &NotificationPayload,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Producer side of the bounded delivery queue.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    tx: mpsc::Sender<Notification>,
}

/// Consumer side of the bounded delivery queue.
#[derive(Debug)]
pub struct DeliveryReceiver {
    rx: mpsc::Receiver<Notification>,
}

impl DeliveryReceiver {
    /// Wait for the next notification; `None` once every queue handle is dropped.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }
}

/// Create a delivery queue holding at most `capacity` pending notifications.
///
/// A capacity of zero is raised to one.
pub fn delivery_queue(capacity: usize) -> (DeliveryQueue, DeliveryReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (DeliveryQueue { tx }, DeliveryReceiver { rx })
}

impl Delivery for DeliveryQueue {
    fn deliver(&mut self, notification: Notification) -> Result<(), DeliveryError> {
        self.tx.try_send(notification).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Counters reported by the delivery worker when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Sends that succeeded.
    pub sent: u64,
    /// Sends the sink rejected.
    pub failed: u64,
    /// Target ids with no definition.
    pub unknown_targets: u64,
}

/// Drain `queue` on a background task until every [`DeliveryQueue`] handle
/// is dropped, sending each notification to each of its targets in order.
pub fn spawn_delivery_worker<S: NotificationSink>(
    mut queue: DeliveryReceiver,
    targets: Arc<BTreeMap<TargetId, NotificationTarget>>,
    mut sink: S,
) -> JoinHandle<DeliveryStats> {
    tokio::spawn(async move {
        let mut stats = DeliveryStats::default();
        while let Some(notification) = queue.recv().await {
            for target in &notification.targets {
                let Some(definition) = targets.get(target) else {
                    warn!(target_id = %target, "notification for undefined target, skipping");
                    stats.unknown_targets = stats.unknown_targets.saturating_add(1);
                    continue;
                };
                match sink.send(target, definition, &notification.payload).await {
                    Ok(()) => {
                        debug!(target_id = %target, kind = notification.payload.kind(), "notification sent");
                        stats.sent = stats.sent.saturating_add(1);
                    }
                    Err(e) => {
                        warn!(target_id = %target, error = %e, "notification send failed");
                        stats.failed = stats.failed.saturating_add(1);
                    }
                }
            }
        }
        info!(
            sent = stats.sent,
            failed = stats.failed,
            unknown_targets = stats.unknown_targets,
            "delivery worker stopped"
        );
        stats
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use notifier_types::{GymId, Team};

    use super::*;

    fn join(trainer: &str) -> NotificationPayload {
        NotificationPayload::GymJoin(RosterTransition {
            trainer_name: trainer.to_owned(),
            gym_id: GymId::new("g1"),
            gym_name: String::from("Fountain"),
            latitude: 0.0,
            longitude: 0.0,
            team: Team::Instinct,
        })
    }

    fn notification(targets: &[&str], trainer: &str) -> Notification {
        Notification {
            targets: targets.iter().map(|t| TargetId::new(*t)).collect(),
            payload: join(trainer),
        }
    }

    /// Records every send; fails for targets named `broken`.
    #[derive(Clone, Default)]
    struct Recorder {
        sent: Arc<Mutex<Vec<(String, &'static str)>>>,
    }

    impl NotificationSink for Recorder {
        async fn send(
            &mut self,
            target: &TargetId,
            _definition: &NotificationTarget,
            payload: &NotificationPayload,
        ) -> Result<(), DeliveryError> {
            if target.as_str() == "broken" {
                return Err(DeliveryError::Sink("boom".to_owned()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((target.as_str().to_owned(), payload.kind()));
            Ok(())
        }
    }

    #[test]
    fn full_queue_rejects_without_blocking() {
        let (mut queue, _rx) = delivery_queue(1);
        queue.deliver(notification(&["a"], "ash")).unwrap();
        assert!(matches!(
            queue.deliver(notification(&["a"], "misty")),
            Err(DeliveryError::QueueFull)
        ));
    }

    #[test]
    fn closed_queue_reports_closed() {
        let (mut queue, rx) = delivery_queue(4);
        drop(rx);
        assert!(matches!(
            queue.deliver(notification(&["a"], "ash")),
            Err(DeliveryError::Closed)
        ));
    }

    #[test]
    fn payload_serializes_with_kind_tag() {
        let value = serde_json::to_value(join("ash")).unwrap();
        assert_eq!(value["kind"], "gym_join");
        assert_eq!(value["record"]["trainer_name"], "ash");
    }

    #[tokio::test]
    async fn worker_sends_to_each_target_and_survives_failures() {
        let targets: BTreeMap<TargetId, NotificationTarget> = ["a", "b", "broken"]
            .into_iter()
            .map(|t| (TargetId::new(t), NotificationTarget::default()))
            .collect();
        let sink = Recorder::default();
        let sent = Arc::clone(&sink.sent);

        let (mut queue, rx) = delivery_queue(8);
        let worker = spawn_delivery_worker(rx, Arc::new(targets), sink);

        queue.deliver(notification(&["b", "a", "broken"], "ash")).unwrap();
        queue.deliver(notification(&["missing"], "misty")).unwrap();
        drop(queue);

        let stats = worker.await.unwrap();
        assert_eq!(
            stats,
            DeliveryStats {
                sent: 2,
                failed: 1,
                unknown_targets: 1,
            }
        );
        let sent = sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![("a".to_owned(), "gym_join"), ("b".to_owned(), "gym_join")]
        );
    }
}

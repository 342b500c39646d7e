//! Outbound notification queue.
//!
//! The reconciler pushes logical [`Outbound`] events without waiting; a
//! worker task hands each one to its own delivery task, so notifications are
//! independent and unordered. How hard a delivery tries is decided by the
//! [`DeliveryPolicy`], never by the caller.

use crate::backend::{AttendanceBackend, BackendError};
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A notification the backend should receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    MarkPresent { student_id: String },
    FaceLogin { image: String },
}

impl Outbound {
    fn kind(&self) -> &'static str {
        match self {
            Outbound::MarkPresent { .. } => "mark_present",
            Outbound::FaceLogin { .. } => "face_login",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// One attempt; failures are logged and dropped.
    BestEffort,
    /// Up to `max_attempts` tries with exponential backoff and jitter.
    Retry { max_attempts: u32, base_delay: Duration },
}

impl DeliveryPolicy {
    fn max_attempts(&self) -> u32 {
        match self {
            DeliveryPolicy::BestEffort => 1,
            DeliveryPolicy::Retry { max_attempts, .. } => (*max_attempts).max(1),
        }
    }

    /// Wait before attempt `attempt + 1`, where `attempt` starts at 1.
    fn backoff(&self, attempt: u32) -> Duration {
        match self {
            DeliveryPolicy::BestEffort => Duration::ZERO,
            DeliveryPolicy::Retry { base_delay, .. } => {
                let exp = base_delay.saturating_mul(1u32 << (attempt - 1).min(16));
                let jitter_ms = base_delay.as_millis() as u64 / 2;
                let jitter = if jitter_ms > 0 {
                    Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
                } else {
                    Duration::ZERO
                };
                exp + jitter
            }
        }
    }
}

/// Handle for queueing notifications. Cheap to clone; never blocks.
#[derive(Clone)]
pub struct OutboundQueue {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl OutboundQueue {
    /// A queue and the receiving end a worker drains.
    pub fn unbounded() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn push(&self, event: Outbound) {
        if self.tx.send(event).is_err() {
            tracing::warn!("delivery worker gone; notification dropped");
        }
    }
}

/// Start the delivery worker. It runs until every queue handle is dropped.
pub fn spawn_delivery<B: AttendanceBackend>(backend: Arc<B>, policy: DeliveryPolicy) -> (OutboundQueue, JoinHandle<()>) {
    let (queue, mut rx) = OutboundQueue::unbounded();

    let handle = tokio::spawn(async move {
        tracing::info!(?policy, "delivery worker started");
        while let Some(event) = rx.recv().await {
            let backend = Arc::clone(&backend);
            tokio::spawn(async move {
                deliver(backend.as_ref(), &event, policy).await;
            });
        }
        tracing::info!("delivery worker exiting");
    });

    (queue, handle)
}

/// Deliver one notification under `policy`. Returns the final acknowledgement, if any.
pub async fn deliver<B: AttendanceBackend>(backend: &B, event: &Outbound, policy: DeliveryPolicy) -> Option<Value> {
    let max_attempts = policy.max_attempts();

    for attempt in 1..=max_attempts {
        match send(backend, event).await {
            Ok(ack) => {
                tracing::info!(kind = event.kind(), attempt, response = %ack, "backend acknowledged");
                return Some(ack);
            }
            Err(e) if attempt < max_attempts => {
                let wait = policy.backoff(attempt);
                tracing::debug!(
                    kind = event.kind(),
                    attempt,
                    error = %e,
                    retry_in_ms = wait.as_millis() as u64,
                    "delivery failed, retrying"
                );
                tokio::time::sleep(wait).await;
            }
            Err(e) => {
                tracing::warn!(kind = event.kind(), attempts = attempt, error = %e, "delivery failed, giving up");
            }
        }
    }
    None
}

async fn send<B: AttendanceBackend>(backend: &B, event: &Outbound) -> Result<Value, BackendError> {
    match event {
        Outbound::MarkPresent { student_id } => backend.mark_present(student_id).await,
        Outbound::FaceLogin { image } => backend.face_login(image).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls of each kind, then acknowledges.
    struct FlakyBackend {
        failures: u32,
        mark_calls: AtomicU32,
        login_calls: AtomicU32,
    }

    impl FlakyBackend {
        fn new(failures: u32) -> Self {
            Self { failures, mark_calls: AtomicU32::new(0), login_calls: AtomicU32::new(0) }
        }

        fn outcome(&self, n: u32) -> Result<Value, BackendError> {
            if n <= self.failures {
                Err(BackendError::Rejected { status: 503, body: json!({ "success": false }) })
            } else {
                Ok(json!({ "success": true }))
            }
        }
    }

    impl AttendanceBackend for FlakyBackend {
        async fn mark_present(&self, _student_id: &str) -> Result<Value, BackendError> {
            let n = self.mark_calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.outcome(n)
        }

        async fn face_login(&self, _image: &str) -> Result<Value, BackendError> {
            let n = self.login_calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.outcome(n)
        }
    }

    fn mark(id: &str) -> Outbound {
        Outbound::MarkPresent { student_id: id.into() }
    }

    #[tokio::test]
    async fn test_best_effort_tries_once() {
        let backend = FlakyBackend::new(1);
        let ack = deliver(&backend, &mark("S101"), DeliveryPolicy::BestEffort).await;
        assert!(ack.is_none());
        assert_eq!(backend.mark_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let backend = FlakyBackend::new(2);
        let policy = DeliveryPolicy::Retry { max_attempts: 3, base_delay: Duration::from_millis(1) };
        let ack = deliver(&backend, &mark("S101"), policy).await;
        assert_eq!(ack, Some(json!({ "success": true })));
        assert_eq!(backend.mark_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let backend = FlakyBackend::new(10);
        let policy = DeliveryPolicy::Retry { max_attempts: 2, base_delay: Duration::from_millis(1) };
        assert!(deliver(&backend, &mark("S101"), policy).await.is_none());
        assert_eq!(backend.mark_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_face_login_routes_image() {
        let backend = FlakyBackend::new(0);
        let event = Outbound::FaceLogin { image: "data:image/jpeg;base64,AA==".into() };
        assert!(deliver(&backend, &event, DeliveryPolicy::BestEffort).await.is_some());
        assert_eq!(backend.login_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.mark_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_backoff_grows() {
        let policy = DeliveryPolicy::Retry { max_attempts: 5, base_delay: Duration::from_millis(100) };
        let first = policy.backoff(1);
        let third = policy.backoff(3);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(150));
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(450));
        assert_eq!(DeliveryPolicy::BestEffort.backoff(1), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_queue_dispatches_each_event() {
        let backend = Arc::new(FlakyBackend::new(0));
        let (queue, _worker) = spawn_delivery(Arc::clone(&backend), DeliveryPolicy::BestEffort);
        queue.push(mark("S101"));
        queue.push(Outbound::FaceLogin { image: "x".into() });

        tokio::time::timeout(Duration::from_secs(2), async {
            while backend.mark_calls.load(Ordering::SeqCst) < 1 || backend.login_calls.load(Ordering::SeqCst) < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("both notifications delivered");
    }
}

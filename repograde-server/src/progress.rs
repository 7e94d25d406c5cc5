//! Per-requester progress notifications streamed as server-sent events.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use actix_web::body::{BodySize, MessageBody};
use actix_web::web::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::time::Sleep;
use utoipa::ToSchema;

use crate::lock::duration_from_env;

/// Default lifetime of a progress connection.
pub const DEFAULT_PROGRESS_TIMEOUT: Duration = Duration::from_secs(600);

/// Stage label carried by every progress event.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    /// Sent once when the stream opens.
    Connected,
    /// Intermediate pipeline status.
    Status,
    /// The analysis failed.
    Error,
    /// The analysis finished.
    Complete,
}

impl ProgressStage {
    /// SSE event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::Connected => "connected",
            ProgressStage::Status => "status",
            ProgressStage::Error => "error",
            ProgressStage::Complete => "complete",
        }
    }
}

/// One progress notification.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Pipeline stage.
    pub stage: ProgressStage,
    /// Human-readable message.
    pub message: String,
}

impl ProgressEvent {
    /// Build an event.
    pub fn new(stage: ProgressStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }

    /// Encode as an SSE frame.
    pub fn to_sse(&self) -> String {
        let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("event: {}\ndata: {data}\n\n", self.stage.as_str())
    }
}

struct Registration {
    id: u64,
    sender: UnboundedSender<ProgressEvent>,
    expires_at: Instant,
}

struct HubInner {
    registrations: Mutex<HashMap<String, Registration>>,
    next_id: AtomicU64,
    timeout: Duration,
}

/// Registry of open progress streams, one per requester.
#[derive(Clone)]
pub struct ProgressHub {
    inner: Arc<HubInner>,
}

impl ProgressHub {
    /// Hub whose connections live for `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(HubInner {
                registrations: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                timeout,
            }),
        }
    }

    /// Hub configured from `REPOGRADE_PROGRESS_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::new(duration_from_env(
            "REPOGRADE_PROGRESS_TIMEOUT_SECS",
            DEFAULT_PROGRESS_TIMEOUT,
        ))
    }

    fn registrations(&self) -> MutexGuard<'_, HashMap<String, Registration>> {
        self.inner
            .registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open a stream for `requester_id`, replacing any previous one.
    pub fn connect(&self, requester_id: &str) -> ProgressStream {
        let (sender, receiver) = unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let expires_at = Instant::now() + self.inner.timeout;
        let _ = sender.send(ProgressEvent::new(
            ProgressStage::Connected,
            "progress stream connected",
        ));
        let previous = self.registrations().insert(
            requester_id.to_string(),
            Registration {
                id,
                sender,
                expires_at,
            },
        );
        if previous.is_some() {
            log::debug!("replaced progress stream for {requester_id}");
        }
        ProgressStream {
            hub: self.clone(),
            requester_id: requester_id.to_string(),
            id,
            receiver,
            deadline: tokio::time::Instant::from_std(expires_at),
            sleep: None,
            closed: false,
        }
    }

    /// Deliver an event if the requester is connected. Never fails.
    pub fn publish(&self, requester_id: &str, stage: ProgressStage, message: impl Into<String>) {
        let mut registrations = self.registrations();
        let Some(registration) = registrations.get(requester_id) else {
            return;
        };
        if Instant::now() >= registration.expires_at {
            registrations.remove(requester_id);
            log::warn!("dropping progress event for {requester_id}: stream expired");
            return;
        }
        if registration
            .sender
            .send(ProgressEvent::new(stage, message))
            .is_err()
        {
            registrations.remove(requester_id);
            log::warn!("dropping progress event for {requester_id}: stream closed");
        }
    }

    /// Remove the registration `id` for `requester_id`, if it is still current.
    pub fn disconnect(&self, requester_id: &str, id: u64) -> bool {
        let mut registrations = self.registrations();
        if registrations
            .get(requester_id)
            .is_some_and(|registration| registration.id == id)
        {
            registrations.remove(requester_id);
            return true;
        }
        false
    }

    /// Whether a stream is registered for `requester_id`.
    pub fn is_connected(&self, requester_id: &str) -> bool {
        self.registrations().contains_key(requester_id)
    }
}

/// Receiving half of a progress connection.
///
/// Implements [`MessageBody`] so it can be returned as an SSE response.
pub struct ProgressStream {
    hub: ProgressHub,
    requester_id: String,
    id: u64,
    receiver: UnboundedReceiver<ProgressEvent>,
    deadline: tokio::time::Instant,
    sleep: Option<Pin<Box<Sleep>>>,
    closed: bool,
}

impl ProgressStream {
    #[cfg(test)]
    /// Registration id of this stream.
    pub fn id(&self) -> u64 {
        self.id
    }

    #[cfg(test)]
    /// Next queued event without waiting.
    pub fn try_next(&mut self) -> Option<ProgressEvent> {
        self.receiver.try_recv().ok()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.hub.disconnect(&self.requester_id, self.id);
        }
    }
}

impl Drop for ProgressStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl MessageBody for ProgressStream {
    type Error = std::convert::Infallible;

    fn size(&self) -> BodySize {
        BodySize::Stream
    }

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Bytes, Self::Error>>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(None);
        }
        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(event)) => return Poll::Ready(Some(Ok(Bytes::from(event.to_sse())))),
            Poll::Ready(None) => {
                this.close();
                return Poll::Ready(None);
            }
            Poll::Pending => {}
        }
        let deadline = this.deadline;
        let sleep = this
            .sleep
            .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(deadline)));
        if sleep.as_mut().poll(cx).is_ready() {
            this.close();
            return Poll::Ready(None);
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{env_lock, remove_env, set_env};

    #[test]
    fn connect_queues_connected_event() {
        let hub = ProgressHub::new(DEFAULT_PROGRESS_TIMEOUT);
        let mut stream = hub.connect("u1");
        assert_eq!(
            stream.try_next(),
            Some(ProgressEvent::new(
                ProgressStage::Connected,
                "progress stream connected"
            ))
        );
        assert!(hub.is_connected("u1"));
    }

    #[test]
    fn events_arrive_in_publish_order() {
        let hub = ProgressHub::new(DEFAULT_PROGRESS_TIMEOUT);
        let mut stream = hub.connect("u1");
        stream.try_next();
        hub.publish("u1", ProgressStage::Status, "analysis started");
        hub.publish("u1", ProgressStage::Complete, "final report generated");
        hub.publish("someone-else", ProgressStage::Status, "ignored");

        assert_eq!(stream.try_next().map(|e| e.stage), Some(ProgressStage::Status));
        assert_eq!(
            stream.try_next().map(|e| e.message),
            Some("final report generated".to_string())
        );
        assert_eq!(stream.try_next(), None);
    }

    #[test]
    fn publish_without_connection_is_a_no_op() {
        let hub = ProgressHub::new(DEFAULT_PROGRESS_TIMEOUT);
        hub.publish("nobody", ProgressStage::Error, "lost");
        assert!(!hub.is_connected("nobody"));
    }

    #[test]
    fn last_connect_wins_and_old_drop_keeps_new() {
        let hub = ProgressHub::new(DEFAULT_PROGRESS_TIMEOUT);
        let first = hub.connect("u1");
        let mut second = hub.connect("u1");
        assert_ne!(first.id(), second.id());

        drop(first);
        assert!(hub.is_connected("u1"));

        second.try_next();
        hub.publish("u1", ProgressStage::Status, "still here");
        assert_eq!(
            second.try_next().map(|e| e.message),
            Some("still here".to_string())
        );

        drop(second);
        assert!(!hub.is_connected("u1"));
    }

    #[test]
    fn expired_registration_is_removed_on_publish() {
        let hub = ProgressHub::new(Duration::ZERO);
        let mut stream = hub.connect("u1");
        stream.try_next();
        hub.publish("u1", ProgressStage::Status, "too late");
        assert!(!hub.is_connected("u1"));
        assert_eq!(stream.try_next(), None);
    }

    #[test]
    fn sse_frames_name_the_stage() {
        let frame = ProgressEvent::new(ProgressStage::Error, "boom").to_sse();
        assert_eq!(
            frame,
            "event: error\ndata: {\"stage\":\"error\",\"message\":\"boom\"}\n\n"
        );
    }

    #[actix_web::test]
    async fn stream_body_ends_at_deadline() {
        let hub = ProgressHub::new(Duration::from_millis(50));
        let stream = hub.connect("u1");
        hub.publish("u1", ProgressStage::Status, "working");

        let body = actix_web::body::to_bytes(stream).await.expect("body");
        let text = String::from_utf8(body.to_vec()).expect("utf8");
        assert!(text.starts_with("event: connected\n"));
        assert!(text.contains("event: status\ndata: {\"stage\":\"status\",\"message\":\"working\"}"));
        assert!(!hub.is_connected("u1"));
    }

    #[actix_web::test]
    async fn stream_body_ends_when_replaced() {
        let hub = ProgressHub::new(DEFAULT_PROGRESS_TIMEOUT);
        let stream = hub.connect("u1");
        let _newer = hub.connect("u1");

        let body = actix_web::body::to_bytes(stream).await.expect("body");
        assert!(String::from_utf8_lossy(&body).contains("connected"));
        assert!(hub.is_connected("u1"));
    }

    #[test]
    fn timeout_reads_from_env() {
        let _guard = env_lock();
        set_env("REPOGRADE_PROGRESS_TIMEOUT_SECS", "0");
        let hub = ProgressHub::from_env();
        let _stream = hub.connect("u1");
        hub.publish("u1", ProgressStage::Status, "expired");
        assert!(!hub.is_connected("u1"));
        remove_env("REPOGRADE_PROGRESS_TIMEOUT_SECS");
    }
}

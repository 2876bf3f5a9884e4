//! Tiered stream reassembly.
//!
//! Every inbound event for a session lands here and is handled by its
//! [`DeliveryTier`]:
//!
//! - **Reassemble**: `session:text_part` fragments accumulate per message
//!   id; the fragment flagged `final` flushes them as one `session:text`
//!   finished event.
//! - **Immediate**: everything else passes through unchanged.
//! - **Debounce**: `session:work_log_part` deltas accumulate per step id
//!   and flush as one event after a 3 s silence period. Progress deltas
//!   arrive in rapid bursts; per-delta emission would flood consumers.
//!
//! Fragment-tier events never reach the caller directly; only their
//! reassembled or coalesced outputs do.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use pine_core::payloads::{TextPartData, WorkLogPartData};
use pine_core::{DeliveryTier, Envelope, EnvelopeMetadata, MessageId, ServerEvent, SessionId};

/// Debounce window for work-log deltas.
pub(crate) const WORK_LOG_DEBOUNCE: Duration = Duration::from_secs(3);

/// Buffer key for fragments that carry no message id.
const UNKNOWN_MESSAGE: &str = "unknown";

/// A semantically complete event, ready for the caller.
///
/// Immutable once yielded; ownership transfers to the caller.
#[derive(Clone, Debug)]
pub struct ChatEvent {
    /// The event type.
    pub event_type: ServerEvent,
    /// Session the event belongs to.
    pub session_id: SessionId,
    /// Message the event belongs to, if message-scoped.
    pub message_id: Option<MessageId>,
    /// Event data. Shape varies by type.
    pub data: Option<Value>,
    /// Envelope metadata of the triggering event, when available.
    pub metadata: Option<EnvelopeMetadata>,
}

/// Sink for finished events. Must not block.
pub(crate) type EmitFn = Arc<dyn Fn(ChatEvent) + Send + Sync>;

struct WorkLogAccum {
    text: String,
    status: Option<String>,
}

#[derive(Default)]
struct Inner {
    /// message id → ordered fragments, cleared on flush.
    text: HashMap<String, Vec<String>>,
    /// step id → accumulated delta state.
    work_log: HashMap<String, WorkLogAccum>,
    /// step id → pending flush timer.
    timers: HashMap<String, JoinHandle<()>>,
    closed: bool,
}

/// Per-session, per-turn stream reassembler.
///
/// Private to one turn: no state is shared across sessions, so concurrent
/// turns need no coordination beyond their own instance.
pub struct Reassembler {
    session_id: SessionId,
    emit: EmitFn,
    inner: Mutex<Inner>,
}

impl Reassembler {
    pub(crate) fn new(session_id: SessionId, emit: EmitFn) -> Arc<Self> {
        Arc::new(Self {
            session_id,
            emit,
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Handle one inbound event, already filtered to this session.
    ///
    /// Called from the channel dispatch path: enqueues at most one
    /// finished event and returns without blocking.
    pub(crate) fn ingest(self: &Arc<Self>, event: ServerEvent, envelope: &Envelope) {
        match event.tier() {
            DeliveryTier::Reassemble => self.collect_text_part(envelope),
            DeliveryTier::Debounce => self.collect_work_log_part(envelope),
            DeliveryTier::Immediate => (self.emit)(ChatEvent {
                event_type: event,
                session_id: self.session_id.clone(),
                message_id: envelope.payload.message_id.clone(),
                data: envelope.payload.data.clone(),
                metadata: Some(envelope.metadata.clone()),
            }),
        }
    }

    fn collect_text_part(self: &Arc<Self>, envelope: &Envelope) {
        let Some(part) = envelope
            .payload
            .data
            .as_ref()
            .and_then(|d| serde_json::from_value::<TextPartData>(d.clone()).ok())
        else {
            warn!(session_id = %self.session_id, "dropping text part with unreadable data");
            return;
        };

        let key = envelope
            .payload
            .message_id
            .as_ref()
            .map_or(UNKNOWN_MESSAGE, |id| id.as_str())
            .to_owned();

        let merged = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            let fragments = inner.text.entry(key.clone()).or_default();
            if !part.content.is_empty() {
                fragments.push(part.content);
            }
            if part.is_final {
                inner.text.remove(&key).map(|parts| parts.concat())
            } else {
                None
            }
        };

        if let Some(content) = merged {
            trace!(session_id = %self.session_id, message_id = key, "flushing reassembled text");
            (self.emit)(ChatEvent {
                event_type: ServerEvent::SessionText,
                session_id: self.session_id.clone(),
                message_id: envelope.payload.message_id.clone(),
                data: Some(json!({ "content": content })),
                metadata: Some(envelope.metadata.clone()),
            });
        }
    }

    fn collect_work_log_part(self: &Arc<Self>, envelope: &Envelope) {
        let Some(part) = envelope
            .payload
            .data
            .as_ref()
            .and_then(|d| serde_json::from_value::<WorkLogPartData>(d.clone()).ok())
        else {
            warn!(session_id = %self.session_id, "dropping work-log part with unreadable data");
            return;
        };

        let step_id = if part.step_id.is_empty() {
            UNKNOWN_MESSAGE.to_owned()
        } else {
            part.step_id
        };

        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }

        let accum = inner.work_log.entry(step_id.clone()).or_insert(WorkLogAccum {
            text: String::new(),
            status: None,
        });
        if let Some(delta) = &part.text_delta {
            accum.text.push_str(delta);
        }
        if part.status.is_some() {
            accum.status = part.status;
        }

        // Supersede the pending flush: the silence window restarts on
        // every delta.
        if let Some(old) = inner.timers.remove(&step_id) {
            old.abort();
        }
        let this = Arc::clone(self);
        let key = step_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(WORK_LOG_DEBOUNCE).await;
            this.flush_work_log(&key);
        });
        let _ = inner.timers.insert(step_id, handle);
    }

    fn flush_work_log(&self, step_id: &str) {
        let flushed = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            let _ = inner.timers.remove(step_id);
            inner.work_log.remove(step_id)
        };
        if let Some(accum) = flushed {
            trace!(session_id = %self.session_id, step_id, "flushing debounced work log");
            (self.emit)(ChatEvent {
                event_type: ServerEvent::SessionWorkLogPart,
                session_id: self.session_id.clone(),
                message_id: None,
                data: Some(json!({
                    "step_id": step_id,
                    "text": accum.text,
                    "status": accum.status,
                })),
                metadata: None,
            });
        }
    }

    /// Cancel all pending debounce timers and discard buffered fragments.
    /// Idempotent; buffered data for unfinalized messages is never emitted.
    pub(crate) fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        for (_, handle) in inner.timers.drain() {
            handle.abort();
        }
        inner.text.clear();
        inner.work_log.clear();
    }
}

impl Drop for Reassembler {
    fn drop(&mut self) {
        // Arc'd timer tasks keep the reassembler alive, so this only runs
        // after close() aborted them or no timers were pending; clearing
        // again is harmless.
        let mut inner = self.inner.lock();
        for (_, handle) in inner.timers.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pine_core::{DeviceId, EnvelopeParams, UserId};

    fn envelope(event_type: &str, message_id: Option<&str>, data: Value) -> Envelope {
        Envelope::build(
            event_type,
            &UserId::from("user_1"),
            &DeviceId::from("dev_1"),
            EnvelopeParams {
                session_id: Some(SessionId::from("sess_1")),
                message_id: message_id.map(MessageId::from),
                data: Some(data),
                ..Default::default()
            },
        )
    }

    fn collector() -> (EmitFn, Arc<Mutex<Vec<ChatEvent>>>) {
        let sink: Arc<Mutex<Vec<ChatEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_clone = Arc::clone(&sink);
        let emit: EmitFn = Arc::new(move |event| sink_clone.lock().push(event));
        (emit, sink)
    }

    fn reassembler(emit: EmitFn) -> Arc<Reassembler> {
        Reassembler::new(SessionId::from("sess_1"), emit)
    }

    #[tokio::test]
    async fn text_parts_reassemble_on_final() {
        let (emit, sink) = collector();
        let r = reassembler(emit);

        r.ingest(
            ServerEvent::SessionTextPart,
            &envelope("session:text_part", Some("m1"), json!({"content": "Hel", "final": false})),
        );
        assert!(sink.lock().is_empty(), "no intermediate emission");

        r.ingest(
            ServerEvent::SessionTextPart,
            &envelope("session:text_part", Some("m1"), json!({"content": "lo", "final": true})),
        );

        let events = sink.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, ServerEvent::SessionText);
        assert_eq!(events[0].data.as_ref().unwrap()["content"], "Hello");
        assert_eq!(events[0].message_id, Some(MessageId::from("m1")));
    }

    #[tokio::test]
    async fn final_only_fragment_emits_its_content() {
        let (emit, sink) = collector();
        let r = reassembler(emit);

        r.ingest(
            ServerEvent::SessionTextPart,
            &envelope("session:text_part", Some("m1"), json!({"content": "all at once", "final": true})),
        );

        assert_eq!(sink.lock()[0].data.as_ref().unwrap()["content"], "all at once");
    }

    #[tokio::test]
    async fn fragments_without_message_id_share_one_buffer() {
        let (emit, sink) = collector();
        let r = reassembler(emit);

        r.ingest(
            ServerEvent::SessionTextPart,
            &envelope("session:text_part", None, json!({"content": "a", "final": false})),
        );
        r.ingest(
            ServerEvent::SessionTextPart,
            &envelope("session:text_part", None, json!({"content": "b", "final": true})),
        );

        assert_eq!(sink.lock()[0].data.as_ref().unwrap()["content"], "ab");
    }

    #[tokio::test]
    async fn distinct_message_ids_buffer_independently() {
        let (emit, sink) = collector();
        let r = reassembler(emit);

        r.ingest(
            ServerEvent::SessionTextPart,
            &envelope("session:text_part", Some("m1"), json!({"content": "first", "final": false})),
        );
        r.ingest(
            ServerEvent::SessionTextPart,
            &envelope("session:text_part", Some("m2"), json!({"content": "second", "final": true})),
        );

        let events = sink.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.as_ref().unwrap()["content"], "second");
        assert_eq!(events[0].message_id, Some(MessageId::from("m2")));
    }

    #[tokio::test]
    async fn empty_fragments_do_not_pad_output() {
        let (emit, sink) = collector();
        let r = reassembler(emit);

        r.ingest(
            ServerEvent::SessionTextPart,
            &envelope("session:text_part", Some("m1"), json!({"content": "", "final": false})),
        );
        r.ingest(
            ServerEvent::SessionTextPart,
            &envelope("session:text_part", Some("m1"), json!({"content": "x", "final": true})),
        );

        assert_eq!(sink.lock()[0].data.as_ref().unwrap()["content"], "x");
    }

    #[tokio::test]
    async fn immediate_tier_passes_through_unchanged() {
        let (emit, sink) = collector();
        let r = reassembler(emit);

        let env = envelope(
            "session:form_to_user",
            Some("m3"),
            json!({"message_to_user": "Fill this in"}),
        );
        r.ingest(ServerEvent::SessionFormToUser, &env);

        let events = sink.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, ServerEvent::SessionFormToUser);
        assert_eq!(events[0].session_id, SessionId::from("sess_1"));
        assert_eq!(events[0].message_id, Some(MessageId::from("m3")));
        assert_eq!(
            events[0].data.as_ref().unwrap()["message_to_user"],
            "Fill this in"
        );
        assert!(events[0].metadata.is_some());
    }

    #[tokio::test]
    async fn unknown_event_types_pass_through() {
        let (emit, sink) = collector();
        let r = reassembler(emit);

        let event = ServerEvent::from_wire("session:future_thing");
        r.ingest(event.clone(), &envelope("session:future_thing", None, json!({"n": 1})));

        assert_eq!(sink.lock()[0].event_type, event);
    }

    #[tokio::test(start_paused = true)]
    async fn work_log_deltas_coalesce_over_silence() {
        let (emit, sink) = collector();
        let r = reassembler(emit);

        r.ingest(
            ServerEvent::SessionWorkLogPart,
            &envelope("session:work_log_part", None, json!({"step_id": "s1", "text_delta": "Dialing"})),
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        r.ingest(
            ServerEvent::SessionWorkLogPart,
            &envelope("session:work_log_part", None, json!({"step_id": "s1", "text_delta": "...", "status": "running"})),
        );

        // 2 s after the last delta: still inside the window.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(sink.lock().is_empty());

        // Crossing 3 s of silence flushes once.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let events = sink.lock();
        assert_eq!(events.len(), 1);
        let data = events[0].data.as_ref().unwrap();
        assert_eq!(events[0].event_type, ServerEvent::SessionWorkLogPart);
        assert_eq!(data["step_id"], "s1");
        assert_eq!(data["text"], "Dialing...");
        assert_eq!(data["status"], "running");
    }

    #[tokio::test(start_paused = true)]
    async fn delta_after_flush_starts_fresh_accumulation() {
        let (emit, sink) = collector();
        let r = reassembler(emit);

        r.ingest(
            ServerEvent::SessionWorkLogPart,
            &envelope("session:work_log_part", None, json!({"step_id": "s1", "text_delta": "first"})),
        );
        tokio::time::sleep(Duration::from_millis(3100)).await;
        r.ingest(
            ServerEvent::SessionWorkLogPart,
            &envelope("session:work_log_part", None, json!({"step_id": "s1", "text_delta": "second"})),
        );
        tokio::time::sleep(Duration::from_millis(3100)).await;

        let events = sink.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data.as_ref().unwrap()["text"], "first");
        assert_eq!(events[1].data.as_ref().unwrap()["text"], "second");
    }

    #[tokio::test(start_paused = true)]
    async fn burst_keeps_extending_the_window() {
        let (emit, sink) = collector();
        let r = reassembler(emit);

        for i in 0..3 {
            r.ingest(
                ServerEvent::SessionWorkLogPart,
                &envelope("session:work_log_part", None, json!({"step_id": "s1", "text_delta": format!("{i}")})),
            );
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
        // Deltas at t=0,2,4; last window ends at t=7.
        assert!(sink.lock().is_empty());
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let events = sink.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.as_ref().unwrap()["text"], "012");
    }

    #[tokio::test(start_paused = true)]
    async fn steps_debounce_independently() {
        let (emit, sink) = collector();
        let r = reassembler(emit);

        r.ingest(
            ServerEvent::SessionWorkLogPart,
            &envelope("session:work_log_part", None, json!({"step_id": "a", "text_delta": "A"})),
        );
        tokio::time::sleep(Duration::from_secs(2)).await;
        r.ingest(
            ServerEvent::SessionWorkLogPart,
            &envelope("session:work_log_part", None, json!({"step_id": "b", "text_delta": "B"})),
        );

        // Step a flushes at t=3 while step b is still accumulating.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        {
            let events = sink.lock();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].data.as_ref().unwrap()["step_id"], "a");
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
        let events = sink.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].data.as_ref().unwrap()["step_id"], "b");
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_pending_flushes() {
        let (emit, sink) = collector();
        let r = reassembler(emit);

        r.ingest(
            ServerEvent::SessionWorkLogPart,
            &envelope("session:work_log_part", None, json!({"step_id": "s1", "text_delta": "never"})),
        );
        r.close();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(sink.lock().is_empty());
    }

    #[tokio::test]
    async fn close_discards_unfinalized_fragments() {
        let (emit, sink) = collector();
        let r = reassembler(emit);

        r.ingest(
            ServerEvent::SessionTextPart,
            &envelope("session:text_part", Some("m1"), json!({"content": "partial", "final": false})),
        );
        r.close();
        r.ingest(
            ServerEvent::SessionTextPart,
            &envelope("session:text_part", Some("m1"), json!({"content": "!", "final": true})),
        );
        assert!(sink.lock().is_empty());
    }

    #[tokio::test]
    async fn close_twice_is_safe() {
        let (emit, _sink) = collector();
        let r = reassembler(emit);
        r.close();
        r.close();
    }

    #[tokio::test]
    async fn unreadable_fragment_data_is_dropped() {
        let (emit, sink) = collector();
        let r = reassembler(emit);

        // data is a bare string, not the expected object
        let env = envelope("session:text_part", Some("m1"), json!("not an object"));
        r.ingest(ServerEvent::SessionTextPart, &env);
        assert!(sink.lock().is_empty());
    }
}

//! Request/response emulation over the fire-and-forget channel.
//!
//! The channel has no call semantics: the backend replies with another
//! event. [`Correlator::request`] threads a fresh request id through an
//! outbound envelope, registers a pending wait, and resolves it from the
//! inbound stream.
//!
//! Match rule: a reply of the same event type matches iff its request id
//! equals the pending one, or it carries no request id at all and its
//! payload session id equals the request's with a non-user source. The
//! request-id rule is authoritative: a reply carrying a *different*
//! request id never matches, so a pending wait resolves by exactly one
//! rule.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use pine_core::{ClientEvent, DeviceId, Envelope, EnvelopeParams, PineError, RequestId, Result, SessionId, UserId};

use crate::channel::EventChannel;

/// Emulates call/response over an [`EventChannel`].
///
/// Multiple concurrent requests may be outstanding; each holds its own
/// pending wait keyed by request id, registered as an independent channel
/// subscriber.
pub struct Correlator {
    channel: Arc<dyn EventChannel>,
    user_id: UserId,
    device_id: DeviceId,
}

struct PendingWait {
    merged: Mutex<Map<String, Value>>,
    wake: Mutex<Option<oneshot::Sender<()>>>,
}

impl PendingWait {
    /// Merge a matched payload. Last writer wins per key. The first match
    /// wakes the waiter.
    fn resolve(&self, data: Option<&Value>) {
        if let Some(Value::Object(map)) = data {
            let mut merged = self.merged.lock();
            for (k, v) in map {
                let _ = merged.insert(k.clone(), v.clone());
            }
        }
        if let Some(tx) = self.wake.lock().take() {
            let _ = tx.send(());
        }
    }
}

impl Correlator {
    /// Create a correlator emitting envelopes under the given identity.
    #[must_use]
    pub fn new(channel: Arc<dyn EventChannel>, user_id: UserId, device_id: DeviceId) -> Self {
        Self {
            channel,
            user_id,
            device_id,
        }
    }

    /// Send `event_type` and await the matching reply.
    ///
    /// Resolves with the reply payload's data, merged across partial
    /// matches. Fails with [`PineError::Timeout`] naming the event type
    /// when no match arrives in time. The pending wait and its handler
    /// registration are removed on both paths.
    pub async fn request(
        &self,
        event_type: ClientEvent,
        data: Option<Value>,
        session_id: Option<&SessionId>,
        timeout: Duration,
    ) -> Result<Value> {
        let request_id = RequestId::new();
        let wire_type = event_type.as_wire();
        let envelope = Envelope::build(
            wire_type,
            &self.user_id,
            &self.device_id,
            EnvelopeParams {
                session_id: session_id.cloned(),
                request_id: Some(request_id.clone()),
                data,
                ..Default::default()
            },
        );

        let (tx, rx) = oneshot::channel();
        let pending = Arc::new(PendingWait {
            merged: Mutex::new(Map::new()),
            wake: Mutex::new(Some(tx)),
        });

        let handler_pending = Arc::clone(&pending);
        let expected_type = wire_type.to_owned();
        let expected_request = request_id.clone();
        let expected_session = session_id.cloned();
        // Guard dropped on return, removing the handler on every path.
        let _guard = self.channel.subscribe(Arc::new(move |inbound_type, raw| {
            if inbound_type != expected_type {
                return;
            }
            let Some(reply) = Envelope::parse(raw) else {
                trace!(event_type = inbound_type, "dropping malformed reply");
                return;
            };
            let matched = match &reply.metadata.request_id {
                Some(rid) => *rid == expected_request,
                None => {
                    expected_session.is_some()
                        && reply.payload.session_id == expected_session
                        && !reply.metadata.source.is_user()
                }
            };
            if matched {
                handler_pending.resolve(reply.payload.data.as_ref());
            }
        }));

        debug!(event_type = wire_type, request_id = %request_id, "sending correlated request");
        self.channel.send(wire_type, envelope.to_value()).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(_) => {
                let merged = std::mem::take(&mut *pending.merged.lock());
                Ok(Value::Object(merged))
            }
            Err(_) => {
                debug!(event_type = wire_type, ?timeout, "correlated request timed out");
                Err(PineError::timeout(wire_type, timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{EventHandler, HandlerRegistry, SubscriptionGuard};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde_json::json;

    /// In-memory channel: records sends, fans inbound events out through
    /// a [`HandlerRegistry`].
    struct LoopChannel {
        registry: HandlerRegistry,
        sent: Mutex<Vec<(String, Value)>>,
    }

    impl LoopChannel {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                registry: HandlerRegistry::new(),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn deliver(&self, event_type: &str, raw: &Value) {
            self.registry.dispatch(event_type, raw);
        }

        fn last_sent(&self) -> (String, Value) {
            self.sent.lock().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl EventChannel for LoopChannel {
        async fn send(&self, event_type: &str, envelope: Value) -> Result<()> {
            self.sent.lock().push((event_type.to_owned(), envelope));
            Ok(())
        }

        fn subscribe(&self, handler: EventHandler) -> SubscriptionGuard {
            self.registry.subscribe(handler)
        }
    }

    fn correlator(channel: &Arc<LoopChannel>) -> Correlator {
        Correlator::new(
            Arc::clone(channel) as Arc<dyn EventChannel>,
            UserId::from("user_1"),
            DeviceId::from("dev_1"),
        )
    }

    fn reply(event_type: &str, request_id: Option<&str>, session_id: &str, role: &str, data: Value) -> Value {
        let mut metadata = json!({
            "event_id": "evt_reply",
            "timestamp": "2026-01-01T00:00:00Z",
            "source": {"role": role}
        });
        if let Some(rid) = request_id {
            metadata["request_id"] = json!(rid);
        }
        json!({
            "metadata": metadata,
            "type": event_type,
            "payload": {"session_id": session_id, "data": data}
        })
    }

    #[tokio::test]
    async fn resolves_on_request_id_match() {
        let channel = LoopChannel::new();
        let correlator = correlator(&channel);
        let session = SessionId::from("sess_1");

        let channel_clone = Arc::clone(&channel);
        let request = tokio::spawn(async move {
            correlator
                .request(
                    ClientEvent::SessionJoin,
                    None,
                    Some(&SessionId::from("sess_1")),
                    Duration::from_secs(5),
                )
                .await
        });

        // Wait for the outbound send, then echo its request id back.
        tokio::task::yield_now().await;
        let (sent_type, sent_envelope) = channel_clone.last_sent();
        assert_eq!(sent_type, "session:join");
        let rid = sent_envelope["metadata"]["request_id"].as_str().unwrap();
        channel_clone.deliver(
            "session:join",
            &reply("session:join", Some(rid), session.as_str(), "agent", json!({"joined": true})),
        );

        let result = request.await.unwrap().unwrap();
        assert_eq!(result["joined"], true);
    }

    #[tokio::test]
    async fn ignores_reply_with_different_request_id() {
        let channel = LoopChannel::new();
        let correlator = correlator(&channel);

        let channel_clone = Arc::clone(&channel);
        let request = tokio::spawn(async move {
            correlator
                .request(
                    ClientEvent::SessionJoin,
                    None,
                    Some(&SessionId::from("sess_1")),
                    Duration::from_millis(100),
                )
                .await
        });

        tokio::task::yield_now().await;
        // Same type, same session, non-user source, but a foreign
        // request id. Must not match.
        channel_clone.deliver(
            "session:join",
            &reply("session:join", Some("someone_elses"), "sess_1", "agent", json!({"joined": true})),
        );

        let result = request.await.unwrap();
        assert_matches!(result, Err(PineError::Timeout { .. }));
    }

    #[tokio::test]
    async fn falls_back_to_session_match_without_request_id() {
        let channel = LoopChannel::new();
        let correlator = correlator(&channel);

        let channel_clone = Arc::clone(&channel);
        let request = tokio::spawn(async move {
            correlator
                .request(
                    ClientEvent::SessionHistory,
                    Some(json!({"max_messages": 30})),
                    Some(&SessionId::from("sess_1")),
                    Duration::from_secs(5),
                )
                .await
        });

        tokio::task::yield_now().await;
        channel_clone.deliver(
            "session:history",
            &reply("session:history", None, "sess_1", "agent", json!({"messages": []})),
        );

        let result = request.await.unwrap().unwrap();
        assert!(result["messages"].is_array());
    }

    #[tokio::test]
    async fn session_fallback_rejects_user_echo() {
        let channel = LoopChannel::new();
        let correlator = correlator(&channel);

        let channel_clone = Arc::clone(&channel);
        let request = tokio::spawn(async move {
            correlator
                .request(
                    ClientEvent::SessionJoin,
                    None,
                    Some(&SessionId::from("sess_1")),
                    Duration::from_millis(100),
                )
                .await
        });

        tokio::task::yield_now().await;
        // The backend echoing our own send: same session, user source.
        channel_clone.deliver(
            "session:join",
            &reply("session:join", None, "sess_1", "user", json!({"echo": true})),
        );

        assert_matches!(request.await.unwrap(), Err(PineError::Timeout { .. }));
    }

    #[tokio::test]
    async fn merges_partial_matches_last_writer_wins() {
        let channel = LoopChannel::new();
        let correlator = correlator(&channel);

        let channel_clone = Arc::clone(&channel);
        let request = tokio::spawn(async move {
            correlator
                .request(
                    ClientEvent::SessionHistory,
                    None,
                    Some(&SessionId::from("sess_1")),
                    Duration::from_secs(5),
                )
                .await
        });

        tokio::task::yield_now().await;
        // Two fallback matches back-to-back before the waiter wakes.
        channel_clone.deliver(
            "session:history",
            &reply("session:history", None, "sess_1", "agent", json!({"page": 1, "total": 2})),
        );
        channel_clone.deliver(
            "session:history",
            &reply("session:history", None, "sess_1", "agent", json!({"page": 2})),
        );

        let result = request.await.unwrap().unwrap();
        assert_eq!(result["page"], 2);
        assert_eq!(result["total"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_deadline_not_before() {
        let channel = LoopChannel::new();
        let correlator = correlator(&channel);

        let started = tokio::time::Instant::now();
        let result = correlator
            .request(
                ClientEvent::SessionJoin,
                None,
                Some(&SessionId::from("sess_1")),
                Duration::from_secs(1),
            )
            .await;

        assert_matches!(&result, Err(PineError::Timeout { event_type, .. }) if event_type == "session:join");
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn removes_handler_after_resolution() {
        let channel = LoopChannel::new();
        let correlator = correlator(&channel);

        let channel_clone = Arc::clone(&channel);
        let request = tokio::spawn(async move {
            correlator
                .request(
                    ClientEvent::SessionJoin,
                    None,
                    Some(&SessionId::from("sess_1")),
                    Duration::from_millis(100),
                )
                .await
        });
        tokio::task::yield_now().await;
        assert_eq!(channel_clone.registry.len(), 1);
        let _ = request.await.unwrap();
        assert!(channel_clone.registry.is_empty());
    }

    #[tokio::test]
    async fn concurrent_requests_resolve_independently() {
        let channel = LoopChannel::new();
        let correlator = Arc::new(correlator(&channel));

        let c1 = Arc::clone(&correlator);
        let first = tokio::spawn(async move {
            c1.request(
                ClientEvent::SessionJoin,
                None,
                Some(&SessionId::from("sess_a")),
                Duration::from_secs(5),
            )
            .await
        });
        let c2 = Arc::clone(&correlator);
        let second = tokio::spawn(async move {
            c2.request(
                ClientEvent::SessionJoin,
                None,
                Some(&SessionId::from("sess_b")),
                Duration::from_secs(5),
            )
            .await
        });

        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        channel.deliver(
            "session:join",
            &reply("session:join", None, "sess_b", "agent", json!({"which": "b"})),
        );
        channel.deliver(
            "session:join",
            &reply("session:join", None, "sess_a", "agent", json!({"which": "a"})),
        );

        assert_eq!(first.await.unwrap().unwrap()["which"], "a");
        assert_eq!(second.await.unwrap().unwrap()["which"], "b");
    }
}

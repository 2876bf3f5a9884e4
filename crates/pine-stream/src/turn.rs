//! Turn control: termination detection around the per-turn event queue.
//!
//! A [`Turn`] owns one subscription on the channel, routes every matching
//! inbound event through a private [`Reassembler`], and yields finished
//! events until the turn ends. A turn ends on:
//!
//! - a `session:state` event carrying a terminal state, always;
//! - a `session:input_state` of `waiting_input`, but only after at least
//!   one substantive event has been yielded. The session idles in
//!   `waiting_input` between turns, so the signal is meaningless until
//!   the agent has produced output. The event itself is yielded either
//!   way, like any other immediate-tier event;
//! - silence past the idle timeout, when the authoritative state lookup
//!   reports the session terminal.
//!
//! All finished events, including reassembled and debounced outputs, pass
//! through one choke point so the substantive gate sees them in order.

use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use pine_core::payloads::StateData;
use pine_core::{
    Envelope, PineError, Result, ServerEvent, SessionId, TerminalState, WAITING_INPUT,
};

use crate::channel::{EventChannel, SubscriptionGuard};
use crate::reassembler::{ChatEvent, EmitFn, Reassembler};

/// Default silence window before the authoritative state is consulted.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Authoritative session-state lookup.
///
/// Consulted once before streaming starts and again whenever the idle
/// timeout elapses, so a turn on a session that died without a terminal
/// event still ends.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStateApi: Send + Sync {
    /// The session's current lifecycle state, when the backend knows it.
    async fn session_state(&self, session_id: &SessionId) -> Result<Option<String>>;
}

/// Tunables for a turn.
#[derive(Clone, Copy, Debug)]
pub struct TurnOptions {
    /// Silence window before the authoritative state is consulted.
    pub idle_timeout: Duration,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

struct TurnState {
    substantive_seen: bool,
    finished: bool,
    terminal: Option<TerminalState>,
}

/// Shared between the dispatch path (emit) and the consumer (next_event).
struct TurnShared {
    session_id: SessionId,
    queue: mpsc::UnboundedSender<Option<ChatEvent>>,
    state: Mutex<TurnState>,
}

impl TurnShared {
    /// The single choke point every finished event passes through.
    ///
    /// Applies the termination rules, updates the substantive gate, and
    /// enqueues. A `None` on the queue is the end-of-turn sentinel; it is
    /// enqueued after the triggering event so the consumer drains in
    /// order.
    fn emit(&self, event: ChatEvent) {
        let mut state = self.state.lock();
        if state.finished {
            return;
        }
        match &event.event_type {
            ServerEvent::SessionState => {
                if let Some(terminal) = content_of(&event).and_then(|c| {
                    TerminalState::from_content(&c)
                }) {
                    debug!(
                        session_id = %self.session_id,
                        state = terminal.as_content(),
                        "terminal state ends turn"
                    );
                    state.finished = true;
                    state.terminal = Some(terminal);
                    let _ = self.queue.send(Some(event));
                    let _ = self.queue.send(None);
                    return;
                }
            }
            ServerEvent::SessionInputState => {
                if content_of(&event).as_deref() == Some(WAITING_INPUT) {
                    // Before any substantive output this only reflects
                    // the session's default state: yield it but keep the
                    // turn open. Afterwards it ends the turn, with the
                    // event yielded ahead of the sentinel.
                    let ends_turn = state.substantive_seen;
                    if ends_turn {
                        trace!(session_id = %self.session_id, "waiting_input ends turn");
                        state.finished = true;
                    }
                    let _ = self.queue.send(Some(event));
                    if ends_turn {
                        let _ = self.queue.send(None);
                    }
                    return;
                }
            }
            _ => {}
        }
        if event.event_type.is_substantive() {
            state.substantive_seen = true;
        }
        let _ = self.queue.send(Some(event));
    }

    /// End the turn from an authoritative state check rather than a wire
    /// event. Synthesizes one `session:state` finished event carrying the
    /// terminal state, so callers see the same shape either way.
    /// Idempotent.
    fn finish(&self, terminal: TerminalState) {
        let mut state = self.state.lock();
        if state.finished {
            return;
        }
        state.finished = true;
        state.terminal = Some(terminal);
        let _ = self.queue.send(Some(ChatEvent {
            event_type: ServerEvent::SessionState,
            session_id: self.session_id.clone(),
            message_id: None,
            data: Some(serde_json::json!({ "content": terminal.as_content() })),
            metadata: None,
        }));
        let _ = self.queue.send(None);
    }
}

fn content_of(event: &ChatEvent) -> Option<String> {
    event
        .data
        .as_ref()
        .and_then(|d| serde_json::from_value::<StateData>(d.clone()).ok())
        .map(|s| s.content)
}

/// One conversational turn: an ordered sequence of finished events ending
/// in termination.
pub struct Turn {
    shared: Arc<TurnShared>,
    reassembler: Arc<Reassembler>,
    rx: mpsc::UnboundedReceiver<Option<ChatEvent>>,
    subscription: Option<SubscriptionGuard>,
    state_api: Option<Arc<dyn SessionStateApi>>,
    idle_timeout: Duration,
    closed: bool,
}

impl Turn {
    /// Subscribe to the channel and start collecting events for
    /// `session_id`.
    ///
    /// When a state api is supplied, the session state is checked up
    /// front: a session already in a terminal state produces no further
    /// events, so the turn ends immediately instead of idling on it.
    pub async fn begin(
        channel: &dyn EventChannel,
        session_id: SessionId,
        state_api: Option<Arc<dyn SessionStateApi>>,
        options: TurnOptions,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(TurnShared {
            session_id: session_id.clone(),
            queue: tx,
            state: Mutex::new(TurnState {
                substantive_seen: false,
                finished: false,
                terminal: None,
            }),
        });

        let emit: EmitFn = {
            let shared = Arc::clone(&shared);
            Arc::new(move |event| shared.emit(event))
        };
        let reassembler = Reassembler::new(session_id.clone(), emit);

        let handler_reassembler = Arc::clone(&reassembler);
        let handler_session = session_id;
        let subscription = channel.subscribe(Arc::new(move |event_type, raw| {
            // Malformed envelopes and other sessions' traffic are dropped
            // here, before any buffering state exists for them.
            let Some(envelope) = Envelope::parse(raw) else {
                return;
            };
            if envelope.payload.session_id.as_ref() != Some(&handler_session) {
                return;
            }
            handler_reassembler.ingest(ServerEvent::from_wire(event_type), &envelope);
        }));

        let turn = Self {
            shared,
            reassembler,
            rx,
            subscription: Some(subscription),
            state_api,
            idle_timeout: options.idle_timeout,
            closed: false,
        };

        if let Some(api) = turn.state_api.clone() {
            match api.session_state(&turn.shared.session_id).await {
                Ok(Some(state)) => {
                    if let Some(terminal) = TerminalState::from_content(&state) {
                        debug!(
                            session_id = %turn.shared.session_id,
                            state = terminal.as_content(),
                            "session already terminal before streaming"
                        );
                        turn.shared.finish(terminal);
                    }
                }
                Ok(None) => {}
                Err(err) => warn!(
                    session_id = %turn.shared.session_id,
                    error = %err,
                    "pre-stream state check failed"
                ),
            }
        }

        turn
    }

    /// The next finished event, or `None` once the turn has ended.
    ///
    /// After the idle timeout elapses with no event, the authoritative
    /// state is consulted: terminal yields one synthesized
    /// `session:state` event and ends the turn; anything else (a failed
    /// lookup included) resumes the wait with all buffered state intact.
    /// Without a state api an idle timeout is an error, since there is
    /// nothing to reconcile against.
    pub async fn next_event(&mut self) -> Result<Option<ChatEvent>> {
        if self.closed {
            return Ok(None);
        }
        loop {
            match tokio::time::timeout(self.idle_timeout, self.rx.recv()).await {
                Ok(Some(Some(event))) => return Ok(Some(event)),
                Ok(Some(None)) | Ok(None) => {
                    self.close();
                    return Ok(None);
                }
                Err(_) => {
                    let Some(api) = self.state_api.clone() else {
                        self.close();
                        return Err(PineError::timeout("turn idle", self.idle_timeout));
                    };
                    debug!(
                        session_id = %self.shared.session_id,
                        idle = ?self.idle_timeout,
                        "idle timeout, reconciling against authoritative state"
                    );
                    match api.session_state(&self.shared.session_id).await {
                        Ok(Some(state)) => {
                            // Terminal: finish() enqueued a synthesized
                            // state event plus the sentinel; loop back and
                            // drain them in order.
                            if let Some(terminal) = TerminalState::from_content(&state) {
                                self.shared.finish(terminal);
                            }
                        }
                        Ok(None) => {}
                        Err(err) => warn!(
                            session_id = %self.shared.session_id,
                            error = %err,
                            "state reconciliation failed, resuming wait"
                        ),
                    }
                }
            }
        }
    }

    /// Consume the turn as a stream of finished events.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<ChatEvent>> {
        try_stream! {
            while let Some(event) = self.next_event().await? {
                yield event;
            }
        }
    }

    /// The terminal state that ended the turn, when one was observed.
    #[must_use]
    pub fn terminal_state(&self) -> Option<TerminalState> {
        self.shared.state.lock().terminal
    }

    /// The session this turn belongs to.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.shared.session_id
    }

    /// Stop delivery: unsubscribe from the channel, cancel pending
    /// debounce timers, and discard buffered fragments. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(mut guard) = self.subscription.take() {
            guard.unsubscribe();
        }
        self.reassembler.close();
        self.rx.close();
    }
}

impl Drop for Turn {
    fn drop(&mut self) {
        self.close();
    }
}

//! Realtime session management
//!
//! Owns the WebSocket session: ticket handshake, envelope codec, dispatch
//! by operation kind, and reconnection with exponential backoff. All world
//! and ledger mutation happens on the inbound dispatch path; presentation
//! only ever sees the event bridge.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::auth::{AuthClient, AuthError};
use crate::config::Config;
use crate::events::{ChatLine, EventBridge, HelloInfo, StateUpdate};
use crate::net::backoff::Backoff;
use crate::predict::{PendingInput, PredictionLedger};
use crate::proto::{
    self, ChatPayload, Envelope, EventPayload, HelloPayload, MovePayload, Op, PlayerState,
    StatePayload, WS_PROTOCOL,
};
use crate::util::time::unix_millis;
use crate::world::WorldState;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session and none wanted
    Idle,
    /// Handshake in progress
    Connecting,
    /// Transport open, session live
    Open,
    /// Close requested, transport winding down
    Closing,
    /// Transport lost, retry scheduled
    Reconnecting,
}

/// Errors fatal to a single connect call
///
/// Inside the automatic reconnect loop these are caught and logged; they
/// only surface to callers of `connect`.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("ticket exchange failed: {0}")]
    Ticket(#[from] AuthError),

    #[error("transport failed to open: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("ticket is not a valid sub-protocol token")]
    BadTicket,

    #[error("connection closed before the handshake completed")]
    Cancelled,
}

/// Client half of the realtime session protocol
///
/// Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    auth: AuthClient,
    ws_url: String,
    bridge: Arc<EventBridge>,
    world: Mutex<WorldState>,
    ledger: Mutex<PredictionLedger>,
    /// Write half of the live session; `None` while disconnected
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    state: Mutex<ConnectionState>,
    /// Cancellation token for automatic reconnection; re-checked before
    /// every reconnect step
    reconnect_intent: AtomicBool,
    backoff: Mutex<Backoff>,
    token: Mutex<Option<String>>,
    /// Increments per established session so a stale reader cannot tear
    /// down its replacement
    generation: AtomicU64,
}

impl Connection {
    /// Build a connection bound to an event bridge
    ///
    /// Move and chat intents published on the bridge are forwarded onto
    /// the wire for as long as the connection lives.
    pub fn new(config: &Config, bridge: Arc<EventBridge>) -> Self {
        let inner = Arc::new(Inner {
            auth: AuthClient::new(&config.api_base),
            ws_url: config.ws_url.clone(),
            bridge: bridge.clone(),
            world: Mutex::new(WorldState::new()),
            ledger: Mutex::new(PredictionLedger::new()),
            outbound: Mutex::new(None),
            state: Mutex::new(ConnectionState::Idle),
            reconnect_intent: AtomicBool::new(false),
            backoff: Mutex::new(Backoff::new()),
            token: Mutex::new(None),
            generation: AtomicU64::new(0),
        });

        let weak = Arc::downgrade(&inner);
        bridge.client_move.subscribe(move |intent| {
            if let Some(inner) = weak.upgrade() {
                Inner::send_move(&inner, intent.dx, intent.dy);
            }
        });
        let weak = Arc::downgrade(&inner);
        bridge.client_chat.subscribe(move |intent| {
            if let Some(inner) = weak.upgrade() {
                Inner::send_chat(&inner, "global", &intent.text);
            }
        });

        Self { inner }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// True while the transport is open
    pub fn is_open(&self) -> bool {
        self.inner.outbound.lock().is_some()
    }

    /// Number of inputs the server has not yet acknowledged
    pub fn pending_inputs(&self) -> usize {
        self.inner.ledger.lock().pending_len()
    }

    /// Open a session with the given access token
    ///
    /// Resolves once the transport reports open. After success the session
    /// is kept alive across transport loss until `close` is called.
    pub async fn connect(&self, token: &str) -> Result<(), HandshakeError> {
        *self.inner.token.lock() = Some(token.to_string());
        self.inner.reconnect_intent.store(true, Ordering::SeqCst);
        *self.inner.state.lock() = ConnectionState::Connecting;

        match Inner::handshake(&self.inner, token).await {
            Ok(()) => Ok(()),
            Err(e) => {
                *self.inner.state.lock() = ConnectionState::Idle;
                Err(e)
            }
        }
    }

    /// Suppress reconnection and drop the transport; safe to call
    /// repeatedly
    pub fn close(&self) {
        self.inner.reconnect_intent.store(false, Ordering::SeqCst);
        *self.inner.state.lock() = ConnectionState::Closing;
        // Dropping the sender ends the writer task, which closes the sink.
        self.inner.outbound.lock().take();
        *self.inner.state.lock() = ConnectionState::Idle;
        info!("session closed");
    }

    /// Send a movement step; silently dropped while disconnected
    pub fn send_move(&self, dx: f64, dy: f64) {
        Inner::send_move(&self.inner, dx, dy);
    }

    /// Send a keepalive ping; silently dropped while disconnected
    pub fn send_ping(&self) {
        Inner::send_ping(&self.inner);
    }

    /// Send a chat line; silently dropped while disconnected
    pub fn send_chat(&self, channel: &str, text: &str) {
        Inner::send_chat(&self.inner, channel, text);
    }
}

impl Inner {
    /// Run one full handshake: fresh ticket, transport open, task spawn
    async fn handshake(inner: &Arc<Inner>, token: &str) -> Result<(), HandshakeError> {
        let ticket = inner.auth.ticket(token).await?;

        let mut request = inner.ws_url.as_str().into_client_request()?;
        let protocols = format!("{}, auth.{}", WS_PROTOCOL, ticket);
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_str(&protocols).map_err(|_| HandshakeError::BadTicket)?,
        );

        let (socket, _response) = connect_async(request).await?;

        // close() may have raced the handshake; never resurrect a session
        // after it.
        if !inner.reconnect_intent.load(Ordering::SeqCst) {
            return Err(HandshakeError::Cancelled);
        }

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (mut sink, mut stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        *inner.outbound.lock() = Some(outbound_tx);
        *inner.state.lock() = ConnectionState::Open;
        inner.backoff.lock().reset();

        info!(url = %inner.ws_url, "session open");

        // Writer: drain the outbound queue into the sink. Ends when the
        // sender is dropped by close() or replaced by a reconnect.
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader: decode and dispatch every inbound frame until the
        // transport closes, then hand over to the reconnect loop.
        let inner = inner.clone();
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(message) => Inner::handle_frame(&inner, message),
                    Err(e) => {
                        // Mid-session transport errors are handled exactly
                        // like a close.
                        debug!(error = %e, "transport error");
                        break;
                    }
                }
            }
            Inner::on_transport_closed(&inner, generation);
        });

        Ok(())
    }

    /// Reader task exit point: clean close and error look the same here
    fn on_transport_closed(inner: &Arc<Inner>, generation: u64) {
        if inner.generation.load(Ordering::SeqCst) != generation {
            // A newer session already owns the connection state.
            return;
        }
        inner.outbound.lock().take();

        if !inner.reconnect_intent.load(Ordering::SeqCst) {
            *inner.state.lock() = ConnectionState::Idle;
            return;
        }

        *inner.state.lock() = ConnectionState::Reconnecting;
        info!("transport closed, scheduling reconnect");
        let inner = inner.clone();
        tokio::spawn(async move {
            Inner::reconnect_loop(&inner).await;
        });
    }

    /// Flag-bounded retry loop
    ///
    /// The intent flag is re-checked after every wait so close() cancels
    /// an in-flight reconnect. Attempts continue indefinitely; only the
    /// spacing is bounded.
    async fn reconnect_loop(inner: &Arc<Inner>) {
        loop {
            let delay = inner.backoff.lock().next_delay();
            debug!(delay_ms = delay.as_millis() as u64, "waiting before reconnect");
            tokio::time::sleep(delay).await;

            if !inner.reconnect_intent.load(Ordering::SeqCst) {
                *inner.state.lock() = ConnectionState::Idle;
                return;
            }
            let Some(token) = inner.token.lock().clone() else {
                *inner.state.lock() = ConnectionState::Idle;
                return;
            };

            *inner.state.lock() = ConnectionState::Connecting;
            match Inner::handshake(inner, &token).await {
                Ok(()) => return,
                Err(HandshakeError::Cancelled) => {
                    *inner.state.lock() = ConnectionState::Idle;
                    return;
                }
                Err(e) => {
                    // Never surfaced to presentation; the next attempt is
                    // simply scheduled.
                    warn!(error = %e, "reconnect attempt failed");
                    *inner.state.lock() = ConnectionState::Reconnecting;
                }
            }
        }
    }

    /// Decode one inbound frame and dispatch it; malformed frames are
    /// dropped and the session stays alive
    fn handle_frame(inner: &Arc<Inner>, message: Message) {
        let bytes = match message {
            Message::Binary(bytes) => bytes,
            Message::Text(text) => text.into_bytes(),
            // Control frames carry no envelope.
            _ => return,
        };

        let envelope = match proto::decode(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(error = %e, "discarding undecodable frame");
                return;
            }
        };

        Inner::dispatch(inner, envelope);
    }

    fn dispatch(inner: &Inner, envelope: Envelope) {
        match envelope.op {
            Op::Hello => match envelope.payload_as::<HelloPayload>() {
                Ok(hello) => {
                    info!(tick_hz = hello.tick_hz, "handshake info received");
                    inner.bridge.server_hello.publish(&HelloInfo {
                        tick_hz: hello.tick_hz,
                        server_time_ms: hello.server_time_ms,
                    });
                }
                Err(e) => debug!(error = %e, "discarding hello with bad payload"),
            },
            Op::State => Inner::handle_state(inner, &envelope),
            Op::Event => match envelope.payload_as::<EventPayload>() {
                Ok(event) => Inner::handle_event(inner, event),
                Err(e) => debug!(error = %e, "discarding event with bad payload"),
            },
            // ping and the reserved warn/resync kinds need no action here.
            Op::Ping | Op::Move | Op::Chat | Op::Warn | Op::Resync => {
                debug!(op = ?envelope.op, "ignoring message kind");
            }
        }
    }

    /// Reconcile local prediction with an authoritative snapshot and merge
    /// area-of-interest diffs, then republish the corrected view
    fn handle_state(inner: &Inner, envelope: &Envelope) {
        let state: StatePayload = match envelope.payload_as() {
            Ok(state) => state,
            Err(e) => {
                debug!(error = %e, "discarding state with bad payload");
                return;
            }
        };

        if let Some(ack) = envelope.ack {
            inner.ledger.lock().acknowledge(ack);
        }

        let entities = {
            let mut world = inner.world.lock();
            if let Some(full) = state.entities {
                world.reset(full);
            }
            if let Some(added) = state.added {
                world.apply_added(added);
            }
            if let Some(updated) = state.updated {
                world.apply_updated(updated);
            }
            if let Some(removed) = state.removed {
                world.apply_removed(removed);
            }
            world.snapshot()
        };

        // Replay still-unconfirmed inputs on top of the authoritative
        // position; with an empty ledger this is the server position
        // exactly.
        let (x, y) = inner.ledger.lock().replay(state.you.x, state.you.y);
        let you = PlayerState { x, y, ..state.you };

        inner.bridge.server_state.publish(&StateUpdate { you, entities });
    }

    fn handle_event(inner: &Inner, event: EventPayload) {
        // A populated channel marks a chat broadcast; other shapes are
        // reserved extension points.
        if let Some(channel) = event.channel {
            inner.bridge.server_chat.publish(&ChatLine {
                channel,
                from: event.from.unwrap_or_default(),
                msg: event.msg.unwrap_or_default(),
                ts: event.ts.unwrap_or_else(unix_millis),
            });
        } else if let Some(code) = event.code {
            warn!(code = %code, "server reported an error event");
        } else {
            debug!("ignoring event with no recognized fields");
        }
    }

    /// Record and transmit one movement step
    ///
    /// Inputs are never queued while disconnected, and only inputs that
    /// reach the wire enter the ledger.
    fn send_move(inner: &Inner, dx: f64, dy: f64) {
        let outbound = inner.outbound.lock();
        let Some(tx) = outbound.as_ref() else {
            return;
        };

        let ts = unix_millis();
        let seq = {
            let mut ledger = inner.ledger.lock();
            let seq = ledger.next_seq();
            ledger.record(seq, PendingInput { dx, dy, ts });
            seq
        };

        let envelope = Envelope::new(Op::Move)
            .with_seq(seq)
            .with_payload(&MovePayload { dx, dy });
        Inner::transmit(tx, envelope);
    }

    fn send_ping(inner: &Inner) {
        let outbound = inner.outbound.lock();
        let Some(tx) = outbound.as_ref() else {
            return;
        };
        Inner::transmit(tx, Ok(Envelope::new(Op::Ping)));
    }

    fn send_chat(inner: &Inner, channel: &str, text: &str) {
        let outbound = inner.outbound.lock();
        let Some(tx) = outbound.as_ref() else {
            return;
        };
        let envelope = Envelope::new(Op::Chat).with_payload(&ChatPayload {
            channel: channel.to_string(),
            msg: text.to_string(),
        });
        Inner::transmit(tx, envelope);
    }

    /// Encode and queue one envelope; encoding failures drop the message
    fn transmit(
        tx: &mpsc::UnboundedSender<Message>,
        envelope: Result<Envelope, proto::EncodeError>,
    ) {
        let envelope = match envelope {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "failed to encode outbound payload");
                return;
            }
        };
        match proto::encode(&envelope) {
            // A dead writer means the session is tearing down; the frame
            // is dropped like any other disconnected send.
            Ok(bytes) => {
                let _ = tx.send(Message::Binary(bytes));
            }
            Err(e) => warn!(error = %e, "failed to encode outbound envelope"),
        }
    }
}

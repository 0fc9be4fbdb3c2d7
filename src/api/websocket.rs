//! WebSocket sessions
//!
//! Each connection gets the join snapshot, then every broadcast event in
//! emission order, interleaved with private replies to its own commands.
//! Closing the socket disconnects the player it registered.

use super::{
    errors::ErrorBody,
    handlers::AppState,
    models::{ClientCommand, CommandResponse, InitState},
};
use crate::errors::{EngineError, EngineResult};
use crate::game::{EngineHandle, GameEvent, PlayerId};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// GET /ws
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let connection = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);

    let (snapshot, events) = match state.engine.join(&state.gateway).await {
        Ok(joined) => joined,
        Err(e) => {
            warn!(connection, "rejecting websocket client: {}", e);
            return;
        }
    };

    let (mut sender, mut receiver) = socket.split();
    let init = match serde_json::to_string(&InitState::new(&snapshot)) {
        Ok(text) => text,
        Err(e) => {
            error!(connection, "failed to serialize init_state: {}", e);
            return;
        }
    };
    if let Err(e) = sender.send(Message::Text(init)).await {
        warn!(connection, "failed to send init_state: {}", e);
        return;
    }

    state.metrics.ws_connections.inc();
    info!(connection, connections = state.metrics.ws_connections.get(), "🔌 websocket client connected");

    let mut session = Session::new(state.engine.clone());
    let (replies_tx, replies_rx) = mpsc::unbounded_channel::<String>();
    let mut send_task = tokio::spawn(forward_outbound(
        sender,
        replies_rx,
        events,
        session.watch_player(),
        connection,
    ));

    loop {
        tokio::select! {
            _ = &mut send_task => {
                debug!(connection, "send task finished");
                break;
            }
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let reply = session.handle_text(&text).await;
                    match serde_json::to_string(&reply) {
                        Ok(text) => {
                            if replies_tx.send(text).is_err() {
                                break;
                            }
                        }
                        Err(e) => error!(connection, "failed to serialize reply: {}", e),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(connection, "websocket error: {}", e);
                    break;
                }
            },
        }
    }

    send_task.abort();
    if let Some(id) = session.player {
        if let Err(e) = state.engine.disconnect(id).await {
            debug!(connection, %id, "disconnect after close: {}", e);
        }
    }
    state.metrics.ws_connections.dec();
    info!(connection, connections = state.metrics.ws_connections.get(), "🔌 websocket client disconnected");
}

/// Whether `event` goes to a socket whose registered player is `viewer`
fn delivers_to(event: &GameEvent, viewer: Option<PlayerId>) -> bool {
    match event.recipient() {
        Some(recipient) => viewer == Some(recipient),
        None => true,
    }
}

/// Writes replies and broadcast events to the socket; replies go first when both are ready
async fn forward_outbound(
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut replies: mpsc::UnboundedReceiver<String>,
    mut events: broadcast::Receiver<GameEvent>,
    player: watch::Receiver<Option<PlayerId>>,
    connection: u64,
) {
    loop {
        let text = tokio::select! {
            biased;
            Some(reply) = replies.recv() => reply,
            event = events.recv() => match event {
                Ok(event) if !delivers_to(&event, *player.borrow()) => continue,
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        error!(connection, event = event.name(), "failed to serialize event: {}", e);
                        continue;
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(connection, skipped, "slow websocket client dropped events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        if sender.send(Message::Text(text)).await.is_err() {
            debug!(connection, "client went away");
            break;
        }
    }
}

/// Per-connection command state: which player this socket registered
struct Session {
    engine: EngineHandle,
    player: Option<PlayerId>,
    /// Lets the outbound task pick up private events once registered
    owner: watch::Sender<Option<PlayerId>>,
}

impl Session {
    fn new(engine: EngineHandle) -> Self {
        let (owner, _) = watch::channel(None);
        Self {
            engine,
            player: None,
            owner,
        }
    }

    fn watch_player(&self) -> watch::Receiver<Option<PlayerId>> {
        self.owner.subscribe()
    }

    async fn handle_text(&mut self, text: &str) -> CommandResponse {
        let frame: Value = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("malformed websocket frame: {}", e);
                return CommandResponse::failure(None, ErrorBody::new("VALIDATION_ERROR", "Malformed JSON"));
            }
        };
        let request_id = frame.get("requestId").cloned();

        let command = match serde_json::from_value::<ClientCommand>(frame) {
            Ok(command) => command,
            Err(e) => {
                warn!("unrecognised websocket command: {}", e);
                return CommandResponse::failure(
                    request_id,
                    ErrorBody::new("VALIDATION_ERROR", format!("Invalid command: {}", e)),
                );
            }
        };

        let action = command.action();
        match self.execute(command).await {
            Ok(data) => CommandResponse::success(request_id, data),
            Err(body) => {
                debug!(action, code = %body.code, "websocket command rejected");
                CommandResponse::failure(request_id, body)
            }
        }
    }

    async fn execute(&mut self, command: ClientCommand) -> Result<Value, ErrorBody> {
        match command {
            ClientCommand::Ping => Ok(json!({ "pong": true })),
            ClientCommand::RegisterPlayer { username } => {
                if self.player.is_some() {
                    return Err(ErrorBody::from(&EngineError::state("Already registered on this connection")));
                }
                let registration = self.engine.register(username).await;
                if let Ok(registration) = &registration {
                    self.player = Some(registration.id);
                    self.owner.send_replace(Some(registration.id));
                }
                reply(registration)
            }
            ClientCommand::PlaceBet { bet } => {
                let id = self.registered()?;
                reply(self.engine.place_bet(id, bet.value()).await)
            }
            ClientCommand::CashOut => {
                let id = self.registered()?;
                reply(self.engine.cash_out(id).await)
            }
            ClientCommand::SetAutoCashout { multiplier: Some(threshold) } => {
                let id = self.registered()?;
                reply(self.engine.set_auto_cashout(id, threshold.value()).await)
            }
            ClientCommand::SetAutoCashout { multiplier: None } => {
                let id = self.registered()?;
                reply(self.engine.clear_auto_cashout(id).await)
            }
        }
    }

    fn registered(&self) -> Result<PlayerId, ErrorBody> {
        self.player
            .ok_or_else(|| ErrorBody::from(&EngineError::state("Register before playing")))
    }
}

fn reply<T: Serialize>(result: EngineResult<T>) -> Result<Value, ErrorBody> {
    let payload = result.map_err(|e| ErrorBody::from(&e))?;
    serde_json::to_value(payload).map_err(|e| ErrorBody::new("INTERNAL_ERROR", e.to_string()))
}

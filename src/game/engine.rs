//! Engine actor: the serialized execution context
//!
//! A single tokio task owns the [`RoundScheduler`]. Player commands arrive
//! through the [`EngineHandle`] mailbox and fired timers through their own
//! channel; the task processes exactly one of either at a time, to
//! completion.

use super::{
    crash_model::{build_crash_model, CrashModel},
    gateway::{BroadcastGateway, ChannelGateway},
    scheduler::RoundScheduler,
    timer::{ScheduledTask, TokioTaskScheduler},
    types::{
        AutoCashoutReceipt, BetReceipt, CashOutReceipt, EngineStatus, GameEvent, GameSnapshot,
        PlayerId, Registration,
    },
};
use crate::config::LiftoffConfig;
use crate::errors::{EngineError, EngineResult};
use crate::metrics::Metrics;
use std::sync::Arc;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info};

type Responder<T> = oneshot::Sender<EngineResult<T>>;
type Subscribe = Box<dyn FnOnce() -> broadcast::Receiver<GameEvent> + Send>;

/// Messages sent to the engine
pub enum EngineMessage {
    Register {
        username: String,
        response: Responder<Registration>,
    },
    PlaceBet {
        id: PlayerId,
        amount: f64,
        response: Responder<BetReceipt>,
    },
    CashOut {
        id: PlayerId,
        response: Responder<CashOutReceipt>,
    },
    SetAutoCashout {
        id: PlayerId,
        threshold: f64,
        response: Responder<AutoCashoutReceipt>,
    },
    ClearAutoCashout {
        id: PlayerId,
        response: Responder<AutoCashoutReceipt>,
    },
    Disconnect {
        id: PlayerId,
        response: Responder<()>,
    },
    Snapshot {
        response: oneshot::Sender<GameSnapshot>,
    },
    Status {
        response: oneshot::Sender<EngineStatus>,
    },
    /// Snapshot plus an event subscription taken in the same step, so the
    /// observer sees every event after the snapshot and none before it
    Join {
        subscribe: Subscribe,
        response: oneshot::Sender<(GameSnapshot, broadcast::Receiver<GameEvent>)>,
    },
    Shutdown,
}

/// Mailbox for the engine
#[derive(Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineMessage>,
}

impl EngineHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> EngineMessage) -> EngineResult<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| EngineError::Unavailable)?;
        rx.await.map_err(|_| EngineError::Unavailable)
    }

    pub async fn register(&self, username: impl Into<String>) -> EngineResult<Registration> {
        let username = username.into();
        self.request(|response| EngineMessage::Register { username, response })
            .await?
    }

    pub async fn place_bet(&self, id: PlayerId, amount: f64) -> EngineResult<BetReceipt> {
        self.request(|response| EngineMessage::PlaceBet { id, amount, response })
            .await?
    }

    pub async fn cash_out(&self, id: PlayerId) -> EngineResult<CashOutReceipt> {
        self.request(|response| EngineMessage::CashOut { id, response })
            .await?
    }

    pub async fn set_auto_cashout(&self, id: PlayerId, threshold: f64) -> EngineResult<AutoCashoutReceipt> {
        self.request(|response| EngineMessage::SetAutoCashout { id, threshold, response })
            .await?
    }

    pub async fn clear_auto_cashout(&self, id: PlayerId) -> EngineResult<AutoCashoutReceipt> {
        self.request(|response| EngineMessage::ClearAutoCashout { id, response })
            .await?
    }

    pub async fn disconnect(&self, id: PlayerId) -> EngineResult<()> {
        self.request(|response| EngineMessage::Disconnect { id, response })
            .await?
    }

    pub async fn snapshot(&self) -> EngineResult<GameSnapshot> {
        self.request(|response| EngineMessage::Snapshot { response }).await
    }

    pub async fn status(&self) -> EngineResult<EngineStatus> {
        self.request(|response| EngineMessage::Status { response }).await
    }

    pub async fn join(&self, gateway: &ChannelGateway) -> EngineResult<(GameSnapshot, broadcast::Receiver<GameEvent>)> {
        let gateway = gateway.clone();
        let subscribe: Subscribe = Box::new(move || gateway.subscribe());
        self.request(|response| EngineMessage::Join { subscribe, response })
            .await
    }

    /// Ask the engine task to stop after the messages already queued
    pub async fn shutdown(&self) {
        if self.sender.send(EngineMessage::Shutdown).await.is_err() {
            debug!("engine already stopped");
        }
    }
}

struct RoundEngine {
    scheduler: RoundScheduler,
    mailbox: mpsc::Receiver<EngineMessage>,
    fired: mpsc::UnboundedReceiver<ScheduledTask>,
    metrics: Option<Arc<Metrics>>,
}

impl RoundEngine {
    async fn run(mut self) {
        info!("round engine started");
        loop {
            tokio::select! {
                message = self.mailbox.recv() => match message {
                    Some(EngineMessage::Shutdown) | None => break,
                    Some(message) => self.handle(message),
                },
                Some(task) = self.fired.recv() => self.scheduler.on_timer(task),
            }
        }
        info!("round engine stopped");
    }

    fn handle(&mut self, message: EngineMessage) {
        match message {
            EngineMessage::Register { username, response } => {
                let result = self.scheduler.register(&username);
                self.respond(response, result);
            }
            EngineMessage::PlaceBet { id, amount, response } => {
                let result = self.scheduler.place_bet(id, amount);
                self.respond(response, result);
            }
            EngineMessage::CashOut { id, response } => {
                let result = self.scheduler.cash_out(id);
                self.respond(response, result);
            }
            EngineMessage::SetAutoCashout { id, threshold, response } => {
                let result = self.scheduler.set_auto_cashout(id, threshold);
                self.respond(response, result);
            }
            EngineMessage::ClearAutoCashout { id, response } => {
                let result = self.scheduler.clear_auto_cashout(id);
                self.respond(response, result);
            }
            EngineMessage::Disconnect { id, response } => {
                let result = self.scheduler.disconnect(id);
                self.respond(response, result);
            }
            EngineMessage::Snapshot { response } => {
                let _ = response.send(self.scheduler.snapshot());
            }
            EngineMessage::Status { response } => {
                let _ = response.send(self.scheduler.status());
            }
            EngineMessage::Join { subscribe, response } => {
                let events = subscribe();
                let _ = response.send((self.scheduler.snapshot(), events));
            }
            EngineMessage::Shutdown => {}
        }
    }

    fn respond<T>(&self, response: Responder<T>, result: EngineResult<T>) {
        if let Err(err) = &result {
            debug!(code = err.code(), %err, "command rejected");
            if let Some(metrics) = &self.metrics {
                metrics.record_rejection(err.code());
            }
        }
        // The caller may have gone away; the state change stands either way.
        let _ = response.send(result);
    }
}

/// Start the engine with the configured crash policy
pub fn spawn_engine(
    config: &LiftoffConfig,
    gateway: Arc<dyn BroadcastGateway>,
    metrics: Option<Arc<Metrics>>,
) -> (EngineHandle, JoinHandle<()>) {
    spawn_engine_with_model(config, build_crash_model(&config.crash), gateway, metrics)
}

/// Start the engine with an explicit crash model
pub fn spawn_engine_with_model(
    config: &LiftoffConfig,
    crash_model: Box<dyn CrashModel>,
    gateway: Arc<dyn BroadcastGateway>,
    metrics: Option<Arc<Metrics>>,
) -> (EngineHandle, JoinHandle<()>) {
    let (sender, mailbox) = mpsc::channel(config.server.mailbox_capacity);
    let (fired_tx, fired) = mpsc::unbounded_channel();

    let mut scheduler = RoundScheduler::new(
        config,
        crash_model,
        Box::new(TokioTaskScheduler::new(fired_tx)),
        gateway,
    );
    if let Some(metrics) = &metrics {
        scheduler = scheduler.with_metrics(metrics.clone());
    }

    let engine = RoundEngine {
        scheduler,
        mailbox,
        fired,
        metrics,
    };
    let handle = tokio::spawn(engine.run());
    (EngineHandle { sender }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{gateway::RecordingGateway, types::Phase};

    #[tokio::test]
    async fn test_commands_round_trip() {
        let gateway = RecordingGateway::new();
        let (engine, task) = spawn_engine(&LiftoffConfig::default(), Arc::new(gateway.clone()), None);

        let alice = engine.register("Alice").await.unwrap();
        assert_eq!(alice.balance, 1_000);
        assert!(matches!(engine.register("Alice").await, Err(EngineError::State(_))));

        let receipt = engine.place_bet(alice.id, 100.0).await.unwrap();
        assert_eq!(receipt.balance, 900);

        let status = engine.status().await.unwrap();
        assert_eq!(status.phase, Phase::Countdown);
        assert_eq!(status.players, 1);

        engine.shutdown().await;
        task.await.unwrap();
        assert!(matches!(engine.status().await, Err(EngineError::Unavailable)));
    }

    #[tokio::test]
    async fn test_join_sees_only_later_events() {
        let gateway = ChannelGateway::new(64);
        let (engine, _task) = spawn_engine(&LiftoffConfig::default(), Arc::new(gateway.clone()), None);
        let alice = engine.register("Alice").await.unwrap();

        let (snapshot, mut events) = engine.join(&gateway).await.unwrap();
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.phase, Phase::Idle);

        engine.place_bet(alice.id, 10.0).await.unwrap();
        assert_eq!(events.recv().await.unwrap().name(), "player_bet");
        assert_eq!(events.recv().await.unwrap().name(), "countdown_start");
    }

    #[tokio::test]
    async fn test_disconnect_unknown_player() {
        let (engine, _task) = spawn_engine(&LiftoffConfig::default(), Arc::new(RecordingGateway::new()), None);
        assert_eq!(engine.disconnect(PlayerId(9)).await, Err(EngineError::NotFound(PlayerId(9))));
    }
}

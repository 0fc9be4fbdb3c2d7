//! Round phase state machine
//!
//! `Idle -> Countdown -> Active -> Crashed -> Idle | Countdown`
//!
//! The scheduler is the single owner of the round, the ledger and the
//! history. It is driven one step at a time: each command or fired timer
//! runs to completion before the next one starts, so nothing here needs a
//! lock. Timers are tagged with the epoch current when they were scheduled
//! and the epoch advances on every phase entry, which turns late firings
//! into no-ops.

use super::{
    crash_model::CrashModel,
    gateway::BroadcastGateway,
    history::RoundHistory,
    ledger::PlayerLedger,
    timer::{ScheduledTask, TaskKind, TaskScheduler},
    types::{
        AutoCashoutReceipt, BetReceipt, CashOutReceipt, EngineStatus, GameEvent, GameSnapshot,
        Multiplier, Phase, Player, PlayerId, Registration, RoundResult,
    },
};
use crate::config::{LiftoffConfig, RoundConfig};
use crate::errors::EngineResult;
use crate::metrics::{crash_bucket, Metrics};
use std::sync::Arc;
use tracing::{debug, info};

pub struct RoundScheduler {
    round: RoundConfig,
    phase: Phase,
    multiplier: Multiplier,
    countdown_remaining: u32,
    epoch: u64,
    rounds_played: u64,
    /// Bettors snapshotted at Active entry, registration order
    participants: Vec<PlayerId>,
    /// Participants who disconnected mid-round, kept until settlement
    departed: Vec<Player>,
    ledger: PlayerLedger,
    history: RoundHistory,
    crash_model: Box<dyn CrashModel>,
    timers: Box<dyn TaskScheduler>,
    gateway: Arc<dyn BroadcastGateway>,
    metrics: Option<Arc<Metrics>>,
}

impl RoundScheduler {
    pub fn new(
        config: &LiftoffConfig,
        crash_model: Box<dyn CrashModel>,
        timers: Box<dyn TaskScheduler>,
        gateway: Arc<dyn BroadcastGateway>,
    ) -> Self {
        Self {
            round: config.round.clone(),
            phase: Phase::Idle,
            multiplier: Multiplier::ONE,
            countdown_remaining: 0,
            epoch: 0,
            rounds_played: 0,
            participants: Vec::new(),
            departed: Vec::new(),
            ledger: PlayerLedger::new(config.ledger.clone()),
            history: RoundHistory::new(&config.history),
            crash_model,
            timers,
            gateway,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn register(&mut self, username: &str) -> EngineResult<Registration> {
        let registration = self.ledger.register(username)?;
        self.gateway.publish(GameEvent::PlayerJoined {
            id: registration.id,
            username: registration.username.clone(),
        });
        self.update_player_gauge();
        Ok(registration)
    }

    pub fn place_bet(&mut self, id: PlayerId, amount: f64) -> EngineResult<BetReceipt> {
        let receipt = self.ledger.place_bet(id, amount, self.phase)?;
        if let Some(player) = self.ledger.get(id) {
            self.gateway.publish(GameEvent::PlayerBet {
                id,
                username: player.username.clone(),
                bet: receipt.bet,
            });
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_bet(receipt.bet);
        }

        if self.phase == Phase::Idle {
            self.start_countdown();
        }
        Ok(receipt)
    }

    /// Manual cash-out at the multiplier current when the command is processed
    pub fn cash_out(&mut self, id: PlayerId) -> EngineResult<CashOutReceipt> {
        let receipt = self.ledger.cash_out(id, self.multiplier, self.phase)?;
        self.publish_cash_out(&receipt);
        Ok(receipt)
    }

    pub fn set_auto_cashout(&mut self, id: PlayerId, threshold: f64) -> EngineResult<AutoCashoutReceipt> {
        self.ledger.set_auto_cashout(id, threshold)
    }

    pub fn clear_auto_cashout(&mut self, id: PlayerId) -> EngineResult<AutoCashoutReceipt> {
        self.ledger.clear_auto_cashout(id)
    }

    /// Remove a player. A participant leaving mid-round is parked until the
    /// crash so their outcome still lands in the round result.
    pub fn disconnect(&mut self, id: PlayerId) -> EngineResult<()> {
        let player = self.ledger.remove(id)?;
        self.gateway.publish(GameEvent::PlayerDisconnected {
            id,
            username: player.username.clone(),
        });
        if self.phase == Phase::Active && self.participants.contains(&id) {
            debug!(player = %id, "participant left mid-round; settling at crash");
            self.departed.push(player);
        }
        self.update_player_gauge();
        Ok(())
    }

    /// Entry point for fired timers; stale epochs are ignored
    pub fn on_timer(&mut self, task: ScheduledTask) {
        if task.epoch != self.epoch {
            debug!(task_epoch = task.epoch, epoch = self.epoch, kind = ?task.kind, "stale timer ignored");
            return;
        }
        match (task.kind, self.phase) {
            (TaskKind::CountdownTick, Phase::Countdown) => self.countdown_tick(),
            (TaskKind::MultiplierTick, Phase::Active) => self.multiplier_tick(),
            (TaskKind::Settle, Phase::Crashed) => self.settle(),
            (kind, phase) => debug!(?kind, %phase, "timer does not apply to phase"),
        }
    }

    pub fn snapshot(&self) -> GameSnapshot {
        let countdown_active = self.phase == Phase::Countdown;
        GameSnapshot {
            is_active: self.phase == Phase::Active,
            phase: self.phase,
            current_multiplier: self.multiplier,
            players: self.ledger.views(),
            recent_games: self.history.recent_crash_points(),
            game_history: self.history.results(),
            countdown_active,
            time_to_start: if countdown_active { self.countdown_remaining } else { 0 },
        }
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            phase: self.phase,
            players: self.ledger.len(),
            rounds_played: self.rounds_played,
            round_epoch: self.epoch,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn multiplier(&self) -> Multiplier {
        self.multiplier
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn countdown_remaining(&self) -> u32 {
        self.countdown_remaining
    }

    pub fn participants(&self) -> &[PlayerId] {
        &self.participants
    }

    pub fn ledger(&self) -> &PlayerLedger {
        &self.ledger
    }

    pub fn history(&self) -> &RoundHistory {
        &self.history
    }

    /// Cancel the outgoing phase's timers and advance the epoch
    fn enter(&mut self, phase: Phase) -> u64 {
        self.timers.cancel(self.epoch);
        self.epoch += 1;
        self.phase = phase;
        info!(%phase, epoch = self.epoch, "phase entered");
        self.epoch
    }

    fn start_countdown(&mut self) {
        let epoch = self.enter(Phase::Countdown);
        self.countdown_remaining = self.round.countdown_seconds;
        self.gateway.publish(GameEvent::CountdownStart {
            time_left: self.countdown_remaining,
        });

        if self.countdown_remaining == 0 {
            self.start_round();
            return;
        }
        self.timers.schedule_repeating(
            ScheduledTask {
                epoch,
                kind: TaskKind::CountdownTick,
            },
            self.round.countdown_tick(),
        );
    }

    fn countdown_tick(&mut self) {
        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        self.gateway.publish(GameEvent::CountdownUpdate {
            time_left: self.countdown_remaining,
        });
        if self.countdown_remaining == 0 {
            self.start_round();
        }
    }

    fn start_round(&mut self) {
        self.multiplier = Multiplier::ONE;
        self.participants = self.ledger.bettors().map(|p| p.id).collect();
        let active_players: Vec<_> = self.ledger.bettors().map(Player::active_entry).collect();
        let epoch = self.enter(Phase::Active);
        self.crash_model.begin_round();

        info!(participants = self.participants.len(), "round started");
        self.gateway.publish(GameEvent::GameStart { active_players });
        self.timers.schedule_repeating(
            ScheduledTask {
                epoch,
                kind: TaskKind::MultiplierTick,
            },
            self.round.multiplier_tick(),
        );
    }

    fn multiplier_tick(&mut self) {
        self.multiplier = self.multiplier.saturating_add(self.round.multiplier_step);
        self.gateway.publish(GameEvent::MultiplierUpdate {
            multiplier: self.multiplier,
        });

        // Auto cash-outs run before the crash check so a threshold met on
        // the crashing tick still pays.
        for receipt in self.ledger.check_auto_cashouts(self.multiplier) {
            self.publish_cash_out(&receipt);
        }

        if self.crash_model.should_crash(self.multiplier) {
            self.crash(self.multiplier);
        }
    }

    fn crash(&mut self, crash_point: Multiplier) {
        let epoch = self.enter(Phase::Crashed);
        self.rounds_played += 1;

        let players = self
            .participants
            .iter()
            .filter_map(|id| {
                self.ledger
                    .get(*id)
                    .or_else(|| self.departed.iter().find(|p| p.id == *id))
            })
            .map(Player::outcome)
            .collect();
        let result = RoundResult {
            round_id: self.rounds_played,
            crash_point,
            timestamp: chrono::Utc::now().timestamp_millis(),
            players,
        };

        info!(
            round = result.round_id,
            %crash_point,
            bucket = crash_bucket(crash_point),
            participants = result.players.len(),
            "round crashed"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_crash(&result);
        }

        self.history.record(result.clone());
        self.gateway.publish(GameEvent::GameCrash {
            crash_point,
            game_result: result,
        });

        self.ledger.reset_round();
        self.participants.clear();
        self.departed.clear();

        self.timers.schedule_once(
            ScheduledTask {
                epoch,
                kind: TaskKind::Settle,
            },
            self.round.settle_delay(),
        );
    }

    fn settle(&mut self) {
        if self.ledger.has_pending_bets() {
            self.start_countdown();
        } else {
            self.enter(Phase::Idle);
        }
    }

    fn publish_cash_out(&self, receipt: &CashOutReceipt) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cash_out(receipt);
        }
        self.gateway.publish(GameEvent::PlayerCashedOut {
            id: receipt.id,
            username: receipt.username.clone(),
            multiplier: receipt.multiplier,
            winnings: receipt.winnings,
            auto: receipt.auto,
        });
        // A manual cash-out already returns the balance to the caller
        if receipt.auto {
            self.gateway.publish(GameEvent::CashOutConfirmed {
                id: receipt.id,
                multiplier: receipt.multiplier,
                winnings: receipt.winnings,
                balance: receipt.balance,
                auto: true,
            });
        }
    }

    fn update_player_gauge(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.set_players(self.ledger.len());
        }
    }
}

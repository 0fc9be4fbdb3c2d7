//! Prometheus metrics for the round engine and gateway

use crate::game::types::{CashOutReceipt, Multiplier, RoundResult};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    pub rounds_total: IntCounter,
    pub bets_total: IntCounter,
    pub bet_volume_total: IntCounter,
    pub cashouts_total: IntCounterVec,
    pub payout_total: IntCounter,
    pub crash_point: Histogram,
    pub players: IntGauge,
    pub ws_connections: IntGauge,
    pub rejected_commands_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let rounds_total = IntCounter::new("liftoff_rounds_total", "Rounds that reached a crash")?;
        let bets_total = IntCounter::new("liftoff_bets_total", "Accepted bets")?;
        let bet_volume_total = IntCounter::new("liftoff_bet_volume_total", "Sum of accepted bet amounts")?;
        let cashouts_total = IntCounterVec::new(
            Opts::new("liftoff_cashouts_total", "Cash-outs by trigger"),
            &["kind"],
        )?;
        let payout_total = IntCounter::new("liftoff_payout_total", "Sum of cash-out winnings")?;
        let crash_point = Histogram::with_opts(
            HistogramOpts::new("liftoff_crash_point", "Multiplier at which rounds crashed")
                .buckets(vec![1.1, 1.5, 2.0, 3.0, 5.0, 10.0, 15.0, 20.0]),
        )?;
        let players = IntGauge::new("liftoff_players", "Registered players")?;
        let ws_connections = IntGauge::new("liftoff_ws_connections", "Open WebSocket connections")?;
        let rejected_commands_total = IntCounterVec::new(
            Opts::new("liftoff_rejected_commands_total", "Rejected commands by error code"),
            &["code"],
        )?;

        registry.register(Box::new(rounds_total.clone()))?;
        registry.register(Box::new(bets_total.clone()))?;
        registry.register(Box::new(bet_volume_total.clone()))?;
        registry.register(Box::new(cashouts_total.clone()))?;
        registry.register(Box::new(payout_total.clone()))?;
        registry.register(Box::new(crash_point.clone()))?;
        registry.register(Box::new(players.clone()))?;
        registry.register(Box::new(ws_connections.clone()))?;
        registry.register(Box::new(rejected_commands_total.clone()))?;

        Ok(Self {
            registry,
            rounds_total,
            bets_total,
            bet_volume_total,
            cashouts_total,
            payout_total,
            crash_point,
            players,
            ws_connections,
            rejected_commands_total,
        })
    }

    pub fn record_bet(&self, amount: u64) {
        self.bets_total.inc();
        self.bet_volume_total.inc_by(amount);
    }

    pub fn record_cash_out(&self, receipt: &CashOutReceipt) {
        let kind = if receipt.auto { "auto" } else { "manual" };
        self.cashouts_total.with_label_values(&[kind]).inc();
        self.payout_total.inc_by(receipt.winnings);
    }

    pub fn record_crash(&self, result: &RoundResult) {
        self.rounds_total.inc();
        self.crash_point.observe(result.crash_point.as_f64());
    }

    pub fn record_rejection(&self, code: &str) {
        self.rejected_commands_total.with_label_values(&[code]).inc();
    }

    pub fn set_players(&self, count: usize) {
        self.players.set(count as i64);
    }

    /// Prometheus text exposition of every registered metric
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Bucket label helper used by logs
pub fn crash_bucket(point: Multiplier) -> &'static str {
    match point.hundredths() {
        0..=149 => "instant",
        150..=299 => "low",
        300..=999 => "mid",
        _ => "high",
    }
}

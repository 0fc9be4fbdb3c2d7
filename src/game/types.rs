use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Player identifier, assigned sequentially at registration.
///
/// Because ids only ever grow, ordering by id is registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payout multiplier stored as integer hundredths (1.00x == 100).
///
/// Every multiplier in the engine is already rounded to two decimals, so
/// comparisons and broadcasts never see an unrounded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Multiplier(u32);

impl Multiplier {
    pub const ONE: Multiplier = Multiplier(100);

    pub const fn from_hundredths(hundredths: u32) -> Self {
        Self(hundredths)
    }

    pub const fn hundredths(self) -> u32 {
        self.0
    }

    /// Round a decimal to the nearest hundredth. Returns `None` for NaN,
    /// infinities, negatives and values too large to represent.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let scaled = (value * 100.0).round();
        if scaled > u32::MAX as f64 {
            return None;
        }
        Some(Self(scaled as u32))
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn saturating_add(self, step: Multiplier) -> Self {
        Self(self.0.saturating_add(step.0))
    }

    /// `floor(amount * self)` in whole currency units
    pub fn payout(self, amount: u64) -> u64 {
        let scaled = amount as u128 * self.0 as u128 / 100;
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}x", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Multiplier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Multiplier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        Multiplier::from_f64(raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid multiplier {raw}")))
    }
}

/// Round state machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Countdown,
    Active,
    Crashed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Countdown => "countdown",
            Phase::Active => "active",
            Phase::Crashed => "crashed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Player record, owned by the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub username: String,
    pub balance: u64,
    /// Stake for the current round; 0 means no active bet
    pub current_bet: u64,
    /// Set once per round when the player cashes out
    pub cash_out: Option<Multiplier>,
    pub auto_cashout: Option<Multiplier>,
}

impl Player {
    pub fn new(id: PlayerId, username: String, balance: u64) -> Self {
        Self {
            id,
            username,
            balance,
            current_bet: 0,
            cash_out: None,
            auto_cashout: None,
        }
    }

    pub fn did_cash_out(&self) -> bool {
        self.cash_out.is_some()
    }

    /// Has a stake riding on the multiplier right now
    pub fn is_riding(&self) -> bool {
        self.current_bet > 0 && self.cash_out.is_none()
    }

    pub fn outcome(&self) -> PlayerOutcome {
        let profit = match self.cash_out {
            Some(multiplier) => multiplier.payout(self.current_bet) as i64 - self.current_bet as i64,
            None => -(self.current_bet as i64),
        };
        PlayerOutcome {
            id: self.id,
            username: self.username.clone(),
            bet: self.current_bet,
            did_cash_out: self.did_cash_out(),
            cash_out_multiplier: self.cash_out,
            profit,
        }
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id,
            username: self.username.clone(),
            balance: self.balance,
            bet: self.current_bet,
            did_cash_out: self.did_cash_out(),
            cash_out_multiplier: self.cash_out,
            auto_cashout: self.auto_cashout,
        }
    }

    pub fn active_entry(&self) -> ActivePlayer {
        ActivePlayer {
            id: self.id,
            username: self.username.clone(),
            bet: self.current_bet,
        }
    }
}

/// Public projection of a player for snapshots
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub username: String,
    pub balance: u64,
    pub bet: u64,
    pub did_cash_out: bool,
    pub cash_out_multiplier: Option<Multiplier>,
    pub auto_cashout: Option<Multiplier>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivePlayer {
    pub id: PlayerId,
    pub username: String,
    pub bet: u64,
}

/// One participant's line in a finished round
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerOutcome {
    pub id: PlayerId,
    pub username: String,
    pub bet: u64,
    pub did_cash_out: bool,
    pub cash_out_multiplier: Option<Multiplier>,
    pub profit: i64,
}

/// Immutable record of a completed round
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResult {
    pub round_id: u64,
    pub crash_point: Multiplier,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub players: Vec<PlayerOutcome>,
}

/// Events fanned out to every observer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum GameEvent {
    CountdownStart {
        #[serde(rename = "timeLeft")]
        time_left: u32,
    },
    CountdownUpdate {
        #[serde(rename = "timeLeft")]
        time_left: u32,
    },
    GameStart {
        #[serde(rename = "activePlayers")]
        active_players: Vec<ActivePlayer>,
    },
    MultiplierUpdate {
        multiplier: Multiplier,
    },
    PlayerBet {
        id: PlayerId,
        username: String,
        bet: u64,
    },
    PlayerCashedOut {
        id: PlayerId,
        username: String,
        multiplier: Multiplier,
        winnings: u64,
        auto: bool,
    },
    GameCrash {
        #[serde(rename = "crashPoint")]
        crash_point: Multiplier,
        #[serde(rename = "gameResult")]
        game_result: RoundResult,
    },
    /// Addressed to the owning player only: balance after an automatic cash-out
    CashOutConfirmed {
        id: PlayerId,
        multiplier: Multiplier,
        winnings: u64,
        balance: u64,
        auto: bool,
    },
    PlayerJoined {
        id: PlayerId,
        username: String,
    },
    PlayerDisconnected {
        id: PlayerId,
        username: String,
    },
}

impl GameEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::CountdownStart { .. } => "countdown_start",
            GameEvent::CountdownUpdate { .. } => "countdown_update",
            GameEvent::GameStart { .. } => "game_start",
            GameEvent::MultiplierUpdate { .. } => "multiplier_update",
            GameEvent::PlayerBet { .. } => "player_bet",
            GameEvent::PlayerCashedOut { .. } => "player_cashed_out",
            GameEvent::GameCrash { .. } => "game_crash",
            GameEvent::CashOutConfirmed { .. } => "cash_out_confirmed",
            GameEvent::PlayerJoined { .. } => "player_joined",
            GameEvent::PlayerDisconnected { .. } => "player_disconnected",
        }
    }

    /// The only player who should see this event; `None` means everyone
    pub fn recipient(&self) -> Option<PlayerId> {
        match self {
            GameEvent::CashOutConfirmed { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// Authoritative state handed to a newly joined observer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub is_active: bool,
    pub phase: Phase,
    pub current_multiplier: Multiplier,
    pub players: Vec<PlayerView>,
    pub recent_games: Vec<Multiplier>,
    pub game_history: Vec<RoundResult>,
    pub countdown_active: bool,
    pub time_to_start: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registration {
    pub id: PlayerId,
    pub username: String,
    pub balance: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BetReceipt {
    pub bet: u64,
    pub balance: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashOutReceipt {
    pub id: PlayerId,
    pub username: String,
    pub multiplier: Multiplier,
    pub winnings: u64,
    pub balance: u64,
    pub auto: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutoCashoutReceipt {
    pub multiplier: Option<Multiplier>,
}

/// Lightweight engine summary for status endpoints
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub phase: Phase,
    pub players: usize,
    pub rounds_played: u64,
    pub round_epoch: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplier_rounding() {
        assert_eq!(Multiplier::from_f64(1.5), Some(Multiplier::from_hundredths(150)));
        assert_eq!(Multiplier::from_f64(2.004), Some(Multiplier::from_hundredths(200)));
        assert_eq!(Multiplier::from_f64(2.006), Some(Multiplier::from_hundredths(201)));
        assert_eq!(Multiplier::from_f64(f64::NAN), None);
        assert_eq!(Multiplier::from_f64(-1.0), None);
    }

    #[test]
    fn test_multiplier_payout_floors() {
        assert_eq!(Multiplier::from_hundredths(151).payout(50), 75);
        assert_eq!(Multiplier::from_hundredths(200).payout(100), 200);
        assert_eq!(Multiplier::from_hundredths(133).payout(10), 13);
    }

    #[test]
    fn test_multiplier_display_and_serialize() {
        let m = Multiplier::from_hundredths(251);
        assert_eq!(m.to_string(), "2.51x");
        assert_eq!(serde_json::to_string(&m).unwrap(), "2.51");
    }

    #[test]
    fn test_outcome_profit() {
        let mut player = Player::new(PlayerId(1), "alice".to_string(), 900);
        player.current_bet = 100;
        assert_eq!(player.outcome().profit, -100);

        player.cash_out = Some(Multiplier::from_hundredths(200));
        let outcome = player.outcome();
        assert!(outcome.did_cash_out);
        assert_eq!(outcome.profit, 100);
    }

    #[test]
    fn test_event_wire_shape() {
        let event = GameEvent::CountdownStart { time_left: 5 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "countdown_start");
        assert_eq!(json["data"]["timeLeft"], 5);

        let event = GameEvent::PlayerCashedOut {
            id: PlayerId(2),
            username: "bob".to_string(),
            multiplier: Multiplier::from_hundredths(151),
            winnings: 75,
            auto: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "player_cashed_out");
        assert_eq!(json["data"]["auto"], true);
        assert_eq!(event.recipient(), None);

        let event = GameEvent::CashOutConfirmed {
            id: PlayerId(2),
            multiplier: Multiplier::from_hundredths(151),
            winnings: 75,
            balance: 1_025,
            auto: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "cash_out_confirmed");
        assert_eq!(json["data"]["balance"], 1_025);
        assert_eq!(event.recipient(), Some(PlayerId(2)));
        assert_eq!(json["data"]["multiplier"], 1.51);
    }
}

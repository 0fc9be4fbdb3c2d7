//! Player ledger: registrations, balances and per-round bets
//!
//! Each operation validates everything first and only then mutates, so a
//! rejected command leaves the ledger exactly as it was. Balances are
//! unsigned and every debit is checked against the balance beforehand, which
//! keeps them non-negative by construction.

use super::types::{
    AutoCashoutReceipt, BetReceipt, CashOutReceipt, Multiplier, Phase, Player, PlayerId,
    PlayerView, Registration,
};
use crate::config::LedgerConfig;
use crate::errors::{EngineError, EngineResult};
use std::collections::BTreeMap;
use tracing::info;

/// Validate a wire bet amount: finite, positive, whole units
pub fn parse_bet_amount(raw: f64) -> EngineResult<u64> {
    if !raw.is_finite() || raw <= 0.0 {
        return Err(EngineError::validation("Bet must be a positive number"));
    }
    if raw.fract() != 0.0 {
        return Err(EngineError::validation("Bet must be a whole number of units"));
    }
    if raw > u64::MAX as f64 {
        return Err(EngineError::validation("Bet is too large"));
    }
    Ok(raw as u64)
}

pub struct PlayerLedger {
    /// Keyed by sequential id, so iteration is registration order
    players: BTreeMap<PlayerId, Player>,
    next_id: u64,
    config: LedgerConfig,
}

impl PlayerLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            players: BTreeMap::new(),
            next_id: 1,
            config,
        }
    }

    pub fn register(&mut self, username: &str) -> EngineResult<Registration> {
        let username = username.trim();
        if username.is_empty() {
            return Err(EngineError::validation("Username must not be empty"));
        }
        if username.chars().count() > self.config.max_username_len {
            return Err(EngineError::validation(format!(
                "Username must be at most {} characters",
                self.config.max_username_len
            )));
        }
        if self.players.values().any(|p| p.username == username) {
            return Err(EngineError::state(format!("Username '{username}' is already taken")));
        }

        let id = PlayerId(self.next_id);
        self.next_id += 1;
        let player = Player::new(id, username.to_string(), self.config.starting_balance);
        let registration = Registration {
            id,
            username: player.username.clone(),
            balance: player.balance,
        };
        self.players.insert(id, player);

        info!(player = %id, username, "player registered");
        Ok(registration)
    }

    pub fn place_bet(&mut self, id: PlayerId, raw_amount: f64, phase: Phase) -> EngineResult<BetReceipt> {
        let player = self.players.get(&id).ok_or(EngineError::NotFound(id))?;
        let amount = parse_bet_amount(raw_amount)?;
        if amount < self.config.min_bet {
            return Err(EngineError::validation(format!(
                "Minimum bet is {}",
                self.config.min_bet
            )));
        }
        if let Some(max_bet) = self.config.max_bet {
            if amount > max_bet {
                return Err(EngineError::validation(format!("Maximum bet is {max_bet}")));
            }
        }
        if matches!(phase, Phase::Active | Phase::Crashed) {
            return Err(EngineError::state("Betting is closed for the current round"));
        }
        if player.current_bet > 0 {
            return Err(EngineError::state("A bet is already placed for this round"));
        }
        if amount > player.balance {
            return Err(EngineError::state("Insufficient balance"));
        }

        let player = self.players.get_mut(&id).ok_or(EngineError::NotFound(id))?;
        player.balance -= amount;
        player.current_bet = amount;
        player.cash_out = None;

        info!(player = %id, amount, balance = player.balance, "bet accepted");
        Ok(BetReceipt {
            bet: amount,
            balance: player.balance,
        })
    }

    /// Manual cash-out at `at`
    pub fn cash_out(&mut self, id: PlayerId, at: Multiplier, phase: Phase) -> EngineResult<CashOutReceipt> {
        self.settle_cash_out(id, at, phase, false)
    }

    fn settle_cash_out(
        &mut self,
        id: PlayerId,
        at: Multiplier,
        phase: Phase,
        auto: bool,
    ) -> EngineResult<CashOutReceipt> {
        let player = self.players.get_mut(&id).ok_or(EngineError::NotFound(id))?;
        if phase != Phase::Active {
            return Err(EngineError::state("No round in progress"));
        }
        if player.current_bet == 0 {
            return Err(EngineError::state("No active bet this round"));
        }
        if player.did_cash_out() {
            return Err(EngineError::state("Already cashed out this round"));
        }

        let winnings = at.payout(player.current_bet);
        player.balance = player.balance.saturating_add(winnings);
        player.cash_out = Some(at);

        info!(player = %id, multiplier = %at, winnings, auto, "cashed out");
        Ok(CashOutReceipt {
            id,
            username: player.username.clone(),
            multiplier: at,
            winnings,
            balance: player.balance,
            auto,
        })
    }

    pub fn set_auto_cashout(&mut self, id: PlayerId, threshold: f64) -> EngineResult<AutoCashoutReceipt> {
        let player = self.players.get_mut(&id).ok_or(EngineError::NotFound(id))?;
        // Checked before rounding so 0.995 cannot round up to 1.00
        let multiplier = Some(threshold)
            .filter(|t| t.is_finite() && *t >= 1.0)
            .and_then(Multiplier::from_f64)
            .ok_or_else(|| EngineError::validation("Auto cash-out must be a number >= 1.00"))?;

        player.auto_cashout = Some(multiplier);
        Ok(AutoCashoutReceipt {
            multiplier: Some(multiplier),
        })
    }

    pub fn clear_auto_cashout(&mut self, id: PlayerId) -> EngineResult<AutoCashoutReceipt> {
        let player = self.players.get_mut(&id).ok_or(EngineError::NotFound(id))?;
        player.auto_cashout = None;
        Ok(AutoCashoutReceipt { multiplier: None })
    }

    /// Cash out every riding player whose threshold is at or below `current`,
    /// in registration order. They receive `current`, not their threshold.
    pub fn check_auto_cashouts(&mut self, current: Multiplier) -> Vec<CashOutReceipt> {
        let due: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| p.is_riding() && matches!(p.auto_cashout, Some(t) if t <= current))
            .map(|p| p.id)
            .collect();

        due.into_iter()
            .filter_map(|id| self.settle_cash_out(id, current, Phase::Active, true).ok())
            .collect()
    }

    /// Clear per-round state after a crash
    pub fn reset_round(&mut self) {
        for player in self.players.values_mut() {
            player.current_bet = 0;
            player.cash_out = None;
        }
    }

    pub fn remove(&mut self, id: PlayerId) -> EngineResult<Player> {
        let player = self.players.remove(&id).ok_or(EngineError::NotFound(id))?;
        info!(player = %id, username = %player.username, "player removed");
        Ok(player)
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    /// Players with a stake this round, in registration order
    pub fn bettors(&self) -> impl Iterator<Item = &Player> {
        self.players.values().filter(|p| p.current_bet > 0)
    }

    pub fn has_pending_bets(&self) -> bool {
        self.players.values().any(|p| p.current_bet > 0)
    }

    pub fn views(&self) -> Vec<PlayerView> {
        self.players.values().map(Player::view).collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> PlayerLedger {
        PlayerLedger::new(LedgerConfig::default())
    }

    fn m(hundredths: u32) -> Multiplier {
        Multiplier::from_hundredths(hundredths)
    }

    #[test]
    fn test_register_assigns_sequential_ids() {
        let mut ledger = ledger();
        let alice = ledger.register("Alice").unwrap();
        let bob = ledger.register("  Bob ").unwrap();
        assert_eq!(alice.id, PlayerId(1));
        assert_eq!(bob.id, PlayerId(2));
        assert_eq!(bob.username, "Bob");
        assert_eq!(alice.balance, 1_000);
    }

    #[test]
    fn test_register_rejects_bad_usernames() {
        let mut ledger = ledger();
        assert!(matches!(ledger.register("   "), Err(EngineError::Validation(_))));
        assert!(matches!(ledger.register(&"x".repeat(21)), Err(EngineError::Validation(_))));
        assert!(ledger.register(&"x".repeat(20)).is_ok());

        ledger.register("Alice").unwrap();
        assert!(matches!(ledger.register("Alice"), Err(EngineError::State(_))));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_username_is_reusable_after_removal() {
        let mut ledger = ledger();
        let alice = ledger.register("Alice").unwrap();
        ledger.remove(alice.id).unwrap();
        let again = ledger.register("Alice").unwrap();
        assert_ne!(again.id, alice.id);
    }

    #[test]
    fn test_place_bet_debits_balance() {
        let mut ledger = ledger();
        let id = ledger.register("Alice").unwrap().id;
        let receipt = ledger.place_bet(id, 100.0, Phase::Idle).unwrap();
        assert_eq!(receipt, BetReceipt { bet: 100, balance: 900 });
        assert_eq!(ledger.get(id).unwrap().current_bet, 100);
    }

    #[test]
    fn test_place_bet_rejections_leave_state_untouched() {
        let mut ledger = ledger();
        let id = ledger.register("Alice").unwrap().id;

        assert_eq!(ledger.place_bet(PlayerId(99), 10.0, Phase::Idle), Err(EngineError::NotFound(PlayerId(99))));
        assert!(matches!(ledger.place_bet(id, 0.0, Phase::Idle), Err(EngineError::Validation(_))));
        assert!(matches!(ledger.place_bet(id, -5.0, Phase::Idle), Err(EngineError::Validation(_))));
        assert!(matches!(ledger.place_bet(id, f64::NAN, Phase::Idle), Err(EngineError::Validation(_))));
        assert!(matches!(ledger.place_bet(id, 10.5, Phase::Idle), Err(EngineError::Validation(_))));
        assert!(matches!(ledger.place_bet(id, 10.0, Phase::Active), Err(EngineError::State(_))));
        assert!(matches!(ledger.place_bet(id, 10.0, Phase::Crashed), Err(EngineError::State(_))));
        assert!(matches!(ledger.place_bet(id, 1_001.0, Phase::Idle), Err(EngineError::State(_))));

        let player = ledger.get(id).unwrap();
        assert_eq!(player.balance, 1_000);
        assert_eq!(player.current_bet, 0);
    }

    #[test]
    fn test_second_bet_same_round_rejected() {
        let mut ledger = ledger();
        let id = ledger.register("Alice").unwrap().id;
        ledger.place_bet(id, 100.0, Phase::Idle).unwrap();
        assert!(matches!(ledger.place_bet(id, 50.0, Phase::Countdown), Err(EngineError::State(_))));
        assert_eq!(ledger.get(id).unwrap().balance, 900);
    }

    #[test]
    fn test_bet_limits() {
        let mut ledger = PlayerLedger::new(LedgerConfig {
            min_bet: 10,
            max_bet: Some(500),
            ..Default::default()
        });
        let id = ledger.register("Alice").unwrap().id;
        assert!(matches!(ledger.place_bet(id, 5.0, Phase::Idle), Err(EngineError::Validation(_))));
        assert!(matches!(ledger.place_bet(id, 600.0, Phase::Idle), Err(EngineError::Validation(_))));
        assert!(ledger.place_bet(id, 500.0, Phase::Idle).is_ok());
    }

    #[test]
    fn test_cash_out_credits_floor_winnings_once() {
        let mut ledger = ledger();
        let id = ledger.register("Alice").unwrap().id;
        ledger.place_bet(id, 100.0, Phase::Countdown).unwrap();

        let receipt = ledger.cash_out(id, m(200), Phase::Active).unwrap();
        assert_eq!(receipt.winnings, 200);
        assert_eq!(receipt.balance, 1_100);
        assert!(!receipt.auto);
        assert!(ledger.get(id).unwrap().did_cash_out());

        assert!(matches!(ledger.cash_out(id, m(250), Phase::Active), Err(EngineError::State(_))));
        assert_eq!(ledger.get(id).unwrap().balance, 1_100);
    }

    #[test]
    fn test_cash_out_requires_active_round_and_bet() {
        let mut ledger = ledger();
        let id = ledger.register("Alice").unwrap().id;
        assert!(matches!(ledger.cash_out(id, m(150), Phase::Active), Err(EngineError::State(_))));

        ledger.place_bet(id, 10.0, Phase::Idle).unwrap();
        assert!(matches!(ledger.cash_out(id, m(150), Phase::Countdown), Err(EngineError::State(_))));
        assert_eq!(ledger.cash_out(PlayerId(42), m(150), Phase::Active), Err(EngineError::NotFound(PlayerId(42))));
    }

    #[test]
    fn test_set_auto_cashout_validation() {
        let mut ledger = ledger();
        let id = ledger.register("Bob").unwrap().id;
        assert!(matches!(ledger.set_auto_cashout(id, 0.99), Err(EngineError::Validation(_))));
        assert!(matches!(ledger.set_auto_cashout(id, f64::NAN), Err(EngineError::Validation(_))));
        assert!(matches!(ledger.set_auto_cashout(id, f64::INFINITY), Err(EngineError::Validation(_))));
        assert_eq!(ledger.get(id).unwrap().auto_cashout, None);

        let receipt = ledger.set_auto_cashout(id, 1.5).unwrap();
        assert_eq!(receipt.multiplier, Some(m(150)));
        assert_eq!(ledger.clear_auto_cashout(id).unwrap().multiplier, None);
        assert_eq!(ledger.get(id).unwrap().auto_cashout, None);
    }

    #[test]
    fn test_threshold_just_below_one_is_rejected() {
        let mut ledger = ledger();
        let id = ledger.register("Bob").unwrap().id;
        for threshold in [0.996, 0.995, 0.9999] {
            assert!(matches!(ledger.set_auto_cashout(id, threshold), Err(EngineError::Validation(_))));
        }
        assert_eq!(ledger.get(id).unwrap().auto_cashout, None);
        assert_eq!(ledger.set_auto_cashout(id, 1.0).unwrap().multiplier, Some(Multiplier::ONE));
    }

    #[test]
    fn test_auto_cashout_uses_tick_value_not_threshold() {
        let mut ledger = ledger();
        let bob = ledger.register("Bob").unwrap().id;
        ledger.place_bet(bob, 50.0, Phase::Countdown).unwrap();
        ledger.set_auto_cashout(bob, 1.5).unwrap();

        assert!(ledger.check_auto_cashouts(m(149)).is_empty());
        let receipts = ledger.check_auto_cashouts(m(151));
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].multiplier, m(151));
        assert_eq!(receipts[0].winnings, 75);
        assert!(receipts[0].auto);

        assert!(ledger.check_auto_cashouts(m(160)).is_empty());
    }

    #[test]
    fn test_auto_cashouts_in_registration_order() {
        let mut ledger = ledger();
        let ids: Vec<PlayerId> = ["a", "b", "c"]
            .iter()
            .map(|name| ledger.register(name).unwrap().id)
            .collect();
        for id in &ids {
            ledger.place_bet(*id, 10.0, Phase::Idle).unwrap();
            ledger.set_auto_cashout(*id, 1.1).unwrap();
        }
        let order: Vec<PlayerId> = ledger.check_auto_cashouts(m(110)).iter().map(|r| r.id).collect();
        assert_eq!(order, ids);
    }

    #[test]
    fn test_reset_round_clears_bets_keeps_threshold() {
        let mut ledger = ledger();
        let id = ledger.register("Alice").unwrap().id;
        ledger.place_bet(id, 100.0, Phase::Idle).unwrap();
        ledger.set_auto_cashout(id, 2.0).unwrap();
        ledger.cash_out(id, m(130), Phase::Active).unwrap();

        ledger.reset_round();
        let player = ledger.get(id).unwrap();
        assert_eq!(player.current_bet, 0);
        assert!(!player.did_cash_out());
        assert_eq!(player.auto_cashout, Some(m(200)));
        assert!(!ledger.has_pending_bets());
    }
}

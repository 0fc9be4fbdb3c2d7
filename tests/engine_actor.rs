//! Engine actor on real tokio timers, with the clock paused so rounds run instantly

use liftoff::config::LiftoffConfig;
use liftoff::errors::EngineError;
use liftoff::game::{
    spawn_engine_with_model, ChannelGateway, CrashModel, GameEvent, Multiplier, Phase,
};
use std::sync::Arc;
use std::time::Duration;

struct FixedCrash(Multiplier);

impl CrashModel for FixedCrash {
    fn should_crash(&mut self, current: Multiplier) -> bool {
        current >= self.0
    }
}

async fn next_named(events: &mut tokio::sync::broadcast::Receiver<GameEvent>, name: &str) -> GameEvent {
    loop {
        let event = events.recv().await.expect("gateway open");
        if event.name() == name {
            return event;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_round_runs_on_timers() {
    let config = LiftoffConfig::fast();
    let gateway = ChannelGateway::new(4_096);
    let (engine, task) = spawn_engine_with_model(
        &config,
        Box::new(FixedCrash(Multiplier::from_hundredths(150))),
        Arc::new(gateway.clone()),
        None,
    );

    let (snapshot, mut events) = engine.join(&gateway).await.unwrap();
    assert_eq!(snapshot.phase, Phase::Idle);
    assert!(snapshot.players.is_empty());

    let alice = engine.register("Alice").await.unwrap();
    engine.set_auto_cashout(alice.id, 1.2).await.unwrap();
    engine.place_bet(alice.id, 100.0).await.unwrap();

    let start = next_named(&mut events, "game_start").await;
    match start {
        GameEvent::GameStart { active_players } => {
            assert_eq!(active_players.len(), 1);
            assert_eq!(active_players[0].bet, 100);
        }
        other => panic!("unexpected event {:?}", other),
    }

    match next_named(&mut events, "player_cashed_out").await {
        GameEvent::PlayerCashedOut { winnings, auto, .. } => {
            assert_eq!(winnings, 120);
            assert!(auto);
        }
        other => panic!("unexpected event {:?}", other),
    }

    match next_named(&mut events, "game_crash").await {
        GameEvent::GameCrash { crash_point, game_result } => {
            assert_eq!(crash_point, Multiplier::from_hundredths(150));
            assert_eq!(game_result.players[0].profit, 20);
        }
        other => panic!("unexpected event {:?}", other),
    }

    // Settle delay elapses and nobody has bet again
    tokio::time::sleep(Duration::from_millis(config.round.settle_delay_ms + 50)).await;
    let status = engine.status().await.unwrap();
    assert_eq!(status.phase, Phase::Idle);
    assert_eq!(status.rounds_played, 1);

    let snapshot = engine.snapshot().await.unwrap();
    assert_eq!(snapshot.recent_games, vec![Multiplier::from_hundredths(150)]);
    assert_eq!(snapshot.players[0].balance, 1_020);

    engine.shutdown().await;
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cash_out_rejected_outside_active() {
    let config = LiftoffConfig::fast();
    let gateway = ChannelGateway::new(1_024);
    let (engine, _task) = spawn_engine_with_model(
        &config,
        Box::new(FixedCrash(Multiplier::from_hundredths(200))),
        Arc::new(gateway),
        None,
    );

    let alice = engine.register("Alice").await.unwrap();
    engine.place_bet(alice.id, 10.0).await.unwrap();
    assert!(matches!(engine.cash_out(alice.id).await, Err(EngineError::State(_))));
    assert!(matches!(
        engine.place_bet(alice.id, 10.0).await,
        Err(EngineError::State(_))
    ));
    assert!(matches!(
        engine.place_bet(alice.id, -3.0).await,
        Err(EngineError::Validation(_))
    ));
}

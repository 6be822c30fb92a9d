//! Timer tests: prepared timers start at commit, fire as admin proposals,
//! and die quietly when cancelled or superseded.

mod common;

use boardgame::{MemoryStorage, PlayerIndex, StorageProvider, Variant};
use common::*;
use std::sync::Arc;
use std::time::Duration;

async fn armed_game(
    millis: i64,
) -> (
    Arc<MemoryStorage>,
    Arc<boardgame::GameManager>,
    boardgame::Game,
) {
    let storage = Arc::new(MemoryStorage::new());
    let manager = build_manager_with_storage(storage.clone());
    let game = manager.new_game();
    game.set_up(2, Vec::new(), Variant::new()).await.unwrap();
    game.propose_move(Box::new(ArmTurnTimer { millis }), PlayerIndex::new(0))
        .await
        .unwrap();
    (storage, manager, game)
}

#[tokio::test]
async fn test_fired_timer_proposes_as_admin() {
    let (storage, manager, game) = armed_game(50).await;

    let state = game.current_state().await.unwrap();
    let timer = state.game_state().timer_prop("MoveTimer").unwrap().clone();
    assert!(timer.is_active());
    assert!(manager.timers().is_prepared(timer.id()));

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(game.version(), 2);
    let state = game.current_state().await.unwrap();
    assert_eq!(
        state
            .game_state()
            .player_index_prop("CurrentPlayer")
            .unwrap(),
        PlayerIndex::new(1)
    );
    let rec = storage.mov(game.id(), 2).unwrap();
    assert_eq!(rec.name, "AdvanceTurn");
    assert_eq!(rec.proposer, PlayerIndex::ADMIN);
    assert!(!manager.timers().is_prepared(timer.id()));
}

#[tokio::test]
async fn test_stale_timer_is_discarded() {
    let (_storage, _manager, game) = armed_game(100).await;

    // A later commit supersedes the state the timer was armed against.
    game.propose_move(
        Box::new(DrawCard {
            player: PlayerIndex::new(0),
        }),
        PlayerIndex::new(0),
    )
    .await
    .unwrap();
    assert_eq!(game.version(), 2);

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(game.version(), 2);
    let state = game.current_state().await.unwrap();
    assert_eq!(
        state
            .game_state()
            .player_index_prop("CurrentPlayer")
            .unwrap(),
        PlayerIndex::new(0)
    );
}

#[tokio::test]
async fn test_cancelled_timer_never_fires() {
    let (_storage, manager, game) = armed_game(60_000).await;

    let state = game.current_state().await.unwrap();
    let timer = state.game_state().timer_prop("MoveTimer").unwrap().clone();
    let left = manager.timers().remaining(timer.id());
    assert!(left > Duration::ZERO && left <= Duration::from_secs(60));

    game.propose_move(Box::new(CancelTurnTimer), PlayerIndex::new(0))
        .await
        .unwrap();

    let state = game.current_state().await.unwrap();
    assert!(!state.game_state().timer_prop("MoveTimer").unwrap().is_active());
    assert!(!manager.timers().is_prepared(timer.id()));
    assert_eq!(manager.timers().remaining(timer.id()), Duration::ZERO);

    // Cancelling again has nothing to cancel.
    let err = game
        .propose_move(Box::new(CancelTurnTimer), PlayerIndex::new(0))
        .await
        .unwrap_err();
    assert!(matches!(err, boardgame::EngineError::ProposalRejected(_)));
}

#[tokio::test]
async fn test_timer_ids_come_from_the_state_rng() {
    let (_storage, _manager, game) = armed_game(60_000).await;
    let state = game.current_state().await.unwrap();
    let timer = state.game_state().timer_prop("MoveTimer").unwrap();
    assert_eq!(timer.id().len(), 16);
    assert!(timer.id().chars().all(|c| c.is_ascii_hexdigit()));
}

//! Wire-format tests: states reload from storage bit-for-bit, and the
//! secret salt never leaves the process.

mod common;

use boardgame::{MemoryStorage, PlayerIndex, Variant};
use common::*;
use rand::RngCore;
use std::sync::Arc;

async fn played_game() -> (Arc<boardgame::GameManager>, boardgame::Game) {
    let manager = build_manager_with_storage(Arc::new(MemoryStorage::new()));
    let game = manager.new_game();
    game.set_up(2, Vec::new(), Variant::new()).await.unwrap();
    game.propose_move(
        Box::new(DrawCard {
            player: PlayerIndex::new(0),
        }),
        PlayerIndex::new(0),
    )
    .await
    .unwrap();
    game.propose_move(Box::new(AdvanceTurn), PlayerIndex::ADMIN)
        .await
        .unwrap();
    game.propose_move(
        Box::new(DrawCard {
            player: PlayerIndex::new(1),
        }),
        PlayerIndex::new(1),
    )
    .await
    .unwrap();
    (manager, game)
}

#[tokio::test]
async fn test_reload_matches_committed_state() {
    let (manager, game) = played_game().await;
    let orig = game.current_state().await.unwrap();

    let (record, loaded) = manager.read_only_game(game.id(), None).unwrap();
    assert_eq!(record.version, 3);
    assert_eq!(loaded.version(), 3);
    assert_eq!(loaded.num_players(), 2);
    assert!(!loaded.is_sanitized());

    assert_eq!(
        orig.game_state().stack_prop("DrawDeck").unwrap(),
        loaded.game_state().stack_prop("DrawDeck").unwrap()
    );
    for seat in 0..2 {
        assert_eq!(
            orig.player_state(seat).unwrap().stack_prop("Hand").unwrap(),
            loaded.player_state(seat).unwrap().stack_prop("Hand").unwrap()
        );
    }
    assert_eq!(
        loaded
            .game_state()
            .player_index_prop("CurrentPlayer")
            .unwrap(),
        PlayerIndex::new(1)
    );
    assert_eq!(
        loaded.game_state().enum_prop("Phase").unwrap().value(),
        PHASE_PLAY
    );

    for i in 0..NUM_CARDS {
        assert_eq!(
            orig.dynamic_values("cards").unwrap()[i]
                .int_prop("Strength")
                .unwrap(),
            loaded.dynamic_values("cards").unwrap()[i]
                .int_prop("Strength")
                .unwrap()
        );
    }

    // A reloaded state passes the same validation a commit does.
    loaded.validate(&manager).unwrap();

    // Serializing the reload reproduces the original wire form exactly.
    assert_eq!(
        orig.to_wire(&manager).unwrap(),
        loaded.to_wire(&manager).unwrap()
    );
}

#[tokio::test]
async fn test_historical_versions_stay_loadable() {
    let (manager, game) = played_game().await;
    let (_, v1) = manager.read_only_game(game.id(), Some(1)).unwrap();
    assert_eq!(v1.version(), 1);
    // At v1 only player 0 had drawn.
    assert_eq!(
        v1.player_state(0).unwrap().stack_prop("Hand").unwrap().num_components(),
        1
    );
    assert_eq!(
        v1.player_state(1).unwrap().stack_prop("Hand").unwrap().num_components(),
        0
    );
    assert!(manager.read_only_game(game.id(), Some(99)).is_err());
}

#[tokio::test]
async fn test_salt_never_serialized() {
    let (manager, game) = played_game().await;
    let state = game.current_state().await.unwrap();
    let wire = state.to_wire(&manager).unwrap();

    let mut keys: Vec<&str> = wire.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        ["Components", "Game", "Players", "Schema", "SecretMoveCount", "Version"]
    );

    let record = game.record().await.unwrap();
    assert!(!record.secret_salt.is_empty());
    assert!(!wire.to_string().contains(&record.secret_salt));
}

#[tokio::test]
async fn test_reload_reproduces_the_rng_stream() {
    let (manager, game) = played_game().await;
    let mut orig = game.current_state().await.unwrap();
    let (_, mut loaded) = manager.read_only_game(game.id(), None).unwrap();

    // The rng reseeds from (game, salt, version), so a reload continues the
    // exact stream the live state would have produced.
    for _ in 0..8 {
        assert_eq!(orig.rng_mut().next_u64(), loaded.rng_mut().next_u64());
    }
}

#[tokio::test]
async fn test_secret_counts_survive_reload() {
    let (manager, game) = played_game().await;
    let orig = game.current_state().await.unwrap();
    let (_, loaded) = manager.read_only_game(game.id(), None).unwrap();

    // Setup shuffled the draw deck once, so every card carries a nonzero
    // secret move count; ids derive from it and must match after reload.
    let orig_deck = orig.game_state().stack_prop("DrawDeck").unwrap();
    let loaded_deck = loaded.game_state().stack_prop("DrawDeck").unwrap();
    assert!(loaded_deck.components().all(|s| s.secret_count > 0));
    assert_eq!(orig.component_ids(orig_deck), loaded.component_ids(loaded_deck));
}

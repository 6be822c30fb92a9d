//! Benchmarks for the hot state operations: the scratchpad clone every
//! proposed move pays, wire serialization at commit, and sanitization.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use boardgame::{PlayerIndex, State, Variant};
use tokio::runtime::Runtime;

#[path = "../tests/common/mod.rs"]
mod common;

use common::{DrawCard, HAND_LIMIT};

/// Play a four-player game partway in, so the state has hands, a depleted
/// deck, and dynamic values worth copying.
fn mid_game_state(rt: &Runtime, manager: &std::sync::Arc<boardgame::GameManager>) -> State {
    rt.block_on(async {
        let game = manager.new_game();
        game.set_up(4, Vec::new(), Variant::new()).await.unwrap();
        for seat in 0..2 {
            for _ in 0..HAND_LIMIT {
                game.propose_move(
                    Box::new(DrawCard {
                        player: PlayerIndex::new(seat),
                    }),
                    PlayerIndex::new(seat),
                )
                .await
                .unwrap();
            }
        }
        game.current_state().await.unwrap()
    })
}

fn bench_state_ops(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let manager = common::build_manager();
    let state = mid_game_state(&rt, &manager);

    c.bench_function("state_clone", |b| {
        b.iter(|| black_box(state.clone()));
    });

    c.bench_function("state_to_bytes", |b| {
        b.iter(|| black_box(state.to_bytes(&manager).unwrap()));
    });

    c.bench_function("state_sanitize_player", |b| {
        b.iter(|| black_box(state.sanitize(&manager, PlayerIndex::new(0)).unwrap()));
    });

    c.bench_function("state_round_trip", |b| {
        let game_id = state.game_id().to_string();
        let bytes = state.to_bytes(&manager).unwrap();
        b.iter(|| {
            black_box(
                manager
                    .state_from_bytes(&bytes, &game_id, "bench-salt")
                    .unwrap(),
            )
        });
    });
}

criterion_group!(benches, bench_state_ops);
criterion_main!(benches);

//! Performance benchmarks for the hot paths of a round

use server::bomb::{detonate_due, Bomb};
use server::grid::{GameMap, MapLayout};
use server::registry::PlayerRegistry;
use shared::{Command, MatchEvent, PlayerId, Position};
use std::time::Instant;

fn arena(width: u16, height: u16) -> GameMap {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    let mut rng = StdRng::seed_from_u64(7);
    GameMap::generate(
        width,
        height,
        MapLayout {
            wall_density: 0.3,
            special_density: 0.05,
        },
        &mut rng,
    )
}

/// Benchmarks command parsing
#[test]
fn benchmark_command_parsing() {
    let inputs = ["u", "DOWN", " l ", "right", "b", "", "wait", "q", "dance"];

    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        let _ = Command::parse(inputs[i % inputs.len()]);
    }

    let duration = start.elapsed();
    println!(
        "Command parsing: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // Should complete in under 500ms for 100k iterations
    assert!(duration.as_millis() < 500);
}

/// Benchmarks a full round of detonations on a large map
#[test]
fn benchmark_chain_detonation() {
    let iterations = 100;
    let start = Instant::now();

    for _ in 0..iterations {
        let mut map = arena(101, 101);
        let mut registry = PlayerRegistry::new(1, 1);
        let mut bombs: Vec<Bomb> = (0..101)
            .step_by(2)
            .map(|x| Bomb::new(PlayerId(1), Position::new(x, 0), 1))
            .collect();

        let explosions = detonate_due(&mut bombs, &mut map, &mut registry, 3);
        assert!(!explosions.is_empty());
        assert!(bombs.is_empty());
    }

    let duration = start.elapsed();
    println!(
        "Chain detonation: {} rounds in {:?} ({:.2} µs/round)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5s for 100 rounds on a 101x101 map
    assert!(duration.as_secs() < 5);
}

/// Benchmarks rendering and serializing the per-round snapshot
#[test]
fn benchmark_round_snapshot() {
    let map = arena(50, 50);
    let bombs = vec![Position::new(0, 0), Position::new(20, 20)];

    let iterations = 1_000;
    let start = Instant::now();

    for round in 0..iterations {
        let event = MatchEvent::Round {
            game: 1,
            round,
            map: map.render(&bombs),
        };
        let line = event.to_line().unwrap();
        assert!(line.ends_with('\n'));
    }

    let duration = start.elapsed();
    println!(
        "Round snapshot: {} iterations in {:?} ({:.2} µs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 2s for 1k iterations
    assert!(duration.as_secs() < 2);
}

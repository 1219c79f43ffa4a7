//! Performance benchmarks for the per-tick and per-frame hot paths

use client::buffer::SnapshotBuffer;
use client::interpolation::sample;
use server::config::WorldConfig;
use server::world::World;
use shared::{CoinState, Datagram, PlayerState, Vec2, WorldSnapshot};
use std::time::{Duration, Instant};

fn busy_snapshot(sequence_number: u64, server_time: u64) -> WorldSnapshot {
    WorldSnapshot {
        sequence_number,
        server_time,
        players: (0..8)
            .map(|id| PlayerState {
                id,
                x: 10.0 * id as f32 + sequence_number as f32,
                y: 20.0,
                score: id,
            })
            .collect(),
        coins: (0..64)
            .map(|id| CoinState {
                id,
                x: 5.0 * id as f32,
                y: 300.0,
                active: id % 3 != 0,
            })
            .collect(),
    }
}

/// Benchmarks one simulation step with a full arena
#[test]
fn benchmark_world_step() {
    let config = WorldConfig {
        coin_count: 64,
        max_coins: 64,
        ..WorldConfig::default()
    };
    let mut world = World::new(config, 0..8, Some(3));

    let iterations = 10_000;
    let start = Instant::now();

    for i in 0..iterations {
        let snapshot = world.step(
            |id| {
                if (id as usize + i) % 2 == 0 {
                    Vec2::new(1.0, 0.0)
                } else {
                    Vec2::new(0.0, -1.0)
                }
            },
            1.0 / 30.0,
            i as u64,
        );
        assert_eq!(snapshot.sequence_number, i as u64 + 1);
    }

    let duration = start.elapsed();
    println!(
        "World step: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks snapshot encode and decode for the datagram path
#[test]
fn benchmark_snapshot_codec() {
    let snapshot = busy_snapshot(1, 1_000);

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let bytes = Datagram::Snapshot(snapshot.clone()).encode().unwrap();
        let decoded = Datagram::decode(&bytes).unwrap();
        assert!(matches!(decoded, Datagram::Snapshot(_)));
    }

    let duration = start.elapsed();
    println!(
        "Snapshot codec: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks sampling a full buffer once per frame
#[test]
fn benchmark_interpolation_sample() {
    let mut buffer = SnapshotBuffer::new(Duration::from_secs(60), 200);
    for i in 0..200 {
        buffer.insert(busy_snapshot(i, 1_000 + i * 33), 1_100 + i * 33);
    }

    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        let target = 1_000 + (i as u64 * 7) % (200 * 33);
        let frame = sample(&buffer, target, Some(0)).unwrap();
        assert_eq!(frame.players.len(), 8);
    }

    let duration = start.elapsed();
    println!(
        "Interpolation sample: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 3000);
}

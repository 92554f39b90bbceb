//! Criterion benchmarks for the per-key symbol and action pools.
//!
//! Growing one key past the free tail of a pool forces a rebuild that copies
//! every other key; these benchmarks keep that path honest.
//!
//! Run with:
//! ```bash
//! cargo bench --package xkb-core --bench pool_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use xkb_core::keymap::default::default_keymap;
use xkb_core::keymap::{map_parts, AtomTable, Keymap};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn make_default_keymap() -> Keymap {
    let mut atoms = AtomTable::new();
    default_keymap(&mut atoms).expect("built-in keymap must build")
}

fn make_empty_keymap() -> Keymap {
    let mut keymap = Keymap::new(8, 255).expect("legal range");
    keymap
        .allocate_client_map(map_parts::KEY_SYMS | map_parts::KEY_TYPES, 4)
        .expect("client map");
    keymap
        .allocate_server_map(map_parts::KEY_ACTIONS, 64)
        .expect("server map");
    keymap
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

/// Fills every key of an empty keymap with `width` symbols.
fn bench_fill_symbols(c: &mut Criterion) {
    let mut group = c.benchmark_group("resize_key_symbols/fill");
    for width in [1usize, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::new("width", width), &width, |b, &width| {
            b.iter_batched(
                make_empty_keymap,
                |mut keymap| {
                    for key in 8..=255u8 {
                        keymap
                            .resize_key_symbols(black_box(key), width)
                            .expect("resize must succeed");
                    }
                    keymap
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

/// Grows a single key in a full keymap, forcing a pool rebuild.
fn bench_rebuild_symbols(c: &mut Criterion) {
    c.bench_function("resize_key_symbols/rebuild", |b| {
        b.iter_batched(
            make_default_keymap,
            |mut keymap| {
                keymap
                    .resize_key_symbols(black_box(38), 64)
                    .expect("resize must succeed");
                keymap
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

/// Grows a single key's actions in a full keymap.
fn bench_rebuild_actions(c: &mut Criterion) {
    c.bench_function("resize_key_actions/rebuild", |b| {
        b.iter_batched(
            make_default_keymap,
            |mut keymap| {
                keymap
                    .resize_key_actions(black_box(50), 2)
                    .expect("resize must succeed");
                keymap
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_fill_symbols,
    bench_rebuild_symbols,
    bench_rebuild_actions
);
criterion_main!(benches);

//! Criterion benchmarks for keyboard state derivation.
//!
//! `compute_derived_state` and the indicator pass run on every key press.
//!
//! Run with:
//! ```bash
//! cargo bench --package xkb-core --bench state_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use xkb_core::keymap::default::default_keymap;
use xkb_core::keymap::{mods, AtomTable};
use xkb_core::state::{resolve_group, state_changed_flags, state_parts};
use xkb_core::{Changes, KeyboardState, LedRegistry};

fn bench_compute_derived_state(c: &mut Criterion) {
    let mut atoms = AtomTable::new();
    let keymap = default_keymap(&mut atoms).expect("built-in keymap must build");
    let mut state = KeyboardState {
        base_mods: mods::SHIFT,
        locked_mods: mods::LOCK | mods::MOD2,
        latched_group: 1,
        ..KeyboardState::new()
    };

    c.bench_function("compute_derived_state", |b| {
        b.iter(|| {
            state.compute_derived_state(black_box(&keymap));
            black_box(state.mods)
        })
    });
}

fn bench_resolve_group(c: &mut Criterion) {
    let mut atoms = AtomTable::new();
    let keymap = default_keymap(&mut atoms).expect("built-in keymap must build");
    c.bench_function("resolve_group", |b| {
        b.iter(|| {
            (-8..8).fold(0u32, |acc, g| acc + u32::from(resolve_group(black_box(g), &keymap.ctrls)))
        })
    });
}

/// One Caps Lock toggle: derive, diff and update indicators.
fn bench_lock_and_update_indicators(c: &mut Criterion) {
    let mut atoms = AtomTable::new();
    let mut keymap = default_keymap(&mut atoms).expect("built-in keymap must build");
    let mut registry = LedRegistry::new();
    registry.default_led(&mut keymap);
    let mut state = KeyboardState::new();

    c.bench_function("caps_lock_toggle", |b| {
        b.iter(|| {
            let old = state;
            state.locked_mods ^= mods::LOCK;
            state.compute_derived_state(&keymap);
            let changed = state_changed_flags(&old, &state);
            let mut changes = Changes::default();
            registry.update_all_device_indicators(
                changed & state_parts::ALL,
                0,
                &mut keymap,
                &state,
                &mut changes,
            );
            black_box(changes)
        })
    });
}

criterion_group!(
    benches,
    bench_compute_derived_state,
    bench_resolve_group,
    bench_lock_and_update_indicators
);
criterion_main!(benches);

//! Criterion benchmarks for keysym and button translation.
//!
//! Every captured key event goes through `key_from_keysym`, so the common
//! ranges (Latin-1, miscellany) must stay a handful of instructions and the
//! table-driven ranges (Internet keys, legacy charsets) a single lookup.
//!
//! Run with:
//! ```bash
//! cargo bench --package kvm-core --bench keymap_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kvm_core::{button_from_x, key_from_keysym, ButtonMap, KeySym, ModifierMap};

// ── Representative keysyms for benchmarking ───────────────────────────────────

/// A mix of keysyms from every translation range.
const BENCH_KEYSYMS: &[KeySym] = &[
    0x0061,      // a
    0x007A,      // z
    0x00E9,      // eacute
    0xFF0D,      // Return
    0xFF1B,      // Escape
    0xFF08,      // BackSpace
    0xFF09,      // Tab
    0xFFBE,      // F1
    0xFFE1,      // Shift_L
    0xFFE3,      // Control_L
    0xFF51,      // Left
    0xFE20,      // ISO_Left_Tab
    0x1008_FF12, // XF86AudioMute
    0x1008_FF26, // XF86Back
    0x01B3,      // lstroke
    0x06C1,      // Cyrillic_a
    0x07E1,      // Greek_alpha
    0x0CE0,      // hebrew_aleph
    0x0100_20AC, // Unicode EuroSign
    0x0F12,      // unmapped
];

// ── Benchmarks: keysym translation ────────────────────────────────────────────

fn bench_key_from_keysym(c: &mut Criterion) {
    let mut group = c.benchmark_group("keymap_x11");

    // Fast paths: no table involved.
    group.bench_with_input(BenchmarkId::new("key_from_keysym", "latin1"), &0x0061, |b, &sym| {
        b.iter(|| key_from_keysym(black_box(sym)))
    });

    group.bench_with_input(
        BenchmarkId::new("key_from_keysym", "miscellany"),
        &0xFF0D,
        |b, &sym| b.iter(|| key_from_keysym(black_box(sym))),
    );

    // Table search through the legacy charset table.
    group.bench_with_input(BenchmarkId::new("key_from_keysym", "latin2"), &0x01B3, |b, &sym| {
        b.iter(|| key_from_keysym(black_box(sym)))
    });

    group.bench_function("key_from_keysym_batch_20", |b| {
        b.iter(|| {
            BENCH_KEYSYMS
                .iter()
                .map(|&sym| key_from_keysym(black_box(sym)))
                .collect::<Vec<_>>()
        })
    });

    group.finish();
}

// ── Benchmarks: modifier and button maps ──────────────────────────────────────

fn bench_modifier_map(c: &mut Criterion) {
    let map = ModifierMap::default();
    c.bench_function("modifier_map_control_alt", |b| {
        b.iter(|| map.map_modifier(black_box(0x000C)))
    });
}

fn bench_button_round_trip(c: &mut Criterion) {
    let map = ButtonMap::identity(16);
    c.bench_function("button_round_trip", |b| {
        b.iter(|| map.to_x(button_from_x(black_box(8))))
    });
}

criterion_group!(
    benches,
    bench_key_from_keysym,
    bench_modifier_map,
    bench_button_round_trip,
);
criterion_main!(benches);

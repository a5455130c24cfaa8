// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::rc::Rc;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use kurbo::{Affine, Rect, Size};
use understory_damage::{
    ClipContext, Comparator, DamageContext, FrameSnapshot, Layer, LayerKind, Mutator,
    ReadbackDelegate,
};

const CANVAS: Size = Size::new(1920.0, 1080.0);

struct Tile {
    bounds: Rect,
    color: u32,
}

impl Layer for Tile {
    fn paint_bounds(&self) -> Rect {
        self.bounds
    }
}

const TILE: Comparator<Tile> = Comparator::new(LayerKind::new(0), |a, b| a.color == b.color);

#[derive(Clone)]
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u32(&mut self) -> u32 {
        // Numerical Recipes LCG parameters.
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.0 >> 32) as u32
    }

    fn gen_range_f64(&mut self, upper: f64) -> f64 {
        f64::from(self.next_u32()) / f64::from(u32::MAX) * upper
    }
}

fn build_tiles(n: usize, seed: u64) -> Vec<Rc<Tile>> {
    let mut rng = Lcg::new(seed);
    (0..n)
        .map(|i| {
            let x = rng.gen_range_f64(CANVAS.width - 64.0);
            let y = rng.gen_range_f64(CANVAS.height - 64.0);
            let w = 8.0 + rng.gen_range_f64(56.0);
            let h = 8.0 + rng.gen_range_f64(56.0);
            Rc::new(Tile {
                bounds: Rect::new(x, y, x + w, y + h),
                color: i as u32,
            })
        })
        .collect()
}

fn record(
    ctx: &mut DamageContext<Tile>,
    previous: Option<FrameSnapshot<Tile>>,
    tiles: &[Rc<Tile>],
    clip: &ClipContext,
) -> FrameSnapshot<Tile> {
    ctx.init_frame(CANVAS, previous);
    for tile in tiles {
        ctx.add_contribution(tile, TILE, Affine::IDENTITY, clip);
    }
    ctx.finish_frame().snapshot
}

fn bench_damage(c: &mut Criterion) {
    let mut group = c.benchmark_group("understory_damage");
    group.sample_size(50);

    let plain = ClipContext::new(Rect::from_origin_size((0.0, 0.0), CANVAS));
    let nested = plain
        .push(Mutator::ClipRect(Rect::new(0.0, 0.0, 1600.0, 900.0)))
        .push(Mutator::Opacity(200))
        .push(Mutator::Transform(Affine::scale(1.0)));

    for &n in &[256_usize, 4_096] {
        let tiles = build_tiles(n, 0xDA3A_0000_0000_0001);

        for (name, clip) in [("plain", &plain), ("nested", &nested)] {
            group.bench_function(format!("unchanged_frame({name},n={n})"), |b| {
                let mut ctx = DamageContext::new();
                b.iter_batched(
                    || record(&mut DamageContext::new(), None, &tiles, clip),
                    |previous| {
                        let snapshot = record(&mut ctx, Some(previous), &tiles, clip);
                        black_box(snapshot);
                    },
                    BatchSize::LargeInput,
                );
            });
        }

        group.bench_function(format!("one_tile_changed(n={n})"), |b| {
            let mut ctx = DamageContext::new();
            let mut changed = tiles.clone();
            let last = changed.len() - 1;
            changed[last] = Rc::new(Tile {
                bounds: changed[last].bounds,
                color: u32::MAX,
            });
            b.iter_batched(
                || record(&mut DamageContext::new(), None, &tiles, &plain),
                |previous| {
                    ctx.init_frame(CANVAS, Some(previous));
                    for tile in &changed {
                        ctx.add_contribution(tile, TILE, Affine::IDENTITY, &plain);
                    }
                    black_box(ctx.finish_frame().area);
                },
                BatchSize::LargeInput,
            );
        });

        group.bench_function(format!("reversed_order(n={n})"), |b| {
            let mut ctx = DamageContext::new();
            let reversed: Vec<_> = tiles.iter().rev().cloned().collect();
            b.iter_batched(
                || record(&mut DamageContext::new(), None, &tiles, &plain),
                |previous| {
                    ctx.init_frame(CANVAS, Some(previous));
                    for tile in &reversed {
                        ctx.add_contribution(tile, TILE, Affine::IDENTITY, &plain);
                    }
                    black_box(ctx.finish_frame().area);
                },
                BatchSize::LargeInput,
            );
        });

        group.bench_function(format!("readback_negotiation(n={n},delegates=16)"), |b| {
            let mut ctx = DamageContext::new();
            let mut changed = tiles.clone();
            changed[0] = Rc::new(Tile {
                bounds: changed[0].bounds,
                color: u32::MAX,
            });
            let stride = n / 16;
            b.iter_batched(
                || record(&mut DamageContext::new(), None, &tiles, &plain),
                |previous| {
                    ctx.init_frame(CANVAS, Some(previous));
                    for (i, tile) in changed.iter().enumerate() {
                        let handle = ctx.add_contribution(tile, TILE, Affine::IDENTITY, &plain);
                        if i % stride == stride - 1 {
                            let readback = tile.bounds.inflate(32.0, 32.0);
                            let delegate =
                                ReadbackDelegate::from_handle(&handle, &ctx, readback, false);
                            handle.add_delegate(&mut ctx, Rc::new(delegate));
                        }
                    }
                    black_box(ctx.finish_frame().convergence);
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_damage);
criterion_main!(benches);

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;
use tilecodec::formats::tiles::{read_tiles, write_tiles};
use tilecodec::formats::world::{decode_world, encode_world};
use tilecodec::{Tile, TileFormat, TileGrid, TileProperties, VersionCatalog, World};

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Layered terrain: long vertical runs, a band of noise near the surface.
fn make_grid(width: u32, height: u32) -> TileGrid {
    let mut grid = TileGrid::new(width, height);
    let mut counter = 7u32;
    for x in 0..width {
        for y in height / 3..height {
            counter = counter.wrapping_mul(1103515245).wrapping_add(12345);
            let tile = if y < height / 3 + 8 && counter % 3 == 0 {
                Tile::block(2).with_wall(2)
            } else if y > height / 2 {
                Tile::block(1).with_wall(1)
            } else {
                Tile::block(0).with_wall(2)
            };
            grid.set(x, y, tile);
        }
    }
    grid
}

// ── Benchmarks ───────────────────────────────────────────────────────────────

fn bench_tiles(c: &mut Criterion) {
    let catalog = VersionCatalog::builtin().unwrap();
    let props = TileProperties::builtin().unwrap();
    let mut group = c.benchmark_group("tiles");
    group.measurement_time(Duration::from_secs(3));

    let grid = make_grid(400, 300);
    for &version in &[71, 279] {
        let format = TileFormat::new(catalog.resolve(version).unwrap(), &props);
        group.bench_function(&format!("encode_{}", version), |b| {
            b.iter(|| {
                let mut out = Vec::new();
                write_tiles(&mut out, &grid, &format).unwrap();
                black_box(out);
            });
        });

        let mut bytes = Vec::new();
        write_tiles(&mut bytes, &grid, &format).unwrap();
        group.bench_function(&format!("decode_{}", version), |b| {
            b.iter(|| {
                let decoded = read_tiles(&mut bytes.as_slice(), 400, 300, &format).unwrap();
                black_box(decoded);
            });
        });
    }
    group.finish();
}

fn bench_world(c: &mut Criterion) {
    let catalog = VersionCatalog::builtin().unwrap();
    let props = TileProperties::builtin().unwrap();
    let format = TileFormat::new(catalog.newest().unwrap(), &props);
    let mut group = c.benchmark_group("world");
    group.measurement_time(Duration::from_secs(3));

    let mut world = World::new("bench", 400, 300, format.version());
    world.grid = make_grid(400, 300);
    let bytes = encode_world(&world, &format).unwrap();

    group.bench_function("encode_400x300", |b| {
        b.iter(|| black_box(encode_world(&world, &format).unwrap()));
    });
    group.bench_function("decode_400x300", |b| {
        b.iter(|| black_box(decode_world(&bytes, &catalog, &props).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, bench_tiles, bench_world);
criterion_main!(benches);

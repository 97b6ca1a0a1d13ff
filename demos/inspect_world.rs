use std::collections::BTreeMap;
use tilecodec::{TileProperties, VersionCatalog, World};
use tracing_subscriber::EnvFilter;

fn main() {
    // Codec logging goes through `log`; the subscriber picks it up.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tilecodec=info".parse().unwrap()))
        .init();

    let path = std::env::args()
        .nth(1)
        .expect("Usage: inspect_world <path_to_wld>");
    let catalog = VersionCatalog::builtin().expect("Failed to load version catalog");
    let props = TileProperties::builtin().expect("Failed to load tile properties");

    let data = std::fs::read(&path).expect("Failed to read file");
    println!("=== World: {} ===", path);
    println!("File size: {} bytes", data.len());

    let world = World::load(&path, &catalog, &props).expect("Failed to load world");
    let record = catalog.resolve(world.version).expect("Empty catalog");
    println!(
        "Name: {}  (id {}, seed '{}')",
        world.header.name, world.header.world_id, world.header.seed
    );
    println!(
        "Version: {} (read as {} / {})",
        world.version, record.save_version, record.release
    );
    println!("Size: {}x{}", world.width(), world.height());
    println!("Spawn: {:?}  Hard mode: {}", world.header.spawn, world.header.hard_mode);

    let mut tile_counts: BTreeMap<u16, usize> = BTreeMap::new();
    for (_, _, tile) in world.grid.iter().filter(|(_, _, t)| t.active) {
        *tile_counts.entry(tile.tile_type).or_insert(0) += 1;
    }
    let mut sorted: Vec<_> = tile_counts.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(a.1));
    println!(
        "\nTile types ({} types, {} active cells):",
        sorted.len(),
        world.grid.active_count()
    );
    for (tile_type, count) in sorted.iter().take(20) {
        let label = world
            .overlay
            .as_ref()
            .and_then(|o| o.tile_entry(**tile_type))
            .map(|e| format!(" ({}:{})", e.mod_name, e.name))
            .unwrap_or_default();
        println!("  {:>5}{}: {}", tile_type, label, count);
    }

    println!("\nChests: {}", world.chests.len());
    for chest in world.chests.iter().take(10) {
        println!(
            "  ({}, {}) '{}' {} item stack(s)",
            chest.x,
            chest.y,
            chest.name,
            chest.occupied_slots()
        );
    }
    println!("Signs: {}", world.signs.len());
    println!("NPCs: {}", world.npcs.len());
    for npc in &world.npcs {
        println!("  {} (sprite {}) at {:?}", npc.name, npc.sprite_id, npc.position);
    }
    println!("Tile entities: {}", world.tile_entities.len());

    match &world.overlay {
        Some(overlay) => println!(
            "\nOverlay: {} mod tile(s), {} mod wall(s), {} tile and {} wall cell(s), {:?}",
            overlay.tiles.len(),
            overlay.walls.len(),
            overlay.cells.tiles.len(),
            overlay.cells.walls.len(),
            overlay.encoding
        ),
        None => println!("\nOverlay: none"),
    }
}

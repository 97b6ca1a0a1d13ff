use tempfile::tempdir;
use tilecodec::formats::registry;
use tilecodec::formats::schematic::{peek_tag, VERSION_OFFSET};
use tilecodec::{
    ClipboardBuffer, Error, Sign, Tile, TileFormat, TileProperties, VersionCatalog, World,
};

fn tables() -> (VersionCatalog, TileProperties) {
    (
        VersionCatalog::builtin().unwrap(),
        TileProperties::builtin().unwrap(),
    )
}

fn house() -> World {
    let mut world = World::new("Village", 30, 15, 279);
    for x in 0..30 {
        world.grid.set(x, 14, Tile::block(1));
    }
    for y in 8..14 {
        world.grid.set(4, y, Tile::block(30));
        world.grid.set(10, y, Tile::block(30));
    }
    world.grid.set(7, 13, Tile::block(55));
    world.signs.push(Sign::new(7, 13, "Home"));
    world
}

#[test]
fn test_registry_order() {
    assert_eq!(
        registry().list_layouts(),
        vec!["current", "packed", "sequential", "primitive"]
    );
}

#[test]
fn test_clipboard_file_round_trip() {
    let (catalog, props) = tables();
    let format = TileFormat::new(catalog.newest().unwrap(), &props);
    let dir = tempdir().unwrap();
    let path = dir.path().join("house.clip");

    let world = house();
    let buffer = ClipboardBuffer::copy_from(&world, 4, 8, 7, 7, &format).unwrap();
    buffer.save_to_path(&path, &format).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(peek_tag(&bytes).unwrap(), 279 + VERSION_OFFSET);

    let loaded = ClipboardBuffer::load_from_path(&path, &catalog, &props).unwrap();
    assert_eq!(loaded.name, "Village");
    assert_eq!((loaded.width(), loaded.height()), (7, 7));
    assert_eq!(loaded.grid, buffer.grid);
    assert_eq!(loaded.signs, vec![Sign::new(3, 5, "Home")]);
}

#[test]
fn test_copy_then_paste_elsewhere() {
    let (catalog, props) = tables();
    let format = TileFormat::new(catalog.newest().unwrap(), &props);
    let mut world = house();
    let buffer = ClipboardBuffer::copy_from(&world, 4, 8, 7, 7, &format).unwrap();

    buffer.paste_into(&mut world, 18, 8).unwrap();
    for y in 8..15 {
        assert_eq!(world.grid.get(18, y), world.grid.get(4, y));
        assert_eq!(world.grid.get(24, y), world.grid.get(10, y));
    }
    assert_eq!(world.signs.len(), 2);
    assert!(world.signs.contains(&Sign::new(21, 13, "Home")));
}

#[test]
fn test_saving_for_older_version() {
    let (catalog, props) = tables();
    let newest = TileFormat::new(catalog.newest().unwrap(), &props);
    let older = TileFormat::new(catalog.resolve(102).unwrap(), &props);

    let mut buffer = ClipboardBuffer::copy_from(&house(), 0, 8, 12, 7, &newest).unwrap();
    buffer.grid.set(1, 1, Tile::block(650));
    let bytes = buffer.to_bytes(&older).unwrap();
    assert_eq!(peek_tag(&bytes).unwrap(), 102 + VERSION_OFFSET);

    let loaded = ClipboardBuffer::load(&bytes, &catalog, &props).unwrap();
    assert_eq!(loaded.version, 102);
    assert!(!loaded.grid.get(1, 1).unwrap().active);
    assert_eq!(loaded.frame_important.len(), older.tile_limit() as usize);

    // The current layout starts at the packed era.
    let sequential = TileFormat::new(catalog.resolve(71).unwrap(), &props);
    assert!(matches!(
        buffer.to_bytes(&sequential),
        Err(Error::UnsupportedSchematic(_))
    ));
}

#[test]
fn test_truncated_buffer_is_unsupported() {
    let (catalog, props) = tables();
    let format = TileFormat::new(catalog.newest().unwrap(), &props);
    let buffer = ClipboardBuffer::copy_from(&house(), 0, 0, 30, 15, &format).unwrap();
    let bytes = buffer.to_bytes(&format).unwrap();
    let err = ClipboardBuffer::load(&bytes[..bytes.len() - 4], &catalog, &props).unwrap_err();
    assert!(matches!(err, Error::UnsupportedSchematic(_)));
}

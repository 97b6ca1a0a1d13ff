use tilecodec::{Features, ReleaseId, TileFormat, TileProperties, VersionCatalog};

#[test]
fn test_version_past_newest_clamps() {
    let catalog = VersionCatalog::builtin().unwrap();
    let newest = catalog.newest().unwrap();
    assert_eq!(catalog.resolve(newest.save_version + 1).unwrap(), newest);
    assert_eq!(catalog.resolve(u32::MAX).unwrap(), newest);
}

#[test]
fn test_records_are_ordered_and_grow() {
    let catalog = VersionCatalog::builtin().unwrap();
    for pair in catalog.records().windows(2) {
        assert!(pair[0].save_version <= pair[1].save_version);
        assert!(pair[0].release < pair[1].release);
        assert!(pair[0].max_tile_id <= pair[1].max_tile_id);
        assert_eq!(pair[1].frame_table().len(), pair[1].max_tile_id as usize);
    }
}

#[test]
fn test_release_lookup_from_table() {
    let catalog = VersionCatalog::builtin().unwrap();
    let release: ReleaseId = "1.4.4.9".parse().unwrap();
    assert_eq!(catalog.save_version_for(&release), Some(279));
    // Known only through the release map.
    assert_eq!(catalog.save_version_for(&"1.4.0.1".parse().unwrap()), Some(225));
    // Between records: the newest release not newer than it.
    let record = catalog
        .resolve_for_release(&"1.4.0.1".parse().unwrap())
        .unwrap();
    assert_eq!(record.save_version, 194);
}

#[test]
fn test_external_tables_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let versions = dir.path().join("versions.json");
    let tiles = dir.path().join("tiles.json");
    std::fs::write(
        &versions,
        r#"{
            "frame_important": [[3, 5]],
            "versions": [
                {"save_version": 102, "release": "2.0", "max_tile_id": 8, "max_wall_id": 4,
                 "max_npc_id": 10, "max_item_id": 50}
            ]
        }"#,
    )
    .unwrap();
    std::fs::write(&tiles, r#"{"slopes": [1], "chests": [[5, 6]]}"#).unwrap();

    let catalog = VersionCatalog::from_path(&versions).unwrap();
    let props = TileProperties::from_path(&tiles).unwrap();
    let format = TileFormat::for_declared(150, &catalog, &props).unwrap();
    assert_eq!(format.version(), 102);
    assert_eq!(format.tile_limit(), 8);
    assert!(format.is_frame_important(4));
    assert!(format.supports_slope(1));
    assert!(props.is_chest(6));
    assert!(!props.is_sign(55));
    assert!(format.features().is_packed());
    assert!(!Features(format.version()).has_tile_entities());
}

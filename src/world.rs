//! In-memory world plus file-level load and save.

use crate::catalog::{ReleaseId, TileFormat, TileProperties, VersionCatalog, VersionRecord};
use crate::entity::{Chest, Npc, Sign, TileEntity};
use crate::error::Result;
use crate::formats::world::{self as codec, WorldBounds, WorldHeader};
use crate::grid::TileGrid;
use crate::overlay::{self, OverlayData, OverlayEncoding};
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Pixels per tile, used for the header's world bounds.
const TILE_PIXELS: i32 = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct World {
    /// Save version the world was read from (or created for). May exceed
    /// every catalog record.
    pub version: u32,
    pub header: WorldHeader,
    pub grid: TileGrid,
    pub chests: Vec<Chest>,
    pub signs: Vec<Sign>,
    pub npcs: Vec<Npc>,
    pub tile_entities: Vec<TileEntity>,
    /// Tile types declared by the file's frame table, 0 when the world did
    /// not come from a file. Native IDs below this stay out of the virtual
    /// range.
    pub native_tile_types: u16,
    /// Mod content spliced into `grid` under virtual IDs.
    pub overlay: Option<OverlayData>,
}

/// How [`World::save`] writes a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveOptions {
    /// Save version to write. Ignored when `release` is set.
    #[serde(default)]
    pub target_version: Option<u32>,
    /// Release name to write, resolved to the closest known release.
    #[serde(default)]
    pub release: Option<ReleaseId>,
    /// Copy the file being replaced to `<path>.bak` first.
    #[serde(default = "default_true")]
    pub backup: bool,
    #[serde(default)]
    pub overlay_encoding: OverlayEncoding,
    /// Gzip level for the sidecar, 0 to 9.
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

fn default_true() -> bool {
    true
}

fn default_compression_level() -> u32 {
    6
}

impl Default for SaveOptions {
    fn default() -> Self {
        SaveOptions {
            target_version: None,
            release: None,
            backup: true,
            overlay_encoding: OverlayEncoding::default(),
            compression_level: default_compression_level(),
        }
    }
}

impl SaveOptions {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn for_version(version: u32) -> Self {
        SaveOptions {
            target_version: Some(version),
            ..Default::default()
        }
    }

    pub fn for_release(release: ReleaseId) -> Self {
        SaveOptions {
            release: Some(release),
            ..Default::default()
        }
    }

    /// Record whose layout a world of save version `native` is written in.
    pub fn resolve_target<'c>(&self, native: u32, catalog: &'c VersionCatalog) -> Result<&'c VersionRecord> {
        match (&self.release, self.target_version) {
            (Some(release), _) => catalog.resolve_for_release(release),
            (None, Some(version)) => catalog.resolve(version),
            (None, None) => catalog.resolve(native),
        }
    }

    fn compression(&self) -> Compression {
        Compression::new(self.compression_level.min(9))
    }
}

/// `world.wld` -> `world.wld.bak` and the like.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

pub fn backup_path(path: &Path) -> PathBuf {
    with_suffix(path, ".bak")
}

/// Writes `bytes` next to `path` and returns the temporary file.
fn stage(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    let tmp = with_suffix(path, ".tmp");
    if let Err(e) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(tmp)
}

/// Renames a staged file over `path`.
fn commit(tmp: &Path, path: &Path) -> Result<()> {
    if let Err(e) = fs::rename(tmp, path) {
        let _ = fs::remove_file(tmp);
        return Err(e.into());
    }
    Ok(())
}

fn back_up(path: &Path) -> Result<()> {
    if path.exists() {
        let backup = backup_path(path);
        fs::copy(path, &backup)?;
        log::debug!("backed up {} to {}", path.display(), backup.display());
    }
    Ok(())
}

impl World {
    pub fn new(name: impl Into<String>, width: u32, height: u32, version: u32) -> Self {
        let header = WorldHeader {
            name: name.into(),
            bounds: WorldBounds {
                left: 0,
                right: width as i32 * TILE_PIXELS,
                top: 0,
                bottom: height as i32 * TILE_PIXELS,
            },
            spawn: (width as i32 / 2, height as i32 / 3),
            ground_level: (height / 3) as f64,
            rock_level: (height / 2) as f64,
            day_time: true,
            ..Default::default()
        };
        World {
            version,
            header,
            grid: TileGrid::new(width, height),
            chests: Vec::new(),
            signs: Vec::new(),
            npcs: Vec::new(),
            tile_entities: Vec::new(),
            native_tile_types: 0,
            overlay: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.grid.width()
    }

    pub fn height(&self) -> u32 {
        self.grid.height()
    }

    /// Decodes a world file without looking for a sidecar.
    pub fn from_bytes(data: &[u8], catalog: &VersionCatalog, properties: &TileProperties) -> Result<Self> {
        codec::decode_world(data, catalog, properties)
    }

    /// First virtual tile and wall IDs for this world: the resolved record's
    /// counts, raised to the tile types the file itself declared.
    pub fn virtual_id_bases(&self, catalog: &VersionCatalog) -> Result<(u16, u16)> {
        let record = catalog.resolve(self.version)?;
        let tiles = record.max_tile_id.max(self.native_tile_types);
        if tiles != record.max_tile_id {
            log::debug!(
                "file declares {} tile types past record {} ({}), virtual tiles start at {}",
                tiles - record.max_tile_id,
                record.save_version,
                record.release,
                tiles
            );
        }
        Ok((tiles, record.max_wall_id))
    }

    /// Parses an overlay sidecar for this world and splices it into the grid.
    pub fn attach_overlay(&mut self, sidecar: &[u8], catalog: &VersionCatalog) -> Result<()> {
        let mut overlay = OverlayData::parse(sidecar, self.width(), self.height())?;
        let (tile_base, wall_base) = self.virtual_id_bases(catalog)?;
        overlay.assign_virtual_ids(tile_base, wall_base)?;
        overlay.apply_to_grid(&mut self.grid)?;
        self.overlay = Some(overlay);
        Ok(())
    }

    /// Loads a world file and, if one sits next to it, its overlay sidecar.
    pub fn load<P: AsRef<Path>>(path: P, catalog: &VersionCatalog, properties: &TileProperties) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let mut world = Self::from_bytes(&data, catalog, properties)?;

        let sidecar = overlay::sidecar_path(path);
        if sidecar.exists() {
            log::debug!("loading overlay sidecar {}", sidecar.display());
            let bytes = fs::read(&sidecar)?;
            world.attach_overlay(&bytes, catalog)?;
        }
        log::info!(
            "loaded world '{}' ({}x{}, version {}) from {}",
            world.header.name,
            world.width(),
            world.height(),
            world.version,
            path.display()
        );
        Ok(world)
    }

    /// Encodes the world and its sidecar with the overlay stripped out of the
    /// grid. The overlay is put back before returning, whatever the outcome.
    pub fn encode(&mut self, format: &TileFormat, options: &SaveOptions) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
        let Some(mut overlay) = self.overlay.take() else {
            return Ok((codec::encode_world(self, format)?, None));
        };
        if let Err(e) = overlay.strip_from_grid(&mut self.grid) {
            self.overlay = Some(overlay);
            return Err(e);
        }

        let encoded = codec::encode_world(self, format).and_then(|world_bytes| {
            let sidecar = overlay.build(
                options.overlay_encoding,
                self.width(),
                self.height(),
                options.compression(),
            )?;
            Ok((world_bytes, Some(sidecar)))
        });

        let restored = overlay.apply_to_grid(&mut self.grid);
        self.overlay = Some(overlay);
        let encoded = encoded?;
        restored?;
        Ok(encoded)
    }

    /// Writes the world to `path` in the layout `options` selects.
    ///
    /// Everything is encoded in memory first. The previous file and sidecar
    /// are then backed up, both new files are written to temporary files,
    /// and only then renamed into place. The sidecar is written only when
    /// the world carries an overlay.
    pub fn save<P: AsRef<Path>>(
        &mut self,
        path: P,
        catalog: &VersionCatalog,
        properties: &TileProperties,
        options: &SaveOptions,
    ) -> Result<()> {
        let path = path.as_ref();
        let record = options.resolve_target(self.version, catalog)?;
        let format = TileFormat::new(record, properties);
        if record.save_version != self.version {
            log::info!(
                "saving version {} world as {} ({})",
                self.version,
                record.save_version,
                record.release
            );
        }

        let (world_bytes, sidecar) = self.encode(&format, options)?;
        let sidecar_target = overlay::sidecar_path(path);

        if options.backup {
            back_up(path)?;
            if sidecar.is_some() {
                back_up(&sidecar_target)?;
            }
        }

        // Both files are staged before either replaces its target.
        let staged = stage(path, &world_bytes)?;
        let staged_sidecar = match &sidecar {
            Some(bytes) => match stage(&sidecar_target, bytes) {
                Ok(tmp) => Some(tmp),
                Err(e) => {
                    let _ = fs::remove_file(&staged);
                    return Err(e);
                }
            },
            None => None,
        };
        if let Err(e) = commit(&staged, path) {
            if let Some(tmp) = &staged_sidecar {
                let _ = fs::remove_file(tmp);
            }
            return Err(e);
        }
        if let Some(tmp) = staged_sidecar {
            commit(&tmp, &sidecar_target)?;
        }
        log::info!("saved world '{}' to {}", self.header.name, path.display());
        Ok(())
    }

    pub fn save_as_release<P: AsRef<Path>>(
        &mut self,
        path: P,
        catalog: &VersionCatalog,
        properties: &TileProperties,
        release: &ReleaseId,
    ) -> Result<()> {
        self.save(path, catalog, properties, &SaveOptions::for_release(release.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_options_defaults() {
        let options = SaveOptions::from_json(r#"{ "release": "1.3.0.1" }"#).unwrap();
        assert!(options.backup);
        assert_eq!(options.compression_level, 6);
        assert_eq!(options.overlay_encoding, OverlayEncoding::Dense);
        assert_eq!(options.release, Some("1.3.0.1".parse().unwrap()));

        let options = SaveOptions::from_json(r#"{ "overlay_encoding": "sparse", "backup": false }"#).unwrap();
        assert_eq!(options.overlay_encoding, OverlayEncoding::Sparse);
        assert!(!options.backup);
    }

    #[test]
    fn test_resolve_target_precedence() {
        let catalog = VersionCatalog::builtin().unwrap();
        let mut options = SaveOptions::for_version(102);
        assert_eq!(options.resolve_target(279, &catalog).unwrap().save_version, 102);
        options.release = Some("1.2.0.3".parse().unwrap());
        assert_eq!(options.resolve_target(279, &catalog).unwrap().save_version, 71);
        assert_eq!(SaveOptions::default().resolve_target(500, &catalog).unwrap().save_version, 279);
    }

    #[test]
    fn test_suffix_paths() {
        assert_eq!(backup_path(Path::new("/tmp/a.wld")), PathBuf::from("/tmp/a.wld.bak"));
        assert_eq!(with_suffix(Path::new("b.wld"), ".tmp"), PathBuf::from("b.wld.tmp"));
    }

    #[test]
    fn test_new_world_bounds() {
        let world = World::new("Bounds", 100, 50, 279);
        assert_eq!(world.header.bounds.right, 1600);
        assert_eq!(world.header.bounds.bottom, 800);
        assert_eq!((world.width(), world.height()), (100, 50));
    }
}

//! Mod content overlay kept in a `.twld` sidecar next to a world file.
//!
//! Mod tiles and walls are not part of the base format. While a world is
//! loaded they live in the grid under virtual IDs placed above the base
//! engine counts; before the base file is written they are stripped back
//! into the overlay and reapplied afterwards.

pub mod dense;
pub mod sparse;
pub mod tags;

use crate::error::{Error, Result};
use crate::grid::TileGrid;
use flate2::Compression;
use quartz_nbt::{NbtCompound, NbtTag};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const SIDECAR_EXTENSION: &str = "twld";

/// `(x, y)`; ordered column-major like every grid scan.
pub type CellKey = (u32, u32);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModTileEntry {
    pub mod_name: SmolStr,
    pub name: SmolStr,
    /// ID used inside the stream this entry was read from.
    pub save_id: u16,
    pub frame_important: bool,
}

impl ModTileEntry {
    pub fn new(mod_name: impl Into<SmolStr>, name: impl Into<SmolStr>, save_id: u16, frame_important: bool) -> Self {
        ModTileEntry {
            mod_name: mod_name.into(),
            name: name.into(),
            save_id,
            frame_important,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModWallEntry {
    pub mod_name: SmolStr,
    pub name: SmolStr,
    pub save_id: u16,
}

impl ModWallEntry {
    pub fn new(mod_name: impl Into<SmolStr>, name: impl Into<SmolStr>, save_id: u16) -> Self {
        ModWallEntry {
            mod_name: mod_name.into(),
            name: name.into(),
            save_id,
        }
    }
}

/// Overlay tile at one cell. `index` is the position in the tile name table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayTile {
    pub index: u16,
    pub color: u8,
    /// Present only for frame-important entries.
    pub frame: Option<(i16, i16)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayWall {
    pub index: u16,
    pub color: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayCells {
    pub tiles: BTreeMap<CellKey, OverlayTile>,
    pub walls: BTreeMap<CellKey, OverlayWall>,
}

impl OverlayCells {
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty() && self.walls.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayEncoding {
    #[default]
    Dense,
    Sparse,
}

/// First virtual tile and wall IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualIds {
    pub tile_base: u16,
    pub wall_base: u16,
}

/// Save-time ID to name-table index resolution for one stream.
pub struct SaveIdLookup {
    tiles: FxHashMap<u16, u16>,
    walls: FxHashMap<u16, u16>,
    framed: Vec<bool>,
}

impl SaveIdLookup {
    pub fn new(tiles: &[ModTileEntry], walls: &[ModWallEntry]) -> Self {
        SaveIdLookup {
            tiles: tiles.iter().enumerate().map(|(i, e)| (e.save_id, i as u16)).collect(),
            walls: walls.iter().enumerate().map(|(i, e)| (e.save_id, i as u16)).collect(),
            framed: tiles.iter().map(|e| e.frame_important).collect(),
        }
    }

    /// Lookup for streams written by this crate, where save id is index + 1.
    pub fn renumbered(tiles: &[ModTileEntry], walls: &[ModWallEntry]) -> Self {
        SaveIdLookup {
            tiles: (0..tiles.len() as u16).map(|i| (i + 1, i)).collect(),
            walls: (0..walls.len() as u16).map(|i| (i + 1, i)).collect(),
            framed: tiles.iter().map(|e| e.frame_important).collect(),
        }
    }

    pub fn tile_index(&self, save_id: u16) -> Result<u16> {
        self.tiles
            .get(&save_id)
            .copied()
            .ok_or(Error::UnresolvedOverlayId { kind: "tile", id: save_id })
    }

    pub fn wall_index(&self, save_id: u16) -> Result<u16> {
        self.walls
            .get(&save_id)
            .copied()
            .ok_or(Error::UnresolvedOverlayId { kind: "wall", id: save_id })
    }

    pub fn tile_framed(&self, index: u16) -> bool {
        self.framed.get(index as usize).copied().unwrap_or(false)
    }
}

/// Parsed sidecar: name tables, sparse cell map and untouched NBT keys.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayData {
    pub tiles: Vec<ModTileEntry>,
    pub walls: Vec<ModWallEntry>,
    pub cells: OverlayCells,
    /// Encoding found in the sidecar, `None` when it had no overlay grid.
    pub encoding: Option<OverlayEncoding>,
    virtual_ids: Option<VirtualIds>,
    root_extra: NbtCompound,
    tiles_extra: NbtCompound,
}

impl Default for OverlayData {
    fn default() -> Self {
        OverlayData {
            tiles: Vec::new(),
            walls: Vec::new(),
            cells: OverlayCells::default(),
            encoding: None,
            virtual_ids: None,
            root_extra: NbtCompound::new(),
            tiles_extra: NbtCompound::new(),
        }
    }
}

impl OverlayData {
    pub fn new(tiles: Vec<ModTileEntry>, walls: Vec<ModWallEntry>) -> Self {
        OverlayData {
            tiles,
            walls,
            ..Default::default()
        }
    }

    /// Parses sidecar bytes for a `width` x `height` grid.
    ///
    /// The dense encoding is checked for first, then the legacy sparse one.
    /// Any unresolved save id aborts the whole parse.
    pub fn parse(bytes: &[u8], width: u32, height: u32) -> Result<Self> {
        let mut root = tags::decode_root(bytes)?;
        let tiles_tag = root.inner_mut().remove(tags::TILES);
        let mut tiles_compound = match tiles_tag {
            Some(NbtTag::Compound(c)) => c,
            Some(_) => return Err(Error::format("overlay", "\"tiles\" is not a compound")),
            None => NbtCompound::new(),
        };

        let tiles = tags::read_tile_map(&tiles_compound)?;
        let walls = tags::read_wall_map(&tiles_compound)?;
        let lookup = SaveIdLookup::new(&tiles, &walls);
        let mut cells = OverlayCells::default();

        let encoding = if let Some(data) = tags::byte_array(&tiles_compound, tags::TILE_DATA)? {
            dense::decode_tiles(&data, &lookup, width, height, &mut cells)?;
            if let Some(walls) = tags::byte_array(&tiles_compound, tags::WALL_DATA)? {
                dense::decode_walls(&walls, &lookup, width, height, &mut cells)?;
            }
            Some(OverlayEncoding::Dense)
        } else if let Some(data) = tags::byte_array(&tiles_compound, tags::SPARSE_DATA)? {
            sparse::decode_into(&data, &lookup, width, height, &mut cells)?;
            Some(OverlayEncoding::Sparse)
        } else {
            None
        };
        log::debug!(
            "overlay: {} tile and {} wall entries, {} tile and {} wall cells ({:?})",
            tiles.len(),
            walls.len(),
            cells.tiles.len(),
            cells.walls.len(),
            encoding
        );

        for key in tags::OWNED_KEYS {
            tiles_compound.inner_mut().remove(key);
        }
        Ok(OverlayData {
            tiles,
            walls,
            cells,
            encoding,
            virtual_ids: None,
            root_extra: root,
            tiles_extra: tiles_compound,
        })
    }

    /// Serializes into sidecar bytes. Save ids are renumbered to index + 1.
    pub fn build(
        &self,
        encoding: OverlayEncoding,
        width: u32,
        height: u32,
        compression: Compression,
    ) -> Result<Vec<u8>> {
        let tiles: Vec<ModTileEntry> = self
            .tiles
            .iter()
            .enumerate()
            .map(|(i, e)| ModTileEntry {
                save_id: i as u16 + 1,
                ..e.clone()
            })
            .collect();
        let walls: Vec<ModWallEntry> = self
            .walls
            .iter()
            .enumerate()
            .map(|(i, e)| ModWallEntry {
                save_id: i as u16 + 1,
                ..e.clone()
            })
            .collect();

        let mut tiles_compound = self.tiles_extra.clone();
        tiles_compound.insert(tags::TILE_MAP, tags::tile_map_tag(&tiles));
        tiles_compound.insert(tags::WALL_MAP, tags::wall_map_tag(&walls));
        match encoding {
            OverlayEncoding::Dense => {
                let tile_data = dense::encode_tiles(&self.cells, width, height)?;
                let wall_data = dense::encode_walls(&self.cells, width, height)?;
                tiles_compound.insert(tags::TILE_DATA, tags::byte_array_tag(tile_data));
                tiles_compound.insert(tags::WALL_DATA, tags::byte_array_tag(wall_data));
            }
            OverlayEncoding::Sparse => {
                let framed: Vec<bool> = self.tiles.iter().map(|e| e.frame_important).collect();
                let data = sparse::encode(&self.cells, &framed, width, height)?;
                tiles_compound.insert(tags::SPARSE_DATA, tags::byte_array_tag(data));
            }
        }

        let mut root = self.root_extra.clone();
        root.insert(tags::TILES, NbtTag::Compound(tiles_compound));
        tags::encode_root(&root, compression)
    }

    /// Places virtual tile IDs at `base_tiles + index` and wall IDs at
    /// `base_walls + index`.
    pub fn assign_virtual_ids(&mut self, base_tiles: u16, base_walls: u16) -> Result<VirtualIds> {
        if base_tiles == 0 || base_walls == 0 {
            return Err(Error::format("overlay", "base tile and wall counts must be at least 1"));
        }
        let fits = |base: u16, len: usize| base as usize + len <= u16::MAX as usize;
        if !fits(base_tiles, self.tiles.len()) || !fits(base_walls, self.walls.len()) {
            return Err(Error::format(
                "overlay",
                format!(
                    "{} tiles above {} or {} walls above {} overflow the ID space",
                    self.tiles.len(),
                    base_tiles,
                    self.walls.len(),
                    base_walls
                ),
            ));
        }
        let ids = VirtualIds {
            tile_base: base_tiles,
            wall_base: base_walls,
        };
        self.virtual_ids = Some(ids);
        Ok(ids)
    }

    pub fn virtual_ids(&self) -> Option<VirtualIds> {
        self.virtual_ids
    }

    fn require_virtual_ids(&self) -> Result<VirtualIds> {
        self.virtual_ids
            .ok_or_else(|| Error::format("overlay", "virtual IDs have not been assigned"))
    }

    pub fn virtual_tile_id(&self, index: u16) -> Option<u16> {
        let ids = self.virtual_ids?;
        ((index as usize) < self.tiles.len()).then(|| ids.tile_base + index)
    }

    pub fn virtual_wall_id(&self, index: u16) -> Option<u16> {
        let ids = self.virtual_ids?;
        ((index as usize) < self.walls.len()).then(|| ids.wall_base + index)
    }

    /// Name table entry behind a virtual tile ID.
    pub fn tile_entry(&self, tile_type: u16) -> Option<&ModTileEntry> {
        let ids = self.virtual_ids?;
        tile_type
            .checked_sub(ids.tile_base)
            .and_then(|i| self.tiles.get(i as usize))
    }

    pub fn wall_entry(&self, wall: u16) -> Option<&ModWallEntry> {
        let ids = self.virtual_ids?;
        wall.checked_sub(ids.wall_base)
            .and_then(|i| self.walls.get(i as usize))
    }

    /// Writes the overlay cells into `grid` under their virtual IDs.
    pub fn apply_to_grid(&self, grid: &mut TileGrid) -> Result<()> {
        let ids = self.require_virtual_ids()?;
        for (&(x, y), overlay) in &self.cells.tiles {
            let Some(tile) = grid.get_mut(x, y) else {
                log::warn!("overlay tile at ({}, {}) is outside the grid", x, y);
                continue;
            };
            tile.active = true;
            tile.tile_type = ids.tile_base + overlay.index;
            tile.tile_color = overlay.color;
            if let Some((u, v)) = overlay.frame {
                tile.u = u;
                tile.v = v;
            }
        }
        for (&(x, y), overlay) in &self.cells.walls {
            let Some(tile) = grid.get_mut(x, y) else {
                log::warn!("overlay wall at ({}, {}) is outside the grid", x, y);
                continue;
            };
            tile.wall = ids.wall_base + overlay.index;
            tile.wall_color = overlay.color;
        }
        Ok(())
    }

    /// Pulls every virtual tile and wall out of `grid` into the cell map,
    /// replacing its previous contents, and resets the fields it carries.
    pub fn strip_from_grid(&mut self, grid: &mut TileGrid) -> Result<()> {
        let ids = self.require_virtual_ids()?;
        let mut cells = OverlayCells::default();
        let mut orphans = 0usize;

        for x in 0..grid.width() {
            for (y, tile) in grid.column_mut(x).iter_mut().enumerate() {
                let key = (x, y as u32);
                if tile.active && tile.tile_type >= ids.tile_base {
                    let index = tile.tile_type - ids.tile_base;
                    let framed = match self.tiles.get(index as usize) {
                        Some(entry) => {
                            let framed = entry.frame_important;
                            cells.tiles.insert(
                                key,
                                OverlayTile {
                                    index,
                                    color: tile.tile_color,
                                    frame: framed.then_some((tile.u, tile.v)),
                                },
                            );
                            framed
                        }
                        None => {
                            orphans += 1;
                            true
                        }
                    };
                    tile.active = false;
                    tile.tile_type = 0;
                    tile.tile_color = 0;
                    if framed {
                        tile.u = 0;
                        tile.v = 0;
                    }
                }
                if tile.wall >= ids.wall_base {
                    let index = tile.wall - ids.wall_base;
                    if (index as usize) < self.walls.len() {
                        cells.walls.insert(
                            key,
                            OverlayWall {
                                index,
                                color: tile.wall_color,
                            },
                        );
                    } else {
                        orphans += 1;
                    }
                    tile.wall = 0;
                    tile.wall_color = 0;
                }
            }
        }

        if orphans > 0 {
            log::warn!("{} virtual IDs have no overlay entry and were cleared", orphans);
        }
        self.cells = cells;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty() && self.walls.is_empty() && self.cells.is_empty()
    }
}

/// `world.wld` -> `world.twld`.
pub fn sidecar_path(world_path: &Path) -> PathBuf {
    world_path.with_extension(SIDECAR_EXTENSION)
}

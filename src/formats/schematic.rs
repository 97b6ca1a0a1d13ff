//! Clipboard buffers: rectangular pieces of a world used for copy/paste.
//!
//! The current layout tags its version as `version + 10000` and embeds the
//! buffer's own frame-importance table. Older buffers carry the plain save
//! version and are read through a chain of legacy layouts.

use crate::catalog::{Features, TileFormat, TileProperties, VersionCatalog};
use crate::entity::{Chest, Sign, TileEntity};
use crate::error::{Error, Result};
use crate::formats::containers::{self, ContainerLayout};
use crate::formats::manager::{self, SchematicLayout};
use crate::formats::tiles;
use crate::grid::TileGrid;
use crate::io::{BinaryRead, BinaryWrite};
use crate::world::World;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};
use std::path::Path;

/// Added to the save version in the current layout's version tag.
pub const VERSION_OFFSET: i32 = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct ClipboardBuffer {
    pub name: String,
    /// Save version the buffer's data was captured under.
    pub version: u32,
    pub grid: TileGrid,
    pub chests: Vec<Chest>,
    pub signs: Vec<Sign>,
    pub tile_entities: Vec<TileEntity>,
    /// Frame-importance per tile type for this buffer. Empty means "use the
    /// table of whatever format it is written with".
    pub frame_important: Vec<bool>,
}

/// Name and version tag at the start of every buffer.
pub fn peek_tag(data: &[u8]) -> Result<i32> {
    let mut r = Cursor::new(data);
    r.read_string()?;
    Ok(r.read_i32::<LittleEndian>()?)
}

fn read_dimensions<R: Read>(r: &mut R) -> Result<(u32, u32)> {
    let width = r.read_i32::<LittleEndian>()?;
    let height = r.read_i32::<LittleEndian>()?;
    if !TileGrid::validate_dimensions(width as i64, height as i64) {
        return Err(Error::format(
            "clipboard buffer",
            format!("unsupported size {}x{}", width, height),
        ));
    }
    Ok((width as u32, height as u32))
}

fn write_footer<W: Write>(w: &mut W, name: &str, tag: i32, grid: &TileGrid) -> Result<()> {
    w.write_string(name)?;
    w.write_i32::<LittleEndian>(tag)?;
    w.write_i32::<LittleEndian>(grid.width() as i32)?;
    w.write_i32::<LittleEndian>(grid.height() as i32)?;
    Ok(())
}

fn verify_footer<R: Read>(r: &mut R, name: &str, tag: i32, width: u32, height: u32) -> Result<()> {
    let footer_name = r.read_string()?;
    let footer_tag = r.read_i32::<LittleEndian>()?;
    let footer_width = r.read_i32::<LittleEndian>()?;
    let footer_height = r.read_i32::<LittleEndian>()?;
    if footer_name != name
        || footer_tag != tag
        || footer_width != width as i32
        || footer_height != height as i32
    {
        return Err(Error::verification(format!(
            "clipboard footer ('{}', {}, {}x{}) does not match header ('{}', {}, {}x{})",
            footer_name, footer_tag, footer_width, footer_height, name, tag, width, height
        )));
    }
    Ok(())
}

impl ClipboardBuffer {
    pub fn new(name: impl Into<String>, width: u32, height: u32, version: u32) -> Self {
        ClipboardBuffer {
            name: name.into(),
            version,
            grid: TileGrid::new(width, height),
            chests: Vec::new(),
            signs: Vec::new(),
            tile_entities: Vec::new(),
            frame_important: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.grid.width()
    }

    pub fn height(&self) -> u32 {
        self.grid.height()
    }

    /// Reads any known layout, falling back through older ones.
    pub fn load(data: &[u8], catalog: &VersionCatalog, properties: &TileProperties) -> Result<Self> {
        manager::registry().read(data, catalog, properties)
    }

    pub fn load_from_path<P: AsRef<Path>>(
        path: P,
        catalog: &VersionCatalog,
        properties: &TileProperties,
    ) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::load(&data, catalog, properties)
    }

    fn frame_table_for(&self, format: &TileFormat) -> Vec<bool> {
        let target = format.frame_table();
        if self.frame_important.is_empty() {
            return target.to_vec();
        }
        let len = self.frame_important.len().min(target.len());
        self.frame_important[..len].to_vec()
    }

    /// Writes the current layout. `format` must be a packed-era version.
    pub fn write<W: Write>(&self, w: &mut W, format: &TileFormat) -> Result<()> {
        if !format.features().is_packed() {
            return Err(Error::UnsupportedSchematic(format!(
                "current layout cannot be written for version {}",
                format.version()
            )));
        }
        let format = format.clone().with_frame_table(self.frame_table_for(format));
        let tag = format.version() as i32 + VERSION_OFFSET;

        w.write_string(&self.name)?;
        w.write_i32::<LittleEndian>(tag)?;
        w.write_bit_vector(format.frame_table())?;
        w.write_i32::<LittleEndian>(self.width() as i32)?;
        w.write_i32::<LittleEndian>(self.height() as i32)?;
        tiles::write_tiles(w, &self.grid, &format)?;
        containers::write_chests(w, &self.chests, &format, ContainerLayout::Counted)?;
        containers::write_signs(w, &self.signs, &format, ContainerLayout::Counted)?;
        containers::write_tile_entities(w, &self.tile_entities, &format)?;
        write_footer(w, &self.name, tag, &self.grid)
    }

    pub fn to_bytes(&self, format: &TileFormat) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write(&mut out, format)?;
        Ok(out)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P, format: &TileFormat) -> Result<()> {
        let bytes = self.to_bytes(format)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Copies the `width` x `height` region at `(x, y)` out of `world`.
    /// Chests, signs and tile entities anchored inside the region come along
    /// in buffer-local coordinates.
    pub fn copy_from(
        world: &World,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        format: &TileFormat,
    ) -> Result<Self> {
        let (world_width, world_height) = world.grid.get_dimensions();
        if width == 0
            || height == 0
            || x as u64 + width as u64 > world_width as u64
            || y as u64 + height as u64 > world_height as u64
        {
            return Err(Error::format(
                "clipboard region",
                format!(
                    "{}x{} at ({}, {}) is outside the {}x{} world",
                    width, height, x, y, world_width, world_height
                ),
            ));
        }

        let mut buffer = ClipboardBuffer::new(world.header.name.clone(), width, height, format.version());
        buffer.frame_important = format.frame_table().to_vec();
        for bx in 0..width {
            buffer
                .grid
                .column_mut(bx)
                .copy_from_slice(&world.grid.column(x + bx)[y as usize..(y + height) as usize]);
        }

        let (x0, y0) = (x as i64, y as i64);
        let local = |ax: i64, ay: i64| {
            let (lx, ly) = (ax - x0, ay - y0);
            (lx >= 0 && ly >= 0 && lx < width as i64 && ly < height as i64).then_some((lx, ly))
        };
        buffer.chests = world
            .chests
            .iter()
            .filter_map(|c| {
                local(c.x as i64, c.y as i64).map(|(lx, ly)| Chest {
                    x: lx as i32,
                    y: ly as i32,
                    ..c.clone()
                })
            })
            .collect();
        buffer.signs = world
            .signs
            .iter()
            .filter_map(|s| {
                local(s.x as i64, s.y as i64).map(|(lx, ly)| Sign {
                    x: lx as i32,
                    y: ly as i32,
                    ..s.clone()
                })
            })
            .collect();
        buffer.tile_entities = world
            .tile_entities
            .iter()
            .filter_map(|e| {
                local(e.x as i64, e.y as i64).map(|(lx, ly)| TileEntity {
                    x: lx as i16,
                    y: ly as i16,
                    ..e.clone()
                })
            })
            .collect();
        Ok(buffer)
    }

    /// Pastes the buffer with its top-left cell at `(x, y)`. Cells falling
    /// outside the world are clipped; records at a pasted anchor replace the
    /// world's.
    pub fn paste_into(&self, world: &mut World, x: u32, y: u32) -> Result<()> {
        if !world.grid.in_bounds(x, y) {
            return Err(Error::format(
                "clipboard paste",
                format!("origin ({}, {}) is outside the world", x, y),
            ));
        }
        let (world_width, world_height) = world.grid.get_dimensions();
        let cols = self.width().min(world_width - x);
        let rows = self.height().min(world_height - y);
        for bx in 0..cols {
            let source = &self.grid.column(bx)[..rows as usize];
            world.grid.column_mut(x + bx)[y as usize..(y + rows) as usize].copy_from_slice(source);
        }

        let inside = |lx: i64, ly: i64| lx >= 0 && ly >= 0 && lx < cols as i64 && ly < rows as i64;
        let to_world = |lx: i64, ly: i64| (lx + x as i64, ly + y as i64);

        for chest in self.chests.iter().filter(|c| inside(c.x as i64, c.y as i64)) {
            let (wx, wy) = to_world(chest.x as i64, chest.y as i64);
            let placed = Chest {
                x: wx as i32,
                y: wy as i32,
                ..chest.clone()
            };
            world.chests.retain(|c| (c.x, c.y) != (placed.x, placed.y));
            world.chests.push(placed);
        }
        for sign in self.signs.iter().filter(|s| inside(s.x as i64, s.y as i64)) {
            let (wx, wy) = to_world(sign.x as i64, sign.y as i64);
            let placed = Sign {
                x: wx as i32,
                y: wy as i32,
                ..sign.clone()
            };
            world.signs.retain(|s| (s.x, s.y) != (placed.x, placed.y));
            world.signs.push(placed);
        }
        for entity in self.tile_entities.iter().filter(|e| inside(e.x as i64, e.y as i64)) {
            let (wx, wy) = to_world(entity.x as i64, entity.y as i64);
            let (Ok(ex), Ok(ey)) = (i16::try_from(wx), i16::try_from(wy)) else {
                log::warn!("tile entity at ({}, {}) does not fit i16 coordinates", wx, wy);
                continue;
            };
            world.tile_entities.retain(|e| (e.x, e.y) != (ex, ey));
            world.tile_entities.push(TileEntity {
                x: ex,
                y: ey,
                ..entity.clone()
            });
        }
        Ok(())
    }
}

// ─── Layouts ────────────────────────────────────────────────────────────────

/// `name, version + 10000, frame bit-vector, width, height, packed tiles,
/// counted chests and signs, tile entities, footer`.
pub struct CurrentLayout;

impl SchematicLayout for CurrentLayout {
    fn name(&self) -> &'static str {
        "current"
    }

    fn detect(&self, tag: i32) -> bool {
        tag >= VERSION_OFFSET
    }

    fn read(&self, data: &[u8], catalog: &VersionCatalog, properties: &TileProperties) -> Result<ClipboardBuffer> {
        let mut r = Cursor::new(data);
        let name = r.read_string()?;
        let tag = r.read_i32::<LittleEndian>()?;
        let version = (tag - VERSION_OFFSET) as u32;
        let table = r.read_bit_vector()?;
        let (width, height) = read_dimensions(&mut r)?;

        let format = TileFormat::for_declared(version, catalog, properties)?.with_frame_table(table);
        if !format.features().is_packed() {
            return Err(Error::format(
                "clipboard buffer",
                format!("tagged version {} predates packed tiles", version),
            ));
        }
        let grid = tiles::read_tiles(&mut r, width, height, &format)?;
        let chests = containers::read_chests(&mut r, &grid, &format, ContainerLayout::Counted)?;
        let signs = containers::read_signs(&mut r, &grid, &format, ContainerLayout::Counted)?;
        let tile_entities = containers::read_tile_entities(&mut r, &format)?;
        verify_footer(&mut r, &name, tag, width, height)?;

        Ok(ClipboardBuffer {
            name,
            version,
            grid,
            chests,
            signs,
            tile_entities,
            frame_important: format.frame_table().to_vec(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LegacyKind {
    Packed,
    Sequential,
    Primitive,
}

/// `name, version, width, height, tiles, chests, [signs], footer`, with the
/// tile era and container shape picked by `kind`.
fn read_legacy(
    data: &[u8],
    catalog: &VersionCatalog,
    properties: &TileProperties,
    kind: LegacyKind,
) -> Result<ClipboardBuffer> {
    let mut r = Cursor::new(data);
    let name = r.read_string()?;
    let tag = r.read_i32::<LittleEndian>()?;
    if tag < 0 {
        return Err(Error::format("clipboard buffer", format!("negative version {}", tag)));
    }
    let version = tag as u32;
    let (width, height) = read_dimensions(&mut r)?;

    let layout_version = match kind {
        LegacyKind::Packed if version < Features::PACKED_TILES => {
            return Err(Error::format(
                "clipboard buffer",
                format!("version {} predates packed tiles", version),
            ))
        }
        LegacyKind::Packed => version,
        LegacyKind::Sequential => version.min(Features::PACKED_TILES - 1),
        LegacyKind::Primitive => 1,
    };
    let format = TileFormat::for_declared(layout_version, catalog, properties)?;
    let layout = match kind {
        LegacyKind::Primitive => ContainerLayout::Primitive,
        _ => ContainerLayout::Counted,
    };

    let grid = tiles::read_tiles(&mut r, width, height, &format)?;
    let chests = containers::read_chests(&mut r, &grid, &format, layout)?;
    let signs = containers::read_signs(&mut r, &grid, &format, layout)?;
    verify_footer(&mut r, &name, tag, width, height)?;

    Ok(ClipboardBuffer {
        name,
        version,
        grid,
        chests,
        signs,
        tile_entities: Vec::new(),
        frame_important: format.frame_table().to_vec(),
    })
}

pub struct PackedLayout;

impl SchematicLayout for PackedLayout {
    fn name(&self) -> &'static str {
        "packed"
    }

    fn detect(&self, tag: i32) -> bool {
        (Features::PACKED_TILES as i32..VERSION_OFFSET).contains(&tag)
    }

    fn read(&self, data: &[u8], catalog: &VersionCatalog, properties: &TileProperties) -> Result<ClipboardBuffer> {
        read_legacy(data, catalog, properties, LegacyKind::Packed)
    }
}

pub struct SequentialLayout;

impl SchematicLayout for SequentialLayout {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn detect(&self, tag: i32) -> bool {
        (0..VERSION_OFFSET).contains(&tag)
    }

    fn read(&self, data: &[u8], catalog: &VersionCatalog, properties: &TileProperties) -> Result<ClipboardBuffer> {
        read_legacy(data, catalog, properties, LegacyKind::Sequential)
    }
}

/// The oldest buffers: version-1 tiles, fixed 20-slot chests, no signs.
pub struct PrimitiveLayout;

impl SchematicLayout for PrimitiveLayout {
    fn name(&self) -> &'static str {
        "primitive"
    }

    fn detect(&self, tag: i32) -> bool {
        (0..VERSION_OFFSET).contains(&tag)
    }

    fn read(&self, data: &[u8], catalog: &VersionCatalog, properties: &TileProperties) -> Result<ClipboardBuffer> {
        read_legacy(data, catalog, properties, LegacyKind::Primitive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ItemStack;
    use crate::tile::Tile;

    fn tables() -> (VersionCatalog, TileProperties) {
        (
            VersionCatalog::builtin().unwrap(),
            TileProperties::builtin().unwrap(),
        )
    }

    fn sample_world() -> World {
        let mut world = World::new("Source", 20, 10, 279);
        for x in 0..20 {
            world.grid.set(x, 9, Tile::block(1));
        }
        world.grid.set(6, 8, Tile::block(21).with_frame(0, 0));
        world.grid.set(8, 8, Tile::block(55));
        world.chests.push(Chest::new(6, 8, 40).with_item(2, ItemStack::new(3, 7)));
        world.signs.push(Sign::new(8, 8, "clip me"));
        world.signs.push(Sign::new(1, 1, "outside"));
        world
    }

    /// Hand-assembled legacy buffer: name, version, size, tiles, chests, signs, footer.
    fn legacy_bytes(buffer: &ClipboardBuffer, format: &TileFormat, layout: ContainerLayout, tag: i32) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_string(&buffer.name).unwrap();
        out.write_i32::<LittleEndian>(tag).unwrap();
        out.write_i32::<LittleEndian>(buffer.width() as i32).unwrap();
        out.write_i32::<LittleEndian>(buffer.height() as i32).unwrap();
        tiles::write_tiles(&mut out, &buffer.grid, format).unwrap();
        containers::write_chests(&mut out, &buffer.chests, format, layout).unwrap();
        containers::write_signs(&mut out, &buffer.signs, format, layout).unwrap();
        write_footer(&mut out, &buffer.name, tag, &buffer.grid).unwrap();
        out
    }

    #[test]
    fn test_copy_and_current_round_trip() {
        let (catalog, props) = tables();
        let format = TileFormat::new(catalog.newest().unwrap(), &props);
        let world = sample_world();
        let buffer = ClipboardBuffer::copy_from(&world, 5, 5, 6, 5, &format).unwrap();
        assert_eq!(buffer.chests[0].x, 1);
        assert_eq!(buffer.chests[0].y, 3);
        assert_eq!(buffer.signs.len(), 1);

        let bytes = buffer.to_bytes(&format).unwrap();
        assert_eq!(peek_tag(&bytes).unwrap(), 279 + VERSION_OFFSET);
        assert_eq!(manager::registry().detect_layout(&bytes), Some("current"));

        let loaded = ClipboardBuffer::load(&bytes, &catalog, &props).unwrap();
        assert_eq!(loaded.grid, buffer.grid);
        assert_eq!(loaded.signs, buffer.signs);
        assert_eq!(loaded.chests, buffer.chests);
        assert_eq!(loaded.version, 279);
    }

    #[test]
    fn test_embedded_frame_table_wins() {
        let (catalog, props) = tables();
        let format = TileFormat::new(catalog.newest().unwrap(), &props);
        let mut buffer = ClipboardBuffer::new("frames", 1, 1, 279);
        buffer.grid.set(0, 0, Tile::block(1).with_frame(18, 18));
        // Stone is framed inside this buffer only.
        let mut table = format.frame_table().to_vec();
        table[1] = true;
        buffer.frame_important = table;

        let bytes = buffer.to_bytes(&format).unwrap();
        let loaded = ClipboardBuffer::load(&bytes, &catalog, &props).unwrap();
        let tile = loaded.grid.get(0, 0).unwrap();
        assert_eq!((tile.u, tile.v), (18, 18));
        assert!(loaded.frame_important[1]);
    }

    #[test]
    fn test_paste_clips_and_replaces() {
        let (catalog, props) = tables();
        let format = TileFormat::new(catalog.newest().unwrap(), &props);
        let world = sample_world();
        let buffer = ClipboardBuffer::copy_from(&world, 5, 5, 6, 5, &format).unwrap();

        let mut target = World::new("Target", 8, 8, 279);
        target.grid.set(6, 6, Tile::block(55));
        target.signs.push(Sign::new(6, 6, "old"));
        buffer.paste_into(&mut target, 3, 3).unwrap();

        // (8, 8) in the source is local (3, 3), pasted at (6, 6).
        assert_eq!(target.grid.get(6, 6).unwrap().tile_type, 55);
        // Chest local (1, 3) lands on (4, 6).
        assert_eq!(target.chests.len(), 1);
        assert_eq!((target.chests[0].x, target.chests[0].y), (4, 6));
        assert_eq!(target.signs, vec![Sign::new(6, 6, "clip me")]);
        // The buffer's last column falls off the right edge.
        assert_eq!(target.grid.get(7, 7).unwrap().tile_type, 1);
        assert_eq!(target.grid.column(7).iter().filter(|t| t.active).count(), 1);

        assert!(buffer.paste_into(&mut target, 8, 0).is_err());
    }

    #[test]
    fn test_legacy_packed_buffer() {
        let (catalog, props) = tables();
        let format = TileFormat::new(catalog.resolve(146).unwrap(), &props);
        let world = sample_world();
        let buffer = ClipboardBuffer::copy_from(&world, 5, 5, 6, 5, &format).unwrap();
        let bytes = legacy_bytes(&buffer, &format, ContainerLayout::Counted, 146);

        let loaded = ClipboardBuffer::load(&bytes, &catalog, &props).unwrap();
        assert_eq!(loaded.version, 146);
        assert_eq!(loaded.grid, buffer.grid);
        assert_eq!(loaded.signs, buffer.signs);
    }

    #[test]
    fn test_legacy_sequential_buffer() {
        let (catalog, props) = tables();
        let format = TileFormat::new(catalog.resolve(71).unwrap(), &props);
        let mut buffer = ClipboardBuffer::new("seq", 3, 4, 71);
        buffer.grid.set(1, 2, Tile::block(1).with_wall(4));
        buffer.grid.set(2, 3, Tile::block(55));
        buffer.signs.push(Sign::new(2, 3, "legacy"));
        let bytes = legacy_bytes(&buffer, &format, ContainerLayout::Counted, 71);

        let loaded = ClipboardBuffer::load(&bytes, &catalog, &props).unwrap();
        assert_eq!(loaded.grid, buffer.grid);
        assert_eq!(loaded.signs, buffer.signs);
    }

    #[test]
    fn test_primitive_fallback_after_footer_mismatch() {
        let (catalog, props) = tables();
        let primitive = TileFormat::for_declared(1, &catalog, &props).unwrap();
        let mut buffer = ClipboardBuffer::new("old", 2, 3, 20);
        buffer.grid.set(0, 1, Tile::block(21));
        buffer.chests.push(Chest::new(0, 1, 20).with_item(0, ItemStack::new(2, 9)));
        let bytes = legacy_bytes(&buffer, &primitive, ContainerLayout::Primitive, 20);

        // Sequential reading of version 20 misparses and fails; primitive succeeds.
        let loaded = ClipboardBuffer::load(&bytes, &catalog, &props).unwrap();
        assert_eq!(loaded.grid, buffer.grid);
        assert_eq!(loaded.chests, buffer.chests);
    }

    #[test]
    fn test_garbage_is_unsupported() {
        let (catalog, props) = tables();
        let mut bytes = Vec::new();
        bytes.write_string("junk").unwrap();
        bytes.write_i32::<LittleEndian>(50).unwrap();
        bytes.extend_from_slice(&[1, 2, 3]);
        assert!(matches!(
            ClipboardBuffer::load(&bytes, &catalog, &props),
            Err(Error::UnsupportedSchematic(_))
        ));
    }
}

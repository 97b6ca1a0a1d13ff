//! Dense overlay stream: one fixed-size slot per cell, column-major.

use super::{CellKey, OverlayCells, OverlayTile, OverlayWall, SaveIdLookup};
use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// u16 save id, u8 colour, i16 frame x, i16 frame y.
pub const TILE_SLOT: usize = 7;
/// u16 save id, u8 colour.
pub const WALL_SLOT: usize = 3;

fn check_len(data: &[u8], slot: usize, cells: usize, what: &str) -> Result<()> {
    if data.len() != slot * cells {
        return Err(Error::format(
            "overlay stream",
            format!("{} holds {} bytes, expected {}", what, data.len(), slot * cells),
        ));
    }
    Ok(())
}

fn key_of(linear: usize, height: u32) -> CellKey {
    let height = height as usize;
    ((linear / height) as u32, (linear % height) as u32)
}

pub fn decode_tiles(
    data: &[u8],
    lookup: &SaveIdLookup,
    width: u32,
    height: u32,
    out: &mut OverlayCells,
) -> Result<()> {
    let cells = width as usize * height as usize;
    check_len(data, TILE_SLOT, cells, "tileData")?;
    let mut r = Cursor::new(data);
    for linear in 0..cells {
        let save_id = r.read_u16::<LittleEndian>()?;
        let color = r.read_u8()?;
        let fx = r.read_i16::<LittleEndian>()?;
        let fy = r.read_i16::<LittleEndian>()?;
        if save_id == 0 {
            continue;
        }
        let index = lookup.tile_index(save_id)?;
        let frame = lookup.tile_framed(index).then_some((fx, fy));
        out.tiles.insert(key_of(linear, height), OverlayTile { index, color, frame });
    }
    Ok(())
}

pub fn decode_walls(
    data: &[u8],
    lookup: &SaveIdLookup,
    width: u32,
    height: u32,
    out: &mut OverlayCells,
) -> Result<()> {
    let cells = width as usize * height as usize;
    check_len(data, WALL_SLOT, cells, "wallData")?;
    let mut r = Cursor::new(data);
    for linear in 0..cells {
        let save_id = r.read_u16::<LittleEndian>()?;
        let color = r.read_u8()?;
        if save_id == 0 {
            continue;
        }
        let index = lookup.wall_index(save_id)?;
        out.walls.insert(key_of(linear, height), OverlayWall { index, color });
    }
    Ok(())
}

/// Encodes the tile slots, writing save id `index + 1`.
pub fn encode_tiles(cells: &OverlayCells, width: u32, height: u32) -> Result<Vec<u8>> {
    let mut out = vec![0u8; width as usize * height as usize * TILE_SLOT];
    for (&(x, y), tile) in &cells.tiles {
        if x >= width || y >= height {
            continue;
        }
        let at = (x as usize * height as usize + y as usize) * TILE_SLOT;
        let (fx, fy) = tile.frame.unwrap_or((0, 0));
        let mut slot = &mut out[at..at + TILE_SLOT];
        slot.write_u16::<LittleEndian>(tile.index + 1)?;
        slot.write_u8(tile.color)?;
        slot.write_i16::<LittleEndian>(fx)?;
        slot.write_i16::<LittleEndian>(fy)?;
    }
    Ok(out)
}

pub fn encode_walls(cells: &OverlayCells, width: u32, height: u32) -> Result<Vec<u8>> {
    let mut out = vec![0u8; width as usize * height as usize * WALL_SLOT];
    for (&(x, y), wall) in &cells.walls {
        if x >= width || y >= height {
            continue;
        }
        let at = (x as usize * height as usize + y as usize) * WALL_SLOT;
        let mut slot = &mut out[at..at + WALL_SLOT];
        slot.write_u16::<LittleEndian>(wall.index + 1)?;
        slot.write_u8(wall.color)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::{ModTileEntry, ModWallEntry};

    #[test]
    fn test_dense_slots() {
        let tiles = vec![
            ModTileEntry::new("ExampleMod", "Ore", 1, false),
            ModTileEntry::new("ExampleMod", "Banner", 2, true),
        ];
        let walls = vec![ModWallEntry::new("ExampleMod", "Brick", 1)];
        let mut cells = OverlayCells::default();
        cells.tiles.insert((0, 1), OverlayTile { index: 1, color: 2, frame: Some((-18, 54)) });
        cells.tiles.insert((1, 0), OverlayTile { index: 0, color: 0, frame: None });
        cells.walls.insert((1, 1), OverlayWall { index: 0, color: 9 });

        let tile_bytes = encode_tiles(&cells, 2, 2).unwrap();
        assert_eq!(tile_bytes.len(), 4 * TILE_SLOT);
        assert_eq!(&tile_bytes[TILE_SLOT..2 * TILE_SLOT], &[2, 0, 2, 0xEE, 0xFF, 54, 0]);
        let wall_bytes = encode_walls(&cells, 2, 2).unwrap();

        let lookup = SaveIdLookup::new(&tiles, &walls);
        let mut decoded = OverlayCells::default();
        decode_tiles(&tile_bytes, &lookup, 2, 2, &mut decoded).unwrap();
        decode_walls(&wall_bytes, &lookup, 2, 2, &mut decoded).unwrap();
        assert_eq!(decoded, cells);

        assert!(decode_tiles(&tile_bytes[1..], &lookup, 2, 2, &mut decoded).is_err());
    }
}

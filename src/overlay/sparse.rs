//! Legacy sparse overlay stream.
//!
//! A record is preceded by a skip count (bytes of 255 accumulate, the last
//! byte is below 255) unless the previous record set `NEXT_ADJACENT`.
//! Positions are linear column-major indices.

use super::{CellKey, OverlayCells, OverlayTile, OverlayWall, SaveIdLookup};
use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::BTreeSet;
use std::io::Cursor;

const TILE: u8 = 0x01;
const FRAME_X_WIDE: u8 = 0x02;
const FRAME_Y_WIDE: u8 = 0x04;
const TILE_COLOR: u8 = 0x08;
const WALL: u8 = 0x10;
const WALL_COLOR: u8 = 0x20;
const REPEAT: u8 = 0x40;
const NEXT_ADJACENT: u8 = 0x80;

fn read_frame_part(r: &mut Cursor<&[u8]>, wide: bool) -> Result<i16> {
    Ok(if wide {
        r.read_i16::<LittleEndian>()?
    } else {
        r.read_u8()? as i16
    })
}

/// Decodes records into `out` one at a time. On error, records decoded so
/// far stay in `out` and the failing record contributes nothing.
pub fn decode_into(
    data: &[u8],
    lookup: &SaveIdLookup,
    width: u32,
    height: u32,
    out: &mut OverlayCells,
) -> Result<()> {
    let total = width as usize * height as usize;
    let mut r = Cursor::new(data);
    let mut position = 0usize;
    let mut expect_skip = true;

    loop {
        if r.position() as usize >= data.len() {
            break;
        }
        if expect_skip {
            loop {
                let b = r.read_u8()?;
                position += b as usize;
                if b < 0xFF {
                    break;
                }
            }
        }

        let flags = r.read_u8()?;
        let mut tile = None;
        if flags & TILE != 0 {
            let save_id = r.read_u16::<LittleEndian>()?;
            let index = lookup.tile_index(save_id)?;
            let frame = if lookup.tile_framed(index) {
                let fx = read_frame_part(&mut r, flags & FRAME_X_WIDE != 0)?;
                let fy = read_frame_part(&mut r, flags & FRAME_Y_WIDE != 0)?;
                Some((fx, fy))
            } else {
                None
            };
            let color = if flags & TILE_COLOR != 0 { r.read_u8()? } else { 0 };
            tile = Some(OverlayTile { index, color, frame });
        }
        let mut wall = None;
        if flags & WALL != 0 {
            let save_id = r.read_u16::<LittleEndian>()?;
            let index = lookup.wall_index(save_id)?;
            let color = if flags & WALL_COLOR != 0 { r.read_u8()? } else { 0 };
            wall = Some(OverlayWall { index, color });
        }
        let repeat = if flags & REPEAT != 0 { r.read_u8()? as usize } else { 0 };

        if position + repeat >= total {
            return Err(Error::format(
                "overlay stream",
                format!("record at cell {} (+{}) runs past the {}x{} grid", position, repeat, width, height),
            ));
        }
        for linear in position..=position + repeat {
            let key = key_of(linear, height);
            if let Some(t) = tile {
                out.tiles.insert(key, t);
            }
            if let Some(w) = wall {
                out.walls.insert(key, w);
            }
        }
        position += repeat + 1;
        expect_skip = flags & NEXT_ADJACENT == 0;
    }
    Ok(())
}

fn key_of(linear: usize, height: u32) -> CellKey {
    let height = height as usize;
    ((linear / height) as u32, (linear % height) as u32)
}

fn linear_of(key: CellKey, height: u32) -> usize {
    key.0 as usize * height as usize + key.1 as usize
}

type Record = (Option<OverlayTile>, Option<OverlayWall>);

/// Encodes `cells`, writing save id `index + 1` for every entry. Cells
/// outside the `width` x `height` grid are skipped.
pub fn encode(cells: &OverlayCells, framed: &[bool], width: u32, height: u32) -> Result<Vec<u8>> {
    let keys: BTreeSet<CellKey> = cells.tiles.keys().chain(cells.walls.keys()).copied().collect();
    let outside = keys.iter().filter(|&&(x, y)| x >= width || y >= height).count();
    if outside > 0 {
        log::warn!("{} overlay cells lie outside the {}x{} grid, skipped", outside, width, height);
    }
    let records: Vec<(usize, Record)> = keys
        .into_iter()
        .filter(|&(x, y)| x < width && y < height)
        .map(|key| {
            (
                linear_of(key, height),
                (cells.tiles.get(&key).copied(), cells.walls.get(&key).copied()),
            )
        })
        .collect();

    let mut out = Vec::new();
    let mut position = 0usize;
    let mut skip_elided = false;
    let mut i = 0;
    while i < records.len() {
        let (start, record) = records[i];

        let mut repeat = 0usize;
        while repeat < u8::MAX as usize
            && i + repeat + 1 < records.len()
            && records[i + repeat + 1].0 == start + repeat + 1
            && records[i + repeat + 1].1 == record
        {
            repeat += 1;
        }
        let next = i + repeat + 1;
        let adjacent = next < records.len() && records[next].0 == start + repeat + 1;

        if !skip_elided {
            let mut skip = start - position;
            while skip >= 0xFF {
                out.write_u8(0xFF)?;
                skip -= 0xFF;
            }
            out.write_u8(skip as u8)?;
        }

        let (tile, wall) = record;
        let mut flags = 0u8;
        let mut body = Vec::new();
        if let Some(t) = tile {
            flags |= TILE;
            body.write_u16::<LittleEndian>(t.index + 1)?;
            if framed.get(t.index as usize).copied().unwrap_or(false) {
                let (fx, fy) = t.frame.unwrap_or((0, 0));
                for (part, wide_flag) in [(fx, FRAME_X_WIDE), (fy, FRAME_Y_WIDE)] {
                    if (0..=u8::MAX as i16).contains(&part) {
                        body.write_u8(part as u8)?;
                    } else {
                        flags |= wide_flag;
                        body.write_i16::<LittleEndian>(part)?;
                    }
                }
            }
            if t.color != 0 {
                flags |= TILE_COLOR;
                body.write_u8(t.color)?;
            }
        }
        if let Some(w) = wall {
            flags |= WALL;
            body.write_u16::<LittleEndian>(w.index + 1)?;
            if w.color != 0 {
                flags |= WALL_COLOR;
                body.write_u8(w.color)?;
            }
        }
        if repeat > 0 {
            flags |= REPEAT;
            body.write_u8(repeat as u8)?;
        }
        if adjacent {
            flags |= NEXT_ADJACENT;
        }
        out.write_u8(flags)?;
        out.extend_from_slice(&body);

        position = start + repeat + 1;
        skip_elided = adjacent;
        i = next;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::{ModTileEntry, ModWallEntry};

    fn tables() -> (Vec<ModTileEntry>, Vec<ModWallEntry>) {
        (
            vec![
                ModTileEntry::new("ExampleMod", "Crystal", 5, false),
                ModTileEntry::new("ExampleMod", "Statue", 9, true),
            ],
            vec![ModWallEntry::new("ExampleMod", "CrystalWall", 3)],
        )
    }

    #[test]
    fn test_unknown_save_id_stops_after_valid_records() {
        let (tiles, walls) = tables();
        let lookup = SaveIdLookup::new(&tiles, &walls);
        let mut data = Vec::new();
        // (0,0) crystal, skip 0
        data.extend_from_slice(&[0, TILE, 5, 0]);
        // (0,2) statue framed (18, 300), skip 1
        data.extend_from_slice(&[1, TILE | FRAME_Y_WIDE, 9, 0, 18, 0x2C, 0x01]);
        // (0,3) wall with colour, skip 0
        data.extend_from_slice(&[0, WALL | WALL_COLOR, 3, 0, 7]);
        // (0,5) unknown tile save id 42
        data.extend_from_slice(&[1, TILE, 42, 0]);

        let mut cells = OverlayCells::default();
        let err = decode_into(&data, &lookup, 4, 8, &mut cells).unwrap_err();
        assert!(matches!(err, Error::UnresolvedOverlayId { kind: "tile", id: 42 }));

        assert_eq!(cells.tiles.len(), 2);
        assert_eq!(cells.walls.len(), 1);
        assert_eq!(cells.tiles[&(0, 0)].index, 0);
        assert_eq!(cells.tiles[&(0, 2)].frame, Some((18, 300)));
        assert_eq!(cells.walls[&(0, 3)], OverlayWall { index: 0, color: 7 });
        assert!(!cells.tiles.contains_key(&(0, 5)));
    }

    #[test]
    fn test_repeat_and_adjacent_records() {
        let (tiles, walls) = tables();
        let mut cells = OverlayCells::default();
        for y in 2..6 {
            cells.tiles.insert((1, y), OverlayTile { index: 0, color: 0, frame: None });
        }
        cells.walls.insert((1, 6), OverlayWall { index: 0, color: 0 });
        cells.tiles.insert((3, 0), OverlayTile { index: 1, color: 4, frame: Some((36, 0)) });

        let framed: Vec<bool> = tiles.iter().map(|t| t.frame_important).collect();
        let data = encode(&cells, &framed, 4, 8).unwrap();
        // skip 10, crystal with repeat 3 and adjacent flag
        assert_eq!(&data[..5], &[10, TILE | REPEAT | NEXT_ADJACENT, 1, 0, 3]);

        let mut decoded = OverlayCells::default();
        let lookup = SaveIdLookup::renumbered(&tiles, &walls);
        decode_into(&data, &lookup, 4, 8, &mut decoded).unwrap();
        assert_eq!(decoded, cells);
    }

    #[test]
    fn test_long_skip_and_overrun() {
        let (tiles, walls) = tables();
        let mut cells = OverlayCells::default();
        cells.tiles.insert((2, 100), OverlayTile { index: 0, color: 0, frame: None });
        let data = encode(&cells, &[false, true], 3, 300).unwrap();
        // 700 = 255 + 255 + 190
        assert_eq!(&data[..3], &[0xFF, 0xFF, 190]);
        let lookup = SaveIdLookup::renumbered(&tiles, &walls);

        let mut decoded = OverlayCells::default();
        decode_into(&data, &lookup, 3, 300, &mut decoded).unwrap();
        assert_eq!(decoded, cells);

        let mut short = OverlayCells::default();
        let err = decode_into(&data, &lookup, 2, 300, &mut short).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn test_cells_outside_grid_are_skipped() {
        let (tiles, walls) = tables();
        let mut cells = OverlayCells::default();
        cells.tiles.insert((0, 5), OverlayTile { index: 0, color: 0, frame: None });
        cells.tiles.insert((1, 0), OverlayTile { index: 0, color: 0, frame: None });
        cells.walls.insert((4, 1), OverlayWall { index: 0, color: 0 });

        let data = encode(&cells, &[false, true], 2, 3).unwrap();
        // Only (1, 0) at linear index 3 is written.
        assert_eq!(data, vec![3, TILE, 1, 0]);

        let mut decoded = OverlayCells::default();
        let lookup = SaveIdLookup::renumbered(&tiles, &walls);
        decode_into(&data, &lookup, 2, 3, &mut decoded).unwrap();
        assert_eq!(decoded.tiles.keys().copied().collect::<Vec<_>>(), vec![(1, 0)]);
        assert!(decoded.walls.is_empty());
    }
}

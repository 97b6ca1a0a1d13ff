//! Dense tile grid codec.
//!
//! Two eras share one scan order (down each column, then the next column)
//! and one compression scheme (a run length after each written cell):
//!
//! * sequential (before the packed era): one flag byte per field, in the
//!   order active, type, frame, colour, wall, liquid, wires, actuator,
//!   brick, run length;
//! * packed: up to three header bytes of bit flags followed by the fields
//!   the flags announce.

use crate::catalog::TileFormat;
use crate::error::{Error, Result};
use crate::grid::TileGrid;
use crate::io::{BinaryRead, BinaryWrite};
use crate::tile::{BrickStyle, LiquidKind, Tile};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

// Packed header bits.
const H1_HEADER2: u8 = 0x01;
const H1_ACTIVE: u8 = 0x02;
const H1_WALL: u8 = 0x04;
const H1_LIQUID_SHIFT: u8 = 3;
const H1_WIDE_TYPE: u8 = 0x20;
const H1_RLE_BYTE: u8 = 0x40;
const H1_RLE_SHORT: u8 = 0x80;

const H2_HEADER3: u8 = 0x01;
const H2_WIRE_RED: u8 = 0x02;
const H2_WIRE_BLUE: u8 = 0x04;
const H2_WIRE_GREEN: u8 = 0x08;
const H2_BRICK_SHIFT: u8 = 4;

const H3_ACTUATOR: u8 = 0x02;
const H3_INACTIVE: u8 = 0x04;
const H3_TILE_COLOR: u8 = 0x08;
const H3_WALL_COLOR: u8 = 0x10;
const H3_WIRE_YELLOW: u8 = 0x20;
const H3_WIDE_WALL: u8 = 0x40;

const SEQUENTIAL_MAX_RUN: usize = i16::MAX as usize;
const PACKED_MAX_RUN: usize = u16::MAX as usize;

/// Summary of one encode pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeStats {
    /// Cell records written (each followed by its run length).
    pub records: usize,
    /// Active cells whose type the target cannot express.
    pub dropped_tiles: usize,
    /// Walls the target cannot express.
    pub dropped_walls: usize,
}

/// Reduces a cell to what `format` can represent, i.e. exactly what a
/// decode of its encoding yields.
pub fn normalize_tile(tile: &Tile, format: &TileFormat) -> Tile {
    let features = format.features();
    let mut t = *tile;

    if t.active && t.tile_type >= format.tile_limit() {
        t.clear_block();
    }
    if !t.active {
        t.clear_block();
    } else {
        if !format.is_frame_important(t.tile_type) {
            t.u = 0;
            t.v = 0;
        }
        if !features.has_paint() {
            t.tile_color = 0;
        }
        t.brick_style = if !format.supports_slope(t.tile_type) {
            BrickStyle::Full
        } else if features.has_brick_style() {
            t.brick_style
        } else if features.has_half_brick() && t.brick_style == BrickStyle::HalfBrick {
            BrickStyle::HalfBrick
        } else {
            BrickStyle::Full
        };
    }

    if t.wall >= format.wall_limit()
        || (features.is_packed() && !features.has_wide_walls() && t.wall > 0xFF)
    {
        t.wall = 0;
    }
    if t.wall == 0 || !features.has_paint() {
        t.wall_color = 0;
    }

    if t.liquid_amount == 0 || (t.liquid_kind == LiquidKind::Honey && !features.has_honey()) {
        t.liquid_kind = LiquidKind::Water;
    }

    if !features.has_extra_wires() {
        t.wire_blue = false;
        t.wire_green = false;
    }
    if !features.has_yellow_wire() {
        t.wire_yellow = false;
    }
    if !features.has_actuators() {
        t.actuator = false;
        t.inactive = false;
    }
    t
}

fn count_unrepresentable(grid: &TileGrid, format: &TileFormat) -> (usize, usize) {
    let tile_limit = format.tile_limit();
    let wall_limit = format.wall_limit();
    grid.iter().fold((0, 0), |(tiles, walls), (_, _, t)| {
        (
            tiles + (t.active && t.tile_type >= tile_limit) as usize,
            walls + (t.wall >= wall_limit) as usize,
        )
    })
}

/// Length of the run of cells below `y` identical to `tile` after normalization.
fn run_length(column: &[Tile], y: usize, tile: &Tile, format: &TileFormat, max_run: usize) -> usize {
    let mut run = 0;
    while y + 1 + run < column.len()
        && run < max_run
        && normalize_tile(&column[y + 1 + run], format) == *tile
    {
        run += 1;
    }
    run
}

// ─── Write path ─────────────────────────────────────────────────────────────

pub fn write_tiles<W: Write>(writer: &mut W, grid: &TileGrid, format: &TileFormat) -> Result<EncodeStats> {
    let (dropped_tiles, dropped_walls) = count_unrepresentable(grid, format);
    if dropped_tiles > 0 || dropped_walls > 0 {
        log::warn!(
            "version {} cannot store {} tile(s) and {} wall(s); they are written as empty",
            format.version(),
            dropped_tiles,
            dropped_walls
        );
    }

    let packed = format.features().is_packed();
    let mut records = 0;
    for x in 0..grid.width() {
        let column = grid.column(x);
        let mut y = 0;
        while y < column.len() {
            let tile = normalize_tile(&column[y], format);
            let run = if packed {
                let run = run_length(column, y, &tile, format, PACKED_MAX_RUN);
                write_packed_cell(writer, &tile, run, format)?;
                run
            } else {
                write_sequential_cell(writer, &tile, format)?;
                if format.features().has_run_length() {
                    let run = run_length(column, y, &tile, format, SEQUENTIAL_MAX_RUN);
                    writer.write_i16::<LittleEndian>(run as i16)?;
                    run
                } else {
                    0
                }
            };
            records += 1;
            y += run + 1;
        }
    }

    Ok(EncodeStats {
        records,
        dropped_tiles,
        dropped_walls,
    })
}

fn write_sequential_cell<W: Write>(writer: &mut W, tile: &Tile, format: &TileFormat) -> Result<()> {
    let features = format.features();

    writer.write_bool(tile.active)?;
    if tile.active {
        if format.wide_tile_ids() {
            writer.write_u16::<LittleEndian>(tile.tile_type)?;
        } else {
            writer.write_u8(tile.tile_type as u8)?;
        }
        if format.is_frame_important(tile.tile_type) {
            writer.write_i16::<LittleEndian>(tile.u)?;
            writer.write_i16::<LittleEndian>(tile.v)?;
        }
        if features.has_paint() {
            writer.write_bool(tile.tile_color != 0)?;
            if tile.tile_color != 0 {
                writer.write_u8(tile.tile_color)?;
            }
        }
    }

    writer.write_bool(tile.wall != 0)?;
    if tile.wall != 0 {
        if format.wide_wall_ids() {
            writer.write_u16::<LittleEndian>(tile.wall)?;
        } else {
            writer.write_u8(tile.wall as u8)?;
        }
        if features.has_paint() {
            writer.write_bool(tile.wall_color != 0)?;
            if tile.wall_color != 0 {
                writer.write_u8(tile.wall_color)?;
            }
        }
    }

    writer.write_bool(tile.has_liquid())?;
    if tile.has_liquid() {
        writer.write_u8(tile.liquid_amount)?;
        writer.write_bool(tile.liquid_kind == LiquidKind::Lava)?;
        if features.has_honey() {
            writer.write_bool(tile.liquid_kind == LiquidKind::Honey)?;
        }
    }

    writer.write_bool(tile.wire_red)?;
    if features.has_extra_wires() {
        writer.write_bool(tile.wire_blue)?;
        writer.write_bool(tile.wire_green)?;
    }
    if features.has_actuators() {
        writer.write_bool(tile.actuator)?;
        writer.write_bool(tile.inactive)?;
    }

    if tile.active && format.supports_slope(tile.tile_type) {
        if features.has_brick_style() {
            writer.write_u8(tile.brick_style.to_byte())?;
        } else if features.has_half_brick() {
            writer.write_bool(tile.brick_style == BrickStyle::HalfBrick)?;
        }
    }
    Ok(())
}

fn write_packed_cell<W: Write>(writer: &mut W, tile: &Tile, run: usize, format: &TileFormat) -> Result<()> {
    let mut header3 = 0u8;
    if tile.actuator {
        header3 |= H3_ACTUATOR;
    }
    if tile.inactive {
        header3 |= H3_INACTIVE;
    }
    if tile.active && tile.tile_color != 0 {
        header3 |= H3_TILE_COLOR;
    }
    if tile.wall != 0 && tile.wall_color != 0 {
        header3 |= H3_WALL_COLOR;
    }
    if tile.wire_yellow {
        header3 |= H3_WIRE_YELLOW;
    }
    if tile.wall > 0xFF {
        header3 |= H3_WIDE_WALL;
    }

    let mut header2 = 0u8;
    if tile.wire_red {
        header2 |= H2_WIRE_RED;
    }
    if tile.wire_blue {
        header2 |= H2_WIRE_BLUE;
    }
    if tile.wire_green {
        header2 |= H2_WIRE_GREEN;
    }
    if tile.active && tile.brick_style != BrickStyle::Full {
        header2 |= tile.brick_style.to_byte() << H2_BRICK_SHIFT;
    }
    if header3 != 0 {
        header2 |= H2_HEADER3;
    }

    let mut header1 = 0u8;
    if tile.active {
        header1 |= H1_ACTIVE;
        if tile.tile_type > 0xFF {
            header1 |= H1_WIDE_TYPE;
        }
    }
    if tile.wall != 0 {
        header1 |= H1_WALL;
    }
    if tile.has_liquid() {
        let bits = match tile.liquid_kind {
            LiquidKind::Water => 1,
            LiquidKind::Lava => 2,
            LiquidKind::Honey => 3,
        };
        header1 |= bits << H1_LIQUID_SHIFT;
    }
    if run > 0xFF {
        header1 |= H1_RLE_SHORT;
    } else if run > 0 {
        header1 |= H1_RLE_BYTE;
    }
    if header2 != 0 {
        header1 |= H1_HEADER2;
    }

    writer.write_u8(header1)?;
    if header2 != 0 {
        writer.write_u8(header2)?;
    }
    if header3 != 0 {
        writer.write_u8(header3)?;
    }

    if tile.active {
        if tile.tile_type > 0xFF {
            writer.write_u16::<LittleEndian>(tile.tile_type)?;
        } else {
            writer.write_u8(tile.tile_type as u8)?;
        }
        if format.is_frame_important(tile.tile_type) {
            writer.write_i16::<LittleEndian>(tile.u)?;
            writer.write_i16::<LittleEndian>(tile.v)?;
        }
        if header3 & H3_TILE_COLOR != 0 {
            writer.write_u8(tile.tile_color)?;
        }
    }
    if tile.wall != 0 {
        writer.write_u8((tile.wall & 0xFF) as u8)?;
        if header3 & H3_WALL_COLOR != 0 {
            writer.write_u8(tile.wall_color)?;
        }
    }
    if tile.has_liquid() {
        writer.write_u8(tile.liquid_amount)?;
    }
    if header3 & H3_WIDE_WALL != 0 {
        writer.write_u8((tile.wall >> 8) as u8)?;
    }

    if run > 0xFF {
        writer.write_u16::<LittleEndian>(run as u16)?;
    } else if run > 0 {
        writer.write_u8(run as u8)?;
    }
    Ok(())
}

// ─── Read path ──────────────────────────────────────────────────────────────

pub fn read_tiles<R: Read>(reader: &mut R, width: u32, height: u32, format: &TileFormat) -> Result<TileGrid> {
    if !TileGrid::validate_dimensions(width as i64, height as i64) {
        return Err(Error::format(
            "tile data",
            format!("unsupported grid size {}x{}", width, height),
        ));
    }

    let mut grid = TileGrid::new(width, height);
    let features = format.features();
    let height = height as usize;

    for x in 0..width {
        let column = grid.column_mut(x);
        let mut y = 0;
        while y < height {
            let (tile, run) = if features.is_packed() {
                read_packed_cell(reader, format, x, y as u32)?
            } else {
                let tile = read_sequential_cell(reader, format, x, y as u32)?;
                let run = if features.has_run_length() {
                    let run = reader.read_i16::<LittleEndian>()?;
                    if run < 0 {
                        return Err(Error::format(
                            "tile data",
                            format!("negative run length {} at ({}, {})", run, x, y),
                        ));
                    }
                    run as usize
                } else {
                    0
                };
                (tile, run)
            };

            if y + run >= height {
                return Err(Error::format(
                    "tile data",
                    format!("run of {} at ({}, {}) overflows the column", run, x, y),
                ));
            }
            // Tiles are plain values, every run member is its own copy.
            for slot in &mut column[y..=y + run] {
                *slot = tile;
            }
            y += run + 1;
        }
    }
    Ok(grid)
}

fn read_tile_type<R: Read>(reader: &mut R, wide: bool, format: &TileFormat) -> Result<u16> {
    let tile_type = if wide {
        reader.read_u16::<LittleEndian>()?
    } else {
        reader.read_u8()? as u16
    };
    if tile_type >= format.tile_limit() {
        return Err(Error::UnknownTileType {
            tile_type,
            limit: format.tile_limit(),
        });
    }
    Ok(tile_type)
}

fn check_wall(wall: u16, format: &TileFormat) -> Result<u16> {
    if wall >= format.wall_limit() {
        return Err(Error::UnknownWallType {
            wall,
            limit: format.wall_limit(),
        });
    }
    Ok(wall)
}

fn brick_from_byte(b: u8, x: u32, y: u32) -> Result<BrickStyle> {
    BrickStyle::from_byte(b).ok_or_else(|| {
        Error::format("tile data", format!("brick style {} at ({}, {})", b, x, y))
    })
}

fn read_sequential_cell<R: Read>(reader: &mut R, format: &TileFormat, x: u32, y: u32) -> Result<Tile> {
    let features = format.features();
    let mut tile = Tile::default();

    tile.active = reader.read_bool()?;
    if tile.active {
        tile.tile_type = read_tile_type(reader, format.wide_tile_ids(), format)?;
        if format.is_frame_important(tile.tile_type) {
            tile.u = reader.read_i16::<LittleEndian>()?;
            tile.v = reader.read_i16::<LittleEndian>()?;
        }
        if features.has_paint() && reader.read_bool()? {
            tile.tile_color = reader.read_u8()?;
        }
    }

    if reader.read_bool()? {
        let wall = if format.wide_wall_ids() {
            reader.read_u16::<LittleEndian>()?
        } else {
            reader.read_u8()? as u16
        };
        tile.wall = check_wall(wall, format)?;
        if features.has_paint() && reader.read_bool()? {
            tile.wall_color = reader.read_u8()?;
        }
    }

    if reader.read_bool()? {
        tile.liquid_amount = reader.read_u8()?;
        let lava = reader.read_bool()?;
        let honey = features.has_honey() && reader.read_bool()?;
        tile.liquid_kind = match (lava, honey) {
            (false, false) => LiquidKind::Water,
            (true, false) => LiquidKind::Lava,
            (false, true) => LiquidKind::Honey,
            (true, true) => return Err(Error::CorruptLiquid { x, y }),
        };
    }

    tile.wire_red = reader.read_bool()?;
    if features.has_extra_wires() {
        tile.wire_blue = reader.read_bool()?;
        tile.wire_green = reader.read_bool()?;
    }
    if features.has_actuators() {
        tile.actuator = reader.read_bool()?;
        tile.inactive = reader.read_bool()?;
    }

    if tile.active && format.supports_slope(tile.tile_type) {
        if features.has_brick_style() {
            tile.brick_style = brick_from_byte(reader.read_u8()?, x, y)?;
        } else if features.has_half_brick() && reader.read_bool()? {
            tile.brick_style = BrickStyle::HalfBrick;
        }
    }
    Ok(tile)
}

fn read_packed_cell<R: Read>(reader: &mut R, format: &TileFormat, x: u32, y: u32) -> Result<(Tile, usize)> {
    let header1 = reader.read_u8()?;
    let header2 = if header1 & H1_HEADER2 != 0 {
        reader.read_u8()?
    } else {
        0
    };
    let header3 = if header2 & H2_HEADER3 != 0 {
        reader.read_u8()?
    } else {
        0
    };

    let mut tile = Tile {
        active: header1 & H1_ACTIVE != 0,
        ..Default::default()
    };
    if tile.active {
        tile.tile_type = read_tile_type(reader, header1 & H1_WIDE_TYPE != 0, format)?;
        if format.is_frame_important(tile.tile_type) {
            tile.u = reader.read_i16::<LittleEndian>()?;
            tile.v = reader.read_i16::<LittleEndian>()?;
        }
        if header3 & H3_TILE_COLOR != 0 {
            tile.tile_color = reader.read_u8()?;
        }
    }

    if header1 & H1_WALL != 0 {
        tile.wall = reader.read_u8()? as u16;
        if header3 & H3_WALL_COLOR != 0 {
            tile.wall_color = reader.read_u8()?;
        }
    }

    let liquid_bits = (header1 >> H1_LIQUID_SHIFT) & 0x03;
    if liquid_bits != 0 {
        tile.liquid_amount = reader.read_u8()?;
        tile.liquid_kind = match liquid_bits {
            1 => LiquidKind::Water,
            2 => LiquidKind::Lava,
            _ => LiquidKind::Honey,
        };
    }

    if header3 & H3_WIDE_WALL != 0 {
        tile.wall |= (reader.read_u8()? as u16) << 8;
    }
    if tile.wall != 0 {
        check_wall(tile.wall, format)?;
    }

    tile.wire_red = header2 & H2_WIRE_RED != 0;
    tile.wire_blue = header2 & H2_WIRE_BLUE != 0;
    tile.wire_green = header2 & H2_WIRE_GREEN != 0;
    tile.wire_yellow = header3 & H3_WIRE_YELLOW != 0;
    tile.actuator = header3 & H3_ACTUATOR != 0;
    tile.inactive = header3 & H3_INACTIVE != 0;
    if tile.active {
        tile.brick_style = brick_from_byte((header2 >> H2_BRICK_SHIFT) & 0x07, x, y)?;
    }

    let run = match header1 & (H1_RLE_BYTE | H1_RLE_SHORT) {
        0 => 0,
        H1_RLE_BYTE => reader.read_u8()? as usize,
        H1_RLE_SHORT => reader.read_u16::<LittleEndian>()? as usize,
        _ => {
            return Err(Error::format(
                "tile data",
                format!("invalid run length width at ({}, {})", x, y),
            ))
        }
    };
    Ok((tile, run))
}

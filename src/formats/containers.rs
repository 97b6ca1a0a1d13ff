//! Chest, sign, NPC and tile-entity sub-records.
//!
//! Chests and signs come in two shapes: a fixed table of `max_*` slot
//! flags (pre-packed worlds) or a counted list. Clipboard buffers add a
//! third, the primitive chest list of the oldest buffers.

use crate::catalog::TileFormat;
use crate::entity::{Chest, ItemStack, Npc, Sign, TileEntity, TileEntityData};
use crate::error::{Error, Result};
use crate::grid::TileGrid;
use crate::io::{BinaryRead, BinaryWrite};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Hard cap on the NPC sequence, which carries no count prefix.
pub const MAX_NPCS: usize = 200;

/// Slots per chest in primitive clipboard buffers.
pub const PRIMITIVE_CHEST_SLOTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerLayout {
    /// `max_chests`/`max_signs` presence flags, u8 stack sizes.
    Slots,
    /// i16 counts, named chests, i16 stack sizes.
    Counted,
    /// i32 chest count, fixed 20 unnamed slots, no signs.
    Primitive,
}

impl ContainerLayout {
    pub fn for_format(format: &TileFormat) -> Self {
        if format.features().is_packed() {
            ContainerLayout::Counted
        } else {
            ContainerLayout::Slots
        }
    }
}

fn anchor_tile(grid: &TileGrid, x: i32, y: i32) -> Option<u16> {
    if x < 0 || y < 0 {
        return None;
    }
    grid.get(x as u32, y as u32)
        .filter(|t| t.active)
        .map(|t| t.tile_type)
}

fn checked_item(item: ItemStack, format: &TileFormat) -> ItemStack {
    if item.is_empty() {
        return ItemStack::default();
    }
    let limit = format.record().max_item_id;
    if item.item_id >= limit {
        log::warn!(
            "item id {} is not valid before id limit {}, slot emptied",
            item.item_id,
            limit
        );
        return ItemStack::default();
    }
    item
}

// ─── Chests ─────────────────────────────────────────────────────────────────

/// Shape of one chest slot on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotFormat {
    wide_stack: bool,
    by_name: bool,
    prefix: bool,
}

impl SlotFormat {
    fn for_layout(layout: ContainerLayout, format: &TileFormat) -> Self {
        let features = format.features();
        match layout {
            ContainerLayout::Slots if !features.has_item_ids() => SlotFormat {
                wide_stack: false,
                by_name: true,
                prefix: features.has_item_prefix(),
            },
            ContainerLayout::Slots | ContainerLayout::Primitive => SlotFormat {
                wide_stack: false,
                by_name: false,
                prefix: true,
            },
            ContainerLayout::Counted => SlotFormat {
                wide_stack: true,
                by_name: false,
                prefix: true,
            },
        }
    }
}

fn write_item<W: Write>(writer: &mut W, item: &ItemStack, slot: SlotFormat, format: &TileFormat) -> Result<()> {
    let mut item = *item;
    let mut name = None;
    if slot.by_name && !item.is_empty() {
        name = format.properties().item_name(item.item_id);
        if name.is_none() {
            log::warn!(
                "item id {} has no name for version {}, slot emptied",
                item.item_id,
                format.version()
            );
            item = ItemStack::default();
        }
    }

    if slot.wide_stack {
        writer.write_i16::<LittleEndian>(item.stack.max(0))?;
    } else {
        if item.stack > u8::MAX as i16 {
            log::warn!(
                "stack of {} for item {} does not fit a byte, clamped to {}",
                item.stack,
                item.item_id,
                u8::MAX
            );
        }
        writer.write_u8(item.stack.clamp(0, u8::MAX as i16) as u8)?;
    }
    if !item.is_empty() {
        match name {
            Some(name) => writer.write_string(name)?,
            None => writer.write_i32::<LittleEndian>(item.item_id)?,
        }
        if slot.prefix {
            writer.write_u8(item.prefix)?;
        }
    }
    Ok(())
}

fn read_item<R: Read>(reader: &mut R, slot: SlotFormat, format: &TileFormat) -> Result<ItemStack> {
    let stack = if slot.wide_stack {
        reader.read_i16::<LittleEndian>()?
    } else {
        reader.read_u8()? as i16
    };
    if stack <= 0 {
        return Ok(ItemStack::default());
    }
    let item_id = if slot.by_name {
        let name = reader.read_string()?;
        let id = format.properties().item_id(&name);
        if id.is_none() {
            log::warn!("unknown item name '{}', slot emptied", name);
        }
        id
    } else {
        Some(reader.read_i32::<LittleEndian>()?)
    };
    let prefix = if slot.prefix { reader.read_u8()? } else { 0 };
    Ok(match item_id {
        Some(id) => checked_item(ItemStack::new(id, stack).with_prefix(prefix), format),
        None => ItemStack::default(),
    })
}

fn fixed_slots(chest: &Chest, slots: usize, format: &TileFormat) -> Vec<ItemStack> {
    if chest.items.len() > slots && chest.items[slots..].iter().any(|i| !i.is_empty()) {
        log::warn!(
            "chest at ({}, {}) holds items past slot {}, they are dropped",
            chest.x,
            chest.y,
            slots
        );
    }
    (0..slots)
        .map(|i| {
            chest
                .items
                .get(i)
                .map(|&item| checked_item(item, format))
                .unwrap_or_default()
        })
        .collect()
}

fn truncated<'a, T>(items: &'a [T], limit: usize, what: &str) -> &'a [T] {
    if items.len() > limit {
        log::warn!("{} {} exceed the limit of {}, extras are dropped", items.len(), what, limit);
        &items[..limit]
    } else {
        items
    }
}

pub fn write_chests<W: Write>(
    writer: &mut W,
    chests: &[Chest],
    format: &TileFormat,
    layout: ContainerLayout,
) -> Result<()> {
    let record = format.record();
    let slot_format = SlotFormat::for_layout(layout, format);
    match layout {
        ContainerLayout::Slots => {
            let chests = truncated(chests, record.max_chests, "chests");
            for slot in 0..record.max_chests {
                match chests.get(slot) {
                    Some(chest) => {
                        writer.write_bool(true)?;
                        writer.write_i32::<LittleEndian>(chest.x)?;
                        writer.write_i32::<LittleEndian>(chest.y)?;
                        for item in fixed_slots(chest, record.chest_slots, format) {
                            write_item(writer, &item, slot_format, format)?;
                        }
                    }
                    None => writer.write_bool(false)?,
                }
            }
        }
        ContainerLayout::Counted => {
            let chests = truncated(chests, record.max_chests.min(i16::MAX as usize), "chests");
            writer.write_i16::<LittleEndian>(chests.len() as i16)?;
            writer.write_i16::<LittleEndian>(record.chest_slots as i16)?;
            for chest in chests {
                writer.write_i32::<LittleEndian>(chest.x)?;
                writer.write_i32::<LittleEndian>(chest.y)?;
                writer.write_string(&chest.name)?;
                for item in fixed_slots(chest, record.chest_slots, format) {
                    write_item(writer, &item, slot_format, format)?;
                }
            }
        }
        ContainerLayout::Primitive => {
            let chests = truncated(chests, record.max_chests, "chests");
            writer.write_i32::<LittleEndian>(chests.len() as i32)?;
            for chest in chests {
                writer.write_i32::<LittleEndian>(chest.x)?;
                writer.write_i32::<LittleEndian>(chest.y)?;
                for item in fixed_slots(chest, PRIMITIVE_CHEST_SLOTS, format) {
                    write_item(writer, &item, slot_format, format)?;
                }
            }
        }
    }
    Ok(())
}

/// Reads chests, keeping only those anchored on an active chest-class tile.
pub fn read_chests<R: Read>(
    reader: &mut R,
    grid: &TileGrid,
    format: &TileFormat,
    layout: ContainerLayout,
) -> Result<Vec<Chest>> {
    let record = format.record();
    let slot_format = SlotFormat::for_layout(layout, format);
    let mut raw = Vec::new();
    match layout {
        ContainerLayout::Slots => {
            for _ in 0..record.max_chests {
                if !reader.read_bool()? {
                    continue;
                }
                let mut chest = Chest::new(
                    reader.read_i32::<LittleEndian>()?,
                    reader.read_i32::<LittleEndian>()?,
                    0,
                );
                for _ in 0..record.chest_slots {
                    chest.items.push(read_item(reader, slot_format, format)?);
                }
                raw.push(chest);
            }
        }
        ContainerLayout::Counted => {
            let count = reader.read_i16::<LittleEndian>()?;
            let slots = reader.read_i16::<LittleEndian>()?;
            if count < 0 || slots < 0 {
                return Err(Error::format(
                    "chest table",
                    format!("negative count {} or slot count {}", count, slots),
                ));
            }
            for _ in 0..count {
                let x = reader.read_i32::<LittleEndian>()?;
                let y = reader.read_i32::<LittleEndian>()?;
                let mut chest = Chest::new(x, y, 0);
                chest.name = reader.read_string()?;
                for _ in 0..slots {
                    chest.items.push(read_item(reader, slot_format, format)?);
                }
                raw.push(chest);
            }
        }
        ContainerLayout::Primitive => {
            let count = reader.read_i32::<LittleEndian>()?;
            if count < 0 {
                return Err(Error::format("chest table", format!("negative count {}", count)));
            }
            for _ in 0..count {
                let x = reader.read_i32::<LittleEndian>()?;
                let y = reader.read_i32::<LittleEndian>()?;
                let mut chest = Chest::new(x, y, 0);
                for _ in 0..PRIMITIVE_CHEST_SLOTS {
                    chest.items.push(read_item(reader, slot_format, format)?);
                }
                raw.push(chest);
            }
        }
    }
    if raw.len() > record.max_chests {
        log::warn!(
            "{} chests exceed the limit of {}, extras are dropped",
            raw.len(),
            record.max_chests
        );
        raw.truncate(record.max_chests);
    }

    let properties = format.properties();
    Ok(raw
        .into_iter()
        .filter(|chest| {
            let keep = anchor_tile(grid, chest.x, chest.y).is_some_and(|t| properties.is_chest(t));
            if !keep {
                log::warn!("chest at ({}, {}) has no chest tile, discarded", chest.x, chest.y);
            }
            keep
        })
        .collect())
}

// ─── Signs ──────────────────────────────────────────────────────────────────

fn write_sign<W: Write>(writer: &mut W, sign: &Sign) -> Result<()> {
    writer.write_string(&sign.text)?;
    writer.write_i32::<LittleEndian>(sign.x)?;
    writer.write_i32::<LittleEndian>(sign.y)?;
    Ok(())
}

fn read_sign<R: Read>(reader: &mut R) -> Result<Sign> {
    let text = reader.read_string()?;
    let x = reader.read_i32::<LittleEndian>()?;
    let y = reader.read_i32::<LittleEndian>()?;
    Ok(Sign { x, y, text })
}

pub fn write_signs<W: Write>(
    writer: &mut W,
    signs: &[Sign],
    format: &TileFormat,
    layout: ContainerLayout,
) -> Result<()> {
    let record = format.record();
    match layout {
        ContainerLayout::Slots => {
            let signs = truncated(signs, record.max_signs, "signs");
            for slot in 0..record.max_signs {
                match signs.get(slot) {
                    Some(sign) => {
                        writer.write_bool(true)?;
                        write_sign(writer, sign)?;
                    }
                    None => writer.write_bool(false)?,
                }
            }
        }
        ContainerLayout::Counted => {
            let signs = truncated(signs, record.max_signs.min(i16::MAX as usize), "signs");
            writer.write_i16::<LittleEndian>(signs.len() as i16)?;
            for sign in signs {
                write_sign(writer, sign)?;
            }
        }
        ContainerLayout::Primitive => {
            if !signs.is_empty() {
                log::warn!("primitive layout has no sign table, {} sign(s) dropped", signs.len());
            }
        }
    }
    Ok(())
}

/// Reads signs, keeping only those anchored on an active sign-class tile.
pub fn read_signs<R: Read>(
    reader: &mut R,
    grid: &TileGrid,
    format: &TileFormat,
    layout: ContainerLayout,
) -> Result<Vec<Sign>> {
    let record = format.record();
    let mut raw = Vec::new();
    match layout {
        ContainerLayout::Slots => {
            for _ in 0..record.max_signs {
                if reader.read_bool()? {
                    raw.push(read_sign(reader)?);
                }
            }
        }
        ContainerLayout::Counted => {
            let count = reader.read_i16::<LittleEndian>()?;
            if count < 0 {
                return Err(Error::format("sign table", format!("negative count {}", count)));
            }
            for _ in 0..count {
                raw.push(read_sign(reader)?);
            }
            if raw.len() > record.max_signs {
                log::warn!(
                    "{} signs exceed the limit of {}, extras are dropped",
                    raw.len(),
                    record.max_signs
                );
                raw.truncate(record.max_signs);
            }
        }
        ContainerLayout::Primitive => {}
    }

    let properties = format.properties();
    Ok(raw
        .into_iter()
        .filter(|sign| {
            let keep = anchor_tile(grid, sign.x, sign.y).is_some_and(|t| properties.is_sign(t));
            if !keep {
                log::warn!("sign at ({}, {}) has no sign tile, discarded", sign.x, sign.y);
            }
            keep
        })
        .collect())
}

// ─── NPCs ───────────────────────────────────────────────────────────────────

fn npc_sprite_valid(npc: &Npc, format: &TileFormat) -> bool {
    let limit = format.record().max_npc_id as i32;
    if format.features().has_npc_sprite_id() && npc.sprite_id >= limit {
        log::warn!(
            "NPC '{}' has sprite id {} past limit {}, dropped",
            npc.name,
            npc.sprite_id,
            limit
        );
        return false;
    }
    true
}

pub fn write_npcs<W: Write>(writer: &mut W, npcs: &[Npc], format: &TileFormat) -> Result<()> {
    let with_sprite = format.features().has_npc_sprite_id();
    let kept: Vec<&Npc> = npcs.iter().filter(|n| npc_sprite_valid(n, format)).collect();
    for npc in truncated(&kept, MAX_NPCS, "NPCs") {
        writer.write_bool(true)?;
        if with_sprite {
            writer.write_i32::<LittleEndian>(npc.sprite_id)?;
        }
        writer.write_string(&npc.name)?;
        writer.write_f32::<LittleEndian>(npc.position.0)?;
        writer.write_f32::<LittleEndian>(npc.position.1)?;
        writer.write_bool(npc.homeless)?;
        writer.write_i32::<LittleEndian>(npc.home.0)?;
        writer.write_i32::<LittleEndian>(npc.home.1)?;
    }
    writer.write_bool(false)?;
    Ok(())
}

pub fn read_npcs<R: Read>(reader: &mut R, format: &TileFormat) -> Result<Vec<Npc>> {
    let with_sprite = format.features().has_npc_sprite_id();
    let mut npcs = Vec::new();
    let mut read = 0;
    while reader.read_bool()? {
        read += 1;
        if read > MAX_NPCS {
            return Err(Error::format(
                "NPC list",
                format!("more than {} NPCs without an end marker", MAX_NPCS),
            ));
        }
        let sprite_id = if with_sprite {
            reader.read_i32::<LittleEndian>()?
        } else {
            0
        };
        let name = reader.read_string()?;
        let x = reader.read_f32::<LittleEndian>()?;
        let y = reader.read_f32::<LittleEndian>()?;
        let npc = Npc {
            sprite_id,
            name,
            position: (x, y),
            homeless: reader.read_bool()?,
            home: (
                reader.read_i32::<LittleEndian>()?,
                reader.read_i32::<LittleEndian>()?,
            ),
        };
        if npc_sprite_valid(&npc, format) {
            npcs.push(npc);
        }
    }
    Ok(npcs)
}

// ─── Tile entities ──────────────────────────────────────────────────────────

fn write_entity_item<W: Write>(writer: &mut W, item: &ItemStack, format: &TileFormat) -> Result<()> {
    let item = checked_item(*item, format);
    let item_id = i16::try_from(item.item_id).map_err(|_| {
        Error::format("tile entity", format!("item id {} does not fit i16", item.item_id))
    })?;
    writer.write_i16::<LittleEndian>(item_id)?;
    writer.write_u8(item.prefix)?;
    writer.write_i16::<LittleEndian>(item.stack.max(0))?;
    Ok(())
}

fn read_entity_item<R: Read>(reader: &mut R, format: &TileFormat) -> Result<ItemStack> {
    let item_id = reader.read_i16::<LittleEndian>()? as i32;
    let prefix = reader.read_u8()?;
    let stack = reader.read_i16::<LittleEndian>()?;
    Ok(checked_item(ItemStack::new(item_id, stack).with_prefix(prefix), format))
}

pub fn write_tile_entities<W: Write>(
    writer: &mut W,
    entities: &[TileEntity],
    format: &TileFormat,
) -> Result<()> {
    let entities = truncated(entities, format.record().max_tile_entities, "tile entities");
    writer.write_i32::<LittleEndian>(entities.len() as i32)?;
    for entity in entities {
        writer.write_u8(entity.data.kind())?;
        writer.write_i32::<LittleEndian>(entity.id)?;
        writer.write_i16::<LittleEndian>(entity.x)?;
        writer.write_i16::<LittleEndian>(entity.y)?;
        match &entity.data {
            TileEntityData::TrainingDummy { npc } => writer.write_i16::<LittleEndian>(*npc)?,
            TileEntityData::ItemFrame(item)
            | TileEntityData::WeaponRack(item)
            | TileEntityData::FoodPlatter(item) => write_entity_item(writer, item, format)?,
            TileEntityData::LogicSensor { logic, on } => {
                writer.write_u8(*logic)?;
                writer.write_bool(*on)?;
            }
            TileEntityData::Pylon => {}
        }
    }
    Ok(())
}

pub fn read_tile_entities<R: Read>(reader: &mut R, format: &TileFormat) -> Result<Vec<TileEntity>> {
    let count = reader.read_i32::<LittleEndian>()?;
    if count < 0 {
        return Err(Error::format("tile entity list", format!("negative count {}", count)));
    }
    let mut entities = Vec::with_capacity((count as usize).min(1024));
    for _ in 0..count {
        let kind = reader.read_u8()?;
        let id = reader.read_i32::<LittleEndian>()?;
        let x = reader.read_i16::<LittleEndian>()?;
        let y = reader.read_i16::<LittleEndian>()?;
        let data = match kind {
            0 => TileEntityData::TrainingDummy {
                npc: reader.read_i16::<LittleEndian>()?,
            },
            1 => TileEntityData::ItemFrame(read_entity_item(reader, format)?),
            2 => TileEntityData::LogicSensor {
                logic: reader.read_u8()?,
                on: reader.read_bool()?,
            },
            4 => TileEntityData::WeaponRack(read_entity_item(reader, format)?),
            6 => TileEntityData::FoodPlatter(read_entity_item(reader, format)?),
            7 => TileEntityData::Pylon,
            other => {
                return Err(Error::format(
                    "tile entity",
                    format!("unknown kind {} at ({}, {})", other, x, y),
                ))
            }
        };
        entities.push(TileEntity::new(id, x, y, data));
    }
    let limit = format.record().max_tile_entities;
    if entities.len() > limit {
        log::warn!(
            "{} tile entities exceed the limit of {}, extras are dropped",
            entities.len(),
            limit
        );
        entities.truncate(limit);
    }
    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{TileProperties, VersionCatalog};
    use crate::tile::Tile;
    use std::io::Cursor;

    const CHEST: u16 = 21;
    const SIGN: u16 = 55;

    fn tables() -> (VersionCatalog, TileProperties) {
        (
            VersionCatalog::builtin().unwrap(),
            TileProperties::builtin().unwrap(),
        )
    }

    fn sample_chest() -> Chest {
        Chest::new(3, 4, 20)
            .with_item(0, ItemStack::new(1, 5))
            .with_item(7, ItemStack::new(22, 99).with_prefix(3))
            .with_item(19, ItemStack::new(40, 250))
    }

    #[test]
    fn test_chest_round_trip_slot_layout() {
        let (catalog, props) = tables();
        let format = TileFormat::new(catalog.resolve(39).unwrap(), &props);
        assert_eq!(format.record().chest_slots, 20);

        let mut grid = TileGrid::new(10, 10);
        grid.set(3, 4, Tile::block(CHEST));

        let chest = sample_chest();
        let mut buf = Vec::new();
        write_chests(&mut buf, &[chest.clone()], &format, ContainerLayout::Slots).unwrap();

        // Flag + anchor + 3 full items + 17 bare stack bytes + empty slot flags.
        let max = format.record().max_chests;
        assert_eq!(buf.len(), 1 + 8 + 3 * 6 + 17 + (max - 1));

        let chests = read_chests(&mut Cursor::new(&buf), &grid, &format, ContainerLayout::Slots).unwrap();
        assert_eq!(chests, vec![chest]);
        assert_eq!(chests[0].occupied_slots(), 3);
    }

    #[test]
    fn test_chest_round_trip_counted_layout() {
        let (catalog, props) = tables();
        let format = TileFormat::new(catalog.newest().unwrap(), &props);
        let mut grid = TileGrid::new(10, 10);
        grid.set(3, 4, Tile::block(CHEST));

        let mut chest = sample_chest();
        chest.name = "loot".to_string();
        let mut buf = Vec::new();
        write_chests(&mut buf, &[chest.clone()], &format, ContainerLayout::Counted).unwrap();

        let chests = read_chests(&mut Cursor::new(&buf), &grid, &format, ContainerLayout::Counted).unwrap();
        assert_eq!(chests.len(), 1);
        let loaded = &chests[0];
        assert_eq!(loaded.name, "loot");
        // Record slot count is 40; the first 20 match and the rest are empty.
        assert_eq!(&loaded.items[..20], &chest.items[..]);
        assert!(loaded.items[20..].iter().all(ItemStack::is_empty));
    }

    #[test]
    fn test_chest_without_chest_tile_discarded() {
        let (catalog, props) = tables();
        let format = TileFormat::new(catalog.newest().unwrap(), &props);
        let grid = TileGrid::new(10, 10);
        let mut buf = Vec::new();
        write_chests(&mut buf, &[sample_chest()], &format, ContainerLayout::Counted).unwrap();
        let chests = read_chests(&mut Cursor::new(&buf), &grid, &format, ContainerLayout::Counted).unwrap();
        assert!(chests.is_empty());
    }

    #[test]
    fn test_sign_anchor_guard() {
        let (catalog, props) = tables();
        for version in [39, 279] {
            let format = TileFormat::new(catalog.resolve(version).unwrap(), &props);
            let layout = ContainerLayout::for_format(&format);
            let sign = Sign::new(5, 5, "hello");

            let mut buf = Vec::new();
            write_signs(&mut buf, &[sign.clone()], &format, layout).unwrap();

            let mut plain = TileGrid::new(10, 10);
            plain.set(5, 5, Tile::block(1));
            let dropped = read_signs(&mut Cursor::new(&buf), &plain, &format, layout).unwrap();
            assert!(dropped.is_empty());

            let mut signed = TileGrid::new(10, 10);
            signed.set(5, 5, Tile::block(SIGN));
            let kept = read_signs(&mut Cursor::new(&buf), &signed, &format, layout).unwrap();
            assert_eq!(kept, vec![sign]);
        }
    }

    #[test]
    fn test_item_past_limit_emptied() {
        let (catalog, props) = tables();
        let format = TileFormat::new(catalog.resolve(39).unwrap(), &props);
        let mut grid = TileGrid::new(1, 1);
        grid.set(0, 0, Tile::block(CHEST));
        let chest = Chest::new(0, 0, 20).with_item(0, ItemStack::new(5000, 1));
        let mut buf = Vec::new();
        write_chests(&mut buf, &[chest], &format, ContainerLayout::Slots).unwrap();
        let chests = read_chests(&mut Cursor::new(&buf), &grid, &format, ContainerLayout::Slots).unwrap();
        assert_eq!(chests[0].occupied_slots(), 0);
    }

    #[test]
    fn test_npcs_sentinel_and_sprite_ids() {
        let (catalog, props) = tables();
        let npcs = vec![
            Npc::new(22, "Guide", (100.0, 200.0)).with_home(10, 20),
            Npc::new(9999, "Unknown", (0.0, 0.0)),
        ];

        let new = TileFormat::new(catalog.newest().unwrap(), &props);
        let mut buf = Vec::new();
        write_npcs(&mut buf, &npcs, &new).unwrap();
        assert_eq!(*buf.last().unwrap(), 0);
        let loaded = read_npcs(&mut Cursor::new(&buf), &new).unwrap();
        assert_eq!(loaded, vec![npcs[0].clone()]);

        let old = TileFormat::new(catalog.resolve(146).unwrap(), &props);
        let mut buf = Vec::new();
        write_npcs(&mut buf, &npcs[..1], &old).unwrap();
        let loaded = read_npcs(&mut Cursor::new(&buf), &old).unwrap();
        assert_eq!(loaded[0].sprite_id, 0);
        assert_eq!(loaded[0].home, (10, 20));
        assert!(!loaded[0].homeless);
    }

    #[test]
    fn test_npc_list_without_end_marker_rejected() {
        let (catalog, props) = tables();
        let format = TileFormat::new(catalog.resolve(146).unwrap(), &props);
        let many: Vec<Npc> = (0..MAX_NPCS + 1).map(|i| Npc::new(0, format!("n{}", i), (0.0, 0.0))).collect();
        let mut buf = Vec::new();
        for npc in &many {
            buf.write_bool(true).unwrap();
            buf.write_string(&npc.name).unwrap();
            buf.extend_from_slice(&[0u8; 8 + 1 + 8]);
        }
        buf.write_bool(false).unwrap();
        let err = read_npcs(&mut Cursor::new(&buf), &format).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn test_tile_entities() {
        let (catalog, props) = tables();
        let format = TileFormat::new(catalog.newest().unwrap(), &props);
        let entities = vec![
            TileEntity::new(0, 4, 5, TileEntityData::TrainingDummy { npc: -1 }),
            TileEntity::new(1, 6, 7, TileEntityData::ItemFrame(ItemStack::new(12, 1).with_prefix(2))),
            TileEntity::new(2, 8, 9, TileEntityData::LogicSensor { logic: 3, on: true }),
            TileEntity::new(3, 1, 1, TileEntityData::Pylon),
        ];
        let mut buf = Vec::new();
        write_tile_entities(&mut buf, &entities, &format).unwrap();
        assert_eq!(read_tile_entities(&mut Cursor::new(&buf), &format).unwrap(), entities);

        // Unknown kind has no safe skip.
        let bad = vec![1, 0, 0, 0, 9, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(read_tile_entities(&mut Cursor::new(&bad), &format).is_err());
    }

    #[test]
    fn test_items_by_name_before_item_ids() {
        let (catalog, props) = tables();
        let mut grid = TileGrid::new(10, 10);
        grid.set(3, 4, Tile::block(CHEST));
        let chest = Chest::new(3, 4, 20)
            .with_item(0, ItemStack::new(8, 99))
            .with_item(5, ItemStack::new(1, 1).with_prefix(3));

        let format = TileFormat::for_declared(37, &catalog, &props).unwrap();
        let mut buf = Vec::new();
        write_chests(&mut buf, &[chest.clone()], &format, ContainerLayout::Slots).unwrap();
        assert!(buf.windows(5).any(|w| w == b"Torch"));
        assert!(buf.windows(12).any(|w| w == b"Iron Pickaxe"));
        let chests = read_chests(&mut Cursor::new(&buf), &grid, &format, ContainerLayout::Slots).unwrap();
        assert_eq!(chests, vec![chest.clone()]);

        // No prefix byte before version 36.
        let format = TileFormat::for_declared(35, &catalog, &props).unwrap();
        let mut buf = Vec::new();
        write_chests(&mut buf, &[chest], &format, ContainerLayout::Slots).unwrap();
        let chests = read_chests(&mut Cursor::new(&buf), &grid, &format, ContainerLayout::Slots).unwrap();
        assert_eq!(chests[0].items[5], ItemStack::new(1, 1));
        assert_eq!(chests[0].items[0], ItemStack::new(8, 99));
    }

    #[test]
    fn test_unnamed_items_emptied_in_name_layout() {
        let (catalog, props) = tables();
        let format = TileFormat::for_declared(37, &catalog, &props).unwrap();
        let mut grid = TileGrid::new(1, 1);
        grid.set(0, 0, Tile::block(CHEST));

        // Item 300 is below the id limit but has no name in the table.
        let chest = Chest::new(0, 0, 20)
            .with_item(0, ItemStack::new(300, 2))
            .with_item(1, ItemStack::new(9, 50));
        let mut buf = Vec::new();
        write_chests(&mut buf, &[chest], &format, ContainerLayout::Slots).unwrap();
        let chests = read_chests(&mut Cursor::new(&buf), &grid, &format, ContainerLayout::Slots).unwrap();
        assert!(chests[0].items[0].is_empty());
        assert_eq!(chests[0].items[1], ItemStack::new(9, 50));

        // A name the table does not know is emptied on load.
        let mut raw = Vec::new();
        raw.write_bool(true).unwrap();
        raw.extend_from_slice(&[0; 8]);
        raw.write_u8(4).unwrap();
        raw.write_string("Mystery").unwrap();
        raw.write_u8(0).unwrap();
        raw.extend_from_slice(&[0; 19]);
        raw.extend(std::iter::repeat(0).take(format.record().max_chests - 1));
        let chests = read_chests(&mut Cursor::new(&raw), &grid, &format, ContainerLayout::Slots).unwrap();
        assert_eq!(chests[0].occupied_slots(), 0);
    }

    #[test]
    fn test_byte_stack_clamped() {
        let (catalog, props) = tables();
        let format = TileFormat::new(catalog.resolve(71).unwrap(), &props);
        let mut grid = TileGrid::new(1, 1);
        grid.set(0, 0, Tile::block(CHEST));
        let chest = Chest::new(0, 0, 20).with_item(0, ItemStack::new(40, 999));
        let mut buf = Vec::new();
        write_chests(&mut buf, &[chest], &format, ContainerLayout::Slots).unwrap();
        let chests = read_chests(&mut Cursor::new(&buf), &grid, &format, ContainerLayout::Slots).unwrap();
        assert_eq!(chests[0].items[0].stack, 255);
    }

    #[test]
    fn test_tile_entity_limit() {
        let catalog = VersionCatalog::from_json(
            r#"{"versions": [
                {"save_version": 279, "release": "9.9", "max_tile_id": 700, "max_wall_id": 400,
                 "max_npc_id": 700, "max_item_id": 6000, "max_tile_entities": 2}
            ]}"#,
        )
        .unwrap();
        let (wide, props) = tables();
        let entities: Vec<TileEntity> = (0..3)
            .map(|i| TileEntity::new(i, i as i16, 0, TileEntityData::Pylon))
            .collect();

        let limited = TileFormat::new(catalog.newest().unwrap(), &props);
        let mut buf = Vec::new();
        write_tile_entities(&mut buf, &entities, &limited).unwrap();
        assert_eq!(read_tile_entities(&mut Cursor::new(&buf), &limited).unwrap(), entities[..2].to_vec());

        // Extras in the stream are read past, then dropped.
        let roomy = TileFormat::new(wide.newest().unwrap(), &props);
        let mut buf = Vec::new();
        write_tile_entities(&mut buf, &entities, &roomy).unwrap();
        let mut cursor = Cursor::new(&buf);
        assert_eq!(read_tile_entities(&mut cursor, &limited).unwrap(), entities[..2].to_vec());
        assert_eq!(cursor.position() as usize, buf.len());
    }
}

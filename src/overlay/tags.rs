//! Gzip NBT container of a sidecar and its name tables.

use super::{ModTileEntry, ModWallEntry};
use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use quartz_nbt::io::Flavor;
use quartz_nbt::{NbtCompound, NbtList, NbtTag};

pub const TILES: &str = "tiles";
pub const TILE_MAP: &str = "tileMap";
pub const WALL_MAP: &str = "wallMap";
pub const TILE_DATA: &str = "tileData";
pub const WALL_DATA: &str = "wallData";
pub const SPARSE_DATA: &str = "data";

/// Keys inside `"tiles"` owned by the codec; everything else is carried over.
pub const OWNED_KEYS: [&str; 5] = [TILE_MAP, WALL_MAP, TILE_DATA, WALL_DATA, SPARSE_DATA];

pub fn decode_root(bytes: &[u8]) -> Result<NbtCompound> {
    let reader = std::io::BufReader::new(bytes);
    let mut gz = GzDecoder::new(reader);
    let (root, _) = quartz_nbt::io::read_nbt(&mut gz, Flavor::Uncompressed)?;
    Ok(root)
}

pub fn encode_root(root: &NbtCompound, compression: Compression) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), compression);
    quartz_nbt::io::write_nbt(&mut encoder, None, root, Flavor::Uncompressed)?;
    Ok(encoder.finish()?)
}

fn entry_compounds<'a>(
    tiles: &'a NbtCompound,
    key: &str,
) -> Result<impl Iterator<Item = Result<&'a NbtCompound>> + 'a> {
    let list = match tiles.get::<_, &NbtList>(key) {
        Ok(list) => Some(list),
        Err(_) if !tiles.contains_key(key) => None,
        Err(e) => return Err(e.into()),
    };
    let owned_key = key.to_string();
    Ok(list.into_iter().flat_map(|l| l.iter()).map(move |tag| match tag {
        NbtTag::Compound(c) => Ok(c),
        _ => Err(Error::format("overlay name table", format!("{} entry is not a compound", owned_key))),
    }))
}

pub fn read_tile_map(tiles: &NbtCompound) -> Result<Vec<ModTileEntry>> {
    entry_compounds(tiles, TILE_MAP)?
        .map(|entry| {
            let entry = entry?;
            Ok(ModTileEntry {
                mod_name: entry.get::<_, &str>("mod")?.into(),
                name: entry.get::<_, &str>("name")?.into(),
                save_id: entry.get::<_, i16>("value")? as u16,
                frame_important: entry.get::<_, i8>("framed").unwrap_or(0) != 0,
            })
        })
        .collect()
}

pub fn read_wall_map(tiles: &NbtCompound) -> Result<Vec<ModWallEntry>> {
    entry_compounds(tiles, WALL_MAP)?
        .map(|entry| {
            let entry = entry?;
            Ok(ModWallEntry {
                mod_name: entry.get::<_, &str>("mod")?.into(),
                name: entry.get::<_, &str>("name")?.into(),
                save_id: entry.get::<_, i16>("value")? as u16,
            })
        })
        .collect()
}

pub fn tile_map_tag(entries: &[ModTileEntry]) -> NbtTag {
    NbtTag::List(NbtList::from(
        entries
            .iter()
            .map(|e| {
                let mut c = NbtCompound::new();
                c.insert("value", NbtTag::Short(e.save_id as i16));
                c.insert("mod", NbtTag::String(e.mod_name.to_string()));
                c.insert("name", NbtTag::String(e.name.to_string()));
                c.insert("framed", NbtTag::Byte(e.frame_important as i8));
                NbtTag::Compound(c)
            })
            .collect::<Vec<_>>(),
    ))
}

pub fn wall_map_tag(entries: &[ModWallEntry]) -> NbtTag {
    NbtTag::List(NbtList::from(
        entries
            .iter()
            .map(|e| {
                let mut c = NbtCompound::new();
                c.insert("value", NbtTag::Short(e.save_id as i16));
                c.insert("mod", NbtTag::String(e.mod_name.to_string()));
                c.insert("name", NbtTag::String(e.name.to_string()));
                NbtTag::Compound(c)
            })
            .collect::<Vec<_>>(),
    ))
}

/// Byte array stored under `key`, if present.
pub fn byte_array(compound: &NbtCompound, key: &str) -> Result<Option<Vec<u8>>> {
    if !compound.contains_key(key) {
        return Ok(None);
    }
    let bytes = compound.get::<_, &[i8]>(key)?;
    Ok(Some(bytes.iter().map(|&b| b as u8).collect()))
}

pub fn byte_array_tag(bytes: Vec<u8>) -> NbtTag {
    NbtTag::ByteArray(bytes.into_iter().map(|b| b as i8).collect())
}

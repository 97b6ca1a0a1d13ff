use crate::catalog::{Features, TileFormat, TileProperties, VersionCatalog};
use crate::entity::{Chest, Npc, Sign, TileEntity};
use crate::error::{Error, Result};
use crate::formats::containers::{self, ContainerLayout};
use crate::formats::tiles;
use crate::grid::TileGrid;
use crate::io::{BinaryRead, BinaryWrite};
use crate::world::World;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read, Seek, Write};

// ─── Types ──────────────────────────────────────────────────────────────────

/// `"relogic"` followed by file type 2 (world) in the high byte.
pub const WORLD_MAGIC: u64 = 0x0063_6967_6F6C_6572 | (2u64 << 56);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub left: i32,
    pub right: i32,
    pub top: i32,
    pub bottom: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BossFlags {
    pub eye_of_cthulhu: bool,
    pub evil_boss: bool,
    pub skeletron: bool,
    /// Stored from version 66.
    pub queen_bee: bool,
    pub destroyer: bool,
    pub twins: bool,
    pub skeletron_prime: bool,
    /// Stored from version 66.
    pub plantera: bool,
    /// Stored from version 66.
    pub golem: bool,
    /// Stored from version 147.
    pub moon_lord: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFlags {
    pub saved_goblin: bool,
    pub saved_wizard: bool,
    pub saved_mechanic: bool,
    pub defeated_goblins: bool,
    pub defeated_clown: bool,
    pub defeated_frost_legion: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Invasion {
    pub delay: i32,
    pub size: i32,
    pub kind: i32,
    pub x: f64,
}

/// Version-dependent world metadata. Fields a version does not store load
/// as their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldHeader {
    pub name: String,
    /// Stored from version 179.
    pub seed: String,
    pub world_id: i32,
    pub file_revision: u32,
    pub favorite: bool,
    pub bounds: WorldBounds,
    /// 0 normal, 1 expert, 2 master, 3 journey. Versions 140 to 208 keep
    /// only an expert flag.
    pub game_mode: i32,
    pub spawn: (i32, i32),
    pub ground_level: f64,
    pub rock_level: f64,
    pub time: f64,
    pub day_time: bool,
    pub moon_phase: i32,
    pub blood_moon: bool,
    /// Stored from version 70.
    pub eclipse: bool,
    pub dungeon: (i32, i32),
    /// Stored from version 56.
    pub crimson: bool,
    pub bosses: BossFlags,
    pub events: EventFlags,
    pub shadow_orb_smashed: bool,
    pub spawn_meteor: bool,
    pub shadow_orb_count: u8,
    pub altar_count: i32,
    pub hard_mode: bool,
    pub invasion: Invasion,
}

/// Section order of the sectioned layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Tiles,
    Chests,
    Signs,
    Npcs,
    TileEntities,
    Footer,
}

fn sections_for(features: Features) -> &'static [Section] {
    const BASE: &[Section] = &[
        Section::Header,
        Section::Tiles,
        Section::Chests,
        Section::Signs,
        Section::Npcs,
        Section::Footer,
    ];
    const WITH_ENTITIES: &[Section] = &[
        Section::Header,
        Section::Tiles,
        Section::Chests,
        Section::Signs,
        Section::Npcs,
        Section::TileEntities,
        Section::Footer,
    ];
    if features.has_tile_entities() {
        WITH_ENTITIES
    } else {
        BASE
    }
}

// ─── Header ─────────────────────────────────────────────────────────────────

fn write_header<W: Write>(w: &mut W, header: &WorldHeader, grid: &TileGrid, f: Features) -> Result<()> {
    w.write_string(&header.name)?;
    if f.has_world_seed() {
        w.write_string(&header.seed)?;
    }
    w.write_i32::<LittleEndian>(header.world_id)?;
    w.write_i32::<LittleEndian>(header.bounds.left)?;
    w.write_i32::<LittleEndian>(header.bounds.right)?;
    w.write_i32::<LittleEndian>(header.bounds.top)?;
    w.write_i32::<LittleEndian>(header.bounds.bottom)?;
    w.write_i32::<LittleEndian>(grid.height() as i32)?;
    w.write_i32::<LittleEndian>(grid.width() as i32)?;
    if f.has_game_mode() {
        w.write_i32::<LittleEndian>(header.game_mode)?;
    } else if f.has_expert_flag() {
        w.write_bool(header.game_mode >= 1)?;
    }
    w.write_i32::<LittleEndian>(header.spawn.0)?;
    w.write_i32::<LittleEndian>(header.spawn.1)?;
    w.write_f64::<LittleEndian>(header.ground_level)?;
    w.write_f64::<LittleEndian>(header.rock_level)?;
    w.write_f64::<LittleEndian>(header.time)?;
    w.write_bool(header.day_time)?;
    w.write_i32::<LittleEndian>(header.moon_phase)?;
    w.write_bool(header.blood_moon)?;
    if f.has_eclipse() {
        w.write_bool(header.eclipse)?;
    }
    w.write_i32::<LittleEndian>(header.dungeon.0)?;
    w.write_i32::<LittleEndian>(header.dungeon.1)?;
    if f.has_crimson() {
        w.write_bool(header.crimson)?;
    }

    let b = &header.bosses;
    w.write_bool(b.eye_of_cthulhu)?;
    w.write_bool(b.evil_boss)?;
    w.write_bool(b.skeletron)?;
    if f.has_hardmode_bosses() {
        w.write_bool(b.queen_bee)?;
    }
    w.write_bool(b.destroyer)?;
    w.write_bool(b.twins)?;
    w.write_bool(b.skeletron_prime)?;
    if f.has_hardmode_bosses() {
        w.write_bool(b.plantera)?;
        w.write_bool(b.golem)?;
    }
    if f.has_moon_lord() {
        w.write_bool(b.moon_lord)?;
    }

    let e = &header.events;
    w.write_bool(e.saved_goblin)?;
    w.write_bool(e.saved_wizard)?;
    w.write_bool(e.saved_mechanic)?;
    w.write_bool(e.defeated_goblins)?;
    w.write_bool(e.defeated_clown)?;
    w.write_bool(e.defeated_frost_legion)?;

    w.write_bool(header.shadow_orb_smashed)?;
    w.write_bool(header.spawn_meteor)?;
    w.write_u8(header.shadow_orb_count)?;
    w.write_i32::<LittleEndian>(header.altar_count)?;
    w.write_bool(header.hard_mode)?;
    w.write_i32::<LittleEndian>(header.invasion.delay)?;
    w.write_i32::<LittleEndian>(header.invasion.size)?;
    w.write_i32::<LittleEndian>(header.invasion.kind)?;
    w.write_f64::<LittleEndian>(header.invasion.x)?;
    Ok(())
}

/// Reads the header, returning it with the declared `(width, height)`.
fn read_header<R: Read>(r: &mut R, f: Features) -> Result<(WorldHeader, u32, u32)> {
    let mut header = WorldHeader {
        name: r.read_string()?,
        ..Default::default()
    };
    if f.has_world_seed() {
        header.seed = r.read_string()?;
    }
    header.world_id = r.read_i32::<LittleEndian>()?;
    header.bounds = WorldBounds {
        left: r.read_i32::<LittleEndian>()?,
        right: r.read_i32::<LittleEndian>()?,
        top: r.read_i32::<LittleEndian>()?,
        bottom: r.read_i32::<LittleEndian>()?,
    };
    let height = r.read_i32::<LittleEndian>()?;
    let width = r.read_i32::<LittleEndian>()?;
    if !TileGrid::validate_dimensions(width as i64, height as i64) {
        return Err(Error::format(
            "world header",
            format!("unsupported world size {}x{}", width, height),
        ));
    }
    if f.has_game_mode() {
        header.game_mode = r.read_i32::<LittleEndian>()?;
    } else if f.has_expert_flag() {
        header.game_mode = r.read_bool()? as i32;
    }
    header.spawn = (r.read_i32::<LittleEndian>()?, r.read_i32::<LittleEndian>()?);
    header.ground_level = r.read_f64::<LittleEndian>()?;
    header.rock_level = r.read_f64::<LittleEndian>()?;
    header.time = r.read_f64::<LittleEndian>()?;
    header.day_time = r.read_bool()?;
    header.moon_phase = r.read_i32::<LittleEndian>()?;
    header.blood_moon = r.read_bool()?;
    if f.has_eclipse() {
        header.eclipse = r.read_bool()?;
    }
    header.dungeon = (r.read_i32::<LittleEndian>()?, r.read_i32::<LittleEndian>()?);
    if f.has_crimson() {
        header.crimson = r.read_bool()?;
    }

    let b = &mut header.bosses;
    b.eye_of_cthulhu = r.read_bool()?;
    b.evil_boss = r.read_bool()?;
    b.skeletron = r.read_bool()?;
    if f.has_hardmode_bosses() {
        b.queen_bee = r.read_bool()?;
    }
    b.destroyer = r.read_bool()?;
    b.twins = r.read_bool()?;
    b.skeletron_prime = r.read_bool()?;
    if f.has_hardmode_bosses() {
        b.plantera = r.read_bool()?;
        b.golem = r.read_bool()?;
    }
    if f.has_moon_lord() {
        b.moon_lord = r.read_bool()?;
    }

    header.events = EventFlags {
        saved_goblin: r.read_bool()?,
        saved_wizard: r.read_bool()?,
        saved_mechanic: r.read_bool()?,
        defeated_goblins: r.read_bool()?,
        defeated_clown: r.read_bool()?,
        defeated_frost_legion: r.read_bool()?,
    };

    header.shadow_orb_smashed = r.read_bool()?;
    header.spawn_meteor = r.read_bool()?;
    header.shadow_orb_count = r.read_u8()?;
    header.altar_count = r.read_i32::<LittleEndian>()?;
    header.hard_mode = r.read_bool()?;
    header.invasion = Invasion {
        delay: r.read_i32::<LittleEndian>()?,
        size: r.read_i32::<LittleEndian>()?,
        kind: r.read_i32::<LittleEndian>()?,
        x: r.read_f64::<LittleEndian>()?,
    };
    Ok((header, width as u32, height as u32))
}

// ─── Footer ─────────────────────────────────────────────────────────────────

fn write_footer<W: Write>(w: &mut W, header: &WorldHeader, version: u32, grid: &TileGrid) -> Result<()> {
    w.write_bool(true)?;
    w.write_string(&header.name)?;
    w.write_i32::<LittleEndian>(header.world_id)?;
    w.write_i32::<LittleEndian>(version as i32)?;
    w.write_i32::<LittleEndian>(grid.width() as i32)?;
    w.write_i32::<LittleEndian>(grid.height() as i32)?;
    Ok(())
}

fn verify_footer<R: Read>(r: &mut R, header: &WorldHeader, version: u32, grid: &TileGrid) -> Result<()> {
    if !r.read_bool()? {
        return Err(Error::verification("footer marker missing"));
    }
    let name = r.read_string()?;
    let world_id = r.read_i32::<LittleEndian>()?;
    let footer_version = r.read_i32::<LittleEndian>()?;
    let width = r.read_i32::<LittleEndian>()?;
    let height = r.read_i32::<LittleEndian>()?;
    if name != header.name
        || world_id != header.world_id
        || footer_version != version as i32
        || width != grid.width() as i32
        || height != grid.height() as i32
    {
        return Err(Error::verification(format!(
            "footer ('{}', id {}, v{}, {}x{}) does not match header ('{}', id {}, v{}, {}x{})",
            name,
            world_id,
            footer_version,
            width,
            height,
            header.name,
            header.world_id,
            version,
            grid.width(),
            grid.height()
        )));
    }
    Ok(())
}

// ─── Encode ─────────────────────────────────────────────────────────────────

fn write_section<W: Write>(w: &mut W, section: Section, world: &World, format: &TileFormat) -> Result<()> {
    let features = format.features();
    let layout = ContainerLayout::for_format(format);
    match section {
        Section::Header => write_header(w, &world.header, &world.grid, features),
        Section::Tiles => {
            let stats = tiles::write_tiles(w, &world.grid, format)?;
            log::debug!("wrote {} tile records", stats.records);
            Ok(())
        }
        Section::Chests => containers::write_chests(w, &world.chests, format, layout),
        Section::Signs => containers::write_signs(w, &world.signs, format, layout),
        Section::Npcs => containers::write_npcs(w, &world.npcs, format),
        Section::TileEntities => containers::write_tile_entities(w, &world.tile_entities, format),
        Section::Footer => write_footer(w, &world.header, format.version(), &world.grid),
    }
}

/// Serializes `world` in the layout of `format`'s version.
pub fn encode_world(world: &World, format: &TileFormat) -> Result<Vec<u8>> {
    let features = format.features();
    let version = format.version();
    log::debug!(
        "encoding world '{}' as version {} ({})",
        world.header.name,
        version,
        format.record().release
    );
    if !features.has_tile_entities() && !world.tile_entities.is_empty() {
        log::warn!(
            "version {} has no tile entities, {} dropped",
            version,
            world.tile_entities.len()
        );
    }

    let mut out = Cursor::new(Vec::new());
    out.write_i32::<LittleEndian>(version as i32)?;

    if !features.is_packed() {
        for &section in sections_for(features) {
            if section != Section::TileEntities {
                write_section(&mut out, section, world, format)?;
            }
        }
        return Ok(out.into_inner());
    }

    if features.has_file_magic() {
        out.write_u64::<LittleEndian>(WORLD_MAGIC)?;
        out.write_u32::<LittleEndian>(world.header.file_revision)?;
        out.write_u64::<LittleEndian>(world.header.favorite as u64)?;
    }

    let sections = sections_for(features);
    out.write_i16::<LittleEndian>(sections.len() as i16)?;
    let table_at = out.position();
    for _ in sections {
        out.write_i32::<LittleEndian>(0)?;
    }
    out.write_bit_vector(format.frame_table())?;

    let mut pointers = Vec::with_capacity(sections.len());
    for &section in sections {
        pointers.push(out.position() as i32);
        write_section(&mut out, section, world, format)?;
    }

    let end = out.position();
    out.set_position(table_at);
    for pointer in pointers {
        out.write_i32::<LittleEndian>(pointer)?;
    }
    out.set_position(end);
    Ok(out.into_inner())
}

// ─── Decode ─────────────────────────────────────────────────────────────────

/// Declared save version at the start of a world file.
pub fn peek_version(data: &[u8]) -> Result<u32> {
    let version = Cursor::new(data).read_i32::<LittleEndian>()?;
    u32::try_from(version)
        .map_err(|_| Error::format("world file", format!("negative version {}", version)))
}

#[derive(Default)]
struct Decoded {
    declared: u32,
    header: Option<(WorldHeader, u32, u32)>,
    grid: Option<TileGrid>,
    chests: Vec<Chest>,
    signs: Vec<Sign>,
    npcs: Vec<Npc>,
    tile_entities: Vec<TileEntity>,
}

fn read_section<R: Read>(
    r: &mut R,
    section: Section,
    state: &mut Decoded,
    format: &TileFormat,
) -> Result<()> {
    let features = format.features();
    let layout = ContainerLayout::for_format(format);
    let missing = |what: &str| Error::format("world file", format!("{:?} section before {}", section, what));
    match section {
        Section::Header => state.header = Some(read_header(r, features)?),
        Section::Tiles => {
            let (_, width, height) = state.header.as_ref().ok_or_else(|| missing("header"))?;
            state.grid = Some(tiles::read_tiles(r, *width, *height, format)?);
        }
        Section::Chests => {
            let grid = state.grid.as_ref().ok_or_else(|| missing("tiles"))?;
            state.chests = containers::read_chests(r, grid, format, layout)?;
        }
        Section::Signs => {
            let grid = state.grid.as_ref().ok_or_else(|| missing("tiles"))?;
            state.signs = containers::read_signs(r, grid, format, layout)?;
        }
        Section::Npcs => state.npcs = containers::read_npcs(r, format)?,
        Section::TileEntities => state.tile_entities = containers::read_tile_entities(r, format)?,
        Section::Footer => {
            let grid = state.grid.as_ref().ok_or_else(|| missing("tiles"))?;
            let (header, _, _) = state.header.as_ref().ok_or_else(|| missing("header"))?;
            verify_footer(r, header, state.declared, grid)?;
        }
    }
    Ok(())
}

/// Parses a complete world file. Nothing is returned unless every section,
/// the section table and the footer check out.
pub fn decode_world(data: &[u8], catalog: &VersionCatalog, properties: &TileProperties) -> Result<World> {
    let declared = peek_version(data)?;
    let mut r = Cursor::new(data);
    r.set_position(4);

    let mut format = TileFormat::for_declared(declared, catalog, properties)?;
    let features = format.features();
    log::debug!(
        "world declares version {}, reading with record {} ({})",
        declared,
        format.record().save_version,
        format.record().release
    );

    let mut state = Decoded {
        declared,
        ..Default::default()
    };
    let sections = sections_for(features);
    let mut revision = 0;
    let mut favorite = false;

    if !features.is_packed() {
        for &section in sections {
            if section != Section::TileEntities {
                read_section(&mut r, section, &mut state, &format)?;
            }
        }
    } else {
        if features.has_file_magic() {
            let magic = r.read_u64::<LittleEndian>()?;
            if magic != WORLD_MAGIC {
                return Err(Error::format("world file", format!("bad magic {:#018x}", magic)));
            }
            revision = r.read_u32::<LittleEndian>()?;
            favorite = r.read_u64::<LittleEndian>()? & 1 != 0;
        }

        let count = r.read_i16::<LittleEndian>()?;
        if count as usize != sections.len() {
            return Err(Error::format(
                "world file",
                format!("{} sections, expected {}", count, sections.len()),
            ));
        }
        let mut pointers = Vec::with_capacity(sections.len());
        for _ in sections {
            pointers.push(r.read_i32::<LittleEndian>()?);
        }
        format = format.with_frame_table(r.read_bit_vector()?);

        for (&section, &pointer) in sections.iter().zip(&pointers) {
            let position = r.stream_position()?;
            if position != pointer as u64 {
                return Err(Error::verification(format!(
                    "{:?} section starts at {}, table says {}",
                    section, position, pointer
                )));
            }
            read_section(&mut r, section, &mut state, &format)?;
        }
    }

    match (state.header, state.grid) {
        (Some((mut header, _, _)), Some(grid)) => {
            header.file_revision = revision;
            header.favorite = favorite;
            Ok(World {
                version: declared,
                header,
                grid,
                chests: state.chests,
                signs: state.signs,
                npcs: state.npcs,
                tile_entities: state.tile_entities,
                native_tile_types: format.tile_limit(),
                overlay: None,
            })
        }
        _ => Err(Error::format("world file", "missing header or tile data")),
    }
}

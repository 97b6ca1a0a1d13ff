//! Save-format version catalog and the capability object threaded through
//! every codec call.

use crate::error::{Error, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const BUILTIN_VERSIONS: &str = include_str!("../data/versions.json");
const BUILTIN_TILES: &str = include_str!("../data/tiles.json");

// ─── Release identifiers ────────────────────────────────────────────────────

/// Externally visible release name such as `1.4.4.9`, ordered component-wise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReleaseId(Vec<u32>);

impl ReleaseId {
    pub fn components(&self) -> &[u32] {
        &self.0
    }
}

impl FromStr for ReleaseId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .trim()
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::format("release id", format!("'{}' is not dotted numeric", s)))?;
        if parts.is_empty() {
            return Err(Error::format("release id", "empty release id"));
        }
        Ok(ReleaseId(parts))
    }
}

impl TryFrom<String> for ReleaseId {
    type Error = crate::error::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ReleaseId> for String {
    fn from(value: ReleaseId) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

impl PartialOrd for ReleaseId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReleaseId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

// ─── Config documents ───────────────────────────────────────────────────────

/// A single id or an inclusive `[start, end]` range.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum IdSpan {
    Single(u16),
    Range([u16; 2]),
}

fn expand_spans(spans: &[IdSpan]) -> impl Iterator<Item = u16> + '_ {
    spans.iter().flat_map(|span| match *span {
        IdSpan::Single(id) => id..=id,
        IdSpan::Range([start, end]) => start..=end,
    })
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    frame_important: Vec<IdSpan>,
    versions: Vec<VersionDocument>,
    #[serde(default)]
    releases: BTreeMap<String, u32>,
}

#[derive(Debug, Deserialize)]
struct VersionDocument {
    save_version: u32,
    release: ReleaseId,
    max_tile_id: u16,
    max_wall_id: u16,
    max_npc_id: u16,
    max_item_id: i32,
    #[serde(default = "default_max_chests")]
    max_chests: usize,
    #[serde(default = "default_max_signs")]
    max_signs: usize,
    #[serde(default = "default_chest_slots")]
    chest_slots: usize,
    #[serde(default = "default_max_tile_entities")]
    max_tile_entities: usize,
    #[serde(default)]
    frame_important_except: Vec<IdSpan>,
}

fn default_max_chests() -> usize {
    1000
}
fn default_max_signs() -> usize {
    1000
}
fn default_chest_slots() -> usize {
    40
}
fn default_max_tile_entities() -> usize {
    1000
}

// ─── Catalog ────────────────────────────────────────────────────────────────

/// Capabilities of one save-format version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    pub save_version: u32,
    pub release: ReleaseId,
    /// Exclusive limits: valid ids are `0..max_*`.
    pub max_tile_id: u16,
    pub max_wall_id: u16,
    pub max_npc_id: u16,
    pub max_item_id: i32,
    pub max_chests: usize,
    pub max_signs: usize,
    pub chest_slots: usize,
    pub max_tile_entities: usize,
    frame_important: Vec<bool>,
}

impl VersionRecord {
    pub fn is_frame_important(&self, tile_type: u16) -> bool {
        self.frame_important
            .get(tile_type as usize)
            .copied()
            .unwrap_or(false)
    }

    /// One entry per tile type below `max_tile_id`.
    pub fn frame_table(&self) -> &[bool] {
        &self.frame_important
    }

    pub fn features(&self) -> Features {
        Features(self.save_version)
    }
}

/// Loaded once, read-only afterwards; shareable across threads.
#[derive(Debug, Clone)]
pub struct VersionCatalog {
    /// Sorted by `(save_version, release)`.
    records: Vec<VersionRecord>,
    releases: BTreeMap<ReleaseId, u32>,
}

impl VersionCatalog {
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_VERSIONS)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let document: CatalogDocument = serde_json::from_str(text)?;
        let base: Vec<u16> = expand_spans(&document.frame_important).collect();

        let mut records = Vec::with_capacity(document.versions.len());
        for version in document.versions {
            if version.max_tile_id == 0 || version.max_wall_id == 0 {
                return Err(Error::Catalog(format!(
                    "release {} declares an empty tile or wall range",
                    version.release
                )));
            }
            let mut frame_important = vec![false; version.max_tile_id as usize];
            for &id in &base {
                if let Some(slot) = frame_important.get_mut(id as usize) {
                    *slot = true;
                }
            }
            for id in expand_spans(&version.frame_important_except) {
                if let Some(slot) = frame_important.get_mut(id as usize) {
                    *slot = false;
                }
            }
            records.push(VersionRecord {
                save_version: version.save_version,
                release: version.release,
                max_tile_id: version.max_tile_id,
                max_wall_id: version.max_wall_id,
                max_npc_id: version.max_npc_id,
                max_item_id: version.max_item_id,
                max_chests: version.max_chests,
                max_signs: version.max_signs,
                chest_slots: version.chest_slots,
                max_tile_entities: version.max_tile_entities,
                frame_important,
            });
        }
        records.sort_by(|a, b| {
            a.save_version
                .cmp(&b.save_version)
                .then_with(|| a.release.cmp(&b.release))
        });
        {
            let mut seen = FxHashSet::default();
            if let Some(record) = records.iter().find(|r| !seen.insert(&r.release)) {
                return Err(Error::Catalog(format!(
                    "release {} is listed twice",
                    record.release
                )));
            }
        }

        let mut releases = BTreeMap::new();
        for (name, version) in document.releases {
            releases.insert(name.parse::<ReleaseId>()?, version);
        }

        Ok(VersionCatalog { records, releases })
    }

    pub fn records(&self) -> &[VersionRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn newest(&self) -> Result<&VersionRecord> {
        self.records
            .last()
            .ok_or_else(|| Error::Catalog("catalog has no version records".to_string()))
    }

    pub fn oldest(&self) -> Result<&VersionRecord> {
        self.records
            .first()
            .ok_or_else(|| Error::Catalog("catalog has no version records".to_string()))
    }

    /// Newest record whose save version is not above `version`.
    ///
    /// Versions past the catalog clamp to the newest record; versions older
    /// than every record resolve to the oldest one.
    pub fn resolve(&self, version: u32) -> Result<&VersionRecord> {
        let oldest = self.oldest()?;
        let record = self
            .records
            .iter()
            .rev()
            .find(|r| r.save_version <= version)
            .unwrap_or(oldest);
        if record.save_version != version {
            log::debug!(
                "save version {} resolved to {} ({})",
                version,
                record.save_version,
                record.release
            );
        }
        Ok(record)
    }

    /// Resolves a "save as" target by release name, falling back to the
    /// closest release that is not newer: first inside the save version the
    /// release maps to, then across the whole catalog, then the newest record.
    pub fn resolve_for_release(&self, release: &ReleaseId) -> Result<&VersionRecord> {
        let newest = self.newest()?;

        if let Some(record) = self.records.iter().find(|r| &r.release == release) {
            return Ok(record);
        }

        if let Some(&version) = self.releases.get(release) {
            let in_group = self
                .records
                .iter()
                .filter(|r| r.save_version == version && &r.release <= release)
                .max_by(|a, b| a.release.cmp(&b.release));
            if let Some(record) = in_group {
                log::debug!("release {} resolved within save version {}", release, version);
                return Ok(record);
            }
        }

        let closest = self
            .records
            .iter()
            .filter(|r| &r.release <= release)
            .max_by(|a, b| a.release.cmp(&b.release));
        if let Some(record) = closest {
            log::debug!("release {} resolved to closest {}", release, record.release);
            return Ok(record);
        }

        log::debug!("release {} predates the catalog, using {}", release, newest.release);
        Ok(newest)
    }

    /// Save version a release name maps to, if known.
    pub fn save_version_for(&self, release: &ReleaseId) -> Option<u32> {
        self.records
            .iter()
            .find(|r| &r.release == release)
            .map(|r| r.save_version)
            .or_else(|| self.releases.get(release).copied())
    }
}

// ─── Tile properties ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TileDocument {
    #[serde(default)]
    slopes: Vec<IdSpan>,
    #[serde(default)]
    signs: Vec<IdSpan>,
    #[serde(default)]
    chests: Vec<IdSpan>,
    /// Item name to item ID, for layouts that store chest items by name.
    #[serde(default)]
    items: BTreeMap<String, i32>,
}

/// Per-type properties the codecs consult beyond the version record.
#[derive(Debug, Clone, Default)]
pub struct TileProperties {
    slopes: FxHashSet<u16>,
    signs: FxHashSet<u16>,
    chests: FxHashSet<u16>,
    item_ids: FxHashMap<SmolStr, i32>,
    item_names: FxHashMap<i32, SmolStr>,
}

impl TileProperties {
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_TILES)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let document: TileDocument = serde_json::from_str(text)?;
        let mut item_ids = FxHashMap::default();
        let mut item_names = FxHashMap::default();
        for (name, id) in document.items {
            let name = SmolStr::from(name);
            item_names.entry(id).or_insert_with(|| name.clone());
            item_ids.insert(name, id);
        }
        Ok(TileProperties {
            slopes: expand_spans(&document.slopes).collect(),
            signs: expand_spans(&document.signs).collect(),
            chests: expand_spans(&document.chests).collect(),
            item_ids,
            item_names,
        })
    }

    pub fn supports_slope(&self, tile_type: u16) -> bool {
        self.slopes.contains(&tile_type)
    }

    pub fn is_sign(&self, tile_type: u16) -> bool {
        self.signs.contains(&tile_type)
    }

    pub fn is_chest(&self, tile_type: u16) -> bool {
        self.chests.contains(&tile_type)
    }

    pub fn item_id(&self, name: &str) -> Option<i32> {
        self.item_ids.get(name).copied()
    }

    /// Name written for `item_id` by name-keyed chest layouts.
    pub fn item_name(&self, item_id: i32) -> Option<&str> {
        self.item_names.get(&item_id).map(SmolStr::as_str)
    }
}

// ─── Features ───────────────────────────────────────────────────────────────

/// Feature predicates keyed by save-format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Features(pub u32);

impl Features {
    pub const RUN_LENGTH: u32 = 25;
    pub const ITEM_PREFIX: u32 = 36;
    pub const ITEM_IDS: u32 = 38;
    pub const ACTUATORS: u32 = 42;
    pub const EXTRA_WIRES: u32 = 43;
    pub const PAINT: u32 = 48;
    pub const BRICK_STYLE: u32 = 49;
    pub const HONEY: u32 = 51;
    pub const CRIMSON: u32 = 56;
    pub const HARDMODE_BOSSES: u32 = 66;
    pub const ECLIPSE: u32 = 70;
    pub const PACKED_TILES: u32 = 88;
    pub const TILE_ENTITIES: u32 = 140;
    pub const FILE_MAGIC: u32 = 140;
    pub const MOON_LORD: u32 = 147;
    pub const YELLOW_WIRE: u32 = 169;
    pub const WORLD_SEED: u32 = 179;
    pub const NPC_SPRITE_ID: u32 = 190;
    pub const GAME_MODE: u32 = 209;
    pub const WIDE_WALLS: u32 = 222;

    pub fn version(self) -> u32 {
        self.0
    }

    pub fn has_run_length(self) -> bool {
        self.0 >= Self::RUN_LENGTH
    }
    pub fn has_item_prefix(self) -> bool {
        self.0 >= Self::ITEM_PREFIX
    }
    pub fn has_item_ids(self) -> bool {
        self.0 >= Self::ITEM_IDS
    }
    pub fn has_half_brick(self) -> bool {
        self.0 >= Self::RUN_LENGTH && self.0 < Self::BRICK_STYLE
    }
    pub fn has_actuators(self) -> bool {
        self.0 >= Self::ACTUATORS
    }
    pub fn has_extra_wires(self) -> bool {
        self.0 >= Self::EXTRA_WIRES
    }
    pub fn has_paint(self) -> bool {
        self.0 >= Self::PAINT
    }
    pub fn has_brick_style(self) -> bool {
        self.0 >= Self::BRICK_STYLE
    }
    pub fn has_honey(self) -> bool {
        self.0 >= Self::HONEY
    }
    pub fn has_crimson(self) -> bool {
        self.0 >= Self::CRIMSON
    }
    pub fn has_hardmode_bosses(self) -> bool {
        self.0 >= Self::HARDMODE_BOSSES
    }
    pub fn has_eclipse(self) -> bool {
        self.0 >= Self::ECLIPSE
    }
    pub fn is_packed(self) -> bool {
        self.0 >= Self::PACKED_TILES
    }
    pub fn has_tile_entities(self) -> bool {
        self.0 >= Self::TILE_ENTITIES
    }
    pub fn has_file_magic(self) -> bool {
        self.0 >= Self::FILE_MAGIC
    }
    pub fn has_expert_flag(self) -> bool {
        self.0 >= Self::TILE_ENTITIES && self.0 < Self::GAME_MODE
    }
    pub fn has_moon_lord(self) -> bool {
        self.0 >= Self::MOON_LORD
    }
    pub fn has_yellow_wire(self) -> bool {
        self.0 >= Self::YELLOW_WIRE
    }
    pub fn has_world_seed(self) -> bool {
        self.0 >= Self::WORLD_SEED
    }
    pub fn has_npc_sprite_id(self) -> bool {
        self.0 >= Self::NPC_SPRITE_ID
    }
    pub fn has_game_mode(self) -> bool {
        self.0 >= Self::GAME_MODE
    }
    pub fn has_wide_walls(self) -> bool {
        self.0 >= Self::WIDE_WALLS
    }
}

// ─── Capability object ──────────────────────────────────────────────────────

/// Everything a codec needs to know about the layout it reads or writes.
///
/// `version` selects the layout era and may differ from the record's save
/// version when a file declares a version between two catalog entries.
#[derive(Debug, Clone)]
pub struct TileFormat<'a> {
    version: u32,
    record: &'a VersionRecord,
    properties: &'a TileProperties,
    frame_important: Cow<'a, [bool]>,
}

impl<'a> TileFormat<'a> {
    /// Format that writes exactly `record`'s layout.
    pub fn new(record: &'a VersionRecord, properties: &'a TileProperties) -> Self {
        TileFormat {
            version: record.save_version,
            record,
            properties,
            frame_important: Cow::Borrowed(record.frame_table()),
        }
    }

    /// Format for a version declared by a stream. Layout follows the declared
    /// version (clamped to the newest known), limits follow the resolved record.
    pub fn for_declared(
        declared: u32,
        catalog: &'a VersionCatalog,
        properties: &'a TileProperties,
    ) -> Result<Self> {
        let newest = catalog.newest()?.save_version;
        let record = catalog.resolve(declared)?;
        let mut format = TileFormat::new(record, properties);
        format.version = declared.min(newest);
        Ok(format)
    }

    /// Replaces the frame-importance table with one carried by the stream.
    /// Its length becomes the tile type limit.
    pub fn with_frame_table(mut self, table: Vec<bool>) -> Self {
        self.frame_important = Cow::Owned(table);
        self
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn features(&self) -> Features {
        Features(self.version)
    }

    pub fn record(&self) -> &'a VersionRecord {
        self.record
    }

    pub fn properties(&self) -> &'a TileProperties {
        self.properties
    }

    pub fn frame_table(&self) -> &[bool] {
        &self.frame_important
    }

    pub fn tile_limit(&self) -> u16 {
        self.frame_important.len().min(u16::MAX as usize) as u16
    }

    pub fn wall_limit(&self) -> u16 {
        self.record.max_wall_id
    }

    pub fn is_frame_important(&self, tile_type: u16) -> bool {
        self.frame_important
            .get(tile_type as usize)
            .copied()
            .unwrap_or(false)
    }

    pub fn supports_slope(&self, tile_type: u16) -> bool {
        tile_type < self.tile_limit() && self.properties.supports_slope(tile_type)
    }

    pub fn wide_tile_ids(&self) -> bool {
        self.tile_limit() > 256
    }

    pub fn wide_wall_ids(&self) -> bool {
        self.wall_limit() > 256
    }
}

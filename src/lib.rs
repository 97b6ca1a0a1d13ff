//! Versioned codec for 2D tile worlds.
//!
//! Reads and writes world files and clipboard buffers across every layout
//! listed in the [`VersionCatalog`], downgrading data when saving to an older
//! version, and splices mod content from a `.twld` sidecar into the grid under
//! virtual tile and wall IDs.
//!
//! ```ignore
//! use tilecodec::{SaveOptions, TileProperties, VersionCatalog, World};
//!
//! let catalog = VersionCatalog::builtin()?;
//! let properties = TileProperties::builtin()?;
//! let mut world = World::load("forest.wld", &catalog, &properties)?;
//! world.save("forest_old.wld", &catalog, &properties, &SaveOptions::for_version(102))?;
//! ```

pub mod catalog;
pub mod entity;
pub mod error;
pub mod formats;
pub mod grid;
pub mod io;
pub mod overlay;
pub mod tile;
pub mod world;

pub use catalog::{Features, ReleaseId, TileFormat, TileProperties, VersionCatalog, VersionRecord};
pub use entity::{Chest, ItemStack, Npc, Sign, TileEntity, TileEntityData};
pub use error::{Error, Result};
pub use formats::schematic::ClipboardBuffer;
pub use formats::world::WorldHeader;
pub use grid::TileGrid;
pub use overlay::{OverlayData, OverlayEncoding};
pub use tile::{BrickStyle, LiquidKind, Tile};
pub use world::{SaveOptions, World};

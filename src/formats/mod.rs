pub mod containers;
pub mod manager;
pub mod schematic;
pub mod tiles;
pub mod world;

pub use manager::{registry, LayoutRegistry, SchematicLayout};
pub use schematic::ClipboardBuffer;

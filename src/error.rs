use std::io;

/// Error type for world, clipboard and overlay codec operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("NBT error: {0}")]
    Nbt(#[from] quartz_nbt::io::NbtIoError),

    #[error("NBT structure error: {0}")]
    NbtStructure(#[from] quartz_nbt::NbtReprError),

    #[error("Configuration parse error: {0}")]
    Config(#[from] serde_json::Error),

    /// The version catalog is unusable (empty or inconsistent).
    #[error("Version catalog error: {0}")]
    Catalog(String),

    #[error("Invalid {context}: {message}")]
    Format { context: String, message: String },

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Unknown tile type {tile_type} (limit {limit})")]
    UnknownTileType { tile_type: u16, limit: u16 },

    #[error("Unknown wall type {wall} (limit {limit})")]
    UnknownWallType { wall: u16, limit: u16 },

    #[error("Corrupt liquid flags at ({x}, {y})")]
    CorruptLiquid { x: u32, y: u32 },

    /// A save-time ID in an overlay stream has no name table entry.
    #[error("Unresolved {kind} save id {id} in overlay stream")]
    UnresolvedOverlayId { kind: &'static str, id: u16 },

    #[error("Unsupported clipboard buffer: {0}")]
    UnsupportedSchematic(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn format(context: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Format {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn verification(message: impl Into<String>) -> Self {
        Error::Verification(message.into())
    }
}

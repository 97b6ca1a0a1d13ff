use crate::catalog::{TileProperties, VersionCatalog};
use crate::error::{Error, Result};
use crate::formats::schematic::{self, ClipboardBuffer};
use std::sync::OnceLock;

/// One historical clipboard buffer layout.
pub trait SchematicLayout: Send + Sync {
    fn name(&self) -> &'static str;
    /// Cheap check on the version tag that follows the buffer name.
    fn detect(&self, tag: i32) -> bool;
    fn read(
        &self,
        data: &[u8],
        catalog: &VersionCatalog,
        properties: &TileProperties,
    ) -> Result<ClipboardBuffer>;
}

/// Layouts ordered newest first. Reading walks the list, falling back to
/// the next (older) layout whenever one fails.
pub struct LayoutRegistry {
    layouts: Vec<Box<dyn SchematicLayout>>,
}

impl Default for LayoutRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutRegistry {
    pub fn new() -> Self {
        Self {
            layouts: Vec::new(),
        }
    }

    pub fn register<L: SchematicLayout + 'static>(&mut self, layout: L) {
        self.layouts.push(Box::new(layout));
    }

    /// Name of the first layout whose detection accepts `data`.
    pub fn detect_layout(&self, data: &[u8]) -> Option<&'static str> {
        let tag = schematic::peek_tag(data).ok()?;
        self.layouts
            .iter()
            .find(|l| l.detect(tag))
            .map(|l| l.name())
    }

    pub fn read(
        &self,
        data: &[u8],
        catalog: &VersionCatalog,
        properties: &TileProperties,
    ) -> Result<ClipboardBuffer> {
        let tag = schematic::peek_tag(data)?;
        let mut failures = Vec::new();
        for layout in self.layouts.iter().filter(|l| l.detect(tag)) {
            log::trace!("trying clipboard layout '{}' for tag {}", layout.name(), tag);
            match layout.read(data, catalog, properties) {
                Ok(buffer) => {
                    log::debug!("clipboard buffer read with layout '{}'", layout.name());
                    return Ok(buffer);
                }
                Err(e) => {
                    log::trace!("layout '{}' rejected buffer: {}", layout.name(), e);
                    failures.push(format!("{}: {}", layout.name(), e));
                }
            }
        }
        if failures.is_empty() {
            failures.push(format!("no layout accepts version tag {}", tag));
        }
        Err(Error::UnsupportedSchematic(failures.join("; ")))
    }

    pub fn list_layouts(&self) -> Vec<&'static str> {
        self.layouts.iter().map(|l| l.name()).collect()
    }
}

static REGISTRY: OnceLock<LayoutRegistry> = OnceLock::new();

pub fn registry() -> &'static LayoutRegistry {
    REGISTRY.get_or_init(|| {
        let mut registry = LayoutRegistry::new();
        registry.register(schematic::CurrentLayout);
        // Legacy chain, most recent first.
        registry.register(schematic::PackedLayout);
        registry.register(schematic::SequentialLayout);
        registry.register(schematic::PrimitiveLayout);
        registry
    })
}

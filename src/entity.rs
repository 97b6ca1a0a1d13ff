use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStack {
    pub item_id: i32,
    pub stack: i16,
    pub prefix: u8,
}

impl ItemStack {
    pub fn new(item_id: i32, stack: i16) -> Self {
        ItemStack {
            item_id,
            stack,
            prefix: 0,
        }
    }

    pub fn with_prefix(mut self, prefix: u8) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stack <= 0
    }
}

/// A chest anchored at the top-left cell of its sprite.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chest {
    pub x: i32,
    pub y: i32,
    pub name: String,
    pub items: Vec<ItemStack>,
}

impl Chest {
    pub fn new(x: i32, y: i32, slots: usize) -> Self {
        Chest {
            x,
            y,
            name: String::new(),
            items: vec![ItemStack::default(); slots],
        }
    }

    pub fn with_item(mut self, slot: usize, item: ItemStack) -> Self {
        if slot >= self.items.len() {
            self.items.resize(slot + 1, ItemStack::default());
        }
        self.items[slot] = item;
        self
    }

    pub fn occupied_slots(&self) -> usize {
        self.items.iter().filter(|i| !i.is_empty()).count()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sign {
    pub x: i32,
    pub y: i32,
    pub text: String,
}

impl Sign {
    pub fn new(x: i32, y: i32, text: impl Into<String>) -> Self {
        Sign {
            x,
            y,
            text: text.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Npc {
    /// Engine NPC type; formats before sprite ids were stored load this as 0.
    pub sprite_id: i32,
    pub name: String,
    pub position: (f32, f32),
    pub homeless: bool,
    pub home: (i32, i32),
}

impl Npc {
    pub fn new(sprite_id: i32, name: impl Into<String>, position: (f32, f32)) -> Self {
        Npc {
            sprite_id,
            name: name.into(),
            position,
            homeless: true,
            home: (0, 0),
        }
    }

    pub fn with_home(mut self, x: i32, y: i32) -> Self {
        self.homeless = false;
        self.home = (x, y);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileEntityData {
    TrainingDummy { npc: i16 },
    ItemFrame(ItemStack),
    LogicSensor { logic: u8, on: bool },
    WeaponRack(ItemStack),
    FoodPlatter(ItemStack),
    Pylon,
}

impl TileEntityData {
    pub fn kind(&self) -> u8 {
        match self {
            TileEntityData::TrainingDummy { .. } => 0,
            TileEntityData::ItemFrame(_) => 1,
            TileEntityData::LogicSensor { .. } => 2,
            TileEntityData::WeaponRack(_) => 4,
            TileEntityData::FoodPlatter(_) => 6,
            TileEntityData::Pylon => 7,
        }
    }
}

/// Auxiliary record keyed by the anchor cell of a multi-cell object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileEntity {
    pub id: i32,
    pub x: i16,
    pub y: i16,
    pub data: TileEntityData,
}

impl TileEntity {
    pub fn new(id: i32, x: i16, y: i16, data: TileEntityData) -> Self {
        TileEntity { id, x, y, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chest_with_item_grows() {
        let chest = Chest::new(0, 0, 2).with_item(4, ItemStack::new(10, 3));
        assert_eq!(chest.items.len(), 5);
        assert_eq!(chest.occupied_slots(), 1);
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LiquidKind {
    #[default]
    Water,
    Lava,
    Honey,
}

/// Brick shape of a slope-capable block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BrickStyle {
    #[default]
    Full,
    HalfBrick,
    SlopeTopRight,
    SlopeTopLeft,
    SlopeBottomRight,
    SlopeBottomLeft,
}

impl BrickStyle {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(BrickStyle::Full),
            1 => Some(BrickStyle::HalfBrick),
            2 => Some(BrickStyle::SlopeTopRight),
            3 => Some(BrickStyle::SlopeTopLeft),
            4 => Some(BrickStyle::SlopeBottomRight),
            5 => Some(BrickStyle::SlopeBottomLeft),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// One grid cell.
///
/// `u`/`v` (the sub-tile frame) only carry meaning when the active type is
/// frame-important under the format in use; codecs zero them otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Tile {
    pub active: bool,
    pub tile_type: u16,
    pub u: i16,
    pub v: i16,
    pub tile_color: u8,
    pub wall: u16,
    pub wall_color: u8,
    pub liquid_amount: u8,
    pub liquid_kind: LiquidKind,
    pub wire_red: bool,
    pub wire_blue: bool,
    pub wire_green: bool,
    pub wire_yellow: bool,
    pub actuator: bool,
    pub inactive: bool,
    pub brick_style: BrickStyle,
}

impl Tile {
    /// An active block of `tile_type` with everything else at defaults.
    pub fn block(tile_type: u16) -> Self {
        Tile {
            active: true,
            tile_type,
            ..Default::default()
        }
    }

    pub fn with_frame(mut self, u: i16, v: i16) -> Self {
        self.u = u;
        self.v = v;
        self
    }

    pub fn with_wall(mut self, wall: u16) -> Self {
        self.wall = wall;
        self
    }

    pub fn with_liquid(mut self, amount: u8, kind: LiquidKind) -> Self {
        self.liquid_amount = amount;
        self.liquid_kind = kind;
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Tile::default()
    }

    pub fn has_liquid(&self) -> bool {
        self.liquid_amount > 0
    }

    /// Clears the block part of the cell, leaving wall, liquid and wiring.
    pub fn clear_block(&mut self) {
        self.active = false;
        self.tile_type = 0;
        self.u = 0;
        self.v = 0;
        self.tile_color = 0;
        self.brick_style = BrickStyle::Full;
        self.inactive = false;
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.active {
            write!(f, "tile {}", self.tile_type)?;
            if self.u != 0 || self.v != 0 {
                write!(f, " @({},{})", self.u, self.v)?;
            }
        } else {
            write!(f, "empty")?;
        }
        if self.wall != 0 {
            write!(f, " wall {}", self.wall)?;
        }
        if self.has_liquid() {
            write!(f, " {:?} {}", self.liquid_kind, self.liquid_amount)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brick_style_bytes() {
        for b in 0..6u8 {
            let style = BrickStyle::from_byte(b).unwrap();
            assert_eq!(style.to_byte(), b);
        }
        assert_eq!(BrickStyle::from_byte(6), None);
    }

    #[test]
    fn test_clear_block_keeps_wall_and_liquid() {
        let mut tile = Tile::block(1)
            .with_wall(4)
            .with_liquid(255, LiquidKind::Lava);
        tile.wire_red = true;
        tile.clear_block();
        assert!(!tile.active);
        assert_eq!(tile.wall, 4);
        assert_eq!(tile.liquid_kind, LiquidKind::Lava);
        assert!(tile.wire_red);
    }
}

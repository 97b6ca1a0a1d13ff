use crate::tile::Tile;
use serde::{Deserialize, Serialize};

/// Largest width or height accepted from a file header.
pub const MAX_DIMENSION: u32 = 1 << 15;

/// Dense, fixed-size 2D array of tiles stored column-major, which is the
/// order every codec scans in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileGrid {
    width: u32,
    height: u32,
    tiles: Vec<Tile>,
}

impl TileGrid {
    pub fn new(width: u32, height: u32) -> Self {
        TileGrid {
            width,
            height,
            tiles: vec![Tile::default(); width as usize * height as usize],
        }
    }

    /// Checks dimensions read from an untrusted header.
    pub fn validate_dimensions(width: i64, height: i64) -> bool {
        width > 0 && height > 0 && width <= MAX_DIMENSION as i64 && height <= MAX_DIMENSION as i64
    }

    #[inline(always)]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline(always)]
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get_dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    #[inline(always)]
    pub fn in_bounds(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    #[inline(always)]
    fn index(&self, x: u32, y: u32) -> usize {
        x as usize * self.height as usize + y as usize
    }

    pub fn get(&self, x: u32, y: u32) -> Option<&Tile> {
        if self.in_bounds(x, y) {
            Some(&self.tiles[self.index(x, y)])
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, x: u32, y: u32) -> Option<&mut Tile> {
        if self.in_bounds(x, y) {
            let index = self.index(x, y);
            Some(&mut self.tiles[index])
        } else {
            None
        }
    }

    /// Returns false when the position is outside the grid.
    pub fn set(&mut self, x: u32, y: u32, tile: Tile) -> bool {
        match self.get_mut(x, y) {
            Some(slot) => {
                *slot = tile;
                true
            }
            None => false,
        }
    }

    pub fn column(&self, x: u32) -> &[Tile] {
        let start = self.index(x, 0);
        &self.tiles[start..start + self.height as usize]
    }

    pub fn column_mut(&mut self, x: u32) -> &mut [Tile] {
        let start = self.index(x, 0);
        let end = start + self.height as usize;
        &mut self.tiles[start..end]
    }

    /// Converts a column-major linear index back to a position.
    pub fn position_of(&self, index: usize) -> (u32, u32) {
        let height = self.height as usize;
        ((index / height) as u32, (index % height) as u32)
    }

    /// Iterates `(x, y, tile)` in column-major order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, &Tile)> + '_ {
        self.tiles.iter().enumerate().map(move |(i, tile)| {
            let (x, y) = self.position_of(i);
            (x, y, tile)
        })
    }

    pub fn active_count(&self) -> usize {
        self.tiles.iter().filter(|t| t.active).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_major_layout() {
        let mut grid = TileGrid::new(3, 4);
        grid.set(1, 2, Tile::block(7));
        assert_eq!(grid.column(1)[2].tile_type, 7);
        assert_eq!(grid.position_of(4 + 2), (1, 2));
        assert!(grid.get(3, 0).is_none());
        assert!(!grid.set(0, 4, Tile::block(1)));
    }

    #[test]
    fn test_iter_order() {
        let grid = TileGrid::new(2, 2);
        let positions: Vec<(u32, u32)> = grid.iter().map(|(x, y, _)| (x, y)).collect();
        assert_eq!(positions, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn test_validate_dimensions() {
        assert!(TileGrid::validate_dimensions(10, 10));
        assert!(!TileGrid::validate_dimensions(0, 10));
        assert!(!TileGrid::validate_dimensions(10, -1));
        assert!(!TileGrid::validate_dimensions(MAX_DIMENSION as i64 + 1, 1));
    }
}

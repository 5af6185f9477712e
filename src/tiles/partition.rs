use super::{SubsetId, TileId, MAX_SUBSET_BITS};
use crate::error::{AnytimeError, Result};
use crate::voxelize::VoxelCoord;
use serde::Serialize;

/// Largest supported tile count; keeps the 2^T calibration tables bounded.
pub const MAX_TILE_COUNT: usize = 24;

/// Fixed 1-D partition of the BEV grid along the `x` voxel axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileLayout {
    tile_count: usize,
    grid_extent: usize,
    tile_size: usize,
}

impl TileLayout {
    /// `grid_extent` is the number of voxels along the tiling axis and must be
    /// an exact multiple of `tile_count` so that no tile is unreachable.
    pub fn new(tile_count: usize, grid_extent: usize) -> Result<Self> {
        if tile_count == 0 || tile_count > MAX_TILE_COUNT {
            return Err(AnytimeError::config(format!(
                "tile count {tile_count} outside [1, {MAX_TILE_COUNT}]"
            )));
        }
        if grid_extent == 0 || grid_extent % tile_count != 0 {
            return Err(AnytimeError::config(format!(
                "grid extent {grid_extent} is not divisible into {tile_count} tiles"
            )));
        }
        Ok(Self {
            tile_count,
            grid_extent,
            tile_size: grid_extent / tile_count,
        })
    }

    pub fn tile_count(&self) -> usize {
        self.tile_count
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    pub fn grid_extent(&self) -> usize {
        self.grid_extent
    }

    #[inline]
    pub fn tile_of(&self, coord: &VoxelCoord) -> TileId {
        coord.x as usize / self.tile_size
    }

    /// Assign every voxel to its tile and count occupancy per tile.
    pub fn partition(&self, coords: &[VoxelCoord]) -> Result<TilePartition> {
        let mut counts = vec![0u32; self.tile_count];
        let mut voxel_tiles = Vec::with_capacity(coords.len());
        for coord in coords {
            let tile = self.tile_of(coord);
            if tile >= self.tile_count {
                return Err(AnytimeError::invalid_input(format!(
                    "voxel x={} outside grid extent {}",
                    coord.x, self.grid_extent
                )));
            }
            counts[tile] += 1;
            voxel_tiles.push(tile);
        }
        let occupancy = TileOccupancy(counts);
        let nonempty = NonemptyTiles::from_occupancy(&occupancy);
        Ok(TilePartition {
            voxel_tiles,
            nonempty,
            occupancy,
        })
    }
}

/// Per-tile voxel counts, length `T`. Rebuilt every frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TileOccupancy(pub Vec<u32>);

impl TileOccupancy {
    pub fn zeros(tile_count: usize) -> Self {
        Self(vec![0; tile_count])
    }

    pub fn total(&self) -> u64 {
        self.0.iter().map(|&c| c as u64).sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_f64(&self) -> Vec<f64> {
        self.0.iter().map(|&c| c as f64).collect()
    }
}

/// Ascending nonempty tile ids with their voxel counts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NonemptyTiles {
    tiles: Vec<TileId>,
    counts: Vec<u32>,
}

impl NonemptyTiles {
    fn from_occupancy(occupancy: &TileOccupancy) -> Self {
        let mut tiles = Vec::new();
        let mut counts = Vec::new();
        for (tile, &count) in occupancy.0.iter().enumerate() {
            if count > 0 {
                tiles.push(tile);
                counts.push(count);
            }
        }
        Self { tiles, counts }
    }

    /// Build from explicit parallel vectors; tiles must be strictly ascending,
    /// encodable as a subset id, and every count positive.
    pub fn from_parts(tiles: Vec<TileId>, counts: Vec<u32>) -> Result<Self> {
        if tiles.len() != counts.len() {
            return Err(AnytimeError::invalid_input(format!(
                "{} tiles but {} counts",
                tiles.len(),
                counts.len()
            )));
        }
        if tiles.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AnytimeError::invalid_input(
                "nonempty tiles must be strictly ascending",
            ));
        }
        if counts.iter().any(|&c| c == 0) {
            return Err(AnytimeError::invalid_input("nonempty tile with zero count"));
        }
        if let Some(&tile) = tiles.last().filter(|&&t| t >= MAX_SUBSET_BITS) {
            return Err(AnytimeError::invalid_input(format!(
                "tile {tile} outside [0, {MAX_SUBSET_BITS})"
            )));
        }
        Ok(Self { tiles, counts })
    }

    pub fn tiles(&self) -> &[TileId] {
        &self.tiles
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn count_of(&self, tile: TileId) -> Option<u32> {
        self.tiles
            .binary_search(&tile)
            .ok()
            .map(|idx| self.counts[idx])
    }

    pub fn subset_id(&self) -> SubsetId {
        SubsetId::encode(self.tiles.iter().copied())
    }
}

/// Output of [`TileLayout::partition`].
#[derive(Clone, Debug, Default)]
pub struct TilePartition {
    /// Tile of every voxel, parallel to the input coordinates.
    pub voxel_tiles: Vec<TileId>,
    pub nonempty: NonemptyTiles,
    pub occupancy: TileOccupancy,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords(xs: &[u32]) -> Vec<VoxelCoord> {
        xs.iter().map(|&x| VoxelCoord { y: 0, x }).collect()
    }

    #[test]
    fn rejects_layouts_with_unreachable_tiles() {
        assert!(TileLayout::new(16, 100).is_err());
        assert!(TileLayout::new(0, 64).is_err());
        assert!(TileLayout::new(MAX_TILE_COUNT + 1, 1 << 20).is_err());
        assert!(TileLayout::new(16, 512).is_ok());
    }

    #[test]
    fn occupancy_sums_to_voxel_count() {
        let layout = TileLayout::new(8, 64).unwrap();
        let xs: Vec<u32> = (0..64).step_by(3).chain([0, 0, 63, 63, 63]).collect();
        let part = layout.partition(&coords(&xs)).unwrap();
        assert_eq!(part.occupancy.total(), xs.len() as u64);
        let nonempty_sum: u64 = part.nonempty.counts().iter().map(|&c| c as u64).sum();
        assert_eq!(nonempty_sum, xs.len() as u64);
        assert!(part.voxel_tiles.iter().all(|&t| t < 8));
        assert!(part.nonempty.tiles().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn tile_ids_follow_floor_division() {
        let layout = TileLayout::new(4, 32).unwrap();
        let part = layout.partition(&coords(&[0, 7, 8, 31])).unwrap();
        assert_eq!(part.voxel_tiles, vec![0, 0, 1, 3]);
        assert_eq!(part.nonempty.tiles(), &[0, 1, 3]);
        assert_eq!(part.nonempty.counts(), &[2, 1, 1]);
        assert_eq!(part.nonempty.count_of(3), Some(1));
        assert_eq!(part.nonempty.count_of(2), None);
    }

    #[test]
    fn out_of_grid_coordinate_is_rejected() {
        let layout = TileLayout::new(4, 32).unwrap();
        assert!(layout.partition(&coords(&[32])).is_err());
    }

    #[test]
    fn explicit_tiles_must_be_encodable() {
        assert!(NonemptyTiles::from_parts(vec![3, 62], vec![1, 1]).is_ok());
        assert!(matches!(
            NonemptyTiles::from_parts(vec![3, 70], vec![1, 1]),
            Err(AnytimeError::InvalidInput(_))
        ));
        assert!(NonemptyTiles::from_parts(vec![5, 3], vec![1, 1]).is_err());
        assert!(NonemptyTiles::from_parts(vec![3], vec![0]).is_err());
    }

    #[test]
    fn empty_frame_has_no_nonempty_tiles() {
        let layout = TileLayout::new(4, 32).unwrap();
        let part = layout.partition(&[]).unwrap();
        assert!(part.nonempty.is_empty());
        assert_eq!(part.occupancy, TileOccupancy::zeros(4));
    }
}

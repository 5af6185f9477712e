//! Spatial tiling of the BEV voxel grid.
//!
//! The grid is cut into `T` equal 1-D strips along the `x` voxel axis. Each
//! frame is partitioned once, before scheduling; the resulting occupancy
//! vector is the input of the time predictor and the nonempty tile list is
//! the universe the round-robin scheduler draws from.

mod partition;
mod subset;

/// Index of a tile in `[0, T)`.
pub type TileId = usize;

pub use partition::{NonemptyTiles, TileLayout, TileOccupancy, TilePartition, MAX_TILE_COUNT};
pub use subset::{table_len, SubsetId, MAX_SUBSET_BITS};

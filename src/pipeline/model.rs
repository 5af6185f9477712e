use crate::error::Result;
use crate::tiles::TileId;
use crate::types::DetectionSet;
use crate::voxelize::VoxelSet;

/// The perception network as a sequence of opaque, timed kernels.
///
/// The pipeline decides which voxels reach `backbone_3d` and which tiles the
/// later stages cover; the model only executes.
pub trait PerceptionModel {
    /// Sparse 3D backbone output.
    type Features: Send;
    /// Dense BEV features after the 2D backbone.
    type BevFeatures;
    /// Raw head outputs before decoding.
    type HeadMaps;

    fn num_det_heads(&self) -> usize;

    fn backbone_3d(&self, voxels: &VoxelSet) -> Result<Self::Features>;

    fn backbone_2d(&self, features: Self::Features, tiles: &[TileId]) -> Result<Self::BevFeatures>;

    fn head_pre(&self, bev: Self::BevFeatures, tiles: &[TileId]) -> Result<Self::HeadMaps>;

    /// Heads that produced candidates and need decoding.
    fn active_heads(&self, maps: &Self::HeadMaps) -> Vec<usize>;

    /// Decode and NMS the active heads. Returns one set per configured head
    /// (inactive heads empty).
    fn head_post(&self, maps: Self::HeadMaps, heads: &[usize]) -> Result<Vec<DetectionSet>>;
}

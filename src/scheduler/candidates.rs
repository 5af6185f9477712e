use crate::error::{AnytimeError, Result};
use crate::tiles::{NonemptyTiles, SubsetId, TileId};

/// Index in the ascending nonempty list where the rotation starts: the first
/// tile greater than `last_tile_coord`, or 0 when there is none.
pub fn rotation_start(tiles: &[TileId], last_tile_coord: Option<TileId>) -> usize {
    match last_tile_coord {
        None => 0,
        Some(last) => tiles.iter().position(|&t| t > last).unwrap_or(0),
    }
}

/// Cumulative candidate workloads of one frame.
///
/// Candidate `i` is the prefix `order[..=i]` of the rotated nonempty tiles.
/// Each candidate carries its full-width occupancy vector, tile count and
/// subset id, ready for a batched prediction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CandidateTable {
    order: Vec<TileId>,
    occupancies: Vec<Vec<f64>>,
    tile_counts: Vec<usize>,
    ids: Vec<SubsetId>,
}

impl CandidateTable {
    /// Fails when a nonempty tile lies outside `[0, tile_count)`.
    pub fn build(
        nonempty: &NonemptyTiles,
        last_tile_coord: Option<TileId>,
        tile_count: usize,
    ) -> Result<Self> {
        let tiles = nonempty.tiles();
        if let Some(&tile) = tiles.iter().find(|&&t| t >= tile_count) {
            return Err(AnytimeError::invalid_input(format!(
                "nonempty tile {tile} outside T={tile_count}"
            )));
        }
        let counts = nonempty.counts();
        let n = tiles.len();
        let start = rotation_start(tiles, last_tile_coord);

        let mut order = Vec::with_capacity(n);
        let mut occupancies = Vec::with_capacity(n);
        let mut tile_counts = Vec::with_capacity(n);
        let mut ids = Vec::with_capacity(n);
        let mut occ = vec![0.0f64; tile_count];
        let mut id = SubsetId::EMPTY;
        for k in 0..n {
            let idx = (start + k) % n;
            let tile = tiles[idx];
            order.push(tile);
            occ[tile] = counts[idx] as f64;
            id = id.with(tile)?;
            occupancies.push(occ.clone());
            tile_counts.push(k + 1);
            ids.push(id);
        }
        Ok(Self {
            order,
            occupancies,
            tile_counts,
            ids,
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Rotated tile order.
    pub fn order(&self) -> &[TileId] {
        &self.order
    }

    /// Tiles of the first `size` candidates.
    pub fn prefix(&self, size: usize) -> &[TileId] {
        &self.order[..size.min(self.order.len())]
    }

    pub fn occupancies(&self) -> &[Vec<f64>] {
        &self.occupancies
    }

    pub fn tile_counts(&self) -> &[usize] {
        &self.tile_counts
    }

    pub fn ids(&self) -> &[SubsetId] {
        &self.ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nonempty() -> NonemptyTiles {
        NonemptyTiles::from_parts(vec![2, 5, 9, 13], vec![10, 20, 30, 40]).unwrap()
    }

    #[test]
    fn rotation_starts_after_last_tile() {
        let tiles = [2, 5, 9, 13];
        assert_eq!(rotation_start(&tiles, None), 0);
        assert_eq!(rotation_start(&tiles, Some(5)), 2);
        assert_eq!(rotation_start(&tiles, Some(6)), 2);
        assert_eq!(rotation_start(&tiles, Some(13)), 0);
        assert_eq!(rotation_start(&tiles, Some(1)), 0);
    }

    #[test]
    fn candidates_are_cumulative_prefixes() {
        let table = CandidateTable::build(&nonempty(), Some(5), 16).unwrap();
        assert_eq!(table.order(), &[9, 13, 2, 5]);
        assert_eq!(table.tile_counts(), &[1, 2, 3, 4]);
        assert_eq!(table.ids()[1], SubsetId::encode([9, 13]));
        assert_eq!(table.ids()[3], SubsetId::encode([2, 5, 9, 13]));
        let occ = &table.occupancies()[1];
        assert_eq!(occ.len(), 16);
        assert_eq!(occ[9], 30.0);
        assert_eq!(occ[13], 40.0);
        assert_eq!(occ.iter().sum::<f64>(), 70.0);
        assert_eq!(table.occupancies()[3].iter().sum::<f64>(), 100.0);
        assert_eq!(table.prefix(2), &[9, 13]);
    }

    #[test]
    fn empty_set_builds_empty_table() {
        let table = CandidateTable::build(&NonemptyTiles::default(), Some(3), 8).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn tiles_beyond_the_layout_are_rejected() {
        let wide = NonemptyTiles::from_parts(vec![3, 20], vec![1, 1]).unwrap();
        assert!(matches!(
            CandidateTable::build(&wide, None, 16),
            Err(AnytimeError::InvalidInput(_))
        ));
        assert!(CandidateTable::build(&wide, None, 24).is_ok());
    }
}

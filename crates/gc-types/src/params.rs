use serde::{Deserialize, Serialize};

use crate::errors::{GcError, GcResult};

/// One (phase resolution, module count, dimension) point of the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterCombination {
    pub phase_resolution: f64,
    pub module_count: usize,
    /// Dimension as given on the command line; may be fractional.
    pub dimension: f64,
}

impl ParameterCombination {
    pub fn new(phase_resolution: f64, module_count: usize, dimension: f64) -> Self {
        Self {
            phase_resolution,
            module_count,
            dimension,
        }
    }

    /// Number of basis columns sampled for this combination: `ceil(k)`.
    pub fn column_count(&self) -> usize {
        column_count(self.dimension)
    }

    /// Two-dimensional modules can only pin down `2m` dimensions.
    pub fn is_admissible(&self) -> bool {
        2.0 * self.module_count as f64 >= self.dimension
    }
}

impl std::fmt::Display for ParameterCombination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(phr={}, m={}, k={})",
            self.phase_resolution, self.module_count, self.dimension
        )
    }
}

/// Column count for a possibly fractional dimension.
pub fn column_count(dimension: f64) -> usize {
    dimension.ceil().max(0.0) as usize
}

/// Position of a combination inside the three axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridIndex {
    pub phr: usize,
    pub m: usize,
    pub k: usize,
}

/// The three configured axes and their admissible cross-product.
///
/// Combinations are ordered phase resolution first, then module count, then
/// dimension. That order is fixed once the grid is built; batch results are
/// zipped back onto it by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterGrid {
    phase_resolutions: Vec<f64>,
    module_counts: Vec<usize>,
    dimensions: Vec<f64>,
    combinations: Vec<ParameterCombination>,
    indices: Vec<GridIndex>,
}

impl ParameterGrid {
    pub fn new(
        phase_resolutions: Vec<f64>,
        module_counts: Vec<usize>,
        dimensions: Vec<f64>,
    ) -> GcResult<Self> {
        if phase_resolutions.is_empty() || module_counts.is_empty() || dimensions.is_empty() {
            return Err(GcError::Validation(
                "phase resolution, module count and dimension lists must be non-empty".into(),
            ));
        }
        if let Some(phr) = phase_resolutions
            .iter()
            .find(|phr| !phr.is_finite() || **phr <= 0.0)
        {
            return Err(crate::validation_error!(
                "phase resolution must be positive, got {phr}"
            ));
        }
        if module_counts.contains(&0) {
            return Err(GcError::Validation("module count must be at least 1".into()));
        }
        if let Some(k) = dimensions.iter().find(|k| !k.is_finite() || **k <= 0.0) {
            return Err(crate::validation_error!("dimension must be positive, got {k}"));
        }

        let mut combinations = Vec::new();
        let mut indices = Vec::new();
        for (i_phr, &phr) in phase_resolutions.iter().enumerate() {
            for (i_m, &m) in module_counts.iter().enumerate() {
                for (i_k, &k) in dimensions.iter().enumerate() {
                    let combo = ParameterCombination::new(phr, m, k);
                    if combo.is_admissible() {
                        combinations.push(combo);
                        indices.push(GridIndex {
                            phr: i_phr,
                            m: i_m,
                            k: i_k,
                        });
                    }
                }
            }
        }

        if combinations.is_empty() {
            return Err(GcError::Validation(
                "no parameter combination satisfies 2m >= k".into(),
            ));
        }

        Ok(Self {
            phase_resolutions,
            module_counts,
            dimensions,
            combinations,
            indices,
        })
    }

    pub fn phase_resolutions(&self) -> &[f64] {
        &self.phase_resolutions
    }

    pub fn module_counts(&self) -> &[usize] {
        &self.module_counts
    }

    pub fn dimensions(&self) -> &[f64] {
        &self.dimensions
    }

    pub fn combinations(&self) -> &[ParameterCombination] {
        &self.combinations
    }

    pub fn len(&self) -> usize {
        self.combinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combinations.is_empty()
    }

    /// Combinations paired with their axis positions, in grid order.
    pub fn iter(&self) -> impl Iterator<Item = (GridIndex, &ParameterCombination)> + '_ {
        self.indices.iter().copied().zip(self.combinations.iter())
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (
            self.phase_resolutions.len(),
            self.module_counts.len(),
            self.dimensions.len(),
        )
    }

    pub fn max_module_count(&self) -> usize {
        self.module_counts.iter().copied().max().unwrap_or(0)
    }

    /// Column count needed to cover every configured dimension.
    pub fn max_column_count(&self) -> usize {
        self.dimensions
            .iter()
            .map(|&k| column_count(k))
            .max()
            .unwrap_or(0)
    }
}

/// Dense array indexed by (phase resolution, module count, dimension).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Array3<T> {
    data: Vec<Vec<Vec<T>>>,
}

impl<T: Clone> Array3<T> {
    pub fn filled(shape: (usize, usize, usize), value: T) -> Self {
        Self {
            data: vec![vec![vec![value; shape.2]; shape.1]; shape.0],
        }
    }

    pub fn get(&self, index: GridIndex) -> &T {
        &self.data[index.phr][index.m][index.k]
    }

    pub fn set(&mut self, index: GridIndex, value: T) {
        self.data[index.phr][index.m][index.k] = value;
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        let d1 = self.data.first().map_or(0, Vec::len);
        let d2 = self
            .data
            .first()
            .and_then(|plane| plane.first())
            .map_or(0, Vec::len);
        (self.data.len(), d1, d2)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.data.iter().flatten().flatten()
    }
}

impl<T: Clone + std::ops::AddAssign> Array3<T> {
    pub fn add(&mut self, index: GridIndex, value: T) {
        self.data[index.phr][index.m][index.k] += value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_product_respects_module_constraint() {
        let grid = ParameterGrid::new(vec![0.2, 0.1], vec![1, 2], vec![1.0, 3.0, 4.5]).unwrap();

        for combo in grid.combinations() {
            assert!(2 * combo.module_count >= combo.column_count());
            assert!(2.0 * combo.module_count as f64 >= combo.dimension);
        }
        // m=1 admits k=1 only; m=2 admits k=1 and k=3 (4.5 > 4).
        assert_eq!(grid.len(), 2 * 3);
    }

    #[test]
    fn combination_order_is_phase_major() {
        let grid = ParameterGrid::new(vec![0.2, 0.1], vec![3], vec![1.0, 2.0]).unwrap();
        let order: Vec<(f64, f64)> = grid
            .combinations()
            .iter()
            .map(|c| (c.phase_resolution, c.dimension))
            .collect();
        assert_eq!(order, vec![(0.2, 1.0), (0.2, 2.0), (0.1, 1.0), (0.1, 2.0)]);
    }

    #[test]
    fn grid_indices_match_axes() {
        let grid = ParameterGrid::new(vec![0.2], vec![1, 4], vec![2.0, 6.0]).unwrap();
        for (index, combo) in grid.iter() {
            assert_eq!(grid.phase_resolutions()[index.phr], combo.phase_resolution);
            assert_eq!(grid.module_counts()[index.m], combo.module_count);
            assert_eq!(grid.dimensions()[index.k], combo.dimension);
        }
        assert_eq!(grid.max_module_count(), 4);
        assert_eq!(grid.max_column_count(), 6);
    }

    #[test]
    fn fractional_dimension_rounds_up() {
        let combo = ParameterCombination::new(0.2, 3, 2.5);
        assert_eq!(combo.column_count(), 3);
        assert_eq!(column_count(4.0), 4);
    }

    #[test]
    fn empty_cross_product_is_rejected() {
        let err = ParameterGrid::new(vec![0.2], vec![1], vec![3.0]).unwrap_err();
        assert!(matches!(err, GcError::Validation(_)));
    }

    #[test]
    fn invalid_axes_are_rejected() {
        assert!(ParameterGrid::new(vec![], vec![1], vec![1.0]).is_err());
        assert!(ParameterGrid::new(vec![0.2], vec![0], vec![1.0]).is_err());
        assert!(ParameterGrid::new(vec![-0.2], vec![1], vec![1.0]).is_err());
        assert!(ParameterGrid::new(vec![0.2], vec![1], vec![f64::NAN]).is_err());
    }

    #[test]
    fn array3_accumulates() {
        let mut counts = Array3::filled((2, 1, 3), 0u64);
        let idx = GridIndex { phr: 1, m: 0, k: 2 };
        counts.add(idx, 3);
        counts.add(idx, 2);
        assert_eq!(*counts.get(idx), 5);
        assert_eq!(counts.shape(), (2, 1, 3));
        assert_eq!(counts.iter().sum::<u64>(), 5);
    }

    #[test]
    fn array3_serializes_as_nested_lists() {
        let mut sides: Array3<Option<f64>> = Array3::filled((1, 1, 2), None);
        sides.set(GridIndex { phr: 0, m: 0, k: 1 }, Some(0.5));
        let json = serde_json::to_value(&sides).unwrap();
        assert_eq!(json, serde_json::json!([[[null, 0.5]]]));
    }
}

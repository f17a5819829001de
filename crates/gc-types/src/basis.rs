use serde::{Deserialize, Serialize};

/// The 2×k matrix that maps a k-dimensional location onto one module's plane.
///
/// Stored row-major: `rows[0]` holds the x components of the k columns and
/// `rows[1]` the y components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleBasis {
    rows: [Vec<f64>; 2],
}

impl ModuleBasis {
    /// Build from explicit rows. Both rows must have the same length.
    pub fn from_rows(x: Vec<f64>, y: Vec<f64>) -> Self {
        assert_eq!(x.len(), y.len(), "module basis rows must have equal length");
        Self { rows: [x, y] }
    }

    /// Build from a list of 2D column vectors.
    pub fn from_columns(columns: &[(f64, f64)]) -> Self {
        let (x, y): (Vec<f64>, Vec<f64>) = columns.iter().copied().unzip();
        Self { rows: [x, y] }
    }

    pub fn column_count(&self) -> usize {
        self.rows[0].len()
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.rows[i]
    }

    pub fn column(&self, j: usize) -> (f64, f64) {
        (self.rows[0][j], self.rows[1][j])
    }

    /// Project a domain point onto this module's plane.
    pub fn project(&self, point: &[f64]) -> (f64, f64) {
        let x = self.rows[0].iter().zip(point).map(|(a, p)| a * p).sum();
        let y = self.rows[1].iter().zip(point).map(|(a, p)| a * p).sum();
        (x, y)
    }

    /// Keep only the first `columns` columns.
    pub fn truncated(&self, columns: usize) -> Self {
        Self {
            rows: [
                self.rows[0][..columns].to_vec(),
                self.rows[1][..columns].to_vec(),
            ],
        }
    }
}

/// A sampled grid code: one [`ModuleBasis`] per module plus the module scales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Basis {
    #[serde(rename = "A")]
    pub modules: Vec<ModuleBasis>,
    #[serde(rename = "S")]
    pub scales: Vec<f64>,
}

impl Basis {
    pub fn new(modules: Vec<ModuleBasis>, scales: Vec<f64>) -> Self {
        debug_assert_eq!(modules.len(), scales.len());
        Self { modules, scales }
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn column_count(&self) -> usize {
        self.modules.first().map_or(0, ModuleBasis::column_count)
    }

    pub fn mean_scale(&self) -> f64 {
        if self.scales.is_empty() {
            return 0.0;
        }
        self.scales.iter().sum::<f64>() / self.scales.len() as f64
    }

    /// The first `module_count` modules restricted to their first `columns`
    /// columns.
    pub fn slice(&self, module_count: usize, columns: usize) -> Basis {
        Basis {
            modules: self.modules[..module_count]
                .iter()
                .map(|module| module.truncated(columns))
                .collect(),
            scales: self.scales[..module_count].to_vec(),
        }
    }

    /// Modules reordered by descending scale. Ties keep their original order.
    pub fn sorted_by_scale_desc(&self) -> Basis {
        let mut order: Vec<usize> = (0..self.scales.len()).collect();
        order.sort_by(|&a, &b| self.scales[b].total_cmp(&self.scales[a]));
        Basis {
            modules: order.iter().map(|&i| self.modules[i].clone()).collect(),
            scales: order.iter().map(|&i| self.scales[i]).collect(),
        }
    }
}

/// Half-widths of the bin around the origin, one per dimension.
///
/// An empty rectangle means the solver could not fit any bin.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rectangle(pub Vec<f64>);

impl Rectangle {
    pub fn new(half_widths: Vec<f64>) -> Self {
        Self(half_widths)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Largest component, `None` for an empty rectangle.
    pub fn max_side(&self) -> Option<f64> {
        self.0.iter().copied().reduce(f64::max)
    }

    /// True when every component is strictly below `bound`.
    pub fn fits_below(&self, bound: f64) -> bool {
        self.0.iter().all(|&side| side < bound)
    }

    /// Non-empty and, when a bound is given, strictly below it.
    pub fn is_acceptable(&self, max_side: Option<f64>) -> bool {
        !self.is_empty() && max_side.map_or(true, |bound| self.fits_below(bound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_module_basis() -> Basis {
        Basis::new(
            vec![
                ModuleBasis::from_rows(vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]),
                ModuleBasis::from_rows(vec![7.0, 8.0, 9.0], vec![10.0, 11.0, 12.0]),
                ModuleBasis::from_rows(vec![13.0, 14.0, 15.0], vec![16.0, 17.0, 18.0]),
            ],
            vec![0.9, 1.3, 0.8],
        )
    }

    #[test]
    fn slice_takes_leading_modules_and_columns() {
        let basis = three_module_basis();
        let sliced = basis.slice(2, 2);

        assert_eq!(sliced.module_count(), 2);
        assert_eq!(sliced.column_count(), 2);
        assert_eq!(sliced.modules[1].row(0), &[7.0, 8.0]);
        assert_eq!(sliced.modules[1].row(1), &[10.0, 11.0]);
        assert_eq!(sliced.scales, vec![0.9, 1.3]);
    }

    #[test]
    fn sort_by_scale_descending_moves_modules_together() {
        let sorted = three_module_basis().sorted_by_scale_desc();
        assert_eq!(sorted.scales, vec![1.3, 0.9, 0.8]);
        assert_eq!(sorted.modules[0].column(0), (7.0, 10.0));
        assert_eq!(sorted.modules[2].column(0), (13.0, 16.0));
    }

    #[test]
    fn projection_is_matrix_vector_product() {
        let module = ModuleBasis::from_columns(&[(1.0, 0.0), (0.0, 2.0), (1.0, 1.0)]);
        assert_eq!(module.project(&[1.0, 1.0, 1.0]), (2.0, 3.0));
        assert_eq!(module.project(&[0.0, 0.5, 0.0]), (0.0, 1.0));
    }

    #[test]
    fn rectangle_acceptance() {
        let rect = Rectangle::new(vec![0.3, 0.7]);
        assert_eq!(rect.max_side(), Some(0.7));
        assert!(rect.is_acceptable(None));
        assert!(rect.is_acceptable(Some(1.0)));
        // The bound itself is rejected.
        assert!(!rect.is_acceptable(Some(0.7)));
        assert!(!Rectangle::empty().is_acceptable(None));
        assert_eq!(Rectangle::empty().max_side(), None);
    }

    #[test]
    fn basis_serializes_with_short_keys() {
        let basis = Basis::new(
            vec![ModuleBasis::from_rows(vec![1.0], vec![0.0])],
            vec![1.0],
        );
        let json = serde_json::to_value(&basis).unwrap();
        assert_eq!(json, serde_json::json!({ "A": [[[1.0], [0.0]]], "S": [1.0] }));
    }
}

//! Reference bin-rectangle solver.
//!
//! A location shares grid code zero with the origin when, in every module,
//! its projected phase lies within `phase_resolution / 2` of the lattice point
//! at the origin. That region is convex and symmetric about the origin, so an
//! origin-centred box lies inside it exactly when all of its vertices do, and
//! only half of the vertices need checking.

use std::time::{Duration, Instant};

use gc_types::{CancellationToken, ModuleBasis, Rectangle, SolverError};

use crate::solver::{BinRectangleSolver, SolverQuery};

/// Column counts above this make vertex enumeration impractical.
const MAX_COLUMNS: usize = 24;

/// Grows an origin-centred box until it touches the zero bin's boundary.
///
/// The box first grows as a hypercube, then each dimension is widened in
/// turn until a full pass gains less than the result resolution. Every
/// extent is found by bisection down to the result resolution.
#[derive(Debug, Clone, Default)]
pub struct ZeroBinSolver;

impl ZeroBinSolver {
    pub fn new() -> Self {
        Self
    }
}

impl BinRectangleSolver for ZeroBinSolver {
    fn compute_bin_rectangle(
        &self,
        query: &SolverQuery<'_>,
        cancel: &CancellationToken,
    ) -> Result<Rectangle, SolverError> {
        validate(query)?;

        let search = BoxSearch {
            modules: query.modules,
            radius_sq: (query.phase_resolution / 2.0).powi(2),
            resolution: query.result_resolution,
            upper_bound: query.upper_bound,
            started: Instant::now(),
            timeout: query.timeout,
            cancel,
        };
        let columns = query.column_count();

        let side = search.largest(0.0, |s| vec![s; columns])?;
        let mut half_widths = vec![side; columns];

        loop {
            let mut grew = false;
            for dim in 0..columns {
                let current = half_widths[dim];
                let widened = search.largest(current, |t| {
                    let mut candidate = half_widths.clone();
                    candidate[dim] = t;
                    candidate
                })?;
                if widened - current >= query.result_resolution {
                    half_widths[dim] = widened;
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }

        if half_widths.iter().any(|&h| h < query.result_resolution) {
            return Ok(Rectangle::empty());
        }
        Ok(Rectangle::new(half_widths))
    }

    fn name(&self) -> &str {
        "zero-bin"
    }
}

fn validate(query: &SolverQuery<'_>) -> Result<(), SolverError> {
    let invalid = |message: String| Err(SolverError::InvalidInput { message });

    if query.modules.is_empty() {
        return invalid("basis has no modules".into());
    }
    let columns = query.column_count();
    if columns == 0 || columns > MAX_COLUMNS {
        return invalid(format!("unsupported column count {columns}"));
    }
    if query.modules.iter().any(|m| m.column_count() != columns) {
        return invalid("modules disagree on column count".into());
    }
    if query
        .modules
        .iter()
        .any(|m| m.row(0).iter().chain(m.row(1)).any(|v| !v.is_finite()))
    {
        return invalid("basis contains non-finite entries".into());
    }
    for (name, value) in [
        ("phase resolution", query.phase_resolution),
        ("result resolution", query.result_resolution),
        ("upper bound", query.upper_bound),
    ] {
        if !value.is_finite() || value <= 0.0 {
            return invalid(format!("{name} must be positive, got {value}"));
        }
    }
    Ok(())
}

struct BoxSearch<'q> {
    modules: &'q [ModuleBasis],
    radius_sq: f64,
    resolution: f64,
    upper_bound: f64,
    started: Instant,
    timeout: Duration,
    cancel: &'q CancellationToken,
}

impl BoxSearch<'_> {
    /// Largest `t` in `[known_ok, upper_bound]` whose box `make(t)` fits,
    /// accurate to the result resolution.
    fn largest(
        &self,
        known_ok: f64,
        make: impl Fn(f64) -> Vec<f64>,
    ) -> Result<f64, SolverError> {
        self.checkpoint()?;
        if self.fits(&make(self.upper_bound)) {
            return Ok(self.upper_bound);
        }

        let mut lo = known_ok;
        let mut hi = self.upper_bound;
        while hi - lo > self.resolution {
            self.checkpoint()?;
            let mid = lo + (hi - lo) / 2.0;
            if self.fits(&make(mid)) {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    fn checkpoint(&self) -> Result<(), SolverError> {
        if self.cancel.is_cancelled() {
            return Err(SolverError::Cancelled);
        }
        if self.started.elapsed() >= self.timeout {
            return Err(SolverError::Timeout {
                timeout_seconds: self.timeout.as_secs(),
            });
        }
        Ok(())
    }

    fn fits(&self, half_widths: &[f64]) -> bool {
        let mut vertex = vec![0.0; half_widths.len()];
        HalfBoxVertices::new(half_widths).all(|bits| {
            fill_vertex(half_widths, bits, &mut vertex);
            self.modules.iter().all(|module| {
                let (x, y) = module.project(&vertex);
                x * x + y * y <= self.radius_sq
            })
        })
    }
}

/// Enumerates the sign patterns of half the vertices of an origin-centred
/// box; the last coordinate is always taken positive.
struct HalfBoxVertices {
    next: u32,
    end: u32,
}

impl HalfBoxVertices {
    fn new(half_widths: &[f64]) -> Self {
        let free = half_widths.len().saturating_sub(1) as u32;
        Self { next: 0, end: 1 << free }
    }
}

impl Iterator for HalfBoxVertices {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.next >= self.end {
            return None;
        }
        let bits = self.next;
        self.next += 1;
        Some(bits)
    }
}

fn fill_vertex(half_widths: &[f64], bits: u32, out: &mut [f64]) {
    for (i, (&h, slot)) in half_widths.iter().zip(out.iter_mut()).enumerate() {
        *slot = if bits & (1 << i) != 0 { -h } else { h };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::SolverSettings;

    fn solve(modules: &[ModuleBasis], phr: f64) -> Result<Rectangle, SolverError> {
        let query = SolverQuery::new(modules, phr, &SolverSettings::default());
        ZeroBinSolver::new().compute_bin_rectangle(&query, &CancellationToken::new())
    }

    #[test]
    fn one_dimensional_bin_is_half_the_phase_resolution() {
        let modules = vec![ModuleBasis::from_columns(&[(1.0, 0.0)])];
        let rect = solve(&modules, 0.2).unwrap();

        assert_eq!(rect.len(), 1);
        let h = rect.as_slice()[0];
        assert!(h <= 0.1 + 1e-12 && h > 0.1 - 0.01, "got {h}");
    }

    #[test]
    fn scaled_column_shrinks_the_bin() {
        let modules = vec![ModuleBasis::from_columns(&[(0.0, 2.0)])];
        let h = solve(&modules, 0.2).unwrap().as_slice()[0];
        assert!(h <= 0.05 + 1e-12 && h > 0.05 - 0.01, "got {h}");
    }

    #[test]
    fn isotropic_plane_keeps_corner_inside_disc() {
        let modules = vec![ModuleBasis::from_columns(&[(1.0, 0.0), (0.0, 1.0)])];
        let rect = solve(&modules, 0.2).unwrap();
        let (h0, h1) = (rect.as_slice()[0], rect.as_slice()[1]);

        // The corner stays inside the disc and neither side can grow by a
        // full resolution step.
        assert!(h0 * h0 + h1 * h1 <= 0.01 + 1e-12);
        let corner = 0.1 / 2f64.sqrt();
        assert!(h0 > corner - 0.02 && h1 > corner - 0.02, "got {h0}, {h1}");
    }

    #[test]
    fn unconstrained_dimension_hits_upper_bound() {
        let modules = vec![ModuleBasis::from_columns(&[(1.0, 0.0), (0.0, 0.0)])];
        let rect = solve(&modules, 0.2).unwrap();
        assert_eq!(rect.as_slice()[1], 2048.0);
        assert!(rect.as_slice()[0] <= 0.1 + 1e-12);
    }

    #[test]
    fn every_module_constrains_the_bin() {
        let modules = vec![
            ModuleBasis::from_columns(&[(1.0, 0.0)]),
            ModuleBasis::from_columns(&[(4.0, 0.0)]),
        ];
        let h = solve(&modules, 0.2).unwrap().as_slice()[0];
        assert!(h <= 0.025 + 1e-12 && h > 0.025 - 0.01, "got {h}");
    }

    #[test]
    fn unresolvable_bin_is_empty() {
        let modules = vec![ModuleBasis::from_columns(&[(1.0, 0.0)])];
        assert!(solve(&modules, 0.001).unwrap().is_empty());
    }

    #[test]
    fn zero_timeout_reports_timeout() {
        let modules = vec![ModuleBasis::from_columns(&[(1.0, 0.0)])];
        let settings = SolverSettings {
            timeout_seconds: 0,
            ..SolverSettings::default()
        };
        let mut query = SolverQuery::new(&modules, 0.2, &settings);
        query.timeout = Duration::ZERO;

        let err = ZeroBinSolver::new()
            .compute_bin_rectangle(&query, &CancellationToken::new())
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn cancelled_token_stops_the_search() {
        let modules = vec![ModuleBasis::from_columns(&[(1.0, 0.0)])];
        let query = SolverQuery::new(&modules, 0.2, &SolverSettings::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = ZeroBinSolver::new()
            .compute_bin_rectangle(&query, &cancel)
            .unwrap_err();
        assert_eq!(err, SolverError::Cancelled);
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(matches!(
            solve(&[], 0.2),
            Err(SolverError::InvalidInput { .. })
        ));

        let ragged = vec![
            ModuleBasis::from_columns(&[(1.0, 0.0)]),
            ModuleBasis::from_columns(&[(1.0, 0.0), (0.0, 1.0)]),
        ];
        assert!(matches!(
            solve(&ragged, 0.2),
            Err(SolverError::InvalidInput { .. })
        ));

        let modules = vec![ModuleBasis::from_columns(&[(f64::NAN, 0.0)])];
        assert!(matches!(
            solve(&modules, 0.2),
            Err(SolverError::InvalidInput { .. })
        ));
    }

    #[test]
    fn half_box_enumeration_fixes_last_sign() {
        let patterns: Vec<u32> = HalfBoxVertices::new(&[1.0, 1.0, 1.0]).collect();
        assert_eq!(patterns, vec![0, 1, 2, 3]);

        let mut vertex = vec![0.0; 3];
        fill_vertex(&[1.0, 2.0, 3.0], 0b01, &mut vertex);
        assert_eq!(vertex, vec![-1.0, 2.0, 3.0]);
    }
}

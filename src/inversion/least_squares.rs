//! Normal-equation least squares for small, dense systems.

use crate::distortion::DistortionError;
use log::debug;
use nalgebra::{DMatrix, DVector};

/// Systems whose pivots spread further apart than this are rejected.
///
/// After column equilibration the ratio of the smallest to the largest
/// squared Cholesky pivot approximates the reciprocal condition number of
/// `AᵗA`.
pub const MIN_PIVOT_RATIO: f64 = 1e-14;

/// Solves `min ‖A·x − b‖²` through the normal equations `AᵗA·x = Aᵗb`.
///
/// Columns of `A` are scaled to unit norm before the normal matrix is formed
/// and the scaling is undone on the solution, so the conditioning check does
/// not depend on the magnitude of the sampled radii.
///
/// # Errors
///
/// * [`DistortionError::InvalidParams`] if the dimensions disagree or the
///   system has fewer rows than columns.
/// * [`DistortionError::SingularSystem`] if a column vanishes, the normal
///   matrix is not positive definite or is too ill-conditioned, or the
///   solution is not finite.
pub fn solve_normal_equations(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
) -> Result<DVector<f64>, DistortionError> {
    let (rows, cols) = a.shape();
    if rows != b.len() {
        return Err(DistortionError::InvalidParams(format!(
            "Design matrix has {rows} rows but target has {} entries",
            b.len()
        )));
    }
    if cols == 0 || rows < cols {
        return Err(DistortionError::InvalidParams(format!(
            "Least squares needs at least as many rows as columns, got {rows}x{cols}"
        )));
    }

    let mut scaled = a.clone();
    let mut scales = DVector::zeros(cols);
    for (j, mut column) in scaled.column_iter_mut().enumerate() {
        let norm = column.norm();
        if !norm.is_finite() || norm == 0.0 {
            return Err(DistortionError::SingularSystem(format!(
                "Column {j} of the design matrix has norm {norm}"
            )));
        }
        column /= norm;
        scales[j] = norm;
    }

    let normal_matrix = scaled.transpose() * &scaled;
    let rhs = scaled.transpose() * b;

    let cholesky = normal_matrix.cholesky().ok_or_else(|| {
        DistortionError::SingularSystem("Normal matrix is not positive definite".to_string())
    })?;

    let pivots = cholesky.l_dirty().diagonal().map(|p| p * p);
    let pivot_ratio = pivots.min() / pivots.max();
    debug!("Normal equations {cols}x{cols}, pivot ratio {pivot_ratio:e}");
    if !(pivot_ratio >= MIN_PIVOT_RATIO) {
        return Err(DistortionError::SingularSystem(format!(
            "Normal matrix is ill-conditioned (pivot ratio {pivot_ratio:e})"
        )));
    }

    let mut solution = cholesky.solve(&rhs);
    solution.component_div_assign(&scales);

    if solution.iter().any(|x| !x.is_finite()) {
        return Err(DistortionError::SingularSystem(
            "Least squares solution is not finite".to_string(),
        ));
    }

    Ok(solution)
}

//! Secant-method inversion of a radial distortion.

use log::warn;
use serde::{Deserialize, Serialize};

use super::polynomial::distort;

/// Absolute tolerance on `|distort(x) - radius|`, in tan-angle units.
pub const TOLERANCE: f64 = 1e-9;
/// Upper bound on secant iterations.
pub const MAX_ITERATIONS: usize = 100;
/// Secant steps with a smaller denominator are not taken.
const MIN_DENOMINATOR: f64 = 1e-15;

/// Outcome of a single radius inversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InverseSolution {
    /// Best estimate of the undistorted radius.
    pub radius: f64,
    /// Number of secant steps taken.
    pub iterations: usize,
    /// `|distort(radius) - target|` at the returned estimate.
    pub residual: f64,
    /// Whether the residual fell below [`TOLERANCE`].
    pub converged: bool,
}

/// Finds `x` with `forward(x) == target` by the secant method.
///
/// The two starting guesses sit on either side of the identity guess
/// (`target / 0.9` and `target * 0.9`). Iteration ends on convergence, after
/// [`MAX_ITERATIONS`] steps, or when the secant slope vanishes. The point
/// with the smallest residual seen so far, starting guesses included, is
/// returned.
pub(crate) fn solve<F>(forward: F, target: f64) -> InverseSolution
where
    F: Fn(f64) -> f64,
{
    if target == 0.0 {
        return InverseSolution {
            radius: 0.0,
            iterations: 0,
            residual: 0.0,
            converged: true,
        };
    }

    let mut x0 = target / 0.9;
    let mut x1 = target * 0.9;
    let mut f0 = forward(x0) - target;
    let mut f1 = forward(x1) - target;
    let (mut best_radius, mut best_residual) = if f0.abs() < f1.abs() {
        (x0, f0.abs())
    } else {
        (x1, f1.abs())
    };

    let mut iterations = 0;
    while f1.abs() >= TOLERANCE && iterations < MAX_ITERATIONS {
        let denominator = f1 - f0;
        if denominator.abs() < MIN_DENOMINATOR {
            break;
        }

        let x2 = x1 - f1 * (x1 - x0) / denominator;
        x0 = x1;
        f0 = f1;
        x1 = x2;
        f1 = forward(x1) - target;
        iterations += 1;

        if f1.abs() < best_residual {
            best_radius = x1;
            best_residual = f1.abs();
        }
    }

    let residual = best_residual;
    let converged = residual < TOLERANCE;
    if !converged {
        warn!(
            "Inverse distortion of {} stopped after {} iterations with residual {}",
            target, iterations, residual
        );
    }

    InverseSolution {
        radius: best_radius,
        iterations,
        residual,
        converged,
    }
}

/// Inverts `radius` for the given forward coefficients and reports whether
/// the secant iteration converged.
pub fn distort_inverse_with_status(radius: f64, coefficients: &[f64]) -> InverseSolution {
    solve(|x| distort(x, coefficients), radius)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_zero_radius_is_fixed_point() {
        let solution = distort_inverse_with_status(0.0, &[0.34, 0.55]);
        assert_eq!(solution.radius, 0.0);
        assert_eq!(solution.iterations, 0);
        assert!(solution.converged);
    }

    #[test]
    fn test_identity_converges_immediately() {
        let solution = distort_inverse_with_status(0.7, &[]);
        assert!(solution.converged);
        assert_abs_diff_eq!(solution.radius, 0.7, epsilon = 1e-12);
        assert!(solution.iterations <= 1);
    }

    #[test]
    fn test_strong_barrel_distortion_converges() {
        // Cardboard V2 style lens, far outside the usual field of view.
        let coefficients = [0.34, 0.55];
        for i in 1..=20 {
            let radius = i as f64 * 0.1;
            let solution = distort_inverse_with_status(distort(radius, &coefficients), &coefficients);
            assert!(solution.converged, "radius {radius} did not converge");
            assert!(solution.iterations < MAX_ITERATIONS);
            assert_abs_diff_eq!(solution.radius, radius, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_unreachable_radius_reports_failure() {
        // r / (1 + r^2) never exceeds 0.5.
        let solution = solve(|x| x / (1.0 + x * x), 0.75);
        assert!(!solution.converged);
        assert!(solution.iterations <= MAX_ITERATIONS);
        assert!(solution.residual >= TOLERANCE);
    }

    #[test]
    fn test_stalled_iteration_returns_best_estimate() {
        // The iterates run away once the slope flattens out; the starting
        // guess target / 0.9 stays the closest point.
        let forward = |x: f64| x / (1.0 + x * x);
        let solution = solve(forward, 0.75);
        assert!(!solution.converged);
        assert_abs_diff_eq!(solution.radius, 0.75 / 0.9, epsilon = 1e-12);
        assert_abs_diff_eq!(
            solution.residual,
            (forward(solution.radius) - 0.75).abs(),
            epsilon = 1e-15
        );
        assert!(solution.residual < 0.26);
    }
}

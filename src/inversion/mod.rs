//! The `inversion` module fits polynomials that approximate the inverse of a
//! radial distortion.
//!
//! Inverting a radius with the secant method is accurate but far too slow
//! for per-vertex or per-pixel use. Instead, the forward distortion is
//! sampled over the radii a renderer needs and a new polynomial of the same
//! even-power form is fitted to the swapped pairs with linear least squares.
//!
//! The process is:
//! 1. Sample `num_samples` evenly spaced radii `rᵢ` in `[0, max_radius]`.
//! 2. Distort them, `dᵢ = distort(rᵢ)`.
//! 3. Fit `rᵢ ≈ dᵢ · (1 + c₀·dᵢ² + c₁·dᵢ⁴ + ...)`, i.e. `rᵢ/dᵢ − 1` against
//!    the columns `dᵢ², dᵢ⁴, ...`. Samples with `dᵢ = 0` carry no
//!    information about the ratio and are skipped.
//! 4. Solve the normal equations with a Cholesky decomposition.
//!
//! [`FitObjective::Radius`] fits `rᵢ − dᵢ` against `dᵢ³, dᵢ⁵, ...` instead,
//! which weights every ratio row by `dᵢ²` and favours large radii.

use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fs;

pub mod least_squares;

pub use least_squares::solve_normal_equations;

use crate::distortion::{distort, validation, DistortionError};
use crate::geometry;

/// Number of samples used when none is configured.
pub const DEFAULT_NUM_SAMPLES: usize = 100;
/// Inverse coefficients used when none is configured. More tend to become
/// numerically unstable for typical viewer lenses.
pub const DEFAULT_NUM_COEFFICIENTS: usize = 6;

/// Residual minimised by the inverse fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitObjective {
    /// `Σ (rᵢ/dᵢ − 1 − Σⱼ cⱼ·dᵢ^(2j+2))²` over the samples with `dᵢ ≠ 0`.
    #[default]
    Ratio,
    /// `Σ (rᵢ − dᵢ − Σⱼ cⱼ·dᵢ^(2j+3))²` over all samples.
    Radius,
}

/// Sampling settings for fitting an inverse distortion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InversionConfig {
    /// Number of sampled radii. Must exceed `num_coefficients`.
    pub num_samples: usize,
    /// Number of coefficients of the fitted inverse polynomial.
    pub num_coefficients: usize,
    /// Residual minimised by the fit.
    pub objective: FitObjective,
}

impl Default for InversionConfig {
    fn default() -> Self {
        InversionConfig {
            num_samples: DEFAULT_NUM_SAMPLES,
            num_coefficients: DEFAULT_NUM_COEFFICIENTS,
            objective: FitObjective::default(),
        }
    }
}

impl InversionConfig {
    /// Loads settings from a YAML file. Missing keys keep their defaults.
    ///
    /// ```yaml
    /// num_samples: 100
    /// num_coefficients: 6
    /// objective: ratio
    /// ```
    pub fn load_from_yaml(path: &str) -> Result<Self, DistortionError> {
        let contents = fs::read_to_string(path)?;
        let config: InversionConfig = serde_yaml::from_str(&contents)?;
        config.validate_params()?;
        Ok(config)
    }

    pub fn validate_params(&self) -> Result<(), DistortionError> {
        validate_sizes(self.num_samples, self.num_coefficients)
    }
}

fn validate_sizes(num_samples: usize, num_coefficients: usize) -> Result<(), DistortionError> {
    if num_coefficients == 0 {
        return Err(DistortionError::InvalidParams(
            "At least one inverse coefficient is required".to_string(),
        ));
    }
    if num_samples <= num_coefficients {
        return Err(DistortionError::InsufficientSamples {
            samples: num_samples,
            coefficients: num_coefficients,
        });
    }
    Ok(())
}

/// Computes coefficients describing the inverse of `forward_coefficients`.
///
/// # Arguments
///
/// * `forward_coefficients` - Coefficients of the distortion to invert.
/// * `max_radius` - Largest radius, in tan-angle units after forward
///   distortion, the inverse has to be valid for. Usually the inverse
///   distortion of `tan(max half field of view)`.
/// * `num_samples` - Number of sampled radii. More samples are slower but
///   more accurate; must be strictly greater than `num_inverse_coefficients`.
/// * `num_inverse_coefficients` - Number of coefficients to fit. Does not need
///   to match the number of forward coefficients.
///
/// # Errors
///
/// * [`DistortionError::InvalidParams`] for a non-positive `max_radius`,
///   non-finite forward coefficients, or zero inverse coefficients.
/// * [`DistortionError::InsufficientSamples`] if
///   `num_samples <= num_inverse_coefficients`.
/// * [`DistortionError::SingularSystem`] if the sampled data cannot determine
///   the coefficients.
pub fn invert_distortion(
    forward_coefficients: &[f64],
    max_radius: f64,
    num_samples: usize,
    num_inverse_coefficients: usize,
) -> Result<Vec<f64>, DistortionError> {
    invert_distortion_with_objective(
        forward_coefficients,
        max_radius,
        num_samples,
        num_inverse_coefficients,
        FitObjective::Ratio,
    )
}

/// Same as [`invert_distortion`] with an explicit [`FitObjective`].
pub fn invert_distortion_with_objective(
    forward_coefficients: &[f64],
    max_radius: f64,
    num_samples: usize,
    num_inverse_coefficients: usize,
    objective: FitObjective,
) -> Result<Vec<f64>, DistortionError> {
    validation::validate_coefficients(forward_coefficients)?;
    validation::validate_max_radius(max_radius)?;
    validate_sizes(num_samples, num_inverse_coefficients)?;

    let mut rows: Vec<f64> = Vec::with_capacity(num_samples * num_inverse_coefficients);
    let mut targets: Vec<f64> = Vec::with_capacity(num_samples);

    for radius in geometry::sample_radii(max_radius, num_samples) {
        let distorted = distort(radius, forward_coefficients);
        let distorted_squared = distorted * distorted;

        let (mut power, target) = match objective {
            FitObjective::Ratio => {
                if distorted == 0.0 {
                    continue;
                }
                (1.0, radius / distorted - 1.0)
            }
            FitObjective::Radius => (distorted, radius - distorted),
        };
        for _ in 0..num_inverse_coefficients {
            power *= distorted_squared;
            rows.push(power);
        }
        targets.push(target);
    }

    if targets.len() < num_inverse_coefficients {
        return Err(DistortionError::SingularSystem(format!(
            "Only {} usable samples for {} coefficients",
            targets.len(),
            num_inverse_coefficients
        )));
    }

    let a = DMatrix::from_row_slice(targets.len(), num_inverse_coefficients, &rows);
    let b = DVector::from_vec(targets);
    let solution = solve_normal_equations(&a, &b)?;
    let inverse_coefficients: Vec<f64> = solution.iter().copied().collect();

    debug!(
        "Inverted {:?} over [0, {}] with {} samples ({:?}): {:?}",
        forward_coefficients, max_radius, num_samples, objective, inverse_coefficients
    );
    info!(
        "Fitted {} inverse coefficients from {} samples",
        num_inverse_coefficients, num_samples
    );

    Ok(inverse_coefficients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_fitted_inverse_round_trip() {
        let forward = [0.1, 0.05];
        let max_radius = 1.0;
        let inverse = invert_distortion(&forward, max_radius, 50, 4).unwrap();
        assert_eq!(inverse.len(), 4);

        for i in 0..=40 {
            let radius = max_radius * i as f64 / 40.0;
            let recovered = distort(distort(radius, &forward), &inverse);
            assert_abs_diff_eq!(recovered, radius, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_cardboard_lens_inverse() {
        let forward = [0.441, 0.156];
        let inverse = invert_distortion(&forward, 1.0, DEFAULT_NUM_SAMPLES, 6).unwrap();

        for i in 0..=50 {
            let radius = i as f64 / 50.0;
            let recovered = distort(distort(radius, &forward), &inverse);
            assert_abs_diff_eq!(recovered, radius, epsilon = 1e-3);
        }
        // The leading inverse term undoes the leading forward term.
        assert!(inverse[0] < 0.0);
    }

    #[test]
    fn test_ratio_fit_matches_direct_normal_equations() {
        // Plain normal equations of (r/d - 1) against d^2, d^4, d^6,
        // solved with LU and without column scaling.
        let forward = [0.441, 0.156];
        let num_samples = 50;
        let num_coefficients = 3;

        let mut ata = DMatrix::<f64>::zeros(num_coefficients, num_coefficients);
        let mut atb = DVector::<f64>::zeros(num_coefficients);
        for i in 1..num_samples {
            let radius = i as f64 / (num_samples - 1) as f64;
            let distorted = distort(radius, &forward);
            let row: Vec<f64> = (1..=num_coefficients)
                .map(|j| distorted.powi(2 * j as i32))
                .collect();
            let target = radius / distorted - 1.0;
            for j in 0..num_coefficients {
                atb[j] += row[j] * target;
                for k in 0..num_coefficients {
                    ata[(j, k)] += row[j] * row[k];
                }
            }
        }
        let expected = ata.lu().solve(&atb).unwrap();

        let inverse = invert_distortion(&forward, 1.0, num_samples, num_coefficients).unwrap();
        for j in 0..num_coefficients {
            assert_abs_diff_eq!(inverse[j], expected[j], epsilon = 1e-9);
        }

        // The radius objective weights rows by d^2 and lands elsewhere.
        let weighted = invert_distortion_with_objective(
            &forward,
            1.0,
            num_samples,
            num_coefficients,
            FitObjective::Radius,
        )
        .unwrap();
        assert!((weighted[0] - inverse[0]).abs() > 1e-3);
    }

    #[test]
    fn test_ratio_fit_skips_zero_sample() {
        // Four samples, one of them at r = 0, leave exactly three equations.
        let forward = [0.1, 0.05];
        let inverse = invert_distortion(&forward, 1.0, 4, 3).unwrap();
        for radius in [1.0 / 3.0, 2.0 / 3.0, 1.0] {
            let recovered = distort(distort(radius, &forward), &inverse);
            assert_abs_diff_eq!(recovered, radius, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_radius_objective_round_trip() {
        let forward = [0.1, 0.05];
        let inverse =
            invert_distortion_with_objective(&forward, 1.0, 50, 4, FitObjective::Radius).unwrap();
        for i in 0..=40 {
            let radius = i as f64 / 40.0;
            let recovered = distort(distort(radius, &forward), &inverse);
            assert_abs_diff_eq!(recovered, radius, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_identity_inverts_to_identity() {
        let inverse = invert_distortion(&[], 1.5, 20, 3).unwrap();
        for c in inverse {
            assert_abs_diff_eq!(c, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_insufficient_samples() {
        assert!(matches!(
            invert_distortion(&[0.1, 0.05], 1.0, 3, 4),
            Err(DistortionError::InsufficientSamples {
                samples: 3,
                coefficients: 4
            })
        ));
        assert!(matches!(
            invert_distortion(&[0.1, 0.05], 1.0, 4, 4),
            Err(DistortionError::InsufficientSamples { .. })
        ));
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(matches!(
            invert_distortion(&[0.1], 0.0, 50, 4),
            Err(DistortionError::InvalidParams(_))
        ));
        assert!(matches!(
            invert_distortion(&[0.1], -1.0, 50, 4),
            Err(DistortionError::InvalidParams(_))
        ));
        assert!(matches!(
            invert_distortion(&[0.1], 1.0, 50, 0),
            Err(DistortionError::InvalidParams(_))
        ));
        assert!(matches!(
            invert_distortion(&[f64::NAN], 1.0, 50, 4),
            Err(DistortionError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_vanishing_radius_is_singular() {
        // Every sampled power underflows, leaving an all-zero design matrix.
        assert!(matches!(
            invert_distortion(&[0.1], 1e-120, 50, 4),
            Err(DistortionError::SingularSystem(_))
        ));
    }

    #[test]
    fn test_config_defaults_and_yaml() {
        let config = InversionConfig::default();
        assert_eq!(config.num_samples, 100);
        assert_eq!(config.num_coefficients, 6);
        assert!(config.validate_params().is_ok());

        let loaded = InversionConfig::load_from_yaml("samples/inversion.yaml").unwrap();
        assert_eq!(loaded.num_samples, 200);
        assert_eq!(loaded.num_coefficients, 4);
        assert_eq!(loaded.objective, FitObjective::Radius);
    }

    #[test]
    fn test_config_rejects_too_few_samples() {
        let config = InversionConfig {
            num_samples: 5,
            num_coefficients: 6,
            ..Default::default()
        };
        assert!(matches!(
            config.validate_params(),
            Err(DistortionError::InsufficientSamples { .. })
        ));
    }
}

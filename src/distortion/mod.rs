//! Radial lens distortion models in tan-angle space.
//!
//! A viewer lens is described by a polynomial in even powers of the radius
//! (the tangent of the angle from the optical axis). This module defines the
//! shared error type, the [`RadialDistortion`] trait implemented by every
//! radial model, and the [`DistortionType`] a renderer can request.

use serde::{Deserialize, Serialize};

pub mod polynomial;
pub mod secant;

pub use polynomial::{distort, distort_inverse, distortion_factor, PolynomialDistortion};
pub use secant::{distort_inverse_with_status, InverseSolution};

#[derive(thiserror::Error, Debug)]
pub enum DistortionError {
    #[error("Invalid distortion parameters: {0}")]
    InvalidParams(String),
    #[error("Not enough samples ({samples}) to fit {coefficients} inverse coefficients")]
    InsufficientSamples { samples: usize, coefficients: usize },
    #[error("Least squares system is singular: {0}")]
    SingularSystem(String),
    #[error("Inverse distortion did not converge after {iterations} iterations (residual {residual})")]
    NonConvergence { iterations: usize, residual: f64 },
    #[error("Failed to load YAML: {0}")]
    YamlError(String),
    #[error("IO Error: {0}")]
    IOError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<std::io::Error> for DistortionError {
    fn from(err: std::io::Error) -> Self {
        DistortionError::IOError(err.to_string())
    }
}

impl From<yaml_rust::ScanError> for DistortionError {
    fn from(err: yaml_rust::ScanError) -> Self {
        DistortionError::YamlError(err.to_string())
    }
}

impl From<serde_yaml::Error> for DistortionError {
    fn from(err: serde_yaml::Error) -> Self {
        DistortionError::YamlError(err.to_string())
    }
}

/// The kind of distortion a renderer asks for.
///
/// The integer values match the ones used by viewer runtimes that store the
/// request as a plain `i32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistortionType {
    /// Inverse of the lens distortion. Maps lens space back to ideal space.
    Pincushion = 0,
    /// The forward lens distortion used by most head mounted displays.
    Barrel = 1,
}

impl TryFrom<i32> for DistortionType {
    type Error = DistortionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DistortionType::Pincushion),
            1 => Ok(DistortionType::Barrel),
            other => Err(DistortionError::InvalidParams(format!(
                "Unknown distortion type {other}"
            ))),
        }
    }
}

/// Operations shared by radial distortion models.
///
/// Implementors only need to provide [`RadialDistortion::distortion_factor`];
/// the forward and inverse mappings are derived from it.
pub trait RadialDistortion {
    /// Multiplicative factor applied to `radius` (tan-angle units).
    fn distortion_factor(&self, radius: f64) -> f64;

    /// Distorted radius: `radius * distortion_factor(radius)`.
    fn distort(&self, radius: f64) -> f64 {
        radius * self.distortion_factor(radius)
    }

    /// Undistorted radius whose distortion gives `radius`.
    ///
    /// Solved numerically with the secant method. Accurate but slow, so keep
    /// it out of per-pixel loops and fit an inverse polynomial instead.
    fn distort_inverse(&self, radius: f64) -> f64 {
        secant::solve(|x| self.distort(x), radius).radius
    }

    /// Like [`RadialDistortion::distort_inverse`] but fails with
    /// [`DistortionError::NonConvergence`] when the tolerance was not reached.
    fn distort_inverse_strict(&self, radius: f64) -> Result<f64, DistortionError> {
        let solution = secant::solve(|x| self.distort(x), radius);
        if solution.converged {
            Ok(solution.radius)
        } else {
            Err(DistortionError::NonConvergence {
                iterations: solution.iterations,
                residual: solution.residual,
            })
        }
    }
}

/// Common validation functions for distortion parameters
pub mod validation {
    use super::*;

    pub fn validate_coefficients(coefficients: &[f64]) -> Result<(), DistortionError> {
        if let Some(index) = coefficients.iter().position(|c| !c.is_finite()) {
            return Err(DistortionError::InvalidParams(format!(
                "Coefficient at index {index} is not finite"
            )));
        }
        Ok(())
    }

    pub fn validate_max_radius(max_radius: f64) -> Result<(), DistortionError> {
        if !max_radius.is_finite() || max_radius <= 0.0 {
            return Err(DistortionError::InvalidParams(format!(
                "Max radius must be positive and finite, got {max_radius}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distortion_type_from_i32() {
        assert_eq!(
            DistortionType::try_from(0).unwrap(),
            DistortionType::Pincushion
        );
        assert_eq!(DistortionType::try_from(1).unwrap(), DistortionType::Barrel);
        assert!(matches!(
            DistortionType::try_from(2),
            Err(DistortionError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_validate_coefficients() {
        assert!(validation::validate_coefficients(&[]).is_ok());
        assert!(validation::validate_coefficients(&[0.3, -0.1]).is_ok());
        assert!(validation::validate_coefficients(&[0.3, f64::NAN]).is_err());
        assert!(validation::validate_coefficients(&[f64::INFINITY]).is_err());
    }

    #[test]
    fn test_validate_max_radius() {
        assert!(validation::validate_max_radius(1.0).is_ok());
        assert!(validation::validate_max_radius(0.0).is_err());
        assert!(validation::validate_max_radius(-1.0).is_err());
        assert!(validation::validate_max_radius(f64::NAN).is_err());
    }

    /// A model defined only through its factor gets the derived mappings.
    struct Constant(f64);

    impl RadialDistortion for Constant {
        fn distortion_factor(&self, _radius: f64) -> f64 {
            self.0
        }
    }

    #[test]
    fn test_trait_default_methods() {
        let model = Constant(2.0);
        assert_eq!(model.distort(0.25), 0.5);
        assert!((model.distort_inverse(0.5) - 0.25).abs() < 1e-9);
        assert!((model.distort_inverse_strict(0.5).unwrap() - 0.25).abs() < 1e-9);
    }

    /// Saturating lens: r / (1 + r^2) never exceeds 0.5.
    struct Saturating;

    impl RadialDistortion for Saturating {
        fn distortion_factor(&self, radius: f64) -> f64 {
            1.0 / (1.0 + radius * radius)
        }
    }

    #[test]
    fn test_strict_inverse_reports_non_convergence() {
        assert!(Saturating.distort_inverse_strict(0.25).is_ok());
        assert!(matches!(
            Saturating.distort_inverse_strict(0.75),
            Err(DistortionError::NonConvergence { .. })
        ));
    }
}

//! Implements the even-power polynomial radial distortion.
//!
//! The distortion factor of a radius `r` (tan-angle units) is
//!
//! ```text
//! factor(r) = 1 + c[0]·r² + c[1]·r⁴ + ... + c[n-1]·r^(2n)
//! ```
//!
//! and the distorted radius is `r · factor(r)`. The free functions operate on
//! borrowed coefficient slices; [`PolynomialDistortion`] owns its coefficients
//! and adds validation, YAML persistence and inversion.

use crate::distortion::{validation, DistortionError, RadialDistortion};
use crate::inversion::{self, InversionConfig};
use serde::{Deserialize, Serialize};
use std::{fmt, fs, io::Write};
use yaml_rust::YamlLoader;

/// Distortion factor of `radius` for the given coefficients.
///
/// Evaluated with Horner's method in `radius²`, highest coefficient first.
/// Empty coefficients give the identity factor `1.0`.
pub fn distortion_factor(radius: f64, coefficients: &[f64]) -> f64 {
    let radius_squared = radius * radius;
    let mut factor = 0.0;
    for coefficient in coefficients.iter().rev() {
        factor = factor * radius_squared + coefficient;
    }
    factor * radius_squared + 1.0
}

/// Distorts `radius` (tan-angle units) with the given coefficients.
pub fn distort(radius: f64, coefficients: &[f64]) -> f64 {
    radius * distortion_factor(radius, coefficients)
}

/// Undistorted radius that distorts to `radius`, solved with the secant method.
///
/// Best effort: when the iteration does not converge the last estimate is
/// returned. Use [`crate::distortion::distort_inverse_with_status`] to find out.
pub fn distort_inverse(radius: f64, coefficients: &[f64]) -> f64 {
    super::secant::distort_inverse_with_status(radius, coefficients).radius
}

/// Radial polynomial distortion with an arbitrary number of coefficients.
///
/// # Examples
///
/// ```rust
/// use vr_lens_distortion::distortion::{PolynomialDistortion, RadialDistortion};
///
/// let lens = PolynomialDistortion::new(vec![0.3]).unwrap();
/// assert!((lens.distort(0.5) - 0.5375).abs() < 1e-12);
/// assert!((lens.distort_inverse(0.5375) - 0.5).abs() < 1e-6);
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct PolynomialDistortion {
    /// Coefficients of `r², r⁴, ...` in the distortion factor.
    coefficients: Vec<f64>,
}

impl PolynomialDistortion {
    /// Creates a distortion from its coefficients.
    ///
    /// # Errors
    ///
    /// [`DistortionError::InvalidParams`] if any coefficient is NaN or infinite.
    pub fn new(coefficients: Vec<f64>) -> Result<Self, DistortionError> {
        let model = PolynomialDistortion { coefficients };
        model.validate_params()?;
        Ok(model)
    }

    /// The distortion that leaves every radius unchanged.
    pub fn identity() -> Self {
        PolynomialDistortion {
            coefficients: Vec::new(),
        }
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn is_identity(&self) -> bool {
        self.coefficients.iter().all(|&c| c == 0.0)
    }

    /// Keeps at most the first `degree` coefficients.
    pub fn truncated(&self, degree: usize) -> Self {
        PolynomialDistortion {
            coefficients: self.coefficients.iter().take(degree).copied().collect(),
        }
    }

    pub fn validate_params(&self) -> Result<(), DistortionError> {
        validation::validate_coefficients(&self.coefficients)
    }

    /// Fits a distortion approximating the inverse of this one.
    ///
    /// `max_radius` is the largest lens-space radius the inverse must cover.
    /// See [`inversion::invert_distortion`] for the fitting procedure.
    pub fn invert(
        &self,
        max_radius: f64,
        num_samples: usize,
        num_coefficients: usize,
    ) -> Result<PolynomialDistortion, DistortionError> {
        let coefficients =
            inversion::invert_distortion(&self.coefficients, max_radius, num_samples, num_coefficients)?;
        Ok(PolynomialDistortion { coefficients })
    }

    /// Same as [`PolynomialDistortion::invert`] with sampling taken from `config`.
    pub fn invert_with_config(
        &self,
        max_radius: f64,
        config: &InversionConfig,
    ) -> Result<PolynomialDistortion, DistortionError> {
        let coefficients = inversion::invert_distortion_with_objective(
            &self.coefficients,
            max_radius,
            config.num_samples,
            config.num_coefficients,
            config.objective,
        )?;
        Ok(PolynomialDistortion { coefficients })
    }

    /// Fits an inverse valid up to the half field of view `max_half_fov` (radians).
    ///
    /// The covered radius is the inverse distortion of `tan(max_half_fov)`.
    pub fn invert_for_fov(
        &self,
        max_half_fov: f64,
        num_samples: usize,
        num_coefficients: usize,
    ) -> Result<PolynomialDistortion, DistortionError> {
        if !(max_half_fov > 0.0 && max_half_fov < std::f64::consts::FRAC_PI_2) {
            return Err(DistortionError::InvalidParams(format!(
                "Half field of view must be in (0, pi/2), got {max_half_fov}"
            )));
        }
        let max_radius = self.distort_inverse_strict(max_half_fov.tan())?;
        self.invert(max_radius, num_samples, num_coefficients)
    }

    /// Loads a distortion from a YAML file.
    ///
    /// Expected layout:
    ///
    /// ```yaml
    /// distortion:
    ///   model: polynomial_radial
    ///   coefficients: [0.34, 0.55]
    /// ```
    ///
    /// # Errors
    ///
    /// * [`DistortionError::IOError`] if the file cannot be read.
    /// * [`DistortionError::YamlError`] if the content is not valid YAML.
    /// * [`DistortionError::InvalidParams`] for a missing or malformed
    ///   `coefficients` list, an unknown `model`, or non-finite values.
    pub fn load_from_yaml(path: &str) -> Result<Self, DistortionError> {
        let contents = fs::read_to_string(path)?;
        let docs = YamlLoader::load_from_str(&contents)?;

        if docs.is_empty() {
            return Err(DistortionError::InvalidParams(
                "Empty YAML document".to_string(),
            ));
        }
        let node = &docs[0]["distortion"];

        if let Some(model) = node["model"].as_str() {
            if model != "polynomial_radial" {
                return Err(DistortionError::InvalidParams(format!(
                    "Unsupported distortion model: {model}"
                )));
            }
        }

        let coefficients_yaml = node["coefficients"].as_vec().ok_or_else(|| {
            DistortionError::InvalidParams("Missing distortion coefficients".to_string())
        })?;

        let coefficients = coefficients_yaml
            .iter()
            .enumerate()
            .map(|(i, value)| {
                // Integers such as `0` are accepted as well as floats.
                value
                    .as_f64()
                    .or_else(|| value.as_i64().map(|v| v as f64))
                    .ok_or_else(|| {
                        DistortionError::InvalidParams(format!(
                            "Invalid distortion coefficient at index {i}"
                        ))
                    })
            })
            .collect::<Result<Vec<f64>, DistortionError>>()?;

        PolynomialDistortion::new(coefficients)
    }

    /// Saves the distortion in the layout read by [`PolynomialDistortion::load_from_yaml`].
    pub fn save_to_yaml(&self, path: &str) -> Result<(), DistortionError> {
        let mut distortion = serde_yaml::Mapping::new();
        distortion.insert(
            serde_yaml::Value::String("model".to_string()),
            serde_yaml::Value::String("polynomial_radial".to_string()),
        );
        distortion.insert(
            serde_yaml::Value::String("coefficients".to_string()),
            serde_yaml::to_value(&self.coefficients)?,
        );

        let mut root = serde_yaml::Mapping::new();
        root.insert(
            serde_yaml::Value::String("distortion".to_string()),
            serde_yaml::Value::Mapping(distortion),
        );

        let yaml_string = serde_yaml::to_string(&root)?;
        let mut file = fs::File::create(path)?;
        file.write_all(yaml_string.as_bytes())?;

        Ok(())
    }
}

impl Default for PolynomialDistortion {
    fn default() -> Self {
        PolynomialDistortion::identity()
    }
}

impl fmt::Debug for PolynomialDistortion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PolynomialDistortion [coefficients: {:?}]",
            self.coefficients
        )
    }
}

impl RadialDistortion for PolynomialDistortion {
    fn distortion_factor(&self, radius: f64) -> f64 {
        distortion_factor(radius, &self.coefficients)
    }
}

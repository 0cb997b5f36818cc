//! Accuracy statistics and file exports for fitted inverse distortions.

use crate::distortion::{DistortionError, PolynomialDistortion, RadialDistortion};
use crate::geometry;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Ensure the output directory exists
pub fn ensure_output_dir() -> Result<(), UtilError> {
    let output_dir = Path::new("output");
    if !output_dir.exists() {
        fs::create_dir_all(output_dir).map_err(|e| {
            UtilError::InvalidParams(format!("Failed to create output directory: {e}"))
        })?;
    }
    Ok(())
}

#[derive(thiserror::Error, Debug)]
pub enum UtilError {
    #[error("Distortion error: {0}")]
    Distortion(#[from] DistortionError),
    #[error("Numerical error in computation: {0}")]
    NumericalError(String),
    #[error("Zero sample points")]
    ZeroSamplePoints,
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("IO Error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for UtilError {
    fn from(err: std::io::Error) -> Self {
        UtilError::IOError(err.to_string())
    }
}

impl From<csv::Error> for UtilError {
    fn from(err: csv::Error) -> Self {
        UtilError::IOError(err.to_string())
    }
}

impl From<serde_json::Error> for UtilError {
    fn from(err: serde_json::Error) -> Self {
        UtilError::Distortion(DistortionError::SerializationError(err.to_string()))
    }
}

/// Round-trip error statistics of a fitted inverse, in tan-angle units.
#[derive(Clone, Serialize, Deserialize)]
pub struct InversionError {
    pub rmse: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub median: f64,
}

impl fmt::Debug for InversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Inversion Error [ rmse: {}, min: {}, max: {}, mean: {}, stddev: {}, median: {} ]",
            self.rmse, self.min, self.max, self.mean, self.stddev, self.median
        )
    }
}

/// Measures `|inverse(forward(r)) - r|` over `n` evenly spaced radii in
/// `[0, max_radius]`.
pub fn compute_inversion_error(
    forward: &PolynomialDistortion,
    inverse: &PolynomialDistortion,
    max_radius: f64,
    n: usize,
) -> Result<InversionError, UtilError> {
    let mut errors: Vec<f64> = geometry::sample_radii(max_radius, n)
        .into_iter()
        .map(|radius| (inverse.distort(forward.distort(radius)) - radius).abs())
        .collect();

    if errors.is_empty() {
        return Err(UtilError::ZeroSamplePoints);
    }
    if errors.iter().any(|e| !e.is_finite()) {
        return Err(UtilError::NumericalError(
            "Round trip produced a non-finite radius".to_string(),
        ));
    }

    let count = errors.len() as f64;
    let mean = errors.iter().sum::<f64>() / count;
    let rmse = (errors.iter().map(|e| e * e).sum::<f64>() / count).sqrt();
    let variance = errors.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / count;

    errors.sort_by(|a, b| a.total_cmp(b));
    let middle = errors.len() / 2;
    let median = if errors.len() % 2 == 0 {
        (errors[middle - 1] + errors[middle]) / 2.0
    } else {
        errors[middle]
    };

    Ok(InversionError {
        rmse,
        min: errors[0],
        max: errors[errors.len() - 1],
        mean,
        stddev: variance.sqrt(),
        median,
    })
}

/// One row of an exported radial lookup table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadialSample {
    pub radius: f64,
    pub distorted: f64,
    pub recovered: f64,
    pub error: f64,
}

/// Writes `n` samples of the forward distortion and the fitted inverse to a
/// CSV file with a `radius,distorted,recovered,error` header.
pub fn export_radial_table(
    path: &str,
    forward: &PolynomialDistortion,
    inverse: &PolynomialDistortion,
    max_radius: f64,
    n: usize,
) -> Result<(), UtilError> {
    let mut writer = csv::Writer::from_path(path)?;
    for radius in geometry::sample_radii(max_radius, n) {
        let distorted = forward.distort(radius);
        let recovered = inverse.distort(distorted);
        writer.serialize(RadialSample {
            radius,
            distorted,
            recovered,
            error: recovered - radius,
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Summary of one inverse fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InversionReport {
    pub name: String,
    pub forward_coefficients: Vec<f64>,
    pub inverse_coefficients: Vec<f64>,
    pub max_radius: f64,
    pub num_samples: usize,
    pub fit_time_ms: f64,
    pub error: InversionError,
}

/// Writes a report as pretty-printed JSON.
pub fn export_inversion_report(path: &str, report: &InversionReport) -> Result<(), UtilError> {
    let json = serde_json::to_string_pretty(report)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

pub fn display_inversion_report(report: &InversionReport) {
    info!("Inversion of {}:", report.name);
    info!("  Forward coefficients: {:?}", report.forward_coefficients);
    info!("  Inverse coefficients: {:?}", report.inverse_coefficients);
    info!(
        "  Valid up to radius {:.6} ({} samples, {:.3} ms)",
        report.max_radius, report.num_samples, report.fit_time_ms
    );
    info!("  {:?}", report.error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_round_trip_has_zero_error() {
        let identity = PolynomialDistortion::identity();
        let error = compute_inversion_error(&identity, &identity, 1.0, 11).unwrap();
        assert_eq!(error.max, 0.0);
        assert_eq!(error.rmse, 0.0);
        assert_eq!(error.median, 0.0);
    }

    #[test]
    fn test_error_statistics() {
        // Round-tripping r + 3r^3 through the identity leaves an error of 3r^3.
        let forward = PolynomialDistortion::new(vec![3.0]).unwrap();
        let inverse = PolynomialDistortion::identity();
        let error = compute_inversion_error(&forward, &inverse, 1.0, 5).unwrap();

        let expected: Vec<f64> = [0.0f64, 0.25, 0.5, 0.75, 1.0]
            .iter()
            .map(|r| 3.0 * r.powi(3))
            .collect();
        let mean = expected.iter().sum::<f64>() / 5.0;
        assert_relative_eq!(error.min, 0.0);
        assert_relative_eq!(error.max, 3.0, epsilon = 1e-12);
        assert_relative_eq!(error.median, expected[2], epsilon = 1e-12);
        assert_relative_eq!(error.mean, mean, epsilon = 1e-12);
        assert!(error.rmse >= error.mean);
    }

    #[test]
    fn test_zero_samples() {
        let identity = PolynomialDistortion::identity();
        assert!(matches!(
            compute_inversion_error(&identity, &identity, 1.0, 0),
            Err(UtilError::ZeroSamplePoints)
        ));
    }

    #[test]
    fn test_exports() {
        ensure_output_dir().unwrap();
        let forward = PolynomialDistortion::new(vec![0.1, 0.05]).unwrap();
        let inverse = forward.invert(1.0, 50, 4).unwrap();

        let csv_path = "output/radial_table_test.csv";
        export_radial_table(csv_path, &forward, &inverse, 1.0, 11).unwrap();
        let contents = fs::read_to_string(csv_path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some("radius,distorted,recovered,error"));
        assert_eq!(lines.count(), 11);
        fs::remove_file(csv_path).unwrap();

        let report = InversionReport {
            name: "test".to_string(),
            forward_coefficients: forward.coefficients().to_vec(),
            inverse_coefficients: inverse.coefficients().to_vec(),
            max_radius: 1.0,
            num_samples: 50,
            fit_time_ms: 0.0,
            error: compute_inversion_error(&forward, &inverse, 1.0, 101).unwrap(),
        };
        assert!(report.error.max < 1e-3);

        let json_path = "output/inversion_report_test.json";
        export_inversion_report(json_path, &report).unwrap();
        let parsed: InversionReport =
            serde_json::from_str(&fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(parsed.inverse_coefficients, report.inverse_coefficients);
        fs::remove_file(json_path).unwrap();
    }
}

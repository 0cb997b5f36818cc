//! Inverse Distortion Fitting Example
//!
//! Loads a viewer profile, fits a polynomial approximating the inverse of its
//! lens distortion over the viewer's field of view, and writes the fitted
//! inverse together with accuracy statistics to the `output/` directory.
//!
//! Usage:
//! ```bash
//! cargo run --example invert_profile -- \
//!   --profile_path samples/cardboard_v1.yaml \
//!   --config_path samples/inversion.yaml
//! ```

use clap::Parser;
use flexi_logger::{colored_detailed_format, detailed_format, Duplicate, FileSpec, Logger};
use log::{error, info};
use std::path::PathBuf;
use std::time::Instant;
use vr_lens_distortion::util::{self, InversionReport};
use vr_lens_distortion::{InversionConfig, RadialDistortion, ViewerProfile};

/// Inverse distortion fitting tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the viewer profile file
    #[arg(short = 'p', long)]
    profile_path: PathBuf,

    /// Optional path to a file with the sampling settings
    #[arg(short = 'c', long)]
    config_path: Option<PathBuf>,

    /// Number of radii checked when measuring the fit accuracy
    #[arg(short = 'n', long, default_value_t = 1000)]
    num_check_samples: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    Logger::try_with_str("info")?
        .log_to_file(
            FileSpec::default()
                .directory("logs")
                .suppress_timestamp()
                .suffix("log"),
        )
        .duplicate_to_stdout(Duplicate::All)
        .format_for_files(detailed_format)
        .format_for_stdout(colored_detailed_format)
        .set_palette("196;208;76;39;178".to_string())
        .start()?;

    let cli = Cli::parse();
    let profile_path = cli.profile_path.to_str().ok_or("Invalid profile path")?;

    let profile = ViewerProfile::load_from_yaml(profile_path)?;
    info!("Loaded viewer {} {}", profile.vendor, profile.model);

    let config = match &cli.config_path {
        Some(path) => {
            let path = path.to_str().ok_or("Invalid config path")?;
            InversionConfig::load_from_yaml(path)?
        }
        None => InversionConfig::default(),
    };
    info!(
        "Fitting {} coefficients from {} samples",
        config.num_coefficients, config.num_samples
    );

    let forward = profile.distortion()?;
    let max_tan = profile
        .field_of_view_tan_angles()
        .iter()
        .fold(0.0f64, |acc, t| acc.max(*t));
    let max_half_fov = max_tan.atan();

    let start_time = Instant::now();
    let inverse = match forward.invert_for_fov(
        max_half_fov,
        config.num_samples,
        config.num_coefficients,
    ) {
        Ok(inverse) => inverse,
        Err(e) => {
            error!("Inverse fit failed: {:?}", e);
            return Err(e.into());
        }
    };
    let fit_time = start_time.elapsed();

    let max_radius = forward.distort_inverse_strict(max_tan)?;
    let error =
        util::compute_inversion_error(&forward, &inverse, max_radius, cli.num_check_samples)?;

    let report = InversionReport {
        name: format!("{} {}", profile.vendor, profile.model),
        forward_coefficients: forward.coefficients().to_vec(),
        inverse_coefficients: inverse.coefficients().to_vec(),
        max_radius,
        num_samples: config.num_samples,
        fit_time_ms: fit_time.as_secs_f64() * 1000.0,
        error,
    };
    util::display_inversion_report(&report);

    util::ensure_output_dir()?;
    inverse.save_to_yaml("output/inverse_distortion.yaml")?;
    util::export_radial_table(
        "output/radial_table.csv",
        &forward,
        &inverse,
        max_radius,
        cli.num_check_samples,
    )?;
    util::export_inversion_report("output/inversion_report.json", &report)?;
    info!("Results written to output/");

    Ok(())
}

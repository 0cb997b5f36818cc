//! Headset Distortion Data Example
//!
//! Combines a viewer profile with phone parameters and prints the visible
//! field of view together with the barrel and pincushion distortion a
//! renderer would use for the headset.
//!
//! Usage:
//! ```bash
//! RUST_LOG=info cargo run --example distortion_data -- \
//!   --viewer_path samples/cardboard_v2.yaml \
//!   --phone_path samples/phone.yaml \
//!   --degree 6
//! ```

use clap::Parser;
use log::info;
use std::path::PathBuf;
use vr_lens_distortion::{
    get_distortion_data, DistortionType, HeadsetDescriptor, PhoneParams, RenderPrefs,
    ViewerProfile,
};

/// Headset distortion data tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the viewer profile file
    #[arg(short = 'v', long)]
    viewer_path: PathBuf,

    /// Path to the phone parameters file
    #[arg(short = 'p', long)]
    phone_path: PathBuf,

    /// Number of polynomial coefficients to produce
    #[arg(short = 'd', long, default_value_t = 6)]
    degree: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let viewer_path = cli.viewer_path.to_str().ok_or("Invalid viewer path")?;
    let phone_path = cli.phone_path.to_str().ok_or("Invalid phone path")?;

    let viewer = ViewerProfile::load_from_yaml(viewer_path)?;
    let phone = PhoneParams::load_from_yaml(phone_path)?;
    info!("Phone screen {:.4} x {:.4} m", phone.width_meters(), phone.height_meters());

    let descriptor = HeadsetDescriptor::new(viewer, phone);

    for distortion_type in [DistortionType::Barrel, DistortionType::Pincushion] {
        let prefs = RenderPrefs {
            distortion_type,
            polynomial_degree: cli.degree,
        };
        let data = get_distortion_data(&descriptor, &prefs)?;

        println!("{:?} distortion", data.distortion_type);
        println!("  visible tan angles: {:?}", data.left_eye_visible_tan_angles);
        println!("  max radius: {:.6}", data.max_radius);
        println!("  coefficients: {:?}", data.coefficients);
    }

    Ok(())
}

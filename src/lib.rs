//! VR Lens Distortion Library
//!
//! A Rust library for the radial lens distortion used by VR viewers that
//! hold a phone behind a pair of lenses. It provides:
//! - Evaluation of even-power radial distortion polynomials in tan-angle space
//! - Inversion of single radii with the secant method
//! - Least-squares fitting of inverse distortion polynomials
//! - Headset distortion data from viewer profiles and phone parameters
//!
//! The library also includes accuracy statistics and CSV/JSON exports for
//! inspecting fitted inverses.

pub mod distortion;
pub mod geometry;
pub mod inversion;
pub mod profile;
pub mod util;

// Re-export commonly used types
pub use distortion::{
    distort, distort_inverse, distort_inverse_with_status, distortion_factor, DistortionError,
    DistortionType, InverseSolution, PolynomialDistortion, RadialDistortion,
};

pub use inversion::{
    invert_distortion, invert_distortion_with_objective, FitObjective, InversionConfig,
};

pub use profile::{
    get_distortion_data, DistortionData, HeadsetDescriptor, PhoneParams, RenderPrefs,
    VerticalAlignment, ViewerProfile,
};

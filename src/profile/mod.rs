//! Headset descriptions and the distortion data derived from them.
//!
//! A headset is a viewer (the lens housing, described by a [`ViewerProfile`])
//! combined with the phone placed in it ([`PhoneParams`]). Given the render
//! preferences of a client, [`get_distortion_data`] works out which part of
//! the field of view is actually visible through the lens and returns the
//! distortion coefficients to render with.

use crate::distortion::{
    validation, DistortionError, DistortionType, PolynomialDistortion, RadialDistortion,
};
use crate::geometry;
use crate::inversion::DEFAULT_NUM_SAMPLES;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::{fs, io::Write};
use yaml_rust::{Yaml, YamlLoader};

pub const METERS_PER_INCH: f64 = 0.0254;
/// Bezel between the edge of the phone and the first screen pixel.
pub const DEFAULT_BORDER_SIZE_METERS: f64 = 0.003;

/// Physical description of the phone screen, in landscape orientation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneParams {
    /// Display width in pixels (the long side).
    pub width_pixels: u32,
    /// Display height in pixels.
    pub height_pixels: u32,
    /// Screen pixels per inch along the width.
    pub x_dpi: f64,
    /// Screen pixels per inch along the height.
    pub y_dpi: f64,
}

impl PhoneParams {
    pub fn width_meters(&self) -> f64 {
        self.width_pixels as f64 / self.x_dpi * METERS_PER_INCH
    }

    pub fn height_meters(&self) -> f64 {
        self.height_pixels as f64 / self.y_dpi * METERS_PER_INCH
    }

    pub fn validate_params(&self) -> Result<(), DistortionError> {
        if self.width_pixels == 0 || self.height_pixels == 0 {
            return Err(DistortionError::InvalidParams(
                "Screen size in pixels must be positive".to_string(),
            ));
        }
        if !(self.x_dpi > 0.0 && self.x_dpi.is_finite() && self.y_dpi > 0.0 && self.y_dpi.is_finite())
        {
            return Err(DistortionError::InvalidParams(format!(
                "Screen dpi must be positive, got ({}, {})",
                self.x_dpi, self.y_dpi
            )));
        }
        Ok(())
    }

    /// Loads phone parameters from the `phone` section of a YAML file.
    pub fn load_from_yaml(path: &str) -> Result<Self, DistortionError> {
        let doc = load_document(path)?;
        let node = &doc["phone"];

        let params = PhoneParams {
            width_pixels: yaml_u32(node, "width_pixels")?,
            height_pixels: yaml_u32(node, "height_pixels")?,
            x_dpi: yaml_f64(node, "x_dpi")?,
            y_dpi: yaml_f64(node, "y_dpi")?,
        };
        params.validate_params()?;
        Ok(params)
    }
}

/// Where the lenses sit relative to the phone tray.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalAlignment {
    Bottom,
    Center,
    Top,
}

impl TryFrom<&str> for VerticalAlignment {
    type Error = DistortionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "bottom" => Ok(VerticalAlignment::Bottom),
            "center" => Ok(VerticalAlignment::Center),
            "top" => Ok(VerticalAlignment::Top),
            other => Err(DistortionError::InvalidParams(format!(
                "Unknown vertical alignment: {other}"
            ))),
        }
    }
}

/// Optical description of a viewer. Distances are in meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerProfile {
    pub vendor: String,
    pub model: String,
    /// Distance from the screen to the lens plane.
    pub screen_to_lens_distance: f64,
    /// Distance between the centers of the two lenses.
    pub inter_lens_distance: f64,
    /// Distance from the phone tray to the lens centers.
    pub tray_to_lens_distance: f64,
    pub vertical_alignment: VerticalAlignment,
    /// Maximum field of view of the left eye, `[left, right, bottom, top]`
    /// in degrees.
    pub left_eye_field_of_view_angles: [f64; 4],
    /// Forward (barrel) distortion coefficients of the lenses.
    pub distortion_coefficients: Vec<f64>,
}

impl ViewerProfile {
    pub fn distortion(&self) -> Result<PolynomialDistortion, DistortionError> {
        PolynomialDistortion::new(self.distortion_coefficients.clone())
    }

    /// Vertical offset of the lens centers from the screen center.
    pub fn vertical_lens_offset(&self, phone: &PhoneParams) -> f64 {
        let offset = (self.tray_to_lens_distance - DEFAULT_BORDER_SIZE_METERS)
            - phone.height_meters() / 2.0;
        match self.vertical_alignment {
            VerticalAlignment::Bottom => offset,
            VerticalAlignment::Center => 0.0,
            VerticalAlignment::Top => -offset,
        }
    }

    /// Tangents of the maximum field of view, `[left, right, bottom, top]`,
    /// signed so that left and bottom are negative.
    pub fn field_of_view_tan_angles(&self) -> [f64; 4] {
        let [left, right, bottom, top] = self.left_eye_field_of_view_angles;
        [
            -left.to_radians().tan(),
            right.to_radians().tan(),
            -bottom.to_radians().tan(),
            top.to_radians().tan(),
        ]
    }

    pub fn validate_params(&self) -> Result<(), DistortionError> {
        let distances = [
            ("screen_to_lens_distance", self.screen_to_lens_distance),
            ("inter_lens_distance", self.inter_lens_distance),
            ("tray_to_lens_distance", self.tray_to_lens_distance),
        ];
        for (name, value) in distances {
            if !(value > 0.0 && value.is_finite()) {
                return Err(DistortionError::InvalidParams(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        for angle in self.left_eye_field_of_view_angles {
            if !(angle > 0.0 && angle < 90.0) {
                return Err(DistortionError::InvalidParams(format!(
                    "Field of view angles must be in (0, 90) degrees, got {angle}"
                )));
            }
        }
        validation::validate_coefficients(&self.distortion_coefficients)
    }

    /// Loads a viewer profile from the `viewer` section of a YAML file.
    ///
    /// # Errors
    ///
    /// * [`DistortionError::IOError`] if the file cannot be read.
    /// * [`DistortionError::YamlError`] if the content is not valid YAML.
    /// * [`DistortionError::InvalidParams`] for missing or malformed fields
    ///   and for values rejected by [`ViewerProfile::validate_params`].
    pub fn load_from_yaml(path: &str) -> Result<Self, DistortionError> {
        let doc = load_document(path)?;
        let node = &doc["viewer"];

        let angles_yaml = yaml_vec(node, "left_eye_field_of_view_angles")?;
        if angles_yaml.len() != 4 {
            return Err(DistortionError::InvalidParams(format!(
                "Expected 4 field of view angles, found {}",
                angles_yaml.len()
            )));
        }
        let mut left_eye_field_of_view_angles = [0.0; 4];
        for (i, value) in angles_yaml.iter().enumerate() {
            left_eye_field_of_view_angles[i] = as_number(value).ok_or_else(|| {
                DistortionError::InvalidParams(format!("Invalid field of view angle at index {i}"))
            })?;
        }

        let distortion_coefficients = yaml_vec(node, "distortion_coefficients")?
            .iter()
            .enumerate()
            .map(|(i, value)| {
                as_number(value).ok_or_else(|| {
                    DistortionError::InvalidParams(format!(
                        "Invalid distortion coefficient at index {i}"
                    ))
                })
            })
            .collect::<Result<Vec<f64>, DistortionError>>()?;

        let vertical_alignment = match node["vertical_alignment"].as_str() {
            Some(value) => VerticalAlignment::try_from(value)?,
            None => VerticalAlignment::Bottom,
        };

        let profile = ViewerProfile {
            vendor: node["vendor"].as_str().unwrap_or_default().to_string(),
            model: node["model"].as_str().unwrap_or_default().to_string(),
            screen_to_lens_distance: yaml_f64(node, "screen_to_lens_distance")?,
            inter_lens_distance: yaml_f64(node, "inter_lens_distance")?,
            tray_to_lens_distance: yaml_f64(node, "tray_to_lens_distance")?,
            vertical_alignment,
            left_eye_field_of_view_angles,
            distortion_coefficients,
        };

        profile.validate_params()?;
        Ok(profile)
    }

    /// Saves the profile in the layout read by [`ViewerProfile::load_from_yaml`].
    pub fn save_to_yaml(&self, path: &str) -> Result<(), DistortionError> {
        let mut root = serde_yaml::Mapping::new();
        root.insert(
            serde_yaml::Value::String("viewer".to_string()),
            serde_yaml::to_value(self)?,
        );

        let yaml_string = serde_yaml::to_string(&root)?;
        let mut file = fs::File::create(path)?;
        file.write_all(yaml_string.as_bytes())?;

        Ok(())
    }
}

/// A viewer together with the phone it holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadsetDescriptor {
    pub viewer: ViewerProfile,
    pub phone: PhoneParams,
    /// Free-form user overrides, carried along untouched.
    pub user_params: Option<String>,
}

impl HeadsetDescriptor {
    pub fn new(viewer: ViewerProfile, phone: PhoneParams) -> Self {
        HeadsetDescriptor {
            viewer,
            phone,
            user_params: None,
        }
    }

    pub fn validate_params(&self) -> Result<(), DistortionError> {
        self.viewer.validate_params()?;
        self.phone.validate_params()
    }
}

/// Distortion requested by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderPrefs {
    pub distortion_type: DistortionType,
    /// Requested number of polynomial coefficients. Barrel distortion cannot
    /// use more than the viewer profile provides.
    pub polynomial_degree: usize,
}

impl RenderPrefs {
    /// Builds preferences from the integer encoding used across C boundaries.
    pub fn from_raw(distortion_type: i32, polynomial_degree: i32) -> Result<Self, DistortionError> {
        let distortion_type = DistortionType::try_from(distortion_type)?;
        let polynomial_degree = usize::try_from(polynomial_degree).map_err(|_| {
            DistortionError::InvalidParams(format!(
                "Polynomial degree must not be negative, got {polynomial_degree}"
            ))
        })?;
        let prefs = RenderPrefs {
            distortion_type,
            polynomial_degree,
        };
        prefs.validate_params()?;
        Ok(prefs)
    }

    pub fn validate_params(&self) -> Result<(), DistortionError> {
        if self.polynomial_degree == 0 {
            return Err(DistortionError::InvalidParams(
                "Polynomial degree must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Distortion to render a headset with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistortionData {
    pub distortion_type: DistortionType,
    pub coefficients: Vec<f64>,
    /// Largest input radius (tan-angle units) the coefficients are meant for.
    /// Screen space for barrel distortion, eye space for pincushion.
    pub max_radius: f64,
    /// Visible field of the left eye as tan-angles `[left, right, bottom, top]`.
    pub left_eye_visible_tan_angles: [f64; 4],
}

/// Tan-angles of the left eye's field of view that are actually visible.
///
/// The viewer's maximum field of view is compared with the edges of the
/// left half of the screen as seen through the lens, and on each side the
/// value closer to the optical axis is kept.
pub fn left_eye_visible_tan_angles(
    descriptor: &HeadsetDescriptor,
) -> Result<[f64; 4], DistortionError> {
    descriptor.validate_params()?;
    let viewer = &descriptor.viewer;
    let phone = &descriptor.phone;
    let distortion = viewer.distortion()?;

    let [fov_left, fov_right, fov_bottom, fov_top] = viewer.field_of_view_tan_angles();

    // Left eye viewport, measured from the left lens center.
    let half_width = phone.width_meters() / 4.0;
    let half_height = phone.height_meters() / 2.0;
    let center_x = viewer.inter_lens_distance / 2.0 - half_width;
    let center_y = -viewer.vertical_lens_offset(phone);
    let center_z = viewer.screen_to_lens_distance;

    let screen_left = distortion.distort((center_x - half_width) / center_z);
    let screen_right = distortion.distort((center_x + half_width) / center_z);
    let screen_bottom = distortion.distort((center_y - half_height) / center_z);
    let screen_top = distortion.distort((center_y + half_height) / center_z);

    let visible = [
        fov_left.max(screen_left),
        fov_right.min(screen_right),
        fov_bottom.max(screen_bottom),
        fov_top.min(screen_top),
    ];
    debug!("Left eye visible tan angles: {:?}", visible);
    Ok(visible)
}

/// Computes the distortion data for a headset and a set of render preferences.
///
/// * Barrel: the viewer's forward coefficients, truncated to the requested
///   degree.
/// * Pincushion: an inverse fitted with `polynomial_degree` coefficients over
///   the visible field of view.
pub fn get_distortion_data(
    descriptor: &HeadsetDescriptor,
    prefs: &RenderPrefs,
) -> Result<DistortionData, DistortionError> {
    prefs.validate_params()?;
    let visible = left_eye_visible_tan_angles(descriptor)?;
    let forward = descriptor.viewer.distortion()?;

    let eye_radius = geometry::corner_radius(&visible);
    let screen_radius = forward.distort_inverse_strict(eye_radius)?;

    let (coefficients, max_radius) = match prefs.distortion_type {
        DistortionType::Barrel => {
            let truncated = forward.truncated(prefs.polynomial_degree);
            (truncated.coefficients().to_vec(), screen_radius)
        }
        DistortionType::Pincushion => {
            let inverse = forward.invert(
                screen_radius,
                DEFAULT_NUM_SAMPLES,
                prefs.polynomial_degree,
            )?;
            (inverse.coefficients().to_vec(), eye_radius)
        }
    };

    info!(
        "{} {}: {:?} distortion with {} coefficients up to radius {:.4}",
        descriptor.viewer.vendor,
        descriptor.viewer.model,
        prefs.distortion_type,
        coefficients.len(),
        max_radius
    );

    Ok(DistortionData {
        distortion_type: prefs.distortion_type,
        coefficients,
        max_radius,
        left_eye_visible_tan_angles: visible,
    })
}

fn load_document(path: &str) -> Result<Yaml, DistortionError> {
    let contents = fs::read_to_string(path)?;
    let mut docs = YamlLoader::load_from_str(&contents)?;
    if docs.is_empty() {
        return Err(DistortionError::InvalidParams(
            "Empty YAML document".to_string(),
        ));
    }
    Ok(docs.swap_remove(0))
}

fn as_number(value: &Yaml) -> Option<f64> {
    value.as_f64().or_else(|| value.as_i64().map(|v| v as f64))
}

fn yaml_f64(node: &Yaml, key: &str) -> Result<f64, DistortionError> {
    as_number(&node[key])
        .ok_or_else(|| DistortionError::InvalidParams(format!("Invalid {key}")))
}

fn yaml_u32(node: &Yaml, key: &str) -> Result<u32, DistortionError> {
    node[key]
        .as_i64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| DistortionError::InvalidParams(format!("Invalid {key}")))
}

fn yaml_vec<'a>(node: &'a Yaml, key: &str) -> Result<&'a Vec<Yaml>, DistortionError> {
    node[key]
        .as_vec()
        .ok_or_else(|| DistortionError::InvalidParams(format!("Missing {key}")))
}

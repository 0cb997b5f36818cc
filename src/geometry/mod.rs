/// Generate `n` evenly spaced radii covering `[0, max_radius]`
///
/// # Arguments
///
/// * `max_radius` - The largest radius, included as the last sample
/// * `n` - The number of radii to generate
///
/// # Returns
///
/// A vector of radii starting at `0.0`. A single sample is `max_radius`
/// itself, and `n == 0` gives an empty vector.
pub fn sample_radii(max_radius: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![max_radius],
        _ => {
            let last = (n - 1) as f64;
            (0..n).map(|i| max_radius * i as f64 / last).collect()
        }
    }
}

/// Radius of the corner of a tan-angle rectangle `[left, right, bottom, top]`
/// that lies furthest from the optical axis.
pub fn corner_radius(tan_angles: &[f64; 4]) -> f64 {
    let x = tan_angles[0].abs().max(tan_angles[1].abs());
    let y = tan_angles[2].abs().max(tan_angles[3].abs());
    x.hypot(y)
}

use nalgebra::Vector3;

/// Cartesian vector in metres (positions) or SI rates (velocity, acceleration).
pub type Vec3 = Vector3<f32>;

/// Unit vector for an azimuth/elevation pair (radians).
pub fn unit_direction(azimuth: f32, elevation: f32) -> Vec3 {
    let (sin_el, cos_el) = elevation.sin_cos();
    let (sin_az, cos_az) = azimuth.sin_cos();
    Vec3::new(cos_el * cos_az, cos_el * sin_az, sin_el)
}

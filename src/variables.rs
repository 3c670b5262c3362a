//! Unit conversions for simulated surface variables.

/// Offset between Kelvin and Celsius.
pub const KELVIN_OFFSET: f64 = 273.15;

/// Temperature in degrees Celsius from Kelvin.
#[inline]
pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - KELVIN_OFFSET
}

/// Horizontal wind speed from eastward (`u`) and northward (`v`) components.
#[inline]
pub fn wind_speed(u: f64, v: f64) -> f64 {
    u.hypot(v)
}

/// Meteorological wind direction in degrees, `[0, 360)`: the direction the
/// wind blows FROM, clockwise from north.
pub fn wind_direction(u: f64, v: f64) -> f64 {
    let dir = (270.0 - v.atan2(u).to_degrees()).rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if dir >= 360.0 {
        0.0
    } else {
        dir
    }
}

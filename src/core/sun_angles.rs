//! Reference sun zenith angles for the sun (normalisation) model
//!
//! HLS normalises reflectances to a latitude-dependent sun zenith angle
//! given by a 6th order polynomial (HLS v1.4 user guide, p. 13).

use crate::types::{BrdfError, BrdfResult};
use ndarray::Array2;

const K0: f64 = 31.0;
const K1: f64 = -0.127;
const K2: f64 = 0.0119;
const K3: f64 = 2.4e-5;
const K4: f64 = -9.48e-7;
const K5: f64 = -1.95e-9;
const K6: f64 = 6.15e-11;

/// Reference sun zenith angle in degrees at the given latitude
pub fn sun_zenith_angle(latitude: f64) -> f64 {
    let lat = latitude;
    K0 + K1 * lat
        + K2 * lat.powi(2)
        + K3 * lat.powi(3)
        + K4 * lat.powi(4)
        + K5 * lat.powi(5)
        + K6 * lat.powi(6)
}

/// Reference sun zenith angle in radians at the centre latitude of a scene
pub fn constant_sun_zenith(min_lat: f64, max_lat: f64) -> f64 {
    let central_lat = min_lat + (max_lat - min_lat) / 2.0;
    sun_zenith_angle(central_lat).to_radians()
}

/// Reference sun zenith angles in radians for a grid spanning `min_lat..max_lat`
///
/// The latitude span is split into `height + 1` cells; row `i` takes the
/// angle at the centre of cell `i` counted from the northern edge and the
/// value is repeated across the full row.
pub fn sun_zenith_array(
    min_lat: f64,
    max_lat: f64,
    shape: (usize, usize),
) -> BrdfResult<Array2<f32>> {
    if !(min_lat.is_finite() && max_lat.is_finite()) || min_lat > max_lat {
        return Err(BrdfError::InvalidParameter(format!(
            "invalid latitude range {}..{}",
            min_lat, max_lat
        )));
    }

    let (height, width) = shape;
    let cell_size = (max_lat - min_lat) / (height as f64 + 1.0);
    let top = max_lat - cell_size / 2.0;

    let row_angles: Vec<f32> = (0..height)
        .map(|row| sun_zenith_angle(top - row as f64 * cell_size).to_radians() as f32)
        .collect();

    Ok(Array2::from_shape_fn((height, width), |(row, _)| row_angles[row]))
}

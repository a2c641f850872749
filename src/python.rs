use crate::core::{apply_correction_values, sun_zenith_array};
use crate::types::BrdfError;
use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(apply_correction, m)?)?;
    m.add_function(wrap_pyfunction!(sun_zenith_angles, m)?)?;
    Ok(())
}

fn to_py_err(e: BrdfError) -> PyErr {
    match e {
        BrdfError::MissingParameter(_)
        | BrdfError::InvalidParameter(_)
        | BrdfError::ShapeMismatch { .. } => PyErr::new::<PyValueError, _>(format!("{}", e)),
        _ => PyErr::new::<PyRuntimeError, _>(format!("{}", e)),
    }
}

fn required<T>(value: Option<T>, name: &str) -> PyResult<T> {
    value.ok_or_else(|| to_py_err(BrdfError::MissingParameter(name.to_string())))
}

/// Apply a correction grid to a uint16 reflectance band
///
/// `mask` follows numpy masked array semantics (True = masked).
#[pyfunction]
#[pyo3(signature = (band=None, correction=None, mask=None, log10_scale=true, nodata=0))]
fn apply_correction<'py>(
    py: Python<'py>,
    band: Option<PyReadonlyArray2<'py, u16>>,
    correction: Option<PyReadonlyArray2<'py, f32>>,
    mask: Option<PyReadonlyArray2<'py, bool>>,
    log10_scale: bool,
    nodata: u16,
) -> PyResult<&'py PyArray2<u16>> {
    let band = required(band, "band")?;
    let correction = required(correction, "correction")?;
    let valid_mask = mask.map(|m| m.as_array().mapv(|masked| !masked));

    let corrected = apply_correction_values(
        band.as_array(),
        valid_mask.as_ref().map(|m| m.view()),
        correction.as_array(),
        log10_scale,
        nodata,
    )
    .map_err(to_py_err)?;

    Ok(corrected.values.into_pyarray(py))
}

/// Reference sun zenith angles in radians for a latitude range
#[pyfunction]
fn sun_zenith_angles<'py>(
    py: Python<'py>,
    min_lat: f64,
    max_lat: f64,
    height: usize,
    width: usize,
) -> PyResult<&'py PyArray2<f32>> {
    let angles = sun_zenith_array(min_lat, max_lat, (height, width)).map_err(to_py_err)?;
    Ok(angles.into_pyarray(py))
}

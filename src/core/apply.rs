//! Application of correction grids to reflectance bands

use crate::types::{Band, BrdfError, BrdfResult, CorrectionGrid, RasterValue};
use ndarray::{Array2, ArrayView2, Zip};
use num_traits::{Bounded, Float, NumCast};

/// Apply a correction grid to a band
///
/// In log10 mode a cell becomes `10^(log10(value) * factor)` (only where the
/// value is positive), otherwise `value * factor`. With `nodata == 0` the
/// corrected values are clipped to `[1, T::MAX]` and every invalid cell is
/// forced to 0 so that a valid cell never collides with nodata. Cells whose
/// correction is invalid keep their value. The band mask is never widened.
pub fn apply_correction<T, F>(
    band: &Band<T>,
    correction: &CorrectionGrid<F>,
    log10_scale: bool,
    nodata: T,
) -> BrdfResult<Band<T>>
where
    T: RasterValue,
    F: Float + RasterValue,
{
    if band.dim() != correction.dim() {
        return Err(BrdfError::ShapeMismatch {
            expected: band.dim(),
            found: correction.dim(),
        });
    }
    apply_masked(
        band,
        correction.values.view(),
        correction.valid_mask.view(),
        log10_scale,
        nodata,
    )
}

/// Apply raw correction factors to raw band values
///
/// Correction cells that are 0 or not finite count as invalid.
pub fn apply_correction_values<T, F>(
    values: ArrayView2<'_, T>,
    valid_mask: Option<ArrayView2<'_, bool>>,
    correction: ArrayView2<'_, F>,
    log10_scale: bool,
    nodata: T,
) -> BrdfResult<Band<T>>
where
    T: RasterValue,
    F: Float + RasterValue,
{
    if values.dim() != correction.dim() {
        return Err(BrdfError::ShapeMismatch {
            expected: values.dim(),
            found: correction.dim(),
        });
    }
    let band = match valid_mask {
        Some(mask) => Band::with_mask(values.to_owned(), mask.to_owned())?,
        None => Band::new(values.to_owned()),
    };
    let correction_valid = correction.mapv(|c| c.is_finite() && !c.is_zero());
    apply_masked(
        &band,
        correction,
        correction_valid.view(),
        log10_scale,
        nodata,
    )
}

fn apply_masked<T, F>(
    band: &Band<T>,
    correction: ArrayView2<'_, F>,
    correction_valid: ArrayView2<'_, bool>,
    log10_scale: bool,
    nodata: T,
) -> BrdfResult<Band<T>>
where
    T: RasterValue,
    F: Float + RasterValue,
{
    let validity = band.validity(nodata);
    if !validity.iter().any(|&v| v) {
        log::debug!("Band is fully masked, skipping BRDF correction");
        return Ok(band.clone());
    }

    let clip_to_one = nodata.is_zero();
    let correct = |&value: &T, &valid: &bool, &factor: &F, &factor_valid: &bool| -> T {
        if !valid {
            return if clip_to_one { nodata } else { value };
        }
        if !factor_valid {
            return value;
        }
        correct_value(value, factor, log10_scale, clip_to_one)
    };

    #[cfg(feature = "parallel")]
    let values: Array2<T> = Zip::from(&band.values)
        .and(&validity)
        .and(&correction)
        .and(&correction_valid)
        .par_map_collect(correct);
    #[cfg(not(feature = "parallel"))]
    let values: Array2<T> = Zip::from(&band.values)
        .and(&validity)
        .and(&correction)
        .and(&correction_valid)
        .map_collect(correct);

    Ok(Band {
        values,
        valid_mask: Some(validity),
    })
}

fn correct_value<T: RasterValue, F: Float>(
    value: T,
    factor: F,
    log10_scale: bool,
    clip_to_one: bool,
) -> T {
    let (Some(v), Some(c)) = (value.to_f64(), factor.to_f64()) else {
        return value;
    };

    let corrected = if log10_scale {
        if v > 0.0 {
            10f64.powf(v.log10() * c)
        } else {
            v
        }
    } else {
        v * c
    };
    if !corrected.is_finite() {
        return value;
    }

    let upper = <T as Bounded>::max_value().to_f64().unwrap_or(f64::MAX);
    let lower = if clip_to_one {
        1.0
    } else {
        <T as Bounded>::min_value().to_f64().unwrap_or(f64::MIN)
    };
    <T as NumCast>::from(corrected.clamp(lower, upper)).unwrap_or(value)
}

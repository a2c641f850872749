use crate::core::angles::AnglePair;
use crate::core::config::BrdfModel;
use crate::core::kernel::{AngleInputs, DirectionalModel};
use crate::core::per_detector::SceneInputs;
use crate::core::resample::{Resampler, Resampling};
use crate::types::{BrdfError, BrdfResult, CorrectionGrid, GridSpec, Raster, RasterValue};
use ndarray::Zip;
use num_traits::Float;

/// Whole-scene correction builder
///
/// Evaluates the model once over view angles that already merge all
/// detectors and resamples the result straight onto the target grid.
/// There is no per-detector masking and no gap interpolation.
pub struct CombinedBuilder<'r, R: Resampler> {
    resampler: &'r R,
    model: BrdfModel,
    brdf_weight: f64,
}

impl<'r, R: Resampler> CombinedBuilder<'r, R> {
    pub fn new(resampler: &'r R, model: BrdfModel, brdf_weight: f64) -> Self {
        // the combined tag only selects this builder, its formulas are HLS
        let model = match model {
            BrdfModel::Combined => BrdfModel::Hls,
            other => other,
        };
        Self {
            resampler,
            model,
            brdf_weight,
        }
    }

    pub fn build<F: Float + RasterValue>(
        &self,
        scene: SceneInputs<'_>,
        view: &AnglePair,
        target: &GridSpec,
    ) -> BrdfResult<CorrectionGrid<F>> {
        log::info!(
            "Building combined BRDF correction ({}) on {}x{} grid",
            self.model,
            target.height,
            target.width
        );

        let model = DirectionalModel::new(
            self.model,
            scene.coefficients,
            self.brdf_weight,
            AngleInputs {
                sun_zenith: &scene.sun.zenith,
                sun_azimuth: &scene.sun.azimuth,
                view_zenith: &view.zenith,
                view_azimuth: &view.azimuth,
                reference_sun_zenith: scene.reference_sun_zenith.view(),
            },
        )?;
        let param: Raster<F> = model.band_param();

        let mut grid = self
            .resampler
            .resample(&param, target, Resampling::Bilinear, F::zero())?;
        Zip::from(&grid.values)
            .and(&mut grid.valid_mask)
            .for_each(|value, valid| {
                if value.is_zero() {
                    *valid = false;
                }
            });

        if grid.is_empty() {
            return Err(BrdfError::EmptyGrid("merged view angles".to_string()));
        }
        log::debug!("Combined correction: {} valid cells", grid.valid_count());
        Ok(grid)
    }
}

use crate::core::angles::ProductAngles;
use crate::core::apply::apply_correction;
use crate::core::combined::CombinedBuilder;
use crate::core::config::{BrdfConfig, L2ABand};
use crate::core::fill_nodata::FillNodataParams;
use crate::core::per_detector::{DetectorCorrectionParams, PerDetectorBuilder, SceneInputs};
use crate::core::resample::{AffineResampler, Resampler};
use crate::types::{Band, BrdfError, BrdfResult, CorrectionGrid, GridSpec, RasterValue};
use num_traits::{Float, NumCast};

/// BRDF correction of Sentinel-2 L2A bands
///
/// Holds a validated configuration and the resampler used by the builders.
/// It keeps no per-product state, so one instance can serve any number of
/// products and bands concurrently.
pub struct BrdfCorrector<R: Resampler = AffineResampler> {
    config: BrdfConfig,
    resampler: R,
}

impl BrdfCorrector<AffineResampler> {
    pub fn new(config: BrdfConfig) -> BrdfResult<Self> {
        Self::with_resampler(config, AffineResampler::new())
    }
}

impl<R: Resampler> BrdfCorrector<R> {
    pub fn with_resampler(config: BrdfConfig, resampler: R) -> BrdfResult<Self> {
        config.validate()?;
        Ok(Self { config, resampler })
    }

    pub fn config(&self) -> &BrdfConfig {
        &self.config
    }

    /// Target grid at the configured correction resolution
    pub fn default_grid(&self, product: &ProductAngles) -> GridSpec {
        product.grid(self.config.resolution)
    }

    /// Correction factors of one band on `grid`
    ///
    /// Uses the per-detector builder unless the configuration asks for the
    /// whole-scene strategy. Fails with [`BrdfError::EmptyGrid`] carrying the
    /// product id when no valid factor could be computed.
    pub fn correction_values<F: Float + RasterValue>(
        &self,
        product: &ProductAngles,
        band: L2ABand,
        grid: &GridSpec,
    ) -> BrdfResult<CorrectionGrid<F>> {
        let start_time = std::time::Instant::now();

        let result = if self.config.uses_combined_strategy() {
            self.combined_correction(product, band, grid)
        } else {
            self.per_detector_correction(product, band, grid)
        };
        let correction = result.map_err(|e| match e {
            BrdfError::EmptyGrid(_) => BrdfError::EmptyGrid(product.product_id.clone()),
            other => other,
        })?;

        log::info!(
            "BRDF correction for {} {} ({}) generated in {:.2?}",
            product.product_id,
            band,
            self.config.model,
            start_time.elapsed()
        );
        Ok(correction)
    }

    pub fn per_detector_correction<F: Float + RasterValue>(
        &self,
        product: &ProductAngles,
        band: L2ABand,
        grid: &GridSpec,
    ) -> BrdfResult<CorrectionGrid<F>> {
        let band_angles = product.band_angles(band)?;
        let reference = product.reference_sun_zenith()?;
        let scene = SceneInputs {
            sun: &product.sun,
            reference_sun_zenith: reference.view(),
            coefficients: band.model_parameters(),
        };
        let params = DetectorCorrectionParams {
            model: self.config.model,
            brdf_weight: self.config.brdf_weight,
            fill: FillNodataParams {
                max_search_distance: self.config.max_search_distance,
                smoothing_iterations: self.config.smoothing_iterations,
            },
        };
        PerDetectorBuilder::new(&self.resampler, params).build(scene, band_angles, grid)
    }

    pub fn combined_correction<F: Float + RasterValue>(
        &self,
        product: &ProductAngles,
        band: L2ABand,
        grid: &GridSpec,
    ) -> BrdfResult<CorrectionGrid<F>> {
        let band_angles = product.band_angles(band)?;
        let merged = band_angles.merged.as_ref().ok_or_else(|| {
            BrdfError::MissingParameter(format!(
                "merged viewing angles for band {} of {}",
                band, product.product_id
            ))
        })?;
        let reference = product.reference_sun_zenith()?;
        let scene = SceneInputs {
            sun: &product.sun,
            reference_sun_zenith: reference.view(),
            coefficients: band.model_parameters(),
        };
        CombinedBuilder::new(&self.resampler, self.config.model, self.config.brdf_weight)
            .build(scene, merged, grid)
    }

    /// Build the correction for `band_id` on `grid` and apply it to `band`
    pub fn correct_band<T: RasterValue>(
        &self,
        product: &ProductAngles,
        band_id: L2ABand,
        grid: &GridSpec,
        band: &Band<T>,
    ) -> BrdfResult<Band<T>> {
        if band.dim() != grid.shape() {
            return Err(BrdfError::ShapeMismatch {
                expected: grid.shape(),
                found: band.dim(),
            });
        }
        let nodata = self.nodata::<T>()?;
        let correction = self.correction_values::<f32>(product, band_id, grid)?;
        apply_correction(band, &correction, self.config.log10_scale, nodata)
    }

    /// Correct several bands of one product, keeping their order
    ///
    /// A band whose correction grid comes out empty is returned uncorrected;
    /// every other error aborts.
    pub fn correct_bands<T: RasterValue>(
        &self,
        product: &ProductAngles,
        grid: &GridSpec,
        bands: &[(L2ABand, Band<T>)],
    ) -> BrdfResult<Vec<Band<T>>> {
        log::info!(
            "Correcting {} bands of {} ({})",
            bands.len(),
            product.product_id,
            self.config.model
        );
        let corrected = self.correct_each(product, grid, bands)?;
        log::info!("✅ BRDF correction of {} finished", product.product_id);
        Ok(corrected)
    }

    #[cfg(feature = "parallel")]
    fn correct_each<T: RasterValue>(
        &self,
        product: &ProductAngles,
        grid: &GridSpec,
        bands: &[(L2ABand, Band<T>)],
    ) -> BrdfResult<Vec<Band<T>>> {
        use rayon::prelude::*;

        bands
            .par_iter()
            .map(|(band_id, band)| self.correct_or_skip(product, *band_id, grid, band))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn correct_each<T: RasterValue>(
        &self,
        product: &ProductAngles,
        grid: &GridSpec,
        bands: &[(L2ABand, Band<T>)],
    ) -> BrdfResult<Vec<Band<T>>> {
        bands
            .iter()
            .map(|(band_id, band)| self.correct_or_skip(product, *band_id, grid, band))
            .collect()
    }

    fn correct_or_skip<T: RasterValue>(
        &self,
        product: &ProductAngles,
        band_id: L2ABand,
        grid: &GridSpec,
        band: &Band<T>,
    ) -> BrdfResult<Band<T>> {
        match self.correct_band(product, band_id, grid, band) {
            Err(BrdfError::EmptyGrid(id)) => {
                log::warn!("BRDF grid for {} {} is empty, band left uncorrected", id, band_id);
                Ok(band.clone())
            }
            other => other,
        }
    }

    fn nodata<T: RasterValue>(&self) -> BrdfResult<T> {
        <T as NumCast>::from(self.config.nodata).ok_or_else(|| {
            BrdfError::InvalidParameter(format!(
                "nodata {} does not fit the band type",
                self.config.nodata
            ))
        })
    }
}

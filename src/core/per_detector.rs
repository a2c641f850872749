//! Per-detector correction builder
//!
//! Each detector of a pushbroom scanner images its own swath with its own
//! viewing geometry. The model is evaluated per detector on the low
//! resolution angle grids, gaps are interpolated, and the result is
//! upsampled and written only where that detector's footprint lies.

use crate::core::angles::{AnglePair, BandAngles};
use crate::core::config::{BrdfModel, ModelParameters};
use crate::core::fill_nodata::{FillNodataParams, GapFiller};
use crate::core::kernel::{AngleInputs, DirectionalModel};
use crate::core::resample::{Resampler, Resampling};
use crate::types::{
    BrdfError, BrdfResult, CorrectionGrid, DetectorFootprint, DetectorId, GridSpec, Raster,
    RasterValue,
};
use ndarray::{ArrayView2, Zip};
use num_traits::Float;
use std::collections::BTreeSet;

/// Parameters shared by all detectors of one build
#[derive(Debug, Clone)]
pub struct DetectorCorrectionParams {
    pub model: BrdfModel,
    pub brdf_weight: f64,
    pub fill: FillNodataParams,
}

impl Default for DetectorCorrectionParams {
    fn default() -> Self {
        Self {
            model: BrdfModel::Hls,
            brdf_weight: 1.0,
            fill: FillNodataParams::default(),
        }
    }
}

/// Scene-level inputs of one band correction
#[derive(Debug, Clone, Copy)]
pub struct SceneInputs<'a> {
    pub sun: &'a AnglePair,
    /// Reference sun zenith in radians on the sun grid
    pub reference_sun_zenith: ArrayView2<'a, f32>,
    pub coefficients: ModelParameters,
}

/// Valid correction cells inside one detector's footprint
struct DetectorPatch<F> {
    cells: Vec<((usize, usize), F)>,
}

pub struct PerDetectorBuilder<'r, R: Resampler> {
    resampler: &'r R,
    params: DetectorCorrectionParams,
}

impl<'r, R: Resampler> PerDetectorBuilder<'r, R> {
    pub fn new(resampler: &'r R, params: DetectorCorrectionParams) -> Self {
        Self { resampler, params }
    }

    /// Correction grid on `target`, assembled from all detectors of the band
    ///
    /// Detectors without view angles or without coverage on `target` are
    /// skipped. Fails with [`BrdfError::EmptyGrid`] when no detector
    /// contributes a valid cell.
    pub fn build<F: Float + RasterValue>(
        &self,
        scene: SceneInputs<'_>,
        band: &BandAngles,
        target: &GridSpec,
    ) -> BrdfResult<CorrectionGrid<F>> {
        let mut output = CorrectionGrid::<F>::empty(target);

        let footprint =
            self.resampler
                .resample(&band.footprint, target, Resampling::Nearest, 0)?;
        let detector_ids: Vec<DetectorId> = footprint
            .values
            .iter()
            .zip(footprint.valid_mask.iter())
            .filter(|(&id, &valid)| valid && id != 0)
            .map(|(&id, _)| id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        log::info!(
            "Building per-detector BRDF correction ({}) for {} detectors on {}x{} grid",
            self.params.model,
            detector_ids.len(),
            target.height,
            target.width
        );

        let patches = self.detector_patches::<F>(&detector_ids, scene, band, &footprint)?;

        let mut contributing = 0usize;
        for patch in patches.into_iter().flatten() {
            // footprints are disjoint, so each cell is written by at most one detector
            for (index, value) in patch.cells {
                output.values[index] = value;
                output.valid_mask[index] = true;
            }
            contributing += 1;
        }

        if contributing == 0 || output.is_empty() {
            return Err(BrdfError::EmptyGrid(format!(
                "{} detector footprints",
                detector_ids.len()
            )));
        }

        log::debug!(
            "{} of {} detectors contributed, {} valid cells",
            contributing,
            detector_ids.len(),
            output.valid_count()
        );
        Ok(output)
    }

    #[cfg(feature = "parallel")]
    fn detector_patches<F: Float + RasterValue>(
        &self,
        ids: &[DetectorId],
        scene: SceneInputs<'_>,
        band: &BandAngles,
        footprint: &DetectorFootprint,
    ) -> BrdfResult<Vec<Option<DetectorPatch<F>>>> {
        use rayon::prelude::*;

        ids.par_iter()
            .map(|&id| self.detector_correction(id, scene, band, footprint))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn detector_patches<F: Float + RasterValue>(
        &self,
        ids: &[DetectorId],
        scene: SceneInputs<'_>,
        band: &BandAngles,
        footprint: &DetectorFootprint,
    ) -> BrdfResult<Vec<Option<DetectorPatch<F>>>> {
        ids.iter()
            .map(|&id| self.detector_correction(id, scene, band, footprint))
            .collect()
    }

    /// Upsampled correction of one detector restricted to its footprint,
    /// `None` if the detector is skipped
    ///
    /// The full-size upsampled grid is dropped before returning.
    fn detector_correction<F: Float + RasterValue>(
        &self,
        id: DetectorId,
        scene: SceneInputs<'_>,
        band: &BandAngles,
        footprint: &DetectorFootprint,
    ) -> BrdfResult<Option<DetectorPatch<F>>> {
        let (view_zenith, view_azimuth) = match band.detector(id) {
            Some(view) => view,
            None => {
                log::warn!("No viewing angles for detector {}, skipping", id);
                return Ok(None);
            }
        };

        let coverage = footprint
            .values
            .iter()
            .zip(footprint.valid_mask.iter())
            .filter(|(&d, &valid)| valid && d == id)
            .count();
        if coverage == 0 {
            log::debug!("Detector {} does not intersect the target grid", id);
            return Ok(None);
        }

        let model = DirectionalModel::new(
            self.params.model,
            scene.coefficients,
            self.params.brdf_weight,
            AngleInputs {
                sun_zenith: &scene.sun.zenith,
                sun_azimuth: &scene.sun.azimuth,
                view_zenith,
                view_azimuth,
                reference_sun_zenith: scene.reference_sun_zenith.view(),
            },
        )?;
        let param: Raster<F> = model.band_param();
        let param = GapFiller::with_params(self.params.fill.clone()).fill(&param)?;

        let upsampled = self.resampler.resample(
            &param,
            &footprint.grid(),
            Resampling::Bilinear,
            F::zero(),
        )?;

        let mut cells = Vec::with_capacity(coverage);
        Zip::indexed(&footprint.values)
            .and(&footprint.valid_mask)
            .and(&upsampled.values)
            .and(&upsampled.valid_mask)
            .for_each(|index, &detector, &in_footprint, &value, &valid| {
                if in_footprint && detector == id && valid {
                    cells.push((index, value));
                }
            });

        log::debug!(
            "Detector {}: {} covered cells, {} valid after resampling",
            id,
            coverage,
            cells.len()
        );
        Ok(Some(DetectorPatch { cells }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resample::AffineResampler;
    use crate::core::sun_angles::sun_zenith_array;
    use crate::types::{AngleGrid, Crs, GeoTransform};
    use ndarray::Array2;

    fn crs() -> Crs {
        Crs::from_epsg(32633)
    }

    fn angle_grid(value: f32) -> AngleGrid {
        Raster::from_values(
            Array2::from_elem((3, 3), value),
            GeoTransform::north_up(0.0, 600.0, 200.0),
            crs(),
        )
    }

    fn footprint(split: usize, left: u8, right: u8) -> DetectorFootprint {
        let values = Array2::from_shape_fn((6, 6), |(_, c)| if c < split { left } else { right });
        Raster::with_nodata(values, 0, GeoTransform::north_up(0.0, 600.0, 100.0), crs())
    }

    fn target() -> GridSpec {
        GridSpec::new(12, 12, GeoTransform::north_up(0.0, 600.0, 50.0), crs())
    }

    fn sun() -> AnglePair {
        AnglePair::new(angle_grid(40.0), angle_grid(150.0)).unwrap()
    }

    #[test]
    fn test_disjoint_detectors_exclusive() {
        let band = BandAngles::new(footprint(3, 1, 2))
            .with_detector(1, AnglePair::new(angle_grid(2.0), angle_grid(100.0)).unwrap())
            .with_detector(2, AnglePair::new(angle_grid(12.0), angle_grid(280.0)).unwrap());
        let sun = sun();
        let reference = sun_zenith_array(0.0, 0.0, (3, 3)).unwrap();
        let scene = SceneInputs {
            sun: &sun,
            reference_sun_zenith: reference.view(),
            coefficients: ModelParameters::new(0.1690, 0.0227, 0.0574),
        };

        let resampler = AffineResampler::new();
        let builder = PerDetectorBuilder::new(&resampler, DetectorCorrectionParams::default());
        let grid: CorrectionGrid<f32> = builder.build(scene, &band, &target()).unwrap();

        assert_eq!(grid.valid_count(), 144);
        let left = grid.values[[5, 0]];
        let right = grid.values[[5, 11]];
        assert!((left - right).abs() > 1e-4);
        for row in 0..12 {
            for col in 0..6 {
                assert_eq!(grid.values[[row, col]], left);
                assert_eq!(grid.values[[row, col + 6]], right);
            }
        }
    }

    #[test]
    fn test_detector_patch_covers_only_its_footprint() {
        let band = BandAngles::new(footprint(3, 1, 2))
            .with_detector(1, AnglePair::new(angle_grid(2.0), angle_grid(100.0)).unwrap())
            .with_detector(2, AnglePair::new(angle_grid(12.0), angle_grid(280.0)).unwrap());
        let sun = sun();
        let reference = sun_zenith_array(0.0, 0.0, (3, 3)).unwrap();
        let scene = SceneInputs {
            sun: &sun,
            reference_sun_zenith: reference.view(),
            coefficients: ModelParameters::new(0.1690, 0.0227, 0.0574),
        };

        let resampler = AffineResampler::new();
        let builder = PerDetectorBuilder::new(&resampler, DetectorCorrectionParams::default());
        let fp = resampler
            .resample(&band.footprint, &target(), Resampling::Nearest, 0)
            .unwrap();

        // the angle grids cover the whole target, the patch only the left half
        let patch = builder
            .detector_correction::<f32>(1, scene, &band, &fp)
            .unwrap()
            .unwrap();
        assert_eq!(patch.cells.len(), 72);
        assert!(patch.cells.iter().all(|&((_, col), _)| col < 6));

        let right = builder
            .detector_correction::<f32>(2, scene, &band, &fp)
            .unwrap()
            .unwrap();
        assert_eq!(right.cells.len(), 72);
        assert!(right.cells.iter().all(|&((_, col), _)| col >= 6));

        // merged grid holds exactly the union of both patches
        let grid: CorrectionGrid<f32> = builder.build(scene, &band, &target()).unwrap();
        for &((row, col), value) in patch.cells.iter().chain(right.cells.iter()) {
            assert!(grid.valid_mask[[row, col]]);
            assert_eq!(grid.values[[row, col]], value);
        }
        assert_eq!(grid.valid_count(), patch.cells.len() + right.cells.len());
    }

    #[test]
    fn test_missing_detector_angles_skipped() {
        let band = BandAngles::new(footprint(3, 1, 2))
            .with_detector(1, AnglePair::new(angle_grid(2.0), angle_grid(100.0)).unwrap());
        let sun = sun();
        let reference = sun_zenith_array(0.0, 0.0, (3, 3)).unwrap();
        let scene = SceneInputs {
            sun: &sun,
            reference_sun_zenith: reference.view(),
            coefficients: ModelParameters::new(0.1690, 0.0227, 0.0574),
        };

        let resampler = AffineResampler::new();
        let builder = PerDetectorBuilder::new(&resampler, DetectorCorrectionParams::default());
        let grid: CorrectionGrid<f32> = builder.build(scene, &band, &target()).unwrap();

        assert_eq!(grid.valid_count(), 72);
        assert!(grid.valid_mask[[0, 0]]);
        assert!(!grid.valid_mask[[0, 11]]);
    }

    #[test]
    fn test_empty_footprint_is_empty_grid() {
        let band = BandAngles::new(footprint(3, 0, 0))
            .with_detector(1, AnglePair::new(angle_grid(2.0), angle_grid(100.0)).unwrap());
        let sun = sun();
        let reference = sun_zenith_array(0.0, 0.0, (3, 3)).unwrap();
        let scene = SceneInputs {
            sun: &sun,
            reference_sun_zenith: reference.view(),
            coefficients: ModelParameters::new(0.1690, 0.0227, 0.0574),
        };

        let resampler = AffineResampler::new();
        let builder = PerDetectorBuilder::new(&resampler, DetectorCorrectionParams::default());
        let result: BrdfResult<CorrectionGrid<f32>> = builder.build(scene, &band, &target());
        assert!(matches!(result, Err(BrdfError::EmptyGrid(_))));
    }

    #[test]
    fn test_non_intersecting_footprint_is_empty_grid() {
        let fp = Raster::with_nodata(
            Array2::from_elem((6, 6), 4u8),
            0,
            GeoTransform::north_up(10000.0, 600.0, 100.0),
            crs(),
        );
        let band = BandAngles::new(fp)
            .with_detector(4, AnglePair::new(angle_grid(2.0), angle_grid(100.0)).unwrap());
        let sun = sun();
        let reference = sun_zenith_array(0.0, 0.0, (3, 3)).unwrap();
        let scene = SceneInputs {
            sun: &sun,
            reference_sun_zenith: reference.view(),
            coefficients: ModelParameters::new(0.1690, 0.0227, 0.0574),
        };

        let resampler = AffineResampler::new();
        let builder = PerDetectorBuilder::new(&resampler, DetectorCorrectionParams::default());
        let result: BrdfResult<CorrectionGrid<f32>> = builder.build(scene, &band, &target());
        assert!(matches!(result, Err(BrdfError::EmptyGrid(_))));
    }
}

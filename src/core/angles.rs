//! Angle grids and masks of one product, cached by the product layer
//!
//! Nothing in here reads files. The calling layer parses the granule
//! metadata once, fills a [`ProductAngles`] and passes it by reference to
//! every correction it requests.

use crate::core::config::{L2ABand, Resolution};
use crate::core::sun_angles::sun_zenith_array;
use crate::types::{
    AngleGrid, BrdfError, BrdfResult, Bounds, Crs, DetectorFootprint, DetectorId, GeoTransform,
    GridSpec,
};
use ndarray::Array2;
use std::collections::BTreeMap;

/// Zenith and azimuth grids (degrees) sharing one shape
#[derive(Debug, Clone)]
pub struct AnglePair {
    pub zenith: AngleGrid,
    pub azimuth: AngleGrid,
}

impl AnglePair {
    pub fn new(zenith: AngleGrid, azimuth: AngleGrid) -> BrdfResult<Self> {
        if zenith.dim() != azimuth.dim() {
            return Err(BrdfError::ShapeMismatch {
                expected: zenith.dim(),
                found: azimuth.dim(),
            });
        }
        Ok(Self { zenith, azimuth })
    }

    pub fn dim(&self) -> (usize, usize) {
        self.zenith.dim()
    }
}

/// Viewing geometry of one band
///
/// Zenith and azimuth maps are keyed by detector id independently; a
/// detector may be present in the footprint but missing from either map.
#[derive(Debug, Clone)]
pub struct BandAngles {
    pub footprint: DetectorFootprint,
    pub view_zenith: BTreeMap<DetectorId, AngleGrid>,
    pub view_azimuth: BTreeMap<DetectorId, AngleGrid>,
    /// Whole-scene view angles with detectors already merged
    pub merged: Option<AnglePair>,
}

impl BandAngles {
    pub fn new(footprint: DetectorFootprint) -> Self {
        Self {
            footprint,
            view_zenith: BTreeMap::new(),
            view_azimuth: BTreeMap::new(),
            merged: None,
        }
    }

    pub fn with_detector(mut self, id: DetectorId, view: AnglePair) -> Self {
        self.insert_detector(id, view);
        self
    }

    pub fn with_merged(mut self, merged: AnglePair) -> Self {
        self.merged = Some(merged);
        self
    }

    pub fn insert_detector(&mut self, id: DetectorId, view: AnglePair) {
        self.view_zenith.insert(id, view.zenith);
        self.view_azimuth.insert(id, view.azimuth);
    }

    /// View angles of one detector, `None` if either grid is missing
    pub fn detector(&self, id: DetectorId) -> Option<(&AngleGrid, &AngleGrid)> {
        Some((self.view_zenith.get(&id)?, self.view_azimuth.get(&id)?))
    }
}

/// Angle cache of one product
#[derive(Debug, Clone)]
pub struct ProductAngles {
    pub product_id: String,
    pub crs: Crs,
    pub bounds: Bounds,
    /// (min, max) scene latitude in degrees
    pub latitude_range: (f64, f64),
    pub sun: AnglePair,
    bands: BTreeMap<L2ABand, BandAngles>,
}

impl ProductAngles {
    pub fn new(
        product_id: impl Into<String>,
        crs: Crs,
        bounds: Bounds,
        latitude_range: (f64, f64),
        sun: AnglePair,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            crs,
            bounds,
            latitude_range,
            sun,
            bands: BTreeMap::new(),
        }
    }

    pub fn with_band(mut self, band: L2ABand, angles: BandAngles) -> Self {
        self.insert_band(band, angles);
        self
    }

    pub fn insert_band(&mut self, band: L2ABand, angles: BandAngles) {
        self.bands.insert(band, angles);
    }

    pub fn band_angles(&self, band: L2ABand) -> BrdfResult<&BandAngles> {
        self.bands.get(&band).ok_or_else(|| {
            BrdfError::MissingParameter(format!(
                "viewing angles for band {} of {}",
                band, self.product_id
            ))
        })
    }

    pub fn bands(&self) -> impl Iterator<Item = L2ABand> + '_ {
        self.bands.keys().copied()
    }

    /// North-up grid covering the scene bounds at `resolution`
    pub fn grid(&self, resolution: Resolution) -> GridSpec {
        let size = resolution.meters();
        let width = ((self.bounds.right - self.bounds.left) / size).round().max(0.0) as usize;
        let height = ((self.bounds.top - self.bounds.bottom) / size).round().max(0.0) as usize;
        GridSpec::new(
            height,
            width,
            GeoTransform::north_up(self.bounds.left, self.bounds.top, size),
            self.crs,
        )
    }

    /// Reference sun zenith (radians) on the sun angle grid
    pub fn reference_sun_zenith(&self) -> BrdfResult<Array2<f32>> {
        let (min_lat, max_lat) = self.latitude_range;
        sun_zenith_array(min_lat, max_lat, self.sun.dim())
    }
}

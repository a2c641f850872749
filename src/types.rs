use gdal::raster::GdalType;
use ndarray::{Array2, ArrayView2, Zip};
use num_traits::{Bounded, NumCast, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Detector index as used in the Sentinel-2 detector footprint masks (1..=12, 0 = none)
pub type DetectorId = u8;

/// Element types a raster can carry
///
/// Every type GDAL can store and `num-traits` can cast qualifies.
pub trait RasterValue:
    Copy + Send + Sync + PartialEq + Debug + NumCast + Zero + Bounded + GdalType + 'static
{
}

impl<T> RasterValue for T where
    T: Copy + Send + Sync + PartialEq + Debug + NumCast + Zero + Bounded + GdalType + 'static
{
}

/// Coordinate reference system, identified by its EPSG code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs {
    pub epsg: u32,
}

impl Crs {
    pub fn from_epsg(epsg: u32) -> Self {
        Self { epsg }
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

/// Geospatial transformation parameters (GDAL affine order)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform without rotation terms
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Map coordinates of a (fractional) pixel position
    pub fn pixel_to_map(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.top_left_x + col * self.pixel_width + row * self.rotation_x,
            self.top_left_y + col * self.rotation_y + row * self.pixel_height,
        )
    }

    /// Fractional pixel position (col, row) of map coordinates
    ///
    /// Returns `None` for a degenerate transform.
    pub fn map_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let dx = x - self.top_left_x;
        let dy = y - self.top_left_y;
        let col = (self.pixel_height * dx - self.rotation_x * dy) / det;
        let row = (self.pixel_width * dy - self.rotation_y * dx) / det;
        Some((col, row))
    }
}

/// Geospatial bounding box in product CRS units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

/// Target output grid: shape, transform and CRS
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub height: usize,
    pub width: usize,
    pub transform: GeoTransform,
    pub crs: Crs,
}

impl GridSpec {
    pub fn new(height: usize, width: usize, transform: GeoTransform, crs: Crs) -> Self {
        Self {
            height,
            width,
            transform,
            crs,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}

/// A 2D raster with a validity mask, georeferenced by transform and CRS
///
/// `valid_mask[[row, col]]` is `true` for usable cells. Values under an
/// invalid cell carry no meaning.
#[derive(Debug, Clone)]
pub struct Raster<T> {
    pub values: Array2<T>,
    pub valid_mask: Array2<bool>,
    pub transform: GeoTransform,
    pub crs: Crs,
}

/// Sun or viewing angle grid in degrees
pub type AngleGrid = Raster<f32>;

/// Detector footprint raster; cell value is the detector id, 0 where no detector imaged
pub type DetectorFootprint = Raster<DetectorId>;

/// Multiplicative BRDF correction factors on the target grid
pub type CorrectionGrid<F = f32> = Raster<F>;

impl<T: RasterValue> Raster<T> {
    pub fn new(
        values: Array2<T>,
        valid_mask: Array2<bool>,
        transform: GeoTransform,
        crs: Crs,
    ) -> BrdfResult<Self> {
        if values.dim() != valid_mask.dim() {
            return Err(BrdfError::ShapeMismatch {
                expected: values.dim(),
                found: valid_mask.dim(),
            });
        }
        Ok(Self {
            values,
            valid_mask,
            transform,
            crs,
        })
    }

    /// Raster where every finite value is valid
    pub fn from_values(values: Array2<T>, transform: GeoTransform, crs: Crs) -> Self {
        let valid_mask = values.mapv(|v| is_finite_value(v));
        Self {
            values,
            valid_mask,
            transform,
            crs,
        }
    }

    /// Raster where cells equal to `nodata` (or non-finite) are invalid
    pub fn with_nodata(values: Array2<T>, nodata: T, transform: GeoTransform, crs: Crs) -> Self {
        let valid_mask = values.mapv(|v| v != nodata && is_finite_value(v));
        Self {
            values,
            valid_mask,
            transform,
            crs,
        }
    }

    /// All-invalid raster covering `grid`
    pub fn empty(grid: &GridSpec) -> Self {
        Self {
            values: Array2::zeros(grid.shape()),
            valid_mask: Array2::from_elem(grid.shape(), false),
            transform: grid.transform,
            crs: grid.crs,
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn grid(&self) -> GridSpec {
        let (height, width) = self.dim();
        GridSpec::new(height, width, self.transform, self.crs)
    }

    /// Value of a cell, `None` if the cell is invalid or out of range
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        match self.valid_mask.get((row, col)) {
            Some(true) => self.values.get((row, col)).copied(),
            _ => None,
        }
    }

    pub fn valid_count(&self) -> usize {
        self.valid_mask.iter().filter(|&&v| v).count()
    }

    /// True when no cell is valid
    pub fn is_empty(&self) -> bool {
        !self.valid_mask.iter().any(|&v| v)
    }

    /// Values with invalid cells replaced by `nodata`
    pub fn filled(&self, nodata: T) -> Array2<T> {
        Zip::from(&self.values)
            .and(&self.valid_mask)
            .map_collect(|&v, &ok| if ok { v } else { nodata })
    }
}

pub(crate) fn is_finite_value<T: ToPrimitive>(value: T) -> bool {
    value.to_f64().map_or(false, f64::is_finite)
}

/// Reflectance band with an optional validity mask
///
/// Without a mask, cells equal to the nodata value count as invalid.
#[derive(Debug, Clone)]
pub struct Band<T> {
    pub values: Array2<T>,
    pub valid_mask: Option<Array2<bool>>,
}

impl<T: RasterValue> Band<T> {
    pub fn new(values: Array2<T>) -> Self {
        Self {
            values,
            valid_mask: None,
        }
    }

    pub fn with_mask(values: Array2<T>, valid_mask: Array2<bool>) -> BrdfResult<Self> {
        if values.dim() != valid_mask.dim() {
            return Err(BrdfError::ShapeMismatch {
                expected: values.dim(),
                found: valid_mask.dim(),
            });
        }
        Ok(Self {
            values,
            valid_mask: Some(valid_mask),
        })
    }

    /// Band masked wherever it equals `nodata`
    pub fn masked_equal(values: Array2<T>, nodata: T) -> Self {
        let valid_mask = values.mapv(|v| v != nodata);
        Self {
            values,
            valid_mask: Some(valid_mask),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Effective validity: the band's own mask, or `values != nodata`
    pub fn validity(&self, nodata: T) -> Array2<bool> {
        match &self.valid_mask {
            Some(mask) => mask.clone(),
            None => self.values.mapv(|v| v != nodata),
        }
    }

    pub fn values_view(&self) -> ArrayView2<'_, T> {
        self.values.view()
    }
}

/// Error types for BRDF processing
#[derive(Debug, thiserror::Error)]
pub enum BrdfError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// No valid correction pixel could be produced; callers skip the correction
    #[error("BRDF grid for {0} is empty")]
    EmptyGrid(String),

    #[error("Resampling error: {0}")]
    Resampling(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for BRDF operations
pub type BrdfResult<T> = Result<T, BrdfError>;

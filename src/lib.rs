//! s2brdf: BRDF correction for Sentinel-2 multi-detector imagery
//!
//! Builds multiplicative correction grids that normalise surface
//! reflectance to a nadir view and a latitude-dependent reference sun
//! position, either per detector footprint or over the whole scene, and
//! applies them to reflectance bands. Angle grids and masks are handed in
//! by the calling product layer; nothing here reads product files.

pub mod core;
pub mod types;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    AngleGrid, Band, Bounds, BrdfError, BrdfResult, CorrectionGrid, Crs, DetectorFootprint,
    DetectorId, GeoTransform, GridSpec, Raster, RasterValue,
};

pub use crate::core::{
    apply_correction, apply_correction_values, AnglePair, BandAngles, BrdfConfig, BrdfCorrector,
    BrdfModel, L2ABand, ProductAngles, Resolution,
};

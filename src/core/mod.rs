//! Core BRDF correction modules

pub mod angles;
pub mod apply;
pub mod combined;
pub mod config;
pub mod correction;
pub mod fill_nodata;
pub mod kernel;
pub mod per_detector;
pub mod resample;
pub mod sun_angles;

// Re-export main types
pub use angles::{AnglePair, BandAngles, ProductAngles};
pub use apply::{apply_correction, apply_correction_values};
pub use combined::CombinedBuilder;
pub use config::{BrdfConfig, BrdfModel, L2ABand, ModelParameters, Resolution};
pub use correction::BrdfCorrector;
pub use fill_nodata::{FillNodataParams, GapFiller};
pub use kernel::{AngleInputs, DirectionalModel, KernelGeometry, ModelConfiguration};
pub use per_detector::{DetectorCorrectionParams, PerDetectorBuilder, SceneInputs};
pub use resample::{AffineResampler, GdalResampler, Resampler, Resampling};
pub use sun_angles::{constant_sun_zenith, sun_zenith_angle, sun_zenith_array};

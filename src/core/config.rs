use crate::types::{BrdfError, BrdfResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Directional reflectance model variant
///
/// Each tag selects its own formula set, see `core::kernel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BrdfModel {
    #[serde(rename = "none")]
    None,
    /// HLS c-factor normalisation (default)
    #[default]
    #[serde(rename = "HLS", alias = "default")]
    Hls,
    /// Legacy HLS wiring: measured sun zenith in the sun model, weighted sensor model
    #[serde(rename = "HLS_alt")]
    HlsAlt,
    /// Ross-Thick with Maignan hotspot volumetric kernel
    #[serde(rename = "sen2agri")]
    Sen2Agri,
    /// HLS formulas evaluated over pre-merged whole-scene viewing angles
    #[serde(rename = "combined")]
    Combined,
}

impl std::fmt::Display for BrdfModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrdfModel::None => write!(f, "none"),
            BrdfModel::Hls => write!(f, "HLS"),
            BrdfModel::HlsAlt => write!(f, "HLS_alt"),
            BrdfModel::Sen2Agri => write!(f, "sen2agri"),
            BrdfModel::Combined => write!(f, "combined"),
        }
    }
}

impl FromStr for BrdfModel {
    type Err = BrdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(BrdfModel::None),
            "HLS" | "default" => Ok(BrdfModel::Hls),
            "HLS_alt" => Ok(BrdfModel::HlsAlt),
            "sen2agri" => Ok(BrdfModel::Sen2Agri),
            "combined" => Ok(BrdfModel::Combined),
            _ => Err(BrdfError::InvalidParameter(format!(
                "unknown BRDF model: {}",
                s
            ))),
        }
    }
}

/// Kernel weights of the linear BRDF model for one spectral band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub f_iso: f64,
    pub f_geo: f64,
    pub f_vol: f64,
}

impl ModelParameters {
    pub const fn new(f_iso: f64, f_geo: f64, f_vol: f64) -> Self {
        Self { f_iso, f_geo, f_vol }
    }
}

/// Sentinel-2 L2A spectral bands carrying BRDF model parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum L2ABand {
    #[serde(alias = "coastal")]
    B01,
    #[serde(alias = "blue")]
    B02,
    #[serde(alias = "green")]
    B03,
    #[serde(alias = "red")]
    B04,
    #[serde(alias = "rededge1")]
    B05,
    #[serde(alias = "rededge2")]
    B06,
    #[serde(alias = "rededge3")]
    B07,
    #[serde(alias = "nir")]
    B08,
    #[serde(alias = "nir08")]
    B8A,
    #[serde(alias = "nir09")]
    B09,
    #[serde(alias = "swir16")]
    B11,
    #[serde(alias = "swir22")]
    B12,
}

// Roy et al. (2017), MODIS-derived weights; bands outside RGBNIR use the nearest MODIS band.
const B01_PARAMS: ModelParameters = ModelParameters::new(0.0774, 0.0079, 0.0372);
const B03_PARAMS: ModelParameters = ModelParameters::new(0.1306, 0.0178, 0.0580);
const B04_PARAMS: ModelParameters = ModelParameters::new(0.1690, 0.0227, 0.0574);
const B05_PARAMS: ModelParameters = ModelParameters::new(0.2085, 0.0256, 0.0845);
const B06_PARAMS: ModelParameters = ModelParameters::new(0.2316, 0.0273, 0.1003);
const B07_PARAMS: ModelParameters = ModelParameters::new(0.2599, 0.0294, 0.1197);
const B08_PARAMS: ModelParameters = ModelParameters::new(0.3093, 0.0330, 0.1535);
const B09_PARAMS: ModelParameters = ModelParameters::new(0.3201, 0.0471, 0.1611);
const B11_PARAMS: ModelParameters = ModelParameters::new(0.3430, 0.0453, 0.1154);
const B12_PARAMS: ModelParameters = ModelParameters::new(0.2658, 0.0387, 0.0639);

impl L2ABand {
    pub const ALL: [L2ABand; 12] = [
        L2ABand::B01,
        L2ABand::B02,
        L2ABand::B03,
        L2ABand::B04,
        L2ABand::B05,
        L2ABand::B06,
        L2ABand::B07,
        L2ABand::B08,
        L2ABand::B8A,
        L2ABand::B09,
        L2ABand::B11,
        L2ABand::B12,
    ];

    /// Static (f_iso, f_geo, f_vol) triple for this band
    pub fn model_parameters(&self) -> ModelParameters {
        match self {
            L2ABand::B01 | L2ABand::B02 => B01_PARAMS,
            L2ABand::B03 => B03_PARAMS,
            L2ABand::B04 => B04_PARAMS,
            L2ABand::B05 => B05_PARAMS,
            L2ABand::B06 => B06_PARAMS,
            L2ABand::B07 => B07_PARAMS,
            L2ABand::B08 | L2ABand::B8A => B08_PARAMS,
            L2ABand::B09 => B09_PARAMS,
            L2ABand::B11 => B11_PARAMS,
            L2ABand::B12 => B12_PARAMS,
        }
    }
}

impl std::fmt::Display for L2ABand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for L2ABand {
    type Err = BrdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let band = match s.to_lowercase().as_str() {
            "b01" | "coastal" => L2ABand::B01,
            "b02" | "blue" => L2ABand::B02,
            "b03" | "green" => L2ABand::B03,
            "b04" | "red" => L2ABand::B04,
            "b05" | "rededge1" => L2ABand::B05,
            "b06" | "rededge2" => L2ABand::B06,
            "b07" | "rededge3" => L2ABand::B07,
            "b08" | "nir" => L2ABand::B08,
            "b8a" | "nir08" => L2ABand::B8A,
            "b09" | "nir09" => L2ABand::B09,
            "b11" | "swir16" => L2ABand::B11,
            "b12" | "swir22" => L2ABand::B12,
            _ => {
                return Err(BrdfError::InvalidParameter(format!(
                    "no BRDF parameters for band: {}",
                    s
                )))
            }
        };
        Ok(band)
    }
}

/// Output resolution of a correction grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "10m")]
    R10m,
    #[serde(rename = "20m")]
    R20m,
    #[default]
    #[serde(rename = "60m")]
    R60m,
    #[serde(rename = "120m")]
    R120m,
}

impl Resolution {
    /// Pixel size in meters
    pub fn meters(&self) -> f64 {
        match self {
            Resolution::R10m => 10.0,
            Resolution::R20m => 20.0,
            Resolution::R60m => 60.0,
            Resolution::R120m => 120.0,
        }
    }
}

/// BRDF correction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrdfConfig {
    pub model: BrdfModel,
    pub bands: Vec<L2ABand>,
    pub resolution: Resolution,
    /// Evaluate each detector footprint separately instead of the merged scene grid
    pub per_detector: bool,
    /// 3x3 smoothing passes after gap interpolation
    pub smoothing_iterations: usize,
    /// Gap interpolation search distance in low-resolution pixels
    pub max_search_distance: f64,
    pub brdf_weight: f64,
    /// Apply the correction on log10-scaled reflectances
    pub log10_scale: bool,
    pub nodata: u16,
}

impl Default for BrdfConfig {
    fn default() -> Self {
        Self {
            model: BrdfModel::Hls,
            bands: vec![L2ABand::B02, L2ABand::B03, L2ABand::B04, L2ABand::B08],
            resolution: Resolution::R60m,
            per_detector: true,
            smoothing_iterations: 10,
            max_search_distance: 100.0, // GDAL FillNodata default
            brdf_weight: 1.0,
            log10_scale: true,
            nodata: 0,
        }
    }
}

impl BrdfConfig {
    pub fn validate(&self) -> BrdfResult<()> {
        if self.model == BrdfModel::None {
            return Err(BrdfError::InvalidParameter(
                "BRDF model cannot be 'none'".to_string(),
            ));
        }
        if !(self.brdf_weight.is_finite() && self.brdf_weight > 0.0) {
            return Err(BrdfError::InvalidParameter(format!(
                "brdf_weight must be positive, got {}",
                self.brdf_weight
            )));
        }
        if !(self.max_search_distance.is_finite() && self.max_search_distance > 0.0) {
            return Err(BrdfError::InvalidParameter(format!(
                "max_search_distance must be positive, got {}",
                self.max_search_distance
            )));
        }
        Ok(())
    }

    /// Whether the whole-scene strategy has to be used
    pub fn uses_combined_strategy(&self) -> bool {
        !self.per_detector || self.model == BrdfModel::Combined
    }
}

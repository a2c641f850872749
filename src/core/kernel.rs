//! Semi-empirical kernel-driven BRDF model (Ross-Thick / Li-Sparse)
//!
//! A single kernel evaluation serves both the sensor model (measured
//! geometry) and the sun model (normalisation geometry); the two only
//! differ in how the angles are wired, see [`ModelConfiguration`].

use crate::core::config::{BrdfModel, ModelParameters};
use crate::types::{AngleGrid, BrdfError, BrdfResult, Raster, RasterValue};
use ndarray::{Array2, ArrayView2};
use num_traits::{Float, NumCast};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

/// Maignan et al. (2004) hotspot width
const HOTSPOT_XSI0_DEG: f64 = 1.5;

/// Sun/view geometry of one cell in radians
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelGeometry {
    pub theta_sun: f64,
    pub theta_view: f64,
    /// Relative azimuth in [0, pi]
    pub phi: f64,
}

impl KernelGeometry {
    pub fn new(theta_sun: f64, theta_view: f64, phi: f64) -> Self {
        Self {
            theta_sun,
            theta_view,
            phi,
        }
    }

    /// Geometry from zenith/azimuth angles in degrees
    pub fn from_degrees(
        sun_zenith: f64,
        sun_azimuth: f64,
        view_zenith: f64,
        view_azimuth: f64,
    ) -> Self {
        Self {
            theta_sun: sun_zenith.to_radians(),
            theta_view: view_zenith.to_radians(),
            phi: relative_azimuth(sun_azimuth, view_azimuth),
        }
    }

    /// Nadir view with zero relative azimuth, as used by the sun model
    pub fn nadir(theta_sun: f64) -> Self {
        Self::new(theta_sun, 0.0, 0.0)
    }
}

/// Absolute azimuth difference in radians, wrapped into [0, pi]
pub fn relative_azimuth(sun_azimuth: f64, view_azimuth: f64) -> f64 {
    let phi = (sun_azimuth - view_azimuth).to_radians().abs() % (2.0 * PI);
    if phi > PI {
        2.0 * PI - phi
    } else {
        phi
    }
}

/// Intermediate angular terms shared by both kernels
#[derive(Debug, Clone, Copy)]
struct KernelTerms {
    cos_sun: f64,
    cos_view: f64,
    sec_sun: f64,
    sec_view: f64,
    cos_xsi: f64,
    sin_xsi: f64,
    xsi: f64,
    t: f64,
}

impl KernelTerms {
    fn new(geometry: &KernelGeometry) -> Self {
        let KernelGeometry {
            theta_sun,
            theta_view,
            phi,
        } = *geometry;

        let tan_sun = theta_sun.tan();
        let tan_view = theta_view.tan();
        let cos_sun = theta_sun.cos();
        let cos_view = theta_view.cos();
        let sec_sun = 1.0 / cos_sun;
        let sec_view = 1.0 / cos_view;

        let delta_sq = tan_sun.powi(2) + tan_view.powi(2) - 2.0 * tan_sun * tan_view * phi.cos();
        // rounding can push this just below zero near the hotspot; NaN is kept
        let delta = if delta_sq < 0.0 { 0.0 } else { delta_sq }.sqrt();
        // air mass
        let masse = sec_sun + sec_view;

        let cos_xsi = (cos_sun * cos_view + theta_sun.sin() * theta_view.sin() * phi.cos())
            .clamp(-1.0, 1.0);
        let sin_xsi = (1.0 - cos_xsi.powi(2)).sqrt();
        let xsi = cos_xsi.acos();

        // NaN survives clamp and ends up in the validity mask
        let cos_t = (2.0 * (delta.powi(2) + (tan_sun * tan_view * phi.sin()).powi(2)).sqrt()
            / masse)
            .clamp(-1.0, 1.0);
        let t = cos_t.acos();

        Self {
            cos_sun,
            cos_view,
            sec_sun,
            sec_view,
            cos_xsi,
            sin_xsi,
            xsi,
            t,
        }
    }

    fn ross_thick(&self) -> f64 {
        ((FRAC_PI_2 - self.xsi) * self.cos_xsi + self.sin_xsi) / (self.cos_sun + self.cos_view)
            - FRAC_PI_4
    }

    fn ross_thick_hotspot(&self) -> f64 {
        let xsi0 = HOTSPOT_XSI0_DEG.to_radians();
        let hotspot = 1.0 + 1.0 / (1.0 + self.xsi / xsi0);
        4.0 / (3.0 * PI) * ((FRAC_PI_2 - self.xsi) * self.cos_xsi + self.sin_xsi)
            / (self.cos_sun + self.cos_view)
            * hotspot
            - 1.0 / 3.0
    }

    fn li_sparse(&self) -> f64 {
        let overlap = (self.t - self.t.sin() * self.t.cos()) * (self.sec_sun + self.sec_view) / PI;
        overlap - self.sec_sun - self.sec_view
            + 0.5 * (1.0 + self.cos_xsi) * self.sec_sun * self.sec_view
    }
}

/// Ross-Thick volumetric scattering kernel
pub fn volumetric_kernel(geometry: &KernelGeometry) -> f64 {
    KernelTerms::new(geometry).ross_thick()
}

/// Ross-Thick kernel with the Maignan hotspot factor
pub fn volumetric_kernel_hotspot(geometry: &KernelGeometry) -> f64 {
    KernelTerms::new(geometry).ross_thick_hotspot()
}

/// Li-Sparse geometric (surface roughness) kernel
pub fn geometric_kernel(geometry: &KernelGeometry) -> f64 {
    KernelTerms::new(geometry).li_sparse()
}

/// Linear kernel model value `f_iso + (f_geo * fr + f_vol * fv) / weight`
pub fn model_value(
    model: BrdfModel,
    geometry: &KernelGeometry,
    params: &ModelParameters,
    weight: f64,
) -> f64 {
    let terms = KernelTerms::new(geometry);
    let f_vol = match model {
        BrdfModel::Sen2Agri => terms.ross_thick_hotspot(),
        _ => terms.ross_thick(),
    };
    let f_geo = terms.li_sparse();
    params.f_iso + (params.f_geo * f_geo + params.f_vol * f_vol) / weight
}

/// Ratio of sun to sensor model; `None` where the ratio is 0 or not finite
pub fn correction_factor(sun_model: f64, sensor_model: f64) -> Option<f64> {
    let factor = sun_model / sensor_model;
    if factor.is_finite() && factor != 0.0 {
        Some(factor)
    } else {
        None
    }
}

/// Input wiring of the kernel model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelConfiguration {
    /// Measured per-pixel sun and view geometry
    Sensor,
    /// Normalisation geometry: nadir view, reference sun zenith
    Sun,
}

/// Low resolution angle grids a model is evaluated on
///
/// All grids must share one shape; the reference sun zenith is in radians.
#[derive(Debug, Clone, Copy)]
pub struct AngleInputs<'a> {
    pub sun_zenith: &'a AngleGrid,
    pub sun_azimuth: &'a AngleGrid,
    pub view_zenith: &'a AngleGrid,
    pub view_azimuth: &'a AngleGrid,
    pub reference_sun_zenith: ArrayView2<'a, f32>,
}

/// Directional model of one band over one set of angle grids
pub struct DirectionalModel<'a> {
    model: BrdfModel,
    params: ModelParameters,
    brdf_weight: f64,
    angles: AngleInputs<'a>,
}

impl<'a> DirectionalModel<'a> {
    pub fn new(
        model: BrdfModel,
        params: ModelParameters,
        brdf_weight: f64,
        angles: AngleInputs<'a>,
    ) -> BrdfResult<Self> {
        if model == BrdfModel::None {
            return Err(BrdfError::InvalidParameter(
                "model cannot be BrdfModel::None".to_string(),
            ));
        }

        let expected = angles.view_zenith.dim();
        for found in [
            angles.sun_zenith.dim(),
            angles.sun_azimuth.dim(),
            angles.view_azimuth.dim(),
            angles.reference_sun_zenith.dim(),
        ] {
            if found != expected {
                return Err(BrdfError::ShapeMismatch { expected, found });
            }
        }

        Ok(Self {
            model,
            params,
            brdf_weight,
            angles,
        })
    }

    /// Kernel geometry of one cell, `None` if any input angle is invalid
    pub fn geometry(
        &self,
        configuration: ModelConfiguration,
        row: usize,
        col: usize,
    ) -> Option<KernelGeometry> {
        let a = &self.angles;
        let sun_zenith = a.sun_zenith.get(row, col)? as f64;
        let sun_azimuth = a.sun_azimuth.get(row, col)? as f64;
        let view_zenith = a.view_zenith.get(row, col)? as f64;
        let view_azimuth = a.view_azimuth.get(row, col)? as f64;

        let geometry = match (configuration, self.model) {
            (ModelConfiguration::Sensor, _) => {
                KernelGeometry::from_degrees(sun_zenith, sun_azimuth, view_zenith, view_azimuth)
            }
            (ModelConfiguration::Sun, BrdfModel::HlsAlt) => KernelGeometry::new(
                sun_zenith.to_radians(),
                0.0,
                relative_azimuth(sun_azimuth, view_azimuth),
            ),
            (ModelConfiguration::Sun, _) => {
                KernelGeometry::nadir(a.reference_sun_zenith[[row, col]] as f64)
            }
        };
        Some(geometry)
    }

    /// Model values for one configuration; NaN where inputs are invalid
    pub fn evaluate(&self, configuration: ModelConfiguration) -> Array2<f64> {
        // the sun model is never weighted
        let weight = match configuration {
            ModelConfiguration::Sensor => self.brdf_weight,
            ModelConfiguration::Sun => 1.0,
        };
        Array2::from_shape_fn(self.angles.view_zenith.dim(), |(row, col)| {
            self.geometry(configuration, row, col)
                .map_or(f64::NAN, |g| model_value(self.model, &g, &self.params, weight))
        })
    }

    /// Correction parameter `sun model / sensor model` on the angle grid
    ///
    /// Cells where the ratio is exactly 0 or not finite are invalid.
    pub fn band_param<F: Float + RasterValue>(&self) -> Raster<F> {
        let sun = self.evaluate(ModelConfiguration::Sun);
        let sensor = self.evaluate(ModelConfiguration::Sensor);

        let mut values = Array2::<F>::zeros(sun.dim());
        let mut valid_mask = Array2::from_elem(sun.dim(), false);

        ndarray::Zip::from(&mut values)
            .and(&mut valid_mask)
            .and(&sun)
            .and(&sensor)
            .for_each(|value, valid, &sun, &sensor| {
                let factor = correction_factor(sun, sensor).and_then(<F as NumCast>::from);
                if let Some(factor) = factor.filter(|f| f.is_finite() && !f.is_zero()) {
                    *value = factor;
                    *valid = true;
                }
            });

        Raster {
            values,
            valid_mask,
            transform: self.angles.view_zenith.transform,
            crs: self.angles.view_zenith.crs,
        }
    }
}

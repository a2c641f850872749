//! Reprojection of masked rasters onto a target grid
//!
//! [`Resampler`] is the seam the correction builders consume.
//! [`AffineResampler`] covers grids sharing one CRS (the usual case: all
//! Sentinel-2 angle grids, masks and bands of a tile are in the tile's UTM
//! zone); [`GdalResampler`] warps through GDAL when CRSs differ.

use crate::types::{is_finite_value, BrdfError, BrdfResult, GridSpec, Raster, RasterValue};
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use gdal_sys::{CPLErr, GDALResampleAlg};
use ndarray::{Array2, Zip};
use num_traits::NumCast;
use std::ptr;

/// Resampling method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resampling {
    Nearest,
    Bilinear,
}

/// Reprojects a masked source raster into a destination grid
///
/// Destination cells outside the source, or whose source cells are invalid
/// or equal `nodata`, are invalid in the output and hold `nodata`.
pub trait Resampler: Send + Sync {
    fn resample<T: RasterValue>(
        &self,
        source: &Raster<T>,
        destination: &GridSpec,
        method: Resampling,
        nodata: T,
    ) -> BrdfResult<Raster<T>>;
}

/// Native resampler for rasters sharing one CRS
#[derive(Debug, Clone, Copy, Default)]
pub struct AffineResampler;

impl AffineResampler {
    pub fn new() -> Self {
        Self
    }

    fn source_value<T: RasterValue>(
        source: &Raster<T>,
        row: usize,
        col: usize,
        nodata: T,
    ) -> Option<f64> {
        let value = source.get(row, col)?;
        if value == nodata {
            return None;
        }
        value.to_f64().filter(|v| v.is_finite())
    }

    fn sample_nearest<T: RasterValue>(
        source: &Raster<T>,
        col: f64,
        row: f64,
        nodata: T,
    ) -> Option<f64> {
        let (height, width) = source.dim();
        if col < 0.0 || row < 0.0 || col >= width as f64 || row >= height as f64 {
            return None;
        }
        Self::source_value(source, row.floor() as usize, col.floor() as usize, nodata)
    }

    /// Bilinear sample; weights of invalid neighbours are dropped and the rest renormalised
    fn sample_bilinear<T: RasterValue>(
        source: &Raster<T>,
        col: f64,
        row: f64,
        nodata: T,
    ) -> Option<f64> {
        let (height, width) = source.dim();
        if col < 0.0 || row < 0.0 || col >= width as f64 || row >= height as f64 {
            return None;
        }

        // pixel centres sit at +0.5
        let x = col - 0.5;
        let y = row - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let dx = x - x0;
        let dy = y - y0;

        let clamp_col = |c: f64| (c.max(0.0) as usize).min(width - 1);
        let clamp_row = |r: f64| (r.max(0.0) as usize).min(height - 1);
        let (c0, c1) = (clamp_col(x0), clamp_col(x0 + 1.0));
        let (r0, r1) = (clamp_row(y0), clamp_row(y0 + 1.0));

        let neighbours = [
            (r0, c0, (1.0 - dx) * (1.0 - dy)),
            (r0, c1, dx * (1.0 - dy)),
            (r1, c0, (1.0 - dx) * dy),
            (r1, c1, dx * dy),
        ];

        let mut sum = 0.0;
        let mut weight_sum = 0.0;
        for (r, c, weight) in neighbours {
            if weight <= 0.0 {
                continue;
            }
            if let Some(value) = Self::source_value(source, r, c, nodata) {
                sum += value * weight;
                weight_sum += weight;
            }
        }

        if weight_sum > 0.0 {
            Some(sum / weight_sum)
        } else {
            None
        }
    }
}

impl Resampler for AffineResampler {
    fn resample<T: RasterValue>(
        &self,
        source: &Raster<T>,
        destination: &GridSpec,
        method: Resampling,
        nodata: T,
    ) -> BrdfResult<Raster<T>> {
        if source.crs != destination.crs {
            return Err(BrdfError::Resampling(format!(
                "source CRS {} differs from destination CRS {}; use GdalResampler",
                source.crs, destination.crs
            )));
        }
        let (height, width) = source.dim();
        if height == 0 || width == 0 {
            return Ok(Raster::empty(destination));
        }

        log::debug!(
            "Resampling {}x{} -> {}x{} ({:?})",
            height,
            width,
            destination.height,
            destination.width,
            method
        );

        let mut values = Array2::from_elem(destination.shape(), nodata);
        let mut valid_mask = Array2::from_elem(destination.shape(), false);

        let fill = |(row, col): (usize, usize), value: &mut T, valid: &mut bool| {
            let (x, y) = destination
                .transform
                .pixel_to_map(col as f64 + 0.5, row as f64 + 0.5);
            let sampled = source.transform.map_to_pixel(x, y).and_then(|(src_col, src_row)| {
                match method {
                    Resampling::Nearest => Self::sample_nearest(source, src_col, src_row, nodata),
                    Resampling::Bilinear => Self::sample_bilinear(source, src_col, src_row, nodata),
                }
            });
            if let Some(out) = sampled.and_then(<T as NumCast>::from) {
                if out != nodata {
                    *value = out;
                    *valid = true;
                }
            }
        };

        #[cfg(feature = "parallel")]
        Zip::indexed(&mut values)
            .and(&mut valid_mask)
            .par_for_each(fill);
        #[cfg(not(feature = "parallel"))]
        Zip::indexed(&mut values).and(&mut valid_mask).for_each(fill);

        Ok(Raster {
            values,
            valid_mask,
            transform: destination.transform,
            crs: destination.crs,
        })
    }
}

/// GDAL warp based resampler (cross-CRS capable)
#[derive(Debug, Clone, Copy, Default)]
pub struct GdalResampler;

impl GdalResampler {
    pub fn new() -> Self {
        Self
    }

    fn mem_dataset<T: RasterValue>(
        grid: &GridSpec,
        data: Vec<T>,
        nodata: T,
    ) -> BrdfResult<Dataset> {
        let driver = DriverManager::get_driver_by_name("MEM")?;
        let mut dataset = driver.create_with_band_type::<T, _>(
            "",
            grid.width as isize,
            grid.height as isize,
            1,
        )?;
        dataset.set_geo_transform(&grid.transform.to_gdal())?;
        dataset.set_spatial_ref(&SpatialRef::from_epsg(grid.crs.epsg)?)?;

        let nodata_value = nodata.to_f64().ok_or_else(|| {
            BrdfError::Resampling(format!("nodata {:?} not representable as f64", nodata))
        })?;

        {
            let mut band = dataset.rasterband(1)?;
            band.set_no_data_value(Some(nodata_value))?;
            let buffer = Buffer::new((grid.width, grid.height), data);
            band.write((0, 0), (grid.width, grid.height), &buffer)?;
        }

        Ok(dataset)
    }
}

impl Resampler for GdalResampler {
    fn resample<T: RasterValue>(
        &self,
        source: &Raster<T>,
        destination: &GridSpec,
        method: Resampling,
        nodata: T,
    ) -> BrdfResult<Raster<T>> {
        let source_grid = source.grid();
        let src_data: Vec<T> = source
            .filled(nodata)
            .iter()
            .map(|&v| if is_finite_value(v) { v } else { nodata })
            .collect();
        let src = Self::mem_dataset(&source_grid, src_data, nodata)?;
        let dst = Self::mem_dataset(
            destination,
            vec![nodata; destination.height * destination.width],
            nodata,
        )?;

        log::debug!(
            "GDAL reprojection {} -> {} ({:?})",
            source.crs,
            destination.crs,
            method
        );

        // gdal::raster::reproject hardcodes bilinear, nearest needs the raw call.
        // SAFETY: `src` and `dst` are owned MEM datasets that outlive the call.
        // Null WKT pointers make GDAL use each dataset's own spatial reference;
        // null progress callback, progress argument and warp options are accepted.
        let rv = unsafe {
            gdal_sys::GDALReprojectImage(
                src.c_dataset(),
                ptr::null(),
                dst.c_dataset(),
                ptr::null(),
                match method {
                    Resampling::Nearest => GDALResampleAlg::GRA_NearestNeighbour,
                    Resampling::Bilinear => GDALResampleAlg::GRA_Bilinear,
                },
                0.0,
                0.0,
                None,
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        if rv != CPLErr::CE_None {
            return Err(BrdfError::Resampling(format!(
                "GDALReprojectImage failed with code {:?}",
                rv
            )));
        }

        let band = dst.rasterband(1)?;
        let buffer = band.read_as::<T>(
            (0, 0),
            (destination.width, destination.height),
            (destination.width, destination.height),
            None,
        )?;
        let values = Array2::from_shape_vec(destination.shape(), buffer.data)
            .map_err(|e| BrdfError::Resampling(format!("Failed to reshape output: {}", e)))?;

        Ok(Raster::with_nodata(
            values,
            nodata,
            destination.transform,
            destination.crs,
        ))
    }
}

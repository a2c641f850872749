use crate::types::{BrdfResult, Raster, RasterValue};
use ndarray::{Array2, Zip};
use num_traits::{Float, NumCast};

/// The 8 search directions (row step, col step)
const DIRECTIONS: [(isize, isize); 8] = [
    (-1, 0),
    (1, 0),
    (0, -1),
    (0, 1),
    (-1, -1),
    (-1, 1),
    (1, -1),
    (1, 1),
];

/// Gap interpolation parameters
#[derive(Debug, Clone)]
pub struct FillNodataParams {
    /// Maximum distance in pixels to search for valid cells
    pub max_search_distance: f64,
    /// 3x3 smoothing passes applied to interpolated cells only
    pub smoothing_iterations: usize,
}

impl Default for FillNodataParams {
    fn default() -> Self {
        Self {
            max_search_distance: 100.0,
            smoothing_iterations: 10,
        }
    }
}

/// Fills invalid cells of a raster from their valid neighbourhood
///
/// Every invalid cell looks along the 8 principal directions for the
/// nearest originally valid cell within `max_search_distance` and takes the
/// inverse-distance-squared weighted mean of what it finds. Interpolated
/// cells are then smoothed with a 3x3 mean filter; original cells never
/// change.
pub struct GapFiller {
    params: FillNodataParams,
}

impl GapFiller {
    pub fn new() -> Self {
        Self {
            params: FillNodataParams::default(),
        }
    }

    pub fn with_params(params: FillNodataParams) -> Self {
        Self { params }
    }

    pub fn fill<F: Float + RasterValue>(&self, raster: &Raster<F>) -> BrdfResult<Raster<F>> {
        let (height, width) = raster.dim();
        let valid_before = raster.valid_count();
        if valid_before == 0 || valid_before == height * width {
            return Ok(raster.clone());
        }

        let source: Array2<Option<f64>> = Zip::from(&raster.values)
            .and(&raster.valid_mask)
            .map_collect(|&v, &ok| {
                if ok {
                    v.to_f64().filter(|v| v.is_finite())
                } else {
                    None
                }
            });

        let max_steps = self.params.max_search_distance.max(0.0).floor() as usize;
        let interpolate = |(row, col): (usize, usize), cell: &Option<f64>| -> Option<f64> {
            if cell.is_some() {
                return *cell;
            }
            search_directions(&source, row, col, max_steps)
        };

        #[cfg(feature = "parallel")]
        let interpolated = Zip::indexed(&source).par_map_collect(interpolate);
        #[cfg(not(feature = "parallel"))]
        let interpolated = Zip::indexed(&source).map_collect(interpolate);

        let filled_mask: Array2<bool> = Zip::from(&source)
            .and(&interpolated)
            .map_collect(|s, i| s.is_none() && i.is_some());
        let filled_count = filled_mask.iter().filter(|&&f| f).count();

        let mut current = interpolated;
        for _ in 0..self.params.smoothing_iterations {
            current = smooth_pass(&current, &filled_mask);
        }

        let mut values = raster.values.clone();
        let mut valid_mask = raster.valid_mask.clone();
        Zip::from(&mut values)
            .and(&mut valid_mask)
            .and(&current)
            .and(&filled_mask)
            .for_each(|value, valid, smoothed, &filled| {
                if !filled {
                    return;
                }
                if let Some(v) = (*smoothed).and_then(<F as NumCast>::from) {
                    if v.is_finite() {
                        *value = v;
                        *valid = true;
                    }
                }
            });

        log::debug!(
            "Filled {} of {} invalid cells ({} smoothing passes)",
            filled_count,
            height * width - valid_before,
            self.params.smoothing_iterations
        );

        Ok(Raster {
            values,
            valid_mask,
            transform: raster.transform,
            crs: raster.crs,
        })
    }
}

impl Default for GapFiller {
    fn default() -> Self {
        Self::new()
    }
}

fn search_directions(
    source: &Array2<Option<f64>>,
    row: usize,
    col: usize,
    max_steps: usize,
) -> Option<f64> {
    let (height, width) = source.dim();
    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;

    for (dr, dc) in DIRECTIONS {
        for step in 1..=max_steps {
            let r = row as isize + dr * step as isize;
            let c = col as isize + dc * step as isize;
            if r < 0 || c < 0 || r >= height as isize || c >= width as isize {
                break;
            }
            if let Some(value) = source[[r as usize, c as usize]] {
                let distance_sq = ((dr * dr + dc * dc) as f64) * (step * step) as f64;
                if distance_sq > max_steps as f64 * max_steps as f64 {
                    break;
                }
                let weight = 1.0 / distance_sq;
                weighted_sum += value * weight;
                weight_sum += weight;
                break;
            }
        }
    }

    if weight_sum > 0.0 {
        Some(weighted_sum / weight_sum)
    } else {
        None
    }
}

/// One 3x3 mean pass over the interpolated cells
fn smooth_pass(values: &Array2<Option<f64>>, filled_mask: &Array2<bool>) -> Array2<Option<f64>> {
    let (height, width) = values.dim();
    Zip::indexed(values)
        .and(filled_mask)
        .map_collect(|(row, col), &value, &filled| {
            if !filled || value.is_none() {
                return value;
            }
            let mut sum = 0.0;
            let mut count = 0usize;
            for r in row.saturating_sub(1)..=(row + 1).min(height - 1) {
                for c in col.saturating_sub(1)..=(col + 1).min(width - 1) {
                    if let Some(v) = values[[r, c]] {
                        sum += v;
                        count += 1;
                    }
                }
            }
            if count > 0 {
                Some(sum / count as f64)
            } else {
                value
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Crs, GeoTransform};
    use approx::assert_relative_eq;
    use ndarray::array;

    fn raster(values: Array2<f32>, valid: Array2<bool>) -> Raster<f32> {
        Raster::new(
            values,
            valid,
            GeoTransform::north_up(0.0, 0.0, 60.0),
            Crs::from_epsg(32633),
        )
        .unwrap()
    }

    #[test]
    fn test_constant_field_preserved() {
        let mut valid = Array2::from_elem((5, 5), true);
        valid[[2, 2]] = false;
        valid[[0, 4]] = false;
        valid[[4, 0]] = false;
        let input = raster(Array2::from_elem((5, 5), 1.2), valid);

        let out = GapFiller::new().fill(&input).unwrap();
        assert_eq!(out.valid_count(), 25);
        for &v in out.values.iter() {
            assert_relative_eq!(v, 1.2, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_valid_cells_untouched() {
        let values = array![[1.0f32, 0.0, 3.0], [1.0, 0.0, 3.0]];
        let valid = array![[true, false, true], [true, false, true]];
        let input = raster(values, valid);
        let out = GapFiller::new().fill(&input).unwrap();

        assert_eq!(out.values[[0, 0]], 1.0);
        assert_eq!(out.values[[1, 2]], 3.0);
        // equidistant neighbours left and right
        assert!(out.valid_mask[[0, 1]]);
        assert!(out.values[[0, 1]] > 1.0 && out.values[[0, 1]] < 3.0);
    }

    #[test]
    fn test_interpolation_without_smoothing() {
        let values = array![[2.0f32, 0.0, 0.0, 8.0]];
        let valid = array![[true, false, false, true]];
        let filler = GapFiller::with_params(FillNodataParams {
            max_search_distance: 100.0,
            smoothing_iterations: 0,
        });
        let out = filler.fill(&raster(values, valid)).unwrap();
        // cell 1: d=1 to 2.0, d=2 to 8.0 -> (2 + 8/4) / (1 + 1/4)
        assert_relative_eq!(out.values[[0, 1]], 3.2, epsilon = 1e-6);
        assert_relative_eq!(out.values[[0, 2]], 6.8, epsilon = 1e-6);
    }

    #[test]
    fn test_search_distance_limits_fill() {
        let mut values = Array2::from_elem((1, 6), 0.0f32);
        let mut valid = Array2::from_elem((1, 6), false);
        values[[0, 0]] = 5.0;
        valid[[0, 0]] = true;
        let filler = GapFiller::with_params(FillNodataParams {
            max_search_distance: 2.0,
            smoothing_iterations: 0,
        });
        let out = filler.fill(&raster(values, valid)).unwrap();
        assert!(out.valid_mask[[0, 1]]);
        assert!(out.valid_mask[[0, 2]]);
        assert!(!out.valid_mask[[0, 3]]);
        assert!(!out.valid_mask[[0, 5]]);
    }

    #[test]
    fn test_empty_raster_unchanged() {
        let input = raster(Array2::zeros((3, 3)), Array2::from_elem((3, 3), false));
        let out = GapFiller::new().fill(&input).unwrap();
        assert!(out.is_empty());
    }
}

use approx::assert_relative_eq;
use ndarray::Array2;
use s2brdf::core::kernel::{model_value, KernelGeometry};
use s2brdf::{
    AnglePair, Band, BandAngles, Bounds, BrdfConfig, BrdfCorrector, BrdfModel, CorrectionGrid,
    Crs, GeoTransform, L2ABand, ProductAngles, Raster, Resolution,
};

const LEFT: f32 = 300000.0;
const TOP: f32 = 5000000.0;
const SUN_ZENITH: f32 = 40.0;
const SUN_AZIMUTH: f32 = 150.0;
const VIEW_AZIMUTH: f32 = 100.0;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn crs() -> Crs {
    Crs::from_epsg(32633)
}

/// Constant 5x5 angle grid at 200 m covering the 1 km test scene
fn angles(value: f32) -> s2brdf::AngleGrid {
    Raster::from_values(
        Array2::from_elem((5, 5), value),
        GeoTransform::north_up(LEFT as f64, TOP as f64, 200.0),
        crs(),
    )
}

/// Two detectors splitting the scene into equal-width halves, 10 deg apart
fn two_detector_product(left_zenith: f32, right_zenith: f32) -> ProductAngles {
    let footprint = Raster::with_nodata(
        Array2::from_shape_fn((20, 20), |(_, col)| if col < 10 { 1u8 } else { 2 }),
        0,
        GeoTransform::north_up(LEFT as f64, TOP as f64, 50.0),
        crs(),
    );
    let band_angles = BandAngles::new(footprint)
        .with_detector(
            1,
            AnglePair::new(angles(left_zenith), angles(VIEW_AZIMUTH)).unwrap(),
        )
        .with_detector(
            2,
            AnglePair::new(angles(right_zenith), angles(VIEW_AZIMUTH)).unwrap(),
        );

    ProductAngles::new(
        "S2A_MSIL2A_20230615T101031_N0509_R022_T33TUN",
        crs(),
        Bounds {
            left: LEFT as f64,
            bottom: TOP as f64 - 1000.0,
            right: LEFT as f64 + 1000.0,
            top: TOP as f64,
        },
        (0.0, 0.0),
        AnglePair::new(angles(SUN_ZENITH), angles(SUN_AZIMUTH)).unwrap(),
    )
    .with_band(L2ABand::B04, band_angles.clone())
    .with_band(L2ABand::B08, band_angles)
}

fn expected_factor(band: L2ABand, view_zenith: f32) -> f64 {
    let params = band.model_parameters();
    let sun = model_value(
        BrdfModel::Hls,
        &KernelGeometry::nadir(31f64.to_radians()),
        &params,
        1.0,
    );
    let sensor = model_value(
        BrdfModel::Hls,
        &KernelGeometry::from_degrees(
            SUN_ZENITH as f64,
            SUN_AZIMUTH as f64,
            view_zenith as f64,
            VIEW_AZIMUTH as f64,
        ),
        &params,
        1.0,
    );
    sun / sensor
}

fn config() -> BrdfConfig {
    BrdfConfig {
        resolution: Resolution::R10m,
        bands: vec![L2ABand::B04, L2ABand::B08],
        ..Default::default()
    }
}

#[test]
fn test_two_detector_scene() {
    init_logging();

    let product = two_detector_product(5.0, 15.0);
    let corrector = BrdfCorrector::new(config()).unwrap();
    let grid = corrector.default_grid(&product);
    assert_eq!(grid.shape(), (100, 100));

    let correction: CorrectionGrid<f32> = corrector
        .correction_values(&product, L2ABand::B04, &grid)
        .unwrap();

    // (a) fully valid
    assert_eq!(correction.valid_count(), 100 * 100);

    // (b) each half carries its detector's factor
    let left = correction.values[[50, 10]];
    let right = correction.values[[50, 90]];
    assert_relative_eq!(left as f64, expected_factor(L2ABand::B04, 5.0), epsilon = 1e-5);
    assert_relative_eq!(right as f64, expected_factor(L2ABand::B04, 15.0), epsilon = 1e-5);
    assert_relative_eq!(
        (left - right) as f64,
        expected_factor(L2ABand::B04, 5.0) - expected_factor(L2ABand::B04, 15.0),
        epsilon = 1e-5
    );
    for row in 0..100 {
        assert_eq!(correction.values[[row, 0]], left);
        assert_eq!(correction.values[[row, 49]], left);
        assert_eq!(correction.values[[row, 50]], right);
        assert_eq!(correction.values[[row, 99]], right);
    }

    // (c) uniform band of 500 yields two distinct corrected values
    let band = Band::new(Array2::from_elem((100, 100), 500u16));
    let corrected = corrector
        .correct_band(&product, L2ABand::B04, &grid, &band)
        .unwrap();
    let left_value = corrected.values[[0, 0]];
    let right_value = corrected.values[[0, 99]];
    assert_ne!(left_value, right_value);
    assert!(left_value >= 1 && right_value >= 1);
    assert!(corrected.values.iter().all(|&v| v == left_value || v == right_value));
}

#[test]
fn test_linear_scale_correction() {
    init_logging();

    let product = two_detector_product(5.0, 15.0);
    let corrector = BrdfCorrector::new(BrdfConfig {
        log10_scale: false,
        ..config()
    })
    .unwrap();
    let grid = corrector.default_grid(&product);
    let band = Band::new(Array2::from_elem((100, 100), 500u16));
    let corrected = corrector
        .correct_band(&product, L2ABand::B04, &grid, &band)
        .unwrap();

    let expected_left = (500.0 * expected_factor(L2ABand::B04, 5.0)) as i32;
    let left = corrected.values[[10, 10]] as i32;
    assert!((left - expected_left).abs() <= 1, "{} vs {}", left, expected_left);
}

#[test]
fn test_correct_bands_keeps_order() {
    init_logging();

    let product = two_detector_product(5.0, 15.0);
    let corrector = BrdfCorrector::new(config()).unwrap();
    let grid = corrector.default_grid(&product);

    let bands = vec![
        (L2ABand::B08, Band::new(Array2::from_elem((100, 100), 500u16))),
        (L2ABand::B04, Band::new(Array2::from_elem((100, 100), 500u16))),
    ];
    let corrected = corrector.correct_bands(&product, &grid, &bands).unwrap();
    assert_eq!(corrected.len(), 2);

    let red = corrector
        .correct_band(&product, L2ABand::B04, &grid, &bands[1].1)
        .unwrap();
    let nir = corrector
        .correct_band(&product, L2ABand::B08, &grid, &bands[0].1)
        .unwrap();
    assert_eq!(corrected[0].values, nir.values);
    assert_eq!(corrected[1].values, red.values);
    assert_ne!(red.values[[0, 0]], nir.values[[0, 0]]);
}

#[test]
fn test_model_variants_produce_valid_grids() {
    init_logging();

    let product = two_detector_product(5.0, 15.0);
    let mut factors = Vec::new();
    for model in [BrdfModel::Hls, BrdfModel::HlsAlt, BrdfModel::Sen2Agri] {
        let corrector = BrdfCorrector::new(BrdfConfig { model, ..config() }).unwrap();
        let grid = corrector.default_grid(&product);
        let correction: CorrectionGrid<f32> = corrector
            .correction_values(&product, L2ABand::B04, &grid)
            .unwrap();
        assert_eq!(correction.valid_count(), 100 * 100, "{}", model);
        factors.push(correction.values[[0, 0]]);
    }
    assert!((factors[0] - factors[1]).abs() > 1e-4);
    assert!((factors[0] - factors[2]).abs() > 1e-4);
}

#[test]
fn test_detector_gap_is_filled_before_upsampling() {
    init_logging();

    let mut product = two_detector_product(5.0, 15.0);
    let mut band_angles = product.band_angles(L2ABand::B04).unwrap().clone();
    // detector 1 angles only cover the western part of its swath
    if let Some(zenith) = band_angles.view_zenith.get_mut(&1) {
        for row in 0..5 {
            zenith.valid_mask[[row, 1]] = false;
            zenith.valid_mask[[row, 2]] = false;
        }
    }
    product.insert_band(L2ABand::B04, band_angles);

    let corrector = BrdfCorrector::new(config()).unwrap();
    let grid = corrector.default_grid(&product);
    let correction: CorrectionGrid<f32> = corrector
        .correction_values(&product, L2ABand::B04, &grid)
        .unwrap();

    assert_eq!(correction.valid_count(), 100 * 100);
    assert_relative_eq!(
        correction.values[[50, 40]] as f64,
        expected_factor(L2ABand::B04, 5.0),
        epsilon = 1e-5
    );
}

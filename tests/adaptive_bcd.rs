use ndarray::prelude::*;
use num_complex::Complex;
use rustb_bcd::*;
use std::f64::consts::PI;

/// Two bands with a k dependent gap and an inter-band coupling that never vanishes.
struct RippleModel;

impl RippleModel {
    fn coupling(k: ArrayView1<f64>) -> f64 {
        0.6 + 0.3 * (2.0 * PI * (k[0] + k[2])).cos()
    }
}

impl BandSolver for RippleModel {
    fn spin(&self) -> SpinKind {
        SpinKind::Noncollinear
    }

    fn reciprocal_lattice(&self) -> Array2<f64> {
        Array2::eye(3) * (2.0 * PI)
    }

    fn solve(&self, kvec: &Array2<f64>) -> Result<BandSample> {
        let nk = kvec.nrows();
        let mut sample = BandSample {
            band: Array2::zeros((nk, 2)),
            velocity: Array4::zeros((nk, 3, 2, 2)),
        };
        let li = Complex::<f64>::i();
        for (i, k) in kvec.outer_iter().enumerate() {
            let g = Self::coupling(k);
            sample.band[[i, 0]] = -0.5 + 0.1 * (2.0 * PI * k[0]).cos();
            sample.band[[i, 1]] = 0.5 + 0.1 * (2.0 * PI * k[1]).cos();
            let mut v = sample.velocity.index_axis_mut(Axis(0), i);
            for (a, d) in [0.3, 0.2, 0.1].into_iter().enumerate() {
                v[[a, 0, 0]] = Complex::new(d, 0.0);
                v[[a, 1, 1]] = Complex::new(-d, 0.0);
            }
            v[[0, 0, 1]] = Complex::new(g, 0.0);
            v[[0, 1, 0]] = Complex::new(g, 0.0);
            v[[1, 0, 1]] = -g * li;
            v[[1, 1, 0]] = g * li;
        }
        Ok(sample)
    }
}

/// Flat bands at -1 and +1 with purely diagonal velocities.
struct DiagonalModel;

impl BandSolver for DiagonalModel {
    fn spin(&self) -> SpinKind {
        SpinKind::Unpolarized
    }

    fn reciprocal_lattice(&self) -> Array2<f64> {
        Array2::eye(3) * (2.0 * PI)
    }

    fn solve(&self, kvec: &Array2<f64>) -> Result<BandSample> {
        let nk = kvec.nrows();
        let mut sample = BandSample {
            band: Array2::zeros((nk, 2)),
            velocity: Array4::zeros((nk, 3, 2, 2)),
        };
        for (i, k) in kvec.outer_iter().enumerate() {
            sample.band[[i, 0]] = -1.0;
            sample.band[[i, 1]] = 1.0;
            for a in 0..3 {
                sample.velocity[[i, a, 0, 0]] = Complex::new((2.0 * PI * k[a]).sin(), 0.0);
                sample.velocity[[i, a, 1, 1]] = Complex::new(0.4, 0.0);
            }
        }
        Ok(sample)
    }
}

fn mesh_average(solver: &dyn BandSolver, cell: &BrillouinCell, energy: &EnergyAxis) -> Array2<f64> {
    let mut sum = Array2::<f64>::zeros((energy.num, 9));
    for batch in cell.batches(13) {
        let sample = solver.solve(&batch.kvec).unwrap();
        sum += &bcd_pl(&sample, energy).sum_axis(Axis(0));
    }
    sum / cell.nk() as f64
}

fn assert_close(a: &Array2<f64>, b: &Array2<f64>, tol: f64) {
    assert_eq!(a.dim(), b.dim());
    let scale = b.iter().fold(1e-300f64, |m, x| m.max(x.abs()));
    for (x, y) in a.iter().zip(b.iter()) {
        assert!((x - y).abs() <= tol * scale, "{} != {}", x, y);
    }
}

fn ripple_params(threshold: f64) -> BcdParameters {
    let mut p = BcdParameters::new([-1.0, 1.0], 0.05, [4, 3, 2], [2, 2, 3], threshold);
    p.max_kpoint_num = 5;
    p
}

#[test]
fn diagonal_velocity_gives_zero_tensor() {
    let params = BcdParameters::new([-2.0, 2.0], 0.1, [3, 3, 3], [2, 2, 2], 1e-8);
    let config = BcdConfig::for_solver(&DiagonalModel, IntegrateMode::Grid, &params).unwrap();
    let serial = calculate_berry_curvature_dipole(&DiagonalModel, &SerialComm, &config).unwrap();
    assert_eq!(serial.bcd.dim(), (41, 9));
    assert!(serial.bcd.iter().all(|&x| x == 0.0));
    assert_eq!(serial.hot_points.nrows(), 0);
    for size in 1..=4 {
        for r in LocalComm::run(size, |comm| {
            calculate_berry_curvature_dipole(&DiagonalModel, &comm, &config).unwrap()
        }) {
            assert!(r.bcd.iter().all(|&x| x == 0.0));
        }
    }
}

#[test]
fn high_threshold_is_the_plain_mesh_average() {
    let config =
        BcdConfig::for_solver(&RippleModel, IntegrateMode::Grid, &ripple_params(1e6)).unwrap();
    let result = calculate_berry_curvature_dipole(&RippleModel, &SerialComm, &config).unwrap();
    assert_eq!(result.hot_points.nrows(), 0);
    let expect = mesh_average(&RippleModel, &config.cell, &config.energy);
    assert!(expect.iter().any(|&x| x != 0.0));
    assert_close(&result.bcd, &expect, 1e-12);
    assert_eq!(result.energies.len(), 41);
}

#[test]
fn refining_every_point_equals_the_dense_mesh() {
    let params = BcdParameters::new([-1.0, 1.0], 0.05, [2, 2, 2], [2, 2, 2], 1e-6);
    let config = BcdConfig::for_solver(&RippleModel, IntegrateMode::Grid, &params).unwrap();
    let result = calculate_berry_curvature_dipole(&RippleModel, &SerialComm, &config).unwrap();
    assert_eq!(result.hot_points.nrows(), 8);
    // the fine meshes tile a 4x4x4 mesh shifted by half a coarse step
    let dense = BrillouinCell {
        k_start: [-0.25; 3],
        k_vect: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        grid: [4, 4, 4],
    };
    let expect = mesh_average(&RippleModel, &dense, &config.energy);
    assert_close(&result.bcd, &expect, 1e-12);
}

#[test]
fn one_to_four_workers_agree() {
    let config =
        BcdConfig::for_solver(&RippleModel, IntegrateMode::Grid, &ripple_params(0.08)).unwrap();
    let serial = calculate_berry_curvature_dipole(&RippleModel, &SerialComm, &config).unwrap();
    assert!(serial.hot_points.nrows() > 0);
    assert!(serial.hot_points.nrows() < config.cell.nk());
    for size in 1..=4 {
        let results = LocalComm::run(size, |comm| {
            calculate_berry_curvature_dipole(&RippleModel, &comm, &config).unwrap()
        });
        assert_eq!(results.len(), size);
        for r in results {
            assert_eq!(r.hot_points, serial.hot_points);
            assert_eq!(r.energies, serial.energies);
            assert_close(&r.bcd, &serial.bcd, 1e-12);
        }
    }
}

#[test]
fn sub_cell_is_scaled_by_its_volume() {
    let mut params = ripple_params(1e6);
    params.k_vect1 = [0.5, 0.0, 0.0];
    let config = BcdConfig::for_solver(&RippleModel, IntegrateMode::Grid, &params).unwrap();
    let constant = geometric_constant(&RippleModel.reciprocal_lattice(), &config.cell).unwrap();
    assert!((constant - 0.5).abs() < 1e-14);
    let result = calculate_berry_curvature_dipole(&RippleModel, &SerialComm, &config).unwrap();
    let expect = mesh_average(&RippleModel, &config.cell, &config.energy) * 0.5;
    assert_close(&result.bcd, &expect, 1e-12);
}

#[test]
fn json_parameters_run_and_write_output() {
    let text = r#"{
        "omega": [-1.0, 1.0],
        "domega": 0.1,
        "integrate_grid": [3, 3, 3],
        "adaptive_grid": [2, 2, 2],
        "adaptive_grid_threshold": 0.08,
        "max_kpoint_num": 4
    }"#;
    let params: BcdParameters = serde_json::from_str(text).unwrap();
    let config = BcdConfig::for_solver(&RippleModel, IntegrateMode::Grid, &params).unwrap();
    let dir = std::env::temp_dir().join(format!("rustb-bcd-pipeline-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let results = LocalComm::run(2, |comm| {
        let r = calculate_berry_curvature_dipole(&RippleModel, &comm, &config).unwrap();
        r.output(&comm, &dir).unwrap();
        r
    });
    let table = std::fs::read_to_string(dir.join("bcd.dat")).unwrap();
    assert_eq!(table.lines().count(), config.energy.num);
    let first: Vec<f64> = table
        .lines()
        .flat_map(|l| l.split_whitespace().map(|x| x.parse::<f64>().unwrap()))
        .collect();
    assert_eq!(first.len(), config.energy.num * 9);
    for (x, y) in first.iter().zip(results[0].bcd.iter()) {
        assert!((x - y).abs() <= 5e-9);
    }
    let hot = std::fs::read_to_string(dir.join("kpoint_list")).unwrap();
    assert_eq!(hot.lines().count(), results[0].hot_points.nrows());
    let json = serde_json::to_value(&results[1]).unwrap();
    assert!(json.get("hot_points").is_some());
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn rejected_configurations() {
    struct Collinear;
    impl BandSolver for Collinear {
        fn spin(&self) -> SpinKind {
            SpinKind::Collinear
        }
        fn reciprocal_lattice(&self) -> Array2<f64> {
            Array2::eye(3)
        }
        fn solve(&self, _kvec: &Array2<f64>) -> Result<BandSample> {
            Ok(BandSample::empty(1))
        }
    }
    let params = ripple_params(1.0);
    assert!(matches!(
        BcdConfig::for_solver(&Collinear, IntegrateMode::Grid, &params),
        Err(BcdError::UnsupportedSpin(_))
    ));
    assert!(matches!(
        BcdConfig::for_solver(&RippleModel, IntegrateMode::Adaptive, &params),
        Err(BcdError::InvalidIntegrateMode(_))
    ));
}

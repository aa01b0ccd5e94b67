use std::f64::consts::PI;

use nalgebra::{Matrix3, Vector3};
use ndarray::{array, Array, Array1, Array3, Array4, Axis};
use num_complex::Complex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::comm::SerialCommunicator;
use crate::errors::ConfigurationError;
use crate::grid::HalfSpaceGrid;
use crate::orbit::OrbitDecomposition;
use crate::symmetrisation::{FieldSymmetriser, FieldSymmetriserParams};
use crate::symmetry::group_action::fold_index;
use crate::symmetry::{SymmetryOperation, SymmetryOperations};

type C128 = Complex<f64>;

fn op(rotation: Matrix3<i64>, translation: Vector3<f64>) -> SymmetryOperation {
    SymmetryOperation::builder()
        .rotation(rotation)
        .translation(translation)
        .build()
        .unwrap()
}

fn serial(grid: HalfSpaceGrid, ops: &SymmetryOperations) -> FieldSymmetriser<SerialCommunicator> {
    FieldSymmetriser::new(
        grid,
        ops,
        SerialCommunicator,
        &FieldSymmetriserParams::default(),
    )
    .unwrap()
}

/// Draws a random half-space field whose self-conjugate planes are consistent with a real
/// real-space field.
fn hermitian_field(grid: &HalfSpaceGrid, rng: &mut StdRng) -> Array3<C128> {
    let [n0, n1, n2h] = *grid.shape_h();
    let raw = Array3::from_shape_fn((n0, n1, n2h), |_| {
        C128::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
    });
    let mut field = raw.clone();
    let n2 = grid.shape()[2];
    for i2 in [0, n2 / 2] {
        if i2 != 0 && 2 * i2 != n2 {
            continue;
        }
        for (i0, i1) in itertools::iproduct!(0..n0, 0..n1) {
            let index = grid.flat_index([i0, i1, i2]);
            let (partner, _) = fold_index(&(-grid.frequency(index)), grid);
            let [p0, p1, p2] = grid.index_triple(partner);
            field[(i0, i1, i2)] = (raw[(i0, i1, i2)] + raw[(p0, p1, p2)].conj()) * 0.5;
        }
    }
    field
}

fn max_diff<D: ndarray::Dimension>(a: &Array<C128, D>, b: &Array<C128, D>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).norm())
        .fold(0.0, f64::max)
}

fn cubic_group() -> SymmetryOperations {
    let c4z = op(Matrix3::new(0, -1, 0, 1, 0, 0, 0, 0, 1), Vector3::zeros());
    let c3 = op(Matrix3::new(0, 0, 1, 1, 0, 0, 0, 1, 0), Vector3::zeros());
    let inv = op(-Matrix3::identity(), Vector3::zeros());
    SymmetryOperations::generate(&[c4z, c3, inv], 1e-8).unwrap()
}

fn screw_inversion_group() -> SymmetryOperations {
    let screw = op(
        Matrix3::new(-1, 0, 0, 0, -1, 0, 0, 0, 1),
        Vector3::new(0.0, 0.5, 0.5),
    );
    let inv = op(-Matrix3::identity(), Vector3::zeros());
    SymmetryOperations::generate(&[screw, inv], 1e-8).unwrap()
}

/// Groups without an inversion centre: a twofold axis along x + z, and a lone 2₁ screw.
fn acentric_groups() -> Vec<(HalfSpaceGrid, SymmetryOperations)> {
    let swap = op(Matrix3::new(0, 0, 1, 0, -1, 0, 1, 0, 0), Vector3::zeros());
    let screw = op(
        Matrix3::new(-1, 0, 0, 0, -1, 0, 0, 0, 1),
        Vector3::new(0.0, 0.5, 0.5),
    );
    vec![
        (
            HalfSpaceGrid::new([4, 4, 4], 1, 0).unwrap(),
            SymmetryOperations::new(vec![SymmetryOperation::identity(), swap], 1e-8).unwrap(),
        ),
        (
            HalfSpaceGrid::new([4, 6, 6], 1, 0).unwrap(),
            SymmetryOperations::generate(&[screw], 1e-8).unwrap(),
        ),
    ]
}

/// Checks that `field` satisfies $`F(R^{\mathsf{T}}\mathbf{g}) = F(\mathbf{g})
/// e^{2\pi i \mathbf{g} \cdot \mathbf{t}}`$ for every representative and operation.
fn assert_symmetric(
    grid: &HalfSpaceGrid,
    ops: &SymmetryOperations,
    orbits: &OrbitDecomposition,
    field: &Array1<C128>,
) {
    for orbit in orbits.orbits() {
        let g = grid.frequency(orbit.representative).map(|x| x as f64);
        let value = field[orbit.representative];
        for (s, op) in ops.iter().enumerate() {
            let member = field[orbit.members[s]];
            let member = if orbit.conjugated[s] {
                member.conj()
            } else {
                member
            };
            let expected = value * C128::from_polar(1.0, 2.0 * PI * g.dot(op.translation()));
            assert!((member - expected).norm() < 1e-10);
        }
    }
}

#[test]
fn test_symmetrise_reversal_toy() {
    let grid = HalfSpaceGrid::new([4, 1, 1], 1, 0).unwrap();
    let reversal = op(Matrix3::new(-1, 0, 0, 0, 1, 0, 0, 0, 1), Vector3::zeros());
    let ops = SymmetryOperations::new(vec![SymmetryOperation::identity(), reversal], 1e-8).unwrap();
    let symmetriser = serial(grid, &ops);

    let mut field = array![1.0, 2.0, 3.0, 4.0].mapv(|x| C128::new(x, 0.0));
    symmetriser.symmetrise(&mut field).unwrap();
    // Fixed points are stabilised by both operations and keep their values.
    let expected = array![1.0, 3.0, 3.0, 3.0].mapv(|x| C128::new(x, 0.0));
    assert!(max_diff(&field, &expected) < 1e-12);
}

#[test]
fn test_symmetrise_trivial_group() {
    let grid = HalfSpaceGrid::new([3, 4, 5], 1, 0).unwrap();
    let symmetriser = serial(grid.clone(), &SymmetryOperations::trivial());
    let mut rng = StdRng::seed_from_u64(1);
    let original = Array3::from_shape_fn(grid.shape_h_mine(), |_| {
        C128::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
    });
    let mut field = original.clone();
    symmetriser.symmetrise(&mut field).unwrap();
    assert!(max_diff(&field, &original) < 1e-14);
}

#[test]
fn test_symmetrise_cubic_idempotent() {
    let grid = HalfSpaceGrid::new([4, 4, 4], 1, 0).unwrap();
    let ops = cubic_group();
    let symmetriser = serial(grid.clone(), &ops);
    let mut rng = StdRng::seed_from_u64(7);
    let mut field = hermitian_field(&grid, &mut rng);

    symmetriser.symmetrise(&mut field).unwrap();
    let once = field.clone();
    symmetriser.symmetrise(&mut field).unwrap();
    assert!(max_diff(&field, &once) < 1e-12);

    let flat = once.into_shape(grid.n_grid_mine()).unwrap();
    assert_symmetric(&grid, &ops, symmetriser.orbits(), &flat);
}

#[test]
fn test_symmetrise_nonsymmorphic_idempotent() {
    let grid = HalfSpaceGrid::new([4, 6, 6], 1, 0).unwrap();
    let ops = screw_inversion_group();
    let symmetriser = serial(grid.clone(), &ops);
    let mut rng = StdRng::seed_from_u64(11);
    let mut field = hermitian_field(&grid, &mut rng)
        .into_shape(grid.n_grid_mine())
        .unwrap();

    symmetriser.symmetrise(&mut field).unwrap();
    assert_symmetric(&grid, &ops, symmetriser.orbits(), &field);
    let once = field.clone();
    symmetriser.symmetrise(&mut field).unwrap();
    assert!(max_diff(&field, &once) < 1e-12);

    // An already symmetric field is unchanged.
    let mut uniform = Array1::from_elem(grid.n_grid_mine(), C128::new(0.0, 0.0));
    uniform[0] = C128::new(2.5, 0.0);
    let original = uniform.clone();
    symmetriser.symmetrise(&mut uniform).unwrap();
    assert!(max_diff(&uniform, &original) < 1e-14);
}

#[test]
fn test_symmetrise_without_inversion() {
    let mut rng = StdRng::seed_from_u64(17);
    for (grid, ops) in acentric_groups() {
        let symmetriser = serial(grid.clone(), &ops);
        let mut field = hermitian_field(&grid, &mut rng)
            .into_shape(grid.n_grid_mine())
            .unwrap();

        symmetriser.symmetrise(&mut field).unwrap();
        assert!(field.iter().all(|z| z.re.is_finite() && z.im.is_finite()));
        assert_symmetric(&grid, &ops, symmetriser.orbits(), &field);
        let once = field.clone();
        symmetriser.symmetrise(&mut field).unwrap();
        assert!(max_diff(&field, &once) < 1e-12);
    }
}

#[test]
fn test_symmetrise_batches() {
    let grid = HalfSpaceGrid::new([4, 6, 6], 1, 0).unwrap();
    let ops = screw_inversion_group();
    let symmetriser = serial(grid.clone(), &ops);
    let mut rng = StdRng::seed_from_u64(3);
    let fields = (0..3)
        .map(|_| hermitian_field(&grid, &mut rng))
        .collect::<Vec<_>>();

    let [n0, n1, n2] = grid.shape_h_mine();
    let mut batch = Array4::from_elem((3, n0, n1, n2), C128::new(0.0, 0.0));
    for (b, field) in fields.iter().enumerate() {
        batch.index_axis_mut(Axis(0), b).assign(field);
    }
    symmetriser.symmetrise(&mut batch).unwrap();

    for (b, field) in fields.iter().enumerate() {
        let mut single = field.clone();
        symmetriser.symmetrise(&mut single).unwrap();
        assert!(max_diff(&batch.index_axis(Axis(0), b).to_owned(), &single) < 1e-14);
    }

    // Views with negative strides are handled in logical order.
    let mut reversed = batch.clone();
    let mut view = reversed.view_mut();
    view.invert_axis(Axis(0));
    symmetriser.symmetrise(&mut view).unwrap();
    assert!(max_diff(&reversed, &batch) < 1e-12);
}

#[test]
fn test_symmetrise_rejects_bad_shape() {
    let grid = HalfSpaceGrid::new([4, 4, 4], 1, 0).unwrap();
    let symmetriser = serial(grid, &cubic_group());
    let mut field = Array3::from_elem((4, 4, 2), C128::new(1.0, 0.0));
    let err = symmetriser.symmetrise(&mut field).unwrap_err();
    assert!(err.downcast_ref::<ConfigurationError>().is_some());
    assert!(field.iter().all(|&x| x == C128::new(1.0, 0.0)));

    let mut field = Array1::from_elem(47, C128::new(1.0, 0.0));
    assert!(symmetriser.symmetrise(&mut field).is_err());
}

#[test]
fn test_symmetriser_rejects_worker_mismatch() {
    // The grid is split over two workers but the communicator has only one.
    let grid = HalfSpaceGrid::new([4, 4, 4], 2, 0).unwrap();
    let err = FieldSymmetriser::new(
        grid,
        &SymmetryOperations::trivial(),
        SerialCommunicator,
        &FieldSymmetriserParams::default(),
    )
    .unwrap_err();
    assert!(err.downcast_ref::<ConfigurationError>().is_some());
}

#[test]
fn test_symmetriser_saves_orbits() {
    let _ = env_logger::builder().is_test(true).try_init();
    let name = std::env::temp_dir().join(format!("gridsym_orbits_{}", std::process::id()));
    let params = FieldSymmetriserParams::builder()
        .write_orbit_summary(true)
        .orbit_save_name(Some(name.to_string_lossy().to_string()))
        .build()
        .unwrap();
    let grid = HalfSpaceGrid::new([4, 6, 6], 1, 0).unwrap();
    let symmetriser = FieldSymmetriser::new(
        grid,
        &screw_inversion_group(),
        SerialCommunicator,
        &params,
    )
    .unwrap();

    let saved = OrbitDecomposition::load(&name).unwrap();
    assert_eq!(&saved, symmetriser.orbits());
    assert!(params.to_string().contains("gridsym.orb"));
    std::fs::remove_file(name.with_extension("gridsym.orb")).unwrap();
}

use approx::assert_relative_eq;
use nalgebra::{Matrix3, Vector3};
use proptest::prelude::*;

use crate::errors::{ConfigurationError, UnsupportedOperationError};
use crate::grid::HalfSpaceGrid;
use crate::symmetry::group_action::{apply, fold_index, rotate_frequency};
use crate::symmetry::{SymmetryOperation, SymmetryOperations, SymmetryOperationsInput};

fn inversion() -> SymmetryOperation {
    SymmetryOperation::builder()
        .rotation(-Matrix3::<i64>::identity())
        .build()
        .unwrap()
}

#[test]
fn test_symmetry_operation_validation() {
    let shear = SymmetryOperation::builder()
        .rotation(Matrix3::new(1, 1, 0, 0, 1, 0, 0, 0, 1))
        .translation(Vector3::new(-0.25, 1.5, 2.0))
        .build()
        .unwrap();
    assert!(shear.is_proper());
    assert_relative_eq!(shear.translation()[0], 0.75);
    assert_relative_eq!(shear.translation()[1], 0.5);
    assert_relative_eq!(shear.translation()[2], 0.0);

    let tiny = SymmetryOperation::builder()
        .rotation(Matrix3::identity())
        .translation(Vector3::new(-1e-18, 0.0, 0.0))
        .build()
        .unwrap();
    assert!(tiny.translation()[0] < 1.0);
    assert!(tiny.has_zero_translation(1e-8));

    assert!(!inversion().is_proper());

    let doubled = SymmetryOperation::builder()
        .rotation(Matrix3::new(2, 0, 0, 0, 1, 0, 0, 0, 1))
        .build();
    assert!(doubled.is_err());

    let nan = SymmetryOperation::builder()
        .rotation(Matrix3::identity())
        .translation(Vector3::new(f64::NAN, 0.0, 0.0))
        .build();
    assert!(nan.is_err());
}

#[test]
fn test_symmetry_operations_validation() {
    let ops = SymmetryOperations::new(vec![SymmetryOperation::identity(), inversion()], 1e-8);
    assert_eq!(ops.unwrap().len(), 2);

    let err = SymmetryOperations::new(vec![], 1e-8).unwrap_err();
    assert!(err.downcast_ref::<ConfigurationError>().is_some());

    let err = SymmetryOperations::new(vec![inversion()], 1e-8).unwrap_err();
    assert!(err.downcast_ref::<ConfigurationError>().is_some());

    let c4z = SymmetryOperation::builder()
        .rotation(Matrix3::new(0, -1, 0, 1, 0, 0, 0, 0, 1))
        .build()
        .unwrap();
    let err = SymmetryOperations::new(vec![SymmetryOperation::identity(), c4z], 1e-8).unwrap_err();
    assert!(err.downcast_ref::<ConfigurationError>().is_some());

    let time_reversal = SymmetryOperation::builder()
        .rotation(Matrix3::identity())
        .antiunitary(true)
        .build()
        .unwrap();
    let err = SymmetryOperations::new(vec![SymmetryOperation::identity(), time_reversal], 1e-8)
        .unwrap_err();
    assert!(err.downcast_ref::<UnsupportedOperationError>().is_some());
}

#[test]
fn test_symmetry_operations_input() {
    let yaml = "
threshold: 1.0e-6
operations:
  - rotation: [[1, 0, 0], [0, 1, 0], [0, 0, 1]]
  - rotation: [[-1, 0, 0], [0, -1, 0], [0, 0, -1]]
    translation: [0.5, 0.0, -0.5]
";
    let input: SymmetryOperationsInput = serde_yaml::from_str(yaml).unwrap();
    let ops = input.into_operations().unwrap();
    assert_eq!(ops.len(), 2);
    assert_relative_eq!(ops.threshold(), 1e-6);
    let inv = ops.iter().nth(1).unwrap();
    assert_eq!(inv.rotation(), &-Matrix3::<i64>::identity());
    assert_relative_eq!(inv.translation()[2], 0.5);

    let bad = "
operations:
  - rotation: [[1, 0, 0], [0, 1, 0], [0, 0, 2]]
";
    let input: SymmetryOperationsInput = serde_yaml::from_str(bad).unwrap();
    let err = input.into_operations().unwrap_err();
    assert!(err.downcast_ref::<ConfigurationError>().is_some());
}

#[test]
fn test_group_action_fold() {
    let grid = HalfSpaceGrid::new([4, 4, 6], 1, 0).unwrap();
    // Stored half-space points fold onto themselves.
    assert_eq!(
        fold_index(&Vector3::new(1, -1, 2), &grid),
        (grid.flat_index([1, 3, 2]), false)
    );
    // Points in the redundant half are negated and flagged.
    assert_eq!(
        fold_index(&Vector3::new(1, 1, -2), &grid),
        (grid.flat_index([3, 3, 2]), true)
    );
    assert_eq!(
        fold_index(&Vector3::new(0, 2, 4), &grid),
        (grid.flat_index([0, 2, 2]), true)
    );
    // The Nyquist plane of an even folded axis is stored explicitly.
    assert_eq!(
        fold_index(&Vector3::new(1, 0, 3), &grid),
        (grid.flat_index([1, 0, 3]), false)
    );

    let swap_xz = Matrix3::new(0, 0, 1, 0, 1, 0, 1, 0, 0);
    assert_eq!(
        rotate_frequency(&Vector3::new(1, 2, 3), &swap_xz),
        Vector3::new(3, 2, 1)
    );
    let shear = Matrix3::new(1, 1, 0, 0, 1, 0, 0, 0, 1);
    assert_eq!(
        rotate_frequency(&Vector3::new(1, 2, 3), &shear),
        Vector3::new(1, 3, 3)
    );

    let (index, is_conj) = apply(&Vector3::new(1, 2, 1), &inversion(), &grid);
    assert_eq!((index, is_conj), (grid.flat_index([1, 2, 1]), true));
}

proptest! {
    #[test]
    fn prop_fold_index_stored_and_negated(
        n0 in 1usize..7, n1 in 1usize..7, n2 in 1usize..9, seed in 0usize..1000
    ) {
        let grid = HalfSpaceGrid::new([n0, n1, n2], 1, 0).unwrap();
        let index = seed % grid.n_tot();
        let g = grid.frequency(index);
        prop_assert_eq!(fold_index(&g, &grid), (index, false));

        // Shifting by whole periods changes nothing.
        let shifted = g + Vector3::new(n0 as i64, -2 * n1 as i64, 3 * n2 as i64);
        prop_assert_eq!(fold_index(&shifted, &grid), (index, false));

        let [_, _, i2] = grid.index_triple(index);
        let (neg_index, neg_conj) = fold_index(&(-g), &grid);
        if i2 == 0 || 2 * i2 == n2 {
            prop_assert!(!neg_conj);
            prop_assert_eq!(fold_index(&grid.frequency(neg_index), &grid).0, neg_index);
        } else {
            prop_assert_eq!((neg_index, neg_conj), (index, true));
        }
    }
}

#[test]
fn test_symmetry_operations_generate() {
    let c4z = SymmetryOperation::builder()
        .rotation(Matrix3::new(0, -1, 0, 1, 0, 0, 0, 0, 1))
        .build()
        .unwrap();
    let c3 = SymmetryOperation::builder()
        .rotation(Matrix3::new(0, 0, 1, 1, 0, 0, 0, 1, 0))
        .build()
        .unwrap();
    let oh = SymmetryOperations::generate(&[c4z.clone(), c3, inversion()], 1e-8).unwrap();
    assert_eq!(oh.len(), 48);
    assert!(oh.iter().next().unwrap().has_identity_rotation());
    assert_eq!(oh.iter().filter(|op| op.is_proper()).count(), 24);

    let c4 = SymmetryOperations::generate(&[c4z], 1e-8).unwrap();
    assert_eq!(c4.len(), 4);

    // A 2₁ screw axis squares to a lattice translation, which is the identity.
    let screw = SymmetryOperation::builder()
        .rotation(Matrix3::new(-1, 0, 0, 0, -1, 0, 0, 0, 1))
        .translation(Vector3::new(0.0, 0.0, 0.5))
        .build()
        .unwrap();
    let p21 = SymmetryOperations::generate(&[screw.clone()], 1e-8).unwrap();
    assert_eq!(p21.len(), 2);
    let squared = &screw * &screw;
    assert!(squared.has_identity_rotation());
    assert!(squared.has_zero_translation(1e-8));

    let incommensurate = SymmetryOperation::builder()
        .rotation(Matrix3::identity())
        .translation(Vector3::new(std::f64::consts::FRAC_1_SQRT_2, 0.0, 0.0))
        .build()
        .unwrap();
    let err = SymmetryOperations::generate(&[incommensurate], 1e-8).unwrap_err();
    assert!(err.downcast_ref::<ConfigurationError>().is_some());
}

//! Space-group operations in lattice coordinates.

use std::fmt;
use std::ops::Mul;

use derive_builder::Builder;
use itertools::Itertools;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// A structure for managing a space-group operation acting on a periodic lattice.
///
/// The operation maps a fractional position $`\mathbf{x}`$ to $`R\mathbf{x} + \mathbf{t}`$, where
/// $`R`$ is an integer matrix in lattice coordinates and $`\mathbf{t}`$ is a fractional
/// translation. Reciprocal-space frequency vectors transform by $`R^{\mathsf{T}}`$.
#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct SymmetryOperation {
    /// The rotation part in lattice coordinates. This must be unimodular.
    rotation: Matrix3<i64>,

    /// The fractional translation, reduced into $`[0, 1)^3`$.
    #[builder(setter(custom), default = "Vector3::zeros()")]
    translation: Vector3<f64>,

    /// Boolean indicating if this operation is combined with time reversal.
    #[builder(default = "false")]
    antiunitary: bool,
}

impl SymmetryOperationBuilder {
    /// Sets the fractional translation, reducing every component into $`[0, 1)`$.
    pub fn translation(&mut self, translation: Vector3<f64>) -> &mut Self {
        self.translation = Some(translation.map(|t| {
            let reduced = t - t.floor();
            // `t - t.floor()` rounds up to exactly 1 for tiny negative `t`.
            if reduced >= 1.0 {
                0.0
            } else {
                reduced
            }
        }));
        self
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(rotation) = self.rotation.as_ref() {
            let det = integer_determinant(rotation);
            if det.abs() != 1 {
                return Err(format!(
                    "Rotation matrix has determinant {det} and is therefore not unimodular."
                ));
            }
        }
        if let Some(translation) = self.translation.as_ref() {
            if translation.iter().any(|t| !t.is_finite()) {
                return Err(format!("Translation {translation:?} is not finite."));
            }
        }
        Ok(())
    }
}

impl SymmetryOperation {
    /// Returns a builder to construct a new symmetry operation.
    pub fn builder() -> SymmetryOperationBuilder {
        SymmetryOperationBuilder::default()
    }

    /// Constructs the identity operation.
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
            antiunitary: false,
        }
    }

    pub fn rotation(&self) -> &Matrix3<i64> {
        &self.rotation
    }

    pub fn translation(&self) -> &Vector3<f64> {
        &self.translation
    }

    pub fn is_antiunitary(&self) -> bool {
        self.antiunitary
    }

    /// Checks if the rotation part of this operation is proper.
    pub fn is_proper(&self) -> bool {
        integer_determinant(&self.rotation) == 1
    }

    /// Checks if the rotation part of this operation is the identity matrix.
    pub fn has_identity_rotation(&self) -> bool {
        self.rotation == Matrix3::identity()
    }

    /// Checks if the translation of this operation vanishes modulo lattice vectors.
    ///
    /// # Arguments
    ///
    /// * `threshold` - Tolerance for each fractional component.
    pub fn has_zero_translation(&self, threshold: f64) -> bool {
        self.translation
            .iter()
            .all(|&t| t.abs() < threshold || (1.0 - t).abs() < threshold)
    }
}

impl fmt::Display for SymmetryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self
            .rotation
            .row_iter()
            .map(|row| row.iter().map(|x| format!("{x:+}")).join(" "))
            .join(" | ");
        write!(
            f,
            "{}[{rows}] + ({})",
            if self.antiunitary { "θ·" } else { "" },
            self.translation.iter().map(|t| format!("{t:.4}")).join(", ")
        )
    }
}

// ---
// Mul
// ---
impl Mul<&'_ SymmetryOperation> for &SymmetryOperation {
    type Output = SymmetryOperation;

    /// Composes two operations, with `rhs` acting first.
    fn mul(self, rhs: &SymmetryOperation) -> Self::Output {
        SymmetryOperation::builder()
            .rotation(self.rotation * rhs.rotation)
            .translation(self.rotation.map(|x| x as f64) * rhs.translation + self.translation)
            .antiunitary(self.antiunitary != rhs.antiunitary)
            .build()
            .expect("The product of two unimodular operations should be unimodular.")
    }
}

impl Mul<SymmetryOperation> for SymmetryOperation {
    type Output = SymmetryOperation;

    fn mul(self, rhs: SymmetryOperation) -> Self::Output {
        &self * &rhs
    }
}

/// Computes the determinant of an integer $`3 \times 3`$ matrix exactly.
pub(crate) fn integer_determinant(m: &Matrix3<i64>) -> i64 {
    m[(0, 0)] * (m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)])
        - m[(0, 1)] * (m[(1, 0)] * m[(2, 2)] - m[(1, 2)] * m[(2, 0)])
        + m[(0, 2)] * (m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)])
}

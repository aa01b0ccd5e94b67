//! Symmetry operations of periodic lattices and their action on reciprocal-space grids.

use std::fmt;
use std::path::Path;

use anyhow::{self, ensure, format_err, Context};
use derive_builder::Builder;
use indexmap::IndexSet;
use itertools::Itertools;
use log;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::errors::{ConfigurationError, UnsupportedOperationError};
use crate::io::read_yaml;

pub mod group_action;
pub mod symmetry_operation;

pub use symmetry_operation::SymmetryOperation;

#[cfg(test)]
#[path = "symmetry_tests.rs"]
mod symmetry_tests;

/// The largest group order accepted by [`SymmetryOperations::generate`].
pub const MAX_GROUP_ORDER: usize = 192;

// ==================
// Struct definitions
// ==================

/// A validated, ordered collection of space-group operations.
///
/// The order of the operations is fixed for the lifetime of the collection and determines the
/// order of the members of every orbit.
#[derive(Clone, Debug, PartialEq)]
pub struct SymmetryOperations {
    operations: Vec<SymmetryOperation>,

    /// Tolerance used when deciding if a translation vanishes.
    threshold: f64,
}

impl SymmetryOperations {
    /// Validates and collects `operations`.
    ///
    /// # Arguments
    ///
    /// * `operations` - The operations of the group, in a fixed order.
    /// * `threshold` - Tolerance used when deciding if a translation vanishes.
    ///
    /// # Errors
    ///
    /// Errors with an [`UnsupportedOperationError`] if any operation is antiunitary, and with a
    /// [`ConfigurationError`] if the collection is empty, does not contain the identity, or has
    /// rotation parts that are not closed under multiplication.
    pub fn new(operations: Vec<SymmetryOperation>, threshold: f64) -> Result<Self, anyhow::Error> {
        ensure!(
            !operations.is_empty(),
            ConfigurationError("no symmetry operations given".to_string())
        );
        if let Some((i, op)) = operations
            .iter()
            .find_position(|op| op.is_antiunitary())
        {
            return Err(format_err!(UnsupportedOperationError(format!(
                "operation {i} ({op}) is antiunitary; time-reversed operations cannot be applied to half-space fields"
            ))));
        }
        ensure!(
            operations
                .iter()
                .any(|op| op.has_identity_rotation() && op.has_zero_translation(threshold)),
            ConfigurationError("the identity operation is missing".to_string())
        );

        let rotations = operations
            .iter()
            .map(|op| *op.rotation())
            .collect::<IndexSet<Matrix3<i64>>>();
        for (ra, rb) in rotations.iter().cartesian_product(rotations.iter()) {
            let product = ra * rb;
            ensure!(
                rotations.contains(&product),
                ConfigurationError(format!(
                    "rotations are not closed under multiplication: {ra} · {rb} = {product} is missing"
                ))
            );
        }
        let n_improper = operations.iter().filter(|op| !op.is_proper()).count();
        log::debug!(
            "Validated {} symmetry operation(s) ({} distinct rotation(s), {} improper).",
            operations.len(),
            rotations.len(),
            n_improper
        );
        Ok(Self {
            operations,
            threshold,
        })
    }

    /// Generates the group closure of `generators` under composition.
    ///
    /// Operations are composed as $`(R_a, \mathbf{t}_a)(R_b, \mathbf{t}_b) = (R_a R_b, R_a
    /// \mathbf{t}_b + \mathbf{t}_a)`$ and compared modulo lattice translations. The identity comes
    /// first, followed by the products in the order they are discovered.
    ///
    /// # Errors
    ///
    /// Errors if the closure exceeds [`MAX_GROUP_ORDER`] operations (for instance because a
    /// translation is incommensurate with the lattice), or if the result fails validation in
    /// [`Self::new`].
    pub fn generate(
        generators: &[SymmetryOperation],
        threshold: f64,
    ) -> Result<Self, anyhow::Error> {
        let same = |a: &SymmetryOperation, b: &SymmetryOperation| {
            a.rotation() == b.rotation()
                && a.is_antiunitary() == b.is_antiunitary()
                && (a.translation() - b.translation())
                    .iter()
                    .all(|d| (d - d.round()).abs() < threshold)
        };
        let mut operations = vec![SymmetryOperation::identity()];
        let mut i = 0;
        while i < operations.len() {
            for generator in generators {
                let product = &operations[i] * generator;
                if !operations.iter().any(|op| same(op, &product)) {
                    ensure!(
                        operations.len() < MAX_GROUP_ORDER,
                        ConfigurationError(format!(
                            "generators do not close within {MAX_GROUP_ORDER} operations"
                        ))
                    );
                    operations.push(product);
                }
            }
            i += 1;
        }
        Self::new(operations, threshold)
    }

    /// Reads and validates operations from a YAML file. See [`SymmetryOperationsInput`] for the
    /// layout.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        SymmetryOperationsInput::from_yaml(path)?
            .into_operations()
            .with_context(|| format!("Invalid symmetry operations in `{}`", path.display()))
    }

    /// Returns the group consisting of the identity only.
    pub fn trivial() -> Self {
        Self {
            operations: vec![SymmetryOperation::identity()],
            threshold: 1e-8,
        }
    }

    /// The number of operations, *i.e.* the group order.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SymmetryOperation> {
        self.operations.iter()
    }
}

impl fmt::Display for SymmetryOperations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} symmetry operation(s):", self.operations.len())?;
        for (i, op) in self.operations.iter().enumerate() {
            writeln!(f, "  {i:>3}: {op}")?;
        }
        Ok(())
    }
}

// -----
// Input
// -----

/// A single operation as written in a YAML input file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SymmetryOperationInput {
    /// The rows of the rotation matrix in lattice coordinates.
    pub rotation: [[i64; 3]; 3],

    /// The fractional translation.
    #[serde(default)]
    pub translation: [f64; 3],

    #[serde(default)]
    pub antiunitary: bool,
}

/// The YAML input layout for a collection of symmetry operations.
///
/// ```yaml
/// threshold: 1.0e-8
/// operations:
///   - rotation: [[1, 0, 0], [0, 1, 0], [0, 0, 1]]
///   - rotation: [[-1, 0, 0], [0, -1, 0], [0, 0, -1]]
///     translation: [0.5, 0.0, 0.0]
/// ```
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct SymmetryOperationsInput {
    #[builder(default = "1e-8")]
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    pub operations: Vec<SymmetryOperationInput>,
}

fn default_threshold() -> f64 {
    1e-8
}

impl SymmetryOperationsInput {
    /// Returns a builder to construct a [`SymmetryOperationsInput`] structure.
    pub fn builder() -> SymmetryOperationsInputBuilder {
        SymmetryOperationsInputBuilder::default()
    }

    /// Reads the input layout from a YAML file without validating the operations.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        read_yaml(path.as_ref())
    }

    /// Converts this input into a validated [`SymmetryOperations`] collection.
    pub fn into_operations(self) -> Result<SymmetryOperations, anyhow::Error> {
        let operations = self
            .operations
            .iter()
            .enumerate()
            .map(|(i, op)| {
                SymmetryOperation::builder()
                    .rotation(Matrix3::from_fn(|r, c| op.rotation[r][c]))
                    .translation(Vector3::from(op.translation))
                    .antiunitary(op.antiunitary)
                    .build()
                    .map_err(|err| format_err!(ConfigurationError(format!("operation {i}: {err}"))))
            })
            .collect::<Result<Vec<_>, _>>()?;
        SymmetryOperations::new(operations, self.threshold)
    }
}

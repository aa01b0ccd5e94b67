//! Orbit decomposition of half-space grid indices under a space group.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{self, ensure};
use counter::Counter;
use indexmap::IndexMap;
use itertools::Itertools;
use log;
use ndarray::{Array2, ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigurationError;
use crate::grid::HalfSpaceGrid;
use crate::io::format::{write_heading, write_table};
use crate::io::{read_binary, write_binary, GridSymFileType};
use crate::symmetry::group_action::apply;
use crate::symmetry::SymmetryOperations;


/// A structure containing the decomposition of every global half-space index into orbits.
///
/// Two stored indices share an orbit when one frequency maps onto the other without Hermitian
/// folding. Orbits are numbered in increasing order of their representatives, the smallest such
/// index. An image that lands in the redundant half folds onto a stored index with conjugation;
/// that index then also receives a slot of this orbit, although it belongs to another one when
/// the group lacks inversion. Every stored index is thus covered by its own orbit and occurs at
/// least once. Every worker builds the same decomposition independently.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrbitDecomposition {
    /// The number of operations in the group.
    n_sym: usize,

    /// The representative of each orbit, in increasing order.
    representatives: Vec<usize>,

    /// The representative of the orbit of every global index.
    canonical: Vec<usize>,

    /// The folded image of each representative (row) under each operation (column).
    members: Array2<usize>,

    /// Whether each entry of [`Self::members`] required conjugation when folded.
    conjugated: Array2<bool>,

    /// The number of distinct members of each orbit.
    multiplicities: Vec<usize>,

    /// The number of entries of [`Self::members`] equal to every global index. Never zero.
    occurrences: Vec<usize>,
}

impl OrbitDecomposition {
    /// Decomposes all indices of `grid` into orbits under `operations`.
    pub fn new(grid: &HalfSpaceGrid, operations: &SymmetryOperations) -> Self {
        let n_tot = grid.n_tot();
        let n_sym = operations.len();

        let canonical = (0..n_tot)
            .into_par_iter()
            .map(|index| {
                let g = grid.frequency(index);
                operations
                    .iter()
                    .map(|op| apply(&g, op, grid))
                    .filter_map(|(image, conj)| (!conj).then_some(image))
                    .fold(index, usize::min)
            })
            .collect::<Vec<_>>();
        let representatives = canonical
            .iter()
            .copied()
            .sorted_unstable()
            .dedup()
            .collect_vec();

        let images = representatives
            .par_iter()
            .flat_map_iter(|&rep| {
                let g = grid.frequency(rep);
                operations.iter().map(move |op| apply(&g, op, grid))
            })
            .collect::<Vec<_>>();
        let n_orbits = representatives.len();
        let (members, conjugated): (Vec<usize>, Vec<bool>) = images.into_iter().unzip();
        let members = Array2::from_shape_vec((n_orbits, n_sym), members)
            .expect("Orbit members do not fill an (orbit, operation) array.");
        let conjugated = Array2::from_shape_vec((n_orbits, n_sym), conjugated)
            .expect("Conjugation flags do not fill an (orbit, operation) array.");

        let multiplicities = members
            .axis_iter(Axis(0))
            .map(|row| row.iter().unique().count())
            .collect_vec();
        let counts = members.iter().copied().collect::<Counter<usize>>();
        let occurrences = (0..n_tot)
            .map(|index| counts.get(&index).copied().unwrap_or(0))
            .collect_vec();

        log::debug!("Decomposed {n_tot} grid indices into {n_orbits} orbits under {n_sym} operation(s).");
        Self {
            n_sym,
            representatives,
            canonical,
            members,
            conjugated,
            multiplicities,
            occurrences,
        }
    }

    /// The number of operations in the group.
    pub fn n_sym(&self) -> usize {
        self.n_sym
    }

    pub fn n_orbits(&self) -> usize {
        self.representatives.len()
    }

    /// The number of global grid indices decomposed.
    pub fn n_tot(&self) -> usize {
        self.canonical.len()
    }

    pub fn representatives(&self) -> &[usize] {
        &self.representatives
    }

    /// The folded images of every representative under every operation, as an
    /// `(n_orbits, n_sym)` array.
    pub fn members(&self) -> &Array2<usize> {
        &self.members
    }

    /// The conjugation flags matching [`Self::members`].
    pub fn conjugated(&self) -> &Array2<bool> {
        &self.conjugated
    }

    pub fn multiplicities(&self) -> &[usize] {
        &self.multiplicities
    }

    /// The number of (orbit, operation) slots mapping onto each global index.
    pub fn occurrences(&self) -> &[usize] {
        &self.occurrences
    }

    /// Returns the representative of the orbit containing global index `index`.
    pub fn canonical(&self, index: usize) -> usize {
        self.canonical[index]
    }

    /// Returns the number of the orbit containing global index `index`.
    pub fn orbit_of(&self, index: usize) -> Option<usize> {
        self.representatives
            .binary_search(&self.canonical[index])
            .ok()
    }

    /// Returns a view of orbit `orbit`.
    pub fn orbit(&self, orbit: usize) -> Orbit<'_> {
        Orbit {
            representative: self.representatives[orbit],
            members: self.members.row(orbit),
            conjugated: self.conjugated.row(orbit),
            multiplicity: self.multiplicities[orbit],
        }
    }

    /// Iterates over all orbits in order.
    pub fn orbits(&self) -> impl Iterator<Item = Orbit<'_>> + '_ {
        (0..self.n_orbits()).map(|orbit| self.orbit(orbit))
    }

    /// Saves the decomposition as a binary file of type [`GridSymFileType::Orb`].
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the file, without the `gridsym` extension.
    ///
    /// # Returns
    ///
    /// The path of the written file.
    pub fn save<P: AsRef<Path>>(&self, name: P) -> Result<PathBuf, anyhow::Error> {
        let path = GridSymFileType::Orb.path_for(name);
        write_binary(&path, self)?;
        log::debug!("Orbit decomposition saved to `{}`.", path.display());
        Ok(path)
    }

    /// Loads a decomposition saved by [`Self::save`] under `name`.
    ///
    /// # Errors
    ///
    /// Errors if the file cannot be read or does not hold a consistent decomposition.
    pub fn load<P: AsRef<Path>>(name: P) -> Result<Self, anyhow::Error> {
        let path = GridSymFileType::Orb.path_for(name);
        let orbits: Self = read_binary(&path)?;
        let (n_orbits, n_sym) = orbits.members.dim();
        ensure!(
            n_orbits == orbits.representatives.len()
                && n_sym == orbits.n_sym
                && orbits.conjugated.dim() == (n_orbits, n_sym)
                && orbits.occurrences.len() == orbits.canonical.len(),
            ConfigurationError(format!(
                "`{}` holds an inconsistent orbit decomposition.",
                path.display()
            ))
        );
        Ok(orbits)
    }
}

impl fmt::Display for OrbitDecomposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_heading(f, "Orbit decomposition")?;
        writeln!(f, "Group order: {}", self.n_sym)?;
        writeln!(f, "Grid indices: {}", self.n_tot())?;
        writeln!(f, "Orbits: {}", self.n_orbits())?;
        writeln!(f)?;
        let mut by_multiplicity = self
            .multiplicities
            .iter()
            .copied()
            .collect::<Counter<usize>>()
            .iter()
            .map(|(&multiplicity, &count)| (multiplicity, count))
            .collect::<IndexMap<usize, usize>>();
        by_multiplicity.sort_keys();
        let rows = by_multiplicity
            .iter()
            .map(|(multiplicity, count)| vec![multiplicity.to_string(), count.to_string()])
            .collect_vec();
        write_table(f, &["Multiplicity", "Orbits"], &rows)
    }
}

/// A view of a single orbit of an [`OrbitDecomposition`].
#[derive(Clone, Debug)]
pub struct Orbit<'a> {
    /// The smallest global index reached from the orbit without conjugation.
    pub representative: usize,

    /// The folded image of the representative under each operation, duplicates included.
    pub members: ArrayView1<'a, usize>,

    /// Whether each member required conjugation when folded.
    pub conjugated: ArrayView1<'a, bool>,

    /// The number of distinct members.
    pub multiplicity: usize,
}

//! Files read and written by `gridsym`.
//!
//! Orbit decompositions are persisted with [`bincode`] under the extension of
//! [`GridSymFileType::Orb`], see [`OrbitDecomposition::save`](crate::orbit::OrbitDecomposition::save).
//! Symmetry operations are read from YAML, see
//! [`SymmetryOperationsInput::from_yaml`](crate::symmetry::SymmetryOperationsInput::from_yaml).

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{self, Context};
use bincode;
use serde::{de::DeserializeOwned, Serialize};
use serde_yaml;

pub(crate) mod format;


/// An enumerated type for the binary files written by `gridsym`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridSymFileType {
    /// Orbit decompositions of a half-space grid.
    Orb,
}

impl GridSymFileType {
    pub fn ext(&self) -> &'static str {
        match self {
            GridSymFileType::Orb => "gridsym.orb",
        }
    }

    /// Returns `name` with the extension of this file type attached.
    pub fn path_for<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        let mut path = name.as_ref().to_path_buf();
        path.set_extension(self.ext());
        path
    }
}

pub(crate) fn write_binary<T: Serialize>(path: &Path, value: &T) -> Result<(), anyhow::Error> {
    let file =
        File::create(path).with_context(|| format!("Unable to create `{}`", path.display()))?;
    bincode::serialize_into(BufWriter::new(file), value)
        .with_context(|| format!("Unable to write `{}`", path.display()))
}

pub(crate) fn read_binary<T: DeserializeOwned>(path: &Path) -> Result<T, anyhow::Error> {
    let file = File::open(path).with_context(|| format!("Unable to open `{}`", path.display()))?;
    bincode::deserialize_from(BufReader::new(file))
        .with_context(|| format!("`{}` is not a valid gridsym binary file", path.display()))
}

pub(crate) fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, anyhow::Error> {
    let file = File::open(path).with_context(|| format!("Unable to open `{}`", path.display()))?;
    serde_yaml::from_reader(BufReader::new(file))
        .with_context(|| format!("`{}` is not a valid YAML document", path.display()))
}

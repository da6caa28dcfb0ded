//! Entity paths for error context
//!
//! Provides [`EntityPath`] for addressing an entity inside a matrix graph,
//! e.g. `matrix.row[Homo_sapiens].cell[3]`. Paths are attached to every
//! validation error and listed in reconciliation reports.

use std::fmt::{self, Display, Formatter};

/// One segment of an [`EntityPath`]: `row[Homo_sapiens]` or plain `matrix`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct PathSegment {
    name: &'static str,
    key: Option<String>,
}

impl Display for PathSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}[{}]", self.name, key),
            None => f.write_str(self.name),
        }
    }
}

/// Location of an entity within a matrix graph
///
/// # Examples
/// - `matrix` → the matrix itself
/// - `matrix.column[2]` → the third column
/// - `matrix.row[Homo_sapiens].cell[3]` → a cell
/// - `otu_set.otu[Pan]` → an OTU
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityPath(Vec<PathSegment>);

impl EntityPath {
    /// Empty path, for errors raised before their entity is placed
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// `matrix`
    #[inline]
    #[must_use]
    pub fn matrix() -> Self {
        Self::root().push("matrix", None)
    }

    /// `otu_set`
    #[inline]
    #[must_use]
    pub fn otu_set() -> Self {
        Self::root().push("otu_set", None)
    }

    /// `otu_set.otu[label]`
    #[must_use]
    pub fn otu(label: &str) -> Self {
        Self::otu_set().push("otu", Some(label.to_string()))
    }

    /// `matrix.character[label]`
    #[must_use]
    pub fn character(label: &str) -> Self {
        Self::matrix().push("character", Some(label.to_string()))
    }

    /// `matrix.column[index]`
    #[must_use]
    pub fn column(index: usize) -> Self {
        Self::matrix().push("column", Some(index.to_string()))
    }

    /// `matrix.row[otu_label]`
    #[must_use]
    pub fn row(otu_label: &str) -> Self {
        Self::matrix().push("row", Some(otu_label.to_string()))
    }

    /// `matrix.row[otu_label].cell[column]`
    #[must_use]
    pub fn cell(otu_label: &str, column: usize) -> Self {
        Self::row(otu_label).push("cell", Some(column.to_string()))
    }

    fn push(mut self, name: &'static str, key: Option<String>) -> Self {
        self.0.push(PathSegment { name, key });
        self
    }
}

impl Display for EntityPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl serde::Serialize for EntityPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

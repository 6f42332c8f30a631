use std::collections::BTreeMap;
use std::io::BufRead;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::{MigrateError, MuscleId, Result};

const MUSCLE_INSERT_PATTERN: &str = r"INSERT INTO muscle \(id, name\) VALUES \((\d+), '([^']+)'\)";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct CatalogStats {
    pub lines_read: usize,
    pub recognized: usize,
    pub overwritten_ids: usize,
}

/// Muscle id to display name lookup, built from `muscle` insert lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MuscleCatalog {
    names: BTreeMap<MuscleId, String>,
    stats: CatalogStats,
}

impl MuscleCatalog {
    /// Record a muscle name; a repeated id replaces the earlier name.
    pub fn insert(&mut self, id: MuscleId, name: impl Into<String>) {
        if self.names.insert(id, name.into()).is_some() {
            self.stats.overwritten_ids += 1;
        }
    }

    #[must_use]
    pub fn name(&self, id: MuscleId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CatalogStats {
        self.stats
    }

    pub fn iter(&self) -> impl Iterator<Item = (MuscleId, &str)> {
        self.names.iter().map(|(id, name)| (*id, name.as_str()))
    }
}

pub struct MuscleCatalogParser {
    pattern: Regex,
}

impl MuscleCatalogParser {
    /// # Errors
    /// Returns an error when the muscle line pattern fails to compile.
    pub fn new() -> Result<Self> {
        Ok(Self { pattern: Regex::new(MUSCLE_INSERT_PATTERN)? })
    }

    /// Extract `(id, name)` from a muscle insert line, or `None` for any other line.
    #[must_use]
    pub fn parse_line<'a>(&self, line: &'a str) -> Option<(MuscleId, &'a str)> {
        let captures = self.pattern.captures(line)?;
        let id = captures.get(1)?.as_str().parse::<u64>().ok()?;
        let name = captures.get(2)?.as_str();
        Some((MuscleId(id), name))
    }
}

/// Build a [`MuscleCatalog`] from a line-oriented source.
///
/// # Errors
/// Returns an error when the source cannot be read.
pub fn read_muscles<R: BufRead>(reader: R) -> Result<MuscleCatalog> {
    let parser = MuscleCatalogParser::new()?;
    let mut catalog = MuscleCatalog::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| MigrateError::Read { line: index + 1, source })?;
        catalog.stats.lines_read += 1;
        if let Some((id, name)) = parser.parse_line(&line) {
            catalog.stats.recognized += 1;
            catalog.insert(id, name);
        }
    }

    if catalog.stats.overwritten_ids > 0 {
        tracing::debug!(
            "{} muscle ids were declared more than once; kept the last name",
            catalog.stats.overwritten_ids
        );
    }

    Ok(catalog)
}

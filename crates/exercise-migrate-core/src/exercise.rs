use std::collections::HashMap;
use std::io::BufRead;

use regex_lite::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::{ExerciseId, MigrateError, MuscleCatalog, MuscleId, Result};

const EXERCISE_INSERT_PATTERN: &str = r"INSERT INTO Exercise \(id, title, description, link, equipment_id, training_type_id\) VALUES \((\d+), '([^']+)', '[^']*', '([^']+)', \d+, \d+\)";

const ASSOCIATION_INSERT_PATTERN: &str = r"INSERT INTO exercise_muscle \(exercise_id, muscle_id, intensity\) VALUES \((\d+), (\d+), (\d+)\)";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MuscleAssociation {
    pub muscle: String,
    pub intensity: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawExerciseRecord {
    pub title: String,
    pub link: String,
    pub muscles: Vec<MuscleAssociation>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ExerciseStats {
    pub lines_read: usize,
    pub exercise_lines: usize,
    pub association_lines: usize,
    pub associations_kept: usize,
    pub unknown_exercise: usize,
    pub unknown_muscle: usize,
    pub overwritten_ids: usize,
    pub malformed_lines: usize,
}

impl ExerciseStats {
    #[must_use]
    pub fn dropped_associations(&self) -> usize {
        self.unknown_exercise + self.unknown_muscle
    }

    pub(crate) fn log(&self) {
        tracing::info!(
            "read {} lines: {} exercises, {} muscle associations",
            self.lines_read,
            self.exercise_lines,
            self.association_lines
        );
        if self.dropped_associations() > 0 {
            tracing::warn!(
                "dropped {} associations ({} unknown exercise id, {} unknown muscle id)",
                self.dropped_associations(),
                self.unknown_exercise,
                self.unknown_muscle
            );
        }
        if self.malformed_lines > 0 {
            tracing::warn!("skipped {} lines with out-of-range numbers", self.malformed_lines);
        }
        if self.overwritten_ids > 0 {
            tracing::warn!("{} exercise headers redeclared an existing id", self.overwritten_ids);
        }
    }
}

/// Exercise records keyed by source id, iterated in first-insertion order.
///
/// Re-declaring an id replaces the record in place, so the id keeps the
/// position of its first header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExerciseSet {
    order: Vec<ExerciseId>,
    records: HashMap<ExerciseId, RawExerciseRecord>,
    stats: ExerciseStats,
}

impl ExerciseSet {
    /// Insert a fresh record, returning the record previously stored at `id`.
    pub fn insert(
        &mut self,
        id: ExerciseId,
        record: RawExerciseRecord,
    ) -> Option<RawExerciseRecord> {
        let previous = self.records.insert(id, record);
        if previous.is_none() {
            self.order.push(id);
        }
        previous
    }

    #[must_use]
    pub fn get(&self, id: ExerciseId) -> Option<&RawExerciseRecord> {
        self.records.get(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> ExerciseStats {
        self.stats
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExerciseId, &RawExerciseRecord)> {
        self.order.iter().filter_map(|id| self.records.get(id).map(|record| (*id, record)))
    }
}

impl IntoIterator for ExerciseSet {
    type Item = (ExerciseId, RawExerciseRecord);
    type IntoIter = std::vec::IntoIter<(ExerciseId, RawExerciseRecord)>;

    fn into_iter(mut self) -> Self::IntoIter {
        self.order
            .iter()
            .filter_map(|id| self.records.remove(id).map(|record| (*id, record)))
            .collect::<Vec<_>>()
            .into_iter()
    }
}

enum ExerciseLine<'a> {
    Header { id: ExerciseId, title: &'a str, link: &'a str },
    Association { exercise: ExerciseId, muscle: MuscleId, intensity: u64 },
    Malformed,
}

/// Accumulates exercise headers and their muscle associations line by line.
pub struct ExerciseRecordBuilder<'m> {
    muscles: &'m MuscleCatalog,
    header: Regex,
    association: Regex,
    set: ExerciseSet,
}

impl<'m> ExerciseRecordBuilder<'m> {
    /// # Errors
    /// Returns an error when a line pattern fails to compile.
    pub fn new(muscles: &'m MuscleCatalog) -> Result<Self> {
        Ok(Self {
            muscles,
            header: Regex::new(EXERCISE_INSERT_PATTERN)?,
            association: Regex::new(ASSOCIATION_INSERT_PATTERN)?,
            set: ExerciseSet::default(),
        })
    }

    pub fn feed_line(&mut self, line: &str) {
        self.set.stats.lines_read += 1;
        let Some(parsed) = self.classify(line) else {
            return;
        };

        match parsed {
            ExerciseLine::Header { id, title, link } => {
                self.set.stats.exercise_lines += 1;
                let record = RawExerciseRecord {
                    title: title.to_string(),
                    link: link.to_string(),
                    muscles: Vec::new(),
                };
                if self.set.insert(id, record).is_some() {
                    self.set.stats.overwritten_ids += 1;
                }
            }
            ExerciseLine::Association { exercise, muscle, intensity } => {
                self.set.stats.association_lines += 1;
                let Some(record) = self.set.records.get_mut(&exercise) else {
                    tracing::debug!("association references undeclared exercise {exercise}");
                    self.set.stats.unknown_exercise += 1;
                    return;
                };
                let Some(muscle_name) = self.muscles.name(muscle) else {
                    tracing::debug!("exercise {exercise} references unknown muscle {muscle}");
                    self.set.stats.unknown_muscle += 1;
                    return;
                };
                record
                    .muscles
                    .push(MuscleAssociation { muscle: muscle_name.to_string(), intensity });
                self.set.stats.associations_kept += 1;
            }
            ExerciseLine::Malformed => self.set.stats.malformed_lines += 1,
        }
    }

    #[must_use]
    pub fn finish(self) -> ExerciseSet {
        self.set
    }

    /// A line matching the header pattern is never also tried as an association.
    fn classify<'a>(&self, line: &'a str) -> Option<ExerciseLine<'a>> {
        if let Some(captures) = self.header.captures(line) {
            return Some(header_line(&captures).unwrap_or(ExerciseLine::Malformed));
        }
        let captures = self.association.captures(line)?;
        Some(association_line(&captures).unwrap_or(ExerciseLine::Malformed))
    }
}

fn header_line<'a>(captures: &Captures<'a>) -> Option<ExerciseLine<'a>> {
    Some(ExerciseLine::Header {
        id: ExerciseId(captures.get(1)?.as_str().parse().ok()?),
        title: captures.get(2)?.as_str(),
        link: captures.get(3)?.as_str(),
    })
}

fn association_line<'a>(captures: &Captures<'a>) -> Option<ExerciseLine<'a>> {
    Some(ExerciseLine::Association {
        exercise: ExerciseId(captures.get(1)?.as_str().parse().ok()?),
        muscle: MuscleId(captures.get(2)?.as_str().parse().ok()?),
        intensity: captures.get(3)?.as_str().parse().ok()?,
    })
}

/// Build the id-keyed exercise working set from a line-oriented source.
///
/// # Errors
/// Returns an error when the source cannot be read.
pub fn read_exercises<R: BufRead>(reader: R, muscles: &MuscleCatalog) -> Result<ExerciseSet> {
    let mut builder = ExerciseRecordBuilder::new(muscles)?;
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| MigrateError::Read { line: index + 1, source })?;
        builder.feed_line(&line);
    }
    Ok(builder.finish())
}

use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

mod catalog;
mod collapse;
mod exercise;
mod sink;

pub use catalog::{read_muscles, CatalogStats, MuscleCatalog, MuscleCatalogParser};
pub use collapse::{collapse_titles, CollapsedCatalog, ExerciseDocument, TitleCollision};
pub use exercise::{
    read_exercises, ExerciseRecordBuilder, ExerciseSet, ExerciseStats, MuscleAssociation,
    RawExerciseRecord,
};
pub use sink::{load_documents, DocumentSink, LoadFailure, LoadSummary, PutOutcome};

#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error("failed to open source {}", .path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read line {line}")]
    Read {
        line: usize,
        #[source]
        source: io::Error,
    },
    #[error("invalid line pattern: {0}")]
    Pattern(#[from] regex_lite::Error),
}

pub type Result<T> = std::result::Result<T, MigrateError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MuscleId(pub u64);

impl Display for MuscleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ExerciseId(pub u64);

impl Display for ExerciseId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything parsed from the two sources, ready to hand to a sink.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub muscle_stats: CatalogStats,
    pub muscle_count: usize,
    pub exercise_stats: ExerciseStats,
    pub candidate_exercises: usize,
    pub catalog: CollapsedCatalog,
}

impl MigrationPlan {
    #[must_use]
    pub fn documents(&self) -> &[ExerciseDocument] {
        &self.catalog.documents
    }
}

/// Open a source file for line-at-a-time reading.
///
/// # Errors
/// Returns [`MigrateError::SourceUnreadable`] when the file cannot be opened.
pub fn open_source(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|source| MigrateError::SourceUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Parse the muscle and exercise sources and collapse the result by title.
///
/// # Errors
/// Returns an error when either source cannot be opened or read.
pub fn plan_migration(muscles_path: &Path, exercises_path: &Path) -> Result<MigrationPlan> {
    tracing::info!("parsing muscles from {}", muscles_path.display());
    let muscles = read_muscles(open_source(muscles_path)?)?;
    tracing::info!("found {} muscles", muscles.len());

    tracing::info!("parsing exercises from {}", exercises_path.display());
    let exercises = read_exercises(open_source(exercises_path)?, &muscles)?;
    let exercise_stats = exercises.stats();
    let candidate_exercises = exercises.len();
    exercise_stats.log();

    let catalog = collapse_titles(exercises);
    tracing::info!(
        "found {} unique exercises from {} candidates",
        catalog.documents.len(),
        candidate_exercises
    );

    Ok(MigrationPlan {
        muscle_stats: muscles.stats(),
        muscle_count: muscles.len(),
        exercise_stats,
        candidate_exercises,
        catalog,
    })
}

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use exercise_migrate_core::{DocumentSink, ExerciseDocument, PutOutcome};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS documents (
  collection TEXT NOT NULL CHECK (length(collection) > 0),
  document_id TEXT NOT NULL,
  body_json TEXT NOT NULL CHECK (json_valid(body_json)),
  inserted_at TEXT NOT NULL,
  PRIMARY KEY (collection, document_id)
);

CREATE INDEX IF NOT EXISTS idx_documents_inserted_at ON documents(collection, inserted_at);
";

pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub quick_check_ok: bool,
    pub quick_check_message: String,
    pub schema_status: SchemaStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsertStatus {
    Inserted,
    DuplicateKey,
}

impl SqliteStore {
    /// Open a SQLite-backed document store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
        })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when a migration step fails or the database is newer than supported.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;

        if version < 1 {
            self.apply_migration_1()?;
            version = current_schema_version(&self.conn)?;
        }

        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        Ok(())
    }

    fn apply_migration_1(&mut self) -> Result<()> {
        let tx = self.conn.transaction().context("failed to start migration v1 transaction")?;
        tx.execute_batch(MIGRATION_001_SQL).context("failed to apply migration v1")?;
        record_schema_version(&tx, 1)?;
        tx.commit().context("failed to commit migration v1")?;
        tracing::debug!("applied document store migration v1");
        Ok(())
    }

    /// Insert one document into a collection. A document whose identity is
    /// already present in that collection is left untouched.
    ///
    /// # Errors
    /// Returns an error for any failure other than a duplicate identity.
    pub fn insert_document(
        &self,
        collection: &str,
        document: &ExerciseDocument,
    ) -> Result<InsertStatus> {
        let body_json =
            serde_json::to_string(document).context("failed to serialize exercise document")?;

        let result = self.conn.execute(
            "INSERT INTO documents(collection, document_id, body_json, inserted_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![collection, document.id, body_json, now_rfc3339()?],
        );

        match result {
            Ok(_) => Ok(InsertStatus::Inserted),
            Err(rusqlite::Error::SqliteFailure(err, _)) if is_duplicate_key(err.extended_code) => {
                Ok(InsertStatus::DuplicateKey)
            }
            Err(err) => Err(err).with_context(|| {
                format!("failed to insert document {} into {collection}", document.id)
            }),
        }
    }

    /// Load every document of a collection in insertion order.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_documents(&self, collection: &str) -> Result<Vec<ExerciseDocument>> {
        let mut stmt = self.conn.prepare(
            "SELECT document_id, body_json FROM documents WHERE collection = ?1 ORDER BY rowid ASC",
        )?;
        let mut rows = stmt.query(params![collection])?;
        let mut documents = Vec::new();

        while let Some(row) = rows.next()? {
            let document_id: String = row.get(0)?;
            let body_json: String = row.get(1)?;
            let document: ExerciseDocument = serde_json::from_str(&body_json)
                .with_context(|| format!("failed to deserialize document {document_id}"))?;
            documents.push(document);
        }

        Ok(documents)
    }

    /// # Errors
    /// Returns an error when the count query fails.
    pub fn count_documents(&self, collection: &str) -> Result<usize> {
        let count = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                params![collection],
                |row| row.get::<_, i64>(0),
            )
            .with_context(|| format!("failed to count documents in {collection}"))?;
        usize::try_from(count).context("document count out of range")
    }

    /// Run quick-check and schema status health probes.
    ///
    /// # Errors
    /// Returns an error when any integrity probe query fails.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let quick_check_message: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0))
            .context("failed to run PRAGMA quick_check")?;

        let schema_status = self.schema_status()?;
        Ok(IntegrityReport {
            quick_check_ok: quick_check_message == "ok",
            quick_check_message,
            schema_status,
        })
    }

    /// A sink that writes into the named collection of this store.
    #[must_use]
    pub fn collection(&self, name: &str) -> SqliteCollection<'_> {
        SqliteCollection { store: self, name: name.to_string() }
    }
}

pub struct SqliteCollection<'s> {
    store: &'s SqliteStore,
    name: String,
}

impl SqliteCollection<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl DocumentSink for SqliteCollection<'_> {
    fn put(&mut self, document: &ExerciseDocument) -> PutOutcome {
        match self.store.insert_document(&self.name, document) {
            Ok(InsertStatus::Inserted) => PutOutcome::Inserted,
            Ok(InsertStatus::DuplicateKey) => PutOutcome::DuplicateKey,
            Err(err) => PutOutcome::Failed(format!("{err:#}")),
        }
    }
}

fn is_duplicate_key(extended_code: i32) -> bool {
    extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        || extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let tracked = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations')",
            [],
            |row| row.get::<_, bool>(0),
        )
        .context("failed to look up schema_migrations table")?;
    if !tracked {
        return Ok(0);
    }

    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = now_rfc3339()?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

#[cfg(test)]
mod tests {
    use exercise_migrate_core::{load_documents, MuscleAssociation};

    use super::*;

    fn memory_store() -> Result<SqliteStore> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;
        store.migrate()?;
        Ok(store)
    }

    fn document(title: &str, muscles: &[(&str, u64)]) -> ExerciseDocument {
        ExerciseDocument {
            id: title.to_string(),
            name: title.to_string(),
            demonstration_link: format!("https://videos.example/{}", title.to_lowercase()),
            muscles: muscles
                .iter()
                .map(|(muscle, intensity)| MuscleAssociation {
                    muscle: (*muscle).to_string(),
                    intensity: *intensity,
                })
                .collect(),
        }
    }

    #[test]
    fn fresh_database_reports_pending_migration() -> Result<()> {
        let store = SqliteStore::open(Path::new(":memory:"))?;
        let status = store.schema_status()?;

        assert_eq!(status.current_version, 0);
        assert_eq!(status.target_version, LATEST_SCHEMA_VERSION);
        assert_eq!(status.pending_versions, vec![1]);
        Ok(())
    }

    #[test]
    fn schema_status_leaves_fresh_database_untouched() -> Result<()> {
        let store = SqliteStore::open(Path::new(":memory:"))?;
        store.schema_status()?;

        let tables: i64 = store.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(tables, 0);
        Ok(())
    }

    #[test]
    fn migrate_is_idempotent() -> Result<()> {
        let mut store = memory_store()?;
        store.migrate()?;

        let status = store.schema_status()?;
        assert_eq!(status.current_version, LATEST_SCHEMA_VERSION);
        assert!(status.pending_versions.is_empty());
        Ok(())
    }

    #[test]
    fn inserted_document_round_trips() -> Result<()> {
        let store = memory_store()?;
        let curl = document("Curl", &[("Biceps", 5), ("Forearms", 2)]);

        assert_eq!(store.insert_document("exercises", &curl)?, InsertStatus::Inserted);
        assert_eq!(store.list_documents("exercises")?, vec![curl]);
        assert_eq!(store.count_documents("exercises")?, 1);
        Ok(())
    }

    #[test]
    fn same_identity_in_same_collection_is_duplicate() -> Result<()> {
        let store = memory_store()?;
        let first = document("Row", &[("Lats", 4)]);
        let second = document("Row", &[("Rhomboids", 3)]);

        assert_eq!(store.insert_document("exercises", &first)?, InsertStatus::Inserted);
        assert_eq!(store.insert_document("exercises", &second)?, InsertStatus::DuplicateKey);
        assert_eq!(store.list_documents("exercises")?, vec![first]);
        Ok(())
    }

    #[test]
    fn same_identity_in_other_collection_is_accepted() -> Result<()> {
        let store = memory_store()?;
        let press = document("Press", &[]);

        assert_eq!(store.insert_document("exercises", &press)?, InsertStatus::Inserted);
        assert_eq!(store.insert_document("exercises_staging", &press)?, InsertStatus::Inserted);
        assert_eq!(store.count_documents("exercises")?, 1);
        assert_eq!(store.count_documents("exercises_staging")?, 1);
        Ok(())
    }

    #[test]
    fn insert_before_migration_fails() -> Result<()> {
        let store = SqliteStore::open(Path::new(":memory:"))?;
        assert!(store.insert_document("exercises", &document("Squat", &[])).is_err());
        Ok(())
    }

    #[test]
    fn collection_sink_classifies_outcomes() -> Result<()> {
        let store = memory_store()?;
        let documents = vec![
            document("Curl", &[("Biceps", 5)]),
            document("Row", &[]),
            document("Press", &[]),
            document("Dip", &[]),
            document("Plank", &[]),
        ];
        assert_eq!(store.insert_document("exercises", &documents[2])?, InsertStatus::Inserted);

        let mut sink = store.collection("exercises");
        let summary = load_documents(&mut sink, &documents);

        assert_eq!(summary.processed, 5);
        assert_eq!(summary.inserted, 4);
        assert_eq!(summary.skipped_duplicates, 1);
        assert_eq!(summary.failed, 0);
        Ok(())
    }

    #[test]
    fn collection_sink_reports_other_errors_as_failed() -> Result<()> {
        let store = memory_store()?;
        let mut sink = store.collection("");

        match sink.put(&document("Lunge", &[])) {
            PutOutcome::Failed(detail) => assert!(detail.contains("Lunge"), "{detail}"),
            other => panic!("expected failure, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn documents_survive_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("exercises.sqlite3");
        {
            let mut store = SqliteStore::open(&path)?;
            store.migrate()?;
            store.insert_document("exercises", &document("Deadlift", &[("Hamstrings", 4)]))?;
        }

        let store = SqliteStore::open(&path)?;
        assert_eq!(store.schema_status()?.current_version, LATEST_SCHEMA_VERSION);
        assert_eq!(
            store.list_documents("exercises")?,
            vec![document("Deadlift", &[("Hamstrings", 4)])]
        );
        Ok(())
    }

    #[test]
    fn integrity_check_reports_clean_database() -> Result<()> {
        let store = memory_store()?;

        let report = store.integrity_check()?;
        assert!(report.quick_check_ok);
        assert_eq!(report.schema_status.current_version, LATEST_SCHEMA_VERSION);
        Ok(())
    }
}

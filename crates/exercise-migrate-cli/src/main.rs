use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use exercise_migrate_core::{load_documents, plan_migration, MigrationPlan};
use exercise_migrate_store_sqlite::SqliteStore;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "exmig")]
#[command(about = "Migrate SQL exercise seed data into a document collection")]
struct Cli {
    #[arg(long, env = "EXMIG_DB", default_value = "./exercises.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Run(RunArgs),
    Plan(PlanArgs),
    List(ListArgs),
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
    IntegrityCheck,
}

#[derive(Debug, Args)]
struct SourceArgs {
    #[arg(long, env = "EXMIG_MUSCLES", default_value = "muscle.sql")]
    muscles: PathBuf,
    #[arg(long, env = "EXMIG_EXERCISES", default_value = "data.sql")]
    exercises: PathBuf,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    sources: SourceArgs,
    #[arg(long, env = "EXMIG_COLLECTION", default_value = "exercises")]
    collection: String,
}

#[derive(Debug, Args)]
struct PlanArgs {
    #[command(flatten)]
    sources: SourceArgs,
    #[arg(long, default_value_t = false)]
    include_documents: bool,
}

#[derive(Debug, Args)]
struct ListArgs {
    #[arg(long, env = "EXMIG_COLLECTION", default_value = "exercises")]
    collection: String,
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_migration(&cli.db, &args),
        Command::Plan(args) => run_plan(&args),
        Command::List(args) => run_list(&cli.db, &args),
        Command::Db { command } => {
            let mut store = SqliteStore::open(&cli.db)?;
            run_db(command, &mut store)
        }
    }
}

fn plan_json(plan: &MigrationPlan) -> Result<Value> {
    Ok(serde_json::json!({
        "muscles": {
            "count": plan.muscle_count,
            "stats": plan.muscle_stats
        },
        "exercises": {
            "candidates": plan.candidate_exercises,
            "unique": plan.documents().len(),
            "discarded_by_title": plan.catalog.discarded_records(),
            "stats": plan.exercise_stats
        },
        "collisions": serde_json::to_value(&plan.catalog.collisions)
            .context("failed to serialize title collisions")?
    }))
}

fn run_migration(db: &Path, args: &RunArgs) -> Result<()> {
    let plan = plan_migration(&args.sources.muscles, &args.sources.exercises)?;

    let mut store = SqliteStore::open(db)?;
    store.migrate()?;
    tracing::info!(
        "inserting {} exercises into collection {:?}",
        plan.documents().len(),
        args.collection
    );
    let mut sink = store.collection(&args.collection);
    let summary = load_documents(&mut sink, plan.documents());

    let mut output = plan_json(&plan)?;
    output["collection"] = Value::String(args.collection.clone());
    output["summary"] =
        serde_json::to_value(&summary).context("failed to serialize load summary")?;
    emit_json(output)
}

fn run_plan(args: &PlanArgs) -> Result<()> {
    let plan = plan_migration(&args.sources.muscles, &args.sources.exercises)?;

    let mut output = plan_json(&plan)?;
    if args.include_documents {
        output["documents"] =
            serde_json::to_value(plan.documents()).context("failed to serialize documents")?;
    }
    emit_json(output)
}

fn run_list(db: &Path, args: &ListArgs) -> Result<()> {
    let documents = if db.exists() {
        let store = SqliteStore::open(db)?;
        if store.schema_status()?.current_version == 0 {
            tracing::warn!("document store at {} has no schema yet", db.display());
            Vec::new()
        } else {
            store.list_documents(&args.collection)?
        }
    } else {
        tracing::warn!("no document store at {}", db.display());
        Vec::new()
    };
    emit_json(serde_json::json!({
        "collection": args.collection,
        "count": documents.len(),
        "documents": documents
    }))
}

fn run_db(command: DbCommand, store: &mut SqliteStore) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => run_db_schema_version(store),
        DbCommand::Migrate(args) => run_db_migrate(&args, store),
        DbCommand::IntegrityCheck => run_db_integrity_check(store),
    }
}

fn run_db_schema_version(store: &SqliteStore) -> Result<()> {
    let status = store.schema_status()?;
    emit_json(serde_json::json!({
        "current_version": status.current_version,
        "target_version": status.target_version,
        "pending_versions": status.pending_versions,
        "up_to_date": status.pending_versions.is_empty()
    }))
}

fn run_db_migrate(args: &DbMigrateArgs, store: &mut SqliteStore) -> Result<()> {
    let before = store.schema_status()?;
    if args.dry_run {
        return emit_json(serde_json::json!({
            "dry_run": true,
            "current_version": before.current_version,
            "target_version": before.target_version,
            "would_apply_versions": before.pending_versions
        }));
    }

    store.migrate()?;
    let after = store.schema_status()?;
    emit_json(serde_json::json!({
        "dry_run": false,
        "before_version": before.current_version,
        "applied_versions": before.pending_versions,
        "after_version": after.current_version,
        "target_version": after.target_version,
        "up_to_date": after.pending_versions.is_empty()
    }))
}

fn run_db_integrity_check(store: &SqliteStore) -> Result<()> {
    let report = store.integrity_check()?;
    emit_json(serde_json::to_value(&report).context("failed to serialize integrity report")?)
}

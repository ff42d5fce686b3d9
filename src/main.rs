use std::io::{self, Write};
use std::path::Path;

use clap::Parser;

use librarian::{
    cli::{Cli, Commands, OutputFormat},
    config::Config,
    db::Database,
    error::{ExitCode, LibrarianError},
    indexer::{IndexStats, Indexer},
    search::{Searcher, format_results},
    sync::{SyncReport, Synchronizer},
};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only results.
    // RUST_LOG wins over --debug; --quiet disables logging entirely.
    if !cli.quiet {
        let default_level = if cli.debug { "debug" } else { "warn" };
        tracing_subscriber::fmt()
            .with_target(false)
            .with_level(true)
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
            )
            .init();
    }

    let config = match cli.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return fail(&e);
        }
    };

    let db = match open_store(&config) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(
                error = %e,
                db_path = %config.db_path.display(),
                "Failed to open store"
            );
            return fail(&e);
        }
    };

    let result = match &cli.command {
        Commands::Index { target, .. } => run_index(&db, &config, target, cli.quiet),
        Commands::Sync { clean, .. } => run_sync(&db, &config, *clean, cli.quiet),
        Commands::Match { fields, format, .. } => {
            let query = cli.query_string().unwrap_or_default();
            run_match(&db, &config, &query, fields, *format)
        }
    };

    match result {
        Ok(code) => code.into(),
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            fail(&e)
        }
    }
}

/// Map a logged failure to its exit status.
fn fail(error: &LibrarianError) -> std::process::ExitCode {
    ExitCode::from(error).into()
}

/// Open the store and make sure its table exists.
fn open_store(config: &Config) -> librarian::Result<Database> {
    let db = Database::open(&config.db_path, &config.table, &config.pragma)?;
    db.create_if_missing(&config.schema())?;
    Ok(db)
}

fn run_index(
    db: &Database,
    config: &Config,
    target: &Path,
    quiet: bool,
) -> librarian::Result<ExitCode> {
    if !target.exists() {
        tracing::error!(path = %target.display(), "Index target does not exist");
        return Ok(ExitCode::NoInput);
    }

    let stats = Indexer::new(db, config).index_all(target)?;
    log_index_stats(&stats);
    if !quiet {
        writeln!(
            io::stderr(),
            "indexed {} documents ({} already present)",
            stats.files_indexed,
            stats.files_skipped
        )?;
    }
    Ok(ExitCode::Ok)
}

fn log_index_stats(stats: &IndexStats) {
    tracing::info!(
        files = stats.files_indexed,
        skipped = stats.files_skipped,
        bytes = stats.bytes_indexed,
        duration_secs = %format!("{:.2}", stats.duration.as_secs_f64()),
        "Indexing complete"
    );
}

/// Reconcile the store; actions are listed on stdout, one per line.
fn run_sync(
    db: &Database,
    config: &Config,
    clean: bool,
    quiet: bool,
) -> librarian::Result<ExitCode> {
    let report = Synchronizer::new(db)
        .persist_touched_mtime(config.persist_touched_mtime)
        .reconcile(clean)?;
    log_sync_report(&report);

    let mut stdout = io::stdout().lock();
    for entry in &report.entries {
        writeln!(stdout, "{}\t{}", entry.action.name(), entry.path)?;
    }
    if !quiet {
        writeln!(
            io::stderr(),
            "{} unchanged, {} changed",
            report.unchanged,
            report.entries.len()
        )?;
    }
    Ok(ExitCode::Ok)
}

fn log_sync_report(report: &SyncReport) {
    tracing::info!(
        changed = report.entries.len(),
        unchanged = report.unchanged,
        content_reads = report.content_reads,
        duration_secs = %format!("{:.2}", report.duration.as_secs_f64()),
        "Sync complete"
    );
}

fn run_match(
    db: &Database,
    config: &Config,
    query: &str,
    fields: &[String],
    format: OutputFormat,
) -> librarian::Result<ExitCode> {
    let rows = Searcher::new(db)
        .with_snippet(config.snippet.clone())
        .query(query, fields, config.limit, None)?;
    format_results(&rows, format, &mut io::stdout().lock())?;
    Ok(ExitCode::Ok)
}

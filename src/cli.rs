//! Command-line front end.

use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::model::RecordSummary;
use crate::sources::{ProgressCallback, SyncOutcome, SyncProgress, SyncReport, WalkEnd};

#[derive(Parser, Debug)]
#[command(
    name = "frics",
    version,
    about = "Browse and search a local mirror of the Frida codeshare catalog"
)]
pub struct Cli {
    /// Directory holding the local mirror (overrides config and FRICS_DATA_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Catalog base URL (overrides config and FRICS_BASE_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Emit JSON instead of human-readable output
    #[arg(long, global = true)]
    pub json: bool,

    #[arg(long, global = true, value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mirror the remote catalog into the local store
    Sync,
    /// List every mirrored project
    List,
    /// List projects whose name, author, description or source contains TERM
    Search { term: String },
    /// Print a project's description and source
    Show {
        id: String,
        /// Print only the raw source (for piping into a clipboard tool)
        #[arg(long)]
        source_only: bool,
    },
    /// Show the outcome of the last sync
    Status,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn apply(self) {
        let enabled = match self {
            ColorMode::Auto => std::io::stdout().is_terminal(),
            ColorMode::Always => true,
            ColorMode::Never => false,
        };
        colored::control::set_override(enabled);
    }
}

pub async fn execute(cli: Cli) -> Result<()> {
    cli.color.apply();

    let mut config = Config::load().context("loading configuration")?;
    if let Some(dir) = cli.data_dir.clone() {
        config.data_dir = Some(dir);
    }
    if let Some(url) = cli.base_url.clone() {
        config.base_url = url;
    }
    let catalog = Catalog::from_config(&config).context("initializing catalog")?;

    match &cli.command {
        Command::Sync => run_sync(&catalog, cli.json).await,
        Command::List => {
            if !ensure_mirror(&catalog, cli.json) {
                return Ok(());
            }
            let rows = catalog.scan_all().await.context("listing projects")?;
            print_rows(&rows, cli.json)
        }
        Command::Search { term } => {
            if !ensure_mirror(&catalog, cli.json) {
                return Ok(());
            }
            let term = term.trim();
            let rows = if term.is_empty() {
                Vec::new()
            } else {
                catalog.search(term).await.context("searching projects")?
            };
            print_rows(&rows, cli.json)
        }
        Command::Show { id, source_only } => {
            let (description, source) = match catalog.get(id).await {
                Ok(found) => found,
                Err(e) if e.is_not_found() => anyhow::bail!("project {id} not found"),
                Err(e) => return Err(e).context("reading project"),
            };
            print_project(id, &description, &source, *source_only, cli.json)
        }
        Command::Status => print_status(&catalog, cli.json).await,
    }
}

/// Warn when there is nothing to read yet. Returns whether a mirror exists.
fn ensure_mirror(catalog: &Catalog, json: bool) -> bool {
    if catalog.exists() {
        return true;
    }
    if json {
        println!("[]");
    }
    eprintln!(
        "No local catalog found at {}. Run `frics sync` first.",
        catalog.store().path().display()
    );
    false
}

async fn run_sync(catalog: &Catalog, json: bool) -> Result<()> {
    let bar = if json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar.set_message("fetching listing page 1");

    let handle = bar.clone();
    let progress: ProgressCallback = Box::new(move |p: SyncProgress| {
        handle.set_message(format!(
            "page {} · {} projects mirrored · {} skipped",
            p.page, p.records_written, p.skipped
        ));
    });

    let cancel = catalog.cancellation_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    });

    let result = catalog.sync(Some(progress)).await;
    ctrl_c.abort();
    bar.finish_and_clear();

    let report = result.context("sync failed")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    println!(
        "{} {} projects from {} pages in {} ms",
        "Synced".green().bold(),
        report.records_written,
        report.pages_walked,
        report.total_duration_ms
    );
    if !report.skipped.is_empty() {
        println!("{} {} projects skipped", "!".yellow(), report.skipped.len());
    }
    if let WalkEnd::TransportFailure { page, error } = &report.end {
        eprintln!(
            "{} listing page {page} could not be fetched ({error}); the mirror may be incomplete",
            "warning:".yellow().bold()
        );
    }
}

fn print_rows(rows: &[RecordSummary], json: bool) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(rows)?)?;
        return Ok(());
    }
    if rows.is_empty() {
        return Ok(());
    }
    writeln!(
        out,
        "{}",
        format!("{:<38} {:<50} {:<15} {}", "ID", "Project Name", "Author", "Frida Version").bold()
    )?;
    for row in rows {
        writeln!(
            out,
            "{:<38} {:<50} {:<15} {}",
            row.id,
            truncate(&row.name, 50),
            truncate(&row.author, 15),
            row.runtime_version
        )?;
    }
    Ok(())
}

fn print_project(id: &str, description: &str, source: &str, source_only: bool, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "id": id,
            "description": description,
            "source": source,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if source_only {
        print!("{source}");
        if !source.ends_with('\n') {
            println!();
        }
    } else {
        println!("{}", "Description".bold());
        println!("{description}\n");
        println!("{}", "Source".bold());
        println!("{source}");
    }
    Ok(())
}

async fn print_status(catalog: &Catalog, json: bool) -> Result<()> {
    let status = catalog.status().context("reading sync status")?;
    let records = catalog.count().await.context("counting projects")?;
    if json {
        let value = serde_json::json!({
            "store": catalog.store().path(),
            "exists": catalog.exists(),
            "records": records,
            "last_sync": status,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("store:    {}", catalog.store().path().display());
    println!("records:  {records}");
    let when = status
        .last_sync
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    println!("synced:   {when}");
    let outcome = match &status.outcome {
        SyncOutcome::Complete => "complete".green().to_string(),
        SyncOutcome::Partial(why) => format!("{} ({why})", "partial".yellow()),
        SyncOutcome::Failed(why) => format!("{} ({why})", "failed".red()),
        SyncOutcome::Never => "no sync yet".dimmed().to_string(),
    };
    println!("outcome:  {outcome}");
    if !catalog.exists() {
        println!("Run `frics sync` to build the local catalog.");
    }
    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

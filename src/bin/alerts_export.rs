//! alerts_export - re-export a recorded run's alert log from the SQLite store

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use watchpost::{export_to_path, AlertLog, AlertStore, ExportFormat, SqliteAlertStore};

#[path = "../ui.rs"]
#[allow(dead_code)]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the alert database.
    #[arg(long, env = "WATCHPOST_DB_PATH", default_value = "watchpost.db")]
    db: String,
    /// Run to export (defaults to the most recent run).
    #[arg(long)]
    run: Option<i64>,
    /// Output file path for the alert table.
    #[arg(long, default_value = "alerts_log.csv")]
    output: PathBuf,
    /// Output format (csv|json); inferred from the output path by default.
    #[arg(long)]
    format: Option<String>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let format = match &args.format {
        Some(format) => format.parse()?,
        None => ExportFormat::from_path(&args.output),
    };

    let mut store = {
        let _stage = ui.stage("Open alert store");
        SqliteAlertStore::open(&args.db)?
    };
    let run = match args.run {
        Some(run) => run,
        None => {
            let latest = store
                .latest_run()?
                .ok_or_else(|| anyhow!("no runs recorded in {}", args.db))?;
            log::info!(
                "exporting latest run {} ({} at {:.2} fps)",
                latest.id,
                latest.source,
                latest.fps
            );
            latest.id
        }
    };
    let log = {
        let _stage = ui.stage("Read alerts");
        let mut log = AlertLog::new();
        log.extend(store.read_alerts(run)?);
        log
    };
    {
        let _stage = ui.stage("Write alert table");
        export_to_path(&log, &args.output, format)?;
    }
    println!(
        "{} alerts from run {} written to {}",
        log.len(),
        run,
        args.output.display()
    );
    Ok(())
}

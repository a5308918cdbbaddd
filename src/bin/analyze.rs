//! analyze - run the event heuristics over one video and export the alert log
//!
//! This tool:
//! 1. Opens a local video (or a `stub://` synthetic source)
//! 2. Runs a detector backend on every frame
//! 3. Applies the loitering, abandonment and crowd heuristics
//! 4. Writes the alert table (CSV or JSON) and optionally a SQLite run record
//! 5. Optionally writes annotated frames

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use watchpost::{
    export_to_path, AlertStore, AnalysisSession, AnalyzerConfig, AnnotatedFrameWriter,
    DetectorBackend, ExportFormat, FileConfig, FileSource, FrameSink, FrameSource, ReplayBackend,
    SessionReport, SqliteAlertStore,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Local video file, or stub://<name> for a synthetic source.
    #[arg(long)]
    input: String,
    /// JSON-lines file of precomputed detections to replay.
    #[arg(long, conflicts_with = "model")]
    detections: Option<PathBuf>,
    /// ONNX detector model (requires the backend-tract feature).
    #[arg(long)]
    model: Option<PathBuf>,
    /// Model input width in pixels.
    #[arg(long, default_value_t = 640)]
    model_width: u32,
    /// Model input height in pixels.
    #[arg(long, default_value_t = 640)]
    model_height: u32,
    /// Analyzer config file (.toml or .json).
    #[arg(long, env = "WATCHPOST_CONFIG")]
    config: Option<PathBuf>,
    /// Alert table output path (overrides config).
    #[arg(long)]
    output: Option<PathBuf>,
    /// Alert table format (csv|json); inferred from the output path by default.
    #[arg(long)]
    format: Option<String>,
    /// SQLite database to record the run in (overrides config).
    #[arg(long)]
    db: Option<String>,
    /// Directory for annotated frames (overrides config).
    #[arg(long)]
    annotated_dir: Option<PathBuf>,
    /// Frame rate reported by stub:// sources.
    #[arg(long, default_value_t = 25.0)]
    stub_fps: f64,
    /// Frame count produced by stub:// sources.
    #[arg(long, default_value_t = 250)]
    stub_frames: u64,
    /// Print grouped alert spans instead of one row per alert.
    #[arg(long)]
    rollup: bool,
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

    let mut cfg = {
        let _stage = ui.stage("Load config");
        AnalyzerConfig::load(args.config.as_deref())?
    };
    if let Some(output) = &args.output {
        cfg.output.alerts_path = output.clone();
        cfg.output.format = ExportFormat::from_path(output);
    }
    if let Some(format) = &args.format {
        cfg.output.format = format.parse()?;
    }
    if let Some(db) = &args.db {
        cfg.output.db_path = Some(db.clone());
    }
    if let Some(dir) = &args.annotated_dir {
        cfg.output.annotated_dir = Some(dir.clone());
    }

    let mut source = {
        let _stage = ui.stage("Open video");
        FileSource::new(FileConfig {
            path: args.input.clone(),
            synthetic_fps: Some(args.stub_fps),
            synthetic_frames: args.stub_frames,
            ..FileConfig::default()
        })?
    };
    let mut backend = {
        let _stage = ui.stage("Load detector");
        open_backend(&args)?
    };
    let mut writer = match &cfg.output.annotated_dir {
        Some(dir) => Some(AnnotatedFrameWriter::new(dir)?),
        None => None,
    };

    let report = {
        let _stage = ui.stage("Analyse frames");
        let inner = writer.as_mut().map(|w| w as &mut dyn FrameSink);
        let mut progress = ui.frame_progress(inner);
        AnalysisSession::run(
            &mut source,
            backend.as_mut(),
            cfg.heuristics.clone(),
            Some(&mut progress),
        )?
    };

    {
        let _stage = ui.stage("Write alert table");
        export_to_path(&report.alerts, &cfg.output.alerts_path, cfg.output.format)?;
    }
    if let Some(db_path) = &cfg.output.db_path {
        let _stage = ui.stage("Record run");
        let mut store = SqliteAlertStore::open(db_path)?;
        let run = store.begin_run(&source.describe(), report.fps)?;
        store.append_alerts(run, report.alerts.as_slice())?;
        store.finish_run(
            run,
            report.frames_processed,
            report.skipped_frames.len() as u64,
        )?;
        log::info!("recorded run {} in {}", run, db_path);
    }

    print_report(&report, args.rollup);
    println!(
        "alert log written to {}",
        cfg.output.alerts_path.display()
    );
    Ok(())
}

fn open_backend(args: &Args) -> Result<Box<dyn DetectorBackend>> {
    if let Some(path) = &args.detections {
        return Ok(Box::new(ReplayBackend::open(path)?));
    }
    if let Some(model) = &args.model {
        #[cfg(feature = "backend-tract")]
        {
            let backend =
                watchpost::TractBackend::new(model, args.model_width, args.model_height)?;
            return Ok(Box::new(backend));
        }
        #[cfg(not(feature = "backend-tract"))]
        {
            let _ = (model, args.model_width, args.model_height);
            return Err(anyhow!(
                "--model requires the backend-tract feature"
            ));
        }
    }
    Err(anyhow!("either --detections or --model is required"))
}

fn print_report(report: &SessionReport, rollup: bool) {
    if report.alerts.is_empty() {
        println!("No unusual activity detected.");
    } else if rollup {
        println!("{:<15} Alert", "Time");
        for span in report.alerts.rollup() {
            let time = if span.first_time == span.last_time {
                span.first_time.clone()
            } else {
                format!("{}-{}", span.first_time, span.last_time)
            };
            println!("{:<15} {} (x{})", time, span.kind.message(), span.occurrences);
        }
    } else {
        println!("{:<6} Alert", "Time");
        for (time, alert) in report.alerts.rows() {
            println!("{:<6} {}", time, alert);
        }
    }
    for skipped in &report.skipped_frames {
        println!(
            "skipped frame {} at {}: {}",
            skipped.frame_index, skipped.timestamp, skipped.reason
        );
    }
}

use anyhow::Result;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};
use watchpost::{FrameReport, FrameSink, RawFrame};

/// `--ui` flag value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    fn parse(flag: Option<&str>) -> Self {
        match flag.map(str::trim) {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        }
    }
}

/// Stderr progress reporting: spinners on a terminal, `==>` lines otherwise.
#[derive(Clone, Debug)]
pub struct Ui {
    spinners: bool,
}

impl Ui {
    /// `auto` shows spinners only when stderr is a terminal and stdout is
    /// not being piped.
    pub fn from_args(ui_flag: Option<&str>, stderr_tty: bool, stdout_piped: bool) -> Self {
        let spinners = stderr_tty
            && match UiMode::parse(ui_flag) {
                UiMode::Pretty => true,
                UiMode::Auto => !stdout_piped,
                UiMode::Plain => false,
            };
        Self { spinners }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        let bar = if self.spinners {
            let bar = stderr_spinner("{spinner} {msg}");
            bar.set_message(format!("{name}…"));
            Some(bar)
        } else {
            eprintln!("==> {name}");
            None
        };
        StageGuard {
            name: name.to_string(),
            started: Instant::now(),
            bar,
        }
    }

    /// Frame counter shown while a session runs; frames are passed on to
    /// `inner` unchanged.
    pub fn frame_progress<'a>(&self, inner: Option<&'a mut dyn FrameSink>) -> FrameProgress<'a> {
        FrameProgress {
            bar: self
                .spinners
                .then(|| stderr_spinner("{spinner} frame {pos} [{elapsed}] {msg}")),
            inner,
            alerts: 0,
            skipped: 0,
        }
    }
}

fn stderr_spinner(template: &str) -> ProgressBar {
    let style =
        ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner());
    let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr()).with_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Prints the stage's duration when dropped.
pub struct StageGuard {
    name: String,
    started: Instant,
    bar: Option<ProgressBar>,
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let done = format!("✔ {} ({})", self.name, human_duration(self.started.elapsed()));
        match self.bar.take() {
            Some(bar) => bar.finish_with_message(done),
            None => eprintln!("{done}"),
        }
    }
}

pub struct FrameProgress<'a> {
    bar: Option<ProgressBar>,
    inner: Option<&'a mut dyn FrameSink>,
    alerts: usize,
    skipped: usize,
}

impl FrameSink for FrameProgress<'_> {
    fn on_frame(&mut self, frame: &RawFrame, report: &FrameReport) -> Result<()> {
        self.alerts += report.alerts.len();
        self.skipped += usize::from(report.skipped.is_some());
        if let Some(bar) = &self.bar {
            bar.set_position(report.frame_index);
            bar.set_message(format!(
                "{} | {} alerts, {} skipped",
                report.timestamp, self.alerts, self.skipped
            ));
        }
        match self.inner.as_deref_mut() {
            Some(inner) => inner.on_frame(frame, report),
            None => Ok(()),
        }
    }
}

impl Drop for FrameProgress<'_> {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

fn human_duration(elapsed: Duration) -> String {
    match elapsed.as_secs() {
        0 => format!("{}ms", elapsed.as_millis()),
        _ => format!("{:.2}s", elapsed.as_secs_f64()),
    }
}

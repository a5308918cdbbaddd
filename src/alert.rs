//! Alert log.
//!
//! The log is a raw, append-only event stream: a condition that holds for
//! many frames appends one alert per frame. `AlertLog::rollup` offers a
//! grouped view for display without touching the stream itself.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// What triggered an alert.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertKind {
    Loitering,
    ObjectAbandonment { label: String },
    UnusualActivity,
}

impl AlertKind {
    /// Operator-facing alert text.
    pub fn message(&self) -> String {
        match self {
            AlertKind::Loitering => "Loitering detected".to_string(),
            AlertKind::ObjectAbandonment { label } => format!("Object abandonment: {}", label),
            AlertKind::UnusualActivity => "Unusual activity detected".to_string(),
        }
    }
}

/// One alert row, stamped with the frame it fired on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub frame_index: u64,
    /// "MM:SS" video time.
    pub time: String,
    pub kind: AlertKind,
}

impl Alert {
    pub fn new(frame_index: u64, time: &str, kind: AlertKind) -> Self {
        Self {
            frame_index,
            time: time.to_string(),
            kind,
        }
    }

    pub fn message(&self) -> String {
        self.kind.message()
    }
}

/// Consecutive occurrences of one alert kind, collapsed for display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AlertSpan {
    pub kind: AlertKind,
    pub first_frame: u64,
    pub last_frame: u64,
    pub first_time: String,
    pub last_time: String,
    pub occurrences: usize,
}

/// Chronological, append-only alert sequence for one analysis run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AlertLog {
    alerts: Vec<Alert>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, alert: Alert) {
        self.alerts.push(alert);
    }

    pub fn extend<I: IntoIterator<Item = Alert>>(&mut self, alerts: I) {
        self.alerts.extend(alerts);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Alert> {
        self.alerts.iter()
    }

    pub fn as_slice(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// `(Time, Alert)` rows in log order.
    pub fn rows(&self) -> Vec<(String, String)> {
        self.alerts
            .iter()
            .map(|a| (a.time.clone(), a.message()))
            .collect()
    }

    /// Group alerts of the same kind fired on the same or adjacent frames.
    ///
    /// Spans are ordered by their first occurrence.
    pub fn rollup(&self) -> Vec<AlertSpan> {
        let mut spans: Vec<AlertSpan> = Vec::new();
        let mut open: HashMap<&AlertKind, usize> = HashMap::new();

        for alert in &self.alerts {
            if let Some(&idx) = open.get(&alert.kind) {
                let span = &mut spans[idx];
                if alert.frame_index <= span.last_frame + 1 {
                    span.last_frame = alert.frame_index;
                    span.last_time = alert.time.clone();
                    span.occurrences += 1;
                    continue;
                }
            }
            open.insert(&alert.kind, spans.len());
            spans.push(AlertSpan {
                kind: alert.kind.clone(),
                first_frame: alert.frame_index,
                last_frame: alert.frame_index,
                first_time: alert.time.clone(),
                last_time: alert.time.clone(),
                occurrences: 1,
            });
        }
        spans
    }
}

impl<'a> IntoIterator for &'a AlertLog {
    type Item = &'a Alert;
    type IntoIter = std::slice::Iter<'a, Alert>;

    fn into_iter(self) -> Self::IntoIter {
        self.alerts.iter()
    }
}

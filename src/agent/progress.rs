//! Live progress line for a metric evaluation.
//!
//! [`EvalProgress`] keeps per-metric state behind one mutex. When attached to
//! a terminal, [`EvalProgress::start`] spawns a loop that redraws a single
//! status line on a fixed interval until [`EvalProgress::stop`]. Otherwise
//! rendering is skipped but every mutator still updates state.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::metrics::{
    Metric, SampleObserver, CODE_BEHAVIOR_COMPREHENSION, CROSS_FILE_NAVIGATION,
    DOCUMENTATION_ACCURACY_DETECTION, IDENTIFIER_INTERPRETABILITY, TASK_EXECUTION_CONSISTENCY,
};
use crate::utils::lock;

pub const DEFAULT_RENDER_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_COST_PER_MILLION_TOKENS: f64 = 5.0;
const LINE_WIDTH: usize = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl fmt::Display for MetricStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetricStatus::Pending => "pending",
            MetricStatus::Running => "running",
            MetricStatus::Complete => "complete",
            MetricStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricProgress {
    pub id: String,
    pub name: String,
    pub status: MetricStatus,
    pub current_sample: usize,
    pub total_samples: usize,
    pub score: i32,
    pub error: Option<String>,
}

impl MetricProgress {
    fn pending(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            status: MetricStatus::Pending,
            current_sample: 0,
            total_samples: 0,
            score: 0,
            error: None,
        }
    }

    fn render(&self) -> String {
        let short = short_metric_id(&self.id);
        match self.status {
            MetricStatus::Pending => format!("{short}: Pending"),
            MetricStatus::Running => {
                let pct = (self.current_sample * 100)
                    .checked_div(self.total_samples)
                    .unwrap_or(0);
                format!(
                    "{short}: {pct}% ({}/{})",
                    self.current_sample, self.total_samples
                )
            }
            MetricStatus::Complete => format!("{short}: Done({})", self.score),
            MetricStatus::Failed => format!("{short}: Failed"),
        }
    }
}

struct ProgressState {
    metrics: HashMap<String, MetricProgress>,
    order: Vec<String>,
    total_tokens: u64,
    started: Instant,
    active: bool,
}

impl ProgressState {
    fn update(&mut self, id: &str, f: impl FnOnce(&mut MetricProgress)) {
        if let Some(metric) = self.metrics.get_mut(id) {
            f(metric);
        }
    }
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Thread-safe progress tracker shared by the metric runner.
pub struct EvalProgress {
    state: Arc<Mutex<ProgressState>>,
    writer: SharedWriter,
    interactive: bool,
    interval: Duration,
    cost_per_million: f64,
    stop_token: CancellationToken,
    render_task: Mutex<Option<JoinHandle<()>>>,
}

impl EvalProgress {
    /// Tracks `metrics` (id, name) in display order, rendering to stderr.
    pub fn new<I, S>(metrics: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let interactive = io::stderr().is_terminal();
        Self::with_writer(metrics, Box::new(io::stderr()), interactive)
    }

    /// Tracks every metric in `catalog`.
    pub fn for_metrics(catalog: &[Box<dyn Metric>]) -> Self {
        Self::new(catalog.iter().map(|m| (m.id(), m.name())))
    }

    pub fn with_writer<I, S>(metrics: I, writer: Box<dyn Write + Send>, interactive: bool) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let mut order = Vec::new();
        let mut table = HashMap::new();
        for (id, name) in metrics {
            let id = id.as_ref();
            order.push(id.to_string());
            table.insert(id.to_string(), MetricProgress::pending(id, name.as_ref()));
        }
        Self {
            state: Arc::new(Mutex::new(ProgressState {
                metrics: table,
                order,
                total_tokens: 0,
                started: Instant::now(),
                active: false,
            })),
            writer: Arc::new(Mutex::new(writer)),
            interactive,
            interval: DEFAULT_RENDER_INTERVAL,
            cost_per_million: DEFAULT_COST_PER_MILLION_TOKENS,
            stop_token: CancellationToken::new(),
            render_task: Mutex::new(None),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.interval = interval;
        }
        self
    }

    pub fn with_cost_rate(mut self, cost_per_million: f64) -> Self {
        self.cost_per_million = cost_per_million;
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Starts the render loop. No-op when not interactive or already started.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        if !self.interactive {
            return;
        }
        {
            let mut state = lock(&self.state);
            if state.active || self.stop_token.is_cancelled() {
                return;
            }
            state.active = true;
            state.started = Instant::now();
        }

        let state = self.state.clone();
        let writer = self.writer.clone();
        let token = self.stop_token.clone();
        let period = self.interval;
        let rate = self.cost_per_million;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let line = {
                            let state = lock(&state);
                            if !state.active {
                                continue;
                            }
                            render_line(&state, rate)
                        };
                        let mut out = lock(&writer);
                        let _ = write!(out, "{:<width$}", line, width = LINE_WIDTH);
                        let _ = out.flush();
                    }
                }
            }
        });
        *lock(&self.render_task) = Some(handle);
    }

    /// Stops the render loop, clears the line and prints a summary.
    ///
    /// Idempotent; a no-op when not interactive.
    pub async fn stop(&self) {
        if !self.interactive {
            return;
        }
        let summary = {
            let mut state = lock(&self.state);
            if !state.active {
                return;
            }
            state.active = false;
            summary_line(&state, self.cost_per_million)
        };
        self.stop_token.cancel();
        let handle = lock(&self.render_task).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        let mut out = lock(&self.writer);
        let _ = write!(out, "\r\x1b[K{}\n", summary);
        let _ = out.flush();
    }

    pub fn set_running(&self, id: &str, total_samples: usize) {
        lock(&self.state).update(id, |m| {
            m.status = MetricStatus::Running;
            m.total_samples = total_samples;
            m.current_sample = 0;
        });
    }

    pub fn set_sample(&self, id: &str, current: usize) {
        lock(&self.state).update(id, |m| m.current_sample = current);
    }

    pub fn set_complete(&self, id: &str, score: i32) {
        lock(&self.state).update(id, |m| {
            m.status = MetricStatus::Complete;
            m.score = score;
        });
    }

    pub fn set_failed(&self, id: &str, error: &str) {
        lock(&self.state).update(id, |m| {
            m.status = MetricStatus::Failed;
            m.error = Some(error.to_string());
        });
    }

    pub fn add_tokens(&self, tokens: u64) {
        lock(&self.state).total_tokens += tokens;
    }

    pub fn total_tokens(&self) -> u64 {
        lock(&self.state).total_tokens
    }

    /// Copy of one metric's state.
    pub fn metric(&self, id: &str) -> Option<MetricProgress> {
        lock(&self.state).metrics.get(id).cloned()
    }

    /// The status line as it would be drawn now, without the carriage return.
    pub fn status_line(&self) -> String {
        let state = lock(&self.state);
        render_line(&state, self.cost_per_million)
            .trim_start_matches('\r')
            .to_string()
    }
}

impl SampleObserver for EvalProgress {
    fn on_sample(&self, metric_id: &str, current: usize) {
        self.set_sample(metric_id, current);
    }
}

impl Drop for EvalProgress {
    fn drop(&mut self) {
        self.stop_token.cancel();
    }
}

fn estimated_cost(tokens: u64, per_million: f64) -> f64 {
    tokens as f64 / 1_000_000.0 * per_million
}

fn render_line(state: &ProgressState, per_million: f64) -> String {
    let parts: Vec<String> = state
        .order
        .iter()
        .filter_map(|id| state.metrics.get(id))
        .map(MetricProgress::render)
        .collect();
    format!(
        "\rC7 progress [{}]: {} | Tokens: {} | Est. ${:.2}",
        format_elapsed(state.started.elapsed()),
        parts.join(" | "),
        format_tokens(state.total_tokens),
        estimated_cost(state.total_tokens, per_million)
    )
}

fn summary_line(state: &ProgressState, per_million: f64) -> String {
    format!(
        "C7 Evaluation complete in {} | Tokens: {} | Cost: ${:.2}",
        format_elapsed(state.started.elapsed()),
        format_tokens(state.total_tokens),
        estimated_cost(state.total_tokens, per_million)
    )
}

/// Whole seconds as `1h2m3s`, `2m3s` or `3s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = (elapsed.as_millis() + 500) / 1000;
    let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{s}s")
    }
}

/// `M1`..`M5` for the built-in metrics, otherwise the first two characters.
pub fn short_metric_id(id: &str) -> String {
    match id {
        TASK_EXECUTION_CONSISTENCY => "M1".to_string(),
        CODE_BEHAVIOR_COMPREHENSION => "M2".to_string(),
        CROSS_FILE_NAVIGATION => "M3".to_string(),
        IDENTIFIER_INTERPRETABILITY => "M4".to_string(),
        DOCUMENTATION_ACCURACY_DETECTION => "M5".to_string(),
        other => other.chars().take(2).collect(),
    }
}

/// Groups thousands with commas: `12345` becomes `12,345`.
pub fn format_tokens(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

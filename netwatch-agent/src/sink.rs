//! Report sinks
//!
//! The engine emits `ReportEvent`s in probe order; sinks own formatting and
//! persistence. `FileSink` never drops an event: when the file cannot be
//! written within its bound the event goes to the console instead.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::config::ReportFormat;
use crate::error::SinkError;
use crate::model::{ProbeResult, ProbeStatus};

pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EventBody {
    Probe(ProbeResult),
    Message { level: MessageLevel, text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEvent {
    #[serde(rename = "emitted_at")]
    pub timestamp: DateTime<Local>,
    #[serde(flatten)]
    pub body: EventBody,
}

impl ReportEvent {
    pub fn probe(result: ProbeResult) -> Self {
        Self {
            timestamp: result.timestamp,
            body: EventBody::Probe(result),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::message(MessageLevel::Info, text)
    }

    pub fn warn(text: impl Into<String>) -> Self {
        Self::message(MessageLevel::Warn, text)
    }

    fn message(level: MessageLevel, text: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            body: EventBody::Message { level, text: text.into() },
        }
    }
}

/// Destination for the report stream
#[async_trait]
pub trait ReportSink: Send {
    async fn emit(&mut self, event: &ReportEvent);
}

/// Plain single-line rendering, optionally followed by metrics
pub fn format_plain(event: &ReportEvent, with_metrics: bool) -> String {
    let ts = event.timestamp.format("%Y-%m-%d %H:%M:%S");
    match &event.body {
        EventBody::Probe(result) => {
            let mut line = format!(
                "[{}] {:<9} {:<28} {}",
                ts,
                format!("[{}]", result.status.tag()),
                result.probe_id.to_string(),
                result.message
            );
            if with_metrics && !result.metrics.is_empty() {
                let metrics: Vec<String> = result.metrics.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                line.push_str(&format!(" {{{}}}", metrics.join(" ")));
            }
            line
        }
        EventBody::Message { level: MessageLevel::Info, text } => format!("[{}] {}", ts, text),
        EventBody::Message { level: MessageLevel::Warn, text } => format!("[{}] WARNING: {}", ts, text),
    }
}

fn colored_tag(status: ProbeStatus) -> String {
    let tag = format!("{:<9}", format!("[{}]", status.tag()));
    match status {
        ProbeStatus::Ok => tag.green().to_string(),
        ProbeStatus::Degraded => tag.yellow().to_string(),
        ProbeStatus::Failed => tag.red().bold().to_string(),
        ProbeStatus::Skipped => tag.blue().to_string(),
    }
}

/// Coloured terminal output on stdout
#[derive(Debug, Clone, Default)]
pub struct ConsoleSink {
    pub show_metrics: bool,
}

impl ConsoleSink {
    pub fn new(show_metrics: bool) -> Self {
        Self { show_metrics }
    }

    pub fn render(&self, event: &ReportEvent) -> String {
        let ts = event.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
        match &event.body {
            EventBody::Probe(result) => {
                let mut line = format!(
                    "[{}] {} {:<28} {}",
                    ts.dimmed(),
                    colored_tag(result.status),
                    result.probe_id.to_string(),
                    result.message
                );
                if self.show_metrics && !result.metrics.is_empty() {
                    let metrics: Vec<String> =
                        result.metrics.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                    line.push_str(&format!(" {}", format!("{{{}}}", metrics.join(" ")).dimmed()));
                }
                line
            }
            EventBody::Message { level: MessageLevel::Info, text } => format!("[{}] {}", ts.dimmed(), text.bold()),
            EventBody::Message { level: MessageLevel::Warn, text } => {
                format!("[{}] {}", ts.dimmed(), format!("WARNING: {}", text).yellow())
            }
        }
    }
}

#[async_trait]
impl ReportSink for ConsoleSink {
    async fn emit(&mut self, event: &ReportEvent) {
        println!("{}", self.render(event));
    }
}

/// Append-only log file with a bounded write and console fallback
pub struct FileSink {
    path: PathBuf,
    format: ReportFormat,
    with_metrics: bool,
    write_timeout: Duration,
    fallback: Option<Box<dyn ReportSink + Sync>>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>, format: ReportFormat, with_metrics: bool) -> Self {
        Self {
            path: path.into(),
            format,
            with_metrics,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            fallback: Some(Box::new(ConsoleSink::new(with_metrics))),
        }
    }

    /// Send events that could not be written to `sink` instead of the console
    pub fn with_fallback(mut self, sink: impl ReportSink + Sync + 'static) -> Self {
        self.fallback = Some(Box::new(sink));
        self
    }

    /// Only log write failures; for when another sink already shows every event
    pub fn without_fallback(mut self) -> Self {
        self.fallback = None;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(&self, event: &ReportEvent) -> Result<String, SinkError> {
        let mut line = match self.format {
            ReportFormat::Text => format_plain(event, self.with_metrics),
            ReportFormat::Json => serde_json::to_string(event)?,
        };
        line.push('\n');
        Ok(line)
    }

    async fn append(&self, line: &str) -> Result<(), SinkError> {
        let io_err = |source| SinkError::Io {
            path: self.path.display().to_string(),
            source,
        };

        let write = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .map_err(io_err)?;
            file.write_all(line.as_bytes()).await.map_err(io_err)?;
            file.flush().await.map_err(io_err)
        };

        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout {
                path: self.path.display().to_string(),
                timeout: self.write_timeout,
            }),
        }
    }

    /// Write one event to the file, reporting the failure instead of falling back
    pub async fn try_emit(&self, event: &ReportEvent) -> Result<(), SinkError> {
        let line = self.encode(event)?;
        self.append(&line).await
    }
}

#[async_trait]
impl ReportSink for FileSink {
    async fn emit(&mut self, event: &ReportEvent) {
        if let Err(e) = self.try_emit(event).await {
            match self.fallback.as_mut() {
                Some(fallback) => {
                    warn!("Report sink failure, using fallback output: {}", e);
                    fallback.emit(event).await;
                }
                None => warn!("Report sink failure: {}", e),
            }
        }
    }
}

/// Forwards every event to each inner sink, in order
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn ReportSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, sink: impl ReportSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl ReportSink for FanoutSink {
    async fn emit(&mut self, event: &ReportEvent) {
        for sink in self.sinks.iter_mut() {
            sink.emit(event).await;
        }
    }
}

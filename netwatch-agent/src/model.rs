//! Data model shared by every probe
//!
//! - `ProbeResult`: the envelope each executor returns
//! - `BandwidthSample`: the only state carried from one cycle to the next
//! - `CycleSummary` / `SessionStats`: status counts for one cycle and the whole run

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which diagnostic produced a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "probe", rename_all = "snake_case")]
pub enum ProbeId {
    Ping { host: String, size: u32 },
    DnsLookup { domain: String },
    AltDnsLookup { server: String },
    DnsServerReachability { server: String },
    HttpCheck { url: String },
    InterfaceStatus,
    Gateway,
    FirstHop,
    WifiSignal,
    RouterLog,
    MtuSweep { size: u32 },
    SpeedTest,
    Traceroute { host: String },
    Bandwidth,
}

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeId::Ping { host, size } => write!(f, "ping {}/{}B", host, size),
            ProbeId::DnsLookup { domain } => write!(f, "dns {}", domain),
            ProbeId::AltDnsLookup { server } => write!(f, "dns @{}", server),
            ProbeId::DnsServerReachability { server } => write!(f, "dns-server {}", server),
            ProbeId::HttpCheck { url } => write!(f, "http {}", url),
            ProbeId::InterfaceStatus => write!(f, "interfaces"),
            ProbeId::Gateway => write!(f, "gateway"),
            ProbeId::FirstHop => write!(f, "first-hop"),
            ProbeId::WifiSignal => write!(f, "wifi"),
            ProbeId::RouterLog => write!(f, "router-log"),
            ProbeId::MtuSweep { size } => write!(f, "mtu {}B", size),
            ProbeId::SpeedTest => write!(f, "speedtest"),
            ProbeId::Traceroute { host } => write!(f, "traceroute {}", host),
            ProbeId::Bandwidth => write!(f, "bandwidth"),
        }
    }
}

/// Severity of a probe outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Ok,
    Degraded,
    Failed,
    Skipped,
}

impl ProbeStatus {
    pub fn tag(&self) -> &'static str {
        match self {
            ProbeStatus::Ok => "OK",
            ProbeStatus::Degraded => "DEGRADED",
            ProbeStatus::Failed => "FAILED",
            ProbeStatus::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Single measured value attached to a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{}", n),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Number(v)
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        MetricValue::Number(v as f64)
    }
}

impl From<usize> for MetricValue {
    fn from(v: usize) -> Self {
        MetricValue::Number(v as f64)
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

/// Outcome of one probe invocation. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub probe_id: ProbeId,
    pub status: ProbeStatus,
    pub metrics: BTreeMap<String, MetricValue>,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

impl ProbeResult {
    pub fn new(probe_id: ProbeId, status: ProbeStatus, message: impl Into<String>) -> Self {
        Self {
            probe_id,
            status,
            metrics: BTreeMap::new(),
            message: message.into(),
            timestamp: Local::now(),
        }
    }

    pub fn with_metric(mut self, name: &str, value: impl Into<MetricValue>) -> Self {
        self.metrics.insert(name.to_string(), value.into());
        self
    }

    pub fn metric(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }
}

/// Cumulative interface counters captured at one instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandwidthSample {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub sampled_at: DateTime<Local>,
}

/// Status counts for a single cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleSummary {
    pub ok: u32,
    pub degraded: u32,
    pub failed: u32,
    pub skipped: u32,
    /// Cycle stopped early because of a cancellation request
    pub interrupted: bool,
}

impl CycleSummary {
    pub fn record(&mut self, status: ProbeStatus) {
        match status {
            ProbeStatus::Ok => self.ok += 1,
            ProbeStatus::Degraded => self.degraded += 1,
            ProbeStatus::Failed => self.failed += 1,
            ProbeStatus::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.ok + self.degraded + self.failed + self.skipped
    }
}

impl fmt::Display for CycleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ok, {} degraded, {} failed, {} skipped",
            self.ok, self.degraded, self.failed, self.skipped
        )?;
        if self.interrupted {
            f.write_str(" (interrupted)")?;
        }
        Ok(())
    }
}

/// Counters accumulated across the whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStats {
    pub cycles: u64,
    pub totals: CycleSummary,
    /// Cycles in a row with at least one failed probe
    pub consecutive_failed_cycles: u64,
}

impl SessionStats {
    pub fn absorb(&mut self, summary: &CycleSummary) {
        self.cycles += 1;
        self.totals.ok += summary.ok;
        self.totals.degraded += summary.degraded;
        self.totals.failed += summary.failed;
        self.totals.skipped += summary.skipped;

        if summary.failed > 0 {
            self.consecutive_failed_cycles += 1;
        } else {
            self.consecutive_failed_cycles = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = CycleSummary::default();
        summary.record(ProbeStatus::Ok);
        summary.record(ProbeStatus::Ok);
        summary.record(ProbeStatus::Failed);
        summary.record(ProbeStatus::Skipped);
        assert_eq!(summary.ok, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total(), 4);
        assert_eq!(summary.to_string(), "2 ok, 0 degraded, 1 failed, 1 skipped");
    }

    #[test]
    fn test_session_consecutive_failures() {
        let mut stats = SessionStats::default();
        let failing = CycleSummary { failed: 2, ..Default::default() };
        let clean = CycleSummary { ok: 5, ..Default::default() };

        stats.absorb(&failing);
        stats.absorb(&failing);
        assert_eq!(stats.consecutive_failed_cycles, 2);

        stats.absorb(&clean);
        assert_eq!(stats.consecutive_failed_cycles, 0);
        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.totals.failed, 4);
    }

    #[test]
    fn test_probe_id_labels() {
        let id = ProbeId::Ping { host: "8.8.8.8".into(), size: 56 };
        assert_eq!(id.to_string(), "ping 8.8.8.8/56B");
        assert_eq!(ProbeId::MtuSweep { size: 1472 }.to_string(), "mtu 1472B");
    }

    #[test]
    fn test_result_serializes_status_lowercase() {
        let result = ProbeResult::new(ProbeId::Gateway, ProbeStatus::Degraded, "10% packet loss")
            .with_metric("packet_loss_pct", 10.0);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["probe_id"]["probe"], "gateway");
        assert_eq!(json["metrics"]["packet_loss_pct"], 10.0);
    }
}

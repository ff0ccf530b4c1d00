//! Measurement collaborators
//!
//! The probe engine never talks to the operating system directly. Every raw
//! measurement goes through the `Collaborator` trait, one method per
//! measurement kind. `SystemCollaborator` is the production implementation
//! (subprocesses, /proc, /sys, sysinfo, reqwest); tests plug in a mock.

pub mod parse;
pub mod system;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use crate::error::ProbeError;
use crate::model::BandwidthSample;

pub use system::SystemCollaborator;

/// Parameters for one echo measurement
#[derive(Debug, Clone, PartialEq)]
pub struct ReachabilityRequest {
    pub host: String,
    pub packet_size: u32,
    pub count: u32,
    pub timeout: Duration,
    /// Forbid fragmentation (used by the MTU sweep)
    pub dont_fragment: bool,
}

/// Round-trip statistics in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
}

impl fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.min_ms, self.avg_ms, self.max_ms)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReachabilityReport {
    pub loss_pct: f64,
    pub latency: Option<LatencyStats>,
    /// Error text when the tool reported a failure alongside its output
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DnsAnswer {
    pub addresses: Vec<IpAddr>,
    pub error: Option<String>,
}

/// HTTP status as observed; `code == 0` means no response at all
#[derive(Debug, Clone, PartialEq)]
pub struct HttpStatus {
    pub code: u16,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkInterface {
    pub name: String,
    pub state: String,
}

impl LinkInterface {
    pub fn is_up(&self) -> bool {
        self.state.eq_ignore_ascii_case("up")
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinkState {
    pub interfaces: Vec<LinkInterface>,
}

/// Hops of a path trace; `None` is a hop that did not answer
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PathTrace {
    pub hops: Vec<Option<IpAddr>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WifiSignal {
    pub dbm: i32,
    pub frequency_mhz: Option<u32>,
    pub channel: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThroughputReport {
    pub tool: String,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: Option<f64>,
    pub raw_output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InterfaceCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// One method per measurement kind. Implementations should honour the
/// timeouts they are given; executors enforce their own bound regardless.
#[async_trait]
pub trait Collaborator: Send + Sync {
    async fn measure_reachability(
        &self,
        request: &ReachabilityRequest,
    ) -> Result<ReachabilityReport, ProbeError>;

    async fn resolve_dns(
        &self,
        server: Option<&str>,
        hostname: &str,
        timeout: Duration,
    ) -> Result<DnsAnswer, ProbeError>;

    async fn fetch_http_status(&self, url: &str, timeout: Duration) -> Result<HttpStatus, ProbeError>;

    async fn read_link_state(&self) -> Result<LinkState, ProbeError>;

    async fn read_default_gateway(&self) -> Result<Option<IpAddr>, ProbeError>;

    async fn trace_path(
        &self,
        host: &str,
        max_hops: u32,
        timeout: Duration,
    ) -> Result<PathTrace, ProbeError>;

    /// `Ok(None)` when there is no wireless interface or no signal reading
    async fn read_wifi_signal(&self, interface: Option<&str>) -> Result<Option<WifiSignal>, ProbeError>;

    async fn read_system_log_tail(&self, filter: &[String], count: usize) -> Result<Vec<String>, ProbeError>;

    async fn measure_throughput(&self, tool_preference: &[String]) -> Result<ThroughputReport, ProbeError>;

    async fn read_interface_counters(&self) -> Result<InterfaceCounters, ProbeError>;

    async fn load_bandwidth_sample(&self) -> Result<Option<BandwidthSample>, ProbeError>;

    async fn store_bandwidth_sample(&self, sample: &BandwidthSample) -> Result<(), ProbeError>;
}

/*!
Scripted collaborator for exercising the probe engine without a network

Every measurement answers with a healthy default unless a test overrides
it. Failures, stalls, panics and a shutdown trigger can be attached to any
measurement kind, and every call is recorded in order.
*/

use async_trait::async_trait;
use chrono::Local;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use netwatch_agent::collaborator::{
    Collaborator, DnsAnswer, HttpStatus, InterfaceCounters, LatencyStats, LinkInterface, LinkState, PathTrace,
    ReachabilityReport, ReachabilityRequest, ThroughputReport, WifiSignal,
};
use netwatch_agent::error::ProbeError;
use netwatch_agent::model::BandwidthSample;
use netwatch_agent::ShutdownTrigger;

/// Measurement kinds, one per collaborator method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measurement {
    Reachability,
    Dns,
    Http,
    LinkState,
    Gateway,
    Trace,
    Wifi,
    SystemLog,
    Throughput,
    Counters,
}

pub const MOCK_GATEWAY: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1));
pub const MOCK_FIRST_HOP: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));

#[derive(Debug, Clone, PartialEq)]
pub struct ReachabilityCall {
    pub host: String,
    pub packet_size: u32,
    pub count: u32,
    pub dont_fragment: bool,
}

struct Script {
    reachability: HashMap<String, Result<ReachabilityReport, ProbeError>>,
    dns: Result<DnsAnswer, ProbeError>,
    http: Result<HttpStatus, ProbeError>,
    link: Result<LinkState, ProbeError>,
    gateway: Option<IpAddr>,
    trace: Option<PathTrace>,
    wifi: Option<WifiSignal>,
    logs: Vec<String>,
    throughput: Result<ThroughputReport, ProbeError>,
    counters: InterfaceCounters,
    stored: Option<BandwidthSample>,

    failures: HashMap<Measurement, ProbeError>,
    stalls: HashMap<Measurement, Duration>,
    panics: Vec<Measurement>,
    cancel_on: Option<(Measurement, ShutdownTrigger)>,

    calls: Vec<Measurement>,
    pings: Vec<ReachabilityCall>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            reachability: HashMap::new(),
            dns: Ok(DnsAnswer {
                addresses: vec![IpAddr::V4(Ipv4Addr::new(142, 250, 74, 46))],
                error: None,
            }),
            http: Ok(HttpStatus { code: 200, error: None }),
            link: Ok(LinkState {
                interfaces: vec![LinkInterface {
                    name: "eth0".to_string(),
                    state: "up".to_string(),
                }],
            }),
            gateway: Some(MOCK_GATEWAY),
            trace: None,
            wifi: Some(WifiSignal {
                dbm: -45,
                frequency_mhz: Some(5180),
                channel: Some(36),
            }),
            logs: Vec::new(),
            throughput: Ok(ThroughputReport {
                tool: "speedtest-cli".to_string(),
                download_mbps: 94.2,
                upload_mbps: 18.7,
                ping_ms: Some(12.0),
                raw_output: String::new(),
            }),
            counters: InterfaceCounters {
                rx_bytes: 1_000_000,
                tx_bytes: 250_000,
            },
            stored: None,
            failures: HashMap::new(),
            stalls: HashMap::new(),
            panics: Vec::new(),
            cancel_on: None,
            calls: Vec::new(),
            pings: Vec::new(),
        }
    }
}

pub fn healthy_report() -> ReachabilityReport {
    ReachabilityReport {
        loss_pct: 0.0,
        latency: Some(LatencyStats {
            min_ms: 11.2,
            avg_ms: 12.5,
            max_ms: 14.9,
        }),
        error: None,
    }
}

/// Cloneable handle; clones share one script
#[derive(Clone, Default)]
pub struct MockCollaborator {
    script: Arc<Mutex<Script>>,
}

impl MockCollaborator {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        // a panic injected by a test may have poisoned the lock
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_reachability(self, host: &str, report: Result<ReachabilityReport, ProbeError>) -> Self {
        self.script().reachability.insert(host.to_string(), report);
        self
    }

    pub fn with_dns(self, answer: Result<DnsAnswer, ProbeError>) -> Self {
        self.script().dns = answer;
        self
    }

    pub fn with_http_code(self, code: u16) -> Self {
        self.script().http = Ok(HttpStatus { code, error: None });
        self
    }

    pub fn with_link_state(self, link: Result<LinkState, ProbeError>) -> Self {
        self.script().link = link;
        self
    }

    pub fn with_gateway(self, gateway: Option<IpAddr>) -> Self {
        self.script().gateway = gateway;
        self
    }

    pub fn with_trace(self, trace: PathTrace) -> Self {
        self.script().trace = Some(trace);
        self
    }

    pub fn with_wifi(self, signal: Option<WifiSignal>) -> Self {
        self.script().wifi = signal;
        self
    }

    pub fn with_log_lines(self, lines: &[&str]) -> Self {
        self.script().logs = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn with_throughput(self, report: Result<ThroughputReport, ProbeError>) -> Self {
        self.script().throughput = report;
        self
    }

    pub fn with_counters(self, rx_bytes: u64, tx_bytes: u64) -> Self {
        self.script().counters = InterfaceCounters { rx_bytes, tx_bytes };
        self
    }

    pub fn with_stored_sample(self, sample: BandwidthSample) -> Self {
        self.script().stored = Some(sample);
        self
    }

    /// Every call of this kind returns `err`
    pub fn failing(self, measurement: Measurement, err: ProbeError) -> Self {
        self.script().failures.insert(measurement, err);
        self
    }

    /// Every call of this kind sleeps before answering
    pub fn stalling(self, measurement: Measurement, delay: Duration) -> Self {
        self.script().stalls.insert(measurement, delay);
        self
    }

    /// Every call of this kind panics
    pub fn panicking(self, measurement: Measurement) -> Self {
        self.script().panics.push(measurement);
        self
    }

    /// Request shutdown the first time this kind is called
    pub fn cancelling_on(self, measurement: Measurement, trigger: ShutdownTrigger) -> Self {
        self.script().cancel_on = Some((measurement, trigger));
        self
    }

    pub fn calls(&self) -> Vec<Measurement> {
        self.script().calls.clone()
    }

    pub fn call_count(&self, measurement: Measurement) -> usize {
        self.script().calls.iter().filter(|m| **m == measurement).count()
    }

    pub fn pings(&self) -> Vec<ReachabilityCall> {
        self.script().pings.clone()
    }

    pub fn stored_sample(&self) -> Option<BandwidthSample> {
        self.script().stored
    }

    /// Record the call and apply any injected behaviour
    async fn enter(&self, measurement: Measurement) -> Result<(), ProbeError> {
        let (stall, panics, failure) = {
            let mut script = self.script();
            script.calls.push(measurement);
            log::debug!("[MOCK] {:?}", measurement);

            if matches!(&script.cancel_on, Some((m, _)) if *m == measurement) {
                if let Some((_, trigger)) = script.cancel_on.take() {
                    trigger.trigger();
                }
            }
            (
                script.stalls.get(&measurement).copied(),
                script.panics.contains(&measurement),
                script.failures.get(&measurement).cloned(),
            )
        };

        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        if panics {
            panic!("injected panic in {:?}", measurement);
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Collaborator for MockCollaborator {
    async fn measure_reachability(&self, request: &ReachabilityRequest) -> Result<ReachabilityReport, ProbeError> {
        self.script().pings.push(ReachabilityCall {
            host: request.host.clone(),
            packet_size: request.packet_size,
            count: request.count,
            dont_fragment: request.dont_fragment,
        });
        self.enter(Measurement::Reachability).await?;
        let script = self.script();
        match script.reachability.get(&request.host) {
            Some(report) => report.clone(),
            None => Ok(healthy_report()),
        }
    }

    async fn resolve_dns(&self, _server: Option<&str>, _hostname: &str, _timeout: Duration) -> Result<DnsAnswer, ProbeError> {
        self.enter(Measurement::Dns).await?;
        self.script().dns.clone()
    }

    async fn fetch_http_status(&self, _url: &str, _timeout: Duration) -> Result<HttpStatus, ProbeError> {
        self.enter(Measurement::Http).await?;
        self.script().http.clone()
    }

    async fn read_link_state(&self) -> Result<LinkState, ProbeError> {
        self.enter(Measurement::LinkState).await?;
        self.script().link.clone()
    }

    async fn read_default_gateway(&self) -> Result<Option<IpAddr>, ProbeError> {
        self.enter(Measurement::Gateway).await?;
        Ok(self.script().gateway)
    }

    async fn trace_path(&self, host: &str, max_hops: u32, _timeout: Duration) -> Result<PathTrace, ProbeError> {
        self.enter(Measurement::Trace).await?;
        let script = self.script();
        let mut trace = match &script.trace {
            Some(trace) => trace.clone(),
            None => {
                let mut hops = vec![script.gateway.or(Some(MOCK_GATEWAY)), Some(MOCK_FIRST_HOP)];
                if let Ok(target) = host.parse::<IpAddr>() {
                    hops.push(Some(target));
                }
                PathTrace { hops }
            }
        };
        trace.hops.truncate(max_hops as usize);
        Ok(trace)
    }

    async fn read_wifi_signal(&self, _interface: Option<&str>) -> Result<Option<WifiSignal>, ProbeError> {
        self.enter(Measurement::Wifi).await?;
        Ok(self.script().wifi)
    }

    async fn read_system_log_tail(&self, _filter: &[String], count: usize) -> Result<Vec<String>, ProbeError> {
        self.enter(Measurement::SystemLog).await?;
        let script = self.script();
        let skip = script.logs.len().saturating_sub(count);
        Ok(script.logs[skip..].to_vec())
    }

    async fn measure_throughput(&self, _tool_preference: &[String]) -> Result<ThroughputReport, ProbeError> {
        self.enter(Measurement::Throughput).await?;
        self.script().throughput.clone()
    }

    async fn read_interface_counters(&self) -> Result<InterfaceCounters, ProbeError> {
        self.enter(Measurement::Counters).await?;
        Ok(self.script().counters)
    }

    async fn load_bandwidth_sample(&self) -> Result<Option<BandwidthSample>, ProbeError> {
        Ok(self.script().stored)
    }

    async fn store_bandwidth_sample(&self, sample: &BandwidthSample) -> Result<(), ProbeError> {
        self.script().stored = Some(*sample);
        Ok(())
    }
}

/// Sample taken `secs_ago` seconds before now
pub fn sample_from(rx_bytes: u64, tx_bytes: u64, secs_ago: i64) -> BandwidthSample {
    BandwidthSample {
        rx_bytes,
        tx_bytes,
        sampled_at: Local::now() - chrono::Duration::seconds(secs_ago),
    }
}

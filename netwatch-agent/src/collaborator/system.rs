//! Production collaborator backed by the host system
//!
//! Uses:
//! - `ping`, `traceroute`, `dig`/`nslookup`, `iw`, `journalctl`/`dmesg`,
//!   `speedtest-cli`/`speedtest` through `tokio::process` with a timeout
//! - `/proc/net/route`, `/proc/net/wireless`, `/sys/class/net` when present
//! - `reqwest` for the HTTP status check
//! - `sysinfo` for interface byte counters

use async_trait::async_trait;
use chrono::{DateTime, Local};
use if_addrs::get_if_addrs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use sysinfo::Networks;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, warn};

use super::parse;
use super::{
    Collaborator, DnsAnswer, HttpStatus, InterfaceCounters, LinkInterface, LinkState, PathTrace,
    ReachabilityReport, ReachabilityRequest, ThroughputReport, WifiSignal,
};
use crate::error::ProbeError;
use crate::model::BandwidthSample;

const SYS_CLASS_NET: &str = "/sys/class/net";
const PROC_NET_ROUTE: &str = "/proc/net/route";
const PROC_NET_WIRELESS: &str = "/proc/net/wireless";
const LOG_SCAN_LINES: usize = 500;
const THROUGHPUT_TIMEOUT: Duration = Duration::from_secs(120);
const TOOL_TIMEOUT: Duration = Duration::from_secs(10);

/// Collaborator that measures through the local operating system
pub struct SystemCollaborator {
    bandwidth_state: PathBuf,
    http: reqwest::Client,
}

impl SystemCollaborator {
    pub fn new(bandwidth_state: impl Into<PathBuf>) -> Self {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("netwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self {
            bandwidth_state: bandwidth_state.into(),
            http,
        }
    }

    /// Run a tool with a bound; a missing binary maps to `ToolUnavailable`
    async fn run_tool(program: &str, args: &[String], timeout: Duration) -> Result<Output, ProbeError> {
        debug!("Running {} {:?} (timeout: {}s)", program, args, timeout.as_secs());

        let child = AsyncCommand::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ProbeError::unavailable(format!("{} not installed", program)))
            }
            Ok(Err(e)) => Err(ProbeError::execution(format!("{}: {}", program, e))),
            Err(_) => Err(ProbeError::Timeout(timeout)),
        }
    }

    fn stderr_line(output: &Output) -> String {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let line = stderr.lines().next().unwrap_or("").trim();
        if line.is_empty() {
            format!("exit code {}", output.status.code().unwrap_or(-1))
        } else {
            line.to_string()
        }
    }

    async fn resolve_with_system(hostname: &str, timeout: Duration) -> Result<DnsAnswer, ProbeError> {
        match tokio::time::timeout(timeout, tokio::net::lookup_host((hostname, 0))).await {
            Ok(Ok(addrs)) => Ok(DnsAnswer {
                addresses: addrs.map(|a| a.ip()).collect(),
                error: None,
            }),
            Ok(Err(e)) => Ok(DnsAnswer {
                addresses: Vec::new(),
                error: Some(e.to_string()),
            }),
            Err(_) => Err(ProbeError::Timeout(timeout)),
        }
    }

    async fn resolve_with_server(server: &str, hostname: &str, timeout: Duration) -> Result<DnsAnswer, ProbeError> {
        let secs = timeout.as_secs().max(1);
        let dig_args = vec![
            "+short".to_string(),
            format!("+time={}", secs),
            "+tries=1".to_string(),
            format!("@{}", server),
            hostname.to_string(),
        ];
        // dig's own timer can overrun slightly
        let bound = timeout + Duration::from_secs(1);

        match Self::run_tool("dig", &dig_args, bound).await {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let addresses = parse::parse_dig_short(&stdout);
                let error = if addresses.is_empty() {
                    Some(stdout.lines().next().unwrap_or("empty answer").to_string())
                } else {
                    None
                };
                Ok(DnsAnswer { addresses, error })
            }
            Err(ProbeError::ToolUnavailable(_)) => {
                let args = vec![format!("-timeout={}", secs), hostname.to_string(), server.to_string()];
                let output = Self::run_tool("nslookup", &args, bound).await?;
                let addresses = parse::parse_nslookup(&String::from_utf8_lossy(&output.stdout));
                let error = (!output.status.success()).then(|| Self::stderr_line(&output));
                Ok(DnsAnswer { addresses, error })
            }
            Err(e) => Err(e),
        }
    }

    fn read_sys_class_net(root: &Path) -> std::io::Result<Vec<LinkInterface>> {
        let mut interfaces = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name == "lo" {
                continue;
            }
            let state = std::fs::read_to_string(entry.path().join("operstate"))
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            interfaces.push(LinkInterface { name, state });
        }
        interfaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(interfaces)
    }

    /// Interfaces with an address count as up when /sys is not available
    fn read_if_addrs() -> Result<Vec<LinkInterface>, ProbeError> {
        let addrs = get_if_addrs().map_err(|e| ProbeError::execution(format!("interface enumeration: {}", e)))?;
        let mut interfaces: Vec<LinkInterface> = Vec::new();
        for addr in addrs.into_iter().filter(|a| !a.is_loopback()) {
            if interfaces.iter().all(|i| i.name != addr.name) {
                interfaces.push(LinkInterface {
                    name: addr.name,
                    state: "up".to_string(),
                });
            }
        }
        Ok(interfaces)
    }

    /// First wireless interface, preferring the kernel's `wireless` marker over name patterns
    fn detect_wireless_interface() -> Option<String> {
        let entries = std::fs::read_dir(SYS_CLASS_NET).ok()?;
        let mut names: Vec<(String, bool)> = entries
            .filter_map(|e| e.ok())
            .map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                let marked = e.path().join("wireless").exists();
                (name, marked)
            })
            .collect();
        names.sort();

        names
            .iter()
            .find(|(_, marked)| *marked)
            .or_else(|| names.iter().find(|(name, _)| name.starts_with("wl")))
            .map(|(name, _)| name.clone())
    }

    async fn run_throughput_tool(tool: &str) -> Result<ThroughputReport, ProbeError> {
        let (args, json) = match tool {
            "speedtest" => (vec!["--format=json".to_string(), "--accept-license".to_string()], true),
            _ => (vec!["--simple".to_string()], false),
        };

        let output = Self::run_tool(tool, &args, THROUGHPUT_TIMEOUT).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            return Err(ProbeError::execution(format!("{}: {}", tool, Self::stderr_line(&output))));
        }

        let parsed = if json {
            parse::parse_speedtest_json(&stdout)
        } else {
            parse::parse_speedtest_simple(&stdout)
        };
        let (ping_ms, download_mbps, upload_mbps) =
            parsed.ok_or_else(|| ProbeError::execution(format!("unrecognised {} output", tool)))?;

        Ok(ThroughputReport {
            tool: tool.to_string(),
            download_mbps,
            upload_mbps,
            ping_ms,
            raw_output: stdout,
        })
    }
}

#[async_trait]
impl Collaborator for SystemCollaborator {
    async fn measure_reachability(&self, request: &ReachabilityRequest) -> Result<ReachabilityReport, ProbeError> {
        let mut args = vec![
            "-c".to_string(),
            request.count.to_string(),
            "-s".to_string(),
            request.packet_size.to_string(),
            "-W".to_string(),
            "1".to_string(),
        ];
        if request.dont_fragment {
            args.push("-M".to_string());
            args.push("do".to_string());
        }
        args.push(request.host.clone());

        let output = Self::run_tool("ping", &args, request.timeout).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        match parse::parse_ping_output(&stdout) {
            Some((loss_pct, latency)) => {
                // exit code 1 only means "not every reply arrived"
                let error = match output.status.code() {
                    Some(0) | Some(1) => None,
                    _ => Some(Self::stderr_line(&output)),
                };
                Ok(ReachabilityReport { loss_pct, latency, error })
            }
            None => Err(ProbeError::execution(format!("ping {}: {}", request.host, Self::stderr_line(&output)))),
        }
    }

    async fn resolve_dns(&self, server: Option<&str>, hostname: &str, timeout: Duration) -> Result<DnsAnswer, ProbeError> {
        match server {
            None => Self::resolve_with_system(hostname, timeout).await,
            Some(server) => Self::resolve_with_server(server, hostname, timeout).await,
        }
    }

    async fn fetch_http_status(&self, url: &str, timeout: Duration) -> Result<HttpStatus, ProbeError> {
        match self.http.get(url).timeout(timeout).send().await {
            Ok(response) => Ok(HttpStatus {
                code: response.status().as_u16(),
                error: None,
            }),
            Err(e) => Ok(HttpStatus {
                code: 0,
                error: Some(if e.is_timeout() {
                    format!("timed out after {}s", timeout.as_secs())
                } else {
                    e.to_string()
                }),
            }),
        }
    }

    async fn read_link_state(&self) -> Result<LinkState, ProbeError> {
        let root = Path::new(SYS_CLASS_NET);
        let interfaces = if root.exists() {
            Self::read_sys_class_net(root)?
        } else {
            Self::read_if_addrs()?
        };
        Ok(LinkState { interfaces })
    }

    async fn read_default_gateway(&self) -> Result<Option<IpAddr>, ProbeError> {
        if let Ok(content) = tokio::fs::read_to_string(PROC_NET_ROUTE).await {
            if let Some(gw) = parse::parse_proc_net_route(&content) {
                return Ok(Some(IpAddr::V4(gw)));
            }
        }

        let args = vec!["route".to_string(), "show".to_string(), "default".to_string()];
        let output = Self::run_tool("ip", &args, TOOL_TIMEOUT).await?;
        Ok(parse::parse_ip_route_default(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn trace_path(&self, host: &str, max_hops: u32, timeout: Duration) -> Result<PathTrace, ProbeError> {
        let args = vec![
            "-n".to_string(),
            "-q".to_string(),
            "1".to_string(),
            "-w".to_string(),
            "1".to_string(),
            "-m".to_string(),
            max_hops.to_string(),
            host.to_string(),
        ];
        let output = Self::run_tool("traceroute", &args, timeout).await?;
        if !output.status.success() && output.stdout.is_empty() {
            return Err(ProbeError::execution(format!("traceroute {}: {}", host, Self::stderr_line(&output))));
        }
        Ok(parse::parse_traceroute(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn read_wifi_signal(&self, interface: Option<&str>) -> Result<Option<WifiSignal>, ProbeError> {
        let Some(iface) = interface.map(str::to_string).or_else(Self::detect_wireless_interface) else {
            return Ok(None);
        };

        let args = vec!["dev".to_string(), iface.clone(), "link".to_string()];
        match Self::run_tool("iw", &args, TOOL_TIMEOUT).await {
            Ok(output) if output.status.success() => {
                return Ok(parse::parse_iw_link(&String::from_utf8_lossy(&output.stdout)));
            }
            Ok(output) => debug!("iw failed on {}: {}", iface, Self::stderr_line(&output)),
            Err(ProbeError::ToolUnavailable(_)) => debug!("iw not installed, reading {}", PROC_NET_WIRELESS),
            Err(e) => return Err(e),
        }

        match tokio::fs::read_to_string(PROC_NET_WIRELESS).await {
            Ok(content) => Ok(parse::parse_proc_net_wireless(&content, Some(&iface)).map(|(_, dbm)| WifiSignal {
                dbm,
                frequency_mhz: None,
                channel: None,
            })),
            Err(_) => Ok(None),
        }
    }

    async fn read_system_log_tail(&self, filter: &[String], count: usize) -> Result<Vec<String>, ProbeError> {
        let journal_args = vec![
            "-n".to_string(),
            LOG_SCAN_LINES.to_string(),
            "--no-pager".to_string(),
            "-q".to_string(),
        ];
        let output = match Self::run_tool("journalctl", &journal_args, TOOL_TIMEOUT).await {
            Ok(output) if output.status.success() => output,
            Ok(_) | Err(ProbeError::ToolUnavailable(_)) => Self::run_tool("dmesg", &[], TOOL_TIMEOUT).await?,
            Err(e) => return Err(e),
        };
        if !output.status.success() {
            return Err(ProbeError::execution(format!("log read failed: {}", Self::stderr_line(&output))));
        }

        let lines: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect();
        Ok(parse::filter_log_lines(&lines, filter, count))
    }

    async fn measure_throughput(&self, tool_preference: &[String]) -> Result<ThroughputReport, ProbeError> {
        for tool in tool_preference {
            match Self::run_throughput_tool(tool).await {
                Err(ProbeError::ToolUnavailable(_)) => continue,
                other => return other,
            }
        }
        Err(ProbeError::unavailable(format!("none of {:?} installed", tool_preference)))
    }

    async fn read_interface_counters(&self) -> Result<InterfaceCounters, ProbeError> {
        let networks = Networks::new_with_refreshed_list();
        let mut counters = InterfaceCounters::default();
        for (name, data) in networks.iter() {
            if name == "lo" {
                continue;
            }
            counters.rx_bytes += data.total_received();
            counters.tx_bytes += data.total_transmitted();
        }
        Ok(counters)
    }

    async fn load_bandwidth_sample(&self) -> Result<Option<BandwidthSample>, ProbeError> {
        load_sample_file(&self.bandwidth_state).await
    }

    async fn store_bandwidth_sample(&self, sample: &BandwidthSample) -> Result<(), ProbeError> {
        store_sample_file(&self.bandwidth_state, sample).await
    }
}

/// Read `"<rx> <tx>"`; the file's modification time is the sample time
pub async fn load_sample_file(path: &Path) -> Result<Option<BandwidthSample>, ProbeError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ProbeError::execution(format!("{}: {}", path.display(), e))),
    };

    let values: Vec<u64> = content
        .split_whitespace()
        .filter_map(|v| v.parse::<u64>().ok())
        .collect();
    if values.len() != 2 {
        warn!("Ignoring malformed bandwidth state in {}", path.display());
        return Ok(None);
    }

    let modified = tokio::fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .map_err(|e| ProbeError::execution(format!("{}: {}", path.display(), e)))?;

    Ok(Some(BandwidthSample {
        rx_bytes: values[0],
        tx_bytes: values[1],
        sampled_at: DateTime::<Local>::from(modified),
    }))
}

pub async fn store_sample_file(path: &Path, sample: &BandwidthSample) -> Result<(), ProbeError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ProbeError::execution(format!("{}: {}", parent.display(), e)))?;
    }
    tokio::fs::write(path, format!("{} {}\n", sample.rx_bytes, sample.tx_bytes))
        .await
        .map_err(|e| ProbeError::execution(format!("{}: {}", path.display(), e)))
}

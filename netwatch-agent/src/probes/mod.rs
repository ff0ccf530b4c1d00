//! Probe executors
//!
//! One async function per diagnostic. Each wraps exactly one kind of
//! collaborator call, bounds it with its own timeout and turns whatever
//! happens into a `ProbeResult`. Executors never return an error: the
//! failure is carried in the result's status and message.
//!
//! Severity rules live here as plain functions so they can be checked in
//! isolation from any collaborator.

pub mod dns;
pub mod http;
pub mod link;
pub mod logs;
pub mod reachability;
pub mod throughput;

use std::future::Future;
use std::time::Duration;

use crate::error::ProbeError;
use crate::model::{ProbeId, ProbeResult, ProbeStatus};

pub use dns::{alt_dns_lookup, dns_lookup};
pub use http::http_check;
pub use link::{interface_status, wifi_signal};
pub use logs::router_log;
pub use reachability::{dns_server_reachability, first_hop, gateway, mtu_sweep, ping, traceroute};
pub use throughput::{bandwidth, compute_rate, speed_test};

/// Payload sizes tried by the MTU sweep, largest first
pub const MTU_SIZES: [u32; 4] = [1472, 1400, 1300, 1200];

/// HTTP codes counted as a healthy answer
pub const HEALTHY_HTTP_CODES: [u16; 3] = [200, 301, 302];

pub const DNS_TIMEOUT: Duration = Duration::from_secs(5);
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(5);
pub const LOCAL_READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const LOG_TIMEOUT: Duration = Duration::from_secs(10);
pub const FIRST_HOP_TRACE_TIMEOUT: Duration = Duration::from_secs(10);
pub const TRACEROUTE_TIMEOUT: Duration = Duration::from_secs(60);
pub const THROUGHPUT_TIMEOUT: Duration = Duration::from_secs(150);

/// Echo count for auxiliary pings (gateway, first hop, DNS server, MTU)
pub const AUX_PING_COUNT: u32 = 3;

/// Slack granted on top of the bound handed to the collaborator
const GRACE: Duration = Duration::from_secs(2);

/// Ping bound: one second per echo plus setup time
pub fn ping_timeout(count: u32) -> Duration {
    Duration::from_secs(u64::from(count) + 5)
}

/// `Ok` only at zero loss, `Failed` at total loss
pub fn classify_loss(loss_pct: f64) -> ProbeStatus {
    if loss_pct == 0.0 {
        ProbeStatus::Ok
    } else if loss_pct > 0.0 && loss_pct < 100.0 {
        ProbeStatus::Degraded
    } else {
        ProbeStatus::Failed
    }
}

pub fn classify_http(code: u16) -> ProbeStatus {
    if HEALTHY_HTTP_CODES.contains(&code) {
        ProbeStatus::Ok
    } else {
        ProbeStatus::Failed
    }
}

/// Linear dBm to percent mapping, clamped to [0, 100]
pub fn signal_quality(dbm: i32) -> u8 {
    if dbm >= -50 {
        100
    } else if dbm <= -100 {
        0
    } else {
        (2 * (dbm + 100)) as u8
    }
}

pub fn classify_wifi(quality: u8) -> ProbeStatus {
    match quality {
        70..=u8::MAX => ProbeStatus::Ok,
        40..=69 => ProbeStatus::Degraded,
        _ => ProbeStatus::Failed,
    }
}

/// Await a collaborator call, failing with `Timeout` once `bound` (plus grace) elapses
pub(crate) async fn bounded<T, F>(bound: Duration, call: F) -> Result<T, ProbeError>
where
    F: Future<Output = Result<T, ProbeError>>,
{
    let limit = bound + GRACE;
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(limit)),
    }
}

/// Result for a probe that ended with an error
pub(crate) fn error_result(probe_id: ProbeId, context: &str, err: &ProbeError) -> ProbeResult {
    ProbeResult::new(probe_id, err.status(), format!("{}: {}", context, err))
        .with_metric("error", err.to_string())
}

/// Format a percentage without a trailing `.0`
pub(crate) fn pct(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.1}", value)
    }
}

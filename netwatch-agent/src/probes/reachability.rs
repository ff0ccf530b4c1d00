//! Echo-based probes: ping, DNS server, gateway, first hop, MTU sweep, traceroute

use std::net::IpAddr;

use super::{bounded, classify_loss, error_result, pct, ping_timeout};
use super::{AUX_PING_COUNT, FIRST_HOP_TRACE_TIMEOUT, LOCAL_READ_TIMEOUT, MTU_SIZES, TRACEROUTE_TIMEOUT};
use crate::collaborator::{Collaborator, PathTrace, ReachabilityReport, ReachabilityRequest};
use crate::model::{ProbeId, ProbeResult, ProbeStatus};

/// Host used to find the hop right after the local router
pub const FIRST_HOP_TARGET: &str = "8.8.8.8";
const FIRST_HOP_MAX_HOPS: u32 = 2;
const TRACEROUTE_MAX_HOPS: u32 = 30;

fn request(host: &str, packet_size: u32, count: u32, dont_fragment: bool) -> ReachabilityRequest {
    ReachabilityRequest {
        host: host.to_string(),
        packet_size,
        count,
        timeout: ping_timeout(count),
        dont_fragment,
    }
}

/// Shape a reachability report into a result. `label` names the target in the message.
pub fn reachability_result(probe_id: ProbeId, label: &str, report: &ReachabilityReport) -> ProbeResult {
    let status = if report.error.is_some() {
        ProbeStatus::Failed
    } else {
        classify_loss(report.loss_pct)
    };

    let mut message = format!("{}: {}% packet loss", label, pct(report.loss_pct));
    if let Some(latency) = &report.latency {
        message.push_str(&format!(", rtt min/avg/max {} ms", latency));
    }
    if let Some(err) = &report.error {
        message.push_str(&format!(" ({})", err));
    }

    let mut result = ProbeResult::new(probe_id, status, message).with_metric("packet_loss_pct", report.loss_pct);
    if let Some(latency) = &report.latency {
        result = result
            .with_metric("latency_ms", latency.to_string())
            .with_metric("avg_latency_ms", latency.avg_ms);
    }
    result
}

async fn echo(collab: &dyn Collaborator, probe_id: ProbeId, label: &str, req: ReachabilityRequest) -> ProbeResult {
    match bounded(req.timeout, collab.measure_reachability(&req)).await {
        Ok(report) => reachability_result(probe_id, label, &report),
        Err(e) => error_result(probe_id, label, &e),
    }
}

pub async fn ping(collab: &dyn Collaborator, host: &str, size: u32, count: u32) -> ProbeResult {
    let probe_id = ProbeId::Ping { host: host.to_string(), size };
    let label = format!("{} ({} bytes)", host, size);
    echo(collab, probe_id, &label, request(host, size, count, false)).await
}

pub async fn dns_server_reachability(collab: &dyn Collaborator, server: &str) -> ProbeResult {
    let probe_id = ProbeId::DnsServerReachability { server: server.to_string() };
    let label = format!("DNS server {}", server);
    echo(collab, probe_id, &label, request(server, 56, AUX_PING_COUNT, false)).await
}

pub async fn gateway(collab: &dyn Collaborator) -> ProbeResult {
    let address = match bounded(LOCAL_READ_TIMEOUT, collab.read_default_gateway()).await {
        Ok(Some(address)) => address,
        Ok(None) => return ProbeResult::new(ProbeId::Gateway, ProbeStatus::Failed, "no default gateway configured"),
        Err(e) => return error_result(ProbeId::Gateway, "gateway lookup", &e),
    };

    let host = address.to_string();
    let label = format!("gateway {}", host);
    echo(collab, ProbeId::Gateway, &label, request(&host, 56, AUX_PING_COUNT, false))
        .await
        .with_metric("gateway", host)
}

/// Second hop of a short trace, unless it is missing or equals the gateway
pub fn first_hop_beyond(trace: &PathTrace, gateway: Option<IpAddr>) -> Option<IpAddr> {
    let hop = trace.hops.get(1).copied().flatten()?;
    if Some(hop) == gateway {
        return None;
    }
    Some(hop)
}

pub async fn first_hop(collab: &dyn Collaborator) -> ProbeResult {
    let undeterminable = |why: &str| {
        ProbeResult::new(ProbeId::FirstHop, ProbeStatus::Skipped, format!("first hop undeterminable: {}", why))
    };

    let gw = match bounded(LOCAL_READ_TIMEOUT, collab.read_default_gateway()).await {
        Ok(Some(gw)) => gw,
        Ok(None) => return undeterminable("no default gateway"),
        Err(e) => return error_result(ProbeId::FirstHop, "gateway lookup", &e),
    };

    let trace = match bounded(
        FIRST_HOP_TRACE_TIMEOUT,
        collab.trace_path(FIRST_HOP_TARGET, FIRST_HOP_MAX_HOPS, FIRST_HOP_TRACE_TIMEOUT),
    )
    .await
    {
        Ok(trace) => trace,
        Err(e) => return error_result(ProbeId::FirstHop, "path trace", &e),
    };

    let Some(hop) = first_hop_beyond(&trace, Some(gw)) else {
        return undeterminable("second hop silent or same as gateway");
    };

    let host = hop.to_string();
    let label = format!("first hop {}", host);
    echo(collab, ProbeId::FirstHop, &label, request(&host, 56, AUX_PING_COUNT, false))
        .await
        .with_metric("hop", host)
        .with_metric("gateway", gw.to_string())
}

/// One result per payload size, largest first; each is `Ok` or `Failed` on its own
pub async fn mtu_sweep(collab: &dyn Collaborator, host: &str) -> Vec<ProbeResult> {
    let mut results = Vec::with_capacity(MTU_SIZES.len());
    for size in MTU_SIZES {
        let probe_id = ProbeId::MtuSweep { size };
        let label = format!("{} with {} byte payload, DF set", host, size);
        let result = echo(collab, probe_id, &label, request(host, size, AUX_PING_COUNT, true)).await;

        let status = match result.status {
            ProbeStatus::Ok | ProbeStatus::Skipped => result.status,
            ProbeStatus::Degraded | ProbeStatus::Failed => ProbeStatus::Failed,
        };
        results.push(ProbeResult { status, ..result });
    }
    results
}

pub fn classify_trace(trace: &PathTrace, target: &str) -> ProbeStatus {
    let answered = trace.hops.iter().filter(|h| h.is_some()).count();
    let last = trace.hops.last().copied().flatten();
    let reached = match (last, target.parse::<IpAddr>()) {
        (Some(last), Ok(target)) => last == target,
        (Some(_), Err(_)) => trace.hops.len() < TRACEROUTE_MAX_HOPS as usize,
        (None, _) => false,
    };

    if reached {
        ProbeStatus::Ok
    } else if answered > 0 {
        ProbeStatus::Degraded
    } else {
        ProbeStatus::Failed
    }
}

pub async fn traceroute(collab: &dyn Collaborator, target: &str) -> ProbeResult {
    let probe_id = ProbeId::Traceroute { host: target.to_string() };
    let trace = match bounded(
        TRACEROUTE_TIMEOUT,
        collab.trace_path(target, TRACEROUTE_MAX_HOPS, TRACEROUTE_TIMEOUT),
    )
    .await
    {
        Ok(trace) => trace,
        Err(e) => return error_result(probe_id, &format!("traceroute {}", target), &e),
    };

    let status = classify_trace(&trace, target);
    let answered = trace.hops.iter().filter(|h| h.is_some()).count();
    let path = trace
        .hops
        .iter()
        .map(|h| h.map(|a| a.to_string()).unwrap_or_else(|| "*".to_string()))
        .collect::<Vec<_>>()
        .join(" > ");
    let outcome = if status == ProbeStatus::Ok { "reached" } else { "not reached" };

    ProbeResult::new(
        probe_id,
        status,
        format!("{} {} in {} hops ({} answered): {}", target, outcome, trace.hops.len(), answered, path),
    )
    .with_metric("hops", trace.hops.len())
    .with_metric("answered_hops", answered)
    .with_metric("path", path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::LatencyStats;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_healthy_report_message() {
        let report = ReachabilityReport {
            loss_pct: 0.0,
            latency: Some(LatencyStats { min_ms: 10.0, avg_ms: 12.0, max_ms: 15.0 }),
            error: None,
        };
        let id = ProbeId::Ping { host: "8.8.8.8".into(), size: 56 };
        let result = reachability_result(id, "8.8.8.8 (56 bytes)", &report);
        assert_eq!(result.status, ProbeStatus::Ok);
        assert!(result.message.contains("0% packet loss"));
        assert!(result.message.contains("10/12/15"));
    }

    #[test]
    fn test_report_error_forces_failure() {
        let report = ReachabilityReport {
            loss_pct: 0.0,
            latency: None,
            error: Some("sendmsg: network unreachable".into()),
        };
        let result = reachability_result(ProbeId::Gateway, "gateway", &report);
        assert_eq!(result.status, ProbeStatus::Failed);
    }

    #[test]
    fn test_first_hop_selection() {
        let trace = PathTrace { hops: vec![Some(ip("192.168.1.1")), Some(ip("10.20.0.1"))] };
        assert_eq!(first_hop_beyond(&trace, Some(ip("192.168.1.1"))), Some(ip("10.20.0.1")));

        let silent = PathTrace { hops: vec![Some(ip("192.168.1.1")), None] };
        assert_eq!(first_hop_beyond(&silent, Some(ip("192.168.1.1"))), None);

        let looped = PathTrace { hops: vec![Some(ip("192.168.1.1")), Some(ip("192.168.1.1"))] };
        assert_eq!(first_hop_beyond(&looped, Some(ip("192.168.1.1"))), None);

        let short = PathTrace { hops: vec![Some(ip("192.168.1.1"))] };
        assert_eq!(first_hop_beyond(&short, None), None);
    }

    #[test]
    fn test_trace_classification() {
        let reached = PathTrace { hops: vec![Some(ip("192.168.1.1")), None, Some(ip("8.8.8.8"))] };
        assert_eq!(classify_trace(&reached, "8.8.8.8"), ProbeStatus::Ok);

        let partial = PathTrace { hops: vec![Some(ip("192.168.1.1")), None, None] };
        assert_eq!(classify_trace(&partial, "8.8.8.8"), ProbeStatus::Degraded);

        let dark = PathTrace { hops: vec![None, None] };
        assert_eq!(classify_trace(&dark, "8.8.8.8"), ProbeStatus::Failed);
    }
}

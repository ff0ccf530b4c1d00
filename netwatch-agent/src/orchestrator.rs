//! Cycle orchestrator
//!
//! Builds the probe plan for one cycle (fixed order, throttled probes
//! filtered through the cadence gate), runs each probe to completion, and
//! forwards every result to the report sink in plan order. A probe that
//! fails, or even panics, becomes a `Failed` result and the cycle moves on.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{debug, warn};

use crate::cadence::CadenceGate;
use crate::collaborator::Collaborator;
use crate::config::NetwatchConfig;
use crate::model::{BandwidthSample, CycleSummary, ProbeId, ProbeResult, ProbeStatus};
use crate::probes;
use crate::probes::MTU_SIZES;
use crate::shutdown::Shutdown;
use crate::sink::{ReportEvent, ReportSink};

/// One step of a cycle, in report order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedProbe {
    Ping { host: String, size: u32 },
    Dns,
    AltDns,
    DnsServer,
    Http,
    Interfaces,
    Gateway,
    FirstHop,
    Wifi,
    RouterLog,
    MtuSweep,
    SpeedTest,
    Traceroute,
    Bandwidth,
}

impl PlannedProbe {
    /// Identifier used when the probe produced nothing usable
    pub fn probe_id(&self, config: &NetwatchConfig) -> ProbeId {
        let targets = &config.targets;
        match self {
            PlannedProbe::Ping { host, size } => ProbeId::Ping { host: host.clone(), size: *size },
            PlannedProbe::Dns => ProbeId::DnsLookup { domain: targets.dns_domain.clone() },
            PlannedProbe::AltDns => ProbeId::AltDnsLookup { server: targets.alt_dns.clone() },
            PlannedProbe::DnsServer => ProbeId::DnsServerReachability { server: targets.alt_dns.clone() },
            PlannedProbe::Http => ProbeId::HttpCheck { url: targets.test_url.clone() },
            PlannedProbe::Interfaces => ProbeId::InterfaceStatus,
            PlannedProbe::Gateway => ProbeId::Gateway,
            PlannedProbe::FirstHop => ProbeId::FirstHop,
            PlannedProbe::Wifi => ProbeId::WifiSignal,
            PlannedProbe::RouterLog => ProbeId::RouterLog,
            PlannedProbe::MtuSweep => ProbeId::MtuSweep { size: MTU_SIZES[0] },
            PlannedProbe::SpeedTest => ProbeId::SpeedTest,
            PlannedProbe::Traceroute => ProbeId::Traceroute { host: targets.trace_target.clone() },
            PlannedProbe::Bandwidth => ProbeId::Bandwidth,
        }
    }
}

/// State carried from one cycle to the next
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleState {
    /// Most recent interface counter sample
    pub bandwidth: Option<BandwidthSample>,
}

/// Probes due this cycle, in report order
pub fn plan_cycle(config: &NetwatchConfig, gate: &dyn CadenceGate) -> Vec<PlannedProbe> {
    let window = gate.is_due_within_window(config.schedule.throttle_window_secs);
    let mut plan = Vec::new();

    for host in config.hosts() {
        for size in &config.probes.ping_sizes {
            plan.push(PlannedProbe::Ping { host: host.to_string(), size: *size });
        }
    }

    plan.push(PlannedProbe::Dns);
    if window {
        plan.push(PlannedProbe::AltDns);
        plan.push(PlannedProbe::DnsServer);
    }
    plan.push(PlannedProbe::Http);
    plan.push(PlannedProbe::Interfaces);
    plan.push(PlannedProbe::Gateway);
    if window {
        plan.push(PlannedProbe::FirstHop);
    }
    plan.push(PlannedProbe::Wifi);
    if window {
        plan.push(PlannedProbe::RouterLog);
        plan.push(PlannedProbe::MtuSweep);
    }
    if gate.is_due(config.schedule.speed_test_interval_mins) {
        plan.push(PlannedProbe::SpeedTest);
    }
    if gate.is_due(config.schedule.traceroute_interval_mins) {
        plan.push(PlannedProbe::Traceroute);
    }
    plan.push(PlannedProbe::Bandwidth);

    plan
}

async fn execute(
    probe: &PlannedProbe,
    config: &NetwatchConfig,
    collab: &dyn Collaborator,
    state: &mut CycleState,
) -> Vec<ProbeResult> {
    let targets = &config.targets;
    let settings = &config.probes;

    let result = match probe {
        PlannedProbe::Ping { host, size } => probes::ping(collab, host, *size, settings.ping_count).await,
        PlannedProbe::Dns => probes::dns_lookup(collab, &targets.dns_domain).await,
        PlannedProbe::AltDns => probes::alt_dns_lookup(collab, &targets.alt_dns, &targets.dns_domain).await,
        PlannedProbe::DnsServer => probes::dns_server_reachability(collab, &targets.alt_dns).await,
        PlannedProbe::Http => probes::http_check(collab, &targets.test_url).await,
        PlannedProbe::Interfaces => probes::interface_status(collab).await,
        PlannedProbe::Gateway => probes::gateway(collab).await,
        PlannedProbe::FirstHop => probes::first_hop(collab).await,
        PlannedProbe::Wifi => probes::wifi_signal(collab, settings.wifi_interface.as_deref()).await,
        PlannedProbe::RouterLog => probes::router_log(collab, &settings.log_filter, settings.log_lines).await,
        PlannedProbe::MtuSweep => return probes::mtu_sweep(collab, &targets.primary_host).await,
        PlannedProbe::SpeedTest => probes::speed_test(collab, &settings.throughput_tools).await,
        PlannedProbe::Traceroute => probes::traceroute(collab, &targets.trace_target).await,
        PlannedProbe::Bandwidth => {
            let (result, sample) = probes::bandwidth(collab, state.bandwidth.as_ref()).await;
            if sample.is_some() {
                state.bandwidth = sample;
            }
            result
        }
    };
    vec![result]
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one full cycle. Stops early, between probes, once shutdown is requested.
pub async fn run_cycle(
    config: &NetwatchConfig,
    gate: &dyn CadenceGate,
    collab: &dyn Collaborator,
    sink: &mut dyn ReportSink,
    state: &mut CycleState,
    shutdown: &Shutdown,
) -> CycleSummary {
    let plan = plan_cycle(config, gate);
    debug!("Cycle plan: {} probes", plan.len());

    let mut summary = CycleSummary::default();
    for probe in &plan {
        if shutdown.is_requested() {
            debug!("Shutdown requested, skipping remaining probes");
            summary.interrupted = true;
            break;
        }

        let results = match AssertUnwindSafe(execute(probe, config, collab, state)).catch_unwind().await {
            Ok(results) => results,
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                warn!("Probe {:?} panicked: {}", probe, reason);
                vec![ProbeResult::new(
                    probe.probe_id(config),
                    ProbeStatus::Failed,
                    format!("probe aborted: {}", reason),
                )]
            }
        };

        for result in results {
            debug!("{} -> {}", result.probe_id, result.status);
            summary.record(result.status);
            sink.emit(&ReportEvent::probe(result)).await;
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Gate {
        minute: bool,
        window: bool,
    }

    impl CadenceGate for Gate {
        fn is_due(&self, _period_minutes: u32) -> bool {
            self.minute
        }

        fn is_due_within_window(&self, _window_seconds: u32) -> bool {
            self.window
        }
    }

    #[test]
    fn test_plan_without_throttled_probes() {
        let config = NetwatchConfig::default();
        let plan = plan_cycle(&config, &Gate { minute: false, window: false });

        let pings = plan.iter().filter(|p| matches!(p, PlannedProbe::Ping { .. })).count();
        assert_eq!(pings, 6);
        assert_eq!(
            &plan[6..],
            &[
                PlannedProbe::Dns,
                PlannedProbe::Http,
                PlannedProbe::Interfaces,
                PlannedProbe::Gateway,
                PlannedProbe::Wifi,
                PlannedProbe::Bandwidth,
            ]
        );
    }

    #[test]
    fn test_full_plan_order() {
        let config = NetwatchConfig::default();
        let plan = plan_cycle(&config, &Gate { minute: true, window: true });

        assert_eq!(plan[0], PlannedProbe::Ping { host: "8.8.8.8".into(), size: 56 });
        assert_eq!(plan[1], PlannedProbe::Ping { host: "8.8.8.8".into(), size: 1400 });
        assert_eq!(plan[2], PlannedProbe::Ping { host: "1.1.1.1".into(), size: 56 });
        assert_eq!(
            &plan[6..],
            &[
                PlannedProbe::Dns,
                PlannedProbe::AltDns,
                PlannedProbe::DnsServer,
                PlannedProbe::Http,
                PlannedProbe::Interfaces,
                PlannedProbe::Gateway,
                PlannedProbe::FirstHop,
                PlannedProbe::Wifi,
                PlannedProbe::RouterLog,
                PlannedProbe::MtuSweep,
                PlannedProbe::SpeedTest,
                PlannedProbe::Traceroute,
                PlannedProbe::Bandwidth,
            ]
        );
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}

//! Scheduler loop: one cycle per interval until shutdown

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cadence::{CadenceGate, WallClockGate};
use crate::collaborator::Collaborator;
use crate::config::NetwatchConfig;
use crate::model::SessionStats;
use crate::orchestrator::{run_cycle, CycleState};
use crate::shutdown::Shutdown;
use crate::sink::{ReportEvent, ReportSink};

/// Consecutive failing cycles before the report calls it out
const FAILURE_STREAK_ALERT: u64 = 3;

pub struct Scheduler<C, S> {
    config: NetwatchConfig,
    collaborator: C,
    sink: S,
    state: CycleState,
    stats: SessionStats,
    max_cycles: Option<u64>,
    fixed_gate: Option<Box<dyn CadenceGate>>,
    session_id: String,
}

impl<C: Collaborator, S: ReportSink> Scheduler<C, S> {
    pub fn new(config: NetwatchConfig, collaborator: C, sink: S) -> Self {
        Self {
            config,
            collaborator,
            sink,
            state: CycleState::default(),
            stats: SessionStats::default(),
            max_cycles: None,
            fixed_gate: None,
            session_id: Uuid::new_v4().simple().to_string()[..8].to_string(),
        }
    }

    /// Stop on its own after `cycles` cycles
    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    /// Evaluate cadence against a fixed gate instead of the wall clock
    pub fn with_gate(mut self, gate: impl CadenceGate + 'static) -> Self {
        self.fixed_gate = Some(Box::new(gate));
        self
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn state(&self) -> &CycleState {
        &self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.config.schedule.interval_secs.max(1))
    }

    fn cycles_exhausted(&self) -> bool {
        match self.max_cycles {
            Some(max) => self.stats.cycles >= max,
            None => false,
        }
    }

    async fn startup(&mut self) {
        let schedule = &self.config.schedule;
        let hostname = gethostname::gethostname().to_string_lossy().to_string();
        info!("Starting session {} on {}", self.session_id, hostname);

        let banner = format!(
            "netwatch {} session {} on {}: every {}s, speed test every {} min, traceroute every {} min",
            env!("CARGO_PKG_VERSION"),
            self.session_id,
            hostname,
            schedule.interval_secs,
            schedule.speed_test_interval_mins,
            schedule.traceroute_interval_mins,
        );
        self.sink.emit(&ReportEvent::info(banner)).await;

        if schedule.interval_secs >= u64::from(schedule.throttle_window_secs) {
            let note = format!(
                "interval of {}s is not shorter than the {}s throttle window; throttled probes run only on cycles that start inside it",
                schedule.interval_secs, schedule.throttle_window_secs
            );
            warn!("{}", note);
            self.sink.emit(&ReportEvent::warn(note)).await;
        }

        match self.collaborator.load_bandwidth_sample().await {
            Ok(sample) => {
                debug!("Loaded prior bandwidth sample: {:?}", sample);
                self.state.bandwidth = sample;
            }
            Err(e) => warn!("Could not load prior bandwidth sample: {}", e),
        }
    }

    /// Run cycles until shutdown is requested (or the cycle budget is spent)
    pub async fn run(&mut self, mut shutdown: Shutdown) -> SessionStats {
        self.startup().await;

        loop {
            if shutdown.is_requested() || self.cycles_exhausted() {
                break;
            }

            let cycle = self.stats.cycles + 1;
            let started = Instant::now();
            let wall_clock = WallClockGate::now();
            let gate: &dyn CadenceGate = match &self.fixed_gate {
                Some(gate) => gate.as_ref(),
                None => &wall_clock,
            };

            self.sink.emit(&ReportEvent::info(format!("cycle {} started", cycle))).await;
            let summary = run_cycle(
                &self.config,
                gate,
                &self.collaborator,
                &mut self.sink,
                &mut self.state,
                &shutdown,
            )
            .await;
            self.stats.absorb(&summary);

            let line = format!(
                "cycle {} complete: {} in {:.1}s",
                cycle,
                summary,
                started.elapsed().as_secs_f64()
            );
            info!("{}", line);
            let event = if summary.failed > 0 {
                ReportEvent::warn(line)
            } else {
                ReportEvent::info(line)
            };
            self.sink.emit(&event).await;

            if self.stats.consecutive_failed_cycles >= FAILURE_STREAK_ALERT {
                let streak = format!("{} consecutive cycles with failures", self.stats.consecutive_failed_cycles);
                self.sink.emit(&ReportEvent::warn(streak)).await;
            }

            if summary.interrupted || self.cycles_exhausted() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval()) => {}
                _ = shutdown.requested() => break,
            }
        }

        let farewell = format!(
            "monitoring stopped after {} cycles ({})",
            self.stats.cycles, self.stats.totals
        );
        info!("{}", farewell);
        self.sink.emit(&ReportEvent::info(farewell)).await;

        self.stats.clone()
    }
}

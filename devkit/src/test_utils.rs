/*!
Test harness for netwatch cycles

Wraps a config, a scripted collaborator and a recording sink so a test can
run one cycle (or a whole scheduler session) and then assert on the report
stream it produced.
*/

use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use netwatch_agent::cadence::CadenceGate;
use netwatch_agent::model::{CycleSummary, ProbeId, ProbeResult, ProbeStatus};
use netwatch_agent::orchestrator::{run_cycle, CycleState};
use netwatch_agent::sink::{EventBody, ReportEvent, ReportSink};
use netwatch_agent::{NetwatchConfig, Shutdown, ShutdownTrigger};

use crate::mock_collaborator::MockCollaborator;

/// Sink that keeps every event; clones share the same buffer
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<ReportEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn results(&self) -> Vec<ProbeResult> {
        self.events()
            .into_iter()
            .filter_map(|event| match event.body {
                EventBody::Probe(result) => Some(result),
                EventBody::Message { .. } => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event.body {
                EventBody::Message { text, .. } => Some(text),
                EventBody::Probe(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl ReportSink for RecordingSink {
    async fn emit(&mut self, event: &ReportEvent) {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).push(event.clone());
    }
}

/// Cadence gate with fixed answers
#[derive(Debug, Clone, Copy)]
pub struct FixedGate {
    pub periodic_due: bool,
    pub in_window: bool,
}

impl FixedGate {
    /// Every throttled and periodic probe runs
    pub fn all_due() -> Self {
        Self { periodic_due: true, in_window: true }
    }

    /// Only the unthrottled probes run
    pub fn none_due() -> Self {
        Self { periodic_due: false, in_window: false }
    }
}

impl CadenceGate for FixedGate {
    fn is_due(&self, period_minutes: u32) -> bool {
        period_minutes > 0 && self.periodic_due
    }

    fn is_due_within_window(&self, _window_seconds: u32) -> bool {
        self.in_window
    }
}

pub struct TestHarness {
    pub config: NetwatchConfig,
    pub collaborator: MockCollaborator,
    pub sink: RecordingSink,
    pub state: CycleState,
    trigger: ShutdownTrigger,
    shutdown: Shutdown,
}

impl TestHarness {
    pub fn new() -> Self {
        env_logger::try_init().ok();
        let (trigger, shutdown) = Shutdown::channel();

        Self {
            config: NetwatchConfig::default(),
            collaborator: MockCollaborator::new(),
            sink: RecordingSink::new(),
            state: CycleState::default(),
            trigger,
            shutdown,
        }
    }

    pub fn with_config(mut self, config: NetwatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_collaborator(mut self, collaborator: MockCollaborator) -> Self {
        self.collaborator = collaborator;
        self
    }

    pub fn trigger(&self) -> ShutdownTrigger {
        self.trigger.clone()
    }

    /// Run one cycle against the given gate
    pub async fn run_cycle(&mut self, gate: FixedGate) -> CycleSummary {
        let summary = run_cycle(
            &self.config,
            &gate,
            &self.collaborator,
            &mut self.sink,
            &mut self.state,
            &self.shutdown,
        )
        .await;
        log::info!("[HARNESS] cycle finished: {}", summary);
        summary
    }

    pub fn results(&self) -> Vec<ProbeResult> {
        self.sink.results()
    }

    /// First result for `probe_id`
    pub fn result_for(&self, probe_id: &ProbeId) -> Result<ProbeResult> {
        match self.results().into_iter().find(|r| &r.probe_id == probe_id) {
            Some(result) => Ok(result),
            None => anyhow::bail!("No result reported for {}", probe_id),
        }
    }

    pub fn assert_status(&self, probe_id: &ProbeId, expected: ProbeStatus) -> Result<ProbeResult> {
        let result = self.result_for(probe_id)?;
        if result.status != expected {
            anyhow::bail!(
                "Status mismatch for {}: expected {}, got {} ({})",
                probe_id,
                expected,
                result.status,
                result.message
            );
        }
        Ok(result)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

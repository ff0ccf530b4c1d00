use netwatch_agent::config::ReportFormat;
use netwatch_agent::model::{ProbeId, ProbeStatus};
use netwatch_agent::sink::{FanoutSink, FileSink};
use netwatch_agent::{NetwatchConfig, Scheduler, Shutdown};
use netwatch_devkit::{sample_from, FixedGate, Measurement, MockCollaborator, RecordingSink};

fn scheduler(collab: MockCollaborator, sink: RecordingSink) -> Scheduler<MockCollaborator, RecordingSink> {
    Scheduler::new(NetwatchConfig::default(), collab, sink).with_gate(FixedGate::none_due())
}

#[tokio::test(start_paused = true)]
async fn test_runs_requested_number_of_cycles() {
    let sink = RecordingSink::new();
    let (_trigger, shutdown) = Shutdown::channel();
    let mut scheduler = scheduler(MockCollaborator::new(), sink.clone()).with_max_cycles(3);

    let stats = scheduler.run(shutdown).await;

    assert_eq!(stats.cycles, 3);
    assert_eq!(stats.totals.total(), 36);
    assert_eq!(sink.results().len(), 36);

    let messages = sink.messages();
    assert!(messages[0].starts_with("netwatch "));
    assert!(messages.iter().any(|m| m.starts_with("cycle 3 complete")));
    assert!(messages.last().unwrap().starts_with("monitoring stopped after 3 cycles"));
}

#[tokio::test(start_paused = true)]
async fn test_bandwidth_rate_uses_sample_from_previous_run() {
    let collab = MockCollaborator::new()
        .with_counters(2_048_000, 1_024_000)
        .with_stored_sample(sample_from(1_024_000, 1_024_000, 10));
    let sink = RecordingSink::new();
    let (_trigger, shutdown) = Shutdown::channel();
    let mut scheduler = scheduler(collab, sink.clone()).with_max_cycles(1);

    scheduler.run(shutdown).await;

    let bandwidth = sink
        .results()
        .into_iter()
        .find(|r| r.probe_id == ProbeId::Bandwidth)
        .unwrap();
    assert_eq!(bandwidth.status, ProbeStatus::Ok);
    assert!(bandwidth.message.contains("up 0.0 KB/s"));
    assert_eq!(scheduler.state().bandwidth.map(|s| s.rx_bytes), Some(2_048_000));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_before_start_runs_no_probes() {
    let collab = MockCollaborator::new();
    let sink = RecordingSink::new();
    let (trigger, shutdown) = Shutdown::channel();
    trigger.trigger();

    let stats = scheduler(collab.clone(), sink.clone()).run(shutdown).await;

    assert_eq!(stats.cycles, 0);
    assert!(sink.results().is_empty());
    assert!(collab.calls().is_empty());
    assert!(sink.messages().last().unwrap().starts_with("monitoring stopped after 0 cycles"));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_sleep() {
    let (trigger, shutdown) = Shutdown::channel();
    // bandwidth is the last probe, so the request lands just before the sleep
    let collab = MockCollaborator::new().cancelling_on(Measurement::Counters, trigger);
    let sink = RecordingSink::new();

    let stats = scheduler(collab, sink.clone()).run(shutdown).await;

    assert_eq!(stats.cycles, 1);
    assert!(!stats.totals.interrupted);
    assert_eq!(sink.results().len(), 12);
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_cycle_ends_session() {
    let (trigger, shutdown) = Shutdown::channel();
    let collab = MockCollaborator::new().cancelling_on(Measurement::Dns, trigger);
    let sink = RecordingSink::new();

    let stats = scheduler(collab, sink.clone()).run(shutdown).await;

    assert_eq!(stats.cycles, 1);
    assert_eq!(sink.results().len(), 7);
    assert!(sink.messages().iter().any(|m| m.contains("(interrupted)")));
}

#[tokio::test(start_paused = true)]
async fn test_failure_streak_is_reported() {
    let collab = MockCollaborator::new().with_http_code(503);
    let sink = RecordingSink::new();
    let (_trigger, shutdown) = Shutdown::channel();
    let mut scheduler = scheduler(collab, sink.clone()).with_max_cycles(3);

    let stats = scheduler.run(shutdown).await;

    assert_eq!(stats.consecutive_failed_cycles, 3);
    assert_eq!(stats.totals.failed, 3);
    assert!(sink.messages().iter().any(|m| m == "3 consecutive cycles with failures"));
}

#[tokio::test(start_paused = true)]
async fn test_window_warning_at_startup() {
    let sink = RecordingSink::new();
    let (_trigger, shutdown) = Shutdown::channel();

    let mut config = NetwatchConfig::default();
    config.schedule.interval_secs = 10;
    Scheduler::new(config, MockCollaborator::new(), sink.clone())
        .with_gate(FixedGate::none_due())
        .with_max_cycles(1)
        .run(shutdown)
        .await;
    assert!(!sink.messages().iter().any(|m| m.contains("throttle window")));

    let sink = RecordingSink::new();
    let (_trigger, shutdown) = Shutdown::channel();
    scheduler(MockCollaborator::new(), sink.clone())
        .with_max_cycles(1)
        .run(shutdown)
        .await;
    assert!(sink.messages().iter().any(|m| m.contains("throttle window")));
}

#[tokio::test]
async fn test_report_file_mirrors_recorded_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("netwatch.jsonl");
    let sink = RecordingSink::new();
    let fanout = FanoutSink::new()
        .push(sink.clone())
        .push(FileSink::new(&path, ReportFormat::Json, false).without_fallback());
    let (_trigger, shutdown) = Shutdown::channel();

    Scheduler::new(NetwatchConfig::default(), MockCollaborator::new(), fanout)
        .with_gate(FixedGate::none_due())
        .with_max_cycles(1)
        .run(shutdown)
        .await;

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), sink.events().len());
    assert_eq!(lines.iter().filter(|l| l.contains("\"kind\":\"probe\"")).count(), 12);
    assert!(lines.last().unwrap().contains("monitoring stopped after 1 cycles"));
}

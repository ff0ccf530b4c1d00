//! Throughput probes: active speed test and passive bandwidth rate

use chrono::Local;
use tracing::warn;

use super::{bounded, error_result, LOCAL_READ_TIMEOUT, THROUGHPUT_TIMEOUT};
use crate::collaborator::Collaborator;
use crate::model::{BandwidthSample, ProbeId, ProbeResult, ProbeStatus};

pub async fn speed_test(collab: &dyn Collaborator, tools: &[String]) -> ProbeResult {
    let report = match bounded(THROUGHPUT_TIMEOUT, collab.measure_throughput(tools)).await {
        Ok(report) => report,
        Err(e) => return error_result(ProbeId::SpeedTest, "speed test", &e),
    };

    let mut message = format!(
        "down {:.2} Mbit/s, up {:.2} Mbit/s",
        report.download_mbps, report.upload_mbps
    );
    if let Some(ping) = report.ping_ms {
        message.push_str(&format!(", ping {:.1} ms", ping));
    }
    message.push_str(&format!(" ({})", report.tool));

    let mut result = ProbeResult::new(ProbeId::SpeedTest, ProbeStatus::Ok, message)
        .with_metric("download_mbps", report.download_mbps)
        .with_metric("upload_mbps", report.upload_mbps)
        .with_metric("tool", report.tool.clone());
    if let Some(ping) = report.ping_ms {
        result = result.with_metric("ping_ms", ping);
    }
    result
}

/// Download/upload rate in KB/s between two samples; `None` unless time moved forward.
/// Counters that went backwards (reset, reboot) count as zero traffic.
pub fn compute_rate(previous: &BandwidthSample, current: &BandwidthSample) -> Option<(f64, f64)> {
    let elapsed = (current.sampled_at - previous.sampled_at).num_milliseconds() as f64 / 1000.0;
    if elapsed <= 0.0 {
        return None;
    }
    let rate = |now: u64, before: u64| now.saturating_sub(before) as f64 / 1024.0 / elapsed;
    Some((
        rate(current.rx_bytes, previous.rx_bytes),
        rate(current.tx_bytes, previous.tx_bytes),
    ))
}

/// Sample counters, compute the rate against `previous` and persist the new sample.
/// Returns the result and the sample that supersedes `previous` (`None` if no reading).
pub async fn bandwidth(
    collab: &dyn Collaborator,
    previous: Option<&BandwidthSample>,
) -> (ProbeResult, Option<BandwidthSample>) {
    let counters = match bounded(LOCAL_READ_TIMEOUT, collab.read_interface_counters()).await {
        Ok(counters) => counters,
        Err(e) => return (error_result(ProbeId::Bandwidth, "interface counters", &e), None),
    };

    let sample = BandwidthSample {
        rx_bytes: counters.rx_bytes,
        tx_bytes: counters.tx_bytes,
        sampled_at: Local::now(),
    };

    if let Err(e) = bounded(LOCAL_READ_TIMEOUT, collab.store_bandwidth_sample(&sample)).await {
        warn!("Could not persist bandwidth sample: {}", e);
    }

    let result = match previous.map(|prev| (prev, compute_rate(prev, &sample))) {
        None => ProbeResult::new(
            ProbeId::Bandwidth,
            ProbeStatus::Skipped,
            "first sample recorded, rate available next cycle",
        ),
        Some((_, None)) => ProbeResult::new(
            ProbeId::Bandwidth,
            ProbeStatus::Skipped,
            "no time elapsed since previous sample",
        ),
        Some((prev, Some((down, up)))) => {
            let secs = (sample.sampled_at - prev.sampled_at).num_seconds();
            ProbeResult::new(
                ProbeId::Bandwidth,
                ProbeStatus::Ok,
                format!("down {:.1} KB/s, up {:.1} KB/s over {}s", down, up, secs),
            )
            .with_metric("download_kbps", down)
            .with_metric("upload_kbps", up)
        }
    };

    (
        result.with_metric("rx_bytes", sample.rx_bytes).with_metric("tx_bytes", sample.tx_bytes),
        Some(sample),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(rx: u64, tx: u64, offset_secs: i64) -> BandwidthSample {
        let base = Local::now();
        BandwidthSample {
            rx_bytes: rx,
            tx_bytes: tx,
            sampled_at: base + Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn test_identical_counters_give_zero_rate() {
        let first = sample(5_000_000, 1_000_000, 0);
        let second = BandwidthSample {
            sampled_at: first.sampled_at + Duration::seconds(10),
            ..first
        };
        assert_eq!(compute_rate(&first, &second), Some((0.0, 0.0)));
    }

    #[test]
    fn test_rate_in_kilobytes_per_second() {
        let first = sample(0, 0, 0);
        let second = BandwidthSample {
            rx_bytes: 10 * 1024 * 10,
            tx_bytes: 1024 * 10,
            sampled_at: first.sampled_at + Duration::seconds(10),
        };
        assert_eq!(compute_rate(&first, &second), Some((10.0, 1.0)));
    }

    #[test]
    fn test_non_positive_elapsed_has_no_rate() {
        let first = sample(0, 0, 0);
        assert_eq!(compute_rate(&first, &first), None);

        let earlier = BandwidthSample {
            sampled_at: first.sampled_at - Duration::seconds(5),
            ..first
        };
        assert_eq!(compute_rate(&first, &earlier), None);
    }

    #[test]
    fn test_counter_reset_reads_as_zero() {
        let first = sample(9_000, 9_000, 0);
        let second = BandwidthSample {
            rx_bytes: 100,
            tx_bytes: 100,
            sampled_at: first.sampled_at + Duration::seconds(5),
        };
        assert_eq!(compute_rate(&first, &second), Some((0.0, 0.0)));
    }
}

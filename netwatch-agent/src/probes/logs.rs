//! Router / system log scan

use super::{bounded, error_result, LOG_TIMEOUT};
use crate::collaborator::Collaborator;
use crate::model::{ProbeId, ProbeResult, ProbeStatus};

/// Words that turn a matching log line into evidence of trouble
pub const ERROR_KEYWORDS: [&str; 6] = ["fail", "error", "timeout", "disconnect", "deauth", "denied"];

pub fn log_result(lines: &[String]) -> ProbeResult {
    let errors: Vec<&String> = lines
        .iter()
        .filter(|line| {
            let lower = line.to_lowercase();
            ERROR_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .collect();

    let (status, message) = match errors.last() {
        None => (
            ProbeStatus::Ok,
            format!("{} matching log lines, no errors", lines.len()),
        ),
        Some(last) => (
            ProbeStatus::Degraded,
            format!("{} error lines in last {}, latest: {}", errors.len(), lines.len(), last.trim()),
        ),
    };

    ProbeResult::new(ProbeId::RouterLog, status, message)
        .with_metric("lines", lines.len())
        .with_metric("error_lines", errors.len())
}

pub async fn router_log(collab: &dyn Collaborator, filter: &[String], count: usize) -> ProbeResult {
    match bounded(LOG_TIMEOUT, collab.read_system_log_tail(filter, count)).await {
        Ok(lines) => log_result(&lines),
        Err(e) => error_result(ProbeId::RouterLog, "system log", &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_log_is_ok() {
        let lines = vec!["wlan0: associated".to_string(), "dhcp: lease renewed".to_string()];
        let result = log_result(&lines);
        assert_eq!(result.status, ProbeStatus::Ok);
        assert_eq!(result.message, "2 matching log lines, no errors");
    }

    #[test]
    fn test_error_lines_degrade() {
        let lines = vec![
            "wlan0: deauthenticating from aa:bb (reason 3)".to_string(),
            "wlan0: associated".to_string(),
            "dhcp: DHCPREQUEST timeout".to_string(),
        ];
        let result = log_result(&lines);
        assert_eq!(result.status, ProbeStatus::Degraded);
        assert!(result.message.starts_with("2 error lines"));
        assert!(result.message.ends_with("dhcp: DHCPREQUEST timeout"));
    }
}

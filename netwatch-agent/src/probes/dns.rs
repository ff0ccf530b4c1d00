//! Name resolution probes

use super::{bounded, error_result, DNS_TIMEOUT};
use crate::collaborator::{Collaborator, DnsAnswer};
use crate::model::{ProbeId, ProbeResult, ProbeStatus};

/// `Ok` iff the answer carries at least one address
pub fn dns_result(probe_id: ProbeId, label: &str, answer: &DnsAnswer) -> ProbeResult {
    if answer.addresses.is_empty() {
        let reason = answer.error.as_deref().unwrap_or("empty answer");
        return ProbeResult::new(probe_id, ProbeStatus::Failed, format!("{}: {}", label, reason))
            .with_metric("answers", 0usize);
    }

    let shown: Vec<String> = answer.addresses.iter().take(3).map(|a| a.to_string()).collect();
    let more = answer.addresses.len().saturating_sub(shown.len());
    let mut message = format!("{} -> {}", label, shown.join(", "));
    if more > 0 {
        message.push_str(&format!(" (+{} more)", more));
    }

    ProbeResult::new(probe_id, ProbeStatus::Ok, message)
        .with_metric("answers", answer.addresses.len())
        .with_metric("first_answer", shown[0].clone())
}

async fn lookup(collab: &dyn Collaborator, probe_id: ProbeId, server: Option<&str>, domain: &str) -> ProbeResult {
    let label = match server {
        Some(server) => format!("{} via {}", domain, server),
        None => domain.to_string(),
    };
    match bounded(DNS_TIMEOUT, collab.resolve_dns(server, domain, DNS_TIMEOUT)).await {
        Ok(answer) => dns_result(probe_id, &label, &answer),
        Err(e) => error_result(probe_id, &label, &e),
    }
}

/// Resolve through the system resolver
pub async fn dns_lookup(collab: &dyn Collaborator, domain: &str) -> ProbeResult {
    let probe_id = ProbeId::DnsLookup { domain: domain.to_string() };
    lookup(collab, probe_id, None, domain).await
}

/// Resolve through an explicit server, bypassing the system resolver
pub async fn alt_dns_lookup(collab: &dyn Collaborator, server: &str, domain: &str) -> ProbeResult {
    let probe_id = ProbeId::AltDnsLookup { server: server.to_string() };
    lookup(collab, probe_id, Some(server), domain).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_answer_fails() {
        let answer = DnsAnswer { addresses: vec![], error: Some("SERVFAIL".into()) };
        let result = dns_result(ProbeId::DnsLookup { domain: "example.com".into() }, "example.com", &answer);
        assert_eq!(result.status, ProbeStatus::Failed);
        assert!(result.message.contains("SERVFAIL"));
    }

    #[test]
    fn test_answer_is_ok() {
        let answer = DnsAnswer {
            addresses: vec!["93.184.216.34".parse().unwrap()],
            error: None,
        };
        let result = dns_result(ProbeId::DnsLookup { domain: "example.com".into() }, "example.com", &answer);
        assert_eq!(result.status, ProbeStatus::Ok);
        assert_eq!(result.message, "example.com -> 93.184.216.34");
    }
}

//! HTTP reachability probe

use super::{bounded, classify_http, error_result, HTTP_TIMEOUT};
use crate::collaborator::{Collaborator, HttpStatus};
use crate::model::{ProbeId, ProbeResult};

pub fn http_result(url: &str, status: &HttpStatus) -> ProbeResult {
    let mut message = format!("HTTP {:03} from {}", status.code, url);
    if let Some(err) = &status.error {
        message.push_str(&format!(": {}", err));
    }
    ProbeResult::new(ProbeId::HttpCheck { url: url.to_string() }, classify_http(status.code), message)
        .with_metric("http_code", format!("{:03}", status.code))
}

pub async fn http_check(collab: &dyn Collaborator, url: &str) -> ProbeResult {
    match bounded(HTTP_TIMEOUT, collab.fetch_http_status(url, HTTP_TIMEOUT)).await {
        Ok(status) => http_result(url, &status),
        Err(e) => error_result(ProbeId::HttpCheck { url: url.to_string() }, url, &e)
            .with_metric("http_code", "000"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProbeStatus;

    #[test]
    fn test_connection_error_reads_000() {
        let status = HttpStatus { code: 0, error: Some("connection refused".into()) };
        let result = http_result("https://example.com", &status);
        assert_eq!(result.status, ProbeStatus::Failed);
        assert!(result.message.starts_with("HTTP 000"));
        assert_eq!(result.metric("http_code").map(|m| m.to_string()), Some("000".to_string()));
    }

    #[test]
    fn test_redirect_is_healthy() {
        let status = HttpStatus { code: 301, error: None };
        assert_eq!(http_result("http://example.com", &status).status, ProbeStatus::Ok);
    }
}

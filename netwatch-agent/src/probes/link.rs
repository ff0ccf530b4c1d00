//! Link-layer probes: interface state and WiFi signal

use super::{bounded, classify_wifi, error_result, signal_quality, LOCAL_READ_TIMEOUT};
use crate::collaborator::{Collaborator, LinkState, WifiSignal};
use crate::model::{ProbeId, ProbeResult, ProbeStatus};

pub fn interface_result(state: &LinkState) -> ProbeResult {
    let up = state.interfaces.iter().filter(|i| i.is_up()).count();
    let listing = if state.interfaces.is_empty() {
        "no interfaces found".to_string()
    } else {
        state
            .interfaces
            .iter()
            .map(|i| format!("{} {}", i.name, i.state))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let status = if up > 0 { ProbeStatus::Ok } else { ProbeStatus::Failed };

    ProbeResult::new(ProbeId::InterfaceStatus, status, format!("{} up: {}", up, listing))
        .with_metric("up", up)
        .with_metric("total", state.interfaces.len())
}

pub async fn interface_status(collab: &dyn Collaborator) -> ProbeResult {
    match bounded(LOCAL_READ_TIMEOUT, collab.read_link_state()).await {
        Ok(state) => interface_result(&state),
        Err(e) => error_result(ProbeId::InterfaceStatus, "link state", &e),
    }
}

pub fn wifi_result(signal: &WifiSignal) -> ProbeResult {
    let quality = signal_quality(signal.dbm);
    let mut message = format!("signal {} dBm ({}%)", signal.dbm, quality);
    if let Some(freq) = signal.frequency_mhz {
        message.push_str(&format!(", {} MHz", freq));
    }
    if let Some(channel) = signal.channel {
        message.push_str(&format!(", channel {}", channel));
    }

    let mut result = ProbeResult::new(ProbeId::WifiSignal, classify_wifi(quality), message)
        .with_metric("signal_dbm", f64::from(signal.dbm))
        .with_metric("quality_pct", f64::from(quality));
    if let Some(freq) = signal.frequency_mhz {
        result = result.with_metric("frequency_mhz", f64::from(freq));
    }
    if let Some(channel) = signal.channel {
        result = result.with_metric("channel", f64::from(channel));
    }
    result
}

pub async fn wifi_signal(collab: &dyn Collaborator, interface: Option<&str>) -> ProbeResult {
    match bounded(LOCAL_READ_TIMEOUT, collab.read_wifi_signal(interface)).await {
        Ok(Some(signal)) => wifi_result(&signal),
        Ok(None) => ProbeResult::new(
            ProbeId::WifiSignal,
            ProbeStatus::Skipped,
            "no wireless interface or signal reading",
        ),
        Err(e) => error_result(ProbeId::WifiSignal, "wifi signal", &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::LinkInterface;

    #[test]
    fn test_interfaces_need_one_up() {
        let mut state = LinkState {
            interfaces: vec![
                LinkInterface { name: "eth0".into(), state: "down".into() },
                LinkInterface { name: "wlan0".into(), state: "dormant".into() },
            ],
        };
        assert_eq!(interface_result(&state).status, ProbeStatus::Failed);

        state.interfaces[1].state = "up".into();
        let result = interface_result(&state);
        assert_eq!(result.status, ProbeStatus::Ok);
        assert_eq!(result.message, "1 up: eth0 down, wlan0 up");
    }

    #[test]
    fn test_no_interfaces_fails() {
        assert_eq!(interface_result(&LinkState::default()).status, ProbeStatus::Failed);
    }

    #[test]
    fn test_wifi_result_bands() {
        let strong = WifiSignal { dbm: -55, frequency_mhz: Some(5180), channel: Some(36) };
        let result = wifi_result(&strong);
        assert_eq!(result.status, ProbeStatus::Ok);
        assert!(result.message.contains("90%"));

        let weak = WifiSignal { dbm: -78, frequency_mhz: None, channel: None };
        assert_eq!(wifi_result(&weak).status, ProbeStatus::Degraded);

        let bad = WifiSignal { dbm: -85, frequency_mhz: None, channel: None };
        assert_eq!(wifi_result(&bad).status, ProbeStatus::Failed);
    }
}

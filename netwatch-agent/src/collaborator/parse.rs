//! Text parsers for the output of external diagnostic tools

use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr};

use super::{LatencyStats, PathTrace, WifiSignal};

/// Extract packet loss and rtt statistics from `ping` output (Linux and BSD formats)
pub fn parse_ping_output(output: &str) -> Option<(f64, Option<LatencyStats>)> {
    let loss = output
        .lines()
        .filter(|line| line.contains("packet loss"))
        .flat_map(|line| line.split(','))
        .find(|part| part.contains("packet loss"))
        .and_then(|part| part.split_whitespace().next())
        .and_then(|token| token.trim_end_matches('%').parse::<f64>().ok())?;

    let latency = output
        .lines()
        .find(|line| line.contains("min/avg/max"))
        .and_then(|line| line.split('=').nth(1))
        .and_then(|values| values.split_whitespace().next())
        .and_then(|values| {
            let parts: Vec<f64> = values
                .split('/')
                .filter_map(|v| v.parse::<f64>().ok())
                .collect();
            if parts.len() >= 3 {
                Some(LatencyStats {
                    min_ms: parts[0],
                    avg_ms: parts[1],
                    max_ms: parts[2],
                })
            } else {
                None
            }
        });

    Some((loss, latency))
}

/// Parse `traceroute -n -q 1` output into ordered hops
pub fn parse_traceroute(output: &str) -> PathTrace {
    let mut hops = Vec::new();
    for line in output.lines() {
        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else { continue };
        if first.parse::<u32>().is_err() {
            continue; // header line
        }
        let hop = tokens.next().and_then(|t| t.parse::<IpAddr>().ok());
        hops.push(hop);
    }
    PathTrace { hops }
}

/// Parse `iw dev <iface> link`
pub fn parse_iw_link(output: &str) -> Option<WifiSignal> {
    if output.contains("Not connected") {
        return None;
    }

    let mut dbm = None;
    let mut frequency_mhz = None;
    for line in output.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("signal:") {
            dbm = rest.split_whitespace().next().and_then(|v| v.parse::<i32>().ok());
        } else if let Some(rest) = line.strip_prefix("freq:") {
            frequency_mhz = rest
                .split_whitespace()
                .next()
                .and_then(|v| v.parse::<f64>().ok())
                .map(|f| f as u32);
        }
    }

    dbm.map(|dbm| WifiSignal {
        dbm,
        frequency_mhz,
        channel: frequency_mhz.and_then(channel_from_frequency),
    })
}

/// Parse `/proc/net/wireless`; returns the interface name and signal level in dBm
pub fn parse_proc_net_wireless(content: &str, interface: Option<&str>) -> Option<(String, i32)> {
    content.lines().skip(2).find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        let name = name.trim();
        if let Some(wanted) = interface {
            if name != wanted {
                return None;
            }
        }
        // status, link quality, signal level, noise
        let level = rest.split_whitespace().nth(2)?;
        let level = level.trim_end_matches('.').parse::<f64>().ok()?;
        if level >= 0.0 {
            return None;
        }
        Some((name.to_string(), level as i32))
    })
}

/// WiFi channel number for a centre frequency
pub fn channel_from_frequency(mhz: u32) -> Option<u32> {
    match mhz {
        2412..=2472 => Some((mhz - 2407) / 5),
        2484 => Some(14),
        5000..=5895 => Some((mhz - 5000) / 5),
        5955..=7115 => Some((mhz - 5950) / 5),
        _ => None,
    }
}

/// Default route gateway from `/proc/net/route`
pub fn parse_proc_net_route(content: &str) -> Option<Ipv4Addr> {
    content.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 || fields[1] != "00000000" || fields[2] == "00000000" {
            return None;
        }
        let raw = u32::from_str_radix(fields[2], 16).ok()?;
        Some(Ipv4Addr::from(raw.to_le_bytes()))
    })
}

/// Gateway from `ip route show default`
pub fn parse_ip_route_default(output: &str) -> Option<IpAddr> {
    output.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        tokens.find(|t| *t == "via")?;
        tokens.next()?.parse::<IpAddr>().ok()
    })
}

/// Addresses from `dig +short`; CNAME lines are ignored
pub fn parse_dig_short(output: &str) -> Vec<IpAddr> {
    output
        .lines()
        .filter_map(|line| line.trim().parse::<IpAddr>().ok())
        .collect()
}

/// Answer addresses from `nslookup`, ignoring the server block
pub fn parse_nslookup(output: &str) -> Vec<IpAddr> {
    let mut in_answer = false;
    let mut addresses = Vec::new();
    for line in output.lines().map(str::trim) {
        if line.starts_with("Name:") {
            in_answer = true;
            continue;
        }
        if !in_answer {
            continue;
        }
        if let Some(rest) = line.strip_prefix("Address:").or_else(|| line.strip_prefix("Addresses:")) {
            if let Ok(addr) = rest.trim().parse::<IpAddr>() {
                addresses.push(addr);
            }
        }
    }
    addresses
}

/// `(ping_ms, download_mbps, upload_mbps)` from `speedtest-cli --simple`
pub fn parse_speedtest_simple(output: &str) -> Option<(Option<f64>, f64, f64)> {
    let value = |label: &str| {
        output
            .lines()
            .find_map(|line| line.trim().strip_prefix(label))
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|v| v.parse::<f64>().ok())
    };
    Some((value("Ping:"), value("Download:")?, value("Upload:")?))
}

/// `(ping_ms, download_mbps, upload_mbps)` from `speedtest --format=json`
pub fn parse_speedtest_json(output: &str) -> Option<(Option<f64>, f64, f64)> {
    let json: Value = serde_json::from_str(output.trim()).ok()?;
    let to_mbps = |bytes_per_sec: f64| bytes_per_sec * 8.0 / 1_000_000.0;
    let download = json["download"]["bandwidth"].as_f64().map(to_mbps)?;
    let upload = json["upload"]["bandwidth"].as_f64().map(to_mbps)?;
    let ping = json["ping"]["latency"].as_f64();
    Some((ping, download, upload))
}

/// Keep the last `count` lines matching any keyword (case-insensitive).
/// An empty filter keeps every line.
pub fn filter_log_lines(lines: &[String], filter: &[String], count: usize) -> Vec<String> {
    let keywords: Vec<String> = filter.iter().map(|k| k.to_lowercase()).collect();
    let matched: Vec<&String> = lines
        .iter()
        .filter(|line| {
            if keywords.is_empty() {
                return true;
            }
            let lower = line.to_lowercase();
            keywords.iter().any(|k| lower.contains(k.as_str()))
        })
        .collect();
    let skip = matched.len().saturating_sub(count);
    matched.into_iter().skip(skip).cloned().collect()
}

//! Configuration management
//!
//! Handles:
//! - Probe targets (hosts, URL, DNS servers)
//! - Schedule (loop interval, slow-probe periods, throttle window)
//! - Report output (log file, format, debug)
//! - Environment overrides with the classic variable names
//!
//! Invalid numeric values never abort startup: they are reset to their
//! default and reported back as warnings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetwatchConfig {
    pub targets: TargetsConfig,
    pub schedule: ScheduleConfig,
    pub probes: ProbesConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    pub primary_host: String,
    pub secondary_host: String,
    pub tertiary_host: String,
    pub test_url: String,
    pub dns_domain: String,
    pub alt_dns: String,
    pub trace_target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_secs: u64,
    pub speed_test_interval_mins: u32,
    pub traceroute_interval_mins: u32,
    /// Throttled probes fire during the first N seconds of each minute
    pub throttle_window_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbesConfig {
    pub ping_count: u32,
    pub ping_sizes: Vec<u32>,
    pub wifi_interface: Option<String>,
    pub log_filter: Vec<String>,
    pub log_lines: usize,
    pub throughput_tools: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub log_file: Option<PathBuf>,
    pub format: ReportFormat,
    pub debug: bool,
    pub bandwidth_state: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Text,
    Json,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            primary_host: "8.8.8.8".to_string(),
            secondary_host: "1.1.1.1".to_string(),
            tertiary_host: "208.67.222.222".to_string(),
            test_url: "https://www.google.com".to_string(),
            dns_domain: "google.com".to_string(),
            alt_dns: "1.1.1.1".to_string(),
            trace_target: "8.8.8.8".to_string(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            speed_test_interval_mins: 30,
            traceroute_interval_mins: 15,
            throttle_window_secs: 30,
        }
    }
}

impl Default for ProbesConfig {
    fn default() -> Self {
        Self {
            ping_count: 10,
            ping_sizes: vec![56, 1400],
            wifi_interface: None,
            log_filter: ["wlan", "wlp", "eth", "enp", "dhcp", "link", "NetworkManager", "wpa_supplicant"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            log_lines: 20,
            throughput_tools: vec!["speedtest-cli".to_string(), "speedtest".to_string()],
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            format: ReportFormat::Text,
            debug: false,
            bandwidth_state: None,
        }
    }
}

/// A field that failed validation and was reset
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigWarning {
    pub field: &'static str,
    pub value: String,
    pub default: String,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} = {:?} is not a positive integer, using default {}",
            self.field, self.value, self.default
        )
    }
}

/// Source of environment variables; swapped out in tests
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// Process environment
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl<F: Fn(&str) -> Option<String>> EnvSource for F {
    fn var(&self, key: &str) -> Option<String> {
        self(key)
    }
}

impl NetwatchConfig {
    /// Load from `path`, `$NETWATCH_CONFIG` or the OS config dir. A missing file yields defaults.
    ///
    /// Numeric fields of the wrong type or out of range are reset to their
    /// default and returned as warnings; only broken TOML is an error.
    pub fn load(path: Option<&Path>) -> Result<(Self, Vec<ConfigWarning>), ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match std::env::var_os("NETWATCH_CONFIG") {
                Some(p) => PathBuf::from(p),
                None => Self::config_file_path()?,
            },
        };

        if !path.exists() {
            return Ok((Self::default(), Vec::new()));
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<(Self, Vec<ConfigWarning>), toml::de::Error> {
        let mut table: toml::Table = content.parse()?;
        let mut warnings = Vec::new();
        let defaults = Self::default();

        if let Some(toml::Value::Table(schedule)) = table.get_mut("schedule") {
            let d = &defaults.schedule;
            numeric_field(schedule, "schedule.interval_secs", u64::MAX, d.interval_secs, &mut warnings);
            numeric_field(schedule, "schedule.speed_test_interval_mins", u32::MAX.into(), d.speed_test_interval_mins, &mut warnings);
            numeric_field(schedule, "schedule.traceroute_interval_mins", u32::MAX.into(), d.traceroute_interval_mins, &mut warnings);
            numeric_field(schedule, "schedule.throttle_window_secs", u32::MAX.into(), d.throttle_window_secs, &mut warnings);
        }
        if let Some(toml::Value::Table(probes)) = table.get_mut("probes") {
            let d = &defaults.probes;
            numeric_field(probes, "probes.ping_count", u32::MAX.into(), d.ping_count, &mut warnings);
            numeric_field(probes, "probes.log_lines", u32::MAX.into(), d.log_lines, &mut warnings);

            let sizes_ok = match probes.get("ping_sizes") {
                None => true,
                Some(toml::Value::Array(items)) => items
                    .iter()
                    .all(|v| v.as_integer().map_or(false, |n| n >= 0 && n <= i64::from(u32::MAX))),
                Some(_) => false,
            };
            if !sizes_ok {
                if let Some(raw) = probes.remove("ping_sizes") {
                    warnings.push(ConfigWarning {
                        field: "probes.ping_sizes",
                        value: raw.to_string(),
                        default: format!("{:?}", d.ping_sizes),
                    });
                }
            }
        }

        let config = toml::Value::Table(table).try_into()?;
        Ok((config, warnings))
    }

    /// OS-specific config file path
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push("netwatch");
        path.push("config.toml");
        Ok(path)
    }

    /// Where the bandwidth sample lives unless configured
    pub fn bandwidth_state_path(&self) -> PathBuf {
        if let Some(path) = &self.report.bandwidth_state {
            return path.clone();
        }
        let mut path = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        path.push("netwatch");
        path.push("bandwidth_sample");
        path
    }

    /// Apply overrides from the environment. Unparseable or zero numbers fall back to the default.
    pub fn apply_env(&mut self, env: &dyn EnvSource) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let text = |key: &str, target: &mut String| {
            if let Some(v) = env.var(key).filter(|v| !v.trim().is_empty()) {
                *target = v.trim().to_string();
            }
        };
        text("TEST_HOST", &mut self.targets.primary_host);
        text("TEST_HOST_2", &mut self.targets.secondary_host);
        text("TEST_HOST_3", &mut self.targets.tertiary_host);
        text("TEST_URL", &mut self.targets.test_url);
        text("ALT_DNS", &mut self.targets.alt_dns);

        let defaults = Self::default();
        numeric_env(env, "PING_COUNT", &mut self.probes.ping_count, defaults.probes.ping_count, &mut warnings);
        numeric_env(env, "INTERVAL", &mut self.schedule.interval_secs, defaults.schedule.interval_secs, &mut warnings);
        numeric_env(
            env,
            "SPEED_TEST_INTERVAL",
            &mut self.schedule.speed_test_interval_mins,
            defaults.schedule.speed_test_interval_mins,
            &mut warnings,
        );
        numeric_env(
            env,
            "TRACEROUTE_INTERVAL",
            &mut self.schedule.traceroute_interval_mins,
            defaults.schedule.traceroute_interval_mins,
            &mut warnings,
        );

        if let Some(v) = env.var("DEBUG") {
            self.report.debug = matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(v) = env.var("LOG_FILE").filter(|v| !v.trim().is_empty()) {
            self.report.log_file = Some(PathBuf::from(v.trim()));
        }

        warnings
    }

    /// Reset every non-positive numeric field to its default
    pub fn validate(&mut self) -> Vec<ConfigWarning> {
        let defaults = Self::default();
        let mut warnings = Vec::new();

        positive("probes.ping_count", &mut self.probes.ping_count, defaults.probes.ping_count, &mut warnings);
        positive("probes.log_lines", &mut self.probes.log_lines, defaults.probes.log_lines, &mut warnings);
        positive("schedule.interval_secs", &mut self.schedule.interval_secs, defaults.schedule.interval_secs, &mut warnings);
        positive(
            "schedule.speed_test_interval_mins",
            &mut self.schedule.speed_test_interval_mins,
            defaults.schedule.speed_test_interval_mins,
            &mut warnings,
        );
        positive(
            "schedule.traceroute_interval_mins",
            &mut self.schedule.traceroute_interval_mins,
            defaults.schedule.traceroute_interval_mins,
            &mut warnings,
        );
        positive(
            "schedule.throttle_window_secs",
            &mut self.schedule.throttle_window_secs,
            defaults.schedule.throttle_window_secs,
            &mut warnings,
        );

        if self.schedule.throttle_window_secs > 60 {
            warnings.push(ConfigWarning {
                field: "schedule.throttle_window_secs",
                value: self.schedule.throttle_window_secs.to_string(),
                default: defaults.schedule.throttle_window_secs.to_string(),
            });
            self.schedule.throttle_window_secs = defaults.schedule.throttle_window_secs;
        }

        if self.probes.ping_sizes.is_empty() || self.probes.ping_sizes.contains(&0) {
            warnings.push(ConfigWarning {
                field: "probes.ping_sizes",
                value: format!("{:?}", self.probes.ping_sizes),
                default: format!("{:?}", defaults.probes.ping_sizes),
            });
            self.probes.ping_sizes = defaults.probes.ping_sizes;
        }

        warnings
    }

    /// The three reachability targets, in report order
    pub fn hosts(&self) -> [&str; 3] {
        [
            &self.targets.primary_host,
            &self.targets.secondary_host,
            &self.targets.tertiary_host,
        ]
    }
}

fn positive<T>(field: &'static str, value: &mut T, default: T, warnings: &mut Vec<ConfigWarning>)
where
    T: Copy + Default + PartialEq + std::fmt::Display,
{
    if *value == T::default() {
        warnings.push(ConfigWarning {
            field,
            value: value.to_string(),
            default: default.to_string(),
        });
        *value = default;
    }
}

/// Drop `field` from `section` unless it is an integer in `0..=max`, recording a warning
fn numeric_field<T: std::fmt::Display>(
    section: &mut toml::Table,
    field: &'static str,
    max: u64,
    default: T,
    warnings: &mut Vec<ConfigWarning>,
) {
    let key = field.rsplit_once('.').map_or(field, |(_, key)| key);
    let valid = match section.get(key) {
        None => return,
        Some(value) => value.as_integer().map_or(false, |n| n >= 0 && (n as u64) <= max),
    };
    if valid {
        return;
    }
    if let Some(raw) = section.remove(key) {
        warnings.push(ConfigWarning {
            field,
            value: raw.to_string(),
            default: default.to_string(),
        });
    }
}

fn numeric_env<T>(env: &dyn EnvSource, key: &'static str, target: &mut T, default: T, warnings: &mut Vec<ConfigWarning>)
where
    T: std::str::FromStr + Default + PartialEq + std::fmt::Display,
{
    let Some(raw) = env.var(key) else { return };
    match raw.trim().parse::<T>() {
        Ok(v) if v != T::default() => *target = v,
        _ => {
            warnings.push(ConfigWarning {
                field: key,
                value: raw,
                default: default.to_string(),
            });
            *target = default;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = NetwatchConfig::default();
        assert_eq!(config.probes.ping_count, 10);
        assert_eq!(config.schedule.interval_secs, 30);
        assert_eq!(config.report.format, ReportFormat::Text);
        assert_eq!(config.hosts()[0], "8.8.8.8");
    }

    #[test]
    fn test_config_file_path() {
        let path = NetwatchConfig::config_file_path().unwrap();
        assert!(path.to_string_lossy().contains("netwatch"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let (config, warnings) = NetwatchConfig::from_toml(
            r#"
            [targets]
            primary_host = "9.9.9.9"

            [schedule]
            traceroute_interval_mins = 5

            [report]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.targets.primary_host, "9.9.9.9");
        assert_eq!(config.targets.secondary_host, "1.1.1.1");
        assert_eq!(config.schedule.traceroute_interval_mins, 5);
        assert_eq!(config.schedule.interval_secs, 30);
        assert_eq!(config.report.format, ReportFormat::Json);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let (config, warnings) = NetwatchConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, NetwatchConfig::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_negative_interval_in_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[schedule]\ninterval_secs = -5\ntraceroute_interval_mins = 5\n").unwrap();

        let (config, warnings) = NetwatchConfig::load(Some(&path)).unwrap();
        assert_eq!(config.schedule.interval_secs, 30);
        assert_eq!(config.schedule.traceroute_interval_mins, 5);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "schedule.interval_secs");
        assert_eq!(warnings[0].value, "-5");
    }

    #[test]
    fn test_wrongly_typed_numbers_fall_back() {
        let (config, warnings) = NetwatchConfig::from_toml(
            r#"
            [probes]
            ping_count = "ten"
            ping_sizes = [56, -1]
            log_lines = 15

            [targets]
            primary_host = "9.9.9.9"
            "#,
        )
        .unwrap();
        assert_eq!(config.probes.ping_count, 10);
        assert_eq!(config.probes.ping_sizes, vec![56, 1400]);
        assert_eq!(config.probes.log_lines, 15);
        assert_eq!(config.targets.primary_host, "9.9.9.9");

        let fields: Vec<&str> = warnings.iter().map(|w| w.field).collect();
        assert_eq!(fields, vec!["probes.ping_count", "probes.ping_sizes"]);
    }

    #[test]
    fn test_bad_toml_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[schedule\ninterval_secs = ").unwrap();
        assert!(matches!(NetwatchConfig::load(Some(&path)), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validate_resets_zeroes() {
        let mut config = NetwatchConfig::default();
        config.probes.ping_count = 0;
        config.schedule.speed_test_interval_mins = 0;
        config.probes.ping_sizes.clear();

        let warnings = config.validate();
        assert_eq!(warnings.len(), 3);
        assert_eq!(config.probes.ping_count, 10);
        assert_eq!(config.schedule.speed_test_interval_mins, 30);
        assert_eq!(config.probes.ping_sizes, vec![56, 1400]);
        assert!(warnings[0].to_string().contains("probes.ping_count"));
    }

    #[test]
    fn test_validate_clean_config() {
        let mut config = NetwatchConfig::default();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = NetwatchConfig::default();
        let env = env_from(&[
            ("TEST_HOST", "192.0.2.1"),
            ("PING_COUNT", "4"),
            ("SPEED_TEST_INTERVAL", "60"),
            ("DEBUG", "true"),
        ]);
        let warnings = config.apply_env(&env);
        assert!(warnings.is_empty());
        assert_eq!(config.targets.primary_host, "192.0.2.1");
        assert_eq!(config.probes.ping_count, 4);
        assert_eq!(config.schedule.speed_test_interval_mins, 60);
        assert!(config.report.debug);
    }

    #[test]
    fn test_invalid_env_numbers_fall_back() {
        let mut config = NetwatchConfig::default();
        config.schedule.interval_secs = 90;
        let env = env_from(&[("INTERVAL", "-5"), ("TRACEROUTE_INTERVAL", "abc"), ("PING_COUNT", "0")]);
        let warnings = config.apply_env(&env);
        assert_eq!(warnings.len(), 3);
        assert_eq!(config.schedule.interval_secs, 30);
        assert_eq!(config.schedule.traceroute_interval_mins, 15);
        assert_eq!(config.probes.ping_count, 10);
    }
}

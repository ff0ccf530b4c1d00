//! Netwatch - continuous network health diagnostics
//!
//! Runs a fixed battery of probes (reachability, DNS, HTTP, link state,
//! routing, WiFi, router logs, MTU, throughput) once per interval and
//! reports every result in order. Expensive probes are throttled by a
//! wall-clock cadence gate. Probe failures never stop a cycle.

pub mod cadence;
pub mod collaborator;
pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod probes;
pub mod scheduler;
pub mod shutdown;
pub mod sink;

pub use collaborator::{Collaborator, SystemCollaborator};
pub use config::NetwatchConfig;
pub use model::{ProbeId, ProbeResult, ProbeStatus};
pub use scheduler::Scheduler;
pub use shutdown::{Shutdown, ShutdownTrigger};

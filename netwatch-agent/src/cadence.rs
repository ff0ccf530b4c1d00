//! Cadence gate for low-frequency probes
//!
//! The gate holds no state: a probe with a period of P minutes is due when
//! the wall-clock minute is a multiple of P, and a window-gated probe is due
//! while the wall-clock second is inside the window. A restart never loses
//! or double-books a run. Every cycle landing in the due minute fires the
//! probe again; callers treat that as normal.

use chrono::{DateTime, Local, Timelike};

/// `true` when `now` falls in a minute that is a multiple of `period_minutes`.
/// A zero period is never due.
pub fn is_due<T: Timelike>(now: &T, period_minutes: u32) -> bool {
    if period_minutes == 0 {
        return false;
    }
    now.minute() % period_minutes == 0
}

/// `true` during the first `window_seconds` seconds of every minute
pub fn is_due_within_window<T: Timelike>(now: &T, window_seconds: u32) -> bool {
    now.second() < window_seconds
}

/// Due-ness decisions for one cycle
pub trait CadenceGate: Send + Sync {
    fn is_due(&self, period_minutes: u32) -> bool;
    fn is_due_within_window(&self, window_seconds: u32) -> bool;
}

/// Gate evaluated against a fixed wall-clock instant (the cycle start)
#[derive(Debug, Clone, Copy)]
pub struct WallClockGate {
    now: DateTime<Local>,
}

impl WallClockGate {
    pub fn at(now: DateTime<Local>) -> Self {
        Self { now }
    }

    pub fn now() -> Self {
        Self::at(Local::now())
    }
}

impl CadenceGate for WallClockGate {
    fn is_due(&self, period_minutes: u32) -> bool {
        is_due(&self.now, period_minutes)
    }

    fn is_due_within_window(&self, window_seconds: u32) -> bool {
        is_due_within_window(&self.now, window_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn at(minute: u32, second: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(14, minute, second).unwrap()
    }

    #[test]
    fn test_period_gate() {
        assert!(is_due(&at(6, 0), 3));
        assert!(!is_due(&at(7, 0), 3));
        assert!(is_due(&at(0, 0), 5));
        assert!(is_due(&at(45, 59), 15));
        assert!(is_due(&at(13, 10), 1));
    }

    #[test]
    fn test_zero_period_never_due() {
        assert!(!is_due(&at(0, 0), 0));
    }

    #[test]
    fn test_window_gate() {
        assert!(is_due_within_window(&at(10, 0), 30));
        assert!(is_due_within_window(&at(10, 29), 30));
        assert!(!is_due_within_window(&at(10, 30), 30));
        assert!(!is_due_within_window(&at(10, 59), 30));
    }

    #[test]
    fn test_same_minute_fires_repeatedly() {
        // Two cycles 20s apart inside a due minute are both due
        assert!(is_due(&at(30, 5), 15));
        assert!(is_due(&at(30, 25), 15));
    }

    #[test]
    fn test_wall_clock_gate() {
        let now = Local.with_ymd_and_hms(2026, 3, 1, 9, 12, 10).unwrap();
        let gate = WallClockGate::at(now);
        assert!(gate.is_due(4));
        assert!(!gate.is_due(5));
        assert!(gate.is_due_within_window(30));
        assert!(!gate.is_due_within_window(10));
    }
}

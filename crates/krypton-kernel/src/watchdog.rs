//! [`CycleWatchdog`] – control-cycle overrun monitor.
//!
//! Every controller operation must finish well within one control period.
//! The control loop wraps each cycle in [`CycleWatchdog::begin`] /
//! [`CycleWatchdog::finish`] (or reports a measured duration through
//! [`CycleWatchdog::record`]); the watchdog compares the elapsed time against
//! the period, logs overruns, and keeps counters a supervisor can inspect.

use std::time::{Duration, Instant};

use tracing::{error, warn};

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Timing verdict for a single cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleHealth {
    /// The cycle finished within its period.
    OnTime,
    /// The cycle took longer than its period.
    Overrun { by: Duration },
}

/// Start time of an in-flight cycle, returned by [`CycleWatchdog::begin`].
#[derive(Debug, Clone, Copy)]
#[must_use = "pass the timer to CycleWatchdog::finish"]
pub struct CycleTimer {
    started: Instant,
}

// ────────────────────────────────────────────────────────────────────────────
// Watchdog
// ────────────────────────────────────────────────────────────────────────────

/// Measures cycles against a fixed period.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use krypton_kernel::watchdog::{CycleHealth, CycleWatchdog};
///
/// let mut wd = CycleWatchdog::new(Duration::from_millis(20));
/// assert_eq!(wd.record(Duration::from_millis(3)), CycleHealth::OnTime);
/// assert_eq!(
///     wd.record(Duration::from_millis(25)),
///     CycleHealth::Overrun { by: Duration::from_millis(5) }
/// );
/// assert_eq!(wd.overruns(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct CycleWatchdog {
    period: Duration,
    /// Consecutive overruns at which the log level escalates to `error`.
    escalate_after: u32,
    cycles: u64,
    overruns: u64,
    consecutive: u32,
    worst: Duration,
}

impl CycleWatchdog {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            escalate_after: 5,
            cycles: 0,
            overruns: 0,
            consecutive: 0,
            worst: Duration::ZERO,
        }
    }

    /// Escalate logging after `n` consecutive overruns (minimum 1).
    pub fn with_escalation(mut self, n: u32) -> Self {
        self.escalate_after = n.max(1);
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn begin(&self) -> CycleTimer {
        CycleTimer {
            started: Instant::now(),
        }
    }

    pub fn finish(&mut self, timer: CycleTimer) -> CycleHealth {
        self.record(timer.started.elapsed())
    }

    /// Account for one cycle that took `elapsed`.
    pub fn record(&mut self, elapsed: Duration) -> CycleHealth {
        self.cycles += 1;
        self.worst = self.worst.max(elapsed);

        if elapsed <= self.period {
            self.consecutive = 0;
            return CycleHealth::OnTime;
        }

        self.overruns += 1;
        self.consecutive += 1;
        let by = elapsed - self.period;
        if self.consecutive >= self.escalate_after {
            error!(
                elapsed_us = elapsed.as_micros() as u64,
                period_us = self.period.as_micros() as u64,
                consecutive = self.consecutive,
                "control loop persistently overrunning"
            );
        } else {
            warn!(
                elapsed_us = elapsed.as_micros() as u64,
                period_us = self.period.as_micros() as u64,
                "control cycle overran its period"
            );
        }
        CycleHealth::Overrun { by }
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Overruns since the last on-time cycle.
    pub fn consecutive_overruns(&self) -> u32 {
        self.consecutive
    }

    /// Longest cycle seen so far.
    pub fn worst_cycle(&self) -> Duration {
        self.worst
    }

    /// Time left in the current period for a cycle that has run `elapsed`.
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.period.saturating_sub(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_millis(20);

    #[test]
    fn cycle_at_exact_period_is_on_time() {
        let mut wd = CycleWatchdog::new(PERIOD);
        assert_eq!(wd.record(PERIOD), CycleHealth::OnTime);
        assert_eq!(wd.overruns(), 0);
        assert_eq!(wd.cycles(), 1);
    }

    #[test]
    fn on_time_cycle_resets_consecutive_count() {
        let mut wd = CycleWatchdog::new(PERIOD);
        wd.record(Duration::from_millis(30));
        wd.record(Duration::from_millis(30));
        assert_eq!(wd.consecutive_overruns(), 2);
        wd.record(Duration::from_millis(1));
        assert_eq!(wd.consecutive_overruns(), 0);
        assert_eq!(wd.overruns(), 2);
    }

    #[test]
    fn worst_cycle_is_tracked() {
        let mut wd = CycleWatchdog::new(PERIOD).with_escalation(1);
        wd.record(Duration::from_millis(4));
        wd.record(Duration::from_millis(41));
        wd.record(Duration::from_millis(7));
        assert_eq!(wd.worst_cycle(), Duration::from_millis(41));
    }

    #[test]
    fn remaining_saturates() {
        let wd = CycleWatchdog::new(PERIOD);
        assert_eq!(wd.remaining(Duration::from_millis(5)), Duration::from_millis(15));
        assert_eq!(wd.remaining(Duration::from_millis(50)), Duration::ZERO);
    }

    #[test]
    fn begin_finish_measures_wall_time() {
        let mut wd = CycleWatchdog::new(Duration::from_secs(60));
        let timer = wd.begin();
        assert_eq!(wd.finish(timer), CycleHealth::OnTime);
        assert_eq!(wd.cycles(), 1);
    }
}

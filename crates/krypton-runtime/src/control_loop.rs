//! [`ControlLoop`] – the fixed-period cycle that keeps commands running.
//!
//! Each cycle:
//!
//! 1. **Refresh** – every driver in the [`HardwareRegistry`] updates its
//!    cached readings (simulated drivers integrate one period of motion).
//! 2. **Run** – the [`CommandScheduler`] executes every scheduled command and
//!    retires the finished ones.
//! 3. **Measure** – the [`CycleWatchdog`] compares the cycle's duration with
//!    the period and logs overruns.
//!
//! [`ControlLoop::run`] repeats this until nothing is scheduled, a cycle
//! limit is reached, or the shared stop flag is raised (Ctrl-C).  A raised
//! flag cancels every command, so actuators are stopped through each
//! command's `end(true)` instead of being abandoned mid-motion.
//!
//! The registry lock is released before commands run; controllers lock it
//! again through their own `Arc<Mutex<_>>` handles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use krypton_hal::HardwareRegistry;
use krypton_kernel::{Command, CommandHandle, CommandScheduler, CycleHealth, CycleWatchdog};
use krypton_types::ControlError;
use tracing::{debug, info, warn};

/// Why [`ControlLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every command finished or was cancelled on failure.
    Idle,
    /// The stop flag was raised; all commands were cancelled.
    Interrupted,
    /// `max_cycles` elapsed with commands still running.
    CycleLimit,
}

/// Result of a single [`ControlLoop::cycle`].
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Commands that ended during this cycle.
    pub ended: Vec<CommandHandle>,
    pub health: CycleHealth,
}

pub struct ControlLoop {
    hw: Arc<Mutex<HardwareRegistry>>,
    scheduler: CommandScheduler,
    watchdog: CycleWatchdog,
    /// Sleep out the remainder of each period.  Off for tests and
    /// faster-than-real-time simulation.
    realtime: bool,
}

impl ControlLoop {
    pub fn new(hw: Arc<Mutex<HardwareRegistry>>, period: Duration) -> Self {
        Self {
            hw,
            scheduler: CommandScheduler::new(),
            watchdog: CycleWatchdog::new(period),
            realtime: false,
        }
    }

    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn period(&self) -> Duration {
        self.watchdog.period()
    }

    pub fn scheduler(&self) -> &CommandScheduler {
        &self.scheduler
    }

    pub fn watchdog(&self) -> &CycleWatchdog {
        &self.watchdog
    }

    pub fn hardware(&self) -> &Arc<Mutex<HardwareRegistry>> {
        &self.hw
    }

    /// Hand a command to the scheduler.
    ///
    /// # Errors
    ///
    /// See [`CommandScheduler::schedule`].
    pub fn schedule(&mut self, command: Box<dyn Command>) -> Result<CommandHandle, ControlError> {
        self.scheduler.schedule(command)
    }

    pub fn cancel(&mut self, handle: CommandHandle) -> bool {
        self.scheduler.cancel(handle)
    }

    pub fn cancel_all(&mut self) {
        self.scheduler.cancel_all();
    }

    /// Run one refresh/execute/measure cycle.
    pub fn cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        let period = self.watchdog.period();

        match self.hw.lock() {
            Ok(mut hw) => hw.refresh(period),
            Err(_) => warn!("hardware registry lock poisoned; skipping refresh"),
        }

        let ended = self.scheduler.run_cycle();
        let health = self.watchdog.record(started.elapsed());
        CycleReport { ended, health }
    }

    /// Cycle until idle, interrupted, or `max_cycles` have run.
    pub fn run(&mut self, stop: &AtomicBool, max_cycles: Option<u64>) -> RunOutcome {
        let mut ran = 0u64;
        loop {
            if stop.load(Ordering::SeqCst) {
                info!(cycles = ran, "stop requested; cancelling commands");
                self.scheduler.cancel_all();
                return RunOutcome::Interrupted;
            }
            if self.scheduler.is_empty() {
                debug!(cycles = ran, "control loop idle");
                return RunOutcome::Idle;
            }
            if max_cycles.is_some_and(|max| ran >= max) {
                return RunOutcome::CycleLimit;
            }

            let started = Instant::now();
            self.cycle();
            ran += 1;

            if self.realtime {
                std::thread::sleep(self.watchdog.remaining(started.elapsed()));
            }
        }
    }

    /// Cancel everything and command every actuator to stop.
    ///
    /// # Errors
    ///
    /// [`ControlError::HardwareFault`] when the registry is poisoned or an
    /// actuator rejects its stop.
    pub fn shutdown(&mut self) -> Result<(), ControlError> {
        self.scheduler.cancel_all();
        let mut hw = self
            .hw
            .lock()
            .map_err(|_| ControlError::hardware("registry", "hardware registry lock poisoned"))?;
        hw.stop_all()
    }
}

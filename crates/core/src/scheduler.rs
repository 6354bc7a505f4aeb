//! Credit-based cycle pacing.
//!
//! A ticker thread grants a quantum of cycle credit at a fixed rate and wakes
//! the execution thread. The execution thread checks credit before every
//! instruction, charges the instruction's cost after it retires, and sleeps on
//! the wake signal whenever credit runs out. An optional reporter thread logs
//! the achieved clock rate.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::logging::{log, LogCategory, LogLevel};

/// Pacing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Target clock rate in cycles per second
    pub target_hz: u64,
    /// How often credit is granted
    pub ticks_per_second: u32,
    /// Interval of the clock-rate report; `None` disables the reporter
    pub report_interval_secs: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target_hz: 985_000,
            ticks_per_second: 477,
            report_interval_secs: Some(4),
        }
    }
}

impl SchedulerConfig {
    /// Cycles granted per tick.
    pub fn quantum(&self) -> i64 {
        (self.target_hz / u64::from(self.ticks_per_second.max(1))) as i64
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(1) / self.ticks_per_second.max(1)
    }
}

/// Single-slot wake flag. A release that happens before the waiter arrives is
/// kept until the waiter consumes it.
#[derive(Debug, Default)]
pub struct WakeSignal {
    released: Mutex<bool>,
    cond: Condvar,
}

impl WakeSignal {
    pub fn release(&self) {
        let mut released = self.released.lock();
        *released = true;
        self.cond.notify_all();
    }

    /// Block until released, then clear the slot.
    pub fn wait_and_clear(&self) {
        let mut released = self.released.lock();
        while !*released {
            self.cond.wait(&mut released);
        }
        *released = false;
    }

    pub fn clear(&self) {
        *self.released.lock() = false;
    }
}

/// Shared cycle credit between the ticker and the execution thread.
#[derive(Debug, Default)]
pub struct CycleBudget {
    credit: AtomicI64,
    executed: AtomicU64,
    grants: AtomicU64,
    wake: WakeSignal,
}

impl CycleBudget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset credit to `quantum`, minus any debt left by the last
    /// instruction's overshoot, and wake the execution thread.
    pub fn grant(&self, quantum: i64) {
        // fetch_update only fails when the closure returns None.
        let _ = self
            .credit
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |credit| {
                Some(quantum + credit.min(0))
            });
        self.grants.fetch_add(1, Ordering::Relaxed);
        self.wake.release();
    }

    /// Consume `cycles` of credit.
    #[inline]
    pub fn charge(&self, cycles: u32) {
        self.credit.fetch_sub(i64::from(cycles), Ordering::AcqRel);
        self.executed.fetch_add(u64::from(cycles), Ordering::Relaxed);
    }

    pub fn credit(&self) -> i64 {
        self.credit.load(Ordering::Acquire)
    }

    /// Cycles charged since the last [`take_executed`](Self::take_executed).
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    pub fn take_executed(&self) -> u64 {
        self.executed.swap(0, Ordering::Relaxed)
    }

    pub fn grants(&self) -> u64 {
        self.grants.load(Ordering::Relaxed)
    }

    /// Wait until at least one cycle of credit is available.
    ///
    /// Returns `false` once `control` is stopped. While paused the caller
    /// sleeps on the wake signal regardless of credit.
    pub fn acquire(&self, control: &RunControl) -> bool {
        loop {
            if control.is_stopped() {
                return false;
            }
            if control.is_paused() {
                self.wake.wait_and_clear();
                continue;
            }
            if self.credit() >= 1 {
                return true;
            }
            self.wake.wait_and_clear();
        }
    }

    pub fn wake(&self) {
        self.wake.release();
    }
}

#[derive(Debug, Default)]
struct RunFlags {
    stop: AtomicBool,
    pause: AtomicBool,
}

/// Stop and pause requests for a running execution loop.
///
/// Clones share the same flags, so one can be handed to another thread.
#[derive(Debug, Clone)]
pub struct RunControl {
    flags: Arc<RunFlags>,
    budget: Arc<CycleBudget>,
}

impl RunControl {
    pub fn new(budget: Arc<CycleBudget>) -> Self {
        Self {
            flags: Arc::new(RunFlags::default()),
            budget,
        }
    }

    /// Request a stop. Wakes a loop starved of credit so it sees the request.
    pub fn stop(&self) {
        self.flags.stop.store(true, Ordering::Release);
        self.budget.wake();
    }

    pub fn is_stopped(&self) -> bool {
        self.flags.stop.load(Ordering::Acquire)
    }

    pub fn pause(&self) {
        self.flags.pause.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.flags.pause.store(false, Ordering::Release);
        self.budget.wake();
    }

    pub fn is_paused(&self) -> bool {
        self.flags.pause.load(Ordering::Acquire)
    }

    pub fn budget(&self) -> &Arc<CycleBudget> {
        &self.budget
    }
}

/// Running ticker (and optional reporter) threads.
///
/// Dropping the handle stops and joins them.
pub struct Scheduler {
    stop: Arc<AtomicBool>,
    ticker: Option<JoinHandle<()>>,
    reporter: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the pacing threads. A config whose quantum rounds to zero cycles
    /// would never grant credit and is rejected with `InvalidInput`.
    pub fn start(config: SchedulerConfig, budget: Arc<CycleBudget>) -> io::Result<Self> {
        if config.quantum() <= 0 {
            let msg = format!(
                "{} Hz at {} ticks/s grants no cycles per tick",
                config.target_hz, config.ticks_per_second
            );
            log(LogCategory::Scheduler, LogLevel::Error, || {
                format!("Scheduler: {}", msg)
            });
            return Err(io::Error::new(io::ErrorKind::InvalidInput, msg));
        }

        let stop = Arc::new(AtomicBool::new(false));

        let ticker = {
            let stop = stop.clone();
            let budget = budget.clone();
            let quantum = config.quantum();
            let period = config.tick_period();
            thread::Builder::new()
                .name("cycle-ticker".into())
                .spawn(move || {
                    let mut deadline = Instant::now();
                    while !stop.load(Ordering::Acquire) {
                        budget.grant(quantum);
                        deadline += period;
                        sleep_until(deadline, &stop);
                        let now = Instant::now();
                        if now > deadline + period {
                            // Fell behind by more than a tick; do not burst.
                            deadline = now;
                        }
                    }
                })?
        };

        let reporter = match config.report_interval_secs.filter(|&s| s > 0) {
            Some(secs) => {
                let stop = stop.clone();
                let budget = budget.clone();
                let interval = Duration::from_secs(secs);
                Some(
                    thread::Builder::new()
                        .name("cycle-reporter".into())
                        .spawn(move || loop {
                            sleep_until(Instant::now() + interval, &stop);
                            if stop.load(Ordering::Acquire) {
                                break;
                            }
                            let executed = budget.take_executed();
                            log(LogCategory::Scheduler, LogLevel::Info, || {
                                format!("Scheduler: {} cycles/s", executed / secs)
                            });
                        })?,
                )
            }
            None => None,
        };

        log(LogCategory::Scheduler, LogLevel::Debug, || {
            format!(
                "Scheduler: started at {} Hz, {} cycles every {:?}",
                config.target_hz,
                config.quantum(),
                config.tick_period()
            )
        });

        Ok(Self {
            stop,
            ticker: Some(ticker),
            reporter,
        })
    }

    /// Stop and join the threads. Idempotent.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        for handle in [self.ticker.take(), self.reporter.take()].into_iter().flatten() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log(LogCategory::Scheduler, LogLevel::Error, || {
                    "Scheduler: worker thread panicked".to_string()
                });
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn sleep_until(deadline: Instant, stop: &AtomicBool) {
    loop {
        if stop.load(Ordering::Acquire) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::park_timeout(deadline - now);
    }
}

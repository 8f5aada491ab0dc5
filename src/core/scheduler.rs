//! Drives the tick clock at a configured rate with halt/resume/step control:
//! a `tokio::spawn`ed loop selecting between a `tokio::time::interval` tick
//! and a `tokio::sync::Notify` control signal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Native-target rate ceiling (7200 native, 300 web).
pub const R_MAX_NATIVE: u32 = 7_200;
pub const R_MAX_WEB: u32 = 300;

/// `step(n)` is bounded by this safety cap regardless of the requested `n`.
pub const STEP_SAFETY_CAP: u64 = 12_000;
/// `step(n)` yields to the executor every this many ticks.
pub const STEP_YIELD_INTERVAL: u64 = 60;

/// Shared, lock-free clock state: tick counter, rate, halt flag. Cloned via
/// `Arc` into the driver task and every API handle.
pub struct TickClock {
    tick: AtomicU64,
    rate: AtomicU64,
    halted: AtomicBool,
    r_max: u32,
}

impl TickClock {
    pub fn new(r_max: u32) -> Self {
        Self {
            tick: AtomicU64::new(0),
            rate: AtomicU64::new(1),
            halted: AtomicBool::new(true),
            r_max,
        }
    }

    pub fn elapsed(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    pub fn advance_one(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Overwrites the tick counter directly, used when restoring a save file
    /// whose `current_tick` must be adopted without replaying every tick.
    pub fn set_elapsed(&self, tick: u64) {
        self.tick.store(tick, Ordering::Release);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.halted.store(false, Ordering::Release);
    }

    pub fn rate(&self) -> u32 {
        self.rate.load(Ordering::Acquire) as u32
    }

    /// Clamps to `[1, r_max]`: `0` clamps to `1`, anything above `r_max`
    /// clamps down to it.
    pub fn set_rate(&self, requested: u32) {
        let clamped = requested.clamp(1, self.r_max);
        self.rate.store(clamped as u64, Ordering::Release);
    }

    pub fn reset(&self) {
        self.tick.store(0, Ordering::Release);
        self.halted.store(true, Ordering::Release);
    }
}

/// Owns the driver task handle and the shared clock/notify pair used to wake
/// it on resume/rate-change. The driver suspends only between ticks and
/// never blocks on caller-owned locks: it only ever touches the clock and
/// the caller-supplied tick closure, never a lock it doesn't release before
/// sleeping.
pub struct TickScheduler {
    clock: Arc<TickClock>,
    notify: Arc<Notify>,
    driver: Option<JoinHandle<()>>,
}

impl TickScheduler {
    pub fn new(r_max: u32) -> Self {
        Self {
            clock: Arc::new(TickClock::new(r_max)),
            notify: Arc::new(Notify::new()),
            driver: None,
        }
    }

    pub fn clock(&self) -> Arc<TickClock> {
        self.clock.clone()
    }

    pub fn elapsed(&self) -> u64 {
        self.clock.elapsed()
    }

    pub fn is_halted(&self) -> bool {
        self.clock.is_halted()
    }

    pub fn halt(&self) {
        self.clock.halt();
    }

    pub fn resume(&self) {
        self.clock.resume();
        self.notify.notify_waiters();
    }

    pub fn set_rate(&self, r: u32) {
        self.clock.set_rate(r);
        self.notify.notify_waiters();
    }

    pub fn reset(&self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        self.clock.reset();
    }

    /// Spawns the background driver task. `run_one_tick` performs the whole
    /// per-tick pipeline under the caller's own world lock and must not
    /// itself block on that lock across a sleep.
    pub fn spawn_driver<F>(&mut self, mut run_one_tick: F)
    where
        F: FnMut(u64) + Send + 'static,
    {
        let clock = self.clock.clone();
        let notify = self.notify.clone();
        let handle = tokio::spawn(async move {
            loop {
                if clock.is_halted() {
                    notify.notified().await;
                    continue;
                }
                let tick = clock.advance_one();
                run_one_tick(tick);
                let rate = clock.rate().max(1);
                let period = Duration::from_secs_f64(1.0 / rate as f64);
                tokio::select! {
                    _ = tokio::time::sleep(period) => {}
                    _ = notify.notified() => {}
                }
            }
        });
        self.driver = Some(handle);
        info!("tick driver started");
    }

    /// Advances `n` ticks synchronously, ignoring halt state, capped at
    /// `STEP_SAFETY_CAP` and yielding every `STEP_YIELD_INTERVAL` ticks.
    pub async fn step<F>(&self, n: u64, mut run_one_tick: F)
    where
        F: FnMut(u64),
    {
        let capped = n.min(STEP_SAFETY_CAP);
        if n > STEP_SAFETY_CAP {
            warn!(requested = n, capped = STEP_SAFETY_CAP, "step() request exceeded safety cap");
        }
        for i in 0..capped {
            let tick = self.clock.advance_one();
            run_one_tick(tick);
            if i % STEP_YIELD_INTERVAL == 0 {
                tokio::task::yield_now().await;
            }
        }
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

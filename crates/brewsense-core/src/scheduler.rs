//! Cooperative polling scheduler
//!
//! Each [`PollingTask`] owns one [`Sensor`] and runs it through
//! `Idle -> Polling -> Publishing -> Idle` once per interval. A failed read
//! only skips that cycle's publish: whatever the sinks showed before stays
//! visible and the next attempt waits for the next deadline. There is no
//! retry loop anywhere in the scheduler.

use embassy_futures::join::join;
use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};

use crate::error::{Error, ErrorKind};
use crate::sensors::Sensor;

/// Raised once to stop every task
pub type ShutdownSignal = Signal<CriticalSectionRawMutex, ()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollState {
    #[default]
    Idle,
    Polling,
    Publishing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollStats {
    pub cycles: u32,
    pub published: u32,
    pub skipped: u32,
    pub consecutive_failures: u32,
    /// Deadlines dropped because a cycle overran
    pub missed_deadlines: u32,
}

/// Result of one [`PollingTask::tick`]
#[derive(Debug, PartialEq)]
pub enum TickOutcome {
    Published,
    Skipped(Error),
}

pub struct PollingTask<S> {
    sensor: S,
    interval: Duration,
    state: PollState,
    stats: PollStats,
}

impl<S: Sensor> PollingTask<S> {
    pub fn new(sensor: S, interval: Duration) -> Self {
        Self {
            sensor,
            interval,
            state: PollState::Idle,
            stats: PollStats::default(),
        }
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    pub fn into_sensor(self) -> S {
        self.sensor
    }

    pub const fn state(&self) -> PollState {
        self.state
    }

    pub const fn stats(&self) -> PollStats {
        self.stats
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one poll cycle to completion
    pub async fn tick(&mut self) -> TickOutcome {
        self.state = PollState::Polling;
        self.stats.cycles += 1;

        let outcome = match self.sensor.read().await {
            Ok(readings) => {
                self.state = PollState::Publishing;
                self.sensor.publish(&readings);
                self.stats.published += 1;
                self.stats.consecutive_failures = 0;
                TickOutcome::Published
            }
            Err(e) => {
                self.stats.skipped += 1;
                self.stats.consecutive_failures += 1;
                self.log_skip(&e);
                TickOutcome::Skipped(e)
            }
        };

        self.state = PollState::Idle;
        outcome
    }

    fn log_skip(&self, error: &Error) {
        let name = self.sensor.name();
        let failures = self.stats.consecutive_failures;
        match error.kind() {
            ErrorKind::Transient if matches!(error, Error::NoData { .. }) => {
                log::debug!("{}: skipping cycle: {}", name, error);
            }
            ErrorKind::Transient | ErrorKind::Desync | ErrorKind::Command => {
                log::warn!("{}: skipping cycle ({} in a row): {}", name, failures, error);
            }
            ErrorKind::Fatal => {
                log::error!("{}: unexpected fatal error while polling: {}", name, error);
            }
        }
    }

    /// Tick on every deadline until the future is dropped
    async fn poll_forever(&mut self) {
        let mut deadline = Instant::now();
        loop {
            self.tick().await;

            let (next, missed) = next_deadline(deadline, self.interval, Instant::now());
            if missed > 0 {
                log::warn!("{}: cycle overran, skipping {} deadline(s)", self.sensor.name(), missed);
                self.stats.missed_deadlines += missed;
            }
            deadline = next;
            Timer::at(deadline).await;
        }
    }

    fn finish(&mut self) {
        self.state = PollState::Idle;
        self.sensor.shutdown();
        log::info!(
            "{}: stopped after {} cycles ({} published, {} skipped)",
            self.sensor.name(),
            self.stats.cycles,
            self.stats.published,
            self.stats.skipped
        );
    }

    /// Poll at the fixed interval until `shutdown` is signaled.
    ///
    /// The first cycle runs immediately. A cycle in flight when the signal
    /// arrives is abandoned; the sensor is shut down either way.
    pub async fn run(&mut self, shutdown: &ShutdownSignal) {
        select(self.poll_forever(), shutdown.wait()).await;
        self.finish();
    }
}

/// Run two tasks on the current executor until `shutdown` is signaled
pub async fn run_pair<A: Sensor, B: Sensor>(
    a: &mut PollingTask<A>,
    b: &mut PollingTask<B>,
    shutdown: &ShutdownSignal,
) {
    select(join(a.poll_forever(), b.poll_forever()), shutdown.wait()).await;
    a.finish();
    b.finish();
}

/// Deadline following `previous`, plus how many deadlines were already in
/// the past at `now` and got dropped
pub fn next_deadline(previous: Instant, interval: Duration, now: Instant) -> (Instant, u32) {
    let next = previous + interval;
    if next > now {
        return (next, 0);
    }
    let period = interval.as_ticks();
    if period == 0 {
        return (now, 0);
    }
    let missed = (now - next).as_ticks() / period + 1;
    (
        next + Duration::from_ticks(period * missed),
        u32::try_from(missed).unwrap_or(u32::MAX),
    )
}

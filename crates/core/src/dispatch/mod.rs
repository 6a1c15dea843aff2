//! Realtime dispatch of an adjusted schedule against the playback clock.
//!
//! A [`Dispatcher`] walks `Idle -> Armed -> Running -> Draining -> Done`. It
//! is armed with exactly one [`Schedule`], started together with playback,
//! fires every event in order, then waits for playback to finish.
//!
//! Dropping the future returned by [`Dispatcher::run`] aborts the run. The
//! fan-out in flight at that moment may have reached only some actuators.

use std::time::Duration;

use tokio::time::Instant;

use crate::{
    adjust_schedule, fan_out, ActuatorSet, ColorCommand, ColorGateway, DispatchConfig,
    FanOutReport, LatencyEstimate, LightSyncError, Playback, PlaybackClock, RawSchedule, Result,
    Schedule,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    /// Schedule loaded, playback not started yet.
    Armed,
    /// Waiting on or firing the event at `next`.
    Running { next: usize },
    /// Every event is out; waiting for playback to end.
    Draining,
    Done,
}

/// Timing knobs for the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// The final stretch before each deadline is busy-waited instead of
    /// slept. Must be zero under a paused tokio clock, where spinning never
    /// sees time advance.
    pub spin_threshold: Duration,
    /// Interval between `is_playing` checks while draining.
    pub drain_poll: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            spin_threshold: Duration::from_millis(2),
            drain_poll: Duration::from_millis(50),
        }
    }
}

impl DispatchSettings {
    pub fn from_config(config: &DispatchConfig) -> Result<Self> {
        Ok(Self {
            spin_threshold: config.spin_threshold(),
            drain_poll: config.drain_poll()?,
        })
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub events_dispatched: usize,
    pub commands_succeeded: usize,
    pub commands_failed: usize,
    /// Worst delay between an event's deadline and its fan-out starting.
    pub max_lateness: Duration,
}

impl DispatchReport {
    fn record(&mut self, fan_out: FanOutReport, lateness: Duration) {
        self.events_dispatched += 1;
        self.commands_succeeded += fan_out.succeeded;
        self.commands_failed += fan_out.failed;
        self.max_lateness = self.max_lateness.max(lateness);
    }
}

/// Drives one schedule against one playback.
pub struct Dispatcher<'a, G: ?Sized> {
    gateway: &'a G,
    actuators: &'a ActuatorSet,
    settings: DispatchSettings,
    schedule: Option<Schedule>,
    state: DispatchState,
}

impl<'a, G> Dispatcher<'a, G>
where
    G: ColorGateway + ?Sized,
{
    pub fn new(gateway: &'a G, actuators: &'a ActuatorSet, settings: DispatchSettings) -> Self {
        Self {
            gateway,
            actuators,
            settings,
            schedule: None,
            state: DispatchState::Idle,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Loads the schedule. A dispatcher runs exactly one schedule.
    pub fn arm(&mut self, schedule: Schedule) -> Result<()> {
        if self.state != DispatchState::Idle {
            return Err(LightSyncError::validation(format!(
                "cannot arm a dispatcher in state {:?}",
                self.state
            )));
        }
        tracing::debug!(events = schedule.len(), "dispatcher armed");
        self.schedule = Some(schedule);
        self.set_state(DispatchState::Armed);
        Ok(())
    }

    /// Starts `playback` and fires every event at its offset from that
    /// moment, then waits until playback reports it has stopped.
    ///
    /// Late events are still sent. Actuator failures are counted in the
    /// report and never end the run.
    pub async fn run<P>(&mut self, playback: &mut P) -> Result<DispatchReport>
    where
        P: Playback + ?Sized,
    {
        let schedule = match (self.state, self.schedule.take()) {
            (DispatchState::Armed, Some(schedule)) => schedule,
            (state, schedule) => {
                self.schedule = schedule;
                return Err(LightSyncError::validation(format!(
                    "dispatcher must be armed before it runs, state is {state:?}"
                )));
            }
        };

        let clock = PlaybackClock::start();
        if let Err(err) = playback.start() {
            self.schedule = Some(schedule);
            return Err(err);
        }

        let mut report = DispatchReport::default();
        for (index, event) in schedule.events().iter().enumerate() {
            self.set_state(DispatchState::Running { next: index });

            let deadline = clock.deadline(event.time_seconds);
            wait_until(deadline, self.settings.spin_threshold).await;
            let lateness = Instant::now().saturating_duration_since(deadline);

            let command = ColorCommand::new(event.color, schedule.transition());
            let outcome = fan_out(self.gateway, self.actuators, command).await;
            tracing::trace!(
                index,
                time_seconds = event.time_seconds,
                color = %event.color,
                ?lateness,
                failed = outcome.failed,
                "event dispatched"
            );
            report.record(outcome, lateness);
        }

        self.set_state(DispatchState::Draining);
        while playback.is_playing() {
            tokio::time::sleep(self.settings.drain_poll).await;
        }
        self.set_state(DispatchState::Done);

        tracing::info!(
            events = report.events_dispatched,
            succeeded = report.commands_succeeded,
            failed = report.commands_failed,
            max_lateness = ?report.max_lateness,
            "light show finished"
        );
        Ok(report)
    }

    fn set_state(&mut self, state: DispatchState) {
        if !matches!(
            (self.state, state),
            (DispatchState::Running { .. }, DispatchState::Running { .. })
        ) {
            tracing::debug!(from = ?self.state, to = ?state, "dispatcher state");
        }
        self.state = state;
    }
}

/// Sleeps until shortly before `deadline`, then spins the rest of the way.
async fn wait_until(deadline: Instant, spin_threshold: Duration) {
    if let Some(coarse) = deadline.checked_sub(spin_threshold) {
        if coarse > Instant::now() {
            tokio::time::sleep_until(coarse).await;
        }
    }
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}

/// Compensates `raw` for `latency` and plays it against `actuators`.
///
/// Fails with [`LightSyncError::EmptySchedule`] before playback starts when
/// compensation leaves nothing to dispatch.
pub async fn run_schedule<G, P>(
    raw: &RawSchedule,
    latency: LatencyEstimate,
    gateway: &G,
    actuators: &ActuatorSet,
    playback: &mut P,
    settings: DispatchSettings,
) -> Result<DispatchReport>
where
    G: ColorGateway + ?Sized,
    P: Playback + ?Sized,
{
    let schedule = adjust_schedule(raw, latency)?;
    let mut dispatcher = Dispatcher::new(gateway, actuators, settings);
    dispatcher.arm(schedule)?;
    dispatcher.run(playback).await
}

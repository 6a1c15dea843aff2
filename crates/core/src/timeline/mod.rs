use std::{cmp::Ordering, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{Hsv, LatencyEstimate, LightSyncError, Result};

/// Monotonic clock anchored at the moment playback was started.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackClock {
    baseline: Instant,
}

impl PlaybackClock {
    pub fn start() -> Self {
        Self {
            baseline: Instant::now(),
        }
    }

    pub fn baseline(&self) -> Instant {
        self.baseline
    }

    pub fn elapsed(&self) -> Duration {
        self.baseline.elapsed()
    }

    /// Instant at which track time `seconds` is reached.
    pub fn deadline(&self, seconds: f64) -> Instant {
        self.baseline + Duration::from_secs_f64(seconds.max(0.0))
    }
}

/// A color change at an offset from track start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightEvent {
    pub time_seconds: f64,
    pub color: Hsv,
}

impl LightEvent {
    pub fn new(time_seconds: f64, color: Hsv) -> Self {
        Self {
            time_seconds,
            color,
        }
    }
}

/// Events as synthesized from the music, before latency compensation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSchedule {
    pub events: Vec<LightEvent>,
    /// Easing time shared by every event.
    pub transition: Duration,
}

/// Dispatchable schedule: non-empty, strictly ascending, never negative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schedule {
    events: Vec<LightEvent>,
    transition: Duration,
}

impl Schedule {
    pub fn new(events: Vec<LightEvent>, transition: Duration) -> Result<Self> {
        if events.is_empty() {
            return Err(LightSyncError::EmptySchedule);
        }
        if events
            .iter()
            .any(|event| !event.time_seconds.is_finite() || event.time_seconds < 0.0)
        {
            return Err(LightSyncError::validation(
                "schedule times must be finite and non-negative",
            ));
        }
        if events
            .windows(2)
            .any(|pair| pair[0].time_seconds >= pair[1].time_seconds)
        {
            return Err(LightSyncError::validation(
                "schedule times must be strictly increasing",
            ));
        }
        Ok(Self { events, transition })
    }

    pub fn events(&self) -> &[LightEvent] {
        &self.events
    }

    pub fn transition(&self) -> Duration {
        self.transition
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Shifts every event earlier by `latency + transition` so the color has
/// finished easing in when the music reaches the original time.
///
/// Leading events whose shifted time is still below that same shift cannot be
/// sent in time and are dropped, as are events that do not strictly follow
/// their predecessor. Fails with [`LightSyncError::EmptySchedule`] when
/// nothing is left.
pub fn adjust_schedule(raw: &RawSchedule, latency: LatencyEstimate) -> Result<Schedule> {
    let shift = latency.seconds() + raw.transition.as_secs_f64();

    let mut ordered: Vec<LightEvent> = raw
        .events
        .iter()
        .copied()
        .filter(|event| event.time_seconds.is_finite())
        .collect();
    ordered.sort_by(|a, b| {
        a.time_seconds
            .partial_cmp(&b.time_seconds)
            .unwrap_or(Ordering::Equal)
    });

    let mut events: Vec<LightEvent> = Vec::with_capacity(ordered.len());
    let mut too_early = 0usize;
    let mut duplicates = 0usize;
    for event in ordered {
        let time_seconds = event.time_seconds - shift;
        if events.is_empty() && time_seconds < shift {
            too_early += 1;
            continue;
        }
        if events
            .last()
            .map(|last| time_seconds <= last.time_seconds)
            .unwrap_or(false)
        {
            duplicates += 1;
            continue;
        }
        events.push(LightEvent::new(time_seconds, event.color));
    }

    tracing::debug!(
        kept = events.len(),
        too_early,
        duplicates,
        shift_seconds = shift,
        "adjusted schedule"
    );
    Schedule::new(events, raw.transition)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn raw(times: &[f64], transition_ms: u64) -> RawSchedule {
        RawSchedule {
            events: times
                .iter()
                .enumerate()
                .map(|(i, &time)| LightEvent::new(time, Hsv::from_hue(i as u16)))
                .collect(),
            transition: Duration::from_millis(transition_ms),
        }
    }

    fn latency_ms(ms: u64) -> LatencyEstimate {
        LatencyEstimate::assumed(Duration::from_millis(ms))
    }

    #[test]
    fn shifts_by_latency_plus_transition() {
        let schedule = adjust_schedule(&raw(&[1.0, 2.0, 3.0], 20), latency_ms(100)).unwrap();

        let times: Vec<f64> = schedule.events().iter().map(|e| e.time_seconds).collect();
        assert_eq!(times.len(), 3);
        assert_relative_eq!(times[0], 0.88, epsilon = 1e-9);
        assert_relative_eq!(times[1], 1.88, epsilon = 1e-9);
        assert_relative_eq!(times[2], 2.88, epsilon = 1e-9);
        assert_eq!(schedule.transition(), Duration::from_millis(20));
    }

    #[test]
    fn drops_events_too_close_to_the_start() {
        // shift = 0.2: 0.3 -> 0.1 (< 0.2, dropped), 0.5 -> 0.3 (kept)
        let schedule = adjust_schedule(&raw(&[0.1, 0.3, 0.5, 0.9], 100), latency_ms(100)).unwrap();

        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule.events()[0].color, Hsv::from_hue(2));
        assert_relative_eq!(schedule.events()[0].time_seconds, 0.3, epsilon = 1e-9);
    }

    #[test]
    fn emptied_schedule_is_an_error() {
        let err = adjust_schedule(&raw(&[0.05, 0.1], 20), latency_ms(100)).unwrap_err();
        assert!(matches!(err, LightSyncError::EmptySchedule));

        let err = adjust_schedule(&raw(&[], 20), latency_ms(0)).unwrap_err();
        assert!(matches!(err, LightSyncError::EmptySchedule));
    }

    #[test]
    fn result_is_strictly_ascending_and_non_negative() {
        let schedule =
            adjust_schedule(&raw(&[3.0, 1.0, 2.0, 2.0, 0.0, 5.5], 30), latency_ms(45)).unwrap();

        let events = schedule.events();
        assert!(events.iter().all(|e| e.time_seconds >= 0.0));
        assert!(events
            .windows(2)
            .all(|pair| pair[0].time_seconds < pair[1].time_seconds));
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn checked_constructor_rejects_unordered_events() {
        let events = vec![
            LightEvent::new(1.0, Hsv::from_hue(0)),
            LightEvent::new(0.5, Hsv::from_hue(0)),
        ];
        assert!(Schedule::new(events, Duration::ZERO).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn clock_measures_from_its_baseline() {
        let clock = PlaybackClock::start();
        tokio::time::advance(Duration::from_millis(250)).await;

        assert!(clock.elapsed() >= Duration::from_millis(250));
        assert_eq!(clock.deadline(1.5), clock.baseline() + Duration::from_millis(1500));
    }
}

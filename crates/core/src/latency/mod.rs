use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{fan_out, ActuatorSet, ColorCommand, ColorGateway, Hsv, LightSyncError, Result};

/// Largest accepted number of probe commands; one per degree of hue.
pub const MAX_LATENCY_TESTS: u16 = 360;

/// Approximate one-way delay between issuing a command and the actuators
/// acting on it. Only valid for the actuator set it was measured against.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatencyEstimate {
    pub one_way: Duration,
    pub samples: u16,
}

impl LatencyEstimate {
    /// Estimate that was not measured, e.g. for offline planning.
    pub fn assumed(one_way: Duration) -> Self {
        Self {
            one_way,
            samples: 0,
        }
    }

    pub fn seconds(&self) -> f64 {
        self.one_way.as_secs_f64()
    }
}

/// Measures command round trips against `actuators`.
///
/// Sends `test_count` fully saturated hue steps (0, 1, 2, ...) one fan-out at
/// a time, waiting for every actuator to settle before the next probe, and
/// returns half the mean round trip. The lights visibly flash while this
/// runs.
pub async fn estimate_latency<G>(
    gateway: &G,
    actuators: &ActuatorSet,
    test_count: u16,
) -> Result<LatencyEstimate>
where
    G: ColorGateway + ?Sized,
{
    if !(1..=MAX_LATENCY_TESTS).contains(&test_count) {
        return Err(LightSyncError::validation(format!(
            "latency test count {test_count} must be between 1 and {MAX_LATENCY_TESTS} inclusive"
        )));
    }

    let mut total = Duration::ZERO;
    for hue in 0..test_count {
        let command = ColorCommand::instant(Hsv::from_hue(hue));
        let started = Instant::now();
        let report = fan_out(gateway, actuators, command).await;
        let round_trip = started.elapsed();
        tracing::trace!(hue, ?round_trip, failed = report.failed, "latency probe");
        total += round_trip;
    }

    let mean = total / u32::from(test_count);
    let estimate = LatencyEstimate {
        one_way: mean / 2,
        samples: test_count,
    };
    tracing::info!(
        actuators = actuators.len(),
        samples = test_count,
        one_way = ?estimate.one_way,
        "estimated command latency"
    );
    Ok(estimate)
}

//! Actuator handles and the concurrent command fan-out.
//!
//! The wire protocol lives behind [`ColorGateway`]. The scheduler only ever
//! hands a gateway an [`Actuator`] reference plus a [`ColorCommand`].

use std::{fmt, str::FromStr, time::Duration};

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::{Hsv, LightSyncError, Result};

/// A single addressable light.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actuator {
    pub address: String,
    pub name: String,
    pub supports_color: bool,
}

impl Actuator {
    /// Color-capable actuator.
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            supports_color: true,
        }
    }

    pub fn with_color_support(mut self, supports_color: bool) -> Self {
        self.supports_color = supports_color;
        self
    }
}

impl fmt::Display for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// Parses `ADDRESS` or `ADDRESS=NAME`. The address doubles as the name when
/// none is given.
impl FromStr for Actuator {
    type Err = LightSyncError;

    fn from_str(text: &str) -> Result<Self> {
        let (address, name) = match text.split_once('=') {
            Some((address, name)) => (address.trim(), name.trim()),
            None => (text.trim(), text.trim()),
        };
        if address.is_empty() {
            return Err(LightSyncError::validation(format!(
                "`{text}` does not name an actuator address"
            )));
        }
        let name = if name.is_empty() { address } else { name };
        Ok(Actuator::new(address, name))
    }
}

/// The actuators targeted by one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorSet {
    actuators: Vec<Actuator>,
}

impl ActuatorSet {
    pub fn new(actuators: Vec<Actuator>) -> Self {
        Self { actuators }
    }

    /// Only the actuators that can show color.
    pub fn color_capable(&self) -> Self {
        Self {
            actuators: self
                .actuators
                .iter()
                .filter(|actuator| actuator.supports_color)
                .cloned()
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.actuators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actuators.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Actuator> {
        self.actuators.iter()
    }
}

impl FromIterator<Actuator> for ActuatorSet {
    fn from_iter<T: IntoIterator<Item = Actuator>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// One color change as sent to a single actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorCommand {
    pub color: Hsv,
    pub transition_ms: u32,
}

impl ColorCommand {
    pub fn new(color: Hsv, transition: Duration) -> Self {
        Self {
            color,
            transition_ms: u32::try_from(transition.as_millis()).unwrap_or(u32::MAX),
        }
    }

    /// Immediate change with no easing.
    pub fn instant(color: Hsv) -> Self {
        Self {
            color,
            transition_ms: 0,
        }
    }
}

/// Transport that delivers color commands to actuators.
///
/// Calls for different actuators may run concurrently, and each may fail
/// without affecting the others.
#[async_trait]
pub trait ColorGateway: Send + Sync {
    async fn set_color(&self, actuator: &Actuator, command: ColorCommand) -> Result<()>;
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl FanOutReport {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Sends `command` to every actuator at once and waits until each attempt
/// has settled. Failures are logged and counted, never propagated, and never
/// cancel the remaining attempts.
pub async fn fan_out<G>(gateway: &G, actuators: &ActuatorSet, command: ColorCommand) -> FanOutReport
where
    G: ColorGateway + ?Sized,
{
    let attempts = actuators.iter().map(|actuator| async move {
        let result = gateway.set_color(actuator, command).await;
        (actuator, result)
    });

    let mut report = FanOutReport::default();
    for (actuator, result) in join_all(attempts).await {
        match result {
            Ok(()) => report.succeeded += 1,
            Err(err) => {
                tracing::warn!(
                    actuator = %actuator.name,
                    address = %actuator.address,
                    error = %err,
                    "color command failed"
                );
                report.failed += 1;
            }
        }
    }
    report
}

/// Dry-run gateway that logs every command instead of sending it.
#[derive(Debug, Default, Clone)]
pub struct TracingGateway {
    simulated_latency: Duration,
}

impl TracingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every command take `latency` to settle.
    pub fn with_simulated_latency(latency: Duration) -> Self {
        Self {
            simulated_latency: latency,
        }
    }
}

#[async_trait]
impl ColorGateway for TracingGateway {
    async fn set_color(&self, actuator: &Actuator, command: ColorCommand) -> Result<()> {
        if !self.simulated_latency.is_zero() {
            tokio::time::sleep(self.simulated_latency).await;
        }
        tracing::info!(
            actuator = %actuator.name,
            color = %command.color,
            transition_ms = command.transition_ms,
            "set color"
        );
        Ok(())
    }
}

//! End-to-end light show: validate, measure, synthesize, adjust, dispatch.

use crate::{
    adjust_schedule, estimate_latency, run_schedule, synthesize_schedule, ActuatorSet, AppConfig,
    AudioFeatures, ColorGateway, DispatchReport, DispatchSettings, LatencyEstimate,
    LightSyncError, Palette, Playback, Result, Schedule, SyncMode, MAX_LATENCY_TESTS,
};

/// Fully validated parameters of one run.
///
/// Building a plan performs every check that does not need the audio, so a
/// bad mode, palette or test count is reported before any light is touched.
#[derive(Debug, Clone)]
pub struct ShowPlan {
    pub mode: SyncMode,
    pub palette: Palette,
    pub actuators: ActuatorSet,
    pub latency_tests: u16,
    pub dispatch: DispatchSettings,
}

impl ShowPlan {
    pub fn new(
        mode: SyncMode,
        palette: Palette,
        actuators: &ActuatorSet,
        latency_tests: u16,
        dispatch: DispatchSettings,
    ) -> Result<Self> {
        mode.check_palette(&palette)?;
        if !(1..=MAX_LATENCY_TESTS).contains(&latency_tests) {
            return Err(LightSyncError::validation(format!(
                "latency test count {latency_tests} must be between 1 and {MAX_LATENCY_TESTS} inclusive"
            )));
        }
        let actuators = actuators.color_capable();
        if actuators.is_empty() {
            return Err(LightSyncError::validation(
                "no color-capable actuators to drive",
            ));
        }
        Ok(Self {
            mode,
            palette,
            actuators,
            latency_tests,
            dispatch,
        })
    }

    pub fn from_config(config: &AppConfig, actuators: &ActuatorSet) -> Result<Self> {
        Self::new(
            config.sync.mode()?,
            config.sync.palette()?,
            actuators,
            config.sync.latency_tests,
            DispatchSettings::from_config(&config.dispatch)?,
        )
    }

    /// Adjusted schedule for `features` under an already known latency.
    pub fn schedule(&self, features: &AudioFeatures, latency: LatencyEstimate) -> Result<Schedule> {
        let raw = synthesize_schedule(self.mode, &self.palette, features, latency)?;
        adjust_schedule(&raw, latency)
    }

    /// Measures latency against the plan's actuators, then plays the show
    /// for `features` in step with `playback`.
    pub async fn perform<G, P>(
        &self,
        features: &AudioFeatures,
        gateway: &G,
        playback: &mut P,
    ) -> Result<DispatchReport>
    where
        G: ColorGateway + ?Sized,
        P: Playback + ?Sized,
    {
        features.validate()?;
        let latency = estimate_latency(gateway, &self.actuators, self.latency_tests).await?;
        let raw = synthesize_schedule(self.mode, &self.palette, features, latency)?;
        tracing::info!(
            mode = %self.mode,
            events = raw.events.len(),
            actuators = self.actuators.len(),
            "starting light show"
        );
        run_schedule(
            &raw,
            latency,
            gateway,
            &self.actuators,
            playback,
            self.dispatch,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{Actuator, Hsv};

    fn lights() -> ActuatorSet {
        ActuatorSet::new(vec![
            Actuator::new("10.0.0.1", "lamp"),
            Actuator::new("10.0.0.2", "plug").with_color_support(false),
        ])
    }

    fn two_colors() -> Palette {
        Palette::new(vec![Hsv::from_hue(0), Hsv::from_hue(240)]).unwrap()
    }

    #[test]
    fn keeps_only_color_capable_actuators() {
        let plan = ShowPlan::new(
            SyncMode::Discrete,
            two_colors(),
            &lights(),
            10,
            DispatchSettings::default(),
        )
        .unwrap();
        assert_eq!(plan.actuators.len(), 1);
    }

    #[test]
    fn rejects_sets_without_color_actuators() {
        let plugs = ActuatorSet::new(vec![Actuator::new("a", "a").with_color_support(false)]);
        let err = ShowPlan::new(
            SyncMode::Discrete,
            two_colors(),
            &plugs,
            10,
            DispatchSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, LightSyncError::Validation(_)));
    }

    #[test]
    fn rejects_out_of_range_test_counts() {
        for count in [0, 361] {
            assert!(ShowPlan::new(
                SyncMode::Discrete,
                two_colors(),
                &lights(),
                count,
                DispatchSettings::default(),
            )
            .is_err());
        }
    }

    #[test]
    fn from_config_surfaces_bad_mode_names() {
        let mut config = AppConfig::default();
        config.sync.mode = "rainbow".to_string();
        assert!(matches!(
            ShowPlan::from_config(&config, &lights()),
            Err(LightSyncError::Validation(_))
        ));
    }

    #[test]
    fn continuous_plan_needs_two_colors() {
        let one = Palette::new(vec![Hsv::from_hue(0)]).unwrap();
        assert!(ShowPlan::new(
            SyncMode::Continuous,
            one,
            &lights(),
            10,
            DispatchSettings {
                spin_threshold: Duration::ZERO,
                ..Default::default()
            },
        )
        .is_err());
    }
}

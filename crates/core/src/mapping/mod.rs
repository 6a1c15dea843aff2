//! Turns analysed audio into raw light events.
//!
//! Two mappings exist: [`SyncMode::Discrete`] flips through the palette on
//! note onsets and beats, [`SyncMode::Continuous`] blends between two colors
//! following the loudness curve.

mod continuous;
mod discrete;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{AudioFeatures, LatencyEstimate, LightSyncError, Palette, RawSchedule, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Palette color changes on onsets and beats.
    Discrete,
    /// Loudness-weighted blend between a low and a high color.
    Continuous,
}

impl SyncMode {
    /// Rejects palettes the mode cannot use.
    pub fn check_palette(self, palette: &Palette) -> Result<()> {
        match self {
            SyncMode::Discrete if palette.is_empty() => Err(LightSyncError::validation(
                "discrete mode needs at least one color",
            )),
            SyncMode::Continuous if palette.len() != 2 => {
                Err(LightSyncError::validation(format!(
                    "continuous mode needs exactly two colors (low and high), got {}",
                    palette.len()
                )))
            }
            _ => Ok(()),
        }
    }
}

impl FromStr for SyncMode {
    type Err = LightSyncError;

    fn from_str(text: &str) -> Result<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "discrete" => Ok(SyncMode::Discrete),
            "continuous" => Ok(SyncMode::Continuous),
            other => Err(LightSyncError::validation(format!(
                "unknown mode `{other}`, expected `discrete` or `continuous`"
            ))),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Discrete => f.write_str("discrete"),
            SyncMode::Continuous => f.write_str("continuous"),
        }
    }
}

/// Builds the raw event list for one track. Pure: identical inputs give an
/// identical schedule.
pub fn synthesize_schedule(
    mode: SyncMode,
    palette: &Palette,
    features: &AudioFeatures,
    latency: LatencyEstimate,
) -> Result<RawSchedule> {
    mode.check_palette(palette)?;
    features.validate()?;

    let schedule = match mode {
        SyncMode::Discrete => discrete::synthesize(features, palette),
        SyncMode::Continuous => continuous::synthesize(features, palette, latency),
    };

    tracing::debug!(
        %mode,
        events = schedule.events.len(),
        transition = ?schedule.transition,
        "synthesized schedule"
    );
    Ok(schedule)
}

//! Audio feature data consumed by the schedule synthesizers.
//!
//! Features are frame based: every per-frame series shares the same hop
//! length, so frame `f` sits at `f * hop_length / sample_rate` seconds.

mod extract;

use serde::{Deserialize, Serialize};

use crate::{LightSyncError, Result};

pub use extract::FeatureExtractor;

const PRE_MAX_SECONDS: f32 = 0.03;
const PRE_AVG_SECONDS: f32 = 0.10;
const POST_AVG_SECONDS: f32 = 0.10;
const WAIT_SECONDS: f32 = 0.03;

/// Pre-computed analysis of one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub sample_rate: u32,
    /// Samples between consecutive analysis frames.
    pub hop_length: u32,
    pub duration_seconds: f32,
    pub tempo_bpm: f32,
    /// Onset strength per frame. Onsets are picked from this envelope so the
    /// detection threshold can be tuned after analysis.
    pub onset_envelope: Vec<f32>,
    /// Ascending frame indices of tracked beats.
    pub beat_frames: Vec<usize>,
    /// Per-frame loudness in dB, derived from RMS energy.
    pub loudness_db: Vec<f32>,
}

impl AudioFeatures {
    /// Analysis frames per second.
    pub fn frame_rate(&self) -> f32 {
        self.sample_rate as f32 / self.hop_length as f32
    }

    pub fn frame_to_seconds(&self, frame: usize) -> f64 {
        frame as f64 * self.hop_length as f64 / self.sample_rate as f64
    }

    /// Number of whole frames needed to cover `seconds`, rounded up.
    pub fn seconds_to_frames(&self, seconds: f64) -> usize {
        if seconds <= 0.0 {
            return 0;
        }
        (seconds * self.sample_rate as f64 / self.hop_length as f64).ceil() as usize
    }

    /// Duration of one beat at the estimated tempo.
    pub fn beat_seconds(&self) -> f64 {
        60.0 / self.tempo_bpm as f64
    }

    /// Checks the structural invariants every provider must uphold.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.hop_length == 0 {
            return Err(LightSyncError::decode(
                "sample rate and hop length must be non-zero",
            ));
        }
        if !self.tempo_bpm.is_finite() || self.tempo_bpm <= 0.0 {
            return Err(LightSyncError::decode(format!(
                "tempo {} bpm is not usable",
                self.tempo_bpm
            )));
        }
        if !self.duration_seconds.is_finite() || self.duration_seconds < 0.0 {
            return Err(LightSyncError::decode("duration must be non-negative"));
        }
        if self.beat_frames.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(LightSyncError::decode(
                "beat frames must be strictly increasing",
            ));
        }
        Ok(())
    }

    /// Picks onset frames from the envelope.
    ///
    /// The envelope is min-max normalised first. A frame is an onset when it
    /// is the local maximum of its short look-back window, exceeds the local
    /// mean by at least `delta`, and comes more than the wait period after
    /// the previous onset.
    pub fn detect_onsets(&self, delta: f32) -> Vec<usize> {
        let Some(envelope) = normalise(&self.onset_envelope) else {
            return Vec::new();
        };
        let len = envelope.len();

        let frame_rate = self.frame_rate();
        let to_frames = |seconds: f32| ((seconds * frame_rate).round() as usize).max(1);
        let pre_max = to_frames(PRE_MAX_SECONDS);
        let post_max = 1;
        let pre_avg = to_frames(PRE_AVG_SECONDS);
        let post_avg = to_frames(POST_AVG_SECONDS) + 1;
        let wait = to_frames(WAIT_SECONDS);

        let mut onsets: Vec<usize> = Vec::new();
        for (n, &value) in envelope.iter().enumerate() {
            let max_window = &envelope[n.saturating_sub(pre_max)..(n + post_max).min(len)];
            let local_max = max_window.iter().copied().fold(f32::MIN, f32::max);
            if value < local_max {
                continue;
            }

            let avg_window = &envelope[n.saturating_sub(pre_avg)..(n + post_avg).min(len)];
            let local_mean = avg_window.iter().sum::<f32>() / avg_window.len() as f32;
            if value < local_mean + delta {
                continue;
            }

            if onsets.last().map(|&last| n > last + wait).unwrap_or(true) {
                onsets.push(n);
            }
        }
        onsets
    }
}

/// Min-max normalisation. `None` for empty or flat input, which carries no
/// onsets at all.
fn normalise(values: &[f32]) -> Option<Vec<f32>> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let span = max - min;
    if !span.is_finite() || span <= f32::EPSILON {
        return None;
    }
    Some(values.iter().map(|value| (value - min) / span).collect())
}

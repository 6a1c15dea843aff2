use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use super::AudioFeatures;
use crate::{LightSyncError, Result};

const MIN_TEMPO_BPM: f32 = 60.0;
const MAX_TEMPO_BPM: f32 = 200.0;
const FALLBACK_TEMPO_BPM: f32 = 120.0;
const LOUDNESS_FLOOR_DB: f32 = -100.0;
const LOG_COMPRESSION: f32 = 10.0;

/// Offline feature extractor for mono PCM.
///
/// Produces a spectral-flux onset envelope, RMS loudness in dB, an
/// autocorrelation tempo estimate and a tempo-grid beat track.
pub struct FeatureExtractor {
    frame_size: usize,
    hop_length: usize,
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl FeatureExtractor {
    pub fn new(frame_size: usize, hop_length: usize) -> Result<Self> {
        if frame_size < 2 || hop_length == 0 {
            return Err(LightSyncError::validation(
                "analysis needs a frame size of at least two samples and a non-zero hop",
            ));
        }
        Ok(Self {
            frame_size,
            hop_length,
            fft_planner: RealFftPlanner::new(),
            fft: None,
        })
    }

    pub fn extract(&mut self, samples: &[f32], sample_rate: u32) -> Result<AudioFeatures> {
        if samples.is_empty() {
            return Err(LightSyncError::decode("audio source contains no samples"));
        }
        if sample_rate == 0 {
            return Err(LightSyncError::decode("audio source reports a zero sample rate"));
        }

        let frame_count = 1 + samples.len().saturating_sub(self.frame_size) / self.hop_length;
        let mut onset_envelope = Vec::with_capacity(frame_count);
        let mut loudness_db = Vec::with_capacity(frame_count);
        let mut previous: Option<Vec<f32>> = None;
        let mut block = vec![0.0_f32; self.frame_size];

        for frame in 0..frame_count {
            let start = frame * self.hop_length;
            let end = (start + self.frame_size).min(samples.len());
            block.fill(0.0);
            block[..end - start].copy_from_slice(&samples[start..end]);

            loudness_db.push(to_db(compute_rms(&block)));

            let spectrum = self.log_magnitudes(&block)?;
            let flux = previous
                .as_ref()
                .map(|prev| {
                    spectrum
                        .iter()
                        .zip(prev)
                        .map(|(now, before)| (now - before).max(0.0))
                        .sum::<f32>()
                })
                .unwrap_or(0.0);
            onset_envelope.push(flux);
            previous = Some(spectrum);
        }

        let frame_rate = sample_rate as f32 / self.hop_length as f32;
        let period = estimate_period(&onset_envelope, frame_rate);
        let tempo_bpm = period
            .map(|lag| 60.0 * frame_rate / lag as f32)
            .unwrap_or(FALLBACK_TEMPO_BPM);
        let beat_frames = track_beats(&onset_envelope, 60.0 * frame_rate / tempo_bpm);

        tracing::debug!(
            frames = frame_count,
            tempo_bpm,
            beats = beat_frames.len(),
            "extracted audio features"
        );

        Ok(AudioFeatures {
            sample_rate,
            hop_length: self.hop_length as u32,
            duration_seconds: samples.len() as f32 / sample_rate as f32,
            tempo_bpm,
            onset_envelope,
            beat_frames,
            loudness_db,
        })
    }

    fn log_magnitudes(&mut self, block: &[f32]) -> Result<Vec<f32>> {
        let len = block.len();
        let fft = self.prepare_fft(len)?;

        for (index, value) in block.iter().enumerate() {
            fft.input[index] = *value * hann_value(index, len);
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)
            .map_err(|err| LightSyncError::decode(err.to_string()))?;

        Ok(fft
            .spectrum
            .iter()
            .map(|bin| (1.0 + LOG_COMPRESSION * bin.norm()).ln())
            .collect())
    }

    fn prepare_fft(&mut self, size: usize) -> Result<&mut FftResources> {
        let rebuild = self
            .fft
            .as_ref()
            .map(|fft| fft.size != size)
            .unwrap_or(true);

        if rebuild {
            let plan = self.fft_planner.plan_fft_forward(size);
            let scratch = plan.make_scratch_vec();
            let spectrum = plan.make_output_vec();
            let input = plan.make_input_vec();
            return Ok(self.fft.insert(FftResources {
                size,
                plan,
                scratch,
                spectrum,
                input,
            }));
        }

        self.fft
            .as_mut()
            .ok_or_else(|| LightSyncError::decode("FFT resources were not initialised"))
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("frame_size", &self.frame_size)
            .field("hop_length", &self.hop_length)
            .field("fft", &self.fft.as_ref().map(|fft| fft.size))
            .finish()
    }
}

/// Beat period in frames from the envelope autocorrelation, searched over
/// the plausible tempo range. `None` when the envelope carries no energy.
fn estimate_period(envelope: &[f32], frame_rate: f32) -> Option<usize> {
    let min_lag = ((60.0 * frame_rate / MAX_TEMPO_BPM).round() as usize).max(1);
    let max_lag = (60.0 * frame_rate / MIN_TEMPO_BPM).round() as usize;
    if envelope.len() <= min_lag {
        return None;
    }

    let mean = envelope.iter().sum::<f32>() / envelope.len() as f32;
    let centred: Vec<f32> = envelope.iter().map(|value| value - mean).collect();

    let mut best: Option<(usize, f32)> = None;
    for lag in min_lag..=max_lag.min(envelope.len() - 1) {
        let score: f32 = centred
            .iter()
            .zip(&centred[lag..])
            .map(|(a, b)| a * b)
            .sum();
        if score > best.map(|(_, best_score)| best_score).unwrap_or(0.0) {
            best = Some((lag, score));
        }
    }
    best.map(|(lag, _)| lag)
}

/// Lays a beat grid of `period` frames over the envelope at the phase that
/// collects the most onset energy, then snaps each beat to the strongest
/// frame nearby.
fn track_beats(envelope: &[f32], period: f32) -> Vec<usize> {
    if envelope.is_empty() || !period.is_finite() || period < 1.0 {
        return Vec::new();
    }

    let len = envelope.len();
    let grid = move |phase: f32| {
        (0..)
            .map(move |k| (phase + k as f32 * period).round() as usize)
            .take_while(move |&frame| frame < len)
    };

    let phases = period.floor() as usize;
    let best_phase = (0..phases.max(1))
        .map(|phase| {
            let energy: f32 = grid(phase as f32).map(|frame| envelope[frame]).sum();
            (phase, energy)
        })
        .fold((0, f32::MIN), |best, candidate| {
            if candidate.1 > best.1 {
                candidate
            } else {
                best
            }
        })
        .0;

    let reach = ((period / 8.0).round() as usize).max(1);
    let mut beats: Vec<usize> = grid(best_phase as f32)
        .map(|frame| {
            let lo = frame.saturating_sub(reach);
            let hi = (frame + reach + 1).min(len);
            (lo..hi).fold(frame, |best, candidate| {
                if envelope[candidate] > envelope[best] {
                    candidate
                } else {
                    best
                }
            })
        })
        .collect();
    beats.dedup();
    beats
}

fn compute_rms(samples: &[f32]) -> f32 {
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

fn to_db(amplitude: f32) -> f32 {
    if amplitude <= 0.0 {
        return LOUDNESS_FLOOR_DB;
    }
    (20.0 * amplitude.log10()).max(LOUDNESS_FLOOR_DB)
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Short noise-like bursts every `interval` samples over silence.
    fn click_track(sample_rate: u32, seconds: f32, interval: usize) -> Vec<f32> {
        let len = (sample_rate as f32 * seconds) as usize;
        let mut samples = vec![0.0; len];
        for start in (0..len).step_by(interval) {
            for (offset, sample) in samples[start..(start + 64).min(len)].iter_mut().enumerate() {
                *sample = if offset % 2 == 0 { 0.9 } else { -0.9 };
            }
        }
        samples
    }

    #[test]
    fn silence_has_floor_loudness_and_fallback_tempo() {
        let mut extractor = FeatureExtractor::new(256, 128).unwrap();
        let features = extractor.extract(&vec![0.0; 8_000], 8_000).unwrap();

        assert!(features
            .loudness_db
            .iter()
            .all(|db| (*db - LOUDNESS_FLOOR_DB).abs() < f32::EPSILON));
        assert_eq!(features.tempo_bpm, FALLBACK_TEMPO_BPM);
        assert!((features.duration_seconds - 1.0).abs() < f32::EPSILON);
        features.validate().unwrap();
    }

    #[test]
    fn estimates_tempo_of_click_track() {
        // 8 kHz, hop 80 -> 100 frames/s; a click every 0.5 s is 120 bpm.
        let samples = click_track(8_000, 8.0, 4_000);
        let mut extractor = FeatureExtractor::new(256, 80).unwrap();
        let features = extractor.extract(&samples, 8_000).unwrap();

        assert!((features.tempo_bpm - 120.0).abs() < 5.0, "{}", features.tempo_bpm);
        assert!(features.beat_frames.len() >= 14);
        features.validate().unwrap();
    }

    #[test]
    fn loud_frames_measure_louder() {
        let mut samples = vec![0.01; 4_000];
        samples.extend(vec![0.5; 4_000]);
        let mut extractor = FeatureExtractor::new(256, 256).unwrap();
        let features = extractor.extract(&samples, 8_000).unwrap();

        let first = features.loudness_db.first().copied().unwrap();
        let last = features.loudness_db.last().copied().unwrap();
        assert!(last > first + 20.0);
    }

    #[test]
    fn fft_resources_follow_block_size() {
        let mut extractor = FeatureExtractor::new(256, 128).unwrap();
        assert_eq!(extractor.log_magnitudes(&[0.25; 256]).unwrap().len(), 129);
        assert_eq!(extractor.log_magnitudes(&[0.25; 256]).unwrap().len(), 129);
        assert_eq!(extractor.log_magnitudes(&[0.25; 64]).unwrap().len(), 33);
        assert_eq!(extractor.fft.as_ref().map(|fft| fft.size), Some(64));
    }

    #[test]
    fn repeated_extraction_reuses_the_plan() {
        let samples = click_track(8_000, 2.0, 2_000);
        let mut extractor = FeatureExtractor::new(256, 128).unwrap();
        let first = extractor.extract(&samples, 8_000).unwrap();
        let second = extractor.extract(&samples, 8_000).unwrap();
        assert_eq!(first.onset_envelope, second.onset_envelope);
        assert_eq!(first.loudness_db, second.loudness_db);
    }

    #[test]
    fn rejects_empty_input() {
        let mut extractor = FeatureExtractor::new(256, 128).unwrap();
        assert!(matches!(
            extractor.extract(&[], 44_100),
            Err(LightSyncError::AudioDecode(_))
        ));
    }
}

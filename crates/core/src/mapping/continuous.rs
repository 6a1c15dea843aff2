use std::time::Duration;

use crate::{AudioFeatures, Hsv, LatencyEstimate, LightEvent, Palette, RawSchedule};

/// Target color changes per beat: one per sixteenth note.
const CHANGES_PER_BEAT: f32 = 4.0;
const PEAK_PASSES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    frame: usize,
    loudness: f32,
    color: Hsv,
}

pub(super) fn synthesize(
    features: &AudioFeatures,
    palette: &Palette,
    latency: LatencyEstimate,
) -> RawSchedule {
    let (low, high) = (palette.colors()[0], palette.colors()[1]);
    let ratios = loudness_ratios(&features.loudness_db);
    let skip = features.seconds_to_frames(latency.seconds());
    let window = window_frames(features, skip);

    let mut candidates: Vec<Candidate> = (skip..ratios.len())
        .step_by(window)
        .filter_map(|start| {
            let end = (start + window).min(ratios.len());
            loudest_in(&ratios, start, end)
        })
        .map(|(frame, loudness)| Candidate {
            frame,
            loudness,
            color: low.lerp(high, loudness),
        })
        .collect();

    let windows = candidates.len();
    for _ in 0..PEAK_PASSES {
        candidates = keep_local_peaks(&candidates);
    }

    tracing::trace!(
        skip,
        window,
        windows,
        peaks = candidates.len(),
        "thinned loudness peaks"
    );

    let events = candidates
        .iter()
        .map(|candidate| {
            LightEvent::new(features.frame_to_seconds(candidate.frame), candidate.color)
        })
        .collect();

    RawSchedule {
        events,
        transition: Duration::from_secs_f64(window as f64 / features.frame_rate() as f64 / 2.0),
    }
}

/// Loudness shifted to start at zero and scaled into [0, 1]. A flat curve
/// maps to all zeros.
fn loudness_ratios(loudness: &[f32]) -> Vec<f32> {
    let min = loudness.iter().copied().fold(f32::INFINITY, f32::min);
    let shifted: Vec<f32> = loudness.iter().map(|value| value - min).collect();
    let max = shifted.iter().copied().fold(0.0, f32::max);
    if !max.is_finite() || max <= 0.0 {
        return vec![0.0; loudness.len()];
    }
    shifted.iter().map(|value| value / max).collect()
}

/// Frames per downsampling window. Never shorter than the latency skip.
fn window_frames(features: &AudioFeatures, skip: usize) -> usize {
    let changes_per_second = features.tempo_bpm / 60.0 * CHANGES_PER_BEAT;
    let frames = (features.frame_rate() / changes_per_second).round() as usize;
    frames.max(skip).max(1)
}

/// First frame with the highest ratio in `start..end`.
fn loudest_in(ratios: &[f32], start: usize, end: usize) -> Option<(usize, f32)> {
    (start..end).fold(None, |best, frame| match best {
        Some((_, loudness)) if ratios[frame] <= loudness => best,
        _ => Some((frame, ratios[frame])),
    })
}

/// Drops every interior candidate that a neighbour is louder than.
fn keep_local_peaks(candidates: &[Candidate]) -> Vec<Candidate> {
    let last = candidates.len().saturating_sub(1);
    candidates
        .iter()
        .enumerate()
        .filter(|&(index, candidate)| {
            if index == 0 || index == last {
                return true;
            }
            candidate.loudness >= candidates[index - 1].loudness
                && candidate.loudness >= candidates[index + 1].loudness
        })
        .map(|(_, candidate)| *candidate)
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn features(loudness_db: Vec<f32>, tempo_bpm: f32) -> AudioFeatures {
        let frames = loudness_db.len();
        AudioFeatures {
            sample_rate: 1_000,
            hop_length: 10,
            duration_seconds: frames as f32 / 100.0,
            tempo_bpm,
            onset_envelope: vec![0.0; frames],
            beat_frames: Vec::new(),
            loudness_db,
        }
    }

    fn endpoints() -> Palette {
        Palette::new(vec![
            Hsv::new(200, 40, 10).unwrap(),
            Hsv::new(20, 100, 100).unwrap(),
        ])
        .unwrap()
    }

    fn candidate(frame: usize, loudness: f32) -> Candidate {
        Candidate {
            frame,
            loudness,
            color: Hsv::from_hue(0),
        }
    }

    #[test]
    fn ratios_span_zero_to_one() {
        assert_eq!(loudness_ratios(&[-60.0, -40.0, -20.0]), vec![0.0, 0.5, 1.0]);
        assert_eq!(loudness_ratios(&[-12.0, -12.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn window_follows_tempo_but_never_undercuts_the_skip() {
        // 100 frames/s, 150 bpm -> 10 changes/s -> 10 frames.
        let feats = features(vec![0.0; 10], 150.0);
        assert_eq!(window_frames(&feats, 0), 10);
        assert_eq!(window_frames(&feats, 25), 25);
    }

    #[test]
    fn picks_the_first_loudest_frame() {
        assert_eq!(loudest_in(&[0.1, 0.9, 0.9, 0.2], 0, 4), Some((1, 0.9)));
        assert_eq!(loudest_in(&[0.1], 1, 1), None);
    }

    #[test]
    fn peak_pass_removes_frames_beaten_by_a_neighbour() {
        let kept: Vec<usize> = keep_local_peaks(&[
            candidate(0, 0.2),
            candidate(1, 0.8),
            candidate(2, 0.5),
            candidate(3, 0.5),
            candidate(4, 0.9),
            candidate(5, 0.1),
        ])
        .iter()
        .map(|c| c.frame)
        .collect();

        assert_eq!(kept, vec![0, 1, 4, 5]);
    }

    #[test]
    fn colors_match_endpoints_at_quietest_and_loudest() {
        let palette = endpoints();
        let mut loudness = vec![-50.0; 200];
        loudness[105] = -10.0;
        let schedule = synthesize(
            &features(loudness, 150.0),
            &palette,
            LatencyEstimate::default(),
        );

        let loudest = schedule
            .events
            .iter()
            .find(|event| (event.time_seconds - 1.05).abs() < 1e-9)
            .expect("loudest frame survives thinning");
        assert_eq!(loudest.color, palette.colors()[1]);
        assert!(schedule
            .events
            .iter()
            .filter(|event| event.color != palette.colors()[1])
            .all(|event| event.color == palette.colors()[0]));
    }

    #[test]
    fn blended_channels_stay_within_endpoints() {
        let palette = endpoints();
        let loudness: Vec<f32> = (0..400)
            .map(|i| ((i as f32) * 0.37).sin() * 30.0 - 30.0)
            .collect();
        let schedule = synthesize(
            &features(loudness, 128.0),
            &palette,
            LatencyEstimate::default(),
        );

        assert!(!schedule.events.is_empty());
        for event in &schedule.events {
            assert!((20..=200).contains(&event.color.hue));
            assert!((40..=100).contains(&event.color.saturation));
            assert!((10..=100).contains(&event.color.value));
        }
    }

    #[test]
    fn latency_skips_leading_frames() {
        let mut loudness = vec![-50.0; 200];
        loudness[2] = 0.0;
        loudness[150] = -5.0;
        let schedule = synthesize(
            &features(loudness, 150.0),
            &endpoints(),
            LatencyEstimate::assumed(Duration::from_millis(100)),
        );

        // Skip of 10 frames hides the spike at frame 2.
        assert!(schedule.events.iter().all(|event| event.time_seconds >= 0.1));
        // Window of 10 frames at 100 frames/s -> 50 ms transition.
        assert_relative_eq!(schedule.transition.as_secs_f64(), 0.05, epsilon = 1e-9);
    }
}

use std::time::Duration;

use crate::{AudioFeatures, LightEvent, Palette, RawSchedule};

/// Fraction of the expected quarter-note count allowed as events.
const NOTE_BUDGET_RATIO: f64 = 2.0 / 3.0;
const ONSET_DELTA_START: f32 = 0.05;
const ONSET_DELTA_STEP: f32 = 0.05;
const ONSET_DELTA_MAX: f32 = 1.0;
/// Beats this close to a selected onset, in frames, are duplicates.
const BEAT_ONSET_WINDOW: usize = 3;
/// Transition as a fraction of one beat: a quarter of a sixteenth note.
const TRANSITION_BEAT_FRACTION: f64 = 1.0 / 16.0;

pub(super) fn synthesize(features: &AudioFeatures, palette: &Palette) -> RawSchedule {
    let budget = note_budget(features);
    let onsets = select_onsets(features, budget);
    let beats = beats_clear_of(&features.beat_frames, &onsets);

    let mut frames: Vec<usize> = onsets.iter().chain(&beats).copied().collect();
    frames.sort_unstable();
    frames.dedup();

    tracing::trace!(
        budget,
        onsets = onsets.len(),
        beats = beats.len(),
        "merged discrete frames"
    );

    let events = frames
        .into_iter()
        .enumerate()
        .map(|(index, frame)| {
            LightEvent::new(features.frame_to_seconds(frame), palette.cycle(index))
        })
        .collect();

    RawSchedule {
        events,
        transition: Duration::from_secs_f64(features.beat_seconds() * TRANSITION_BEAT_FRACTION),
    }
}

/// Upper bound on onset events, from tempo and track length.
fn note_budget(features: &AudioFeatures) -> usize {
    let quarter_notes = features.tempo_bpm as f64 / 60.0 * features.duration_seconds as f64;
    ((quarter_notes * NOTE_BUDGET_RATIO).floor() as usize).max(1)
}

/// Raises the detection threshold until the onsets fit the budget, or the
/// threshold ceiling is hit.
fn select_onsets(features: &AudioFeatures, budget: usize) -> Vec<usize> {
    let steps = ((ONSET_DELTA_MAX - ONSET_DELTA_START) / ONSET_DELTA_STEP).round() as usize;
    let mut onsets = Vec::new();
    for step in 0..=steps {
        let delta = ONSET_DELTA_START + step as f32 * ONSET_DELTA_STEP;
        onsets = features.detect_onsets(delta);
        if onsets.len() <= budget {
            tracing::trace!(delta, count = onsets.len(), "onset threshold settled");
            break;
        }
    }
    onsets
}

/// Beat frames not within [`BEAT_ONSET_WINDOW`] of any onset. `onsets` must
/// be ascending.
fn beats_clear_of(beats: &[usize], onsets: &[usize]) -> Vec<usize> {
    beats
        .iter()
        .copied()
        .filter(|&beat| {
            let lo = beat.saturating_sub(BEAT_ONSET_WINDOW);
            let first_candidate = onsets.partition_point(|&onset| onset < lo);
            onsets
                .get(first_candidate)
                .map(|&onset| onset > beat + BEAT_ONSET_WINDOW)
                .unwrap_or(true)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::Hsv;

    fn features(spikes: &[usize], beats: Vec<usize>, tempo_bpm: f32) -> AudioFeatures {
        let mut onset_envelope = vec![0.0; 500];
        for &frame in spikes {
            onset_envelope[frame] = 1.0;
        }
        AudioFeatures {
            sample_rate: 1_000,
            hop_length: 10,
            duration_seconds: 5.0,
            tempo_bpm,
            onset_envelope,
            beat_frames: beats,
            loudness_db: vec![-20.0; 500],
        }
    }

    #[test]
    fn budget_is_two_thirds_of_the_quarter_notes() {
        // 120 bpm over 5 s = 10 quarter notes.
        assert_eq!(note_budget(&features(&[], Vec::new(), 120.0)), 6);
    }

    #[test]
    fn beats_near_onsets_are_dropped() {
        assert_eq!(
            beats_clear_of(&[97, 103, 104, 150, 197], &[100, 200]),
            vec![104, 150]
        );
        assert_eq!(beats_clear_of(&[0, 2], &[]), vec![0, 2]);
    }

    #[test]
    fn threshold_rises_until_onsets_fit_the_budget() {
        // Budget at 30 bpm over 5 s: floor(2.5 * 2/3) = 1.
        let mut feats = features(&[100, 200, 300], Vec::new(), 30.0);
        feats.onset_envelope[100] = 1.0;
        feats.onset_envelope[200] = 0.3;
        feats.onset_envelope[300] = 0.4;

        assert_eq!(select_onsets(&feats, note_budget(&feats)), vec![100]);
    }

    #[test]
    fn colors_cycle_through_the_palette() {
        let spikes: Vec<usize> = (40..480).step_by(40).collect();
        let feats = features(&spikes, vec![20, 60, 460], 240.0);
        let palette = Palette::new(vec![
            Hsv::from_hue(0),
            Hsv::from_hue(120),
            Hsv::from_hue(240),
        ])
        .unwrap();

        let schedule = synthesize(&feats, &palette);

        assert!(schedule.events.len() > palette.len());
        for (index, event) in schedule.events.iter().enumerate() {
            assert_eq!(event.color, palette.cycle(index));
        }
        assert!(schedule
            .events
            .windows(2)
            .all(|pair| pair[0].time_seconds < pair[1].time_seconds));
    }

    #[test]
    fn onsets_and_distant_beats_merge_in_time_order() {
        let feats = features(&[100, 300], vec![102, 200, 400], 120.0);
        let palette = Palette::new(vec![Hsv::from_hue(0)]).unwrap();

        let times: Vec<f64> = synthesize(&feats, &palette)
            .events
            .iter()
            .map(|event| event.time_seconds)
            .collect();

        assert_eq!(times.len(), 4);
        for (time, expected) in times.iter().zip([1.0, 2.0, 3.0, 4.0]) {
            assert_relative_eq!(*time, expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn transition_is_a_sixty_fourth_of_a_bar() {
        let schedule = synthesize(
            &features(&[100], Vec::new(), 187.5),
            &Palette::new(vec![Hsv::from_hue(0)]).unwrap(),
        );
        assert_relative_eq!(schedule.transition.as_secs_f64(), 0.02, epsilon = 1e-9);
    }
}

use std::time::Duration;

use tokio::time::Instant;

use crate::{AudioFeatures, Result};

/// Audio transport driving the light show.
pub trait Playback: Send {
    /// Begins playing the track. The dispatcher treats the moment this is
    /// invoked as track time zero.
    fn start(&mut self) -> Result<()>;

    fn is_playing(&self) -> bool;
}

/// Stand-in transport for audio that plays elsewhere: reports "playing" for
/// a fixed length of time after [`Playback::start`].
#[derive(Debug, Clone)]
pub struct TimedPlayback {
    length: Duration,
    started: Option<Instant>,
}

impl TimedPlayback {
    pub fn new(length: Duration) -> Self {
        Self {
            length,
            started: None,
        }
    }

    pub fn for_features(features: &AudioFeatures) -> Self {
        Self::new(Duration::from_secs_f32(features.duration_seconds.max(0.0)))
    }

    pub fn length(&self) -> Duration {
        self.length
    }
}

impl Playback for TimedPlayback {
    fn start(&mut self) -> Result<()> {
        tracing::info!(length = ?self.length, "playback started");
        self.started = Some(Instant::now());
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.started
            .map(|started| started.elapsed() < self.length)
            .unwrap_or(false)
    }
}

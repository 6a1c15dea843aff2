//! Core library for the Music Lights scheduler.
//!
//! Audio features are mapped to a schedule of color changes
//! ([`synthesize_schedule`]), shifted earlier to cover the measured command
//! latency ([`estimate_latency`], [`adjust_schedule`]) and then played back
//! in real time against a set of smart lights ([`run_schedule`]).
//!
//! Each module owns one stage of that pipeline. The actuator wire protocol,
//! the audio transport and feature extraction sit behind the
//! [`ColorGateway`], [`Playback`] and [`FeatureProvider`] traits.

pub mod actuator;
pub mod analysis;
pub mod audio;
pub mod color;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod latency;
pub mod mapping;
pub mod playback;
pub mod show;
pub mod timeline;

pub use actuator::{
    fan_out, Actuator, ActuatorSet, ColorCommand, ColorGateway, FanOutReport, TracingGateway,
};
pub use analysis::{AudioFeatures, FeatureExtractor};
pub use audio::{
    provider_for, write_feature_cache, FeatureProvider, JsonFeatureProvider, WavFeatureProvider,
};
pub use color::{Hsv, Palette, Rgb};
pub use config::{AnalysisConfig, AppConfig, DispatchConfig, SyncConfig};
pub use dispatch::{run_schedule, DispatchReport, DispatchSettings, DispatchState, Dispatcher};
pub use error::{LightSyncError, Result};
pub use latency::{estimate_latency, LatencyEstimate, MAX_LATENCY_TESTS};
pub use mapping::{synthesize_schedule, SyncMode};
pub use playback::{Playback, TimedPlayback};
pub use show::ShowPlan;
pub use timeline::{adjust_schedule, LightEvent, PlaybackClock, RawSchedule, Schedule};

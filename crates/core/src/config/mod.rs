use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{LightSyncError, Palette, Result, SyncMode};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sync: SyncConfig,
    pub dispatch: DispatchConfig,
    pub analysis: AnalysisConfig,
}

impl AppConfig {
    /// Loads a JSON config file. Missing sections fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&text)?;
        Ok(config)
    }
}

/// How the light show is derived from the track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// `discrete` or `continuous`.
    pub mode: String,
    /// Semicolon-separated RGB triples.
    pub palette: String,
    /// Color commands sent while measuring latency.
    pub latency_tests: u16,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: "discrete".to_string(),
            palette: "255,0,0;0,0,255".to_string(),
            latency_tests: 10,
        }
    }
}

impl SyncConfig {
    pub fn mode(&self) -> Result<SyncMode> {
        self.mode.parse()
    }

    pub fn palette(&self) -> Result<Palette> {
        self.palette.parse()
    }
}

/// Realtime dispatcher tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Window before each deadline that is spun instead of slept.
    pub spin_threshold_ms: u64,
    /// Interval between "still playing?" checks once every event is out.
    pub drain_poll_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            spin_threshold_ms: 2,
            drain_poll_ms: 50,
        }
    }
}

impl DispatchConfig {
    pub fn spin_threshold(&self) -> Duration {
        Duration::from_millis(self.spin_threshold_ms)
    }

    pub fn drain_poll(&self) -> Result<Duration> {
        if self.drain_poll_ms == 0 {
            return Err(LightSyncError::validation(
                "drain poll interval must be at least 1 ms",
            ));
        }
        Ok(Duration::from_millis(self.drain_poll_ms))
    }
}

/// Configuration for in-process feature extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub frame_size: usize,
    pub hop_length: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_length: 512,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "sync": { "mode": "continuous" } }"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.sync.mode().unwrap(), SyncMode::Continuous);
        assert_eq!(config.sync.latency_tests, 10);
        assert_eq!(config.dispatch, DispatchConfig::default());
        assert_eq!(config.analysis.hop_length, 512);
    }

    #[test]
    fn default_palette_parses() {
        assert_eq!(SyncConfig::default().palette().unwrap().len(), 2);
    }

    #[test]
    fn zero_drain_poll_is_rejected() {
        let dispatch = DispatchConfig {
            drain_poll_ms: 0,
            ..Default::default()
        };
        assert!(dispatch.drain_poll().is_err());
    }

    #[test]
    fn malformed_file_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{").unwrap();

        assert!(matches!(
            AppConfig::load(&path),
            Err(LightSyncError::Json(_))
        ));
    }
}

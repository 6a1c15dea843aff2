use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
    sync::{Mutex, MutexGuard},
};

use crate::{AnalysisConfig, AudioFeatures, FeatureExtractor, LightSyncError, Result};

/// Source of analysed features for a track.
pub trait FeatureProvider {
    /// Returns the features for `source`, or an [`LightSyncError::AudioDecode`]
    /// when the source cannot be read or analysed.
    fn features(&self, source: &Path) -> Result<AudioFeatures>;
}

/// Reads a feature cache previously written by [`write_feature_cache`].
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFeatureProvider;

impl FeatureProvider for JsonFeatureProvider {
    fn features(&self, source: &Path) -> Result<AudioFeatures> {
        let file = File::open(source).map_err(|err| {
            LightSyncError::decode(format!("cannot open {}: {err}", source.display()))
        })?;
        let features: AudioFeatures = serde_json::from_reader(BufReader::new(file))
            .map_err(|err| {
                LightSyncError::decode(format!(
                    "{} is not a feature cache: {err}",
                    source.display()
                ))
            })?;
        features.validate()?;
        Ok(features)
    }
}

/// Persists features so later runs can skip analysis.
pub fn write_feature_cache(features: &AudioFeatures, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer(BufWriter::new(file), features)?;
    Ok(())
}

/// Decodes WAV files and analyses them in-process.
#[derive(Debug)]
pub struct WavFeatureProvider {
    extractor: Mutex<FeatureExtractor>,
}

impl WavFeatureProvider {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        Ok(Self {
            extractor: Mutex::new(FeatureExtractor::new(
                config.frame_size,
                config.hop_length,
            )?),
        })
    }

    fn lock_extractor(&self) -> Result<MutexGuard<'_, FeatureExtractor>> {
        self.extractor
            .lock()
            .map_err(|_| LightSyncError::decode("feature extractor has been poisoned"))
    }
}

impl FeatureProvider for WavFeatureProvider {
    fn features(&self, source: &Path) -> Result<AudioFeatures> {
        let (samples, sample_rate) = read_wav_mono(source)?;
        tracing::info!(
            source = %source.display(),
            sample_rate,
            samples = samples.len(),
            "analysing track"
        );
        let mut extractor = self.lock_extractor()?;
        extractor.extract(&samples, sample_rate)
    }
}

/// Picks the provider from the file extension: `.json` is a feature cache,
/// anything else is decoded as WAV.
pub fn provider_for(source: &Path, config: &AnalysisConfig) -> Result<Box<dyn FeatureProvider>> {
    let is_cache = source
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_cache {
        Ok(Box::new(JsonFeatureProvider))
    } else {
        Ok(Box::new(WavFeatureProvider::new(config)?))
    }
}

fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            let max_val = (1_i64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}

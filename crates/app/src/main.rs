use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use music_lights_core::{
    provider_for, write_feature_cache, Actuator, ActuatorSet, AppConfig, FeatureProvider,
    LatencyEstimate, LightSyncError, ShowPlan, TimedPlayback, TracingGateway, WavFeatureProvider,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> music_lights_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Analyse { input, output } => run_analyse(&config, &input, &output),
        Commands::Plan {
            features,
            sync,
            latency_ms,
        } => {
            sync.apply(&mut config);
            run_plan(&config, &features, latency_ms)
        }
        Commands::Play {
            features,
            sync,
            lights,
            simulated_latency_ms,
        } => {
            sync.apply(&mut config);
            run_play(&config, &features, lights, simulated_latency_ms).await
        }
    }
}

fn run_analyse(
    config: &AppConfig,
    input: &PathBuf,
    output: &PathBuf,
) -> music_lights_core::Result<()> {
    tracing::info!(?input, ?output, "analysing track");
    let features = WavFeatureProvider::new(&config.analysis)?.features(input)?;
    write_feature_cache(&features, output)?;
    tracing::info!(
        tempo_bpm = features.tempo_bpm,
        frames = features.loudness_db.len(),
        "feature cache written"
    );
    Ok(())
}

fn run_plan(
    config: &AppConfig,
    source: &PathBuf,
    latency_ms: u64,
) -> music_lights_core::Result<()> {
    // Planning never touches lights; a placeholder actuator satisfies the plan.
    let offline = ActuatorSet::new(vec![Actuator::new("offline", "offline")]);
    let plan = ShowPlan::from_config(config, &offline)?;
    let features = provider_for(source, &config.analysis)?.features(source)?;
    let latency = LatencyEstimate::assumed(Duration::from_millis(latency_ms));

    let schedule = plan.schedule(&features, latency)?;
    tracing::info!(events = schedule.len(), mode = %plan.mode, "schedule planned");
    println!("{}", serde_json::to_string_pretty(&schedule)?);
    Ok(())
}

async fn run_play(
    config: &AppConfig,
    source: &PathBuf,
    lights: Vec<Actuator>,
    simulated_latency_ms: u64,
) -> music_lights_core::Result<()> {
    let plan = ShowPlan::from_config(config, &ActuatorSet::new(lights))?;
    let features = provider_for(source, &config.analysis)?.features(source)?;
    let gateway =
        TracingGateway::with_simulated_latency(Duration::from_millis(simulated_latency_ms));
    let mut playback = TimedPlayback::for_features(&features);

    tokio::select! {
        report = plan.perform(&features, &gateway, &mut playback) => {
            let report = report?;
            tracing::info!(
                events = report.events_dispatched,
                failed = report.commands_failed,
                "done"
            );
            Ok(())
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::warn!("interrupted, the last command may be partially applied");
            Ok(())
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Synchronise smart lights to music", long_about = None)]
struct Cli {
    /// Optional JSON config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the `sync` config section.
#[derive(clap::Args, Debug)]
struct SyncArgs {
    /// `discrete` or `continuous`.
    #[arg(short, long)]
    mode: Option<String>,
    /// Colors as `r,g,b;r,g,b;...`.
    #[arg(short, long)]
    palette: Option<String>,
    /// Number of color commands used to measure latency (1-360).
    #[arg(long)]
    latency_tests: Option<u16>,
}

impl SyncArgs {
    fn apply(self, config: &mut AppConfig) {
        if let Some(mode) = self.mode {
            config.sync.mode = mode;
        }
        if let Some(palette) = self.palette {
            config.sync.palette = palette;
        }
        if let Some(latency_tests) = self.latency_tests {
            config.sync.latency_tests = latency_tests;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyse a WAV file ahead of time and persist the feature cache.
    Analyse {
        /// Path to the WAV file that should be analysed.
        input: PathBuf,
        /// Output path for the generated feature cache.
        output: PathBuf,
    },
    /// Print the latency-adjusted schedule as JSON without driving lights.
    Plan {
        /// Feature cache (`.json`) or WAV file.
        #[arg(short, long)]
        features: PathBuf,
        #[command(flatten)]
        sync: SyncArgs,
        /// Assumed one-way command latency.
        #[arg(long, default_value_t = 0)]
        latency_ms: u64,
    },
    /// Run the show against a dry-run gateway that logs every command.
    Play {
        /// Feature cache (`.json`) or WAV file.
        #[arg(short, long)]
        features: PathBuf,
        #[command(flatten)]
        sync: SyncArgs,
        /// Target light as `ADDRESS[=NAME]`; repeat for several lights.
        #[arg(short, long = "light", required = true, value_parser = parse_actuator)]
        lights: Vec<Actuator>,
        /// Delay each dry-run command by this long.
        #[arg(long, default_value_t = 0)]
        simulated_latency_ms: u64,
    },
}

fn parse_actuator(text: &str) -> Result<Actuator, LightSyncError> {
    text.parse()
}

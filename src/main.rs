mod config;
mod export;
mod logging;
mod session;

use anyhow::{Context, Result};
use chime_audio::{AudioGraph, ChimeScheduler, CpalBackend, OfflineBackend, VoicePlan};
use chime_core::{AmbienceKind, BinauralPreset, Layer, WeatherReading};
use clap::{Args, Parser, Subcommand};
use config::AppConfig;
use export::RecordParams;
use parking_lot::Mutex;
use session::Session;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "weather-chimes")]
#[command(about = "Ambient wind chimes that follow the local weather", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: ./weather-chimes.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More logging; repeat for trace
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides shared by the commands that make sound
#[derive(Args, Debug, Clone, Default)]
struct SoundOptions {
    /// Place name to fetch weather for instead of locating
    #[arg(short, long)]
    location: Option<String>,

    /// Enable the binaural beat with a preset (delta, theta, alpha, beta, gamma)
    #[arg(short, long)]
    binaural: Option<BinauralPreset>,

    /// Master volume in dB (-30 to 6)
    #[arg(long, allow_hyphen_values = true)]
    volume: Option<f32>,

    /// Seed for the chime timers
    #[arg(long)]
    seed: Option<u64>,
}

impl SoundOptions {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(location) = &self.location {
            config.weather.location = Some(location.clone());
        }
        if let Some(preset) = self.binaural {
            config.settings.binaural.enabled = true;
            config.settings.binaural.set_preset(preset);
        }
        if let Some(db) = self.volume {
            config.settings.set_volume(Layer::Master, db);
        }
        if self.seed.is_some() {
            config.player.seed = self.seed;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Play the soundscape until Ctrl-C
    Play {
        #[command(flatten)]
        sound: SoundOptions,
    },
    /// Render the soundscape to a WAV file
    Record {
        #[command(flatten)]
        sound: SoundOptions,

        /// Length in seconds
        #[arg(short, long, default_value = "60")]
        duration: f64,

        /// Output file (default: weather-chimes-<timestamp>.wav)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Sample rate in Hz
        #[arg(long, default_value = "44100")]
        sample_rate: u32,

        /// Bit depth (16, 24 or 32)
        #[arg(long, default_value = "16")]
        bit_depth: u16,
    },
    /// Show the current weather and what the chimes will do
    Weather {
        /// Place name to fetch weather for instead of locating
        location: Option<String>,

        /// Print the raw reading as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the chime plan for a hypothetical wind speed
    Chimes {
        /// Wind speed in mph
        wind: f32,

        /// Condition text, e.g. "Heavy rain"
        #[arg(long, default_value = "Clear")]
        condition: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Play { sound } => {
            sound.apply(&mut config);
            let session = Session::new(config, Arc::new(CpalBackend))?;
            session
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Failed to listen for Ctrl-C: {}", e);
                    }
                })
                .await?;
        }
        Commands::Record {
            sound,
            duration,
            output,
            sample_rate,
            bit_depth,
        } => {
            sound.apply(&mut config);
            let params = RecordParams {
                output_path: output.unwrap_or_else(|| export::default_output_path(chrono::Local::now())),
                sample_rate,
                duration_secs: duration,
                bit_depth,
            };
            params.validate()?;

            let capture = Arc::new(Mutex::new(Vec::new()));
            let backend = OfflineBackend::new(sample_rate).capture_into(capture.clone());
            let session = Session::new(config, Arc::new(backend))?;

            info!("Recording {:.1}s to {}", duration, params.output_path.display());
            session
                .run_until(tokio::time::sleep(Duration::from_secs_f64(duration)))
                .await?;

            let samples = std::mem::take(&mut *capture.lock());
            export::write_recording(&samples, &params)
                .with_context(|| format!("Failed to write {}", params.output_path.display()))?;
            println!("Saved {}", params.output_path.display());
        }
        Commands::Weather { location, json } => {
            if location.is_some() {
                config.weather.location = location;
            }
            // Never opened; the session only needs a backend to exist
            let session = Session::new(config, Arc::new(OfflineBackend::new(44100)))?;
            let reading = session.fetch_weather().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&reading)?);
                return Ok(());
            }
            print_reading(&reading);
            print_plan(&session.controller().scheduler().plan(&reading));
        }
        Commands::Chimes { wind, condition } => {
            let scheduler = ChimeScheduler::new(AudioGraph::new(), config.player.tuning, config.player.voices)?;
            let reading = WeatherReading::fallback().with_conditions(condition, wind);
            println!(
                "{:.1} mph, {} ({} ambience)",
                reading.wind_speed(),
                reading.condition_text,
                AmbienceKind::for_condition(&reading.condition_text)
            );
            print_plan(&scheduler.plan(&reading));
        }
    }

    Ok(())
}

fn print_reading(reading: &WeatherReading) {
    println!("{}, {}", reading.location_name, reading.country);
    println!(
        "  {} ({}), {:.1}°C / {:.1}°F",
        reading.condition_text, reading.condition_code, reading.temperature_c, reading.temperature_f
    );
    println!(
        "  wind {:.1} mph, humidity {:.0}%, cloud {:.0}%, {}",
        reading.wind_speed_mph,
        reading.humidity,
        reading.cloud,
        if reading.is_day { "day" } else { "night" }
    );
    println!("  ambience: {}", AmbienceKind::for_condition(&reading.condition_text));
}

fn print_plan(plan: &[VoicePlan]) {
    println!("{:<6} {:>8} {:>10} {:>9} {:>7}", "voice", "chance", "interval", "stagger", "pitch");
    for voice in plan {
        println!(
            "{:<6} {:>7.1}% {:>9.2}s {:>7}ms {:>7.3}",
            voice.name,
            voice.probability * 100.0,
            voice.interval.as_secs_f64(),
            voice.stagger.as_millis(),
            voice.pitch_ratio
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_sound_options_override_config() {
        let cli = Cli::parse_from([
            "weather-chimes",
            "play",
            "--location",
            "Oslo",
            "--binaural",
            "theta",
            "--volume",
            "-12",
            "--seed",
            "3",
        ]);
        let Commands::Play { sound } = cli.command else {
            panic!("expected play");
        };

        let mut config = AppConfig::default();
        sound.apply(&mut config);
        assert_eq!(config.weather.location.as_deref(), Some("Oslo"));
        assert!(config.settings.binaural.enabled);
        assert_eq!(config.settings.binaural.beat_frequency, 6.0);
        assert_eq!(config.settings.volume.master, -12.0);
        assert_eq!(config.player.seed, Some(3));
    }

    #[test]
    fn test_chimes_takes_condition_flag() {
        let cli = Cli::parse_from(["weather-chimes", "-c", "alt.toml", "chimes", "40", "--condition", "Thunderstorm"]);
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        let Commands::Chimes { wind, condition } = cli.command else {
            panic!("expected chimes");
        };
        assert_eq!(wind, 40.0);
        assert_eq!(condition, "Thunderstorm");
    }

    #[test]
    fn test_unknown_preset_is_rejected() {
        assert!(Cli::try_parse_from(["weather-chimes", "play", "--binaural", "omega"]).is_err());
    }
}

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const CRATES: &[&str] = &["weather_chimes", "chime_core", "chime_audio", "chime_weather"];

/// Filter used when `RUST_LOG` is unset: our crates at the requested level,
/// everything else at warn
fn default_directives(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let mut directives = vec!["warn".to_string()];
    directives.extend(CRATES.iter().map(|krate| format!("{}={}", krate, level)));
    directives.join(",")
}

pub fn init(verbosity: u8) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(verbosity > 0))
        .try_init()?;
    Ok(())
}

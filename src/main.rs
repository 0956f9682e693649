//! musicd-media command line
//!
//! ```text
//! musicd-media probe <file>
//! musicd-media transcode <file> <stream> [start] [length] [format]
//! ```
//!
//! `probe` prints the tracks and images found as JSON.  `transcode` writes
//! the encoded stream to stdout.  Logs go to stderr.

use std::path::Path;

use tokio::io::AsyncWriteExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use musicd_media::{AudioStreamOptions, Config, LoggingConfig, MediaError, Result};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "musicd-media";

/// Environment variable naming the configuration file
const CONFIG_ENV: &str = "MUSICD_MEDIA_CONFIG";

/// Configuration file used when the environment variable is unset
const DEFAULT_CONFIG_FILE: &str = "musicd-media.toml";

const USAGE: &str = "usage:
  musicd-media probe <file>
  musicd-media transcode <file> <stream> [start] [length] [format]";

#[tokio::main]
async fn main() -> Result<()> {
    let (config, config_error) = load_config();
    init_logging(&config.logging);
    if let Some(e) = config_error {
        tracing::warn!("Failed to load config file: {}. Using defaults.", e);
    }

    tracing::debug!("{} v{} starting", APP_NAME, VERSION);

    musicd_media::init()?;
    musicd_media::install_log_bridge();
    tracing::debug!("FFmpeg version: {}", musicd_media::ffmpeg_version_info());

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("probe") if args.len() == 2 => probe(&args[1]),
        Some("transcode") if (3..=6).contains(&args.len()) => transcode(&args[1..], &config).await,
        _ => {
            eprintln!("{}", USAGE);
            Err(MediaError::Config("invalid arguments".into()))
        }
    }
}

/// Read the configuration file, if any.  A broken file falls back to the
/// defaults; the error is returned so it can be logged once logging is up.
fn load_config() -> (Config, Option<MediaError>) {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    if !Path::new(&path).exists() {
        return (Config::default(), None);
    }
    match Config::from_file(&path) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    }
}

/// Initialize logging with tracing, to stderr
fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let json = logging.is_json();
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn probe(path: &str) -> Result<()> {
    let info = musicd_media::try_probe(path)?;
    let json = serde_json::to_string_pretty(&info).map_err(std::io::Error::from)?;
    println!("{}", json);
    Ok(())
}

async fn transcode(args: &[String], config: &Config) -> Result<()> {
    let path = &args[0];
    let stream_index: usize = parse_arg(&args[1], "stream")?;
    let start: f64 = args.get(2).map(|s| parse_arg(s, "start")).transpose()?.unwrap_or(0.0);
    let length: f64 = args.get(3).map(|s| parse_arg(s, "length")).transpose()?.unwrap_or(0.0);
    let format = args
        .get(4)
        .cloned()
        .unwrap_or_else(|| config.transcode.default_target_codec.clone());

    let options = AudioStreamOptions::new(path, stream_index, format).with_window(start, length);
    let mut rx = musicd_media::spawn_audio_stream(options, &config.transcode);

    let mut stdout = tokio::io::stdout();
    let mut written = 0usize;
    while let Some(chunk) = rx.recv().await {
        let chunk = chunk?;
        stdout.write_all(&chunk).await?;
        written += chunk.len();
    }
    stdout.flush().await?;

    tracing::info!(bytes = written, "transcode complete");
    Ok(())
}

fn parse_arg<T: std::str::FromStr>(value: &str, name: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| MediaError::Config(format!("invalid {}: {:?}", name, value)))
}

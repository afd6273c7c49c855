//! Darkroom - Regenerate a Photo from the Command Line
//!
//! Loads configuration, acquires one photo from a file, runs it through the
//! describe/generate pipeline and draws the simulated progress as a bar on
//! stderr. The generated image is reported (type and size) but not written
//! anywhere.
//!
//! # Usage
//!
//! ```bash
//! # Regenerate a photo
//! DARKROOM_API_KEY=... darkroom photo.jpg
//!
//! # Custom config file and full error text
//! darkroom photo.jpg --config ./darkroom.toml --detailed-errors
//!
//! # Verbose logging
//! RUST_LOG=debug darkroom photo.jpg
//! ```
//!
//! # Signals
//!
//! - `SIGINT` (Ctrl-C): cancel the run and exit with status 130

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use darkroom_core::{
    default_config_path, load_config_from_path, ConfigOverrides, GeminiService, Studio,
    StudioEvent,
};

const BAR_WIDTH: usize = 30;
const EXIT_CANCELLED: u8 = 130;

/// Darkroom - regenerate a photo with an image model
#[derive(Parser, Debug)]
#[command(name = "darkroom")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Photo to regenerate (JPEG, PNG or WebP)
    #[arg(value_name = "PHOTO")]
    photo: PathBuf,

    /// Configuration file (defaults to ~/.config/darkroom/darkroom.toml)
    #[arg(short = 'c', long, env = "DARKROOM_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// API key (overrides DARKROOM_API_KEY / GEMINI_API_KEY)
    #[arg(long, value_name = "KEY")]
    api_key: Option<String>,

    /// Service base URL
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Show the full error text instead of a generic message
    #[arg(long)]
    detailed_errors: bool,

    /// Log level when RUST_LOG is not set
    #[arg(short = 'l', long, env = "DARKROOM_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref key) = self.api_key {
            overrides = overrides.with_api_key(key.clone());
        }
        if let Some(ref url) = self.base_url {
            overrides = overrides.with_base_url(url.clone());
        }
        if self.detailed_errors {
            overrides = overrides.with_detailed_errors(true);
        }
        overrides
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("darkroom={level},darkroom_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

/// Text of the progress bar for a visible percentage
fn render_bar(visible: f32) -> String {
    let clamped = visible.clamp(0.0, 100.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let filled = ((clamped / 100.0) * BAR_WIDTH as f32).round() as usize;
    format!(
        "[{}{}] {clamped:5.1}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled)
    )
}

/// Redraws the bar only when the shown tenth of a percent changes
#[derive(Debug, Default)]
struct ProgressLine {
    shown: Option<i32>,
}

impl ProgressLine {
    fn update(&mut self, visible: f32) {
        #[allow(clippy::cast_possible_truncation)]
        let key = (visible * 10.0).round() as i32;
        if self.shown == Some(key) {
            return;
        }
        self.shown = Some(key);
        eprint!("\r{}", render_bar(visible));
    }

    fn finish(&mut self) {
        if self.shown.take().is_some() {
            eprintln!();
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging first
    init_logging(&args.log_level);
    debug!(version = env!("CARGO_PKG_VERSION"), "darkroom starting");

    // Configuration: file and environment, then CLI overrides
    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = tokio::task::spawn_blocking(move || load_config_from_path(config_path))
        .await
        .context("configuration loader did not finish")?
        .context("failed to load configuration")?;
    args.overrides().apply(&mut config);
    info!(source = %config.source(), base_url = %config.api.base_url, "Configuration ready");

    let Some(api_key) = config.api_key.clone() else {
        anyhow::bail!("no API key: set DARKROOM_API_KEY (or GEMINI_API_KEY) or pass --api-key");
    };
    let service = Arc::new(GeminiService::new(&config.api, api_key)?);
    let (studio, mut events) = Studio::builder(service).config(config).build();

    let session = studio
        .process_file(&args.photo)
        .await
        .with_context(|| format!("failed to load {}", args.photo.display()))?;
    info!(session = %session, photo = %args.photo.display(), "Processing photo");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut line = ProgressLine::default();

    let code = loop {
        tokio::select! {
            biased;
            _ = &mut ctrl_c => {
                studio.cancel();
                line.finish();
                eprintln!("Cancelled.");
                break ExitCode::from(EXIT_CANCELLED);
            }
            event = events.recv() => {
                let Some(event) = event else {
                    line.finish();
                    break ExitCode::FAILURE;
                };
                match event {
                    StudioEvent::Progress { visible, .. } => line.update(visible),
                    StudioEvent::Described { text, .. } => {
                        line.finish();
                        eprintln!("Description: {text}");
                    }
                    StudioEvent::Revealed { artifact, .. } => {
                        line.finish();
                        println!(
                            "Generated {} ({} bytes)",
                            artifact.mime_type,
                            artifact.bytes.len()
                        );
                        break ExitCode::SUCCESS;
                    }
                    StudioEvent::Failed { message, kind, .. } => {
                        line.finish();
                        debug!(%kind, "Run failed");
                        eprintln!("{message}");
                        break ExitCode::FAILURE;
                    }
                    StudioEvent::Started { .. }
                    | StudioEvent::Reset
                    | StudioEvent::PreviewStarted
                    | StudioEvent::PreviewStopped => {}
                }
            }
        }
    };

    studio.shutdown().await;
    Ok(code)
}

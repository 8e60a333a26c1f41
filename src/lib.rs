//! snapcam - Take photos and record short clips from your webcam.
//!
//! This is the main library crate for snapcam. It provides the capture
//! session controller and the camera, recorder, conversion and save
//! backends it drives.

pub mod capture;
pub mod config;
pub mod controller;
pub mod media;
pub mod recorder;
pub mod save;
pub mod transcode;
pub mod utils;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use capture::{LiveSource, WebcamSource};
use config::CaptureConfig;
use controller::{CaptureController, ControllerSettings};
use recorder::FfmpegRecorderFactory;
use save::DirectorySink;
use transcode::FfmpegTranscoder;
use utils::error::AppResult;

/// Initialize tracing/logging
///
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snapcam=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Open the configured camera and wire a controller around it
///
/// When conversion is enabled FFmpeg is checked up front; a failed check is
/// only logged, and conversion is retried on first use.
pub async fn build_controller(config: &CaptureConfig) -> AppResult<CaptureController> {
    config.validate()?;

    tracing::info!("Starting snapcam v{}", env!("CARGO_PKG_VERSION"));

    let source: Arc<dyn LiveSource> = Arc::new(WebcamSource::open(config)?);
    let recorders = Arc::new(FfmpegRecorderFactory::new(
        config.ffmpeg_path.clone(),
        config.fragment_size,
    ));
    let sink = Arc::new(DirectorySink::new(config.output_dir.clone()));

    tracing::info!("Saving captures to {}", config.output_dir.display());

    let controller = CaptureController::new(source, recorders, sink, ControllerSettings::from(config));
    if config.convert_to.is_none() {
        return Ok(controller);
    }

    let transcoder = Arc::new(FfmpegTranscoder::new(config.ffmpeg_path.clone()));
    if let Err(e) = transcoder.load().await {
        tracing::warn!(code = e.code(), "{}", e);
    }
    Ok(controller.with_transcoder(transcoder))
}

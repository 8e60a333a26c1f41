//! CLI commands for capture operations
//!
//! This module provides command-line functionality for:
//! - Listing available cameras and microphones
//! - Taking photos
//! - Recording clips for a fixed duration
//! - An interactive prompt standing in for capture/record buttons

use anyhow::{bail, Context};
use clap::Args;
use snapcam::capture::devices::{get_audio_input_devices, get_cameras};
use snapcam::capture::ImageFormat;
use snapcam::config::CaptureConfig;
use snapcam::controller::{CaptureEvent, ControllerHandle};
use snapcam::media::ContainerFormat;
use snapcam::recorder::RecordingState;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

/// Flags shared by every subcommand; they override the config file
#[derive(Args, Debug, Clone, Default)]
pub struct CaptureArgs {
    /// Configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory to save photos and recordings into
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Camera index or name (from 'snapcam list')
    #[arg(short, long, global = true)]
    camera: Option<String>,

    /// Record video without the microphone
    #[arg(long, global = true)]
    no_audio: bool,

    /// Convert recordings before saving: mp4, webm, mkv or none
    #[arg(long, global = true, value_name = "FORMAT")]
    convert: Option<String>,

    /// Photo format: jpeg or png
    #[arg(long, global = true, value_name = "FORMAT")]
    photo_format: Option<ImageFormat>,
}

impl CaptureArgs {
    /// Load the config file and apply command-line overrides
    pub fn resolve(&self) -> anyhow::Result<CaptureConfig> {
        let mut config = CaptureConfig::load_or_default(self.config.as_deref())
            .context("Failed to load configuration")?;

        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(camera) = &self.camera {
            config.camera_id = Some(camera.clone());
        }
        if self.no_audio {
            config.audio = false;
        }
        if let Some(convert) = &self.convert {
            config.convert_to = parse_convert(convert)?;
        }
        if let Some(format) = self.photo_format {
            config.photo_format = format;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn parse_convert(value: &str) -> anyhow::Result<Option<ContainerFormat>> {
    if value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    Ok(Some(value.parse()?))
}

/// List all available cameras and microphones
pub fn list_devices() -> anyhow::Result<()> {
    let cameras = get_cameras();
    if cameras.is_empty() {
        println!("No cameras found.");
    } else {
        println!("Available cameras:");
        println!();
        for camera in &cameras {
            println!("  [{}] {}", camera.id, camera.name);
            let resolutions: Vec<String> = camera
                .supported_resolutions
                .iter()
                .map(|r| format!("{}x{}", r.width, r.height))
                .collect();
            println!("      Resolutions: {}", resolutions.join(", "));
        }
    }

    println!();

    let microphones = get_audio_input_devices();
    if microphones.is_empty() {
        println!("No microphones found.");
    } else {
        println!("Available microphones:");
        println!();
        for mic in &microphones {
            let marker = if mic.is_default { " (default)" } else { "" };
            println!("  {}{}", mic.name, marker);
        }
    }

    Ok(())
}

/// Print the effective configuration, optionally writing it to a file
pub fn show_config(args: &CaptureArgs, write: Option<PathBuf>) -> anyhow::Result<()> {
    let config = args.resolve()?;
    println!("{}", serde_json::to_string_pretty(&config)?);

    if let Some(path) = write {
        config
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Configuration written to {}", path.display());
    }
    Ok(())
}

/// Take a single photo
pub async fn take_photo(config: &CaptureConfig) -> anyhow::Result<()> {
    let controller = snapcam::build_controller(config)
        .await
        .context("Failed to open camera")?;

    match controller.capture_photo() {
        Some(path) => {
            println!("Photo saved to: {}", path.display());
            Ok(())
        }
        None => bail!("Photo capture failed (see log for details)"),
    }
}

/// Record for `duration_secs`, or until Ctrl-C
pub async fn record_video(config: &CaptureConfig, duration_secs: u64) -> anyhow::Result<()> {
    let controller = snapcam::build_controller(config)
        .await
        .context("Failed to open camera")?;
    let handle = ControllerHandle::spawn(controller);
    let mut events = handle.subscribe();

    handle.start_recording();
    let recording = handle
        .status()
        .await
        .map(|status| status.state == RecordingState::Recording)
        .unwrap_or(false);
    if !recording {
        handle.shutdown().await;
        print_pending(&mut events);
        bail!("Recording did not start (see log for details)");
    }

    println!("Recording for {}s... (Ctrl-C to stop early)", duration_secs);
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(duration_secs)) => {}
        _ = tokio::signal::ctrl_c() => println!(),
    }

    println!("Stopping...");
    handle.shutdown().await;

    let saved = print_pending(&mut events);
    if !saved {
        bail!("Recording was not saved (see log for details)");
    }
    Ok(())
}

/// Interactive prompt: p = photo, r = start/stop, s = status, q = quit
pub async fn interactive(config: &CaptureConfig) -> anyhow::Result<()> {
    let controller = snapcam::build_controller(config)
        .await
        .context("Failed to open camera")?;
    let handle = ControllerHandle::spawn(controller);

    let mut events = handle.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("{}", describe(&event)),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("Missed {} capture events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    println!("Commands: [p] photo  [r] start/stop recording  [s] status  [q] quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "p" | "photo" => handle.capture_photo(),
            "r" | "record" => handle.toggle_recording(),
            "s" | "status" => match handle.status().await {
                Some(status) => println!("{}", serde_json::to_string(&status)?),
                None => break,
            },
            "q" | "quit" | "exit" => break,
            "" => {}
            other => println!("Unknown command '{}'", other),
        }
    }

    println!("Finishing up...");
    handle.shutdown().await;
    // Every sender is gone now, so the printer drains what is left and exits
    if let Err(e) = printer.await {
        tracing::warn!("Event printer failed: {}", e);
    }
    Ok(())
}

/// Print events that are already queued; returns whether a recording was saved
fn print_pending(events: &mut broadcast::Receiver<CaptureEvent>) -> bool {
    let mut saved = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, CaptureEvent::RecordingSaved { .. }) {
            saved = true;
        }
        println!("{}", describe(&event));
    }
    saved
}

fn describe(event: &CaptureEvent) -> String {
    match event {
        CaptureEvent::PhotoSaved { path } => format!("Photo saved to: {}", path.display()),
        CaptureEvent::RecordingStarted { .. } => "Recording...".to_string(),
        CaptureEvent::RecordingStopped { .. } => "Recording stopped".to_string(),
        CaptureEvent::Converting { target } => {
            format!("Converting to {}...", target.extension().to_uppercase())
        }
        CaptureEvent::RecordingSaved { path, bytes } => {
            format!("Recording saved to: {} ({} bytes)", path.display(), bytes)
        }
        CaptureEvent::Failed { message, .. } => format!("Error: {}", message),
    }
}

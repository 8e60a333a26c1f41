//! FFmpeg-backed media recorder
//!
//! Raw camera frames are piped into FFmpeg's stdin; FFmpeg muxes them
//! (plus the microphone, when enabled) into a streamable container on
//! stdout, which is chopped into fragments and sent to the controller.

use bytes::Bytes;
use parking_lot::Mutex as ParkingMutex;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use super::channel::{MediaRecorder, RecorderEvent, RecorderFactory, RecorderOptions};
use crate::capture::{LiveSource, StreamInfo};
use crate::media::ContainerFormat;
use crate::utils::error::{AppError, AppResult};

/// Number of FFmpeg stderr lines kept for error reports
const STDERR_TAIL_LINES: usize = 8;

/// Builds [`FfmpegRecorder`]s
#[derive(Debug, Clone)]
pub struct FfmpegRecorderFactory {
    ffmpeg_path: String,
    fragment_size: usize,
}

impl FfmpegRecorderFactory {
    pub fn new(ffmpeg_path: impl Into<String>, fragment_size: usize) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            fragment_size: fragment_size.max(1),
        }
    }
}

impl RecorderFactory for FfmpegRecorderFactory {
    fn create(
        &self,
        source: Arc<dyn LiveSource>,
        options: RecorderOptions,
    ) -> AppResult<Box<dyn MediaRecorder>> {
        let container = ContainerFormat::from_mime(&options.mime_type)?;
        if !container.is_streamable() {
            return Err(AppError::UnsupportedMimeType(format!(
                "{} cannot be written while recording",
                options.mime_type
            )));
        }

        if !source.is_ready() {
            return Err(AppError::StreamUnavailable(
                "Camera stream is not running".to_string(),
            ));
        }

        Ok(Box::new(FfmpegRecorder {
            ffmpeg_path: self.ffmpeg_path.clone(),
            fragment_size: self.fragment_size,
            container,
            mime_type: options.mime_type,
            session_id: options.session_id,
            events: options.events,
            source,
            process: Arc::new(ParkingMutex::new(None)),
            recording: false,
        }))
    }
}

/// Recorder that encodes the live stream with an FFmpeg child process
pub struct FfmpegRecorder {
    ffmpeg_path: String,
    fragment_size: usize,
    container: ContainerFormat,
    mime_type: String,
    session_id: Uuid,
    events: UnboundedSender<RecorderEvent>,
    source: Arc<dyn LiveSource>,
    process: Arc<ParkingMutex<Option<Child>>>,
    recording: bool,
}

impl MediaRecorder for FfmpegRecorder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn start(&mut self) -> AppResult<()> {
        if self.recording {
            return Err(AppError::InvalidState("Recorder already started".to_string()));
        }

        let info = self.source.info();
        let args = build_record_args(&info, self.container);
        tracing::info!("Starting FFmpeg recorder: {:?}", args);

        let mut process = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AppError::RecorderConstruction(format!("Failed to start FFmpeg: {}", e)))?;

        let (stdin, stdout, stderr) = match (
            process.stdin.take(),
            process.stdout.take(),
            process.stderr.take(),
        ) {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                let _ = process.kill();
                let _ = process.wait();
                return Err(AppError::RecorderConstruction(
                    "Failed to capture FFmpeg pipes".to_string(),
                ));
            }
        };

        if let Err(e) = self.source.attach_frame_sink(Box::new(stdin)) {
            let _ = process.kill();
            let _ = process.wait();
            return Err(e);
        }

        *self.process.lock() = Some(process);

        let stderr_tail = spawn_stderr_logger(stderr);
        let process = self.process.clone();
        let events = self.events.clone();
        let session = self.session_id;
        let fragment_size = self.fragment_size;

        let spawned = std::thread::Builder::new()
            .name("snapcam-recorder".to_string())
            .spawn(move || {
                let delivered = pump_fragments(stdout, fragment_size, session, &events);

                let child = process.lock().take();
                let status = child.map(|mut child| child.wait());
                let tail = stderr_tail
                    .join()
                    .unwrap_or_default()
                    .into_iter()
                    .collect::<Vec<_>>()
                    .join("\n");

                match status {
                    Some(Ok(status)) if status.success() => {
                        tracing::info!("FFmpeg recorder finished: {} bytes delivered", delivered);
                    }
                    Some(Ok(status)) => {
                        let _ = events.send(RecorderEvent::Error {
                            session,
                            message: format!("FFmpeg exited with status {}: {}", status, tail),
                        });
                    }
                    Some(Err(e)) => {
                        let _ = events.send(RecorderEvent::Error {
                            session,
                            message: format!("Failed to wait for FFmpeg: {}", e),
                        });
                    }
                    None => {}
                }

                let _ = events.send(RecorderEvent::Stopped { session });
            });

        if let Err(e) = spawned {
            self.source.detach_frame_sink();
            if let Some(mut child) = self.process.lock().take() {
                let _ = child.kill();
                let _ = child.wait();
            }
            return Err(AppError::RecorderConstruction(format!(
                "Failed to start recorder thread: {}",
                e
            )));
        }

        self.recording = true;
        Ok(())
    }

    fn stop(&mut self) -> AppResult<()> {
        if !self.recording {
            return Err(AppError::InvalidState("Recorder is not recording".to_string()));
        }
        self.recording = false;

        // Dropping the sink closes FFmpeg's stdin, which makes it flush and exit
        self.source.detach_frame_sink();
        tracing::debug!("FFmpeg recorder stop requested");
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}

impl Drop for FfmpegRecorder {
    fn drop(&mut self) {
        if self.recording {
            self.source.detach_frame_sink();
        }
    }
}

/// Build the FFmpeg arguments for recording `info` into `container` on stdout
pub fn build_record_args(info: &StreamInfo, container: ContainerFormat) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "warning"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    if info.is_mjpeg() {
        args.extend([
            "-f".to_string(),
            "mjpeg".to_string(),
            "-framerate".to_string(),
            info.fps.to_string(),
        ]);
    } else {
        args.extend([
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pixel_format".to_string(),
            info.pixel_format.clone(),
            "-video_size".to_string(),
            format!("{}x{}", info.width, info.height),
            "-framerate".to_string(),
            info.fps.to_string(),
        ]);
    }
    args.extend(["-i".to_string(), "pipe:0".to_string()]);

    let audio = if info.audio {
        audio_input_args(info.audio_device.as_deref())
    } else {
        None
    };
    let has_audio = audio.is_some();
    if let Some(audio) = audio {
        args.extend(audio);
        // The microphone never ends on its own; stop with the video
        args.push("-shortest".to_string());
    }

    args.extend(container.codec_args(true));
    if !has_audio {
        args.push("-an".to_string());
    }
    args.extend([
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-f".to_string(),
        container.muxer().to_string(),
        "pipe:1".to_string(),
    ]);
    args
}

/// Platform microphone input for FFmpeg
fn audio_input_args(device: Option<&str>) -> Option<Vec<String>> {
    #[cfg(target_os = "linux")]
    {
        Some(vec![
            "-f".to_string(),
            "pulse".to_string(),
            "-i".to_string(),
            device.unwrap_or("default").to_string(),
        ])
    }

    #[cfg(target_os = "macos")]
    {
        Some(vec![
            "-f".to_string(),
            "avfoundation".to_string(),
            "-i".to_string(),
            format!(":{}", device.unwrap_or("0")),
        ])
    }

    #[cfg(target_os = "windows")]
    {
        match device {
            Some(name) => Some(vec![
                "-f".to_string(),
                "dshow".to_string(),
                "-i".to_string(),
                format!("audio={}", name),
            ]),
            None => {
                tracing::warn!("DirectShow needs a microphone name (audioDevice); recording video only");
                None
            }
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        let _ = device;
        None
    }
}

/// Read `reader` to EOF, sending every full (or final partial) chunk as a fragment
///
/// Returns the number of bytes delivered.
pub fn pump_fragments<R: Read>(
    mut reader: R,
    fragment_size: usize,
    session: Uuid,
    events: &UnboundedSender<RecorderEvent>,
) -> u64 {
    let mut buffer = vec![0u8; fragment_size.max(1)];
    let mut delivered: u64 = 0;

    loop {
        let mut filled = 0;
        let mut eof = false;
        while filled < buffer.len() {
            match reader.read(&mut buffer[filled..]) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("Failed to read recorder output: {}", e);
                    eof = true;
                    break;
                }
            }
        }

        if filled > 0 {
            delivered += filled as u64;
            let data = Bytes::copy_from_slice(&buffer[..filled]);
            if events.send(RecorderEvent::Data { session, data }).is_err() {
                tracing::debug!("Controller went away, discarding recorder output");
            }
        }

        if eof {
            return delivered;
        }
    }
}

fn spawn_stderr_logger(stderr: ChildStderr) -> std::thread::JoinHandle<VecDeque<String>> {
    std::thread::spawn(move || drain_log_lines(BufReader::new(stderr), STDERR_TAIL_LINES))
}

/// Log every line of FFmpeg output until EOF, keeping the last `keep` lines
///
/// Lines need not be UTF-8. The reader must be drained to the end, or FFmpeg
/// dies on its next write to a closed pipe.
pub fn drain_log_lines<R: BufRead>(mut reader: R, keep: usize) -> VecDeque<String> {
    let mut tail = VecDeque::with_capacity(keep);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                tracing::debug!(target: "snapcam::ffmpeg", "{}", line);
                if keep > 0 {
                    if tail.len() == keep {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!("Failed to read FFmpeg log output: {}", e);
                break;
            }
        }
    }
    tail
}

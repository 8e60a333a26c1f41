//! Controller event loop
//!
//! The controller is moved into a single task that multiplexes user
//! commands, recorder events and finished save jobs. Everything that touches
//! controller state runs on that task.

use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};

use super::{CaptureController, CaptureEvent};
use crate::recorder::{ControllerStatus, RecorderEvent};

/// User actions sent to the controller task
#[derive(Debug)]
pub enum Command {
    CapturePhoto,
    StartRecording,
    StopRecording,
    ToggleRecording,
    Status(oneshot::Sender<ControllerStatus>),
    Shutdown,
}

/// Cheap front for a controller running on its own task
pub struct ControllerHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<CaptureEvent>,
    task: JoinHandle<()>,
}

impl ControllerHandle {
    /// Move `controller` onto a new task and return a handle to it
    pub fn spawn(mut controller: CaptureController) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let events = controller.event_tx.clone();
        let recorder_events = controller.take_recorder_events();

        let task = tokio::spawn(async move {
            match recorder_events {
                Some(recorder_events) => run(controller, command_rx, recorder_events).await,
                None => tracing::error!("Recorder events were already taken; controller not started"),
            }
        });

        Self {
            commands,
            events,
            task,
        }
    }

    /// Subscribe to capture events
    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }

    pub fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("Controller task has exited; command dropped");
        }
    }

    pub fn capture_photo(&self) {
        self.send(Command::CapturePhoto);
    }

    pub fn start_recording(&self) {
        self.send(Command::StartRecording);
    }

    pub fn stop_recording(&self) {
        self.send(Command::StopRecording);
    }

    pub fn toggle_recording(&self) {
        self.send(Command::ToggleRecording);
    }

    /// Current controller status, or `None` if the task has exited
    pub async fn status(&self) -> Option<ControllerStatus> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands.send(Command::Status(reply_tx)).ok()?;
        reply_rx.await.ok()
    }

    /// Stop any recording, wait for pending saves, and end the task
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            tracing::error!("Controller task failed: {}", e);
        }
    }
}

async fn run(
    mut controller: CaptureController,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut recorder_events: mpsc::UnboundedReceiver<RecorderEvent>,
) {
    let mut saves: JoinSet<Option<PathBuf>> = JoinSet::new();
    let mut shutting_down = false;

    tracing::debug!("Controller task started");

    loop {
        if shutting_down && !controller.has_session() && saves.is_empty() {
            break;
        }

        tokio::select! {
            command = commands.recv(), if !shutting_down => match command {
                Some(Command::CapturePhoto) => {
                    controller.capture_photo();
                }
                Some(Command::StartRecording) => {
                    controller.start_recording();
                }
                Some(Command::StopRecording) => controller.stop_recording(),
                Some(Command::ToggleRecording) => controller.toggle_recording(),
                Some(Command::Status(reply)) => {
                    let _ = reply.send(controller.status());
                }
                Some(Command::Shutdown) | None => {
                    tracing::info!("Shutting down capture controller");
                    shutting_down = true;
                    controller.stop_recording();
                }
            },
            Some(event) = recorder_events.recv() => {
                if let Some(job) = controller.handle_recorder_event(event) {
                    saves.spawn(job.run());
                }
            },
            Some(finished) = saves.join_next(), if !saves.is_empty() => {
                if let Err(e) = finished {
                    tracing::error!("Save task failed: {}", e);
                }
            },
            else => break,
        }
    }

    tracing::debug!("Controller task stopped");
}

mod common;

use bytes::Bytes;
use common::{
    controller, pump, settings, FailingSink, MemorySink, ScriptedFactory, StubSource, StubTranscoder,
};
use snapcam::controller::{CaptureController, CaptureEvent, ControllerHandle};
use snapcam::media::ContainerFormat;
use snapcam::recorder::{RecorderEvent, RecordingState};
use snapcam::save::DirectorySink;
use snapcam::utils::filename::parse_filename;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

fn fragment(size: usize) -> Bytes {
    Bytes::from(vec![1u8; size])
}

fn drain_events(events: &mut broadcast::Receiver<CaptureEvent>) -> Vec<CaptureEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn failure_codes(events: &[CaptureEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|event| match event {
            CaptureEvent::Failed { code, .. } => Some(code.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_fragments_are_assembled_into_one_save() {
    let sink = Arc::new(MemorySink::default());
    let mut controller = controller(StubSource::new(true), ScriptedFactory::new(vec![]), sink.clone(), settings(None));
    let mut events = controller.take_recorder_events().unwrap();

    assert!(controller.start_recording());
    assert_eq!(controller.state(), RecordingState::Recording);
    let session = controller.session_id().unwrap();

    for size in [0, 500, 300] {
        controller.on_fragment(session, fragment(size));
    }
    controller.stop_recording();
    assert_eq!(controller.state(), RecordingState::Idle);

    let saved = pump(&mut controller, &mut events).await;
    assert_eq!(saved.len(), 1);

    let saves = sink.saves.lock();
    assert_eq!(saves.len(), 1);
    let (filename, blob) = &saves[0];
    assert_eq!(blob.len(), 800);
    assert_eq!(blob.mime(), "video/webm");

    let (kind, _, ext) = parse_filename(filename).unwrap();
    assert_eq!(kind, "recording");
    assert_eq!(ext, "webm");
}

#[tokio::test]
async fn test_fragments_after_stop_are_included() {
    let sink = Arc::new(MemorySink::default());
    let mut controller = controller(
        StubSource::new(true),
        ScriptedFactory::new(vec![0, 200]),
        sink.clone(),
        settings(None),
    );
    let mut events = controller.take_recorder_events().unwrap();

    controller.start_recording();
    let session = controller.session_id().unwrap();
    controller.on_fragment(session, fragment(100));
    controller.stop_recording();

    pump(&mut controller, &mut events).await;

    let saves = sink.saves.lock();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].1.len(), 300);
}

#[tokio::test]
async fn test_transcoded_recording_is_saved_once() {
    let sink = Arc::new(MemorySink::default());
    let transcoder = Arc::new(StubTranscoder::default());
    let mut controller = controller(
        StubSource::new(true),
        ScriptedFactory::new(vec![1024]),
        sink.clone(),
        settings(Some(ContainerFormat::Mp4)),
    )
    .with_transcoder(transcoder.clone());
    let mut events = controller.take_recorder_events().unwrap();
    let mut notifications = controller.subscribe();

    controller.start_recording();
    controller.stop_recording();
    pump(&mut controller, &mut events).await;

    assert_eq!(transcoder.calls.load(Ordering::SeqCst), 1);
    let saves = sink.saves.lock();
    assert_eq!(saves.len(), 1);
    let (filename, blob) = &saves[0];
    assert_eq!(blob.mime(), "video/mp4");
    assert_eq!(blob.len(), 1024);
    assert!(filename.starts_with("recording_") && filename.ends_with(".mp4"));

    let mut converting = false;
    while let Ok(event) = notifications.try_recv() {
        if let CaptureEvent::Converting { target } = event {
            assert_eq!(target, ContainerFormat::Mp4);
            converting = true;
        }
    }
    assert!(converting);
}

#[tokio::test]
async fn test_stop_without_fragments_saves_nothing() {
    let sink = Arc::new(MemorySink::default());
    let mut controller = controller(StubSource::new(true), ScriptedFactory::new(vec![0]), sink.clone(), settings(None));
    let mut events = controller.take_recorder_events().unwrap();

    controller.start_recording();
    controller.stop_recording();
    let saved = pump(&mut controller, &mut events).await;

    assert!(saved.is_empty());
    assert!(sink.saves.lock().is_empty());
    assert!(!controller.has_session());
}

#[tokio::test]
async fn test_buffer_is_empty_after_save() {
    let sink = Arc::new(MemorySink::default());
    let mut controller = controller(StubSource::new(true), ScriptedFactory::new(vec![64]), sink.clone(), settings(None));
    let mut events = controller.take_recorder_events().unwrap();

    controller.start_recording();
    let session = controller.session_id().unwrap();
    controller.on_fragment(session, fragment(32));
    assert_eq!(controller.status().buffered_bytes, 32);

    controller.stop_recording();
    pump(&mut controller, &mut events).await;

    let status = controller.status();
    assert_eq!(status.buffered_fragments, 0);
    assert_eq!(status.buffered_bytes, 0);
    assert!(!status.finalizing);
    assert!(!status.converting);
}

#[tokio::test]
async fn test_failed_transcode_saves_nothing_and_clears_buffer() {
    let sink = Arc::new(MemorySink::default());
    let transcoder = Arc::new(StubTranscoder {
        fail: true,
        ..StubTranscoder::default()
    });
    let mut controller = controller(
        StubSource::new(true),
        ScriptedFactory::new(vec![512]),
        sink.clone(),
        settings(Some(ContainerFormat::Mp4)),
    )
    .with_transcoder(transcoder.clone());
    let mut events = controller.take_recorder_events().unwrap();
    let mut notifications = controller.subscribe();

    controller.start_recording();
    controller.stop_recording();
    let saved = pump(&mut controller, &mut events).await;

    assert_eq!(saved, vec![None]);
    assert_eq!(transcoder.calls.load(Ordering::SeqCst), 1);
    assert!(sink.saves.lock().is_empty());
    assert_eq!(controller.status().buffered_bytes, 0);
    assert!(!controller.has_session());

    let mut failed = false;
    while let Ok(event) = notifications.try_recv() {
        if let CaptureEvent::Failed { code, .. } = event {
            assert_eq!(code, "TRANSCODE_FAILED");
            failed = true;
        }
    }
    assert!(failed);

    // A new recording can start once the failed job is gone
    assert!(controller.start_recording());
}

#[tokio::test]
async fn test_recorder_error_before_stop_still_saves_once() {
    let sink = Arc::new(MemorySink::default());
    let mut controller = controller(
        StubSource::new(true),
        ScriptedFactory::erroring(vec![40], "encoder crashed"),
        sink.clone(),
        settings(None),
    );
    let mut events = controller.take_recorder_events().unwrap();
    let mut notifications = controller.subscribe();

    controller.start_recording();
    let session = controller.session_id().unwrap();
    controller.on_fragment(session, fragment(60));
    controller.stop_recording();

    let saved = pump(&mut controller, &mut events).await;
    assert_eq!(saved.len(), 1);
    assert!(saved[0].is_some());

    let saves = sink.saves.lock();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].1.len(), 100);

    let events = drain_events(&mut notifications);
    assert_eq!(failure_codes(&events), vec!["RECORDER_ERROR"]);
    let stopped = events
        .iter()
        .filter(|event| matches!(event, CaptureEvent::RecordingStopped { .. }))
        .count();
    assert_eq!(stopped, 1);
}

#[tokio::test]
async fn test_recorder_error_while_recording_ends_recording() {
    let sink = Arc::new(MemorySink::default());
    let mut controller = controller(StubSource::new(true), ScriptedFactory::new(vec![]), sink.clone(), settings(None));
    let mut notifications = controller.subscribe();

    controller.start_recording();
    let session = controller.session_id().unwrap();
    controller.on_fragment(session, fragment(70));

    let job = controller.handle_recorder_event(RecorderEvent::Error {
        session,
        message: "camera unplugged".to_string(),
    });
    assert!(job.is_none());
    assert_eq!(controller.state(), RecordingState::Idle);
    assert!(controller.status().finalizing);

    let events = drain_events(&mut notifications);
    assert_eq!(failure_codes(&events), vec!["RECORDER_ERROR"]);
    assert!(events.iter().any(|event| matches!(
        event,
        CaptureEvent::RecordingStopped { session_id } if *session_id == session
    )));

    let job = controller
        .handle_recorder_event(RecorderEvent::Stopped { session })
        .unwrap();
    assert_eq!(job.blob().len(), 70);
    assert!(job.run().await.is_some());
    assert_eq!(sink.saves.lock().len(), 1);
    assert!(!controller.has_session());
}

#[tokio::test]
async fn test_failed_recorder_stop_drops_session() {
    let sink = Arc::new(MemorySink::default());
    let mut controller = controller(StubSource::new(true), ScriptedFactory::failing_stop(), sink.clone(), settings(None));
    let mut notifications = controller.subscribe();

    controller.start_recording();
    let session = controller.session_id().unwrap();
    controller.on_fragment(session, fragment(10));
    controller.stop_recording();

    assert!(!controller.has_session());
    assert_eq!(controller.state(), RecordingState::Idle);
    assert_eq!(controller.status().buffered_bytes, 0);
    assert_eq!(failure_codes(&drain_events(&mut notifications)), vec!["RECORDER_ERROR"]);
    assert!(sink.saves.lock().is_empty());

    // Nothing is left pending, so a new recording can start
    assert!(controller.start_recording());
}

#[tokio::test]
async fn test_start_while_save_in_flight_is_ignored() {
    let sink = Arc::new(MemorySink::default());
    let factory = ScriptedFactory::new(vec![10]);
    let mut controller = controller(StubSource::new(true), factory.clone(), sink.clone(), settings(None));
    let mut events = controller.take_recorder_events().unwrap();

    controller.start_recording();
    controller.stop_recording();

    let mut job = None;
    while let Ok(event) = events.try_recv() {
        if let Some(ready) = controller.handle_recorder_event(event) {
            job = Some(ready);
        }
    }
    let job = job.unwrap();

    assert!(!controller.has_session());
    assert!(controller.status().converting);
    assert!(!controller.start_recording());
    assert_eq!(factory.created.load(Ordering::SeqCst), 1);

    job.run().await;
    assert!(!controller.status().converting);
    assert!(controller.start_recording());
    assert_eq!(factory.created.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_save_reports_and_clears_buffer() {
    let sink = Arc::new(FailingSink::default());
    let mut controller = CaptureController::new(
        StubSource::new(true),
        ScriptedFactory::new(vec![64]),
        sink.clone(),
        settings(None),
    );
    let mut events = controller.take_recorder_events().unwrap();
    let mut notifications = controller.subscribe();

    controller.start_recording();
    controller.stop_recording();
    let saved = pump(&mut controller, &mut events).await;

    assert_eq!(saved, vec![None]);
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);

    let events = drain_events(&mut notifications);
    assert!(!events
        .iter()
        .any(|event| matches!(event, CaptureEvent::RecordingSaved { .. })));
    assert_eq!(failure_codes(&events), vec!["SAVE_FAILED"]);

    let status = controller.status();
    assert_eq!(status.buffered_bytes, 0);
    assert!(!status.converting);
    assert!(!controller.has_session());
}

#[tokio::test]
async fn test_recording_save_runs_off_the_runtime_thread() {
    let sink = Arc::new(MemorySink::default());
    let mut controller = controller(StubSource::new(true), ScriptedFactory::new(vec![16]), sink.clone(), settings(None));
    let mut events = controller.take_recorder_events().unwrap();

    controller.start_recording();
    controller.stop_recording();
    pump(&mut controller, &mut events).await;

    let threads = sink.threads.lock();
    assert_eq!(threads.len(), 1);
    assert_ne!(threads[0], std::thread::current().id());
}

#[tokio::test]
async fn test_photo_does_not_touch_recording_state() {
    let sink = Arc::new(MemorySink::default());
    let mut controller = controller(StubSource::new(true), ScriptedFactory::new(vec![]), sink.clone(), settings(None));

    controller.start_recording();
    let session = controller.session_id().unwrap();
    controller.on_fragment(session, fragment(10));
    let before = controller.status();

    let path = controller.capture_photo().unwrap();

    assert_eq!(controller.status(), before);
    assert_eq!(controller.session_id(), Some(session));
    let (kind, _, ext) = parse_filename(path.to_str().unwrap()).unwrap();
    assert_eq!(kind, "photo");
    assert_eq!(ext, "jpg");

    let saves = sink.saves.lock();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].1.mime(), "image/jpeg");
}

#[tokio::test]
async fn test_photo_skipped_when_stream_not_ready() {
    let sink = Arc::new(MemorySink::default());
    let source = StubSource::new(false);
    let controller = controller(source.clone(), ScriptedFactory::new(vec![]), sink.clone(), settings(None));

    assert!(controller.capture_photo().is_none());
    assert_eq!(source.grabs.load(Ordering::SeqCst), 0);
    assert!(sink.saves.lock().is_empty());
}

#[tokio::test]
async fn test_recorder_construction_failure_reverts_to_idle() {
    let sink = Arc::new(MemorySink::default());
    let mut controller = controller(StubSource::new(true), ScriptedFactory::failing(), sink.clone(), settings(None));
    let mut notifications = controller.subscribe();

    assert!(!controller.start_recording());
    assert_eq!(controller.state(), RecordingState::Idle);
    assert!(!controller.has_session());
    assert_eq!(controller.status().buffered_fragments, 0);

    match notifications.try_recv().unwrap() {
        CaptureEvent::Failed { code, .. } => assert_eq!(code, "RECORDER_CONSTRUCTION_FAILED"),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_start_while_recording_is_ignored() {
    let sink = Arc::new(MemorySink::default());
    let factory = ScriptedFactory::new(vec![]);
    let mut controller = controller(StubSource::new(true), factory.clone(), sink, settings(None));

    assert!(controller.start_recording());
    let session = controller.session_id();
    controller.on_fragment(session.unwrap(), fragment(50));

    assert!(!controller.start_recording());
    assert_eq!(controller.session_id(), session);
    assert_eq!(controller.status().buffered_bytes, 50);
    assert_eq!(factory.created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_start_while_finalizing_is_ignored() {
    let sink = Arc::new(MemorySink::default());
    let factory = ScriptedFactory::new(vec![10]);
    let mut controller = controller(StubSource::new(true), factory.clone(), sink.clone(), settings(None));
    let mut events = controller.take_recorder_events().unwrap();

    controller.start_recording();
    controller.stop_recording();
    assert!(controller.status().finalizing);
    assert!(!controller.start_recording());

    pump(&mut controller, &mut events).await;
    assert_eq!(sink.saves.lock().len(), 1);
    assert!(controller.start_recording());
    assert_eq!(factory.created.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_stale_fragments_are_ignored() {
    let sink = Arc::new(MemorySink::default());
    let mut controller = controller(StubSource::new(true), ScriptedFactory::new(vec![]), sink, settings(None));

    controller.on_fragment(Uuid::new_v4(), fragment(99));
    assert_eq!(controller.status().buffered_bytes, 0);

    controller.start_recording();
    controller.on_fragment(Uuid::new_v4(), fragment(99));
    assert_eq!(controller.status().buffered_bytes, 0);
}

#[tokio::test]
async fn test_photo_saved_to_directory() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(DirectorySink::new(dir.path()));
    let controller = snapcam::controller::CaptureController::new(
        StubSource::new(true),
        ScriptedFactory::new(vec![]),
        sink,
        settings(None),
    );

    let path = controller.capture_photo().unwrap();
    assert_eq!(path.parent().unwrap(), dir.path());
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
}

#[tokio::test]
async fn test_handle_records_and_saves() {
    let sink = Arc::new(MemorySink::default());
    let controller = controller(
        StubSource::new(true),
        ScriptedFactory::new(vec![0, 500, 300]),
        sink.clone(),
        settings(None),
    );
    let handle = ControllerHandle::spawn(controller);
    let mut notifications = handle.subscribe();

    handle.start_recording();
    assert_eq!(handle.status().await.unwrap().state, RecordingState::Recording);

    handle.toggle_recording();
    let saved = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(CaptureEvent::RecordingSaved { bytes, .. }) = notifications.recv().await {
                return bytes;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(saved, 800);

    let status = handle.status().await.unwrap();
    assert_eq!(status.state, RecordingState::Idle);
    assert_eq!(status.buffered_fragments, 0);

    handle.shutdown().await;
    assert_eq!(sink.saves.lock().len(), 1);
}

#[tokio::test]
async fn test_shutdown_saves_active_recording() {
    let sink = Arc::new(MemorySink::default());
    let controller = controller(
        StubSource::new(true),
        ScriptedFactory::new(vec![128]),
        sink.clone(),
        settings(None),
    );
    let handle = ControllerHandle::spawn(controller);

    handle.start_recording();
    handle.capture_photo();
    handle.shutdown().await;

    let saves = sink.saves.lock();
    assert_eq!(saves.len(), 2);
    assert!(saves.iter().any(|(name, blob)| name.starts_with("photo_") && blob.mime() == "image/jpeg"));
    assert!(saves.iter().any(|(name, blob)| name.starts_with("recording_") && blob.len() == 128));
}

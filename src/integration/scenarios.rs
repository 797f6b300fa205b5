//! Session lifecycle scenarios against a fake transcoder

use std::sync::Arc;
use std::time::Duration;

use super::fixtures::{
    failing_transcoder, fake_transcoder, process_alive, stubborn_transcoder, upload, wait_for,
    MockProber, MockResolver, TestEnv,
};
use crate::error::StreamError;
use crate::source::SourceDescriptor;
use crate::storage::{SegmentStore, MANIFEST_NAME};

const READY_TIMEOUT: Duration = Duration::from_secs(5);

fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[tokio::test]
async fn test_start_becomes_ready() {
    let env = TestEnv::new(fake_transcoder());
    let controller = env.controller();

    let started = controller.start(upload("holiday.mp4")).await.unwrap();
    assert_eq!(started.display_name, "holiday.mp4");
    assert_eq!(started.duration.formatted(), "02:05");

    let status = wait_for(&controller, READY_TIMEOUT, |s| s.ready).await;
    assert!(status.ready);
    assert!(status.processing);
    assert_eq!(status.offset, 0.0);

    let pid = status.session.pid.unwrap();
    assert!(process_alive(pid));
    assert!(env.config.storage.upload_dir.join("holiday.mp4").exists());

    controller.shutdown().await;
    assert!(!process_alive(pid));
}

#[tokio::test]
async fn test_seek_without_session_touches_nothing() {
    let env = TestEnv::new(fake_transcoder());
    let controller = env.controller();
    std::fs::create_dir_all(env.segment_dir()).unwrap();
    std::fs::write(env.segment_dir().join("chunk-stream0-00001.m4s"), b"x").unwrap();

    let err = controller.seek(10.0).await.unwrap_err();
    assert!(matches!(err, StreamError::NoActiveSession));
    assert_eq!(env.metrics.transcoder_launches(), 0);
    assert!(env.segment_dir().join("chunk-stream0-00001.m4s").exists());
    assert_eq!(controller.status().await.epoch, 0);
}

#[tokio::test]
async fn test_invalid_offset_is_rejected_before_any_work() {
    let env = TestEnv::new(fake_transcoder());
    let controller = env.controller();
    controller.start(upload("a.mp4")).await.unwrap();
    let before = wait_for(&controller, READY_TIMEOUT, |s| s.session.pid.is_some()).await;

    assert!(matches!(
        controller.seek(-5.0).await,
        Err(StreamError::InvalidOffset(_))
    ));
    assert!(matches!(
        controller.seek(f64::NAN).await,
        Err(StreamError::InvalidOffset(_))
    ));

    let after = controller.status().await;
    assert_eq!(after.epoch, before.epoch);
    assert_eq!(after.session.pid, before.session.pid);
    controller.shutdown().await;
}

#[tokio::test]
async fn test_seek_restarts_at_offset() {
    let env = TestEnv::new(fake_transcoder());
    let controller = env.controller();

    controller.start(upload("movie.mkv")).await.unwrap();
    let first = wait_for(&controller, READY_TIMEOUT, |s| s.ready).await;
    let old_pid = first.session.pid.unwrap();

    let offset = controller.seek(30.0).await.unwrap();
    assert_eq!(offset, 30.0);

    // the old transcoder is gone and its output wiped before seek returns
    assert!(!process_alive(old_pid));
    let status = controller.status().await;
    assert!(!status.ready);
    assert!(status.processing);
    assert_eq!(status.offset, 30.0);
    assert!(!env.segment_dir().join(MANIFEST_NAME).exists());

    let status = wait_for(&controller, READY_TIMEOUT, |s| s.ready).await;
    assert!(status.ready);
    assert_ne!(status.session.pid, Some(old_pid));
    assert_eq!(value_after(&env.last_args(), "-ss"), Some("30"));

    // tracks come from the probe at start
    assert_eq!(env.prober.calls(), 1);
    assert_eq!(
        value_after(&env.last_args(), "-metadata:s:a:0"),
        Some("language=eng")
    );
    controller.shutdown().await;
}

#[tokio::test]
async fn test_seek_while_first_transcoder_is_starting() {
    let env = TestEnv::new(fake_transcoder());
    let controller = env.controller();

    controller.start(upload("movie.mkv")).await.unwrap();
    assert_eq!(controller.seek(10.0).await.unwrap(), 10.0);

    let status = wait_for(&controller, READY_TIMEOUT, |s| s.ready).await;
    assert!(status.ready);
    assert_eq!(status.epoch, 2);
    assert_eq!(status.offset, 10.0);
    assert_eq!(env.metrics.transcoder_launches(), 2);
    assert_eq!(value_after(&env.last_args(), "-ss"), Some("10"));

    let pid = status.session.pid.unwrap();
    assert!(process_alive(pid));
    controller.shutdown().await;
    assert!(!process_alive(pid));
}

#[tokio::test]
async fn test_concurrent_seeks_leave_one_transcoder() {
    let env = TestEnv::new(fake_transcoder());
    let controller = env.controller();

    controller.start(upload("movie.mkv")).await.unwrap();
    let first = wait_for(&controller, READY_TIMEOUT, |s| s.session.pid.is_some()).await;
    let first_pid = first.session.pid.unwrap();

    let (a, b) = tokio::join!(controller.seek(10.0), controller.seek(20.0));
    assert_eq!(a.unwrap(), 10.0);
    assert_eq!(b.unwrap(), 20.0);

    let status = wait_for(&controller, READY_TIMEOUT, |s| s.ready).await;
    assert_eq!(status.epoch, 3);
    assert_eq!(env.metrics.transcoder_launches(), 3);
    assert!(!process_alive(first_pid));

    let pid = status.session.pid.unwrap();
    assert!(process_alive(pid));
    let ss = value_after(&env.last_args(), "-ss").unwrap().to_string();
    assert_eq!(ss.parse::<f64>().unwrap(), status.offset);

    controller.shutdown().await;
    assert!(!process_alive(pid));
}

#[tokio::test]
async fn test_superseded_exit_does_not_clear_processing() {
    let env = TestEnv::new(fake_transcoder());
    let controller = env.controller();

    controller.start(upload("first.mp4")).await.unwrap();
    wait_for(&controller, READY_TIMEOUT, |s| s.session.pid.is_some()).await;

    controller.start(upload("second.mp4")).await.unwrap();
    // the first transcoder's exit has been observed by now
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = controller.status().await;
    assert!(status.processing);
    assert_eq!(status.epoch, 2);
    assert!(status.session.last_error.is_none());
    assert_eq!(status.session.source.unwrap().display_name, "second.mp4");
    assert!(!env.config.storage.upload_dir.join("first.mp4").exists());
    controller.shutdown().await;
}

#[tokio::test]
async fn test_failed_transcoder_is_not_retried() {
    let env = TestEnv::new(failing_transcoder());
    let controller = env.controller();

    controller.start(upload("broken.avi")).await.unwrap();
    let status = wait_for(&controller, READY_TIMEOUT, |s| !s.processing).await;

    assert!(!status.processing);
    assert!(!status.ready);
    assert!(status
        .session
        .last_error
        .unwrap()
        .contains("Invalid data found"));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(env.metrics.transcoder_launches(), 1);
}

#[tokio::test]
async fn test_spawn_failure_is_reported_through_status() {
    let env = TestEnv::new("/nonexistent/ffmpeg_xyz".into());
    let controller = env.controller();

    controller.start(upload("a.mp4")).await.unwrap();
    let status = wait_for(&controller, READY_TIMEOUT, |s| !s.processing).await;
    assert!(!status.processing);
    assert!(status.session.last_error.unwrap().contains("spawn"));

    // the session itself survives, so a seek retries the launch
    assert!(controller.seek(5.0).await.is_ok());
}

#[tokio::test]
async fn test_stubborn_transcoder_is_killed() {
    let env = TestEnv::new(stubborn_transcoder());
    let controller = env.controller();

    controller.start(upload("a.mp4")).await.unwrap();
    let status = wait_for(&controller, READY_TIMEOUT, |s| s.session.pid.is_some()).await;
    let pid = status.session.pid.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    controller.seek(12.0).await.unwrap();
    assert!(!process_alive(pid));
    assert_eq!(env.metrics.forced_kills(), 1);

    controller.shutdown().await;
}

#[tokio::test]
async fn test_no_audio_tracks_gets_silent_track() {
    let env = TestEnv::with_prober(fake_transcoder(), MockProber::default());
    let controller = env.controller();

    let started = controller.start(upload("silent.mp4")).await.unwrap();
    assert_eq!(started.duration.formatted(), "00:00");
    wait_for(&controller, READY_TIMEOUT, |s| s.ready).await;

    let args = env.last_args();
    assert_eq!(args.iter().filter(|a| a.starts_with("-c:a")).count(), 1);
    assert!(args.iter().any(|a| a == "1:a:0"));
    controller.shutdown().await;
}

#[tokio::test]
async fn test_remote_source() {
    let env = TestEnv::with_prober(
        fake_transcoder(),
        MockProber::with_tracks(&[Some("eng"), Some("fre")], 3725.0),
    );
    let controller = env.controller();

    let started = controller
        .start(SourceDescriptor::Remote(
            "https://drive.google.com/file/d/abc/view".into(),
        ))
        .await
        .unwrap();
    assert_eq!(started.display_name, "Remote Clip");
    assert_eq!(started.duration.formatted(), "1:02:05");
    wait_for(&controller, READY_TIMEOUT, |s| s.ready).await;

    let args = env.last_args();
    assert_eq!(value_after(&args, "-user_agent"), Some("Mozilla/5.0"));
    assert_eq!(value_after(&args, "-i"), Some("https://cdn.example/stream.mp4"));
    assert_eq!(value_after(&args, "-metadata:s:a:1"), Some("language=fre"));
    controller.shutdown().await;
}

#[tokio::test]
async fn test_disallowed_source_leaves_session_running() {
    let env = TestEnv::new(fake_transcoder());
    let controller = env.controller();

    controller.start(upload("keep.mp4")).await.unwrap();
    let before = wait_for(&controller, READY_TIMEOUT, |s| s.ready).await;
    let pid = before.session.pid.unwrap();

    let store = SegmentStore::new(env.segment_dir());
    let mut files_before = store.list().await.unwrap();
    files_before.sort();

    let err = controller
        .start(SourceDescriptor::Remote("https://www.youtube.com/watch?v=x".into()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ResolutionFailed");
    assert_eq!(env.resolver.calls(), 0);

    let after = controller.status().await;
    assert!(after.ready);
    assert_eq!(after.epoch, before.epoch);
    assert!(process_alive(pid));

    let mut files_after = store.list().await.unwrap();
    files_after.sort();
    assert_eq!(files_after, files_before);
    controller.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_source_is_resolution_failure() {
    let mut env = TestEnv::new(fake_transcoder());
    env.resolver = Arc::new(MockResolver {
        fail: true,
        ..MockResolver::default()
    });
    let controller = env.controller();

    let err = controller
        .start(SourceDescriptor::Remote(
            "https://drive.google.com/file/d/gone/view".into(),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::ResolutionFailed(_)));
    assert_eq!(env.resolver.calls(), 1);
    assert_eq!(controller.status().await.epoch, 0);
}

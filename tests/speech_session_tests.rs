// Integration tests for the speech session controller
//
// A mock engine stands in for the recognizer; the tests check the state
// machine and that every error path ends in Idle.

mod common;

use common::MockEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use voxlink::error::VoiceError;
use voxlink::speech::{EngineEvent, RecognitionState, SpeechEvent, SpeechHandle, Transcript};

fn spawn(engine: Arc<MockEngine>) -> (SpeechHandle, mpsc::UnboundedReceiver<SpeechEvent>) {
    let (handle, events, _task) = SpeechHandle::spawn(engine);
    (handle, events)
}

async fn wait_state(handle: &SpeechHandle, state: RecognitionState) {
    let mut rx = handle.subscribe();
    tokio::time::timeout(Duration::from_secs(60), rx.wait_for(|s| *s == state))
        .await
        .expect("state not reached")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_start_reaches_listening() {
    let engine = Arc::new(MockEngine::new());
    let (speech, mut events) = spawn(engine.clone());

    speech.start();
    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStarted));
    assert_eq!(speech.state(), RecognitionState::Listening);
    assert_eq!(engine.start_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_double_start_creates_one_session() {
    let engine = Arc::new(MockEngine::with_start_delay(Duration::from_millis(200)));
    let (speech, mut events) = spawn(engine.clone());

    speech.start();
    speech.start();
    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStarted));

    speech.start();
    common::settle().await;
    assert_eq!(engine.start_count(), 1);
    assert_eq!(speech.state(), RecognitionState::Listening);
}

#[tokio::test(start_paused = true)]
async fn test_start_failure_returns_to_idle() {
    let engine = Arc::new(MockEngine::with_start_delay(Duration::from_millis(50)));
    engine.fail_next_start(VoiceError::RecognitionStartFailure("no microphone".to_string()));
    let (speech, mut events) = spawn(engine.clone());

    speech.start();
    assert_eq!(
        events.recv().await,
        Some(SpeechEvent::Error(VoiceError::RecognitionStartFailure(
            "no microphone".to_string()
        )))
    );
    assert_eq!(speech.state(), RecognitionState::Idle);

    // Recoverable by a fresh start
    speech.start();
    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStarted));
}

#[tokio::test(start_paused = true)]
async fn test_stop_when_idle_is_noop() {
    let engine = Arc::new(MockEngine::new());
    let (speech, mut events) = spawn(engine.clone());

    speech.stop();
    speech.stop();
    common::settle().await;

    assert_eq!(engine.stop_count(), 0);
    assert!(events.try_recv().is_err());
    assert_eq!(speech.state(), RecognitionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_stop_from_listening() {
    let engine = Arc::new(MockEngine::new());
    let (speech, mut events) = spawn(engine.clone());

    speech.start();
    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStarted));

    speech.stop();
    speech.stop();
    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStopped));
    assert_eq!(speech.state(), RecognitionState::Idle);
    assert_eq!(engine.stop_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_starting_abandons_start() {
    let engine = Arc::new(MockEngine::with_start_delay(Duration::from_secs(1)));
    let (speech, mut events) = spawn(engine.clone());

    speech.start();
    wait_state(&speech, RecognitionState::Starting).await;
    speech.stop();

    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStopped));
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(events.try_recv().is_err(), "abandoned start must not confirm");
    assert_eq!(speech.state(), RecognitionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_results_are_forwarded_while_listening() {
    let engine = Arc::new(MockEngine::new());
    let (speech, mut events) = spawn(engine.clone());

    speech.start();
    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStarted));

    let sink = engine.events().unwrap();
    sink.emit(EngineEvent::Partial("turn on".to_string()));
    sink.emit(EngineEvent::Partial("turn on the".to_string()));
    sink.emit(EngineEvent::Final(Transcript::Recognized("turn on the lights".to_string())));

    assert_eq!(events.recv().await, Some(SpeechEvent::Partial("turn on".to_string())));
    assert_eq!(events.recv().await, Some(SpeechEvent::Partial("turn on the".to_string())));
    assert_eq!(
        events.recv().await,
        Some(SpeechEvent::Final(Transcript::Recognized("turn on the lights".to_string())))
    );
    assert_eq!(speech.state(), RecognitionState::Listening);
}

#[tokio::test(start_paused = true)]
async fn test_device_lost_converges_to_idle() {
    let engine = Arc::new(MockEngine::new());
    let (speech, mut events) = spawn(engine.clone());

    speech.start();
    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStarted));

    let lost = VoiceError::DeviceLost("usb headset unplugged".to_string());
    engine.events().unwrap().emit(EngineEvent::Cancelled(lost.clone()));

    assert_eq!(events.recv().await, Some(SpeechEvent::Error(lost)));
    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStopped));
    assert_eq!(speech.state(), RecognitionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_engine_stop_is_reported_as_stopped() {
    let engine = Arc::new(MockEngine::new());
    let (speech, mut events) = spawn(engine.clone());

    speech.start();
    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStarted));

    engine
        .events()
        .unwrap()
        .emit(EngineEvent::Cancelled(VoiceError::SessionStoppedByEngine));

    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStopped));
    assert_eq!(speech.state(), RecognitionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_events_from_old_session_are_ignored() {
    let engine = Arc::new(MockEngine::new());
    let (speech, mut events) = spawn(engine.clone());

    speech.start();
    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStarted));
    let old = engine.events().unwrap();

    speech.stop();
    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStopped));

    speech.start();
    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStarted));

    old.emit(EngineEvent::Final(Transcript::Recognized("stale".to_string())));
    old.emit(EngineEvent::Cancelled(VoiceError::SessionStoppedByEngine));
    common::settle().await;

    assert!(events.try_recv().is_err());
    assert_eq!(speech.state(), RecognitionState::Listening);
}

#[tokio::test(start_paused = true)]
async fn test_stop_failure_still_reaches_idle() {
    let engine = Arc::new(MockEngine::new());
    let (speech, mut events) = spawn(engine.clone());

    speech.start();
    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStarted));

    let busy = VoiceError::RecognitionRuntime("microphone busy".to_string());
    engine.fail_next_stop(busy.clone());
    speech.stop();

    assert_eq!(events.recv().await, Some(SpeechEvent::Error(busy)));
    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStopped));
    assert_eq!(speech.state(), RecognitionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_starting_converges_to_idle() {
    let engine = Arc::new(MockEngine::with_start_delay(Duration::from_secs(1)));
    let (speech, mut events) = spawn(engine.clone());

    speech.start();
    wait_state(&speech, RecognitionState::Starting).await;

    let lost = VoiceError::DeviceLost("usb headset unplugged".to_string());
    engine.events().unwrap().emit(EngineEvent::Cancelled(lost.clone()));

    assert_eq!(events.recv().await, Some(SpeechEvent::Error(lost)));
    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStopped));
    assert_eq!(speech.state(), RecognitionState::Idle);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(events.try_recv().is_err(), "cancelled start must not confirm");
    assert_eq!(speech.state(), RecognitionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_stopping_waits_for_stop() {
    let engine = Arc::new(MockEngine::with_stop_delay(Duration::from_secs(1)));
    let (speech, mut events) = spawn(engine.clone());

    speech.start();
    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStarted));
    let first = engine.events().unwrap();

    speech.stop();
    wait_state(&speech, RecognitionState::Stopping).await;
    first.emit(EngineEvent::Cancelled(VoiceError::SessionStoppedByEngine));
    common::settle().await;

    // Still owned by the stop in progress; a restart has to wait for it
    assert_eq!(speech.state(), RecognitionState::Stopping);
    assert!(events.try_recv().is_err());
    speech.start();
    common::settle().await;
    assert_eq!(engine.start_count(), 1);

    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStopped));
    assert_eq!(speech.state(), RecognitionState::Idle);

    speech.start();
    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStarted));
    let second = engine.events().unwrap();
    assert_eq!(second.session(), 2);
    assert_eq!(engine.stopped_sessions(), vec![1]);

    second.emit(EngineEvent::Final(Transcript::Recognized("lights off".to_string())));
    assert_eq!(
        events.recv().await,
        Some(SpeechEvent::Final(Transcript::Recognized("lights off".to_string())))
    );
}

#[tokio::test(start_paused = true)]
async fn test_engine_panic_is_reported_as_runtime_error() {
    let engine = Arc::new(MockEngine::new());
    engine.panic_on_next_start();
    let (speech, mut events) = spawn(engine.clone());

    speech.start();
    assert_eq!(
        events.recv().await,
        Some(SpeechEvent::Error(VoiceError::RecognitionRuntime(
            "engine panicked: recognizer crashed".to_string()
        )))
    );
    assert_eq!(speech.state(), RecognitionState::Idle);

    speech.start();
    assert_eq!(events.recv().await, Some(SpeechEvent::ListeningStarted));
}

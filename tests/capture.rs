//! Utterance capture integration tests
//!
//! Runs capture against a scripted microphone and transcriber

use buddy_voice::Error;
use buddy_voice::conversation::{TranscriptFragment, UtteranceCapture};
use tokio_util::sync::CancellationToken;

mod common;
use common::{FakeMic, Script, ScriptedTranscriber};

#[tokio::test]
async fn test_fragments_join_into_one_utterance() {
    let mic = FakeMic::new();
    let mut device = mic.device();
    let transcriber = ScriptedTranscriber::new(vec![Script::fragments(vec![
        TranscriptFragment::partial("what is"),
        TranscriptFragment::partial("the weather"),
        TranscriptFragment::last("today?"),
    ])]);

    let utterance = UtteranceCapture::new(&transcriber)
        .capture(&mut device, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(utterance.as_str(), "what is the weather today?");
    assert_eq!(transcriber.log.connects(), 1);
    assert_eq!(transcriber.log.closes(), 1);
    assert_eq!(transcriber.log.frames_sent(), 3);
    assert_eq!(mic.stats.starts(), 1);
    assert_eq!(mic.stats.stops(), 1);
}

#[tokio::test]
async fn test_empty_finality_keeps_listening() {
    let mic = FakeMic::new();
    let mut device = mic.device();
    let transcriber = ScriptedTranscriber::new(vec![Script::fragments(vec![
        TranscriptFragment::last(""),
        TranscriptFragment::last("  "),
        TranscriptFragment::partial("turn on"),
        TranscriptFragment::last("the lights"),
    ])]);

    let utterance = UtteranceCapture::new(&transcriber)
        .capture(&mut device, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(utterance.as_str(), "turn on the lights");
}

#[tokio::test]
async fn test_capture_never_returns_blank() {
    let cancel = CancellationToken::new();
    let mic = FakeMic::new().cancelling_at(20, &cancel);
    let mut device = mic.device();
    let transcriber = ScriptedTranscriber::new(vec![Script::fragments(vec![
        TranscriptFragment::last(""),
        TranscriptFragment::last(""),
    ])]);

    // Blank finality twice, then the stream goes silent until cancelled
    let captured = UtteranceCapture::new(&transcriber)
        .capture(&mut device, &cancel)
        .await
        .unwrap();

    assert!(captured.is_none());
    assert_eq!(transcriber.log.closes(), 1);
    assert_eq!(mic.stats.reads(), 20);
}

#[tokio::test]
async fn test_closed_stream_is_stream_error() {
    let mic = FakeMic::new();
    let mut device = mic.device();
    let transcriber = ScriptedTranscriber::new(vec![Script {
        fragments: vec![TranscriptFragment::partial("half a")],
        close_after: true,
    }]);

    let result = UtteranceCapture::new(&transcriber)
        .capture(&mut device, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(Error::Stream(_))));
    assert_eq!(transcriber.log.closes(), 1);
    assert_eq!(mic.stats.stops(), mic.stats.starts());
}

#[tokio::test]
async fn test_connect_failure_leaves_device_untouched() {
    let mic = FakeMic::new();
    let mut device = mic.device();
    let transcriber = ScriptedTranscriber::failing();

    let result = UtteranceCapture::new(&transcriber)
        .capture(&mut device, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(Error::Stream(_))));
    assert_eq!(mic.stats.starts(), 0);
}

#[tokio::test]
async fn test_device_failure_closes_connection() {
    let mic = FakeMic::new().failing_at(2);
    let mut device = mic.device();
    let transcriber = ScriptedTranscriber::new(vec![]);

    let result = UtteranceCapture::new(&transcriber)
        .capture(&mut device, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(Error::Device(_))));
    assert_eq!(transcriber.log.closes(), 1);
    assert_eq!(mic.stats.stops(), 1);
}

#[tokio::test]
async fn test_cancel_unblocks_capture() {
    let mic = FakeMic::new();
    let mut device = mic.device();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let transcriber = ScriptedTranscriber::new(vec![Script::says("too late")]);

    let captured = UtteranceCapture::new(&transcriber)
        .capture(&mut device, &cancel)
        .await
        .unwrap();

    assert!(captured.is_none());
    assert_eq!(transcriber.log.frames_sent(), 0);
    assert_eq!(transcriber.log.closes(), 1);
}

//! Integration tests for the speech pipeline
//!
//! These run the real mixer thread, dispatch pool and orchestrator against a
//! capture line and a scripted synthesizer.

use parley_core::domain::audio::{SourceClass, SourceId, CHUNK_BYTES, SAMPLES_PER_CHUNK};
use parley_core::domain::config::PlaybackSettings;
use parley_core::domain::mixer::MixBus;
use parley_core::domain::stream::PcmStream;
use parley_core::domain::synthesis::PlaybackRequest;
use parley_core::domain::voice::VoiceProfile;
use parley_infra::playback::{Dispatch, NarrationEvent, Narrator, Speaker};
use parley_tests::{capture_mixer, chunks_for, pipeline, wait_until, AllMale, CountingSynthesizer, RecordingNotifier};
use std::sync::Arc;
use std::time::Duration;

const SETTLE: Duration = Duration::from_secs(5);

fn request(text: &str, class: SourceClass, source: SourceId) -> PlaybackRequest {
    PlaybackRequest::new(text, VoiceProfile::new("en-US-AriaNeural"), class, source)
}

fn count(samples: &[i16], value: i16) -> usize {
    samples.iter().filter(|&&s| s == value).count()
}

// ============================================================================
// COOLDOWN
// ============================================================================

#[tokio::test]
async fn test_repeated_dialogue_line_is_synthesized_once() {
    let synth = Arc::new(CountingSynthesizer::new(500, 256));
    let (orch, _line) = pipeline(
        Arc::clone(&synth),
        Arc::new(RecordingNotifier::default()),
        PlaybackSettings::default(),
    );

    let hello = || request("Hello", SourceClass::Dialogue, SourceId::Entity(5));
    assert_eq!(orch.play(hello()), Dispatch::Queued);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(orch.play(hello()), Dispatch::Suppressed);

    orch.shutdown().await;
    assert_eq!(synth.calls(), 1);
}

#[tokio::test]
async fn test_other_speaker_same_line_is_not_suppressed() {
    let synth = Arc::new(CountingSynthesizer::new(500, 256));
    let (orch, _line) = pipeline(
        Arc::clone(&synth),
        Arc::new(RecordingNotifier::default()),
        PlaybackSettings::default(),
    );

    assert_eq!(
        orch.play(request("Hello", SourceClass::Floating, SourceId::Entity(5))),
        Dispatch::Queued
    );
    assert_eq!(
        orch.play(request("Hello", SourceClass::Floating, SourceId::Entity(6))),
        Dispatch::Queued
    );
    assert_eq!(
        orch.play(request("<col=00ff00>Hello</col>", SourceClass::Floating, SourceId::Entity(5))),
        Dispatch::Suppressed
    );

    orch.shutdown().await;
    assert_eq!(synth.calls(), 2);
}

// ============================================================================
// MIXING
// ============================================================================

#[test]
fn test_floating_stream_exhausts_after_ceil_chunks() {
    let mut bus = MixBus::new();
    let mut out = [0u8; CHUNK_BYTES];
    assert!(bus.add_floating(Box::new(PcmStream::from_samples(&[700; 2000]))));

    let iterations = chunks_for(2000);
    assert_eq!(iterations, 4);
    for _ in 0..iterations - 1 {
        let report = bus.mix_chunk(&mut out);
        assert_eq!(report.active, 1);
        assert_eq!(bus.floating_count(), 1);
    }

    let report = bus.mix_chunk(&mut out);
    assert_eq!(report.released, 1);
    assert_eq!(bus.floating_count(), 0);
    assert!(bus.is_idle());

    // The tail of the last chunk is zero padded
    let tail = 2000 - 3 * SAMPLES_PER_CHUNK;
    assert_eq!(i16::from_le_bytes([out[0], out[1]]), 700);
    assert_eq!(i16::from_le_bytes([out[tail * 2], out[tail * 2 + 1]]), 0);
}

#[tokio::test]
async fn test_floating_stream_plays_through_mixer_thread() {
    let (mixer, line) = capture_mixer();
    assert!(mixer.add_floating_stream(Box::new(PcmStream::from_samples(&[700; 2000]))));

    assert!(wait_until(SETTLE, || mixer.is_idle()).await);
    mixer.stop();

    let samples = line.samples();
    assert_eq!(count(&samples, 700), 2000);

    // Contiguous run starting on a chunk boundary
    let start = samples.iter().position(|&s| s == 700).unwrap();
    assert_eq!(start % SAMPLES_PER_CHUNK, 0);
    assert!(samples[start..start + 2000].iter().all(|&s| s == 700));
}

#[tokio::test]
async fn test_dialogue_and_floating_are_averaged() {
    let (mixer, line) = capture_mixer();
    let long = SAMPLES_PER_CHUNK * 20;
    // The loop may mix one of them alone for a chunk at either end
    assert!(mixer.set_dialogue_stream(Box::new(PcmStream::from_samples(&vec![1000; long]))));
    assert!(mixer.add_floating_stream(Box::new(PcmStream::from_samples(&vec![3000; long]))));

    assert!(wait_until(SETTLE, || mixer.is_idle()).await);
    mixer.stop();

    let samples = line.samples();
    assert!(count(&samples, 2000) >= SAMPLES_PER_CHUNK * 18);
    assert!(samples.iter().all(|&s| s == 0 || s == 1000 || s == 2000 || s == 3000));
}

#[tokio::test]
async fn test_new_dialogue_preempts_current_one() {
    let (mixer, line) = capture_mixer();
    let first = SAMPLES_PER_CHUNK * 200;
    let second = SAMPLES_PER_CHUNK * 3;

    assert!(mixer.set_dialogue_stream(Box::new(PcmStream::from_samples(&vec![100; first]))));
    assert!(wait_until(SETTLE, || count(&line.samples(), 100) > 0).await);
    assert!(mixer.set_dialogue_stream(Box::new(PcmStream::from_samples(&vec![200; second]))));

    assert!(wait_until(SETTLE, || mixer.is_idle()).await);
    mixer.stop();

    let samples = line.samples();
    assert_eq!(count(&samples, 200), second);
    assert!(count(&samples, 100) < first);

    // Nothing of the first line plays after the second started
    let switch = samples.iter().position(|&s| s == 200).unwrap();
    assert_eq!(count(&samples[switch..], 100), 0);
}

#[tokio::test]
async fn test_stop_releases_streams_and_refuses_new_ones() {
    let (mixer, _line) = capture_mixer();
    assert!(mixer.set_dialogue_stream(Box::new(PcmStream::from_samples(&vec![1; SAMPLES_PER_CHUNK * 500]))));
    assert!(mixer.add_floating_stream(Box::new(PcmStream::from_samples(&vec![1; SAMPLES_PER_CHUNK * 500]))));

    mixer.stop();
    mixer.stop();

    assert!(!mixer.is_running());
    assert!(mixer.is_idle());
    assert!(!mixer.add_floating_stream(Box::new(PcmStream::from_samples(&[1; 16]))));
}

// ============================================================================
// DIALOGUE ORDER
// ============================================================================

#[tokio::test]
async fn test_newer_dialogue_wins_over_slower_older_one() {
    let synth = Arc::new(
        CountingSynthesizer::new(1, SAMPLES_PER_CHUNK * 20)
            .line("Old line", 111, Duration::from_millis(300))
            .line("New line", 222, Duration::ZERO),
    );
    let (orch, line) = pipeline(
        Arc::clone(&synth),
        Arc::new(RecordingNotifier::default()),
        PlaybackSettings::default(),
    );

    assert_eq!(
        orch.play(request("Old line", SourceClass::Dialogue, SourceId::Entity(9))),
        Dispatch::Queued
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(
        orch.play(request("New line", SourceClass::Dialogue, SourceId::Entity(9))),
        Dispatch::Queued
    );

    // Both syntheses finish, the older one last
    orch.quiesce().await;
    assert_eq!(synth.calls(), 2);
    assert!(wait_until(SETTLE, || orch.mixer().is_idle()).await);
    orch.shutdown().await;

    let samples = line.samples();
    assert_eq!(count(&samples, 222), SAMPLES_PER_CHUNK * 20);
    assert_eq!(count(&samples, 111), 0);
}

#[tokio::test]
async fn test_dialogue_stopped_before_synthesis_finishes_stays_silent() {
    let synth = Arc::new(
        CountingSynthesizer::new(1, SAMPLES_PER_CHUNK * 20).line("Farewell", 333, Duration::from_millis(200)),
    );
    let (orch, line) = pipeline(
        Arc::clone(&synth),
        Arc::new(RecordingNotifier::default()),
        PlaybackSettings::default(),
    );

    orch.play(request("Farewell", SourceClass::Dialogue, SourceId::Entity(4)));
    tokio::time::sleep(Duration::from_millis(20)).await;
    orch.stop_dialogue();

    orch.quiesce().await;
    assert_eq!(synth.calls(), 1);
    assert!(!orch.mixer().has_dialogue());

    tokio::time::sleep(Duration::from_millis(100)).await;
    orch.shutdown().await;
    assert_eq!(count(&line.samples(), 333), 0);
}

#[tokio::test]
async fn test_closing_dialogue_box_cancels_pending_line() {
    let synth = Arc::new(
        CountingSynthesizer::new(1, SAMPLES_PER_CHUNK * 20).line("Come back later", 444, Duration::from_millis(200)),
    );
    let (orch, line) = pipeline(
        Arc::clone(&synth),
        Arc::new(RecordingNotifier::default()),
        PlaybackSettings::default(),
    );
    let mut narrator = Narrator::new(Arc::clone(&orch), Arc::new(AllMale));

    narrator.handle(NarrationEvent::DialogueOpened {
        speaker: Speaker::Npc {
            id: 12,
            name: "Shopkeeper".to_string(),
        },
        text: "Come back later".to_string(),
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    narrator.handle(NarrationEvent::DialogueClosed);

    orch.quiesce().await;
    assert!(!orch.mixer().has_dialogue());
    orch.shutdown().await;
    assert_eq!(count(&line.samples(), 444), 0);
}

// ============================================================================
// FAILURES
// ============================================================================

#[tokio::test]
async fn test_failed_request_does_not_affect_others() {
    let synth = Arc::new(CountingSynthesizer::new(1234, SAMPLES_PER_CHUNK * 2).failing_on("Broken line"));
    let notifier = Arc::new(RecordingNotifier::default());
    let (orch, line) = pipeline(Arc::clone(&synth), Arc::clone(&notifier), PlaybackSettings::default());

    assert_eq!(
        orch.play(request("Broken line", SourceClass::Floating, SourceId::Entity(1))),
        Dispatch::Queued
    );
    assert_eq!(
        orch.play(request("Working line", SourceClass::Floating, SourceId::Entity(2))),
        Dispatch::Queued
    );

    orch.quiesce().await;
    assert!(wait_until(SETTLE, || orch.mixer().is_idle()).await);
    orch.shutdown().await;

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("TTS failed: "));
    assert_eq!(count(&line.samples(), 1234), SAMPLES_PER_CHUNK * 2);
}

#[tokio::test]
async fn test_requests_after_shutdown_are_rejected() {
    let synth = Arc::new(CountingSynthesizer::new(1, 16));
    let (orch, _line) = pipeline(
        Arc::clone(&synth),
        Arc::new(RecordingNotifier::default()),
        PlaybackSettings::default(),
    );

    orch.shutdown().await;
    assert_eq!(
        orch.play(request("Too late", SourceClass::Dialogue, SourceId::None)),
        Dispatch::Rejected
    );
    assert_eq!(synth.calls(), 0);
}

// ============================================================================
// NARRATION
// ============================================================================

#[tokio::test]
async fn test_narrated_session() {
    let synth = Arc::new(CountingSynthesizer::new(42, SAMPLES_PER_CHUNK));
    let (orch, _line) = pipeline(
        Arc::clone(&synth),
        Arc::new(RecordingNotifier::default()),
        PlaybackSettings::default(),
    );
    let mut narrator = Narrator::new(Arc::clone(&orch), Arc::new(AllMale));

    assert_eq!(narrator.handle(NarrationEvent::LoggedIn), Some(Dispatch::Queued));
    assert_eq!(narrator.handle(NarrationEvent::LoggedIn), None);

    let hans = Speaker::Npc {
        id: 7,
        name: "Hans".to_string(),
    };
    assert_eq!(
        narrator.handle(NarrationEvent::DialogueOpened {
            speaker: hans.clone(),
            text: "Hans: Hello adventurer".to_string(),
        }),
        Some(Dispatch::Queued)
    );
    assert!(narrator.is_dialogue_active());

    // The NPC in dialogue does not also speak overhead
    assert_eq!(
        narrator.handle(NarrationEvent::OverheadText {
            speaker: hans,
            text: "Hello adventurer".to_string(),
            distance: 1,
        }),
        None
    );

    assert_eq!(
        narrator.handle(NarrationEvent::OverheadText {
            speaker: Speaker::Player { id: 3 },
            text: "Selling lobsters".to_string(),
            distance: 8,
        }),
        Some(Dispatch::Queued)
    );

    assert_eq!(narrator.handle(NarrationEvent::DialogueClosed), None);
    assert!(!narrator.is_dialogue_active());

    orch.quiesce().await;
    orch.shutdown().await;

    let requests = synth.requests();
    assert_eq!(requests.len(), 3);

    let find = |text: &str| requests.iter().find(|r| r.text == text).cloned().unwrap();
    assert_eq!(find("Welcome to the game!").voice, "en-US-AriaNeural");

    let npc = find("Hello adventurer");
    assert_eq!(npc.voice, "en-US-GuyNeural");
    assert_eq!(npc.volume, "default");

    let distant = find("Selling lobsters");
    assert_eq!(distant.voice, "en-US-AriaNeural");
    assert_eq!(distant.volume, "-89%");
}

#[tokio::test]
async fn test_narration_events_from_json() {
    let synth = Arc::new(CountingSynthesizer::new(42, 64));
    let (orch, _line) = pipeline(
        Arc::clone(&synth),
        Arc::new(RecordingNotifier::default()),
        PlaybackSettings::default(),
    );
    let mut narrator = Narrator::new(Arc::clone(&orch), Arc::new(AllMale));

    let events = [
        r#"{"event":"examine","text":"A sturdy <col=ff9040>rune</col> axe.","player_id":1}"#,
        r#"{"event":"overhead_text","speaker":{"kind":"local_player","id":1},"text":"Hi"}"#,
    ];
    for line in events {
        let event: NarrationEvent = serde_json::from_str(line).unwrap();
        assert_eq!(narrator.handle(event), Some(Dispatch::Queued));
    }

    orch.shutdown().await;
    let mut texts: Vec<String> = synth.requests().into_iter().map(|r| r.text).collect();
    texts.sort();
    assert_eq!(texts, vec!["A sturdy rune axe.".to_string(), "Hi".to_string()]);
}

//! Speech synchronizer behaviour against scripted synthesis and playback

mod test_helpers;

use animatronic_motion::command::{Axis, MotionCommand};
use animatronic_motion::command_queue::CommandQueue;
use animatronic_motion::config::{EyeConfig, SpeechConfig};
use animatronic_motion::constants::{PRIORITY_MOTION, PRIORITY_SPEECH};
use animatronic_motion::speech::synth::SpeechEvent;
use animatronic_motion::speech::{SpeechState, SpeechSynchronizer};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use test_helpers::{drain, pcm_chunk, wav_header, RecordingPlayer, ScriptedSynth};

fn quick_config() -> SpeechConfig {
    SpeechConfig {
        settle_ms: 0,
        ..SpeechConfig::default()
    }
}

fn synchronizer(synth: ScriptedSynth, player: RecordingPlayer, queue: &Arc<CommandQueue>) -> SpeechSynchronizer {
    SpeechSynchronizer::new(
        &quick_config(),
        &EyeConfig::default(),
        Arc::clone(queue),
        Arc::new(SpeechState::new()),
        Box::new(synth),
        Box::new(player),
    )
}

fn idle_pose() -> Vec<(u8, Axis, i32)> {
    vec![
        (PRIORITY_SPEECH, Axis::Jaw, 30),
        (PRIORITY_MOTION, Axis::Eye, 80),
        (PRIORITY_MOTION, Axis::Z, 130),
    ]
}

fn summary(commands: &[MotionCommand]) -> Vec<(u8, Axis, i32)> {
    commands.iter().map(|c| (c.priority, c.axis, c.angle)).collect()
}

#[test]
fn test_speak_discards_earlier_commands() {
    let queue = Arc::new(CommandQueue::new());
    let mut synth = ScriptedSynth::new(vec![SpeechEvent::Audio(pcm_chunk(2000, 32))]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    synth.observed_queue = Some((Arc::clone(&queue), Arc::clone(&seen)));
    let sync = synchronizer(synth, RecordingPlayer::default(), &queue);

    let stale = (0..5).map(|i| queue.push(PRIORITY_MOTION, Axis::Neck, 60 + i)).max().unwrap();
    sync.speak("Good morning.").unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].iter().all(|c| c.sequence > stale));
    assert!(drain(&queue).iter().all(|c| c.sequence > stale));
}

#[test]
fn test_utterance_drives_jaw_and_ends_in_idle_pose() {
    let queue = Arc::new(CommandQueue::new());
    let synth = ScriptedSynth::new(vec![
        SpeechEvent::Audio(pcm_chunk(8000, 32)),
        SpeechEvent::WordBoundary(",".to_string()),
        SpeechEvent::Audio(pcm_chunk(50, 32)),
        SpeechEvent::WordBoundary("hello".to_string()),
    ]);
    let player = RecordingPlayer::default();
    let sync = synchronizer(synth, player.clone(), &queue);

    sync.speak("Hello, you.").unwrap();

    let served = summary(&drain(&queue));
    let mut expected = vec![
        (PRIORITY_SPEECH, Axis::Jaw, 90),
        (PRIORITY_SPEECH, Axis::Jaw, 30),
        (PRIORITY_SPEECH, Axis::Jaw, 30),
    ];
    expected.extend(idle_pose());
    // Service order puts every speech-priority command first
    expected.sort_by_key(|&(priority, _, _)| priority);
    assert_eq!(served, expected);
    assert_eq!(player.bytes_written(), 128);
    assert!(!sync.state().is_speaking());
    assert!(!sync.state().audio_started());
}

#[test]
fn test_failed_player_still_restores_idle_pose() {
    let queue = Arc::new(CommandQueue::new());
    let player = RecordingPlayer {
        fail_start: true,
        ..RecordingPlayer::default()
    };
    let sync = synchronizer(ScriptedSynth::new(Vec::new()), player, &queue);

    assert!(sync.speak("Anyone there?").is_err());
    assert_eq!(summary(&drain(&queue)), idle_pose());
    assert!(!sync.state().is_speaking());
}

#[test]
fn test_dead_player_mid_utterance_restores_idle_pose() {
    let queue = Arc::new(CommandQueue::new());
    let synth = ScriptedSynth::new(vec![SpeechEvent::Audio(pcm_chunk(8000, 32)); 3]);
    let player = RecordingPlayer {
        fail_write: true,
        ..RecordingPlayer::default()
    };
    let sync = synchronizer(synth, player.clone(), &queue);

    sync.speak("Can you hear me?").unwrap();
    assert_eq!(player.bytes_written(), 0);
    assert_eq!(summary(&drain(&queue)), idle_pose());
    assert!(!sync.state().is_speaking());
}

#[test]
fn test_failed_synthesis_with_hung_player_restores_idle_pose() {
    let queue = Arc::new(CommandQueue::new());
    let mut synth = ScriptedSynth::new(vec![SpeechEvent::Audio(pcm_chunk(8000, 32))]);
    synth.fail = true;
    let player = RecordingPlayer {
        fail_finish: true,
        ..RecordingPlayer::default()
    };
    let sync = synchronizer(synth, player.clone(), &queue);

    let result = sync.speak("Hello?");
    assert!(matches!(result, Err(animatronic_motion::Error::Synthesis(_))));
    assert!(player.was_stopped());
    assert_eq!(summary(&drain(&queue)), idle_pose());
    assert!(!sync.state().is_speaking());
}

#[test]
fn test_sample_split_across_chunks_keeps_jaw_quiet() {
    let queue = Arc::new(CommandQueue::new());
    // Small samples whose bytes would read as loud ones if realigned by one
    let quiet = pcm_chunk(16, 32);
    let synth = ScriptedSynth::new(vec![
        SpeechEvent::Audio(quiet[..1].to_vec()),
        SpeechEvent::Audio(quiet[1..].to_vec()),
    ]);
    let player = RecordingPlayer::default();
    let sync = synchronizer(synth, player.clone(), &queue);

    sync.speak("Psst.").unwrap();
    assert_eq!(player.bytes_written(), 64);
    let jaw: Vec<_> = drain(&queue).into_iter().filter(|c| c.axis == Axis::Jaw).map(|c| c.angle).collect();
    assert_eq!(jaw, vec![30, 30]);
}

#[test]
fn test_wav_header_reaches_player_but_not_jaw() {
    let queue = Arc::new(CommandQueue::new());
    let synth = ScriptedSynth::new(vec![
        SpeechEvent::Audio(wav_header(64)),
        SpeechEvent::Audio(pcm_chunk(50, 32)),
    ]);
    let player = RecordingPlayer::default();
    let sync = synchronizer(synth, player.clone(), &queue);

    sync.speak("Hush.").unwrap();
    assert_eq!(player.bytes_written(), 44 + 64);
    let mut expected = vec![(PRIORITY_SPEECH, Axis::Jaw, 30)];
    expected.extend(idle_pose());
    expected.sort_by_key(|&(priority, _, _)| priority);
    assert_eq!(summary(&drain(&queue)), expected);
}

#[test]
fn test_emoji_only_text_is_silent() {
    let queue = Arc::new(CommandQueue::new());
    let synth = ScriptedSynth::new(vec![SpeechEvent::Audio(pcm_chunk(8000, 32))]);
    let spoken = Arc::clone(&synth.spoken);
    let sync = synchronizer(synth, RecordingPlayer::default(), &queue);

    sync.speak(" \u{1F600}\u{1F44D} ").unwrap();
    assert!(spoken.lock().unwrap().is_empty());
    assert!(queue.is_empty());
}

#[test]
fn test_stop_speech_interrupts_playback_and_stream() {
    let queue = Arc::new(CommandQueue::new());
    let mut synth = ScriptedSynth::new(std::iter::repeat(SpeechEvent::Audio(pcm_chunk(3000, 32))).take(200).collect());
    synth.chunk_delay = Duration::from_millis(10);
    let spoken = Arc::clone(&synth.spoken);
    let player = RecordingPlayer::default();
    let sync = Arc::new(synchronizer(synth, player.clone(), &queue));

    let speaker = Arc::clone(&sync);
    let started = Instant::now();
    let handle = thread::spawn(move || speaker.stream_text(["First sentence. ", "Second sentence. ", "Third."]));

    thread::sleep(Duration::from_millis(100));
    sync.stop_speech();
    let consumed = handle.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(player.was_stopped());
    assert_eq!(spoken.lock().unwrap().as_slice(), ["First sentence."]);
    assert!(!consumed.contains("Third."));
    assert!(!sync.state().is_speaking());

    let served = summary(&drain(&queue));
    let motion: Vec<_> = served.iter().filter(|c| c.0 == PRIORITY_MOTION).copied().collect();
    assert_eq!(motion, idle_pose()[1..].to_vec());
    let last_speech = served.iter().rev().find(|c| c.0 == PRIORITY_SPEECH);
    assert_eq!(last_speech, Some(&(PRIORITY_SPEECH, Axis::Jaw, 30)));
}

#[test]
fn test_stream_text_speaks_each_sentence_once() {
    let queue = Arc::new(CommandQueue::new());
    let synth = ScriptedSynth::new(Vec::new());
    let spoken = Arc::clone(&synth.spoken);
    let sync = synchronizer(synth, RecordingPlayer::default(), &queue);

    let words = "Hi there. How are you today? I am fine";
    let consumed = sync.stream_text(words.split_inclusive(' '));

    assert_eq!(consumed, words);
    assert_eq!(
        spoken.lock().unwrap().as_slice(),
        ["Hi there.", "How are you today?", "I am fine"]
    );
}

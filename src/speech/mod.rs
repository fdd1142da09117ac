//! Speech-motion synchronizer.
//!
//! Streams synthesized audio to a player while driving the jaw from the loudness
//! of each chunk. Every utterance starts by resetting the command queue and ends,
//! on every path, with the jaw closed and the eyes centered.

pub mod lipsync;
pub mod player;
pub mod segmenter;
pub mod synth;

use crate::command::Axis;
use crate::command_queue::CommandQueue;
use crate::config::{EyeConfig, SpeechConfig};
use crate::constants::{PRIORITY_MOTION, PRIORITY_SPEECH};
use crate::utils::safe_cast::angle_to_degrees;
use crate::Result;
use lipsync::{jaw_angle_for_rms, PcmMeter};
use log::{debug, info, warn};
use player::{AudioOutput, AudioPlayer, StopHandle};
use segmenter::SentenceSegmenter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use synth::{SpeechEvent, Synthesizer};

/// The three speech signal flags shared with the motion generators
#[derive(Debug, Default)]
pub struct SpeechState {
    is_speaking: AtomicBool,
    audio_started: AtomicBool,
    interrupted: AtomicBool,
}

impl SpeechState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.is_speaking.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn audio_started(&self) -> bool {
        self.audio_started.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn set_speaking(&self, value: bool) {
        self.is_speaking.store(value, Ordering::SeqCst);
    }

    pub fn set_audio_started(&self, value: bool) {
        self.audio_started.store(value, Ordering::SeqCst);
    }

    pub fn set_interrupted(&self, value: bool) {
        self.interrupted.store(value, Ordering::SeqCst);
    }
}

/// Remove characters outside the Basic Multilingual Plane (emoji and friends)
#[must_use]
pub fn strip_astral(text: &str) -> String {
    text.chars().filter(|c| u32::from(*c) <= 0xFFFF).collect()
}

/// Drives one utterance at a time; `stop_speech` may be called from any thread
pub struct SpeechSynchronizer {
    config: SpeechConfig,
    eyes: EyeConfig,
    queue: Arc<CommandQueue>,
    state: Arc<SpeechState>,
    synthesizer: Box<dyn Synthesizer>,
    player: Box<dyn AudioPlayer>,
    active_stop: Mutex<Option<StopHandle>>,
}

impl SpeechSynchronizer {
    #[must_use]
    pub fn new(
        config: &SpeechConfig,
        eyes: &EyeConfig,
        queue: Arc<CommandQueue>,
        state: Arc<SpeechState>,
        synthesizer: Box<dyn Synthesizer>,
        player: Box<dyn AudioPlayer>,
    ) -> Self {
        Self {
            config: config.clone(),
            eyes: eyes.clone(),
            queue,
            state,
            synthesizer,
            player,
            active_stop: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn state(&self) -> &Arc<SpeechState> {
        &self.state
    }

    /// Speak one piece of text, blocking until playback ends or is stopped.
    ///
    /// Whitespace-only text (after emoji removal) is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the player or the synthesizer cannot be started. The
    /// idle pose is restored either way.
    pub fn speak(&self, text: &str) -> Result<()> {
        let text = strip_astral(text);
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        info!("Speaking: \"{text}\"");
        self.queue.clear();
        self.state.set_audio_started(false);
        self.state.set_speaking(true);

        let _cleanup = UtteranceCleanup { sync: self };
        self.play(text)
    }

    /// Stop the current utterance and any pending streamed text
    pub fn stop_speech(&self) {
        info!("Stop requested, ending speech");
        self.state.set_interrupted(true);
        if let Some(stop) = self.active_stop_handle() {
            stop();
        }
        self.state.set_speaking(false);
    }

    /// Speak text arriving in arbitrary fragments, sentence by sentence.
    ///
    /// Returns everything consumed from `fragments`, concatenated. Consumption
    /// stops early once [`stop_speech`](Self::stop_speech) is called.
    pub fn stream_text<I, S>(&self, fragments: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.state.set_interrupted(false);
        let mut segmenter = SentenceSegmenter::new(self.config.max_buffer_chars);
        let mut full_text = String::new();

        for fragment in fragments {
            if self.state.is_interrupted() {
                warn!("Stream interrupted, stopping text processing");
                break;
            }
            let fragment = fragment.as_ref();
            full_text.push_str(fragment);

            for sentence in segmenter.push(fragment) {
                if self.state.is_interrupted() {
                    break;
                }
                self.speak_logged(&sentence);
            }
        }

        if !self.state.is_interrupted() {
            if let Some(rest) = segmenter.finish() {
                self.speak_logged(&rest);
            }
        }
        full_text
    }

    fn speak_logged(&self, text: &str) {
        if let Err(e) = self.speak(text) {
            warn!("Utterance failed: {e}");
        }
    }

    fn play(&self, text: &str) -> Result<()> {
        let mut output = self.player.start()?;
        let stop = output.stop_handle();
        self.set_active_stop(Some(Arc::clone(&stop)));

        // A stop request may have raced with player start-up
        if !self.state.is_speaking() {
            stop();
            return output.finish();
        }

        let events = match self.synthesizer.synthesize(text) {
            Ok(events) => events,
            Err(e) => {
                stop();
                if let Err(finish_error) = output.finish() {
                    warn!("Player shutdown failed: {finish_error}");
                }
                return Err(e);
            }
        };

        let mut meter = PcmMeter::new();
        for event in events {
            if !self.state.is_speaking() {
                debug!("Speech interrupted, terminating player");
                stop();
                break;
            }
            match event {
                Ok(SpeechEvent::Audio(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    self.state.set_audio_started(true);
                    if let Err(e) = output.write(&chunk) {
                        warn!("Audio forwarding aborted: {e}");
                        break;
                    }
                    if let Some(rms) = meter.feed(&chunk) {
                        self.queue.push(PRIORITY_SPEECH, Axis::Jaw, jaw_angle_for_rms(rms, &self.config));
                    }
                }
                Ok(SpeechEvent::WordBoundary(word)) => {
                    if self.config.pause_on_punctuation && matches!(word.as_str(), "," | ".") {
                        self.queue.push(PRIORITY_SPEECH, Axis::Jaw, self.jaw_closed());
                    }
                }
                Err(e) => {
                    warn!("Audio streaming error: {e}");
                    break;
                }
            }
        }

        output.finish()
    }

    /// Restore the idle pose after an utterance
    fn finish_utterance(&self) {
        thread::sleep(Duration::from_millis(self.config.settle_ms));
        self.state.set_speaking(false);
        self.state.set_audio_started(false);
        self.set_active_stop(None);

        self.queue.push(PRIORITY_SPEECH, Axis::Jaw, self.jaw_closed());
        let (eye, z) = self.eye_center();
        self.queue.push(PRIORITY_MOTION, Axis::Eye, eye);
        self.queue.push(PRIORITY_MOTION, Axis::Z, z);
        info!("Speech complete");
    }

    #[allow(clippy::cast_possible_truncation)]
    fn jaw_closed(&self) -> i32 {
        self.config.jaw_closed.round() as i32
    }

    #[allow(clippy::cast_possible_truncation)]
    fn eye_center(&self) -> (i32, i32) {
        let e = &self.eyes;
        (
            angle_to_degrees(e.h_mid, e.h_min.ceil() as i32, e.h_max.floor() as i32),
            angle_to_degrees(e.v_mid, e.v_min.ceil() as i32, e.v_max.floor() as i32),
        )
    }

    fn active_stop_handle(&self) -> Option<StopHandle> {
        self.active_stop
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn set_active_stop(&self, handle: Option<StopHandle>) {
        *self.active_stop.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = handle;
    }
}

/// Runs the idle-pose cleanup when an utterance ends, including by error or panic
struct UtteranceCleanup<'a> {
    sync: &'a SpeechSynchronizer,
}

impl Drop for UtteranceCleanup<'_> {
    fn drop(&mut self) {
        self.sync.finish_utterance();
    }
}

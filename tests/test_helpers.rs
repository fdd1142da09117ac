//! Helper fakes and utilities for tests
#![allow(dead_code)]

use animatronic_motion::actuator::ActuatorLink;
use animatronic_motion::camera::FrameGrabber;
use animatronic_motion::command::MotionCommand;
use animatronic_motion::command_queue::CommandQueue;
use animatronic_motion::face_detection::{BoundingBox, Detection, FaceDetector};
use animatronic_motion::frame::Frame;
use animatronic_motion::speech::player::{AudioOutput, AudioPlayer, StopHandle};
use animatronic_motion::speech::synth::{EventStream, SpeechEvent, Synthesizer};
use animatronic_motion::{Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Face box of the given width, horizontally centered on `center_x`
pub fn face_at(center_x: f64, width: f64, score: f32) -> Detection {
    Detection {
        bbox: BoundingBox::new(center_x - width / 2.0, 100.0, center_x + width / 2.0, 100.0 + width),
        score,
    }
}

/// Pop everything currently queued, in service order
pub fn drain(queue: &CommandQueue) -> Vec<MotionCommand> {
    std::iter::from_fn(|| queue.try_pop()).collect()
}

/// 16-bit little-endian PCM of `samples` copies of `amplitude`
pub fn pcm_chunk(amplitude: i16, samples: usize) -> Vec<u8> {
    std::iter::repeat(amplitude.to_le_bytes()).take(samples).flatten().collect()
}

/// Canonical 44-byte RIFF/WAVE header for 22.05 kHz 16-bit mono PCM
pub fn wav_header(data_len: u32) -> Vec<u8> {
    let mut header = Vec::with_capacity(44);
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&(36 + data_len).to_le_bytes());
    header.extend_from_slice(b"WAVEfmt ");
    header.extend_from_slice(&16u32.to_le_bytes());
    header.extend_from_slice(&[1, 0, 1, 0]);
    header.extend_from_slice(&22_050u32.to_le_bytes());
    header.extend_from_slice(&44_100u32.to_le_bytes());
    header.extend_from_slice(&[2, 0, 16, 0]);
    header.extend_from_slice(b"data");
    header.extend_from_slice(&data_len.to_le_bytes());
    header
}

/// Detector that replays a fixed list of per-frame results, then reports nothing
#[derive(Default)]
pub struct ScriptedDetector {
    pub results: VecDeque<Vec<Detection>>,
}

impl ScriptedDetector {
    pub fn new(results: Vec<Vec<Detection>>) -> Self {
        Self { results: results.into() }
    }
}

impl FaceDetector for ScriptedDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        Ok(self.results.pop_front().unwrap_or_default())
    }
}

/// Grabber that produces blank frames of a fixed size
pub struct BlankGrabber {
    pub width: u32,
    pub height: u32,
}

impl FrameGrabber for BlankGrabber {
    fn grab(&mut self) -> Result<Option<Frame>> {
        thread::sleep(Duration::from_millis(5));
        Ok(Some(Frame::blank(self.width, self.height)))
    }
}

/// What a [`ScriptedLink`] saw, shared with the test after the link is boxed
#[derive(Debug, Default)]
pub struct LinkLog {
    pub written: Vec<String>,
    pub flushes: usize,
}

/// Actuator link answering from a script; missing answers read as silence
pub struct ScriptedLink {
    pub responses: VecDeque<String>,
    pub log: Arc<Mutex<LinkLog>>,
    /// The next this many writes time out without reaching the device
    pub write_timeouts: usize,
    /// Reads fail as if the device was unplugged
    pub disconnected: bool,
}

impl ScriptedLink {
    pub fn new(responses: &[&str]) -> (Self, Arc<Mutex<LinkLog>>) {
        let log = Arc::new(Mutex::new(LinkLog::default()));
        let link = Self {
            responses: responses.iter().map(ToString::to_string).collect(),
            log: Arc::clone(&log),
            write_timeouts: 0,
            disconnected: false,
        };
        (link, log)
    }

    /// A link that acknowledges everything
    pub fn acking() -> (Self, Arc<Mutex<LinkLog>>) {
        let (mut link, log) = Self::new(&[]);
        link.responses = std::iter::repeat("K".to_string()).take(100_000).collect();
        (link, log)
    }
}

impl ActuatorLink for ScriptedLink {
    fn write_line(&mut self, line: &str) -> Result<()> {
        if self.write_timeouts > 0 {
            self.write_timeouts -= 1;
            return Err(Error::WriteTimeout(line.to_string()));
        }
        self.log.lock().unwrap().written.push(line.to_string());
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        if self.disconnected {
            return Err(Error::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)));
        }
        Ok(self.responses.pop_front().unwrap_or_default())
    }

    fn flush_input(&mut self) -> Result<()> {
        self.log.lock().unwrap().flushes += 1;
        Ok(())
    }
}

/// Synthesizer replaying a fixed event list for every utterance.
///
/// `chunk_delay` paces the audio events so tests can interrupt mid-stream.
pub struct ScriptedSynth {
    pub events: Vec<SpeechEvent>,
    pub chunk_delay: Duration,
    pub spoken: Arc<Mutex<Vec<String>>>,
    /// Synthesis fails before producing any event
    pub fail: bool,
    /// Queue contents observed when synthesis started
    pub observed_queue: Option<(Arc<CommandQueue>, Arc<Mutex<Vec<Vec<MotionCommand>>>>)>,
}

impl ScriptedSynth {
    pub fn new(events: Vec<SpeechEvent>) -> Self {
        Self {
            events,
            chunk_delay: Duration::ZERO,
            spoken: Arc::new(Mutex::new(Vec::new())),
            fail: false,
            observed_queue: None,
        }
    }
}

impl Synthesizer for ScriptedSynth {
    fn synthesize(&self, text: &str) -> Result<EventStream> {
        self.spoken.lock().unwrap().push(text.to_string());
        if let Some((queue, seen)) = &self.observed_queue {
            seen.lock().unwrap().push(queue.snapshot());
        }
        if self.fail {
            return Err(Error::Synthesis("voice not installed".to_string()));
        }
        let delay = self.chunk_delay;
        Ok(Box::new(self.events.clone().into_iter().map(move |event| {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            Ok(event)
        })))
    }
}

/// Player that records the audio it receives
#[derive(Clone, Default)]
pub struct RecordingPlayer {
    pub written: Arc<Mutex<Vec<u8>>>,
    pub stopped: Arc<AtomicBool>,
    pub fail_start: bool,
    /// Every write reports a dead player
    pub fail_write: bool,
    /// `finish` reports an error
    pub fail_finish: bool,
}

impl RecordingPlayer {
    pub fn bytes_written(&self) -> usize {
        self.written.lock().unwrap().len()
    }

    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

struct RecordingOutput {
    player: RecordingPlayer,
}

impl AudioPlayer for RecordingPlayer {
    fn start(&self) -> Result<Box<dyn AudioOutput>> {
        if self.fail_start {
            return Err(Error::Player("no audio device".to_string()));
        }
        Ok(Box::new(RecordingOutput { player: self.clone() }))
    }
}

impl AudioOutput for RecordingOutput {
    fn write(&mut self, chunk: &[u8]) -> Result<()> {
        if self.player.was_stopped() {
            return Err(Error::Player("stopped".to_string()));
        }
        if self.player.fail_write {
            return Err(Error::Player("Broken pipe: player closed its input".to_string()));
        }
        self.player.written.lock().unwrap().extend_from_slice(chunk);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.player.fail_finish {
            return Err(Error::Player("player hung".to_string()));
        }
        Ok(())
    }

    fn stop_handle(&self) -> StopHandle {
        let stopped = Arc::clone(&self.player.stopped);
        Arc::new(move || stopped.store(true, Ordering::SeqCst))
    }
}

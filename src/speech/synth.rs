//! Text-to-speech backends producing a stream of audio chunks and word events.

use crate::config::SpeechConfig;
use crate::{Error, Result};
use log::debug;
use std::io::{self, Read};
use std::process::{Child, ChildStdout, Command, Stdio};

/// One item of a synthesized utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    /// Encoded audio to forward to the player
    Audio(Vec<u8>),
    /// The synthesizer reached a word or punctuation mark
    WordBoundary(String),
}

/// Lazily produced events for one utterance
pub type EventStream = Box<dyn Iterator<Item = Result<SpeechEvent>> + Send>;

/// Speech synthesis backend
pub trait Synthesizer: Send + Sync {
    /// Start synthesizing `text`
    ///
    /// # Errors
    ///
    /// Returns an error if synthesis cannot start.
    fn synthesize(&self, text: &str) -> Result<EventStream>;
}

/// Runs an external TTS command with the text as its last argument and streams its
/// stdout as audio. 16-bit mono PCM output (e.g. `espeak-ng --stdout`) gives the
/// most faithful lip-sync.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    command: Vec<String>,
    chunk_size: usize,
}

impl CommandSynthesizer {
    /// Default read size: about 90 ms of 22 kHz 16-bit mono audio
    pub const DEFAULT_CHUNK_SIZE: usize = 4096;

    /// # Errors
    ///
    /// `Error::ConfigError` if the configured command is empty.
    pub fn from_config(config: &SpeechConfig) -> Result<Self> {
        if config.synth_command.is_empty() {
            return Err(Error::ConfigError("speech.synth_command must not be empty".to_string()));
        }
        Ok(Self {
            command: config.synth_command.clone(),
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
        })
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

impl Synthesizer for CommandSynthesizer {
    fn synthesize(&self, text: &str) -> Result<EventStream> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| Error::Synthesis("Empty synthesizer command".to_string()))?;
        let mut child = Command::new(program)
            .args(args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Synthesis(format!("Failed to start {program}: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Synthesis("Synthesizer has no stdout".to_string()))?;
        debug!("Synthesizing {} chars with {program}", text.len());
        Ok(Box::new(ProcessStream {
            child,
            stdout,
            chunk_size: self.chunk_size.max(2),
            done: false,
        }))
    }
}

struct ProcessStream {
    child: Child,
    stdout: ChildStdout,
    chunk_size: usize,
    done: bool,
}

impl ProcessStream {
    fn finish(&mut self) -> Option<Result<SpeechEvent>> {
        self.done = true;
        match self.child.wait() {
            Ok(status) if status.success() => None,
            Ok(status) => Some(Err(Error::Synthesis(format!("Synthesizer exited with {status}")))),
            Err(e) => Some(Err(e.into())),
        }
    }
}

impl Iterator for ProcessStream {
    type Item = Result<SpeechEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            match self.stdout.read(&mut buf) {
                Ok(0) => return self.finish(),
                Ok(n) => {
                    buf.truncate(n);
                    return Some(Ok(SpeechEvent::Audio(buf)));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
        }
    }
}

impl Drop for ProcessStream {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

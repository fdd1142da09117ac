//! Audio playback through an external player process fed on stdin.

use crate::config::SpeechConfig;
use crate::{Error, Result};
use log::{debug, info, warn};
use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Forcibly ends playback; safe to call from any thread, any number of times
pub type StopHandle = Arc<dyn Fn() + Send + Sync>;

/// Starts one playback per utterance
pub trait AudioPlayer: Send + Sync {
    /// Start a player ready to receive audio
    ///
    /// # Errors
    ///
    /// Returns an error if the player cannot be started.
    fn start(&self) -> Result<Box<dyn AudioOutput>>;
}

/// A running playback
pub trait AudioOutput: Send {
    /// Forward one chunk of encoded audio
    ///
    /// # Errors
    ///
    /// `Error::Player` when the player died or closed its input.
    fn write(&mut self, chunk: &[u8]) -> Result<()>;

    /// Close the input and wait for the player to drain and exit
    ///
    /// # Errors
    ///
    /// Returns an error if waiting on the player fails or it had to be killed
    /// for overrunning its drain deadline.
    fn finish(&mut self) -> Result<()>;

    /// Handle that terminates this playback
    fn stop_handle(&self) -> StopHandle;
}

/// Slowest stream the drain deadline allows for: 8 kHz 16-bit mono
const MIN_PLAYBACK_BYTES_PER_SEC: u64 = 16_000;

/// Grace period past the expected playback time before a player is killed
const DEFAULT_DRAIN_MARGIN: Duration = Duration::from_secs(5);

/// Candidate players in preference order
const PLAYER_CANDIDATES: [&[&str]; 3] = [
    &["mpv", "--no-terminal", "--cache=yes", "--demuxer-max-bytes=128KiB", "-"],
    &[
        "ffplay", "-nodisp", "-autoexit", "-loglevel", "warning", "-fflags", "nobuffer", "-infbuf",
        "-probesize", "32768", "-i", "-",
    ],
    &["mpg123", "-q", "--buffer", "4096", "-"],
];

/// Locate `program` on `PATH`
#[must_use]
pub fn find_on_path(program: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// First installed player from the candidate list
#[must_use]
pub fn detect_player_command() -> Option<Vec<String>> {
    PLAYER_CANDIDATES
        .iter()
        .find(|command| find_on_path(command[0]).is_some())
        .map(|command| command.iter().map(|s| (*s).to_string()).collect())
}

/// Player backed by an external process
#[derive(Debug, Clone)]
pub struct ProcessPlayer {
    command: Vec<String>,
    drain_margin: Duration,
}

impl ProcessPlayer {
    /// Use the configured player command, or detect `mpv`, `ffplay` or `mpg123`
    ///
    /// # Errors
    ///
    /// `Error::Player` when no player is configured or installed.
    pub fn from_config(config: &SpeechConfig) -> Result<Self> {
        let command = match &config.player_command {
            Some(command) if !command.is_empty() => command.clone(),
            Some(_) => return Err(Error::Player("Configured player command is empty".to_string())),
            None => detect_player_command()
                .ok_or_else(|| Error::Player("Install mpv, ffmpeg or mpg123 for audio playback".to_string()))?,
        };
        info!("Audio player: {}", command.join(" "));
        Ok(Self::new(command))
    }

    #[must_use]
    pub const fn new(command: Vec<String>) -> Self {
        Self {
            command,
            drain_margin: DEFAULT_DRAIN_MARGIN,
        }
    }

    /// Extra time `finish` waits beyond the expected playback time
    #[must_use]
    pub const fn with_drain_margin(mut self, margin: Duration) -> Self {
        self.drain_margin = margin;
        self
    }

    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.command
    }
}

impl AudioPlayer for ProcessPlayer {
    fn start(&self) -> Result<Box<dyn AudioOutput>> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| Error::Player("Empty player command".to_string()))?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Player(format!("Failed to start {program}: {e}")))?;
        let stdin = child.stdin.take();
        Ok(Box::new(ProcessOutput {
            stdin,
            child: Arc::new(Mutex::new(child)),
            bytes_written: 0,
            drain_margin: self.drain_margin,
        }))
    }
}

/// Running player process. The child sits behind its own lock so a stop request
/// never waits on a blocked stdin write.
struct ProcessOutput {
    stdin: Option<ChildStdin>,
    child: Arc<Mutex<Child>>,
    bytes_written: u64,
    drain_margin: Duration,
}

impl ProcessOutput {
    /// Longest the player may keep running once its input is closed
    fn drain_deadline(&self) -> Duration {
        Duration::from_millis(self.bytes_written.saturating_mul(1000) / MIN_PLAYBACK_BYTES_PER_SEC)
            .saturating_add(self.drain_margin)
    }

    fn has_exited(&self) -> io::Result<bool> {
        let mut child = self.child.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(child.try_wait()?.is_some())
    }
}

impl AudioOutput for ProcessOutput {
    fn write(&mut self, chunk: &[u8]) -> Result<()> {
        if self.has_exited()? {
            return Err(Error::Player("Player process died unexpectedly".to_string()));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Player("Player input already closed".to_string()))?;
        match stdin.write_all(chunk).and_then(|()| stdin.flush()) {
            Ok(()) => {
                self.bytes_written = self.bytes_written.saturating_add(chunk.len() as u64);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                Err(Error::Player("Broken pipe: player closed its input".to_string()))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn finish(&mut self) -> Result<()> {
        // Dropping stdin signals end of stream
        self.stdin.take();
        let deadline = Instant::now() + self.drain_deadline();
        while !self.has_exited()? {
            if Instant::now() >= deadline {
                warn!("Player still running after {:?}, killing it", self.drain_deadline());
                (self.stop_handle())();
                self.child.lock().unwrap_or_else(std::sync::PoisonError::into_inner).wait()?;
                return Err(Error::Player("Player did not drain before its deadline".to_string()));
            }
            thread::sleep(Duration::from_millis(20));
        }
        debug!("Player exited");
        Ok(())
    }

    fn stop_handle(&self) -> StopHandle {
        let child = Arc::clone(&self.child);
        Arc::new(move || {
            let mut child = child.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Ok(None) = child.try_wait() {
                if let Err(e) = child.kill() {
                    debug!("Player kill failed: {e}");
                }
            }
        })
    }
}

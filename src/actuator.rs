//! Actuator link: one command in flight, acknowledged before the next is sent.
//!
//! The wire protocol is newline-terminated ASCII, `"<axis> <angle>\n"`, answered by
//! a single acknowledgment line. Bad acknowledgments and write timeouts are
//! recoverable; a lost link degrades the worker to audio-only draining.

use crate::command_queue::CommandQueue;
use crate::config::ActuatorConfig;
use crate::worker::Shutdown;
use crate::{Error, Result};
use log::{debug, error, info, warn};
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Request/acknowledge transport to the servo controller
pub trait ActuatorLink: Send {
    /// Write one line, appending the newline
    ///
    /// # Errors
    ///
    /// `Error::WriteTimeout` when the device does not accept the bytes in time,
    /// any other error when the link is gone.
    fn write_line(&mut self, line: &str) -> Result<()>;

    /// Read one response line without its terminator; empty on read timeout
    ///
    /// # Errors
    ///
    /// Returns an error when the link is gone.
    fn read_line(&mut self) -> Result<String>;

    /// Drop any unread input to resynchronize with the device
    ///
    /// # Errors
    ///
    /// Returns an error when the link is gone.
    fn flush_input(&mut self) -> Result<()>;
}

/// Serial port implementation of [`ActuatorLink`]
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialLink {
    /// Open a specific serial device
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be opened.
    pub fn open(path: &str, config: &ActuatorConfig) -> Result<Self> {
        let port = serialport::new(path, config.baud_rate)
            .timeout(config.timeout())
            .open()?;
        // Opening the port resets most boards; give the firmware time to boot
        thread::sleep(Duration::from_millis(config.reset_delay_ms));
        Ok(Self {
            port,
            name: path.to_string(),
        })
    }

    /// Open the configured port, falling back to the first available port that opens
    #[must_use]
    pub fn discover(config: &ActuatorConfig) -> Option<Self> {
        if let Some(path) = &config.port {
            match Self::open(path, config) {
                Ok(link) => {
                    info!("Port {path} opened successfully (configured)");
                    return Some(link);
                }
                Err(e) => warn!("Failed to open configured port {path}: {e}"),
            }
        }

        let ports = match serialport::available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!("Failed to enumerate serial ports: {e}");
                return None;
            }
        };

        for candidate in ports {
            match Self::open(&candidate.port_name, config) {
                Ok(link) => {
                    info!("Port {} opened successfully, assuming it drives the head", candidate.port_name);
                    return Some(link);
                }
                Err(e) => debug!("Skipping port {}: {e}", candidate.port_name),
            }
        }

        warn!("No working actuator port found");
        None
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ActuatorLink for SerialLink {
    fn write_line(&mut self, line: &str) -> Result<()> {
        let payload = format!("{line}\n");
        match self.port.write_all(payload.as_bytes()).and_then(|()| self.port.flush()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Err(Error::WriteTimeout(line.to_string())),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) if byte[0] == b'\n' => break,
                Ok(_) => line.push(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(String::from_utf8_lossy(&line).trim().to_string())
    }

    fn flush_input(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

/// Outcome of one request/acknowledge exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    /// Acknowledged
    Acked,
    /// Wrong or missing acknowledgment; input was flushed
    BadAck(String),
    /// Device did not accept the write
    WriteTimeout,
}

/// Sole consumer of the command queue
pub struct ActuatorWorker {
    queue: Arc<CommandQueue>,
    link: Option<Box<dyn ActuatorLink>>,
    connected: Arc<AtomicBool>,
    ack_token: String,
    dequeue_timeout: Duration,
    backoff: Duration,
}

impl ActuatorWorker {
    /// Build a worker; `link == None` runs in audio-only mode
    #[must_use]
    pub fn new(queue: Arc<CommandQueue>, link: Option<Box<dyn ActuatorLink>>, config: &ActuatorConfig) -> Self {
        let connected = Arc::new(AtomicBool::new(link.is_some()));
        Self {
            queue,
            link,
            connected,
            ack_token: config.ack_token.clone(),
            dequeue_timeout: Duration::from_millis(config.dequeue_timeout_ms),
            backoff: Duration::from_millis(config.unresponsive_backoff_ms),
        }
    }

    /// Shared flag reporting whether a link is attached
    #[must_use]
    pub fn connection_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.connected)
    }

    /// Drain the queue until shutdown
    pub fn run(mut self, shutdown: &Shutdown) {
        if self.link.is_none() {
            warn!("No actuator link, running in audio-only mode");
        }
        while !shutdown.is_triggered() {
            if let Some(command) = self.queue.pop_timeout(self.dequeue_timeout) {
                self.service(&command.wire_line(), shutdown);
            }
        }
    }

    /// Send one command line and handle the acknowledgment
    pub fn service(&mut self, line: &str, shutdown: &Shutdown) -> Option<Exchange> {
        let Some(link) = self.link.as_mut() else {
            debug!("Audio-only mode, discarding '{line}'");
            return None;
        };

        match exchange(link.as_mut(), line, &self.ack_token) {
            Ok(Exchange::WriteTimeout) => {
                warn!("Actuator write timed out, hardware unresponsive. Check connection.");
                shutdown.sleep(self.backoff);
                Some(Exchange::WriteTimeout)
            }
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!("Actuator link lost ({e}), continuing in audio-only mode");
                self.link = None;
                self.connected.store(false, Ordering::SeqCst);
                None
            }
        }
    }
}

/// Perform one request/acknowledge exchange on `link`.
///
/// # Errors
///
/// Returns an error only when the link itself failed.
pub fn exchange(link: &mut dyn ActuatorLink, line: &str, ack_token: &str) -> Result<Exchange> {
    match link.write_line(line) {
        Ok(()) => {}
        Err(Error::WriteTimeout(_)) => return Ok(Exchange::WriteTimeout),
        Err(e) => return Err(e),
    }
    debug!("Sent '{line}'");

    let response = link.read_line()?;
    if response == ack_token {
        Ok(Exchange::Acked)
    } else {
        warn!("Bad ACK from actuator: '{response}' | Command: '{line}'");
        link.flush_input()?;
        Ok(Exchange::BadAck(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedLink {
        written: Vec<String>,
        responses: VecDeque<Result<String>>,
        flushes: usize,
        write_timeout: bool,
    }

    impl ActuatorLink for ScriptedLink {
        fn write_line(&mut self, line: &str) -> Result<()> {
            if self.write_timeout {
                return Err(Error::WriteTimeout(line.to_string()));
            }
            self.written.push(line.to_string());
            Ok(())
        }

        fn read_line(&mut self) -> Result<String> {
            self.responses.pop_front().unwrap_or_else(|| Ok(String::new()))
        }

        fn flush_input(&mut self) -> Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_exchange_acked() {
        let mut link = ScriptedLink::default();
        link.responses.push_back(Ok("K".to_string()));
        assert_eq!(exchange(&mut link, "neck 90", "K").unwrap(), Exchange::Acked);
        assert_eq!(link.written, vec!["neck 90"]);
        assert_eq!(link.flushes, 0);
    }

    #[test]
    fn test_exchange_bad_ack_flushes() {
        let mut link = ScriptedLink::default();
        link.responses.push_back(Ok("X".to_string()));
        assert_eq!(
            exchange(&mut link, "jaw 40", "K").unwrap(),
            Exchange::BadAck("X".to_string())
        );
        assert_eq!(link.flushes, 1);
    }

    #[test]
    fn test_exchange_missing_ack_is_bad_ack() {
        let mut link = ScriptedLink::default();
        assert_eq!(
            exchange(&mut link, "jaw 40", "K").unwrap(),
            Exchange::BadAck(String::new())
        );
    }

    #[test]
    fn test_exchange_write_timeout() {
        let mut link = ScriptedLink {
            write_timeout: true,
            ..ScriptedLink::default()
        };
        assert_eq!(exchange(&mut link, "eye 80", "K").unwrap(), Exchange::WriteTimeout);
    }

    #[test]
    fn test_exchange_read_failure_propagates() {
        let mut link = ScriptedLink::default();
        link.responses
            .push_back(Err(Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))));
        assert!(exchange(&mut link, "z 100", "K").is_err());
    }

    #[test]
    fn test_audio_only_discards() {
        let queue = Arc::new(CommandQueue::new());
        let mut worker = ActuatorWorker::new(Arc::clone(&queue), None, &ActuatorConfig::default());
        assert!(!worker.connection_flag().load(Ordering::SeqCst));
        assert!(worker.service("neck 80", &Shutdown::new()).is_none());
    }
}

//! Background worker lifecycle: explicit states and a shared cooperative shutdown signal.

use log::{error, info};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Lifecycle of a background loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, not yet running
    Idle,
    /// Loop is executing
    Running,
    /// Shutdown requested, loop finishing its current step
    Stopping,
    /// Loop has exited
    Stopped,
}

impl WorkerState {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Stopping => 2,
            Self::Stopped => 3,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Cloneable cancellation signal shared by every loop
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request every holder to stop
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep up to `duration`, waking early on shutdown.
    ///
    /// Returns `true` if shutdown was requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let slice = Duration::from_millis(20);
        loop {
            if self.is_triggered() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(slice.min(deadline - now));
        }
    }
}

/// Handle to a named background thread
pub struct Worker {
    name: String,
    state: Arc<AtomicU8>,
    shutdown: Shutdown,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn `body` on a named thread.
    ///
    /// The body receives the shutdown signal and must return once it is triggered.
    /// A panic inside the body is logged and the worker ends `Stopped`; other
    /// workers are unaffected.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to create the thread.
    pub fn spawn<F>(name: &str, shutdown: Shutdown, body: F) -> crate::Result<Self>
    where
        F: FnOnce(Shutdown) + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(WorkerState::Idle.to_u8()));
        let thread_state = Arc::clone(&state);
        let thread_shutdown = shutdown.clone();
        let thread_name = name.to_string();

        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            thread_state.store(WorkerState::Running.to_u8(), Ordering::SeqCst);
            info!("{thread_name} worker started");
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| body(thread_shutdown)));
            if outcome.is_err() {
                error!("{thread_name} worker terminated by an internal fault");
            }
            thread_state.store(WorkerState::Stopped.to_u8(), Ordering::SeqCst);
            info!("{thread_name} worker stopped");
        })?;

        Ok(Self {
            name: name.to_string(),
            state,
            shutdown,
            handle: Some(handle),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Trigger shutdown and wait for the thread to exit
    pub fn stop(&mut self) {
        self.shutdown.trigger();
        if self.state() == WorkerState::Running {
            self.state.store(WorkerState::Stopping.to_u8(), Ordering::SeqCst);
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("{} worker panicked while stopping", self.name);
            }
        }
        self.state.store(WorkerState::Stopped.to_u8(), Ordering::SeqCst);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

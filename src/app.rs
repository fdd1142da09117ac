//! Composition root: wires the frame source, detector, trajectory integrator,
//! saccade generator, speech synchronizer and actuator link into one running head.
//!
//! Missing hardware never aborts start-up. Without a camera or detector model the
//! head holds a neutral pose with idle sway and saccades; without an actuator link
//! commands are drained and discarded.

use crate::actuator::{ActuatorLink, ActuatorWorker, SerialLink};
use crate::camera::{FrameGrabber, FrameSource, OpenCvCamera};
use crate::command::Axis;
use crate::command_queue::CommandQueue;
use crate::config::Config;
use crate::face_detection::{FaceDetector, OnnxFaceDetector};
use crate::frame::{Frame, FrameHandoff, FrameSlot};
use crate::saccade::{SaccadeGenerator, SaccadeLoop};
use crate::snapshot::capture_snapshot;
use crate::speech::player::{AudioPlayer, ProcessPlayer};
use crate::speech::synth::{CommandSynthesizer, Synthesizer};
use crate::speech::{SpeechState, SpeechSynchronizer};
use crate::tracking::{DetectionLoop, SharedTargets, TargetEstimator, TargetState};
use crate::trajectory::{IntegratorLoop, TrajectoryIntegrator};
use crate::worker::{Shutdown, Worker, WorkerState};
use crate::Result;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Audio capture owned by an external transcription collaborator
pub trait AudioCaptureControl: Send + Sync {
    /// Begin recording
    ///
    /// # Errors
    ///
    /// Returns an error if recording cannot start.
    fn start_capture(&self) -> Result<()>;

    /// Stop recording
    ///
    /// # Errors
    ///
    /// Returns an error if recording cannot be stopped.
    fn stop_capture(&self) -> Result<()>;

    fn is_recording(&self) -> bool;
}

/// Pluggable parts of the head. `None` marks an unavailable resource.
pub struct Components {
    pub grabber: Option<Box<dyn FrameGrabber>>,
    pub detector: Option<Box<dyn FaceDetector>>,
    pub link: Option<Box<dyn ActuatorLink>>,
    pub synthesizer: Box<dyn Synthesizer>,
    pub player: Box<dyn AudioPlayer>,
    pub audio_capture: Option<Arc<dyn AudioCaptureControl>>,
    pub rng: StdRng,
}

impl Components {
    /// Production components. Camera, model and actuator failures are logged and
    /// degrade the head.
    ///
    /// # Errors
    ///
    /// Returns an error if no synthesizer or audio player can be set up.
    pub fn from_config(config: &Config) -> Result<Self> {
        let grabber = match OpenCvCamera::open_with_fallback(&config.camera) {
            Ok(camera) => Some(Box::new(camera) as Box<dyn FrameGrabber>),
            Err(e) => {
                warn!("Camera unavailable ({e}), face tracking disabled");
                None
            }
        };

        let detector = match OnnxFaceDetector::new(&config.detection.model, config.detection.input_size) {
            Ok(detector) => {
                info!("Face detector loaded from {}", config.detection.model.display());
                Some(Box::new(detector) as Box<dyn FaceDetector>)
            }
            Err(e) => {
                warn!("Face detector unavailable ({e}), face tracking disabled");
                None
            }
        };

        let link = SerialLink::discover(&config.actuator).map(|link| {
            info!("Actuator link on {}", link.name());
            Box::new(link) as Box<dyn ActuatorLink>
        });

        Ok(Self {
            grabber,
            detector,
            link,
            synthesizer: Box::new(CommandSynthesizer::from_config(&config.speech)?),
            player: Box::new(ProcessPlayer::from_config(&config.speech)?),
            audio_capture: None,
            rng: StdRng::from_entropy(),
        })
    }
}

/// The running head
pub struct Animatronic {
    config: Config,
    frames: Arc<FrameSlot>,
    targets: Arc<SharedTargets>,
    queue: Arc<CommandQueue>,
    speech: Arc<SpeechSynchronizer>,
    camera_active: Arc<AtomicBool>,
    actuator_connected: Arc<AtomicBool>,
    tracking_active: bool,
    audio_capture: Option<Arc<dyn AudioCaptureControl>>,
    shutdown: Shutdown,
    workers: Vec<Worker>,
}

impl Animatronic {
    /// Validate `config`, build production components and start every loop
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration, missing speech tools, or a
    /// thread that cannot be spawned.
    pub fn start(config: Config) -> Result<Self> {
        config.validate()?;
        let components = Components::from_config(&config)?;
        Self::with_components(config, components)
    }

    /// Start every loop around the given components
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be spawned.
    pub fn with_components(config: Config, components: Components) -> Result<Self> {
        let shutdown = Shutdown::new();
        let queue = Arc::new(CommandQueue::new());
        let frames = Arc::new(FrameSlot::new());
        let targets = Arc::new(SharedTargets::new(TargetState::neutral(
            &config.tracking,
            &config.detection,
        )));
        let speech_state = Arc::new(SpeechState::new());
        let speech = Arc::new(SpeechSynchronizer::new(
            &config.speech,
            &config.eyes,
            Arc::clone(&queue),
            Arc::clone(&speech_state),
            components.synthesizer,
            components.player,
        ));
        let mut workers = Vec::new();

        let actuator = ActuatorWorker::new(Arc::clone(&queue), components.link, &config.actuator);
        let actuator_connected = actuator.connection_flag();
        workers.push(Worker::spawn("actuator", shutdown.clone(), move |signal| {
            actuator.run(&signal);
        })?);

        let mut tracking_active = false;
        let camera_active = if let Some(grabber) = components.grabber {
            let handoff = FrameHandoff::new();
            let source = FrameSource::new(grabber, Arc::clone(&frames), handoff.clone());
            let active = source.active_flag();
            workers.push(Worker::spawn("frame-source", shutdown.clone(), move |signal| {
                source.run(&signal);
            })?);

            if let Some(detector) = components.detector {
                let detection = DetectionLoop::new(
                    detector,
                    TargetEstimator::new(&config.detection, &config.tracking),
                    handoff,
                    Arc::clone(&targets),
                    &config.detection,
                );
                workers.push(Worker::spawn("detector", shutdown.clone(), move |signal| {
                    detection.run(&signal);
                })?);
                tracking_active = true;
            }
            active
        } else {
            Arc::new(AtomicBool::new(false))
        };
        if !tracking_active {
            warn!("Face tracking disabled, holding the neutral pose");
        }

        let integrator = IntegratorLoop::new(
            TrajectoryIntegrator::new(&config.tracking, config.detection.max_step_far),
            Arc::clone(&targets),
            Arc::clone(&queue),
            &config.tracking,
        );
        workers.push(Worker::spawn("trajectory", shutdown.clone(), move |signal| {
            integrator.run(&signal);
        })?);

        let saccades = SaccadeLoop::new(
            SaccadeGenerator::new(&config.eyes, components.rng, Instant::now()),
            Arc::clone(&queue),
            speech_state,
        );
        workers.push(Worker::spawn("saccade", shutdown.clone(), move |signal| {
            saccades.run(&signal);
        })?);

        info!("Animatronic started with {} workers", workers.len());
        Ok(Self {
            config,
            frames,
            targets,
            queue,
            speech,
            camera_active,
            actuator_connected,
            tracking_active,
            audio_capture: components.audio_capture,
            shutdown,
            workers,
        })
    }

    /// Most recent camera frame, for live preview
    #[must_use]
    pub fn latest_frame(&self) -> Option<Frame> {
        self.frames.latest()
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.speech.state().is_speaking()
    }

    #[must_use]
    pub fn camera_active(&self) -> bool {
        self.camera_active.load(Ordering::SeqCst)
    }

    #[must_use]
    pub const fn tracking_active(&self) -> bool {
        self.tracking_active
    }

    #[must_use]
    pub fn actuator_connected(&self) -> bool {
        self.actuator_connected.load(Ordering::SeqCst)
    }

    /// Current detector targets
    #[must_use]
    pub fn targets(&self) -> TargetState {
        self.targets.get()
    }

    /// Shared speech synchronizer, for callers that speak from their own thread
    #[must_use]
    pub fn speech(&self) -> Arc<SpeechSynchronizer> {
        Arc::clone(&self.speech)
    }

    /// Speak `text`, blocking until playback ends
    ///
    /// # Errors
    ///
    /// Returns an error if playback cannot start.
    pub fn speak(&self, text: &str) -> Result<()> {
        self.speech.speak(text)
    }

    /// Speak streamed text sentence by sentence; returns the full text consumed
    pub fn stream_text<I, S>(&self, fragments: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.speech.stream_text(fragments)
    }

    pub fn stop_speech(&self) {
        self.speech.stop_speech();
    }

    /// Save the current frame as a JPEG under the captures directory
    #[must_use]
    pub fn capture_snapshot(&self) -> Option<PathBuf> {
        match capture_snapshot(&self.frames, &self.config.capture) {
            Ok(path) => path,
            Err(e) => {
                warn!("Snapshot failed: {e}");
                None
            }
        }
    }

    /// Queue an arbitrary command, e.g. a manual neck centering request
    pub fn queue_command(&self, priority: u8, axis: Axis, angle: i32) -> u64 {
        self.queue.push(priority, axis, angle)
    }

    /// Ask the capture collaborator to start recording. Returns `false` if there is none.
    ///
    /// # Errors
    ///
    /// Propagates the collaborator's error.
    pub fn start_audio_capture(&self) -> Result<bool> {
        let Some(capture) = &self.audio_capture else {
            warn!("No audio capture attached");
            return Ok(false);
        };
        capture.start_capture()?;
        Ok(true)
    }

    /// Ask the capture collaborator to stop recording. Returns `false` if there is none.
    ///
    /// # Errors
    ///
    /// Propagates the collaborator's error.
    pub fn stop_audio_capture(&self) -> Result<bool> {
        let Some(capture) = &self.audio_capture else {
            warn!("No audio capture attached");
            return Ok(false);
        };
        capture.stop_capture()?;
        Ok(true)
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.audio_capture.as_ref().is_some_and(|c| c.is_recording())
    }

    /// Name and state of every background loop
    #[must_use]
    pub fn worker_states(&self) -> Vec<(String, WorkerState)> {
        self.workers
            .iter()
            .map(|w| (w.name().to_string(), w.state()))
            .collect()
    }

    /// Stop speech and every loop, then release the hardware
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        info!("Shutting down");
        if self.is_speaking() {
            self.stop_speech();
        }
        self.shutdown.trigger();
        for worker in &mut self.workers {
            worker.stop();
        }
        self.workers.clear();
        info!("Shutdown complete");
    }
}

impl Drop for Animatronic {
    fn drop(&mut self) {
        self.shutdown();
    }
}

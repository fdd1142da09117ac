//! Energy-driven lip-sync: loudness of each audio chunk opens the jaw proportionally.

use crate::config::SpeechConfig;
use crate::utils::safe_cast::angle_to_degrees;

/// Root-mean-square amplitude of 16-bit little-endian mono PCM.
///
/// A trailing odd byte is ignored; an empty chunk has zero energy.
#[must_use]
pub fn rms_i16_le(bytes: &[u8]) -> f64 {
    let samples = bytes.chunks_exact(2);
    let count = samples.len();
    if count == 0 {
        return 0.0;
    }
    let sum_of_squares: f64 = samples
        .map(|pair| {
            let sample = f64::from(i16::from_le_bytes([pair[0], pair[1]]));
            sample * sample
        })
        .sum();
    #[allow(clippy::cast_precision_loss)]
    let mean = sum_of_squares / count as f64;
    mean.sqrt()
}

/// Jaw angle for a chunk with the given RMS.
///
/// At or below the noise floor the jaw is closed; above it the opening grows
/// linearly with RMS up to `rms_full_scale`, then saturates.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn jaw_angle_for_rms(rms: f64, config: &SpeechConfig) -> i32 {
    let closed = config.jaw_closed;
    let open = config.jaw_open_max;
    let bounds = (closed.min(open).ceil() as i32, closed.max(open).floor() as i32);

    if rms.is_nan() || rms <= config.noise_floor {
        return angle_to_degrees(closed, bounds.0, bounds.1);
    }
    let normalized = (rms / config.rms_full_scale).min(1.0);
    angle_to_degrees(closed + normalized * (open - closed), bounds.0, bounds.1)
}

/// Jaw angle for a raw audio chunk
#[must_use]
pub fn jaw_angle_for_chunk(chunk: &[u8], config: &SpeechConfig) -> i32 {
    jaw_angle_for_rms(rms_i16_le(chunk), config)
}

/// Header bytes scanned for a WAV `data` chunk before giving up and metering everything
const MAX_WAV_HEADER: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// Not yet known whether the stream starts with a RIFF/WAVE header
    Detecting,
    /// Inside a WAV header; `offset` is the next sub-chunk to inspect
    Header { offset: usize },
    Samples,
}

/// Per-utterance loudness meter over a raw 16-bit PCM byte stream.
///
/// Chunks may split samples anywhere: an odd trailing byte is carried into the
/// next chunk. A leading RIFF/WAVE header is skipped up to its `data` chunk.
#[derive(Debug, Clone)]
pub struct PcmMeter {
    pending: Vec<u8>,
    framing: Framing,
}

impl Default for PcmMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl PcmMeter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
            framing: Framing::Detecting,
        }
    }

    /// Feed the next chunk; returns the RMS of every whole sample now available,
    /// or `None` when the chunk completed no sample.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<f64> {
        self.pending.extend_from_slice(chunk);
        self.skip_header();
        if self.framing != Framing::Samples {
            return None;
        }

        let whole = self.pending.len() & !1;
        if whole == 0 {
            return None;
        }
        let rms = rms_i16_le(&self.pending[..whole]);
        self.pending.drain(..whole);
        Some(rms)
    }

    fn skip_header(&mut self) {
        if self.framing == Framing::Detecting {
            let magic_len = self.pending.len().min(4);
            if self.pending[..magic_len] != b"RIFF"[..magic_len] {
                self.framing = Framing::Samples;
                return;
            }
            if self.pending.len() < 12 {
                return;
            }
            self.framing = if &self.pending[8..12] == b"WAVE" {
                Framing::Header { offset: 12 }
            } else {
                Framing::Samples
            };
        }

        while let Framing::Header { offset } = self.framing {
            if offset > MAX_WAV_HEADER {
                let skip = offset.min(self.pending.len());
                self.pending.drain(..skip);
                self.framing = Framing::Samples;
                return;
            }
            let Some(header) = self.pending.get(offset..offset + 8) else {
                return;
            };
            let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            if &header[..4] == b"data" {
                self.pending.drain(..offset + 8);
                self.framing = Framing::Samples;
                return;
            }
            // Sub-chunks are padded to an even length
            let size = usize::try_from(size).unwrap_or(usize::MAX);
            let next = offset.saturating_add(8).saturating_add(size).saturating_add(size & 1);
            self.framing = Framing::Header { offset: next };
        }
    }
}

//! Hold-to-talk recorder: turns the live capture stream into WAV takes.
//!
//! [`AudioRecorder`] is the seam the session controller drives: `start` on
//! hotkey press, `stop` on release, which yields the path of a finished WAV
//! file.  [`MicRecorder`] is the production implementation fed by
//! [`crate::audio::AudioCapture`]:
//!
//! ```text
//! cpal callback → AudioChunk (std mpsc) → feeder thread
//!     └─ while recording: downmix → append to take (device rate)
//! stop() → spawn_blocking(resample whole take to 16 kHz → write WAV) → PathBuf
//! ```
//!
//! The take is resampled once as a whole, so interpolation runs across chunk
//! boundaries and the output length follows the true rate ratio.

use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

use crate::audio::capture::AudioChunk;
use crate::audio::wav::{REQUIRED_BITS_PER_SAMPLE, REQUIRED_CHANNELS, REQUIRED_SAMPLE_RATE};

// ---------------------------------------------------------------------------
// RecorderError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording in progress")]
    NotRecording,

    #[error("audio input unavailable: {0}")]
    Device(String),

    #[error("cannot prepare scratch directory {path}: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write WAV file {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("recorder task failed: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// AudioRecorder trait
// ---------------------------------------------------------------------------

/// Capture collaborator used by the session controller.
///
/// `start` must not block: it is called on the hotkey path.
#[async_trait]
pub trait AudioRecorder: Send + Sync {
    /// Begin a new take whose WAV will be written into `scratch_dir`.
    fn start(&self, scratch_dir: &Path) -> Result<(), RecorderError>;

    /// Finish the current take and return the path of the written WAV file.
    async fn stop(&self) -> Result<PathBuf, RecorderError>;
}

// ---------------------------------------------------------------------------
// MicRecorder
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Take {
    recording: bool,
    /// Mono samples at `sample_rate`.
    samples: Vec<f32>,
    /// Rate of the first chunk of the take; `None` until audio arrives.
    sample_rate: Option<u32>,
    target: Option<PathBuf>,
}

/// Microphone-backed [`AudioRecorder`].
///
/// Samples are kept as mono `f32` at the device rate while recording and
/// converted to 16 kHz when the take stops.  At most `max_secs` of audio
/// are retained, later audio is discarded.
#[derive(Clone)]
pub struct MicRecorder {
    take: Arc<Mutex<Take>>,
    max_secs: f32,
}

impl MicRecorder {
    /// `max_recording_secs` caps the memory a single take can use.
    pub fn new(max_recording_secs: f32) -> Self {
        Self {
            take: Arc::new(Mutex::new(Take::default())),
            max_secs: max_recording_secs.max(0.0),
        }
    }

    /// Spawn the feeder thread that drains `chunks`.
    ///
    /// The thread exits when the sending side (the cpal callback) is dropped.
    pub fn attach(&self, chunks: mpsc::Receiver<AudioChunk>) -> io::Result<std::thread::JoinHandle<()>> {
        let recorder = self.clone();
        std::thread::Builder::new()
            .name("audio-feeder".into())
            .spawn(move || {
                while let Ok(chunk) = chunks.recv() {
                    recorder.feed(&chunk);
                }
                log::debug!("audio: capture channel closed, feeder exiting");
            })
    }

    /// Append one chunk to the current take, if a take is active.
    pub fn feed(&self, chunk: &AudioChunk) {
        if !self.lock().recording {
            return;
        }

        let mono = downmix(&chunk.samples, chunk.channels);

        let mut take = self.lock();
        if !take.recording {
            return;
        }
        let rate = *take.sample_rate.get_or_insert(chunk.sample_rate);
        if rate != chunk.sample_rate {
            log::warn!(
                "audio: chunk at {} Hz in a {rate} Hz take, dropped",
                chunk.sample_rate
            );
            return;
        }
        // Saturating float cast: an absurd limit just means no limit.
        let max_samples = (self.max_secs * rate as f32) as usize;
        let room = max_samples.saturating_sub(take.samples.len());
        if room < mono.len() {
            log::warn!("audio: take reached its length limit, dropping further audio");
        }
        take.samples.extend_from_slice(&mono[..room.min(mono.len())]);
    }

    /// Whether a take is in progress.
    pub fn is_recording(&self) -> bool {
        self.lock().recording
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Take> {
        self.take.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AudioRecorder for MicRecorder {
    fn start(&self, scratch_dir: &Path) -> Result<(), RecorderError> {
        std::fs::create_dir_all(scratch_dir).map_err(|source| RecorderError::Scratch {
            path: scratch_dir.to_path_buf(),
            source,
        })?;

        let mut take = self.lock();
        if take.recording {
            return Err(RecorderError::AlreadyRecording);
        }

        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S-%3f");
        take.recording = true;
        take.samples.clear();
        take.sample_rate = None;
        take.target = Some(scratch_dir.join(format!("recording-{stamp}.wav")));
        Ok(())
    }

    async fn stop(&self) -> Result<PathBuf, RecorderError> {
        let (samples, rate, path) = {
            let mut take = self.lock();
            if !take.recording {
                return Err(RecorderError::NotRecording);
            }
            take.recording = false;
            let path = take.target.take().ok_or(RecorderError::NotRecording)?;
            let rate = take.sample_rate.take().unwrap_or(REQUIRED_SAMPLE_RATE);
            (mem::take(&mut take.samples), rate, path)
        };

        log::debug!(
            "audio: take finished, {} samples at {rate} Hz ({:.2} s) → {}",
            samples.len(),
            samples.len() as f32 / rate as f32,
            path.display()
        );

        let out = path.clone();
        tokio::task::spawn_blocking(move || {
            write_wav(&out, &resample(&samples, rate, REQUIRED_SAMPLE_RATE))
        })
            .await
            .map_err(|e| RecorderError::Internal(e.to_string()))?
            .map_err(|e| RecorderError::Write {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

/// Write `samples` (16 kHz mono, `[-1.0, 1.0]`) as a 16-bit PCM WAV.
pub fn write_wav(path: &Path, samples: &[f32]) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: REQUIRED_CHANNELS,
        sample_rate: REQUIRED_SAMPLE_RATE,
        bits_per_sample: REQUIRED_BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()
}

/// Average interleaved frames down to one channel.
fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => samples
            .chunks_exact(n as usize)
            .map(|frame| frame.iter().sum::<f32>() / n as f32)
            .collect(),
    }
}

/// Linear-interpolation resampler.  Good enough for speech going into STT.
fn resample(samples: &[f32], from: u32, to: u32) -> Vec<f32> {
    if from == to || samples.is_empty() || from == 0 {
        return samples.to_vec();
    }

    let step = from as f64 / to as f64;
    let out_len = (samples.len() as f64 / step).round() as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = (pos as usize).min(last);
            let frac = (pos - idx as f64) as f32;
            let next = samples[(idx + 1).min(last)];
            samples[idx] + (next - samples[idx]) * frac
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

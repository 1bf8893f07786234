//! Audio side of the pipeline: capture, takes and the WAV gatekeeper.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → MicRecorder (16 kHz mono)
//!           → stop() → WAV file → wav::check_file → STT subprocess
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::mpsc;
//! use holdtalk::audio::{AudioCapture, AudioChunk, MicRecorder};
//!
//! let (tx, rx) = mpsc::channel::<AudioChunk>();
//! let capture = AudioCapture::open(None).unwrap();
//! let _stream = capture.start(tx).unwrap(); // drop to stop the stream
//!
//! let recorder = MicRecorder::new(60.0);
//! let _feeder = recorder.attach(rx).unwrap();
//! ```

pub mod capture;
pub mod recorder;
pub mod wav;

pub use capture::{AudioCapture, AudioChunk, CaptureError, StreamHandle};
pub use recorder::{write_wav, AudioRecorder, MicRecorder, RecorderError};
pub use wav::{check_bytes, check_file, WavFormatViolation, WavInfo};

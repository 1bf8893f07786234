//! Microphone capture via `cpal`.
//!
//! [`AudioCapture`] opens an input device (the system default or one chosen
//! by name) and streams [`AudioChunk`]s over a std mpsc channel.  Whatever the
//! device's native sample format, chunks are delivered as interleaved `f32`.
//! The returned [`StreamHandle`] is a RAII guard; dropping it stops the
//! hardware stream.
//!
//! The stream runs for the whole lifetime of the app.  Whether a chunk ends up
//! in a recording is decided downstream by [`crate::audio::MicRecorder`].

use std::sync::mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use thiserror::Error;

/// One buffer of interleaved samples in `[-1.0, 1.0]` as delivered by cpal.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    /// Native rate of the device (e.g. 44 100, 48 000).
    pub sample_rate: u32,
    pub channels: u16,
}

/// Keeps the cpal stream alive.  Not `Send` on every platform, so it stays on
/// the thread that created it.
pub struct StreamHandle {
    _stream: cpal::Stream,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device {0:?} not found")]
    DeviceNotFound(String),

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("unsupported input sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    sample_rate: u32,
    channels: u16,
}

impl AudioCapture {
    /// Open `device_name`, or the host's default input device when `None`.
    ///
    /// # Errors
    ///
    /// [`CaptureError::NoDevice`] / [`CaptureError::DeviceNotFound`] when no
    /// matching device exists; [`CaptureError::DefaultConfig`] when the device
    /// cannot report a stream configuration.
    pub fn open(device_name: Option<&str>) -> Result<Self, CaptureError> {
        let host = cpal::default_host();

        let device = match device_name {
            None => host.default_input_device().ok_or(CaptureError::NoDevice)?,
            Some(wanted) => host
                .input_devices()?
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceNotFound(wanted.to_string()))?,
        };

        let supported = device.default_input_config()?;
        let sample_format = supported.sample_format();
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;

        if let Ok(name) = device.name() {
            log::info!("audio: using input device {name:?} ({sample_rate} Hz, {channels} ch, {sample_format:?})");
        }

        Ok(Self {
            device,
            config: supported.into(),
            sample_format,
            sample_rate,
            channels,
        })
    }

    /// Start the stream; every hardware buffer is forwarded to `tx`.
    ///
    /// Send errors (receiver gone) are ignored so the audio thread never
    /// panics.
    pub fn start(&self, tx: mpsc::Sender<AudioChunk>) -> Result<StreamHandle, CaptureError> {
        let stream = match self.sample_format {
            cpal::SampleFormat::F32 => self.build::<f32>(tx)?,
            cpal::SampleFormat::I16 => self.build::<i16>(tx)?,
            cpal::SampleFormat::U16 => self.build::<u16>(tx)?,
            cpal::SampleFormat::I32 => self.build::<i32>(tx)?,
            other => return Err(CaptureError::UnsupportedFormat(format!("{other:?}"))),
        };

        stream.play()?;
        Ok(StreamHandle { _stream: stream })
    }

    fn build<T>(&self, tx: mpsc::Sender<AudioChunk>) -> Result<cpal::Stream, CaptureError>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let sample_rate = self.sample_rate;
        let channels = self.channels;

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let chunk = AudioChunk {
                    samples: data.iter().map(|&s| f32::from_sample(s)).collect(),
                    sample_rate,
                    channels,
                };
                let _ = tx.send(chunk);
            },
            |err: cpal::StreamError| {
                log::error!("audio: cpal stream error: {err}");
            },
            None,
        )?;

        Ok(stream)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_chunk_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AudioChunk>();
    }

    #[test]
    fn capture_error_names_missing_device() {
        let e = CaptureError::DeviceNotFound("USB Mic".into());
        assert!(e.to_string().contains("USB Mic"));
    }
}

//! CPAL-based output line
//!
//! Opens an output device at the fixed 16 kHz rate and feeds it mono i16
//! chunks through a bounded channel. The device callback duplicates each
//! sample across the device's channels and plays silence on underrun.
//! There is no resampling: a device without 16 kHz support is rejected.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam::channel::{bounded, Receiver, Sender};
use parley_core::domain::audio::{AudioError, OutputLine, Result, SAMPLE_RATE};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Chunks buffered between the mixer and the device callback
const LINE_QUEUE_CHUNKS: usize = 4;

/// Longest `drain` waits for queued audio to reach the device
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Output device as reported by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    /// The device offers a 16 kHz output configuration
    pub supports_speech_rate: bool,
}

#[allow(deprecated)]
fn device_name(device: &cpal::Device) -> String {
    device.name().unwrap_or_else(|_| "Unknown Device".to_string())
}

fn supports_speech_rate(device: &cpal::Device) -> bool {
    device
        .supported_output_configs()
        .map(|mut configs| {
            configs.any(|c| c.min_sample_rate() <= SAMPLE_RATE && SAMPLE_RATE <= c.max_sample_rate())
        })
        .unwrap_or(false)
}

/// Enumerate output devices on the default host
pub fn list_output_devices() -> Result<Vec<OutputDeviceInfo>> {
    let host = cpal::default_host();
    debug!("Using audio host: {:?}", host.id());

    let default_name = host.default_output_device().map(|d| device_name(&d));
    let devices = host
        .output_devices()
        .map_err(|e| AudioError::OsError(e.to_string()))?;

    let infos: Vec<_> = devices
        .map(|device| {
            let name = device_name(&device);
            OutputDeviceInfo {
                is_default: default_name.as_deref() == Some(name.as_str()),
                supports_speech_rate: supports_speech_rate(&device),
                name,
            }
        })
        .collect();

    info!("Found {} output devices", infos.len());
    Ok(infos)
}

fn find_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
    match name {
        Some(name) => host
            .output_devices()
            .map_err(|e| AudioError::OsError(e.to_string()))?
            .find(|d| device_name(d) == name)
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string())),
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string())),
    }
}

/// Pick a 16 kHz configuration: fewest channels first, i16 over f32
fn speech_config(device: &cpal::Device) -> Result<cpal::SupportedStreamConfig> {
    let configs = device
        .supported_output_configs()
        .map_err(|e| AudioError::InvalidConfiguration(e.to_string()))?;

    let format_rank = |format: cpal::SampleFormat| match format {
        cpal::SampleFormat::I16 => Some(0),
        cpal::SampleFormat::F32 => Some(1),
        _ => None,
    };

    configs
        .filter(|c| c.min_sample_rate() <= SAMPLE_RATE && SAMPLE_RATE <= c.max_sample_rate())
        .filter_map(|c| format_rank(c.sample_format()).map(|rank| (c.channels(), rank, c)))
        .min_by_key(|(channels, rank, _)| (*channels, *rank))
        .map(|(_, _, c)| c.with_sample_rate(SAMPLE_RATE))
        .ok_or_else(|| {
            AudioError::UnsupportedConfiguration(format!(
                "Device does not support {} Hz i16/f32 output",
                SAMPLE_RATE
            ))
        })
}

/// Device-side state: the chunk being played and where we are in it
struct Playback {
    receiver: Receiver<Vec<i16>>,
    pending: Vec<i16>,
    position: usize,
    channels: usize,
}

impl Playback {
    fn next_sample(&mut self) -> Option<i16> {
        if self.position >= self.pending.len() {
            self.pending = self.receiver.try_recv().ok()?;
            self.position = 0;
        }
        let sample = self.pending.get(self.position).copied();
        self.position += 1;
        sample
    }

    fn fill<T>(&mut self, data: &mut [T])
    where
        T: SizedSample + FromSample<i16>,
    {
        for frame in data.chunks_mut(self.channels) {
            let value = match self.next_sample() {
                Some(sample) => T::from_sample(sample),
                None => T::EQUILIBRIUM,
            };
            frame.fill(value);
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    receiver: Receiver<Vec<i16>>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<i16>,
{
    let mut playback = Playback {
        receiver,
        pending: Vec::new(),
        position: 0,
        channels: usize::from(config.channels.max(1)),
    };

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| playback.fill(data),
            |err| error!("Output stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::StreamError(format!("Failed to build stream: {}", e)))
}

/// Output line backed by a CPAL stream
pub struct CpalOutputLine {
    stream: Option<cpal::Stream>,
    sender: Sender<Vec<i16>>,
    device_name: String,
    channels: u16,
}

impl CpalOutputLine {
    /// Open the named device, or the default output when `None`
    pub fn open(device: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        let cpal_device = find_device(&host, device)?;
        let device_name = device_name(&cpal_device);

        let supported = speech_config(&cpal_device)?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.config();

        info!(
            device = %device_name,
            channels = config.channels,
            format = ?sample_format,
            "Opening output line"
        );

        let (sender, receiver) = bounded(LINE_QUEUE_CHUNKS);
        let stream = match sample_format {
            cpal::SampleFormat::I16 => build_stream::<i16>(&cpal_device, &config, receiver)?,
            cpal::SampleFormat::F32 => build_stream::<f32>(&cpal_device, &config, receiver)?,
            other => {
                return Err(AudioError::UnsupportedConfiguration(format!(
                    "Unsupported sample format {:?}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| AudioError::StreamError(format!("Failed to start stream: {}", e)))?;

        Ok(Self {
            stream: Some(stream),
            sender,
            device_name,
            channels: config.channels,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl OutputLine for CpalOutputLine {
    fn write(&mut self, chunk: &[u8]) -> Result<usize> {
        if self.stream.is_none() {
            return Err(AudioError::StreamError("Output line is closed".to_string()));
        }

        let samples: Vec<i16> = chunk
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        self.sender
            .send(samples)
            .map_err(|_| AudioError::StreamError("Output stream is gone".to_string()))?;
        Ok(chunk.len())
    }

    fn drain(&mut self) {
        let started = Instant::now();
        while !self.sender.is_empty() {
            if started.elapsed() >= DRAIN_TIMEOUT {
                warn!(queued = self.sender.len(), "Output line did not drain in time");
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                debug!(error = %e, "Pausing output stream failed");
            }
            info!(device = %self.device_name, "Output line closed");
        }
    }
}

impl Drop for CpalOutputLine {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for CpalOutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpalOutputLine")
            .field("device_name", &self.device_name)
            .field("channels", &self.channels)
            .field("open", &self.stream.is_some())
            .finish()
    }
}

//! Full-duplex device streams
//!
//! cpal has no duplex stream, so capture and playback are two streams. The
//! input callback only queues samples; the output callback is the intercom
//! clock and runs the bridge through a [`ChunkPump`].

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, Sample, SampleRate, StreamConfig};

use crate::audio::buffer::SharedCaptureQueue;
use crate::audio::device::{
    get_default_input_device, get_default_output_device, get_device_by_id, supports_format,
    AudioDevice,
};
use crate::audio::pump::ChunkPump;
use crate::bridge::CallbackBridge;
use crate::config::AudioConfig;
use crate::error::AudioError;
use crate::network::Transport;

/// Running input and output streams; audio stops when dropped
pub struct IntercomStream {
    _input: cpal::Stream,
    _output: cpal::Stream,
}

impl IntercomStream {
    /// Open the configured devices and start driving `bridge`
    ///
    /// Captured samples travel to the playback side through `capture`.
    pub fn start<T: Transport + 'static>(
        audio: &AudioConfig,
        bridge: CallbackBridge<T>,
        capture: SharedCaptureQueue,
    ) -> Result<Self, AudioError> {
        let input_device = match &audio.input_device {
            Some(id) => get_device_by_id(id)?,
            None => get_default_input_device()?,
        };
        let output_device = match &audio.output_device {
            Some(id) => get_device_by_id(id)?,
            None => get_default_output_device()?,
        };
        check_format(&input_device, true, audio)?;
        check_format(&output_device, false, audio)?;

        // Let the backend pick its period; the pump re-chunks
        let config = StreamConfig {
            channels: audio.channels,
            sample_rate: SampleRate(audio.frames_per_second),
            buffer_size: BufferSize::Default,
        };

        let producer = capture.clone();
        let input = input_device
            .inner()
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for &sample in data {
                        producer.push(i16::from_sample(sample));
                    }
                },
                |err| tracing::error!("Input stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let mut pump = ChunkPump::new(bridge, capture);
        let output = output_device
            .inner()
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    pump.render(data, |sample| f32::from_sample(sample));
                },
                |err| tracing::error!("Output stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        input
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        output
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        tracing::info!(
            "Audio running: {} -> {} at {} Hz, {} channels",
            input_device.name,
            output_device.name,
            audio.frames_per_second,
            audio.channels
        );

        Ok(Self {
            _input: input,
            _output: output,
        })
    }
}

fn check_format(
    device: &AudioDevice,
    is_input: bool,
    audio: &AudioConfig,
) -> Result<(), AudioError> {
    if supports_format(device.inner(), is_input, audio.channels, audio.frames_per_second) {
        Ok(())
    } else {
        Err(AudioError::UnsupportedFormat(format!(
            "{} does not support {} channels at {} Hz",
            device.name, audio.channels, audio.frames_per_second
        )))
    }
}

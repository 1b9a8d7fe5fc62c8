//! Audio device enumeration and lookup

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::AudioError;

/// Wrapper around cpal device
pub struct AudioDevice {
    inner: cpal::Device,
    pub name: String,
}

impl AudioDevice {
    pub fn from_cpal(device: cpal::Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self {
            inner: device,
            name,
        }
    }

    pub fn inner(&self) -> &cpal::Device {
        &self.inner
    }
}

/// Description of a device for listing
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    /// `input:<name>` or `output:<name>`
    pub id: String,
    pub name: String,
    pub is_input: bool,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// List all available audio devices
pub fn list_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let default_input_name = host.default_input_device().and_then(|d| d.name().ok());
    let default_output_name = host.default_output_device().and_then(|d| d.name().ok());

    if let Ok(input_devices) = host.input_devices() {
        for device in input_devices {
            if let Ok(name) = device.name() {
                let (sample_rates, channels) = get_device_capabilities(&device, true);
                devices.push(AudioDeviceInfo {
                    id: format!("input:{}", name),
                    is_default: default_input_name.as_ref() == Some(&name),
                    name,
                    is_input: true,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            if let Ok(name) = device.name() {
                let (sample_rates, channels) = get_device_capabilities(&device, false);
                devices.push(AudioDeviceInfo {
                    id: format!("output:{}", name),
                    is_default: default_output_name.as_ref() == Some(&name),
                    name,
                    is_input: false,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    devices
}

/// Get device capabilities
fn get_device_capabilities(device: &cpal::Device, is_input: bool) -> (Vec<u32>, Vec<u16>) {
    let configs: Vec<cpal::SupportedStreamConfigRange> = if is_input {
        device
            .supported_input_configs()
            .map(|iter| iter.collect())
            .unwrap_or_default()
    } else {
        device
            .supported_output_configs()
            .map(|iter| iter.collect())
            .unwrap_or_default()
    };

    let mut sample_rates = Vec::new();
    let mut channels = Vec::new();
    for config in configs {
        for rate_val in [8000u32, 16000, 22050, 44100, 48000, 96000] {
            let rate = cpal::SampleRate(rate_val);
            if rate >= config.min_sample_rate()
                && rate <= config.max_sample_rate()
                && !sample_rates.contains(&rate_val)
            {
                sample_rates.push(rate_val);
            }
        }
        if !channels.contains(&config.channels()) {
            channels.push(config.channels());
        }
    }

    sample_rates.sort();
    channels.sort();
    (sample_rates, channels)
}

/// Whether the device can open a stream with this channel count and rate
pub fn supports_format(device: &cpal::Device, is_input: bool, channels: u16, rate: u32) -> bool {
    let rate = cpal::SampleRate(rate);
    let matches = |config: cpal::SupportedStreamConfigRange| {
        config.channels() == channels
            && rate >= config.min_sample_rate()
            && rate <= config.max_sample_rate()
    };
    if is_input {
        device
            .supported_input_configs()
            .map(|mut configs| configs.any(matches))
            .unwrap_or(false)
    } else {
        device
            .supported_output_configs()
            .map(|mut configs| configs.any(matches))
            .unwrap_or(false)
    }
}

/// Get a device by its ID
pub fn get_device_by_id(id: &str) -> Result<AudioDevice, AudioError> {
    let host = cpal::default_host();

    let devices = if let Some(name) = id.strip_prefix("output:") {
        host.output_devices().map(|d| (name, d.collect::<Vec<_>>()))
    } else {
        let name = id.strip_prefix("input:").unwrap_or(id);
        host.input_devices().map(|d| (name, d.collect::<Vec<_>>()))
    };
    let (name, devices) = devices.map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;

    devices
        .into_iter()
        .find(|device| device.name().map(|n| n == name).unwrap_or(false))
        .map(AudioDevice::from_cpal)
        .ok_or_else(|| AudioError::DeviceNotFound(id.to_string()))
}

/// Get default input device
pub fn get_default_input_device() -> Result<AudioDevice, AudioError> {
    cpal::default_host()
        .default_input_device()
        .map(AudioDevice::from_cpal)
        .ok_or_else(|| AudioError::DeviceNotFound("No default input device".to_string()))
}

/// Get default output device
pub fn get_default_output_device() -> Result<AudioDevice, AudioError> {
    cpal::default_host()
        .default_output_device()
        .map(AudioDevice::from_cpal)
        .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()))
}

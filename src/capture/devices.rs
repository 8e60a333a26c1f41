//! Device enumeration
//!
//! Cameras are listed through nokhwa, microphones through cpal.

use cpal::traits::{DeviceTrait, HostTrait};
use nokhwa::utils::{ApiBackend, CameraIndex};

use super::traits::{AudioDeviceInfo, CameraInfo, Resolution};

/// Get list of available cameras
pub fn get_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| {
                let id = match info.index() {
                    CameraIndex::Index(i) => i.to_string(),
                    CameraIndex::String(s) => s.to_string(),
                };

                CameraInfo {
                    id,
                    name: info.human_name().to_string(),
                    supported_resolutions: common_resolutions(),
                }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

fn common_resolutions() -> Vec<Resolution> {
    vec![
        Resolution {
            width: 1920,
            height: 1080,
        },
        Resolution {
            width: 1280,
            height: 720,
        },
        Resolution {
            width: 640,
            height: 480,
        },
    ]
}

/// Get list of available audio input devices (microphones)
pub fn get_audio_input_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host
        .default_input_device()
        .and_then(|device| device.name().ok());

    let devices = match host.input_devices() {
        Ok(devices) => devices,
        Err(e) => {
            tracing::warn!("Failed to enumerate audio input devices: {}", e);
            return Vec::new();
        }
    };

    devices
        .filter_map(|device| device.name().ok())
        .map(|name| AudioDeviceInfo {
            id: name.clone(),
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            is_input: true,
        })
        .collect()
}

/// Whether the host has a default microphone to record from
pub fn has_default_audio_input() -> bool {
    cpal::default_host().default_input_device().is_some()
}

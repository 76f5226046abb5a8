use cpal::traits::{DeviceTrait, HostTrait};
use tracing::{debug, warn};

use super::session::AudioError;

/// Names of every output device on the default host
///
/// Virtual microphones (loopback cables) show up here too, which is why
/// both the monitor and the mic route pick from this list.
///
/// # Errors
/// Returns error if the host cannot enumerate devices
pub fn output_device_names() -> Result<Vec<String>, AudioError> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| AudioError::Devices(e.to_string()))?;

    let names: Vec<String> = devices
        .filter_map(|d| match d.name() {
            Ok(name) => Some(name),
            Err(e) => {
                warn!("skipping output device without a name: {}", e);
                None
            }
        })
        .collect();

    if names.is_empty() {
        warn!("no audio output devices found");
    }
    debug!(count = names.len(), "output devices enumerated");
    Ok(names)
}

/// Name of the host's default output device
#[must_use]
pub fn default_output_name() -> Option<String> {
    cpal::default_host()
        .default_output_device()
        .and_then(|d| d.name().ok())
}

/// Look up an output device by exact name
///
/// # Errors
/// Returns error if enumeration fails or no device matches
pub fn find_output_device(name: &str) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    host.output_devices()
        .map_err(|e| AudioError::Devices(e.to_string()))?
        .find(|d| d.name().is_ok_and(|n| n == name))
        .ok_or_else(|| AudioError::DeviceNotFound(name.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_device_not_found() {
        let result = find_output_device("soundbox-no-such-device-7f3a");
        // hosts without audio support fail to enumerate instead
        assert!(matches!(
            result,
            Err(AudioError::DeviceNotFound(_) | AudioError::Devices(_))
        ));
    }

    #[test]
    #[ignore = "requires an audio output device"]
    fn test_default_output_is_listed() {
        let default = default_output_name().unwrap();
        let names = output_device_names().unwrap();
        assert!(names.contains(&default));
    }
}

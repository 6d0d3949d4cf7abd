//! Capture device enumeration
//!
//! The core only needs to know which microphones exist, so enumeration sits
//! behind [`DeviceCatalog`]. The cpal-backed catalog is compiled with the
//! `host-audio` feature.

use crate::error::DeviceError;
use crate::protocol::AudioDeviceInfo;

/// Source of available capture devices
pub trait DeviceCatalog: Send + Sync {
    fn input_devices(&self) -> Result<Vec<AudioDeviceInfo>, DeviceError>;

    /// Check that a microphone with this name exists
    fn validate_microphone(&self, name: &str) -> Result<(), DeviceError> {
        let devices = self.input_devices()?;
        if devices.iter().any(|d| d.name == name) {
            Ok(())
        } else {
            Err(DeviceError::InvalidMicrophone(name.to_string()))
        }
    }

    /// Fails with [`DeviceError::NoMicrophone`] when nothing can capture
    fn require_microphone(&self) -> Result<(), DeviceError> {
        if self.input_devices()?.is_empty() {
            Err(DeviceError::NoMicrophone)
        } else {
            Ok(())
        }
    }
}

/// Fixed device list, for hosts that enumerate devices themselves
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceCatalog {
    devices: Vec<AudioDeviceInfo>,
}

impl StaticDeviceCatalog {
    pub fn new(devices: Vec<AudioDeviceInfo>) -> Self {
        Self { devices }
    }

    /// Catalog of input devices by name; the first one is the default
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let devices = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| AudioDeviceInfo::input(name, i == 0))
            .collect();
        Self { devices }
    }
}

impl DeviceCatalog for StaticDeviceCatalog {
    fn input_devices(&self) -> Result<Vec<AudioDeviceInfo>, DeviceError> {
        Ok(self.devices.iter().filter(|d| d.is_input).cloned().collect())
    }
}

#[cfg(feature = "host-audio")]
pub use host::HostDeviceCatalog;

#[cfg(feature = "host-audio")]
mod host {
    use cpal::traits::{DeviceTrait, HostTrait};

    use super::DeviceCatalog;
    use crate::error::DeviceError;
    use crate::protocol::AudioDeviceInfo;

    /// Catalog backed by the default cpal host
    #[derive(Debug, Default)]
    pub struct HostDeviceCatalog;

    impl DeviceCatalog for HostDeviceCatalog {
        fn input_devices(&self) -> Result<Vec<AudioDeviceInfo>, DeviceError> {
            let host = cpal::default_host();
            let default_name = host.default_input_device().and_then(|d| d.name().ok());

            let devices = host
                .input_devices()
                .map_err(|e| DeviceError::Enumeration(e.to_string()))?;

            Ok(devices
                .filter_map(|device| device.name().ok())
                .map(|name| {
                    let is_default = default_name.as_ref() == Some(&name);
                    AudioDeviceInfo::input(name, is_default)
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_microphone() {
        let catalog = StaticDeviceCatalog::from_names(["Built-in", "USB Mic"]);

        assert!(catalog.validate_microphone("USB Mic").is_ok());
        assert_eq!(
            catalog.validate_microphone("Headset"),
            Err(DeviceError::InvalidMicrophone("Headset".to_string()))
        );
        assert!(catalog.require_microphone().is_ok());
    }

    #[test]
    fn test_no_microphone() {
        let catalog = StaticDeviceCatalog::default();
        assert_eq!(catalog.require_microphone(), Err(DeviceError::NoMicrophone));
    }

    #[test]
    fn test_first_device_is_default() {
        let catalog = StaticDeviceCatalog::from_names(["A", "B"]);
        let devices = catalog.input_devices().unwrap();
        assert!(devices[0].is_default);
        assert!(!devices[1].is_default);
        assert_eq!(devices[1].id, "input:B");
    }
}

//! Capture endpoint lookup via the MMDevice API.

use windows::core::*;
use windows::Win32::Devices::FunctionDiscovery::*;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::StructuredStorage::PropVariantClear;
use windows::Win32::System::Com::*;
use windows::Win32::System::Variant::*;

use crate::error::WasapiError;
use crate::source_role::EndpointRole;

/// One active capture endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDevice {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    /// Hands-free Bluetooth endpoints usually capture at 8 or 16 kHz.
    pub is_bluetooth: bool,
}

/// Capture endpoint enumerator using the Windows MMDevice API.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    /// Requires COM to be initialized on the calling thread.
    pub fn new() -> std::result::Result<Self, WasapiError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| WasapiError::api("CoCreateInstance(MMDeviceEnumerator)", e))?;
            Ok(Self { enumerator })
        }
    }

    /// Default capture endpoint for `role`.
    pub fn default_device(&self, role: EndpointRole) -> std::result::Result<IMMDevice, WasapiError> {
        let role = match role {
            EndpointRole::Console => eConsole,
            EndpointRole::Multimedia => eMultimedia,
            EndpointRole::Communications => eCommunications,
        };
        unsafe {
            self.enumerator
                .GetDefaultAudioEndpoint(eCapture, role)
                .map_err(|e| WasapiError::api("GetDefaultAudioEndpoint", e))
        }
    }

    pub fn device_by_id(&self, id: &str) -> std::result::Result<IMMDevice, WasapiError> {
        let wide_id: Vec<u16> = id.encode_utf16().chain(std::iter::once(0)).collect();
        unsafe {
            self.enumerator
                .GetDevice(PCWSTR(wide_id.as_ptr()))
                .map_err(|e| WasapiError::api("IMMDeviceEnumerator::GetDevice", e))
        }
    }

    /// List active capture (microphone) endpoints.
    pub fn list_capture_devices(&self) -> std::result::Result<Vec<CaptureDevice>, WasapiError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(eCapture, DEVICE_STATE_ACTIVE)
                .map_err(|e| WasapiError::api("EnumAudioEndpoints", e))?;
            let count = collection
                .GetCount()
                .map_err(|e| WasapiError::api("IMMDeviceCollection::GetCount", e))?;

            let default_id = self
                .default_device(EndpointRole::Console)
                .ok()
                .and_then(|d| d.GetId().ok())
                .and_then(|id| id.to_string().ok());

            let mut devices = Vec::new();
            for i in 0..count {
                let Ok(device) = collection.Item(i) else {
                    continue;
                };
                let id = match device.GetId() {
                    Ok(id) => id.to_string().unwrap_or_default(),
                    Err(_) => continue,
                };

                let name = read_string_property(&device, &PKEY_Device_FriendlyName)
                    .unwrap_or_else(|| format!("Capture device {}", i));
                let enumerator_name = read_string_property(&device, &PKEY_Device_EnumeratorName).unwrap_or_default();

                devices.push(CaptureDevice {
                    is_default: default_id.as_deref() == Some(id.as_str()),
                    is_bluetooth: is_bluetooth(&id, &enumerator_name),
                    id,
                    name,
                });
            }
            Ok(devices)
        }
    }
}

fn is_bluetooth(device_id: &str, enumerator_name: &str) -> bool {
    let id = device_id.to_lowercase();
    enumerator_name.contains("BTHENUM")
        || enumerator_name.contains("BTHLEENUM")
        || id.contains("bthenum")
        || id.contains("bluetooth")
}

/// Read a `VT_LPWSTR` property from the device property store.
fn read_string_property(device: &IMMDevice, key: &PROPERTYKEY) -> Option<String> {
    unsafe {
        let store = device.OpenPropertyStore(STGM_READ).ok()?;

        let mut prop_variant = std::mem::zeroed::<PROPVARIANT>();
        store.GetValue(key, &mut prop_variant).ok()?;

        let value = if prop_variant.Anonymous.Anonymous.vt == VT_LPWSTR {
            let pwsz = prop_variant.Anonymous.Anonymous.Anonymous.pwszVal;
            if pwsz.is_null() {
                None
            } else {
                let len = (0..).take_while(|&i| *pwsz.offset(i) != 0).count();
                Some(String::from_utf16_lossy(std::slice::from_raw_parts(pwsz, len)))
            }
        } else {
            None
        };

        PropVariantClear(&mut prop_variant).ok();
        value
    }
}

//! Windows microphone privacy check.
//!
//! On Windows 10 1803+ microphone access is controlled by the global toggle at
//! Settings > Privacy > Microphone. Unpackaged desktop apps get no consent
//! prompt, so a disabled toggle only shows up as a failing activation.

use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use crate::device_enumerator::DeviceEnumerator;
use crate::error::WasapiError;
use crate::source_role::EndpointRole;

const E_ACCESSDENIED: i32 = -2147024891;
const AUDCLNT_E_DEVICE_IN_USE: i32 = -2004287478;

/// Whether the default microphone can be activated.
///
/// Requires COM to be initialized on the calling thread. A machine without
/// any capture endpoint reports `false`.
pub fn check_microphone_permission(enumerator: &DeviceEnumerator) -> std::result::Result<bool, WasapiError> {
    let Ok(device) = enumerator.default_device(EndpointRole::Console) else {
        return Ok(false);
    };

    let result: windows::core::Result<IAudioClient> = unsafe { device.Activate(CLSCTX_ALL, None) };
    match result {
        Ok(_) => Ok(true),
        Err(e) => {
            let code = e.code().0;
            if code == E_ACCESSDENIED || code == AUDCLNT_E_DEVICE_IN_USE {
                Ok(false)
            } else {
                log::warn!("unexpected error checking microphone access: {}", e);
                Ok(true)
            }
        }
    }
}

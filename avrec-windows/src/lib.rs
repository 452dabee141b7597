//! # avrec-windows
//!
//! Windows WASAPI capture backend for avrec.
//!
//! Provides:
//! - `WasapiAudioInput`: `AudioInput` over a WASAPI capture endpoint, resolving
//!   each audio source kind to an endpoint role
//! - `DeviceEnumerator`: capture endpoint lookup via the MMDevice API
//! - `permissions`: Windows microphone privacy check
//! - `PcmConverter`: device mix format to 16-bit encoder PCM
//!
//! ## Platform Requirements
//! - Windows 10 1803+ for the microphone privacy toggle
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use avrec_core::{AudioEncoderConfig, Recorder};
//! use avrec_windows::WasapiAudioInput;
//!
//! recorder.add_audio(AudioEncoderConfig::default(), Arc::new(WasapiAudioInput::default_device()))?;
//! ```

pub mod convert;
pub mod error;
pub mod source_role;

#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod permissions;
#[cfg(target_os = "windows")]
pub mod wasapi_input;

pub use convert::PcmConverter;
pub use error::WasapiError;
pub use source_role::EndpointRole;

#[cfg(target_os = "windows")]
pub use device_enumerator::{CaptureDevice, DeviceEnumerator};
#[cfg(target_os = "windows")]
pub use wasapi_input::{WasapiAudioInput, WasapiPcmReader};

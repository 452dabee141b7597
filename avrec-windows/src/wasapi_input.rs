//! WASAPI microphone input.
//!
//! Opens a capture endpoint in shared mode on the calling thread (the audio
//! encoder's sampler thread) and converts the device mix format to the
//! 16-bit PCM the encoder asks for.

use std::thread;
use std::time::Duration;

use windows::core::*;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::*;

use avrec_core::models::error::RecorderError;
use avrec_core::models::stream::{AudioSourceKind, PcmFormat};
use avrec_core::traits::audio_input::{AudioInput, PcmReader};

use crate::convert::PcmConverter;
use crate::device_enumerator::{CaptureDevice, DeviceEnumerator};
use crate::error::WasapiError;
use crate::permissions;
use crate::source_role::EndpointRole;

/// Packet poll interval while waiting for a full chunk.
const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Polls before a read returns whatever whole frames are buffered.
const MAX_POLLS_PER_READ: u32 = 50;

/// WASAPI-backed [`AudioInput`].
///
/// With no explicit device, each [`AudioSourceKind`] resolves to the default
/// capture endpoint of its role.
pub struct WasapiAudioInput {
    device_id: Option<String>,
}

impl WasapiAudioInput {
    /// Resolve endpoints by role when opening.
    pub fn default_device() -> Self {
        Self { device_id: None }
    }

    /// Always open the endpoint with this device ID.
    pub fn with_device(id: String) -> Self {
        Self { device_id: Some(id) }
    }

    /// List active capture endpoints.
    pub fn available_devices() -> std::result::Result<Vec<CaptureDevice>, WasapiError> {
        let _com = ComGuard::init()?;
        DeviceEnumerator::new()?.list_capture_devices()
    }

    fn open_reader(
        &self,
        source: AudioSourceKind,
        format: &PcmFormat,
        buffer_size: usize,
    ) -> std::result::Result<WasapiPcmReader, WasapiError> {
        let com = ComGuard::init()?;
        let enumerator = DeviceEnumerator::new()?;

        if EndpointRole::needs_permission_check(source) && !permissions::check_microphone_permission(&enumerator)? {
            return Err(WasapiError::AccessDenied);
        }

        let device = match &self.device_id {
            Some(id) => enumerator.device_by_id(id)?,
            None => enumerator
                .default_device(EndpointRole::for_source(source))
                .map_err(|_| WasapiError::DeviceNotFound(source))?,
        };

        unsafe {
            let audio_client: IAudioClient = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| WasapiError::api("IMMDevice::Activate", e))?;

            let mix_format_ptr = audio_client
                .GetMixFormat()
                .map_err(|e| WasapiError::api("IAudioClient::GetMixFormat", e))?;
            let mix_format = &*mix_format_ptr;
            let device_rate = mix_format.nSamplesPerSec;
            let device_channels = mix_format.nChannels;
            let bits = mix_format.wBitsPerSample;

            // shared mode mix format is Float32
            let checked = if bits != 32 {
                Err(WasapiError::UnsupportedFormat(format!("{} bit mix format", bits)))
            } else {
                PcmConverter::new(device_rate, device_channels, *format)
            };

            let initialized = checked.and_then(|converter| {
                audio_client
                    .Initialize(
                        AUDCLNT_SHAREMODE_SHARED,
                        AUDCLNT_STREAMFLAGS_NOPERSIST,
                        buffer_duration(buffer_size, format),
                        0,
                        mix_format,
                        None,
                    )
                    .map_err(|e| WasapiError::api("IAudioClient::Initialize", e))?;
                Ok(converter)
            });
            CoTaskMemFree(Some(mix_format_ptr as *const _ as *const _));
            let converter = initialized?;

            let capture_client: IAudioCaptureClient = audio_client
                .GetService()
                .map_err(|e| WasapiError::api("IAudioClient::GetService", e))?;

            log::debug!(
                "{:?} source opened: device {} Hz x{}, encoder {} Hz x{}",
                source,
                device_rate,
                device_channels,
                format.sample_rate,
                format.channels
            );

            Ok(WasapiPcmReader {
                capture_client,
                audio_client,
                converter,
                device_channels: device_channels as usize,
                started: false,
                _com: com,
            })
        }
    }
}

impl Default for WasapiAudioInput {
    fn default() -> Self {
        Self::default_device()
    }
}

impl AudioInput for WasapiAudioInput {
    /// 100 ms of audio, the shared-mode engine period WASAPI buffers at least.
    fn min_buffer_size(&self, format: &PcmFormat) -> Option<usize> {
        Some(format.sample_rate as usize / 10 * format.bytes_per_frame())
    }

    fn open(
        &self,
        source: AudioSourceKind,
        format: &PcmFormat,
        buffer_size: usize,
    ) -> std::result::Result<Box<dyn PcmReader>, RecorderError> {
        let reader = self.open_reader(source, format, buffer_size)?;
        Ok(Box::new(reader))
    }
}

/// Requested endpoint buffer in 100-nanosecond units.
fn buffer_duration(buffer_size: usize, format: &PcmFormat) -> i64 {
    let frames = buffer_size / format.bytes_per_frame().max(1);
    (frames as i64 * 10_000_000) / format.sample_rate.max(1) as i64
}

/// Polling reader over an initialized capture client.
///
/// COM objects live on the thread that opened them; the guard is dropped
/// last so COM is still initialized while they are released.
pub struct WasapiPcmReader {
    capture_client: IAudioCaptureClient,
    audio_client: IAudioClient,
    converter: PcmConverter,
    device_channels: usize,
    started: bool,
    _com: ComGuard,
}

impl WasapiPcmReader {
    /// Move every queued device packet into the converter.
    fn pull_packets(&mut self) -> std::result::Result<(), WasapiError> {
        unsafe {
            let mut packet_length: u32 = 0;
            self.capture_client
                .GetNextPacketSize(&mut packet_length)
                .map_err(|e| WasapiError::api("GetNextPacketSize", e))?;

            while packet_length > 0 {
                let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
                let mut num_frames: u32 = 0;
                let mut flags: u32 = 0;

                self.capture_client
                    .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                    .map_err(|e| WasapiError::api("GetBuffer", e))?;

                if num_frames > 0 {
                    if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 || buffer_ptr.is_null() {
                        self.converter.push_silence(num_frames as usize);
                    } else {
                        let total_samples = num_frames as usize * self.device_channels;
                        let samples = std::slice::from_raw_parts(buffer_ptr as *const f32, total_samples);
                        self.converter.push(samples);
                    }
                }

                self.capture_client
                    .ReleaseBuffer(num_frames)
                    .map_err(|e| WasapiError::api("ReleaseBuffer", e))?;

                self.capture_client
                    .GetNextPacketSize(&mut packet_length)
                    .map_err(|e| WasapiError::api("GetNextPacketSize", e))?;
            }
        }
        Ok(())
    }
}

impl PcmReader for WasapiPcmReader {
    fn start(&mut self) -> std::result::Result<(), RecorderError> {
        if self.started {
            return Ok(());
        }
        unsafe {
            // real-time priority for the sampler thread
            let mut task_index: u32 = 0;
            let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
            let _mmcss_handle = AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index);

            self.audio_client
                .Start()
                .map_err(|e| WasapiError::api("IAudioClient::Start", e))?;
        }
        self.started = true;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> std::result::Result<usize, RecorderError> {
        for _ in 0..MAX_POLLS_PER_READ {
            let n = self.converter.read_chunk(buf);
            if n > 0 {
                return Ok(n);
            }
            thread::sleep(POLL_INTERVAL);
            self.pull_packets()?;
        }
        Ok(self.converter.read_partial(buf))
    }

    fn stop(&mut self) {
        if !self.started {
            return;
        }
        unsafe {
            if let Err(e) = self.audio_client.Stop() {
                log::warn!("IAudioClient::Stop failed: {}", e);
            }
        }
        self.started = false;
    }
}

impl Drop for WasapiPcmReader {
    fn drop(&mut self) {
        self.stop();
    }
}

/// RAII guard pairing `CoInitializeEx` with `CoUninitialize`.
pub(crate) struct ComGuard;

impl ComGuard {
    pub(crate) fn init() -> std::result::Result<Self, WasapiError> {
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|e| WasapiError::ComInit(e.to_string()))?;
        }
        Ok(Self)
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}

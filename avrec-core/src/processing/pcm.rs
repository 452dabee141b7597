//! 16-bit PCM helpers shared by capture backends.

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let frame_count = samples.len() / channels;
    let scale = 1.0 / channels as f32;
    let mut mono = Vec::with_capacity(frame_count);
    for frame in samples.chunks_exact(channels) {
        mono.push(frame.iter().sum::<f32>() * scale);
    }
    mono
}

/// Duplicate mono samples into interleaved stereo `[L0, R0, L1, R1, ...]`.
pub fn mono_to_stereo(samples: &[f32]) -> Vec<f32> {
    samples.iter().flat_map(|&s| [s, s]).collect()
}

/// Linear interpolation resampling for mono audio.
///
/// Returns the input unchanged if the rates match.
pub fn resample(samples: &[f32], source_rate: f64, target_rate: f64) -> Vec<f32> {
    if (source_rate - target_rate).abs() < 0.01 || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = target_rate / source_rate;
    let output_count = (samples.len() as f64 * ratio) as usize;

    let mut output = vec![0.0f32; output_count];
    for (i, sample) in output.iter_mut().enumerate() {
        let source_index = i as f64 / ratio;
        let index = source_index as usize;
        let fraction = (source_index - index as f64) as f32;

        if index + 1 < samples.len() {
            *sample = samples[index] * (1.0 - fraction) + samples[index + 1] * fraction;
        } else if index < samples.len() {
            *sample = samples[index];
        }
    }
    output
}

/// Convert f32 samples `[-1.0, 1.0]` to 16-bit little-endian PCM. Clamps.
pub fn to_int16_le(samples: &[f32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        data.extend_from_slice(&value.to_le_bytes());
    }
    data
}

/// A zeroed chunk of `len` bytes: silence in signed 16-bit PCM.
pub fn silence(len: usize) -> Vec<u8> {
    vec![0u8; len]
}

//! Device mix format to encoder PCM conversion.
//!
//! WASAPI shared mode delivers interleaved Float32 at the device rate and
//! channel count. The encoder wants 16-bit little-endian PCM in fixed-size
//! chunks, so converted bytes are buffered until a full chunk is available.

use std::collections::VecDeque;

use avrec_core::models::stream::PcmFormat;
use avrec_core::processing::pcm;

use crate::error::WasapiError;

pub struct PcmConverter {
    source_rate: u32,
    source_channels: u16,
    target: PcmFormat,
    pending: VecDeque<u8>,
}

impl PcmConverter {
    pub fn new(source_rate: u32, source_channels: u16, target: PcmFormat) -> Result<Self, WasapiError> {
        if source_rate == 0 || source_channels == 0 {
            return Err(WasapiError::UnsupportedFormat(format!(
                "{} Hz, {} channel(s)",
                source_rate, source_channels
            )));
        }
        if target.bits_per_sample != 16 || !(1..=2).contains(&target.channels) {
            return Err(WasapiError::UnsupportedFormat(format!(
                "target {} bit, {} channel(s)",
                target.bits_per_sample, target.channels
            )));
        }
        Ok(Self {
            source_rate,
            source_channels,
            target,
            pending: VecDeque::new(),
        })
    }

    /// Converted bytes waiting to be read.
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    /// Convert one interleaved device packet and buffer the result.
    pub fn push(&mut self, samples: &[f32]) {
        let channels = self.split_channels(samples);
        let (source_rate, target_rate) = (self.source_rate as f64, self.target.sample_rate as f64);
        let channels: Vec<Vec<f32>> = channels
            .iter()
            .map(|ch| pcm::resample(ch, source_rate, target_rate))
            .collect();

        let interleaved = match channels.as_slice() {
            [mono] => mono.clone(),
            [left, right] => left.iter().zip(right).flat_map(|(&l, &r)| [l, r]).collect(),
            _ => Vec::new(),
        };
        self.pending.extend(pcm::to_int16_le(&interleaved));
    }

    /// Push a silent packet of `frames` device frames.
    pub fn push_silence(&mut self, frames: usize) {
        self.push(&vec![0.0; frames * self.source_channels as usize]);
    }

    /// Fill `buf` if enough bytes are buffered. Returns the bytes copied
    /// (either `buf.len()` or 0).
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> usize {
        if self.pending.len() < buf.len() {
            return 0;
        }
        let len = buf.len();
        for (dst, src) in buf.iter_mut().zip(self.pending.drain(..len)) {
            *dst = src;
        }
        len
    }

    /// Take whatever is buffered, truncated to whole frames.
    pub fn read_partial(&mut self, buf: &mut [u8]) -> usize {
        let frame = self.target.bytes_per_frame();
        let len = self.pending.len().min(buf.len()) / frame * frame;
        for (dst, src) in buf.iter_mut().zip(self.pending.drain(..len)) {
            *dst = src;
        }
        len
    }

    fn split_channels(&self, samples: &[f32]) -> Vec<Vec<f32>> {
        let source = self.source_channels as usize;
        match (self.target.channels, source) {
            (1, _) => vec![pcm::downmix_to_mono(samples, source)],
            (_, 1) => {
                let stereo = pcm::mono_to_stereo(samples);
                vec![
                    stereo.iter().step_by(2).copied().collect(),
                    stereo.iter().skip(1).step_by(2).copied().collect(),
                ]
            }
            _ => (0..2)
                .map(|c| samples.iter().skip(c).step_by(source).copied().collect())
                .collect(),
        }
    }
}

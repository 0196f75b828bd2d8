//! Framing transforms between device audio/video and endpoint media chunks.
//!
//! Outbound: device-rate interleaved f32 capture frames are downmixed to
//! mono, resampled to 16 kHz, quantized to 16-bit signed little-endian PCM
//! and base64-encoded.  Inbound: 24 kHz PCM16 payloads are decoded back to
//! f32 samples for playback.  Video frames are JPEG-encoded at moderate
//! quality.

use base64::prelude::*;
use image::codecs::jpeg::JpegEncoder;
use image::ImageEncoder;

use dollclub_shared::constants::{JPEG_QUALITY, SEND_SAMPLE_RATE};
use dollclub_shared::error::MediaError;
use dollclub_shared::protocol::MediaChunk;

/// Average interleaved multi-channel samples down to mono.
pub fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let ch = channels as usize;
    interleaved
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear-interpolation mono resampler.
pub fn resample(input: &[f32], from_hz: u32, to_hz: u32) -> Vec<f32> {
    if from_hz == to_hz || input.is_empty() {
        return input.to_vec();
    }

    let ratio = from_hz as f64 / to_hz as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let idx = pos as usize;
        let frac = (pos - idx as f64) as f32;
        let a = input[idx];
        let b = input.get(idx + 1).copied().unwrap_or(a);
        out.push(a + (b - a) * frac);
    }

    out
}

/// Quantize f32 samples to 16-bit signed little-endian PCM.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Decode 16-bit signed little-endian PCM to f32 samples.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / i16::MAX as f32)
        .collect()
}

/// Package one captured audio frame as an outbound media chunk.
///
/// `samples` are interleaved at the device format; the result is 16 kHz mono
/// PCM16, base64-encoded, tagged `audio/pcm;rate=16000`.
pub fn encode_audio_chunk(samples: &[f32], sample_rate: u32, channels: u16) -> MediaChunk {
    let mono = downmix(samples, channels);
    let resampled = resample(&mono, sample_rate, SEND_SAMPLE_RATE);
    let pcm = encode_pcm16(&resampled);
    MediaChunk::audio(BASE64_STANDARD.encode(pcm))
}

/// Decode an inbound base64 PCM16 payload into playback samples.
pub fn decode_audio_chunk(data: &str) -> Result<Vec<f32>, base64::DecodeError> {
    let bytes = BASE64_STANDARD.decode(data)?;
    Ok(decode_pcm16(&bytes))
}

/// Encode one RGB frame as a base64 JPEG media chunk.
pub fn encode_jpeg_frame(rgb: &[u8], width: u32, height: u32) -> Result<MediaChunk, MediaError> {
    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
    encoder
        .write_image(rgb, width, height, image::ExtendedColorType::Rgb8)
        .map_err(|e| MediaError::Encode(e.to_string()))?;
    Ok(MediaChunk::jpeg(BASE64_STANDARD.encode(jpeg)))
}

use base64::Engine;
use bytes::Bytes;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

// Sample rates used on each side of the bridge.
pub const ROOM_PCM16_SAMPLE_RATE: u32 = 16000;
pub const GEMINI_LIVE_INPUT_SAMPLE_RATE: u32 = 16000;
pub const GEMINI_LIVE_OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Bytes of 100ms of mono PCM16 audio at the room rate.
pub const ROOM_FRAME_BYTES: usize = (ROOM_PCM16_SAMPLE_RATE as usize / 10) * 2;

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,                     // No cutoff frequency, pass all frequencies
        PolynomialDegree::Cubic, // Cubic interpolation for quality
        chunk_size,
        1, // 1 channel (mono)
    )?;
    Ok(resampler)
}

/// A mono resampler fed with arbitrarily sized chunks.
///
/// Samples that do not fill a whole resampler frame are kept until the next
/// call, so no audio is dropped between provider messages.
pub struct StreamResampler {
    inner: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(in_rate: u32, out_rate: u32, chunk_size: usize) -> anyhow::Result<Self> {
        let inner = if in_rate == out_rate {
            None
        } else {
            Some(create_resampler(in_rate as f64, out_rate as f64, chunk_size)?)
        };
        Ok(Self {
            inner,
            pending: Vec::new(),
        })
    }

    /// Resamples as many whole frames of `samples` (plus leftovers) as possible.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.inner.as_mut() else {
            return samples.to_vec();
        };
        self.pending.extend_from_slice(samples);

        let mut out = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let frame: Vec<f32> = self.pending.drain(..needed).collect();
            match resampler.process(&[frame], None) {
                Ok(res) => out.extend_from_slice(&res[0]),
                Err(e) => {
                    tracing::error!("Failed to resample audio frame: {}", e);
                    break;
                }
            }
        }
        out
    }
}

/// Decodes a base64 string representing PCM16 audio into a vector of f32 samples.
pub fn decode_f32_from_base64_i16(base64_fragment: &str) -> Vec<f32> {
    if let Ok(pcm16_bytes) = base64::engine::general_purpose::STANDARD.decode(base64_fragment) {
        pcm16_bytes_to_f32(&pcm16_bytes)
    } else {
        tracing::error!("Failed to decode base64 fragment to f32");
        Vec::new()
    }
}

/// Interprets little-endian PCM16 bytes as samples normalised to -1.0..=1.0.
/// A trailing odd byte is ignored.
pub fn pcm16_bytes_to_f32(pcm16_bytes: &[u8]) -> Vec<f32> {
    pcm16_bytes
        .chunks_exact(2)
        .map(|chunk| {
            let v = i16::from_le_bytes([chunk[0], chunk[1]]);
            (v as f32 / 32768.0).clamp(-1.0, 1.0)
        })
        .collect()
}

/// Converts f32 samples to little-endian PCM16 bytes, clamping out-of-range values.
pub fn f32_to_pcm16_bytes(pcm32: &[f32]) -> Bytes {
    let pcm16: Vec<u8> = pcm32
        .iter()
        .flat_map(|&sample| {
            let v = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            v.to_le_bytes()
        })
        .collect();
    Bytes::from(pcm16)
}

pub fn encode_base64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

pub fn decode_base64(data: &str) -> anyhow::Result<Bytes> {
    Ok(Bytes::from(
        base64::engine::general_purpose::STANDARD.decode(data.trim())?,
    ))
}

/// Splits PCM audio into room-sized frames on sample boundaries.
pub fn frames(pcm16: &Bytes) -> impl Iterator<Item = Bytes> + '_ {
    (0..pcm16.len())
        .step_by(ROOM_FRAME_BYTES)
        .map(move |start| pcm16.slice(start..(start + ROOM_FRAME_BYTES).min(pcm16.len())))
}

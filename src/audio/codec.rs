//! G.711 mu-law <-> PCM16LE, zero-order-hold upsampling, and WAV header framing.
//!
//! These are pure, allocation-only functions - no I/O, no async - so they
//! are fully unit-testable in isolation. The mu-law tables are the
//! canonical ITU-T G.711 reference algorithm (the same shape this
//! codebase hand-rolls for small numeric kernels rather than pulling in
//! a dependency for).

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("PCM16LE buffer must have an even byte length, got {0}")]
    OddLength(usize),
}

const BIAS: i32 = 0x84;
const CLIP: i32 = 8159;
const SEG_UEND: [i32; 8] = [0x3F, 0x7F, 0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF, 0x1FFF];

fn search(val: i32, table: &[i32]) -> usize {
    for (i, &bound) in table.iter().enumerate() {
        if val <= bound {
            return i;
        }
    }
    table.len()
}

/// Encode a single linear PCM16 sample to a mu-law byte.
fn encode_sample(pcm: i16) -> u8 {
    let mut pcm_val = (pcm >> 2) as i32;
    let mask = if pcm_val < 0 {
        pcm_val = -pcm_val;
        0x7F
    } else {
        0xFF
    };
    if pcm_val > CLIP {
        pcm_val = CLIP;
    }
    pcm_val += BIAS >> 2;

    let seg = search(pcm_val, &SEG_UEND);
    if seg >= 8 {
        (0x7F ^ mask) as u8
    } else {
        let uval = ((seg as i32) << 4) | ((pcm_val >> (seg + 1)) & 0xF);
        (uval ^ mask) as u8
    }
}

/// Decode a single mu-law byte to a linear PCM16 sample.
fn decode_sample(u_val: u8) -> i16 {
    let u_val = !u_val;
    let sign = u_val & 0x80;
    let exponent = (u_val & 0x70) >> 4;
    let mantissa = u_val & 0x0F;
    let mut t = ((mantissa as i32) << 3) + BIAS;
    t <<= exponent;
    let sample = if sign != 0 { BIAS - t } else { t - BIAS };
    sample as i16
}

/// Decode a mu-law byte buffer to PCM16LE bytes (twice the input length).
pub fn mulaw_decode(buf: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buf.len() * 2);
    for &b in buf {
        out.extend_from_slice(&decode_sample(b).to_le_bytes());
    }
    out
}

/// Encode PCM16LE bytes to a mu-law byte buffer (half the input length).
pub fn mulaw_encode(pcm16_le: &[u8]) -> Result<Vec<u8>, CodecError> {
    if pcm16_le.len() % 2 != 0 {
        return Err(CodecError::OddLength(pcm16_le.len()));
    }
    let out = pcm16_le
        .chunks_exact(2)
        .map(|c| encode_sample(i16::from_le_bytes([c[0], c[1]])))
        .collect();
    Ok(out)
}

/// Zero-order-hold upsample from 8 kHz to 16 kHz: every sample is duplicated.
///
/// Chosen for minimum latency - a real interpolator would smooth the
/// spectrum but costs a lookahead window this pipeline can't afford
/// between STT frames.
pub fn upsample_8k_to_16k(pcm16_le: &[u8]) -> Result<Vec<u8>, CodecError> {
    if pcm16_le.len() % 2 != 0 {
        return Err(CodecError::OddLength(pcm16_le.len()));
    }
    let mut out = Vec::with_capacity(pcm16_le.len() * 2);
    for sample in pcm16_le.chunks_exact(2) {
        out.extend_from_slice(sample);
        out.extend_from_slice(sample);
    }
    Ok(out)
}

/// Emit a 44-byte canonical RIFF/WAVE header followed by the sample payload.
pub fn wrap_wav(pcm16_le: &[u8], sample_rate: u32, channels: u16, bits: u16) -> Vec<u8> {
    let data_size = pcm16_le.len() as u32;
    let block_align = channels * (bits / 8);
    let byte_rate = sample_rate * block_align as u32;

    let mut out = Vec::with_capacity(44 + pcm16_le.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_size).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_size.to_le_bytes());
    out.extend_from_slice(pcm16_le);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn mulaw_round_trip_within_quantisation_bound() {
        let samples: Vec<i16> = (-32768..32767i32)
            .step_by(173)
            .map(|v| v as i16)
            .collect();
        let pcm = sample_bytes(&samples);
        let encoded = mulaw_encode(&pcm).unwrap();
        let decoded = mulaw_decode(&encoded);

        let decoded_samples: Vec<i16> = decoded
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();

        let mut total_abs_err: f64 = 0.0;
        for (orig, round) in samples.iter().zip(decoded_samples.iter()) {
            total_abs_err += (*orig as f64 - *round as f64).abs();
        }
        let mean_abs_err = total_abs_err / samples.len() as f64;
        // G.711's worst-case quantisation step near full scale is large;
        // mean error over a swept range stays well under 1% of full scale.
        assert!(mean_abs_err < 327.0, "mean abs error too high: {mean_abs_err}");
    }

    #[test]
    fn mulaw_encode_rejects_odd_length() {
        assert_eq!(mulaw_encode(&[0u8, 1, 2]), Err(CodecError::OddLength(3)));
    }

    #[test]
    fn mulaw_silence_round_trips_exactly() {
        let pcm = sample_bytes(&[0i16; 4]);
        let encoded = mulaw_encode(&pcm).unwrap();
        let decoded = mulaw_decode(&encoded);
        assert_eq!(decoded, pcm);
    }

    #[test]
    fn upsample_identity_on_even_and_odd_samples() {
        let samples: Vec<i16> = vec![10, -20, 300, -4000];
        let pcm = sample_bytes(&samples);
        let up = upsample_8k_to_16k(&pcm).unwrap();
        let up_samples: Vec<i16> = up
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(up_samples.len(), samples.len() * 2);
        for (i, orig) in samples.iter().enumerate() {
            assert_eq!(up_samples[2 * i], *orig);
            assert_eq!(up_samples[2 * i + 1], *orig);
        }
    }

    #[test]
    fn wav_header_is_bit_exact() {
        let pcm = vec![0u8; 320]; // 160 samples
        let wav = wrap_wav(&pcm, 8000, 1, 16);

        assert_eq!(wav.len(), 44 + pcm.len());
        assert_eq!(&wav[0..4], b"RIFF");
        let file_size_minus_8 = u32::from_le_bytes(wav[4..8].try_into().unwrap());
        assert_eq!(file_size_minus_8, (wav.len() - 8) as u32);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u32::from_le_bytes(wav[16..20].try_into().unwrap()), 16);
        assert_eq!(u16::from_le_bytes(wav[20..22].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(wav[22..24].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 8000);
        assert_eq!(u32::from_le_bytes(wav[28..32].try_into().unwrap()), 16000);
        assert_eq!(u16::from_le_bytes(wav[32..34].try_into().unwrap()), 2);
        assert_eq!(u16::from_le_bytes(wav[34..36].try_into().unwrap()), 16);
        assert_eq!(&wav[36..40], b"data");
        let data_size = u32::from_le_bytes(wav[40..44].try_into().unwrap());
        assert_eq!(data_size, pcm.len() as u32);
    }
}

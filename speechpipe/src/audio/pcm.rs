//! Integer PCM packing and channel remixing
//!
//! Samples travel between elements as signed little-endian integers of 16, 24
//! or 32 bits. Inside the filter they are widened to `i32` so every supported
//! depth shares one code path; the depth is preserved on the way out.

/// Bit depths the format filter accepts
pub const SUPPORTED_BITS: [u16; 3] = [16, 24, 32];

pub fn is_supported_depth(bits: u16) -> bool {
    SUPPORTED_BITS.contains(&bits)
}

/// Bytes per sample for a supported depth
pub fn sample_bytes(bits: u16) -> usize {
    usize::from(bits / 8)
}

/// Inclusive value range of a signed sample of `bits` bits
pub fn sample_range(bits: u16) -> (i64, i64) {
    let half = 1i64 << (bits - 1);
    (-half, half - 1)
}

/// Unpack whole little-endian samples; a trailing partial sample is ignored
pub fn decode(bytes: &[u8], bits: u16, out: &mut Vec<i32>) {
    let width = sample_bytes(bits);
    out.reserve(bytes.len() / width);
    for chunk in bytes.chunks_exact(width) {
        let sample = match width {
            2 => i32::from(i16::from_le_bytes([chunk[0], chunk[1]])),
            // Sign-extend from bit 23
            3 => i32::from_le_bytes([0, chunk[0], chunk[1], chunk[2]]) >> 8,
            _ => i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
        };
        out.push(sample);
    }
}

/// Pack samples as little-endian integers, saturating to the depth's range
pub fn encode(samples: &[i32], bits: u16, out: &mut Vec<u8>) {
    let width = sample_bytes(bits);
    let (min, max) = sample_range(bits);
    out.reserve(samples.len() * width);
    for &sample in samples {
        let clamped = i64::from(sample).clamp(min, max) as i32;
        out.extend_from_slice(&clamped.to_le_bytes()[..width]);
    }
}

/// Round and saturate a floating-point sample back to the integer range
pub fn quantize(value: f64, bits: u16) -> i32 {
    let (min, max) = sample_range(bits);
    value.round().clamp(min as f64, max as f64) as i32
}

/// Change the channel count of interleaved samples
///
/// Widening copies source channel `c % src` into destination channel `c`, so
/// mono is duplicated across every output channel. Narrowing averages every
/// source channel `j` with `j % dst == c` into destination channel `c`.
pub fn remix(samples: &[i32], src_channels: usize, dst_channels: usize) -> Vec<i32> {
    if src_channels == dst_channels || src_channels == 0 || dst_channels == 0 {
        return samples.to_vec();
    }

    let frames = samples.len() / src_channels;
    let mut out = Vec::with_capacity(frames * dst_channels);

    for frame in samples.chunks_exact(src_channels) {
        if dst_channels > src_channels {
            out.extend((0..dst_channels).map(|c| frame[c % src_channels]));
        } else {
            for c in 0..dst_channels {
                let (sum, count) = frame
                    .iter()
                    .skip(c)
                    .step_by(dst_channels)
                    .fold((0i64, 0i64), |(sum, count), &s| (sum + i64::from(s), count + 1));
                out.push((sum / count) as i32);
            }
        }
    }

    out
}

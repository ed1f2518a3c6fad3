//! Producer-side sample format shim.
//!
//! Emulated sound hardware hands out blocks in whatever format the guest OS
//! picked (8-bit unsigned, 16-bit signed, 32-bit float; mono or stereo). The
//! ring only stores interleaved signed 16-bit stereo, so blocks are converted
//! here before they are pushed. No rate conversion happens.

use super::CHANNELS;

/// A block of producer samples in its native encoding.
#[derive(Copy, Clone, Debug)]
pub enum SampleBlock<'a> {
    /// Unsigned 8-bit, 128 is silence.
    U8(&'a [u8]),
    /// Signed 16-bit, native endian.
    S16(&'a [i16]),
    /// 32-bit float in [-1, 1].
    F32(&'a [f32]),
}

impl SampleBlock<'_> {
    fn len(&self) -> usize {
        match self {
            SampleBlock::U8(s) => s.len(),
            SampleBlock::S16(s) => s.len(),
            SampleBlock::F32(s) => s.len(),
        }
    }

    /// Frames contained in the block for the given channel count.
    pub fn frames(&self, channels: usize) -> usize {
        if channels == 0 {
            0
        } else {
            self.len() / channels
        }
    }
}

#[inline]
fn from_u8(v: u8) -> i16 {
    ((v as i16) - 128) << 8
}

#[inline]
fn from_f32(v: f32) -> i16 {
    (v.clamp(-1.0, 1.0) * 32767.0) as i16
}

/// Append `block` to `out` as interleaved s16 stereo and return the frame count.
///
/// Mono is duplicated to both channels. A channel count other than 1 or 2
/// produces silence of the same length so the stream keeps its timing.
pub fn to_s16_stereo(block: SampleBlock<'_>, channels: usize, out: &mut Vec<i16>) -> usize {
    let frames = block.frames(channels.max(1));
    out.reserve(frames * CHANNELS);

    match (block, channels) {
        (SampleBlock::S16(s), 2) => out.extend_from_slice(&s[..frames * 2]),
        (SampleBlock::S16(s), 1) => out.extend(s.iter().flat_map(|&v| [v, v])),
        (SampleBlock::U8(s), 2) => out.extend(s[..frames * 2].iter().map(|&v| from_u8(v))),
        (SampleBlock::U8(s), 1) => out.extend(s.iter().flat_map(|&v| {
            let v = from_u8(v);
            [v, v]
        })),
        (SampleBlock::F32(s), 2) => out.extend(s[..frames * 2].iter().map(|&v| from_f32(v))),
        (SampleBlock::F32(s), 1) => out.extend(s.iter().flat_map(|&v| {
            let v = from_f32(v);
            [v, v]
        })),
        (_, other) => {
            tracing::debug!(channels = other, "unsupported channel count; emitting silence");
            out.resize(out.len() + frames * CHANNELS, 0);
        }
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s16_stereo_is_copied() {
        let mut out = Vec::new();
        let frames = to_s16_stereo(SampleBlock::S16(&[1, -1, 2, -2]), 2, &mut out);
        assert_eq!(frames, 2);
        assert_eq!(out, [1, -1, 2, -2]);
    }

    #[test]
    fn s16_mono_is_duplicated() {
        let mut out = Vec::new();
        to_s16_stereo(SampleBlock::S16(&[5, 6]), 1, &mut out);
        assert_eq!(out, [5, 5, 6, 6]);
    }

    #[test]
    fn u8_is_recentred() {
        let mut out = Vec::new();
        to_s16_stereo(SampleBlock::U8(&[128, 255, 0, 128]), 2, &mut out);
        assert_eq!(out, [0, 127 << 8, -128 << 8, 0]);
    }

    #[test]
    fn f32_is_clamped_and_scaled() {
        let mut out = Vec::new();
        to_s16_stereo(SampleBlock::F32(&[2.0, -2.0, 0.5]), 1, &mut out);
        assert_eq!(out, [32767, 32767, -32767, -32767, 16383, 16383]);
    }

    #[test]
    fn trailing_partial_frame_is_ignored() {
        let mut out = Vec::new();
        let frames = to_s16_stereo(SampleBlock::S16(&[1, 2, 3]), 2, &mut out);
        assert_eq!(frames, 1);
        assert_eq!(out, [1, 2]);
    }

    #[test]
    fn unsupported_channel_count_yields_silence() {
        let mut out = vec![7];
        let frames = to_s16_stereo(SampleBlock::S16(&[1, 2, 3, 4, 5, 6]), 6, &mut out);
        assert_eq!(frames, 1);
        assert_eq!(out, [7, 0, 0]);
    }
}

//! Bounded stereo sample ring with overwrite-oldest backpressure.
//!
//! Storage is a fixed arena of `capacity * CHANNELS` interleaved `i16`
//! samples addressed by two frame cursors. An explicit occupied count removes
//! the full/empty ambiguity of bare cursors: `read + occupied == write`
//! (mod capacity) holds after every operation.
//!
//! The type is not synchronised; the bridge wraps it in a mutex that both the
//! producer and the consumer hold only for the duration of one call.

use super::CHANNELS;
use crate::error::BridgeError;

/// What a [`AudioRingBuffer::push`] did to the stream.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PushOutcome {
    /// Frames now queued from this push.
    pub written: usize,
    /// Oldest frames discarded to make room (queued or from this push).
    pub dropped: usize,
}

#[derive(Debug)]
pub struct AudioRingBuffer {
    storage: Vec<i16>,
    capacity: usize,
    read: usize,
    write: usize,
    occupied: usize,
}

impl AudioRingBuffer {
    /// Allocate a ring holding `capacity_frames` stereo frames (minimum 1).
    pub fn with_capacity(capacity_frames: usize) -> Result<Self, BridgeError> {
        let capacity = capacity_frames.max(1);
        let storage = alloc_samples(capacity)?;
        Ok(Self {
            storage,
            capacity,
            read: 0,
            write: 0,
            occupied: 0,
        })
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity
    }

    /// Frames waiting to be drained.
    pub fn len_frames(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Frames that can be pushed without discarding anything.
    pub fn headroom_frames(&self) -> usize {
        self.capacity - self.occupied
    }

    /// Append `frames` interleaved stereo frames from `samples`.
    ///
    /// When headroom runs out the read cursor is advanced past the oldest
    /// frames so the newest data always fits. A push larger than the whole
    /// ring keeps only its last `capacity` frames.
    pub fn push(&mut self, samples: &[i16], frames: usize) -> Result<PushOutcome, BridgeError> {
        if samples.len() < frames * CHANNELS {
            return Err(BridgeError::SampleCountMismatch {
                frames,
                samples: samples.len(),
            });
        }
        if frames == 0 {
            return Ok(PushOutcome::default());
        }

        let mut src = &samples[..frames * CHANNELS];
        let mut dropped = 0;
        if frames > self.capacity {
            let skipped = frames - self.capacity;
            src = &src[skipped * CHANNELS..];
            dropped += skipped;
        }
        let incoming = src.len() / CHANNELS;

        let overflow = incoming.saturating_sub(self.headroom_frames());
        if overflow > 0 {
            self.read = (self.read + overflow) % self.capacity;
            self.occupied -= overflow;
            dropped += overflow;
        }

        // At most two contiguous runs: up to the end of the arena, then from 0.
        let first = incoming.min(self.capacity - self.write);
        let start = self.write * CHANNELS;
        self.storage[start..start + first * CHANNELS].copy_from_slice(&src[..first * CHANNELS]);
        let rest = incoming - first;
        if rest > 0 {
            self.storage[..rest * CHANNELS].copy_from_slice(&src[first * CHANNELS..]);
        }

        self.write = (self.write + incoming) % self.capacity;
        self.occupied += incoming;
        self.check_invariant();

        Ok(PushOutcome {
            written: incoming,
            dropped,
        })
    }

    /// Move up to `max_frames` of the oldest frames into `out` (appending).
    ///
    /// Returns the number of frames moved, possibly zero. Never blocks.
    pub fn drain_into(&mut self, out: &mut Vec<i16>, max_frames: usize) -> usize {
        let take = max_frames.min(self.occupied);
        if take == 0 {
            return 0;
        }

        let first = take.min(self.capacity - self.read);
        let start = self.read * CHANNELS;
        out.extend_from_slice(&self.storage[start..start + first * CHANNELS]);
        let rest = take - first;
        if rest > 0 {
            out.extend_from_slice(&self.storage[..rest * CHANNELS]);
        }

        self.read = (self.read + take) % self.capacity;
        self.occupied -= take;
        self.check_invariant();
        take
    }

    /// Convenience wrapper around [`drain_into`](Self::drain_into).
    pub fn drain(&mut self, max_frames: usize) -> Vec<i16> {
        let mut out = Vec::with_capacity(max_frames.min(self.occupied) * CHANNELS);
        self.drain_into(&mut out, max_frames);
        out
    }

    /// Grow to at least `min_frames` of capacity. Never shrinks.
    ///
    /// Unread frames are preserved and moved to the start of the new arena.
    /// On allocation failure the ring keeps its previous capacity and data.
    pub fn grow_to(&mut self, min_frames: usize) -> Result<bool, BridgeError> {
        if min_frames <= self.capacity {
            return Ok(false);
        }

        let mut storage = alloc_samples(min_frames)?;
        let mut pending = Vec::with_capacity(self.occupied * CHANNELS);
        let occupied = self.drain_into(&mut pending, self.occupied);
        storage[..pending.len()].copy_from_slice(&pending);

        self.storage = storage;
        self.capacity = min_frames;
        self.read = 0;
        self.write = occupied % self.capacity;
        self.occupied = occupied;
        self.check_invariant();
        Ok(true)
    }

    /// Drop all queued frames; capacity is unchanged.
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.occupied = 0;
    }

    #[inline]
    fn check_invariant(&self) {
        debug_assert!(self.occupied <= self.capacity);
        debug_assert_eq!((self.read + self.occupied) % self.capacity, self.write);
        debug_assert_eq!(self.storage.len(), self.capacity * CHANNELS);
    }
}

fn alloc_samples(frames: usize) -> Result<Vec<i16>, BridgeError> {
    let samples = frames
        .checked_mul(CHANNELS)
        .ok_or(BridgeError::ResourceExhausted { bytes: usize::MAX })?;
    let mut storage = Vec::new();
    storage
        .try_reserve_exact(samples)
        .map_err(|_| BridgeError::ResourceExhausted {
            bytes: samples.saturating_mul(size_of::<i16>()),
        })?;
    storage.resize(samples, 0);
    Ok(storage)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stereo frames whose left sample is the frame number and right is its negation.
    fn frames(range: std::ops::Range<i16>) -> Vec<i16> {
        range.flat_map(|i| [i, -i]).collect()
    }

    #[test]
    fn zero_capacity_is_bumped_to_one_frame() {
        let ring = AudioRingBuffer::with_capacity(0).unwrap();
        assert_eq!(ring.capacity_frames(), 1);
    }

    #[test]
    fn drain_returns_oldest_first() {
        let mut ring = AudioRingBuffer::with_capacity(8).unwrap();
        ring.push(&frames(0..6), 6).unwrap();

        assert_eq!(ring.drain(4), frames(0..4));
        assert_eq!(ring.len_frames(), 2);
        assert_eq!(ring.drain(10), frames(4..6));
        assert!(ring.is_empty());
    }

    #[test]
    fn drain_on_empty_returns_nothing() {
        let mut ring = AudioRingBuffer::with_capacity(4).unwrap();
        let mut out = Vec::new();
        assert_eq!(ring.drain_into(&mut out, 16), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn overflow_discards_oldest_frames() {
        let mut ring = AudioRingBuffer::with_capacity(8).unwrap();
        ring.push(&frames(0..6), 6).unwrap();
        let outcome = ring.push(&frames(6..11), 5).unwrap();

        assert_eq!(outcome, PushOutcome { written: 5, dropped: 3 });
        assert_eq!(ring.len_frames(), 8);
        assert_eq!(ring.drain(8), frames(3..11));
    }

    #[test]
    fn oversized_push_keeps_newest_capacity_frames() {
        let mut ring = AudioRingBuffer::with_capacity(4).unwrap();
        let outcome = ring.push(&frames(0..10), 10).unwrap();

        assert_eq!(outcome.written, 4);
        assert_eq!(outcome.dropped, 6);
        assert_eq!(ring.drain(4), frames(6..10));
    }

    #[test]
    fn wraparound_preserves_order() {
        let mut ring = AudioRingBuffer::with_capacity(5).unwrap();
        ring.push(&frames(0..4), 4).unwrap();
        assert_eq!(ring.drain(3), frames(0..3));
        // Write cursor wraps past the end of the arena here.
        ring.push(&frames(4..8), 4).unwrap();
        assert_eq!(ring.drain(5), frames(3..8));
    }

    #[test]
    fn short_sample_slice_is_rejected() {
        let mut ring = AudioRingBuffer::with_capacity(4).unwrap();
        let err = ring.push(&[1, 2, 3], 2).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::SampleCountMismatch { frames: 2, samples: 3 }
        ));
        assert!(ring.is_empty());
    }

    #[test]
    fn grow_preserves_unread_frames_after_wrap() {
        let mut ring = AudioRingBuffer::with_capacity(4).unwrap();
        ring.push(&frames(0..3), 3).unwrap();
        ring.drain(2);
        ring.push(&frames(3..6), 3).unwrap();

        assert!(ring.grow_to(10).unwrap());
        assert_eq!(ring.capacity_frames(), 10);
        assert_eq!(ring.len_frames(), 4);
        ring.push(&frames(6..9), 3).unwrap();
        assert_eq!(ring.drain(10), frames(2..9));
    }

    #[test]
    fn grow_never_shrinks() {
        let mut ring = AudioRingBuffer::with_capacity(16).unwrap();
        assert!(!ring.grow_to(8).unwrap());
        assert_eq!(ring.capacity_frames(), 16);
    }

    #[test]
    fn exact_fill_then_drain_everything() {
        let mut ring = AudioRingBuffer::with_capacity(6).unwrap();
        let outcome = ring.push(&frames(0..6), 6).unwrap();
        assert_eq!(outcome.dropped, 0);
        assert_eq!(ring.headroom_frames(), 0);
        assert_eq!(ring.drain(6), frames(0..6));
    }
}

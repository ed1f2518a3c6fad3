//! Audio/video hand-off for emubridge-core.
//!
//! - Audio: the emulation thread pushes interleaved stereo `i16` frames into
//!   an [`AudioRingBuffer`]; each tick drains it in fixed-size batches to the
//!   frontend. A full ring drops its oldest frames.
//!
//! - Video: the emulation thread copies its latest frame into the
//!   [`FrameSlot`]; each tick waits (bounded) for it and presents it.
//!
//! Notes / limitations:
//! - Frames are always copied; pixel format is opaque packed 32-bit.
//! - The only format work done is the sample shim in [`convert`].

pub mod audio;
pub mod convert;
pub mod video;


pub use audio::{AudioRingBuffer, PushOutcome};
pub use convert::{SampleBlock, to_s16_stereo};
pub use video::{FrameSlot, FrameView, WaitOutcome};

/// Channels in every audio frame the bridge stores.
pub const CHANNELS: usize = 2;

//! Error type shared by the bridge modules.
//!
//! Nothing here is fatal to a session. Producer-side calls return these so the
//! caller (or a test) can see why a submission was dropped; the emulation
//! thread is expected to log and carry on.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Errors surfaced by bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The bridge is not in the `Ready` state.
    #[error("bridge is not initialised")]
    NotReady,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// The pixel slice is shorter than `height * stride`.
    #[error("frame buffer too small: need {needed} bytes, got {got}")]
    FrameTooSmall {
        /// Bytes required by the declared geometry.
        needed: usize,
        /// Bytes actually supplied.
        got: usize,
    },

    /// The row stride cannot hold a row of `width` 32-bit pixels.
    #[error("row stride {stride} is too small for width {width}")]
    InvalidStride {
        /// Frame width in pixels.
        width: u32,
        /// Row stride in bytes.
        stride: usize,
    },

    /// The sample slice does not hold `frames` interleaved stereo frames.
    #[error("expected {frames} stereo frames, got {samples} samples")]
    SampleCountMismatch {
        /// Frames the caller declared.
        frames: usize,
        /// Samples actually supplied.
        samples: usize,
    },

    /// An allocation for frame or audio storage failed.
    #[error("could not allocate {bytes} bytes")]
    ResourceExhausted {
        /// Size of the failed request.
        bytes: usize,
    },

    /// The emulated machine failed to start.
    #[error("machine error: {0}")]
    Machine(#[from] anyhow::Error),
}

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// The protected data is plain buffers and cursors, which stay structurally
/// valid even if a holder unwound mid-operation.
pub(crate) fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|e: PoisonError<_>| {
        tracing::warn!(lock = what, "mutex poisoned; continuing");
        e.into_inner()
    })
}

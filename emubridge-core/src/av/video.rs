//! Single-slot video hand-off between the emulation thread and the tick.
//!
//! The producer copies its most recent frame in; the consumer waits (bounded)
//! for something new and presents it. Older frames that were never presented
//! are simply overwritten.
//!
//! A closed slot refuses submissions and wakes every waiter. The bridge
//! closes it on teardown so a tick blocked in
//! [`wait_and_consume`](FrameSlot::wait_and_consume) returns at once.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::abi::BYTES_PER_PIXEL;
use crate::error::{BridgeError, lock_or_recover};

/// Borrowed view of a stored frame, handed to the present callback.
#[derive(Copy, Clone, Debug)]
pub struct FrameView<'a> {
    /// `height * stride` bytes of packed 32-bit pixels.
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Bytes per row.
    pub stride: usize,
}

/// How a [`FrameSlot::wait_and_consume`] call ended.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WaitOutcome {
    /// A frame was available and handed to the present callback.
    Presented,
    /// Nothing arrived before the timeout.
    TimedOut,
    /// Availability was signalled but no frame has ever been written.
    Empty,
    /// The slot was closed (bridge teardown) before or during the wait.
    Closed,
}

#[derive(Debug, Default)]
struct FrameState {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    stride: usize,
    available: bool,
    closed: bool,
}

impl FrameState {
    fn byte_len(&self) -> usize {
        (self.height as usize).saturating_mul(self.stride)
    }

    /// Make room for a `height * stride` frame. Never shrinks.
    fn ensure_storage(&mut self, needed: usize) -> Result<(), BridgeError> {
        if needed > self.pixels.len() {
            let extra = needed - self.pixels.len();
            self.pixels
                .try_reserve_exact(extra)
                .map_err(|_| BridgeError::ResourceExhausted { bytes: needed })?;
            self.pixels.resize(needed, 0);
            tracing::debug!(bytes = needed, "frame storage grown");
        }
        Ok(())
    }

    fn set_geometry(&mut self, width: u32, height: u32, stride: usize) {
        self.width = width;
        self.height = height;
        self.stride = stride;
    }
}

#[derive(Debug)]
pub struct FrameSlot {
    state: Mutex<FrameState>,
    ready: Condvar,
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSlot {
    /// A new slot starts closed; [`open`](Self::open) it when the session starts.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FrameState {
                closed: true,
                ..FrameState::default()
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrameState> {
        lock_or_recover(&self.state, "frame slot")
    }

    /// Copy a frame into the slot and mark it available.
    ///
    /// `pixels` may be reused by the caller as soon as this returns. Frames
    /// submitted to a closed slot are dropped with [`BridgeError::NotReady`].
    pub fn submit(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        stride: usize,
    ) -> Result<(), BridgeError> {
        let needed = validate_geometry(width, height, stride)?;
        if pixels.len() < needed {
            return Err(BridgeError::FrameTooSmall {
                needed,
                got: pixels.len(),
            });
        }

        {
            let mut state = self.lock();
            if state.closed {
                return Err(BridgeError::NotReady);
            }
            state.ensure_storage(needed)?;
            state.pixels[..needed].copy_from_slice(&pixels[..needed]);
            state.set_geometry(width, height, stride);
            state.available = true;
        }
        self.ready.notify_one();
        Ok(())
    }

    /// Let the producer render straight into the slot's storage.
    ///
    /// The slot is sized for the geometry and `render` receives exactly
    /// `height * stride` bytes. Availability is not changed; follow with
    /// [`signal_only`](Self::signal_only) once the frame is complete.
    pub fn write_in_place<R>(
        &self,
        width: u32,
        height: u32,
        stride: usize,
        render: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R, BridgeError> {
        let needed = validate_geometry(width, height, stride)?;
        let mut state = self.lock();
        if state.closed {
            return Err(BridgeError::NotReady);
        }
        state.ensure_storage(needed)?;
        state.set_geometry(width, height, stride);
        Ok(render(&mut state.pixels[..needed]))
    }

    /// Mark the current storage as a new frame without copying anything.
    pub fn signal_only(&self) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.available = true;
        }
        self.ready.notify_one();
    }

    /// Wait up to `timeout` for a frame, then present it.
    ///
    /// If a frame is (or becomes) available, `present` runs with a view of it
    /// and the availability flag is cleared, so a second call without a new
    /// submission does not present again. The callback runs under the slot
    /// lock and must not call back into this slot.
    pub fn wait_and_consume(
        &self,
        timeout: Duration,
        present: impl FnOnce(FrameView<'_>),
    ) -> WaitOutcome {
        let guard = self.lock();
        let (mut state, _) = self
            .ready
            .wait_timeout_while(guard, timeout, |s| !s.available && !s.closed)
            .unwrap_or_else(|e| {
                tracing::warn!("frame slot wait poisoned; continuing");
                e.into_inner()
            });

        if state.closed {
            return WaitOutcome::Closed;
        }
        if !state.available {
            tracing::debug!(?timeout, "no frame before timeout");
            return WaitOutcome::TimedOut;
        }

        state.available = false;
        if state.width == 0 || state.height == 0 {
            return WaitOutcome::Empty;
        }
        let len = state.byte_len();
        present(FrameView {
            pixels: &state.pixels[..len],
            width: state.width,
            height: state.height,
            stride: state.stride,
        });
        WaitOutcome::Presented
    }

    /// Accept submissions again (session start).
    pub fn open(&self) {
        let mut state = self.lock();
        state.closed = false;
        state.available = false;
    }

    /// Free storage, refuse further submissions and wake all waiters.
    pub fn close(&self) {
        {
            let mut state = self.lock();
            *state = FrameState {
                closed: true,
                ..FrameState::default()
            };
        }
        self.ready.notify_all();
    }

    pub fn is_available(&self) -> bool {
        self.lock().available
    }

    /// Geometry of the stored frame, if any has been written.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let state = self.lock();
        (state.width > 0 && state.height > 0).then_some((state.width, state.height))
    }

    /// Bytes currently allocated for pixel storage.
    pub fn allocated_bytes(&self) -> usize {
        self.lock().pixels.len()
    }
}

/// Check that `stride` can hold a row and return `height * stride`.
fn validate_geometry(width: u32, height: u32, stride: usize) -> Result<usize, BridgeError> {
    let row = (width as usize).saturating_mul(BYTES_PER_PIXEL);
    if stride < row {
        return Err(BridgeError::InvalidStride { width, stride });
    }
    (height as usize)
        .checked_mul(stride)
        .ok_or(BridgeError::ResourceExhausted { bytes: usize::MAX })
}

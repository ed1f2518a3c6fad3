//! libretro side of the host callbacks.
//!
//! `libretro_backend` only hands us a `RuntimeHandle` for the duration of
//! `on_run`, while the bridge wants `'static` callbacks registered once at
//! load. [`HandleSlot`] bridges the two: `on_run` parks the handle in the
//! slot for the length of the tick and the callbacks reach it from there.

use std::sync::{Arc, Mutex};

use libretro_backend::RuntimeHandle;
use tracing::warn;

use crate::Bridge;
use crate::abi::{self, BYTES_PER_PIXEL};
use crate::av::FrameView;
use crate::config::ControlSource;
use crate::error::lock_or_recover;
use crate::machine::Geometry;

struct HandlePtr(*mut RuntimeHandle);

// SAFETY: the pointer is only set for the duration of `HandleSlot::scoped`,
// on the thread running `on_run`, and only dereferenced under the mutex.
unsafe impl Send for HandlePtr {}

/// The runtime handle of the `on_run` currently in progress, if any.
pub(crate) struct HandleSlot {
    current: Mutex<HandlePtr>,
}

impl Default for HandleSlot {
    fn default() -> Self {
        Self {
            current: Mutex::new(HandlePtr(std::ptr::null_mut())),
        }
    }
}

impl HandleSlot {
    /// Make `handle` reachable through [`with`](Self::with) while `f` runs.
    pub(crate) fn scoped<R>(&self, handle: &mut RuntimeHandle, f: impl FnOnce() -> R) -> R {
        lock_or_recover(&self.current, "runtime handle").0 = handle as *mut _;
        let out = f();
        lock_or_recover(&self.current, "runtime handle").0 = std::ptr::null_mut();
        out
    }

    /// Run `f` against the current handle. `None` outside `on_run`.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut RuntimeHandle) -> R) -> Option<R> {
        let mut current = lock_or_recover(&self.current, "runtime handle");
        if current.0.is_null() {
            return None;
        }
        // SAFETY: non-null only inside `scoped`, whose caller holds the
        // exclusive borrow we are reborrowing here.
        let handle = unsafe { &mut *current.0 };
        Some(f(handle))
    }
}

/// Wire the bridge's host callbacks to the libretro runtime handle.
pub(crate) fn register(bridge: &Bridge, slot: &Arc<HandleSlot>, geometry: Geometry) {
    let video_slot = Arc::clone(slot);
    let mut packed = Vec::new();
    let mut warned = false;
    bridge.set_video_callback(move |frame| {
        if (frame.width, frame.height) != (geometry.width, geometry.height) {
            if !warned {
                warn!(
                    got = ?(frame.width, frame.height),
                    declared = ?(geometry.width, geometry.height),
                    "frame size differs from declared geometry; dropping"
                );
                warned = true;
            }
            return;
        }
        let bytes = packed_rows(frame, &mut packed);
        video_slot.with(|h| h.upload_video_frame(bytes));
    });

    let audio_slot = Arc::clone(slot);
    bridge.register(move |cb| {
        cb.set_audio_batch(move |samples, _frames| {
            audio_slot.with(|h| h.upload_audio_frame(samples));
        })
    });

    let input_slot = Arc::clone(slot);
    bridge.set_input_callbacks(|| {}, move |source| read_control(&input_slot, source));
}

/// Only joypads are reachable through `libretro_backend`; other devices read
/// as released.
fn read_control(slot: &HandleSlot, source: ControlSource) -> i16 {
    if source.device != abi::device::JOYPAD {
        return 0;
    }
    let Some(button) = abi::map_joypad_button(source.id) else {
        return 0;
    };
    slot.with(|h| i16::from(h.is_joypad_button_pressed(source.port, button)))
        .unwrap_or(0)
}

/// Return the frame as tightly packed rows, copying into `scratch` only when
/// the stride carries padding.
fn packed_rows<'a>(frame: FrameView<'a>, scratch: &'a mut Vec<u8>) -> &'a [u8] {
    let row = frame.width as usize * BYTES_PER_PIXEL;
    let len = row * frame.height as usize;
    if frame.stride == row {
        return &frame.pixels[..len];
    }

    scratch.clear();
    scratch.reserve(len);
    for line in frame.pixels.chunks(frame.stride).take(frame.height as usize) {
        scratch.extend_from_slice(&line[..row]);
    }
    scratch
}

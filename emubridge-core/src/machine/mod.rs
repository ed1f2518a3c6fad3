//! The seam between the bridge and whatever produces frames and audio.
//!
//! A [`Machine`] owns its own execution context. `start` hands it a
//! [`Producer`]; everything it emits goes through that handle, and the
//! bridge only ever calls back into the machine through the returned
//! [`InputSink`].

mod pattern;

pub use pattern::PatternMachine;

use crate::bridge::Producer;
use crate::input::InputSink;
use crate::loader::LoadRequest;

/// Output geometry a machine renders at.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// An emulated machine driven by the bridge.
pub trait Machine: Send {
    /// Geometry the frontend should be told about before the first frame.
    fn geometry(&self) -> Geometry;

    /// Start producing. Must return promptly; long-running work belongs on
    /// the machine's own thread.
    fn start(
        &mut self,
        request: &LoadRequest,
        producer: Producer,
    ) -> anyhow::Result<Box<dyn InputSink>>;

    /// Stop producing and release the producer. Called before the bridge is
    /// torn down; calling it on a stopped machine does nothing.
    fn stop(&mut self);
}

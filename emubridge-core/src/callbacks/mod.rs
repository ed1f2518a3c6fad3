//! Host callback registry.
//!
//! Holds the latest callback the frontend registered for each channel. The
//! registry owns no data of its own; it is only ever invoked from inside
//! [`Bridge::tick`](crate::Bridge::tick), on the frontend's thread.

use std::fmt;

use crate::av::FrameView;
use crate::config::ControlSource;

pub type VideoRefreshFn = Box<dyn FnMut(FrameView<'_>) + Send>;
pub type AudioSampleFn = Box<dyn FnMut(i16, i16) + Send>;
pub type AudioBatchFn = Box<dyn FnMut(&[i16], usize) + Send>;
pub type InputPollFn = Box<dyn FnMut() + Send>;
pub type InputStateFn = Box<dyn FnMut(ControlSource) -> i16 + Send>;

#[derive(Default)]
pub struct HostCallbacks {
    video: Option<VideoRefreshFn>,
    audio_sample: Option<AudioSampleFn>,
    audio_batch: Option<AudioBatchFn>,
    input_poll: Option<InputPollFn>,
    input_state: Option<InputStateFn>,
}

impl HostCallbacks {
    pub fn set_video(&mut self, cb: impl FnMut(FrameView<'_>) + Send + 'static) {
        self.video = Some(Box::new(cb));
    }

    /// Per-frame fallback, used only when no batch callback is registered.
    pub fn set_audio_sample(&mut self, cb: impl FnMut(i16, i16) + Send + 'static) {
        self.audio_sample = Some(Box::new(cb));
    }

    /// Receives `frames` interleaved stereo frames per call.
    pub fn set_audio_batch(&mut self, cb: impl FnMut(&[i16], usize) + Send + 'static) {
        self.audio_batch = Some(Box::new(cb));
    }

    pub fn set_input_poll(&mut self, cb: impl FnMut() + Send + 'static) {
        self.input_poll = Some(Box::new(cb));
    }

    pub fn set_input_state(&mut self, cb: impl FnMut(ControlSource) -> i16 + Send + 'static) {
        self.input_state = Some(Box::new(cb));
    }

    /// Drop every registered callback.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn has_audio(&self) -> bool {
        self.audio_batch.is_some() || self.audio_sample.is_some()
    }

    pub(crate) fn present(&mut self, frame: FrameView<'_>) {
        if let Some(video) = self.video.as_mut() {
            video(frame);
        }
    }

    /// Deliver interleaved stereo samples, preferring the batch callback.
    pub(crate) fn play(&mut self, samples: &[i16]) {
        let frames = samples.len() / 2;
        if let Some(batch) = self.audio_batch.as_mut() {
            batch(samples, frames);
        } else if let Some(single) = self.audio_sample.as_mut() {
            for frame in samples.chunks_exact(2) {
                single(frame[0], frame[1]);
            }
        }
    }

    /// Poll the frontend and hand back its input-state query, if both halves
    /// of the input channel are registered.
    pub(crate) fn poll_input(&mut self) -> Option<&mut InputStateFn> {
        let state = self.input_state.as_mut()?;
        if let Some(poll) = self.input_poll.as_mut() {
            poll();
        }
        Some(state)
    }
}

impl fmt::Debug for HostCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCallbacks")
            .field("video", &self.video.is_some())
            .field("audio_sample", &self.audio_sample.is_some())
            .field("audio_batch", &self.audio_batch.is_some())
            .field("input_poll", &self.input_poll.is_some())
            .field("input_state", &self.input_state.is_some())
            .finish()
    }
}

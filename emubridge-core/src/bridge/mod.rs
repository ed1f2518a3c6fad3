//! Bridge lifecycle: owns the audio ring, the frame slot, the input sampler
//! and the host callbacks, and sequences them once per tick.
//!
//! Two execution contexts meet here:
//! - the emulation thread, which only ever touches the bridge through a
//!   [`Producer`] (push audio, submit/signal frames, set the sample rate);
//! - the frontend thread, which calls [`Bridge::tick`] once per host frame.
//!
//! Locking:
//! - audio ring and frame slot each have their own mutex and no operation
//!   holds both;
//! - the consumer-side state (callbacks, sampler, input sink) has a third
//!   mutex, taken only by the frontend thread and by `deinit`;
//! - the frame wait is the only place a tick can block, and teardown closes
//!   the slot first so that wait returns immediately.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, trace, warn};

use crate::av::{AudioRingBuffer, FrameSlot, FrameView, PushOutcome, SampleBlock, WaitOutcome};
use crate::callbacks::HostCallbacks;
use crate::config::{BridgeConfig, Capabilities, ControlSource};
use crate::error::{BridgeError, lock_or_recover};
use crate::input::{InputEdgeSampler, InputEvent, InputSink};
use crate::loader::LoadRequest;
use crate::machine::Machine;


/// Lifecycle of a bridge instance.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum LifecycleState {
    Uninitialized = 0,
    Ready = 1,
    TornDown = 2,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => LifecycleState::Ready,
            2 => LifecycleState::TornDown,
            _ => LifecycleState::Uninitialized,
        }
    }
}

/// What `init` was asked to load.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Session {
    pub game_path: Option<PathBuf>,
    pub ram_mb: u32,
}

/// Summary of one [`Bridge::tick`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TickReport {
    /// Input events delivered to the machine.
    pub events_forwarded: usize,
    /// Input events computed but held back (GUI visible or no sink).
    pub events_suppressed: usize,
    pub frame_presented: bool,
    /// Audio frames handed to the frontend.
    pub audio_frames: usize,
    pub audio_batches: usize,
}

/// State shared with the emulation thread.
#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    audio: Mutex<Option<AudioRingBuffer>>,
    frame: FrameSlot,
    sample_rate: AtomicU32,
    audio_max_capacity_frames: usize,
}

impl Shared {
    fn lifecycle(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn audio(&self) -> MutexGuard<'_, Option<AudioRingBuffer>> {
        lock_or_recover(&self.audio, "audio ring")
    }
}

/// Consumer-side state, touched only from the frontend thread (and teardown).
struct Consumer {
    callbacks: HostCallbacks,
    sampler: InputEdgeSampler,
    sink: Option<Box<dyn InputSink>>,
    session: Session,
    last_frame_size: Option<(u32, u32)>,
    events: Vec<InputEvent>,
    scratch: Vec<i16>,
}

/// One bridge session between an emulation thread and a frontend.
pub struct Bridge {
    config: BridgeConfig,
    capabilities: Capabilities,
    shared: Arc<Shared>,
    consumer: Mutex<Consumer>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        Self::with_capabilities(config, Capabilities::default())
    }

    pub fn with_capabilities(
        config: BridgeConfig,
        capabilities: Capabilities,
    ) -> Result<Self, BridgeError> {
        config.validate()?;

        let shared = Arc::new(Shared {
            state: AtomicU8::new(LifecycleState::Uninitialized as u8),
            audio: Mutex::new(None),
            frame: FrameSlot::new(),
            sample_rate: AtomicU32::new(config.default_sample_rate),
            audio_max_capacity_frames: config.audio_max_capacity_frames,
        });
        let consumer = Consumer {
            callbacks: HostCallbacks::default(),
            sampler: InputEdgeSampler::new(&config.controls, config.pointer),
            sink: None,
            session: Session::default(),
            last_frame_size: None,
            events: Vec::new(),
            scratch: Vec::with_capacity(config.audio_batch_frames * crate::av::CHANNELS),
        };

        Ok(Self {
            config,
            capabilities,
            shared,
            consumer: Mutex::new(consumer),
        })
    }

    fn consumer(&self) -> MutexGuard<'_, Consumer> {
        lock_or_recover(&self.consumer, "bridge consumer")
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.shared.lifecycle()
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle() == LifecycleState::Ready
    }

    /// Handle for the emulation thread.
    pub fn producer(&self) -> Producer {
        Producer {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Start a session: allocate the audio ring, open the frame slot and
    /// reset input state. A no-op if the bridge is already `Ready`.
    ///
    /// A torn-down bridge may be initialised again; callbacks must then be
    /// registered anew.
    pub fn init(&self, game_path: Option<&Path>, ram_mb: u32) -> Result<(), BridgeError> {
        let mut consumer = self.consumer();
        if self.is_ready() {
            return Ok(());
        }

        let ring = AudioRingBuffer::with_capacity(self.config.audio_capacity_frames)?;
        *self.shared.audio() = Some(ring);
        self.shared.frame.open();
        self.shared
            .sample_rate
            .store(self.config.default_sample_rate, Ordering::Release);

        consumer.sampler.reset();
        consumer.last_frame_size = None;
        consumer.session = Session {
            game_path: game_path.map(Path::to_path_buf),
            ram_mb,
        };

        self.shared
            .state
            .store(LifecycleState::Ready as u8, Ordering::Release);
        info!(
            game = ?consumer.session.game_path,
            ram_mb,
            audio_frames = self.config.audio_capacity_frames,
            "bridge initialised"
        );
        Ok(())
    }

    /// End the session: wake any tick blocked on the frame slot, free the
    /// audio and frame storage and drop every host callback and the input
    /// sink. Safe to call from any thread and more than once.
    pub fn deinit(&self) {
        let was = self
            .shared
            .state
            .swap(LifecycleState::TornDown as u8, Ordering::AcqRel);

        // Close first: a tick waiting on the slot holds the consumer lock.
        self.shared.frame.close();
        *self.shared.audio() = None;

        let mut consumer = self.consumer();
        consumer.callbacks.clear();
        consumer.sink = None;
        consumer.events.clear();
        consumer.scratch = Vec::new();

        if LifecycleState::from_u8(was) == LifecycleState::Ready {
            info!("bridge torn down");
        }
    }

    /// Session parameters recorded by the last `init`.
    pub fn session(&self) -> Session {
        self.consumer().session.clone()
    }

    /// Replace the host callbacks in place.
    pub fn register(&self, f: impl FnOnce(&mut HostCallbacks)) {
        f(&mut self.consumer().callbacks);
    }

    pub fn set_video_callback(&self, cb: impl FnMut(FrameView<'_>) + Send + 'static) {
        self.consumer().callbacks.set_video(cb);
    }

    pub fn set_audio_callbacks(
        &self,
        single: Option<Box<dyn FnMut(i16, i16) + Send>>,
        batch: Option<Box<dyn FnMut(&[i16], usize) + Send>>,
    ) {
        let mut consumer = self.consumer();
        if let Some(single) = single {
            consumer.callbacks.set_audio_sample(single);
        }
        if let Some(batch) = batch {
            consumer.callbacks.set_audio_batch(batch);
        }
    }

    pub fn set_input_callbacks(
        &self,
        poll: impl FnMut() + Send + 'static,
        state: impl FnMut(ControlSource) -> i16 + Send + 'static,
    ) {
        let mut consumer = self.consumer();
        consumer.callbacks.set_input_poll(poll);
        consumer.callbacks.set_input_state(state);
    }

    /// Attach the emulated machine's input entry points.
    pub fn attach_input_sink(&self, sink: Box<dyn InputSink>) {
        self.consumer().sink = Some(sink);
    }

    /// Start `machine` against this bridge and attach the sink it returns.
    pub fn start_machine(
        &self,
        machine: &mut dyn Machine,
        request: &LoadRequest,
    ) -> Result<(), BridgeError> {
        let sink = machine.start(request, self.producer())?;
        self.attach_input_sink(sink);
        Ok(())
    }

    /// Producer entry point, see [`Producer::submit_frame`].
    pub fn submit_frame(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        stride: usize,
    ) -> Result<(), BridgeError> {
        self.producer().submit_frame(pixels, width, height, stride)
    }

    /// Producer entry point, see [`Producer::push_audio_samples`].
    pub fn push_audio_samples(
        &self,
        samples: &[i16],
        frames: usize,
    ) -> Result<PushOutcome, BridgeError> {
        self.producer().push_audio_samples(samples, frames)
    }

    /// Producer entry point, see [`Producer::set_sample_rate`].
    pub fn set_sample_rate(&self, rate: u32) {
        self.producer().set_sample_rate(rate);
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate.load(Ordering::Acquire)
    }

    /// Run one host frame: forward input, wait for and present a frame, then
    /// drain audio. Does nothing unless the bridge is `Ready`.
    pub fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        if !self.is_ready() {
            return report;
        }

        let mut guard = self.consumer();
        let consumer = &mut *guard;

        self.forward_input(consumer, &mut report);

        let timeout = self.config.frame_timeout;
        let Consumer {
            callbacks,
            last_frame_size,
            ..
        } = &mut *consumer;
        match self.shared.frame.wait_and_consume(timeout, |frame| {
            *last_frame_size = Some((frame.width, frame.height));
            callbacks.present(frame);
        }) {
            WaitOutcome::Presented => report.frame_presented = true,
            WaitOutcome::TimedOut | WaitOutcome::Empty => {}
            WaitOutcome::Closed => {
                debug!("frame slot closed during tick");
                return report;
            }
        }

        self.drain_audio(consumer, &mut report);

        trace!(?report, "tick");
        report
    }

    fn forward_input(&self, consumer: &mut Consumer, report: &mut TickReport) {
        let Consumer {
            callbacks,
            sampler,
            sink,
            last_frame_size,
            events,
            ..
        } = consumer;

        let Some(read) = callbacks.poll_input() else {
            return;
        };
        events.clear();
        sampler.sample(|source| read(source), *last_frame_size, events);

        match sink.as_deref_mut() {
            Some(sink) if !self.capabilities.input_suppressed() => {
                report.events_forwarded = events.len();
                for event in events.drain(..) {
                    event.dispatch(sink);
                }
            }
            _ => report.events_suppressed = events.len(),
        }
    }

    fn drain_audio(&self, consumer: &mut Consumer, report: &mut TickReport) {
        if !consumer.callbacks.has_audio() {
            return;
        }

        let batch = self.config.audio_batch_frames;
        for _ in 0..self.config.max_audio_batches_per_tick {
            consumer.scratch.clear();
            let drained = {
                let mut audio = self.shared.audio();
                match audio.as_mut() {
                    Some(ring) => ring.drain_into(&mut consumer.scratch, batch),
                    None => 0,
                }
            };
            if drained == 0 {
                break;
            }
            consumer.callbacks.play(&consumer.scratch);
            report.audio_frames += drained;
            report.audio_batches += 1;
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if self.is_ready() {
            self.deinit();
        }
    }
}

/// The emulation thread's view of a bridge.
///
/// Cheap to clone. Every call is a short critical section and never waits
/// on the consumer. Calls made while the bridge is not `Ready` are dropped.
#[derive(Clone, Debug)]
pub struct Producer {
    shared: Arc<Shared>,
}

impl Producer {
    pub fn is_ready(&self) -> bool {
        self.shared.lifecycle() == LifecycleState::Ready
    }

    /// Copy a finished frame into the slot and wake the consumer.
    pub fn submit_frame(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        stride: usize,
    ) -> Result<(), BridgeError> {
        self.shared
            .frame
            .submit(pixels, width, height, stride)
            .inspect_err(|e| debug!(error = %e, "frame dropped"))
    }

    /// Render directly into the slot's storage; follow with
    /// [`signal_frame`](Self::signal_frame).
    pub fn write_frame_in_place<R>(
        &self,
        width: u32,
        height: u32,
        stride: usize,
        render: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R, BridgeError> {
        self.shared.frame.write_in_place(width, height, stride, render)
    }

    /// Mark the slot's storage as a new frame without copying.
    pub fn signal_frame(&self) {
        self.shared.frame.signal_only();
    }

    /// Queue interleaved stereo frames, dropping the oldest queued audio if
    /// the ring is full.
    ///
    /// A single push larger than the whole ring first grows the ring to hold
    /// both the queued frames and the push (up to the configured ceiling). If
    /// growth fails the ring keeps its capacity and only the newest frames
    /// are kept.
    pub fn push_audio_samples(
        &self,
        samples: &[i16],
        frames: usize,
    ) -> Result<PushOutcome, BridgeError> {
        let mut audio = self.shared.audio();
        let ring = audio.as_mut().ok_or(BridgeError::NotReady)?;

        let ceiling = self.shared.audio_max_capacity_frames;
        if frames > ring.capacity_frames() && ring.capacity_frames() < ceiling {
            let target = ring.len_frames().saturating_add(frames).min(ceiling);
            match ring.grow_to(target) {
                Ok(_) => debug!(frames = target, "audio ring grown"),
                Err(e) => warn!(error = %e, "audio ring growth failed; keeping capacity"),
            }
        }

        let outcome = ring.push(samples, frames)?;
        if outcome.dropped > 0 {
            trace!(dropped = outcome.dropped, "audio overrun; oldest frames discarded");
        }
        Ok(outcome)
    }

    /// Convert a block from the producer's native format and queue it.
    pub fn push_audio_block(
        &self,
        block: SampleBlock<'_>,
        channels: usize,
    ) -> Result<PushOutcome, BridgeError> {
        let mut converted = Vec::new();
        let frames = crate::av::to_s16_stereo(block, channels, &mut converted);
        self.push_audio_samples(&converted, frames)
    }

    pub fn set_sample_rate(&self, rate: u32) {
        if rate > 0 {
            self.shared.sample_rate.store(rate, Ordering::Release);
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate.load(Ordering::Acquire)
    }

    /// Frames currently queued in the audio ring.
    pub fn queued_audio_frames(&self) -> usize {
        self.shared.audio().as_ref().map_or(0, AudioRingBuffer::len_frames)
    }

    pub fn audio_capacity_frames(&self) -> usize {
        self.shared
            .audio()
            .as_ref()
            .map_or(0, AudioRingBuffer::capacity_frames)
    }
}

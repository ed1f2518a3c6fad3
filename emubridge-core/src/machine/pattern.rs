//! Diagnostic machine: scrolling colour bars, a pointer cursor and a tone.
//!
//! Runs a 60 Hz producer thread so the core can be loaded in a frontend and
//! the whole bridge exercised without an emulation core behind it.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{debug, info, warn};

use super::{Geometry, Machine};
use crate::abi::BYTES_PER_PIXEL;
use crate::av::SampleBlock;
use crate::bridge::Producer;
use crate::config::PointerButton;
use crate::error::lock_or_recover;
use crate::input::InputSink;
use crate::loader::LoadRequest;

const FRAME_RATE: u32 = 60;
const CURSOR_SIZE: i32 = 8;
const BAR_COLOURS: [u32; 8] = [
    0x00FF_FFFF,
    0x00FF_FF00,
    0x0000_FFFF,
    0x0000_FF00,
    0x00FF_00FF,
    0x00FF_0000,
    0x0000_00FF,
    0x0000_0000,
];

/// Pointer and key state shared between the sink and the render thread.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
struct PointerState {
    x: i32,
    y: i32,
    buttons: u8,
    keys_held: u32,
}

struct PatternInput {
    state: Arc<Mutex<PointerState>>,
}

impl PatternInput {
    fn update(&self, f: impl FnOnce(&mut PointerState)) {
        f(&mut lock_or_recover(&self.state, "pattern pointer"));
    }
}

impl InputSink for PatternInput {
    fn key_down(&mut self, code: u32) {
        debug!(code, "key down");
        self.update(|s| s.keys_held += 1);
    }

    fn key_up(&mut self, code: u32) {
        debug!(code, "key up");
        self.update(|s| s.keys_held = s.keys_held.saturating_sub(1));
    }

    fn pointer_button_down(&mut self, button: PointerButton) {
        self.update(|s| s.buttons |= 1 << button.index());
    }

    fn pointer_button_up(&mut self, button: PointerButton) {
        self.update(|s| s.buttons &= !(1 << button.index()));
    }

    fn pointer_moved(&mut self, x: i32, y: i32) {
        self.update(|s| {
            s.x = x;
            s.y = y;
        });
    }
}

struct Running {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Test-pattern generator implementing [`Machine`].
pub struct PatternMachine {
    geometry: Geometry,
    tone_hz: f32,
    running: Option<Running>,
}

impl Default for PatternMachine {
    fn default() -> Self {
        Self::new(Geometry::new(640, 480))
    }
}

impl PatternMachine {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            tone_hz: 440.0,
            running: None,
        }
    }

    /// Frequency of the generated tone; 0 for silence.
    pub fn with_tone(mut self, hz: f32) -> Self {
        self.tone_hz = hz.max(0.0);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

impl Machine for PatternMachine {
    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn start(
        &mut self,
        request: &LoadRequest,
        producer: Producer,
    ) -> anyhow::Result<Box<dyn InputSink>> {
        self.stop();

        let pointer = Arc::new(Mutex::new(PointerState::default()));
        let stop = Arc::new(AtomicBool::new(false));
        let mut worker = Worker {
            producer,
            geometry: self.geometry,
            tone_hz: self.tone_hz,
            pointer: Arc::clone(&pointer),
            stop: Arc::clone(&stop),
            phase: 0.0,
            tone: Vec::new(),
        };

        let handle = thread::Builder::new()
            .name("emubridge-pattern".into())
            .spawn(move || worker.run())
            .context("failed to spawn pattern thread")?;

        info!(
            width = self.geometry.width,
            height = self.geometry.height,
            kind = ?request.kind,
            "pattern machine started"
        );
        self.running = Some(Running { stop, handle });
        Ok(Box::new(PatternInput { state: pointer }))
    }

    fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.stop.store(true, Ordering::Release);
        if running.handle.join().is_err() {
            warn!("pattern thread panicked");
        }
        debug!("pattern machine stopped");
    }
}

impl Drop for PatternMachine {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    producer: Producer,
    geometry: Geometry,
    tone_hz: f32,
    pointer: Arc<Mutex<PointerState>>,
    stop: Arc<AtomicBool>,
    phase: f32,
    tone: Vec<f32>,
}

impl Worker {
    fn run(&mut self) {
        let period = Duration::from_secs(1) / FRAME_RATE;
        let mut next = Instant::now();
        let mut frame: u32 = 0;

        while !self.stop.load(Ordering::Acquire) {
            self.emit_frame(frame);
            self.emit_audio();
            frame = frame.wrapping_add(1);

            next += period;
            let now = Instant::now();
            match next.checked_duration_since(now) {
                Some(wait) => thread::sleep(wait),
                // Fell behind; do not try to catch up.
                None => next = now,
            }
        }
    }

    fn emit_frame(&self, frame: u32) {
        let Geometry { width, height } = self.geometry;
        let stride = width as usize * BYTES_PER_PIXEL;
        let pointer = *lock_or_recover(&self.pointer, "pattern pointer");

        match self.producer.write_frame_in_place(width, height, stride, |buf| {
            render(buf, self.geometry, frame, pointer)
        }) {
            Ok(()) => self.producer.signal_frame(),
            Err(e) => debug!(error = %e, "pattern frame dropped"),
        }
    }

    fn emit_audio(&mut self) {
        let rate = self.producer.sample_rate();
        let frames = (rate / FRAME_RATE) as usize;
        self.tone.clear();
        self.tone.resize(frames, 0.0);

        if self.tone_hz > 0.0 {
            let step = TAU * self.tone_hz / rate as f32;
            for sample in &mut self.tone {
                *sample = self.phase.sin() * 0.25;
                self.phase = (self.phase + step) % TAU;
            }
        }

        if let Err(e) = self
            .producer
            .push_audio_block(SampleBlock::F32(&self.tone), 1)
        {
            debug!(error = %e, "pattern audio dropped");
        }
    }
}

/// Draw one frame of XRGB8888 into `buf` (`height` rows of `width * 4`).
fn render(buf: &mut [u8], geometry: Geometry, frame: u32, pointer: PointerState) {
    let width = geometry.width as usize;
    let bar_width = (width / BAR_COLOURS.len()).max(1);
    let offset = frame as usize;

    for (y, row) in buf
        .chunks_exact_mut(width * BYTES_PER_PIXEL)
        .take(geometry.height as usize)
        .enumerate()
    {
        for (x, px) in row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let colour = if in_cursor(x as i32, y as i32, pointer) {
                if pointer.buttons != 0 { 0x00FF_8000 } else { 0x00FF_FFFF }
            } else {
                BAR_COLOURS[((x + offset) / bar_width) % BAR_COLOURS.len()]
            };
            px.copy_from_slice(&colour.to_le_bytes());
        }
    }
}

fn in_cursor(x: i32, y: i32, pointer: PointerState) -> bool {
    (pointer.x..pointer.x + CURSOR_SIZE).contains(&x)
        && (pointer.y..pointer.y + CURSOR_SIZE).contains(&y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::DiskKind;
    use crate::{Bridge, BridgeConfig};

    fn pixel(buf: &[u8], width: usize, x: usize, y: usize) -> u32 {
        let i = (y * width + x) * BYTES_PER_PIXEL;
        u32::from_le_bytes(buf[i..i + 4].try_into().unwrap())
    }

    fn request() -> LoadRequest {
        LoadRequest {
            path: None,
            ram_mb: 128,
            kind: DiskKind::Unknown,
        }
    }

    #[test]
    fn render_draws_bars_and_cursor() {
        let geometry = Geometry::new(16, 16);
        let mut buf = vec![0u8; 16 * 16 * 4];
        let pointer = PointerState {
            x: 4,
            y: 4,
            ..Default::default()
        };
        render(&mut buf, geometry, 0, pointer);

        assert_eq!(pixel(&buf, 16, 0, 0), BAR_COLOURS[0]);
        assert_eq!(pixel(&buf, 16, 15, 0), BAR_COLOURS[7]);
        assert_eq!(pixel(&buf, 16, 4, 4), 0x00FF_FFFF);
        assert_eq!(pixel(&buf, 16, 11, 11), 0x00FF_FFFF);
        assert_ne!(pixel(&buf, 16, 12, 12), 0x00FF_FFFF);
    }

    #[test]
    fn bars_scroll_with_frame_count() {
        let geometry = Geometry::new(16, 1);
        let mut a = vec![0u8; 64];
        let mut b = vec![0u8; 64];
        let far_away = PointerState {
            x: -100,
            ..Default::default()
        };
        render(&mut a, geometry, 0, far_away);
        render(&mut b, geometry, 2, far_away);
        assert_eq!(pixel(&b, 16, 0, 0), pixel(&a, 16, 2, 0));
    }

    #[test]
    fn sink_tracks_pointer_and_buttons() {
        let state = Arc::new(Mutex::new(PointerState::default()));
        let mut sink = PatternInput {
            state: Arc::clone(&state),
        };
        sink.pointer_moved(3, 9);
        sink.pointer_button_down(PointerButton::Right);
        sink.key_down(0x24);
        sink.key_up(0x24);
        sink.key_up(0x24);

        let s = *state.lock().unwrap();
        assert_eq!((s.x, s.y, s.buttons, s.keys_held), (3, 9, 0b10, 0));

        sink.pointer_button_up(PointerButton::Right);
        assert_eq!(state.lock().unwrap().buttons, 0);
    }

    #[test]
    fn pattern_machine_feeds_a_bridge() {
        let bridge = Bridge::new(BridgeConfig::default()).unwrap();
        bridge.init(None, 128).unwrap();

        let frames = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&frames);
        bridge.set_video_callback(move |f| seen.lock().unwrap().push((f.width, f.height)));
        let audio = Arc::new(Mutex::new(0usize));
        let heard = Arc::clone(&audio);
        bridge.register(move |cb| cb.set_audio_batch(move |_, n| *heard.lock().unwrap() += n));

        let mut machine = PatternMachine::new(Geometry::new(32, 24));
        let sink = machine.start(&request(), bridge.producer()).unwrap();
        bridge.attach_input_sink(sink);
        assert!(machine.is_running());

        let mut presented = 0;
        for _ in 0..5 {
            if bridge.tick().frame_presented {
                presented += 1;
            }
        }
        machine.stop();
        bridge.deinit();

        assert!(!machine.is_running());
        assert!(presented >= 3, "presented {presented} of 5");
        assert!(frames.lock().unwrap().iter().all(|&dims| dims == (32, 24)));
        assert!(*audio.lock().unwrap() > 0);
    }

    #[test]
    fn stop_is_idempotent() {
        let bridge = Bridge::new(BridgeConfig::default()).unwrap();
        bridge.init(None, 128).unwrap();
        let mut machine = PatternMachine::default().with_tone(0.0);
        machine.start(&request(), bridge.producer()).unwrap();
        machine.stop();
        machine.stop();
        assert!(!machine.is_running());
    }
}

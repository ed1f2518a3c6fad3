//! emubridge-core: a libretro core that hosts a free-running emulated machine.
//!
//! The machine runs on its own thread and produces frames and audio at its
//! own pace; the frontend calls `retro_run` at its own. The [`Bridge`] sits
//! between the two:
//! - the machine pushes interleaved stereo audio into a ring buffer and
//!   submits finished frames to a single-slot mailbox through a [`Producer`];
//! - each `retro_run` becomes one [`Bridge::tick`], which samples input and
//!   forwards edges to the machine, waits (bounded) for a frame and presents
//!   it, then drains queued audio in batches.
//!
//! Crate layout:
//! - `bridge`: lifecycle and per-tick sequencing
//! - `av`: audio ring, frame slot, sample-format shim
//! - `input`: level-to-edge sampling and the [`InputSink`] seam
//! - `callbacks`: host callback registry
//! - `config`: tunables and control mapping
//! - `loader`: game data to [`LoadRequest`]
//! - `machine`: the [`Machine`] seam and a diagnostic pattern generator
//! - `frontend`: libretro runtime handle plumbing

mod abi;
pub mod av;
mod bridge;
pub mod callbacks;
pub mod config;
mod error;
mod frontend;
pub mod input;
pub mod loader;
pub mod machine;

use std::sync::Arc;

use libretro_backend::{
    AudioVideoInfo, Core, CoreInfo, GameData, LoadGameResult, PixelFormat, RuntimeHandle,
    libretro_core,
};
use tracing::{error, info, warn};

pub use crate::abi::{BYTES_PER_PIXEL, device, joypad, mouse, pointer};
pub use crate::bridge::{Bridge, LifecycleState, Producer, Session, TickReport};
pub use crate::config::{
    Binding, BridgeConfig, Capabilities, ControlAction, ControlMap, ControlSource, PointerButton,
    PointerMode,
};
pub use crate::error::BridgeError;
pub use crate::input::{InputEvent, InputSink};
pub use crate::loader::{DiskKind, LoadRequest};
pub use crate::machine::{Geometry, Machine, PatternMachine};

use crate::frontend::HandleSlot;

/// Frame rate reported to the frontend.
pub const FRAMES_PER_SECOND: f64 = 60.0;

/// Extensions offered in the frontend's content browser.
const EXTENSIONS: [&str; 6] = ["iso", "img", "dsk", "hfv", "hdi", "sheep"];

/// Bridge settings used by the libretro core.
///
/// `libretro_backend` only exposes joypads, so the shoulder buttons stand in
/// for the mouse buttons and the cursor is driven by the d-pad.
pub fn libretro_config() -> BridgeConfig {
    use crate::config::{ControlAction::Pointer, PointerButton::{Left, Right}};
    BridgeConfig {
        controls: ControlMap {
            pointer_left: Some(Binding::new(ControlSource::joypad(joypad::L1), Pointer(Left))),
            pointer_right: Some(Binding::new(ControlSource::joypad(joypad::R1), Pointer(Right))),
            pointer_middle: None,
            ..ControlMap::mac_adb()
        },
        pointer: PointerMode::Directional { step: 4 },
        ..BridgeConfig::default()
    }
}

/// The libretro core instance.
pub struct EmuBridgeCore {
    config: BridgeConfig,
    machine: Box<dyn Machine>,
    bridge: Option<Bridge>,
    handle: Arc<HandleSlot>,
    request: Option<LoadRequest>,
    game_data: Option<GameData>,
}

impl Default for EmuBridgeCore {
    fn default() -> Self {
        Self::with_machine(libretro_config(), Box::new(PatternMachine::default()))
    }
}

impl EmuBridgeCore {
    pub fn with_machine(config: BridgeConfig, machine: Box<dyn Machine>) -> Self {
        Self {
            config,
            machine,
            bridge: None,
            handle: Arc::new(HandleSlot::default()),
            request: None,
            game_data: None,
        }
    }

    /// Build the bridge, start the machine and describe the AV stream.
    fn start_session(&mut self, request: &LoadRequest) -> anyhow::Result<AudioVideoInfo> {
        let bridge = Bridge::new(self.config.clone())?;
        bridge.init(request.path.as_deref(), request.ram_mb)?;

        let geometry = self.machine.geometry();
        frontend::register(&bridge, &self.handle, geometry);

        if let Err(e) = bridge.start_machine(self.machine.as_mut(), request) {
            bridge.deinit();
            return Err(e.into());
        }

        let av = AudioVideoInfo::new()
            .video(
                geometry.width,
                geometry.height,
                FRAMES_PER_SECOND,
                PixelFormat::ARGB8888,
            )
            .audio(f64::from(bridge.sample_rate()));
        self.bridge = Some(bridge);
        Ok(av)
    }

    fn end_session(&mut self) {
        self.machine.stop();
        if let Some(bridge) = self.bridge.take() {
            bridge.deinit();
        }
    }
}

impl Core for EmuBridgeCore {
    fn save_memory(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn rtc_memory(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn system_memory(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn video_memory(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn info() -> CoreInfo {
        EXTENSIONS.into_iter().fold(
            CoreInfo::new("EmuBridge", env!("CARGO_PKG_VERSION")),
            |info, ext| info.supports_roms_with_extension(ext),
        )
    }

    fn on_load_game(&mut self, game_data: GameData) -> LoadGameResult {
        let request = match LoadRequest::from_parts(game_data.path(), game_data.data(), 0) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "refusing load");
                return LoadGameResult::Failed(game_data);
            }
        };

        match self.start_session(&request) {
            Ok(av) => {
                info!(path = ?request.path, kind = ?request.kind, "game loaded");
                self.request = Some(request);
                self.game_data = Some(game_data);
                LoadGameResult::Success(av)
            }
            Err(e) => {
                error!(error = %e, "failed to start session");
                self.end_session();
                LoadGameResult::Failed(game_data)
            }
        }
    }

    fn on_unload_game(&mut self) -> GameData {
        self.end_session();
        self.request = None;
        self.game_data
            .take()
            .expect("frontend unloaded a game that was never loaded")
    }

    fn on_run(&mut self, handle: &mut RuntimeHandle) {
        let Some(bridge) = self.bridge.as_ref() else {
            return;
        };
        self.handle.scoped(handle, || bridge.tick());
    }

    fn on_reset(&mut self) {
        let (Some(bridge), Some(request)) = (self.bridge.as_ref(), self.request.as_ref()) else {
            return;
        };
        self.machine.stop();
        if let Err(e) = bridge.start_machine(self.machine.as_mut(), request) {
            error!(error = %e, "machine failed to restart");
        }
    }
}

impl Drop for EmuBridgeCore {
    fn drop(&mut self) {
        self.end_session();
    }
}

libretro_core!(EmuBridgeCore);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn libretro_config_is_valid_and_uses_shoulders_for_mouse() {
        let config = libretro_config();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.controls.pointer_left.map(|b| b.source),
            Some(ControlSource::joypad(joypad::L1))
        );
        assert_eq!(config.controls.up, ControlMap::mac_adb().up);
    }

    struct FailingMachine;

    impl Machine for FailingMachine {
        fn geometry(&self) -> Geometry {
            Geometry::new(8, 8)
        }

        fn start(&mut self, _: &LoadRequest, _: Producer) -> anyhow::Result<Box<dyn InputSink>> {
            anyhow::bail!("no ROM")
        }

        fn stop(&mut self) {}
    }

    fn request() -> LoadRequest {
        LoadRequest {
            path: None,
            ram_mb: 64,
            kind: DiskKind::Unknown,
        }
    }

    #[test]
    fn failed_machine_start_leaves_no_bridge() {
        let mut core = EmuBridgeCore::with_machine(BridgeConfig::default(), Box::new(FailingMachine));
        let Err(err) = core.start_session(&request()) else {
            panic!("session started with a failing machine");
        };
        assert!(err.to_string().contains("no ROM"));
        assert!(core.bridge.is_none());
    }

    #[test]
    fn session_start_and_end() {
        let mut core = EmuBridgeCore::with_machine(
            BridgeConfig::default(),
            Box::new(PatternMachine::new(Geometry::new(16, 16)).with_tone(0.0)),
        );
        core.start_session(&request()).unwrap();
        let bridge = core.bridge.as_ref().unwrap();
        assert!(bridge.is_ready());
        assert_eq!(bridge.session().ram_mb, 64);

        core.end_session();
        assert!(core.bridge.is_none());
    }
}

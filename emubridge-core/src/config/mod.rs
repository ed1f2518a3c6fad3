//! Bridge configuration.
//!
//! Everything the core treats as policy rather than mechanism lives here:
//! buffer sizes, the frame wait bound, and the table that maps frontend
//! controls to events for the emulated machine. The core ships no canonical
//! control mapping; [`ControlMap::mac_adb`] is the preset the libretro glue
//! picks for a classic Mac keyboard/mouse.

use std::fmt;
use std::time::Duration;

use crate::abi::{device, joypad, mouse, pointer};
use crate::error::BridgeError;

/// Where the level of one control is read from on the frontend.
///
/// The four fields are passed verbatim to the host's input-state callback.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ControlSource {
    pub port: u32,
    pub device: u32,
    pub index: u32,
    pub id: u32,
}

impl ControlSource {
    pub const fn new(port: u32, device: u32, index: u32, id: u32) -> Self {
        Self {
            port,
            device,
            index,
            id,
        }
    }

    /// Port 0 joypad button.
    pub const fn joypad(id: u32) -> Self {
        Self::new(0, device::JOYPAD, 0, id)
    }

    /// Port 0 mouse control.
    pub const fn mouse(id: u32) -> Self {
        Self::new(0, device::MOUSE, 0, id)
    }

    /// Port 0 pointer control.
    pub const fn pointer(id: u32) -> Self {
        Self::new(0, device::POINTER, 0, id)
    }
}

/// Pointer buttons understood by the emulated machine's input path.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
}

impl PointerButton {
    /// Button index as the emulated input path numbers them (0 = left).
    pub const fn index(self) -> u32 {
        match self {
            PointerButton::Left => 0,
            PointerButton::Right => 1,
            PointerButton::Middle => 2,
        }
    }
}

/// What an edge on a control turns into.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControlAction {
    /// Key down/up with a machine keycode.
    Key(u32),
    /// Pointer button down/up.
    Pointer(PointerButton),
}

/// A frontend control bound to an action.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Binding {
    pub source: ControlSource,
    pub action: Option<ControlAction>,
}

impl Binding {
    pub const fn new(source: ControlSource, action: ControlAction) -> Self {
        Self {
            source,
            action: Some(action),
        }
    }

    /// Sampled (so pointer nudging still sees it) but forwards nothing.
    pub const fn level_only(source: ControlSource) -> Self {
        Self {
            source,
            action: None,
        }
    }
}

/// Number of action buttons tracked by the sampler.
pub const ACTION_BUTTONS: usize = 4;

/// Control-to-event table.
///
/// Slots are fixed: four directions, [`ACTION_BUTTONS`] action buttons and
/// three pointer buttons. An unbound slot is never sampled.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ControlMap {
    pub up: Option<Binding>,
    pub down: Option<Binding>,
    pub left: Option<Binding>,
    pub right: Option<Binding>,
    pub actions: [Option<Binding>; ACTION_BUTTONS],
    pub pointer_left: Option<Binding>,
    pub pointer_right: Option<Binding>,
    pub pointer_middle: Option<Binding>,
}

/// Apple Desktop Bus keycodes used by [`ControlMap::mac_adb`].
pub mod adb_key {
    pub const UP: u32 = 0x7E;
    pub const DOWN: u32 = 0x7D;
    pub const LEFT: u32 = 0x7B;
    pub const RIGHT: u32 = 0x7C;
    pub const RETURN: u32 = 0x24;
    pub const SPACE: u32 = 0x31;
}

impl ControlMap {
    /// No bindings at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// D-pad to arrow keys, A to Return, B to Space, mouse buttons to pointer
    /// buttons. X and Y are sampled but unbound.
    pub fn mac_adb() -> Self {
        use ControlAction::{Key, Pointer};
        Self {
            up: Some(Binding::new(ControlSource::joypad(joypad::UP), Key(adb_key::UP))),
            down: Some(Binding::new(
                ControlSource::joypad(joypad::DOWN),
                Key(adb_key::DOWN),
            )),
            left: Some(Binding::new(
                ControlSource::joypad(joypad::LEFT),
                Key(adb_key::LEFT),
            )),
            right: Some(Binding::new(
                ControlSource::joypad(joypad::RIGHT),
                Key(adb_key::RIGHT),
            )),
            actions: [
                Some(Binding::new(
                    ControlSource::joypad(joypad::A),
                    Key(adb_key::RETURN),
                )),
                Some(Binding::new(
                    ControlSource::joypad(joypad::B),
                    Key(adb_key::SPACE),
                )),
                Some(Binding::level_only(ControlSource::joypad(joypad::X))),
                Some(Binding::level_only(ControlSource::joypad(joypad::Y))),
            ],
            pointer_left: Some(Binding::new(
                ControlSource::mouse(mouse::LEFT),
                Pointer(PointerButton::Left),
            )),
            pointer_right: Some(Binding::new(
                ControlSource::mouse(mouse::RIGHT),
                Pointer(PointerButton::Right),
            )),
            pointer_middle: Some(Binding::new(
                ControlSource::mouse(mouse::MIDDLE),
                Pointer(PointerButton::Middle),
            )),
        }
    }
}

/// How the pointer position is derived each tick. One mode per session.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PointerMode {
    /// Do not track the pointer.
    Disabled,
    /// The frontend reports coordinates directly.
    Absolute { x: ControlSource, y: ControlSource },
    /// Directional levels move an internal cursor by `step` pixels per tick,
    /// clamped to the last presented frame when its size is known.
    Directional { step: i32 },
}

impl Default for PointerMode {
    fn default() -> Self {
        PointerMode::Absolute {
            x: ControlSource::pointer(pointer::X),
            y: ControlSource::pointer(pointer::Y),
        }
    }
}

/// Tunables for one bridge instance.
///
/// ```
/// use emubridge_core::BridgeConfig;
/// use std::time::Duration;
///
/// let config = BridgeConfig {
///     frame_timeout: Duration::from_millis(250),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct BridgeConfig {
    /// Initial audio ring capacity in stereo frames.
    /// Default: 16384 (~370ms at 44.1kHz)
    pub audio_capacity_frames: usize,

    /// Ceiling for capacity growth. A single push larger than this keeps only
    /// its newest frames.
    /// Default: 131072
    pub audio_max_capacity_frames: usize,

    /// Frames handed to the host per audio callback.
    /// Default: 2048
    pub audio_batch_frames: usize,

    /// Upper bound on audio callbacks per tick.
    /// Default: 8
    pub max_audio_batches_per_tick: usize,

    /// How long a tick waits for the producer to deliver a frame.
    /// Default: 1s
    pub frame_timeout: Duration,

    /// Sample rate reported until the producer sets one.
    /// Default: 44100
    pub default_sample_rate: u32,

    /// Control-to-event table.
    pub controls: ControlMap,

    /// Pointer tracking mode.
    pub pointer: PointerMode,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            audio_capacity_frames: 16384,
            audio_max_capacity_frames: 131072,
            audio_batch_frames: 2048,
            max_audio_batches_per_tick: 8,
            frame_timeout: Duration::from_secs(1),
            default_sample_rate: 44100,
            controls: ControlMap::default(),
            pointer: PointerMode::default(),
        }
    }
}

impl BridgeConfig {
    /// Reject values the bridge cannot run with.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.audio_capacity_frames == 0 {
            return Err(BridgeError::InvalidConfig("audio capacity must be at least 1 frame"));
        }
        if self.audio_max_capacity_frames < self.audio_capacity_frames {
            return Err(BridgeError::InvalidConfig(
                "audio growth ceiling is below the initial capacity",
            ));
        }
        if self.audio_batch_frames == 0 {
            return Err(BridgeError::InvalidConfig("audio batch must be at least 1 frame"));
        }
        if self.max_audio_batches_per_tick == 0 {
            return Err(BridgeError::InvalidConfig("at least one audio batch per tick"));
        }
        if self.default_sample_rate == 0 {
            return Err(BridgeError::InvalidConfig("sample rate must be non-zero"));
        }
        Ok(())
    }
}

/// Host capabilities that may or may not be present.
#[derive(Default)]
pub struct Capabilities {
    /// Reports whether an on-screen GUI currently owns input. While it returns
    /// true, edges are still tracked but not forwarded to the machine.
    pub gui_visible: Option<Box<dyn Fn() -> bool + Send + Sync>>,
}

impl Capabilities {
    pub fn with_gui_visible(mut self, query: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.gui_visible = Some(Box::new(query));
        self
    }

    pub(crate) fn input_suppressed(&self) -> bool {
        self.gui_visible.as_ref().is_some_and(|visible| visible())
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("gui_visible", &self.gui_visible.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.audio_batch_frames, 2048);
        assert_eq!(config.frame_timeout, Duration::from_secs(1));
        assert_eq!(config.controls, ControlMap::empty());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = BridgeConfig {
            audio_capacity_frames: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BridgeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn growth_ceiling_below_capacity_is_rejected() {
        let config = BridgeConfig {
            audio_capacity_frames: 1024,
            audio_max_capacity_frames: 512,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn mac_adb_binds_dpad_to_arrow_keys() {
        let map = ControlMap::mac_adb();
        let up = map.up.expect("up bound");
        assert_eq!(up.source, ControlSource::joypad(joypad::UP));
        assert_eq!(up.action, Some(ControlAction::Key(adb_key::UP)));
        assert_eq!(
            map.pointer_middle.and_then(|b| b.action),
            Some(ControlAction::Pointer(PointerButton::Middle))
        );
        assert_eq!(map.actions[2].and_then(|b| b.action), None);
    }

    #[test]
    fn capabilities_without_gui_never_suppress() {
        assert!(!Capabilities::default().input_suppressed());
        assert!(Capabilities::default()
            .with_gui_visible(|| true)
            .input_suppressed());
    }
}

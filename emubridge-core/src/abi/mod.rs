//! emubridge-core frontend ABI values.
//!
//! The input-state callback is addressed by `(port, device, index, id)`, the
//! same tuple libretro uses. This module names the device classes and control
//! ids the bridge reads, taken from `libretro-sys` so they stay in step with
//! the C header, and maps joypad ids onto `libretro_backend::JoypadButton` for
//! the glue in `crate::frontend`.
//!
//! Pixel data crossing the boundary is always packed 32-bit (XRGB8888).

use libretro_backend::JoypadButton as LrJoypadButton;

/// Bytes per pixel of every frame the bridge moves.
pub const BYTES_PER_PIXEL: usize = 4;

/// Device classes.
pub mod device {
    pub const NONE: u32 = libretro_sys::DEVICE_NONE;
    pub const JOYPAD: u32 = libretro_sys::DEVICE_JOYPAD;
    pub const MOUSE: u32 = libretro_sys::DEVICE_MOUSE;
    pub const POINTER: u32 = libretro_sys::DEVICE_POINTER;
}

/// Joypad control ids.
pub mod joypad {
    pub const B: u32 = libretro_sys::DEVICE_ID_JOYPAD_B;
    pub const Y: u32 = libretro_sys::DEVICE_ID_JOYPAD_Y;
    pub const SELECT: u32 = libretro_sys::DEVICE_ID_JOYPAD_SELECT;
    pub const START: u32 = libretro_sys::DEVICE_ID_JOYPAD_START;
    pub const UP: u32 = libretro_sys::DEVICE_ID_JOYPAD_UP;
    pub const DOWN: u32 = libretro_sys::DEVICE_ID_JOYPAD_DOWN;
    pub const LEFT: u32 = libretro_sys::DEVICE_ID_JOYPAD_LEFT;
    pub const RIGHT: u32 = libretro_sys::DEVICE_ID_JOYPAD_RIGHT;
    pub const A: u32 = libretro_sys::DEVICE_ID_JOYPAD_A;
    pub const X: u32 = libretro_sys::DEVICE_ID_JOYPAD_X;
    pub const L1: u32 = libretro_sys::DEVICE_ID_JOYPAD_L;
    pub const R1: u32 = libretro_sys::DEVICE_ID_JOYPAD_R;
    pub const L2: u32 = libretro_sys::DEVICE_ID_JOYPAD_L2;
    pub const R2: u32 = libretro_sys::DEVICE_ID_JOYPAD_R2;
    pub const L3: u32 = libretro_sys::DEVICE_ID_JOYPAD_L3;
    pub const R3: u32 = libretro_sys::DEVICE_ID_JOYPAD_R3;
}

/// Mouse control ids.
pub mod mouse {
    pub const LEFT: u32 = libretro_sys::DEVICE_ID_MOUSE_LEFT;
    pub const RIGHT: u32 = libretro_sys::DEVICE_ID_MOUSE_RIGHT;
    pub const MIDDLE: u32 = libretro_sys::DEVICE_ID_MOUSE_MIDDLE;
}

/// Pointer control ids.
pub mod pointer {
    pub const X: u32 = libretro_sys::DEVICE_ID_POINTER_X;
    pub const Y: u32 = libretro_sys::DEVICE_ID_POINTER_Y;
    pub const PRESSED: u32 = libretro_sys::DEVICE_ID_POINTER_PRESSED;
}

/// Convert a joypad control id into the libretro-backend button enum.
pub fn map_joypad_button(id: u32) -> Option<LrJoypadButton> {
    match id {
        joypad::B => Some(LrJoypadButton::B),
        joypad::Y => Some(LrJoypadButton::Y),
        joypad::SELECT => Some(LrJoypadButton::Select),
        joypad::START => Some(LrJoypadButton::Start),
        joypad::UP => Some(LrJoypadButton::Up),
        joypad::DOWN => Some(LrJoypadButton::Down),
        joypad::LEFT => Some(LrJoypadButton::Left),
        joypad::RIGHT => Some(LrJoypadButton::Right),
        joypad::A => Some(LrJoypadButton::A),
        joypad::X => Some(LrJoypadButton::X),
        joypad::L1 => Some(LrJoypadButton::L1),
        joypad::R1 => Some(LrJoypadButton::R1),
        joypad::L2 => Some(LrJoypadButton::L2),
        joypad::R2 => Some(LrJoypadButton::R2),
        joypad::L3 => Some(LrJoypadButton::L3),
        joypad::R3 => Some(LrJoypadButton::R3),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_joypad_id_maps() {
        for id in joypad::B..=joypad::R3 {
            assert!(map_joypad_button(id).is_some(), "id {id} unmapped");
        }
    }

    #[test]
    fn unknown_joypad_id_is_none() {
        assert!(map_joypad_button(99).is_none());
    }

    #[test]
    fn device_classes_are_distinct() {
        let classes = [device::NONE, device::JOYPAD, device::MOUSE, device::POINTER];
        for (i, a) in classes.iter().enumerate() {
            for b in &classes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}

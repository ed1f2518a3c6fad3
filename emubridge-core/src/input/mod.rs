//! Input module for emubridge-core.
//!
//! Responsibilities:
//! - Read a fixed set of frontend controls once per tick through the host's
//!   input-state callback.
//! - Turn level changes into discrete down/up events (one per transition).
//! - Track the pointer, either from absolute coordinates or by nudging an
//!   internal cursor with the directional controls.
//! - Forward the resulting events, in order, to the emulated machine's
//!   [`InputSink`].
//!
//! Which frontend control feeds which event is configuration
//! ([`ControlMap`]); this module only implements the edge mechanics.

use crate::config::{
    ACTION_BUTTONS, Binding, ControlAction, ControlMap, ControlSource, PointerButton, PointerMode,
};

/// The emulated machine's discrete input entry points.
///
/// Implemented by the emulation core; called synchronously from the tick
/// before the frame wait.
pub trait InputSink: Send {
    fn key_down(&mut self, code: u32);
    fn key_up(&mut self, code: u32);
    fn pointer_button_down(&mut self, button: PointerButton);
    fn pointer_button_up(&mut self, button: PointerButton);
    fn pointer_moved(&mut self, x: i32, y: i32);
}

/// One discrete event produced by the sampler.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InputEvent {
    KeyDown(u32),
    KeyUp(u32),
    PointerMoved { x: i32, y: i32 },
    PointerButtonDown(PointerButton),
    PointerButtonUp(PointerButton),
}

impl InputEvent {
    /// Deliver this event to `sink`.
    pub fn dispatch(self, sink: &mut dyn InputSink) {
        match self {
            InputEvent::KeyDown(code) => sink.key_down(code),
            InputEvent::KeyUp(code) => sink.key_up(code),
            InputEvent::PointerMoved { x, y } => sink.pointer_moved(x, y),
            InputEvent::PointerButtonDown(b) => sink.pointer_button_down(b),
            InputEvent::PointerButtonUp(b) => sink.pointer_button_up(b),
        }
    }

    fn edge(action: ControlAction, pressed: bool) -> Self {
        match (action, pressed) {
            (ControlAction::Key(code), true) => InputEvent::KeyDown(code),
            (ControlAction::Key(code), false) => InputEvent::KeyUp(code),
            (ControlAction::Pointer(b), true) => InputEvent::PointerButtonDown(b),
            (ControlAction::Pointer(b), false) => InputEvent::PointerButtonUp(b),
        }
    }
}

// Slot order is the forwarding order: directions, actions, pointer buttons.
const UP: usize = 0;
const DOWN: usize = 1;
const LEFT: usize = 2;
const RIGHT: usize = 3;
const FIRST_ACTION: usize = 4;
const FIRST_POINTER_BUTTON: usize = FIRST_ACTION + ACTION_BUTTONS;
const SLOTS: usize = FIRST_POINTER_BUTTON + 3;

/// Per-tick level-to-edge converter.
#[derive(Debug)]
pub struct InputEdgeSampler {
    bindings: [Option<Binding>; SLOTS],
    pointer: PointerMode,
    /// Level recorded on the previous tick, per slot (true = pressed).
    levels: [bool; SLOTS],
    cursor: (i32, i32),
}

impl InputEdgeSampler {
    pub fn new(controls: &ControlMap, pointer: PointerMode) -> Self {
        let mut bindings = [None; SLOTS];
        bindings[UP] = controls.up;
        bindings[DOWN] = controls.down;
        bindings[LEFT] = controls.left;
        bindings[RIGHT] = controls.right;
        bindings[FIRST_ACTION..FIRST_POINTER_BUTTON].copy_from_slice(&controls.actions);
        bindings[FIRST_POINTER_BUTTON] = controls.pointer_left;
        bindings[FIRST_POINTER_BUTTON + 1] = controls.pointer_right;
        bindings[FIRST_POINTER_BUTTON + 2] = controls.pointer_middle;

        Self {
            bindings,
            pointer,
            levels: [false; SLOTS],
            cursor: (0, 0),
        }
    }

    /// Forget all recorded levels and park the cursor at the origin.
    pub fn reset(&mut self) {
        self.levels = [false; SLOTS];
        self.cursor = (0, 0);
    }

    /// Last pointer position the sampler reported (or would report).
    pub fn cursor(&self) -> (i32, i32) {
        self.cursor
    }

    /// Sample every bound control and append this tick's events to `events`.
    ///
    /// `read` is the host's input-state query. `frame_size` is the last
    /// presented frame, used to clamp a directionally-driven cursor. State is
    /// updated whether or not the caller goes on to forward the events.
    pub fn sample(
        &mut self,
        mut read: impl FnMut(ControlSource) -> i16,
        frame_size: Option<(u32, u32)>,
        events: &mut Vec<InputEvent>,
    ) {
        let mut now = [false; SLOTS];
        for (slot, binding) in self.bindings.iter().enumerate() {
            if let Some(binding) = binding {
                now[slot] = read(binding.source) != 0;
            }
        }

        // Directions, then action buttons.
        for slot in 0..FIRST_POINTER_BUTTON {
            self.push_edge(slot, now[slot], events);
        }

        match self.pointer {
            PointerMode::Disabled => {}
            PointerMode::Absolute { x, y } => {
                let next = (i32::from(read(x)), i32::from(read(y)));
                self.move_cursor(next, events);
            }
            PointerMode::Directional { step } => {
                let dx = (now[RIGHT] as i32 - now[LEFT] as i32).saturating_mul(step);
                let dy = (now[DOWN] as i32 - now[UP] as i32).saturating_mul(step);
                let mut next = (
                    self.cursor.0.saturating_add(dx),
                    self.cursor.1.saturating_add(dy),
                );
                if let Some((w, h)) = frame_size {
                    next.0 = next.0.clamp(0, (w as i32 - 1).max(0));
                    next.1 = next.1.clamp(0, (h as i32 - 1).max(0));
                }
                self.move_cursor(next, events);
            }
        }

        for slot in FIRST_POINTER_BUTTON..SLOTS {
            self.push_edge(slot, now[slot], events);
        }
    }

    fn push_edge(&mut self, slot: usize, pressed: bool, events: &mut Vec<InputEvent>) {
        let was = std::mem::replace(&mut self.levels[slot], pressed);
        if was == pressed {
            return;
        }
        if let Some(action) = self.bindings[slot].and_then(|b| b.action) {
            events.push(InputEvent::edge(action, pressed));
        }
    }

    fn move_cursor(&mut self, next: (i32, i32), events: &mut Vec<InputEvent>) {
        if next != self.cursor {
            self.cursor = next;
            events.push(InputEvent::PointerMoved {
                x: next.0,
                y: next.1,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{joypad, mouse, pointer};
    use crate::config::adb_key;
    use std::collections::HashMap;

    /// A scripted frontend: levels per control source, changed between ticks.
    #[derive(Default)]
    struct Levels(HashMap<ControlSource, i16>);

    impl Levels {
        fn set(&mut self, source: ControlSource, value: i16) {
            self.0.insert(source, value);
        }

        fn read(&self, source: ControlSource) -> i16 {
            self.0.get(&source).copied().unwrap_or(0)
        }
    }

    fn tick(sampler: &mut InputEdgeSampler, levels: &Levels) -> Vec<InputEvent> {
        tick_in(sampler, levels, None)
    }

    fn tick_in(
        sampler: &mut InputEdgeSampler,
        levels: &Levels,
        frame: Option<(u32, u32)>,
    ) -> Vec<InputEvent> {
        let mut events = Vec::new();
        sampler.sample(|s| levels.read(s), frame, &mut events);
        events
    }

    #[test]
    fn level_sequence_emits_one_event_per_transition() {
        let mut sampler = InputEdgeSampler::new(&ControlMap::mac_adb(), PointerMode::Disabled);
        let a = ControlSource::joypad(joypad::A);
        let mut levels = Levels::default();

        let mut all = Vec::new();
        for level in [0, 1, 1, 0] {
            levels.set(a, level);
            all.extend(tick(&mut sampler, &levels));
        }

        assert_eq!(
            all,
            [
                InputEvent::KeyDown(adb_key::RETURN),
                InputEvent::KeyUp(adb_key::RETURN)
            ]
        );
    }

    #[test]
    fn unbound_controls_are_not_read() {
        let mut sampler = InputEdgeSampler::new(&ControlMap::empty(), PointerMode::Disabled);
        let mut events = Vec::new();
        sampler.sample(|s| panic!("read {s:?}"), None, &mut events);
        assert!(events.is_empty());
    }

    #[test]
    fn level_only_binding_tracks_state_but_emits_nothing() {
        let mut sampler = InputEdgeSampler::new(&ControlMap::mac_adb(), PointerMode::Disabled);
        let mut levels = Levels::default();
        levels.set(ControlSource::joypad(joypad::X), 1);
        assert!(tick(&mut sampler, &levels).is_empty());
    }

    #[test]
    fn events_follow_direction_action_pointer_order() {
        let mut sampler = InputEdgeSampler::new(&ControlMap::mac_adb(), PointerMode::default());
        let mut levels = Levels::default();
        levels.set(ControlSource::mouse(mouse::LEFT), 1);
        levels.set(ControlSource::joypad(joypad::B), 1);
        levels.set(ControlSource::joypad(joypad::UP), 1);
        levels.set(ControlSource::pointer(pointer::X), 10);
        levels.set(ControlSource::pointer(pointer::Y), 20);

        assert_eq!(
            tick(&mut sampler, &levels),
            [
                InputEvent::KeyDown(adb_key::UP),
                InputEvent::KeyDown(adb_key::SPACE),
                InputEvent::PointerMoved { x: 10, y: 20 },
                InputEvent::PointerButtonDown(PointerButton::Left),
            ]
        );
    }

    #[test]
    fn absolute_pointer_reports_only_changes() {
        let mut sampler = InputEdgeSampler::new(&ControlMap::empty(), PointerMode::default());
        let mut levels = Levels::default();
        levels.set(ControlSource::pointer(pointer::X), 5);

        assert_eq!(
            tick(&mut sampler, &levels),
            [InputEvent::PointerMoved { x: 5, y: 0 }]
        );
        assert!(tick(&mut sampler, &levels).is_empty());

        levels.set(ControlSource::pointer(pointer::Y), -3);
        assert_eq!(
            tick(&mut sampler, &levels),
            [InputEvent::PointerMoved { x: 5, y: -3 }]
        );
    }

    #[test]
    fn directional_pointer_moves_each_tick_while_held() {
        let mut sampler =
            InputEdgeSampler::new(&ControlMap::mac_adb(), PointerMode::Directional { step: 4 });
        let mut levels = Levels::default();
        levels.set(ControlSource::joypad(joypad::RIGHT), 1);
        levels.set(ControlSource::joypad(joypad::DOWN), 1);

        let first = tick(&mut sampler, &levels);
        assert!(first.contains(&InputEvent::PointerMoved { x: 4, y: 4 }));
        let second = tick(&mut sampler, &levels);
        assert_eq!(second, [InputEvent::PointerMoved { x: 8, y: 8 }]);
        assert_eq!(sampler.cursor(), (8, 8));
    }

    #[test]
    fn directional_pointer_clamps_to_frame() {
        let mut sampler =
            InputEdgeSampler::new(&ControlMap::mac_adb(), PointerMode::Directional { step: 8 });
        let mut levels = Levels::default();
        levels.set(ControlSource::joypad(joypad::LEFT), 1);

        // Already at the origin: clamped, no movement.
        assert_eq!(
            tick_in(&mut sampler, &levels, Some((10, 10))),
            [InputEvent::KeyDown(adb_key::LEFT)]
        );

        levels.set(ControlSource::joypad(joypad::LEFT), 0);
        levels.set(ControlSource::joypad(joypad::RIGHT), 1);
        for _ in 0..4 {
            tick_in(&mut sampler, &levels, Some((10, 10)));
        }
        assert_eq!(sampler.cursor(), (9, 0));
    }

    #[test]
    fn directional_pointer_is_unclamped_without_frame() {
        let mut sampler =
            InputEdgeSampler::new(&ControlMap::empty(), PointerMode::Directional { step: 3 });
        // No bindings: directions never read as pressed.
        assert!(tick(&mut sampler, &Levels::default()).is_empty());

        let mut map = ControlMap::empty();
        map.left = Some(Binding::level_only(ControlSource::joypad(joypad::LEFT)));
        let mut sampler = InputEdgeSampler::new(&map, PointerMode::Directional { step: 3 });
        let mut levels = Levels::default();
        levels.set(ControlSource::joypad(joypad::LEFT), 1);
        assert_eq!(
            tick(&mut sampler, &levels),
            [InputEvent::PointerMoved { x: -3, y: 0 }]
        );
    }

    #[test]
    fn unclamped_directional_pointer_saturates() {
        let mut map = ControlMap::empty();
        map.right = Some(Binding::level_only(ControlSource::joypad(joypad::RIGHT)));
        let mut sampler =
            InputEdgeSampler::new(&map, PointerMode::Directional { step: i32::MAX });
        let mut levels = Levels::default();
        levels.set(ControlSource::joypad(joypad::RIGHT), 1);

        tick(&mut sampler, &levels);
        assert_eq!(sampler.cursor(), (i32::MAX, 0));
        // Further movement stays pinned and reports nothing new.
        assert!(tick(&mut sampler, &levels).is_empty());
        assert_eq!(sampler.cursor(), (i32::MAX, 0));
    }

    #[test]
    fn reset_clears_levels() {
        let mut sampler = InputEdgeSampler::new(&ControlMap::mac_adb(), PointerMode::Disabled);
        let mut levels = Levels::default();
        levels.set(ControlSource::joypad(joypad::A), 1);
        tick(&mut sampler, &levels);

        sampler.reset();
        assert_eq!(
            tick(&mut sampler, &levels),
            [InputEvent::KeyDown(adb_key::RETURN)]
        );
    }

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl InputSink for Recorder {
        fn key_down(&mut self, code: u32) {
            self.0.push(format!("down {code:#x}"));
        }
        fn key_up(&mut self, code: u32) {
            self.0.push(format!("up {code:#x}"));
        }
        fn pointer_button_down(&mut self, button: PointerButton) {
            self.0.push(format!("button down {}", button.index()));
        }
        fn pointer_button_up(&mut self, button: PointerButton) {
            self.0.push(format!("button up {}", button.index()));
        }
        fn pointer_moved(&mut self, x: i32, y: i32) {
            self.0.push(format!("move {x},{y}"));
        }
    }

    #[test]
    fn dispatch_routes_to_matching_entry_point() {
        let mut sink = Recorder::default();
        for event in [
            InputEvent::KeyDown(0x24),
            InputEvent::PointerMoved { x: 1, y: 2 },
            InputEvent::PointerButtonUp(PointerButton::Right),
            InputEvent::KeyUp(0x24),
        ] {
            event.dispatch(&mut sink);
        }
        assert_eq!(sink.0, ["down 0x24", "move 1,2", "button up 1", "up 0x24"]);
    }
}

//! Input translation
//!
//! Turns host motion and key events into NWM calls. Only the whole view of a
//! top-level window and the desktop view consume pointer input; everything
//! else reports "not handled" so the host can fall back.

use std::collections::HashMap;

use nwm_bridge_ipc::codes::{
    GAMEPAD_AXIS_COUNT, GAMEPAD_BUTTON_PRESSED, HORIZONTAL_SCROLL_FLAG, WHEEL_DELTA,
};
use nwm_bridge_ipc::{AxisReading, JoystickAxis, KeyAction, KeySample, MotionAction, MotionSample, WindowId};
use tracing::{debug, info};

use crate::nwm::NativeWm;
use crate::wm::device::InputSource;
use crate::wm::node::{NodeKind, WindowNode};
use crate::wm::tree::WindowTree;

/// Touchpad scroll in progress on one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScrollGesture {
    device_id: i32,
    origin_x: i32,
    origin_y: i32,
    last_x: i32,
    last_y: i32,
}

/// Event router
#[derive(Debug)]
pub struct EventRouter {
    /// Active touchpad gestures per top-level window
    gestures: HashMap<WindowId, ScrollGesture>,

    /// Scroll amount reported per wheel notch
    wheel_step: i32,

    /// Or-ed into the action of horizontal scroll events
    horizontal_flag: u32,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::with_wheel(WHEEL_DELTA, HORIZONTAL_SCROLL_FLAG)
    }

    pub fn with_wheel(wheel_step: i32, horizontal_flag: u32) -> Self {
        Self {
            gestures: HashMap::new(),
            wheel_step,
            horizontal_flag,
        }
    }

    /// Drop per-window state of a destroyed window
    pub fn forget(&mut self, window: WindowId) {
        self.gestures.remove(&window);
    }

    pub fn gesture_active(&self, window: WindowId) -> bool {
        self.gestures.contains_key(&window)
    }

    /// Event position in NWM coordinates.
    ///
    /// Top-level windows use the view-local position plus the window's
    /// logical origin, which ignores any off-screen parking of the view.
    fn event_pos(node: &WindowNode, sample: &MotionSample, dpi_scale: f32) -> (i32, i32) {
        match node.kind {
            NodeKind::TopLevel { .. } => (
                (sample.x + node.visible_rect.left as f32).round() as i32,
                (sample.y + node.visible_rect.top as f32).round() as i32,
            ),
            _ => (
                (sample.raw_x / dpi_scale).round() as i32,
                (sample.raw_y / dpi_scale).round() as i32,
            ),
        }
    }

    /// Route a motion event; returns whether it was consumed
    pub fn motion(&mut self, tree: &WindowTree, nwm: &mut dyn NativeWm, sample: &MotionSample) -> bool {
        let Some(node) = tree.lookup(sample.window_id) else {
            debug!("motion event for unknown window {:08x}", sample.window_id);
            return false;
        };
        let consumes = matches!(node.kind, NodeKind::TopLevel { .. } | NodeKind::Desktop);
        if sample.client || !consumes {
            return false;
        }

        let source = InputSource::from_raw(sample.source);
        let action = MotionAction::from_code(sample.action);
        let pos = Self::event_pos(node, sample, tree.dpi_scale());

        if source.is(InputSource::JOYSTICK) && action == Some(MotionAction::Move) {
            return self.joystick(nwm, sample);
        }

        match action {
            Some(MotionAction::Scroll) if source.is(InputSource::CLASS_POINTER) => {
                self.wheel(nwm, sample, pos)
            }
            Some(
                MotionAction::HoverMove
                | MotionAction::HoverEnter
                | MotionAction::HoverExit
                | MotionAction::ButtonPress
                | MotionAction::ButtonRelease,
            ) => {
                if !source.is(InputSource::CLASS_POINTER) {
                    return false;
                }
                debug!(
                    "view motion event win {:08x} action {} pos {},{} buttons {:04x}",
                    sample.window_id, sample.action, pos.0, pos.1, sample.button_state
                );
                nwm.motion_event(sample.window_id, sample.action, pos.0, pos.1, sample.button_state, 0)
            }
            _ => self.touch(nwm, sample, action, pos),
        }
    }

    fn touch(
        &mut self,
        nwm: &mut dyn NativeWm,
        sample: &MotionSample,
        action: Option<MotionAction>,
        (x, y): (i32, i32),
    ) -> bool {
        let window = sample.window_id;
        let buttons = sample.button_state;
        let hover = MotionAction::HoverMove.code();
        let scroll = MotionAction::Scroll.code();

        debug!(
            "view touch event win {:08x} action {} pos {},{} buttons {:04x}",
            window, sample.action, x, y, buttons
        );

        if InputSource::from_raw(sample.source).is(InputSource::MOUSE)
            && buttons == 0
            && action == Some(MotionAction::Down)
        {
            info!("view begin touchpad scroll win {:08x}", window);
            self.gestures.insert(
                window,
                ScrollGesture {
                    device_id: sample.device_id,
                    origin_x: x,
                    origin_y: y,
                    last_x: x,
                    last_y: y,
                },
            );
            // put the pointer in place without pressing a button
            return nwm.motion_event(window, hover, x, y, buttons, 0);
        }

        let gesture = match self.gestures.get_mut(&window) {
            Some(gesture) if gesture.device_id == sample.device_id => gesture,
            _ => return nwm.motion_event(window, sample.action, x, y, buttons, 0),
        };
        let (origin_x, origin_y) = (gesture.origin_x, gesture.origin_y);

        let (hscroll, vscroll) = match action {
            Some(MotionAction::Move) => {
                let delta = (gesture.last_x - x, y - gesture.last_y);
                gesture.last_x = x;
                gesture.last_y = y;
                delta
            }
            // release only ends the gesture
            Some(MotionAction::Up) => (0, 0),
            Some(MotionAction::Cancel) => (gesture.last_x - origin_x, origin_y - gesture.last_y),
            _ => return nwm.motion_event(window, sample.action, x, y, buttons, 0),
        };

        if hscroll != 0 {
            debug!("view touchpad hscroll {}", hscroll);
            nwm.motion_event(window, scroll | self.horizontal_flag, origin_x, origin_y, buttons, hscroll);
        }
        if vscroll != 0 {
            debug!("view touchpad vscroll {}", vscroll);
            nwm.motion_event(window, scroll, origin_x, origin_y, buttons, vscroll);
        }

        if action == Some(MotionAction::Move) {
            return true;
        }

        info!("view end touchpad scroll win {:08x}", window);
        self.gestures.remove(&window);
        // no button went down, so no button goes up either
        nwm.motion_event(window, hover, origin_x, origin_y, buttons, 0)
    }

    fn wheel(&mut self, nwm: &mut dyn NativeWm, sample: &MotionSample, (x, y): (i32, i32)) -> bool {
        let window = sample.window_id;
        let hscroll = sample.hscroll as i32;
        let vscroll = sample.vscroll as i32;
        debug!(
            "view scroll event win {:08x} pos {},{} buttons {:04x} scroll {},{}",
            window, x, y, sample.button_state, hscroll, vscroll
        );

        if vscroll != 0 {
            let amount = if vscroll < 0 { -self.wheel_step } else { self.wheel_step };
            nwm.motion_event(window, sample.action, x, y, sample.button_state, amount);
        }
        if hscroll != 0 {
            let amount = if hscroll < 0 { self.wheel_step } else { -self.wheel_step };
            nwm.motion_event(window, sample.action | self.horizontal_flag, x, y, sample.button_state, amount);
        }
        true
    }

    fn joystick(&mut self, nwm: &mut dyn NativeWm, sample: &MotionSample) -> bool {
        let centered = |axis: JoystickAxis| -> f32 {
            sample
                .axes
                .iter()
                .find(|reading| reading.axis == axis)
                .map_or(0.0, |reading: &AxisReading| {
                    if reading.value.abs() > reading.flat { reading.value } else { 0.0 }
                })
        };
        let either = |primary: JoystickAxis, fallback: JoystickAxis| -> f32 {
            let value = centered(primary);
            if value == 0.0 { centered(fallback) } else { value }
        };

        let axes: [f32; GAMEPAD_AXIS_COUNT] = [
            centered(JoystickAxis::X),
            centered(JoystickAxis::Y),
            centered(JoystickAxis::Z),
            centered(JoystickAxis::Rx),
            centered(JoystickAxis::Ry),
            centered(JoystickAxis::Rz),
            either(JoystickAxis::LTrigger, JoystickAxis::Brake),
            either(JoystickAxis::RTrigger, JoystickAxis::Gas),
            centered(JoystickAxis::HatX),
            centered(JoystickAxis::HatY),
        ];
        debug!("joystick motion device {} axes {:?}", sample.device_id, axes);
        nwm.gamepad_axis(sample.device_id, axes);
        true
    }

    /// Route a key event; gamepad buttons go to the gamepad path
    pub fn key(&mut self, nwm: &mut dyn NativeWm, sample: &KeySample) -> bool {
        let source = InputSource::from_raw(sample.source);
        if source.is(InputSource::GAMEPAD) {
            let value = match KeyAction::from_code(sample.action) {
                Some(KeyAction::Down) => Some(GAMEPAD_BUTTON_PRESSED),
                Some(KeyAction::Up) => Some(0),
                _ => None,
            };
            if let Some(value) = value {
                debug!("gamepad {} button {} value {:#x}", sample.device_id, sample.keycode, value);
                nwm.gamepad_button(sample.device_id, sample.keycode, value);
                return true;
            }
        }

        debug!(
            "view key event win {:08x} action {} keycode {}",
            sample.window_id, sample.action, sample.keycode
        );
        nwm.keyboard_event(sample.window_id, sample.action, sample.keycode, sample.meta_state)
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Input method relay
#[derive(Debug, Default)]
pub struct ImeRelay {
    composing: bool,
}

/// Length of `text` in UTF-16 units, as the NWM counts it
fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

impl ImeRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_composing(&self) -> bool {
        self.composing
    }

    pub fn compose(&mut self, nwm: &mut dyn NativeWm, text: &str, cursor: i32) {
        debug!("ime compose '{}' cursor {}", text, cursor);
        self.composing = true;
        nwm.ime_start();
        nwm.ime_set_text(text, utf16_len(text), cursor);
    }

    /// Commit text; a single character the host mapped to key events is
    /// typed instead of inserted
    pub fn commit(
        &mut self,
        router: &mut EventRouter,
        nwm: &mut dyn NativeWm,
        text: &str,
        cursor: i32,
        key_events: Option<&[KeySample]>,
    ) {
        debug!("ime commit '{}'", text);
        self.composing = false;
        match key_events {
            Some(keys) if !keys.is_empty() => {
                nwm.ime_cancel();
                for key in keys {
                    router.key(nwm, key);
                }
            }
            _ => {
                nwm.ime_start();
                nwm.ime_set_text(text, utf16_len(text), cursor);
                nwm.ime_finish();
            }
        }
    }

    pub fn finish(&mut self, nwm: &mut dyn NativeWm) {
        self.composing = false;
        nwm.ime_finish();
    }

    pub fn clear_meta_key_states(&mut self, nwm: &mut dyn NativeWm, states: u32) {
        debug!("ime clear meta key states {:#x}", states);
        nwm.clear_meta_key_states(states);
    }
}

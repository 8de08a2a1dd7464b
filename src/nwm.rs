//! Calls into the native window manager
//!
//! [`NativeWm`] is the outbound half of the call boundary. The daemon uses
//! [`ChannelNwm`], which turns every call into an [`NwmCall`] message;
//! tests use [`RecordingNwm`].

use std::sync::Arc;

use nwm_bridge_ipc::codes::GAMEPAD_AXIS_COUNT;
use nwm_bridge_ipc::{NwmCall, WindowId};
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::shared::SurfaceHandle;

pub trait NativeWm {
    /// A backing appeared, changed or went away (`None`)
    fn surface_changed(&mut self, window: WindowId, surface: Option<SurfaceHandle>, client: bool);

    /// Returns whether the NWM handled the key
    fn keyboard_event(&mut self, window: WindowId, action: u32, keycode: i32, meta_state: u32) -> bool;

    /// Returns whether the NWM handled the event
    fn motion_event(&mut self, window: WindowId, action: u32, x: i32, y: i32, buttons: u32, scroll: i32) -> bool;

    fn desktop_changed(&mut self, width: i32, height: i32);

    fn config_changed(&mut self, dpi: u32);

    fn gamepad_count(&mut self, count: usize);

    fn gamepad_data(&mut self, index: usize, device_id: i32, name: &str);

    fn gamepad_axis(&mut self, device_id: i32, axes: [f32; GAMEPAD_AXIS_COUNT]);

    fn gamepad_button(&mut self, device_id: i32, button: i32, value: u32);

    fn window_close(&mut self, window: WindowId);

    fn syscommand(&mut self, window: WindowId, command: u32);

    fn ime_start(&mut self);

    fn ime_set_text(&mut self, text: &str, length: usize, cursor: i32);

    fn ime_finish(&mut self);

    fn ime_cancel(&mut self);

    fn clear_meta_key_states(&mut self, states: u32);

    fn clipdata_update(&mut self, flags: u32, mime_types: Option<Vec<String>>);
}

/// Anything that can deliver an [`NwmCall`] is a [`NativeWm`]
pub trait CallSink {
    /// Deliver one call; the return value is the `handled` answer for input events
    fn emit(&mut self, call: NwmCall) -> bool;
}

impl<T: CallSink> NativeWm for T {
    fn surface_changed(&mut self, window: WindowId, surface: Option<SurfaceHandle>, client: bool) {
        self.emit(NwmCall::SurfaceChanged {
            window_id: window,
            surface: surface.map(|s| s.0),
            client,
        });
    }

    fn keyboard_event(&mut self, window: WindowId, action: u32, keycode: i32, meta_state: u32) -> bool {
        self.emit(NwmCall::Keyboard {
            window_id: window,
            action,
            keycode,
            meta_state,
        })
    }

    fn motion_event(&mut self, window: WindowId, action: u32, x: i32, y: i32, buttons: u32, scroll: i32) -> bool {
        self.emit(NwmCall::Motion {
            window_id: window,
            action,
            x,
            y,
            buttons,
            scroll,
        })
    }

    fn desktop_changed(&mut self, width: i32, height: i32) {
        self.emit(NwmCall::DesktopChanged { width, height });
    }

    fn config_changed(&mut self, dpi: u32) {
        self.emit(NwmCall::ConfigChanged { dpi });
    }

    fn gamepad_count(&mut self, count: usize) {
        self.emit(NwmCall::GamepadCount { count });
    }

    fn gamepad_data(&mut self, index: usize, device_id: i32, name: &str) {
        self.emit(NwmCall::GamepadData {
            index,
            device_id,
            name: name.to_string(),
        });
    }

    fn gamepad_axis(&mut self, device_id: i32, axes: [f32; GAMEPAD_AXIS_COUNT]) {
        self.emit(NwmCall::GamepadAxis { device_id, axes });
    }

    fn gamepad_button(&mut self, device_id: i32, button: i32, value: u32) {
        self.emit(NwmCall::GamepadButton { device_id, button, value });
    }

    fn window_close(&mut self, window: WindowId) {
        self.emit(NwmCall::WindowClose { window_id: window });
    }

    fn syscommand(&mut self, window: WindowId, command: u32) {
        self.emit(NwmCall::SysCommand { window_id: window, command });
    }

    fn ime_start(&mut self) {
        self.emit(NwmCall::ImeStart);
    }

    fn ime_set_text(&mut self, text: &str, length: usize, cursor: i32) {
        self.emit(NwmCall::ImeSetText {
            text: text.to_string(),
            length,
            cursor,
        });
    }

    fn ime_finish(&mut self) {
        self.emit(NwmCall::ImeFinish);
    }

    fn ime_cancel(&mut self) {
        self.emit(NwmCall::ImeCancel);
    }

    fn clear_meta_key_states(&mut self, states: u32) {
        self.emit(NwmCall::ClearMetaKeyStates { states });
    }

    fn clipdata_update(&mut self, flags: u32, mime_types: Option<Vec<String>>) {
        self.emit(NwmCall::ClipdataUpdate { flags, mime_types });
    }
}

/// Posts calls to a channel drained by the IPC writer.
///
/// Input events count as handled once they are queued; the remote side
/// cannot answer synchronously.
#[derive(Debug, Clone)]
pub struct ChannelNwm {
    tx: UnboundedSender<NwmCall>,
}

impl ChannelNwm {
    pub fn new(tx: UnboundedSender<NwmCall>) -> Self {
        Self { tx }
    }
}

impl CallSink for ChannelNwm {
    fn emit(&mut self, call: NwmCall) -> bool {
        debug!("-> nwm {:?}", call);
        if self.tx.send(call).is_err() {
            warn!("NWM channel closed, dropping call");
            return false;
        }
        true
    }
}

/// Records every call; input events report `handled`.
#[derive(Debug, Clone)]
pub struct RecordingNwm {
    calls: Arc<Mutex<Vec<NwmCall>>>,
    handled: bool,
}

impl RecordingNwm {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            handled: true,
        }
    }

    /// What keyboard and motion events report back
    pub fn with_handled(mut self, handled: bool) -> Self {
        self.handled = handled;
        self
    }

    /// Snapshot of the calls so far
    pub fn calls(&self) -> Vec<NwmCall> {
        self.calls.lock().clone()
    }

    /// Take the calls recorded so far
    pub fn drain(&self) -> Vec<NwmCall> {
        std::mem::take(&mut *self.calls.lock())
    }
}

impl Default for RecordingNwm {
    fn default() -> Self {
        Self::new()
    }
}

impl CallSink for RecordingNwm {
    fn emit(&mut self, call: NwmCall) -> bool {
        self.calls.lock().push(call);
        self.handled
    }
}

//! nwm-bridge IPC Protocol
//!
//! Shared message types for the call boundary between the native window
//! manager (NWM) and the bridge that mirrors its windows into the host.

pub mod codes;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use codes::{KeyAction, MotionAction, WindowId};

/// Frames above this size are treated as a broken peer.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Socket path for IPC communication
pub fn socket_path() -> std::path::PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));
    std::path::PathBuf::from(runtime_dir).join("nwm-bridge.sock")
}

/// Axis-aligned rectangle in NWM coordinate space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub const fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Translate by `(dx, dy)`.
    pub const fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})-({},{})", self.left, self.top, self.right, self.bottom)
    }
}

/// Environment overrides passed along with a command.
pub type CommandEnv = BTreeMap<String, String>;

/// Cursor requested by the NWM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CursorSpec {
    /// One of the host's stock pointer icons.
    System { id: i32 },
    /// ARGB bitmap with a hotspot.
    Custom {
        width: u32,
        height: u32,
        hotspot_x: i32,
        hotspot_y: i32,
        pixels: Vec<u32>,
    },
}

// ============================================================================
// NWM → Bridge Events
// ============================================================================

/// Events sent by the native window manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NwmEvent {
    /// The desktop window exists; `scaling` selects the DPI mode
    CreateDesktop { window_id: WindowId, scaling: u32 },

    /// A window was created (or switched to accelerated rendering)
    CreateWindow {
        window_id: WindowId,
        accelerated: bool,
        parent: WindowId,
        scale: f32,
        pid: u32,
    },

    /// A window was destroyed
    DestroyWindow { window_id: WindowId },

    /// A window moved under a new parent (0 = top level)
    SetParent {
        window_id: WindowId,
        parent: WindowId,
        scale: f32,
        pid: u32,
    },

    /// Position, style and stacking update
    SetPosition {
        window_id: WindowId,
        flags: u32,
        insert_after: u32,
        owner: WindowId,
        style: u32,
        window_rect: Rect,
        client_rect: Rect,
        visible_rect: Rect,
    },

    /// A window received focus
    SetFocus { window_id: WindowId },

    /// A window's title changed
    SetText { window_id: WindowId, text: String },

    /// A window's icon changed (`None` clears it)
    SetIcon {
        window_id: WindowId,
        width: u32,
        height: u32,
        pixels: Option<Vec<u32>>,
    },

    /// The pointer cursor changed
    SetCursor { cursor: CursorSpec },

    /// Ask the host to close a window on the NWM's behalf
    CloseWindow { window_id: WindowId },

    /// Re-read the host clipboard
    PollClipboard,

    /// Publish text to the host clipboard
    SetClipboard { text: String },
}

// ============================================================================
// Host shell → Bridge Commands
// ============================================================================

/// Requests coming from the host shell rather than from the NWM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ShellCommand {
    /// Run a command line inside the NWM
    RunCommandLine { cmdline: String, env: Option<CommandEnv> },

    /// Run an argv-style command inside the NWM
    RunCommandArray { args: Vec<String>, env: Option<CommandEnv> },

    /// Close the hosting desktop
    CloseDesktop,
}

// ============================================================================
// Host UI → Bridge Events
// ============================================================================

/// Joystick axes relayed to the NWM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoystickAxis {
    X,
    Y,
    Z,
    Rx,
    Ry,
    Rz,
    LTrigger,
    RTrigger,
    Brake,
    Gas,
    HatX,
    HatY,
}

/// One axis value of a joystick sample, with the axis' flat range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisReading {
    pub axis: JoystickAxis,
    pub value: f32,
    #[serde(default)]
    pub flat: f32,
}

/// A motion event delivered to one host view
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionSample {
    pub window_id: WindowId,
    /// Delivered to the client view rather than the whole view
    #[serde(default)]
    pub client: bool,
    #[serde(default)]
    pub device_id: i32,
    /// Host input source bits
    pub source: u32,
    /// Host action code (see [`MotionAction`])
    pub action: u32,
    /// Position relative to the view
    pub x: f32,
    pub y: f32,
    /// Position in device coordinates
    #[serde(default)]
    pub raw_x: f32,
    #[serde(default)]
    pub raw_y: f32,
    #[serde(default)]
    pub button_state: u32,
    #[serde(default)]
    pub hscroll: f32,
    #[serde(default)]
    pub vscroll: f32,
    /// Joystick axes, empty for pointer events
    #[serde(default)]
    pub axes: Vec<AxisReading>,
}

/// A key event delivered to one host view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeySample {
    pub window_id: WindowId,
    #[serde(default)]
    pub device_id: i32,
    pub source: u32,
    /// Host action code (see [`KeyAction`])
    pub action: u32,
    pub keycode: i32,
    #[serde(default)]
    pub meta_state: u32,
}

/// One item of a host clipboard clip
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClipItem {
    pub text: Option<String>,
    /// The text carries style spans
    #[serde(default)]
    pub spanned: bool,
    pub html: Option<String>,
    pub uri: Option<String>,
    #[serde(default)]
    pub has_intent: bool,
}

/// A host clipboard clip
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClipData {
    pub label: String,
    #[serde(default)]
    pub mime_types: Vec<String>,
    #[serde(default)]
    pub items: Vec<ClipItem>,
}

/// Events raised by the host UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostEvent {
    /// A content view's backing was allocated or resized
    SurfaceAvailable {
        window_id: WindowId,
        client: bool,
        surface: u64,
    },

    /// A content view's backing was dropped
    SurfaceDestroyed { window_id: WindowId, client: bool },

    /// A content view became visible or invisible
    ViewVisibility {
        window_id: WindowId,
        client: bool,
        visible: bool,
    },

    /// Desktop size in host pixels
    DesktopResized { width: i32, height: i32 },

    Motion(MotionSample),

    Key(KeySample),

    /// Text being composed by the input method
    ImeCompose { text: String, cursor: i32 },

    /// Text committed by the input method; `key_events` is set when the
    /// host could map it to plain key presses
    ImeCommit {
        text: String,
        cursor: i32,
        key_events: Option<Vec<KeySample>>,
    },

    ImeFinish,

    ClearMetaKeyStates { states: u32 },

    ActivityStarted,

    ActivityStopped,

    /// An input device was connected
    DeviceAdded {
        device_id: i32,
        source: u32,
        descriptor: String,
    },

    /// The host's primary clip changed
    ClipboardChanged { clip: Option<ClipData> },
}

/// Anything a peer may send to the bridge daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "body", rename_all = "snake_case")]
pub enum InboundMessage {
    Nwm(NwmEvent),
    Shell(ShellCommand),
    Host(HostEvent),
}

// ============================================================================
// Bridge → NWM Calls
// ============================================================================

/// Calls made by the bridge into the native window manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NwmCall {
    /// A rendering surface appeared, changed or went away
    SurfaceChanged {
        window_id: WindowId,
        surface: Option<u64>,
        client: bool,
    },

    Keyboard {
        window_id: WindowId,
        action: u32,
        keycode: i32,
        meta_state: u32,
    },

    Motion {
        window_id: WindowId,
        action: u32,
        x: i32,
        y: i32,
        buttons: u32,
        scroll: i32,
    },

    /// Desktop size in scale-adjusted units
    DesktopChanged { width: i32, height: i32 },

    ConfigChanged { dpi: u32 },

    GamepadCount { count: usize },

    GamepadData {
        index: usize,
        device_id: i32,
        name: String,
    },

    GamepadAxis {
        device_id: i32,
        axes: [f32; codes::GAMEPAD_AXIS_COUNT],
    },

    GamepadButton {
        device_id: i32,
        button: i32,
        value: u32,
    },

    WindowClose { window_id: WindowId },

    SysCommand { window_id: WindowId, command: u32 },

    ImeStart,

    ImeSetText {
        text: String,
        length: usize,
        cursor: i32,
    },

    ImeFinish,

    ImeCancel,

    ClearMetaKeyStates { states: u32 },

    ClipdataUpdate {
        flags: u32,
        mime_types: Option<Vec<String>>,
    },

    RunCommandLine { cmdline: String, env: Option<CommandEnv> },

    RunCommandArray { args: Vec<String>, env: Option<CommandEnv> },
}

// ============================================================================
// Message Framing
// ============================================================================

/// A framed message with length prefix for reliable socket reads
#[derive(Debug)]
pub struct FramedMessage {
    pub data: Vec<u8>,
}

impl FramedMessage {
    /// Create a new framed message from serializable data
    pub fn new<T: Serialize>(msg: &T) -> anyhow::Result<Self> {
        let data = serde_json::to_vec(msg)?;
        Ok(Self { data })
    }

    /// Encode message with length prefix (4 bytes, big-endian)
    pub fn encode(&self) -> Vec<u8> {
        let len = self.data.len() as u32;
        let mut buf = Vec::with_capacity(4 + self.data.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Read the payload length out of a 4-byte prefix, rejecting oversized frames
    pub fn payload_len(prefix: [u8; 4]) -> anyhow::Result<usize> {
        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("frame too large: {} bytes", len);
        }
        Ok(len)
    }

    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> anyhow::Result<T> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Decode an inbound message from bytes
    pub fn decode_inbound(data: &[u8]) -> anyhow::Result<InboundMessage> {
        Self::decode(data)
    }

    /// Decode an outbound NWM call from bytes
    pub fn decode_call(data: &[u8]) -> anyhow::Result<NwmCall> {
        Self::decode(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_set_position_from_json() {
        let json = br#"{
            "channel": "nwm",
            "body": {
                "type": "SetPosition",
                "window_id": 65570,
                "flags": 4,
                "insert_after": 0,
                "owner": 0,
                "style": 268435456,
                "window_rect": {"left": 10, "top": 20, "right": 110, "bottom": 220},
                "client_rect": {"left": 12, "top": 40, "right": 108, "bottom": 218},
                "visible_rect": {"left": 10, "top": 20, "right": 110, "bottom": 220}
            }
        }"#;

        match FramedMessage::decode_inbound(json).unwrap() {
            InboundMessage::Nwm(NwmEvent::SetPosition { window_id, flags, visible_rect, .. }) => {
                assert_eq!(window_id, 0x10022);
                assert_eq!(flags, 4);
                assert_eq!(visible_rect.width(), 100);
                assert_eq!(visible_rect.height(), 200);
            }
            other => panic!("Wrong message: {:?}", other),
        }
    }

    #[test]
    fn test_encode_prefixes_length() {
        let cmd = InboundMessage::Shell(ShellCommand::CloseDesktop);
        let msg = FramedMessage::new(&cmd).unwrap();
        let encoded = msg.encode();

        let prefix = [encoded[0], encoded[1], encoded[2], encoded[3]];
        assert_eq!(FramedMessage::payload_len(prefix).unwrap(), encoded.len() - 4);

        let decoded = FramedMessage::decode_inbound(&encoded[4..]).unwrap();
        assert_eq!(decoded, cmd);
    }

    #[test]
    fn test_decode_host_motion_with_defaults() {
        let json = br#"{
            "channel": "host",
            "body": {"type": "Motion", "window_id": 32, "source": 8194, "action": 2, "x": 1.5, "y": 3.0}
        }"#;

        match FramedMessage::decode_inbound(json).unwrap() {
            InboundMessage::Host(HostEvent::Motion(sample)) => {
                assert_eq!(sample.window_id, 32);
                assert_eq!(sample.action, MotionAction::Move.code());
                assert!(!sample.client);
                assert!(sample.axes.is_empty());
            }
            other => panic!("Wrong message: {:?}", other),
        }
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let prefix = ((MAX_FRAME_LEN as u32) + 1).to_be_bytes();
        assert!(FramedMessage::payload_len(prefix).is_err());
    }

    #[test]
    fn test_rect_geometry() {
        let rect = Rect::new(-5, 0, 5, 0);
        assert!(rect.is_empty());
        assert_eq!(rect.offset(5, 2), Rect::new(0, 2, 10, 2));
        assert_eq!(Rect::new(0, 0, 3, 4).to_string(), "(0,0)-(3,4)");
    }
}

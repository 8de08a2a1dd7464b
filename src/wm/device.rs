//! Device Module
//!
//! Input device classification and gamepad enumeration.

use bitflags::bitflags;
use nwm_bridge_ipc::codes::GAMEPAD_NAME_MAX;
use tracing::{debug, info};

use crate::nwm::NativeWm;

bitflags! {
    /// Input source bits reported by the host for a device or event
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InputSource: u32 {
        const CLASS_POINTER = 0x0000_0002;
        const CLASS_JOYSTICK = 0x0000_0010;
        const GAMEPAD = 0x0000_0401;
        const TOUCHSCREEN = 0x0000_1002;
        const MOUSE = 0x0000_2002;
        const JOYSTICK = 0x0100_0010;
    }
}

impl InputSource {
    pub fn from_raw(source: u32) -> Self {
        Self::from_bits_retain(source)
    }

    /// Every bit of `class` is present
    pub fn is(self, class: InputSource) -> bool {
        self.contains(class)
    }

    pub fn is_gamepad_like(self) -> bool {
        self.is(Self::GAMEPAD) || self.is(Self::JOYSTICK)
    }
}

/// Input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDeviceInfo {
    /// Device ID
    pub id: i32,

    pub sources: InputSource,

    /// Stable descriptor, forwarded as the gamepad name
    pub descriptor: String,
}

impl InputDeviceInfo {
    pub fn new(id: i32, sources: InputSource, descriptor: impl Into<String>) -> Self {
        Self {
            id,
            sources,
            descriptor: descriptor.into(),
        }
    }
}

/// Cut a descriptor down to what the NWM accepts, on a char boundary
fn gamepad_name(descriptor: &str) -> &str {
    if descriptor.len() <= GAMEPAD_NAME_MAX {
        return descriptor;
    }
    let mut end = GAMEPAD_NAME_MAX;
    while !descriptor.is_char_boundary(end) {
        end -= 1;
    }
    &descriptor[..end]
}

/// Report the connected gamepads to the NWM.
///
/// Nothing is sent when there are none. Returns how many were reported.
pub fn enumerate_gamepads(devices: &[InputDeviceInfo], nwm: &mut dyn NativeWm) -> usize {
    let mut pads: Vec<&InputDeviceInfo> = Vec::new();
    for device in devices.iter().filter(|d| d.sources.is_gamepad_like()) {
        if pads.iter().any(|p| p.id == device.id) {
            continue;
        }
        pads.push(device);
    }

    if pads.is_empty() {
        debug!("No gamepads connected");
        return 0;
    }

    info!("Found {} gamepad(s)", pads.len());
    nwm.gamepad_count(pads.len());
    for (index, pad) in pads.iter().enumerate() {
        debug!("Gamepad {}: id {} '{}'", index, pad.id, pad.descriptor);
        nwm.gamepad_data(index, pad.id, gamepad_name(&pad.descriptor));
    }
    pads.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nwm::RecordingNwm;
    use nwm_bridge_ipc::NwmCall;

    #[test]
    fn test_source_classes() {
        let mouse = InputSource::from_raw(0x2002);
        assert!(mouse.is(InputSource::CLASS_POINTER));
        assert!(!mouse.is(InputSource::TOUCHSCREEN));
        assert!(InputSource::from_raw(0x0100_0511).is_gamepad_like());
        assert!(!InputSource::from_raw(0x101).is_gamepad_like());
    }

    #[test]
    fn test_enumeration_dedups_and_skips_others() {
        let devices = vec![
            InputDeviceInfo::new(3, InputSource::GAMEPAD | InputSource::JOYSTICK, "pad-a"),
            InputDeviceInfo::new(4, InputSource::MOUSE, "mouse"),
            InputDeviceInfo::new(3, InputSource::GAMEPAD, "pad-a"),
            InputDeviceInfo::new(7, InputSource::JOYSTICK, "x".repeat(300)),
        ];
        let mut nwm = RecordingNwm::new();
        assert_eq!(enumerate_gamepads(&devices, &mut nwm), 2);

        let calls = nwm.calls();
        assert_eq!(calls[0], NwmCall::GamepadCount { count: 2 });
        assert_eq!(
            calls[1],
            NwmCall::GamepadData { index: 0, device_id: 3, name: "pad-a".into() }
        );
        match &calls[2] {
            NwmCall::GamepadData { index: 1, device_id: 7, name } => assert_eq!(name.len(), 255),
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_no_gamepads_sends_nothing() {
        let devices = vec![InputDeviceInfo::new(1, InputSource::TOUCHSCREEN, "touch")];
        let mut nwm = RecordingNwm::new();
        assert_eq!(enumerate_gamepads(&devices, &mut nwm), 0);
        assert!(nwm.calls().is_empty());
    }
}

//! Numeric codes shared with the native window manager.
//!
//! These values cross the call boundary unchanged, so they are kept as plain
//! integer constants next to small typed wrappers.

use serde::{Deserialize, Serialize};

/// Window handle as assigned by the native window manager.
pub type WindowId = u32;

/// "No window" / "no parent".
pub const NO_WINDOW: WindowId = 0;

/// `insert_after` value: front of the normal band.
pub const HWND_TOP: u32 = 0;
/// `insert_after` value: back of the list.
pub const HWND_BOTTOM: u32 = 1;
/// `insert_after` value: make topmost and move to the very front.
pub const HWND_TOPMOST: u32 = 0xffff_ffff;
/// `insert_after` value: leave the topmost band.
pub const HWND_NOTOPMOST: u32 = 0xffff_fffe;
/// Reserved id of the message-only window.
pub const HWND_MESSAGE: WindowId = 0xffff_fffd;

/// System command: restore.
pub const SC_RESTORE: u32 = 0xf120;

/// One wheel notch.
pub const WHEEL_DELTA: i32 = 120;

/// Bit or-ed into a motion action code to mark a horizontal scroll.
pub const HORIZONTAL_SCROLL_FLAG: u32 = 0x10000;

/// Button value sent for a pressed gamepad button.
pub const GAMEPAD_BUTTON_PRESSED: u32 = 0xff;

/// Number of axes relayed per joystick sample.
pub const GAMEPAD_AXIS_COUNT: usize = 10;

/// Longest gamepad descriptor the native side accepts.
pub const GAMEPAD_NAME_MAX: usize = 255;

/// Pointer action codes, matching the host's motion event actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotionAction {
    Down,
    Up,
    Move,
    Cancel,
    Outside,
    PointerDown,
    PointerUp,
    HoverMove,
    Scroll,
    HoverEnter,
    HoverExit,
    ButtonPress,
    ButtonRelease,
}

impl MotionAction {
    pub const fn code(self) -> u32 {
        match self {
            Self::Down => 0,
            Self::Up => 1,
            Self::Move => 2,
            Self::Cancel => 3,
            Self::Outside => 4,
            Self::PointerDown => 5,
            Self::PointerUp => 6,
            Self::HoverMove => 7,
            Self::Scroll => 8,
            Self::HoverEnter => 9,
            Self::HoverExit => 10,
            Self::ButtonPress => 11,
            Self::ButtonRelease => 12,
        }
    }

    pub const fn from_code(code: u32) -> Option<Self> {
        Some(match code & 0xff {
            0 => Self::Down,
            1 => Self::Up,
            2 => Self::Move,
            3 => Self::Cancel,
            4 => Self::Outside,
            5 => Self::PointerDown,
            6 => Self::PointerUp,
            7 => Self::HoverMove,
            8 => Self::Scroll,
            9 => Self::HoverEnter,
            10 => Self::HoverExit,
            11 => Self::ButtonPress,
            12 => Self::ButtonRelease,
            _ => return None,
        })
    }
}

/// Key action codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyAction {
    Down,
    Up,
    Multiple,
}

impl KeyAction {
    pub const fn code(self) -> u32 {
        match self {
            Self::Down => 0,
            Self::Up => 1,
            Self::Multiple => 2,
        }
    }

    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Down),
            1 => Some(Self::Up),
            2 => Some(Self::Multiple),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_code_ignores_pointer_index_bits() {
        // ACTION_POINTER_UP for pointer 1 is 0x0106
        assert_eq!(MotionAction::from_code(0x0106), Some(MotionAction::PointerUp));
        assert_eq!(MotionAction::from_code(0x42), None);
        assert_eq!(MotionAction::Scroll.code() | HORIZONTAL_SCROLL_FLAG, 0x10008);
    }
}

//! Error taxonomy for tree and bridge operations
//!
//! None of these cross the NWM call boundary: the bridge logs them and drops
//! the offending event.

use nwm_bridge_ipc::WindowId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("window {0:08x} already exists")]
    AlreadyExists(WindowId),

    #[error("unknown window {0:08x}")]
    UnknownWindow(WindowId),

    #[error("parent {parent:08x} of window {id:08x} does not exist")]
    UnknownParent { id: WindowId, parent: WindowId },

    #[error("reparent target {0:08x} does not exist")]
    UnknownTarget(WindowId),

    #[error("cannot move window {id:08x} under {parent:08x}: {reason}")]
    InvalidTopology {
        id: WindowId,
        parent: WindowId,
        reason: &'static str,
    },

    #[error("window {0:08x} cannot be stacked after itself")]
    SelfReference(WindowId),

    #[error("icon for window {id:08x} is {width}x{height} but has {pixels} pixels")]
    InvalidIcon {
        id: WindowId,
        width: u32,
        height: u32,
        pixels: usize,
    },

    #[error("cursor image {width}x{height} has {pixels} pixels")]
    InvalidCursor { width: u32, height: u32, pixels: usize },

    #[error("desktop window already created")]
    DesktopAlreadyCreated,
}

impl BridgeError {
    /// The NWM and the mirror can briefly disagree about which windows exist,
    /// so these are expected and only worth a debug line.
    pub fn is_unknown_reference(&self) -> bool {
        matches!(
            self,
            Self::UnknownWindow(_) | Self::UnknownParent { .. } | Self::UnknownTarget(_)
        )
    }
}

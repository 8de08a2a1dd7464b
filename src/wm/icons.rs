//! Icons Module
//!
//! Window icons and pointer cursors handed over by the NWM as raw ARGB32
//! buffers. Buffers are validated before they reach the host.

use nwm_bridge_ipc::{CursorSpec, WindowId};
use tracing::debug;

use crate::errors::{BridgeError, Result};

/// Largest image we accept (1 megapixel)
const MAX_PIXELS: usize = 1024 * 1024;

/// Icon data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconData {
    /// Icon width
    pub width: u32,
    /// Icon height
    pub height: u32,
    /// Icon pixels (ARGB32 format)
    pub pixels: Vec<u32>,
}

impl IconData {
    /// Checked pixel count for a `width` x `height` image
    fn expected_len(width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)
            .filter(|count| *count > 0 && *count <= MAX_PIXELS)
    }

    /// Build the icon for `window`, rejecting buffers that don't match the size
    pub fn for_window(window: WindowId, width: u32, height: u32, pixels: Vec<u32>) -> Result<Self> {
        match Self::expected_len(width, height) {
            Some(count) if count == pixels.len() => {
                debug!("Icon for window {:08x}: {}x{}", window, width, height);
                Ok(Self { width, height, pixels })
            }
            _ => Err(BridgeError::InvalidIcon {
                id: window,
                width,
                height,
                pixels: pixels.len(),
            }),
        }
    }
}

/// Pointer cursor as the host should show it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorImage {
    /// One of the host's stock pointer icons
    System(i32),
    /// Bitmap cursor with its hotspot
    Custom {
        image: IconData,
        hotspot_x: i32,
        hotspot_y: i32,
    },
}

impl TryFrom<CursorSpec> for CursorImage {
    type Error = BridgeError;

    fn try_from(spec: CursorSpec) -> Result<Self> {
        match spec {
            CursorSpec::System { id } => Ok(Self::System(id)),
            CursorSpec::Custom {
                width,
                height,
                hotspot_x,
                hotspot_y,
                pixels,
            } => {
                let pixel_count = pixels.len();
                match IconData::expected_len(width, height) {
                    Some(count) if count == pixel_count => Ok(Self::Custom {
                        image: IconData { width, height, pixels },
                        hotspot_x,
                        hotspot_y,
                    }),
                    _ => Err(BridgeError::InvalidCursor {
                        width,
                        height,
                        pixels: pixel_count,
                    }),
                }
            }
        }
    }
}

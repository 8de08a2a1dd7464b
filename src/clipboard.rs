//! Clipboard mirror
//!
//! Tracks the host's primary clip, tells the NWM what it contains, and lets
//! the NWM read the text back from its own threads.

use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::RwLock;
use tracing::{debug, info};

pub use nwm_bridge_ipc::{ClipData, ClipItem};

use crate::compositor::HostClipboard;
use crate::nwm::NativeWm;

/// Label of clips we publish
pub const CLIP_LABEL: &str = "Wine clipboard";

bitflags! {
    /// What the first item of the current clip carries
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClipFlags: u32 {
        /// Published by us
        const OURS = 0x01;
        const HAS_TEXT = 0x02;
        const EMPTY_TEXT = 0x04;
        const SPANNED_TEXT = 0x08;
        const HAS_HTML = 0x10;
        const HAS_INTENT = 0x20;
        const HAS_URI = 0x40;
    }
}

type Snapshot = Arc<RwLock<Option<ClipData>>>;

/// Read side of the clipboard snapshot; safe to use off the mutation thread
#[derive(Debug, Clone)]
pub struct ClipboardReader {
    snapshot: Snapshot,
}

impl ClipboardReader {
    /// Text of the first item when `flags` asks for plain text, empty otherwise
    pub fn text(&self, flags: u32) -> String {
        if ClipFlags::from_bits_retain(flags) != ClipFlags::HAS_TEXT {
            return String::new();
        }
        self.snapshot
            .read()
            .as_ref()
            .and_then(|clip| clip.items.first())
            .and_then(|item| item.text.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct ClipboardMirror {
    snapshot: Snapshot,

    /// Content URI marking clips as ours
    our_uri: Option<String>,
}

impl ClipboardMirror {
    pub fn new(provider_authority: Option<&str>) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(None)),
            our_uri: provider_authority.map(|authority| format!("content://{}/copying", authority)),
        }
    }

    pub fn our_uri(&self) -> Option<&str> {
        self.our_uri.as_deref()
    }

    pub fn reader(&self) -> ClipboardReader {
        ClipboardReader {
            snapshot: Arc::clone(&self.snapshot),
        }
    }

    /// Classify the first item of a clip
    pub fn flags(&self, clip: &ClipData) -> ClipFlags {
        let mut flags = ClipFlags::empty();
        let Some(item) = clip.items.first() else {
            return flags;
        };

        if let Some(uri) = &item.uri {
            flags |= ClipFlags::HAS_URI;
            if self.our_uri.as_deref() == Some(uri.as_str()) {
                flags |= ClipFlags::OURS;
            }
        }
        if let Some(text) = &item.text {
            flags |= ClipFlags::HAS_TEXT;
            if text.is_empty() {
                flags |= ClipFlags::EMPTY_TEXT;
            }
            if item.spanned {
                flags |= ClipFlags::SPANNED_TEXT;
            }
        }
        if item.html.is_some() {
            flags |= ClipFlags::HAS_HTML;
        }
        if item.has_intent {
            flags |= ClipFlags::HAS_INTENT;
        }
        flags
    }

    /// Re-read the host clip, report it to the NWM and keep it as the snapshot
    pub fn poll(&self, host: &dyn HostClipboard, nwm: &mut dyn NativeWm) -> ClipFlags {
        let clip = host.primary_clip();
        let (flags, mime_types) = match &clip {
            Some(data) if !data.items.is_empty() => (self.flags(data), Some(data.mime_types.clone())),
            _ => (ClipFlags::empty(), None),
        };

        debug!("Clipboard flags {:#x}, mime types {:?}", flags.bits(), mime_types);
        nwm.clipdata_update(flags.bits(), mime_types);

        *self.snapshot.write() = clip;
        flags
    }

    /// Publish `text` as the host's primary clip
    pub fn set(&self, host: &mut dyn HostClipboard, text: String) {
        info!("Setting clipboard text ({} bytes)", text.len());
        let item = ClipItem {
            text: Some(text),
            uri: self.our_uri.clone(),
            ..ClipItem::default()
        };
        host.set_primary_clip(Some(ClipData {
            label: CLIP_LABEL.to_string(),
            mime_types: Vec::new(),
            items: vec![item],
        }));
    }
}

impl Default for ClipboardMirror {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::SceneHost;
    use crate::nwm::RecordingNwm;
    use nwm_bridge_ipc::NwmCall;

    #[test]
    fn test_own_clip_round_trip() {
        let mirror = ClipboardMirror::new(Some("org.example.wine"));
        let mut host = SceneHost::default();
        let mut nwm = RecordingNwm::new();

        mirror.set(&mut host, "hello".into());
        let flags = mirror.poll(&host, &mut nwm);
        assert_eq!(flags, ClipFlags::OURS | ClipFlags::HAS_URI | ClipFlags::HAS_TEXT);
        assert_eq!(
            nwm.calls(),
            vec![NwmCall::ClipdataUpdate { flags: 0x43, mime_types: Some(Vec::new()) }]
        );

        let reader = mirror.reader();
        assert_eq!(reader.text(ClipFlags::HAS_TEXT.bits()), "hello");
        assert_eq!(reader.text(ClipFlags::HAS_HTML.bits()), "");
    }

    #[test]
    fn test_foreign_clip_flags() {
        let mirror = ClipboardMirror::new(Some("org.example.wine"));
        let clip = ClipData {
            label: "browser".into(),
            mime_types: vec!["text/html".into(), "text/plain".into()],
            items: vec![ClipItem {
                text: Some(String::new()),
                spanned: true,
                html: Some("<b></b>".into()),
                uri: Some("content://elsewhere/1".into()),
                has_intent: false,
            }],
        };
        assert_eq!(
            mirror.flags(&clip),
            ClipFlags::HAS_URI
                | ClipFlags::HAS_TEXT
                | ClipFlags::EMPTY_TEXT
                | ClipFlags::SPANNED_TEXT
                | ClipFlags::HAS_HTML
        );
    }

    #[test]
    fn test_empty_clipboard() {
        let mirror = ClipboardMirror::default();
        let host = SceneHost::default();
        let mut nwm = RecordingNwm::new();

        assert!(mirror.poll(&host, &mut nwm).is_empty());
        assert_eq!(nwm.calls(), vec![NwmCall::ClipdataUpdate { flags: 0, mime_types: None }]);
        assert_eq!(mirror.reader().text(ClipFlags::HAS_TEXT.bits()), "");
    }
}

//! Compositor Module
//!
//! Interface to the host's view hierarchy plus [`SceneHost`], an in-memory
//! implementation used by the daemon and the tests.
//!
//! The bridge never renders. It decides which host containers exist, where
//! they sit and in which order, and the host reports back when it allocates
//! or drops the backing of a content view.

pub mod c_window;

use std::collections::HashMap;

use nwm_bridge_ipc::{Rect, WindowId};
use tracing::{debug, info, warn};

use crate::clipboard::ClipData;
use crate::shared::SurfaceKind;
use crate::wm::device::InputDeviceInfo;
use crate::wm::icons::{CursorImage, IconData};
use c_window::{CWindow, StackEntry};

/// A host container that window views are attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    /// Top-level container holding the desktop view and every top-level window
    Desktop,
    /// Client container of a window; holds its child windows
    Client(WindowId),
}

/// Title and icon shown for the whole activity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityTitle {
    pub text: String,
    pub icon: Option<IconData>,
}

/// View hierarchy operations the bridge needs from the host
pub trait HostViews {
    /// Create the whole and client containers of a window. No-op if they exist.
    fn create_containers(&mut self, id: WindowId);

    /// Tear down both containers and their content views
    fn destroy_containers(&mut self, id: WindowId);

    fn has_containers(&self, id: WindowId) -> bool;

    /// Create the content view whose backing becomes the `kind` surface
    fn create_content(&mut self, id: WindowId, kind: SurfaceKind);

    fn layout(&mut self, id: WindowId, kind: SurfaceKind, rect: Rect);

    /// Window children of a container, back to front. Reserved views are not listed.
    fn children(&self, container: Container) -> Vec<WindowId>;

    /// Insert a window's whole container at `index` among the window children
    fn insert(&mut self, container: Container, id: WindowId, index: usize);

    fn remove(&mut self, container: Container, id: WindowId);

    /// Move a window in front of every other window child
    fn bring_to_front(&mut self, container: Container, id: WindowId);

    fn set_focusable(&mut self, id: WindowId, focusable: bool);

    /// Host-level visibility, independent of the NWM's style bits
    fn set_shown(&mut self, id: WindowId, shown: bool);

    fn layout_desktop(&mut self, width: i32, height: i32);

    /// `None` restores the default title and icon
    fn set_activity_title(&mut self, title: Option<&ActivityTitle>);

    fn set_cursor(&mut self, cursor: &CursorImage);

    /// Close the hosting activity
    fn finish(&mut self);
}

/// Access to the host's primary clipboard
pub trait HostClipboard {
    fn primary_clip(&self) -> Option<ClipData>;

    /// `None` clears the clipboard
    fn set_primary_clip(&mut self, clip: Option<ClipData>);
}

/// Input device enumeration
pub trait HostDevices {
    fn input_devices(&self) -> Vec<InputDeviceInfo>;

    fn add_input_device(&mut self, device: InputDeviceInfo);
}

/// Everything the bridge needs from its host
pub trait Host: HostViews + HostClipboard + HostDevices {}

impl<T: HostViews + HostClipboard + HostDevices> Host for T {}

/// In-memory view hierarchy
#[derive(Debug)]
pub struct SceneHost {
    windows: HashMap<WindowId, CWindow>,

    /// Desktop container, back to front (the desktop view itself sits behind)
    desktop: Vec<WindowId>,

    desktop_size: (i32, i32),

    /// Keep a reserved content object at the front of each client container
    reserve_front_view: bool,

    title: Option<ActivityTitle>,
    title_updates: usize,

    cursor: Option<CursorImage>,
    clip: Option<ClipData>,
    devices: Vec<InputDeviceInfo>,
    finished: bool,
}

impl SceneHost {
    pub fn new(reserve_front_view: bool) -> Self {
        Self {
            windows: HashMap::new(),
            desktop: Vec::new(),
            desktop_size: (0, 0),
            reserve_front_view,
            title: None,
            title_updates: 0,
            cursor: None,
            clip: None,
            devices: Vec::new(),
            finished: false,
        }
    }

    pub fn window(&self, id: WindowId) -> Option<&CWindow> {
        self.windows.get(&id)
    }

    /// Full stacking list of a client container, reserved entries included
    pub fn stack(&self, parent: WindowId) -> Vec<StackEntry> {
        self.windows
            .get(&parent)
            .map(|win| win.stack.clone())
            .unwrap_or_default()
    }

    pub fn desktop_size(&self) -> (i32, i32) {
        self.desktop_size
    }

    pub fn title(&self) -> Option<&ActivityTitle> {
        self.title.as_ref()
    }

    /// How many times the title was pushed
    pub fn title_updates(&self) -> usize {
        self.title_updates
    }

    pub fn cursor(&self) -> Option<&CursorImage> {
        self.cursor.as_ref()
    }

    pub fn finished(&self) -> bool {
        self.finished
    }
}

impl Default for SceneHost {
    fn default() -> Self {
        Self::new(true)
    }
}

impl HostViews for SceneHost {
    fn create_containers(&mut self, id: WindowId) {
        let reserve = self.reserve_front_view;
        self.windows.entry(id).or_insert_with(|| {
            debug!("Creating containers for {:08x}", id);
            CWindow::new(id, reserve)
        });
    }

    fn destroy_containers(&mut self, id: WindowId) {
        if self.windows.remove(&id).is_some() {
            debug!("Destroyed containers of {:08x}", id);
        }
        self.desktop.retain(|&w| w != id);
        for win in self.windows.values_mut() {
            win.remove_child(id);
        }
    }

    fn has_containers(&self, id: WindowId) -> bool {
        self.windows.contains_key(&id)
    }

    fn create_content(&mut self, id: WindowId, kind: SurfaceKind) {
        match self.windows.get_mut(&id) {
            Some(win) => match kind {
                SurfaceKind::Whole => win.whole_content = true,
                SurfaceKind::Client => win.client_content = true,
            },
            None => warn!("No containers for {:08x}, cannot create {:?} content", id, kind),
        }
    }

    fn layout(&mut self, id: WindowId, kind: SurfaceKind, rect: Rect) {
        if let Some(win) = self.windows.get_mut(&id) {
            match kind {
                SurfaceKind::Whole => win.whole_layout = rect,
                SurfaceKind::Client => win.client_layout = rect,
            }
        }
    }

    fn children(&self, container: Container) -> Vec<WindowId> {
        match container {
            Container::Desktop => self.desktop.clone(),
            Container::Client(parent) => self
                .windows
                .get(&parent)
                .map(CWindow::window_children)
                .unwrap_or_default(),
        }
    }

    fn insert(&mut self, container: Container, id: WindowId, index: usize) {
        match container {
            Container::Desktop => {
                self.desktop.retain(|&w| w != id);
                let index = index.min(self.desktop.len());
                self.desktop.insert(index, id);
            }
            Container::Client(parent) => match self.windows.get_mut(&parent) {
                Some(win) => win.insert_child(id, index),
                None => warn!("Parent {:08x} has no client container", parent),
            },
        }
    }

    fn remove(&mut self, container: Container, id: WindowId) {
        match container {
            Container::Desktop => self.desktop.retain(|&w| w != id),
            Container::Client(parent) => {
                if let Some(win) = self.windows.get_mut(&parent) {
                    win.remove_child(id);
                }
            }
        }
    }

    fn bring_to_front(&mut self, container: Container, id: WindowId) {
        match container {
            Container::Desktop => {
                self.desktop.retain(|&w| w != id);
                self.desktop.push(id);
            }
            Container::Client(parent) => {
                if let Some(win) = self.windows.get_mut(&parent) {
                    win.raise_child(id);
                }
            }
        }
    }

    fn set_focusable(&mut self, id: WindowId, focusable: bool) {
        if let Some(win) = self.windows.get_mut(&id) {
            win.focusable = focusable;
        }
    }

    fn set_shown(&mut self, id: WindowId, shown: bool) {
        if let Some(win) = self.windows.get_mut(&id) {
            win.shown = shown;
        }
    }

    fn layout_desktop(&mut self, width: i32, height: i32) {
        self.desktop_size = (width, height);
    }

    fn set_activity_title(&mut self, title: Option<&ActivityTitle>) {
        match title {
            Some(title) => info!("Activity title: {}", title.text),
            None => info!("Activity title reset to default"),
        }
        self.title = title.cloned();
        self.title_updates += 1;
    }

    fn set_cursor(&mut self, cursor: &CursorImage) {
        self.cursor = Some(cursor.clone());
    }

    fn finish(&mut self) {
        info!("Desktop closed");
        self.finished = true;
    }
}

impl HostClipboard for SceneHost {
    fn primary_clip(&self) -> Option<ClipData> {
        self.clip.clone()
    }

    fn set_primary_clip(&mut self, clip: Option<ClipData>) {
        self.clip = clip;
    }
}

impl HostDevices for SceneHost {
    fn input_devices(&self) -> Vec<InputDeviceInfo> {
        self.devices.clone()
    }

    fn add_input_device(&mut self, device: InputDeviceInfo) {
        info!("Input device {} added ({:#x})", device.id, device.sources.bits());
        self.devices.retain(|d| d.id != device.id);
        self.devices.push(device);
    }
}

use nwm_bridge_ipc::{Rect, WindowId};

use crate::shared::SurfaceKind;

/// One entry in a host container's stacking list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEntry {
    /// Whole container of a mirrored window
    Window(WindowId),
    /// Reserved content object that stays at the front
    Content,
}

/// Host-side view state of one mirrored window
///
/// Every window owns a whole container with its client container nested
/// inside. Child windows are attached to their parent's client container.
#[derive(Debug)]
pub struct CWindow {
    pub id: WindowId,

    /// Layout of the whole container in its parent's coordinates
    pub whole_layout: Rect,

    /// Layout of the client container inside the whole container
    pub client_layout: Rect,

    /// Content views created inside the containers
    pub whole_content: bool,
    pub client_content: bool,

    /// Stacking list of the client container, back to front
    pub stack: Vec<StackEntry>,

    /// Can the whole container take focus?
    pub focusable: bool,

    /// Host visibility, toggled when the activity starts or stops
    pub shown: bool,
}

impl CWindow {
    pub fn new(id: WindowId, reserve_front_view: bool) -> Self {
        Self {
            id,
            whole_layout: Rect::default(),
            client_layout: Rect::default(),
            whole_content: false,
            client_content: false,
            stack: if reserve_front_view { vec![StackEntry::Content] } else { Vec::new() },
            focusable: false,
            shown: true,
        }
    }

    pub fn layout(&self, kind: SurfaceKind) -> Rect {
        match kind {
            SurfaceKind::Whole => self.whole_layout,
            SurfaceKind::Client => self.client_layout,
        }
    }

    /// Window children in stacking order, back to front
    pub fn window_children(&self) -> Vec<WindowId> {
        self.stack
            .iter()
            .filter_map(|entry| match entry {
                StackEntry::Window(id) => Some(*id),
                StackEntry::Content => None,
            })
            .collect()
    }

    /// Index in `stack` that corresponds to position `index` among windows
    fn stack_index(&self, index: usize) -> usize {
        let mut windows = 0;
        for (pos, entry) in self.stack.iter().enumerate() {
            if let StackEntry::Window(_) = entry {
                if windows == index {
                    return pos;
                }
                windows += 1;
            }
        }
        // past the last window: stay behind the reserved content object
        self.stack
            .iter()
            .position(|entry| *entry == StackEntry::Content)
            .unwrap_or(self.stack.len())
    }

    pub fn insert_child(&mut self, child: WindowId, index: usize) {
        self.remove_child(child);
        let pos = self.stack_index(index);
        self.stack.insert(pos, StackEntry::Window(child));
    }

    pub fn remove_child(&mut self, child: WindowId) {
        self.stack.retain(|entry| *entry != StackEntry::Window(child));
    }

    pub fn raise_child(&mut self, child: WindowId) {
        let count = self.window_children().len();
        self.insert_child(child, count);
    }
}

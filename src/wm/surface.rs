//! Surface bindings
//!
//! Each window tracks up to two host backings, one per [`SurfaceKind`]. A
//! binding is a weak reference: the host owns the pixels, we only remember
//! the handle so the NWM can be told about it again later.

use crate::shared::{SurfaceHandle, SurfaceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceBinding {
    #[default]
    Absent,
    Bound(SurfaceHandle),
}

/// Result of handing a backing to a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// A handle we had not seen before (including Absent -> Bound)
    New,
    /// The current backing was reported again, e.g. after a resize
    Unchanged,
}

impl SurfaceBinding {
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound(_))
    }

    pub fn handle(&self) -> Option<SurfaceHandle> {
        match self {
            Self::Bound(handle) => Some(*handle),
            Self::Absent => None,
        }
    }

    pub fn bind(&mut self, handle: SurfaceHandle) -> BindOutcome {
        if *self == Self::Bound(handle) {
            return BindOutcome::Unchanged;
        }
        *self = Self::Bound(handle);
        BindOutcome::New
    }

    /// Drop the binding, returning the handle that was held
    pub fn release(&mut self) -> Option<SurfaceHandle> {
        std::mem::take(self).handle()
    }
}

/// Whole and client bindings of one window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceSlots {
    pub whole: SurfaceBinding,
    pub client: SurfaceBinding,
}

impl SurfaceSlots {
    pub fn get(&self, kind: SurfaceKind) -> &SurfaceBinding {
        match kind {
            SurfaceKind::Whole => &self.whole,
            SurfaceKind::Client => &self.client,
        }
    }

    pub fn get_mut(&mut self, kind: SurfaceKind) -> &mut SurfaceBinding {
        match kind {
            SurfaceKind::Whole => &mut self.whole,
            SurfaceKind::Client => &mut self.client,
        }
    }

    /// Release both bindings, yielding the kinds that were bound
    pub fn release_all(&mut self) -> Vec<SurfaceKind> {
        [SurfaceKind::Whole, SurfaceKind::Client]
            .into_iter()
            .filter(|kind| self.get_mut(*kind).release().is_some())
            .collect()
    }
}

//! Input windows owned by a logical display.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::Rect;

/// Inbound description of one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub id: i32,
    /// Logical display the window belongs to; must equal the owning display's id.
    pub display_id: i32,
    /// Position and size in the owning logical display's local space.
    pub area: Rect,
    /// Window that receives input on this window's behalf, if any.
    #[serde(default)]
    pub agent_window_id: Option<i32>,
}

bitflags! {
    /// Which properties of a window differ from the previous update.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WindowChanges: u8 {
        const POSITION = 1 << 0;
        const SIZE = 1 << 1;
        const DISPLAY = 1 << 2;
        const AGENT = 1 << 3;
    }
}

impl WindowChanges {
    /// Computes the difference between two versions of the same window.
    pub fn between(old: &WindowInfo, new: &WindowInfo) -> Self {
        let mut changes = Self::empty();
        if (old.area.x, old.area.y) != (new.area.x, new.area.y) {
            changes |= Self::POSITION;
        }
        if (old.area.width, old.area.height) != (new.area.width, new.area.height) {
            changes |= Self::SIZE;
        }
        if old.display_id != new.display_id {
            changes |= Self::DISPLAY;
        }
        if old.agent_window_id != new.agent_window_id {
            changes |= Self::AGENT;
        }
        changes
    }
}

/// Stored state of one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputWindowState {
    info: WindowInfo,
    /// Changes applied by the most recent update; empty for new windows.
    pub changed: WindowChanges,
}

impl InputWindowState {
    pub fn new(info: WindowInfo) -> Self {
        Self {
            info,
            changed: WindowChanges::empty(),
        }
    }

    pub fn id(&self) -> i32 {
        self.info.id
    }

    pub fn info(&self) -> &WindowInfo {
        &self.info
    }

    /// Replaces the stored info and records what changed.
    pub fn update(&mut self, info: WindowInfo) -> WindowChanges {
        self.changed = WindowChanges::between(&self.info, &info);
        self.info = info;
        self.changed
    }
}

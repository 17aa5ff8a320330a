//! The window state manager: sole owner and mutator of the display topology.
//!
//! [`WindowStateManager::update_display_info`] receives the *complete* set of
//! physical and logical displays every time.  It validates the whole pair
//! before touching anything, diffs it in place against the current state and
//! returns the resulting notifications in a fixed order.
//!
//! # Why a fixed notification order? (for beginners)
//!
//! Consumers (the seats) hold lookups keyed by display and window ids.  If a
//! seat were told about a window before the display that owns it, or learned
//! of a new display reusing an id before hearing that the old one was removed,
//! its lookups would briefly point at the wrong thing.  The order below makes
//! every prefix of the notification list a consistent topology:
//!
//! 1. physical removed, physical changed, physical added
//! 2. window removed
//! 3. logical added
//! 4. window changed, window added
//! 5. logical changed, logical removed

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thiserror::Error;
use tracing::debug;

use super::display::{LogicalDisplay, LogicalDisplayState, PhysicalDisplayState};
use super::window::{InputWindowState, WindowChanges, WindowInfo};

/// Which kind of display an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayKind {
    Physical,
    Logical,
}

impl fmt::Display for DisplayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayKind::Physical => f.write_str("physical"),
            DisplayKind::Logical => f.write_str("logical"),
        }
    }
}

/// Reasons a topology update is rejected, and transform failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("{kind} display id {id} is negative")]
    NegativeDisplayId { kind: DisplayKind, id: i32 },

    #[error("{kind} display id {id} appears more than once")]
    DuplicateDisplayId { kind: DisplayKind, id: i32 },

    #[error("{kind} display {id} has a non-positive size")]
    InvalidDisplaySize { kind: DisplayKind, id: i32 },

    #[error("physical display {id} has a non-zero origin")]
    NonZeroOrigin { id: i32 },

    #[error("logical display {id} has a negative origin")]
    NegativeOrigin { id: i32 },

    #[error("physical display {id} links to unknown display {target}")]
    DanglingLink { id: i32, target: i32 },

    #[error("physical displays {first} and {second} share seat ({seat_id}, {seat_name})")]
    DuplicateSeat {
        first: i32,
        second: i32,
        seat_id: String,
        seat_name: String,
    },

    #[error("window id {window_id} is negative")]
    NegativeWindowId { window_id: i32 },

    #[error("window id {window_id} appears more than once")]
    DuplicateWindowId { window_id: i32 },

    #[error("window {window_id} names display {display_id} but belongs to display {owner}")]
    WindowDisplayMismatch {
        window_id: i32,
        display_id: i32,
        owner: i32,
    },

    #[error("window {window_id} has a non-positive size")]
    InvalidWindowSize { window_id: i32 },

    #[error("window {window_id} names unknown agent window {agent_window_id}")]
    UnknownAgentWindow { window_id: i32, agent_window_id: i32 },

    /// The left/up chain starting at `id` revisits a display.
    #[error("display chain starting at physical display {id} contains a cycle")]
    InvalidTopology { id: i32 },

    #[error("unknown physical display {0}")]
    UnknownDisplay(i32),
}

/// One topology notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayChange {
    PhysicalRemoved(PhysicalDisplayState),
    PhysicalChanged(PhysicalDisplayState),
    PhysicalAdded(PhysicalDisplayState),
    WindowRemoved(WindowInfo),
    LogicalAdded(LogicalDisplay),
    WindowChanged {
        window: WindowInfo,
        changes: WindowChanges,
    },
    WindowAdded(WindowInfo),
    LogicalChanged(LogicalDisplay),
    LogicalRemoved(LogicalDisplay),
}

/// Owns the physical and logical display lists.
#[derive(Debug, Clone, Default)]
pub struct WindowStateManager {
    physical: Vec<PhysicalDisplayState>,
    logical: Vec<LogicalDisplayState>,
}

impl WindowStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn physical_displays(&self) -> &[PhysicalDisplayState] {
        &self.physical
    }

    pub fn physical_display(&self, id: i32) -> Option<&PhysicalDisplayState> {
        self.physical.iter().find(|d| d.id == id)
    }

    /// The physical display bound to a touch seat.
    pub fn physical_display_for_seat(
        &self,
        seat_id: &str,
        seat_name: &str,
    ) -> Option<&PhysicalDisplayState> {
        self.physical
            .iter()
            .find(|d| d.seat_id == seat_id && d.seat_name == seat_name)
    }

    pub fn logical_displays(&self) -> &[LogicalDisplayState] {
        &self.logical
    }

    pub fn logical_display(&self, id: i32) -> Option<&LogicalDisplayState> {
        self.logical.iter().find(|d| d.id() == id)
    }

    pub fn logical_display_mut(&mut self, id: i32) -> Option<&mut LogicalDisplayState> {
        self.logical.iter_mut().find(|d| d.id() == id)
    }

    pub fn logical_displays_mut(&mut self) -> impl Iterator<Item = &mut LogicalDisplayState> {
        self.logical.iter_mut()
    }

    // ── Transforms ────────────────────────────────────────────────────────────

    /// Maps a point on physical display `display_id` into physical global
    /// space by walking the left and up chains.
    ///
    /// # Errors
    ///
    /// [`TopologyError::UnknownDisplay`] if the display (or a link) is missing,
    /// [`TopologyError::InvalidTopology`] if a chain cycles.
    pub fn physical_to_global(
        &self,
        display_id: i32,
        x: i32,
        y: i32,
    ) -> Result<(i32, i32), TopologyError> {
        let (offset_x, offset_y) = global_offset(&self.physical, display_id)?;
        Ok((x.saturating_add(offset_x), y.saturating_add(offset_y)))
    }

    /// Resolves a global point to `(logical display id, local x, local y)`.
    /// The first logical display in list order that contains the point wins.
    pub fn global_to_logical(&self, global_x: i32, global_y: i32) -> Option<(i32, i32, i32)> {
        self.logical
            .iter()
            .find(|d| d.rect().contains(global_x, global_y))
            .map(|d| (d.id(), global_x - d.rect().x, global_y - d.rect().y))
    }

    // ── Update ────────────────────────────────────────────────────────────────

    /// Replaces the whole topology.
    ///
    /// Validation is all-or-nothing: on error nothing changes.  On success the
    /// returned notifications are ordered as described in the module docs.
    /// Applying the same input twice yields no notifications the second time.
    ///
    /// # Errors
    ///
    /// Any [`TopologyError`] validation variant.
    pub fn update_display_info(
        &mut self,
        physical: Vec<PhysicalDisplayState>,
        logical: Vec<LogicalDisplay>,
    ) -> Result<Vec<DisplayChange>, TopologyError> {
        validate_physical(&physical)?;
        validate_logical(&logical)?;

        let physical_diff = diff_in_place(
            &mut self.physical,
            physical,
            |d| d.id,
            |d| d.id,
            |d| d,
            |current, incoming| {
                if *current == incoming {
                    false
                } else {
                    *current = incoming;
                    true
                }
            },
        );

        let mut window_diff = WindowDiff::default();
        let logical_diff = diff_in_place(
            &mut self.logical,
            logical,
            LogicalDisplayState::id,
            |d| d.id,
            LogicalDisplayState::new,
            |current, incoming| {
                let rect_changed = current.set_rect(incoming.rect());
                window_diff.absorb(diff_windows(current.windows_mut(), incoming.windows));
                rect_changed
            },
        );

        for id in &logical_diff.added {
            if let Some(display) = self.logical_display(*id) {
                window_diff
                    .added
                    .extend(display.windows().iter().map(|w| w.info().clone()));
            }
        }
        for display in &logical_diff.removed {
            window_diff
                .removed
                .extend(display.windows().iter().map(|w| w.info().clone()));
        }
        window_diff.pair_moves();

        let mut changes = Vec::new();
        changes.extend(physical_diff.removed.into_iter().map(DisplayChange::PhysicalRemoved));
        changes.extend(
            physical_diff
                .changed
                .iter()
                .filter_map(|id| self.physical_display(*id).cloned())
                .map(DisplayChange::PhysicalChanged),
        );
        changes.extend(
            physical_diff
                .added
                .iter()
                .filter_map(|id| self.physical_display(*id).cloned())
                .map(DisplayChange::PhysicalAdded),
        );
        changes.extend(window_diff.removed.into_iter().map(DisplayChange::WindowRemoved));
        changes.extend(
            logical_diff
                .added
                .iter()
                .filter_map(|id| self.logical_display(*id).map(LogicalDisplayState::info))
                .map(DisplayChange::LogicalAdded),
        );
        changes.extend(
            window_diff
                .changed
                .into_iter()
                .map(|(window, changes)| DisplayChange::WindowChanged { window, changes }),
        );
        changes.extend(window_diff.added.into_iter().map(DisplayChange::WindowAdded));
        changes.extend(
            logical_diff
                .changed
                .iter()
                .filter_map(|id| self.logical_display(*id).map(LogicalDisplayState::info))
                .map(DisplayChange::LogicalChanged),
        );
        changes.extend(
            logical_diff
                .removed
                .iter()
                .map(LogicalDisplayState::info)
                .map(DisplayChange::LogicalRemoved),
        );

        debug!(
            physical = self.physical.len(),
            logical = self.logical.len(),
            notifications = changes.len(),
            "display topology updated"
        );
        Ok(changes)
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

fn validate_physical(displays: &[PhysicalDisplayState]) -> Result<(), TopologyError> {
    let kind = DisplayKind::Physical;
    let mut ids = BTreeSet::new();
    let mut seats: BTreeMap<(&str, &str), i32> = BTreeMap::new();
    for d in displays {
        if d.id < 0 {
            return Err(TopologyError::NegativeDisplayId { kind, id: d.id });
        }
        if !ids.insert(d.id) {
            return Err(TopologyError::DuplicateDisplayId { kind, id: d.id });
        }
        if d.width <= 0 || d.height <= 0 || d.logical_width <= 0 || d.logical_height <= 0 {
            return Err(TopologyError::InvalidDisplaySize { kind, id: d.id });
        }
        if d.top_left_x != 0 || d.top_left_y != 0 {
            return Err(TopologyError::NonZeroOrigin { id: d.id });
        }
        if let Some(&first) = seats.get(&(d.seat_id.as_str(), d.seat_name.as_str())) {
            return Err(TopologyError::DuplicateSeat {
                first,
                second: d.id,
                seat_id: d.seat_id.clone(),
                seat_name: d.seat_name.clone(),
            });
        }
        seats.insert((d.seat_id.as_str(), d.seat_name.as_str()), d.id);
    }
    for d in displays {
        for target in [d.left_display_id, d.up_display_id].into_iter().flatten() {
            if !ids.contains(&target) {
                return Err(TopologyError::DanglingLink { id: d.id, target });
            }
        }
    }
    for d in displays {
        global_offset(displays, d.id)?;
    }
    Ok(())
}

fn validate_logical(displays: &[LogicalDisplay]) -> Result<(), TopologyError> {
    let kind = DisplayKind::Logical;
    let mut ids = BTreeSet::new();
    let mut window_ids = BTreeSet::new();
    for d in displays {
        if d.id < 0 {
            return Err(TopologyError::NegativeDisplayId { kind, id: d.id });
        }
        if !ids.insert(d.id) {
            return Err(TopologyError::DuplicateDisplayId { kind, id: d.id });
        }
        if d.width <= 0 || d.height <= 0 {
            return Err(TopologyError::InvalidDisplaySize { kind, id: d.id });
        }
        if d.top_left_x < 0 || d.top_left_y < 0 {
            return Err(TopologyError::NegativeOrigin { id: d.id });
        }
        for w in &d.windows {
            if w.id < 0 {
                return Err(TopologyError::NegativeWindowId { window_id: w.id });
            }
            if !window_ids.insert(w.id) {
                return Err(TopologyError::DuplicateWindowId { window_id: w.id });
            }
            if w.display_id != d.id {
                return Err(TopologyError::WindowDisplayMismatch {
                    window_id: w.id,
                    display_id: w.display_id,
                    owner: d.id,
                });
            }
            if w.area.width <= 0 || w.area.height <= 0 {
                return Err(TopologyError::InvalidWindowSize { window_id: w.id });
            }
        }
    }
    for w in displays.iter().flat_map(|d| &d.windows) {
        if let Some(agent) = w.agent_window_id {
            if !window_ids.contains(&agent) {
                return Err(TopologyError::UnknownAgentWindow {
                    window_id: w.id,
                    agent_window_id: agent,
                });
            }
        }
    }
    Ok(())
}

// ── Chain walk ────────────────────────────────────────────────────────────────

/// Offset of display `id` in global space: the sum of `logical_width` along
/// the left chain and of `logical_height` along the up chain.
fn global_offset(
    displays: &[PhysicalDisplayState],
    id: i32,
) -> Result<(i32, i32), TopologyError> {
    let start = displays
        .iter()
        .find(|d| d.id == id)
        .ok_or(TopologyError::UnknownDisplay(id))?;
    let x = chain_sum(displays, start, |d| d.left_display_id, |d| d.logical_width)?;
    let y = chain_sum(displays, start, |d| d.up_display_id, |d| d.logical_height)?;
    Ok((x, y))
}

fn chain_sum(
    displays: &[PhysicalDisplayState],
    start: &PhysicalDisplayState,
    link: impl Fn(&PhysicalDisplayState) -> Option<i32>,
    extent: impl Fn(&PhysicalDisplayState) -> i32,
) -> Result<i32, TopologyError> {
    let mut visited = BTreeSet::from([start.id]);
    let mut sum = 0i32;
    let mut current = start;
    while let Some(next_id) = link(current) {
        if !visited.insert(next_id) {
            return Err(TopologyError::InvalidTopology { id: start.id });
        }
        current = displays
            .iter()
            .find(|d| d.id == next_id)
            .ok_or(TopologyError::UnknownDisplay(next_id))?;
        sum = sum.saturating_add(extent(current));
    }
    Ok(sum)
}

// ── Diff ──────────────────────────────────────────────────────────────────────

struct DiffOutcome<T> {
    added: Vec<i32>,
    changed: Vec<i32>,
    removed: Vec<T>,
}

/// Reorders `current` in place to match `incoming` (ids must be unique).
///
/// For each incoming position: an existing entry with the same id further
/// down is swapped into place and updated; otherwise a new entry is inserted.
/// Entries left past the end are the removed ones.
fn diff_in_place<T, U>(
    current: &mut Vec<T>,
    incoming: Vec<U>,
    current_id: impl Fn(&T) -> i32,
    incoming_id: impl Fn(&U) -> i32,
    create: impl Fn(U) -> T,
    mut update: impl FnMut(&mut T, U) -> bool,
) -> DiffOutcome<T> {
    let mut outcome = DiffOutcome {
        added: Vec::new(),
        changed: Vec::new(),
        removed: Vec::new(),
    };
    let count = incoming.len();
    for (pos, item) in incoming.into_iter().enumerate() {
        let id = incoming_id(&item);
        let found = current
            .iter()
            .skip(pos)
            .position(|c| current_id(c) == id)
            .map(|offset| pos + offset);
        match found {
            Some(index) => {
                current.swap(pos, index);
                if update(&mut current[pos], item) {
                    outcome.changed.push(id);
                }
            }
            None => {
                current.insert(pos, create(item));
                outcome.added.push(id);
            }
        }
    }
    outcome.removed = current.split_off(count);
    outcome
}

#[derive(Default)]
struct WindowDiff {
    removed: Vec<WindowInfo>,
    changed: Vec<(WindowInfo, WindowChanges)>,
    added: Vec<WindowInfo>,
}

impl WindowDiff {
    fn absorb(&mut self, other: WindowDiff) {
        self.removed.extend(other.removed);
        self.changed.extend(other.changed);
        self.added.extend(other.added);
    }

    /// A window removed from one display and added to another is a change
    /// of its display, not a removal plus an addition.
    fn pair_moves(&mut self) {
        let mut remaining: BTreeMap<i32, WindowInfo> =
            self.removed.drain(..).map(|w| (w.id, w)).collect();
        let mut added = Vec::new();
        for window in self.added.drain(..) {
            match remaining.remove(&window.id) {
                Some(old) => {
                    let changes = WindowChanges::between(&old, &window);
                    self.changed.push((window, changes));
                }
                None => added.push(window),
            }
        }
        self.added = added;
        self.removed = remaining.into_values().collect();
    }
}

fn diff_windows(current: &mut Vec<InputWindowState>, incoming: Vec<WindowInfo>) -> WindowDiff {
    let mut changed = Vec::new();
    let outcome = diff_in_place(
        current,
        incoming,
        InputWindowState::id,
        |w| w.id,
        InputWindowState::new,
        |state, info| {
            let changes = state.update(info);
            if changes.is_empty() {
                return false;
            }
            changed.push((state.info().clone(), changes));
            true
        },
    );
    let added = outcome
        .added
        .iter()
        .filter_map(|id| current.iter().find(|w| w.id() == *id))
        .map(|w| w.info().clone())
        .collect();
    WindowDiff {
        removed: outcome.removed.into_iter().map(|w| w.info().clone()).collect(),
        changed,
        added,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Rect;

    fn window(id: i32, display_id: i32) -> WindowInfo {
        WindowInfo {
            id,
            display_id,
            area: Rect::new(0, 0, 100, 100),
            agent_window_id: None,
        }
    }

    fn logical(id: i32, x: i32, y: i32, w: i32, h: i32, windows: Vec<WindowInfo>) -> LogicalDisplay {
        LogicalDisplay {
            windows,
            ..LogicalDisplay::new(id, Rect::new(x, y, w, h))
        }
    }

    /// Two 1920x1080 panels side by side, one logical display over each.
    fn side_by_side() -> (Vec<PhysicalDisplayState>, Vec<LogicalDisplay>) {
        (
            vec![
                PhysicalDisplayState::new(0, 1920, 1080),
                PhysicalDisplayState::new(1, 1920, 1080)
                    .with_left(0)
                    .with_seat("seat0", "panel1"),
            ],
            vec![
                logical(10, 0, 0, 1920, 1080, vec![window(100, 10)]),
                logical(11, 1920, 0, 1920, 1080, vec![window(101, 11)]),
            ],
        )
    }

    fn kinds(changes: &[DisplayChange]) -> Vec<&'static str> {
        changes
            .iter()
            .map(|c| match c {
                DisplayChange::PhysicalRemoved(_) => "physical_removed",
                DisplayChange::PhysicalChanged(_) => "physical_changed",
                DisplayChange::PhysicalAdded(_) => "physical_added",
                DisplayChange::WindowRemoved(_) => "window_removed",
                DisplayChange::LogicalAdded(_) => "logical_added",
                DisplayChange::WindowChanged { .. } => "window_changed",
                DisplayChange::WindowAdded(_) => "window_added",
                DisplayChange::LogicalChanged(_) => "logical_changed",
                DisplayChange::LogicalRemoved(_) => "logical_removed",
            })
            .collect()
    }

    // ── update_display_info ───────────────────────────────────────────────────

    #[test]
    fn test_update_display_info_announces_displays_before_their_windows() {
        // Arrange
        let mut manager = WindowStateManager::new();
        let (physical, logical) = side_by_side();

        // Act
        let changes = manager.update_display_info(physical, logical).unwrap();

        // Assert
        assert_eq!(
            kinds(&changes),
            vec![
                "physical_added",
                "physical_added",
                "logical_added",
                "logical_added",
                "window_added",
                "window_added",
            ]
        );
    }

    #[test]
    fn test_update_display_info_is_idempotent() {
        let mut manager = WindowStateManager::new();
        let (physical, logical) = side_by_side();
        manager
            .update_display_info(physical.clone(), logical.clone())
            .unwrap();

        let changes = manager.update_display_info(physical, logical).unwrap();

        assert!(changes.is_empty(), "second identical update must be silent: {changes:?}");
    }

    #[test]
    fn test_update_display_info_reorders_without_spurious_changes() {
        let mut manager = WindowStateManager::new();
        let (physical, mut logical) = side_by_side();
        manager
            .update_display_info(physical.clone(), logical.clone())
            .unwrap();

        logical.reverse();
        let changes = manager.update_display_info(physical, logical).unwrap();

        assert!(changes.is_empty());
        let ids: Vec<i32> = manager.logical_displays().iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec![11, 10]);
    }

    #[test]
    fn test_update_display_info_orders_removals_changes_and_additions() {
        // Arrange
        let mut manager = WindowStateManager::new();
        let (physical, logical) = side_by_side();
        manager.update_display_info(physical, logical).unwrap();

        let physical = vec![
            PhysicalDisplayState::new(0, 2560, 1440),
            PhysicalDisplayState::new(2, 1920, 1080).with_up(0).with_seat("seat1", "seat1"),
        ];
        let logical = vec![
            self::logical(10, 0, 0, 2560, 1440, vec![window(100, 10)]),
            self::logical(12, 0, 1440, 1920, 1080, vec![window(102, 12)]),
        ];

        // Act
        let changes = manager.update_display_info(physical, logical).unwrap();

        // Assert
        assert_eq!(
            kinds(&changes),
            vec![
                "physical_removed",
                "physical_changed",
                "physical_added",
                "window_removed",
                "logical_added",
                "window_added",
                "logical_changed",
                "logical_removed",
            ]
        );
    }

    #[test]
    fn test_update_display_info_reports_window_moved_between_displays_as_changed() {
        let mut manager = WindowStateManager::new();
        let (physical, logical) = side_by_side();
        manager
            .update_display_info(physical.clone(), logical)
            .unwrap();

        let logical = vec![
            self::logical(10, 0, 0, 1920, 1080, vec![]),
            self::logical(11, 1920, 0, 1920, 1080, vec![window(101, 11), window(100, 11)]),
        ];
        let changes = manager.update_display_info(physical, logical).unwrap();

        assert_eq!(
            changes,
            vec![DisplayChange::WindowChanged {
                window: window(100, 11),
                changes: WindowChanges::DISPLAY,
            }]
        );
    }

    #[test]
    fn test_update_display_info_rejects_dangling_left_link_and_keeps_previous_state() {
        // Arrange
        let mut manager = WindowStateManager::new();
        let (physical, logical) = side_by_side();
        manager
            .update_display_info(physical.clone(), logical.clone())
            .unwrap();
        let bad = vec![PhysicalDisplayState::new(0, 800, 600).with_left(42)];

        // Act
        let result = manager.update_display_info(bad, vec![]);

        // Assert
        assert_eq!(result, Err(TopologyError::DanglingLink { id: 0, target: 42 }));
        assert_eq!(manager.physical_displays(), physical.as_slice());
        assert_eq!(manager.logical_displays().len(), 2);
        assert_eq!(manager.logical_display(11).unwrap().info(), logical[1]);
    }

    #[test]
    fn test_update_display_info_rejects_cycle() {
        let mut manager = WindowStateManager::new();
        let physical = vec![
            PhysicalDisplayState::new(0, 800, 600).with_left(1),
            PhysicalDisplayState::new(1, 800, 600)
                .with_left(0)
                .with_seat("seat0", "b"),
        ];
        assert!(matches!(
            manager.update_display_info(physical, vec![]),
            Err(TopologyError::InvalidTopology { .. })
        ));
    }

    #[test]
    fn test_update_display_info_rejects_shared_seat_pair() {
        let mut manager = WindowStateManager::new();
        let physical = vec![
            PhysicalDisplayState::new(0, 800, 600),
            PhysicalDisplayState::new(1, 800, 600),
        ];
        assert!(matches!(
            manager.update_display_info(physical, vec![]),
            Err(TopologyError::DuplicateSeat { first: 0, second: 1, .. })
        ));
    }

    #[test]
    fn test_update_display_info_rejects_invalid_display_fields() {
        let mut manager = WindowStateManager::new();
        let mut origin = PhysicalDisplayState::new(0, 800, 600);
        origin.top_left_x = 5;
        assert_eq!(
            manager.update_display_info(vec![origin], vec![]),
            Err(TopologyError::NonZeroOrigin { id: 0 })
        );
        assert_eq!(
            manager.update_display_info(vec![PhysicalDisplayState::new(-1, 800, 600)], vec![]),
            Err(TopologyError::NegativeDisplayId { kind: DisplayKind::Physical, id: -1 })
        );
        assert_eq!(
            manager.update_display_info(vec![], vec![logical(3, -1, 0, 10, 10, vec![])]),
            Err(TopologyError::NegativeOrigin { id: 3 })
        );
        assert_eq!(
            manager.update_display_info(vec![], vec![logical(3, 0, 0, 0, 10, vec![])]),
            Err(TopologyError::InvalidDisplaySize { kind: DisplayKind::Logical, id: 3 })
        );
    }

    #[test]
    fn test_update_display_info_rejects_invalid_windows() {
        let mut manager = WindowStateManager::new();
        assert_eq!(
            manager.update_display_info(vec![], vec![logical(1, 0, 0, 10, 10, vec![window(5, 2)])]),
            Err(TopologyError::WindowDisplayMismatch { window_id: 5, display_id: 2, owner: 1 })
        );

        let mut agent = window(5, 1);
        agent.agent_window_id = Some(9);
        assert_eq!(
            manager.update_display_info(vec![], vec![logical(1, 0, 0, 10, 10, vec![agent])]),
            Err(TopologyError::UnknownAgentWindow { window_id: 5, agent_window_id: 9 })
        );

        let mut tiny = window(5, 1);
        tiny.area.height = 0;
        assert_eq!(
            manager.update_display_info(vec![], vec![logical(1, 0, 0, 10, 10, vec![tiny])]),
            Err(TopologyError::InvalidWindowSize { window_id: 5 })
        );
    }

    #[test]
    fn test_update_display_info_accepts_agent_in_another_display() {
        let mut manager = WindowStateManager::new();
        let mut w = window(5, 1);
        w.agent_window_id = Some(6);
        let logical = vec![
            logical(1, 0, 0, 10, 10, vec![w]),
            logical(2, 10, 0, 10, 10, vec![window(6, 2)]),
        ];
        assert!(manager.update_display_info(vec![], logical).is_ok());
    }

    // ── Transforms ────────────────────────────────────────────────────────────

    #[test]
    fn test_physical_to_global_accumulates_left_chain_widths() {
        let mut manager = WindowStateManager::new();
        let physical = vec![
            PhysicalDisplayState::new(0, 1000, 500),
            PhysicalDisplayState::new(1, 800, 600)
                .with_left(0)
                .with_seat("seat0", "b"),
            PhysicalDisplayState::new(2, 640, 480)
                .with_left(1)
                .with_seat("seat0", "c"),
        ];
        manager.update_display_info(physical, vec![]).unwrap();

        assert_eq!(manager.physical_to_global(2, 10, 20), Ok((1810, 20)));
    }

    #[test]
    fn test_physical_to_global_uses_logical_extents_of_predecessors() {
        let mut manager = WindowStateManager::new();
        let physical = vec![
            PhysicalDisplayState::new(0, 3840, 2160).with_logical_size(1920, 1080),
            PhysicalDisplayState::new(1, 1920, 1080)
                .with_up(0)
                .with_seat("seat0", "b"),
        ];
        manager.update_display_info(physical, vec![]).unwrap();

        assert_eq!(manager.physical_to_global(1, 5, 5), Ok((5, 1085)));
    }

    #[test]
    fn test_physical_to_global_saturates_instead_of_overflowing() {
        let mut manager = WindowStateManager::new();
        let physical = vec![
            PhysicalDisplayState::new(0, 1000, 500),
            PhysicalDisplayState::new(1, 800, 600)
                .with_left(0)
                .with_seat("seat0", "b"),
        ];
        manager.update_display_info(physical, vec![]).unwrap();

        assert_eq!(
            manager.physical_to_global(1, i32::MAX - 10, i32::MIN),
            Ok((i32::MAX, i32::MIN))
        );
    }

    #[test]
    fn test_physical_to_global_fails_for_unknown_display() {
        let manager = WindowStateManager::new();
        assert_eq!(
            manager.physical_to_global(3, 0, 0),
            Err(TopologyError::UnknownDisplay(3))
        );
    }

    #[test]
    fn test_global_to_logical_first_match_wins_on_overlap() {
        let mut manager = WindowStateManager::new();
        let logical = vec![
            logical(1, 0, 0, 100, 100, vec![]),
            logical(2, 50, 50, 100, 100, vec![]),
        ];
        manager.update_display_info(vec![], logical).unwrap();

        assert_eq!(manager.global_to_logical(60, 60), Some((1, 60, 60)));
        assert_eq!(manager.global_to_logical(120, 120), Some((2, 70, 70)));
        assert_eq!(manager.global_to_logical(500, 500), None);
    }

    #[test]
    fn test_global_round_trip_lands_inside_target_display() {
        // Arrange
        let mut manager = WindowStateManager::new();
        let (physical, logical) = side_by_side();
        manager.update_display_info(physical, logical).unwrap();

        // Act: a point on the second panel
        let (gx, gy) = manager.physical_to_global(1, 300, 400).unwrap();
        let (display_id, lx, ly) = manager.global_to_logical(gx, gy).unwrap();

        // Assert
        assert_eq!(display_id, 11);
        assert_eq!((lx, ly), (300, 400));
    }
}

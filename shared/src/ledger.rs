//! Collected/spawned trash counters with change notification

use log::{debug, info};

/// Score value of one collected item on the HUD
pub const POINTS_PER_ITEM: i32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEvent {
    /// Items were collected; carries the new total
    Collected { total: i32 },
    /// An item was spawned; carries the new spawn count
    Spawned { count: i32 },
    /// Counters were zeroed by an explicit reset
    Reset,
}

pub type LedgerListener = Box<dyn FnMut(&LedgerEvent) + Send>;

/// Per-participant replica of the trash counters.
///
/// `total_collected` only grows through `add` and only drops through `reset`.
pub struct TrashLedger {
    total_collected: i32,
    spawned_count: i32,
    target: i32,
    listeners: Vec<LedgerListener>,
}

impl TrashLedger {
    pub fn new(target: i32) -> Self {
        Self {
            total_collected: 0,
            spawned_count: 0,
            target,
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: LedgerListener) {
        self.listeners.push(listener);
    }

    /// Adds collected items. Zero or negative deltas are ignored.
    pub fn add(&mut self, delta: i32) {
        if delta <= 0 {
            debug!("Ignoring non-positive ledger delta {}", delta);
            return;
        }

        self.total_collected += delta;
        info!("Trash collected: {}/{}", self.total_collected, self.target);
        if self.total_collected >= self.target && self.total_collected - delta < self.target {
            info!("Collection target of {} reached", self.target);
        }

        let event = LedgerEvent::Collected {
            total: self.total_collected,
        };
        self.notify(&event);
    }

    pub fn get(&self) -> i32 {
        self.total_collected
    }

    /// Zeroes the collected counter without a `Collected` notification
    pub fn reset(&mut self) {
        self.total_collected = 0;
        debug!("Collected counter reset");
        self.notify(&LedgerEvent::Reset);
    }

    pub fn increment_spawned(&mut self) {
        self.spawned_count += 1;
        let event = LedgerEvent::Spawned {
            count: self.spawned_count,
        };
        self.notify(&event);
    }

    pub fn spawned_count(&self) -> i32 {
        self.spawned_count
    }

    pub fn reset_spawned(&mut self) {
        self.spawned_count = 0;
        debug!("Spawn counter reset");
    }

    pub fn total_points(&self) -> i32 {
        self.total_collected * POINTS_PER_ITEM
    }

    pub fn target(&self) -> i32 {
        self.target
    }

    pub fn target_reached(&self) -> bool {
        self.total_collected >= self.target
    }

    fn notify(&mut self, event: &LedgerEvent) {
        for listener in self.listeners.iter_mut() {
            listener(event);
        }
    }
}

impl std::fmt::Debug for TrashLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrashLedger")
            .field("total_collected", &self.total_collected)
            .field("spawned_count", &self.spawned_count)
            .field("target", &self.target)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

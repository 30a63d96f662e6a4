use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Per-slot bookkeeping for insertion and removal handling.
#[derive(Debug, Default)]
pub struct SlotState {
    last_event: Option<Instant>,
}

impl SlotState {
    pub fn record_event(&mut self, at: Instant) {
        self.last_event = Some(at);
    }

    pub fn last_event(&self) -> Option<Instant> {
        self.last_event
    }

    pub fn since_last_event(&self, now: Instant) -> Option<Duration> {
        self.last_event.map(|t| now.saturating_duration_since(t))
    }
}

/// One lock per physical slot, indexed from 1.
#[derive(Debug)]
pub struct SlotTable {
    slots: Vec<Mutex<SlotState>>,
}

impl SlotTable {
    pub fn new(count: u8) -> Self {
        Self {
            slots: (0..count).map(|_| Mutex::new(SlotState::default())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, slot_id: u8) -> Option<&Mutex<SlotState>> {
        usize::from(slot_id)
            .checked_sub(1)
            .and_then(|idx| self.slots.get(idx))
    }
}

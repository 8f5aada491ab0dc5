//! Bounded ring buffer of structured, typed events backing the `on_error` /
//! `on_state_changed` observer payloads: a bounded ring buffer of
//! category-and-sentiment-tagged events, read by the facade and handed
//! out verbatim or condensed into an `on_error` notification.

use std::collections::VecDeque;

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitEvent {
    PacketDestroyed {
        at: String,
        origin: String,
        guild: String,
    },
    RouteReplannedAfterInvalidPlugin {
        territory: String,
        provider: String,
    },
    TreasuryBandChanged {
        territory: String,
        previous_multiplier: f64,
        new_multiplier: f64,
    },
}

impl TransitEvent {
    pub fn category(&self) -> &'static str {
        match self {
            TransitEvent::PacketDestroyed { .. } => "transit",
            TransitEvent::RouteReplannedAfterInvalidPlugin { .. } => "pathfinder",
            TransitEvent::TreasuryBandChanged { .. } => "treasury",
        }
    }

    pub fn sentiment(&self) -> Sentiment {
        match self {
            TransitEvent::PacketDestroyed { .. } => Sentiment::Negative,
            TransitEvent::RouteReplannedAfterInvalidPlugin { .. } => Sentiment::Negative,
            TransitEvent::TreasuryBandChanged { .. } => Sentiment::Positive,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub tick: u64,
    pub kind: TransitEvent,
}

#[derive(Debug, Resource)]
pub struct WorldEventLog {
    events: VecDeque<LoggedEvent>,
    capacity: usize,
    current_tick: u64,
}

impl WorldEventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            current_tick: 0,
        }
    }

    pub fn set_tick(&mut self, tick: u64) {
        self.current_tick = tick;
    }

    pub fn push(&mut self, kind: TransitEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(LoggedEvent {
            tick: self.current_tick,
            kind,
        });
    }

    pub fn snapshot(&self) -> Vec<LoggedEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Default for WorldEventLog {
    fn default() -> Self {
        Self::new(256)
    }
}

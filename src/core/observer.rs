//! Typed subscription channels for `on_tick`, `on_territory_changed`,
//! `on_state_changed`, `on_error`. Each subscription is an explicit handle
//! returned to the registrar for deregistration; no implicit global mutable
//! lists leak across world resets. Backed by `crossbeam-channel` for
//! push-style delivery rather than a polled snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::core::error::CoreError;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

fn next_id() -> SubscriptionId {
    SubscriptionId(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug, Clone)]
pub struct ErrorNotification {
    pub kind: &'static str,
    pub detail: String,
}

impl ErrorNotification {
    pub fn from_core_error(err: &CoreError) -> Self {
        Self {
            kind: err.discriminant(),
            detail: err.to_string(),
        }
    }

    /// Builds an `on_error` record from a transit-time condition that has no
    /// synchronous `CoreError` to attach to (the call that triggered it, if
    /// any, already returned `Ok`). Uses the same discriminants
    /// `CoreError::BorderClosed`/`CoreError::InvalidRoute` carry for the
    /// synchronous variants of the same conditions.
    pub fn from_transit_event(event: &crate::core::events::TransitEvent) -> Self {
        use crate::core::events::TransitEvent;
        match event {
            TransitEvent::PacketDestroyed { at, origin, guild } => Self {
                kind: "border_closed",
                detail: format!("packet from '{origin}' (guild '{guild}') destroyed at closed border '{at}'"),
            },
            TransitEvent::RouteReplannedAfterInvalidPlugin { territory, provider } => Self {
                kind: "invalid_route",
                detail: format!(
                    "plugin pathfinder '{provider}' returned a route violating policy for '{territory}'; replanned with dijkstra"
                ),
            },
            TransitEvent::TreasuryBandChanged {
                territory,
                previous_multiplier,
                new_multiplier,
            } => Self {
                kind: "treasury_band_changed",
                detail: format!("'{territory}' treasury multiplier changed from {previous_multiplier} to {new_multiplier}"),
            },
        }
    }
}

/// A single event kind's subscriber list. Delivery is FIFO per registration
/// order: subscribers are notified in the `Vec`'s order, which only grows by
/// appending newly registered handles.
struct Channel<T: Clone> {
    subscribers: Vec<(SubscriptionId, Sender<T>)>,
}

impl<T: Clone> Default for Channel<T> {
    fn default() -> Self {
        Self { subscribers: Vec::new() }
    }
}

impl<T: Clone> Channel<T> {
    fn subscribe(&mut self) -> (SubscriptionId, Receiver<T>) {
        let id = next_id();
        let (tx, rx) = unbounded();
        self.subscribers.push((id, tx));
        (id, rx)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscribers.retain(|(existing, _)| *existing != id);
    }

    fn notify(&mut self, event: T) {
        self.subscribers.retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }
}

/// The observer hub: one `bevy_ecs::Resource`-hosted instance per world,
/// owning all four channel kinds.
#[derive(Default)]
pub struct ObserverHub {
    on_tick: Channel<u64>,
    on_territory_changed: Channel<String>,
    on_state_changed: Channel<()>,
    on_error: Channel<ErrorNotification>,
}

impl ObserverHub {
    pub fn subscribe_tick(&mut self) -> (SubscriptionId, Receiver<u64>) {
        self.on_tick.subscribe()
    }

    pub fn subscribe_territory_changed(&mut self) -> (SubscriptionId, Receiver<String>) {
        self.on_territory_changed.subscribe()
    }

    pub fn subscribe_state_changed(&mut self) -> (SubscriptionId, Receiver<()>) {
        self.on_state_changed.subscribe()
    }

    pub fn subscribe_error(&mut self) -> (SubscriptionId, Receiver<ErrorNotification>) {
        self.on_error.subscribe()
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.on_tick.unsubscribe(id);
        self.on_territory_changed.unsubscribe(id);
        self.on_state_changed.unsubscribe(id);
        self.on_error.unsubscribe(id);
    }

    pub fn notify_tick(&mut self, tick: u64) {
        self.on_tick.notify(tick);
    }

    pub fn notify_territory_changed(&mut self, name: impl Into<String>) {
        self.on_territory_changed.notify(name.into());
    }

    pub fn notify_state_changed(&mut self) {
        self.on_state_changed.notify(());
    }

    pub fn notify_error(&mut self, err: &CoreError) {
        self.on_error.notify(ErrorNotification::from_core_error(err));
    }

    /// Relays an already-built notification (typically from
    /// `ErrorNotification::from_transit_event`) through the same `on_error`
    /// channel `notify_error` uses.
    pub fn notify_error_event(&mut self, notification: ErrorNotification) {
        self.on_error.notify(notification);
    }
}

impl bevy_ecs::prelude::Resource for ObserverHub {}

//! Event subscriptions and delivery.

use super::{Liveness, SubscriptionToken};
use scriptforge_runtime::ScriptValue;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Handler invoked with a mutable event. Returning [`Liveness::Inert`]
/// removes the subscription.
pub type EventHandler = Rc<dyn Fn(&mut Event) -> Liveness>;

/// Delivery order of subscribers. `Lowest` runs first, `Monitor` last.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventPriority {
    Lowest,
    Low,
    #[default]
    Normal,
    High,
    Highest,
    Monitor,
}

impl EventPriority {
    /// Parse a priority name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lowest" => Some(EventPriority::Lowest),
            "low" => Some(EventPriority::Low),
            "normal" => Some(EventPriority::Normal),
            "high" => Some(EventPriority::High),
            "highest" => Some(EventPriority::Highest),
            "monitor" => Some(EventPriority::Monitor),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventPriority::Lowest => "lowest",
            EventPriority::Low => "low",
            EventPriority::Normal => "normal",
            EventPriority::High => "high",
            EventPriority::Highest => "highest",
            EventPriority::Monitor => "monitor",
        }
    }
}

impl fmt::Display for EventPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event travelling through the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event kind, e.g. `player_join`.
    pub kind: String,

    /// Arbitrary payload.
    pub payload: ScriptValue,

    /// Set by handlers to cancel the event.
    pub cancelled: bool,
}

impl Event {
    pub fn new(kind: impl Into<String>, payload: ScriptValue) -> Self {
        Self {
            kind: kind.into(),
            payload,
            cancelled: false,
        }
    }
}

/// Host-side event bus.
pub trait EventBus {
    /// Subscribe `handler` to events of `kind`.
    ///
    /// With `ignore_cancelled` set the handler is skipped for events an
    /// earlier handler cancelled.
    fn subscribe(
        &self,
        owner: &str,
        kind: &str,
        priority: EventPriority,
        handler: EventHandler,
        ignore_cancelled: bool,
    ) -> SubscriptionToken;
}

struct Subscription {
    token: u64,
    owner: String,
    kind: String,
    priority: EventPriority,
    ignore_cancelled: bool,
    handler: EventHandler,
}

#[derive(Default)]
struct BusState {
    next_token: u64,
    subscriptions: Vec<Subscription>,
}

/// Single-threaded event bus with synchronous delivery.
#[derive(Default)]
pub struct LocalEventBus {
    state: RefCell<BusState>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every matching subscriber.
    ///
    /// Returns the number of handlers that were invoked.
    pub fn emit(&self, event: &mut Event) -> usize {
        let mut targets: Vec<(EventPriority, u64, bool, EventHandler)> = self
            .state
            .borrow()
            .subscriptions
            .iter()
            .filter(|sub| sub.kind == event.kind)
            .map(|sub| {
                (
                    sub.priority,
                    sub.token,
                    sub.ignore_cancelled,
                    Rc::clone(&sub.handler),
                )
            })
            .collect();
        targets.sort_by_key(|(priority, token, _, _)| (*priority, *token));

        let mut delivered = 0;
        for (_, token, ignore_cancelled, handler) in targets {
            if ignore_cancelled && event.cancelled {
                continue;
            }
            delivered += 1;
            if handler(event) == Liveness::Inert {
                self.state
                    .borrow_mut()
                    .subscriptions
                    .retain(|sub| sub.token != token);
            }
        }
        delivered
    }

    /// Total number of subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.state.borrow().subscriptions.len()
    }

    /// Subscriptions held by one owner.
    pub fn subscriptions_for(&self, owner: &str) -> usize {
        self.state
            .borrow()
            .subscriptions
            .iter()
            .filter(|sub| sub.owner == owner)
            .count()
    }
}

impl EventBus for LocalEventBus {
    fn subscribe(
        &self,
        owner: &str,
        kind: &str,
        priority: EventPriority,
        handler: EventHandler,
        ignore_cancelled: bool,
    ) -> SubscriptionToken {
        let mut state = self.state.borrow_mut();
        state.next_token += 1;
        let token = state.next_token;
        state.subscriptions.push(Subscription {
            token,
            owner: owner.to_string(),
            kind: kind.to_string(),
            priority,
            ignore_cancelled,
            handler,
        });
        SubscriptionToken(token)
    }
}

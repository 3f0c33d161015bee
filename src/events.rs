use serde::Serialize;

use crate::exec::ExecFailure;
use crate::names::SnippetId;
use crate::snippet::Status;

/// The prior holder of a declaration key, replaced by the event's snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Superseded {
    pub snippet: SnippetId,
    pub status: Status,
}

/// One status transition produced by `eval` or `drop`.
///
/// A re-declaration is a new snippet, so its event starts at NONEXISTENT;
/// the snippet it replaced is named in `superseded`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnippetEvent {
    pub snippet: SnippetId,
    pub previous_status: Status,
    pub status: Status,
    pub is_signature_change: bool,
    /// The snippet whose submission or drop triggered this update; `None`
    /// for the root of the call.
    pub cause: Option<SnippetId>,
    pub value: Option<String>,
    pub exception: Option<ExecFailure>,
    pub superseded: Option<Superseded>,
}

impl SnippetEvent {
    /// The transition as seen by the declaration key rather than the
    /// snippet: a re-declaration of a VALID method that stays VALID is
    /// `(Valid, Valid)`.
    pub fn key_transition(&self) -> (Status, Status) {
        let previous = self
            .superseded
            .map(|s| s.status)
            .unwrap_or(self.previous_status);
        (previous, self.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

pub type EventHandler = Box<dyn FnMut(&SnippetEvent) + Send>;

/// Delivers events to subscribers in emission order, synchronously.
#[derive(Default)]
pub struct EventDispatcher {
    next_token: u64,
    handlers: Vec<(SubscriptionToken, EventHandler)>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, handler: EventHandler) -> SubscriptionToken {
        self.next_token += 1;
        let token = SubscriptionToken(self.next_token);
        self.handlers.push((token, handler));
        token
    }

    /// Returns false when the token was not subscribed.
    pub fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(t, _)| *t != token);
        self.handlers.len() != before
    }

    pub fn publish(&mut self, events: &[SnippetEvent]) {
        for event in events {
            for (_, handler) in &mut self.handlers {
                handler(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn event(id: u32) -> SnippetEvent {
        SnippetEvent {
            snippet: SnippetId(id),
            previous_status: Status::Nonexistent,
            status: Status::Valid,
            is_signature_change: true,
            cause: None,
            value: None,
            exception: None,
            superseded: None,
        }
    }

    #[test]
    fn publishes_in_order_to_every_subscriber() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut d = EventDispatcher::new();
        for tag in ["a", "b"] {
            let seen = seen.clone();
            d.subscribe(Box::new(move |e: &SnippetEvent| {
                seen.lock().unwrap().push(format!("{}{}", tag, e.snippet))
            }));
        }
        d.publish(&[event(1), event(2)]);
        assert_eq!(*seen.lock().unwrap(), vec!["a1", "b1", "a2", "b2"]);
    }

    #[test]
    fn key_transition_follows_superseded_holder() {
        let mut e = event(4);
        assert_eq!(e.key_transition(), (Status::Nonexistent, Status::Valid));
        e.superseded = Some(Superseded {
            snippet: SnippetId(1),
            status: Status::Valid,
        });
        assert_eq!(e.key_transition(), (Status::Valid, Status::Valid));
    }

    #[test]
    fn unsubscribed_handlers_stop_receiving() {
        let count = Arc::new(Mutex::new(0));
        let mut d = EventDispatcher::new();
        let c = count.clone();
        let token = d.subscribe(Box::new(move |_: &SnippetEvent| *c.lock().unwrap() += 1));
        d.publish(&[event(1)]);
        assert!(d.unsubscribe(token));
        assert!(!d.unsubscribe(token));
        d.publish(&[event(2)]);
        assert_eq!(*count.lock().unwrap(), 1);
    }
}

//! Typed publish/subscribe used by every stateful component.
//!
//! Handlers run synchronously, in registration order, on the thread that calls [`EventEmitter::emit`].
//! Components that need to observe each other subscribe through [`EventEmitter::forward_to`] and
//! drain the receiving end of the channel, which keeps ownership flat (no shared mutable state).

use std::sync::mpsc::Sender;

/// Token returned by [`EventEmitter::subscribe`]; pass it back to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler<E> = Box<dyn FnMut(&E) + Send>;

pub struct EventEmitter<E> {
    next_id: u64,
    handlers: Vec<(SubscriptionId, Handler<E>)>,
}

impl<E> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            handlers: Vec::new(),
        }
    }

    /// Register `handler`; it receives every event emitted after this call.
    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&E) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if the id was unknown (already removed or cleared).
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(hid, _)| *hid != id);
        self.handlers.len() != before
    }

    pub fn emit(&mut self, event: &E) {
        for (_, handler) in &mut self.handlers {
            handler(event);
        }
    }

    /// Drop every handler.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<E: Clone + Send + 'static> EventEmitter<E> {
    /// Forward clones of every event into `tx`. A disconnected receiver is ignored.
    pub fn forward_to(&mut self, tx: Sender<E>) -> SubscriptionId {
        self.subscribe(move |event: &E| {
            let _ = tx.send(event.clone());
        })
    }
}

impl<E> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/events.rs"]
mod tests;

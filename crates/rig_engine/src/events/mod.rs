//! Scene change events
//!
//! Key principles:
//! - Every mutation of a scene node emits exactly one event naming the node
//! - Handler returns bool (true = consumed, stops forwarding to later handlers)
//! - Registration is per node, so only interested handlers are notified
//! - Queuing: events are delivered to handlers immediately and also queued
//!   for the orchestrator, which drains them to drive reconciliation

use std::collections::HashMap;

use crate::scene::{NodeId, PayloadValue};

/// What happened to a node
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEventKind {
    /// A child was attached to the node
    ChildAdded {
        /// The attached child
        child: NodeId,
    },
    /// A child was detached from the node
    ChildRemoved {
        /// The detached child
        child: NodeId,
    },
    /// Position, rotation or scale was replaced
    TransformChanged,
    /// Visibility flag changed
    VisibilityChanged {
        /// New visibility
        visible: bool,
    },
    /// Enabled flag changed
    EnabledChanged {
        /// New enabled state
        enabled: bool,
    },
    /// A payload entry was written
    DataChanged {
        /// Payload key
        key: String,
        /// New value
        value: PayloadValue,
    },
    /// A payload entry was removed
    DataRemoved {
        /// Payload key
        key: String,
    },
    /// The node was destroyed
    Destroyed,
}

/// Event with the node it concerns
#[derive(Debug, Clone, PartialEq)]
pub struct SceneEvent {
    /// Node the event was emitted for
    pub node: NodeId,
    /// What happened
    pub kind: SceneEventKind,
}

impl SceneEvent {
    /// Create a new event
    pub fn new(node: NodeId, kind: SceneEventKind) -> Self {
        Self { node, kind }
    }
}

/// Event handler trait
/// Returns true if event was consumed (stops forwarding)
/// Returns false to allow forwarding to other handlers
pub trait SceneEventHandler {
    /// Handle an event, return true if consumed
    fn on_event(&mut self, event: &SceneEvent) -> bool;
}

impl<F> SceneEventHandler for F
where
    F: FnMut(&SceneEvent) -> bool,
{
    fn on_event(&mut self, event: &SceneEvent) -> bool {
        self(event)
    }
}

/// Per-node handler registry plus a queue of every emitted event
#[derive(Default)]
pub struct EventQueue {
    queue: Vec<SceneEvent>,
    handlers: HashMap<NodeId, Vec<Box<dyn SceneEventHandler>>>,
}

impl EventQueue {
    /// Create a new empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for events emitted on `node`
    pub fn subscribe(&mut self, node: NodeId, handler: Box<dyn SceneEventHandler>) {
        self.handlers.entry(node).or_default().push(handler);
    }

    /// Drop every handler registered on `node`
    pub fn unsubscribe_all(&mut self, node: NodeId) {
        self.handlers.remove(&node);
    }

    /// Number of handlers registered on `node`
    pub fn handler_count(&self, node: NodeId) -> usize {
        self.handlers.get(&node).map_or(0, Vec::len)
    }

    /// Deliver an event to the node's handlers, then queue it
    pub fn emit(&mut self, event: SceneEvent) {
        if let Some(handlers) = self.handlers.get_mut(&event.node) {
            for handler in handlers.iter_mut() {
                if handler.on_event(&event) {
                    break;
                }
            }
        }
        self.queue.push(event);
    }

    /// Take every queued event in emission order
    pub fn drain(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.queue)
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no events are queued
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Clear all queued events and handlers
    pub fn clear(&mut self) {
        self.queue.clear();
        self.handlers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn node_ids(count: usize) -> Vec<NodeId> {
        let mut map: SlotMap<NodeId, ()> = SlotMap::with_key();
        (0..count).map(|_| map.insert(())).collect()
    }

    #[test]
    fn test_emit_queues_and_notifies() {
        let ids = node_ids(2);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut queue = EventQueue::new();

        let sink = Rc::clone(&seen);
        queue.subscribe(ids[0], Box::new(move |event: &SceneEvent| {
            sink.borrow_mut().push(event.kind.clone());
            false
        }));

        queue.emit(SceneEvent::new(ids[0], SceneEventKind::TransformChanged));
        queue.emit(SceneEvent::new(ids[1], SceneEventKind::Destroyed));

        assert_eq!(seen.borrow().as_slice(), &[SceneEventKind::TransformChanged]);
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_consumed_event_stops_forwarding() {
        let ids = node_ids(1);
        let count = Rc::new(RefCell::new(0));
        let mut queue = EventQueue::new();

        queue.subscribe(ids[0], Box::new(|_: &SceneEvent| true));
        let counter = Rc::clone(&count);
        queue.subscribe(ids[0], Box::new(move |_: &SceneEvent| {
            *counter.borrow_mut() += 1;
            false
        }));

        queue.emit(SceneEvent::new(ids[0], SceneEventKind::TransformChanged));
        assert_eq!(*count.borrow(), 0);

        queue.unsubscribe_all(ids[0]);
        assert_eq!(queue.handler_count(ids[0]), 0);
    }
}

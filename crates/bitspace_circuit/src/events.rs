// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structural change notifications for UI collaborators.
//!
//! Listeners learn about nodes and connections coming and going. They cannot
//! fail and take no part in value propagation.

use crate::connection::ConnectionId;
use crate::node::NodeId;
use crate::port::PortId;
use crate::stream::{Subject, Subscription};

/// A structural change in a circuit
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitEvent {
    /// A node joined the circuit
    NodeAdded {
        /// Node instance
        node: NodeId,
        /// Node type discriminator
        kind: String,
    },
    /// A node left the circuit
    NodeRemoved {
        /// Node instance
        node: NodeId,
    },
    /// A connection became live
    ConnectionCreated {
        /// Connection
        connection: ConnectionId,
        /// Source output
        from: PortId,
        /// Target input
        to: PortId,
    },
    /// A connection was disposed
    ConnectionDisposed {
        /// Connection
        connection: ConnectionId,
        /// Source output
        from: PortId,
        /// Target input
        to: PortId,
    },
    /// A forwarded value was rejected by the target input
    ValidationFailed {
        /// Connection
        connection: ConnectionId,
        /// Source output
        from: PortId,
        /// Target input
        to: PortId,
    },
}

/// Broadcasts [`CircuitEvent`]s to listeners
#[derive(Clone, Default)]
pub struct EventBus {
    subject: Subject<CircuitEvent>,
}

impl EventBus {
    /// Create a bus without listeners
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; it stays registered while the subscription lives
    pub fn listen<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&CircuitEvent) + 'static,
    {
        // Non-replaying, so subscribing never faults.
        self.subject
            .subscribe(move |event| {
                listener(event);
                Ok(())
            })
            .unwrap_or_else(|_| Subscription::empty())
    }

    /// Deliver an event to every listener
    pub fn emit(&self, event: CircuitEvent) {
        // Listeners always return Ok.
        self.subject.next(event).ok();
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.subject.subscriber_count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

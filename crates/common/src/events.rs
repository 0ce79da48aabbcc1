//! Deferred device-event queue
//!
//! Hot-unplug on a real bus is reported asynchronously relative to whatever
//! caused it. The harness models that with an explicit queue: a disconnect
//! only schedules a [`DeviceEvent`], and the owner of the queue applies it
//! on its next turn by draining.

use async_channel::{Receiver, Sender, TryRecvError, unbounded};
use protocol::DeviceId;

/// Events applied by the queue owner on its next turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Device was disconnected and must be removed
    Disconnected {
        /// ID of the disconnected device
        device_id: DeviceId,
    },
}

/// Handle for scheduling events (cloneable)
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<DeviceEvent>,
}

impl EventSender {
    /// Schedule an event for the next turn
    pub fn schedule(&self, event: DeviceEvent) -> crate::Result<()> {
        self.tx
            .try_send(event)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Owning end of the queue
#[derive(Debug)]
pub struct EventQueue {
    tx: Sender<DeviceEvent>,
    rx: Receiver<DeviceEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Create a sender feeding this queue
    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    /// Number of events scheduled but not yet drained
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Take every event scheduled so far, in scheduling order
    pub fn drain(&self) -> Vec<DeviceEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        events
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

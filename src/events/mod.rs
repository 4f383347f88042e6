use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Lifecycle events emitted by the ordering core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    PaymentConfirmed(Uuid),
    PaymentFailed(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderArchived {
        order_id: Uuid,
        archived: bool,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously. Failure to deliver an event must never
    /// fail the operation that produced it; callers log and continue.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Background consumer for lifecycle events, spawned from main.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "event: order created");
            }
            Event::PaymentConfirmed(order_id) => {
                info!(order_id = %order_id, "event: payment confirmed");
            }
            Event::PaymentFailed(order_id) => {
                info!(order_id = %order_id, "event: payment failed");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(order_id = %order_id, old_status = %old_status, new_status = %new_status, "event: order status changed");
            }
            Event::OrderArchived { order_id, archived } => {
                info!(order_id = %order_id, archived = %archived, "event: order archive toggled");
            }
        }
    }
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Publishes domain events onto a bounded channel
#[derive(Clone, Debug)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender/receiver pair with the given capacity
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Queues an event without waiting; a full or closed channel is reported, never awaited
    pub fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .try_send(event)
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Queues an event, logging instead of failing when the channel is unavailable
    pub fn publish(&self, event: Event) {
        if let Err(e) = self.send(event) {
            warn!("{}", e);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: Uuid,
        user_id: Uuid,
        total_amount: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderPaid {
        order_id: Uuid,
        payment_reference: String,
    },
    OrderCancelled {
        order_id: Uuid,
        refund_required: bool,
    },
    StockReleased {
        order_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    CouponRedeemed {
        coupon_id: Uuid,
        order_id: Uuid,
        user_id: Uuid,
    },
    PaymentIntentCreated {
        order_id: Uuid,
        payment_intent_id: String,
    },
    PaymentSucceeded {
        order_id: Uuid,
        payment_intent_id: String,
    },
}

/// Drains the event channel until every sender is dropped
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCancelled {
                order_id,
                refund_required: true,
            } => {
                warn!(
                    order_id = %order_id,
                    "Paid order cancelled; refund must be issued outside the order engine"
                );
            }
            Event::OrderPlaced {
                order_id,
                user_id,
                total_amount,
            } => {
                info!(order_id = %order_id, user_id = %user_id, total = %total_amount, "Order placed");
            }
            other => info!(event = ?other, "Domain event"),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_channel_does_not_block_publisher() {
        let (sender, mut rx) = EventSender::channel(1);
        let order_id = Uuid::new_v4();

        sender.publish(Event::OrderCancelled {
            order_id,
            refund_required: false,
        });
        assert!(sender
            .send(Event::OrderCancelled {
                order_id,
                refund_required: false,
            })
            .is_err());

        assert_eq!(
            rx.recv().await,
            Some(Event::OrderCancelled {
                order_id,
                refund_required: false,
            })
        );
    }
}

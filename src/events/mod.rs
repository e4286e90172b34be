use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Default capacity of the event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with its receiving end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event; a closed channel is logged, never propagated
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Event dropped");
        }
    }
}

/// Things that happened to an order's payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_no: String,
    },
    PaymentAuthorised {
        order_no: String,
        psp_reference: Option<String>,
    },
    PaymentFailed {
        order_no: String,
    },
    /// The order was handed to the fulfilment pipeline
    OrderSubmitted {
        order_no: String,
        timestamp: DateTime<Utc>,
    },
    OrderSubmissionFailed {
        order_no: String,
        error: String,
    },
    NotificationRejected {
        reason: String,
    },
    DonationCompleted {
        order_no: String,
        donation_reference: String,
    },
}

impl Event {
    pub fn order_no(&self) -> Option<&str> {
        match self {
            Event::OrderCreated { order_no }
            | Event::PaymentAuthorised { order_no, .. }
            | Event::PaymentFailed { order_no }
            | Event::OrderSubmitted { order_no, .. }
            | Event::OrderSubmissionFailed { order_no, .. }
            | Event::DonationCompleted { order_no, .. } => Some(order_no),
            Event::NotificationRejected { .. } => None,
        }
    }
}

/// Handlers process events asynchronously
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Drain the channel and hand every event to each registered handler
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handlers: Vec<Arc<dyn EventHandler>>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderSubmissionFailed { order_no, error } => {
                error!(order_no = %order_no, error = %error, "Order submission failed after payment");
            }
            Event::NotificationRejected { reason } => {
                warn!(reason = %reason, "Notification delivery rejected");
            }
            other => {
                info!(order_no = other.order_no().unwrap_or_default(), event = ?other, "Event received");
            }
        }

        for handler in &handlers {
            if let Err(e) = handler.handle_event(event.clone()).await {
                error!(error = %e, event = ?event, "Event handler failed");
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Event>>);

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle_event(&self, event: Event) -> Result<(), String> {
            self.0.lock().await.push(event);
            Ok(())
        }
    }

    #[tokio::test]
    async fn events_reach_every_handler_until_the_channel_closes() {
        let (sender, rx) = EventSender::channel(8);
        let recorder = Arc::new(Recorder::default());
        let worker = tokio::spawn(process_events(rx, vec![recorder.clone()]));

        sender
            .send(Event::PaymentFailed {
                order_no: "ORD-101".into(),
            })
            .await
            .unwrap();
        drop(sender);
        worker.await.unwrap();

        let seen = recorder.0.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].order_no(), Some("ORD-101"));
    }

    #[tokio::test]
    async fn send_or_log_tolerates_a_closed_channel() {
        let (sender, rx) = EventSender::channel(1);
        drop(rx);
        sender
            .send_or_log(Event::NotificationRejected {
                reason: "bad signature".into(),
            })
            .await;
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub chat_id: i64,
    pub text: String,
}

/// Somewhere a notification can be delivered to.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Writes notifications to the log. Used when no messenger is configured.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        info!("[chat {}] {}", notification.chat_id, notification.text);
        Ok(())
    }
}

/// Producer side of the delivery lane. Posting never waits.
#[derive(Debug, Clone)]
pub struct Outbox {
    sender: Sender<Notification>,
}

impl Outbox {
    pub fn post(&self, chat_id: i64, text: impl Into<String>) {
        let notification = Notification {
            chat_id,
            text: text.into(),
        };
        match self.sender.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                warn!("Outbox is full, dropping message to chat {}", dropped.chat_id)
            }
            Err(TrySendError::Closed(dropped)) => {
                warn!("Delivery lane is gone, dropping message to chat {}", dropped.chat_id)
            }
        }
    }
}

pub fn outbox(capacity: usize) -> (Outbox, Receiver<Notification>) {
    let (sender, receiver) = mpsc::channel(capacity);
    (Outbox { sender }, receiver)
}

/// Delivers queued notifications one at a time until cancelled or until
/// every `Outbox` is dropped. Delivery failures are logged, never returned.
pub async fn run_delivery_lane(
    sink: Arc<dyn NotificationSink>,
    mut inbox: Receiver<Notification>,
    cancel: CancellationToken,
) {
    loop {
        let notification = tokio::select! {
            _ = cancel.cancelled() => break,
            next = inbox.recv() => match next {
                Some(notification) => notification,
                None => break,
            },
        };
        debug!("Delivering a message to chat {}", notification.chat_id);
        if let Err(err) = sink.deliver(&notification).await {
            error!(
                "Failed to deliver a message to chat {}: {err:#}",
                notification.chat_id
            );
        }
    }
    info!("Delivery lane stopped");
}

#[cfg(test)]
mod tests {
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
            if notification.text == "fail" {
                anyhow::bail!("chat not found");
            }
            self.delivered.lock().await.push(notification.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivers_in_order_and_survives_failures() {
        let sink = Arc::new(RecordingSink::default());
        let (outbox, inbox) = outbox(8);
        outbox.post(1, "first");
        outbox.post(2, "fail");
        outbox.post(3, "third");
        drop(outbox);

        run_delivery_lane(sink.clone(), inbox, CancellationToken::new()).await;

        let delivered = sink.delivered.lock().await;
        assert_eq!(
            *delivered,
            vec![
                Notification {
                    chat_id: 1,
                    text: "first".to_string()
                },
                Notification {
                    chat_id: 3,
                    text: "third".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn posting_to_a_full_outbox_does_not_block() {
        let (outbox, mut inbox) = outbox(1);
        outbox.post(1, "kept");
        outbox.post(1, "dropped");
        assert_eq!(inbox.recv().await.map(|n| n.text), Some("kept".to_string()));
        assert!(inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn stops_on_cancel() {
        let (_outbox, inbox) = outbox(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        run_delivery_lane(Arc::new(LogSink), inbox, cancel).await;
    }
}

use crate::domain::ports::{Notification, NotificationDispatcher};
use tokio::sync::mpsc;
use tracing::debug;

/// Pushes notifications onto an unbounded channel for whoever wants to
/// consume them. Sending never blocks; a dropped receiver just discards
/// the message.
pub struct ChannelDispatcher {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationDispatcher for ChannelDispatcher {
    fn dispatch(&self, note: Notification) {
        if self.sender.send(note).is_err() {
            debug!("notification receiver dropped, message discarded");
        }
    }
}

/// Swallows everything. For tests that do not care about notifications.
pub struct NullDispatcher;

impl NotificationDispatcher for NullDispatcher {
    fn dispatch(&self, _note: Notification) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::NotificationKind;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_channel_dispatcher_delivers() {
        let (dispatcher, mut receiver) = ChannelDispatcher::new();
        dispatcher.dispatch(Notification {
            recipient: "alice".into(),
            kind: NotificationKind::OrderPlaced,
            order_id: Uuid::new_v4(),
            message: "Order placed".into(),
        });

        let note = receiver.recv().await.unwrap();
        assert_eq!(note.recipient, "alice");
        assert_eq!(note.kind, NotificationKind::OrderPlaced);
    }

    #[test]
    fn test_dropped_receiver_does_not_panic() {
        let (dispatcher, receiver) = ChannelDispatcher::new();
        drop(receiver);
        dispatcher.dispatch(Notification {
            recipient: "alice".into(),
            kind: NotificationKind::OrderPlaced,
            order_id: Uuid::new_v4(),
            message: "Order placed".into(),
        });
    }
}

use tokio::sync::mpsc::UnboundedSender;

use crate::messages::Message;
use crate::model::Action;

/// Destination of flushed capture batches
pub trait BatchSink: Send {
    fn deliver(&mut self, batch: Vec<Action>);
}

/// Collects batches in memory
impl BatchSink for Vec<Vec<Action>> {
    fn deliver(&mut self, batch: Vec<Action>) {
        self.push(batch);
    }
}

/// Forwards batches to the coordinator as `RECORDED_ACTIONS`
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: UnboundedSender<Message>,
}

impl ChannelSink {
    pub fn new(sender: UnboundedSender<Message>) -> Self {
        Self { sender }
    }
}

impl BatchSink for ChannelSink {
    fn deliver(&mut self, batch: Vec<Action>) {
        let count = batch.len();
        if self
            .sender
            .send(Message::RecordedActions { actions: batch })
            .is_err()
        {
            // Coordinator is gone; the batch cannot be delivered anywhere.
            log::error!("dropping {} recorded actions: coordinator channel closed", count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionKind, KeyUpAction};
    use tokio::sync::mpsc;

    fn action() -> Action {
        Action::new(
            ActionKind::KeyUp(KeyUpAction {
                key: "x".to_string(),
            }),
            1,
            "",
        )
    }

    #[test]
    fn test_channel_sink_wraps_batch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sink = ChannelSink::new(tx);
        sink.deliver(vec![action(), action()]);
        match rx.try_recv().unwrap() {
            Message::RecordedActions { actions } => assert_eq!(actions.len(), 2),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_closed_channel_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut sink = ChannelSink::new(tx);
        sink.deliver(vec![action()]);
    }
}

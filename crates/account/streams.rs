use tokio::sync::mpsc;

/// Push-only multicast: every subscriber gets its own unbounded channel and
/// receives each value in emission order. A slow consumer buffers; a dropped
/// consumer is pruned on the next send.
#[derive(Debug)]
pub struct Multicast<T> {
    senders: Vec<mpsc::UnboundedSender<T>>,
}

impl<T> Default for Multicast<T> {
    fn default() -> Self {
        Self {
            senders: Vec::new(),
        }
    }
}

impl<T: Clone> Multicast<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<T> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.senders.push(sender);
        receiver
    }

    /// Registers an externally created sender, e.g. one that has already had
    /// a backlog replayed into it.
    pub fn attach(&mut self, sender: mpsc::UnboundedSender<T>) {
        self.senders.push(sender);
    }

    pub fn send(&mut self, value: &T) {
        self.senders.retain(|s| s.send(value.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_values_in_order_and_dead_ones_are_pruned() {
        let mut multicast = Multicast::new();
        let mut alive = multicast.subscribe();
        let dead = multicast.subscribe();
        drop(dead);

        multicast.send(&1u32);
        multicast.send(&2u32);

        assert_eq!(alive.recv().await, Some(1));
        assert_eq!(alive.recv().await, Some(2));
        assert_eq!(multicast.senders.len(), 1);
    }
}

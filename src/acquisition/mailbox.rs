//! Single-slot, last-value-wins handoff between two threads.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Holds at most one value. Publishing replaces whatever was waiting and
/// neither side ever blocks.
#[derive(Debug)]
pub struct Mailbox<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(1);
        Self { sender, receiver }
    }

    /// Offer a value, dropping an unread older one.
    pub fn publish(&self, value: T) {
        if let Err(TrySendError::Full(value)) = self.sender.try_send(value) {
            let _ = self.receiver.try_recv();
            // A reader may have emptied the slot in between; losing this value
            // to another publisher is fine too.
            let _ = self.sender.try_send(value);
        }
    }

    /// Take the waiting value, if any.
    pub fn take(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
        }
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_last_value_wins() {
        let mailbox = Mailbox::new();
        assert!(mailbox.take().is_none());

        mailbox.publish(1);
        mailbox.publish(2);
        mailbox.publish(3);
        assert_eq!(mailbox.take(), Some(3));
        assert!(mailbox.take().is_none());
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_handoff_across_threads() {
        let mailbox = Mailbox::new();
        let writer = mailbox.clone();
        thread::spawn(move || {
            for i in 0..1_000 {
                writer.publish(i);
            }
        })
        .join()
        .unwrap();
        assert_eq!(mailbox.take(), Some(999));
    }
}

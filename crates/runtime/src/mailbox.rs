//! Completion mailbox.
//!
//! Background work (network fetches, decoding) never touches render-thread
//! state directly. It posts results into a [`Mailbox`], and the render thread
//! drains a bounded number of them at a point of its choosing.
//!
//! Properties:
//! - Messages are delivered in posting order.
//! - Posting never blocks and is callable from any thread.
//! - Posting after the mailbox is dropped hands the message back to the caller.

use async_channel::{Receiver, Sender};

#[derive(Debug)]
pub struct Mailbox<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

/// Cloneable posting end of a [`Mailbox`].
#[derive(Debug)]
pub struct MailboxSender<T> {
    tx: Sender<T>,
}

impl<T> Clone for MailboxSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> MailboxSender<T> {
    /// Posts a message. Returns it back if the mailbox was closed.
    pub fn post(&self, msg: T) -> Result<(), T> {
        self.tx.try_send(msg).map_err(|e| e.into_inner())
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self { tx, rx }
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(&self) -> MailboxSender<T> {
        MailboxSender {
            tx: self.tx.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Takes up to `limit` messages in posting order without blocking.
    pub fn drain(&self, limit: usize) -> Vec<T> {
        let mut out = Vec::new();
        while out.len() < limit {
            match self.rx.try_recv() {
                Ok(msg) => out.push(msg),
                Err(_) => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::Mailbox;

    #[test]
    fn drains_in_posting_order_up_to_limit() {
        let mb = Mailbox::new();
        let tx = mb.sender();
        for i in 0..5 {
            tx.post(i).unwrap();
        }

        assert_eq!(mb.drain(3), vec![0, 1, 2]);
        assert_eq!(mb.len(), 2);
        assert_eq!(mb.drain(10), vec![3, 4]);
        assert!(mb.is_empty());
    }

    #[test]
    fn posting_from_another_thread() {
        let mb = Mailbox::new();
        let tx = mb.sender();
        std::thread::spawn(move || tx.post("done").unwrap())
            .join()
            .unwrap();
        assert_eq!(mb.drain(1), vec!["done"]);
    }

    #[test]
    fn dropped_mailbox_returns_messages() {
        let mb = Mailbox::new();
        let tx = mb.sender();
        tx.post(1).unwrap();

        drop(mb);
        assert_eq!(tx.post(2), Err(2));
    }
}

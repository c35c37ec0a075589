//! Single-slot handoff between a background loop and the render loop.
//!
//! A [`Mailbox`] is the writer half of a `tokio::sync::watch` channel that
//! holds at most one value. Publishing overwrites whatever the reader has not
//! looked at yet and never blocks. The reader side is a [`Latest`], which keeps
//! the last value it saw so an unchanged slot simply means "nothing new".

use std::sync::Arc;

use tokio::sync::watch;

pub struct Mailbox<T> {
    tx: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Stores `value`, dropping any unread one. Works with no reader attached.
    pub fn publish(&self, value: T) {
        self.tx.send_replace(Some(value));
    }

    /// A reader that will see the current value on its first refresh.
    pub fn subscribe(&self) -> Latest<T> {
        Latest {
            rx: self.tx.subscribe(),
            value: None,
        }
    }
}

/// Reader-side cache of the most recent value published to a [`Mailbox`].
#[derive(Debug)]
pub struct Latest<T> {
    rx: watch::Receiver<Option<T>>,
    value: Option<T>,
}

impl<T: Clone + PartialEq> Latest<T> {
    /// Looks at the slot without waiting. Returns `true` only if the cache changed.
    pub fn refresh(&mut self) -> bool {
        // a closed channel still holds its last value
        if self.value.is_some() && !self.rx.has_changed().unwrap_or(true) {
            return false;
        }

        let current = self.rx.borrow_and_update();
        match current.as_ref() {
            Some(value) if self.value.as_ref() != Some(value) => {
                self.value = Some(value.clone());
                true
            }
            _ => false,
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_overwrites_unread_value() {
        let mailbox = Mailbox::new();
        let mut latest = mailbox.subscribe();
        mailbox.publish(1);
        mailbox.publish(2);

        assert!(latest.refresh());
        assert_eq!(latest.get(), Some(&2));
    }

    #[test]
    fn test_value_published_before_subscribe_is_seen() {
        let writer = Mailbox::new();
        let reader = writer.clone();
        writer.publish("hello");

        let mut latest = reader.subscribe();
        assert!(latest.get().is_none());
        assert!(latest.refresh());
        assert_eq!(latest.get(), Some(&"hello"));
    }

    #[test]
    fn test_empty_slot_is_no_change() {
        let mailbox: Mailbox<u32> = Mailbox::new();
        let mut latest = mailbox.subscribe();

        assert!(!latest.refresh());
        assert!(!latest.refresh());
        assert!(latest.get().is_none());
    }

    #[test]
    fn test_empty_reads_keep_cached_value() {
        let mailbox = Mailbox::new();
        let mut latest = mailbox.subscribe();

        mailbox.publish(String::from("7 mins"));
        assert!(latest.refresh());

        assert!(!latest.refresh());
        assert_eq!(latest.get().map(String::as_str), Some("7 mins"));
        assert!(!latest.refresh());
        assert_eq!(latest.get().map(String::as_str), Some("7 mins"));
    }

    #[test]
    fn test_identical_value_is_not_a_change() {
        let mailbox = Mailbox::new();
        let mut latest = mailbox.subscribe();

        mailbox.publish(5);
        assert!(latest.refresh());
        mailbox.publish(5);
        assert!(!latest.refresh());

        mailbox.publish(6);
        assert!(latest.refresh());
        assert_eq!(latest.get(), Some(&6));
    }

    #[test]
    fn test_last_value_survives_dropped_writer() {
        let mailbox = Mailbox::new();
        let mut latest = mailbox.subscribe();
        mailbox.publish(3);
        drop(mailbox);

        assert!(latest.refresh());
        assert!(!latest.refresh());
        assert_eq!(latest.get(), Some(&3));
    }

    #[test]
    fn test_concurrent_writer_and_reader() {
        let mailbox = Mailbox::new();
        let writer = mailbox.clone();
        let mut latest = mailbox.subscribe();

        let handle = std::thread::spawn(move || {
            for i in 0..1_000 {
                writer.publish(i);
            }
        });

        let mut last_seen = -1;
        while !handle.is_finished() {
            if latest.refresh() {
                let seen = *latest.get().unwrap();
                assert!(seen > last_seen);
                last_seen = seen;
            }
        }
        handle.join().unwrap();
        latest.refresh();

        assert_eq!(latest.get(), Some(&999));
    }
}

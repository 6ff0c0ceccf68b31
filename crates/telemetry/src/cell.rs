//! Single-writer, many-reader state slots.
//!
//! A [`StateCell`] holds one value that is only ever replaced or updated as a
//! whole under the cell's lock. Readers either take a clone of the current
//! value or subscribe for change notifications through a
//! [`tokio::sync::watch::Receiver`].

use tokio::sync::watch;

/// Whole-value state slot with change notification.
#[derive(Debug)]
pub struct StateCell<T> {
    sender: watch::Sender<T>,
}

impl<T> StateCell<T> {
    /// Create a cell holding `initial`.
    #[must_use]
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Replace the value, returning the previous one.
    pub fn replace(&self, value: T) -> T {
        self.sender.send_replace(value)
    }

    /// Mutate the value in place. Readers see either the old or the new value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        self.sender.send_modify(f);
    }

    /// Read the value without cloning it.
    pub fn read<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        f(&self.sender.borrow())
    }

    /// Subscribe to changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }
}

impl<T: Clone> StateCell<T> {
    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }
}

impl<T: Default> Default for StateCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_returns_previous() {
        let cell = StateCell::new(1);
        assert_eq!(cell.replace(2), 1);
        assert_eq!(cell.get(), 2);
    }

    #[test]
    fn test_update_in_place() {
        let cell = StateCell::new(vec![1, 2]);
        let mut len = 0;
        cell.update(|v| {
            v.push(3);
            len = v.len();
        });
        assert_eq!(len, 3);
        assert_eq!(cell.read(Vec::len), 3);
    }

    #[tokio::test]
    async fn test_watchers_are_notified() {
        let cell = StateCell::new(false);
        let mut rx = cell.watch();

        cell.replace(true);

        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}

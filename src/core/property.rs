use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::watch;

/// Receives change notifications for a single [`Property`].
pub struct PropertySubscriber<T> {
    receiver: watch::Receiver<T>,
}

// PropertySubscriber intentionally does not implement Clone.
// Each subscriber tracks its own "seen" version; call Property::subscribe() again for another.

impl<T: Clone> PropertySubscriber<T> {
    /// Wait until the value changes. Returns false once the property is dropped.
    pub async fn wait_for_change(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    /// Non-blocking check for an unseen change; marks it seen.
    pub fn try_recv(&mut self) -> bool {
        match self.receiver.has_changed() {
            Ok(true) => {
                let _ = self.receiver.borrow_and_update();
                true
            }
            _ => false,
        }
    }

    pub fn current(&self) -> T {
        self.receiver.borrow().clone()
    }
}

/// A named single-writer, many-reader cell.
///
/// Writes are synchronous, so any reader (including callbacks fired from the
/// playback engine or from timers) observes the latest committed value rather
/// than a copy captured when the callback was registered.
pub struct Property<T> {
    sender: Arc<watch::Sender<T>>,
    name: Arc<str>,
}

impl<T: Clone + Send + Sync> Property<T> {
    pub fn new(initial_value: T, name: &str) -> Self {
        let (sender, _) = watch::channel(initial_value);
        Self {
            sender: Arc::new(sender),
            name: Arc::from(name),
        }
    }

    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Read through a borrow without cloning the whole value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.sender.borrow())
    }

    pub fn set(&self, new_value: T) {
        self.sender.send_replace(new_value);
    }

    /// Swap in a new value and return the previous one.
    pub fn replace(&self, new_value: T) -> T {
        self.sender.send_replace(new_value)
    }

    pub fn subscribe(&self) -> PropertySubscriber<T> {
        PropertySubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: PartialEq + Clone + Send + Sync> Property<T> {
    /// Set only when the value differs; returns whether a change was published.
    pub fn set_if_changed(&self, new_value: T) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == new_value {
                false
            } else {
                *current = new_value;
                true
            }
        })
    }
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            name: self.name.clone(),
        }
    }
}

impl<T: Debug> Debug for Property<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Property({} = {:?})", self.name, *self.sender.borrow())
    }
}

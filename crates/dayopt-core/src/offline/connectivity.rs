//! Online/offline signal

use tokio::sync::watch;

/// Shared connectivity flag with change notification.
///
/// The platform layer (network probe, OS callback) calls [`set_online`];
/// the sync engine subscribes and drains on every offline→online edge.
///
/// [`set_online`]: Connectivity::set_online
#[derive(Clone)]
pub struct Connectivity {
    sender: watch::Sender<bool>,
}

impl Connectivity {
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self { sender }
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// Update the signal; subscribers are only notified on actual changes
    pub fn set_online(&self, online: bool) {
        let changed = self.sender.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(
                "Connectivity changed: {}",
                if online { "online" } else { "offline" }
            );
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

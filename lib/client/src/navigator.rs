//! Navigation side effects requested by the client.

use tokio::sync::mpsc;
use tracing::{debug, info};

/// A navigation the host should perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Go to the sign-in page.
    SignIn { path: String },
}

/// Trait for requesting navigation from the host.
pub trait Navigator: Send + Sync {
    /// Requests navigation to the sign-in page at `path`.
    fn redirect_to_sign_in(&self, path: &str);
}

/// Navigator that forwards requests over a channel to the host's event
/// loop.
#[derive(Debug, Clone)]
pub struct ChannelNavigator {
    tx: mpsc::UnboundedSender<Navigation>,
}

impl ChannelNavigator {
    /// Creates a navigator and the receiver the host drains.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Navigation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Navigator for ChannelNavigator {
    fn redirect_to_sign_in(&self, path: &str) {
        info!(path, "redirecting to sign-in");
        let navigation = Navigation::SignIn {
            path: path.to_string(),
        };
        if self.tx.send(navigation).is_err() {
            debug!("navigation receiver dropped");
        }
    }
}

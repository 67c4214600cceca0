use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;
use tracing::warn;

pub(super) type RefreshFuture = Shared<BoxFuture<'static, bool>>;

/// The single in-flight token refresh.
///
/// Every request that hits a 401 while a refresh is pending awaits the same
/// shared future. It resolves with the host's answer, or `false` once the
/// timeout elapses or the host goes away.
pub(super) struct PendingRefresh {
    pub id: u64,
    pub future: RefreshFuture,
    sender: Option<oneshot::Sender<bool>>,
}

impl PendingRefresh {
    pub fn start(id: u64, timeout: Duration) -> Self {
        let (sender, receiver) = oneshot::channel();
        let future = async move {
            match tokio::time::timeout(timeout, receiver).await {
                Ok(Ok(success)) => success,
                Ok(Err(_)) => false,
                Err(_) => {
                    warn!(timeout_ms = timeout.as_millis() as u64, "token refresh timed out");
                    false
                }
            }
        }
        .boxed()
        .shared();

        Self {
            id,
            future,
            sender: Some(sender),
        }
    }

    /// Delivers the host's answer. Returns `false` if it was already given.
    pub fn complete(&mut self, success: bool) -> bool {
        match self.sender.take() {
            Some(sender) => sender.send(success).is_ok(),
            None => false,
        }
    }
}

//! Single-flight connection guard.
//!
//! The guard owns the current [`ConnectionHandle`]. Its mutex is held across
//! the client's initialization await, so concurrent `connect` calls queue on
//! the lock and the later callers observe the handle the first one stored.

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::{ConnectionHandle, KeyWrapClient, NetworkId};
use crate::error::ConnectionError;

/// Process-wide connection slot.
#[derive(Debug, Default)]
pub struct ConnectionGuard {
    current: Mutex<Option<ConnectionHandle>>,
}

impl ConnectionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect `client` to `network`, reusing the current session when it is
    /// already on that network.
    ///
    /// A session on a different network is released first. On failure the
    /// slot is left empty.
    pub async fn connect<C>(&self, client: &C, network: &NetworkId) -> Result<ConnectionHandle, ConnectionError>
    where
        C: KeyWrapClient + ?Sized,
    {
        let mut slot = self.current.lock().await;

        if let Some(handle) = slot.as_ref() {
            if &handle.network == network {
                debug!(network = %network, "reusing existing session");
                return Ok(handle.clone());
            }
            info!(from = %handle.network, to = %network, "switching network");
            client.disconnect().await;
            *slot = None;
        }

        match client.connect(network).await {
            Ok(handle) => {
                info!(network = %network, session = %handle.session_id, "connected");
                *slot = Some(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                warn!(network = %network, error = %e, "connect failed");
                *slot = None;
                Err(e)
            }
        }
    }

    /// Release the current session, if any. Returns the released handle.
    pub async fn disconnect<C>(&self, client: &C) -> Option<ConnectionHandle>
    where
        C: KeyWrapClient + ?Sized,
    {
        let mut slot = self.current.lock().await;
        let released = slot.take();
        if let Some(handle) = &released {
            client.disconnect().await;
            info!(network = %handle.network, "disconnected");
        }
        released
    }

    /// The current session, if any.
    pub async fn current(&self) -> Option<ConnectionHandle> {
        self.current.lock().await.clone()
    }

    /// The current session, or `NotConnected`.
    pub async fn require(&self) -> Result<ConnectionHandle, ConnectionError> {
        self.current().await.ok_or(ConnectionError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryNetwork;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_connects_initialize_once() {
        let network = MemoryNetwork::new();
        network.set_init_delay(Duration::from_millis(20));
        let client = network.client();
        let guard = Arc::new(ConnectionGuard::new());
        let id = NetworkId::from("datil-dev");

        let (a, b, c) = tokio::join!(
            guard.connect(&client, &id),
            guard.connect(&client, &id),
            guard.connect(&client, &id),
        );

        let a = a.unwrap();
        assert_eq!(a, b.unwrap());
        assert_eq!(a, c.unwrap());
        assert_eq!(network.init_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_slot_empty() {
        let network = MemoryNetwork::new();
        network.set_available(false);
        let client = network.client();
        let guard = ConnectionGuard::new();

        let err = guard.connect(&client, &NetworkId::from("datil-dev")).await.unwrap_err();
        assert!(matches!(err, ConnectionError::InitFailed(_)));
        assert!(guard.current().await.is_none());
        assert_eq!(guard.require().await, Err(ConnectionError::NotConnected));

        network.set_available(true);
        assert!(guard.connect(&client, &NetworkId::from("datil-dev")).await.is_ok());
    }

    #[tokio::test]
    async fn test_switching_network_reinitializes() {
        let network = MemoryNetwork::new();
        let client = network.client();
        let guard = ConnectionGuard::new();

        let first = guard.connect(&client, &NetworkId::from("datil-dev")).await.unwrap();
        let second = guard.connect(&client, &NetworkId::from("datil")).await.unwrap();

        assert_ne!(first.session_id, second.session_id);
        assert_eq!(second.network.as_str(), "datil");
        assert_eq!(network.init_count(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_releases_session() {
        let network = MemoryNetwork::new();
        let client = network.client();
        let guard = ConnectionGuard::new();

        guard.connect(&client, &NetworkId::from("local")).await.unwrap();
        assert!(guard.disconnect(&client).await.is_some());
        assert!(guard.disconnect(&client).await.is_none());
        assert!(client.session().await.is_none());
    }
}

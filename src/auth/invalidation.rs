//! Session-invalidation fan-out to cooperating peer servers.
//!
//! Fire-and-forget: each peer is notified independently, a peer failure
//! never aborts the others, and every call runs under a per-peer timeout so
//! a slow peer cannot stall the initiating request.

use anyhow::{Context, Result};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Delivers one invalidation notice to one peer.
pub trait InvalidationTransport: Send + Sync {
    fn notify(&self, peer: &str, user_id: &str) -> impl Future<Output = Result<()>> + Send;
}

/// HTTP transport: `POST {peer}/v1/auth/invalidate` with a JSON body.
#[derive(Clone, Debug, Default)]
pub struct HttpInvalidationTransport {
    client: reqwest::Client,
}

impl HttpInvalidationTransport {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl InvalidationTransport for HttpInvalidationTransport {
    async fn notify(&self, peer: &str, user_id: &str) -> Result<()> {
        let url = format!("{}/v1/auth/invalidate", peer.trim_end_matches('/'));
        self.client
            .post(&url)
            .json(&json!({ "user_id": user_id }))
            .send()
            .await
            .with_context(|| format!("failed to reach peer {peer}"))?
            .error_for_status()
            .with_context(|| format!("peer {peer} rejected the invalidation"))?;
        Ok(())
    }
}

/// Fan-out over the configured peer list.
pub struct SessionInvalidationFanout<T> {
    peers: Vec<String>,
    per_peer_timeout: Duration,
    transport: Arc<T>,
}

impl<T> SessionInvalidationFanout<T>
where
    T: InvalidationTransport + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(peers: Vec<String>, per_peer_timeout: Duration, transport: T) -> Self {
        Self {
            peers,
            per_peer_timeout,
            transport: Arc::new(transport),
        }
    }

    /// Notify every peer that sessions of `user_id` are no longer valid.
    /// Returns the number of peers that acknowledged.
    pub async fn fan_out(&self, user_id: &str) -> usize {
        if self.peers.is_empty() {
            return 0;
        }
        let mut tasks = JoinSet::new();
        for peer in &self.peers {
            let transport = Arc::clone(&self.transport);
            let peer = peer.clone();
            let user_id = user_id.to_string();
            let deadline = self.per_peer_timeout;
            tasks.spawn(async move {
                let outcome = tokio::time::timeout(deadline, transport.notify(&peer, &user_id)).await;
                (peer, outcome)
            });
        }

        let mut delivered = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((peer, Ok(Ok(())))) => {
                    debug!("Session invalidation delivered to peer {peer}");
                    delivered += 1;
                }
                Ok((peer, Ok(Err(err)))) => {
                    warn!("Session invalidation failed for peer {peer}: {err}");
                }
                Ok((peer, Err(_))) => {
                    warn!("Session invalidation timed out for peer {peer}");
                }
                Err(err) => {
                    warn!("Session invalidation task failed: {err}");
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingTransport {
        notified: Mutex<Vec<String>>,
        fail_peer: Option<String>,
        delay: Option<Duration>,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                notified: Mutex::new(Vec::new()),
                fail_peer: None,
                delay: None,
            }
        }
    }

    impl InvalidationTransport for RecordingTransport {
        async fn notify(&self, peer: &str, _user_id: &str) -> Result<()> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_peer.as_deref() == Some(peer) {
                anyhow::bail!("peer down");
            }
            self.notified
                .lock()
                .expect("not poisoned")
                .push(peer.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn one_failing_peer_does_not_abort_the_rest() {
        let mut transport = RecordingTransport::new();
        transport.fail_peer = Some("http://b".into());
        let fanout = SessionInvalidationFanout::new(
            vec!["http://a".into(), "http://b".into(), "http://c".into()],
            Duration::from_secs(1),
            transport,
        );
        let delivered = fanout.fan_out("alice").await;
        assert_eq!(delivered, 2);
    }

    #[tokio::test]
    async fn slow_peers_hit_the_per_peer_timeout() {
        let mut transport = RecordingTransport::new();
        transport.delay = Some(Duration::from_secs(30));
        let fanout = SessionInvalidationFanout::new(
            vec!["http://slow".into()],
            Duration::from_millis(20),
            transport,
        );
        let delivered = fanout.fan_out("alice").await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn empty_peer_list_is_a_noop() {
        let fanout = SessionInvalidationFanout::new(
            Vec::new(),
            Duration::from_secs(1),
            RecordingTransport::new(),
        );
        assert_eq!(fanout.fan_out("alice").await, 0);
    }
}

//! Stream Supervisor
//!
//! Owns the background task of each channel. Starting is idempotent: a
//! channel whose task is still running is left alone, a finished one is
//! replaced.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::client::{StreamClient, StreamClientConfig};
use super::handlers::IngestHandler;
use super::state::FeedState;
use crate::infrastructure::config::ApiKey;
use crate::infrastructure::metrics::Channel;

/// Start-if-absent owner of the streaming clients.
pub struct StreamSupervisor {
    url: String,
    api_key: ApiKey,
    reconnect_delay: Duration,
    cancel: CancellationToken,
    states: HashMap<Channel, Arc<FeedState>>,
    tasks: Mutex<HashMap<Channel, JoinHandle<()>>>,
}

impl StreamSupervisor {
    /// Create a supervisor. Clients are children of `cancel`.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        api_key: ApiKey,
        reconnect_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let states = [Channel::Halts, Channel::Aggregates]
            .into_iter()
            .map(|c| (c, Arc::new(FeedState::new(c))))
            .collect();
        Self {
            url: url.into(),
            api_key,
            reconnect_delay,
            cancel,
            states,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Connection state of a channel.
    #[must_use]
    pub fn state(&self, channel: Channel) -> Arc<FeedState> {
        self.states
            .get(&channel)
            .map_or_else(|| Arc::new(FeedState::new(channel)), Arc::clone)
    }

    /// Spawn the handler's client unless one is already running.
    ///
    /// Returns `true` when a new task was spawned.
    pub fn ensure_started<H: IngestHandler>(&self, handler: H) -> bool {
        let channel = handler.channel();
        let mut tasks = self.tasks.lock();
        if tasks.get(&channel).is_some_and(|task| !task.is_finished()) {
            return false;
        }

        let client = Arc::new(StreamClient::new(
            StreamClientConfig {
                url: self.url.clone(),
                api_key: self.api_key.clone(),
                reconnect_delay: self.reconnect_delay,
            },
            handler,
            self.state(channel),
            self.cancel.child_token(),
        ));
        tasks.insert(channel, tokio::spawn(client.run()));
        tracing::info!(channel = channel.as_str(), "stream ingester started");
        true
    }

    /// Check if a channel's task is alive.
    #[must_use]
    pub fn is_running(&self, channel: Channel) -> bool {
        self.tasks
            .lock()
            .get(&channel)
            .is_some_and(|task| !task.is_finished())
    }

    /// Cancel every client and wait for the tasks to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks: Vec<_> = self.tasks.lock().drain().map(|(_, task)| task).collect();
        for task in tasks {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::halts::HaltStore;
    use crate::infrastructure::stream::handlers::HaltIngester;

    fn supervisor() -> StreamSupervisor {
        StreamSupervisor::new(
            "ws://127.0.0.1:1",
            ApiKey::new("key").unwrap(),
            Duration::from_secs(60),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn second_start_is_a_no_op() {
        let supervisor = supervisor();
        let store = Arc::new(HaltStore::new());
        assert!(supervisor.ensure_started(HaltIngester::new(Arc::clone(&store))));
        assert!(!supervisor.ensure_started(HaltIngester::new(store)));
        assert!(supervisor.is_running(Channel::Halts));
        assert!(!supervisor.is_running(Channel::Aggregates));
        supervisor.shutdown().await;
        assert!(!supervisor.is_running(Channel::Halts));
    }

    #[tokio::test]
    async fn finished_task_is_restarted() {
        let supervisor = supervisor();
        let store = Arc::new(HaltStore::new());
        supervisor.cancel.cancel();
        assert!(supervisor.ensure_started(HaltIngester::new(Arc::clone(&store))));
        tokio::time::timeout(Duration::from_secs(5), async {
            while supervisor.is_running(Channel::Halts) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(supervisor.ensure_started(HaltIngester::new(store)));
    }
}

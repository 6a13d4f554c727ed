use std::sync::Arc;

use async_trait::async_trait;

use crate::error::UpstreamError;
use crate::model::StatusEvent;
use crate::queue::{ListStore, STATUS_QUEUE};
use crate::upstream::{check_status, http_client, trim_base};

/// Publishes compliance outcomes to the Snippet Manager.
///
/// Reporting is fire-and-forget: failures are logged and never reach the caller.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, event: StatusEvent);
}

/// Right-pushes each event onto the status list.
pub struct QueueStatusReporter {
    store: Arc<dyn ListStore>,
    key: String,
}

impl QueueStatusReporter {
    pub fn new(store: Arc<dyn ListStore>) -> Self {
        Self::with_key(store, STATUS_QUEUE)
    }

    pub fn with_key(store: Arc<dyn ListStore>, key: &str) -> Self {
        Self {
            store,
            key: key.to_string(),
        }
    }

    async fn publish(&self, event: &StatusEvent) -> Result<(), UpstreamError> {
        let payload = serde_json::to_string(event)?;
        self.store.push(&self.key, payload).await
    }
}

#[async_trait]
impl StatusReporter for QueueStatusReporter {
    async fn report(&self, event: StatusEvent) {
        match self.publish(&event).await {
            Ok(()) => log::info!("Reported snippet {} as {:?}", event.id, event.status),
            Err(e) => log::error!("Failed to report status of snippet {}: {e}", event.id),
        }
    }
}

/// POSTs each event to `{snippet_manager_url}/status`.
pub struct HttpStatusReporter {
    url: String,
    client: reqwest::Client,
}

impl HttpStatusReporter {
    pub fn new(base_url: &str) -> Self {
        Self {
            url: format!("{}/status", trim_base(base_url)),
            client: http_client(),
        }
    }

    async fn publish(&self, event: &StatusEvent) -> Result<(), UpstreamError> {
        let response = self.client.post(&self.url).json(event).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl StatusReporter for HttpStatusReporter {
    async fn report(&self, event: StatusEvent) {
        match self.publish(&event).await {
            Ok(()) => log::info!("Reported snippet {} as {:?}", event.id, event.status),
            Err(e) => log::error!("Failed to report status of snippet {}: {e}", event.id),
        }
    }
}

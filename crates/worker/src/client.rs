//! HTTP client for the master's control endpoints

use thiserror::Error;
use videogrid_common::rpc::{IoItemReply, Registration, WorkerInfo};
use videogrid_engine::{PipelineError, WorkSource};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Client stub for the master service
#[derive(Clone)]
pub struct MasterClient {
    base_url: String,
    http: reqwest::Client,
}

impl MasterClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    /// Register this worker's job endpoint; the master replies with the node id
    pub async fn register_worker(&self, address: &str) -> Result<i32, ClientError> {
        let reply: Registration = self
            .http
            .post(format!("{}/api/v1/workers/register", self.base_url))
            .json(&WorkerInfo {
                address: address.to_string(),
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(reply.node_id)
    }

    /// Pull the next I/O item id from the master's cursor; −1 means exhausted
    pub async fn next_io_item(&self) -> Result<i64, ClientError> {
        let reply: IoItemReply = self
            .http
            .post(format!("{}/api/v1/io_items/next", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(reply.item_id)
    }
}

/// Synchronous bridge feeding the pipeline's control loop from the master.
/// The control loop runs on a blocking thread, so each call re-enters the
/// runtime for one request.
pub struct MasterWorkSource {
    handle: tokio::runtime::Handle,
    client: MasterClient,
}

impl MasterWorkSource {
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle, client: MasterClient) -> Self {
        Self { handle, client }
    }
}

impl WorkSource for MasterWorkSource {
    fn next_io_item(&mut self) -> Result<i64, PipelineError> {
        self.handle
            .block_on(self.client.next_io_item())
            .map_err(|e| PipelineError::WorkSource(e.to_string()))
    }
}

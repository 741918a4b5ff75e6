//! HTTP implementation of [`TaskProviderClient`].
//!
//! Requests carry a bearer token and wrap bodies in the provider's
//! `{"data": ...}` envelope. Every call has a bounded timeout and no
//! automatic retry: a retried mutation would break the engine's
//! at-most-once-per-transition semantics, and delivery-level retry belongs
//! to the event source.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use super::{NewTask, ProviderRef, ProviderTask, ProviderUser, TaskFields, TaskProviderClient};
use crate::config::ProviderConfig;
use crate::error::{BridgeError, Result};

#[derive(serde::Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Serialize)]
struct Wrapped<'a, T> {
    data: &'a T,
}

pub struct HttpProviderClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpProviderClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send, check the status and unwrap the `data` envelope. Non-2xx
    /// responses become [`BridgeError::Provider`] carrying the upstream
    /// status and raw body.
    async fn expect<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let resp = req.bearer_auth(&self.token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BridgeError::provider(Some(status.as_u16()), body));
        }
        let envelope: Envelope<T> = resp.json().await?;
        Ok(envelope.data)
    }

    async fn expect_empty(&self, req: reqwest::RequestBuilder) -> Result<()> {
        let resp = req.bearer_auth(&self.token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BridgeError::provider(Some(status.as_u16()), body));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskProviderClient for HttpProviderClient {
    async fn create_task(&self, task: &NewTask) -> Result<ProviderTask> {
        self.expect(
            self.client
                .post(self.url("/tasks"))
                .json(&Wrapped { data: task }),
        )
        .await
    }

    async fn update_task(&self, id: &str, fields: &TaskFields) -> Result<ProviderTask> {
        self.expect(
            self.client
                .put(self.url(&format!("/tasks/{id}")))
                .json(&Wrapped { data: fields }),
        )
        .await
    }

    async fn delete_task(&self, id: &str) -> Result<()> {
        self.expect_empty(self.client.delete(self.url(&format!("/tasks/{id}"))))
            .await
    }

    async fn get_current_user(&self) -> Result<ProviderUser> {
        self.expect(self.client.get(self.url("/users/me"))).await
    }

    async fn list_workspaces(&self) -> Result<Vec<ProviderRef>> {
        self.expect(self.client.get(self.url("/workspaces"))).await
    }

    async fn list_projects(&self, workspace_id: &str) -> Result<Vec<ProviderRef>> {
        self.expect(
            self.client
                .get(self.url("/projects"))
                .query(&[("workspace", workspace_id)]),
        )
        .await
    }
}

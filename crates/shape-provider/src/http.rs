//! HTTP client for the Linode API v4.
//!
//! [`HttpComputeProvider`] implements [`ComputeProvider`] over REST. Every
//! request carries the bearer token and `User-Agent` configured in
//! [`ProviderConfig`]; list endpoints are paged until exhausted.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use shape_core::{
    BootConfig, ConfigId, Disk, DiskId, Event, Instance, InstanceId, InstanceType,
};

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::provider::ComputeProvider;
use crate::types::{ConfigOptions, CreateDiskOptions, EventFilter, Page};

/// Error body returned by the API.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<ErrorReason>,
}

#[derive(Debug, Deserialize)]
struct ErrorReason {
    reason: String,
    #[serde(default)]
    field: Option<String>,
}

impl ErrorResponse {
    fn joined(&self) -> String {
        self.errors
            .iter()
            .map(|e| match &e.field {
                Some(field) => format!("[{field}] {}", e.reason),
                None => e.reason.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// HTTP implementation of [`ComputeProvider`].
#[derive(Debug, Clone)]
pub struct HttpComputeProvider {
    client: reqwest::Client,
    api_root: String,
    page_size: u32,
}

impl HttpComputeProvider {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        let token = config.token.as_deref().unwrap_or_default();
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ProviderError::Config(format!("invalid token: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent())
                .map_err(|e| ProviderError::Config(format!("invalid user agent: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ProviderError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_root: config.api_root(),
            page_size: config.page_size.max(1),
        })
    }

    /// Root URL requests are sent to.
    #[must_use]
    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.api_root))
    }

    async fn execute(&self, builder: RequestBuilder, path: &str) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        tracing::debug!(path = %path, status = %status, "Provider request completed");

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let reasons = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.joined())
            .ok()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| format!("provider returned status {status}"));

        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(path.to_string()));
        }

        tracing::warn!(
            path = %path,
            status = %status,
            reasons = %reasons,
            "Provider rejected request"
        );
        Err(ProviderError::Api {
            status: status.as_u16(),
            reasons,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.execute(self.request(Method::GET, path), path).await?;
        Ok(response.json().await?)
    }

    async fn send<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .execute(self.request(method, path).json(body), path)
            .await?;
        Ok(response.json().await?)
    }

    async fn send_unit<B>(&self, method: Method, path: &str, body: &B) -> Result<()>
    where
        B: Serialize + Sync + ?Sized,
    {
        self.execute(self.request(method, path).json(body), path)
            .await?;
        Ok(())
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        page: u32,
        filter: Option<&serde_json::Value>,
    ) -> Result<Page<T>> {
        let mut builder = self
            .request(Method::GET, path)
            .query(&[("page", page), ("page_size", self.page_size)]);
        if let Some(filter) = filter {
            builder = builder.header("X-Filter", filter.to_string());
        }
        let response = self.execute(builder, path).await?;
        Ok(response.json().await?)
    }

    async fn get_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let current: Page<T> = self.get_page(path, page, None).await?;
            items.extend(current.data);
            if current.page >= current.pages {
                break;
            }
            page += 1;
        }
        Ok(items)
    }
}

#[async_trait]
impl ComputeProvider for HttpComputeProvider {
    async fn get_instance(&self, id: InstanceId) -> Result<Instance> {
        self.get(&format!("/linode/instances/{id}")).await
    }

    async fn update_instance_label(&self, id: InstanceId, label: &str) -> Result<Instance> {
        tracing::info!(instance_id = %id, label = %label, "Updating instance label");
        self.send(
            Method::PUT,
            &format!("/linode/instances/{id}"),
            &json!({ "label": label }),
        )
        .await
    }

    async fn get_instance_type(&self, type_id: &str) -> Result<InstanceType> {
        self.get(&format!("/linode/types/{type_id}")).await
    }

    async fn resize_instance(&self, id: InstanceId, type_id: &str) -> Result<()> {
        tracing::info!(instance_id = %id, target_type = %type_id, "Requesting instance resize");
        self.send_unit(
            Method::POST,
            &format!("/linode/instances/{id}/resize"),
            &json!({ "type": type_id }),
        )
        .await
    }

    async fn list_disks(&self, id: InstanceId) -> Result<Vec<Disk>> {
        self.get_all(&format!("/linode/instances/{id}/disks")).await
    }

    async fn create_disk(&self, id: InstanceId, options: &CreateDiskOptions) -> Result<Disk> {
        tracing::info!(
            instance_id = %id,
            label = %options.label,
            size = options.size,
            "Creating disk"
        );
        self.send(
            Method::POST,
            &format!("/linode/instances/{id}/disks"),
            options,
        )
        .await
    }

    async fn resize_disk(&self, id: InstanceId, disk_id: DiskId, size: u64) -> Result<()> {
        tracing::info!(instance_id = %id, disk_id = %disk_id, size, "Requesting disk resize");
        self.send_unit(
            Method::POST,
            &format!("/linode/instances/{id}/disks/{disk_id}/resize"),
            &json!({ "size": size }),
        )
        .await
    }

    async fn list_configs(&self, id: InstanceId) -> Result<Vec<BootConfig>> {
        self.get_all(&format!("/linode/instances/{id}/configs")).await
    }

    async fn create_config(&self, id: InstanceId, options: &ConfigOptions) -> Result<BootConfig> {
        tracing::info!(instance_id = %id, label = %options.label, "Creating boot config");
        self.send(
            Method::POST,
            &format!("/linode/instances/{id}/configs"),
            options,
        )
        .await
    }

    async fn update_config(
        &self,
        id: InstanceId,
        config_id: ConfigId,
        options: &ConfigOptions,
    ) -> Result<BootConfig> {
        tracing::info!(
            instance_id = %id,
            config_id = %config_id,
            label = %options.label,
            "Updating boot config"
        );
        self.send(
            Method::PUT,
            &format!("/linode/instances/{id}/configs/{config_id}"),
            options,
        )
        .await
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        // Newest first; the first page always holds the most recent match.
        let page: Page<Event> = self
            .get_page("/account/events", 1, Some(&filter.to_x_filter()))
            .await?;
        Ok(page
            .data
            .into_iter()
            .filter(|event| filter.matches(event))
            .collect())
    }
}

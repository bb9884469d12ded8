//! HTTP client for the inventory (NetBox) REST API.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use super::error::InventoryError;
use super::models::Page;
use crate::config::InventoryConfig;

/// Page size requested from list endpoints.
const PAGE_SIZE: usize = 1000;

/// Longest error body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Inventory API client.
#[derive(Debug, Clone)]
pub struct NetBoxClient {
    client: reqwest::Client,
    base_url: String,
}

impl NetBoxClient {
    /// Create a client with token authentication.
    pub fn new(config: &InventoryConfig) -> Result<Self, InventoryError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Token {}", config.token))
                .map_err(|_| InventoryError::Other("invalid token format".to_string()))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET a single object.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, InventoryError> {
        let response = self.client.get(self.url(path)).send().await?;
        self.handle_response(path, response).await
    }

    /// GET every object of a list endpoint, following pagination.
    pub async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, InventoryError> {
        let mut params: Vec<(&str, String)> = query.to_vec();
        params.push(("limit", PAGE_SIZE.to_string()));

        let response = self.client.get(self.url(path)).query(&params).send().await?;
        let mut page: Page<T> = self.handle_response(path, response).await?;
        let mut items = std::mem::take(&mut page.results);

        while let Some(next) = page.next.take() {
            debug!(path = %path, fetched = items.len(), total = page.count, "Fetching next page");
            let response = self.client.get(&next).send().await?;
            page = self.handle_response(path, response).await?;
            items.append(&mut page.results);
        }

        Ok(items)
    }

    /// First object matching `query`, if any.
    pub async fn find<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, InventoryError> {
        let mut params: Vec<(&str, String)> = query.to_vec();
        params.push(("limit", "1".to_string()));

        let response = self.client.get(self.url(path)).query(&params).send().await?;
        let page: Page<T> = self.handle_response(path, response).await?;
        Ok(page.results.into_iter().next())
    }

    /// POST a new object.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, InventoryError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        self.handle_response(path, response).await
    }

    /// PATCH an object.
    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), InventoryError> {
        let response = self.client.patch(self.url(path)).json(body).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            self.handle_error(path, response).await
        }
    }

    /// DELETE an object.
    pub async fn delete(&self, path: &str) -> Result<(), InventoryError> {
        let response = self.client.delete(self.url(path)).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            self.handle_error(path, response).await
        }
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, InventoryError> {
        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| InventoryError::InvalidResponse {
                    path: path.to_string(),
                    reason: e.to_string(),
                })
        } else {
            self.handle_error(path, response).await
        }
    }

    async fn handle_error<T>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, InventoryError> {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        error!(path = %path, status, body = %body, "Inventory request failed");

        if status == 401 || status == 403 {
            return Err(InventoryError::Unauthorized(status));
        }

        let mut message: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
        if message.is_empty() {
            message = format!("{path} returned no body");
        }
        Err(InventoryError::Api { status, message })
    }
}

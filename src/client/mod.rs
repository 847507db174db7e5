// This file is part of the terraform-provider-azurerm project
//
// Copyright (C) ANEO, 2024-2024. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License")
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Azure Resource Manager REST client.
//!
//! Requests go through a [`Transport`], which is reqwest in production and an
//! in-memory simulator in tests. Long-running operations are followed through
//! the `Azure-AsyncOperation` or `Location` headers until they complete.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use tokio::time::{sleep, timeout_at, Instant};

use crate::error::ArmError;
use crate::wait::WaitError;

mod auth;
mod environment;
mod http;

pub use auth::{AzureCliCredential, ClientSecretCredential, TokenCredential};
pub use environment::Environment;
pub use http::HttpTransport;

/// A request to the Resource Manager, with an absolute URL
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    /// Header names are lowercase
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ArmError> {
        if self.body.is_empty() {
            Ok(serde_json::from_slice(b"null")?)
        } else {
            Ok(serde_json::from_slice(&self.body)?)
        }
    }

    /// Delay requested by the server before polling again
    fn retry_after(&self) -> Option<Duration> {
        self.header("retry-after")?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }

    fn into_error(self) -> ArmError {
        #[derive(Deserialize)]
        struct Envelope {
            error: Option<ErrorBody>,
        }

        match serde_json::from_slice::<Envelope>(&self.body) {
            Ok(Envelope { error: Some(error) }) => ArmError::Api {
                status: self.status,
                code: error.code,
                message: error.message,
            },
            _ => ArmError::Api {
                status: self.status,
                code: String::new(),
                message: String::from_utf8_lossy(&self.body).into_owned(),
            },
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Delay between polls of an operation when the server does not suggest one
const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(10);

/// URL tracking a long-running operation
#[derive(Debug, Clone, Copy)]
enum Operation<'a> {
    /// `Azure-AsyncOperation`, reporting a `status` in its body
    Async(&'a str),
    /// `Location`, answering 202 until the operation is done
    Location(&'a str),
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    status: String,
    error: Option<ErrorBody>,
}

/// Sends requests to the Resource Manager
#[async_trait]
pub trait Transport: Debug + Send + Sync {
    async fn send(&self, request: Request) -> Result<Response, ArmError>;
}

/// Paged list returned by collection endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct List<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

#[derive(Debug, Clone)]
pub struct ArmClient {
    endpoint: String,
    transport: Arc<dyn Transport>,
}

impl ArmClient {
    pub fn new(endpoint: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_owned(),
            transport,
        }
    }

    fn url(&self, path: &str, api_version: &str) -> String {
        format!("{}{path}?api-version={api_version}", self.endpoint)
    }

    async fn send<B>(
        &self,
        method: Method,
        url: String,
        body: Option<&B>,
    ) -> Result<Response, ArmError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let body = body.map(serde_json::to_value).transpose()?;
        tracing::debug!(%method, %url, "sending request");
        let response = self.transport.send(Request { method, url, body }).await?;
        tracing::debug!(status = %response.status, "received response");

        if response.status.is_success() {
            Ok(response)
        } else {
            Err(response.into_error())
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, api_version: &str) -> Result<T, ArmError> {
        self.send::<()>(Method::GET, self.url(path, api_version), None)
            .await?
            .json()
    }

    /// Get an object, `None` when it does not exist
    pub async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
        api_version: &str,
    ) -> Result<Option<T>, ArmError> {
        match self.get(path, api_version).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn put<B, T>(&self, path: &str, api_version: &str, body: &B) -> Result<T, ArmError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.send(Method::PUT, self.url(path, api_version), Some(body))
            .await?
            .json()
    }

    /// PUT then wait for the operation to finish and fetch the final object
    pub async fn put_then_poll<B, T>(
        &self,
        path: &str,
        api_version: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T, ArmError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .send(Method::PUT, self.url(path, api_version), Some(body))
            .await?;
        self.wait_for_completion(&response, timeout).await?;
        self.get(path, api_version).await
    }

    /// PATCH then wait for the operation to finish and fetch the final object
    pub async fn patch_then_poll<B, T>(
        &self,
        path: &str,
        api_version: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T, ArmError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .send(Method::PATCH, self.url(path, api_version), Some(body))
            .await?;
        self.wait_for_completion(&response, timeout).await?;
        self.get(path, api_version).await
    }

    pub async fn post<B, T>(&self, path: &str, api_version: &str, body: Option<&B>) -> Result<T, ArmError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.send(Method::POST, self.url(path, api_version), body)
            .await?
            .json()
    }

    /// POST an action then wait for the operation it started
    pub async fn post_then_poll<B>(
        &self,
        path: &str,
        api_version: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<(), ArmError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let response = self
            .send(Method::POST, self.url(path, api_version), Some(body))
            .await?;
        self.wait_for_completion(&response, timeout).await
    }

    /// DELETE without following the operation, a missing object is not an error
    pub async fn delete(&self, path: &str, api_version: &str) -> Result<(), ArmError> {
        match self
            .send::<()>(Method::DELETE, self.url(path, api_version), None)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub async fn delete_then_poll(
        &self,
        path: &str,
        api_version: &str,
        timeout: Duration,
    ) -> Result<(), ArmError> {
        match self
            .send::<()>(Method::DELETE, self.url(path, api_version), None)
            .await
        {
            Ok(response) => self.wait_for_completion(&response, timeout).await,
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Follow a long-running operation started by `response`.
    ///
    /// Every poll waits for the `Retry-After` of the previous response, or
    /// [`DEFAULT_POLL_DELAY`] when the server sent none.
    async fn wait_for_completion(&self, response: &Response, timeout: Duration) -> Result<(), ArmError> {
        let operation = if let Some(url) = response.header("azure-asyncoperation") {
            Operation::Async(url)
        } else if response.status == StatusCode::ACCEPTED {
            match response.header("location") {
                Some(url) => Operation::Location(url),
                None => return Ok(()),
            }
        } else {
            return Ok(());
        };
        tracing::debug!(?operation, "polling long-running operation");

        let mut delay = response.retry_after().unwrap_or(DEFAULT_POLL_DELAY);
        let mut last_state = String::new();
        let poll = async {
            loop {
                sleep(delay).await;
                let (state, response) = match operation {
                    Operation::Async(url) => self.operation_status(url).await?,
                    Operation::Location(url) => self.location_status(url).await?,
                };
                tracing::debug!(%state, "polled operation");
                if state == "Succeeded" {
                    return Ok(());
                }
                last_state = state;
                delay = response.retry_after().unwrap_or(DEFAULT_POLL_DELAY);
            }
        };

        match timeout_at(Instant::now() + timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(WaitError::Timeout {
                last_state,
                expected: vec!["Succeeded".to_owned()],
                timeout,
                last_error: None,
            }
            .into()),
        }
    }

    async fn operation_status(&self, url: &str) -> Result<(String, Response), ArmError> {
        let response = self.send::<()>(Method::GET, url.to_owned(), None).await?;
        let operation: OperationStatus = response.json()?;

        match operation.status.as_str() {
            "Failed" | "Canceled" | "Cancelled" => {
                let error = operation.error.unwrap_or_default();
                Err(ArmError::OperationFailed {
                    status: operation.status,
                    code: error.code,
                    message: error.message,
                })
            }
            _ => Ok((operation.status, response)),
        }
    }

    async fn location_status(&self, url: &str) -> Result<(String, Response), ArmError> {
        let response = self.send::<()>(Method::GET, url.to_owned(), None).await?;
        let state = if response.status == StatusCode::ACCEPTED {
            "InProgress"
        } else {
            "Succeeded"
        };
        Ok((state.to_owned(), response))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::testing::FakeArm;

    use super::*;

    const CACHE: &str =
        "/subscriptions/sub/resourceGroups/group1/providers/Microsoft.Cache/redis/cache1";

    #[tokio::test]
    async fn not_found_is_decoded() {
        let fake = FakeArm::new();
        let err = fake
            .client()
            .get::<serde_json::Value>(CACHE, "2023-04-01")
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");
        assert!(err.to_string().contains("ResourceNotFound"));

        let missing: Option<serde_json::Value> = fake
            .client()
            .get_optional(CACHE, "2023-04-01")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn put_get_delete() {
        let fake = FakeArm::new();
        let client = fake.client();

        let created: serde_json::Value = client
            .put_then_poll(
                CACHE,
                "2023-04-01",
                &json!({"location": "westeurope"}),
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        assert_eq!(created["id"], CACHE);
        assert_eq!(created["location"], "westeurope");

        client
            .delete_then_poll(CACHE, "2023-04-01", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(fake.get(CACHE).is_none());

        // Deleting twice is fine
        client.delete(CACHE, "2023-04-01").await.unwrap();
        assert_eq!(
            fake.requests().last().map(|r| r.0.clone()),
            Some(Method::DELETE)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn async_operation_is_polled() {
        let fake = FakeArm::new();
        let operation = "https://management.azure.com/operations/op1";
        fake.enqueue(
            Method::PUT,
            CACHE,
            Response::new(StatusCode::CREATED, json!({}).to_string())
                .with_header("Azure-AsyncOperation", operation)
                .with_header("Retry-After", "5"),
        );
        fake.enqueue(
            Method::GET,
            "/operations/op1",
            Response::new(StatusCode::OK, json!({"status": "InProgress"}).to_string())
                .with_header("Retry-After", "20"),
        );
        fake.enqueue(
            Method::GET,
            "/operations/op1",
            Response::new(StatusCode::OK, json!({"status": "InProgress"}).to_string()),
        );
        fake.enqueue(
            Method::GET,
            "/operations/op1",
            Response::new(StatusCode::OK, json!({"status": "Succeeded"}).to_string()),
        );
        fake.insert(CACHE, json!({"name": "cache1"}));

        let start = tokio::time::Instant::now();
        let cache: serde_json::Value = fake
            .client()
            .put_then_poll(CACHE, "2023-04-01", &json!({}), Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(cache["name"], "cache1");
        // Retry-After of the PUT, then of each poll, then the default
        assert_eq!(start.elapsed(), Duration::from_secs(5 + 20) + DEFAULT_POLL_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn operation_times_out() {
        let fake = FakeArm::new();
        fake.enqueue(
            Method::DELETE,
            CACHE,
            Response::new(StatusCode::ACCEPTED, "")
                .with_header("Azure-AsyncOperation", "https://management.azure.com/operations/op4"),
        );
        for _ in 0..10 {
            fake.enqueue(
                Method::GET,
                "/operations/op4",
                Response::new(StatusCode::OK, json!({"status": "Deleting"}).to_string()),
            );
        }

        let err = fake
            .client()
            .delete_then_poll(CACHE, "2023-04-01", Duration::from_secs(35))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, ArmError::Wait(WaitError::Timeout { last_state, .. }) if last_state == "Deleting"),
            "{err:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_operation() {
        let fake = FakeArm::new();
        fake.enqueue(
            Method::DELETE,
            CACHE,
            Response::new(StatusCode::ACCEPTED, "")
                .with_header("Azure-AsyncOperation", "https://management.azure.com/operations/op2"),
        );
        fake.enqueue(
            Method::GET,
            "/operations/op2",
            Response::new(
                StatusCode::OK,
                json!({
                    "status": "Failed",
                    "error": {"code": "Conflict", "message": "cache is linked"}
                })
                .to_string(),
            ),
        );

        let err = fake
            .client()
            .delete_then_poll(CACHE, "2023-04-01", Duration::from_secs(600))
            .await
            .unwrap_err();
        assert!(matches!(err, ArmError::OperationFailed { .. }), "{err:?}");
        assert!(err.to_string().contains("cache is linked"));
    }

    #[tokio::test(start_paused = true)]
    async fn location_is_polled() {
        let fake = FakeArm::new();
        fake.enqueue(
            Method::DELETE,
            CACHE,
            Response::new(StatusCode::ACCEPTED, "")
                .with_header("Location", "https://management.azure.com/operationResults/op3"),
        );
        fake.enqueue(
            Method::GET,
            "/operationResults/op3",
            Response::new(StatusCode::ACCEPTED, ""),
        );
        fake.enqueue(
            Method::GET,
            "/operationResults/op3",
            Response::new(StatusCode::NO_CONTENT, ""),
        );

        fake.client()
            .delete_then_poll(CACHE, "2023-04-01", Duration::from_secs(600))
            .await
            .unwrap();
        let polls = fake
            .requests()
            .iter()
            .filter(|(_, path)| path == "/operationResults/op3")
            .count();
        assert_eq!(polls, 2);
    }

    #[test]
    fn error_without_envelope() {
        let err = Response::new(StatusCode::BAD_GATEWAY, "upstream failure").into_error();
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
        assert!(err.to_string().ends_with("upstream failure"));
    }
}

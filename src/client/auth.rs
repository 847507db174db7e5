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

use std::fmt::Debug;
use std::time::Duration;

use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::error::ArmError;

use super::Environment;

/// Tokens are renewed this long before they expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Source of bearer tokens for the Resource Manager
#[async_trait]
pub trait TokenCredential: Debug + Send + Sync {
    async fn token(&self) -> Result<String, ArmError>;
}

#[derive(Clone)]
struct AccessToken {
    token: String,
    expires_at: OffsetDateTime,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        OffsetDateTime::now_utc() + EXPIRY_MARGIN < self.expires_at
    }
}

/// Last token obtained by a credential
#[derive(Default)]
struct TokenCache(Mutex<Option<AccessToken>>);

impl Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenCache")
    }
}

impl TokenCache {
    async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<String, ArmError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<AccessToken, ArmError>>,
    {
        let mut cached = self.0.lock().await;
        if let Some(token) = cached.as_ref().filter(|token| token.is_fresh()) {
            return Ok(token.token.clone());
        }

        let token = refresh().await?;
        tracing::debug!(expires_at = %token.expires_at, "obtained access token");
        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }
}

/// OAuth2 client credentials flow with a service principal secret
#[derive(Debug)]
pub struct ClientSecretCredential {
    http: reqwest::Client,
    environment: Environment,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    cache: TokenCache,
}

impl ClientSecretCredential {
    pub fn new(
        http: reqwest::Client,
        environment: Environment,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            environment,
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            cache: TokenCache::default(),
        }
    }

    async fn request_token(&self) -> Result<AccessToken, ArmError> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.environment.authority(),
            self.tenant_id
        );
        let scope = self.environment.scope();
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(ArmError::Auth(format!(
                "token endpoint answered {status}: {}",
                String::from_utf8_lossy(&body)
            )));
        }

        let token: TokenResponse = serde_json::from_slice(&body)?;
        Ok(AccessToken {
            token: token.access_token,
            expires_at: OffsetDateTime::now_utc() + Duration::from_secs(token.expires_in),
        })
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn token(&self) -> Result<String, ArmError> {
        self.cache.get_or_refresh(|| self.request_token()).await
    }
}

/// Tokens of the account logged in with `az login`
#[derive(Debug)]
pub struct AzureCliCredential {
    environment: Environment,
    cache: TokenCache,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    /// Unix timestamp, only reported by recent versions of the CLI
    #[serde(rename = "expires_on")]
    expires_on: Option<i64>,
}

impl AzureCliCredential {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            cache: TokenCache::default(),
        }
    }

    async fn request_token(&self) -> Result<AccessToken, ArmError> {
        let resource = format!("{}/", self.environment.resource_manager());
        let output = Command::new("az")
            .args([
                "account",
                "get-access-token",
                "--resource",
                resource.as_str(),
                "--output",
                "json",
            ])
            .output()
            .await
            .map_err(|err| ArmError::Auth(format!("running the Azure CLI: {err}")))?;

        if !output.status.success() {
            return Err(ArmError::Auth(format!(
                "the Azure CLI failed with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_cli_token(&output.stdout)
    }
}

fn parse_cli_token(stdout: &[u8]) -> Result<AccessToken, ArmError> {
    let token: CliToken = serde_json::from_slice(stdout)?;
    let expires_at = match token.expires_on {
        Some(timestamp) => OffsetDateTime::from_unix_timestamp(timestamp)
            .map_err(|err| ArmError::Auth(format!("invalid token expiry: {err}")))?,
        None => OffsetDateTime::now_utc() + Duration::from_secs(60 * 60),
    };
    Ok(AccessToken {
        token: token.access_token,
        expires_at,
    })
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn token(&self) -> Result<String, ArmError> {
        self.cache.get_or_refresh(|| self.request_token()).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn cli_output() {
        let token = parse_cli_token(
            br#"{"accessToken": "eyJ0", "expiresOn": "2024-01-01 12:00:00.000000", "expires_on": 1704110400, "tenant": "t"}"#,
        )
        .unwrap();
        assert_eq!(token.token, "eyJ0");
        assert_eq!(token.expires_at.unix_timestamp(), 1704110400);

        let token = parse_cli_token(br#"{"accessToken": "eyJ1"}"#).unwrap();
        assert!(token.is_fresh());
    }

    #[tokio::test]
    async fn cache_reuses_fresh_tokens() {
        let cache = TokenCache::default();
        let calls = AtomicUsize::new(0);
        let refresh = |lifetime: u64| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(AccessToken {
                    token: format!("token-{lifetime}"),
                    expires_at: OffsetDateTime::now_utc() + Duration::from_secs(lifetime),
                })
            }
        };

        assert_eq!(cache.get_or_refresh(|| refresh(3600)).await.unwrap(), "token-3600");
        assert_eq!(cache.get_or_refresh(|| refresh(3600)).await.unwrap(), "token-3600");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Close to expiry: renewed on next use
        *cache.0.lock().await = Some(AccessToken {
            token: "old".into(),
            expires_at: OffsetDateTime::now_utc() + Duration::from_secs(60),
        });
        assert_eq!(cache.get_or_refresh(|| refresh(7200)).await.unwrap(), "token-7200");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

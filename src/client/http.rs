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

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ArmError;

use super::{Request, Response, TokenCredential, Transport};

const USER_AGENT: &str = concat!("terraform-provider-azurerm/", env!("CARGO_PKG_VERSION"));

/// Transport sending requests over HTTPS with a bearer token
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
}

impl HttpTransport {
    pub fn new(http: reqwest::Client, credential: Arc<dyn TokenCredential>) -> Self {
        Self { http, credential }
    }

    pub fn http_client() -> Result<reqwest::Client, ArmError> {
        Ok(reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .build()?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response, ArmError> {
        let token = self.credential.token().await?;

        let mut builder = self
            .http
            .request(request.method, &request.url)
            .bearer_auth(token);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                Some((name.as_str().to_lowercase(), value.to_str().ok()?.to_owned()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

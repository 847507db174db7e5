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
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tf_provider::DynamicDataSource;
use tf_provider::DynamicResource;
use tf_provider::schema::AttributeType;
use tf_provider::value::{ValueBool, ValueEmpty, ValueString};
use tf_provider::schema::{Block, Description, Schema};
use tf_provider::{map, AttributePath, Diagnostics, Provider};

use crate::client::{
    ArmClient, AzureCliCredential, ClientSecretCredential, Environment, HttpTransport,
    TokenCredential,
};
use crate::redis::{
    RedisAccessPolicyAssignmentResource, RedisAccessPolicyResource, RedisCacheDataSource,
    RedisCacheResource, RedisFirewallRuleResource, RedisLinkedServerResource,
};
use crate::schema::{optional, sensitive};
use crate::sql::{
    SqlDatabaseDataSource, SqlDatabaseResource, SqlElasticPoolResource,
    SqlFailoverGroupResource, SqlFirewallRuleResource, SqlServerDataSource, SqlServerResource,
    SqlVirtualNetworkRuleResource,
};
use crate::utils::Report;

/// API clients shared by every resource once the provider is configured
#[derive(Debug)]
pub struct Clients {
    pub subscription_id: String,
    pub arm: ArmClient,
}

/// Slot filled by `configure` and read by resources
#[derive(Debug, Default, Clone)]
pub struct ClientHandle(Arc<RwLock<Option<Arc<Clients>>>>);

impl ClientHandle {
    pub fn set(&self, clients: Clients) {
        let mut slot = match self.0.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(Arc::new(clients));
    }

    pub fn get(&self) -> Result<Arc<Clients>> {
        let slot = match self.0.read() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.clone()
            .ok_or_else(|| anyhow!("the azurerm provider has not been configured"))
    }

    /// Clients for a CRUD callback, reported as a diagnostic when missing
    pub fn get_or_report(&self, diags: &mut Diagnostics) -> Option<Arc<Clients>> {
        self.get().report(diags, "Provider not configured")
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig<'a> {
    pub subscription_id: ValueString<'a>,
    pub tenant_id: ValueString<'a>,
    pub client_id: ValueString<'a>,
    pub client_secret: ValueString<'a>,
    pub environment: ValueString<'a>,
    pub use_cli: ValueBool,
}

/// Provider settings after applying the `ARM_*` environment fallbacks
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Settings {
    subscription_id: String,
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    environment: Environment,
    use_cli: bool,
}

impl Settings {
    fn resolve<F>(config: &ProviderConfig<'_>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let setting = |value: &ValueString<'_>, name: &str| {
            value
                .as_deref_option()
                .map(str::to_owned)
                .or_else(|| env(name))
                .filter(|value| !value.is_empty())
        };

        let subscription_id = setting(&config.subscription_id, "ARM_SUBSCRIPTION_ID")
            .ok_or_else(|| anyhow!("`subscription_id` must be set, or ARM_SUBSCRIPTION_ID exported"))?;
        let environment = setting(&config.environment, "ARM_ENVIRONMENT")
            .unwrap_or_default()
            .parse()?;
        let use_cli = match config.use_cli.as_ref_option() {
            Some(use_cli) => *use_cli,
            None => env("ARM_USE_CLI").map_or(true, |value| value.eq_ignore_ascii_case("true")),
        };

        Ok(Self {
            subscription_id,
            tenant_id: setting(&config.tenant_id, "ARM_TENANT_ID"),
            client_id: setting(&config.client_id, "ARM_CLIENT_ID"),
            client_secret: setting(&config.client_secret, "ARM_CLIENT_SECRET"),
            environment,
            use_cli,
        })
    }

    fn credential(&self, http: reqwest::Client) -> Result<Arc<dyn TokenCredential>> {
        match (&self.tenant_id, &self.client_id, &self.client_secret) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => {
                tracing::info!(%client_id, "authenticating with a client secret");
                Ok(Arc::new(ClientSecretCredential::new(
                    http,
                    self.environment,
                    tenant_id,
                    client_id,
                    client_secret,
                )))
            }
            (_, _, Some(_)) => Err(anyhow!(
                "`tenant_id` and `client_id` are required to authenticate with a client secret"
            )),
            _ if self.use_cli => {
                tracing::info!("authenticating with the Azure CLI");
                Ok(Arc::new(AzureCliCredential::new(self.environment)))
            }
            _ => Err(anyhow!(
                "no authentication method: set `client_secret` or enable `use_cli`"
            )),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct AzureProvider {
    clients: ClientHandle,
}

#[async_trait]
impl Provider for AzureProvider {
    type Config<'a> = ProviderConfig<'a>;
    type MetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(Schema {
            version: 1,
            block: Block {
                description: Description::plain("Azure SQL and Azure Cache for Redis"),
                attributes: map! {
                    "subscription_id" => optional(AttributeType::String, "Subscription to manage resources in (env: ARM_SUBSCRIPTION_ID)"),
                    "tenant_id"       => optional(AttributeType::String, "Azure AD tenant of the service principal (env: ARM_TENANT_ID)"),
                    "client_id"       => optional(AttributeType::String, "Application ID of the service principal (env: ARM_CLIENT_ID)"),
                    "client_secret"   => sensitive(optional(AttributeType::String, "Secret of the service principal (env: ARM_CLIENT_SECRET)")),
                    "environment"     => optional(AttributeType::String, "Cloud environment: public, usgovernment or china (env: ARM_ENVIRONMENT)"),
                    "use_cli"         => optional(AttributeType::Bool, "Authenticate with the Azure CLI when no client secret is set (env: ARM_USE_CLI, default: true)"),
                },
                ..Default::default()
            },
        })
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::Config<'a>) -> Option<()> {
        if let Some(environment) = config.environment.as_deref_option() {
            if let Err(err) = environment.parse::<Environment>() {
                diags.error("Invalid environment", err.to_string(), AttributePath::new("environment"));
            }
        }
        if config.client_secret.as_deref_option().is_some() {
            for (name, value) in [("tenant_id", &config.tenant_id), ("client_id", &config.client_id)] {
                let env = format!("ARM_{}", name.to_uppercase());
                if value.is_null() && std::env::var(env).is_err() {
                    diags.error(
                        format!("Missing `{name}`"),
                        format!("`{name}` is required to authenticate with a client secret"),
                        AttributePath::new(name),
                    );
                }
            }
        }

        if diags.errors.is_empty() {
            Some(())
        } else {
            None
        }
    }

    async fn configure<'a>(
        &self,
        diags: &mut Diagnostics,
        terraform_version: String,
        config: Self::Config<'a>,
    ) -> Option<()> {
        let clients = (|| -> Result<Clients> {
            let settings = Settings::resolve(&config, |name| std::env::var(name).ok())?;
            let http = HttpTransport::http_client().context("building the HTTP client")?;
            let credential = settings.credential(http.clone())?;
            let transport = HttpTransport::new(http, credential);
            Ok(Clients {
                subscription_id: settings.subscription_id,
                arm: ArmClient::new(settings.environment.resource_manager(), Arc::new(transport)),
            })
        })()
        .report(diags, "Failed to configure the azurerm provider")?;

        tracing::info!(
            %terraform_version,
            subscription_id = %clients.subscription_id,
            "provider configured"
        );
        self.clients.set(clients);
        Some(())
    }

    fn get_resources(
        &self,
        _diags: &mut Diagnostics,
    ) -> Option<HashMap<String, Box<dyn DynamicResource>>> {
        let clients = &self.clients;
        Some(map! {
            "sql_server"             => SqlServerResource::new(clients.clone()),
            "sql_database"           => SqlDatabaseResource::new(clients.clone()),
            "sql_elasticpool"        => SqlElasticPoolResource::new(clients.clone()),
            "sql_failover_group"     => SqlFailoverGroupResource::new(clients.clone()),
            "sql_firewall_rule"      => SqlFirewallRuleResource::new(clients.clone()),
            "sql_virtual_network_rule" => SqlVirtualNetworkRuleResource::new(clients.clone()),
            "redis_cache"            => RedisCacheResource::new(clients.clone()),
            "redis_firewall_rule"    => RedisFirewallRuleResource::new(clients.clone()),
            "redis_linked_server"    => RedisLinkedServerResource::new(clients.clone()),
            "redis_cache_access_policy" => RedisAccessPolicyResource::new(clients.clone()),
            "redis_cache_access_policy_assignment" => RedisAccessPolicyAssignmentResource::new(clients.clone()),
        })
    }

    fn get_data_sources(
        &self,
        _diags: &mut Diagnostics,
    ) -> Option<HashMap<String, Box<dyn DynamicDataSource>>> {
        let clients = &self.clients;
        Some(map! {
            "sql_server"   => SqlServerDataSource::new(clients.clone()),
            "sql_database" => SqlDatabaseDataSource::new(clients.clone()),
            "redis_cache"  => RedisCacheDataSource::new(clients.clone()),
        })
    }
}

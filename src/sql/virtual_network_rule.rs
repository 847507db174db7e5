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

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tf_provider::schema::AttributeType;
use tf_provider::value::{Value, ValueBool, ValueList, ValueString};
use tf_provider::schema::{Block, Description, Schema};
use tf_provider::{map, AttributePath, Diagnostics};

use crate::error::ArmError;
use crate::ids::{SqlVirtualNetworkRuleId, SubnetId};
use crate::provider::Clients;
use crate::resource::{already_exists, arm_resource};
use crate::schema::{self, default_to, defaulted, required, string, Refresh};
use crate::timeouts::{self, Timeouts, TimeoutsState};
use crate::utils::{WithSchema, WithValidate};
use crate::validate;
use crate::wait::StateChangeConf;

use super::models::{VirtualNetworkRule, VirtualNetworkRuleProperties};
use super::API_VERSION;

const TIMEOUTS: Timeouts = Timeouts::minutes(30, 5, 30, 30);

/// State reported while the rule cannot be read yet
const RESPONSE_NOT_FOUND: &str = "ResponseNotFound";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualNetworkRuleState<'a> {
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub resource_group_name: ValueString<'a>,
    pub server_name: ValueString<'a>,
    pub subnet_id: ValueString<'a>,
    pub ignore_missing_vnet_service_endpoint: ValueBool,
    pub timeouts: ValueList<Value<TimeoutsState<'a>>>,
}

impl WithSchema for VirtualNetworkRuleState<'_> {
    fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                description: Description::plain("Virtual network rule of an Azure SQL server"),
                attributes: map! {
                    "id"                                   => schema::id(),
                    "name"                                 => required(AttributeType::String, "Name of the virtual network rule"),
                    "resource_group_name"                  => schema::resource_group_name(),
                    "server_name"                          => required(AttributeType::String, "Name of the SQL server"),
                    "subnet_id"                            => required(AttributeType::String, "ID of the subnet allowed to reach the server"),
                    "ignore_missing_vnet_service_endpoint" => defaulted(AttributeType::Bool, "Create the rule before the subnet has the Microsoft.Sql service endpoint (default: false)"),
                },
                blocks: map! {
                    "timeouts" => timeouts::schema(TIMEOUTS, true),
                },
                ..Default::default()
            },
        }
    }
}

impl WithValidate for VirtualNetworkRuleState<'_> {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath) {
        validate::string(
            diags,
            attr_path.clone().attribute("name"),
            &self.name,
            validate::sql_virtual_network_rule_name,
        );
        validate::string(
            diags,
            attr_path.clone().attribute("server_name"),
            &self.server_name,
            validate::sql_server_name,
        );
        validate::string(
            diags,
            attr_path.attribute("subnet_id"),
            &self.subnet_id,
            validate::resource_id(SubnetId::parse),
        );
        timeouts::validate(diags, &self.timeouts);
    }
}

fn expand(state: &VirtualNetworkRuleState<'_>) -> VirtualNetworkRule {
    VirtualNetworkRule {
        id: None,
        properties: VirtualNetworkRuleProperties {
            virtual_network_subnet_id: state.subnet_id.as_str().to_owned(),
            ignore_missing_vnet_service_endpoint: matches!(
                state.ignore_missing_vnet_service_endpoint,
                Value::Value(true)
            ),
            state: None,
        },
    }
}

fn refresh(
    state: &mut VirtualNetworkRuleState<'_>,
    id: &SqlVirtualNetworkRuleId,
    rule: &VirtualNetworkRule,
    mode: Refresh,
) {
    mode.set(&mut state.name, string(&id.virtual_network_rule_name));
    mode.set(&mut state.resource_group_name, string(&id.resource_group_name));
    mode.set(&mut state.server_name, string(&id.server_name));
    mode.set_ignoring_case(
        &mut state.subnet_id,
        Some(&rule.properties.virtual_network_subnet_id),
    );
    mode.set(
        &mut state.ignore_missing_vnet_service_endpoint,
        Value::Value(rule.properties.ignore_missing_vnet_service_endpoint),
    );
}

/// Wait for a freshly written rule to be `Ready`
async fn wait_until_ready(
    clients: &Clients,
    id: &SqlVirtualNetworkRuleId,
    timeout: Duration,
) -> Result<VirtualNetworkRule> {
    let path = id.to_string();
    let path = path.as_str();
    StateChangeConf::new(
        &["Initializing", "InProgress", "Unknown", RESPONSE_NOT_FOUND],
        &["Ready"],
    )
    .min_timeout(Duration::from_secs(60))
    .continuous_target_occurence(5)
    .timeout(timeout)
    .wait_for_state(move || async move {
        tracing::debug!(%id, "checking whether the virtual network rule is ready");
        match clients.arm.get::<VirtualNetworkRule>(path, API_VERSION).await {
            Ok(rule) => {
                let state = rule.properties.state.clone().unwrap_or_default();
                Ok(Some((rule, state)))
            }
            Err(err) if err.is_not_found() => {
                Ok(Some((VirtualNetworkRule::default(), RESPONSE_NOT_FOUND.to_owned())))
            }
            Err(err) => Err::<_, ArmError>(err),
        }
    })
    .await
    .with_context(|| format!("waiting for {id} to become ready"))
}

arm_resource!(
    SqlVirtualNetworkRuleResource,
    VirtualNetworkRuleState,
    "SQL virtual network rule",
    TIMEOUTS
);

impl SqlVirtualNetworkRuleResource {
    fn plan_state(
        &self,
        _diags: &mut Diagnostics,
        state: &mut VirtualNetworkRuleState<'_>,
        _prior: Option<&VirtualNetworkRuleState<'_>>,
    ) {
        default_to(&mut state.ignore_missing_vnet_service_endpoint, false);
    }

    fn replacements(
        prior: &VirtualNetworkRuleState<'_>,
        proposed: &VirtualNetworkRuleState<'_>,
    ) -> Vec<AttributePath> {
        schema::force_new!(prior, proposed, [name, resource_group_name, server_name])
    }

    async fn write(
        &self,
        clients: &Clients,
        id: &SqlVirtualNetworkRuleId,
        state: &VirtualNetworkRuleState<'_>,
        timeout: Duration,
    ) -> Result<VirtualNetworkRule> {
        clients
            .arm
            .put_then_poll::<_, VirtualNetworkRule>(&id.to_string(), API_VERSION, &expand(state), timeout)
            .await
            .with_context(|| format!("writing {id}"))?;
        wait_until_ready(clients, id, timeout).await
    }

    async fn create_state<'a>(
        &self,
        clients: &Clients,
        mut state: VirtualNetworkRuleState<'a>,
        timeouts: Timeouts,
    ) -> Result<VirtualNetworkRuleState<'a>> {
        let id = SqlVirtualNetworkRuleId::new(
            &clients.subscription_id,
            state.resource_group_name.as_str(),
            state.server_name.as_str(),
            state.name.as_str(),
        );

        let existing: Option<VirtualNetworkRule> = clients
            .arm
            .get_optional(&id.to_string(), API_VERSION)
            .await
            .with_context(|| format!("checking for presence of existing {id}"))?;
        if existing.is_some() {
            return Err(already_exists("azurerm_sql_virtual_network_rule", &id));
        }

        let rule = self.write(clients, &id, &state, timeouts.create).await?;
        tracing::info!(%id, "created SQL virtual network rule");

        state.id = string(id.to_string());
        refresh(&mut state, &id, &rule, Refresh::Unknowns);
        Ok(state)
    }

    async fn read_state<'a>(
        &self,
        clients: &Clients,
        mut state: VirtualNetworkRuleState<'a>,
    ) -> Result<Option<VirtualNetworkRuleState<'a>>> {
        let id = SqlVirtualNetworkRuleId::parse(state.id.as_str())?;
        let Some(rule) = clients
            .arm
            .get_optional::<VirtualNetworkRule>(&id.to_string(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {id}"))?
        else {
            return Ok(None);
        };

        refresh(&mut state, &id, &rule, Refresh::All);
        Ok(Some(state))
    }

    async fn update_state<'a>(
        &self,
        clients: &Clients,
        _prior: VirtualNetworkRuleState<'a>,
        mut state: VirtualNetworkRuleState<'a>,
        timeouts: Timeouts,
    ) -> Result<VirtualNetworkRuleState<'a>> {
        let id = SqlVirtualNetworkRuleId::parse(state.id.as_str())?;
        let rule = self.write(clients, &id, &state, timeouts.update).await?;
        tracing::info!(%id, "updated SQL virtual network rule");

        refresh(&mut state, &id, &rule, Refresh::Unknowns);
        Ok(state)
    }

    async fn delete_state<'a>(
        &self,
        clients: &Clients,
        state: VirtualNetworkRuleState<'a>,
        timeouts: Timeouts,
    ) -> Result<()> {
        let id = SqlVirtualNetworkRuleId::parse(state.id.as_str())?;
        clients
            .arm
            .delete_then_poll(&id.to_string(), API_VERSION, timeouts.delete)
            .await
            .with_context(|| format!("deleting {id}"))?;
        tracing::info!(%id, "deleted SQL virtual network rule");
        Ok(())
    }

    fn import_state<'a>(id: &str) -> Result<VirtualNetworkRuleState<'a>> {
        SqlVirtualNetworkRuleId::parse(id)?;
        Ok(VirtualNetworkRuleState {
            id: string(id),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use reqwest::{Method, StatusCode};
    use serde_json::json;
    use tf_provider::Resource;

    use crate::client::Response;
    use crate::testing::{FakeArm, SUBSCRIPTION};

    use super::*;

    fn rule_path() -> String {
        format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/group1/providers/Microsoft.Sql/servers/server1/virtualNetworkRules/rule1")
    }

    fn subnet_id() -> String {
        format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/group1/providers/Microsoft.Network/virtualNetworks/vnet1/subnets/sql")
    }

    fn config() -> VirtualNetworkRuleState<'static> {
        VirtualNetworkRuleState {
            name: string("rule1"),
            resource_group_name: string("group1"),
            server_name: string("server1"),
            subnet_id: string(subnet_id()),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn create_waits_for_ready() {
        let fake = FakeArm::new();
        fake.defaults("/virtualNetworkRules/", json!({"properties": {"state": "Ready"}}));
        let not_found = || {
            Response::new(
                StatusCode::NOT_FOUND,
                r#"{"error": {"code": "NotFound", "message": "missing"}}"#,
            )
        };
        let rule = |state: &str| {
            Response::new(
                StatusCode::OK,
                json!({"properties": {"virtualNetworkSubnetId": subnet_id(), "state": state}})
                    .to_string(),
            )
        };
        // Existence check, GET after PUT, then the first polls miss the new rule
        fake.enqueue(Method::GET, &rule_path(), not_found());
        fake.enqueue(Method::GET, &rule_path(), rule("Initializing"));
        fake.enqueue(Method::GET, &rule_path(), not_found());
        fake.enqueue(Method::GET, &rule_path(), rule("InProgress"));

        let resource = SqlVirtualNetworkRuleResource::new(fake.handle());
        let mut diags = Diagnostics::default();
        let (planned, private) = resource
            .plan_create(&mut diags, config(), config(), Value::Null)
            .await
            .unwrap();
        assert_eq!(planned.ignore_missing_vnet_service_endpoint, Value::Value(false));

        let started = tokio::time::Instant::now();
        let (state, _) = resource
            .create(&mut diags, planned, config(), private, Value::Null)
            .await
            .unwrap();
        assert_eq!(state.id.as_str(), rule_path());

        // Existence check, GET after PUT, 2 pending then 5 ready polls
        let polls = fake
            .requests()
            .iter()
            .filter(|(method, path)| *method == Method::GET && *path == rule_path())
            .count();
        assert_eq!(polls, 9);
        assert!(started.elapsed() >= Duration::from_secs(6 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_rule_is_reported() {
        let fake = FakeArm::new();
        fake.defaults("/virtualNetworkRules/", json!({"properties": {"state": "Failed"}}));

        let resource = SqlVirtualNetworkRuleResource::new(fake.handle());
        let mut diags = Diagnostics::default();
        let created = resource
            .create(&mut diags, config(), config(), Value::Null, Value::Null)
            .await;
        assert!(created.is_none());
        assert_eq!(diags.errors.len(), 1);
    }

    #[tokio::test]
    async fn read_ignores_subnet_casing() {
        let fake = FakeArm::new();
        fake.insert(
            &rule_path(),
            json!({"properties": {
                "virtualNetworkSubnetId": subnet_id().to_lowercase(),
                "ignoreMissingVnetServiceEndpoint": false,
                "state": "Ready",
            }}),
        );
        let resource = SqlVirtualNetworkRuleResource::new(fake.handle());
        let mut diags = Diagnostics::default();
        let prior = VirtualNetworkRuleState {
            id: string(rule_path()),
            ..config()
        };

        let (state, _) = resource
            .read(&mut diags, prior, Value::Null, Value::Null)
            .await
            .unwrap();
        assert_eq!(state.subnet_id.as_str(), subnet_id());
        assert_eq!(state.ignore_missing_vnet_service_endpoint, Value::Value(false));
    }

    #[tokio::test]
    async fn validation() {
        let resource = SqlVirtualNetworkRuleResource::default();
        let mut diags = Diagnostics::default();
        let config = VirtualNetworkRuleState {
            name: string("-rule"),
            subnet_id: string("/subscriptions/sub/resourceGroups/group1"),
            ..config()
        };
        assert!(resource.validate(&mut diags, config).await.is_none());
        assert_eq!(diags.errors.len(), 2);
    }
}

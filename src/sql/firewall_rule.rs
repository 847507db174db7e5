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

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tf_provider::schema::AttributeType;
use tf_provider::value::{Value, ValueList, ValueString};
use tf_provider::schema::{Block, Description, Schema};
use tf_provider::{map, AttributePath, Diagnostics};

use crate::ids::SqlFirewallRuleId;
use crate::provider::Clients;
use crate::resource::{already_exists, arm_resource};
use crate::schema::{self, required, string, Refresh};
use crate::timeouts::{self, Timeouts, TimeoutsState};
use crate::utils::{WithSchema, WithValidate};
use crate::validate;

use super::models::{FirewallRule, FirewallRuleProperties};
use super::API_VERSION;

const TIMEOUTS: Timeouts = Timeouts::minutes(30, 5, 30, 30);

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRuleState<'a> {
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub resource_group_name: ValueString<'a>,
    pub server_name: ValueString<'a>,
    pub start_ip_address: ValueString<'a>,
    pub end_ip_address: ValueString<'a>,
    pub timeouts: ValueList<Value<TimeoutsState<'a>>>,
}

impl WithSchema for FirewallRuleState<'_> {
    fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                description: Description::plain("Firewall rule of an Azure SQL server"),
                attributes: map! {
                    "id"                  => schema::id(),
                    "name"                => required(AttributeType::String, "Name of the firewall rule"),
                    "resource_group_name" => schema::resource_group_name(),
                    "server_name"         => required(AttributeType::String, "Name of the SQL server"),
                    "start_ip_address"    => required(AttributeType::String, "First IPv4 address of the allowed range"),
                    "end_ip_address"      => required(AttributeType::String, "Last IPv4 address of the allowed range"),
                },
                blocks: map! {
                    "timeouts" => timeouts::schema(TIMEOUTS, true),
                },
                ..Default::default()
            },
        }
    }
}

impl WithValidate for FirewallRuleState<'_> {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath) {
        validate::string(diags, attr_path.clone().attribute("name"), &self.name, validate::not_empty);
        validate::string(
            diags,
            attr_path.clone().attribute("server_name"),
            &self.server_name,
            validate::sql_server_name,
        );
        validate::string(
            diags,
            attr_path.clone().attribute("start_ip_address"),
            &self.start_ip_address,
            validate::ipv4,
        );
        validate::string(
            diags,
            attr_path.attribute("end_ip_address"),
            &self.end_ip_address,
            validate::ipv4,
        );
        timeouts::validate(diags, &self.timeouts);
    }
}

fn expand(state: &FirewallRuleState<'_>) -> FirewallRule {
    FirewallRule {
        id: None,
        properties: FirewallRuleProperties {
            start_ip_address: state.start_ip_address.as_str().to_owned(),
            end_ip_address: state.end_ip_address.as_str().to_owned(),
        },
    }
}

fn refresh(state: &mut FirewallRuleState<'_>, id: &SqlFirewallRuleId, rule: &FirewallRule, mode: Refresh) {
    mode.set(&mut state.name, string(&id.firewall_rule_name));
    mode.set(&mut state.resource_group_name, string(&id.resource_group_name));
    mode.set(&mut state.server_name, string(&id.server_name));
    mode.set(&mut state.start_ip_address, string(&rule.properties.start_ip_address));
    mode.set(&mut state.end_ip_address, string(&rule.properties.end_ip_address));
}

arm_resource!(
    SqlFirewallRuleResource,
    FirewallRuleState,
    "SQL firewall rule",
    TIMEOUTS
);

impl SqlFirewallRuleResource {
    fn plan_state(
        &self,
        _diags: &mut Diagnostics,
        _state: &mut FirewallRuleState<'_>,
        _prior: Option<&FirewallRuleState<'_>>,
    ) {
    }

    fn replacements(prior: &FirewallRuleState<'_>, proposed: &FirewallRuleState<'_>) -> Vec<AttributePath> {
        schema::force_new!(prior, proposed, [name, resource_group_name, server_name])
    }

    async fn create_state<'a>(
        &self,
        clients: &Clients,
        mut state: FirewallRuleState<'a>,
        _timeouts: Timeouts,
    ) -> Result<FirewallRuleState<'a>> {
        let id = SqlFirewallRuleId::new(
            &clients.subscription_id,
            state.resource_group_name.as_str(),
            state.server_name.as_str(),
            state.name.as_str(),
        );
        let path = id.to_string();

        let existing: Option<FirewallRule> = clients
            .arm
            .get_optional(&path, API_VERSION)
            .await
            .with_context(|| format!("checking for presence of existing {id}"))?;
        if existing.is_some() {
            return Err(already_exists("azurerm_sql_firewall_rule", &id));
        }

        let rule: FirewallRule = clients
            .arm
            .put(&path, API_VERSION, &expand(&state))
            .await
            .with_context(|| format!("creating {id}"))?;
        tracing::info!(%id, "created SQL firewall rule");

        state.id = string(path);
        refresh(&mut state, &id, &rule, Refresh::Unknowns);
        Ok(state)
    }

    async fn read_state<'a>(
        &self,
        clients: &Clients,
        mut state: FirewallRuleState<'a>,
    ) -> Result<Option<FirewallRuleState<'a>>> {
        let id = SqlFirewallRuleId::parse(state.id.as_str())?;
        let Some(rule) = clients
            .arm
            .get_optional::<FirewallRule>(&id.to_string(), API_VERSION)
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
        _prior: FirewallRuleState<'a>,
        mut state: FirewallRuleState<'a>,
        _timeouts: Timeouts,
    ) -> Result<FirewallRuleState<'a>> {
        let id = SqlFirewallRuleId::parse(state.id.as_str())?;
        let rule: FirewallRule = clients
            .arm
            .put(&id.to_string(), API_VERSION, &expand(&state))
            .await
            .with_context(|| format!("updating {id}"))?;

        refresh(&mut state, &id, &rule, Refresh::Unknowns);
        Ok(state)
    }

    async fn delete_state<'a>(
        &self,
        clients: &Clients,
        state: FirewallRuleState<'a>,
        timeouts: Timeouts,
    ) -> Result<()> {
        let id = SqlFirewallRuleId::parse(state.id.as_str())?;
        clients
            .arm
            .delete_then_poll(&id.to_string(), API_VERSION, timeouts.delete)
            .await
            .with_context(|| format!("deleting {id}"))?;
        tracing::info!(%id, "deleted SQL firewall rule");
        Ok(())
    }

    fn import_state<'a>(id: &str) -> Result<FirewallRuleState<'a>> {
        SqlFirewallRuleId::parse(id)?;
        Ok(FirewallRuleState {
            id: string(id),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tf_provider::Resource;

    use crate::testing::{FakeArm, SUBSCRIPTION};

    use super::*;

    fn config() -> FirewallRuleState<'static> {
        FirewallRuleState {
            name: string("office"),
            resource_group_name: string("group1"),
            server_name: string("server1"),
            start_ip_address: string("10.0.0.1"),
            end_ip_address: string("10.0.0.255"),
            ..Default::default()
        }
    }

    fn rule_path() -> String {
        format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/group1/providers/Microsoft.Sql/servers/server1/firewallRules/office")
    }

    #[tokio::test]
    async fn lifecycle() {
        let fake = FakeArm::new();
        let resource = SqlFirewallRuleResource::new(fake.handle());
        let mut diags = Diagnostics::default();

        let (planned, private) = resource
            .plan_create(&mut diags, config(), config(), Value::Null)
            .await
            .unwrap();
        assert!(planned.id.is_unknown());

        let (state, private) = resource
            .create(&mut diags, planned, config(), private, Value::Null)
            .await
            .unwrap();
        assert_eq!(state.id.as_str(), rule_path());
        assert_eq!(
            fake.get(&rule_path()).unwrap()["properties"]["startIpAddress"],
            "10.0.0.1"
        );

        fake.update(&rule_path(), json!({"properties": {"endIpAddress": "10.0.1.255"}}));
        let (read, _) = resource
            .read(&mut diags, state.clone(), private.clone(), Value::Null)
            .await
            .unwrap();
        assert_eq!(read.end_ip_address.as_str(), "10.0.1.255");

        resource
            .destroy(&mut diags, read.clone(), private.clone(), Value::Null)
            .await
            .unwrap();
        assert!(fake.get(&rule_path()).is_none());
        assert!(resource
            .read(&mut diags, read, private, Value::Null)
            .await
            .is_none());
        assert!(diags.errors.is_empty());
    }

    #[tokio::test]
    async fn existing_rule_must_be_imported() {
        let fake = FakeArm::new();
        fake.insert(
            &rule_path(),
            json!({"properties": {"startIpAddress": "1.1.1.1", "endIpAddress": "1.1.1.1"}}),
        );
        let resource = SqlFirewallRuleResource::new(fake.handle());
        let mut diags = Diagnostics::default();

        let created = resource
            .create(&mut diags, config(), config(), Value::Null, Value::Null)
            .await;
        assert!(created.is_none());
        assert_eq!(diags.errors.len(), 1);
    }

    #[tokio::test]
    async fn server_name_forces_replacement() {
        let resource = SqlFirewallRuleResource::default();
        let mut diags = Diagnostics::default();
        let prior = FirewallRuleState {
            id: string(rule_path()),
            ..config()
        };
        let proposed = FirewallRuleState {
            server_name: string("server2"),
            ..prior.clone()
        };

        let (planned, _, replace) = resource
            .plan_update(&mut diags, prior, proposed.clone(), proposed, Value::Null, Value::Null)
            .await
            .unwrap();
        assert_eq!(replace.len(), 1);
        assert!(planned.id.is_unknown());
    }

    #[tokio::test]
    async fn invalid_addresses() {
        let resource = SqlFirewallRuleResource::default();
        let mut diags = Diagnostics::default();
        let config = FirewallRuleState {
            start_ip_address: string("10.0.0.256"),
            ..config()
        };
        assert!(resource.validate(&mut diags, config).await.is_none());
        assert_eq!(diags.errors.len(), 1);
    }

    #[tokio::test]
    async fn import_checks_the_id() {
        let resource = SqlFirewallRuleResource::default();
        let mut diags = Diagnostics::default();
        assert!(resource.import(&mut diags, rule_path()).await.is_some());
        assert!(resource
            .import(&mut diags, "/subscriptions/sub/resourceGroups/group1".into())
            .await
            .is_none());
    }
}

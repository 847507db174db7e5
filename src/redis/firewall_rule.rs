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

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tf_provider::schema::AttributeType;
use tf_provider::value::{Value, ValueList, ValueString};
use tf_provider::schema::{Block, Description, Schema};
use tf_provider::{map, AttributePath, Diagnostics};

use crate::ids::RedisFirewallRuleId;
use crate::provider::Clients;
use crate::resource::{already_exists, arm_resource};
use crate::schema::{self, required, string, Refresh};
use crate::timeouts::{self, Timeouts, TimeoutsState};
use crate::utils::{WithSchema, WithValidate};
use crate::validate;
use crate::wait::{self, Retry};

use super::models::{FirewallRule, FirewallRuleProperties};
use super::API_VERSION;

const TIMEOUTS: Timeouts = Timeouts::minutes(30, 5, 30, 30);

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisFirewallRuleState<'a> {
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub redis_cache_name: ValueString<'a>,
    pub resource_group_name: ValueString<'a>,
    pub start_ip: ValueString<'a>,
    pub end_ip: ValueString<'a>,
    pub timeouts: ValueList<Value<TimeoutsState<'a>>>,
}

impl WithSchema for RedisFirewallRuleState<'_> {
    fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                description: Description::plain("Firewall rule of an Azure Cache for Redis"),
                attributes: map! {
                    "id"                  => schema::id(),
                    "name"                => required(AttributeType::String, "Name of the firewall rule, letters, digits and underscores"),
                    "redis_cache_name"    => required(AttributeType::String, "Name of the Redis cache"),
                    "resource_group_name" => schema::resource_group_name(),
                    "start_ip"            => required(AttributeType::String, "First IPv4 address of the allowed range"),
                    "end_ip"              => required(AttributeType::String, "Last IPv4 address of the allowed range"),
                },
                blocks: map! {
                    "timeouts" => timeouts::schema(TIMEOUTS, true),
                },
                ..Default::default()
            },
        }
    }
}

impl WithValidate for RedisFirewallRuleState<'_> {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath) {
        validate::string(
            diags,
            attr_path.clone().attribute("name"),
            &self.name,
            validate::redis_firewall_rule_name,
        );
        validate::string(
            diags,
            attr_path.clone().attribute("redis_cache_name"),
            &self.redis_cache_name,
            validate::redis_cache_name,
        );
        validate::string(diags, attr_path.clone().attribute("start_ip"), &self.start_ip, validate::ipv4);
        validate::string(diags, attr_path.attribute("end_ip"), &self.end_ip, validate::ipv4);
        timeouts::validate(diags, &self.timeouts);
    }
}

fn expand(state: &RedisFirewallRuleState<'_>) -> FirewallRule {
    FirewallRule {
        id: None,
        properties: FirewallRuleProperties {
            start_ip: state.start_ip.as_str().to_owned(),
            end_ip: state.end_ip.as_str().to_owned(),
        },
    }
}

fn refresh(state: &mut RedisFirewallRuleState<'_>, id: &RedisFirewallRuleId, rule: &FirewallRule, mode: Refresh) {
    mode.set(&mut state.name, string(&id.firewall_rule_name));
    mode.set(&mut state.redis_cache_name, string(&id.redis_name));
    mode.set(&mut state.resource_group_name, string(&id.resource_group_name));
    mode.set(&mut state.start_ip, string(&rule.properties.start_ip));
    mode.set(&mut state.end_ip, string(&rule.properties.end_ip));
}

arm_resource!(
    RedisFirewallRuleResource,
    RedisFirewallRuleState,
    "Redis firewall rule",
    TIMEOUTS
);

impl RedisFirewallRuleResource {
    fn plan_state(
        &self,
        _diags: &mut Diagnostics,
        _state: &mut RedisFirewallRuleState<'_>,
        _prior: Option<&RedisFirewallRuleState<'_>>,
    ) {
    }

    fn replacements(prior: &RedisFirewallRuleState<'_>, proposed: &RedisFirewallRuleState<'_>) -> Vec<AttributePath> {
        schema::force_new!(prior, proposed, [name, redis_cache_name, resource_group_name])
    }

    /// Write the rule, then wait until it can be read back
    async fn write<'a>(
        &self,
        clients: &Clients,
        id: &RedisFirewallRuleId,
        mut state: RedisFirewallRuleState<'a>,
        timeout: std::time::Duration,
    ) -> Result<RedisFirewallRuleState<'a>> {
        let path = id.to_string();
        clients
            .arm
            .put::<_, FirewallRule>(&path, API_VERSION, &expand(&state))
            .await
            .with_context(|| format!("setting {id}"))?;

        let path = path.as_str();
        let rule = wait::retry(timeout, move || async move {
            match clients.arm.get_optional::<FirewallRule>(path, API_VERSION).await {
                Ok(Some(rule)) => Ok(rule),
                Ok(None) => Err(Retry::Retryable(anyhow!("{id} is not readable yet"))),
                Err(err) => Err(Retry::NonRetryable(
                    anyhow::Error::from(err).context(format!("retrieving {id}")),
                )),
            }
        })
        .await
        .with_context(|| format!("waiting for {id} to be readable"))?;

        state.id = string(path);
        refresh(&mut state, id, &rule, Refresh::Unknowns);
        Ok(state)
    }

    async fn create_state<'a>(
        &self,
        clients: &Clients,
        state: RedisFirewallRuleState<'a>,
        timeouts: Timeouts,
    ) -> Result<RedisFirewallRuleState<'a>> {
        let id = RedisFirewallRuleId::new(
            &clients.subscription_id,
            state.resource_group_name.as_str(),
            state.redis_cache_name.as_str(),
            state.name.as_str(),
        );

        let existing: Option<FirewallRule> = clients
            .arm
            .get_optional(&id.to_string(), API_VERSION)
            .await
            .with_context(|| format!("checking for presence of existing {id}"))?;
        if existing.is_some() {
            return Err(already_exists("azurerm_redis_firewall_rule", &id));
        }

        let state = self.write(clients, &id, state, timeouts.create).await?;
        tracing::info!(%id, "created Redis firewall rule");
        Ok(state)
    }

    async fn read_state<'a>(
        &self,
        clients: &Clients,
        mut state: RedisFirewallRuleState<'a>,
    ) -> Result<Option<RedisFirewallRuleState<'a>>> {
        let id = RedisFirewallRuleId::parse(state.id.as_str())?;
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
        _prior: RedisFirewallRuleState<'a>,
        state: RedisFirewallRuleState<'a>,
        timeouts: Timeouts,
    ) -> Result<RedisFirewallRuleState<'a>> {
        let id = RedisFirewallRuleId::parse(state.id.as_str())?;
        self.write(clients, &id, state, timeouts.update).await
    }

    async fn delete_state<'a>(
        &self,
        clients: &Clients,
        state: RedisFirewallRuleState<'a>,
        _timeouts: Timeouts,
    ) -> Result<()> {
        let id = RedisFirewallRuleId::parse(state.id.as_str())?;
        clients
            .arm
            .delete(&id.to_string(), API_VERSION)
            .await
            .with_context(|| format!("deleting {id}"))?;
        tracing::info!(%id, "deleted Redis firewall rule");
        Ok(())
    }

    fn import_state<'a>(id: &str) -> Result<RedisFirewallRuleState<'a>> {
        RedisFirewallRuleId::parse(id)?;
        Ok(RedisFirewallRuleState {
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

    fn rule_path(name: &str) -> String {
        format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/group1/providers/Microsoft.Cache/redis/cache1/firewallRules/{name}")
    }

    fn config(name: &str) -> RedisFirewallRuleState<'static> {
        RedisFirewallRuleState {
            name: string(name),
            redis_cache_name: string("cache1"),
            resource_group_name: string("group1"),
            start_ip: string("10.0.0.1"),
            end_ip: string("10.0.0.9"),
            ..Default::default()
        }
    }

    fn not_found() -> Response {
        Response::new(
            StatusCode::NOT_FOUND,
            r#"{"error": {"code": "NotFound", "message": "missing"}}"#,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn create_waits_until_readable() {
        let fake = FakeArm::new();
        // Existence check, then the first read after the PUT misses the rule
        fake.enqueue(Method::GET, &rule_path("office"), not_found());
        fake.enqueue(Method::GET, &rule_path("office"), not_found());
        let resource = RedisFirewallRuleResource::new(fake.handle());
        let mut diags = Diagnostics::default();

        let (planned, private) = resource
            .plan_create(&mut diags, config("office"), config("office"), Value::Null)
            .await
            .unwrap();
        let (state, private) = resource
            .create(&mut diags, planned, config("office"), private, Value::Null)
            .await
            .unwrap();
        assert_eq!(state.id.as_str(), rule_path("office"));
        assert_eq!(
            fake.sent(Method::PUT, &rule_path("office")),
            vec![json!({"properties": {"startIP": "10.0.0.1", "endIP": "10.0.0.9"}})]
        );
        let gets = fake
            .requests()
            .into_iter()
            .filter(|(method, _)| *method == Method::GET)
            .count();
        assert_eq!(gets, 3);

        fake.update(&rule_path("office"), json!({"properties": {"endIP": "10.0.0.20"}}));
        let (read, _) = resource
            .read(&mut diags, state, private.clone(), Value::Null)
            .await
            .unwrap();
        assert_eq!(read.end_ip.as_str(), "10.0.0.20");

        resource
            .destroy(&mut diags, read, private, Value::Null)
            .await
            .unwrap();
        assert!(fake.get(&rule_path("office")).is_none());
        assert!(diags.errors.is_empty());
    }

    #[test]
    fn rule_names() {
        let errors = |name: &str| {
            let mut diags = Diagnostics::default();
            config(name).validate(&mut diags, AttributePath::default());
            diags.errors.len()
        };
        assert_eq!(errors("office_1"), 0);
        assert_eq!(errors("office-1"), 1);
    }

    #[tokio::test]
    async fn cache_name_forces_replacement() {
        let prior = RedisFirewallRuleState {
            id: string(rule_path("office")),
            ..config("office")
        };
        let proposed = RedisFirewallRuleState {
            redis_cache_name: string("cache2"),
            start_ip: string("10.0.0.2"),
            ..prior.clone()
        };
        assert_eq!(
            RedisFirewallRuleResource::replacements(&prior, &proposed),
            vec![AttributePath::new("redis_cache_name")]
        );
    }
}

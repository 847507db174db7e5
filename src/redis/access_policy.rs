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
use tf_provider::value::{Value, ValueList, ValueString};
use tf_provider::schema::{Block, Description, Schema};
use tf_provider::{map, AttributePath, Diagnostics};

use crate::ids::{RedisAccessPolicyId, RedisCacheId};
use crate::locks;
use crate::provider::Clients;
use crate::resource::{already_exists, arm_resource};
use crate::schema::{self, required, string, Refresh};
use crate::timeouts::{self, Timeouts, TimeoutsState};
use crate::utils::{WithSchema, WithValidate};
use crate::validate;

use super::models::{AccessPolicy, AccessPolicyProperties};
use super::ACCESS_POLICY_API_VERSION;

const TIMEOUTS: Timeouts = Timeouts::minutes(30, 5, 30, 30);

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicyState<'a> {
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub redis_cache_id: ValueString<'a>,
    pub permissions: ValueString<'a>,
    pub timeouts: ValueList<Value<TimeoutsState<'a>>>,
}

impl WithSchema for AccessPolicyState<'_> {
    fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                description: Description::plain("Custom data access policy of an Azure Cache for Redis"),
                attributes: map! {
                    "id"             => schema::id(),
                    "name"           => required(AttributeType::String, "Name of the access policy"),
                    "redis_cache_id" => required(AttributeType::String, "ID of the Redis cache"),
                    "permissions"    => required(AttributeType::String, "Redis ACL rules granted by the policy, such as `+@read +get ~*`"),
                },
                blocks: map! {
                    "timeouts" => timeouts::schema(TIMEOUTS, true),
                },
                ..Default::default()
            },
        }
    }
}

impl WithValidate for AccessPolicyState<'_> {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath) {
        validate::string(diags, attr_path.clone().attribute("name"), &self.name, validate::not_empty);
        validate::string(
            diags,
            attr_path.clone().attribute("redis_cache_id"),
            &self.redis_cache_id,
            validate::resource_id(RedisCacheId::parse),
        );
        validate::string(
            diags,
            attr_path.attribute("permissions"),
            &self.permissions,
            validate::not_empty,
        );
        timeouts::validate(diags, &self.timeouts);
    }
}

fn expand(state: &AccessPolicyState<'_>) -> AccessPolicy {
    AccessPolicy {
        properties: AccessPolicyProperties {
            permissions: state.permissions.as_str().to_owned(),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn refresh(state: &mut AccessPolicyState<'_>, id: &RedisAccessPolicyId, policy: &AccessPolicy, mode: Refresh) {
    mode.set(&mut state.name, string(&id.access_policy_name));
    mode.set_ignoring_case(&mut state.redis_cache_id, Some(&id.redis_id().to_string()));
    mode.set(&mut state.permissions, string(policy.properties.permissions.as_str()));
}

arm_resource!(
    RedisAccessPolicyResource,
    AccessPolicyState,
    "Redis access policy",
    TIMEOUTS
);

impl RedisAccessPolicyResource {
    fn plan_state(
        &self,
        _diags: &mut Diagnostics,
        _state: &mut AccessPolicyState<'_>,
        _prior: Option<&AccessPolicyState<'_>>,
    ) {
    }

    fn replacements(prior: &AccessPolicyState<'_>, proposed: &AccessPolicyState<'_>) -> Vec<AttributePath> {
        let mut paths = schema::force_new!(prior, proposed, [name]);
        if !prior.redis_cache_id.as_str().eq_ignore_ascii_case(proposed.redis_cache_id.as_str()) {
            paths.push(AttributePath::new("redis_cache_id"));
        }
        paths
    }

    async fn write<'a>(
        &self,
        clients: &Clients,
        id: &RedisAccessPolicyId,
        mut state: AccessPolicyState<'a>,
        timeout: Duration,
    ) -> Result<AccessPolicyState<'a>> {
        let policy: AccessPolicy = clients
            .arm
            .put_then_poll(&id.to_string(), ACCESS_POLICY_API_VERSION, &expand(&state), timeout)
            .await
            .with_context(|| format!("setting {id}"))?;

        state.id = string(id.to_string());
        refresh(&mut state, id, &policy, Refresh::Unknowns);
        Ok(state)
    }

    async fn create_state<'a>(
        &self,
        clients: &Clients,
        state: AccessPolicyState<'a>,
        timeouts: Timeouts,
    ) -> Result<AccessPolicyState<'a>> {
        let cache = RedisCacheId::parse(state.redis_cache_id.as_str())?;
        let id = RedisAccessPolicyId::new(
            &cache.subscription_id,
            &cache.resource_group_name,
            &cache.redis_name,
            state.name.as_str(),
        );
        let _lock = locks::by_id(&cache.to_string()).await;

        let existing: Option<AccessPolicy> = clients
            .arm
            .get_optional(&id.to_string(), ACCESS_POLICY_API_VERSION)
            .await
            .with_context(|| format!("checking for presence of existing {id}"))?;
        if existing.is_some() {
            return Err(already_exists("azurerm_redis_cache_access_policy", &id));
        }

        let state = self.write(clients, &id, state, timeouts.create).await?;
        tracing::info!(%id, "created Redis access policy");
        Ok(state)
    }

    async fn read_state<'a>(
        &self,
        clients: &Clients,
        mut state: AccessPolicyState<'a>,
    ) -> Result<Option<AccessPolicyState<'a>>> {
        let id = RedisAccessPolicyId::parse(state.id.as_str())?;
        let Some(policy) = clients
            .arm
            .get_optional::<AccessPolicy>(&id.to_string(), ACCESS_POLICY_API_VERSION)
            .await
            .with_context(|| format!("retrieving {id}"))?
        else {
            return Ok(None);
        };

        refresh(&mut state, &id, &policy, Refresh::All);
        Ok(Some(state))
    }

    async fn update_state<'a>(
        &self,
        clients: &Clients,
        _prior: AccessPolicyState<'a>,
        state: AccessPolicyState<'a>,
        timeouts: Timeouts,
    ) -> Result<AccessPolicyState<'a>> {
        let id = RedisAccessPolicyId::parse(state.id.as_str())?;
        let _lock = locks::by_id(&id.redis_id().to_string()).await;
        self.write(clients, &id, state, timeouts.update).await
    }

    async fn delete_state<'a>(
        &self,
        clients: &Clients,
        state: AccessPolicyState<'a>,
        timeouts: Timeouts,
    ) -> Result<()> {
        let id = RedisAccessPolicyId::parse(state.id.as_str())?;
        let _lock = locks::by_id(&id.redis_id().to_string()).await;
        clients
            .arm
            .delete_then_poll(&id.to_string(), ACCESS_POLICY_API_VERSION, timeouts.delete)
            .await
            .with_context(|| format!("deleting {id}"))?;
        tracing::info!(%id, "deleted Redis access policy");
        Ok(())
    }

    fn import_state<'a>(id: &str) -> Result<AccessPolicyState<'a>> {
        RedisAccessPolicyId::parse(id)?;
        Ok(AccessPolicyState {
            id: string(id),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::json;
    use tf_provider::Resource;

    use crate::testing::{FakeArm, SUBSCRIPTION};

    use super::*;

    fn cache_id(name: &str) -> String {
        format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/group1/providers/Microsoft.Cache/redis/{name}")
    }

    fn config(cache: &str) -> AccessPolicyState<'static> {
        AccessPolicyState {
            name: string("readers"),
            redis_cache_id: string(cache_id(cache)),
            permissions: string("+@read +@connection +cluster|info"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn lifecycle() {
        let fake = FakeArm::new();
        let resource = RedisAccessPolicyResource::new(fake.handle());
        let mut diags = Diagnostics::default();
        let path = format!("{}/accessPolicies/readers", cache_id("policies1"));

        let (planned, private) = resource
            .plan_create(&mut diags, config("policies1"), config("policies1"), Value::Null)
            .await
            .unwrap();
        let (state, private) = resource
            .create(&mut diags, planned, config("policies1"), private, Value::Null)
            .await
            .unwrap();
        assert_eq!(state.id.as_str(), path);
        assert_eq!(
            fake.sent(Method::PUT, &path),
            vec![json!({"properties": {"permissions": "+@read +@connection +cluster|info"}})]
        );

        let proposed = AccessPolicyState {
            permissions: string("+@read"),
            ..state.clone()
        };
        let (planned, private, replace) = resource
            .plan_update(&mut diags, state.clone(), proposed.clone(), proposed, private, Value::Null)
            .await
            .unwrap();
        assert!(replace.is_empty());
        let (updated, private) = resource
            .update(&mut diags, state, planned.clone(), planned, private, Value::Null)
            .await
            .unwrap();
        assert_eq!(updated.permissions.as_str(), "+@read");

        let (read, private) = resource
            .read(&mut diags, updated.clone(), private, Value::Null)
            .await
            .unwrap();
        assert_eq!(read, updated);

        resource
            .destroy(&mut diags, read, private, Value::Null)
            .await
            .unwrap();
        assert!(fake.get(&path).is_none());
        assert!(diags.errors.is_empty());
    }

    #[test]
    fn cache_id_compares_ignoring_case() {
        let prior = AccessPolicyState {
            id: string(format!("{}/accessPolicies/readers", cache_id("policies2"))),
            ..config("policies2")
        };
        let same = AccessPolicyState {
            redis_cache_id: string(cache_id("policies2").to_lowercase()),
            ..prior.clone()
        };
        assert!(RedisAccessPolicyResource::replacements(&prior, &same).is_empty());

        let other = AccessPolicyState {
            redis_cache_id: string(cache_id("policies3")),
            ..prior.clone()
        };
        assert_eq!(
            RedisAccessPolicyResource::replacements(&prior, &other),
            vec![AttributePath::new("redis_cache_id")]
        );
    }
}

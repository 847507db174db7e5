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

use crate::ids::{RedisAccessPolicyAssignmentId, RedisCacheId};
use crate::locks;
use crate::provider::Clients;
use crate::resource::{already_exists, arm_resource};
use crate::schema::{self, required, string, Refresh};
use crate::timeouts::{self, Timeouts, TimeoutsState};
use crate::utils::{WithSchema, WithValidate};
use crate::validate;

use super::models::{AccessPolicyAssignment, AccessPolicyAssignmentProperties};
use super::ACCESS_POLICY_API_VERSION;

const TIMEOUTS: Timeouts = Timeouts::minutes(30, 5, 0, 30);

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicyAssignmentState<'a> {
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub redis_cache_id: ValueString<'a>,
    pub access_policy_name: ValueString<'a>,
    pub object_id: ValueString<'a>,
    pub object_id_alias: ValueString<'a>,
    pub timeouts: ValueList<Value<TimeoutsState<'a>>>,
}

impl WithSchema for AccessPolicyAssignmentState<'_> {
    fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                description: Description::plain("Assignment of a Redis access policy to an Azure AD identity"),
                attributes: map! {
                    "id"                 => schema::id(),
                    "name"               => required(AttributeType::String, "Name of the assignment"),
                    "redis_cache_id"     => required(AttributeType::String, "ID of the Redis cache"),
                    "access_policy_name" => required(AttributeType::String, "Access policy granted, such as `Data Contributor`"),
                    "object_id"          => required(AttributeType::String, "Object ID of the user, group or service principal"),
                    "object_id_alias"    => required(AttributeType::String, "Username used to authenticate with the object ID"),
                },
                blocks: map! {
                    "timeouts" => timeouts::schema(TIMEOUTS, false),
                },
                ..Default::default()
            },
        }
    }
}

impl WithValidate for AccessPolicyAssignmentState<'_> {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath) {
        validate::string(diags, attr_path.clone().attribute("name"), &self.name, validate::not_empty);
        validate::string(
            diags,
            attr_path.clone().attribute("redis_cache_id"),
            &self.redis_cache_id,
            validate::resource_id(RedisCacheId::parse),
        );
        for (name, value) in [
            ("access_policy_name", &self.access_policy_name),
            ("object_id", &self.object_id),
            ("object_id_alias", &self.object_id_alias),
        ] {
            validate::string(diags, attr_path.clone().attribute(name), value, validate::not_empty);
        }
        timeouts::validate(diags, &self.timeouts);
    }
}

fn refresh(
    state: &mut AccessPolicyAssignmentState<'_>,
    id: &RedisAccessPolicyAssignmentId,
    assignment: &AccessPolicyAssignment,
    mode: Refresh,
) {
    let properties = &assignment.properties;
    mode.set(&mut state.name, string(&id.access_policy_assignment_name));
    mode.set_ignoring_case(&mut state.redis_cache_id, Some(&id.redis_id().to_string()));
    mode.set(&mut state.access_policy_name, string(properties.access_policy_name.as_str()));
    mode.set(&mut state.object_id, string(properties.object_id.as_str()));
    mode.set(&mut state.object_id_alias, string(properties.object_id_alias.as_str()));
}

arm_resource!(
    RedisAccessPolicyAssignmentResource,
    AccessPolicyAssignmentState,
    "Redis access policy assignment",
    TIMEOUTS
);

impl RedisAccessPolicyAssignmentResource {
    fn plan_state(
        &self,
        _diags: &mut Diagnostics,
        _state: &mut AccessPolicyAssignmentState<'_>,
        _prior: Option<&AccessPolicyAssignmentState<'_>>,
    ) {
    }

    fn replacements(
        prior: &AccessPolicyAssignmentState<'_>,
        proposed: &AccessPolicyAssignmentState<'_>,
    ) -> Vec<AttributePath> {
        let mut paths = schema::force_new!(
            prior,
            proposed,
            [name, access_policy_name, object_id, object_id_alias]
        );
        if !prior.redis_cache_id.as_str().eq_ignore_ascii_case(proposed.redis_cache_id.as_str()) {
            paths.push(AttributePath::new("redis_cache_id"));
        }
        paths
    }

    async fn create_state<'a>(
        &self,
        clients: &Clients,
        mut state: AccessPolicyAssignmentState<'a>,
        timeouts: Timeouts,
    ) -> Result<AccessPolicyAssignmentState<'a>> {
        let cache = RedisCacheId::parse(state.redis_cache_id.as_str())?;
        let id = RedisAccessPolicyAssignmentId::new(
            &cache.subscription_id,
            &cache.resource_group_name,
            &cache.redis_name,
            state.name.as_str(),
        );
        let path = id.to_string();
        let _lock = locks::by_id(&cache.to_string()).await;

        let existing: Option<AccessPolicyAssignment> = clients
            .arm
            .get_optional(&path, ACCESS_POLICY_API_VERSION)
            .await
            .with_context(|| format!("checking for presence of existing {id}"))?;
        if existing.is_some() {
            return Err(already_exists("azurerm_redis_cache_access_policy_assignment", &id));
        }

        let body = AccessPolicyAssignment {
            properties: AccessPolicyAssignmentProperties {
                access_policy_name: state.access_policy_name.as_str().to_owned(),
                object_id: state.object_id.as_str().to_owned(),
                object_id_alias: state.object_id_alias.as_str().to_owned(),
                ..Default::default()
            },
            ..Default::default()
        };
        let assignment: AccessPolicyAssignment = clients
            .arm
            .put_then_poll(&path, ACCESS_POLICY_API_VERSION, &body, timeouts.create)
            .await
            .with_context(|| format!("creating {id}"))?;
        tracing::info!(%id, "created Redis access policy assignment");

        state.id = string(path);
        refresh(&mut state, &id, &assignment, Refresh::Unknowns);
        Ok(state)
    }

    async fn read_state<'a>(
        &self,
        clients: &Clients,
        mut state: AccessPolicyAssignmentState<'a>,
    ) -> Result<Option<AccessPolicyAssignmentState<'a>>> {
        let id = RedisAccessPolicyAssignmentId::parse(state.id.as_str())?;
        let Some(assignment) = clients
            .arm
            .get_optional::<AccessPolicyAssignment>(&id.to_string(), ACCESS_POLICY_API_VERSION)
            .await
            .with_context(|| format!("retrieving {id}"))?
        else {
            return Ok(None);
        };

        refresh(&mut state, &id, &assignment, Refresh::All);
        Ok(Some(state))
    }

    async fn update_state<'a>(
        &self,
        _clients: &Clients,
        _prior: AccessPolicyAssignmentState<'a>,
        state: AccessPolicyAssignmentState<'a>,
        _timeouts: Timeouts,
    ) -> Result<AccessPolicyAssignmentState<'a>> {
        Ok(state)
    }

    async fn delete_state<'a>(
        &self,
        clients: &Clients,
        state: AccessPolicyAssignmentState<'a>,
        timeouts: Timeouts,
    ) -> Result<()> {
        let id = RedisAccessPolicyAssignmentId::parse(state.id.as_str())?;
        let _lock = locks::by_id(&id.redis_id().to_string()).await;
        clients
            .arm
            .delete_then_poll(&id.to_string(), ACCESS_POLICY_API_VERSION, timeouts.delete)
            .await
            .with_context(|| format!("deleting {id}"))?;
        tracing::info!(%id, "deleted Redis access policy assignment");
        Ok(())
    }

    fn import_state<'a>(id: &str) -> Result<AccessPolicyAssignmentState<'a>> {
        RedisAccessPolicyAssignmentId::parse(id)?;
        Ok(AccessPolicyAssignmentState {
            id: string(id),
            ..Default::default()
        })
    }
}

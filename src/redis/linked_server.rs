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

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tf_provider::schema::AttributeType;
use tf_provider::value::{Value, ValueList, ValueString};
use tf_provider::schema::{Block, Description, Schema};
use tf_provider::{map, AttributePath, Diagnostics};

use crate::ids::{RedisCacheId, RedisLinkedServerId};
use crate::locks;
use crate::provider::Clients;
use crate::resource::{already_exists, arm_resource};
use crate::schema::{self, computed, normalize_location, optional_string, required, string, Refresh};
use crate::timeouts::{self, Timeouts, TimeoutsState};
use crate::utils::{WithSchema, WithValidate};
use crate::validate;
use crate::wait::StateChangeConf;

use super::models::{LinkedServer, LinkedServerProperties};
use super::{API_VERSION, REDIS_CACHE_RESOURCE_NAME};

// Every argument forces a new link, so there is no update timeout
const TIMEOUTS: Timeouts = Timeouts::minutes(60, 5, 0, 60);

const SERVER_ROLES: &[&str] = &["Primary", "Secondary"];

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedServerState<'a> {
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub target_redis_cache_name: ValueString<'a>,
    pub resource_group_name: ValueString<'a>,
    pub linked_redis_cache_id: ValueString<'a>,
    pub linked_redis_cache_location: ValueString<'a>,
    pub server_role: ValueString<'a>,
    pub geo_replicated_primary_host_name: ValueString<'a>,
    pub timeouts: ValueList<Value<TimeoutsState<'a>>>,
}

impl WithSchema for LinkedServerState<'_> {
    fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                description: Description::plain("Geo-replication link between two Premium Redis caches"),
                attributes: map! {
                    "id"                               => schema::id(),
                    "name"                             => computed(AttributeType::String, "Name of the link, the name of the linked cache"),
                    "target_redis_cache_name"          => required(AttributeType::String, "Cache the link is added to"),
                    "resource_group_name"              => schema::resource_group_name(),
                    "linked_redis_cache_id"            => required(AttributeType::String, "ID of the linked cache"),
                    "linked_redis_cache_location"      => required(AttributeType::String, "Azure region of the linked cache"),
                    "server_role"                      => required(AttributeType::String, "Role of the linked cache: Primary or Secondary"),
                    "geo_replicated_primary_host_name" => computed(AttributeType::String, "Host name of the geo-replicated primary"),
                },
                blocks: map! {
                    "timeouts" => timeouts::schema(TIMEOUTS, false),
                },
                ..Default::default()
            },
        }
    }
}

impl WithValidate for LinkedServerState<'_> {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath) {
        validate::string(
            diags,
            attr_path.clone().attribute("target_redis_cache_name"),
            &self.target_redis_cache_name,
            validate::redis_cache_name,
        );
        validate::string(
            diags,
            attr_path.clone().attribute("linked_redis_cache_id"),
            &self.linked_redis_cache_id,
            validate::resource_id(RedisCacheId::parse),
        );
        validate::string(
            diags,
            attr_path.clone().attribute("linked_redis_cache_location"),
            &self.linked_redis_cache_location,
            validate::not_empty,
        );
        validate::string(
            diags,
            attr_path.attribute("server_role"),
            &self.server_role,
            validate::one_of(SERVER_ROLES, false),
        );
        timeouts::validate(diags, &self.timeouts);
    }
}

fn refresh(state: &mut LinkedServerState<'_>, id: &RedisLinkedServerId, server: &LinkedServer, mode: Refresh) -> Result<()> {
    let properties = &server.properties;
    let linked_id = RedisCacheId::parse_insensitively(&properties.linked_redis_cache_id)?;

    mode.set(&mut state.name, string(&id.linked_server_name));
    mode.set(&mut state.target_redis_cache_name, string(&id.redis_name));
    mode.set(&mut state.resource_group_name, string(&id.resource_group_name));
    mode.set_ignoring_case(&mut state.linked_redis_cache_id, Some(&linked_id.to_string()));
    mode.set_location(
        &mut state.linked_redis_cache_location,
        Some(properties.linked_redis_cache_location.as_str()),
    );
    mode.set(&mut state.server_role, string(properties.server_role.as_str()));
    mode.set(
        &mut state.geo_replicated_primary_host_name,
        optional_string(properties.geo_replicated_primary_host_name.clone()),
    );
    Ok(())
}

/// Provisioning state of the link, `NotFound` once it is gone
async fn link_state(clients: &Clients, path: &str, id: &RedisLinkedServerId) -> Result<Option<(LinkedServer, String)>> {
    let server: Option<LinkedServer> = clients
        .arm
        .get_optional(path, API_VERSION)
        .await
        .with_context(|| format!("polling for status of {id}"))?;
    Ok(match server {
        Some(server) => {
            let state = server
                .properties
                .provisioning_state
                .clone()
                .ok_or_else(|| anyhow!("polling for status of {id}: `provisioningState` was nil"))?;
            Some((server, state))
        }
        None => Some((LinkedServer::default(), "NotFound".to_owned())),
    })
}

arm_resource!(
    RedisLinkedServerResource,
    LinkedServerState,
    "Redis linked server",
    TIMEOUTS
);

impl RedisLinkedServerResource {
    fn plan_state(
        &self,
        _diags: &mut Diagnostics,
        state: &mut LinkedServerState<'_>,
        prior: Option<&LinkedServerState<'_>>,
    ) {
        if prior.is_none() {
            state.name = match RedisCacheId::parse(state.linked_redis_cache_id.as_str()) {
                Ok(linked) if !state.linked_redis_cache_id.is_unknown() => string(linked.redis_name),
                _ => Value::Unknown,
            };
            state.geo_replicated_primary_host_name = Value::Unknown;
        }
    }

    fn replacements(prior: &LinkedServerState<'_>, proposed: &LinkedServerState<'_>) -> Vec<AttributePath> {
        let mut paths = schema::force_new!(
            prior,
            proposed,
            [target_redis_cache_name, resource_group_name, server_role]
        );
        if !prior
            .linked_redis_cache_id
            .as_str()
            .eq_ignore_ascii_case(proposed.linked_redis_cache_id.as_str())
        {
            paths.push(AttributePath::new("linked_redis_cache_id"));
        }
        if normalize_location(prior.linked_redis_cache_location.as_str())
            != normalize_location(proposed.linked_redis_cache_location.as_str())
        {
            paths.push(AttributePath::new("linked_redis_cache_location"));
        }
        paths
    }

    async fn create_state<'a>(
        &self,
        clients: &Clients,
        mut state: LinkedServerState<'a>,
        timeouts: Timeouts,
    ) -> Result<LinkedServerState<'a>> {
        let linked = RedisCacheId::parse(state.linked_redis_cache_id.as_str())?;
        let target = state.target_redis_cache_name.as_str();
        let id = RedisLinkedServerId::new(
            &clients.subscription_id,
            state.resource_group_name.as_str(),
            target,
            &linked.redis_name,
        );
        let path = id.to_string();

        let existing: Option<LinkedServer> = clients
            .arm
            .get_optional(&path, API_VERSION)
            .await
            .with_context(|| format!("checking for presence of existing {id}"))?;
        if existing.is_some() {
            return Err(already_exists("azurerm_redis_linked_server", &id));
        }

        let _lock = locks::by_name(target, REDIS_CACHE_RESOURCE_NAME).await;
        let body = LinkedServer {
            properties: LinkedServerProperties {
                linked_redis_cache_id: linked.to_string(),
                linked_redis_cache_location: normalize_location(state.linked_redis_cache_location.as_str()),
                server_role: state.server_role.as_str().to_owned(),
                ..Default::default()
            },
            ..Default::default()
        };
        clients
            .arm
            .put_then_poll::<_, LinkedServer>(&path, API_VERSION, &body, timeouts.create)
            .await
            .with_context(|| format!("creating {id}"))?;

        tracing::debug!(%id, "waiting for the link to be established");
        let server = {
            let path = path.as_str();
            let id = &id;
            StateChangeConf::new(&["Linking", "Updating", "Creating", "Syncing"], &["Succeeded"])
                .min_timeout(Duration::from_secs(15))
                .timeout(timeouts.create)
                .wait_for_state(move || async move { link_state(clients, path, id).await })
                .await
                .with_context(|| format!("waiting for {id} to become available"))?
        };

        state.id = string(path);
        refresh(&mut state, &id, &server, Refresh::Unknowns)?;
        tracing::info!(%id, "created Redis linked server");
        Ok(state)
    }

    async fn read_state<'a>(
        &self,
        clients: &Clients,
        mut state: LinkedServerState<'a>,
    ) -> Result<Option<LinkedServerState<'a>>> {
        let id = RedisLinkedServerId::parse(state.id.as_str())?;
        let Some(server) = clients
            .arm
            .get_optional::<LinkedServer>(&id.to_string(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {id}"))?
        else {
            return Ok(None);
        };

        refresh(&mut state, &id, &server, Refresh::All)?;
        Ok(Some(state))
    }

    async fn update_state<'a>(
        &self,
        _clients: &Clients,
        _prior: LinkedServerState<'a>,
        state: LinkedServerState<'a>,
        _timeouts: Timeouts,
    ) -> Result<LinkedServerState<'a>> {
        Ok(state)
    }

    async fn delete_state<'a>(
        &self,
        clients: &Clients,
        state: LinkedServerState<'a>,
        timeouts: Timeouts,
    ) -> Result<()> {
        let id = RedisLinkedServerId::parse(state.id.as_str())?;
        let path = id.to_string();
        let _lock = locks::by_name(&id.redis_name, REDIS_CACHE_RESOURCE_NAME).await;

        clients
            .arm
            .delete(&path, API_VERSION)
            .await
            .with_context(|| format!("deleting {id}"))?;

        tracing::debug!(%id, "waiting for the link to be removed");
        let path = path.as_str();
        let id = &id;
        StateChangeConf::new(&["Deleting", "Unlinking", "Succeeded"], &["NotFound"])
            .min_timeout(Duration::from_secs(15))
            .timeout(timeouts.delete)
            .wait_for_state(move || async move { link_state(clients, path, id).await })
            .await
            .with_context(|| format!("waiting for {id} to be removed"))?;
        tracing::info!(%id, "deleted Redis linked server");
        Ok(())
    }

    fn import_state<'a>(id: &str) -> Result<LinkedServerState<'a>> {
        RedisLinkedServerId::parse(id)?;
        Ok(LinkedServerState {
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

    fn cache_id(name: &str) -> String {
        format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/group1/providers/Microsoft.Cache/redis/{name}")
    }

    fn link_path(target: &str, linked: &str) -> String {
        format!("{}/linkedServers/{linked}", cache_id(target))
    }

    fn config(target: &str, linked: &str) -> LinkedServerState<'static> {
        LinkedServerState {
            target_redis_cache_name: string(target),
            resource_group_name: string("group1"),
            linked_redis_cache_id: string(cache_id(linked)),
            linked_redis_cache_location: string("North Europe"),
            server_role: string("Secondary"),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle() {
        let fake = FakeArm::new();
        fake.defaults(
            "/linkedServers/",
            json!({"properties": {
                "provisioningState": "Succeeded",
                "geoReplicatedPrimaryHostName": "primary1.redis.cache.windows.net",
            }}),
        );
        let resource = RedisLinkedServerResource::new(fake.handle());
        let mut diags = Diagnostics::default();

        let (planned, private) = resource
            .plan_create(&mut diags, config("primary1", "secondary1"), config("primary1", "secondary1"), Value::Null)
            .await
            .unwrap();
        assert_eq!(planned.name.as_str(), "secondary1");

        let (state, private) = resource
            .create(&mut diags, planned, config("primary1", "secondary1"), private, Value::Null)
            .await
            .unwrap();
        assert_eq!(state.id.as_str(), link_path("primary1", "secondary1"));
        assert_eq!(state.linked_redis_cache_location.as_str(), "North Europe");
        assert_eq!(
            state.geo_replicated_primary_host_name.as_str(),
            "primary1.redis.cache.windows.net"
        );
        assert_eq!(
            fake.sent(Method::PUT, &link_path("primary1", "secondary1"))[0]["properties"]["linkedRedisCacheLocation"],
            "northeurope"
        );

        let (read, private) = resource
            .read(&mut diags, state.clone(), private, Value::Null)
            .await
            .unwrap();
        assert_eq!(read, state);

        // The link stays visible while it is being removed
        let polls = || {
            fake.requests()
                .into_iter()
                .filter(|(method, path)| *method == Method::GET && path.ends_with("/linkedServers/secondary1"))
                .count()
        };
        let before = polls();
        fake.enqueue(
            Method::GET,
            &link_path("primary1", "secondary1"),
            Response::new(
                StatusCode::OK,
                json!({"properties": {"provisioningState": "Unlinking"}}).to_string(),
            ),
        );
        resource
            .destroy(&mut diags, read, private, Value::Null)
            .await
            .unwrap();
        assert_eq!(polls() - before, 2);
        assert!(fake.get(&link_path("primary1", "secondary1")).is_none());
        assert!(diags.errors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn create_waits_for_the_link() {
        let fake = FakeArm::new();
        fake.defaults("/linkedServers/", json!({"properties": {"provisioningState": "Linking"}}));
        let resource = RedisLinkedServerResource::new(fake.handle());
        let path = link_path("primary2", "secondary2");

        let create = tokio::spawn({
            let resource = resource.clone();
            async move {
                let mut diags = Diagnostics::default();
                let created = resource
                    .create(&mut diags, config("primary2", "secondary2"), config("primary2", "secondary2"), Value::Null, Value::Null)
                    .await;
                (created, diags)
            }
        });
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!create.is_finished());
        fake.update(&path, json!({"properties": {"provisioningState": "Succeeded"}}));

        let (created, diags) = create.await.unwrap();
        assert!(diags.errors.is_empty());
        assert_eq!(created.unwrap().0.server_role.as_str(), "Secondary");
    }

    #[test]
    fn every_argument_forces_replacement() {
        let prior = LinkedServerState {
            id: string(link_path("primary1", "secondary1")),
            ..config("primary1", "secondary1")
        };
        let same = LinkedServerState {
            linked_redis_cache_id: string(cache_id("secondary1").to_uppercase()),
            linked_redis_cache_location: string("northeurope"),
            ..prior.clone()
        };
        assert!(RedisLinkedServerResource::replacements(&prior, &same).is_empty());

        let primary = LinkedServerState {
            server_role: string("Primary"),
            ..prior.clone()
        };
        assert_eq!(
            RedisLinkedServerResource::replacements(&prior, &primary),
            vec![AttributePath::new("server_role")]
        );
    }

    #[test]
    fn timeouts_state_matches_its_block() {
        let state = LinkedServerState {
            timeouts: Value::Value(vec![Value::Value(TimeoutsState {
                create: string("30m"),
                ..Default::default()
            })]),
            ..config("primary1", "secondary1")
        };
        let encoded = serde_json::to_value(&state).unwrap();
        let mut encoded: Vec<String> = encoded["timeouts"][0].as_object().unwrap().keys().cloned().collect();
        encoded.sort();

        let schema = LinkedServerState::schema();
        let Some(tf_provider::schema::NestedBlock::List(block)) = schema.block.blocks.get("timeouts") else {
            panic!("timeouts should be a list block");
        };
        let mut declared: Vec<String> = block.attributes.keys().cloned().collect();
        declared.sort();
        assert_eq!(encoded, declared);
    }
}

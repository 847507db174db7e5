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

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tf_provider::schema::AttributeType;
use tf_provider::value::{Value, ValueBool, ValueList, ValueMap, ValueNumber, ValueString};
use tf_provider::schema::{Block, Description, Schema};
use tf_provider::{map, AttributePath, Diagnostics};

use crate::ids::RedisCacheId;
use crate::provider::Clients;
use crate::resource::arm_data_source;
use crate::schema::{
    self, computed, flatten_tags, normalize_location, optional_string, required, sensitive, string, value_of,
    Refresh,
};
use crate::utils::{WithSchema, WithValidate};
use crate::validate;

use super::cache::{fetch, refresh_configuration, refresh_patch_schedule, PatchScheduleState, RedisConfigurationState};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisCacheLookup<'a> {
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub resource_group_name: ValueString<'a>,
    pub location: ValueString<'a>,
    pub zones: ValueList<ValueString<'a>>,
    pub capacity: ValueNumber,
    pub family: ValueString<'a>,
    pub sku_name: ValueString<'a>,
    pub minimum_tls_version: ValueString<'a>,
    pub shard_count: ValueNumber,
    pub non_ssl_port_enabled: ValueBool,
    pub subnet_id: ValueString<'a>,
    pub private_static_ip_address: ValueString<'a>,
    pub replicas_per_master: ValueNumber,
    pub replicas_per_primary: ValueNumber,
    pub redis_version: ValueString<'a>,
    pub hostname: ValueString<'a>,
    pub port: ValueNumber,
    pub ssl_port: ValueNumber,
    pub primary_access_key: ValueString<'a>,
    pub secondary_access_key: ValueString<'a>,
    pub primary_connection_string: ValueString<'a>,
    pub secondary_connection_string: ValueString<'a>,
    pub redis_configuration: ValueList<Value<RedisConfigurationState<'a>>>,
    pub patch_schedule: ValueList<Value<PatchScheduleState<'a>>>,
    pub tags: ValueMap<'a, ValueString<'a>>,
}

impl WithSchema for RedisCacheLookup<'_> {
    fn schema() -> Schema {
        let redis_configuration = AttributeType::List(Box::new(AttributeType::Object(map! {
            "maxclients"                      => AttributeType::Number,
            "maxmemory_delta"                 => AttributeType::Number,
            "maxmemory_reserved"              => AttributeType::Number,
            "maxmemory_policy"                => AttributeType::String,
            "maxfragmentationmemory_reserved" => AttributeType::Number,
            "rdb_backup_enabled"              => AttributeType::Bool,
            "rdb_backup_frequency"            => AttributeType::Number,
            "rdb_backup_max_snapshot_count"   => AttributeType::Number,
            "rdb_storage_connection_string"   => AttributeType::String,
            "notify_keyspace_events"          => AttributeType::String,
            "aof_backup_enabled"              => AttributeType::Bool,
            "aof_storage_connection_string_0" => AttributeType::String,
            "aof_storage_connection_string_1" => AttributeType::String,
            "authentication_enabled"          => AttributeType::Bool,
        })));
        let patch_schedule = AttributeType::List(Box::new(AttributeType::Object(map! {
            "day_of_week"        => AttributeType::String,
            "maintenance_window" => AttributeType::String,
            "start_hour_utc"     => AttributeType::Number,
        })));

        Schema {
            version: 1,
            block: Block {
                description: Description::plain("Existing Azure Cache for Redis"),
                attributes: map! {
                    "id"                          => schema::id(),
                    "name"                        => required(AttributeType::String, "Name of the cache"),
                    "resource_group_name"         => schema::resource_group_name(),
                    "location"                    => computed(AttributeType::String, "Azure region of the cache"),
                    "zones"                       => computed(schema::string_list(), "Availability zones of the cache"),
                    "capacity"                    => computed(AttributeType::Number, "Size of the cache"),
                    "family"                      => computed(AttributeType::String, "SKU family of the cache"),
                    "sku_name"                    => computed(AttributeType::String, "SKU of the cache"),
                    "minimum_tls_version"         => computed(AttributeType::String, "Minimum TLS version clients must use"),
                    "shard_count"                 => computed(AttributeType::Number, "Number of shards"),
                    "non_ssl_port_enabled"        => computed(AttributeType::Bool, "Whether the non-TLS port is open"),
                    "subnet_id"                   => computed(AttributeType::String, "Subnet the cache is deployed in"),
                    "private_static_ip_address"   => computed(AttributeType::String, "Static IP address of the cache in its subnet"),
                    "replicas_per_master"         => computed(AttributeType::Number, "Replicas of each primary"),
                    "replicas_per_primary"        => computed(AttributeType::Number, "Replicas of each primary"),
                    "redis_version"               => computed(AttributeType::String, "Redis version of the cache"),
                    "hostname"                    => computed(AttributeType::String, "Host name of the cache"),
                    "port"                        => computed(AttributeType::Number, "Non-TLS port of the cache"),
                    "ssl_port"                    => computed(AttributeType::Number, "TLS port of the cache"),
                    "primary_access_key"          => sensitive(computed(AttributeType::String, "Primary access key")),
                    "secondary_access_key"        => sensitive(computed(AttributeType::String, "Secondary access key")),
                    "primary_connection_string"   => sensitive(computed(AttributeType::String, "Connection string using the primary access key")),
                    "secondary_connection_string" => sensitive(computed(AttributeType::String, "Connection string using the secondary access key")),
                    "redis_configuration"         => sensitive(computed(redis_configuration, "Redis server settings")),
                    "patch_schedule"              => computed(patch_schedule, "Weekly windows in which Redis updates are applied"),
                    "tags"                        => computed(schema::string_map(), "Tags assigned to the cache"),
                },
                ..Default::default()
            },
        }
    }
}

impl WithValidate for RedisCacheLookup<'_> {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath) {
        validate::string(diags, attr_path.clone().attribute("name"), &self.name, validate::redis_cache_name);
        validate::string(
            diags,
            attr_path.attribute("resource_group_name"),
            &self.resource_group_name,
            validate::not_empty,
        );
    }
}

arm_data_source!(RedisCacheDataSource, RedisCacheLookup, "Redis cache");

impl RedisCacheDataSource {
    async fn read_state<'a>(&self, clients: &Clients, mut state: RedisCacheLookup<'a>) -> Result<RedisCacheLookup<'a>> {
        let id = RedisCacheId::new(
            &clients.subscription_id,
            state.resource_group_name.as_str(),
            state.name.as_str(),
        );
        let details = fetch(clients, &id)
            .await?
            .ok_or_else(|| anyhow!("{id} was not found"))?;
        let redis = &details.redis;
        let properties = &redis.properties;

        state.id = string(id.to_string());
        state.location = optional_string(redis.location.as_deref().map(normalize_location));
        state.zones = match &redis.zones {
            Some(zones) => Value::Value(zones.iter().map(|zone| string(zone.as_str())).collect()),
            None => Value::Value(Vec::new()),
        };
        let sku = properties.sku.as_ref();
        state.capacity = value_of(sku.map(|sku| sku.capacity));
        state.family = optional_string(sku.map(|sku| sku.family.as_str()));
        state.sku_name = optional_string(sku.map(|sku| sku.name.as_str()));
        state.minimum_tls_version = optional_string(properties.minimum_tls_version.clone());
        state.shard_count = Value::Value(properties.shard_count.unwrap_or(0));
        state.non_ssl_port_enabled = Value::Value(properties.enable_non_ssl_port.unwrap_or(false));
        state.subnet_id = optional_string(properties.subnet_id.clone());
        state.private_static_ip_address = optional_string(properties.static_ip.clone());
        state.replicas_per_master = value_of(properties.replicas_per_master);
        state.replicas_per_primary = value_of(properties.replicas_per_primary);
        state.redis_version = optional_string(properties.redis_version.clone());
        state.hostname = optional_string(properties.host_name.clone());
        state.port = value_of(properties.port);
        state.ssl_port = value_of(properties.ssl_port);

        state.primary_access_key = string(details.keys.primary_key.as_str());
        state.secondary_access_key = string(details.keys.secondary_key.as_str());
        let (primary, secondary) = details.connection_strings().unzip();
        state.primary_connection_string = optional_string(primary);
        state.secondary_connection_string = optional_string(secondary);

        state.redis_configuration = match &properties.redis_configuration {
            Some(input) => {
                let mut config = RedisConfigurationState::default();
                refresh_configuration(Refresh::All, &mut config, input)?;
                schema::block(config)
            }
            None => Value::Value(Vec::new()),
        };
        state.patch_schedule = Value::Value(Vec::new());
        refresh_patch_schedule(Refresh::All, &mut state.patch_schedule, details.schedule.as_ref());
        state.tags = flatten_tags(redis.tags.as_ref());
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tf_provider::DataSource;

    use crate::testing::{FakeArm, SUBSCRIPTION};

    use super::*;

    fn cache_path(name: &str) -> String {
        format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/group1/providers/Microsoft.Cache/redis/{name}")
    }

    fn lookup(name: &str) -> RedisCacheLookup<'static> {
        RedisCacheLookup {
            name: string(name),
            resource_group_name: string("group1"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn cache_lookup() {
        let fake = FakeArm::new();
        fake.insert(
            &cache_path("lookup1"),
            json!({
                "location": "North Europe",
                "zones": ["1", "2"],
                "properties": {
                    "sku": {"name": "Premium", "family": "P", "capacity": 1},
                    "hostName": "lookup1.redis.cache.windows.net",
                    "port": 6379,
                    "sslPort": 6380,
                    "enableNonSslPort": true,
                    "redisVersion": "6.0.14",
                    "redisConfiguration": {"maxclients": "7500", "maxmemory-policy": "allkeys-lru", "rdb-backup-enabled": "false"},
                },
            }),
        );
        fake.insert(
            &format!("{}/listKeys", cache_path("lookup1")),
            json!({"primaryKey": "primary", "secondaryKey": "secondary"}),
        );
        fake.insert(
            &format!("{}/patchSchedules/default", cache_path("lookup1")),
            json!({"properties": {"scheduleEntries": [{"dayOfWeek": "Sunday", "maintenanceWindow": "PT5H", "startHourUtc": 3}]}}),
        );
        let data_source = RedisCacheDataSource::new(fake.handle());
        let mut diags = Diagnostics::default();

        let state = data_source.read(&mut diags, lookup("lookup1"), Value::Null).await.unwrap();
        assert_eq!(state.id.as_str(), cache_path("lookup1"));
        assert_eq!(state.location.as_str(), "northeurope");
        assert_eq!(state.sku_name.as_str(), "Premium");
        assert_eq!(state.shard_count, Value::Value(0));
        assert_eq!(
            state.secondary_connection_string.as_str(),
            "lookup1.redis.cache.windows.net:6380,password=secondary,ssl=false,abortConnect=False"
        );

        let config = schema::single(&state.redis_configuration).unwrap();
        assert_eq!(config.maxclients, Value::Value(7500));
        assert_eq!(config.maxmemory_policy.as_str(), "allkeys-lru");
        assert_eq!(config.rdb_backup_enabled, Value::Value(false));
        assert_eq!(config.authentication_enabled, Value::Value(true));

        let schedule = schema::single(&state.patch_schedule).unwrap();
        assert_eq!(schedule.day_of_week.as_str(), "Sunday");
        assert_eq!(schedule.start_hour_utc, Value::Value(3));
    }

    #[tokio::test]
    async fn missing_cache_is_an_error() {
        let fake = FakeArm::new();
        let data_source = RedisCacheDataSource::new(fake.handle());
        let mut diags = Diagnostics::default();

        assert!(data_source.read(&mut diags, lookup("missing"), Value::Null).await.is_none());
        assert_eq!(diags.errors.len(), 1);
    }
}

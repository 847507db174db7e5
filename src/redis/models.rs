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

//! Wire shapes of the `Microsoft.Cache` API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sku {
    pub name: String,
    pub family: String,
    pub capacity: i64,
}

/// Redis cache, used for `PUT` (with a location) and `PATCH` (without)
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redis {
    #[serde(skip_serializing)]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zones: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub properties: RedisProperties,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedisProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_non_ssl_port: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_tls_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_network_access: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_configuration: Option<RedisConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas_per_master: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas_per_primary: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_settings: Option<BTreeMap<String, String>>,
    #[serde(rename = "staticIP", skip_serializing_if = "Option::is_none")]
    pub static_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
    #[serde(skip_serializing)]
    pub host_name: Option<String>,
    #[serde(skip_serializing)]
    pub port: Option<i64>,
    #[serde(skip_serializing)]
    pub ssl_port: Option<i64>,
    #[serde(skip_serializing)]
    pub provisioning_state: Option<String>,
}

/// Server settings, every value is a string on the wire
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RedisConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxclients: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxmemory_delta: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxmemory_reserved: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxmemory_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxfragmentationmemory_reserved: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rdb_backup_enabled: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rdb_backup_frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rdb_backup_max_snapshot_count: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rdb_storage_connection_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_keyspace_events: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aof_backup_enabled: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aof_storage_connection_string_0: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aof_storage_connection_string_1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authnotrequired: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeys {
    #[serde(default)]
    pub primary_key: String,
    #[serde(default)]
    pub secondary_key: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSchedule {
    #[serde(default)]
    pub properties: ScheduleEntries,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntries {
    #[serde(default)]
    pub schedule_entries: Vec<ScheduleEntry>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub day_of_week: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_window: Option<String>,
    pub start_hour_utc: i64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    #[serde(skip_serializing)]
    pub id: Option<String>,
    pub properties: FirewallRuleProperties,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRuleProperties {
    #[serde(rename = "startIP")]
    pub start_ip: String,
    #[serde(rename = "endIP")]
    pub end_ip: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedServer {
    #[serde(skip_serializing)]
    pub id: Option<String>,
    #[serde(skip_serializing)]
    pub name: Option<String>,
    pub properties: LinkedServerProperties,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LinkedServerProperties {
    pub linked_redis_cache_id: String,
    pub linked_redis_cache_location: String,
    pub server_role: String,
    #[serde(skip_serializing)]
    pub geo_replicated_primary_host_name: Option<String>,
    #[serde(skip_serializing)]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    #[serde(skip_serializing)]
    pub id: Option<String>,
    pub properties: AccessPolicyProperties,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccessPolicyProperties {
    pub permissions: String,
    #[serde(rename = "type", skip_serializing)]
    pub policy_type: Option<String>,
    #[serde(skip_serializing)]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicyAssignment {
    #[serde(skip_serializing)]
    pub id: Option<String>,
    pub properties: AccessPolicyAssignmentProperties,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccessPolicyAssignmentProperties {
    pub access_policy_name: String,
    pub object_id: String,
    pub object_id_alias: String,
    #[serde(skip_serializing)]
    pub provisioning_state: Option<String>,
}

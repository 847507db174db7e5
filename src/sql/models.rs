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

//! Wire shapes of the `Microsoft.Sql` API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sku {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<i64>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    #[serde(skip_serializing)]
    pub id: Option<String>,
    #[serde(skip_serializing)]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<ServerProperties>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub administrator_login: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub administrator_login_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimal_tls_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_network_access: Option<String>,
    #[serde(skip_serializing)]
    pub fully_qualified_domain_name: Option<String>,
    #[serde(skip_serializing)]
    pub state: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    #[serde(skip_serializing)]
    pub id: Option<String>,
    #[serde(skip_serializing)]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<DatabaseProperties>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_pause_delay: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elastic_pool_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_capacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_point_in_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_database_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recoverable_database_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restorable_dropped_database_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_availability_replica_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_scale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_backup_storage_redundancy: Option<String>,
    #[serde(skip_serializing)]
    pub current_backup_storage_redundancy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_redundant: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_ledger_on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_configuration_id: Option<String>,
    #[serde(skip_serializing)]
    pub status: Option<String>,
    #[serde(skip_serializing)]
    pub current_service_objective_name: Option<String>,
}

/// Body of `PATCH` on a database, absent fields are left unchanged
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct DatabaseUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<DatabaseProperties>,
}

/// Body of `POST .../import`, loading a bacpac into an existing database
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportDatabase {
    pub storage_key_type: String,
    pub storage_key: String,
    pub storage_uri: String,
    pub administrator_login: String,
    pub administrator_login_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_isolation: Option<NetworkIsolation>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkIsolation {
    pub storage_account_resource_id: String,
    pub sql_server_resource_id: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortTermRetentionPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<ShortTermRetentionPolicyProperties>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortTermRetentionPolicyProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_backup_interval_in_hours: Option<i64>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongTermRetentionPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<LongTermRetentionPolicyProperties>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongTermRetentionPolicyProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly_retention: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_retention: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yearly_retention: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_of_year: Option<i64>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityAlertPolicy {
    #[serde(default)]
    pub properties: SecurityAlertPolicyProperties,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAlertPolicyProperties {
    pub state: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_alerts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub email_addresses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_account_admins: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_account_access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_endpoint: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoBackupPolicy {
    #[serde(default)]
    pub properties: GeoBackupPolicyProperties,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoBackupPolicyProperties {
    pub state: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationLink {
    #[serde(default)]
    pub properties: ReplicationLinkProperties,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationLinkProperties {
    pub partner_server: Option<String>,
    pub partner_database: Option<String>,
    pub partner_location: Option<String>,
    pub role: Option<String>,
    pub partner_role: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransparentDataEncryption {
    pub properties: TransparentDataEncryptionProperties,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransparentDataEncryptionProperties {
    pub state: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElasticPool {
    #[serde(skip_serializing)]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<ElasticPoolProperties>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElasticPoolProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_database_settings: Option<PerDatabaseSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_redundant: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_configuration_id: Option<String>,
    #[serde(skip_serializing)]
    pub state: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerDatabaseSettings {
    pub min_capacity: f64,
    pub max_capacity: f64,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailoverGroup {
    #[serde(skip_serializing)]
    pub id: Option<String>,
    #[serde(skip_serializing)]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<FailoverGroupProperties>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailoverGroupProperties {
    pub read_write_endpoint: ReadWriteEndpoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only_endpoint: Option<ReadOnlyEndpoint>,
    #[serde(skip_serializing)]
    pub replication_role: Option<String>,
    #[serde(default)]
    pub partner_servers: Vec<PartnerInfo>,
    #[serde(default)]
    pub databases: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadWriteEndpoint {
    pub failover_policy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failover_with_data_loss_grace_period_minutes: Option<i64>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadOnlyEndpoint {
    pub failover_policy: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerInfo {
    pub id: String,
    #[serde(skip_serializing)]
    pub location: Option<String>,
    #[serde(skip_serializing)]
    pub replication_role: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRule {
    #[serde(skip_serializing)]
    pub id: Option<String>,
    pub properties: FirewallRuleProperties,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRuleProperties {
    pub start_ip_address: String,
    pub end_ip_address: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNetworkRule {
    #[serde(skip_serializing)]
    pub id: Option<String>,
    pub properties: VirtualNetworkRuleProperties,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNetworkRuleProperties {
    pub virtual_network_subnet_id: String,
    #[serde(default)]
    pub ignore_missing_vnet_service_endpoint: bool,
    #[serde(skip_serializing)]
    pub state: Option<String>,
}

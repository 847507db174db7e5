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
use tf_provider::schema::{AttributeType, NestedBlock};
use tf_provider::value::{Value, ValueBool, ValueList, ValueMap, ValueNumber, ValueString};
use tf_provider::schema::{Block, Description, Schema};
use tf_provider::{map, AttributePath, Diagnostics};

use crate::client::List;
use crate::error::ArmError;
use crate::ids::{MaintenanceConfigurationId, SqlDatabaseId, SqlElasticPoolId, SqlServerId};
use crate::locks::{self, LockGuard};
use crate::provider::Clients;
use crate::resource::{already_exists, arm_resource};
use crate::schema::{
    self, block_len, decimal, default_to, defaulted, elements, expand_string_set, expand_tags, flatten_tags,
    from_decimal, known, optional, optional_string, required, sensitive, single, string, value_of, Refresh,
};
use crate::timeouts::{self, Timeouts, TimeoutsState};
use crate::utils::{WithSchema, WithValidate};
use crate::validate;
use crate::wait::{self, Retry, StateChangeConf};

use super::models::{
    Database, DatabaseProperties, DatabaseUpdate, GeoBackupPolicy, GeoBackupPolicyProperties, ImportDatabase,
    LongTermRetentionPolicy, LongTermRetentionPolicyProperties, NetworkIsolation, ReplicationLink,
    SecurityAlertPolicy, SecurityAlertPolicyProperties, Server, ShortTermRetentionPolicy,
    ShortTermRetentionPolicyProperties, Sku, TransparentDataEncryption, TransparentDataEncryptionProperties,
};
use super::API_VERSION;

const TIMEOUTS: Timeouts = Timeouts::minutes(60, 5, 60, 60);

const BYTES_PER_GB: i64 = 1_073_741_824;
const DEFAULT_MAINTENANCE_CONFIGURATION: &str = "SQL_Default";
const ELASTIC_POOL_SKU: &str = "ElasticPool";

const CREATE_MODES: &[&str] = &[
    "Copy",
    "Default",
    "OnlineSecondary",
    "PointInTimeRestore",
    "Recovery",
    "Restore",
    "RestoreExternalBackup",
    "RestoreExternalBackupSecondary",
    "RestoreLongTermRetentionBackup",
    "Secondary",
];
const SECONDARY_CREATE_MODES: &[&str] = &["OnlineSecondary", "Secondary"];
const LICENSE_TYPES: &[&str] = &["BasePrice", "LicenseIncluded"];
const STORAGE_ACCOUNT_TYPES: &[&str] = &["Geo", "GeoZone", "Local", "Zone"];
const SAMPLE_NAMES: &[&str] = &["AdventureWorksLT"];
const STORAGE_KEY_TYPES: &[&str] = &["SharedAccessKey", "StorageAccessKey"];
const IMPORT_AUTHENTICATION_TYPES: &[&str] = &["ADPassword", "Sql"];
const THREAT_DETECTION_STATES: &[&str] = &["Disabled", "Enabled", "New"];
const DISABLED_ALERTS: &[&str] = &["Sql_Injection", "Sql_Injection_Vulnerability", "Access_Anomaly"];
const ENABLED_DISABLED: &[&str] = &["Disabled", "Enabled"];
const BACKUP_INTERVALS: &[i64] = &[12, 24];
const NO_RETENTION: &str = "PT0S";

/// Every database status but `Online`
const PENDING_STATUSES: &[&str] = &[
    "AutoClosed",
    "Copying",
    "Creating",
    "Disabled",
    "EmergencyMode",
    "Inaccessible",
    "Offline",
    "OfflineChangingDwPerformanceTiers",
    "OfflineSecondary",
    "OnlineChangingDwPerformanceTiers",
    "Paused",
    "Pausing",
    "Recovering",
    "RecoveryPending",
    "Restoring",
    "Resuming",
    "Scaling",
    "Shutdown",
    "Standby",
    "Starting",
    "Stopped",
    "Stopping",
    "Suspect",
];

/// Partner roles whose SKU must not fall behind the primary
const SECONDARY_ROLES: &[&str] = &["Secondary", "NonReadableSecondary"];

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportState<'a> {
    pub storage_uri: ValueString<'a>,
    pub storage_key: ValueString<'a>,
    pub storage_key_type: ValueString<'a>,
    pub administrator_login: ValueString<'a>,
    pub administrator_login_password: ValueString<'a>,
    pub authentication_type: ValueString<'a>,
    pub storage_account_id: ValueString<'a>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongTermRetentionPolicyState<'a> {
    pub weekly_retention: ValueString<'a>,
    pub monthly_retention: ValueString<'a>,
    pub yearly_retention: ValueString<'a>,
    pub week_of_year: ValueNumber,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortTermRetentionPolicyState {
    pub retention_days: ValueNumber,
    pub backup_interval_in_hours: ValueNumber,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatDetectionPolicyState<'a> {
    pub disabled_alerts: ValueList<ValueString<'a>>,
    pub email_account_admins: ValueString<'a>,
    pub email_addresses: ValueList<ValueString<'a>>,
    pub retention_days: ValueNumber,
    pub state: ValueString<'a>,
    pub storage_account_access_key: ValueString<'a>,
    pub storage_endpoint: ValueString<'a>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseState<'a> {
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub server_id: ValueString<'a>,
    pub auto_pause_delay_in_minutes: ValueNumber,
    pub create_mode: ValueString<'a>,
    pub creation_source_database_id: ValueString<'a>,
    pub collation: ValueString<'a>,
    pub elastic_pool_id: ValueString<'a>,
    pub license_type: ValueString<'a>,
    pub max_size_gb: ValueNumber,
    pub min_capacity: ValueString<'a>,
    pub restore_point_in_time: ValueString<'a>,
    pub recover_database_id: ValueString<'a>,
    pub restore_dropped_database_id: ValueString<'a>,
    pub read_replica_count: ValueNumber,
    pub read_scale: ValueBool,
    pub sample_name: ValueString<'a>,
    pub sku_name: ValueString<'a>,
    pub storage_account_type: ValueString<'a>,
    pub zone_redundant: ValueBool,
    pub ledger_enabled: ValueBool,
    pub transparent_data_encryption_enabled: ValueBool,
    pub maintenance_configuration_name: ValueString<'a>,
    pub geo_backup_enabled: ValueBool,
    pub tags: ValueMap<'a, ValueString<'a>>,
    pub import: ValueList<Value<ImportState<'a>>>,
    pub long_term_retention_policy: ValueList<Value<LongTermRetentionPolicyState<'a>>>,
    pub short_term_retention_policy: ValueList<Value<ShortTermRetentionPolicyState>>,
    pub threat_detection_policy: ValueList<Value<ThreatDetectionPolicyState<'a>>>,
    pub timeouts: ValueList<Value<TimeoutsState<'a>>>,
}

impl WithSchema for DatabaseState<'_> {
    fn schema() -> Schema {
        let import = NestedBlock::List(Block {
            description: Description::plain("Bacpac loaded into the database once created, at most one block"),
            attributes: map! {
                "storage_uri"                  => required(AttributeType::String, "Blob URI of the bacpac file"),
                "storage_key"                  => sensitive(required(AttributeType::String, "Key of the storage account holding the bacpac")),
                "storage_key_type"             => required(AttributeType::String, "SharedAccessKey or StorageAccessKey"),
                "administrator_login"          => required(AttributeType::String, "Login of the server administrator"),
                "administrator_login_password" => sensitive(required(AttributeType::String, "Password of the server administrator")),
                "authentication_type"          => required(AttributeType::String, "ADPassword or Sql"),
                "storage_account_id"           => optional(AttributeType::String, "Storage account reached through a private link during the import"),
            },
            ..Default::default()
        });
        let long_term_retention_policy = NestedBlock::List(Block {
            description: Description::plain("Long term backup retention, at most one block"),
            attributes: map! {
                "weekly_retention"  => defaulted(AttributeType::String, "ISO 8601 duration weekly backups are kept, 1 to 520 weeks (default: PT0S)"),
                "monthly_retention" => defaulted(AttributeType::String, "ISO 8601 duration monthly backups are kept, 1 to 120 months (default: PT0S)"),
                "yearly_retention"  => defaulted(AttributeType::String, "ISO 8601 duration yearly backups are kept, 1 to 10 years (default: PT0S)"),
                "week_of_year"      => defaulted(AttributeType::Number, "Week of the year whose backup is kept yearly, 1 to 52"),
            },
            ..Default::default()
        });
        let short_term_retention_policy = NestedBlock::List(Block {
            description: Description::plain("Point in time restore retention, at most one block"),
            attributes: map! {
                "retention_days"           => required(AttributeType::Number, "Days backups are kept, 1 to 35"),
                "backup_interval_in_hours" => defaulted(AttributeType::Number, "Hours between differential backups, 12 or 24"),
            },
            ..Default::default()
        });
        let threat_detection_policy = NestedBlock::List(Block {
            description: Description::plain("Threat detection alerts of the database, at most one block"),
            attributes: map! {
                "disabled_alerts"            => optional(schema::string_set(), "Alerts not raised: Sql_Injection, Sql_Injection_Vulnerability or Access_Anomaly"),
                "email_account_admins"       => defaulted(AttributeType::String, "Send alerts to the account administrators: Enabled or Disabled (default: Disabled)"),
                "email_addresses"            => optional(schema::string_set(), "Addresses alerts are sent to"),
                "retention_days"             => optional(AttributeType::Number, "Days the audit logs are kept"),
                "state"                      => defaulted(AttributeType::String, "Disabled, Enabled or New (default: Disabled)"),
                "storage_account_access_key" => sensitive(optional(AttributeType::String, "Key of the storage account receiving the audit logs")),
                "storage_endpoint"           => optional(AttributeType::String, "Blob endpoint receiving the audit logs"),
            },
            ..Default::default()
        });

        Schema {
            version: 1,
            block: Block {
                description: Description::plain("Database of an Azure SQL server"),
                attributes: map! {
                    "id"                                  => schema::id(),
                    "name"                                => required(AttributeType::String, "Name of the database"),
                    "server_id"                           => required(AttributeType::String, "ID of the SQL server hosting the database"),
                    "auto_pause_delay_in_minutes"         => defaulted(AttributeType::Number, "Minutes of inactivity before a serverless database is paused, -1 to disable"),
                    "create_mode"                         => defaulted(AttributeType::String, "How the database is created (default: Default)"),
                    "creation_source_database_id"         => optional(AttributeType::String, "Database copied, restored or replicated by the create mode"),
                    "collation"                           => defaulted(AttributeType::String, "Collation of the database"),
                    "elastic_pool_id"                     => optional(AttributeType::String, "Elastic pool hosting the database"),
                    "license_type"                        => defaulted(AttributeType::String, "BasePrice or LicenseIncluded"),
                    "max_size_gb"                         => defaulted(AttributeType::Number, "Maximum size of the database in gigabytes"),
                    "min_capacity"                        => defaulted(AttributeType::String, "Minimal vCores of a serverless database, as a decimal number"),
                    "restore_point_in_time"               => optional(AttributeType::String, "RFC 3339 point in time restored by PointInTimeRestore"),
                    "recover_database_id"                 => optional(AttributeType::String, "Geo-replicated backup recovered by Recovery"),
                    "restore_dropped_database_id"         => optional(AttributeType::String, "Dropped database restored by Restore"),
                    "read_replica_count"                  => defaulted(AttributeType::Number, "Number of high availability read replicas"),
                    "read_scale"                          => defaulted(AttributeType::Bool, "Route read-only connections to a replica"),
                    "sample_name"                         => optional(AttributeType::String, "Sample schema loaded into the database"),
                    "sku_name"                            => defaulted(AttributeType::String, "Service objective such as S0, GP_Gen5_2 or ElasticPool"),
                    "storage_account_type"                => defaulted(AttributeType::String, "Backup storage redundancy: Geo, GeoZone, Local or Zone (default: Geo)"),
                    "zone_redundant"                      => defaulted(AttributeType::Bool, "Spread the replicas across availability zones"),
                    "ledger_enabled"                      => defaulted(AttributeType::Bool, "Make every table of the database a ledger table (default: false)"),
                    "transparent_data_encryption_enabled" => defaulted(AttributeType::Bool, "Encrypt the database at rest (default: true)"),
                    "maintenance_configuration_name"      => defaulted(AttributeType::String, "Public maintenance configuration (default: SQL_Default)"),
                    "geo_backup_enabled"                  => defaulted(AttributeType::Bool, "Keep geo-redundant backups, Data Warehouse SKUs only (default: true)"),
                    "tags"                                => schema::tags(),
                },
                blocks: map! {
                    "import"                      => import,
                    "long_term_retention_policy"  => long_term_retention_policy,
                    "short_term_retention_policy" => short_term_retention_policy,
                    "threat_detection_policy"     => threat_detection_policy,
                    "timeouts"                    => timeouts::schema(TIMEOUTS, true),
                },
                ..Default::default()
            },
        }
    }
}

fn is_secondary(create_mode: &ValueString<'_>) -> bool {
    known(create_mode).is_some_and(|mode| SECONDARY_CREATE_MODES.contains(&mode))
}

impl WithValidate for DatabaseState<'_> {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath) {
        let attribute = |name: &'static str| attr_path.clone().attribute(name);

        validate::string(diags, attribute("name"), &self.name, validate::sql_database_name);
        validate::string(
            diags,
            attribute("server_id"),
            &self.server_id,
            validate::resource_id(SqlServerId::parse),
        );
        validate::string(diags, attribute("create_mode"), &self.create_mode, validate::one_of(CREATE_MODES, false));
        for (name, value) in [
            ("creation_source_database_id", &self.creation_source_database_id),
            ("recover_database_id", &self.recover_database_id),
            ("restore_dropped_database_id", &self.restore_dropped_database_id),
        ] {
            validate::string(diags, attribute(name), value, validate::not_empty);
        }
        validate::string(
            diags,
            attribute("elastic_pool_id"),
            &self.elastic_pool_id,
            validate::resource_id(SqlElasticPoolId::parse),
        );
        validate::string(diags, attribute("license_type"), &self.license_type, validate::one_of(LICENSE_TYPES, false));
        validate::string(diags, attribute("min_capacity"), &self.min_capacity, validate::decimal);
        validate::string(diags, attribute("restore_point_in_time"), &self.restore_point_in_time, validate::rfc3339);
        validate::string(diags, attribute("sample_name"), &self.sample_name, validate::one_of(SAMPLE_NAMES, false));
        validate::string(
            diags,
            attribute("storage_account_type"),
            &self.storage_account_type,
            validate::one_of(STORAGE_ACCOUNT_TYPES, false),
        );
        validate::number(diags, attribute("read_replica_count"), &self.read_replica_count, 0, 4);
        validate::number(diags, attribute("max_size_gb"), &self.max_size_gb, 1, 4096);
        if let Value::Value(delay) = self.auto_pause_delay_in_minutes {
            if delay != -1 {
                validate::number(diags, attribute("auto_pause_delay_in_minutes"), &Value::Value(delay), 60, 10080);
            }
        }

        let sku_name = known(&self.sku_name);
        if sku_name.is_some_and(|sku| sku.starts_with("GP_S_")) && known(&self.license_type).is_some() {
            diags.error(
                "Invalid license type",
                "serverless databases do not support license type",
                attribute("license_type"),
            );
        }
        if self.transparent_data_encryption_enabled == Value::Value(false)
            && sku_name.is_some_and(|sku| !sku.starts_with("DW"))
        {
            diags.error(
                "Invalid transparent data encryption",
                "transparent data encryption can only be disabled on Data Warehouse SKUs",
                attribute("transparent_data_encryption_enabled"),
            );
        }
        if known(&self.elastic_pool_id).is_some() && known(&self.maintenance_configuration_name).is_some() {
            diags.error(
                "Conflicting maintenance configuration",
                "`maintenance_configuration_name` is inherited from the elastic pool when `elastic_pool_id` is set",
                attribute("maintenance_configuration_name"),
            );
        }

        if let Some(mode) = known(&self.create_mode) {
            let source = match mode {
                "Copy" | "PointInTimeRestore" | "Secondary" => Some(("creation_source_database_id", &self.creation_source_database_id)),
                "Recovery" => Some(("recover_database_id", &self.recover_database_id)),
                "Restore" => Some(("restore_dropped_database_id", &self.restore_dropped_database_id)),
                _ => None,
            };
            if let Some((name, value)) = source {
                if value.is_null() {
                    diags.error(
                        format!("Missing `{name}`"),
                        format!("`{name}` is required for create_mode {mode}"),
                        attribute(name),
                    );
                }
            }
            if mode != "PointInTimeRestore" && !self.restore_point_in_time.is_null() {
                diags.error(
                    "Unexpected `restore_point_in_time`",
                    "`restore_point_in_time` is supported only for create_mode PointInTimeRestore",
                    attribute("restore_point_in_time"),
                );
            }
            if block_len(&self.import).unwrap_or(0) > 0 {
                diags.error(
                    "Conflicting `import`",
                    "`import` cannot be used together with `create_mode`",
                    attribute("import"),
                );
            }
        }

        for (name, len) in [
            ("import", block_len(&self.import)),
            ("long_term_retention_policy", block_len(&self.long_term_retention_policy)),
            ("short_term_retention_policy", block_len(&self.short_term_retention_policy)),
            ("threat_detection_policy", block_len(&self.threat_detection_policy)),
        ] {
            if len.unwrap_or(0) > 1 {
                diags.error(
                    format!("Too many `{name}` blocks"),
                    format!("at most one `{name}` block is allowed"),
                    attribute(name),
                );
            }
        }

        for (index, import) in elements(&self.import).enumerate() {
            let path = attribute("import").index(index as i64);
            validate::string(diags, path.clone().attribute("storage_uri"), &import.storage_uri, validate::not_empty);
            validate::string(
                diags,
                path.clone().attribute("storage_key_type"),
                &import.storage_key_type,
                validate::one_of(STORAGE_KEY_TYPES, false),
            );
            validate::string(
                diags,
                path.clone().attribute("authentication_type"),
                &import.authentication_type,
                validate::one_of(IMPORT_AUTHENTICATION_TYPES, false),
            );
            validate::string(
                diags,
                path.attribute("storage_account_id"),
                &import.storage_account_id,
                validate::not_empty,
            );
        }

        for (index, policy) in elements(&self.long_term_retention_policy).enumerate() {
            let path = attribute("long_term_retention_policy").index(index as i64);
            for (name, value) in [
                ("weekly_retention", &policy.weekly_retention),
                ("monthly_retention", &policy.monthly_retention),
                ("yearly_retention", &policy.yearly_retention),
            ] {
                validate::string(diags, path.clone().attribute(name), value, validate::iso8601_duration);
            }
            validate::number(diags, path.attribute("week_of_year"), &policy.week_of_year, 1, 52);
        }

        for (index, policy) in elements(&self.short_term_retention_policy).enumerate() {
            let path = attribute("short_term_retention_policy").index(index as i64);
            validate::number(diags, path.clone().attribute("retention_days"), &policy.retention_days, 1, 35);
            if let Value::Value(hours) = policy.backup_interval_in_hours {
                if !BACKUP_INTERVALS.contains(&hours) {
                    diags.error(
                        "Invalid `backup_interval_in_hours`",
                        "expected one of: 12, 24",
                        path.attribute("backup_interval_in_hours"),
                    );
                }
            }
        }

        for (index, policy) in elements(&self.threat_detection_policy).enumerate() {
            let path = attribute("threat_detection_policy").index(index as i64);
            for (alert_index, alert) in elements(&policy.disabled_alerts).enumerate() {
                if let Err(err) = validate::one_of(DISABLED_ALERTS, false)(&**alert) {
                    diags.error(
                        "Invalid `disabled_alerts`",
                        err,
                        path.clone().attribute("disabled_alerts").index(alert_index as i64),
                    );
                }
            }
            validate::string(
                diags,
                path.clone().attribute("email_account_admins"),
                &policy.email_account_admins,
                validate::one_of(ENABLED_DISABLED, false),
            );
            validate::string(
                diags,
                path.clone().attribute("state"),
                &policy.state,
                validate::one_of(THREAT_DETECTION_STATES, false),
            );
            if matches!(policy.retention_days, Value::Value(days) if days < 0) {
                diags.error(
                    "Invalid `retention_days`",
                    "expected a positive number of days",
                    path.attribute("retention_days"),
                );
            }
        }

        timeouts::validate(diags, &self.timeouts);
    }
}

fn expand(state: &DatabaseState<'_>, server_id: &SqlServerId, location: String) -> Database {
    let sku = known(&state.sku_name).map(|name| Sku {
        name: name.to_owned(),
        ..Default::default()
    });
    let max_size_bytes = if is_secondary(&state.create_mode) {
        None
    } else {
        state.max_size_gb.as_ref_option().map(|gb| gb * BYTES_PER_GB)
    };
    let maintenance_configuration_id = match known(&state.elastic_pool_id) {
        Some(_) => None,
        None => Some(maintenance_configuration(state, server_id)),
    };
    let owned = |value: &ValueString<'_>| known(value).map(str::to_owned);

    Database {
        location: Some(location),
        tags: expand_tags(&state.tags),
        sku,
        properties: Some(DatabaseProperties {
            auto_pause_delay: state.auto_pause_delay_in_minutes.as_ref_option().copied(),
            collation: owned(&state.collation),
            create_mode: owned(&state.create_mode),
            elastic_pool_id: owned(&state.elastic_pool_id),
            license_type: owned(&state.license_type),
            max_size_bytes,
            min_capacity: decimal(&state.min_capacity),
            restore_point_in_time: owned(&state.restore_point_in_time),
            source_database_id: owned(&state.creation_source_database_id),
            recoverable_database_id: owned(&state.recover_database_id),
            restorable_dropped_database_id: owned(&state.restore_dropped_database_id),
            high_availability_replica_count: state.read_replica_count.as_ref_option().copied(),
            read_scale: expand_read_scale(state),
            sample_name: owned(&state.sample_name),
            requested_backup_storage_redundancy: owned(&state.storage_account_type),
            zone_redundant: state.zone_redundant.as_ref_option().copied(),
            is_ledger_on: Some(state.ledger_enabled.as_ref_option().copied().unwrap_or(false)),
            maintenance_configuration_id,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn maintenance_configuration(state: &DatabaseState<'_>, server_id: &SqlServerId) -> String {
    let name = known(&state.maintenance_configuration_name).unwrap_or(DEFAULT_MAINTENANCE_CONFIGURATION);
    MaintenanceConfigurationId::new(&server_id.subscription_id, name).to_string()
}

/// Body of the `PATCH` applying the changes between `prior` and `state`
fn expand_update(prior: &DatabaseState<'_>, state: &DatabaseState<'_>, server_id: &SqlServerId) -> DatabaseUpdate {
    let owned = |value: &ValueString<'_>| known(value).map(str::to_owned);
    let mut properties = DatabaseProperties::default();

    if state.auto_pause_delay_in_minutes != prior.auto_pause_delay_in_minutes {
        properties.auto_pause_delay = state.auto_pause_delay_in_minutes.as_ref_option().copied();
    }
    if state.elastic_pool_id != prior.elastic_pool_id {
        // An empty ID moves the database out of its pool
        properties.elastic_pool_id = Some(owned(&state.elastic_pool_id).unwrap_or_default());
    }
    if state.license_type != prior.license_type {
        properties.license_type = owned(&state.license_type);
    }
    if state.min_capacity != prior.min_capacity {
        properties.min_capacity = decimal(&state.min_capacity);
    }
    if state.read_replica_count != prior.read_replica_count {
        properties.high_availability_replica_count = state.read_replica_count.as_ref_option().copied();
    }
    if state.storage_account_type != prior.storage_account_type {
        properties.requested_backup_storage_redundancy = owned(&state.storage_account_type);
    }
    if state.zone_redundant != prior.zone_redundant {
        properties.zone_redundant = state.zone_redundant.as_ref_option().copied();
    }
    if known(&state.elastic_pool_id).is_none()
        && state.maintenance_configuration_name != prior.maintenance_configuration_name
    {
        properties.maintenance_configuration_id = Some(maintenance_configuration(state, server_id));
    }
    if state.max_size_gb != prior.max_size_gb && !is_secondary(&state.create_mode) {
        properties.max_size_bytes = state.max_size_gb.as_ref_option().map(|gb| gb * BYTES_PER_GB);
    }
    if state.read_scale != prior.read_scale {
        properties.read_scale = expand_read_scale(state);
    }
    if state.restore_point_in_time != prior.restore_point_in_time {
        properties.restore_point_in_time = owned(&state.restore_point_in_time);
    }

    let sku = known(&state.sku_name)
        .filter(|_| state.sku_name != prior.sku_name)
        .map(|name| Sku {
            name: name.to_owned(),
            ..Default::default()
        });
    let tags = (state.tags != prior.tags).then(|| expand_tags(&state.tags).unwrap_or_default());

    DatabaseUpdate {
        sku,
        tags,
        properties: Some(properties).filter(|properties| *properties != DatabaseProperties::default()),
    }
}

fn expand_read_scale(state: &DatabaseState<'_>) -> Option<String> {
    state
        .read_scale
        .as_ref_option()
        .map(|enabled| if *enabled { "Enabled" } else { "Disabled" }.to_owned())
}

fn is_warehouse(state: &DatabaseState<'_>) -> bool {
    known(&state.sku_name).is_some_and(|sku| sku.to_ascii_uppercase().starts_with("DW"))
}

fn expand_import(state: &DatabaseState<'_>, server_id: &SqlServerId) -> Option<ImportDatabase> {
    let import = single(&state.import)?;
    let owned = |value: &ValueString<'_>| value.as_deref_option().unwrap_or_default().to_owned();
    Some(ImportDatabase {
        storage_key_type: owned(&import.storage_key_type),
        storage_key: owned(&import.storage_key),
        storage_uri: owned(&import.storage_uri),
        administrator_login: owned(&import.administrator_login),
        administrator_login_password: owned(&import.administrator_login_password),
        authentication_type: known(&import.authentication_type).map(str::to_owned),
        network_isolation: known(&import.storage_account_id).map(|storage_account_id| NetworkIsolation {
            storage_account_resource_id: storage_account_id.to_owned(),
            sql_server_resource_id: server_id.to_string(),
        }),
    })
}

/// Data Warehouse SKUs take no retention settings, the policy is written empty
fn expand_long_term_retention(state: &DatabaseState<'_>) -> Option<LongTermRetentionPolicy> {
    let policy = single(&state.long_term_retention_policy)?;
    let duration = |value: &ValueString<'_>| Some(known(value).unwrap_or(NO_RETENTION).to_owned());
    Some(LongTermRetentionPolicy {
        properties: (!is_warehouse(state)).then(|| LongTermRetentionPolicyProperties {
            weekly_retention: duration(&policy.weekly_retention),
            monthly_retention: duration(&policy.monthly_retention),
            yearly_retention: duration(&policy.yearly_retention),
            week_of_year: policy.week_of_year.as_ref_option().copied(),
        }),
    })
}

/// Hyperscale takes no differential backup interval
fn expand_short_term_retention(state: &DatabaseState<'_>) -> Option<ShortTermRetentionPolicy> {
    let policy = single(&state.short_term_retention_policy)?;
    let hyperscale = known(&state.sku_name).is_some_and(|sku| sku.to_ascii_uppercase().starts_with("HS"));
    Some(ShortTermRetentionPolicy {
        properties: (!is_warehouse(state)).then(|| ShortTermRetentionPolicyProperties {
            retention_days: policy.retention_days.as_ref_option().copied(),
            diff_backup_interval_in_hours: policy
                .backup_interval_in_hours
                .as_ref_option()
                .copied()
                .filter(|_| !hyperscale),
        }),
    })
}

/// Threat detection is disabled when the block is absent
fn expand_threat_detection(state: &DatabaseState<'_>) -> SecurityAlertPolicy {
    let Some(policy) = single(&state.threat_detection_policy) else {
        return SecurityAlertPolicy {
            properties: SecurityAlertPolicyProperties {
                state: "Disabled".to_owned(),
                ..Default::default()
            },
        };
    };
    let owned = |value: &ValueString<'_>| known(value).map(str::to_owned);
    SecurityAlertPolicy {
        properties: SecurityAlertPolicyProperties {
            state: known(&policy.state).unwrap_or("Disabled").to_owned(),
            disabled_alerts: expand_string_set(&policy.disabled_alerts),
            email_addresses: expand_string_set(&policy.email_addresses),
            email_account_admins: Some(known(&policy.email_account_admins) == Some("Enabled")),
            retention_days: policy.retention_days.as_ref_option().copied(),
            storage_account_access_key: owned(&policy.storage_account_access_key),
            storage_endpoint: owned(&policy.storage_endpoint),
        },
    }
}

/// Keep the state value when the API omits an attribute, unknowns become null
fn keep_when_missing<T>(mode: Refresh, field: &mut Value<T>, value: Option<T>) {
    match value {
        Some(value) => mode.set(field, Value::Value(value)),
        None if field.is_unknown() => *field = Value::Null,
        None => (),
    }
}

fn refresh(
    state: &mut DatabaseState<'_>,
    id: &SqlDatabaseId,
    database: &Database,
    mode: Refresh,
) {
    mode.set(&mut state.name, string(&id.database_name));
    mode.set(&mut state.server_id, string(id.server_id().to_string()));
    mode.set(&mut state.tags, flatten_tags(database.tags.as_ref()));

    let properties = database.properties.clone().unwrap_or_default();
    mode.set(&mut state.auto_pause_delay_in_minutes, value_of(properties.auto_pause_delay));
    mode.set(&mut state.collation, optional_string(properties.collation));
    mode.set_ignoring_case(&mut state.elastic_pool_id, properties.elastic_pool_id.as_deref());
    keep_when_missing(mode, &mut state.license_type, properties.license_type.map(Into::into));
    mode.set(
        &mut state.max_size_gb,
        value_of(properties.max_size_bytes.map(|bytes| bytes / BYTES_PER_GB)),
    );
    if state.min_capacity.is_unknown() || decimal(&state.min_capacity) != properties.min_capacity {
        mode.set(&mut state.min_capacity, from_decimal(properties.min_capacity));
    }
    mode.set(
        &mut state.read_replica_count,
        value_of(properties.high_availability_replica_count),
    );
    let read_scale = match properties.read_scale.as_deref() {
        Some("Enabled") => Some(true),
        Some("Disabled") => Some(false),
        _ => None,
    };
    keep_when_missing(mode, &mut state.read_scale, read_scale);

    let sku_name = properties
        .current_service_objective_name
        .or_else(|| database.sku.as_ref().map(|sku| sku.name.clone()));
    mode.set(&mut state.sku_name, optional_string(sku_name));
    let redundancy = properties
        .current_backup_storage_redundancy
        .or(properties.requested_backup_storage_redundancy);
    mode.set(&mut state.storage_account_type, optional_string(redundancy));
    mode.set(&mut state.zone_redundant, value_of(properties.zone_redundant));
    mode.set(
        &mut state.ledger_enabled,
        Value::Value(properties.is_ledger_on.unwrap_or(false)),
    );

    let maintenance = properties
        .maintenance_configuration_id
        .as_deref()
        .and_then(|id| MaintenanceConfigurationId::parse_insensitively(id).ok())
        .map(|id| id.name);
    mode.set_ignoring_case(&mut state.maintenance_configuration_name, maintenance.as_deref());
}

/// Rank of the service tier of a SKU, replication requires secondaries to be at least as high
fn service_tier(sku_name: &str) -> u8 {
    let sku = sku_name.to_ascii_uppercase();
    if sku == "FREE" {
        0
    } else if sku == "BASIC" {
        1
    } else if sku.starts_with("GP_") {
        4
    } else if sku.starts_with("BC_") {
        5
    } else if sku.starts_with("HS_") {
        6
    } else if sku.starts_with("DW") {
        7
    } else if sku.starts_with('S') {
        2
    } else if sku.starts_with('P') {
        3
    } else {
        0
    }
}

/// Databases replicating from `id` in one of the secondary roles
async fn secondary_partners(clients: &Clients, id: &SqlDatabaseId) -> Result<Vec<(SqlDatabaseId, Database)>> {
    let links: List<ReplicationLink> = clients
        .arm
        .get_optional(&format!("{id}/replicationLinks"), API_VERSION)
        .await
        .with_context(|| format!("listing replication links of {id}"))?
        .unwrap_or(List { value: Vec::new() });

    let mut partners = Vec::new();
    for link in links.value {
        let properties = link.properties;
        let role = properties.partner_role.as_deref().unwrap_or_default();
        let (Some(server), Some(database)) = (properties.partner_server, properties.partner_database) else {
            continue;
        };
        if !SECONDARY_ROLES.contains(&role) {
            continue;
        }

        // Partners are looked up in the resource group of the primary
        let partner_id = SqlDatabaseId::new(&id.subscription_id, &id.resource_group_name, server, database);
        let partner: Option<Database> = clients
            .arm
            .get_optional(&partner_id.to_string(), API_VERSION)
            .await
            .with_context(|| format!("retrieving replication partner {partner_id}"))?;
        match partner {
            Some(partner) => partners.push((partner_id, partner)),
            None => tracing::warn!(%partner_id, "replication partner not found"),
        }
    }
    Ok(partners)
}

/// Raise the SKU of partners belonging to a lower service tier than `sku_name`
async fn upgrade_partners(
    clients: &Clients,
    partners: &[(SqlDatabaseId, Database)],
    sku_name: &str,
    timeout: Duration,
) -> Result<()> {
    for (partner_id, partner) in partners {
        let Some(current) = partner.sku.as_ref().map(|sku| sku.name.as_str()) else {
            continue;
        };
        if service_tier(sku_name) <= service_tier(current) {
            continue;
        }

        tracing::info!(%partner_id, from = current, to = sku_name, "raising the SKU of a replication partner");
        let update = DatabaseUpdate {
            sku: Some(Sku {
                name: sku_name.to_owned(),
                ..Default::default()
            }),
            ..Default::default()
        };
        clients
            .arm
            .patch_then_poll::<_, Database>(&partner_id.to_string(), API_VERSION, &update, timeout)
            .await
            .with_context(|| format!("updating SKU of replication partner {partner_id}"))?;
    }
    Ok(())
}

/// Lock the secondary partners of `id`, in ID order, and raise their SKU to `sku_name` when needed
async fn lock_and_upgrade_partners(
    clients: &Clients,
    id: &SqlDatabaseId,
    sku_name: &str,
    timeout: Duration,
) -> Result<Vec<LockGuard>> {
    let mut partners = secondary_partners(clients, id).await?;
    partners.sort_by(|(a, _), (b, _)| a.cmp(b));
    let mut guards = Vec::with_capacity(partners.len());
    for (partner_id, _) in &partners {
        guards.push(locks::by_id(&partner_id.to_string()).await);
    }
    upgrade_partners(clients, &partners, sku_name, timeout).await?;
    Ok(guards)
}

async fn wait_until_online(clients: &Clients, id: &SqlDatabaseId, timeout: Duration) -> Result<Database> {
    let path = id.to_string();
    let path = path.as_str();
    StateChangeConf::new(PENDING_STATUSES, &["Online"])
        .min_timeout(Duration::from_secs(60))
        .continuous_target_occurence(2)
        .timeout(timeout)
        .wait_for_state(move || async move {
            tracing::debug!(%id, "checking whether the database is online");
            let database = clients.arm.get::<Database>(path, API_VERSION).await?;
            let status = database
                .properties
                .as_ref()
                .and_then(|properties| properties.status.clone())
                .unwrap_or_default();
            Ok::<_, ArmError>(Some((database, status)))
        })
        .await
        .with_context(|| format!("waiting for {id} to become ready"))
}

async fn set_encryption(clients: &Clients, id: &SqlDatabaseId, enabled: bool, timeout: Duration) -> Result<()> {
    let body = TransparentDataEncryption {
        properties: TransparentDataEncryptionProperties {
            state: if enabled { "Enabled" } else { "Disabled" }.to_owned(),
        },
    };
    clients
        .arm
        .put::<_, serde_json::Value>(&format!("{id}/transparentDataEncryption/current"), API_VERSION, &body)
        .await
        .with_context(|| format!("setting transparent data encryption of {id}"))?;

    let path = id.to_string();
    let path = path.as_str();
    wait::retry(timeout, move || async move {
        match clients.arm.get::<Database>(path, API_VERSION).await {
            Ok(database) => {
                let status = database.properties.and_then(|properties| properties.status);
                if status.as_deref() == Some("Scaling") {
                    Err(Retry::Retryable(anyhow!("{id} is still scaling")))
                } else {
                    Ok(())
                }
            }
            Err(err) => Err(Retry::NonRetryable(
                anyhow::Error::from(err).context(format!("polling {id} for status")),
            )),
        }
    })
    .await
}

async fn read_encryption(clients: &Clients, id: &SqlDatabaseId) -> Result<Option<bool>> {
    let encryption: Option<TransparentDataEncryption> = clients
        .arm
        .get_optional(&format!("{id}/transparentDataEncryption/current"), API_VERSION)
        .await
        .with_context(|| format!("retrieving transparent data encryption of {id}"))?;
    Ok(encryption.map(|encryption| encryption.properties.state.eq_ignore_ascii_case("Enabled")))
}

async fn set_geo_backup(clients: &Clients, id: &SqlDatabaseId, enabled: bool) -> Result<()> {
    let body = GeoBackupPolicy {
        properties: GeoBackupPolicyProperties {
            state: if enabled { "Enabled" } else { "Disabled" }.to_owned(),
        },
    };
    clients
        .arm
        .put::<_, serde_json::Value>(&format!("{id}/geoBackupPolicies/Default"), API_VERSION, &body)
        .await
        .with_context(|| format!("setting Geo Backup Policies for {id}"))?;
    Ok(())
}

/// The policy cannot be written until the database is visible to it
async fn set_threat_detection(
    clients: &Clients,
    id: &SqlDatabaseId,
    policy: &SecurityAlertPolicy,
    timeout: Duration,
) -> Result<()> {
    let path = format!("{id}/securityAlertPolicies/default");
    let path = path.as_str();
    wait::retry(timeout, move || async move {
        match clients.arm.put::<_, serde_json::Value>(path, API_VERSION, policy).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => Err(Retry::Retryable(anyhow!("{id} is still creating"))),
            Err(err) => Err(Retry::NonRetryable(
                anyhow::Error::from(err).context(format!("setting database threat detection policy for {id}")),
            )),
        }
    })
    .await
}

async fn set_long_term_retention(
    clients: &Clients,
    id: &SqlDatabaseId,
    policy: &LongTermRetentionPolicy,
    timeout: Duration,
) -> Result<()> {
    clients
        .arm
        .put_then_poll::<_, serde_json::Value>(
            &format!("{id}/backupLongTermRetentionPolicies/default"),
            API_VERSION,
            policy,
            timeout,
        )
        .await
        .with_context(|| format!("setting Long Term Retention Policies for {id}"))?;
    Ok(())
}

async fn set_short_term_retention(
    clients: &Clients,
    id: &SqlDatabaseId,
    policy: &ShortTermRetentionPolicy,
    timeout: Duration,
) -> Result<()> {
    clients
        .arm
        .put_then_poll::<_, serde_json::Value>(
            &format!("{id}/backupShortTermRetentionPolicies/default"),
            API_VERSION,
            policy,
            timeout,
        )
        .await
        .with_context(|| format!("setting Short Term Retention Policies for {id}"))?;
    Ok(())
}

async fn import_bacpac(clients: &Clients, id: &SqlDatabaseId, body: &ImportDatabase, timeout: Duration) -> Result<()> {
    tracing::info!(%id, uri = %body.storage_uri, "importing bacpac");
    clients
        .arm
        .post_then_poll(&format!("{id}/import"), API_VERSION, body, timeout)
        .await
        .with_context(|| format!("importing bacpac into {id}"))
}

/// Settings of a database held by its child resources
#[derive(Debug, Default)]
struct Settings {
    encryption: Option<bool>,
    geo_backup: Option<bool>,
    long_term_retention: Option<LongTermRetentionPolicy>,
    short_term_retention: Option<ShortTermRetentionPolicy>,
    threat_detection: Option<SecurityAlertPolicy>,
}

async fn read_settings(clients: &Clients, id: &SqlDatabaseId, warehouse: bool) -> Result<Settings> {
    let mut settings = Settings {
        encryption: read_encryption(clients, id).await?,
        ..Default::default()
    };
    settings.threat_detection = clients
        .arm
        .get_optional(&format!("{id}/securityAlertPolicies/default"), API_VERSION)
        .await
        .with_context(|| format!("retrieving Security Alert Policy for {id}"))?;

    // Data Warehouse SKUs have no retention policies but a geo backup policy
    if warehouse {
        let policy: Option<GeoBackupPolicy> = clients
            .arm
            .get_optional(&format!("{id}/geoBackupPolicies/Default"), API_VERSION)
            .await
            .with_context(|| format!("retrieving Geo Backup Policies for {id}"))?;
        settings.geo_backup = Some(policy.map_or(true, |policy| policy.properties.state != "Disabled"));
    } else {
        settings.long_term_retention = clients
            .arm
            .get_optional(&format!("{id}/backupLongTermRetentionPolicies/default"), API_VERSION)
            .await
            .with_context(|| format!("retrieving Long Term Retention Policies for {id}"))?;
        settings.short_term_retention = clients
            .arm
            .get_optional(&format!("{id}/backupShortTermRetentionPolicies/default"), API_VERSION)
            .await
            .with_context(|| format!("retrieving Short Term Retention Policies for {id}"))?;
    }
    Ok(settings)
}

/// Policy blocks are refreshed only when configured, the API always answers its defaults
fn refresh_settings<'a>(mode: Refresh, state: &mut DatabaseState<'a>, settings: Settings, warehouse: bool) {
    keep_when_missing(mode, &mut state.transparent_data_encryption_enabled, settings.encryption);
    keep_when_missing(mode, &mut state.geo_backup_enabled, settings.geo_backup);

    if warehouse {
        let empty = schema::empty_like(&state.long_term_retention_policy);
        mode.set(&mut state.long_term_retention_policy, empty);
        let empty = schema::empty_like(&state.short_term_retention_policy);
        mode.set(&mut state.short_term_retention_policy, empty);
    }

    if let Some(properties) = settings.long_term_retention.and_then(|policy| policy.properties) {
        for policy in schema::elements_mut(&mut state.long_term_retention_policy) {
            let duration = |value: Option<String>| string(value.unwrap_or_else(|| NO_RETENTION.to_owned()));
            mode.set(&mut policy.weekly_retention, duration(properties.weekly_retention.clone()));
            mode.set(&mut policy.monthly_retention, duration(properties.monthly_retention.clone()));
            mode.set(&mut policy.yearly_retention, duration(properties.yearly_retention.clone()));
            mode.set(&mut policy.week_of_year, value_of(properties.week_of_year));
        }
    }

    if let Some(properties) = settings.short_term_retention.and_then(|policy| policy.properties) {
        for policy in schema::elements_mut(&mut state.short_term_retention_policy) {
            mode.set(&mut policy.retention_days, value_of(properties.retention_days));
            if let Some(hours) = properties.diff_backup_interval_in_hours {
                mode.set(&mut policy.backup_interval_in_hours, Value::Value(hours));
            }
        }
    }

    let configured = single(&state.threat_detection_policy).cloned();
    let alerts = settings
        .threat_detection
        .map(|policy| policy.properties)
        .filter(|properties| configured.is_some() || !properties.state.eq_ignore_ascii_case("Disabled"));
    if let Some(properties) = alerts {
        let configured = configured.unwrap_or_default();
        let refreshed = ThreatDetectionPolicyState {
            disabled_alerts: flatten_string_set(properties.disabled_alerts),
            email_account_admins: string(if properties.email_account_admins.unwrap_or(false) {
                "Enabled"
            } else {
                "Disabled"
            }),
            email_addresses: flatten_string_set(properties.email_addresses),
            retention_days: value_of(properties.retention_days),
            state: string(properties.state),
            // Never returned by the API
            storage_account_access_key: configured.storage_account_access_key,
            storage_endpoint: optional_string(properties.storage_endpoint.filter(|endpoint| !endpoint.is_empty())),
        };
        mode.set(&mut state.threat_detection_policy, schema::block(refreshed));
    }
}

fn flatten_string_set<'a>(values: Vec<String>) -> ValueList<ValueString<'a>> {
    let values: Vec<_> = values.into_iter().filter(|value| !value.is_empty()).map(string).collect();
    if values.is_empty() {
        Value::Null
    } else {
        Value::Value(values)
    }
}

/// Write the settings held by child resources, all of them on create and
/// only the changed ones on update
async fn write_settings<'a>(
    clients: &Clients,
    id: &SqlDatabaseId,
    state: &DatabaseState<'a>,
    prior: Option<&DatabaseState<'a>>,
    timeout: Duration,
) -> Result<()> {
    let encryption_changed = prior.map_or(true, |prior| {
        prior.transparent_data_encryption_enabled != state.transparent_data_encryption_enabled
    });
    let encryption = state.transparent_data_encryption_enabled.as_ref_option().copied();
    if let Some(enabled) = encryption.filter(|_| encryption_changed && !is_secondary(&state.create_mode)) {
        set_encryption(clients, id, enabled, timeout).await?;
    }

    if prior.map_or(true, |prior| prior.import != state.import) {
        if let Some(body) = expand_import(state, &id.server_id()) {
            import_bacpac(clients, id, &body, timeout).await?;
        }
    }

    if is_warehouse(state) {
        if let Some(enabled) = state.geo_backup_enabled.as_ref_option().copied() {
            // New databases have geo backups enabled
            let changed = prior.map_or(!enabled, |prior| prior.geo_backup_enabled != state.geo_backup_enabled);
            if changed {
                set_geo_backup(clients, id, enabled).await?;
            }
        }
    }

    if prior.map_or(true, |prior| prior.threat_detection_policy != state.threat_detection_policy) {
        set_threat_detection(clients, id, &expand_threat_detection(state), timeout).await?;
    }

    if prior.map_or(true, |prior| prior.long_term_retention_policy != state.long_term_retention_policy) {
        if let Some(policy) = expand_long_term_retention(state) {
            set_long_term_retention(clients, id, &policy, timeout).await?;
        }
    }

    if prior.map_or(true, |prior| prior.short_term_retention_policy != state.short_term_retention_policy) {
        if let Some(policy) = expand_short_term_retention(state) {
            set_short_term_retention(clients, id, &policy, timeout).await?;
        }
    }
    Ok(())
}

arm_resource!(SqlDatabaseResource, DatabaseState, "SQL database", TIMEOUTS);

impl SqlDatabaseResource {
    fn plan_state(
        &self,
        diags: &mut Diagnostics,
        state: &mut DatabaseState<'_>,
        prior: Option<&DatabaseState<'_>>,
    ) {
        default_to(&mut state.create_mode, "Default".into());
        default_to(&mut state.storage_account_type, "Geo".into());
        default_to(&mut state.ledger_enabled, false);
        default_to(&mut state.transparent_data_encryption_enabled, true);
        default_to(&mut state.geo_backup_enabled, true);
        for policy in schema::elements_mut(&mut state.long_term_retention_policy) {
            default_to(&mut policy.weekly_retention, NO_RETENTION.into());
            default_to(&mut policy.monthly_retention, NO_RETENTION.into());
            default_to(&mut policy.yearly_retention, NO_RETENTION.into());
            default_to(&mut policy.week_of_year, 1);
        }
        for policy in schema::elements_mut(&mut state.short_term_retention_policy) {
            default_to(&mut policy.backup_interval_in_hours, 12);
        }
        for policy in schema::elements_mut(&mut state.threat_detection_policy) {
            default_to(&mut policy.email_account_admins, "Disabled".into());
            default_to(&mut policy.state, "Disabled".into());
        }
        if known(&state.elastic_pool_id).is_none() {
            default_to(
                &mut state.maintenance_configuration_name,
                DEFAULT_MAINTENANCE_CONFIGURATION.into(),
            );
        }

        let Some(prior) = prior else {
            for field in [
                &mut state.collation,
                &mut state.license_type,
                &mut state.min_capacity,
                &mut state.sku_name,
                &mut state.maintenance_configuration_name,
            ] {
                if field.is_null() {
                    *field = Value::Unknown;
                }
            }
            for field in [
                &mut state.auto_pause_delay_in_minutes,
                &mut state.max_size_gb,
                &mut state.read_replica_count,
            ] {
                if field.is_null() {
                    *field = Value::Unknown;
                }
            }
            for field in [&mut state.read_scale, &mut state.zone_redundant] {
                if field.is_null() {
                    *field = Value::Unknown;
                }
            }
            return;
        };

        if known(&prior.elastic_pool_id).is_some() && state.elastic_pool_id.is_null() {
            if known(&state.sku_name).map_or(true, |sku| sku == ELASTIC_POOL_SKU) {
                diags.error(
                    "Invalid `sku_name`",
                    format!("`sku_name` must be assigned and not be {ELASTIC_POOL_SKU:?} when disassociating from Elastic Pool"),
                    AttributePath::new("sku_name"),
                );
            }
            state.maintenance_configuration_name = Value::Unknown;
        }
        if is_secondary(&state.create_mode)
            && state.max_size_gb.as_ref_option().is_some()
            && state.max_size_gb != prior.max_size_gb
        {
            diags.error(
                "Invalid `max_size_gb`",
                "it is not possible to change maximum size in secondary create mode",
                AttributePath::new("max_size_gb"),
            );
        }
        if state.sku_name != prior.sku_name || state.elastic_pool_id != prior.elastic_pool_id {
            if state.max_size_gb == prior.max_size_gb {
                state.max_size_gb = Value::Unknown;
            }
            if state.sku_name.is_null() {
                state.sku_name = Value::Unknown;
            }
        }
    }

    fn replacements(prior: &DatabaseState<'_>, proposed: &DatabaseState<'_>) -> Vec<AttributePath> {
        schema::force_new!(
            prior,
            proposed,
            [
                name,
                server_id,
                create_mode,
                creation_source_database_id,
                collation,
                recover_database_id,
                restore_dropped_database_id,
                sample_name,
                ledger_enabled,
            ]
        )
    }

    async fn create_state<'a>(
        &self,
        clients: &Clients,
        mut state: DatabaseState<'a>,
        timeouts: Timeouts,
    ) -> Result<DatabaseState<'a>> {
        let server_id = SqlServerId::parse(state.server_id.as_str())?;
        let id = server_id.database(state.name.as_str());

        let existing: Option<Database> = clients
            .arm
            .get_optional(&id.to_string(), API_VERSION)
            .await
            .with_context(|| format!("checking for presence of existing {id}"))?;
        if existing.is_some() {
            return Err(already_exists("azurerm_sql_database", &id));
        }

        let server: Server = clients
            .arm
            .get(&server_id.to_string(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {server_id}"))?;
        let location = server
            .location
            .filter(|location| !location.is_empty())
            .ok_or_else(|| anyhow!("reading {server_id}: location was empty"))?;

        let _lock = locks::by_id(&id.to_string()).await;
        let _partner_locks = match known(&state.sku_name) {
            Some(sku_name) => lock_and_upgrade_partners(clients, &id, sku_name, timeouts.create).await?,
            None => Vec::new(),
        };

        clients
            .arm
            .put_then_poll::<_, Database>(&id.to_string(), API_VERSION, &expand(&state, &server_id, location), timeouts.create)
            .await
            .with_context(|| format!("creating {id}"))?;
        let database = wait_until_online(clients, &id, timeouts.create).await?;

        state.id = string(id.to_string());
        refresh(&mut state, &id, &database, Refresh::Unknowns);
        write_settings(clients, &id, &state, None, timeouts.create).await?;
        tracing::info!(%id, "created SQL database");
        Ok(state)
    }

    async fn read_state<'a>(
        &self,
        clients: &Clients,
        mut state: DatabaseState<'a>,
    ) -> Result<Option<DatabaseState<'a>>> {
        let id = SqlDatabaseId::parse(state.id.as_str())?;
        let Some(database) = clients
            .arm
            .get_optional::<Database>(&id.to_string(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {id}"))?
        else {
            return Ok(None);
        };

        refresh(&mut state, &id, &database, Refresh::All);
        let warehouse = is_warehouse(&state);
        let settings = read_settings(clients, &id, warehouse).await?;
        refresh_settings(Refresh::All, &mut state, settings, warehouse);
        Ok(Some(state))
    }

    async fn update_state<'a>(
        &self,
        clients: &Clients,
        prior: DatabaseState<'a>,
        mut state: DatabaseState<'a>,
        timeouts: Timeouts,
    ) -> Result<DatabaseState<'a>> {
        let id = SqlDatabaseId::parse(state.id.as_str())?;
        let path = id.to_string();

        let _lock = locks::by_id(&path).await;
        let _partner_locks = match known(&state.sku_name).filter(|_| state.sku_name != prior.sku_name) {
            Some(sku_name) => lock_and_upgrade_partners(clients, &id, sku_name, timeouts.update).await?,
            None => Vec::new(),
        };

        let update = expand_update(&prior, &state, &id.server_id());
        let database = if update == DatabaseUpdate::default() {
            clients
                .arm
                .get::<Database>(&path, API_VERSION)
                .await
                .with_context(|| format!("retrieving {id}"))?
        } else {
            clients
                .arm
                .patch_then_poll::<_, Database>(&path, API_VERSION, &update, timeouts.update)
                .await
                .with_context(|| format!("updating {id}"))?;
            wait_until_online(clients, &id, timeouts.update).await?
        };

        refresh(&mut state, &id, &database, Refresh::Unknowns);
        write_settings(clients, &id, &state, Some(&prior), timeouts.update).await?;
        tracing::info!(%id, "updated SQL database");
        Ok(state)
    }

    async fn delete_state<'a>(
        &self,
        clients: &Clients,
        state: DatabaseState<'a>,
        timeouts: Timeouts,
    ) -> Result<()> {
        let id = SqlDatabaseId::parse(state.id.as_str())?;
        let _lock = locks::by_id(&id.to_string()).await;
        clients
            .arm
            .delete_then_poll(&id.to_string(), API_VERSION, timeouts.delete)
            .await
            .with_context(|| format!("deleting {id}"))?;
        tracing::info!(%id, "deleted SQL database");
        Ok(())
    }

    fn import_state<'a>(id: &str) -> Result<DatabaseState<'a>> {
        SqlDatabaseId::parse(id)?;
        Ok(DatabaseState {
            id: string(id),
            ..Default::default()
        })
    }
}

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

use crate::ids::{RedisCacheId, SubnetId};
use crate::locks::{self, LockGuard};
use crate::provider::Clients;
use crate::resource::{already_exists, arm_resource};
use crate::schema::{
    self, block_len, computed, default_to, defaulted, elements, elements_mut, empty_like, expand_string_set, expand_tags,
    flatten_tags, known, normalize_location, optional, optional_string, required, sensitive,
    single, string, value_of, Refresh,
};
use crate::timeouts::{self, Timeouts, TimeoutsState};
use crate::utils::{WithSchema, WithValidate};
use crate::validate;
use crate::wait::StateChangeConf;

use super::models::{
    AccessKeys, PatchSchedule, Redis, RedisConfiguration, RedisProperties, ScheduleEntries,
    ScheduleEntry, Sku,
};
use super::{API_VERSION, SUBNET_RESOURCE_NAME, VIRTUAL_NETWORK_RESOURCE_NAME};

const TIMEOUTS: Timeouts = Timeouts::minutes(90, 5, 90, 90);

const SKU_NAMES: &[&str] = &["Basic", "Standard", "Premium"];
const FAMILIES: &[&str] = &["C", "P"];
const TLS_VERSIONS: &[&str] = &["1.0", "1.1", "1.2"];
const REDIS_VERSIONS: &[&str] = &["4", "6"];

const CREATE_PENDING: &[&str] = &["Scaling", "Updating", "Creating"];
const UPDATE_PENDING: &[&str] = &["Scaling", "Updating", "Creating", "UpgradingRedisServerVersion"];

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfigurationState<'a> {
    pub maxclients: ValueNumber,
    pub maxmemory_delta: ValueNumber,
    pub maxmemory_reserved: ValueNumber,
    pub maxmemory_policy: ValueString<'a>,
    pub maxfragmentationmemory_reserved: ValueNumber,
    pub rdb_backup_enabled: ValueBool,
    pub rdb_backup_frequency: ValueNumber,
    pub rdb_backup_max_snapshot_count: ValueNumber,
    pub rdb_storage_connection_string: ValueString<'a>,
    pub notify_keyspace_events: ValueString<'a>,
    pub aof_backup_enabled: ValueBool,
    pub aof_storage_connection_string_0: ValueString<'a>,
    pub aof_storage_connection_string_1: ValueString<'a>,
    pub authentication_enabled: ValueBool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchScheduleState<'a> {
    pub day_of_week: ValueString<'a>,
    pub maintenance_window: ValueString<'a>,
    pub start_hour_utc: ValueNumber,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisCacheState<'a> {
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub location: ValueString<'a>,
    pub resource_group_name: ValueString<'a>,
    pub zones: ValueList<ValueString<'a>>,
    pub capacity: ValueNumber,
    pub family: ValueString<'a>,
    pub sku_name: ValueString<'a>,
    pub minimum_tls_version: ValueString<'a>,
    pub shard_count: ValueNumber,
    pub non_ssl_port_enabled: ValueBool,
    pub subnet_id: ValueString<'a>,
    pub private_static_ip_address: ValueString<'a>,
    pub public_network_access_enabled: ValueBool,
    pub replicas_per_master: ValueNumber,
    pub replicas_per_primary: ValueNumber,
    pub redis_version: ValueString<'a>,
    pub tenant_settings: ValueMap<'a, ValueString<'a>>,
    pub hostname: ValueString<'a>,
    pub port: ValueNumber,
    pub ssl_port: ValueNumber,
    pub primary_access_key: ValueString<'a>,
    pub secondary_access_key: ValueString<'a>,
    pub primary_connection_string: ValueString<'a>,
    pub secondary_connection_string: ValueString<'a>,
    pub tags: ValueMap<'a, ValueString<'a>>,
    pub redis_configuration: ValueList<Value<RedisConfigurationState<'a>>>,
    pub patch_schedule: ValueList<Value<PatchScheduleState<'a>>>,
    pub timeouts: ValueList<Value<TimeoutsState<'a>>>,
}

impl WithSchema for RedisCacheState<'_> {
    fn schema() -> Schema {
        let redis_configuration = NestedBlock::List(Block {
            description: Description::plain("Redis server settings, at most one block"),
            attributes: map! {
                "maxclients"                      => computed(AttributeType::Number, "Maximum number of connected clients"),
                "maxmemory_delta"                 => defaulted(AttributeType::Number, "Memory in MB reserved for non-cache operations per shard"),
                "maxmemory_reserved"              => defaulted(AttributeType::Number, "Memory in MB reserved for non-cache operations"),
                "maxmemory_policy"                => defaulted(AttributeType::String, "Eviction policy when memory is full (default: volatile-lru)"),
                "maxfragmentationmemory_reserved" => defaulted(AttributeType::Number, "Memory in MB reserved to accommodate fragmentation"),
                "rdb_backup_enabled"              => optional(AttributeType::Bool, "Enable RDB persistence, Premium only"),
                "rdb_backup_frequency"            => optional(AttributeType::Number, "Minutes between RDB snapshots"),
                "rdb_backup_max_snapshot_count"   => optional(AttributeType::Number, "Number of RDB snapshots kept"),
                "rdb_storage_connection_string"   => sensitive(optional(AttributeType::String, "Storage account receiving the RDB snapshots")),
                "notify_keyspace_events"          => optional(AttributeType::String, "Keyspace notifications sent to clients"),
                "aof_backup_enabled"              => optional(AttributeType::Bool, "Enable AOF persistence, Premium only"),
                "aof_storage_connection_string_0" => sensitive(optional(AttributeType::String, "First storage account receiving the AOF log")),
                "aof_storage_connection_string_1" => sensitive(optional(AttributeType::String, "Second storage account receiving the AOF log")),
                "authentication_enabled"          => defaulted(AttributeType::Bool, "Require clients to authenticate, can only be disabled in a subnet (default: true)"),
            },
            ..Default::default()
        });
        let patch_schedule = NestedBlock::List(Block {
            description: Description::plain("Weekly windows in which Redis updates are applied"),
            attributes: map! {
                "day_of_week"        => required(AttributeType::String, "Day of the window: Monday to Sunday, Everyday or Weekend"),
                "maintenance_window" => defaulted(AttributeType::String, "ISO 8601 duration of the window (default: PT5H)"),
                "start_hour_utc"     => defaulted(AttributeType::Number, "Hour the window starts, 0 to 23 (default: 0)"),
            },
            ..Default::default()
        });

        Schema {
            version: 1,
            block: Block {
                description: Description::plain("Azure Cache for Redis"),
                attributes: map! {
                    "id"                            => schema::id(),
                    "name"                          => required(AttributeType::String, "Name of the cache"),
                    "location"                      => schema::location(),
                    "resource_group_name"           => schema::resource_group_name(),
                    "zones"                         => optional(schema::string_set(), "Availability zones of the cache"),
                    "capacity"                      => required(AttributeType::Number, "Size of the cache"),
                    "family"                        => required(AttributeType::String, "SKU family: C (Basic/Standard) or P (Premium)"),
                    "sku_name"                      => required(AttributeType::String, "Basic, Standard or Premium"),
                    "minimum_tls_version"           => defaulted(AttributeType::String, "Minimum TLS version clients must use (default: 1.2)"),
                    "shard_count"                   => defaulted(AttributeType::Number, "Number of shards of a Premium cluster"),
                    "non_ssl_port_enabled"          => defaulted(AttributeType::Bool, "Open the non-TLS port 6379 (default: false)"),
                    "subnet_id"                     => optional(AttributeType::String, "Subnet the Premium cache is deployed in"),
                    "private_static_ip_address"     => defaulted(AttributeType::String, "Static IP address of the cache in its subnet"),
                    "public_network_access_enabled" => defaulted(AttributeType::Bool, "Allow access from public networks (default: true)"),
                    "replicas_per_master"           => defaulted(AttributeType::Number, "Replicas of each primary, 1 to 3"),
                    "replicas_per_primary"          => defaulted(AttributeType::Number, "Replicas of each primary, 1 to 3"),
                    "redis_version"                 => defaulted(AttributeType::String, "Major Redis version: 4 or 6"),
                    "tenant_settings"               => optional(schema::string_map(), "Tenant settings of the cache"),
                    "hostname"                      => computed(AttributeType::String, "Host name of the cache"),
                    "port"                          => computed(AttributeType::Number, "Non-TLS port of the cache"),
                    "ssl_port"                      => computed(AttributeType::Number, "TLS port of the cache"),
                    "primary_access_key"            => sensitive(computed(AttributeType::String, "Primary access key")),
                    "secondary_access_key"          => sensitive(computed(AttributeType::String, "Secondary access key")),
                    "primary_connection_string"     => sensitive(computed(AttributeType::String, "Connection string using the primary access key")),
                    "secondary_connection_string"   => sensitive(computed(AttributeType::String, "Connection string using the secondary access key")),
                    "tags"                          => schema::tags(),
                },
                blocks: map! {
                    "redis_configuration" => redis_configuration,
                    "patch_schedule"      => patch_schedule,
                    "timeouts"            => timeouts::schema(TIMEOUTS, true),
                },
                ..Default::default()
            },
        }
    }
}

fn is_premium(sku_name: &str) -> bool {
    sku_name.eq_ignore_ascii_case("Premium")
}

/// Combinations of `redis_configuration` settings refused by the API.
///
/// `sku_name` and `has_subnet` are `None` while unknown.
fn configuration_errors(
    sku_name: Option<&str>,
    has_subnet: Option<bool>,
    config: &RedisConfigurationState<'_>,
) -> Vec<(&'static str, &'static str)> {
    let mut errors = Vec::new();
    if config.rdb_backup_enabled == Value::Value(true) {
        match sku_name {
            Some(sku) if !is_premium(sku) => errors.push((
                "rdb_backup_enabled",
                "The `rdb_backup_enabled` property requires a `Premium` sku to be set",
            )),
            Some(_) if config.rdb_storage_connection_string.is_null() => errors.push((
                "rdb_storage_connection_string",
                "The `rdb_storage_connection_string` property must be set when `rdb_backup_enabled` is true",
            )),
            _ => (),
        }
    }
    if config.authentication_enabled == Value::Value(false) && has_subnet == Some(false) {
        errors.push((
            "authentication_enabled",
            "Cannot set `authentication_enabled` to `false` when `subnet_id` is not set",
        ));
    }
    errors
}

fn has_subnet(state: &RedisCacheState<'_>) -> Option<bool> {
    match &state.subnet_id {
        Value::Value(subnet) => Some(!subnet.is_empty()),
        Value::Null => Some(false),
        Value::Unknown => None,
    }
}

impl WithValidate for RedisCacheState<'_> {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath) {
        let attribute = |name: &'static str| attr_path.clone().attribute(name);

        validate::string(diags, attribute("name"), &self.name, validate::redis_cache_name);
        validate::string(diags, attribute("family"), &self.family, validate::one_of(FAMILIES, true));
        validate::string(diags, attribute("sku_name"), &self.sku_name, validate::one_of(SKU_NAMES, false));
        validate::string(
            diags,
            attribute("minimum_tls_version"),
            &self.minimum_tls_version,
            validate::one_of(TLS_VERSIONS, false),
        );
        validate::string(diags, attribute("subnet_id"), &self.subnet_id, validate::resource_id(SubnetId::parse));
        validate::string(
            diags,
            attribute("private_static_ip_address"),
            &self.private_static_ip_address,
            validate::ipv4,
        );
        validate::string(diags, attribute("redis_version"), &self.redis_version, validate::one_of(REDIS_VERSIONS, false));
        validate::number(diags, attribute("replicas_per_master"), &self.replicas_per_master, 1, 3);
        validate::number(diags, attribute("replicas_per_primary"), &self.replicas_per_primary, 1, 3);

        if matches!(&self.redis_configuration, Value::Value(blocks) if blocks.len() > 1) {
            diags.error(
                "Too many `redis_configuration` blocks",
                "at most one `redis_configuration` block is allowed",
                attribute("redis_configuration"),
            );
        }
        for (index, config) in elements(&self.redis_configuration).enumerate() {
            let path = attribute("redis_configuration").index(index as i64);
            validate::string(
                diags,
                path.clone().attribute("maxmemory_policy"),
                &config.maxmemory_policy,
                validate::one_of(validate::MAXMEMORY_POLICIES, false),
            );
            if let Value::Value(frequency) = config.rdb_backup_frequency {
                if let Err(err) = validate::backup_frequency(frequency) {
                    diags.error("Invalid `rdb_backup_frequency`", err, path.clone().attribute("rdb_backup_frequency"));
                }
            }
            for (name, message) in configuration_errors(known(&self.sku_name), has_subnet(self), config) {
                diags.error(format!("Invalid `{name}`"), message, path.clone().attribute(name));
            }
        }

        for (index, entry) in elements(&self.patch_schedule).enumerate() {
            let path = attribute("patch_schedule").index(index as i64);
            validate::string(
                diags,
                path.clone().attribute("day_of_week"),
                &entry.day_of_week,
                validate::one_of(validate::DAYS_OF_WEEK, true),
            );
            validate::string(
                diags,
                path.clone().attribute("maintenance_window"),
                &entry.maintenance_window,
                validate::iso8601_duration,
            );
            validate::number(diags, path.attribute("start_hour_utc"), &entry.start_hour_utc, 0, 23);
        }

        timeouts::validate(diags, &self.timeouts);
    }
}

/// Rank of a SKU, moving to a lower rank requires a new cache
fn sku_weight(sku_name: &str) -> u8 {
    match sku_name {
        "Basic" => 1,
        "Standard" => 2,
        "Premium" => 3,
        _ => 0,
    }
}

fn positive(value: &ValueNumber) -> Option<String> {
    value
        .as_ref_option()
        .filter(|value| **value > 0)
        .map(i64::to_string)
}

fn expand_configuration(state: &RedisCacheState<'_>) -> Result<RedisConfiguration> {
    let Some(config) = single(&state.redis_configuration) else {
        return Ok(RedisConfiguration::default());
    };
    let sku_name = state.sku_name.as_str();
    if let Some((name, message)) = configuration_errors(Some(sku_name), has_subnet(state), config).first() {
        return Err(anyhow!("redis_configuration.{name}: {message}"));
    }
    let owned = |value: &ValueString<'_>| known(value).map(str::to_owned);

    let mut output = RedisConfiguration {
        maxmemory_policy: owned(&config.maxmemory_policy),
        rdb_backup_frequency: positive(&config.rdb_backup_frequency),
        rdb_backup_max_snapshot_count: positive(&config.rdb_backup_max_snapshot_count),
        rdb_storage_connection_string: owned(&config.rdb_storage_connection_string),
        notify_keyspace_events: owned(&config.notify_keyspace_events),
        aof_storage_connection_string_0: owned(&config.aof_storage_connection_string_0),
        aof_storage_connection_string_1: owned(&config.aof_storage_connection_string_1),
        ..Default::default()
    };

    // Memory settings cannot be tuned on Basic caches
    if sku_name != "Basic" {
        output.maxmemory_delta = positive(&config.maxmemory_delta);
        output.maxmemory_reserved = positive(&config.maxmemory_reserved);
        output.maxfragmentationmemory_reserved = positive(&config.maxfragmentationmemory_reserved);
    }
    if is_premium(sku_name) {
        output.rdb_backup_enabled = config.rdb_backup_enabled.as_ref_option().map(bool::to_string);
        output.aof_backup_enabled = config.aof_backup_enabled.as_ref_option().map(bool::to_string);
    }
    if has_subnet(state) == Some(true) {
        let authentication = config.authentication_enabled.as_ref_option().copied().unwrap_or(true);
        output.authnotrequired = Some(if authentication { "no" } else { "yes" }.to_owned());
    }
    Ok(output)
}

fn expand_sku(state: &RedisCacheState<'_>) -> Sku {
    Sku {
        name: state.sku_name.as_str().to_owned(),
        family: state.family.as_str().to_uppercase(),
        capacity: state.capacity.as_ref_option().copied().unwrap_or_default(),
    }
}

fn public_network_access(state: &RedisCacheState<'_>) -> String {
    match state.public_network_access_enabled {
        Value::Value(false) => "Disabled",
        _ => "Enabled",
    }
    .to_owned()
}

fn expand(state: &RedisCacheState<'_>) -> Result<Redis> {
    let owned = |value: &ValueString<'_>| known(value).map(str::to_owned);
    let zones = expand_string_set(&state.zones);

    Ok(Redis {
        location: Some(normalize_location(state.location.as_str())),
        zones: (!zones.is_empty()).then_some(zones),
        tags: expand_tags(&state.tags),
        properties: RedisProperties {
            sku: Some(expand_sku(state)),
            enable_non_ssl_port: Some(state.non_ssl_port_enabled.as_ref_option().copied().unwrap_or(false)),
            minimum_tls_version: owned(&state.minimum_tls_version),
            public_network_access: Some(public_network_access(state)),
            redis_configuration: Some(expand_configuration(state)?),
            redis_version: owned(&state.redis_version),
            replicas_per_master: state.replicas_per_master.as_ref_option().copied(),
            replicas_per_primary: state.replicas_per_primary.as_ref_option().copied(),
            shard_count: state.shard_count.as_ref_option().copied().filter(|count| *count > 0),
            tenant_settings: expand_tags(&state.tenant_settings),
            static_ip: owned(&state.private_static_ip_address),
            subnet_id: owned(&state.subnet_id),
            ..Default::default()
        },
        ..Default::default()
    })
}

/// Body of the `PATCH` applying the changes between `prior` and `state`
fn expand_update(prior: &RedisCacheState<'_>, state: &RedisCacheState<'_>) -> Result<Redis> {
    let mut properties = RedisProperties {
        sku: Some(expand_sku(state)),
        enable_non_ssl_port: Some(state.non_ssl_port_enabled.as_ref_option().copied().unwrap_or(false)),
        minimum_tls_version: known(&state.minimum_tls_version).map(str::to_owned),
        ..Default::default()
    };

    if state.shard_count != prior.shard_count {
        properties.shard_count = state.shard_count.as_ref_option().copied().filter(|count| *count > 0);
    }
    if state.replicas_per_master != prior.replicas_per_master {
        properties.replicas_per_master = state.replicas_per_master.as_ref_option().copied();
    }
    if state.replicas_per_primary != prior.replicas_per_primary {
        properties.replicas_per_primary = state.replicas_per_primary.as_ref_option().copied();
    }
    if state.redis_version != prior.redis_version {
        properties.redis_version = known(&state.redis_version).map(str::to_owned);
    }
    if state.tenant_settings != prior.tenant_settings {
        properties.tenant_settings = expand_tags(&state.tenant_settings);
    }
    if state.public_network_access_enabled != prior.public_network_access_enabled {
        properties.public_network_access = Some(public_network_access(state));
    }
    // Computed settings differ between plan and state, compare what is sent
    let configuration = expand_configuration(state)?;
    if expand_configuration(prior).ok().as_ref() != Some(&configuration) {
        properties.redis_configuration = Some(configuration);
    }

    Ok(Redis {
        tags: expand_tags(&state.tags),
        properties,
        ..Default::default()
    })
}

fn expand_patch_schedule(state: &RedisCacheState<'_>) -> PatchSchedule {
    PatchSchedule {
        properties: ScheduleEntries {
            schedule_entries: elements(&state.patch_schedule)
                .map(|entry| ScheduleEntry {
                    day_of_week: entry.day_of_week.as_str().to_owned(),
                    maintenance_window: known(&entry.maintenance_window).map(str::to_owned),
                    start_hour_utc: entry.start_hour_utc.as_ref_option().copied().unwrap_or_default(),
                })
                .collect(),
        },
    }
}

pub(super) fn connection_string(host_name: &str, ssl_port: i64, access_key: &str, ssl: bool) -> String {
    format!("{host_name}:{ssl_port},password={access_key},ssl={ssl},abortConnect=False")
}

fn parse_number(name: &str, value: Option<&String>) -> Result<Option<i64>> {
    value
        .map(|value| {
            value
                .parse()
                .with_context(|| format!("parsing `{name}` {value:?}"))
        })
        .transpose()
}

fn parse_bool(name: &str, value: Option<&String>) -> Result<Option<bool>> {
    value
        .map(|value| {
            value
                .to_lowercase()
                .parse()
                .with_context(|| format!("parsing `{name}` {value:?}"))
        })
        .transpose()
}

/// Keep the state value when the API omits an attribute, unknowns become null
fn keep_when_missing<T>(mode: Refresh, field: &mut Value<T>, value: Option<T>) {
    match value {
        Some(value) => mode.set(field, Value::Value(value)),
        None if field.is_unknown() => *field = Value::Null,
        None => (),
    }
}

pub(super) fn refresh_configuration(
    mode: Refresh,
    config: &mut RedisConfigurationState<'_>,
    input: &RedisConfiguration,
) -> Result<()> {
    mode.set(&mut config.maxclients, value_of(parse_number("maxclients", input.maxclients.as_ref())?));
    mode.set(
        &mut config.maxmemory_delta,
        value_of(parse_number("maxmemory-delta", input.maxmemory_delta.as_ref())?),
    );
    mode.set(
        &mut config.maxmemory_reserved,
        value_of(parse_number("maxmemory-reserved", input.maxmemory_reserved.as_ref())?),
    );
    mode.set(&mut config.maxmemory_policy, optional_string(input.maxmemory_policy.clone()));
    mode.set(
        &mut config.maxfragmentationmemory_reserved,
        value_of(parse_number(
            "maxfragmentationmemory-reserved",
            input.maxfragmentationmemory_reserved.as_ref(),
        )?),
    );
    keep_when_missing(
        mode,
        &mut config.rdb_backup_enabled,
        parse_bool("rdb-backup-enabled", input.rdb_backup_enabled.as_ref())?,
    );
    keep_when_missing(
        mode,
        &mut config.rdb_backup_frequency,
        parse_number("rdb-backup-frequency", input.rdb_backup_frequency.as_ref())?,
    );
    keep_when_missing(
        mode,
        &mut config.rdb_backup_max_snapshot_count,
        parse_number("rdb-backup-max-snapshot-count", input.rdb_backup_max_snapshot_count.as_ref())?,
    );
    keep_when_missing(
        mode,
        &mut config.rdb_storage_connection_string,
        input.rdb_storage_connection_string.clone().map(Into::into),
    );
    keep_when_missing(
        mode,
        &mut config.notify_keyspace_events,
        input.notify_keyspace_events.clone().map(Into::into),
    );
    keep_when_missing(
        mode,
        &mut config.aof_backup_enabled,
        parse_bool("aof-backup-enabled", input.aof_backup_enabled.as_ref())?,
    );
    keep_when_missing(
        mode,
        &mut config.aof_storage_connection_string_0,
        input.aof_storage_connection_string_0.clone().map(Into::into),
    );
    keep_when_missing(
        mode,
        &mut config.aof_storage_connection_string_1,
        input.aof_storage_connection_string_1.clone().map(Into::into),
    );

    // `authnotrequired` is only returned for caches deployed in a subnet
    let authentication = !input
        .authnotrequired
        .as_deref()
        .is_some_and(|value| value.eq_ignore_ascii_case("yes"));
    mode.set(&mut config.authentication_enabled, Value::Value(authentication));
    Ok(())
}

pub(super) fn refresh_patch_schedule<'a>(
    mode: Refresh,
    blocks: &mut ValueList<Value<PatchScheduleState<'a>>>,
    schedule: Option<&PatchSchedule>,
) {
    let entries = schedule
        .map(|schedule| schedule.properties.schedule_entries.as_slice())
        .unwrap_or_default();
    if entries.is_empty() {
        let empty = empty_like(blocks);
        mode.set(blocks, empty);
        return;
    }

    let current: Vec<PatchScheduleState<'a>> = elements(blocks).cloned().collect();
    let refreshed = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            // Days are compared ignoring case, keep the configured spelling
            let day_of_week = match current.get(index) {
                Some(current) if current.day_of_week.as_str().eq_ignore_ascii_case(&entry.day_of_week) => {
                    current.day_of_week.clone()
                }
                _ => string(entry.day_of_week.as_str()),
            };
            Value::Value(PatchScheduleState {
                day_of_week,
                maintenance_window: optional_string(entry.maintenance_window.clone()),
                start_hour_utc: Value::Value(entry.start_hour_utc),
            })
        })
        .collect();
    mode.set(blocks, Value::Value(refreshed));
}

/// Keep a configured major version when the API reports a full version
fn refresh_version(mode: Refresh, field: &mut ValueString<'_>, version: Option<&str>) {
    if let (Some(configured), Some(version)) = (field.as_deref_option(), version) {
        if version == configured || version.split('.').next() == Some(configured) {
            return;
        }
    }
    mode.set(field, optional_string(version));
}

/// Everything read to refresh a cache
pub(super) struct CacheDetails {
    pub redis: Redis,
    pub keys: AccessKeys,
    pub schedule: Option<PatchSchedule>,
}

impl CacheDetails {
    pub fn connection_strings(&self) -> Option<(String, String)> {
        let properties = &self.redis.properties;
        let host_name = properties.host_name.as_deref()?;
        let ssl_port = properties.ssl_port?;
        let ssl = !properties.enable_non_ssl_port.unwrap_or(false);
        Some((
            connection_string(host_name, ssl_port, &self.keys.primary_key, ssl),
            connection_string(host_name, ssl_port, &self.keys.secondary_key, ssl),
        ))
    }
}

/// Cache with its access keys and patch schedule, `None` when the cache does not exist
pub(super) async fn fetch(clients: &Clients, id: &RedisCacheId) -> Result<Option<CacheDetails>> {
    let Some(redis) = clients
        .arm
        .get_optional::<Redis>(&id.to_string(), API_VERSION)
        .await
        .with_context(|| format!("retrieving {id}"))?
    else {
        return Ok(None);
    };
    let keys: AccessKeys = clients
        .arm
        .post::<(), _>(&format!("{id}/listKeys"), API_VERSION, None)
        .await
        .with_context(|| format!("listing keys for {id}"))?;
    let schedule: Option<PatchSchedule> = clients
        .arm
        .get_optional(&id.patch_schedule_path(), API_VERSION)
        .await
        .with_context(|| format!("retrieving patch schedule of {id}"))?;

    Ok(Some(CacheDetails { redis, keys, schedule }))
}

fn refresh(
    state: &mut RedisCacheState<'_>,
    id: &RedisCacheId,
    details: &CacheDetails,
    mode: Refresh,
) -> Result<()> {
    let redis = &details.redis;
    let properties = &redis.properties;

    mode.set(&mut state.name, string(&id.redis_name));
    mode.set(&mut state.resource_group_name, string(&id.resource_group_name));
    mode.set_location(&mut state.location, redis.location.as_deref());
    let zones = match &redis.zones {
        Some(zones) if !zones.is_empty() => Value::Value(zones.iter().map(|zone| string(zone.as_str())).collect()),
        _ => Value::Null,
    };
    mode.set(&mut state.zones, zones);

    if let Some(sku) = &properties.sku {
        mode.set(&mut state.capacity, Value::Value(sku.capacity));
        mode.set_ignoring_case(&mut state.family, Some(&sku.family));
        mode.set(&mut state.sku_name, string(sku.name.as_str()));
    }
    mode.set(&mut state.hostname, optional_string(properties.host_name.clone()));
    mode.set(&mut state.port, value_of(properties.port));
    mode.set(&mut state.ssl_port, value_of(properties.ssl_port));
    mode.set(
        &mut state.minimum_tls_version,
        string(properties.minimum_tls_version.as_deref().unwrap_or("1.2")),
    );
    mode.set(
        &mut state.non_ssl_port_enabled,
        Value::Value(properties.enable_non_ssl_port.unwrap_or(false)),
    );
    mode.set(&mut state.shard_count, Value::Value(properties.shard_count.unwrap_or(0)));
    mode.set(&mut state.private_static_ip_address, optional_string(properties.static_ip.clone()));

    let subnet_id = properties
        .subnet_id
        .as_deref()
        .map(SubnetId::parse_insensitively)
        .transpose()?
        .map(|subnet| subnet.to_string());
    mode.set_ignoring_case(&mut state.subnet_id, subnet_id.as_deref());
    mode.set(
        &mut state.public_network_access_enabled,
        Value::Value(properties.public_network_access.as_deref() != Some("Disabled")),
    );
    mode.set(&mut state.replicas_per_master, value_of(properties.replicas_per_master));
    mode.set(&mut state.replicas_per_primary, value_of(properties.replicas_per_primary));
    refresh_version(mode, &mut state.redis_version, properties.redis_version.as_deref());
    mode.set(&mut state.tenant_settings, flatten_tags(properties.tenant_settings.as_ref()));

    if let Some(input) = &properties.redis_configuration {
        for config in elements_mut(&mut state.redis_configuration) {
            refresh_configuration(mode, config, input)
                .with_context(|| format!("flattening `redis_configuration` of {id}"))?;
        }
    }
    refresh_patch_schedule(mode, &mut state.patch_schedule, details.schedule.as_ref());

    mode.set(&mut state.primary_access_key, string(details.keys.primary_key.as_str()));
    mode.set(&mut state.secondary_access_key, string(details.keys.secondary_key.as_str()));
    let (primary, secondary) = details.connection_strings().unzip();
    mode.set(&mut state.primary_connection_string, optional_string(primary));
    mode.set(&mut state.secondary_connection_string, optional_string(secondary));
    mode.set(&mut state.tags, flatten_tags(redis.tags.as_ref()));
    Ok(())
}

/// Lock the virtual network and subnet of a cache
async fn lock_subnet(subnet_id: Option<&str>) -> Result<Vec<LockGuard>> {
    let Some(subnet_id) = subnet_id.filter(|id| !id.is_empty()) else {
        return Ok(Vec::new());
    };
    let subnet = SubnetId::parse_insensitively(subnet_id)?;
    Ok(vec![
        locks::by_name(&subnet.virtual_network_name, VIRTUAL_NETWORK_RESOURCE_NAME).await,
        locks::by_name(&subnet.subnet_name, SUBNET_RESOURCE_NAME).await,
    ])
}

async fn wait_for_provisioning(
    clients: &Clients,
    id: &RedisCacheId,
    pending: &[&str],
    timeout: Duration,
) -> Result<Redis> {
    tracing::debug!(%id, "waiting for the cache to become available");
    let path = id.to_string();
    let path = path.as_str();
    StateChangeConf::new(pending, &["Succeeded"])
        .min_timeout(Duration::from_secs(15))
        .timeout(timeout)
        .wait_for_state(move || async move {
            let redis: Redis = clients
                .arm
                .get(path, API_VERSION)
                .await
                .with_context(|| format!("polling for status of {id}"))?;
            let state = redis
                .properties
                .provisioning_state
                .clone()
                .filter(|state| !state.is_empty())
                .ok_or_else(|| anyhow!("polling for status of {id}: `provisioningState` was nil"))?;
            Ok::<_, anyhow::Error>(Some((redis, state)))
        })
        .await
        .with_context(|| format!("waiting for {id} to become available"))
}

async fn write_patch_schedule(clients: &Clients, id: &RedisCacheId, state: &RedisCacheState<'_>) -> Result<()> {
    let schedule = expand_patch_schedule(state);
    if schedule.properties.schedule_entries.is_empty() {
        clients
            .arm
            .delete(&id.patch_schedule_path(), API_VERSION)
            .await
            .with_context(|| format!("deleting Patch Schedule for {id}"))?;
    } else {
        clients
            .arm
            .put::<_, PatchSchedule>(&id.patch_schedule_path(), API_VERSION, &schedule)
            .await
            .with_context(|| format!("setting Patch Schedule for {id}"))?;
    }
    Ok(())
}

arm_resource!(RedisCacheResource, RedisCacheState, "Redis cache", TIMEOUTS);

impl RedisCacheResource {
    fn plan_state(
        &self,
        _diags: &mut Diagnostics,
        state: &mut RedisCacheState<'_>,
        prior: Option<&RedisCacheState<'_>>,
    ) {
        default_to(&mut state.minimum_tls_version, "1.2".into());
        default_to(&mut state.non_ssl_port_enabled, false);
        default_to(&mut state.public_network_access_enabled, true);

        for config in elements_mut(&mut state.redis_configuration) {
            default_to(&mut config.maxmemory_policy, "volatile-lru".into());
            default_to(&mut config.authentication_enabled, true);
            for field in [
                &mut config.maxclients,
                &mut config.maxmemory_delta,
                &mut config.maxmemory_reserved,
                &mut config.maxfragmentationmemory_reserved,
            ] {
                if field.is_null() {
                    *field = Value::Unknown;
                }
            }
        }
        for entry in elements_mut(&mut state.patch_schedule) {
            default_to(&mut entry.maintenance_window, "PT5H".into());
            default_to(&mut entry.start_hour_utc, 0);
        }

        for field in [
            &mut state.shard_count,
            &mut state.replicas_per_master,
            &mut state.replicas_per_primary,
        ] {
            if field.is_null() {
                *field = Value::Unknown;
            }
        }
        for field in [&mut state.private_static_ip_address, &mut state.redis_version] {
            if field.is_null() {
                *field = Value::Unknown;
            }
        }

        match prior {
            None => {
                state.hostname = Value::Unknown;
                state.port = Value::Unknown;
                state.ssl_port = Value::Unknown;
                state.primary_access_key = Value::Unknown;
                state.secondary_access_key = Value::Unknown;
                state.primary_connection_string = Value::Unknown;
                state.secondary_connection_string = Value::Unknown;
            }
            Some(prior) => {
                if state.sku_name != prior.sku_name || state.capacity != prior.capacity {
                    for config in elements_mut(&mut state.redis_configuration) {
                        config.maxclients = Value::Unknown;
                    }
                }
                if state.non_ssl_port_enabled != prior.non_ssl_port_enabled {
                    state.primary_connection_string = Value::Unknown;
                    state.secondary_connection_string = Value::Unknown;
                }
            }
        }
    }

    fn replacements(prior: &RedisCacheState<'_>, proposed: &RedisCacheState<'_>) -> Vec<AttributePath> {
        let mut paths = schema::force_new!(prior, proposed, [name, resource_group_name, zones, subnet_id]);
        if normalize_location(prior.location.as_str()) != normalize_location(proposed.location.as_str()) {
            paths.push(AttributePath::new("location"));
        }
        if known(&proposed.private_static_ip_address).is_some()
            && proposed.private_static_ip_address != prior.private_static_ip_address
        {
            paths.push(AttributePath::new("private_static_ip_address"));
        }
        if let (Some(old), Some(new)) = (known(&prior.sku_name), known(&proposed.sku_name)) {
            if sku_weight(old) > sku_weight(new) {
                tracing::info!(from = old, to = new, "downgrading a Redis SKU requires a new cache");
                paths.push(AttributePath::new("sku_name"));
            }
        }
        paths
    }

    async fn create_state<'a>(
        &self,
        clients: &Clients,
        mut state: RedisCacheState<'a>,
        timeouts: Timeouts,
    ) -> Result<RedisCacheState<'a>> {
        let id = RedisCacheId::new(
            &clients.subscription_id,
            state.resource_group_name.as_str(),
            state.name.as_str(),
        );

        let existing: Option<Redis> = clients
            .arm
            .get_optional(&id.to_string(), API_VERSION)
            .await
            .with_context(|| format!("checking for presence of existing {id}"))?;
        if existing.is_some() {
            return Err(already_exists("azurerm_redis_cache", &id));
        }

        let body = expand(&state).context("expanding `redis_configuration`")?;
        let _locks = lock_subnet(known(&state.subnet_id)).await?;

        clients
            .arm
            .put_then_poll::<_, Redis>(&id.to_string(), API_VERSION, &body, timeouts.create)
            .await
            .with_context(|| format!("creating {id}"))?;
        wait_for_provisioning(clients, &id, CREATE_PENDING, timeouts.create).await?;

        if block_len(&state.patch_schedule).unwrap_or(0) > 0 {
            write_patch_schedule(clients, &id, &state).await?;
        }

        let details = fetch(clients, &id)
            .await?
            .ok_or_else(|| anyhow!("{id} disappeared after creation"))?;
        state.id = string(id.to_string());
        refresh(&mut state, &id, &details, Refresh::Unknowns)?;
        tracing::info!(%id, "created Redis cache");
        Ok(state)
    }

    async fn read_state<'a>(
        &self,
        clients: &Clients,
        mut state: RedisCacheState<'a>,
    ) -> Result<Option<RedisCacheState<'a>>> {
        let id = RedisCacheId::parse(state.id.as_str())?;
        let Some(details) = fetch(clients, &id).await? else {
            return Ok(None);
        };

        refresh(&mut state, &id, &details, Refresh::All)?;
        Ok(Some(state))
    }

    async fn update_state<'a>(
        &self,
        clients: &Clients,
        prior: RedisCacheState<'a>,
        mut state: RedisCacheState<'a>,
        timeouts: Timeouts,
    ) -> Result<RedisCacheState<'a>> {
        let id = RedisCacheId::parse(state.id.as_str())?;
        let body = expand_update(&prior, &state).context("expanding `redis_configuration`")?;
        let _locks = lock_subnet(known(&state.subnet_id)).await?;

        clients
            .arm
            .patch_then_poll::<_, Redis>(&id.to_string(), API_VERSION, &body, timeouts.update)
            .await
            .with_context(|| format!("updating {id}"))?;
        wait_for_provisioning(clients, &id, UPDATE_PENDING, timeouts.update).await?;

        if state.patch_schedule != prior.patch_schedule {
            write_patch_schedule(clients, &id, &state).await?;
        }

        let details = fetch(clients, &id)
            .await?
            .ok_or_else(|| anyhow!("{id} disappeared during update"))?;
        refresh(&mut state, &id, &details, Refresh::Unknowns)?;
        tracing::info!(%id, "updated Redis cache");
        Ok(state)
    }

    async fn delete_state<'a>(
        &self,
        clients: &Clients,
        state: RedisCacheState<'a>,
        timeouts: Timeouts,
    ) -> Result<()> {
        let id = RedisCacheId::parse(state.id.as_str())?;
        let Some(redis) = clients
            .arm
            .get_optional::<Redis>(&id.to_string(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {id}"))?
        else {
            return Ok(());
        };
        let _locks = lock_subnet(redis.properties.subnet_id.as_deref()).await?;

        clients
            .arm
            .delete_then_poll(&id.to_string(), API_VERSION, timeouts.delete)
            .await
            .with_context(|| format!("deleting {id}"))?;
        tracing::info!(%id, "deleted Redis cache");
        Ok(())
    }

    fn import_state<'a>(id: &str) -> Result<RedisCacheState<'a>> {
        RedisCacheId::parse(id)?;
        Ok(RedisCacheState {
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

    fn cache_path(name: &str) -> String {
        format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/group1/providers/Microsoft.Cache/redis/{name}")
    }

    fn subnet() -> String {
        format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/group1/providers/Microsoft.Network/virtualNetworks/vnet1/subnets/subnet1")
    }

    fn fake(name: &str) -> FakeArm {
        let fake = FakeArm::new();
        fake.defaults(
            "/redis/",
            json!({"properties": {
                "provisioningState": "Succeeded",
                "hostName": format!("{name}.redis.cache.windows.net"),
                "port": 6379,
                "sslPort": 6380,
                "redisVersion": "6.0.14",
                "redisConfiguration": {"maxclients": "1000"},
            }}),
        );
        fake.insert(
            &format!("{}/listKeys", cache_path(name)),
            json!({"primaryKey": "primary", "secondaryKey": "secondary"}),
        );
        fake
    }

    fn config(name: &str) -> RedisCacheState<'static> {
        RedisCacheState {
            name: string(name),
            location: string("westeurope"),
            resource_group_name: string("group1"),
            capacity: Value::Value(1),
            family: string("c"),
            sku_name: string("Standard"),
            redis_version: string("6"),
            redis_configuration: schema::block(RedisConfigurationState {
                maxmemory_policy: string("allkeys-lru"),
                ..Default::default()
            }),
            patch_schedule: schema::block(PatchScheduleState {
                day_of_week: string("saturday"),
                start_hour_utc: Value::Value(2),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn errors(config: RedisCacheState<'_>) -> Vec<String> {
        let mut diags = Diagnostics::default();
        config.validate(&mut diags, AttributePath::default());
        diags.errors.into_iter().map(|diag| diag.summary.into_owned()).collect()
    }

    fn with_configuration(
        sku_name: &str,
        configuration: RedisConfigurationState<'static>,
    ) -> RedisCacheState<'static> {
        RedisCacheState {
            sku_name: string(sku_name),
            family: string(if sku_name == "Premium" { "P" } else { "C" }),
            redis_configuration: schema::block(configuration),
            ..config("validation")
        }
    }

    #[test]
    fn configuration_validation() {
        assert!(errors(config("valid")).is_empty());

        let rdb = RedisConfigurationState {
            rdb_backup_enabled: Value::Value(true),
            ..Default::default()
        };
        assert_eq!(errors(with_configuration("Standard", rdb.clone())), ["Invalid `rdb_backup_enabled`"]);
        assert_eq!(
            errors(with_configuration("Premium", rdb.clone())),
            ["Invalid `rdb_storage_connection_string`"]
        );
        let rdb = RedisConfigurationState {
            rdb_storage_connection_string: string("DefaultEndpointsProtocol=https;AccountName=backups"),
            rdb_backup_frequency: Value::Value(60),
            ..rdb
        };
        assert!(errors(with_configuration("Premium", rdb)).is_empty());

        let no_auth = RedisConfigurationState {
            authentication_enabled: Value::Value(false),
            ..Default::default()
        };
        assert_eq!(
            errors(with_configuration("Premium", no_auth.clone())),
            ["Invalid `authentication_enabled`"]
        );
        let in_subnet = RedisCacheState {
            subnet_id: string(subnet()),
            ..with_configuration("Premium", no_auth)
        };
        assert!(errors(in_subnet).is_empty());

        let frequency = RedisConfigurationState {
            rdb_backup_frequency: Value::Value(45),
            ..Default::default()
        };
        assert_eq!(errors(with_configuration("Premium", frequency)), ["Invalid `rdb_backup_frequency`"]);
    }

    #[test]
    fn configuration_depends_on_the_sku() {
        let settings = RedisConfigurationState {
            maxmemory_reserved: Value::Value(50),
            maxmemory_delta: Value::Value(0),
            aof_backup_enabled: Value::Value(true),
            rdb_backup_enabled: Value::Value(false),
            authentication_enabled: Value::Value(true),
            ..Default::default()
        };

        let basic = expand_configuration(&with_configuration("Basic", settings.clone())).unwrap();
        assert_eq!(basic.maxmemory_reserved, None);
        assert_eq!(basic.aof_backup_enabled, None);
        assert_eq!(basic.rdb_backup_enabled, None);
        assert_eq!(basic.authnotrequired, None);

        let premium = RedisCacheState {
            subnet_id: string(subnet()),
            ..with_configuration("Premium", settings)
        };
        let premium = expand_configuration(&premium).unwrap();
        assert_eq!(premium.maxmemory_reserved.as_deref(), Some("50"));
        assert_eq!(premium.maxmemory_delta, None);
        assert_eq!(premium.aof_backup_enabled.as_deref(), Some("true"));
        assert_eq!(premium.rdb_backup_enabled.as_deref(), Some("false"));
        assert_eq!(premium.authnotrequired.as_deref(), Some("no"));
    }

    #[test]
    fn connection_strings() {
        assert_eq!(
            connection_string("cache.redis.cache.windows.net", 6380, "key", true),
            "cache.redis.cache.windows.net:6380,password=key,ssl=true,abortConnect=False"
        );
    }

    #[test]
    fn versions_keep_the_configured_major() {
        let mut version = string("6");
        refresh_version(Refresh::All, &mut version, Some("6.0.14"));
        assert_eq!(version.as_str(), "6");
        refresh_version(Refresh::All, &mut version, Some("4.0.14"));
        assert_eq!(version.as_str(), "4.0.14");
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle() {
        let fake = fake("cache1");
        let resource = RedisCacheResource::new(fake.handle());
        let mut diags = Diagnostics::default();

        let (planned, private) = resource
            .plan_create(&mut diags, config("cache1"), config("cache1"), Value::Null)
            .await
            .unwrap();
        assert!(planned.primary_connection_string.is_unknown());
        assert_eq!(planned.minimum_tls_version.as_str(), "1.2");

        let (state, private) = resource
            .create(&mut diags, planned, config("cache1"), private, Value::Null)
            .await
            .unwrap();
        assert_eq!(state.id.as_str(), cache_path("cache1"));
        assert_eq!(state.family.as_str(), "c");
        assert_eq!(state.redis_version.as_str(), "6");
        assert_eq!(state.ssl_port, Value::Value(6380));
        assert_eq!(state.shard_count, Value::Value(0));
        assert_eq!(
            state.primary_connection_string.as_str(),
            "cache1.redis.cache.windows.net:6380,password=primary,ssl=true,abortConnect=False"
        );
        let config_block = single(&state.redis_configuration).unwrap();
        assert_eq!(config_block.maxclients, Value::Value(1000));
        assert!(config_block.maxmemory_reserved.is_null());

        let sent = &fake.sent(Method::PUT, &cache_path("cache1"))[0];
        assert_eq!(sent["properties"]["sku"], json!({"name": "Standard", "family": "C", "capacity": 1}));
        assert_eq!(sent["properties"]["redisConfiguration"], json!({"maxmemory-policy": "allkeys-lru"}));
        assert_eq!(sent["properties"]["publicNetworkAccess"], "Enabled");
        assert_eq!(
            fake.sent(Method::PUT, &format!("{}/patchSchedules/default", cache_path("cache1"))),
            vec![json!({"properties": {"scheduleEntries": [
                {"dayOfWeek": "saturday", "maintenanceWindow": "PT5H", "startHourUtc": 2},
            ]}})]
        );

        let (read, private) = resource
            .read(&mut diags, state.clone(), private, Value::Null)
            .await
            .unwrap();
        assert_eq!(read, state);

        // Scale up and drop the patch schedule
        let proposed = RedisCacheState {
            capacity: Value::Value(2),
            patch_schedule: Value::Value(vec![]),
            ..read.clone()
        };
        let (planned, private, replace) = resource
            .plan_update(&mut diags, read.clone(), proposed.clone(), proposed, private, Value::Null)
            .await
            .unwrap();
        assert!(replace.is_empty());
        assert!(single(&planned.redis_configuration).unwrap().maxclients.is_unknown());

        let (updated, private) = resource
            .update(&mut diags, read, planned.clone(), planned, private, Value::Null)
            .await
            .unwrap();
        assert_eq!(updated.capacity, Value::Value(2));
        assert_eq!(updated.patch_schedule, Value::Value(vec![]));
        let patch = &fake.sent(Method::PATCH, &cache_path("cache1"))[0];
        assert_eq!(patch["properties"]["sku"]["capacity"], 2);
        assert!(patch["properties"].get("redisVersion").is_none());
        assert!(patch["properties"].get("redisConfiguration").is_none());
        assert!(fake
            .requests()
            .contains(&(Method::DELETE, format!("{}/patchSchedules/default", cache_path("cache1")))));

        resource
            .destroy(&mut diags, updated, private, Value::Null)
            .await
            .unwrap();
        assert!(fake.get(&cache_path("cache1")).is_none());
        assert!(diags.errors.is_empty());
    }

    #[tokio::test]
    async fn sku_downgrade_replaces_the_cache() {
        let resource = RedisCacheResource::default();
        let mut diags = Diagnostics::default();
        let prior = RedisCacheState {
            id: string(cache_path("downgrade")),
            sku_name: string("Premium"),
            family: string("P"),
            ..config("downgrade")
        };
        let proposed = RedisCacheState {
            sku_name: string("Standard"),
            family: string("C"),
            ..prior.clone()
        };

        let (planned, _, replace) = resource
            .plan_update(&mut diags, prior.clone(), proposed.clone(), proposed, Value::Null, Value::Null)
            .await
            .unwrap();
        assert_eq!(replace, vec![AttributePath::new("sku_name")]);
        assert!(planned.id.is_unknown());

        let upgrade = RedisCacheState {
            sku_name: string("Premium"),
            ..config("downgrade")
        };
        let standard = RedisCacheState {
            id: string(cache_path("downgrade")),
            ..config("downgrade")
        };
        assert!(RedisCacheResource::replacements(&standard, &upgrade).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn scaling_is_awaited() {
        let fake = fake("scaling1");
        fake.insert(&cache_path("scaling1"), json!({"properties": {"provisioningState": "Scaling"}}));
        let clients = fake.handle().get().unwrap();
        let id = RedisCacheId::parse(&cache_path("scaling1")).unwrap();

        let poll = tokio::spawn({
            let clients = clients.clone();
            let id = id.clone();
            async move { wait_for_provisioning(&clients, &id, UPDATE_PENDING, Duration::from_secs(600)).await }
        });
        tokio::time::sleep(Duration::from_secs(30)).await;
        fake.update(&cache_path("scaling1"), json!({"properties": {"provisioningState": "Succeeded"}}));

        let redis = poll.await.unwrap().unwrap();
        assert_eq!(redis.properties.provisioning_state.as_deref(), Some("Succeeded"));
    }

    #[tokio::test]
    async fn create_waits_for_the_subnet_lock() {
        let fake = fake("subnetcache1");
        let resource = RedisCacheResource::new(fake.handle());
        let config = RedisCacheState {
            sku_name: string("Premium"),
            family: string("P"),
            subnet_id: string(format!(
                "/subscriptions/{SUBSCRIPTION}/resourceGroups/group1/providers/Microsoft.Network/virtualNetworks/lockedvnet/subnets/lockedsubnet"
            )),
            ..config("subnetcache1")
        };
        let mut diags = Diagnostics::default();
        let (planned, private) = resource
            .plan_create(&mut diags, config.clone(), config.clone(), Value::Null)
            .await
            .unwrap();

        let vnet = locks::by_name("lockedvnet", VIRTUAL_NETWORK_RESOURCE_NAME).await;
        let create = tokio::spawn(async move {
            let mut diags = Diagnostics::default();
            resource.create(&mut diags, planned, config, private, Value::Null).await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!create.is_finished());
        assert!(fake.sent(Method::PUT, &cache_path("subnetcache1")).is_empty());

        drop(vnet);
        let (state, _) = create.await.unwrap().unwrap();
        assert_eq!(state.id.as_str(), cache_path("subnetcache1"));
        assert_eq!(fake.sent(Method::PUT, &cache_path("subnetcache1")).len(), 1);
    }
}

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
use tf_provider::schema::{AttributeType, NestedBlock};
use tf_provider::value::{Value, ValueBool, ValueList, ValueMap, ValueNumber, ValueString};
use tf_provider::schema::{Block, Description, Schema};
use tf_provider::{map, AttributePath, Diagnostics};

use crate::ids::{MaintenanceConfigurationId, SqlElasticPoolId};
use crate::provider::Clients;
use crate::resource::{already_exists, arm_resource};
use crate::schema::{
    self, block, block_len, decimal, default_to, defaulted, expand_tags, flatten_tags, from_decimal,
    normalize_location, optional, optional_string, required, single, string, value_of, Refresh,
};
use crate::timeouts::{self, Timeouts, TimeoutsState};
use crate::utils::{WithSchema, WithValidate};
use crate::validate;

use super::models::{ElasticPool, ElasticPoolProperties, PerDatabaseSettings, Sku};
use super::API_VERSION;

const TIMEOUTS: Timeouts = Timeouts::minutes(60, 5, 60, 60);

const BYTES_PER_GB: i64 = 1_073_741_824;
const DEFAULT_MAINTENANCE_CONFIGURATION: &str = "SQL_Default";

const SKU_NAMES: &[&str] = &[
    "BasicPool",
    "StandardPool",
    "PremiumPool",
    "GP_Gen4",
    "GP_Gen5",
    "GP_Fsv2",
    "GP_DC",
    "BC_Gen4",
    "BC_Gen5",
    "BC_DC",
];
const LICENSE_TYPES: &[&str] = &["BasePrice", "LicenseIncluded"];

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuState<'a> {
    pub name: ValueString<'a>,
    pub tier: ValueString<'a>,
    pub family: ValueString<'a>,
    pub capacity: ValueNumber,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerDatabaseSettingsState<'a> {
    pub min_capacity: ValueString<'a>,
    pub max_capacity: ValueString<'a>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElasticPoolState<'a> {
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub resource_group_name: ValueString<'a>,
    pub server_name: ValueString<'a>,
    pub location: ValueString<'a>,
    pub max_size_gb: ValueNumber,
    pub zone_redundant: ValueBool,
    pub license_type: ValueString<'a>,
    pub maintenance_configuration_name: ValueString<'a>,
    pub tags: ValueMap<'a, ValueString<'a>>,
    pub sku: ValueList<Value<SkuState<'a>>>,
    pub per_database_settings: ValueList<Value<PerDatabaseSettingsState<'a>>>,
    pub timeouts: ValueList<Value<TimeoutsState<'a>>>,
}

impl WithSchema for ElasticPoolState<'_> {
    fn schema() -> Schema {
        let sku = NestedBlock::List(Block {
            description: Description::plain("Pricing tier of the pool, exactly one block"),
            attributes: map! {
                "name"     => required(AttributeType::String, "SKU name: BasicPool, StandardPool, PremiumPool, GP_Gen5, BC_Gen5, ..."),
                "tier"     => required(AttributeType::String, "Tier: Basic, Standard, Premium, GeneralPurpose or BusinessCritical"),
                "family"   => optional(AttributeType::String, "Hardware generation of vCore SKUs, such as Gen5"),
                "capacity" => required(AttributeType::Number, "DTUs or vCores of the pool"),
            },
            ..Default::default()
        });
        let per_database_settings = NestedBlock::List(Block {
            description: Description::plain("Resources of each database of the pool, exactly one block"),
            attributes: map! {
                "min_capacity" => required(AttributeType::String, "Minimum DTUs or vCores guaranteed to each database, as a decimal number"),
                "max_capacity" => required(AttributeType::String, "Maximum DTUs or vCores any database can consume, as a decimal number"),
            },
            ..Default::default()
        });

        Schema {
            version: 1,
            block: Block {
                description: Description::plain("Elastic pool of an Azure SQL server"),
                attributes: map! {
                    "id"                             => schema::id(),
                    "name"                           => required(AttributeType::String, "Name of the elastic pool"),
                    "resource_group_name"            => schema::resource_group_name(),
                    "server_name"                    => required(AttributeType::String, "Name of the SQL server hosting the pool"),
                    "location"                       => schema::location(),
                    "max_size_gb"                    => defaulted(AttributeType::Number, "Maximum storage of the pool in gigabytes"),
                    "zone_redundant"                 => defaulted(AttributeType::Bool, "Spread the replicas across availability zones (default: false)"),
                    "license_type"                   => defaulted(AttributeType::String, "BasePrice or LicenseIncluded, for vCore pools"),
                    "maintenance_configuration_name" => defaulted(AttributeType::String, "Public maintenance configuration (default: SQL_Default)"),
                    "tags"                           => schema::tags(),
                },
                blocks: map! {
                    "sku"                   => sku,
                    "per_database_settings" => per_database_settings,
                    "timeouts"              => timeouts::schema(TIMEOUTS, true),
                },
                ..Default::default()
            },
        }
    }
}

/// Tier expected for a SKU name, `None` when the SKU is unknown
fn expected_tier(sku_name: &str) -> Option<&'static str> {
    match sku_name {
        "BasicPool" => Some("Basic"),
        "StandardPool" => Some("Standard"),
        "PremiumPool" => Some("Premium"),
        name if name.starts_with("GP_") => Some("GeneralPurpose"),
        name if name.starts_with("BC_") => Some("BusinessCritical"),
        _ => None,
    }
}

fn is_dtu_pool(sku_name: &str) -> bool {
    sku_name.ends_with("Pool")
}

fn validate_sku(diags: &mut Diagnostics, path: AttributePath, sku: &SkuState<'_>) {
    validate::string(
        diags,
        path.clone().attribute("name"),
        &sku.name,
        validate::one_of(SKU_NAMES, false),
    );
    let Some(name) = sku.name.as_deref_option() else {
        return;
    };

    if let (Some(expected), Some(tier)) = (expected_tier(name), sku.tier.as_deref_option()) {
        if tier != expected {
            diags.error(
                "Invalid SKU tier",
                format!("SKU {name} requires the tier {expected}, not {tier}"),
                path.clone().attribute("tier"),
            );
        }
    }

    let family = sku.family.as_deref_option().filter(|family| !family.is_empty());
    match (is_dtu_pool(name), family) {
        (true, Some(family)) => diags.error(
            "Invalid SKU family",
            format!("DTU based SKU {name} does not support the family {family}"),
            path.attribute("family"),
        ),
        (false, None) if sku.family.is_null() => diags.error(
            "Missing SKU family",
            format!("vCore based SKU {name} requires a family such as Gen5"),
            path.attribute("family"),
        ),
        _ => (),
    }
}

impl WithValidate for ElasticPoolState<'_> {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath) {
        validate::string(
            diags,
            attr_path.clone().attribute("name"),
            &self.name,
            validate::sql_elastic_pool_name,
        );
        validate::string(
            diags,
            attr_path.clone().attribute("server_name"),
            &self.server_name,
            validate::sql_server_name,
        );
        validate::string(
            diags,
            attr_path.clone().attribute("license_type"),
            &self.license_type,
            validate::one_of(LICENSE_TYPES, false),
        );

        for (name, len) in [
            ("sku", block_len(&self.sku)),
            ("per_database_settings", block_len(&self.per_database_settings)),
        ] {
            if matches!(len, Some(len) if len != 1) {
                diags.error(
                    format!("Invalid `{name}` blocks"),
                    format!("exactly one `{name}` block is required"),
                    attr_path.clone().attribute(name),
                );
            }
        }

        if let Some(sku) = single(&self.sku) {
            validate_sku(diags, attr_path.clone().attribute("sku").index(0), sku);
        }
        if let Some(settings) = single(&self.per_database_settings) {
            let path = attr_path.clone().attribute("per_database_settings").index(0);
            validate::string(diags, path.clone().attribute("min_capacity"), &settings.min_capacity, validate::decimal);
            validate::string(diags, path.clone().attribute("max_capacity"), &settings.max_capacity, validate::decimal);

            let capacity = single(&self.sku).and_then(|sku| sku.capacity.as_ref_option().copied());
            match (decimal(&settings.min_capacity), decimal(&settings.max_capacity)) {
                (Some(min), Some(max)) if min > max => diags.error(
                    "Invalid per database settings",
                    format!("min_capacity ({min}) must not exceed max_capacity ({max})"),
                    path.attribute("min_capacity"),
                ),
                (_, Some(max)) if capacity.is_some_and(|capacity| max > capacity as f64) => diags.error(
                    "Invalid per database settings",
                    format!(
                        "max_capacity ({max}) must not exceed the capacity of the pool ({})",
                        capacity.unwrap_or_default()
                    ),
                    path.attribute("max_capacity"),
                ),
                _ => (),
            }
        }

        timeouts::validate(diags, &self.timeouts);
    }
}

fn expand(state: &ElasticPoolState<'_>, id: &SqlElasticPoolId) -> ElasticPool {
    let sku = single(&state.sku).map(|sku| Sku {
        name: sku.name.as_str().to_owned(),
        tier: schema::known(&sku.tier).map(str::to_owned),
        family: schema::known(&sku.family).map(str::to_owned),
        capacity: sku.capacity.as_ref_option().copied(),
    });
    let per_database_settings = single(&state.per_database_settings).map(|settings| PerDatabaseSettings {
        min_capacity: decimal(&settings.min_capacity).unwrap_or_default(),
        max_capacity: decimal(&settings.max_capacity).unwrap_or_default(),
    });
    let maintenance = schema::known(&state.maintenance_configuration_name)
        .unwrap_or(DEFAULT_MAINTENANCE_CONFIGURATION);

    ElasticPool {
        location: Some(normalize_location(state.location.as_str())),
        tags: expand_tags(&state.tags),
        sku,
        properties: Some(ElasticPoolProperties {
            max_size_bytes: state.max_size_gb.as_ref_option().map(|gb| gb * BYTES_PER_GB),
            per_database_settings,
            zone_redundant: state.zone_redundant.as_ref_option().copied(),
            license_type: schema::known(&state.license_type).map(str::to_owned),
            maintenance_configuration_id: Some(
                MaintenanceConfigurationId::new(&id.subscription_id, maintenance).to_string(),
            ),
            state: None,
        }),
        ..Default::default()
    }
}

fn refresh(state: &mut ElasticPoolState<'_>, id: &SqlElasticPoolId, pool: &ElasticPool, mode: Refresh) {
    mode.set(&mut state.name, string(&id.elastic_pool_name));
    mode.set(&mut state.resource_group_name, string(&id.resource_group_name));
    mode.set(&mut state.server_name, string(&id.server_name));
    mode.set_location(&mut state.location, pool.location.as_deref());
    mode.set(&mut state.tags, flatten_tags(pool.tags.as_ref()));

    if let Some(sku) = &pool.sku {
        let mut refreshed = single(&state.sku).cloned().unwrap_or_default();
        mode.set(&mut refreshed.name, string(&sku.name));
        mode.set(&mut refreshed.tier, optional_string(sku.tier.clone()));
        mode.set_ignoring_case(&mut refreshed.family, sku.family.as_deref());
        mode.set(&mut refreshed.capacity, value_of(sku.capacity));
        state.sku = block(refreshed);
    }

    let properties = pool.properties.clone().unwrap_or_default();
    if let Some(settings) = &properties.per_database_settings {
        let unchanged = single(&state.per_database_settings).is_some_and(|configured| {
            decimal(&configured.min_capacity) == Some(settings.min_capacity)
                && decimal(&configured.max_capacity) == Some(settings.max_capacity)
        });
        if !unchanged {
            state.per_database_settings = block(PerDatabaseSettingsState {
                min_capacity: from_decimal(Some(settings.min_capacity)),
                max_capacity: from_decimal(Some(settings.max_capacity)),
            });
        }
    }
    mode.set(
        &mut state.max_size_gb,
        value_of(properties.max_size_bytes.map(|bytes| bytes / BYTES_PER_GB)),
    );
    mode.set(&mut state.zone_redundant, Value::Value(properties.zone_redundant.unwrap_or(false)));
    mode.set(&mut state.license_type, optional_string(properties.license_type));

    let maintenance = properties
        .maintenance_configuration_id
        .as_deref()
        .and_then(|id| MaintenanceConfigurationId::parse_insensitively(id).ok())
        .map(|id| id.name);
    mode.set_ignoring_case(&mut state.maintenance_configuration_name, maintenance.as_deref());
}

arm_resource!(
    SqlElasticPoolResource,
    ElasticPoolState,
    "SQL elastic pool",
    TIMEOUTS
);

impl SqlElasticPoolResource {
    fn plan_state(
        &self,
        _diags: &mut Diagnostics,
        state: &mut ElasticPoolState<'_>,
        prior: Option<&ElasticPoolState<'_>>,
    ) {
        default_to(&mut state.zone_redundant, false);
        default_to(
            &mut state.maintenance_configuration_name,
            DEFAULT_MAINTENANCE_CONFIGURATION.into(),
        );
        if prior.is_none() {
            if state.max_size_gb.is_null() {
                state.max_size_gb = Value::Unknown;
            }
            if state.license_type.is_null() {
                state.license_type = Value::Unknown;
            }
        }
    }

    fn replacements(prior: &ElasticPoolState<'_>, proposed: &ElasticPoolState<'_>) -> Vec<AttributePath> {
        let mut paths = schema::force_new!(prior, proposed, [name, resource_group_name, server_name]);
        if normalize_location(prior.location.as_str()) != normalize_location(proposed.location.as_str()) {
            paths.push(AttributePath::new("location"));
        }
        paths
    }

    async fn write<'a>(
        &self,
        clients: &Clients,
        id: &SqlElasticPoolId,
        mut state: ElasticPoolState<'a>,
        timeout: std::time::Duration,
    ) -> Result<ElasticPoolState<'a>> {
        let pool: ElasticPool = clients
            .arm
            .put_then_poll(&id.to_string(), API_VERSION, &expand(&state, id), timeout)
            .await
            .with_context(|| format!("writing {id}"))?;

        state.id = string(id.to_string());
        refresh(&mut state, id, &pool, Refresh::Unknowns);
        Ok(state)
    }

    async fn create_state<'a>(
        &self,
        clients: &Clients,
        state: ElasticPoolState<'a>,
        timeouts: Timeouts,
    ) -> Result<ElasticPoolState<'a>> {
        let id = SqlElasticPoolId::new(
            &clients.subscription_id,
            state.resource_group_name.as_str(),
            state.server_name.as_str(),
            state.name.as_str(),
        );

        let existing: Option<ElasticPool> = clients
            .arm
            .get_optional(&id.to_string(), API_VERSION)
            .await
            .with_context(|| format!("checking for presence of existing {id}"))?;
        if existing.is_some() {
            return Err(already_exists("azurerm_sql_elasticpool", &id));
        }

        let state = self.write(clients, &id, state, timeouts.create).await?;
        tracing::info!(%id, "created SQL elastic pool");
        Ok(state)
    }

    async fn read_state<'a>(
        &self,
        clients: &Clients,
        mut state: ElasticPoolState<'a>,
    ) -> Result<Option<ElasticPoolState<'a>>> {
        let id = SqlElasticPoolId::parse(state.id.as_str())?;
        let Some(pool) = clients
            .arm
            .get_optional::<ElasticPool>(&id.to_string(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {id}"))?
        else {
            return Ok(None);
        };

        refresh(&mut state, &id, &pool, Refresh::All);
        Ok(Some(state))
    }

    async fn update_state<'a>(
        &self,
        clients: &Clients,
        _prior: ElasticPoolState<'a>,
        state: ElasticPoolState<'a>,
        timeouts: Timeouts,
    ) -> Result<ElasticPoolState<'a>> {
        let id = SqlElasticPoolId::parse(state.id.as_str())?;
        let state = self.write(clients, &id, state, timeouts.update).await?;
        tracing::info!(%id, "updated SQL elastic pool");
        Ok(state)
    }

    async fn delete_state<'a>(
        &self,
        clients: &Clients,
        state: ElasticPoolState<'a>,
        timeouts: Timeouts,
    ) -> Result<()> {
        let id = SqlElasticPoolId::parse(state.id.as_str())?;
        clients
            .arm
            .delete_then_poll(&id.to_string(), API_VERSION, timeouts.delete)
            .await
            .with_context(|| format!("deleting {id}"))?;
        tracing::info!(%id, "deleted SQL elastic pool");
        Ok(())
    }

    fn import_state<'a>(id: &str) -> Result<ElasticPoolState<'a>> {
        SqlElasticPoolId::parse(id)?;
        Ok(ElasticPoolState {
            id: string(id),
            ..Default::default()
        })
    }
}

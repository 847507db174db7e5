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
use tf_provider::value::{Value, ValueList, ValueMap, ValueNumber, ValueString};
use tf_provider::schema::{Block, Description, Schema};
use tf_provider::{map, AttributePath, Diagnostics};

use crate::ids::{SqlDatabaseId, SqlFailoverGroupId, SqlServerId};
use crate::provider::Clients;
use crate::resource::{already_exists, arm_resource};
use crate::schema::{
    self, block, block_len, computed, elements, elements_mut, expand_string_set, expand_tags,
    flatten_tags, optional, optional_string, required, single, string, string_set, Refresh,
};
use crate::timeouts::{self, Timeouts, TimeoutsState};
use crate::utils::{WithSchema, WithValidate};
use crate::validate;

use super::models::{
    FailoverGroup, FailoverGroupProperties, PartnerInfo, ReadOnlyEndpoint, ReadWriteEndpoint,
};
use super::API_VERSION;

const TIMEOUTS: Timeouts = Timeouts::minutes(30, 5, 30, 30);

const READ_WRITE_MODES: &[&str] = &["Automatic", "Manual"];
const READ_ONLY_MODES: &[&str] = &["Enabled", "Disabled"];

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerServerState<'a> {
    pub id: ValueString<'a>,
    pub location: ValueString<'a>,
    pub role: ValueString<'a>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadWritePolicyState<'a> {
    pub mode: ValueString<'a>,
    pub grace_minutes: ValueNumber,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOnlyPolicyState<'a> {
    pub mode: ValueString<'a>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverGroupState<'a> {
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub resource_group_name: ValueString<'a>,
    pub server_name: ValueString<'a>,
    pub location: ValueString<'a>,
    pub role: ValueString<'a>,
    pub databases: ValueList<ValueString<'a>>,
    pub tags: ValueMap<'a, ValueString<'a>>,
    pub partner_servers: ValueList<Value<PartnerServerState<'a>>>,
    pub read_write_endpoint_failover_policy: ValueList<Value<ReadWritePolicyState<'a>>>,
    pub readonly_endpoint_failover_policy: ValueList<Value<ReadOnlyPolicyState<'a>>>,
    pub timeouts: ValueList<Value<TimeoutsState<'a>>>,
}

impl WithSchema for FailoverGroupState<'_> {
    fn schema() -> Schema {
        let partner_servers = NestedBlock::List(Block {
            description: Description::plain("Secondary servers of the group"),
            attributes: map! {
                "id"       => required(AttributeType::String, "ID of the partner SQL server"),
                "location" => computed(AttributeType::String, "Region of the partner server"),
                "role"     => computed(AttributeType::String, "Replication role of the partner server"),
            },
            ..Default::default()
        });
        let read_write = NestedBlock::List(Block {
            description: Description::plain("Failover policy of the read-write endpoint, exactly one block"),
            attributes: map! {
                "mode"          => required(AttributeType::String, "Automatic or Manual"),
                "grace_minutes" => optional(AttributeType::Number, "Grace period before an automatic failover with data loss"),
            },
            ..Default::default()
        });
        let read_only = NestedBlock::List(Block {
            description: Description::plain("Failover policy of the read-only endpoint"),
            attributes: map! {
                "mode" => required(AttributeType::String, "Enabled or Disabled"),
            },
            ..Default::default()
        });

        Schema {
            version: 1,
            block: Block {
                description: Description::plain("Failover group of Azure SQL databases"),
                attributes: map! {
                    "id"                  => schema::id(),
                    "name"                => required(AttributeType::String, "Name of the failover group"),
                    "resource_group_name" => schema::resource_group_name(),
                    "server_name"         => required(AttributeType::String, "Name of the primary SQL server"),
                    "location"            => computed(AttributeType::String, "Region of the primary server"),
                    "role"                => computed(AttributeType::String, "Replication role of the primary server"),
                    "databases"           => optional(string_set(), "IDs of the databases in the group"),
                    "tags"                => schema::tags(),
                },
                blocks: map! {
                    "partner_servers"                     => partner_servers,
                    "read_write_endpoint_failover_policy" => read_write,
                    "readonly_endpoint_failover_policy"   => read_only,
                    "timeouts"                            => timeouts::schema(TIMEOUTS, true),
                },
                ..Default::default()
            },
        }
    }
}

impl WithValidate for FailoverGroupState<'_> {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath) {
        validate::string(diags, attr_path.clone().attribute("name"), &self.name, validate::sql_server_name);
        validate::string(
            diags,
            attr_path.clone().attribute("server_name"),
            &self.server_name,
            validate::sql_server_name,
        );

        if let Value::Value(databases) = &self.databases {
            for (i, database) in databases.iter().enumerate() {
                validate::string(
                    diags,
                    attr_path.clone().attribute("databases").index(i as i64),
                    database,
                    validate::resource_id(SqlDatabaseId::parse),
                );
            }
        }

        if block_len(&self.partner_servers) == Some(0) {
            diags.error(
                "Missing `partner_servers` block",
                "at least one partner server is required",
                attr_path.clone().attribute("partner_servers"),
            );
        }
        for (i, partner) in elements(&self.partner_servers).enumerate() {
            validate::string(
                diags,
                attr_path.clone().attribute("partner_servers").index(i as i64).attribute("id"),
                &partner.id,
                validate::resource_id(SqlServerId::parse),
            );
        }

        let path = attr_path.clone().attribute("read_write_endpoint_failover_policy");
        if matches!(block_len(&self.read_write_endpoint_failover_policy), Some(len) if len != 1) {
            diags.error(
                "Invalid `read_write_endpoint_failover_policy` blocks",
                "exactly one `read_write_endpoint_failover_policy` block is required",
                path.clone(),
            );
        }
        if let Some(policy) = single(&self.read_write_endpoint_failover_policy) {
            let path = path.index(0);
            validate::string(
                diags,
                path.clone().attribute("mode"),
                &policy.mode,
                validate::one_of(READ_WRITE_MODES, false),
            );
            match (policy.mode.as_deref_option(), &policy.grace_minutes) {
                (Some("Automatic"), Value::Null) => diags.error(
                    "Missing grace period",
                    "`grace_minutes` is required when the mode is Automatic",
                    path.attribute("grace_minutes"),
                ),
                (Some("Manual"), Value::Value(_)) => diags.error(
                    "Unexpected grace period",
                    "`grace_minutes` can only be set when the mode is Automatic",
                    path.attribute("grace_minutes"),
                ),
                (_, grace) => validate::number(diags, path.attribute("grace_minutes"), grace, 1, i64::MAX),
            }
        }

        let path = attr_path.attribute("readonly_endpoint_failover_policy");
        if matches!(block_len(&self.readonly_endpoint_failover_policy), Some(len) if len > 1) {
            diags.error(
                "Invalid `readonly_endpoint_failover_policy` blocks",
                "at most one `readonly_endpoint_failover_policy` block is allowed",
                path.clone(),
            );
        }
        if let Some(policy) = single(&self.readonly_endpoint_failover_policy) {
            validate::string(
                diags,
                path.index(0).attribute("mode"),
                &policy.mode,
                validate::one_of(READ_ONLY_MODES, false),
            );
        }

        timeouts::validate(diags, &self.timeouts);
    }
}

fn expand(state: &FailoverGroupState<'_>) -> FailoverGroup {
    let read_write = single(&state.read_write_endpoint_failover_policy)
        .map(|policy| ReadWriteEndpoint {
            failover_policy: policy.mode.as_str().to_owned(),
            failover_with_data_loss_grace_period_minutes: policy.grace_minutes.as_ref_option().copied(),
        })
        .unwrap_or_default();
    let read_only = single(&state.readonly_endpoint_failover_policy).map(|policy| ReadOnlyEndpoint {
        failover_policy: policy.mode.as_str().to_owned(),
    });
    let partner_servers = elements(&state.partner_servers)
        .map(|partner| PartnerInfo {
            id: partner.id.as_str().to_owned(),
            ..Default::default()
        })
        .collect();

    FailoverGroup {
        tags: expand_tags(&state.tags),
        properties: Some(FailoverGroupProperties {
            read_write_endpoint: read_write,
            read_only_endpoint: read_only,
            partner_servers,
            databases: expand_string_set(&state.databases),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Configured spelling of an ID when the API returns it with another casing
fn configured_id<'a>(configured: impl IntoIterator<Item = &'a str>, returned: &str) -> String {
    configured
        .into_iter()
        .find(|id| id.eq_ignore_ascii_case(returned))
        .unwrap_or(returned)
        .to_owned()
}

fn refresh_partners(state: &mut FailoverGroupState<'_>, partners: &[PartnerInfo], mode: Refresh) {
    match mode {
        Refresh::All => {
            let configured: Vec<String> = elements(&state.partner_servers)
                .filter_map(|partner| partner.id.as_deref_option().map(str::to_owned))
                .collect();
            state.partner_servers = Value::Value(
                partners
                    .iter()
                    .map(|partner| {
                        Value::Value(PartnerServerState {
                            id: string(configured_id(configured.iter().map(String::as_str), &partner.id)),
                            location: optional_string(partner.location.clone()),
                            role: optional_string(partner.replication_role.clone()),
                        })
                    })
                    .collect(),
            );
        }
        Refresh::Unknowns => {
            for partner in elements_mut(&mut state.partner_servers) {
                let returned = partners
                    .iter()
                    .find(|returned| returned.id.eq_ignore_ascii_case(partner.id.as_str()));
                mode.set(
                    &mut partner.location,
                    optional_string(returned.and_then(|returned| returned.location.clone())),
                );
                mode.set(
                    &mut partner.role,
                    optional_string(returned.and_then(|returned| returned.replication_role.clone())),
                );
            }
        }
    }
}

fn refresh(state: &mut FailoverGroupState<'_>, id: &SqlFailoverGroupId, group: &FailoverGroup, mode: Refresh) {
    mode.set(&mut state.name, string(&id.failover_group_name));
    mode.set(&mut state.resource_group_name, string(&id.resource_group_name));
    mode.set(&mut state.server_name, string(&id.server_name));
    mode.set_location(&mut state.location, group.location.as_deref());
    mode.set(&mut state.tags, flatten_tags(group.tags.as_ref()));

    let properties = group.properties.clone().unwrap_or_default();
    mode.set(&mut state.role, optional_string(properties.replication_role.clone()));
    refresh_partners(state, &properties.partner_servers, mode);

    if mode == Refresh::All {
        let configured: Vec<String> = expand_string_set(&state.databases);
        let mut databases: Vec<String> = properties
            .databases
            .iter()
            .map(|database| configured_id(configured.iter().map(String::as_str), database))
            .collect();
        databases.sort_by_key(|database| database.to_lowercase());
        state.databases = if databases.is_empty() && state.databases.is_null() {
            Value::Null
        } else {
            Value::Value(databases.into_iter().map(string).collect())
        };

        let read_write = &properties.read_write_endpoint;
        state.read_write_endpoint_failover_policy = block(ReadWritePolicyState {
            mode: string(&read_write.failover_policy),
            grace_minutes: schema::value_of(read_write.failover_with_data_loss_grace_period_minutes),
        });

        // Azure reports a disabled read-only endpoint when none was configured
        let configured_read_only = block_len(&state.readonly_endpoint_failover_policy).unwrap_or(0) > 0;
        state.readonly_endpoint_failover_policy = match &properties.read_only_endpoint {
            Some(read_only) if configured_read_only || read_only.failover_policy != "Disabled" => {
                block(ReadOnlyPolicyState {
                    mode: string(&read_only.failover_policy),
                })
            }
            _ => Value::Null,
        };
    }
}

arm_resource!(
    SqlFailoverGroupResource,
    FailoverGroupState,
    "SQL failover group",
    TIMEOUTS
);

impl SqlFailoverGroupResource {
    fn plan_state(
        &self,
        _diags: &mut Diagnostics,
        state: &mut FailoverGroupState<'_>,
        prior: Option<&FailoverGroupState<'_>>,
    ) {
        if prior.is_none() {
            state.location = Value::Unknown;
            state.role = Value::Unknown;
        }

        let prior_partners: Vec<&PartnerServerState<'_>> = prior
            .map(|prior| elements(&prior.partner_servers).collect())
            .unwrap_or_default();
        for (i, partner) in elements_mut(&mut state.partner_servers).enumerate() {
            let unchanged = prior_partners
                .get(i)
                .is_some_and(|prior| prior.id.as_deref_option() == partner.id.as_deref_option());
            if !unchanged || partner.location.is_null() {
                partner.location = Value::Unknown;
                partner.role = Value::Unknown;
            }
        }
    }

    fn replacements(prior: &FailoverGroupState<'_>, proposed: &FailoverGroupState<'_>) -> Vec<AttributePath> {
        schema::force_new!(prior, proposed, [name, resource_group_name, server_name])
    }

    async fn write<'a>(
        &self,
        clients: &Clients,
        id: &SqlFailoverGroupId,
        mut state: FailoverGroupState<'a>,
        timeout: std::time::Duration,
    ) -> Result<FailoverGroupState<'a>> {
        let group: FailoverGroup = clients
            .arm
            .put_then_poll(&id.to_string(), API_VERSION, &expand(&state), timeout)
            .await
            .with_context(|| format!("writing {id}"))?;

        state.id = string(id.to_string());
        refresh(&mut state, id, &group, Refresh::Unknowns);
        Ok(state)
    }

    async fn create_state<'a>(
        &self,
        clients: &Clients,
        state: FailoverGroupState<'a>,
        timeouts: Timeouts,
    ) -> Result<FailoverGroupState<'a>> {
        let id = SqlFailoverGroupId::new(
            &clients.subscription_id,
            state.resource_group_name.as_str(),
            state.server_name.as_str(),
            state.name.as_str(),
        );

        let existing: Option<FailoverGroup> = clients
            .arm
            .get_optional(&id.to_string(), API_VERSION)
            .await
            .with_context(|| format!("checking for presence of existing {id}"))?;
        if existing.is_some() {
            return Err(already_exists("azurerm_sql_failover_group", &id));
        }

        let state = self.write(clients, &id, state, timeouts.create).await?;
        tracing::info!(%id, "created SQL failover group");
        Ok(state)
    }

    async fn read_state<'a>(
        &self,
        clients: &Clients,
        mut state: FailoverGroupState<'a>,
    ) -> Result<Option<FailoverGroupState<'a>>> {
        let id = SqlFailoverGroupId::parse(state.id.as_str())?;
        let Some(group) = clients
            .arm
            .get_optional::<FailoverGroup>(&id.to_string(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {id}"))?
        else {
            return Ok(None);
        };

        refresh(&mut state, &id, &group, Refresh::All);
        Ok(Some(state))
    }

    async fn update_state<'a>(
        &self,
        clients: &Clients,
        _prior: FailoverGroupState<'a>,
        state: FailoverGroupState<'a>,
        timeouts: Timeouts,
    ) -> Result<FailoverGroupState<'a>> {
        let id = SqlFailoverGroupId::parse(state.id.as_str())?;
        let state = self.write(clients, &id, state, timeouts.update).await?;
        tracing::info!(%id, "updated SQL failover group");
        Ok(state)
    }

    async fn delete_state<'a>(
        &self,
        clients: &Clients,
        state: FailoverGroupState<'a>,
        timeouts: Timeouts,
    ) -> Result<()> {
        let id = SqlFailoverGroupId::parse(state.id.as_str())?;
        clients
            .arm
            .delete_then_poll(&id.to_string(), API_VERSION, timeouts.delete)
            .await
            .with_context(|| format!("deleting {id}"))?;
        tracing::info!(%id, "deleted SQL failover group");
        Ok(())
    }

    fn import_state<'a>(id: &str) -> Result<FailoverGroupState<'a>> {
        SqlFailoverGroupId::parse(id)?;
        Ok(FailoverGroupState {
            id: string(id),
            ..Default::default()
        })
    }
}

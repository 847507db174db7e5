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

//! Read-only lookups of SQL servers and databases.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tf_provider::schema::AttributeType;
use tf_provider::value::{Value, ValueBool, ValueMap, ValueNumber, ValueString};
use tf_provider::schema::{Block, Description, Schema};
use tf_provider::{map, AttributePath, Diagnostics};

use crate::ids::{SqlDatabaseId, SqlServerId};
use crate::provider::Clients;
use crate::resource::arm_data_source;
use crate::schema::{self, computed, flatten_tags, optional_string, required, string, value_of};
use crate::utils::{WithSchema, WithValidate};
use crate::validate;

use super::models::{Database, Server};
use super::API_VERSION;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerLookup<'a> {
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub resource_group_name: ValueString<'a>,
    pub location: ValueString<'a>,
    pub version: ValueString<'a>,
    pub administrator_login: ValueString<'a>,
    pub fully_qualified_domain_name: ValueString<'a>,
    pub tags: ValueMap<'a, ValueString<'a>>,
}

impl WithSchema for ServerLookup<'_> {
    fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                description: Description::plain("Existing Azure SQL server"),
                attributes: map! {
                    "id"                          => schema::id(),
                    "name"                        => required(AttributeType::String, "Name of the server"),
                    "resource_group_name"         => schema::resource_group_name(),
                    "location"                    => computed(AttributeType::String, "Azure region of the server"),
                    "version"                     => computed(AttributeType::String, "Version of the server"),
                    "administrator_login"         => computed(AttributeType::String, "Login of the server administrator"),
                    "fully_qualified_domain_name" => computed(AttributeType::String, "Host name of the server"),
                    "tags"                        => computed(schema::string_map(), "Tags assigned to the server"),
                },
                ..Default::default()
            },
        }
    }
}

impl WithValidate for ServerLookup<'_> {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath) {
        validate::string(diags, attr_path.clone().attribute("name"), &self.name, validate::sql_server_name);
        validate::string(
            diags,
            attr_path.attribute("resource_group_name"),
            &self.resource_group_name,
            validate::not_empty,
        );
    }
}

arm_data_source!(SqlServerDataSource, ServerLookup, "SQL server");

impl SqlServerDataSource {
    async fn read_state<'a>(&self, clients: &Clients, mut state: ServerLookup<'a>) -> Result<ServerLookup<'a>> {
        let id = SqlServerId::new(
            &clients.subscription_id,
            state.resource_group_name.as_str(),
            state.name.as_str(),
        );
        let server: Server = clients
            .arm
            .get_optional(&id.to_string(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {id}"))?
            .ok_or_else(|| anyhow!("{id} was not found"))?;
        let properties = server.properties.unwrap_or_default();

        state.id = string(id.to_string());
        state.location = optional_string(server.location.as_deref().map(schema::normalize_location));
        state.version = optional_string(properties.version);
        state.administrator_login = optional_string(properties.administrator_login);
        state.fully_qualified_domain_name = optional_string(properties.fully_qualified_domain_name);
        state.tags = flatten_tags(server.tags.as_ref());
        Ok(state)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseLookup<'a> {
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub server_id: ValueString<'a>,
    pub collation: ValueString<'a>,
    pub elastic_pool_id: ValueString<'a>,
    pub license_type: ValueString<'a>,
    pub max_size_gb: ValueNumber,
    pub read_scale: ValueBool,
    pub sku_name: ValueString<'a>,
    pub zone_redundant: ValueBool,
    pub tags: ValueMap<'a, ValueString<'a>>,
}

impl WithSchema for DatabaseLookup<'_> {
    fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                description: Description::plain("Existing database of an Azure SQL server"),
                attributes: map! {
                    "id"              => schema::id(),
                    "name"            => required(AttributeType::String, "Name of the database"),
                    "server_id"       => required(AttributeType::String, "ID of the SQL server hosting the database"),
                    "collation"       => computed(AttributeType::String, "Collation of the database"),
                    "elastic_pool_id" => computed(AttributeType::String, "Elastic pool hosting the database"),
                    "license_type"    => computed(AttributeType::String, "License type of the database"),
                    "max_size_gb"     => computed(AttributeType::Number, "Maximum size of the database in gigabytes"),
                    "read_scale"      => computed(AttributeType::Bool, "Whether read-only connections go to a replica"),
                    "sku_name"        => computed(AttributeType::String, "Current service objective of the database"),
                    "zone_redundant"  => computed(AttributeType::Bool, "Whether replicas are spread across availability zones"),
                    "tags"            => computed(schema::string_map(), "Tags assigned to the database"),
                },
                ..Default::default()
            },
        }
    }
}

impl WithValidate for DatabaseLookup<'_> {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath) {
        validate::string(diags, attr_path.clone().attribute("name"), &self.name, validate::sql_database_name);
        validate::string(
            diags,
            attr_path.attribute("server_id"),
            &self.server_id,
            validate::resource_id(SqlServerId::parse),
        );
    }
}

arm_data_source!(SqlDatabaseDataSource, DatabaseLookup, "SQL database");

impl SqlDatabaseDataSource {
    async fn read_state<'a>(&self, clients: &Clients, mut state: DatabaseLookup<'a>) -> Result<DatabaseLookup<'a>> {
        let id: SqlDatabaseId = SqlServerId::parse(state.server_id.as_str())?.database(state.name.as_str());
        let database: Database = clients
            .arm
            .get_optional(&id.to_string(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {id}"))?
            .ok_or_else(|| anyhow!("{id} was not found"))?;
        let properties = database.properties.unwrap_or_default();
        let sku_name = properties
            .current_service_objective_name
            .or_else(|| database.sku.map(|sku| sku.name));

        state.id = string(id.to_string());
        state.collation = optional_string(properties.collation);
        state.elastic_pool_id = optional_string(properties.elastic_pool_id);
        state.license_type = optional_string(properties.license_type);
        state.max_size_gb = value_of(properties.max_size_bytes.map(|bytes| bytes / 1_073_741_824));
        state.read_scale = match properties.read_scale.as_deref() {
            Some(read_scale) => Value::Value(read_scale == "Enabled"),
            None => Value::Null,
        };
        state.sku_name = optional_string(sku_name);
        state.zone_redundant = value_of(properties.zone_redundant);
        state.tags = flatten_tags(database.tags.as_ref());
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tf_provider::DataSource;

    use crate::testing::{FakeArm, SUBSCRIPTION};

    use super::*;

    const SERVER: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/group1/providers/Microsoft.Sql/servers/lookup1";

    #[tokio::test]
    async fn server_lookup() {
        let fake = FakeArm::new();
        fake.insert(
            SERVER,
            json!({
                "location": "West Europe",
                "tags": {"env": "test"},
                "properties": {
                    "version": "12.0",
                    "administratorLogin": "sqladmin",
                    "fullyQualifiedDomainName": "lookup1.database.windows.net",
                },
            }),
        );
        let data_source = SqlServerDataSource::new(fake.handle());
        let mut diags = Diagnostics::default();
        let config = ServerLookup {
            name: string("lookup1"),
            resource_group_name: string("group1"),
            ..Default::default()
        };

        let state = data_source.read(&mut diags, config, Value::Null).await.unwrap();
        assert!(state.id.as_str().starts_with(&format!("/subscriptions/{SUBSCRIPTION}/")));
        assert_eq!(state.location.as_str(), "westeurope");
        assert_eq!(state.version.as_str(), "12.0");
        assert_eq!(state.administrator_login.as_str(), "sqladmin");
        assert_eq!(state.fully_qualified_domain_name.as_str(), "lookup1.database.windows.net");
        assert!(!state.tags.is_null());
    }

    #[tokio::test]
    async fn database_lookup() {
        let fake = FakeArm::new();
        fake.insert(
            &format!("{SERVER}/databases/db1"),
            json!({
                "sku": {"name": "GP_Gen5", "tier": "GeneralPurpose"},
                "properties": {
                    "collation": "SQL_Latin1_General_CP1_CI_AS",
                    "maxSizeBytes": 34359738368_i64,
                    "readScale": "Disabled",
                    "currentServiceObjectiveName": "GP_Gen5_2",
                    "zoneRedundant": false,
                },
            }),
        );
        let data_source = SqlDatabaseDataSource::new(fake.handle());
        let mut diags = Diagnostics::default();
        let config = DatabaseLookup {
            name: string("db1"),
            server_id: string(SERVER),
            ..Default::default()
        };

        let state = data_source.read(&mut diags, config, Value::Null).await.unwrap();
        assert_eq!(state.sku_name.as_str(), "GP_Gen5_2");
        assert_eq!(state.max_size_gb, Value::Value(32));
        assert_eq!(state.read_scale, Value::Value(false));
        assert!(state.elastic_pool_id.is_null());
        assert!(state.tags.is_null());
    }

    #[tokio::test]
    async fn missing_database_is_an_error() {
        let fake = FakeArm::new();
        let data_source = SqlDatabaseDataSource::new(fake.handle());
        let mut diags = Diagnostics::default();
        let config = DatabaseLookup {
            name: string("missing"),
            server_id: string(SERVER),
            ..Default::default()
        };

        assert!(data_source.read(&mut diags, config, Value::Null).await.is_none());
        assert_eq!(diags.errors.len(), 1);
    }
}

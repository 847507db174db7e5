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
use tf_provider::value::{Value, ValueBool, ValueList, ValueMap, ValueString};
use tf_provider::schema::{Block, Description, Schema};
use tf_provider::{map, AttributePath, Diagnostics};

use crate::ids::SqlServerId;
use crate::provider::Clients;
use crate::resource::{already_exists, arm_resource};
use crate::schema::{
    self, computed, default_to, defaulted, expand_tags, flatten_tags, normalize_location,
    optional_string, required, sensitive, string, Refresh,
};
use crate::timeouts::{self, Timeouts, TimeoutsState};
use crate::utils::{WithSchema, WithValidate};
use crate::validate;

use super::models::{Server, ServerProperties};
use super::API_VERSION;

const TIMEOUTS: Timeouts = Timeouts::minutes(60, 5, 60, 60);

const VERSIONS: &[&str] = &["2.0", "12.0"];
const TLS_VERSIONS: &[&str] = &["1.0", "1.1", "1.2"];

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerState<'a> {
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub resource_group_name: ValueString<'a>,
    pub location: ValueString<'a>,
    pub version: ValueString<'a>,
    pub administrator_login: ValueString<'a>,
    pub administrator_login_password: ValueString<'a>,
    pub minimum_tls_version: ValueString<'a>,
    pub public_network_access_enabled: ValueBool,
    pub fully_qualified_domain_name: ValueString<'a>,
    pub tags: ValueMap<'a, ValueString<'a>>,
    pub timeouts: ValueList<Value<TimeoutsState<'a>>>,
}

impl WithSchema for ServerState<'_> {
    fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                description: Description::plain("Azure SQL logical server"),
                attributes: map! {
                    "id"                            => schema::id(),
                    "name"                          => required(AttributeType::String, "Name of the SQL server, unique across Azure"),
                    "resource_group_name"           => schema::resource_group_name(),
                    "location"                      => schema::location(),
                    "version"                       => required(AttributeType::String, "Server version: 2.0 or 12.0"),
                    "administrator_login"           => required(AttributeType::String, "Login of the server administrator"),
                    "administrator_login_password"  => sensitive(required(AttributeType::String, "Password of the server administrator")),
                    "minimum_tls_version"           => defaulted(AttributeType::String, "Minimum TLS version of client connections (default: 1.2)"),
                    "public_network_access_enabled" => defaulted(AttributeType::Bool, "Whether the server is reachable from public networks (default: true)"),
                    "fully_qualified_domain_name"   => computed(AttributeType::String, "Host name of the server"),
                    "tags"                          => schema::tags(),
                },
                blocks: map! {
                    "timeouts" => timeouts::schema(TIMEOUTS, true),
                },
                ..Default::default()
            },
        }
    }
}

impl WithValidate for ServerState<'_> {
    fn validate(&self, diags: &mut Diagnostics, attr_path: AttributePath) {
        validate::string(
            diags,
            attr_path.clone().attribute("name"),
            &self.name,
            validate::sql_server_name,
        );
        validate::string(
            diags,
            attr_path.clone().attribute("version"),
            &self.version,
            validate::one_of(VERSIONS, false),
        );
        validate::string(
            diags,
            attr_path.clone().attribute("administrator_login"),
            &self.administrator_login,
            validate::not_empty,
        );
        validate::string(
            diags,
            attr_path.attribute("minimum_tls_version"),
            &self.minimum_tls_version,
            validate::one_of(TLS_VERSIONS, false),
        );
        timeouts::validate(diags, &self.timeouts);
    }
}

fn expand(state: &ServerState<'_>) -> Server {
    let public_network_access = match state.public_network_access_enabled {
        Value::Value(false) => "Disabled",
        _ => "Enabled",
    };

    Server {
        location: Some(normalize_location(state.location.as_str())),
        tags: expand_tags(&state.tags),
        properties: Some(ServerProperties {
            version: Some(state.version.as_str().to_owned()),
            administrator_login: Some(state.administrator_login.as_str().to_owned()),
            administrator_login_password: schema::known(&state.administrator_login_password)
                .map(str::to_owned),
            minimal_tls_version: schema::known(&state.minimum_tls_version).map(str::to_owned),
            public_network_access: Some(public_network_access.to_owned()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Copy the API view of a server into a state, the password is never returned
fn refresh(state: &mut ServerState<'_>, id: &SqlServerId, server: &Server, mode: Refresh) {
    mode.set(&mut state.name, string(&id.server_name));
    mode.set(&mut state.resource_group_name, string(&id.resource_group_name));
    mode.set_location(&mut state.location, server.location.as_deref());
    mode.set(&mut state.tags, flatten_tags(server.tags.as_ref()));

    let properties = server.properties.clone().unwrap_or_default();
    mode.set(&mut state.version, optional_string(properties.version));
    mode.set(
        &mut state.administrator_login,
        optional_string(properties.administrator_login),
    );
    mode.set(
        &mut state.minimum_tls_version,
        optional_string(properties.minimal_tls_version),
    );
    mode.set(
        &mut state.public_network_access_enabled,
        Value::Value(properties.public_network_access.as_deref() != Some("Disabled")),
    );
    mode.set(
        &mut state.fully_qualified_domain_name,
        optional_string(properties.fully_qualified_domain_name),
    );
}

arm_resource!(SqlServerResource, ServerState, "SQL server", TIMEOUTS);

impl SqlServerResource {
    fn plan_state(
        &self,
        _diags: &mut Diagnostics,
        state: &mut ServerState<'_>,
        prior: Option<&ServerState<'_>>,
    ) {
        default_to(&mut state.minimum_tls_version, "1.2".into());
        default_to(&mut state.public_network_access_enabled, true);
        if prior.is_none() {
            state.fully_qualified_domain_name = Value::Unknown;
        }
    }

    fn replacements(prior: &ServerState<'_>, proposed: &ServerState<'_>) -> Vec<AttributePath> {
        let mut paths = schema::force_new!(
            prior,
            proposed,
            [name, resource_group_name, version, administrator_login]
        );
        if normalize_location(prior.location.as_str()) != normalize_location(proposed.location.as_str()) {
            paths.push(AttributePath::new("location"));
        }
        paths
    }

    async fn create_state<'a>(
        &self,
        clients: &Clients,
        mut state: ServerState<'a>,
        timeouts: Timeouts,
    ) -> Result<ServerState<'a>> {
        let id = SqlServerId::new(
            &clients.subscription_id,
            state.resource_group_name.as_str(),
            state.name.as_str(),
        );
        let path = id.to_string();

        let existing: Option<Server> = clients
            .arm
            .get_optional(&path, API_VERSION)
            .await
            .with_context(|| format!("checking for presence of existing {id}"))?;
        if existing.is_some() {
            return Err(already_exists("azurerm_sql_server", &id));
        }

        let server: Server = clients
            .arm
            .put_then_poll(&path, API_VERSION, &expand(&state), timeouts.create)
            .await
            .with_context(|| format!("creating {id}"))?;
        tracing::info!(%id, "created SQL server");

        state.id = string(path);
        refresh(&mut state, &id, &server, Refresh::Unknowns);
        Ok(state)
    }

    async fn read_state<'a>(
        &self,
        clients: &Clients,
        mut state: ServerState<'a>,
    ) -> Result<Option<ServerState<'a>>> {
        let id = SqlServerId::parse(state.id.as_str())?;
        let Some(server) = clients
            .arm
            .get_optional::<Server>(&id.to_string(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {id}"))?
        else {
            return Ok(None);
        };

        refresh(&mut state, &id, &server, Refresh::All);
        Ok(Some(state))
    }

    async fn update_state<'a>(
        &self,
        clients: &Clients,
        _prior: ServerState<'a>,
        mut state: ServerState<'a>,
        timeouts: Timeouts,
    ) -> Result<ServerState<'a>> {
        let id = SqlServerId::parse(state.id.as_str())?;
        let server: Server = clients
            .arm
            .put_then_poll(&id.to_string(), API_VERSION, &expand(&state), timeouts.update)
            .await
            .with_context(|| format!("updating {id}"))?;
        tracing::info!(%id, "updated SQL server");

        refresh(&mut state, &id, &server, Refresh::Unknowns);
        Ok(state)
    }

    async fn delete_state<'a>(
        &self,
        clients: &Clients,
        state: ServerState<'a>,
        timeouts: Timeouts,
    ) -> Result<()> {
        let id = SqlServerId::parse(state.id.as_str())?;
        clients
            .arm
            .delete_then_poll(&id.to_string(), API_VERSION, timeouts.delete)
            .await
            .with_context(|| format!("deleting {id}"))?;
        tracing::info!(%id, "deleted SQL server");
        Ok(())
    }

    fn import_state<'a>(id: &str) -> Result<ServerState<'a>> {
        SqlServerId::parse(id)?;
        Ok(ServerState {
            id: string(id),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::{Method, StatusCode};
    use serde_json::json;
    use tf_provider::Resource;

    use crate::client::Response;
    use crate::testing::{FakeArm, ENDPOINT, SUBSCRIPTION};

    use super::*;

    fn server_path() -> String {
        format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/group1/providers/Microsoft.Sql/servers/server1")
    }

    fn config() -> ServerState<'static> {
        ServerState {
            name: string("server1"),
            resource_group_name: string("group1"),
            location: string("West Europe"),
            version: string("12.0"),
            administrator_login: string("admin"),
            administrator_login_password: string("s3cr3t!Passw0rd"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn plan_applies_defaults() {
        let resource = SqlServerResource::default();
        let mut diags = Diagnostics::default();

        let (planned, _) = resource
            .plan_create(&mut diags, config(), config(), Value::Null)
            .await
            .unwrap();
        assert_eq!(planned.minimum_tls_version.as_str(), "1.2");
        assert_eq!(planned.public_network_access_enabled, Value::Value(true));
        assert!(planned.fully_qualified_domain_name.is_unknown());
        assert_eq!(planned.location.as_str(), "West Europe");
    }

    #[tokio::test(start_paused = true)]
    async fn create_follows_the_async_operation() {
        let fake = FakeArm::new();
        fake.defaults(
            "/servers/",
            json!({"properties": {"fullyQualifiedDomainName": "server1.database.windows.net"}}),
        );
        let operation = format!("{ENDPOINT}/operations/op1");
        fake.enqueue(
            Method::PUT,
            &server_path(),
            Response::new(StatusCode::CREATED, "{}")
                .with_header("azure-asyncoperation", operation.as_str())
                .with_header("retry-after", "10"),
        );
        for status in ["InProgress", "InProgress", "Succeeded"] {
            fake.enqueue(
                Method::GET,
                "/operations/op1",
                Response::new(StatusCode::OK, json!({ "status": status }).to_string()),
            );
        }

        let resource = SqlServerResource::new(fake.handle());
        let mut diags = Diagnostics::default();
        let (planned, private) = resource
            .plan_create(&mut diags, config(), config(), Value::Null)
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        let (state, _) = resource
            .create(&mut diags, planned, config(), private, Value::Null)
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_secs(20));
        assert_eq!(state.fully_qualified_domain_name.as_str(), "server1.database.windows.net");

        // A second creation finds the server
        let (planned, private) = resource
            .plan_create(&mut diags, config(), config(), Value::Null)
            .await
            .unwrap();
        assert!(resource
            .create(&mut diags, planned, config(), private, Value::Null)
            .await
            .is_none());
        assert_eq!(diags.errors.len(), 1);
    }

    #[tokio::test]
    async fn lifecycle() {
        let fake = FakeArm::new();
        fake.defaults(
            "/servers/",
            json!({"properties": {"fullyQualifiedDomainName": "server1.database.windows.net"}}),
        );
        let resource = SqlServerResource::new(fake.handle());
        let mut diags = Diagnostics::default();

        let (planned, private) = resource
            .plan_create(&mut diags, config(), config(), Value::Null)
            .await
            .unwrap();
        let (state, private) = resource
            .create(&mut diags, planned, config(), private, Value::Null)
            .await
            .unwrap();
        assert_eq!(state.id.as_str(), server_path());
        assert_eq!(state.fully_qualified_domain_name.as_str(), "server1.database.windows.net");

        let sent = fake.sent(Method::PUT, &server_path());
        assert_eq!(sent[0]["location"], "westeurope");
        assert_eq!(sent[0]["properties"]["administratorLoginPassword"], "s3cr3t!Passw0rd");
        assert_eq!(sent[0]["properties"]["publicNetworkAccess"], "Enabled");

        // The password is never returned, the configured one is kept
        let (read, _) = resource
            .read(&mut diags, state.clone(), private.clone(), Value::Null)
            .await
            .unwrap();
        assert_eq!(read.administrator_login_password.as_str(), "s3cr3t!Passw0rd");
        assert_eq!(read.location.as_str(), "West Europe");
        assert!(read.tags.is_null());

        let proposed = ServerState {
            public_network_access_enabled: Value::Value(false),
            ..read.clone()
        };
        let (planned, private, replace) = resource
            .plan_update(&mut diags, read.clone(), proposed.clone(), proposed, private, Value::Null)
            .await
            .unwrap();
        assert!(replace.is_empty());
        let (updated, private) = resource
            .update(&mut diags, read, planned.clone(), planned, private, Value::Null)
            .await
            .unwrap();
        assert_eq!(updated.public_network_access_enabled, Value::Value(false));
        assert_eq!(
            fake.get(&server_path()).unwrap()["properties"]["publicNetworkAccess"],
            "Disabled"
        );

        resource
            .destroy(&mut diags, updated, private, Value::Null)
            .await
            .unwrap();
        assert!(fake.get(&server_path()).is_none());
        assert!(diags.errors.is_empty());
    }

    #[tokio::test]
    async fn location_spelling_does_not_replace() {
        let resource = SqlServerResource::default();
        let mut diags = Diagnostics::default();
        let prior = ServerState {
            id: string(server_path()),
            location: string("westeurope"),
            ..config()
        };
        let (_, _, replace) = resource
            .plan_update(&mut diags, prior.clone(), config(), config(), Value::Null, Value::Null)
            .await
            .unwrap();
        assert!(replace.is_empty());

        let moved = ServerState {
            location: string("North Europe"),
            ..config()
        };
        let (_, _, replace) = resource
            .plan_update(&mut diags, prior, moved.clone(), moved, Value::Null, Value::Null)
            .await
            .unwrap();
        assert_eq!(replace.len(), 1);
    }

    #[tokio::test]
    async fn validation() {
        let resource = SqlServerResource::default();
        let mut diags = Diagnostics::default();
        let config = ServerState {
            name: string("Server_1"),
            version: string("11.0"),
            minimum_tls_version: string("1.3"),
            ..config()
        };
        assert!(resource.validate(&mut diags, config).await.is_none());
        assert_eq!(diags.errors.len(), 3);
    }
}

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

//! Typed Azure Resource Manager identifiers.

use thiserror::Error;

mod parse;

pub(crate) use parse::{format_segments, parse_segments, Segment};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("parsing {description} ID {id:?}: expected {expected:?} at segment {position} (expected format: {template})")]
    Segment {
        description: &'static str,
        id: String,
        expected: String,
        position: usize,
        template: String,
    },

    #[error("parsing {description} ID {id:?}: segment {key:?} has no value")]
    EmptyValue {
        description: &'static str,
        id: String,
        key: &'static str,
    },

    #[error("parsing {description} ID {id:?}: expected {expected} segments, found {found} (expected format: {template})")]
    Length {
        description: &'static str,
        id: String,
        expected: usize,
        found: usize,
        template: String,
    },
}

macro_rules! resource_id {
    (
        $(#[$meta:meta])*
        $name:ident($description:literal) {
            $($field:ident: $key:literal),+ $(,)?
        }
        $(providers $namespace:literal {
            $($pfield:ident: $pkey:literal),+ $(,)?
        })?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            $(pub $field: String,)+
            $($(pub $pfield: String,)+)?
        }

        impl $name {
            const SEGMENTS: &'static [Segment] = &[
                $(Segment::Value($key, stringify!($field)),)+
                $(
                    Segment::Constant("providers", $namespace),
                    $(Segment::Value($pkey, stringify!($pfield)),)+
                )?
            ];

            #[allow(clippy::too_many_arguments)]
            pub fn new(
                $($field: impl Into<String>,)+
                $($($pfield: impl Into<String>,)+)?
            ) -> Self {
                Self {
                    $($field: $field.into(),)+
                    $($($pfield: $pfield.into(),)+)?
                }
            }

            /// Parse an ID, segment keys must match exactly
            pub fn parse(id: &str) -> Result<Self, IdError> {
                Self::parse_with(id, false)
            }

            /// Parse an ID returned by the API, ignoring the casing of segment keys
            pub fn parse_insensitively(id: &str) -> Result<Self, IdError> {
                Self::parse_with(id, true)
            }

            fn parse_with(id: &str, insensitive: bool) -> Result<Self, IdError> {
                let mut values =
                    parse_segments($description, Self::SEGMENTS, id, insensitive)?.into_iter();
                Ok(Self {
                    $($field: values.next().unwrap_or_default(),)+
                    $($($pfield: values.next().unwrap_or_default(),)+)?
                })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                format_segments(
                    f,
                    Self::SEGMENTS,
                    &[$(&self.$field,)+ $($(&self.$pfield,)+)?],
                )
            }
        }
    };
}

resource_id! {
    ResourceGroupId("Resource Group") {
        subscription_id: "subscriptions",
        resource_group_name: "resourceGroups",
    }
}

resource_id! {
    SubnetId("Subnet") {
        subscription_id: "subscriptions",
        resource_group_name: "resourceGroups",
    }
    providers "Microsoft.Network" {
        virtual_network_name: "virtualNetworks",
        subnet_name: "subnets",
    }
}

resource_id! {
    MaintenanceConfigurationId("Public Maintenance Configuration") {
        subscription_id: "subscriptions",
    }
    providers "Microsoft.Maintenance" {
        name: "publicMaintenanceConfigurations",
    }
}

resource_id! {
    SqlServerId("SQL Server") {
        subscription_id: "subscriptions",
        resource_group_name: "resourceGroups",
    }
    providers "Microsoft.Sql" {
        server_name: "servers",
    }
}

resource_id! {
    SqlDatabaseId("SQL Database") {
        subscription_id: "subscriptions",
        resource_group_name: "resourceGroups",
    }
    providers "Microsoft.Sql" {
        server_name: "servers",
        database_name: "databases",
    }
}

resource_id! {
    SqlElasticPoolId("SQL Elastic Pool") {
        subscription_id: "subscriptions",
        resource_group_name: "resourceGroups",
    }
    providers "Microsoft.Sql" {
        server_name: "servers",
        elastic_pool_name: "elasticPools",
    }
}

resource_id! {
    SqlFailoverGroupId("SQL Failover Group") {
        subscription_id: "subscriptions",
        resource_group_name: "resourceGroups",
    }
    providers "Microsoft.Sql" {
        server_name: "servers",
        failover_group_name: "failoverGroups",
    }
}

resource_id! {
    SqlFirewallRuleId("SQL Firewall Rule") {
        subscription_id: "subscriptions",
        resource_group_name: "resourceGroups",
    }
    providers "Microsoft.Sql" {
        server_name: "servers",
        firewall_rule_name: "firewallRules",
    }
}

resource_id! {
    SqlVirtualNetworkRuleId("SQL Virtual Network Rule") {
        subscription_id: "subscriptions",
        resource_group_name: "resourceGroups",
    }
    providers "Microsoft.Sql" {
        server_name: "servers",
        virtual_network_rule_name: "virtualNetworkRules",
    }
}

resource_id! {
    RedisCacheId("Redis Cache") {
        subscription_id: "subscriptions",
        resource_group_name: "resourceGroups",
    }
    providers "Microsoft.Cache" {
        redis_name: "redis",
    }
}

resource_id! {
    RedisFirewallRuleId("Redis Firewall Rule") {
        subscription_id: "subscriptions",
        resource_group_name: "resourceGroups",
    }
    providers "Microsoft.Cache" {
        redis_name: "redis",
        firewall_rule_name: "firewallRules",
    }
}

resource_id! {
    RedisLinkedServerId("Redis Linked Server") {
        subscription_id: "subscriptions",
        resource_group_name: "resourceGroups",
    }
    providers "Microsoft.Cache" {
        redis_name: "redis",
        linked_server_name: "linkedServers",
    }
}

resource_id! {
    RedisAccessPolicyId("Redis Access Policy") {
        subscription_id: "subscriptions",
        resource_group_name: "resourceGroups",
    }
    providers "Microsoft.Cache" {
        redis_name: "redis",
        access_policy_name: "accessPolicies",
    }
}

resource_id! {
    RedisAccessPolicyAssignmentId("Redis Access Policy Assignment") {
        subscription_id: "subscriptions",
        resource_group_name: "resourceGroups",
    }
    providers "Microsoft.Cache" {
        redis_name: "redis",
        access_policy_assignment_name: "accessPolicyAssignments",
    }
}

impl SqlServerId {
    pub fn database(&self, name: impl Into<String>) -> SqlDatabaseId {
        SqlDatabaseId::new(
            &self.subscription_id,
            &self.resource_group_name,
            &self.server_name,
            name,
        )
    }
}

impl SqlDatabaseId {
    pub fn server_id(&self) -> SqlServerId {
        SqlServerId::new(
            &self.subscription_id,
            &self.resource_group_name,
            &self.server_name,
        )
    }
}

impl SqlElasticPoolId {
    pub fn server_id(&self) -> SqlServerId {
        SqlServerId::new(
            &self.subscription_id,
            &self.resource_group_name,
            &self.server_name,
        )
    }
}

impl RedisCacheId {
    pub fn patch_schedule_path(&self) -> String {
        format!("{self}/patchSchedules/default")
    }
}

macro_rules! redis_child {
    ($($child:ident),+) => {
        $(
            impl $child {
                pub fn redis_id(&self) -> RedisCacheId {
                    RedisCacheId::new(
                        &self.subscription_id,
                        &self.resource_group_name,
                        &self.redis_name,
                    )
                }
            }
        )+
    };
}

redis_child!(
    RedisFirewallRuleId,
    RedisLinkedServerId,
    RedisAccessPolicyId,
    RedisAccessPolicyAssignmentId
);

#[cfg(test)]
mod tests {
    use super::*;

    const DATABASE: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/group1/providers/Microsoft.Sql/servers/server1/databases/db1";

    #[test]
    fn database_id() {
        let id = SqlDatabaseId::parse(DATABASE).unwrap();
        assert_eq!(id.resource_group_name, "group1");
        assert_eq!(id.server_name, "server1");
        assert_eq!(id.database_name, "db1");
        assert_eq!(id.to_string(), DATABASE);
        assert_eq!(
            id.server_id().to_string(),
            "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/group1/providers/Microsoft.Sql/servers/server1"
        );
    }

    #[test]
    fn insensitive_keys() {
        let raw = "/subscriptions/sub/resourcegroups/group1/providers/microsoft.network/virtualnetworks/vnet1/subnets/subnet1";
        assert!(SubnetId::parse(raw).is_err());

        let id = SubnetId::parse_insensitively(raw).unwrap();
        assert_eq!(id.virtual_network_name, "vnet1");
        assert_eq!(
            id.to_string(),
            "/subscriptions/sub/resourceGroups/group1/providers/Microsoft.Network/virtualNetworks/vnet1/subnets/subnet1"
        );
    }

    #[test]
    fn wrong_type() {
        let server = DATABASE.trim_end_matches("/databases/db1");
        let err = RedisCacheId::parse(server).unwrap_err();
        assert!(matches!(err, IdError::Segment { .. }), "{err:?}");
        assert!(err.to_string().contains("Redis Cache"));
    }

    #[test]
    fn trailing_segments() {
        let err = SqlServerId::parse(DATABASE).unwrap_err();
        assert!(
            matches!(err, IdError::Length { expected: 8, found: 10, .. }),
            "{err:?}"
        );
    }

    #[test]
    fn empty_value() {
        let err = RedisCacheId::parse(
            "/subscriptions/sub/resourceGroups//providers/Microsoft.Cache/redis/cache1",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            IdError::EmptyValue {
                key: "resourceGroups",
                ..
            }
        ));
    }

    #[test]
    fn maintenance_configuration() {
        let id = MaintenanceConfigurationId::new("sub", "SQL_Default");
        assert_eq!(
            id.to_string(),
            "/subscriptions/sub/providers/Microsoft.Maintenance/publicMaintenanceConfigurations/SQL_Default"
        );
        assert_eq!(
            MaintenanceConfigurationId::parse_insensitively(&id.to_string().to_lowercase())
                .unwrap()
                .name,
            "sql_default"
        );
    }

    #[test]
    fn redis_children() {
        let id = RedisLinkedServerId::new("sub", "group1", "primary", "secondary");
        assert_eq!(
            id.to_string(),
            "/subscriptions/sub/resourceGroups/group1/providers/Microsoft.Cache/redis/primary/linkedServers/secondary"
        );
        assert_eq!(id.redis_id().redis_name, "primary");
        assert_eq!(
            id.redis_id().patch_schedule_path(),
            "/subscriptions/sub/resourceGroups/group1/providers/Microsoft.Cache/redis/primary/patchSchedules/default"
        );
    }
}

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

//! Azure Cache for Redis resources and data sources.

mod access_policy;
mod access_policy_assignment;
mod cache;
mod data_source;
mod firewall_rule;
mod linked_server;
mod models;

pub use access_policy::RedisAccessPolicyResource;
pub use access_policy_assignment::RedisAccessPolicyAssignmentResource;
pub use cache::RedisCacheResource;
pub use data_source::RedisCacheDataSource;
pub use firewall_rule::RedisFirewallRuleResource;
pub use linked_server::RedisLinkedServerResource;

pub(crate) const API_VERSION: &str = "2023-04-01";
/// Access policies are only exposed by newer API versions
pub(crate) const ACCESS_POLICY_API_VERSION: &str = "2023-08-01";

/// Lock types used when a cache is placed in a subnet
pub(crate) const VIRTUAL_NETWORK_RESOURCE_NAME: &str = "azurerm_virtual_network";
pub(crate) const SUBNET_RESOURCE_NAME: &str = "azurerm_subnet";
pub(crate) const REDIS_CACHE_RESOURCE_NAME: &str = "azurerm_redis_cache";
